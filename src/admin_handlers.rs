//! Back-office handlers. Every route here sits behind [`crate::session::require_admin`].

use crate::errors::{AppError, ResultExt};
use crate::handlers::{form_listing_id, load_detail, AppState};
use crate::models::*;
use crate::normalize::{listing_price, normalize_status};
use crate::tabular::{self, ImportReport, TabularFormat};
use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use bigdecimal::{BigDecimal, RoundingMode};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

/// GET /admin/listings?q=
pub async fn list_listings(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Vec<ListingView>>, AppError> {
    let filter = ListingFilter {
        q: params.q,
        newest_first: true,
        ..ListingFilter::default()
    };
    let listings = state.repo.list_listings(&filter).await?;
    Ok(Json(listings.into_iter().map(ListingView::from).collect()))
}

/// GET /admin/listings/:id
pub async fn get_listing(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ListingDetail>, AppError> {
    Ok(Json(load_detail(state.repo.as_ref(), id).await?))
}

/// Text fields and photo files from the listing form.
#[derive(Debug, Default)]
struct ListingUpload {
    fields: HashMap<String, String>,
    photos: Vec<NewPhoto>,
}

impl ListingUpload {
    async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut upload = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if name == "photos" {
                let mime_type = field
                    .content_type()
                    .unwrap_or("image/jpeg")
                    .to_string();
                let content = field.bytes().await?;
                // Browsers send an empty part when no file was picked.
                if content.is_empty() {
                    continue;
                }
                if !mime_type.starts_with("image/") {
                    return Err(AppError::BadRequest(format!(
                        "Unsupported photo type: {}",
                        mime_type
                    )));
                }
                upload.photos.push(NewPhoto {
                    content: content.to_vec(),
                    mime_type,
                });
            } else {
                let value = field.text().await?;
                upload.fields.insert(name, value);
            }
        }
        Ok(upload)
    }

    fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Form values layered over the current listing, if any.
    fn draft(&self, existing: Option<&Listing>) -> Result<ListingDraft, AppError> {
        let code = non_blank(self.field("code"))
            .ok_or_else(|| AppError::BadRequest("code is required".to_string()))?;

        let mut draft = match existing {
            Some(listing) => ListingDraft::from(listing),
            None => ListingDraft::seeded(&code),
        };
        draft.code = code;
        if let Some(kind) = self.field("type") {
            draft.kind = kind.trim().to_string();
        }
        if let Some(price) = self.field("price") {
            draft.price = listing_price(Some(price));
        }
        if self.fields.contains_key("neighborhood") {
            draft.neighborhood = non_blank(self.field("neighborhood"));
        }
        if self.fields.contains_key("description") {
            draft.description = non_blank(self.field("description"));
        }
        if let Some(image) = non_blank(self.field("image")) {
            draft.image = Some(image);
        }
        draft.status = normalize_status(self.field("status"), existing.map(|l| l.status));
        draft.validate()?;
        Ok(draft)
    }
}

/// POST /admin/listings
///
/// Creates a listing, or updates it when the form carries an `id`. New photos
/// are appended in the same write; the first one becomes cover if the listing
/// had none.
pub async fn save_listing(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ListingDetail>), AppError> {
    let upload = ListingUpload::read(multipart).await?;

    let id = form_listing_id(upload.field("id"));
    let existing = match id {
        Some(id) => Some(
            state
                .repo
                .get_listing(id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Listing {} not found", id)))?,
        ),
        None => None,
    };

    let draft = upload.draft(existing.as_ref())?;
    let listing = state.repo.save_listing(id, &draft, upload.photos).await?;

    let status = if existing.is_some() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(load_detail(state.repo.as_ref(), listing.id).await?)))
}

/// DELETE /admin/listings/:id
pub async fn delete_listing(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if !state.repo.delete_listing(id).await? {
        return Err(AppError::NotFound(format!("Listing {} not found", id)));
    }
    tracing::info!("Deleted listing {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /admin/photos/:id
pub async fn delete_photo(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if !state.repo.delete_photo(id).await? {
        return Err(AppError::NotFound(format!("Photo {} not found", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /admin/photos/:id/cover
pub async fn set_cover(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !state.repo.set_cover(id).await? {
        return Err(AppError::NotFound(format!("Photo {} not found", id)));
    }
    Ok(Json(json!({ "success": true, "cover_photo_id": id })))
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: Option<String>,
}

/// GET /admin/export?format=csv|xlsx
pub async fn export_listings(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ExportQuery>,
) -> Result<Response, AppError> {
    let format = TabularFormat::from_param(params.format.as_deref()).ok_or_else(|| {
        AppError::BadRequest(format!(
            "Unknown export format '{}', use csv or xlsx",
            params.format.as_deref().unwrap_or_default()
        ))
    })?;

    let listings = state.repo.list_listings(&ListingFilter::default()).await?;
    let body = tabular::export(&listings, format).map_err(AppError::InternalError)?;
    tracing::info!("Exported {} listings as {:?}", listings.len(), format);

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        format.file_name()
    ))
    .map_err(|e| AppError::InternalError(format!("Invalid header: {}", e)))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(format.content_type())),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// POST /admin/import
///
/// Upserts every row of the uploaded file by code, all or nothing.
pub async fn import_listings(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ImportReport>, AppError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            let filename = field.file_name().map(str::to_string);
            let bytes = field.bytes().await?;
            upload = Some((filename, bytes));
            break;
        }
    }
    let (filename, bytes) =
        upload.ok_or_else(|| AppError::BadRequest("file is required".to_string()))?;

    let parsed = tabular::parse_import(filename.as_deref(), &bytes)?;
    let mut report = state
        .repo
        .upsert_by_code(&parsed.rows)
        .await
        .context("Importing catalog")?;
    report.skipped = parsed.skipped;

    tracing::info!(
        "Import from {:?} ({:?}): {} imported ({} created, {} updated), {} skipped",
        filename,
        parsed.format,
        report.imported,
        report.created,
        report.updated,
        report.skipped
    );
    Ok(Json(report))
}

/// GET /admin/leads
pub async fn list_leads(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Lead>>, AppError> {
    Ok(Json(state.repo.list_leads().await?))
}

/// GET /admin/services
pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ServiceTicket>>, AppError> {
    Ok(Json(state.repo.list_tickets().await?))
}

/// Costs must fit `NUMERIC(10, 2)`.
const MAX_COST: i64 = 100_000_000;

/// Parses a ticket cost such as `150`, `150.5` or `R$ 1.234,56`.
pub fn parse_cost(raw: Option<&str>) -> Result<Option<BigDecimal>, AppError> {
    let Some(raw) = non_blank(raw) else {
        return Ok(None);
    };
    let trimmed = raw.trim_start_matches("R$").trim();
    let normalized = if trimmed.contains(',') {
        trimmed.replace('.', "").replace(',', ".")
    } else {
        trimmed.to_string()
    };

    let invalid = || AppError::BadRequest(format!("Invalid cost: {}", raw));
    let digits = normalized.strip_prefix('-').unwrap_or(&normalized);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(invalid());
    }

    let cost = BigDecimal::from_str(&normalized).map_err(|_| invalid())?;
    if cost < BigDecimal::from(0) {
        return Err(AppError::BadRequest("cost cannot be negative".to_string()));
    }
    let cost = cost.with_scale_round(2, RoundingMode::HalfUp);
    if cost >= BigDecimal::from(MAX_COST) {
        return Err(AppError::BadRequest(format!(
            "cost must be below {}",
            MAX_COST
        )));
    }
    Ok(Some(cost))
}

/// Resolves the admin form against the stored ticket.
pub fn resolve_ticket_update(
    current: &ServiceTicket,
    form: &TicketUpdateForm,
) -> Result<TicketUpdate, AppError> {
    let status = form
        .status
        .as_deref()
        .and_then(TicketStatus::parse)
        .unwrap_or(current.status);

    let scheduled_for = match non_blank(form.scheduled_for.as_deref()) {
        Some(date) => Some(NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|_| {
            AppError::BadRequest(format!("scheduled_for must be YYYY-MM-DD, got '{}'", date))
        })?),
        None => current.scheduled_for,
    };

    Ok(TicketUpdate {
        status,
        scheduled_for,
        responsible: non_blank(form.responsible.as_deref()),
        cost: parse_cost(form.cost.as_deref())?,
        materials: non_blank(form.materials.as_deref()),
    })
}

/// POST /admin/services/:id
pub async fn update_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Form(form): Form<TicketUpdateForm>,
) -> Result<Json<ServiceTicket>, AppError> {
    let current = state
        .repo
        .get_ticket(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Service ticket {} not found", id)))?;

    let update = resolve_ticket_update(&current, &form)?;
    let ticket = state
        .repo
        .update_ticket(id, &update)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Service ticket {} not found", id)))?;

    tracing::info!("Service ticket {} is now {}", id, ticket.status.as_str());
    Ok(Json(ticket))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ticket() -> ServiceTicket {
        ServiceTicket {
            id: 1,
            client_name: "Ana".into(),
            phone: "+5548991054216".into(),
            listing_id: None,
            service_type: Some("pintura".into()),
            description: None,
            requested_at: Utc::now(),
            scheduled_for: NaiveDate::from_ymd_opt(2024, 5, 10),
            responsible: None,
            cost: None,
            materials: None,
            status: TicketStatus::InProgress,
        }
    }

    fn form(status: Option<&str>, date: Option<&str>, cost: Option<&str>) -> TicketUpdateForm {
        TicketUpdateForm {
            status: status.map(str::to_string),
            scheduled_for: date.map(str::to_string),
            responsible: Some("João".into()),
            cost: cost.map(str::to_string),
            materials: None,
        }
    }

    #[test]
    fn unknown_status_and_blank_date_keep_previous_values() {
        let update = resolve_ticket_update(&ticket(), &form(Some("cancelado"), Some(""), None)).unwrap();
        assert_eq!(update.status, TicketStatus::InProgress);
        assert_eq!(update.scheduled_for, NaiveDate::from_ymd_opt(2024, 5, 10));
        assert_eq!(update.responsible.as_deref(), Some("João"));
    }

    #[test]
    fn new_values_are_applied() {
        let update =
            resolve_ticket_update(&ticket(), &form(Some("concluido"), Some("2024-06-01"), Some("R$ 1.234,5")))
                .unwrap();
        assert_eq!(update.status, TicketStatus::Done);
        assert_eq!(update.scheduled_for, NaiveDate::from_ymd_opt(2024, 6, 1));
        assert_eq!(update.cost, Some(BigDecimal::from_str("1234.50").unwrap()));
    }

    #[test]
    fn bad_dates_and_negative_costs_are_rejected() {
        let err = resolve_ticket_update(&ticket(), &form(None, Some("10/05/2024"), None)).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = resolve_ticket_update(&ticket(), &form(None, None, Some("-10"))).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn cost_parsing() {
        assert_eq!(parse_cost(None).unwrap(), None);
        assert_eq!(parse_cost(Some("  ")).unwrap(), None);
        assert_eq!(
            parse_cost(Some("150")).unwrap(),
            Some(BigDecimal::from_str("150.00").unwrap())
        );
        assert!(parse_cost(Some("abc")).is_err());
    }

    #[test]
    fn costs_outside_the_column_range_are_rejected() {
        for raw in ["1e12", "1E2", "100000000", "R$ 100.000.000,00", "99999999.995", ".", "1.2.3"] {
            let err = parse_cost(Some(raw)).unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST, "{raw}");
        }
        assert_eq!(
            parse_cost(Some("99999999.99")).unwrap(),
            Some(BigDecimal::from_str("99999999.99").unwrap())
        );
    }
}
