use crate::assistant;
use crate::config::Config;
use crate::errors::{AppError, ResultExt};
use crate::models::*;
use crate::normalize::contact_phone;
use crate::repository::Repository;
use crate::session::SessionStore;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Catalog storage (Postgres or in-memory).
    pub repo: Arc<dyn Repository>,
    /// Application configuration.
    pub config: Config,
    /// Open admin sessions.
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(repo: Arc<dyn Repository>, config: Config) -> Self {
        let sessions = SessionStore::new(Duration::from_secs(config.session_ttl_secs));
        Self {
            repo,
            config,
            sessions,
        }
    }
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up"))
)]
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "brando-imoveis",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// GET /listings
///
/// Active listings, newest first, each with its resolved cover.
#[utoipa::path(
    get,
    path = "/listings",
    params(("q" = Option<String>, Query, description = "Substring over code, type, neighborhood and description")),
    responses((status = 200, description = "Active listings", body = [ListingView]))
)]
pub async fn list_listings(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Vec<ListingView>>, AppError> {
    let filter = ListingFilter {
        q: params.q,
        newest_first: true,
        ..ListingFilter::active()
    };
    let listings = state.repo.list_listings(&filter).await?;
    Ok(Json(listings.into_iter().map(ListingView::from).collect()))
}

/// GET /listings/:id
#[utoipa::path(
    get,
    path = "/listings/{id}",
    params(("id" = i64, Path, description = "Listing id")),
    responses(
        (status = 200, description = "Listing with photo metadata", body = ListingDetail),
        (status = 404, description = "No such listing")
    )
)]
pub async fn get_listing(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ListingDetail>, AppError> {
    Ok(Json(load_detail(state.repo.as_ref(), id).await?))
}

pub(crate) async fn load_detail(repo: &dyn Repository, id: i64) -> Result<ListingDetail, AppError> {
    let listing = repo
        .get_listing(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Listing {} not found", id)))?;
    let photos = repo.list_photos(id).await?;
    Ok(ListingDetail {
        listing: ListingView::from(listing),
        photos,
    })
}

/// Accepts a numeric listing id from a form field; anything else means "no listing".
pub(crate) fn form_listing_id(raw: Option<&str>) -> Option<i64> {
    raw.map(str::trim)
        .filter(|v| !v.is_empty() && v.chars().all(|c| c.is_ascii_digit()))
        .and_then(|v| v.parse().ok())
}

fn required(value: &str, field: &str) -> Result<String, AppError> {
    non_blank(Some(value)).ok_or_else(|| AppError::BadRequest(format!("{} is required", field)))
}

/// WhatsApp deep link carrying a prefilled message.
pub fn whatsapp_link(number: &str, text: &str) -> Result<String, AppError> {
    url::Url::parse_with_params(&format!("https://wa.me/{}", number), &[("text", text)])
        .map(String::from)
        .map_err(|e| AppError::InternalError(format!("Invalid WhatsApp link: {}", e)))
}

/// POST /lead
///
/// Records the lead, then hands the visitor over to WhatsApp.
pub async fn create_lead(
    State(state): State<Arc<AppState>>,
    Form(form): Form<LeadForm>,
) -> Result<Redirect, AppError> {
    let name = required(&form.name, "name")?;
    let phone = contact_phone(&required(&form.phone, "phone")?);

    // A stale or foreign listing id still records the lead, just without the link.
    let listing = match form_listing_id(form.listing_id.as_deref()) {
        Some(id) => state.repo.get_listing(id).await?,
        None => None,
    };

    let lead = state
        .repo
        .create_lead(&NewLead {
            name,
            phone,
            message: non_blank(form.message.as_deref()),
            listing_id: listing.as_ref().map(|l| l.id),
        })
        .await?;
    tracing::info!("Lead {} recorded (listing: {:?})", lead.id, lead.listing_id);

    let text = match &listing {
        Some(l) => format!("Olá! Tenho interesse no imóvel código {}", l.code),
        None => "Olá! Tenho interesse em imóveis da Brando.".to_string(),
    };
    Ok(Redirect::to(&whatsapp_link(&state.config.whatsapp_number, &text)?))
}

/// POST /contact
pub async fn create_contact(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ContactForm>,
) -> Result<Redirect, AppError> {
    let name = required(&form.name, "name")?;
    let phone = contact_phone(&required(&form.phone, "phone")?);

    let lead = state
        .repo
        .create_lead(&NewLead {
            name,
            phone,
            message: non_blank(form.message.as_deref()),
            listing_id: None,
        })
        .await?;
    tracing::info!("Contact lead {} recorded", lead.id);

    Ok(Redirect::to(&whatsapp_link(
        &state.config.whatsapp_number,
        "Olá! Quero mais informações sobre os imóveis.",
    )?))
}

/// POST /services
///
/// Opens a pending post-sale service ticket.
pub async fn create_service_request(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ServiceRequestForm>,
) -> Result<Json<ServiceRequestResponse>, AppError> {
    let client_name = required(&form.client_name, "client_name")?;
    let phone = contact_phone(&required(&form.phone, "phone")?);

    let listing_id = match form_listing_id(form.listing_id.as_deref()) {
        Some(id) => state.repo.get_listing(id).await?.map(|l| l.id),
        None => None,
    };

    let ticket = state
        .repo
        .create_ticket(&NewServiceTicket {
            client_name,
            phone,
            listing_id,
            service_type: non_blank(form.service_type.as_deref()),
            description: non_blank(form.description.as_deref()),
        })
        .await
        .context("Opening service request")?;
    tracing::info!("Service ticket {} opened", ticket.id);

    Ok(Json(ServiceRequestResponse {
        success: true,
        id: ticket.id,
    }))
}

/// POST /api/assistant
///
/// Answers a free-text question using the active catalog.
#[utoipa::path(
    post,
    path = "/api/assistant",
    request_body = AssistantRequest,
    responses((status = 200, description = "Assistant answer", body = AssistantResponse))
)]
pub async fn assistant(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AssistantRequest>,
) -> Result<Json<AssistantResponse>, AppError> {
    let listings = state.repo.list_listings(&ListingFilter::active()).await?;
    let question = request.q.unwrap_or_default();
    let (rule, answer) = assistant::evaluate(&question, &listings);
    tracing::debug!("Assistant answered with rule '{}'", rule);
    Ok(Json(AssistantResponse { answer }))
}

/// GET /photos/:id
///
/// Serves the stored bytes with an ETag; clients revalidate with `If-None-Match`.
pub async fn serve_photo(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let photo = state
        .repo
        .get_photo(id)
        .await?
        .filter(|p| !p.content.is_empty())
        .ok_or_else(|| AppError::NotFound(format!("Photo {} not found", id)))?;

    let etag = format!("\"{}\"", hex::encode(Sha256::digest(&photo.content)));
    let etag_header = HeaderValue::from_str(&etag)
        .map_err(|e| AppError::InternalError(format!("Invalid ETag: {}", e)))?;
    let cache_control = HeaderValue::from_static("public, max-age=86400");

    let revalidated = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(',').any(|tag| tag.trim() == etag));
    if revalidated {
        return Ok((
            StatusCode::NOT_MODIFIED,
            [(header::ETAG, etag_header), (header::CACHE_CONTROL, cache_control)],
        )
            .into_response());
    }

    let content_type = HeaderValue::from_str(&photo.mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::ETAG, etag_header),
            (header::CACHE_CONTROL, cache_control),
        ],
        photo.content,
    )
        .into_response())
}
