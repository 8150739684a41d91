use crate::errors::AppError;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use utoipa::ToSchema;

// ============ Listings ============

/// Longest text a spreadsheet cell holds, in characters.
pub const MAX_TEXT_CHARS: usize = 32_767;

/// Publication state of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    #[default]
    Active,
    Inactive,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Active => "active",
            ListingStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored status value outside the known set.
#[derive(Debug)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown status '{}'", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl TryFrom<String> for ListingStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "active" => Ok(ListingStatus::Active),
            "inactive" => Ok(ListingStatus::Inactive),
            _ => Err(UnknownStatus(value)),
        }
    }
}

/// A property in the catalog.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Listing {
    /// Surrogate id, insertion ordered.
    pub id: i64,
    /// Business code, unique. Imports upsert on it.
    pub code: String,
    /// Property type ("casa", "apartamento", ...).
    #[serde(rename = "type")]
    pub kind: String,
    pub price: f64,
    pub neighborhood: Option<String>,
    pub description: Option<String>,
    /// Legacy single image path from before photos were stored as BLOBs.
    pub image: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
    /// Stored photo acting as cover, resolved by the repository.
    #[serde(skip)]
    pub cover_photo_id: Option<i64>,
}

/// What represents a listing in list views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverImage {
    StoredPhoto(i64),
    LegacyPath(String),
    None,
}

impl CoverImage {
    pub fn url(&self) -> Option<String> {
        match self {
            CoverImage::StoredPhoto(id) => Some(format!("/photos/{}", id)),
            CoverImage::LegacyPath(path) => {
                if path.starts_with("http://") || path.starts_with("https://") || path.starts_with('/')
                {
                    Some(path.clone())
                } else {
                    Some(format!("/static/uploads/{}", path))
                }
            }
            CoverImage::None => None,
        }
    }
}

impl Listing {
    /// Stored photos win over the legacy image path.
    pub fn cover(&self) -> CoverImage {
        if let Some(id) = self.cover_photo_id {
            return CoverImage::StoredPhoto(id);
        }
        match self.image.as_deref().map(str::trim) {
            Some(path) if !path.is_empty() => CoverImage::LegacyPath(path.to_string()),
            _ => CoverImage::None,
        }
    }

    pub fn cover_url(&self) -> Option<String> {
        self.cover().url()
    }

    pub fn is_active(&self) -> bool {
        self.status == ListingStatus::Active
    }
}

/// Field values for creating or overwriting a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingDraft {
    pub code: String,
    pub kind: String,
    pub price: f64,
    pub neighborhood: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub status: ListingStatus,
}

impl ListingDraft {
    /// A fresh listing seeded with only its code.
    pub fn seeded(code: &str) -> Self {
        Self {
            code: code.to_string(),
            kind: String::new(),
            price: 0.0,
            neighborhood: None,
            description: None,
            image: None,
            status: ListingStatus::Active,
        }
    }

    /// Rejects text the catalog export could not hold in one cell.
    pub fn validate(&self) -> Result<(), AppError> {
        let fields = [
            ("code", Some(self.code.as_str())),
            ("type", Some(self.kind.as_str())),
            ("neighborhood", self.neighborhood.as_deref()),
            ("description", self.description.as_deref()),
            ("image", self.image.as_deref()),
        ];
        match fields
            .iter()
            .find(|(_, value)| value.is_some_and(|v| v.chars().count() > MAX_TEXT_CHARS))
        {
            Some((name, _)) => Err(AppError::BadRequest(format!(
                "Listing {}: {} exceeds {} characters",
                self.code.chars().take(40).collect::<String>(),
                name,
                MAX_TEXT_CHARS
            ))),
            None => Ok(()),
        }
    }
}

impl From<&Listing> for ListingDraft {
    fn from(listing: &Listing) -> Self {
        Self {
            code: listing.code.clone(),
            kind: listing.kind.clone(),
            price: listing.price,
            neighborhood: listing.neighborhood.clone(),
            description: listing.description.clone(),
            image: listing.image.clone(),
            status: listing.status,
        }
    }
}

/// Listing as served over HTTP, with its resolved cover.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ListingView {
    #[serde(flatten)]
    pub listing: Listing,
    pub cover_url: Option<String>,
}

impl From<Listing> for ListingView {
    fn from(listing: Listing) -> Self {
        let cover_url = listing.cover_url();
        Self { listing, cover_url }
    }
}

/// Listing detail with the metadata of every photo.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ListingDetail {
    #[serde(flatten)]
    pub listing: ListingView,
    pub photos: Vec<PhotoMeta>,
}

/// Search over code, type, neighborhood and description.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingFilter {
    pub status: Option<ListingStatus>,
    pub q: Option<String>,
    /// Newest first when set, insertion order otherwise.
    #[serde(default)]
    pub newest_first: bool,
}

impl ListingFilter {
    pub fn active() -> Self {
        Self {
            status: Some(ListingStatus::Active),
            ..Self::default()
        }
    }

    /// Non-blank search term, trimmed.
    pub fn term(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }

    pub fn matches(&self, listing: &Listing) -> bool {
        if let Some(status) = self.status {
            if listing.status != status {
                return false;
            }
        }
        let Some(term) = self.term() else {
            return true;
        };
        let term = term.to_lowercase();
        let contains = |value: &str| value.to_lowercase().contains(&term);
        contains(&listing.code)
            || contains(&listing.kind)
            || listing.neighborhood.as_deref().is_some_and(contains)
            || listing.description.as_deref().is_some_and(contains)
    }
}

// ============ Photos ============

/// Photo metadata, without the binary content.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, ToSchema)]
pub struct PhotoMeta {
    pub id: i64,
    pub listing_id: i64,
    pub mime_type: String,
    pub is_cover: bool,
    pub created_at: DateTime<Utc>,
}

/// Photo with its content, as served from `/photos/:id`.
#[derive(Debug, Clone, FromRow)]
pub struct Photo {
    pub id: i64,
    pub listing_id: i64,
    pub content: Vec<u8>,
    pub mime_type: String,
    pub is_cover: bool,
}

#[derive(Debug, Clone)]
pub struct NewPhoto {
    pub content: Vec<u8>,
    pub mime_type: String,
}

// ============ Leads ============

/// Contact intent captured from the public site.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Lead {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub message: Option<String>,
    pub listing_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLead {
    pub name: String,
    pub phone: String,
    pub message: Option<String>,
    pub listing_id: Option<i64>,
}

// ============ Service tickets ============

/// Progress of a post-sale service request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[default]
    Pending,
    InProgress,
    Done,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Pending => "pending",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Done => "done",
        }
    }

    /// Accepts the canonical names and their Portuguese equivalents.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "pending" | "pendente" => Some(TicketStatus::Pending),
            "in_progress" | "andamento" | "em andamento" => Some(TicketStatus::InProgress),
            "done" | "concluido" | "concluído" => Some(TicketStatus::Done),
            _ => None,
        }
    }
}

impl TryFrom<String> for TicketStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TicketStatus::parse(&value).ok_or(UnknownStatus(value))
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ServiceTicket {
    pub id: i64,
    pub client_name: String,
    pub phone: String,
    pub listing_id: Option<i64>,
    pub service_type: Option<String>,
    pub description: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub scheduled_for: Option<NaiveDate>,
    pub responsible: Option<String>,
    pub cost: Option<BigDecimal>,
    pub materials: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: TicketStatus,
}

#[derive(Debug, Clone)]
pub struct NewServiceTicket {
    pub client_name: String,
    pub phone: String,
    pub listing_id: Option<i64>,
    pub service_type: Option<String>,
    pub description: Option<String>,
}

/// Admin changes to a ticket. Every field is already resolved against the
/// current ticket, so the repository writes them as given.
#[derive(Debug, Clone)]
pub struct TicketUpdate {
    pub status: TicketStatus,
    pub scheduled_for: Option<NaiveDate>,
    pub responsible: Option<String>,
    pub cost: Option<BigDecimal>,
    pub materials: Option<String>,
}

// ============ Request/Response DTOs ============

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssistantRequest {
    /// Free-text question.
    #[serde(default)]
    pub q: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AssistantResponse {
    pub answer: String,
}

#[derive(Debug, Deserialize)]
pub struct LeadForm {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub listing_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContactForm {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceRequestForm {
    pub client_name: String,
    pub phone: String,
    #[serde(default)]
    pub listing_id: Option<String>,
    #[serde(default)]
    pub service_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceRequestResponse {
    pub success: bool,
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct TicketUpdateForm {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub scheduled_for: Option<String>,
    #[serde(default)]
    pub responsible: Option<String>,
    #[serde(default)]
    pub cost: Option<String>,
    #[serde(default)]
    pub materials: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: Option<String>,
}

/// Trims a form field, mapping blank input to `None`.
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(image: Option<&str>, cover_photo_id: Option<i64>) -> Listing {
        Listing {
            id: 1,
            code: "BR-001".into(),
            kind: "casa".into(),
            price: 500_000.0,
            neighborhood: Some("Ratones".into()),
            description: None,
            image: image.map(str::to_string),
            status: ListingStatus::Active,
            created_at: Utc::now(),
            cover_photo_id,
        }
    }

    #[test]
    fn stored_photo_wins_over_legacy_image() {
        let l = listing(Some("casa.jpg"), Some(7));
        assert_eq!(l.cover(), CoverImage::StoredPhoto(7));
        assert_eq!(l.cover_url().as_deref(), Some("/photos/7"));
    }

    #[test]
    fn legacy_image_paths_resolve() {
        assert_eq!(
            listing(Some("casa.jpg"), None).cover_url().as_deref(),
            Some("/static/uploads/casa.jpg")
        );
        assert_eq!(
            listing(Some("https://cdn.example.com/a.jpg"), None)
                .cover_url()
                .as_deref(),
            Some("https://cdn.example.com/a.jpg")
        );
        assert_eq!(listing(Some("   "), None).cover(), CoverImage::None);
        assert_eq!(listing(None, None).cover_url(), None);
    }

    #[test]
    fn filter_searches_text_fields_case_insensitively() {
        let l = listing(None, None);
        let filter = ListingFilter {
            q: Some("RATO".into()),
            ..ListingFilter::default()
        };
        assert!(filter.matches(&l));

        let filter = ListingFilter {
            status: Some(ListingStatus::Inactive),
            ..ListingFilter::default()
        };
        assert!(!filter.matches(&l));
    }

    #[test]
    fn ticket_status_accepts_portuguese_names() {
        assert_eq!(TicketStatus::parse("Pendente"), Some(TicketStatus::Pending));
        assert_eq!(TicketStatus::parse("andamento"), Some(TicketStatus::InProgress));
        assert_eq!(TicketStatus::parse("concluído"), Some(TicketStatus::Done));
        assert_eq!(TicketStatus::parse("cancelado"), None);
    }

    #[test]
    fn drafts_longer_than_a_spreadsheet_cell_are_rejected() {
        let mut draft = ListingDraft::seeded("BR-001");
        draft.description = Some("á".repeat(MAX_TEXT_CHARS));
        assert!(draft.validate().is_ok());

        draft.description = Some("a".repeat(MAX_TEXT_CHARS + 1));
        let err = draft.validate().unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(err.to_string().contains("description"));
    }
}
