use crate::errors::AppError;
use crate::models::*;
use crate::tabular::{ImportReport, ImportRow};
use async_trait::async_trait;

/// Storage for the catalog and everything hanging off it.
///
/// Implemented by [`crate::pg_store::PgRepository`] for production and by
/// [`crate::memory_store::MemoryRepository`] for tests and demo runs.
#[async_trait]
pub trait Repository: Send + Sync {
    // ---- listings ----

    /// Listings matching `filter`, ordered by id.
    async fn list_listings(&self, filter: &ListingFilter) -> Result<Vec<Listing>, AppError>;

    async fn get_listing(&self, id: i64) -> Result<Option<Listing>, AppError>;

    async fn get_listing_by_code(&self, code: &str) -> Result<Option<Listing>, AppError>;

    /// Create (`id == None`) or overwrite a listing and attach `photos`, all or nothing.
    ///
    /// Fails with `BadRequest` when the code belongs to another listing or a
    /// text field is too long, and with `NotFound` when `id` does not exist.
    async fn save_listing(
        &self,
        id: Option<i64>,
        draft: &ListingDraft,
        photos: Vec<NewPhoto>,
    ) -> Result<Listing, AppError>;

    /// Delete a listing and its photos. Returns whether it existed.
    async fn delete_listing(&self, id: i64) -> Result<bool, AppError>;

    /// Apply import rows by business code, all or nothing.
    async fn upsert_by_code(&self, rows: &[ImportRow]) -> Result<ImportReport, AppError>;

    // ---- photos ----

    async fn list_photos(&self, listing_id: i64) -> Result<Vec<PhotoMeta>, AppError>;

    /// Attach photos. The first one becomes cover when the listing has none.
    async fn add_photos(
        &self,
        listing_id: i64,
        photos: Vec<NewPhoto>,
    ) -> Result<Vec<PhotoMeta>, AppError>;

    async fn get_photo(&self, id: i64) -> Result<Option<Photo>, AppError>;

    /// Delete a photo, handing the cover to the first remaining photo if needed.
    async fn delete_photo(&self, id: i64) -> Result<bool, AppError>;

    /// Make `id` the only cover of its listing.
    async fn set_cover(&self, id: i64) -> Result<bool, AppError>;

    // ---- leads ----

    async fn create_lead(&self, lead: &NewLead) -> Result<Lead, AppError>;

    /// Newest first.
    async fn list_leads(&self) -> Result<Vec<Lead>, AppError>;

    // ---- service tickets ----

    async fn create_ticket(&self, ticket: &NewServiceTicket) -> Result<ServiceTicket, AppError>;

    async fn get_ticket(&self, id: i64) -> Result<Option<ServiceTicket>, AppError>;

    /// Newest request first.
    async fn list_tickets(&self) -> Result<Vec<ServiceTicket>, AppError>;

    async fn update_ticket(
        &self,
        id: i64,
        update: &TicketUpdate,
    ) -> Result<Option<ServiceTicket>, AppError>;
}
