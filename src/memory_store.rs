//! Process-local [`Repository`], used by the test suite and by `STORAGE=memory`.

use crate::errors::AppError;
use crate::models::*;
use crate::repository::Repository;
use crate::tabular::{merge_row, ImportReport, ImportRow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredPhoto {
    photo: Photo,
    created_at: DateTime<Utc>,
}

impl StoredPhoto {
    fn meta(&self) -> PhotoMeta {
        PhotoMeta {
            id: self.photo.id,
            listing_id: self.photo.listing_id,
            mime_type: self.photo.mime_type.clone(),
            is_cover: self.photo.is_cover,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    last_listing_id: i64,
    last_photo_id: i64,
    last_lead_id: i64,
    last_ticket_id: i64,
    listings: BTreeMap<i64, Listing>,
    photos: BTreeMap<i64, StoredPhoto>,
    leads: Vec<Lead>,
    tickets: BTreeMap<i64, ServiceTicket>,
}

impl State {
    /// Marked cover, else the first photo by id.
    fn cover_of(&self, listing_id: i64) -> Option<i64> {
        let mut photos = self
            .photos
            .values()
            .filter(|p| p.photo.listing_id == listing_id);
        let first = photos.next()?;
        if first.photo.is_cover {
            return Some(first.photo.id);
        }
        Some(
            photos
                .find(|p| p.photo.is_cover)
                .map_or(first.photo.id, |p| p.photo.id),
        )
    }

    fn resolved(&self, listing: &Listing) -> Listing {
        let mut listing = listing.clone();
        listing.cover_photo_id = self.cover_of(listing.id);
        listing
    }

    fn code_taken(&self, code: &str, except: Option<i64>) -> bool {
        self.listings
            .values()
            .any(|l| l.code == code && Some(l.id) != except)
    }

    /// The first photo becomes cover when the listing has none.
    fn attach_photos(&mut self, listing_id: i64, photos: Vec<NewPhoto>) -> Vec<PhotoMeta> {
        let mut needs_cover = self.cover_of(listing_id).is_none();
        let mut added = Vec::with_capacity(photos.len());
        for photo in photos {
            self.last_photo_id += 1;
            let stored = StoredPhoto {
                photo: Photo {
                    id: self.last_photo_id,
                    listing_id,
                    content: photo.content,
                    mime_type: photo.mime_type,
                    is_cover: needs_cover,
                },
                created_at: Utc::now(),
            };
            needs_cover = false;
            added.push(stored.meta());
            self.photos.insert(stored.photo.id, stored);
        }
        added
    }
}

fn apply_draft(listing: &mut Listing, draft: &ListingDraft) {
    listing.code = draft.code.clone();
    listing.kind = draft.kind.clone();
    listing.price = draft.price;
    listing.neighborhood = draft.neighborhood.clone();
    listing.description = draft.description.clone();
    listing.image = draft.image.clone();
    listing.status = draft.status;
}

fn new_listing(id: i64, draft: &ListingDraft) -> Listing {
    let mut listing = Listing {
        id,
        code: String::new(),
        kind: String::new(),
        price: 0.0,
        neighborhood: None,
        description: None,
        image: None,
        status: ListingStatus::Active,
        created_at: Utc::now(),
        cover_photo_id: None,
    };
    apply_draft(&mut listing, draft);
    listing
}

#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: RwLock<State>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn list_listings(&self, filter: &ListingFilter) -> Result<Vec<Listing>, AppError> {
        let state = self.state.read().await;
        let mut listings: Vec<Listing> = state
            .listings
            .values()
            .filter(|l| filter.matches(l))
            .map(|l| state.resolved(l))
            .collect();
        if filter.newest_first {
            listings.reverse();
        }
        Ok(listings)
    }

    async fn get_listing(&self, id: i64) -> Result<Option<Listing>, AppError> {
        let state = self.state.read().await;
        Ok(state.listings.get(&id).map(|l| state.resolved(l)))
    }

    async fn get_listing_by_code(&self, code: &str) -> Result<Option<Listing>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .listings
            .values()
            .find(|l| l.code == code)
            .map(|l| state.resolved(l)))
    }

    async fn save_listing(
        &self,
        id: Option<i64>,
        draft: &ListingDraft,
        photos: Vec<NewPhoto>,
    ) -> Result<Listing, AppError> {
        draft.validate()?;
        let mut state = self.state.write().await;
        if state.code_taken(&draft.code, id) {
            return Err(AppError::BadRequest(format!(
                "Code {} is already used by another listing",
                draft.code
            )));
        }

        let id = match id {
            Some(id) => {
                let listing = state
                    .listings
                    .get_mut(&id)
                    .ok_or_else(|| AppError::NotFound(format!("Listing {} not found", id)))?;
                apply_draft(listing, draft);
                id
            }
            None => {
                state.last_listing_id += 1;
                let id = state.last_listing_id;
                state.listings.insert(id, new_listing(id, draft));
                id
            }
        };
        state.attach_photos(id, photos);

        let listing = &state.listings[&id];
        Ok(state.resolved(listing))
    }

    async fn delete_listing(&self, id: i64) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        if state.listings.remove(&id).is_none() {
            return Ok(false);
        }
        state.photos.retain(|_, p| p.photo.listing_id != id);
        for lead in state.leads.iter_mut().filter(|l| l.listing_id == Some(id)) {
            lead.listing_id = None;
        }
        for ticket in state.tickets.values_mut().filter(|t| t.listing_id == Some(id)) {
            ticket.listing_id = None;
        }
        Ok(true)
    }

    async fn upsert_by_code(&self, rows: &[ImportRow]) -> Result<ImportReport, AppError> {
        let mut state = self.state.write().await;

        // Work on a staged copy; the live catalog changes only once every row applied.
        let mut staged = state.listings.clone();
        let mut last_id = state.last_listing_id;
        let mut report = ImportReport::default();

        for row in rows {
            let existing = staged.values_mut().find(|l| l.code == row.code);
            match existing {
                Some(listing) => {
                    let merged = merge_row(Some(&ListingDraft::from(&*listing)), row);
                    merged.validate()?;
                    apply_draft(listing, &merged);
                    report.updated += 1;
                }
                None => {
                    let merged = merge_row(None, row);
                    merged.validate()?;
                    last_id += 1;
                    staged.insert(last_id, new_listing(last_id, &merged));
                    report.created += 1;
                }
            }
            report.imported += 1;
        }

        state.listings = staged;
        state.last_listing_id = last_id;
        Ok(report)
    }

    async fn list_photos(&self, listing_id: i64) -> Result<Vec<PhotoMeta>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .photos
            .values()
            .filter(|p| p.photo.listing_id == listing_id)
            .map(StoredPhoto::meta)
            .collect())
    }

    async fn add_photos(
        &self,
        listing_id: i64,
        photos: Vec<NewPhoto>,
    ) -> Result<Vec<PhotoMeta>, AppError> {
        let mut state = self.state.write().await;
        if !state.listings.contains_key(&listing_id) {
            return Err(AppError::NotFound(format!(
                "Listing {} not found",
                listing_id
            )));
        }

        Ok(state.attach_photos(listing_id, photos))
    }

    async fn get_photo(&self, id: i64) -> Result<Option<Photo>, AppError> {
        let state = self.state.read().await;
        Ok(state.photos.get(&id).map(|p| p.photo.clone()))
    }

    async fn delete_photo(&self, id: i64) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        let Some(removed) = state.photos.remove(&id) else {
            return Ok(false);
        };

        if removed.photo.is_cover {
            let listing_id = removed.photo.listing_id;
            if let Some(next) = state
                .photos
                .values_mut()
                .find(|p| p.photo.listing_id == listing_id)
            {
                next.photo.is_cover = true;
            }
        }
        Ok(true)
    }

    async fn set_cover(&self, id: i64) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        let Some(listing_id) = state.photos.get(&id).map(|p| p.photo.listing_id) else {
            return Ok(false);
        };
        for photo in state
            .photos
            .values_mut()
            .filter(|p| p.photo.listing_id == listing_id)
        {
            photo.photo.is_cover = photo.photo.id == id;
        }
        Ok(true)
    }

    async fn create_lead(&self, lead: &NewLead) -> Result<Lead, AppError> {
        let mut state = self.state.write().await;
        state.last_lead_id += 1;
        let lead = Lead {
            id: state.last_lead_id,
            name: lead.name.clone(),
            phone: lead.phone.clone(),
            message: lead.message.clone(),
            listing_id: lead.listing_id,
            created_at: Utc::now(),
        };
        state.leads.push(lead.clone());
        Ok(lead)
    }

    async fn list_leads(&self) -> Result<Vec<Lead>, AppError> {
        let state = self.state.read().await;
        Ok(state.leads.iter().rev().cloned().collect())
    }

    async fn create_ticket(&self, ticket: &NewServiceTicket) -> Result<ServiceTicket, AppError> {
        let mut state = self.state.write().await;
        state.last_ticket_id += 1;
        let ticket = ServiceTicket {
            id: state.last_ticket_id,
            client_name: ticket.client_name.clone(),
            phone: ticket.phone.clone(),
            listing_id: ticket.listing_id,
            service_type: ticket.service_type.clone(),
            description: ticket.description.clone(),
            requested_at: Utc::now(),
            scheduled_for: None,
            responsible: None,
            cost: None,
            materials: None,
            status: TicketStatus::Pending,
        };
        state.tickets.insert(ticket.id, ticket.clone());
        Ok(ticket)
    }

    async fn get_ticket(&self, id: i64) -> Result<Option<ServiceTicket>, AppError> {
        Ok(self.state.read().await.tickets.get(&id).cloned())
    }

    async fn list_tickets(&self) -> Result<Vec<ServiceTicket>, AppError> {
        let state = self.state.read().await;
        Ok(state.tickets.values().rev().cloned().collect())
    }

    async fn update_ticket(
        &self,
        id: i64,
        update: &TicketUpdate,
    ) -> Result<Option<ServiceTicket>, AppError> {
        let mut state = self.state.write().await;
        let Some(ticket) = state.tickets.get_mut(&id) else {
            return Ok(None);
        };
        ticket.status = update.status;
        ticket.scheduled_for = update.scheduled_for;
        ticket.responsible = update.responsible.clone();
        ticket.cost = update.cost.clone();
        ticket.materials = update.materials.clone();
        Ok(Some(ticket.clone()))
    }
}
