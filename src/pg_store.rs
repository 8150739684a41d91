use crate::errors::{AppError, ResultExt};
use crate::models::*;
use crate::repository::Repository;
use crate::tabular::{merge_row, ImportReport, ImportRow};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

/// Listing columns plus the resolved cover photo.
///
/// The cover is the photo flagged `is_cover`, else the oldest photo.
const LISTING_SELECT: &str = r#"
    SELECT l.id, l.code, l.kind, l.price, l.neighborhood, l.description, l.image,
           l.status, l.created_at,
           (SELECT p.id FROM listing_photos p
             WHERE p.listing_id = l.id
             ORDER BY p.is_cover DESC, p.id ASC
             LIMIT 1) AS cover_photo_id
      FROM listings l
"#;

/// Postgres-backed repository.
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_by_code_for_update(
        tx: &mut Transaction<'_, Postgres>,
        code: &str,
    ) -> Result<Option<Listing>, AppError> {
        sqlx::query_as::<_, Listing>(&format!("{} WHERE l.code = $1 FOR UPDATE OF l", LISTING_SELECT))
            .bind(code)
            .fetch_optional(&mut **tx)
            .await
            .with_context(|| format!("Loading listing {} for import", code))
    }

    async fn insert_listing(
        tx: &mut Transaction<'_, Postgres>,
        draft: &ListingDraft,
    ) -> Result<i64, sqlx::Error> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO listings (code, kind, price, neighborhood, description, image, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&draft.code)
        .bind(&draft.kind)
        .bind(draft.price)
        .bind(&draft.neighborhood)
        .bind(&draft.description)
        .bind(&draft.image)
        .bind(draft.status.as_str())
        .fetch_one(&mut **tx)
        .await?;
        Ok(id)
    }

    async fn update_listing(
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
        draft: &ListingDraft,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE listings
               SET code = $2, kind = $3, price = $4, neighborhood = $5,
                   description = $6, image = $7, status = $8
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&draft.code)
        .bind(&draft.kind)
        .bind(draft.price)
        .bind(&draft.neighborhood)
        .bind(&draft.description)
        .bind(&draft.image)
        .bind(draft.status.as_str())
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }

    /// Insert photos for a locked listing; the first becomes cover when it has none.
    async fn insert_photos(
        tx: &mut Transaction<'_, Postgres>,
        listing_id: i64,
        photos: Vec<NewPhoto>,
    ) -> Result<Vec<PhotoMeta>, AppError> {
        let (has_photos,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM listing_photos WHERE listing_id = $1)")
                .bind(listing_id)
                .fetch_one(&mut **tx)
                .await?;

        let mut needs_cover = !has_photos;
        let mut added = Vec::with_capacity(photos.len());
        for photo in photos {
            let meta = sqlx::query_as::<_, PhotoMeta>(
                r#"
                INSERT INTO listing_photos (listing_id, content, mime_type, is_cover)
                VALUES ($1, $2, $3, $4)
                RETURNING id, listing_id, mime_type, is_cover, created_at
                "#,
            )
            .bind(listing_id)
            .bind(&photo.content)
            .bind(&photo.mime_type)
            .bind(needs_cover)
            .fetch_one(&mut **tx)
            .await
            .context("Storing photo")?;
            needs_cover = false;
            added.push(meta);
        }
        Ok(added)
    }
}

/// Unique violations on `listings.code` surface as a client error.
fn map_code_conflict(err: sqlx::Error, code: &str) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return AppError::BadRequest(format!(
                "Code {} is already used by another listing",
                code
            ));
        }
    }
    AppError::DatabaseError(err)
}

#[async_trait]
impl Repository for PgRepository {
    async fn list_listings(&self, filter: &ListingFilter) -> Result<Vec<Listing>, AppError> {
        let order = if filter.newest_first { "DESC" } else { "ASC" };
        let sql = format!(
            r#"{}
             WHERE ($1::text IS NULL OR l.status = $1)
               AND ($2::text IS NULL
                    OR l.code ILIKE $2 OR l.kind ILIKE $2
                    OR l.neighborhood ILIKE $2 OR l.description ILIKE $2)
             ORDER BY l.id {}"#,
            LISTING_SELECT, order
        );
        let pattern = filter.term().map(|q| format!("%{}%", q));

        sqlx::query_as::<_, Listing>(&sql)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(pattern)
            .fetch_all(&self.pool)
            .await
            .context("Listing catalog")
    }

    async fn get_listing(&self, id: i64) -> Result<Option<Listing>, AppError> {
        Ok(
            sqlx::query_as::<_, Listing>(&format!("{} WHERE l.id = $1", LISTING_SELECT))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn get_listing_by_code(&self, code: &str) -> Result<Option<Listing>, AppError> {
        Ok(
            sqlx::query_as::<_, Listing>(&format!("{} WHERE l.code = $1", LISTING_SELECT))
                .bind(code)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn save_listing(
        &self,
        id: Option<i64>,
        draft: &ListingDraft,
        photos: Vec<NewPhoto>,
    ) -> Result<Listing, AppError> {
        draft.validate()?;
        let mut tx = self.pool.begin().await?;

        let id = match id {
            Some(id) => {
                let affected = Self::update_listing(&mut tx, id, draft)
                    .await
                    .map_err(|e| map_code_conflict(e, &draft.code))?;
                if affected == 0 {
                    return Err(AppError::NotFound(format!("Listing {} not found", id)));
                }
                id
            }
            None => Self::insert_listing(&mut tx, draft)
                .await
                .map_err(|e| map_code_conflict(e, &draft.code))?,
        };

        // The updated or inserted row stays locked until commit.
        let added = Self::insert_photos(&mut tx, id, photos)
            .await
            .with_context(|| format!("Attaching photos to listing {}", id))?;

        tx.commit().await?;
        tracing::info!(
            "Saved listing {} ({}) with {} new photo(s)",
            id,
            draft.code,
            added.len()
        );

        self.get_listing(id)
            .await?
            .ok_or_else(|| AppError::InternalError(format!("Listing {} vanished after save", id)))
    }

    async fn delete_listing(&self, id: i64) -> Result<bool, AppError> {
        // Photos go with the listing (ON DELETE CASCADE); leads and tickets keep
        // existing with their reference cleared (ON DELETE SET NULL).
        let result = sqlx::query("DELETE FROM listings WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Deleting listing")?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_by_code(&self, rows: &[ImportRow]) -> Result<ImportReport, AppError> {
        let mut tx = self.pool.begin().await?;
        let mut report = ImportReport::default();

        for row in rows {
            match Self::find_by_code_for_update(&mut tx, &row.code).await? {
                Some(listing) => {
                    let merged = merge_row(Some(&ListingDraft::from(&listing)), row);
                    merged.validate()?;
                    Self::update_listing(&mut tx, listing.id, &merged)
                        .await
                        .with_context(|| format!("Updating listing {}", row.code))?;
                    report.updated += 1;
                }
                None => {
                    let merged = merge_row(None, row);
                    merged.validate()?;
                    Self::insert_listing(&mut tx, &merged)
                        .await
                        .with_context(|| format!("Creating listing {}", row.code))?;
                    report.created += 1;
                }
            }
            report.imported += 1;
        }

        // Dropping `tx` on any early return above rolls the whole batch back.
        tx.commit().await.context("Committing import")?;
        Ok(report)
    }

    async fn list_photos(&self, listing_id: i64) -> Result<Vec<PhotoMeta>, AppError> {
        Ok(sqlx::query_as::<_, PhotoMeta>(
            r#"
            SELECT id, listing_id, mime_type, is_cover, created_at
              FROM listing_photos
             WHERE listing_id = $1
             ORDER BY id
            "#,
        )
        .bind(listing_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn add_photos(
        &self,
        listing_id: i64,
        photos: Vec<NewPhoto>,
    ) -> Result<Vec<PhotoMeta>, AppError> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM listings WHERE id = $1 FOR UPDATE")
                .bind(listing_id)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            return Err(AppError::NotFound(format!(
                "Listing {} not found",
                listing_id
            )));
        }

        let added = Self::insert_photos(&mut tx, listing_id, photos).await?;

        tx.commit().await?;
        tracing::info!("Stored {} photo(s) for listing {}", added.len(), listing_id);
        Ok(added)
    }

    async fn get_photo(&self, id: i64) -> Result<Option<Photo>, AppError> {
        Ok(sqlx::query_as::<_, Photo>(
            "SELECT id, listing_id, content, mime_type, is_cover FROM listing_photos WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_photo(&self, id: i64) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let deleted: Option<(i64, bool)> = sqlx::query_as(
            "DELETE FROM listing_photos WHERE id = $1 RETURNING listing_id, is_cover",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((listing_id, was_cover)) = deleted else {
            return Ok(false);
        };

        if was_cover {
            sqlx::query(
                r#"
                UPDATE listing_photos SET is_cover = TRUE
                 WHERE id = (SELECT id FROM listing_photos
                              WHERE listing_id = $1
                              ORDER BY id
                              LIMIT 1)
                "#,
            )
            .bind(listing_id)
            .execute(&mut *tx)
            .await
            .context("Reassigning cover photo")?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn set_cover(&self, id: i64) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let listing: Option<(i64,)> =
            sqlx::query_as("SELECT listing_id FROM listing_photos WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((listing_id,)) = listing else {
            return Ok(false);
        };

        // Clear first so the one-cover-per-listing index never sees two covers.
        sqlx::query("UPDATE listing_photos SET is_cover = FALSE WHERE listing_id = $1 AND is_cover")
            .bind(listing_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE listing_photos SET is_cover = TRUE WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn create_lead(&self, lead: &NewLead) -> Result<Lead, AppError> {
        sqlx::query_as::<_, Lead>(
            r#"
            INSERT INTO leads (name, phone, message, listing_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, phone, message, listing_id, created_at
            "#,
        )
        .bind(&lead.name)
        .bind(&lead.phone)
        .bind(&lead.message)
        .bind(lead.listing_id)
        .fetch_one(&self.pool)
        .await
        .context("Recording lead")
    }

    async fn list_leads(&self) -> Result<Vec<Lead>, AppError> {
        Ok(sqlx::query_as::<_, Lead>(
            "SELECT id, name, phone, message, listing_id, created_at FROM leads ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn create_ticket(&self, ticket: &NewServiceTicket) -> Result<ServiceTicket, AppError> {
        sqlx::query_as::<_, ServiceTicket>(
            r#"
            INSERT INTO service_tickets (client_name, phone, listing_id, service_type, description)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&ticket.client_name)
        .bind(&ticket.phone)
        .bind(ticket.listing_id)
        .bind(&ticket.service_type)
        .bind(&ticket.description)
        .fetch_one(&self.pool)
        .await
        .context("Opening service ticket")
    }

    async fn get_ticket(&self, id: i64) -> Result<Option<ServiceTicket>, AppError> {
        Ok(
            sqlx::query_as::<_, ServiceTicket>("SELECT * FROM service_tickets WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn list_tickets(&self) -> Result<Vec<ServiceTicket>, AppError> {
        Ok(sqlx::query_as::<_, ServiceTicket>(
            "SELECT * FROM service_tickets ORDER BY requested_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn update_ticket(
        &self,
        id: i64,
        update: &TicketUpdate,
    ) -> Result<Option<ServiceTicket>, AppError> {
        sqlx::query_as::<_, ServiceTicket>(
            r#"
            UPDATE service_tickets
               SET status = $2, scheduled_for = $3, responsible = $4,
                   cost = $5, materials = $6
             WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(update.status.as_str())
        .bind(update.scheduled_for)
        .bind(&update.responsible)
        .bind(&update.cost)
        .bind(&update.materials)
        .fetch_optional(&self.pool)
        .await
        .context("Updating service ticket")
    }
}
