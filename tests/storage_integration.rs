use std::env;
use std::time::Duration;
use uuid::Uuid;

use brando_imoveis::db::Database;
use brando_imoveis::models::{ListingDraft, ListingFilter, ListingStatus, NewPhoto};
use brando_imoveis::pg_store::PgRepository;
use brando_imoveis::repository::Repository;
use brando_imoveis::tabular::ImportRow;

/// Integration smoke test for the Postgres repository.
/// Marked ignored so it never runs against a real database by accident; set TEST_DATABASE_URL to run.
#[tokio::test]
#[ignore]
async fn import_and_cover_smoke_test() -> anyhow::Result<()> {
    let db_url = env::var("TEST_DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL to run this test"))?;

    let db = Database::connect(&db_url, 2, Duration::from_secs(5)).await?;
    let repo = PgRepository::new(db.pool.clone());

    // Unique code to avoid conflicts on repeated runs.
    let code = format!("TEST-{}", Uuid::new_v4().simple());
    let row = ImportRow {
        code: code.clone(),
        kind: Some("Casa".to_string()),
        price: Some("R$ 500.000,00".to_string()),
        neighborhood: Some("Ratones".to_string()),
        status: Some("ativo".to_string()),
        ..ImportRow::default()
    };

    let report = repo
        .upsert_by_code(std::slice::from_ref(&row))
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_eq!(report.created, 1);

    let report = repo
        .upsert_by_code(&[row])
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_eq!(report.updated, 1);

    let listing = repo
        .get_listing_by_code(&code)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .ok_or_else(|| anyhow::anyhow!("imported listing not found"))?;
    assert_eq!(listing.price, 500_000.0);
    assert_eq!(listing.status, ListingStatus::Active);

    let photo = || NewPhoto {
        content: vec![0xFF, 0xD8, 0xFF],
        mime_type: "image/jpeg".to_string(),
    };
    let photos = repo
        .add_photos(listing.id, vec![photo(), photo()])
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert!(photos[0].is_cover);

    repo.delete_photo(photos[0].id)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let remaining = repo
        .list_photos(listing.id)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_eq!(remaining.iter().filter(|p| p.is_cover).count(), 1);

    let filter = ListingFilter {
        q: Some(code.clone()),
        ..ListingFilter::default()
    };
    let found = repo
        .list_listings(&filter)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].cover_photo_id, Some(photos[1].id));

    repo.delete_listing(listing.id)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    Ok(())
}

/// A row Postgres refuses midway through the batch leaves the catalog untouched.
#[tokio::test]
#[ignore]
async fn failed_import_rolls_back_earlier_rows() -> anyhow::Result<()> {
    let db_url = env::var("TEST_DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL to run this test"))?;

    let db = Database::connect(&db_url, 2, Duration::from_secs(5)).await?;
    let repo = PgRepository::new(db.pool.clone());

    let first = format!("TEST-{}", Uuid::new_v4().simple());
    let second = format!("TEST-{}", Uuid::new_v4().simple());
    let rows = vec![
        ImportRow {
            code: first.clone(),
            kind: Some("Casa".to_string()),
            price: Some("500000".to_string()),
            ..ImportRow::default()
        },
        ImportRow {
            code: second.clone(),
            // TEXT columns reject NUL bytes
            kind: Some("Ca\0sa".to_string()),
            ..ImportRow::default()
        },
    ];

    assert!(repo.upsert_by_code(&rows).await.is_err());
    for code in [&first, &second] {
        let found = repo
            .get_listing_by_code(code)
            .await
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        assert!(found.is_none(), "{} should have been rolled back", code);
    }

    // Same for a listing whose photo cannot be stored.
    let photo = NewPhoto {
        content: vec![0xFF, 0xD8, 0xFF],
        mime_type: "image/\0jpeg".to_string(),
    };
    assert!(repo
        .save_listing(None, &ListingDraft::seeded(&first), vec![photo])
        .await
        .is_err());
    let found = repo
        .get_listing_by_code(&first)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert!(found.is_none());
    Ok(())
}
