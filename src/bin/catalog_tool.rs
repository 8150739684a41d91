//! Bulk catalog maintenance from the command line.
//!
//! ```text
//! catalog_tool import <file.csv|file.xlsx>
//! catalog_tool export <file.csv|file.xlsx>
//! ```
//!
//! Talks to the database in `DATABASE_URL` and applies the same import rules
//! as the admin upload.

use anyhow::Context;
use brando_imoveis::db::Database;
use brando_imoveis::models::ListingFilter;
use brando_imoveis::pg_store::PgRepository;
use brando_imoveis::repository::Repository;
use brando_imoveis::tabular::{self, TabularFormat};
use std::env;
use std::path::Path;
use std::time::Duration;

const USAGE: &str = "usage: catalog_tool <import|export> <file.csv|file.xlsx>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let [command, file] = args.as_slice() else {
        anyhow::bail!(USAGE);
    };

    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let db = Database::connect(&database_url, 2, Duration::from_secs(10)).await?;
    let repo = PgRepository::new(db.pool);

    match command.as_str() {
        "import" => import(&repo, Path::new(file)).await,
        "export" => export(&repo, Path::new(file)).await,
        _ => anyhow::bail!(USAGE),
    }
}

async fn import(repo: &PgRepository, path: &Path) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Reading {}", path.display()))?;
    let filename = path.file_name().and_then(|n| n.to_str());

    let parsed = tabular::parse_import(filename, &bytes)?;
    let mut report = repo
        .upsert_by_code(&parsed.rows)
        .await
        .map_err(|e| anyhow::anyhow!("Import failed, nothing was written: {}", e))?;
    report.skipped = parsed.skipped;

    tracing::info!(
        "Imported {} listings ({} created, {} updated), {} rows skipped",
        report.imported,
        report.created,
        report.updated,
        report.skipped
    );
    Ok(())
}

async fn export(repo: &PgRepository, path: &Path) -> anyhow::Result<()> {
    let filename = path.file_name().and_then(|n| n.to_str());
    let format = TabularFormat::detect(filename, &[]);

    let listings = repo
        .list_listings(&ListingFilter::default())
        .await
        .map_err(|e| anyhow::anyhow!("Loading catalog: {}", e))?;
    let bytes = tabular::export(&listings, format).map_err(anyhow::Error::msg)?;

    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Writing {}", path.display()))?;
    tracing::info!("Exported {} listings to {}", listings.len(), path.display());
    Ok(())
}
