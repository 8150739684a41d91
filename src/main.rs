use brando_imoveis::config::{Config, StorageBackend};
use brando_imoveis::db::Database;
use brando_imoveis::handlers::AppState;
use brando_imoveis::memory_store::MemoryRepository;
use brando_imoveis::pg_store::PgRepository;
use brando_imoveis::repository::Repository;
use brando_imoveis::routes;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point: logging, configuration, storage, then the HTTP server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "brando_imoveis=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let repo: Arc<dyn Repository> = match config.storage {
        StorageBackend::Postgres => {
            let db = Database::new(&config).await?;
            tracing::info!("Database connection pool established");
            Arc::new(PgRepository::new(db.pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; the catalog is lost on restart");
            Arc::new(MemoryRepository::new())
        }
    };

    let port = config.port;
    let state = Arc::new(AppState::new(repo, config));

    // Rate limiting: 10 req/sec per IP, burst of 20, on public writes and login
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    let app = routes::router_with(state, |writes| {
        writes.layer(GovernorLayer {
            config: governor_conf,
        })
    });

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
