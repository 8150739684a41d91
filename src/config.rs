use serde::Deserialize;

/// Where the catalog lives.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum StorageBackend {
    /// PostgreSQL, reached through `database_url`.
    Postgres,
    /// Process-local catalog, lost on restart. Useful for demos and tests.
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub storage: StorageBackend,
    pub database_url: String,
    pub port: u16,
    pub admin_password: String,
    pub db_max_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub session_ttl_secs: u64,
    pub max_upload_bytes: usize,
    pub whatsapp_number: String,
    pub static_dir: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let storage = match std::env::var("STORAGE")
            .unwrap_or_else(|_| "postgres".to_string())
            .trim()
            .to_lowercase()
            .as_str()
        {
            "postgres" | "postgresql" | "" => StorageBackend::Postgres,
            "memory" => StorageBackend::Memory,
            other => anyhow::bail!("STORAGE must be 'postgres' or 'memory', got '{}'", other),
        };

        let database_url = match storage {
            StorageBackend::Memory => String::new(),
            StorageBackend::Postgres => std::env::var("DATABASE_URL")
                .or_else(|_| database_url_from_parts())
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DATABASE_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
        };

        let config = Self {
            storage,
            database_url,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            admin_password: std::env::var("ADMIN_PASSWORD")
                .map_err(|_| anyhow::anyhow!("ADMIN_PASSWORD environment variable required"))
                .and_then(|pass| {
                    if pass.trim().is_empty() {
                        anyhow::bail!("ADMIN_PASSWORD cannot be empty");
                    }
                    Ok(pass)
                })?,
            db_max_connections: env_number("DB_MAX_CONNECTIONS", 10)?,
            db_acquire_timeout_secs: env_number("DB_ACQUIRE_TIMEOUT_SECS", 5)?,
            session_ttl_secs: env_number("SESSION_TTL_SECS", 8 * 60 * 60)?,
            max_upload_bytes: env_number("MAX_UPLOAD_BYTES", 16 * 1024 * 1024)?,
            whatsapp_number: std::env::var("WHATSAPP_NUMBER")
                .unwrap_or_else(|_| "5548991054216".to_string())
                .chars()
                .filter(|c| c.is_ascii_digit())
                .collect(),
            static_dir: std::env::var("STATIC_DIR").unwrap_or_else(|_| "static".to_string()),
        };

        if config.whatsapp_number.is_empty() {
            anyhow::bail!("WHATSAPP_NUMBER must contain digits");
        }

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Storage backend: {:?}", config.storage);
        if config.storage == StorageBackend::Postgres {
            tracing::debug!(
                "Database URL: {}...",
                config.database_url.chars().take(20).collect::<String>()
            );
        }
        tracing::debug!("Server Port: {}", config.port);
        tracing::debug!("Session TTL: {}s", config.session_ttl_secs);

        Ok(config)
    }
}

/// Builds a connection URL from `DB_USER`, `DB_PASS`, `DB_HOST` and `DB_NAME`.
///
/// The password is percent-encoded by `url`, so credentials with `@` or `/` survive.
fn database_url_from_parts() -> anyhow::Result<String> {
    let var = |name: &str| {
        std::env::var(name)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL or {} environment variable required", name))
    };

    let host = var("DB_HOST")?;
    let name = var("DB_NAME")?;
    let user = var("DB_USER")?;
    let pass = std::env::var("DB_PASS").unwrap_or_default();

    let mut url = url::Url::parse(&format!("postgres://{}/{}", host, name))
        .map_err(|e| anyhow::anyhow!("DB_HOST/DB_NAME do not form a valid URL: {}", e))?;
    url.set_username(&user)
        .map_err(|_| anyhow::anyhow!("DB_USER cannot be used in a connection URL"))?;
    if !pass.is_empty() {
        url.set_password(Some(&pass))
            .map_err(|_| anyhow::anyhow!("DB_PASS cannot be used in a connection URL"))?;
    }

    Ok(url.to_string())
}

fn env_number<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a positive number", name)),
        _ => Ok(default),
    }
}

impl Config {
    /// Configuration for tests and local tooling: in-memory storage, fixed password.
    pub fn for_tests(admin_password: &str) -> Self {
        Self {
            storage: StorageBackend::Memory,
            database_url: String::new(),
            port: 0,
            admin_password: admin_password.to_string(),
            db_max_connections: 1,
            db_acquire_timeout_secs: 1,
            session_ttl_secs: 60,
            max_upload_bytes: 4 * 1024 * 1024,
            whatsapp_number: "5548991054216".to_string(),
            static_dir: "static".to_string(),
        }
    }
}
