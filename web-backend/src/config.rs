// Environment configuration
// One explicit object read at startup and passed down; nothing reads the
// environment after this.

use anyhow::Context;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite connection string, e.g. `sqlite://bugwise.db`.
    pub database_url: String,
    /// HS256 key the auth collaborator signs tokens with.
    pub jwt_secret: String,
    pub bind_address: String,
    pub cors_origin: String,
    /// Absent key disables the AI augmentation path entirely.
    pub huggingface_api_key: Option<String>,
    /// Scan workspaces go under the system temp dir when unset.
    pub scan_temp_dir: Option<PathBuf>,
    pub clone_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://bugwise.db".to_string());
        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        let cors_origin =
            std::env::var("CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_string());
        let huggingface_api_key = std::env::var("HUGGINGFACE_API_KEY")
            .ok()
            .filter(|key| !key.is_empty());
        let scan_temp_dir = std::env::var("SCAN_TEMP_DIR").ok().map(PathBuf::from);
        let clone_timeout = std::env::var("CLONE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(60));

        Ok(Self {
            database_url,
            jwt_secret,
            bind_address,
            cors_origin,
            huggingface_api_key,
            scan_temp_dir,
            clone_timeout,
        })
    }
}
