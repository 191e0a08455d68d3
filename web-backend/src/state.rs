// Shared application state
// Built once in main and handed to every handler; the schema is created
// inline at startup.

use crate::config::AppConfig;
use crate::orchestrator::Orchestrator;
use bugwise_core::{AiConfig, GitCloner, ScanConfig, ScanEngine};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Sqlite>,
    pub config: AppConfig,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let db = init_db(&config.database_url, 5).await?;

        let scan_config = ScanConfig {
            temp_root: config.scan_temp_dir.clone(),
            ai: config.huggingface_api_key.clone().map(AiConfig::new),
            ..ScanConfig::default()
        };
        let cloner = Arc::new(GitCloner::new(config.clone_timeout));
        let engine = Arc::new(ScanEngine::new(scan_config, cloner)?);
        let orchestrator = Arc::new(Orchestrator::new(db.clone(), engine));

        Ok(Self {
            db,
            config,
            orchestrator,
        })
    }
}

pub async fn init_db(database_url: &str, max_connections: u32) -> anyhow::Result<Pool<Sqlite>> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scans (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            repository_url TEXT NOT NULL,
            repository_name TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT,
            total_findings INTEGER NOT NULL DEFAULT 0,
            files_scanned INTEGER NOT NULL DEFAULT 0,
            results TEXT,
            error TEXT
        )
        "#,
    )
    .execute(&pool)
    .await
    .map_err(|e| anyhow::anyhow!("Failed to create tables: {}", e))?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_scans_owner_created
         ON scans (owner_id, created_at DESC)",
    )
    .execute(&pool)
    .await?;

    Ok(pool)
}
