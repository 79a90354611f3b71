use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::auth::repo::{memory::MemoryUserStore, PgUserStore, UserStore};
use crate::config::{AppConfig, JwtConfig};
use crate::recipes::{
    memory::MemoryCatalogStore,
    repo::{CatalogStore, PgCatalogStore},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub catalog: Arc<dyn CatalogStore>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let Some(database_url) = config.database_url.clone() else {
            warn!("DATABASE_URL not set; using in-memory stores");
            return Ok(Self::in_memory(config));
        };

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&database_url)
            .await
            .context("connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run migrations")?;
        info!("database migrations applied");

        Ok(Self::from_parts(
            Arc::new(config),
            Arc::new(PgUserStore::new(db.clone())),
            Arc::new(PgCatalogStore::new(db)),
        ))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        catalog: Arc<dyn CatalogStore>,
    ) -> Self {
        Self {
            config,
            users,
            catalog,
        }
    }

    pub fn in_memory(config: AppConfig) -> Self {
        Self::from_parts(
            Arc::new(config),
            Arc::new(MemoryUserStore::new()),
            Arc::new(MemoryCatalogStore::new()),
        )
    }

    /// In-memory state with a fixed test configuration.
    pub fn fake() -> Self {
        Self::in_memory(AppConfig {
            database_url: None,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
            },
            password_min_length: 5,
            host: "127.0.0.1".into(),
            port: 0,
        })
    }
}
