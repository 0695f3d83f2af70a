/// Application context and dependency injection
use crate::{
    account::{AccountManager, CredentialGuard},
    config::ServerConfig,
    db,
    error::CoreResult,
    geo::GeoLocator,
    mailer::Mailer,
    rate_limit::RateLimiter,
    reputation::ReputationEngine,
    tokens::TokenStore,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub account_manager: Arc<AccountManager>,
    pub credential_guard: Arc<CredentialGuard>,
    pub token_store: Arc<TokenStore>,
    pub reputation: Arc<ReputationEngine>,
    pub mailer: Arc<Mailer>,
    pub geo: Arc<GeoLocator>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> CoreResult<Self> {
        config.validate()?;

        let db = db::create_pool(&config.storage.core_db, db::DatabaseOptions::default()).await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        let config = Arc::new(config);

        let account_manager = Arc::new(AccountManager::new(db.clone(), config.clone()));
        let token_store = Arc::new(TokenStore::new(db.clone()));
        let reputation = Arc::new(ReputationEngine::new(db.clone()));
        let mailer = Arc::new(Mailer::new(config.email.clone())?);
        let geo = Arc::new(GeoLocator::new(&config.geolocation)?);
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        let credential_guard = Arc::new(CredentialGuard::new(
            db.clone(),
            config.clone(),
            account_manager.clone(),
            geo.clone(),
            mailer.clone(),
        ));

        Ok(Self {
            config,
            db,
            account_manager,
            credential_guard,
            token_store,
            reputation,
            mailer,
            geo,
            rate_limiter,
        })
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        self.config.service.public_url.clone()
    }
}
