pub mod cache;
pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod middleware;
pub mod models;
pub mod redis_client;
pub mod services;
pub mod store;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::cache::QuoteCache;
use crate::services::audit::AuditLog;
use crate::services::booking::BookingService;
use crate::services::clock::{Clock, SystemClock};
use crate::services::notification::{HttpNotificationGateway, LogNotificationGateway, NotificationGateway};
use crate::services::quotes::QuoteService;
use crate::services::sweeper::ExpirationSweeper;
use crate::store::{AuditStore, BookingStore, MemoryStore, ReferenceData};

// Shared state for the whole application
#[derive(Clone)]
pub struct AppState {
    pub config: config::Config,
    pub bookings: Arc<BookingService>,
    pub quotes: Arc<QuoteService>,
    pub sweeper: Arc<ExpirationSweeper>,
    /// `None` when running on the in-memory store.
    pub db: Option<database::Database>,
    pub redis: Option<redis_client::RedisClient>,
}

impl AppState {
    /// Connects to whatever the configuration points at. Without a database
    /// URL the engine runs on the in-memory store; without Redis quotes are
    /// simply not cached.
    pub async fn new(config: config::Config) -> anyhow::Result<Arc<Self>> {
        let notifier: Arc<dyn NotificationGateway> =
            match HttpNotificationGateway::from_config(&config.notification, &config.circuit_breaker)? {
                Some(gateway) => {
                    info!("Notifications go to the configured webhook");
                    Arc::new(gateway)
                }
                None => {
                    warn!("No notification webhook configured, lifecycle events are only logged");
                    Arc::new(LogNotificationGateway)
                }
            };

        let redis = match &config.redis.url {
            Some(url) => match redis_client::RedisClient::connect(url).await {
                Ok(redis) => {
                    info!("Redis connected");
                    Some(redis)
                }
                Err(e) => {
                    warn!("Redis unavailable, quote caching disabled: {}", e);
                    None
                }
            },
            None => None,
        };
        let cache = redis
            .clone()
            .map(|redis| QuoteCache::new(redis, config.redis.quote_ttl_seconds));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let state = match &config.database.url {
            Some(url) => {
                let db = database::Database::connect(url, config.database.pool_size).await?;
                info!("Database connected");
                db.migrate().await?;
                let store = db.store();
                Self {
                    db: Some(db),
                    redis,
                    ..Self::assemble(config.clone(), store, cache, notifier, clock)
                }
            }
            None => {
                warn!("DATABASE_URL is not set, running on the in-memory store (development only)");
                Self {
                    redis,
                    ..Self::assemble(config.clone(), MemoryStore::new(), cache, notifier, clock)
                }
            }
        };

        Ok(Arc::new(state))
    }

    /// Wires the services around one store implementation.
    pub fn assemble<S>(
        config: config::Config,
        store: S,
        cache: Option<QuoteCache>,
        notifier: Arc<dyn NotificationGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self
    where
        S: BookingStore + ReferenceData + AuditStore + Clone + 'static,
    {
        let booking_store: Arc<dyn BookingStore> = Arc::new(store.clone());
        let reference: Arc<dyn ReferenceData> = Arc::new(store.clone());
        let audit_store: Arc<dyn AuditStore> = Arc::new(store);

        let quotes = Arc::new(QuoteService::new(reference, cache, clock.clone()));
        let audit = Arc::new(AuditLog::new(audit_store, clock.clone()));
        let bookings = Arc::new(BookingService::new(
            booking_store.clone(),
            quotes.clone(),
            audit,
            notifier.clone(),
            clock,
            config.booking.clone(),
        ));
        let sweeper = Arc::new(ExpirationSweeper::new(
            booking_store,
            bookings.clone(),
            notifier,
            config.sweeper.clone(),
        ));

        Self { config, bookings, quotes, sweeper, db: None, redis: None }
    }
}

/// The full HTTP surface.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Travel Booking API v1.0" }))
        .route("/health", get(controllers::health))
        .nest("/api", controllers::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
