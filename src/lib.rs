//! FarmClassifieds - listing lifecycle and image ingestion for an
//! agricultural classifieds marketplace
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Listing lifecycle (quota, moderation, expiry, renewal)   │
//! │  - Image ingestion (JPEG + WebP variants)                   │
//! │  - Seller accounts                                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - SQLite (sqlx)                                            │
//! │  - Local or R2 media storage                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Routing, rendering and login are left to the host application, which
//! builds a [`auth::Principal`] per request and calls the services.
//!
//! # Modules
//!
//! - `service`: Business logic layer
//! - `data`: Database layer and models
//! - `storage`: Media storage
//! - `auth`: Caller identity and view sessions
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod service;
pub mod storage;

use std::sync::Arc;

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// Media storage (local or Cloudflare R2)
    pub storage: Arc<storage::MediaStorage>,

    pub images: Arc<service::ImageService>,
    pub listings: Arc<service::ListingService>,
    pub users: Arc<service::UserService>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to SQLite database
    /// 2. Initialize media storage
    /// 3. Wire services
    /// 4. Ensure the configured admin user exists
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Connect to SQLite database
        let db = Arc::new(data::Database::connect(&config.database.path).await?);
        tracing::info!("Database connected");

        // 2. Initialize media storage
        let storage = Arc::new(
            storage::MediaStorage::new(&config.storage.media, config.cloudflare.as_ref()).await?,
        );
        tracing::info!(backend = ?config.storage.media.backend, "Media storage initialized");

        // 3. Wire services
        let images = Arc::new(service::ImageService::new(
            db.clone(),
            storage.clone(),
            config.media.clone(),
        ));
        let listings = Arc::new(service::ListingService::new(
            db.clone(),
            storage.clone(),
            images.clone(),
        ));
        let users = Arc::new(service::UserService::new(
            db.clone(),
            storage.clone(),
            config.listings.default_ad_post_limit,
        ));

        // 4. Initialize admin user
        Self::ensure_admin_user(&users, &config).await?;

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            db,
            storage,
            images,
            listings,
            users,
        })
    }

    /// Ensure the configured admin phone number is a staff superuser
    async fn ensure_admin_user(
        users: &service::UserService,
        config: &config::AppConfig,
    ) -> Result<(), error::AppError> {
        let Some(phone_number) = config
            .admin
            .phone_number
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        else {
            tracing::debug!("No admin phone number configured");
            return Ok(());
        };

        let admin = users.ensure_superuser(phone_number).await?;
        tracing::info!(user_id = %admin.id, "Admin user ready");
        Ok(())
    }
}
