//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration files (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    /// Only needed for the R2 media backend
    #[serde(default)]
    pub cloudflare: Option<CloudflareConfig>,
    pub listings: ListingsConfig,
    pub media: MediaConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    pub logging: LoggingConfig,
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub media: MediaStorageConfig,
}

/// Where encoded listing images are written
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaBackend {
    #[default]
    Local,
    R2,
}

/// Media storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MediaStorageConfig {
    #[serde(default)]
    pub backend: MediaBackend,
    /// Root directory for the local backend
    pub local_root: PathBuf,
    /// R2 bucket name for media
    pub bucket: String,
    /// Public URL prefix for stored assets
    /// e.g., "https://media.example.com"
    pub public_url: String,
}

/// Cloudflare credentials
#[derive(Debug, Clone, Deserialize)]
pub struct CloudflareConfig {
    /// Cloudflare account ID
    pub account_id: String,
    /// R2 access key ID
    pub r2_access_key_id: String,
    /// R2 secret access key
    pub r2_secret_access_key: String,
}

/// Listing policy
#[derive(Debug, Clone, Deserialize)]
pub struct ListingsConfig {
    /// Quota given to newly registered sellers (default: 3)
    pub default_ad_post_limit: i64,
}

/// Image encoding settings
#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    /// Primary JPEG quality, 1-100 (default: 75)
    pub jpeg_quality: u8,
    /// Secondary WebP quality, 1-100 (default: 70)
    pub webp_quality: u8,
    /// Produce the secondary WebP variant when the codec is available
    pub webp_enabled: bool,
    /// Largest accepted upload per file, in bytes
    pub max_upload_bytes: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 75,
            webp_quality: 70,
            webp_enabled: true,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Bootstrap administrator
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AdminConfig {
    /// Phone number of the staff superuser created on startup, if any
    pub phone_number: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }

    /// Filter directive used when `RUST_LOG` is not set
    pub fn default_directive(&self) -> String {
        format!("farmclassifieds={}", self.level)
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (FARMCLASSIFIEDS__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("database.path", "data/farmclassifieds.db")?
            .set_default("storage.media.backend", "local")?
            .set_default("storage.media.local_root", "data/media")?
            .set_default("storage.media.bucket", "farmclassifieds-media")?
            .set_default("storage.media.public_url", "/media")?
            .set_default("listings.default_ad_post_limit", 3)?
            .set_default("media.jpeg_quality", 75)?
            .set_default("media.webp_quality", 70)?
            .set_default("media.webp_enabled", true)?
            .set_default("media.max_upload_bytes", 10 * 1024 * 1024)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("FARMCLASSIFIEDS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app_config: Self = config.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::AppError> {
        use crate::error::AppError;

        for (name, quality) in [
            ("media.jpeg_quality", self.media.jpeg_quality),
            ("media.webp_quality", self.media.webp_quality),
        ] {
            if !(1..=100).contains(&quality) {
                return Err(AppError::Config(format!(
                    "{name} must be between 1 and 100"
                )));
            }
        }

        if self.media.max_upload_bytes == 0 {
            return Err(AppError::Config(
                "media.max_upload_bytes must be greater than 0".to_string(),
            ));
        }

        if self.listings.default_ad_post_limit < 0 {
            return Err(AppError::Config(
                "listings.default_ad_post_limit must not be negative".to_string(),
            ));
        }

        if !["pretty", "json"]
            .iter()
            .any(|format| self.logging.format.eq_ignore_ascii_case(format))
        {
            return Err(AppError::Config(format!(
                "logging.format must be \"pretty\" or \"json\", got {:?}",
                self.logging.format
            )));
        }

        if self.storage.media.backend == MediaBackend::R2 && self.cloudflare.is_none() {
            return Err(AppError::Config(
                "cloudflare credentials are required when storage.media.backend=r2".to_string(),
            ));
        }

        Ok(())
    }
}
