//! Common test utilities for scenario tests

#![allow(dead_code)]

use std::io::Cursor;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use farmclassifieds::auth::Principal;
use farmclassifieds::data::{Category, ListingDraft};
use farmclassifieds::service::UploadedFile;
use farmclassifieds::{AppState, config};
use image::{ImageFormat, Rgb, RgbImage};
use sqlx::SqlitePool;
use tempfile::TempDir;

pub const ADMIN_PHONE: &str = "+8801900000000";

/// Application wired against a temporary database and media directory
pub struct TestApp {
    pub state: AppState,
    pub db_path: PathBuf,
    pub media_root: PathBuf,
    pub _temp_dir: TempDir,
}

pub fn test_config(temp_dir: &TempDir) -> config::AppConfig {
    config::AppConfig {
        database: config::DatabaseConfig {
            path: temp_dir.path().join("test.db"),
        },
        storage: config::StorageConfig {
            media: config::MediaStorageConfig {
                backend: config::MediaBackend::Local,
                local_root: temp_dir.path().join("media"),
                bucket: "test-media".to_string(),
                public_url: "https://media.test.example.com".to_string(),
            },
        },
        cloudflare: None,
        listings: config::ListingsConfig {
            default_ad_post_limit: 3,
        },
        media: config::MediaConfig::default(),
        admin: config::AdminConfig {
            phone_number: Some(ADMIN_PHONE.to_string()),
        },
        logging: config::LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
    }
}

impl TestApp {
    /// Create a new test application with default settings
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test application after adjusting the configuration
    pub async fn with_config(adjust: impl FnOnce(&mut config::AppConfig)) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(&temp_dir);
        adjust(&mut config);

        let db_path = config.database.path.clone();
        let media_root = config.storage.media.local_root.clone();
        let state = AppState::new(config).await.unwrap();

        Self {
            state,
            db_path,
            media_root,
            _temp_dir: temp_dir,
        }
    }

    /// The bootstrap superuser
    pub async fn admin(&self) -> Principal {
        let admin = self
            .state
            .db
            .get_user_by_phone(ADMIN_PHONE)
            .await
            .unwrap()
            .unwrap();
        Principal::from(&admin)
    }

    /// Register a seller and return their principal
    pub async fn seller(&self, phone_number: &str) -> Principal {
        let user = self.state.users.register(phone_number).await.unwrap();
        self.state.users.principal(&user.id).await.unwrap()
    }

    /// Register a seller and mark them verified
    pub async fn verified_seller(&self, phone_number: &str) -> Principal {
        let seller = self.seller(phone_number).await;
        let admin = self.admin().await;
        self.state
            .users
            .set_verified_seller(&admin, &seller.id, true)
            .await
            .unwrap();
        self.state.users.principal(&seller.id).await.unwrap()
    }

    /// Second connection for poking at rows directly
    pub async fn raw_pool(&self) -> SqlitePool {
        SqlitePool::connect(&format!("sqlite:{}", self.db_path.display()))
            .await
            .unwrap()
    }

    /// Move a listing's expiry, bypassing the services
    pub async fn set_expires_at(&self, listing_id: &str, expires_at: DateTime<Utc>) {
        let pool = self.raw_pool().await;
        sqlx::query("UPDATE listings SET expires_at = ? WHERE id = ?")
            .bind(expires_at)
            .bind(listing_id)
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;
    }

    pub fn media_file_exists(&self, key: &str) -> bool {
        self.media_root.join(key).exists()
    }
}

pub fn draft(title: &str) -> ListingDraft {
    ListingDraft {
        title: title.to_string(),
        contents: format!("{title} in good condition"),
        category: Category::Goat,
        phone_number: "01711000000".to_string(),
        postcode: "1207".to_string(),
        district: "Dhaka".to_string(),
        price: Some(15000),
    }
}

/// Small PNG with a gradient so the encoders have something to do
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 90])
    });
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .unwrap();
    buffer
}

pub fn png_file(name: &str) -> UploadedFile {
    UploadedFile::new(name, png_bytes(16, 12))
}

pub fn png_files(count: usize) -> Vec<UploadedFile> {
    (0..count).map(|n| png_file(&format!("photo{n}.png"))).collect()
}

/// Number of files currently under the media root
pub fn count_files(root: &std::path::Path) -> usize {
    let Ok(entries) = std::fs::read_dir(root) else {
        return 0;
    };
    entries
        .filter_map(Result::ok)
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() { count_files(&path) } else { 1 }
        })
        .sum()
}
