//! Media storage for listing images
//!
//! Handles upload, delete, and URL generation for stored images.
//! The R2 backend serves files via a Custom Domain (CDN); the local backend
//! writes below a root directory and is what tests and small installs use.

use std::path::{Component, Path, PathBuf};

use aws_sdk_s3::Client as S3Client;

use crate::config::{CloudflareConfig, MediaBackend, MediaStorageConfig};
use crate::error::AppError;

enum Backend {
    Local { root: PathBuf },
    R2 { client: S3Client, bucket: String },
}

/// Media storage service
///
/// Stores encoded images and returns public URLs.
pub struct MediaStorage {
    backend: Backend,
    /// Public URL base
    /// e.g., "https://media.example.com"
    public_url: String,
}

/// Reject keys that could escape the storage root.
fn validate_key(key: &str) -> Result<(), AppError> {
    let path = Path::new(key);
    let is_plain_relative = !key.is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));

    if !is_plain_relative {
        return Err(AppError::Storage(format!("invalid storage key: {key}")));
    }
    Ok(())
}

impl MediaStorage {
    /// Create media storage for the configured backend
    ///
    /// # Arguments
    /// * `config` - Storage configuration
    /// * `cloudflare` - Cloudflare credentials, required for the R2 backend
    ///
    /// # Errors
    /// Returns error if the R2 backend is selected without credentials
    pub async fn new(
        config: &MediaStorageConfig,
        cloudflare: Option<&CloudflareConfig>,
    ) -> Result<Self, AppError> {
        match config.backend {
            MediaBackend::Local => Ok(Self::local(&config.local_root, &config.public_url)),
            MediaBackend::R2 => {
                let cloudflare = cloudflare.ok_or_else(|| {
                    AppError::Config(
                        "cloudflare credentials are required for the r2 media backend".to_string(),
                    )
                })?;
                Ok(Self::r2(config, cloudflare))
            }
        }
    }

    /// Storage rooted at a local directory
    pub fn local(root: impl Into<PathBuf>, public_url: &str) -> Self {
        Self {
            backend: Backend::Local { root: root.into() },
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    fn r2(config: &MediaStorageConfig, cloudflare: &CloudflareConfig) -> Self {
        use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};

        // R2 endpoint: https://{account_id}.r2.cloudflarestorage.com
        let endpoint = format!("https://{}.r2.cloudflarestorage.com", cloudflare.account_id);

        let credentials = Credentials::new(
            &cloudflare.r2_access_key_id,
            &cloudflare.r2_secret_access_key,
            None,
            None,
            "farmclassifieds-r2",
        );

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .http_client(super::build_r2_http_client())
            .region(Region::new("auto"))
            .endpoint_url(&endpoint)
            .credentials_provider(credentials)
            .build();

        Self {
            backend: Backend::R2 {
                client: S3Client::from_conf(s3_config),
                bucket: config.bucket.clone(),
            },
            public_url: config.public_url.trim_end_matches('/').to_string(),
        }
    }

    /// Upload an encoded image
    ///
    /// # Arguments
    /// * `key` - Storage key (path) for the file
    /// * `data` - File contents
    /// * `content_type` - MIME type
    ///
    /// # Returns
    /// Public URL for the uploaded file
    ///
    /// # Example
    /// ```ignore
    /// let url = storage.upload(
    ///     "ad_images/goat_01J9Z.jpg",
    ///     jpeg_bytes,
    ///     "image/jpeg"
    /// ).await?;
    /// // Returns: https://media.example.com/ad_images/goat_01J9Z.jpg
    /// ```
    pub async fn upload(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<String, AppError> {
        validate_key(key)?;

        match &self.backend {
            Backend::Local { root } => {
                let path = root.join(key);
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        AppError::Storage(format!("failed to create {}: {}", parent.display(), e))
                    })?;
                }
                tokio::fs::write(&path, data).await.map_err(|e| {
                    AppError::Storage(format!("failed to write {}: {}", path.display(), e))
                })?;
            }
            Backend::R2 { client, bucket } => {
                use aws_sdk_s3::primitives::ByteStream;

                client
                    .put_object()
                    .bucket(bucket)
                    .key(key)
                    .body(ByteStream::from(data))
                    .content_type(content_type)
                    .cache_control("public, max-age=31536000") // 1 year
                    .send()
                    .await
                    .map_err(|e| AppError::Storage(format!("R2 upload failed: {}", e)))?;
            }
        }

        tracing::debug!(key = %key, content_type = %content_type, "Stored media object");
        Ok(self.get_public_url(key))
    }

    /// Delete a stored file
    ///
    /// Deleting a key that does not exist is not an error.
    pub async fn delete(&self, key: &str) -> Result<(), AppError> {
        validate_key(key)?;

        match &self.backend {
            Backend::Local { root } => match tokio::fs::remove_file(root.join(key)).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(AppError::Storage(format!("failed to delete {}: {}", key, e))),
            },
            Backend::R2 { client, bucket } => {
                client
                    .delete_object()
                    .bucket(bucket)
                    .key(key)
                    .send()
                    .await
                    .map_err(|e| AppError::Storage(format!("R2 delete failed: {}", e)))?;
                Ok(())
            }
        }
    }

    /// Best-effort removal of several keys; failures are logged, not returned.
    pub async fn delete_all<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for key in keys {
            let key = key.as_ref();
            if let Err(error) = self.delete(key).await {
                tracing::warn!(key = %key, error = %error, "Failed to delete stored media");
            }
        }
    }

    /// Whether an object is stored under `key`
    pub async fn exists(&self, key: &str) -> Result<bool, AppError> {
        validate_key(key)?;

        match &self.backend {
            Backend::Local { root } => tokio::fs::try_exists(root.join(key))
                .await
                .map_err(|e| AppError::Storage(format!("failed to stat {}: {}", key, e))),
            Backend::R2 { client, bucket } => {
                match client.head_object().bucket(bucket).key(key).send().await {
                    Ok(_) => Ok(true),
                    Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => {
                        Ok(false)
                    }
                    Err(e) => Err(AppError::Storage(format!("R2 head failed: {}", e))),
                }
            }
        }
    }

    /// Get public URL for a storage key
    pub fn get_public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_url, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn local_backend_upload_exists_delete() {
        let temp_dir = TempDir::new().unwrap();
        let storage = MediaStorage::local(temp_dir.path(), "https://media.example.com/");

        let url = storage
            .upload("ad_images/webp/cow_1.webp", vec![1, 2, 3], "image/webp")
            .await
            .unwrap();
        assert_eq!(url, "https://media.example.com/ad_images/webp/cow_1.webp");
        assert!(storage.exists("ad_images/webp/cow_1.webp").await.unwrap());

        storage.delete("ad_images/webp/cow_1.webp").await.unwrap();
        assert!(!storage.exists("ad_images/webp/cow_1.webp").await.unwrap());

        // Idempotent
        storage.delete("ad_images/webp/cow_1.webp").await.unwrap();
    }

    #[tokio::test]
    async fn keys_cannot_escape_root() {
        let temp_dir = TempDir::new().unwrap();
        let storage = MediaStorage::local(temp_dir.path(), "/media");

        for key in ["../escape.jpg", "/etc/passwd", "", "ad_images/../../x.jpg"] {
            let result = storage.upload(key, vec![0], "image/jpeg").await;
            assert!(matches!(result, Err(AppError::Storage(_))), "{key}");
        }
    }
}
