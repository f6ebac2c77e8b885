//! Image ingestion
//!
//! Turns uploaded files into stored listing images: a re-encoded JPEG plus a
//! best-effort WebP variant. Decoding and encoding run on the blocking pool.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageReader, RgbImage};
use serde::Serialize;

use crate::config::MediaConfig;
use crate::data::{Database, EntityId, ListingImage, MAX_IMAGES_PER_LISTING};
use crate::error::AppError;
use crate::metrics::{IMAGES_INGESTED_TOTAL, IMAGE_VARIANTS_SKIPPED_TOTAL};
use crate::storage::MediaStorage;

const IMAGE_PREFIX: &str = "ad_images";
const WEBP_PREFIX: &str = "ad_images/webp";
const MAX_STEM_CHARS: usize = 50;

/// One file from a multi-file upload field
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Name supplied by the client, used only to derive the stored name
    pub filename: String,
    pub data: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            data,
        }
    }
}

/// Encoded variants of one upload, not yet stored
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    /// Sanitized base name of the original file
    pub stem: String,
    pub jpeg: Vec<u8>,
    pub webp: Option<Vec<u8>>,
}

/// A stored image with its public URLs
#[derive(Debug, Clone, Serialize)]
pub struct ImageAsset {
    #[serde(flatten)]
    pub image: ListingImage,
    pub url: String,
    pub webp_url: Option<String>,
}

/// Base name of `filename` without extension, restricted to `[A-Za-z0-9_-]`.
fn sanitized_stem(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let stem = Path::new(base)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default();

    let cleaned: String = stem
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .take(MAX_STEM_CHARS)
        .collect();

    if cleaned.trim_matches('_').is_empty() {
        "image".to_string()
    } else {
        cleaned
    }
}

fn encode_jpeg(rgb: &RgbImage, quality: u8) -> Result<Vec<u8>, AppError> {
    let mut buffer = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, quality))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("JPEG encoding failed: {}", e)))?;
    Ok(buffer)
}

/// libwebp method 6: slowest, smallest output.
#[cfg(feature = "webp")]
const WEBP_METHOD: i32 = 6;

/// Lossy WebP at `quality`. `None` when libwebp refuses the image.
#[cfg(feature = "webp")]
fn encode_webp(rgb: &RgbImage, quality: u8) -> Option<Vec<u8>> {
    let Ok(mut config) = webp::WebPConfig::new() else {
        tracing::debug!(quality, "WebP encoder unavailable, skipping variant");
        return None;
    };
    config.lossless = 0;
    config.quality = f32::from(quality);
    config.method = WEBP_METHOD;

    match webp::Encoder::from_rgb(rgb.as_raw(), rgb.width(), rgb.height()).encode_advanced(&config) {
        Ok(memory) => Some(memory.to_vec()),
        Err(error) => {
            tracing::debug!(error = ?error, quality, "WebP encoding failed, skipping variant");
            None
        }
    }
}

#[cfg(not(feature = "webp"))]
fn encode_webp(_rgb: &RgbImage, quality: u8) -> Option<Vec<u8>> {
    tracing::debug!(quality, "Built without WebP support, skipping variant");
    None
}

/// Decode `data`, flatten it to 8-bit RGB and encode both variants.
fn encode_variants(data: &[u8], settings: &MediaConfig) -> Result<(Vec<u8>, Option<Vec<u8>>), AppError> {
    let decoded = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| AppError::Decode(e.to_string()))?
        .decode()
        .map_err(|e| AppError::Decode(e.to_string()))?;

    let rgb = decoded.to_rgb8();
    let jpeg = encode_jpeg(&rgb, settings.jpeg_quality)?;
    let webp = if settings.webp_enabled {
        encode_webp(&rgb, settings.webp_quality)
    } else {
        None
    };

    Ok((jpeg, webp))
}

/// Image ingestion service
pub struct ImageService {
    db: Arc<Database>,
    storage: Arc<MediaStorage>,
    settings: MediaConfig,
}

impl ImageService {
    /// Create new image service
    pub fn new(db: Arc<Database>, storage: Arc<MediaStorage>, settings: MediaConfig) -> Self {
        Self {
            db,
            storage,
            settings,
        }
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Batch-level checks run before any file is decoded
    ///
    /// More than six files fails the whole batch. Empty or oversized files
    /// are validation errors. An empty batch is fine.
    pub fn validate_batch(&self, files: &[UploadedFile]) -> Result<(), AppError> {
        if files.len() > MAX_IMAGES_PER_LISTING {
            return Err(AppError::CapacityExceeded {
                max: MAX_IMAGES_PER_LISTING,
            });
        }

        for file in files {
            if file.data.is_empty() {
                return Err(AppError::Validation(format!(
                    "{} is empty",
                    file.filename
                )));
            }
            if file.data.len() > self.settings.max_upload_bytes {
                return Err(AppError::Validation(format!(
                    "{} exceeds {} bytes",
                    file.filename, self.settings.max_upload_bytes
                )));
            }
        }

        Ok(())
    }

    // =========================================================================
    // Processing
    // =========================================================================

    /// Decode and re-encode one upload
    ///
    /// # Errors
    /// `Decode` if the bytes are not a supported image
    pub async fn process(&self, file: &UploadedFile) -> Result<ProcessedImage, AppError> {
        let data = file.data.clone();
        let settings = self.settings.clone();
        let (jpeg, webp) = tokio::task::spawn_blocking(move || encode_variants(&data, &settings))
            .await
            .map_err(|e| AppError::Internal(e.into()))??;

        let stem = sanitized_stem(&file.filename);
        if webp.is_none() {
            IMAGE_VARIANTS_SKIPPED_TOTAL.inc();
            tracing::debug!(file = %stem, "Stored without WebP variant");
        }

        Ok(ProcessedImage { stem, jpeg, webp })
    }

    /// Upload the variants of a processed image
    ///
    /// # Returns
    /// The image record for `listing_id`, not yet persisted
    pub async fn store(
        &self,
        listing_id: &str,
        processed: ProcessedImage,
    ) -> Result<ListingImage, AppError> {
        let id = EntityId::new().0;
        let image_key = format!("{}/{}_{}.jpg", IMAGE_PREFIX, processed.stem, id);
        self.storage
            .upload(&image_key, processed.jpeg, "image/jpeg")
            .await?;

        let webp_key = match processed.webp {
            Some(webp) => {
                let key = format!("{}/{}_{}.webp", WEBP_PREFIX, processed.stem, id);
                if let Err(error) = self.storage.upload(&key, webp, "image/webp").await {
                    self.storage.delete_all([&image_key]).await;
                    return Err(error);
                }
                Some(key)
            }
            None => None,
        };

        Ok(ListingImage {
            id,
            listing_id: listing_id.to_string(),
            image_key,
            webp_key,
            created_at: Utc::now(),
        })
    }

    /// Process and upload a whole batch for one listing
    ///
    /// Every file is decoded before anything is uploaded, so a bad file
    /// leaves no stored assets behind.
    pub async fn prepare_batch(
        &self,
        listing_id: &str,
        files: &[UploadedFile],
    ) -> Result<Vec<ListingImage>, AppError> {
        self.validate_batch(files)?;

        let mut processed = Vec::with_capacity(files.len());
        for file in files {
            processed.push(self.process(file).await?);
        }

        let mut stored = Vec::with_capacity(processed.len());
        for image in processed {
            match self.store(listing_id, image).await {
                Ok(image) => stored.push(image),
                Err(error) => {
                    self.discard(&stored).await;
                    return Err(error);
                }
            }
        }

        Ok(stored)
    }

    /// Remove the stored assets of image records that were never persisted
    /// or whose rows are gone.
    pub async fn discard(&self, images: &[ListingImage]) {
        self.storage
            .delete_all(images.iter().flat_map(ListingImage::storage_keys))
            .await;
    }

    // =========================================================================
    // Ingestion
    // =========================================================================

    /// Attach one uploaded image to an existing listing
    ///
    /// The cap is checked before any decoding, and again by the guarded
    /// insert in case another upload landed meanwhile.
    ///
    /// # Errors
    /// - `NotFound` if the listing does not exist
    /// - `CapacityExceeded` if it already has six images
    /// - `Decode` if the bytes are not an image
    pub async fn ingest(
        &self,
        listing_id: &str,
        file: &UploadedFile,
    ) -> Result<ListingImage, AppError> {
        self.db
            .get_listing(listing_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if self.db.count_listing_images(listing_id).await? >= MAX_IMAGES_PER_LISTING as i64 {
            return Err(AppError::CapacityExceeded {
                max: MAX_IMAGES_PER_LISTING,
            }
            .recorded());
        }

        self.validate_batch(std::slice::from_ref(file))?;
        let processed = self.process(file).await.map_err(AppError::recorded)?;
        let image = self.store(listing_id, processed).await?;

        if let Err(error) = self.db.insert_listing_image(&image).await {
            self.discard(std::slice::from_ref(&image)).await;
            return Err(error.recorded());
        }

        IMAGES_INGESTED_TOTAL.inc();
        tracing::info!(
            listing_id = %listing_id,
            image_id = %image.id,
            webp = image.webp_key.is_some(),
            "Listing image ingested"
        );

        Ok(image)
    }

    /// Public URLs for a stored image
    pub fn asset(&self, image: ListingImage) -> ImageAsset {
        let url = self.storage.get_public_url(&image.image_key);
        let webp_url = image
            .webp_key
            .as_deref()
            .map(|key| self.storage.get_public_url(key));
        ImageAsset {
            image,
            url,
            webp_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Category, Listing, User, listing_lifetime};
    use image::{ImageFormat, Rgba, RgbaImage};
    use tempfile::TempDir;

    fn png_bytes() -> Vec<u8> {
        let image = RgbaImage::from_pixel(8, 6, Rgba([40, 160, 60, 128]));
        let mut buffer = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    async fn create_service(settings: MediaConfig) -> (ImageService, Arc<Database>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(
            Database::connect(&temp_dir.path().join("service-image.db"))
                .await
                .unwrap(),
        );
        let storage = Arc::new(MediaStorage::local(
            temp_dir.path().join("media"),
            "https://media.test.example.com",
        ));
        (
            ImageService::new(db.clone(), storage, settings),
            db,
            temp_dir,
        )
    }

    async fn seed_listing(db: &Database) -> String {
        let now = Utc::now();
        let user = User {
            id: EntityId::new().0,
            phone_number: "01711000000".to_string(),
            ad_post_limit: 3,
            is_verified_seller: false,
            is_active: true,
            is_staff: false,
            is_superuser: false,
            created_at: now,
            updated_at: now,
        };
        db.insert_user(&user).await.unwrap();

        let listing = Listing {
            id: EntityId::new().0,
            owner_id: Some(user.id),
            title: "Fish fry".to_string(),
            contents: "Tilapia fry".to_string(),
            category: Category::Fish,
            phone_number: "01711000000".to_string(),
            postcode: "2200".to_string(),
            district: "Mymensingh".to_string(),
            price: None,
            view_count: 0,
            admin_verified: false,
            public_flagged: false,
            renew_count: 0,
            created_at: now,
            modified_at: now,
            expires_at: now + listing_lifetime(),
        };
        db.insert_listing_with_images(&listing, &[]).await.unwrap();
        listing.id
    }

    #[test]
    fn stems_are_sanitized() {
        assert_eq!(sanitized_stem("photo.png"), "photo");
        assert_eq!(sanitized_stem("C:\\Users\\me\\my goat.JPEG"), "my_goat");
        assert_eq!(sanitized_stem("../../etc/passwd"), "passwd");
        assert_eq!(sanitized_stem("..."), "image");
        assert_eq!(sanitized_stem(""), "image");
    }

    #[tokio::test]
    async fn validate_batch_rejects_seven_files() {
        let (service, _db, _temp_dir) = create_service(MediaConfig::default()).await;
        let files: Vec<_> = (0..7)
            .map(|n| UploadedFile::new(format!("{n}.png"), png_bytes()))
            .collect();

        assert!(matches!(
            service.validate_batch(&files),
            Err(AppError::CapacityExceeded { max: 6 })
        ));
        assert!(service.validate_batch(&files[..6]).is_ok());
        assert!(service.validate_batch(&[]).is_ok());
    }

    #[tokio::test]
    async fn validate_batch_rejects_empty_and_oversized_files() {
        let settings = MediaConfig {
            max_upload_bytes: 16,
            ..MediaConfig::default()
        };
        let (service, _db, _temp_dir) = create_service(settings).await;

        let empty = UploadedFile::new("empty.png", Vec::new());
        assert!(matches!(
            service.validate_batch(&[empty]),
            Err(AppError::Validation(_))
        ));

        let large = UploadedFile::new("large.png", vec![0; 17]);
        assert!(matches!(
            service.validate_batch(&[large]),
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn process_produces_jpeg_primary() {
        let (service, _db, _temp_dir) = create_service(MediaConfig::default()).await;

        let processed = service
            .process(&UploadedFile::new("hen.png", png_bytes()))
            .await
            .unwrap();
        assert_eq!(processed.stem, "hen");
        assert_eq!(
            image::guess_format(&processed.jpeg).unwrap(),
            ImageFormat::Jpeg
        );
        #[cfg(feature = "webp")]
        assert_eq!(
            image::guess_format(processed.webp.as_deref().unwrap()).unwrap(),
            ImageFormat::WebP
        );
    }

    /// 640x480 gradient with deterministic noise, roughly photo-like
    #[cfg(feature = "webp")]
    fn noisy_photo_png() -> Vec<u8> {
        let mut state: u32 = 0x2545_F491;
        let image = image::RgbImage::from_fn(640, 480, |x, y| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let noise = (state % 48) as i32 - 24;
            let channel = |base: u32| (base as i32 + noise).clamp(0, 255) as u8;
            image::Rgb([channel(x * 255 / 640), channel(y * 255 / 480), channel(110)])
        });
        let mut buffer = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[cfg(feature = "webp")]
    #[test]
    fn webp_variant_is_lighter_than_jpeg() {
        let (jpeg, webp) = encode_variants(&noisy_photo_png(), &MediaConfig::default()).unwrap();
        let webp = webp.unwrap();

        assert_eq!(image::guess_format(&webp).unwrap(), ImageFormat::WebP);
        assert!(
            webp.len() < jpeg.len(),
            "webp {} bytes, jpeg {} bytes",
            webp.len(),
            jpeg.len()
        );
    }

    #[cfg(feature = "webp")]
    #[test]
    fn webp_quality_setting_changes_output_size() {
        let png = noisy_photo_png();
        let low = MediaConfig {
            webp_quality: 20,
            ..MediaConfig::default()
        };
        let high = MediaConfig {
            webp_quality: 95,
            ..MediaConfig::default()
        };

        let (_, low_webp) = encode_variants(&png, &low).unwrap();
        let (_, high_webp) = encode_variants(&png, &high).unwrap();
        assert!(low_webp.unwrap().len() < high_webp.unwrap().len());
    }

    #[tokio::test]
    async fn process_rejects_garbage() {
        let (service, _db, _temp_dir) = create_service(MediaConfig::default()).await;

        let result = service
            .process(&UploadedFile::new("fake.jpg", b"not an image".to_vec()))
            .await;
        assert!(matches!(result, Err(AppError::Decode(_))));
    }

    #[tokio::test]
    async fn ingest_without_webp_keeps_primary() {
        let settings = MediaConfig {
            webp_enabled: false,
            ..MediaConfig::default()
        };
        let (service, db, _temp_dir) = create_service(settings).await;
        let listing_id = seed_listing(&db).await;

        let image = service
            .ingest(&listing_id, &UploadedFile::new("duck.png", png_bytes()))
            .await
            .unwrap();
        assert!(image.image_key.starts_with("ad_images/duck_"));
        assert!(image.image_key.ends_with(".jpg"));
        assert!(image.webp_key.is_none());
        assert_eq!(db.count_listing_images(&listing_id).await.unwrap(), 1);

        let asset = service.asset(image);
        assert!(asset.url.starts_with("https://media.test.example.com/ad_images/"));
        assert!(asset.webp_url.is_none());
    }

    #[tokio::test]
    async fn ingest_unknown_listing_is_not_found() {
        let (service, _db, _temp_dir) = create_service(MediaConfig::default()).await;

        let result = service
            .ingest("missing", &UploadedFile::new("a.png", png_bytes()))
            .await;
        assert!(matches!(result, Err(AppError::NotFound)));
    }
}
