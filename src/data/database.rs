//! SQLite database operations
//!
//! All database access goes through this module.
//! Cascading deletes are spelled out here rather than left to the schema, and
//! every write that depends on a listing's current state is either a single
//! statement or a compare-and-swap on the fields it read.

use chrono::{DateTime, Utc};
use sqlx::{Pool, QueryBuilder, Sqlite, SqlitePool};
use std::path::Path;

use super::models::*;
use crate::error::AppError;

/// Message raised by the `listing_images_limit` trigger.
const IMAGE_LIMIT_TRIGGER_MESSAGE: &str = "listing_image_limit_reached";

fn map_image_insert_error(error: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_error) = &error {
        if db_error.message().contains(IMAGE_LIMIT_TRIGGER_MESSAGE) {
            return AppError::CapacityExceeded {
                max: MAX_IMAGES_PER_LISTING,
            };
        }
    }
    AppError::Database(error)
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db_error) if db_error.is_unique_violation())
}

/// `%value%` for a LIKE clause using `\` as the escape character.
fn like_pattern(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('%');
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// What an explicit cascade removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeDeletion {
    pub listings_removed: u64,
    pub images_removed: u64,
    /// Stored assets that belonged to the removed images
    pub storage_keys: Vec<String>,
}

/// Result of changing a seller's verified flag
#[derive(Debug, Clone)]
pub struct VerifiedSellerUpdate {
    pub user: User,
    /// Listings approved because the seller became verified
    pub auto_approved: u64,
}

/// Database connection pool wrapper
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Arguments
    /// * `path` - Path to SQLite database file
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        // Foreign keys are on by default for sqlx SQLite connections.
        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }

    /// Raw pool access for tests that bypass the guarded writers.
    #[cfg(test)]
    pub(crate) fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Insert a new user
    ///
    /// # Errors
    /// `Validation` if the phone number is already registered
    pub async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, phone_number, ad_post_limit, is_verified_seller,
                is_active, is_staff, is_superuser, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.phone_number)
        .bind(user.ad_post_limit)
        .bind(user.is_verified_seller)
        .bind(user.is_active)
        .bind(user.is_staff)
        .bind(user.is_superuser)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            if is_unique_violation(&error) {
                AppError::Validation("phone number is already registered".to_string())
            } else {
                AppError::Database(error)
            }
        })?;

        Ok(())
    }

    /// Get user by ID
    pub async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Get user by login phone number
    pub async fn get_user_by_phone(&self, phone_number: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE phone_number = ?")
            .bind(phone_number)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Grant staff and superuser flags
    pub async fn promote_to_superuser(
        &self,
        id: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE users SET is_staff = 1, is_superuser = 1, updated_at = ? WHERE id = ?",
        )
        .bind(updated_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Set a seller's posting quota
    ///
    /// # Returns
    /// Updated user, or None if the user does not exist
    pub async fn update_ad_post_limit(
        &self,
        id: &str,
        ad_post_limit: i64,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<User>, AppError> {
        let result = sqlx::query("UPDATE users SET ad_post_limit = ?, updated_at = ? WHERE id = ?")
            .bind(ad_post_limit)
            .bind(updated_at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_user(id).await
    }

    /// Change a seller's verified flag
    ///
    /// A false -> true transition approves every listing of that seller still
    /// awaiting moderation and clears their spam flags, in the same
    /// transaction. Other changes touch only the user row.
    ///
    /// # Returns
    /// None if the user does not exist
    pub async fn set_verified_seller(
        &self,
        id: &str,
        verified: bool,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<VerifiedSellerUpdate>, AppError> {
        let mut tx = self.pool.begin().await?;

        let mut auto_approved = 0;
        if verified {
            // Only a row that was unverified matches, so this doubles as the
            // transition check.
            let transitioned = sqlx::query(
                "UPDATE users SET is_verified_seller = 1, updated_at = ? WHERE id = ? AND is_verified_seller = 0",
            )
            .bind(updated_at)
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
                > 0;

            if transitioned {
                auto_approved = sqlx::query(
                    r#"
                    UPDATE listings
                    SET admin_verified = 1, public_flagged = 0
                    WHERE owner_id = ? AND admin_verified = 0
                    "#,
                )
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            }
        } else {
            sqlx::query("UPDATE users SET is_verified_seller = 0, updated_at = ? WHERE id = ?")
                .bind(updated_at)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        let Some(user) = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        tx.commit().await?;

        Ok(Some(VerifiedSellerUpdate {
            user,
            auto_approved,
        }))
    }

    /// Delete a user with every listing and image they own
    ///
    /// # Returns
    /// What was removed, or None if the user does not exist
    ///
    /// # Errors
    /// `ProtectedUser` for superusers; nothing is deleted
    pub async fn delete_user_cascade(&self, id: &str) -> Result<Option<CascadeDeletion>, AppError> {
        let mut tx = self.pool.begin().await?;

        let is_superuser: Option<bool> =
            sqlx::query_scalar("SELECT is_superuser FROM users WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        match is_superuser {
            None => return Ok(None),
            Some(true) => return Err(AppError::ProtectedUser),
            Some(false) => {}
        }

        let images = sqlx::query_as::<_, ListingImage>(
            r#"
            SELECT i.* FROM listing_images i
            INNER JOIN listings l ON l.id = i.listing_id
            WHERE l.owner_id = ?
            "#,
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        let images_removed = sqlx::query(
            "DELETE FROM listing_images WHERE listing_id IN (SELECT id FROM listings WHERE owner_id = ?)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let listings_removed = sqlx::query("DELETE FROM listings WHERE owner_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let users_removed = sqlx::query("DELETE FROM users WHERE id = ? AND is_superuser = 0")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if users_removed == 0 {
            return Ok(None);
        }

        tx.commit().await?;

        Ok(Some(CascadeDeletion {
            listings_removed,
            images_removed,
            storage_keys: images
                .iter()
                .flat_map(|image| image.storage_keys().map(str::to_string))
                .collect(),
        }))
    }

    // =========================================================================
    // Listings
    // =========================================================================

    /// Count listings owned by a user, whatever their moderation state
    pub async fn count_listings_by_owner(&self, owner_id: &str) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM listings WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Insert a listing together with its first images
    ///
    /// Either everything is written or nothing is.
    pub async fn insert_listing_with_images(
        &self,
        listing: &Listing,
        images: &[ListingImage],
    ) -> Result<(), AppError> {
        if images.len() > MAX_IMAGES_PER_LISTING {
            return Err(AppError::CapacityExceeded {
                max: MAX_IMAGES_PER_LISTING,
            });
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO listings (
                id, owner_id, title, contents, category, phone_number, postcode,
                district, price, view_count, admin_verified, public_flagged,
                renew_count, created_at, modified_at, expires_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&listing.id)
        .bind(&listing.owner_id)
        .bind(&listing.title)
        .bind(&listing.contents)
        .bind(listing.category)
        .bind(&listing.phone_number)
        .bind(&listing.postcode)
        .bind(&listing.district)
        .bind(listing.price)
        .bind(listing.view_count)
        .bind(listing.admin_verified)
        .bind(listing.public_flagged)
        .bind(listing.renew_count)
        .bind(listing.created_at)
        .bind(listing.modified_at)
        .bind(listing.expires_at)
        .execute(&mut *tx)
        .await?;

        for image in images {
            sqlx::query(
                "INSERT INTO listing_images (id, listing_id, image_key, webp_key, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&image.id)
            .bind(&image.listing_id)
            .bind(&image.image_key)
            .bind(&image.webp_key)
            .bind(image.created_at)
            .execute(&mut *tx)
            .await
            .map_err(map_image_insert_error)?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Get listing by ID
    pub async fn get_listing(&self, id: &str) -> Result<Option<Listing>, AppError> {
        let listing = sqlx::query_as::<_, Listing>("SELECT * FROM listings WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(listing)
    }

    /// Get listing by ID only if `owner_id` owns it
    pub async fn get_owned_listing(
        &self,
        id: &str,
        owner_id: &str,
    ) -> Result<Option<Listing>, AppError> {
        let listing =
            sqlx::query_as::<_, Listing>("SELECT * FROM listings WHERE id = ? AND owner_id = ?")
                .bind(id)
                .bind(owner_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(listing)
    }

    /// Replace the content fields of an owned listing and attach more images
    ///
    /// Expiry, renewals, moderation flags and the view counter are left
    /// alone. The image cap covers old and new images together.
    ///
    /// # Returns
    /// Updated listing, or None if `owner_id` does not own it
    pub async fn update_listing_content(
        &self,
        id: &str,
        owner_id: &str,
        draft: &ListingDraft,
        modified_at: DateTime<Utc>,
        new_images: &[ListingImage],
    ) -> Result<Option<Listing>, AppError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE listings
            SET title = ?, contents = ?, category = ?, phone_number = ?,
                postcode = ?, district = ?, price = ?, modified_at = ?
            WHERE id = ? AND owner_id = ?
            "#,
        )
        .bind(&draft.title)
        .bind(&draft.contents)
        .bind(draft.category)
        .bind(&draft.phone_number)
        .bind(&draft.postcode)
        .bind(&draft.district)
        .bind(draft.price)
        .bind(modified_at)
        .bind(id)
        .bind(owner_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }

        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM listing_images WHERE listing_id = ?",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        if existing as usize + new_images.len() > MAX_IMAGES_PER_LISTING {
            return Err(AppError::CapacityExceeded {
                max: MAX_IMAGES_PER_LISTING,
            });
        }

        for image in new_images {
            sqlx::query(
                "INSERT INTO listing_images (id, listing_id, image_key, webp_key, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&image.id)
            .bind(id)
            .bind(&image.image_key)
            .bind(&image.webp_key)
            .bind(image.created_at)
            .execute(&mut *tx)
            .await
            .map_err(map_image_insert_error)?;
        }

        let listing = sqlx::query_as::<_, Listing>("SELECT * FROM listings WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(listing))
    }

    /// All listings of one owner, newest first
    pub async fn get_listings_by_owner(&self, owner_id: &str) -> Result<Vec<Listing>, AppError> {
        let listings = sqlx::query_as::<_, Listing>(
            "SELECT * FROM listings WHERE owner_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(listings)
    }

    /// Publicly visible listings matching `filter`, newest first
    ///
    /// Visible means verified and expiring after `now`.
    pub async fn get_public_listings(
        &self,
        filter: &ListingFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<Listing>, AppError> {
        let mut query_builder = QueryBuilder::<Sqlite>::new(
            "SELECT * FROM listings WHERE admin_verified = 1 AND expires_at > ",
        );
        query_builder.push_bind(now);

        if let Some(query) = non_empty(filter.query.as_deref()) {
            let pattern = like_pattern(query);
            query_builder.push(" AND (");
            {
                let mut separated = query_builder.separated(" OR ");
                for column in ["title", "contents", "postcode", "district"] {
                    separated.push(column);
                    separated.push_unseparated(" LIKE ");
                    separated.push_bind_unseparated(pattern.clone());
                    separated.push_unseparated(" ESCAPE '\\'");
                }
            }
            query_builder.push(")");
        }

        if let Some(district) = non_empty(filter.district.as_deref()) {
            query_builder
                .push(" AND district LIKE ")
                .push_bind(like_pattern(district))
                .push(" ESCAPE '\\'");
        }

        if let Some(postcode) = non_empty(filter.postcode.as_deref()) {
            query_builder
                .push(" AND postcode LIKE ")
                .push_bind(like_pattern(postcode))
                .push(" ESCAPE '\\'");
        }

        if let Some(category) = filter.category {
            query_builder.push(" AND category = ").push_bind(category);
        }

        query_builder
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(filter.page_size() as i64);

        let listings = query_builder
            .build_query_as::<Listing>()
            .fetch_all(&self.pool)
            .await?;

        Ok(listings)
    }

    /// Listings awaiting first moderation (unverified and not flagged)
    pub async fn get_pending_listings(&self) -> Result<Vec<Listing>, AppError> {
        let listings = sqlx::query_as::<_, Listing>(
            "SELECT * FROM listings WHERE admin_verified = 0 AND public_flagged = 0 ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(listings)
    }

    /// Listings reported as spam
    pub async fn get_flagged_listings(&self) -> Result<Vec<Listing>, AppError> {
        let listings = sqlx::query_as::<_, Listing>(
            "SELECT * FROM listings WHERE public_flagged = 1 ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(listings)
    }

    /// Mark listing verified and clear its spam flag
    ///
    /// Already verified and unflagged listings are left untouched.
    ///
    /// # Returns
    /// false if the listing does not exist
    pub async fn approve_listing(
        &self,
        id: &str,
        modified_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE listings SET admin_verified = 1, public_flagged = 0, modified_at = ?
            WHERE id = ? AND (admin_verified = 0 OR public_flagged = 1)
            "#,
        )
        .bind(modified_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM listings WHERE id = ?)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    /// Set the spam flag
    ///
    /// # Returns
    /// true if the flag was newly set
    pub async fn flag_listing(&self, id: &str) -> Result<bool, AppError> {
        let result =
            sqlx::query("UPDATE listings SET public_flagged = 1 WHERE id = ? AND public_flagged = 0")
                .bind(id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Apply an owner renewal if the listing still holds the values the
    /// caller read
    ///
    /// # Returns
    /// false if another write got there first or the cap is reached
    pub async fn renew_listing_if_unchanged(
        &self,
        id: &str,
        owner_id: &str,
        expected_expires_at: DateTime<Utc>,
        expected_renew_count: i64,
        new_expires_at: DateTime<Utc>,
        modified_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE listings
            SET expires_at = ?, renew_count = renew_count + 1, modified_at = ?
            WHERE id = ? AND owner_id = ?
              AND expires_at = ? AND renew_count = ? AND renew_count < ?
            "#,
        )
        .bind(new_expires_at)
        .bind(modified_at)
        .bind(id)
        .bind(owner_id)
        .bind(expected_expires_at)
        .bind(expected_renew_count)
        .bind(MAX_RENEWALS)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Move `expires_at` if it still holds the value the caller read
    pub async fn extend_listing_if_unchanged(
        &self,
        id: &str,
        expected_expires_at: DateTime<Utc>,
        new_expires_at: DateTime<Utc>,
        modified_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE listings SET expires_at = ?, modified_at = ? WHERE id = ? AND expires_at = ?",
        )
        .bind(new_expires_at)
        .bind(modified_at)
        .bind(id)
        .bind(expected_expires_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Atomically bump the view counter of a verified listing
    ///
    /// # Returns
    /// false if the listing is missing or unverified
    pub async fn increment_view_count(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE listings SET view_count = view_count + 1 WHERE id = ? AND admin_verified = 1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a listing and its images
    ///
    /// With `owner_id` set, only a listing owned by that user is deleted.
    ///
    /// # Returns
    /// What was removed, or None if no matching listing exists
    pub async fn delete_listing_cascade(
        &self,
        id: &str,
        owner_id: Option<&str>,
    ) -> Result<Option<CascadeDeletion>, AppError> {
        let mut tx = self.pool.begin().await?;

        // Take the write lock first so the image list cannot change under us.
        let listings_removed = match owner_id {
            Some(owner_id) => {
                sqlx::query("UPDATE listings SET modified_at = modified_at WHERE id = ? AND owner_id = ?")
                    .bind(id)
                    .bind(owner_id)
                    .execute(&mut *tx)
                    .await?
            }
            None => {
                sqlx::query("UPDATE listings SET modified_at = modified_at WHERE id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?
            }
        }
        .rows_affected();

        if listings_removed == 0 {
            return Ok(None);
        }

        let images = sqlx::query_as::<_, ListingImage>(
            "SELECT * FROM listing_images WHERE listing_id = ?",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        let images_removed = sqlx::query("DELETE FROM listing_images WHERE listing_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM listings WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some(CascadeDeletion {
            listings_removed,
            images_removed,
            storage_keys: images
                .iter()
                .flat_map(|image| image.storage_keys().map(str::to_string))
                .collect(),
        }))
    }

    // =========================================================================
    // Listing images
    // =========================================================================

    /// Number of images attached to a listing
    pub async fn count_listing_images(&self, listing_id: &str) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM listing_images WHERE listing_id = ?",
        )
        .bind(listing_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Insert one image record, refusing to go past the per-listing cap
    ///
    /// # Errors
    /// `CapacityExceeded` if the listing already has the maximum number of
    /// images
    pub async fn insert_listing_image(&self, image: &ListingImage) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO listing_images (id, listing_id, image_key, webp_key, created_at)
            SELECT ?, ?, ?, ?, ?
            WHERE (SELECT COUNT(*) FROM listing_images WHERE listing_id = ?) < ?
            "#,
        )
        .bind(&image.id)
        .bind(&image.listing_id)
        .bind(&image.image_key)
        .bind(&image.webp_key)
        .bind(image.created_at)
        .bind(&image.listing_id)
        .bind(MAX_IMAGES_PER_LISTING as i64)
        .execute(&self.pool)
        .await
        .map_err(map_image_insert_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::CapacityExceeded {
                max: MAX_IMAGES_PER_LISTING,
            });
        }

        Ok(())
    }

    /// Images of a listing in upload order
    pub async fn get_listing_images(&self, listing_id: &str) -> Result<Vec<ListingImage>, AppError> {
        let images = sqlx::query_as::<_, ListingImage>(
            "SELECT * FROM listing_images WHERE listing_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(listing_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::like_pattern;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("dhaka"), "%dhaka%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
