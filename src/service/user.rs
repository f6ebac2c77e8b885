//! User service
//!
//! Seller registration and the staff-side account operations.

use std::sync::Arc;

use chrono::Utc;

use crate::auth::Principal;
use crate::data::{CascadeDeletion, Database, EntityId, User, VerifiedSellerUpdate};
use crate::error::AppError;
use crate::metrics::LISTING_MODERATION_TOTAL;
use crate::storage::MediaStorage;

/// Trim a phone number and check it is 6-15 digits with an optional `+`.
fn normalize_phone_number(raw: &str) -> Result<String, AppError> {
    let phone_number = raw.trim();
    let digits = phone_number.strip_prefix('+').unwrap_or(phone_number);

    if !(6..=15).contains(&digits.len()) || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::Validation(
            "phone number must be 6 to 15 digits, optionally prefixed with +".to_string(),
        ));
    }

    Ok(phone_number.to_string())
}

/// Parse a quota typed into an admin form. Only plain digits are accepted.
fn parse_ad_post_limit(raw: &str) -> Result<i64, AppError> {
    let value = raw.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::Validation(format!(
            "ad post limit must be a whole number, got {value:?}"
        )));
    }

    value
        .parse::<i64>()
        .map_err(|_| AppError::Validation(format!("ad post limit is out of range: {value}")))
}

/// User service
pub struct UserService {
    db: Arc<Database>,
    storage: Arc<MediaStorage>,
    default_ad_post_limit: i64,
}

impl UserService {
    /// Create new user service
    pub fn new(db: Arc<Database>, storage: Arc<MediaStorage>, default_ad_post_limit: i64) -> Self {
        Self {
            db,
            storage,
            default_ad_post_limit,
        }
    }

    /// Register a seller identified by phone number
    ///
    /// # Errors
    /// `Validation` for a malformed or already registered number
    pub async fn register(&self, phone_number: &str) -> Result<User, AppError> {
        let phone_number = normalize_phone_number(phone_number)?;
        let now = Utc::now();
        let user = User {
            id: EntityId::new().0,
            phone_number,
            ad_post_limit: self.default_ad_post_limit,
            is_verified_seller: false,
            is_active: true,
            is_staff: false,
            is_superuser: false,
            created_at: now,
            updated_at: now,
        };

        self.db.insert_user(&user).await?;
        tracing::info!(user_id = %user.id, "Seller registered");

        Ok(user)
    }

    /// Get user by ID
    pub async fn get(&self, user_id: &str) -> Result<User, AppError> {
        self.db.get_user(user_id).await?.ok_or(AppError::NotFound)
    }

    /// Snapshot of a user for passing into service calls
    ///
    /// # Errors
    /// `Forbidden` for deactivated accounts
    pub async fn principal(&self, user_id: &str) -> Result<Principal, AppError> {
        let user = self.get(user_id).await?;
        if !user.is_active {
            return Err(AppError::Forbidden);
        }
        Ok(Principal::from(&user))
    }

    /// Ensure `phone_number` belongs to a staff superuser, creating it if needed
    pub async fn ensure_superuser(&self, phone_number: &str) -> Result<User, AppError> {
        let phone_number = normalize_phone_number(phone_number)?;

        if let Some(user) = self.db.get_user_by_phone(&phone_number).await? {
            if user.is_staff && user.is_superuser {
                return Ok(user);
            }
            self.db.promote_to_superuser(&user.id, Utc::now()).await?;
            tracing::info!(user_id = %user.id, "Existing user promoted to superuser");
            return self.get(&user.id).await;
        }

        let now = Utc::now();
        let user = User {
            id: EntityId::new().0,
            phone_number,
            ad_post_limit: self.default_ad_post_limit,
            is_verified_seller: false,
            is_active: true,
            is_staff: true,
            is_superuser: true,
            created_at: now,
            updated_at: now,
        };
        self.db.insert_user(&user).await?;
        tracing::info!(user_id = %user.id, "Superuser created");

        Ok(user)
    }

    // =========================================================================
    // Staff operations
    // =========================================================================

    /// Set or clear the verified-seller flag
    ///
    /// Becoming verified approves the seller's unapproved listings and clears
    /// their spam flags. Already verified listings and other sellers'
    /// listings are left alone.
    pub async fn set_verified_seller(
        &self,
        principal: &Principal,
        user_id: &str,
        verified: bool,
    ) -> Result<VerifiedSellerUpdate, AppError> {
        principal.require_staff().map_err(AppError::recorded)?;

        let update = self
            .db
            .set_verified_seller(user_id, verified, Utc::now())
            .await?
            .ok_or(AppError::NotFound)?;

        if update.auto_approved > 0 {
            LISTING_MODERATION_TOTAL
                .with_label_values(&["auto_approve"])
                .inc_by(update.auto_approved);
        }
        tracing::info!(
            user_id = %user_id,
            verified,
            auto_approved = update.auto_approved,
            "Verified seller flag updated"
        );

        Ok(update)
    }

    /// Change how many listings a seller may own
    ///
    /// `raw` is the text from the admin form.
    pub async fn update_ad_post_limit(
        &self,
        principal: &Principal,
        user_id: &str,
        raw: &str,
    ) -> Result<User, AppError> {
        principal.require_staff().map_err(AppError::recorded)?;
        let limit = parse_ad_post_limit(raw).map_err(AppError::recorded)?;

        let user = self
            .db
            .update_ad_post_limit(user_id, limit, Utc::now())
            .await?
            .ok_or(AppError::NotFound)?;

        tracing::info!(user_id = %user_id, ad_post_limit = limit, "Ad post limit updated");
        Ok(user)
    }

    /// Delete an account with all of its listings and images
    ///
    /// # Errors
    /// `ProtectedUser` for superusers; nothing is deleted
    pub async fn delete_user(
        &self,
        principal: &Principal,
        user_id: &str,
    ) -> Result<CascadeDeletion, AppError> {
        principal.require_staff().map_err(AppError::recorded)?;

        let user = self.get(user_id).await?;
        if user.is_superuser {
            tracing::warn!(user_id = %user_id, "Refused to delete superuser");
            return Err(AppError::ProtectedUser.recorded());
        }

        let deletion = self
            .db
            .delete_user_cascade(user_id)
            .await?
            .ok_or(AppError::NotFound)?;
        self.storage.delete_all(&deletion.storage_keys).await;

        tracing::info!(
            user_id = %user_id,
            listings_removed = deletion.listings_removed,
            images_removed = deletion.images_removed,
            "User deleted"
        );

        Ok(deletion)
    }
}
