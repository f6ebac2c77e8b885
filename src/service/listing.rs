//! Listing service
//!
//! Owns the listing lifecycle: creation under quota, edits, moderation,
//! spam reports, renewals, staff extensions, views and deletion.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;

use super::image::{ImageAsset, ImageService, UploadedFile};
use crate::auth::{Principal, ViewerSession};
use crate::data::{
    Database, EntityId, Listing, ListingDraft, ListingFilter, ListingImage, MAX_IMAGES_PER_LISTING,
    MAX_RENEWALS, listing_lifetime,
};
use crate::error::AppError;
use crate::metrics::{
    IMAGES_INGESTED_TOTAL, LISTING_MODERATION_TOTAL, LISTING_RENEWALS_TOTAL,
    LISTING_SPAM_REPORTS_TOTAL, LISTING_VIEWS_TOTAL, LISTINGS_CREATED_TOTAL, LISTINGS_PENDING,
};
use crate::storage::MediaStorage;

/// Days added per month of a staff extension
pub const DAYS_PER_EXTENSION_MONTH: i64 = 30;
/// Months used when a staff extension gives no usable value
pub const DEFAULT_EXTENSION_MONTHS: i64 = 2;

/// Optimistic updates give up after this many lost races.
const MAX_UPDATE_ATTEMPTS: usize = 5;

/// Whether a new listing went live or waits for a moderator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Publication {
    Published,
    PendingApproval,
}

impl Publication {
    /// Message shown to the seller after submitting
    pub fn message(&self) -> &'static str {
        match self {
            Self::Published => "Your ad has been published.",
            Self::PendingApproval => "Your ad has been submitted for admin approval.",
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::PendingApproval => "pending_approval",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedListing {
    pub listing: Listing,
    pub images: Vec<ListingImage>,
    pub publication: Publication,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationAction {
    Approve,
    Reject,
}

#[derive(Debug, Clone)]
pub enum ModerationOutcome {
    Approved(Listing),
    Rejected { listing_id: String, images_removed: u64 },
}

/// A seller's own listing with the renewals still available
#[derive(Debug, Clone, Serialize)]
pub struct OwnedListing {
    #[serde(flatten)]
    pub listing: Listing,
    pub renewals_left: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListingDetail {
    pub listing: Listing,
    pub images: Vec<ImageAsset>,
    /// This request incremented the view counter
    pub view_recorded: bool,
}

/// Listings waiting for a moderator
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerificationQueue {
    /// Never verified and not flagged
    pub pending: Vec<Listing>,
    /// Reported as spam
    pub flagged: Vec<Listing>,
}

/// Month count for a staff extension; anything but a positive integer
/// falls back to the default.
pub fn parse_extension_months(raw: Option<&str>) -> i64 {
    raw.and_then(|value| value.trim().parse::<i64>().ok())
        .filter(|months| *months > 0)
        .unwrap_or(DEFAULT_EXTENSION_MONTHS)
}

/// Listing service
pub struct ListingService {
    db: Arc<Database>,
    storage: Arc<MediaStorage>,
    images: Arc<ImageService>,
}

impl ListingService {
    /// Create new listing service
    pub fn new(db: Arc<Database>, storage: Arc<MediaStorage>, images: Arc<ImageService>) -> Self {
        Self {
            db,
            storage,
            images,
        }
    }

    // =========================================================================
    // Seller operations
    // =========================================================================

    /// Create a listing with its images
    ///
    /// Non-staff sellers are held to their quota, counted over every listing
    /// they own whatever its moderation state. Listings from verified sellers
    /// are published at once, everything else waits for approval.
    ///
    /// The quota check and the insert are separate steps, so two concurrent
    /// submissions from one seller can both pass.
    ///
    /// # Errors
    /// - `Validation` for bad fields or files
    /// - `QuotaExceeded` if the seller is at their limit
    /// - `CapacityExceeded` for more than six files
    /// - `Decode` if any file is not an image (nothing is written)
    pub async fn create(
        &self,
        principal: &Principal,
        draft: &ListingDraft,
        files: &[UploadedFile],
    ) -> Result<CreatedListing, AppError> {
        let draft = draft.normalized()?;

        if !principal.is_staff {
            let owned = self.db.count_listings_by_owner(&principal.id).await?;
            if owned >= principal.ad_post_limit {
                return Err(AppError::QuotaExceeded {
                    limit: principal.ad_post_limit,
                }
                .recorded());
            }
        }

        self.images.validate_batch(files).map_err(AppError::recorded)?;

        let now = Utc::now();
        let listing = Listing {
            id: EntityId::new().0,
            owner_id: Some(principal.id.clone()),
            title: draft.title,
            contents: draft.contents,
            category: draft.category,
            phone_number: draft.phone_number,
            postcode: draft.postcode,
            district: draft.district,
            price: draft.price,
            view_count: 0,
            admin_verified: principal.is_verified_seller,
            public_flagged: false,
            renew_count: 0,
            created_at: now,
            modified_at: now,
            expires_at: now + listing_lifetime(),
        };

        let images = self
            .images
            .prepare_batch(&listing.id, files)
            .await
            .map_err(AppError::recorded)?;

        if let Err(error) = self.db.insert_listing_with_images(&listing, &images).await {
            self.images.discard(&images).await;
            return Err(error.recorded());
        }

        let publication = if listing.admin_verified {
            Publication::Published
        } else {
            Publication::PendingApproval
        };

        LISTINGS_CREATED_TOTAL
            .with_label_values(&[publication.as_str()])
            .inc();
        IMAGES_INGESTED_TOTAL.inc_by(images.len() as u64);
        tracing::info!(
            listing_id = %listing.id,
            owner_id = %principal.id,
            images = images.len(),
            publication = publication.as_str(),
            "Listing created"
        );

        Ok(CreatedListing {
            listing,
            images,
            publication,
        })
    }

    /// Update content fields of an owned listing and attach more images
    ///
    /// Expiry, renewals and moderation flags are untouched. The six-image
    /// cap covers existing plus new images.
    ///
    /// # Errors
    /// `NotFound` if the caller does not own the listing
    pub async fn edit(
        &self,
        principal: &Principal,
        listing_id: &str,
        draft: &ListingDraft,
        files: &[UploadedFile],
    ) -> Result<Listing, AppError> {
        let draft = draft.normalized()?;
        self.images.validate_batch(files).map_err(AppError::recorded)?;

        self.db
            .get_owned_listing(listing_id, &principal.id)
            .await?
            .ok_or(AppError::NotFound)?;

        let existing = self.db.count_listing_images(listing_id).await?;
        if existing as usize + files.len() > MAX_IMAGES_PER_LISTING {
            return Err(AppError::CapacityExceeded {
                max: MAX_IMAGES_PER_LISTING,
            }
            .recorded());
        }

        let images = self
            .images
            .prepare_batch(listing_id, files)
            .await
            .map_err(AppError::recorded)?;

        let updated = match self
            .db
            .update_listing_content(listing_id, &principal.id, &draft, Utc::now(), &images)
            .await
        {
            Ok(Some(listing)) => listing,
            Ok(None) => {
                self.images.discard(&images).await;
                return Err(AppError::NotFound);
            }
            Err(error) => {
                self.images.discard(&images).await;
                return Err(error.recorded());
            }
        };

        IMAGES_INGESTED_TOTAL.inc_by(images.len() as u64);
        tracing::info!(
            listing_id = %listing_id,
            new_images = images.len(),
            "Listing edited"
        );

        Ok(updated)
    }

    /// Delete an owned listing with its images
    pub async fn delete(&self, principal: &Principal, listing_id: &str) -> Result<(), AppError> {
        let deletion = self
            .db
            .delete_listing_cascade(listing_id, Some(&principal.id))
            .await?
            .ok_or(AppError::NotFound)?;

        self.storage.delete_all(&deletion.storage_keys).await;
        tracing::info!(
            listing_id = %listing_id,
            images_removed = deletion.images_removed,
            "Listing deleted by owner"
        );

        Ok(())
    }

    /// Add another listing lifetime to an owned listing
    ///
    /// The new expiry is counted from the current expiry, not from now.
    ///
    /// # Errors
    /// - `NotFound` if the caller does not own the listing
    /// - `RenewalLimit` after three renewals (nothing changes)
    /// - `Conflict` if concurrent writers kept winning
    pub async fn renew(&self, principal: &Principal, listing_id: &str) -> Result<Listing, AppError> {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let mut listing = self
                .db
                .get_owned_listing(listing_id, &principal.id)
                .await?
                .ok_or(AppError::NotFound)?;

            if listing.renew_count >= MAX_RENEWALS {
                return Err(AppError::RenewalLimit { max: MAX_RENEWALS }.recorded());
            }

            let now = Utc::now();
            let new_expires_at = listing.expires_at + listing_lifetime();
            let renewed = self
                .db
                .renew_listing_if_unchanged(
                    listing_id,
                    &principal.id,
                    listing.expires_at,
                    listing.renew_count,
                    new_expires_at,
                    now,
                )
                .await?;

            if renewed {
                listing.expires_at = new_expires_at;
                listing.renew_count += 1;
                listing.modified_at = now;

                LISTING_RENEWALS_TOTAL.with_label_values(&["owner"]).inc();
                tracing::info!(
                    listing_id = %listing_id,
                    renew_count = listing.renew_count,
                    expires_at = %listing.expires_at,
                    "Listing renewed"
                );
                return Ok(listing);
            }

            tracing::debug!(listing_id = %listing_id, "Renewal raced with another write, retrying");
        }

        Err(AppError::Conflict(format!("listing {listing_id} kept changing during renewal")).recorded())
    }

    /// The caller's listings, newest first
    pub async fn owned_listings(&self, principal: &Principal) -> Result<Vec<OwnedListing>, AppError> {
        let listings = self.db.get_listings_by_owner(&principal.id).await?;

        Ok(listings
            .into_iter()
            .map(|listing| OwnedListing {
                renewals_left: listing.renewals_left(),
                listing,
            })
            .collect())
    }

    // =========================================================================
    // Staff operations
    // =========================================================================

    /// Approve or reject a listing
    ///
    /// Approval sets `admin_verified` and clears the spam flag in one
    /// statement and is idempotent. Rejection deletes the listing with its
    /// images.
    pub async fn moderate(
        &self,
        principal: &Principal,
        listing_id: &str,
        action: ModerationAction,
    ) -> Result<ModerationOutcome, AppError> {
        principal.require_staff().map_err(AppError::recorded)?;

        match action {
            ModerationAction::Approve => {
                if !self.db.approve_listing(listing_id, Utc::now()).await? {
                    return Err(AppError::NotFound);
                }
                let listing = self
                    .db
                    .get_listing(listing_id)
                    .await?
                    .ok_or(AppError::NotFound)?;

                LISTING_MODERATION_TOTAL
                    .with_label_values(&["approve"])
                    .inc();
                tracing::info!(listing_id = %listing_id, moderator = %principal.id, "Listing approved");
                Ok(ModerationOutcome::Approved(listing))
            }
            ModerationAction::Reject => {
                let deletion = self
                    .db
                    .delete_listing_cascade(listing_id, None)
                    .await?
                    .ok_or(AppError::NotFound)?;
                self.storage.delete_all(&deletion.storage_keys).await;

                LISTING_MODERATION_TOTAL
                    .with_label_values(&["reject"])
                    .inc();
                tracing::info!(
                    listing_id = %listing_id,
                    moderator = %principal.id,
                    images_removed = deletion.images_removed,
                    "Listing rejected"
                );
                Ok(ModerationOutcome::Rejected {
                    listing_id: listing_id.to_string(),
                    images_removed: deletion.images_removed,
                })
            }
        }
    }

    /// Push a listing's expiry out by whole 30-day months
    ///
    /// `months` is the raw form value; see [`parse_extension_months`].
    /// Staff extensions do not count against the owner's renewals.
    pub async fn admin_extend(
        &self,
        principal: &Principal,
        listing_id: &str,
        months: Option<&str>,
    ) -> Result<Listing, AppError> {
        principal.require_staff().map_err(AppError::recorded)?;

        let months = parse_extension_months(months);
        let extension = months
            .checked_mul(DAYS_PER_EXTENSION_MONTH)
            .and_then(Duration::try_days)
            .ok_or_else(|| AppError::Validation(format!("cannot extend by {months} months")))?;

        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let mut listing = self
                .db
                .get_listing(listing_id)
                .await?
                .ok_or(AppError::NotFound)?;

            let new_expires_at = listing
                .expires_at
                .checked_add_signed(extension)
                .ok_or_else(|| AppError::Validation(format!("cannot extend by {months} months")))?;

            let now = Utc::now();
            let extended = self
                .db
                .extend_listing_if_unchanged(listing_id, listing.expires_at, new_expires_at, now)
                .await?;

            if extended {
                listing.expires_at = new_expires_at;
                listing.modified_at = now;

                LISTING_RENEWALS_TOTAL.with_label_values(&["staff"]).inc();
                tracing::info!(
                    listing_id = %listing_id,
                    months,
                    expires_at = %listing.expires_at,
                    "Listing extended by staff"
                );
                return Ok(listing);
            }
        }

        Err(AppError::Conflict(format!("listing {listing_id} kept changing during extension")).recorded())
    }

    /// Pending and flagged listings for the moderation screen
    pub async fn verification_queue(
        &self,
        principal: &Principal,
    ) -> Result<VerificationQueue, AppError> {
        principal.require_staff().map_err(AppError::recorded)?;

        let pending = self.db.get_pending_listings().await?;
        let flagged = self.db.get_flagged_listings().await?;
        LISTINGS_PENDING.set(pending.len() as i64);

        Ok(VerificationQueue { pending, flagged })
    }

    // =========================================================================
    // Public operations
    // =========================================================================

    /// Flag a publicly visible listing for review
    ///
    /// Needs no authentication. The listing stays visible.
    ///
    /// # Returns
    /// true if this call set the flag
    pub async fn report_spam(&self, listing_id: &str) -> Result<bool, AppError> {
        let listing = self
            .db
            .get_listing(listing_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if !listing.is_publicly_visible_at(Utc::now()) {
            return Err(AppError::NotFound);
        }

        let flagged = self.db.flag_listing(listing_id).await?;
        if flagged {
            LISTING_SPAM_REPORTS_TOTAL.inc();
            tracing::info!(listing_id = %listing_id, "Listing reported as spam");
        }

        Ok(flagged)
    }

    /// Browse or search publicly visible listings
    pub async fn public_listings(&self, filter: &ListingFilter) -> Result<Vec<Listing>, AppError> {
        self.db.get_public_listings(filter, Utc::now()).await
    }

    /// One listing with its images, counting the view
    ///
    /// Staff may open unverified and expired listings. Everyone else gets
    /// `NotFound` for them.
    pub async fn listing_detail(
        &self,
        viewer: Option<&Principal>,
        session: &mut ViewerSession,
        listing_id: &str,
    ) -> Result<ListingDetail, AppError> {
        let mut listing = self
            .db
            .get_listing(listing_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let is_staff = viewer.is_some_and(|principal| principal.is_staff);
        if !is_staff && !listing.is_publicly_visible_at(Utc::now()) {
            return Err(AppError::NotFound);
        }

        let view_recorded = self.record_view(session, listing_id).await?;
        if view_recorded {
            if let Some(current) = self.db.get_listing(listing_id).await? {
                listing = current;
            }
        }

        let images = self
            .db
            .get_listing_images(listing_id)
            .await?
            .into_iter()
            .map(|image| self.images.asset(image))
            .collect();

        Ok(ListingDetail {
            listing,
            images,
            view_recorded,
        })
    }

    /// Count a view once per session, for verified listings only
    ///
    /// # Returns
    /// true if the counter was incremented
    pub async fn record_view(
        &self,
        session: &mut ViewerSession,
        listing_id: &str,
    ) -> Result<bool, AppError> {
        if session.has_viewed(listing_id) {
            return Ok(false);
        }

        let incremented = self.db.increment_view_count(listing_id).await?;
        if incremented {
            session.mark_viewed(listing_id);
            LISTING_VIEWS_TOTAL.inc();
            tracing::debug!(listing_id = %listing_id, session = %session.id, "Listing view recorded");
        }

        Ok(incremented)
    }
}
