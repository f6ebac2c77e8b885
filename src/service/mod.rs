//! Service layer
//!
//! Business logic on top of the data and storage layers.
//! Callers pass the authenticated principal explicitly.

mod image;
mod listing;
mod user;

pub use image::{ImageAsset, ImageService, ProcessedImage, UploadedFile};
pub use listing::{
    CreatedListing, DAYS_PER_EXTENSION_MONTH, DEFAULT_EXTENSION_MONTHS, ListingDetail,
    ListingService, ModerationAction, ModerationOutcome, OwnedListing, Publication,
    VerificationQueue, parse_extension_months,
};
pub use user::UserService;
