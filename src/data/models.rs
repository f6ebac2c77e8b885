//! Data models
//!
//! Rust structs representing database entities.
//! All models use ULID for IDs and chrono for timestamps.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// A new listing stays up this long before its first renewal.
pub const LISTING_LIFETIME_DAYS: i64 = 60;
/// Owner renewals allowed per listing.
pub const MAX_RENEWALS: i64 = 3;
/// Hard cap on images attached to one listing.
pub const MAX_IMAGES_PER_LISTING: usize = 6;

/// Time added to `expires_at` by creation and by each owner renewal.
pub fn listing_lifetime() -> Duration {
    Duration::days(LISTING_LIFETIME_DAYS)
}

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// User
// =============================================================================

/// A registered seller. The phone number doubles as the login identifier.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub phone_number: String,
    /// Maximum listings this seller may own at once
    pub ad_post_limit: i64,
    /// Listings from verified sellers skip the moderation queue
    pub is_verified_seller: bool,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Category
// =============================================================================

/// Closed set of listing categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Category {
    Fish,
    Chicken,
    Duck,
    OtherBirds,
    Cow,
    Goat,
    Buffalo,
    AgriProduce,
    Seeds,
    Dogs,
    Cats,
    Equipment,
    Other,
}

impl Category {
    pub const ALL: [Category; 13] = [
        Category::Fish,
        Category::Chicken,
        Category::Duck,
        Category::OtherBirds,
        Category::Cow,
        Category::Goat,
        Category::Buffalo,
        Category::AgriProduce,
        Category::Seeds,
        Category::Dogs,
        Category::Cats,
        Category::Equipment,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fish => "fish",
            Self::Chicken => "chicken",
            Self::Duck => "duck",
            Self::OtherBirds => "other_birds",
            Self::Cow => "cow",
            Self::Goat => "goat",
            Self::Buffalo => "buffalo",
            Self::AgriProduce => "agri_produce",
            Self::Seeds => "seeds",
            Self::Dogs => "dogs",
            Self::Cats => "cats",
            Self::Equipment => "equipment",
            Self::Other => "other",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fish => "Fish",
            Self::Chicken => "Chicken",
            Self::Duck => "Duck",
            Self::OtherBirds => "Other Birds",
            Self::Cow => "Cow",
            Self::Goat => "Goat",
            Self::Buffalo => "Buffalo",
            Self::AgriProduce => "Agri Produce",
            Self::Seeds => "Seeds",
            Self::Dogs => "Dogs",
            Self::Cats => "Cats",
            Self::Equipment => "Equipment",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == value)
            .ok_or_else(|| AppError::Validation(format!("unknown category: {value}")))
    }
}

// =============================================================================
// Listing
// =============================================================================

/// A classified ad
///
/// Publicly visible only while `admin_verified` is set and `expires_at` lies
/// in the future. Expiry is always derived from `expires_at`; there is no
/// stored expired flag to go stale.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Listing {
    pub id: String,
    /// Owning seller; None only for orphaned legacy rows
    pub owner_id: Option<String>,
    pub title: String,
    pub contents: String,
    pub category: Category,
    /// Contact number shown on the ad
    pub phone_number: String,
    pub postcode: String,
    /// Free-text location label
    pub district: String,
    pub price: Option<i64>,
    pub view_count: i64,
    pub admin_verified: bool,
    /// Reported as spam and waiting for review; does not hide the listing
    pub public_flagged: bool,
    /// Owner renewals used so far (0..=3)
    pub renew_count: i64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Listing {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// The public visibility predicate shared by every read path.
    pub fn is_publicly_visible_at(&self, now: DateTime<Utc>) -> bool {
        self.admin_verified && self.expires_at > now
    }

    pub fn renewals_left(&self) -> i64 {
        (MAX_RENEWALS - self.renew_count).max(0)
    }
}

/// Editable listing content as submitted by a seller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingDraft {
    pub title: String,
    pub contents: String,
    pub category: Category,
    pub phone_number: String,
    pub postcode: String,
    pub district: String,
    pub price: Option<i64>,
}

fn require_text(field: &str, value: &str, max_chars: usize) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    if value.chars().count() > max_chars {
        return Err(AppError::Validation(format!(
            "{field} must be at most {max_chars} characters"
        )));
    }
    Ok(value.to_string())
}

impl ListingDraft {
    /// Trim every text field and check the column limits.
    pub fn normalized(&self) -> Result<ListingDraft, AppError> {
        let contents = self.contents.trim();
        if contents.is_empty() {
            return Err(AppError::Validation("contents is required".to_string()));
        }
        if let Some(price) = self.price {
            if price < 0 {
                return Err(AppError::Validation(
                    "price must not be negative".to_string(),
                ));
            }
        }

        Ok(ListingDraft {
            title: require_text("title", &self.title, 200)?,
            contents: contents.to_string(),
            category: self.category,
            phone_number: require_text("phone_number", &self.phone_number, 20)?,
            postcode: require_text("postcode", &self.postcode, 20)?,
            district: require_text("district", &self.district, 100)?,
            price: self.price,
        })
    }
}

// =============================================================================
// Listing images
// =============================================================================

/// One uploaded picture of a listing
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ListingImage {
    pub id: String,
    pub listing_id: String,
    /// Storage key of the re-encoded JPEG
    pub image_key: String,
    /// Storage key of the WebP variant, when one could be produced
    pub webp_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ListingImage {
    /// Every storage key held by this record
    pub fn storage_keys(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.image_key.as_str()).chain(self.webp_key.as_deref())
    }
}

// =============================================================================
// Queries
// =============================================================================

/// Default page size for public browsing
pub const DEFAULT_PAGE_SIZE: usize = 15;
const MAX_PAGE_SIZE: usize = 100;

/// Filters for public browsing and search
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListingFilter {
    /// Case-insensitive substring over title, contents, postcode and district
    pub query: Option<String>,
    /// Substring of the district label
    pub district: Option<String>,
    pub category: Option<Category>,
    /// Substring of the postcode
    pub postcode: Option<String>,
    pub limit: Option<usize>,
}

impl ListingFilter {
    pub fn page_size(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> ListingDraft {
        ListingDraft {
            title: "  Desi hens ".to_string(),
            contents: "Six laying hens".to_string(),
            category: Category::Chicken,
            phone_number: "01711000000".to_string(),
            postcode: "1207".to_string(),
            district: "Dhaka".to_string(),
            price: Some(4500),
        }
    }

    #[test]
    fn category_parses_and_labels() {
        assert_eq!("other_birds".parse::<Category>().unwrap(), Category::OtherBirds);
        assert_eq!(Category::AgriProduce.label(), "Agri Produce");
        assert!("tractor".parse::<Category>().is_err());
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
    }

    #[test]
    fn draft_normalization_trims_and_checks_limits() {
        let normalized = draft().normalized().unwrap();
        assert_eq!(normalized.title, "Desi hens");

        let mut long_title = draft();
        long_title.title = "x".repeat(201);
        assert!(matches!(long_title.normalized(), Err(AppError::Validation(_))));

        let mut negative = draft();
        negative.price = Some(-1);
        assert!(matches!(negative.normalized(), Err(AppError::Validation(_))));

        let mut blank_district = draft();
        blank_district.district = "   ".to_string();
        assert!(matches!(blank_district.normalized(), Err(AppError::Validation(_))));
    }

    #[test]
    fn visibility_requires_verification_and_future_expiry() {
        let now = Utc::now();
        let mut listing = Listing {
            id: EntityId::new().0,
            owner_id: None,
            title: "Goat".to_string(),
            contents: "Black Bengal goat".to_string(),
            category: Category::Goat,
            phone_number: "01711000000".to_string(),
            postcode: "1207".to_string(),
            district: "Dhaka".to_string(),
            price: None,
            view_count: 0,
            admin_verified: true,
            public_flagged: true,
            renew_count: 0,
            created_at: now,
            modified_at: now,
            expires_at: now + Duration::seconds(1),
        };
        assert!(listing.is_publicly_visible_at(now));

        listing.expires_at = now - Duration::seconds(1);
        assert!(!listing.is_publicly_visible_at(now));
        assert!(listing.is_expired_at(now));

        listing.expires_at = now + Duration::days(1);
        listing.admin_verified = false;
        assert!(!listing.is_publicly_visible_at(now));
    }

    #[test]
    fn filter_page_size_is_bounded() {
        assert_eq!(ListingFilter::default().page_size(), DEFAULT_PAGE_SIZE);
        let filter = ListingFilter {
            limit: Some(10_000),
            ..Default::default()
        };
        assert_eq!(filter.page_size(), 100);
    }
}
