//! Authenticated principal and per-session view tracking

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::data::User;
use crate::error::AppError;

/// The authenticated caller of a service operation
///
/// Built from the stored [`User`] at the start of a request so quota and
/// role checks see one consistent snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub phone_number: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub is_verified_seller: bool,
    pub ad_post_limit: i64,
}

impl Principal {
    /// Fails with `Forbidden` unless the caller is staff
    pub fn require_staff(&self) -> Result<(), AppError> {
        if self.is_staff {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            phone_number: user.phone_number.clone(),
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
            is_verified_seller: user.is_verified_seller,
            ad_post_limit: user.ad_post_limit,
        }
    }
}

/// Browser session state used to count each listing view once
///
/// Serializable so the host can keep it in whatever session store it uses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerSession {
    /// Host session key, used to correlate view logs
    pub id: String,
    viewed: HashSet<String>,
}

impl ViewerSession {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            viewed: HashSet::new(),
        }
    }

    pub fn has_viewed(&self, listing_id: &str) -> bool {
        self.viewed.contains(listing_id)
    }

    /// Remember a view. Returns false if it was already recorded.
    pub fn mark_viewed(&mut self, listing_id: &str) -> bool {
        self.viewed.insert(listing_id.to_string())
    }
}
