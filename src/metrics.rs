//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Listing lifecycle
    pub static ref LISTINGS_CREATED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("farmclassifieds_listings_created_total", "Total number of listings created"),
        &["publication"]
    ).expect("metric can be created");
    pub static ref LISTING_MODERATION_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("farmclassifieds_listing_moderation_total", "Total number of moderation decisions"),
        &["action"]
    ).expect("metric can be created");
    pub static ref LISTING_SPAM_REPORTS_TOTAL: IntCounter = IntCounter::new(
        "farmclassifieds_listing_spam_reports_total",
        "Total number of spam reports that flagged a listing"
    ).expect("metric can be created");
    pub static ref LISTING_RENEWALS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("farmclassifieds_listing_renewals_total", "Total number of expiry extensions"),
        &["source"]
    ).expect("metric can be created");
    pub static ref LISTING_VIEWS_TOTAL: IntCounter = IntCounter::new(
        "farmclassifieds_listing_views_total",
        "Total number of counted listing views"
    ).expect("metric can be created");
    pub static ref LISTINGS_PENDING: IntGauge = IntGauge::new(
        "farmclassifieds_listings_pending",
        "Listings awaiting moderation at last queue read"
    ).expect("metric can be created");

    // Images
    pub static ref IMAGES_INGESTED_TOTAL: IntCounter = IntCounter::new(
        "farmclassifieds_images_ingested_total",
        "Total number of listing images persisted"
    ).expect("metric can be created");
    pub static ref IMAGE_VARIANTS_SKIPPED_TOTAL: IntCounter = IntCounter::new(
        "farmclassifieds_image_variants_skipped_total",
        "Secondary image variants that could not be produced"
    ).expect("metric can be created");

    // Errors
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("farmclassifieds_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

static INIT: Once = Once::new();

/// Initialize metrics registry. Safe to call more than once.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(LISTINGS_CREATED_TOTAL.clone()))
            .expect("LISTINGS_CREATED_TOTAL can be registered");
        REGISTRY
            .register(Box::new(LISTING_MODERATION_TOTAL.clone()))
            .expect("LISTING_MODERATION_TOTAL can be registered");
        REGISTRY
            .register(Box::new(LISTING_SPAM_REPORTS_TOTAL.clone()))
            .expect("LISTING_SPAM_REPORTS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(LISTING_RENEWALS_TOTAL.clone()))
            .expect("LISTING_RENEWALS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(LISTING_VIEWS_TOTAL.clone()))
            .expect("LISTING_VIEWS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(LISTINGS_PENDING.clone()))
            .expect("LISTINGS_PENDING can be registered");
        REGISTRY
            .register(Box::new(IMAGES_INGESTED_TOTAL.clone()))
            .expect("IMAGES_INGESTED_TOTAL can be registered");
        REGISTRY
            .register(Box::new(IMAGE_VARIANTS_SKIPPED_TOTAL.clone()))
            .expect("IMAGE_VARIANTS_SKIPPED_TOTAL can be registered");
        REGISTRY
            .register(Box::new(ERRORS_TOTAL.clone()))
            .expect("ERRORS_TOTAL can be registered");

        tracing::info!("Metrics registry initialized");
    });
}

/// Render every registered metric in the Prometheus text format.
pub fn gather_text() -> Result<String, crate::error::AppError> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| crate::error::AppError::Internal(e.into()))?;
    String::from_utf8(buffer).map_err(|e| crate::error::AppError::Internal(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gather_text_includes_registered_counters() {
        init_metrics();
        init_metrics();
        LISTING_VIEWS_TOTAL.inc();

        let text = gather_text().unwrap();
        assert!(text.contains("farmclassifieds_listing_views_total"));
    }
}
