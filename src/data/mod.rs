//! Data layer module
//!
//! Handles all data persistence:
//! - SQLite database operations
//! - Domain models shared by the services

mod database;
mod models;

pub use database::{CascadeDeletion, Database, VerifiedSellerUpdate};
pub use models::*;
