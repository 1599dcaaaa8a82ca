//! Data layer module
//!
//! Handles all data persistence:
//! - User accounts
//! - Durable browser sessions

mod database;
mod models;

pub use database::Database;
pub use models::*;
