//! # tutorhub-store
//!
//! SQLite persistence for the tutorhub marketplace.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed operations for every domain
//! model.  Operations that change more than one row run inside a single
//! `BEGIN IMMEDIATE` transaction; callers identify themselves with an
//! explicit [`tutorhub_shared::Actor`].

pub mod acceptance;
pub mod codec;
pub mod database;
pub mod earnings;
pub mod filter;
pub mod lifecycle;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod notifications;
pub mod offerings;
pub mod policy;
pub mod users;
pub mod validation;

mod error;

#[cfg(test)]
mod test_support;

pub use database::Database;
pub use error::{Result, StoreError};
pub use filter::{OfferingFilters, OfferingQuery};
pub use models::*;
