//! # tutorhub-shared
//!
//! Types shared by the store and the server: domain enums and their
//! transition rules, money arithmetic, limits, the caller identity passed
//! into every operation, and the domain error taxonomy.

pub mod constants;
pub mod error;
pub mod money;
pub mod types;

pub use error::DomainError;
pub use types::*;
