//! Common utilities shared by the services
//!
//! Database error classification and slug derivation for extra comics.

pub mod db_errors;
pub mod slug;

pub use slug::slugify;
