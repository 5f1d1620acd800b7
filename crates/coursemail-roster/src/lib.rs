//! # CourseMail Roster
//!
//! Turns a gradebook export into classified recipients.
//!
//! - [`classify`] — progress count + threshold → category (pure)
//! - [`profile`] — which columns hold names, addresses, activities
//! - [`address`] — address validation and deduplication
//! - [`loader`] — CSV rows → [`coursemail_core::Recipient`]

pub mod address;
pub mod classify;
pub mod loader;
pub mod profile;

pub use address::{is_valid_address, partition_addresses};
pub use classify::{classify, group_by_category};
pub use loader::{load_roster, parse_roster, Roster};
pub use profile::ProfileLayout;
