//! Balcão Core - Shared types library.
//!
//! This crate provides the domain types shared by the Balcão point-of-sale
//! components:
//! - `terminal` - Session, inventory and sale-commit core used by each
//!   cash-register terminal
//! - `integration-tests` - End-to-end checkout and session scenarios
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, money, login identifiers, statuses, and the
//!   profile, catalog and sale records

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
