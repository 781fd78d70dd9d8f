//! Core types for Balcão.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod catalog;
pub mod id;
pub mod identifier;
pub mod money;
pub mod month;
pub mod profile;
pub mod sale;
pub mod status;

pub use catalog::{CatalogItem, StockItem};
pub use id::*;
pub use identifier::{IdentifierError, LoginIdentifier};
pub use money::Money;
pub use month::{MonthKey, MonthKeyError};
pub use profile::{MonthlyUsage, Profile};
pub use sale::{CartLine, Payment, PaymentEntry, SaleLine, SaleRecord};
pub use status::*;
