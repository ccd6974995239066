//! Core types for Basket.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod identity;
pub mod price;

pub use id::*;
pub use identity::{Identity, ParseKindError, Role, Surface};
pub use price::{PriceTier, UnitPrices, format_amount};
