//! Basket Core - Shared types library.
//!
//! This crate provides the domain model used by every Basket component:
//! - `client` - Session-authenticated request layer and cart/wishlist engines
//! - `cli` - Command-line front end
//!
//! # Architecture
//!
//! The core crate contains only types and pure algorithms - no I/O, no HTTP
//! clients, no clocks. This keeps it lightweight and allows it to be used
//! anywhere, including by render targets that never touch the network.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, identity, surfaces, roles, prices
//! - [`cart`] - Cart snapshot and the wholesale rule
//! - [`wishlist`] - Wishlist set
//! - [`reconcile`] - Keyed id-set reconciliation
//! - [`sequence`] - Per-entity mutation sequencing

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod reconcile;
pub mod sequence;
pub mod types;
pub mod wishlist;

pub use cart::{CartItem, CartPayload, CartSnapshot, DisplayAttributes, WHOLESALE_THRESHOLD};
pub use reconcile::{Diff, reconcile};
pub use sequence::{Seq, SequenceTracker, Verdict};
pub use types::*;
pub use wishlist::{Toggle, WishlistSet};
