//! Basket client library.
//!
//! Session-authenticated access to the storefront API plus the cart and
//! wishlist state engines built on top of it.
//!
//! # Layers
//!
//! - [`store`] - Local key/value storage (memory or JSON file)
//! - [`session`] - Credentials, login, single-flight token refresh
//! - [`gateway`] - Bearer/anti-forgery injection and the 401 retry-once rule
//! - [`cart`] - Optimistic cart mutations reconciled by variant id
//! - [`wishlist`] - Per-identity wishlist with queued replication
//! - [`render`] - What the cart engine tells a render target
//!
//! [`Basket`] wires them together.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
mod client;
pub mod config;
pub mod debounce;
pub mod error;
pub mod gateway;
pub mod render;
pub mod session;
pub mod store;
pub mod wishlist;

pub use client::{Basket, LoginOutcome};
pub use config::{ClientConfig, ConfigError, CsrfConfig};
pub use error::{ApiError, ClientError};
