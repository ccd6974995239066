//! Integration tests for the Basket client.
//!
//! Each test starts a [`wiremock::MockServer`] standing in for the storefront
//! API and drives a real [`Basket`] against it.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p basket-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `gateway_refresh` - 401 retry-once, single-flight refresh, teardown
//! - `cart_engine` - Optimistic mutations, wholesale pricing, guest merge
//! - `wishlist_merge` - Guest-to-user merge and replication retries
//! - `cookie_persistence` - Anonymous-session cookies across client restarts

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use basket_client::gateway::StaticCsrf;
use basket_client::render::{CartRenderer, RenderedLine};
use basket_client::session::Session;
use basket_client::store::MemoryStore;
use basket_client::wishlist::ReplicationPolicy;
use basket_client::{Basket, ClientConfig};
use basket_core::{Role, UserId, VariantId};
use chrono::Utc;
use secrecy::SecretString;
use serde_json::{Value, json};
use wiremock::MockServer;

/// Anti-forgery token every test client sends on mutations.
pub const CSRF_TOKEN: &str = "test-csrf-token";

/// Header the anti-forgery token travels in.
pub const CSRF_HEADER: &str = "x-csrftoken";

// =============================================================================
// Test Context
// =============================================================================

/// A mock storefront API and a client pointed at it.
pub struct TestContext {
    pub server: MockServer,
    pub basket: Basket,
    pub renderer: Arc<RecordingRenderer>,
}

impl TestContext {
    /// Start a mock server and build a client with in-memory storage.
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let mut config = ClientConfig::new(&server.uri()).unwrap();
        config.debounce = Duration::from_millis(50);
        config.replication = ReplicationPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
        };

        let renderer = Arc::new(RecordingRenderer::default());
        let basket = Basket::with_csrf_source(
            config,
            Arc::new(MemoryStore::new()),
            renderer.clone(),
            Arc::new(StaticCsrf::new(CSRF_TOKEN)),
        )
        .unwrap();

        Self {
            server,
            basket,
            renderer,
        }
    }

    /// Store a session for `user_id` without going through login.
    pub fn seed_session(&self, user_id: &str, access: &str, refresh: &str) {
        self.basket
            .session()
            .credentials()
            .save_session(&session(user_id, access, refresh))
            .unwrap();
    }

    /// Path of a mocked resource.
    #[must_use]
    pub fn path(segments: &[&str]) -> String {
        format!("/{}", segments.join("/"))
    }
}

/// A stored session as login would produce it.
#[must_use]
pub fn session(user_id: &str, access: &str, refresh: &str) -> Session {
    Session {
        access: SecretString::from(access),
        refresh: SecretString::from(refresh),
        user_id: UserId::new(user_id),
        role: Role::Customer,
        authenticated_at: Utc::now(),
    }
}

// =============================================================================
// Payload Builders
// =============================================================================

/// One cart line priced at $10.00 retail and $8.00 wholesale.
#[must_use]
pub fn cart_line(variant_id: &str, quantity: u32) -> Value {
    json!({
        "variantId": variant_id,
        "productId": format!("product-{variant_id}"),
        "quantity": quantity,
        "unitPriceRetail": "10.00",
        "unitPriceWholesale": "8.00",
        "displayAttributes": { "title": format!("Item {variant_id}") }
    })
}

/// A cart response body.
#[must_use]
pub fn cart_json(lines: &[(&str, u32)]) -> Value {
    let items: Vec<Value> = lines
        .iter()
        .map(|(variant_id, quantity)| cart_line(variant_id, *quantity))
        .collect();
    json!({ "items": items })
}

/// A wishlist response body.
#[must_use]
pub fn wishlist_json(product_ids: &[&str]) -> Value {
    json!({ "productIds": product_ids })
}

// =============================================================================
// Recording Renderer
// =============================================================================

/// One call the cart engine made on its render target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderCall {
    Render(Vec<(VariantId, u32)>),
    Remove(Vec<VariantId>),
    Update(Vec<(VariantId, u32)>),
    PendingRemoval(VariantId, bool),
    Wholesale(bool),
}

/// Render target that records every call.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    calls: Mutex<Vec<RenderCall>>,
}

impl RecordingRenderer {
    fn push(&self, call: RenderCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    /// Every call so far.
    pub fn calls(&self) -> Vec<RenderCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wholesale banner switches, in order.
    pub fn wholesale_flips(&self) -> Vec<bool> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RenderCall::Wholesale(active) => Some(active),
                _ => None,
            })
            .collect()
    }

    /// Forget recorded calls.
    pub fn reset(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

fn quantities(lines: &[RenderedLine]) -> Vec<(VariantId, u32)> {
    lines
        .iter()
        .map(|line| (line.variant_id.clone(), line.quantity))
        .collect()
}

impl CartRenderer for RecordingRenderer {
    fn render(&self, added: &[RenderedLine]) {
        self.push(RenderCall::Render(quantities(added)));
    }

    fn remove(&self, removed: &[VariantId]) {
        self.push(RenderCall::Remove(removed.to_vec()));
    }

    fn update(&self, updated: &[RenderedLine]) {
        self.push(RenderCall::Update(quantities(updated)));
    }

    fn set_pending_removal(&self, variant_id: &VariantId, pending: bool) {
        self.push(RenderCall::PendingRemoval(variant_id.clone(), pending));
    }

    fn set_wholesale(&self, active: bool) {
        self.push(RenderCall::Wholesale(active));
    }
}
