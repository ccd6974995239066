//! Integration tests for the cart state engine.
//!
//! Optimistic quantity edits, rollback, out-of-order responses, debouncing,
//! and the wholesale pricing switch, all against a mock cart API.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use basket_client::cart::{CartError, QuantityChange};
use basket_core::{VariantId, format_amount};
use basket_integration_tests::{RenderCall, TestContext, cart_json};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, ResponseTemplate};

fn v(id: &str) -> VariantId {
    VariantId::new(id)
}

async fn mount_cart(ctx: &TestContext, owner: &str, lines: &[(&str, u32)]) {
    Mock::given(method("GET"))
        .and(path(format!("/cart/{owner}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(cart_json(lines)))
        .mount(&ctx.server)
        .await;
}

fn quantity_of(ctx: &TestContext, variant_id: &str) -> Option<u32> {
    ctx.basket
        .cart()
        .snapshot()
        .get(&v(variant_id))
        .map(|item| item.quantity.get())
}

// =============================================================================
// Quantity Updates
// =============================================================================

#[tokio::test]
async fn test_quantity_zero_deletes_line() {
    let ctx = TestContext::start().await;
    ctx.seed_session("7", "a1", "r1");
    mount_cart(&ctx, "7", &[("v1", 2), ("v2", 1)]).await;
    Mock::given(method("DELETE"))
        .and(path("/cart/7/item/v1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&ctx.server)
        .await;

    let cart = ctx.basket.cart();
    cart.fetch_snapshot().await.unwrap();
    ctx.renderer.reset();

    let change = cart.set_quantity(&v("v1"), 0).await.unwrap();

    assert_eq!(change, QuantityChange::Removed);
    assert_eq!(quantity_of(&ctx, "v1"), None);
    assert_eq!(quantity_of(&ctx, "v2"), Some(1));
    assert!(!cart.is_pending_removal(&v("v1")));
    assert_eq!(
        ctx.renderer.calls(),
        vec![
            RenderCall::PendingRemoval(v("v1"), true),
            RenderCall::Remove(vec![v("v1")]),
        ]
    );
}

#[tokio::test]
async fn test_update_sends_patch_and_confirms() {
    let ctx = TestContext::start().await;
    mount_cart(&ctx, "guest", &[("v1", 1)]).await;
    Mock::given(method("PATCH"))
        .and(path("/cart/guest/item/v1"))
        .and(body_json(json!({ "quantity": 3 })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&ctx.server)
        .await;

    let cart = ctx.basket.cart();
    cart.fetch_snapshot().await.unwrap();
    let change = cart.set_quantity(&v("v1"), 3).await.unwrap();

    assert!(matches!(
        change,
        QuantityChange::Updated { previous, current } if previous.get() == 1 && current.get() == 3
    ));
    assert_eq!(quantity_of(&ctx, "v1"), Some(3));
}

#[tokio::test]
async fn test_unknown_line_is_rejected_locally() {
    let ctx = TestContext::start().await;
    mount_cart(&ctx, "guest", &[("v1", 1)]).await;

    let cart = ctx.basket.cart();
    cart.fetch_snapshot().await.unwrap();
    let result = cart.set_quantity(&v("missing"), 2).await;

    assert!(matches!(result, Err(CartError::NotInCart(id)) if id == v("missing")));
    assert_eq!(ctx.server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_update_rolls_back() {
    let ctx = TestContext::start().await;
    mount_cart(&ctx, "guest", &[("v1", 2)]).await;
    Mock::given(method("PATCH"))
        .and(path("/cart/guest/item/v1"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&ctx.server)
        .await;

    let cart = ctx.basket.cart();
    cart.fetch_snapshot().await.unwrap();
    ctx.renderer.reset();

    let result = cart.set_quantity(&v("v1"), 4).await;

    match result {
        Err(CartError::Mutation {
            variant_id,
            previous,
            ..
        }) => {
            assert_eq!(variant_id, v("v1"));
            assert_eq!(previous.get(), 2);
        }
        other => panic!("expected a mutation error, got {other:?}"),
    }
    assert_eq!(quantity_of(&ctx, "v1"), Some(2));
    assert_eq!(
        ctx.renderer.calls(),
        vec![
            RenderCall::Update(vec![(v("v1"), 4)]),
            RenderCall::Update(vec![(v("v1"), 2)]),
        ]
    );
}

#[tokio::test]
async fn test_failed_removal_restores_line() {
    let ctx = TestContext::start().await;
    mount_cart(&ctx, "guest", &[("v1", 2)]).await;
    Mock::given(method("DELETE"))
        .and(path("/cart/guest/item/v1"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&ctx.server)
        .await;

    let cart = ctx.basket.cart();
    cart.fetch_snapshot().await.unwrap();

    let result = cart.remove(&v("v1")).await;

    assert!(matches!(result, Err(CartError::Removal { .. })));
    assert_eq!(quantity_of(&ctx, "v1"), Some(2));
    assert!(!cart.is_pending_removal(&v("v1")));
}

#[tokio::test]
async fn test_session_loss_surfaces_through_cart() {
    let ctx = TestContext::start().await;
    ctx.seed_session("7", "a1", "r1");
    mount_cart(&ctx, "7", &[("v1", 1)]).await;
    Mock::given(method("PATCH"))
        .and(path("/cart/7/item/v1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&ctx.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&ctx.server)
        .await;

    let cart = ctx.basket.cart();
    cart.fetch_snapshot().await.unwrap();
    let result = cart.set_quantity(&v("v1"), 2).await;

    match result {
        Err(CartError::Mutation { source, .. }) => assert!(source.is_session_lost()),
        other => panic!("expected a mutation error, got {other:?}"),
    }
    assert_eq!(quantity_of(&ctx, "v1"), Some(1));
    assert!(!ctx.basket.session().credentials().is_authenticated().unwrap());
}

// =============================================================================
// Ordering
// =============================================================================

#[tokio::test]
async fn test_late_failure_of_superseded_update_is_ignored() {
    let ctx = TestContext::start().await;
    mount_cart(&ctx, "guest", &[("v1", 1)]).await;
    Mock::given(method("PATCH"))
        .and(path("/cart/guest/item/v1"))
        .and(body_json(json!({ "quantity": 3 })))
        .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(200)))
        .mount(&ctx.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/cart/guest/item/v1"))
        .and(body_json(json!({ "quantity": 4 })))
        .respond_with(ResponseTemplate::new(200))
        .mount(&ctx.server)
        .await;

    let cart = ctx.basket.cart();
    cart.fetch_snapshot().await.unwrap();

    let v1_id = v("v1");
    let (slow, fast) = tokio::join!(
        cart.set_quantity(&v1_id, 3),
        cart.set_quantity(&v1_id, 4)
    );

    assert!(slow.is_err());
    assert!(fast.is_ok());
    assert_eq!(quantity_of(&ctx, "v1"), Some(4));
}

#[tokio::test]
async fn test_late_success_of_superseded_update_is_ignored() {
    let ctx = TestContext::start().await;
    mount_cart(&ctx, "guest", &[("v1", 1)]).await;
    Mock::given(method("PATCH"))
        .and(path("/cart/guest/item/v1"))
        .and(body_json(json!({ "quantity": 3 })))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(200)))
        .mount(&ctx.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/cart/guest/item/v1"))
        .and(body_json(json!({ "quantity": 4 })))
        .respond_with(ResponseTemplate::new(200))
        .mount(&ctx.server)
        .await;

    let cart = ctx.basket.cart();
    cart.fetch_snapshot().await.unwrap();

    let v1_id = v("v1");
    let (slow, fast) = tokio::join!(
        cart.set_quantity(&v1_id, 3),
        cart.set_quantity(&v1_id, 4)
    );

    assert!(slow.is_ok());
    assert!(fast.is_ok());
    assert_eq!(quantity_of(&ctx, "v1"), Some(4));
}

#[tokio::test]
async fn test_older_success_lands_after_newer_failure_rolls_back() {
    let ctx = TestContext::start().await;
    mount_cart(&ctx, "guest", &[("v1", 2)]).await;
    Mock::given(method("PATCH"))
        .and(path("/cart/guest/item/v1"))
        .and(body_json(json!({ "quantity": 3 })))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
        .mount(&ctx.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/cart/guest/item/v1"))
        .and(body_json(json!({ "quantity": 5 })))
        .respond_with(ResponseTemplate::new(409))
        .mount(&ctx.server)
        .await;

    let cart = ctx.basket.cart();
    cart.fetch_snapshot().await.unwrap();
    ctx.renderer.reset();

    let v1_id = v("v1");
    let (first, second) = tokio::join!(cart.set_quantity(&v1_id, 3), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cart.set_quantity(&v("v1"), 5).await
    });

    assert!(matches!(
        first.unwrap(),
        QuantityChange::Updated { current, .. } if current.get() == 3
    ));
    assert!(matches!(second, Err(CartError::Mutation { .. })));
    // The server kept the first update; so does the local cart.
    assert_eq!(quantity_of(&ctx, "v1"), Some(3));
    assert_eq!(
        ctx.renderer.calls(),
        vec![
            RenderCall::Update(vec![(v("v1"), 3)]),
            RenderCall::Update(vec![(v("v1"), 5)]),
            RenderCall::Update(vec![(v("v1"), 2)]),
            RenderCall::Update(vec![(v("v1"), 3)]),
        ]
    );
}

#[tokio::test]
async fn test_removal_wins_over_failed_later_update() {
    let ctx = TestContext::start().await;
    mount_cart(&ctx, "guest", &[("v1", 2), ("v2", 1)]).await;
    Mock::given(method("DELETE"))
        .and(path("/cart/guest/item/v1"))
        .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_millis(200)))
        .expect(1)
        .mount(&ctx.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/cart/guest/item/v1"))
        .respond_with(ResponseTemplate::new(409))
        .mount(&ctx.server)
        .await;

    let cart = ctx.basket.cart();
    cart.fetch_snapshot().await.unwrap();

    let v1_id = v("v1");
    let (removed, updated) = tokio::join!(cart.remove(&v1_id), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cart.set_quantity(&v("v1"), 5).await
    });

    removed.unwrap();
    assert!(matches!(updated, Err(CartError::Mutation { .. })));
    assert_eq!(quantity_of(&ctx, "v1"), None);
    assert_eq!(quantity_of(&ctx, "v2"), Some(1));
    assert!(!cart.is_pending_removal(&v("v1")));
}

#[tokio::test]
async fn test_failed_update_after_confirmed_removal_drops_line() {
    let ctx = TestContext::start().await;
    mount_cart(&ctx, "guest", &[("v1", 2)]).await;
    Mock::given(method("DELETE"))
        .and(path("/cart/guest/item/v1"))
        .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_millis(100)))
        .mount(&ctx.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/cart/guest/item/v1"))
        .respond_with(ResponseTemplate::new(404).set_delay(Duration::from_millis(300)))
        .mount(&ctx.server)
        .await;

    let cart = ctx.basket.cart();
    cart.fetch_snapshot().await.unwrap();

    let v1_id = v("v1");
    let (removed, updated) = tokio::join!(cart.remove(&v1_id), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cart.set_quantity(&v("v1"), 5).await
    });

    // The DELETE lands while the newer update still owns the line; when that
    // update fails, the line goes back to what the server holds: nothing.
    removed.unwrap();
    assert!(updated.is_err());
    assert_eq!(quantity_of(&ctx, "v1"), None);
    assert!(!cart.is_pending_removal(&v("v1")));
}

#[tokio::test]
async fn test_debounced_burst_sends_one_patch() {
    let ctx = TestContext::start().await;
    mount_cart(&ctx, "guest", &[("v1", 1)]).await;
    Mock::given(method("PATCH"))
        .and(path("/cart/guest/item/v1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&ctx.server)
        .await;

    let cart = ctx.basket.cart();
    cart.fetch_snapshot().await.unwrap();

    let v1_id = v("v1");
    let (first, second, third) = tokio::join!(
        cart.set_quantity_debounced(&v1_id, 2),
        cart.set_quantity_debounced(&v1_id, 3),
        cart.set_quantity_debounced(&v1_id, 4)
    );

    assert_eq!(first.unwrap(), QuantityChange::Coalesced);
    assert_eq!(second.unwrap(), QuantityChange::Coalesced);
    assert!(matches!(
        third.unwrap(),
        QuantityChange::Updated { previous, current } if previous.get() == 1 && current.get() == 4
    ));

    let patch = ctx
        .server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|request| request.method.as_str() == "PATCH")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&patch.body).unwrap();
    assert_eq!(body, json!({ "quantity": 4 }));
}

// =============================================================================
// Wholesale Pricing
// =============================================================================

#[tokio::test]
async fn test_wholesale_switches_at_threshold() {
    let ctx = TestContext::start().await;
    mount_cart(&ctx, "guest", &[("v1", 4), ("v2", 1)]).await;
    Mock::given(method("PATCH"))
        .and(path("/cart/guest/item/v1"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&ctx.server)
        .await;

    let cart = ctx.basket.cart();
    cart.fetch_snapshot().await.unwrap();
    assert!(ctx.renderer.wholesale_flips().is_empty());

    cart.set_quantity(&v("v1"), 5).await.unwrap();
    assert!(cart.snapshot().wholesale_active());
    for line in cart.lines() {
        assert_eq!(format_amount(line.unit_price), "$8.00");
    }

    cart.set_quantity(&v("v1"), 4).await.unwrap();
    assert!(!cart.snapshot().wholesale_active());
    for line in cart.lines() {
        assert_eq!(format_amount(line.unit_price), "$10.00");
    }

    assert_eq!(ctx.renderer.wholesale_flips(), vec![true, false]);
}

#[tokio::test]
async fn test_wholesale_flip_redraws_untouched_lines() {
    let ctx = TestContext::start().await;
    mount_cart(&ctx, "guest", &[("v1", 5), ("v2", 1)]).await;
    Mock::given(method("DELETE"))
        .and(path("/cart/guest/item/v2"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&ctx.server)
        .await;

    let cart = ctx.basket.cart();
    cart.fetch_snapshot().await.unwrap();
    assert_eq!(ctx.renderer.wholesale_flips(), vec![true]);
    ctx.renderer.reset();

    cart.remove(&v("v2")).await.unwrap();

    let calls = ctx.renderer.calls();
    assert!(calls.contains(&RenderCall::Remove(vec![v("v2")])));
    assert!(calls.contains(&RenderCall::Update(vec![(v("v1"), 5)])));
    assert!(calls.contains(&RenderCall::Wholesale(false)));
}

// =============================================================================
// Clear & Identity
// =============================================================================

#[tokio::test]
async fn test_clear_empties_cart() {
    let ctx = TestContext::start().await;
    mount_cart(&ctx, "guest", &[("v1", 1), ("v2", 2)]).await;
    Mock::given(method("DELETE"))
        .and(path("/cart/guest"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&ctx.server)
        .await;

    let cart = ctx.basket.cart();
    cart.fetch_snapshot().await.unwrap();
    cart.clear().await.unwrap();

    assert!(cart.snapshot().is_empty());
    assert!(cart.lines().is_empty());
}

#[tokio::test]
async fn test_identity_change_replaces_rendered_cart() {
    let ctx = TestContext::start().await;
    mount_cart(&ctx, "guest", &[("v1", 1)]).await;
    mount_cart(&ctx, "7", &[("v9", 2)]).await;

    let cart = ctx.basket.cart();
    cart.fetch_snapshot().await.unwrap();
    ctx.renderer.reset();

    ctx.seed_session("7", "a1", "r1");
    cart.fetch_snapshot().await.unwrap();

    assert_eq!(
        ctx.renderer.calls(),
        vec![
            RenderCall::Remove(vec![v("v1")]),
            RenderCall::Render(vec![(v("v9"), 2)]),
        ]
    );
    assert_eq!(quantity_of(&ctx, "v9"), Some(2));
    assert_eq!(quantity_of(&ctx, "v1"), None);
}
