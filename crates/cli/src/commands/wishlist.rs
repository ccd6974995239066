//! Wishlist commands.
//!
//! Guests keep their wishlist on this device only. For a logged-in user the
//! command waits for the server to acknowledge each change before exiting.

use basket_client::Basket;
use basket_core::{ProductId, Toggle};

use super::CommandError;
use crate::render::print_wishlist;

/// Print the wishlist, refreshed from the server when logged in.
pub async fn show(basket: &Basket) -> Result<(), CommandError> {
    let wishlist = basket.wishlist().fetch().await?;
    print_wishlist(&wishlist);
    Ok(())
}

/// Add or remove a product.
pub async fn toggle(basket: &Basket, product: &str) -> Result<(), CommandError> {
    let outcome = basket.wishlist().toggle(ProductId::new(product))?;
    match outcome.toggle {
        Toggle::Added => tracing::info!("{product} added to wishlist"),
        Toggle::Removed => tracing::info!("{product} removed from wishlist"),
    }

    if let Some(ticket) = outcome.replication
        && let Err(e) = ticket.wait().await
    {
        tracing::warn!("Wishlist change not saved to account: {e}");
    }
    Ok(())
}

/// Remove every product.
pub async fn clear(basket: &Basket) -> Result<(), CommandError> {
    let batch = basket.wishlist().clear()?;
    let result = batch.wait().await;
    for (product_id, e) in &result.failed {
        tracing::warn!("{product_id} not removed from account: {e}");
    }
    tracing::info!("Wishlist cleared");
    Ok(())
}
