//! Cart commands.
//!
//! Every command fetches the cart first. Changes made afterwards are echoed
//! by the [`TerminalRenderer`] as `+`, `-`, and `~` lines.

use basket_client::Basket;
use basket_client::cart::QuantityChange;
use basket_core::VariantId;

use super::CommandError;
use crate::render::{TerminalRenderer, print_cart};

async fn load(basket: &Basket, renderer: &TerminalRenderer) -> Result<(), CommandError> {
    basket.cart().fetch_snapshot().await?;
    renderer.go_live();
    Ok(())
}

/// Print the cart.
pub async fn show(basket: &Basket) -> Result<(), CommandError> {
    let snapshot = basket.cart().fetch_snapshot().await?;
    print_cart(&basket.cart().lines(), &snapshot);
    Ok(())
}

/// Set the quantity of a line; zero or less removes it.
pub async fn set(
    basket: &Basket,
    renderer: &TerminalRenderer,
    variant: &str,
    quantity: i64,
) -> Result<(), CommandError> {
    load(basket, renderer).await?;
    let variant_id = VariantId::new(variant);

    match basket.cart().set_quantity(&variant_id, quantity).await? {
        QuantityChange::Updated { previous, current } => {
            tracing::info!("{variant_id}: {previous} -> {current}");
        }
        QuantityChange::Removed => tracing::info!("{variant_id} removed"),
        QuantityChange::Coalesced => {}
    }
    Ok(())
}

/// Remove a line.
pub async fn remove(
    basket: &Basket,
    renderer: &TerminalRenderer,
    variant: &str,
) -> Result<(), CommandError> {
    load(basket, renderer).await?;
    let variant_id = VariantId::new(variant);
    basket.cart().remove(&variant_id).await?;
    tracing::info!("{variant_id} removed");
    Ok(())
}

/// Remove every line.
pub async fn clear(basket: &Basket, renderer: &TerminalRenderer) -> Result<(), CommandError> {
    load(basket, renderer).await?;
    basket.cart().clear().await?;
    tracing::info!("Cart cleared");
    Ok(())
}
