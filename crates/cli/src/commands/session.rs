//! Session lifecycle commands.
//!
//! # Usage
//!
//! ```bash
//! BASKET_PASSWORD=... basket login -e shopper@example.com
//! basket refresh
//! basket logout
//! ```

use basket_client::Basket;
use secrecy::SecretString;

use super::CommandError;

/// Log in, then report how the guest cart and wishlist were merged.
pub async fn login(basket: &Basket, email: &str, password: String) -> Result<(), CommandError> {
    let password = SecretString::from(password);
    let outcome = basket.login(email, &password).await?;

    tracing::info!("Logged in as user {} ({})", outcome.user_id, outcome.role);
    match &outcome.cart {
        Ok(merge) if merge.merged.is_empty() && merge.failed.is_empty() => {}
        Ok(merge) => {
            tracing::info!("Guest cart merged: {} line(s)", merge.merged.len());
            for variant_id in &merge.failed {
                tracing::warn!("Could not merge cart line {variant_id}; guest cart kept");
            }
        }
        Err(e) => tracing::warn!("Guest cart was not merged: {e}"),
    }

    let pending = outcome.wishlist.replication.len();
    tracing::info!(
        "Wishlist: {} product(s), {pending} added from guest",
        outcome.wishlist.merged.len()
    );
    if pending > 0 {
        let result = outcome.wishlist.replication.wait().await;
        for (product_id, e) in &result.failed {
            tracing::warn!("Wishlist product {product_id} not saved to account: {e}");
        }
    }
    Ok(())
}

/// Forget the stored session.
pub fn logout(basket: &Basket) -> Result<(), CommandError> {
    if basket.logout()? {
        tracing::info!("Logged out");
    } else {
        tracing::info!("Not logged in");
    }
    Ok(())
}

/// Refresh the access token now.
pub async fn refresh(basket: &Basket) -> Result<(), CommandError> {
    if basket.identity()?.is_guest() {
        return Err(CommandError::NotLoggedIn);
    }
    basket.refresh().await?;
    tracing::info!("Access token refreshed");
    Ok(())
}
