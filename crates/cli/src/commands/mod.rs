//! Command implementations.

pub mod cart;
pub mod session;
pub mod wishlist;

use basket_client::cart::CartError;
use basket_client::wishlist::WishlistError;
use basket_client::ClientError;
use thiserror::Error;

/// Errors a command can end with.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Wishlist(#[from] WishlistError),

    /// The command needs a logged-in user.
    #[error("Not logged in. Run `basket login` first")]
    NotLoggedIn,
}
