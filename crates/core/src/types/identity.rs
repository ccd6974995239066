//! Identity, surface, and role types.
//!
//! An [`Identity`] decides which namespace cart and wishlist state is cached
//! under. A [`Surface`] separates the storefront, admin, and inventory clients
//! so they never read each other's credentials.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::id::UserId;

/// Who the client is acting as.
///
/// This is the only representation of "not logged in": there is no sentinel
/// user id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Identity {
    /// Anonymous shopper backed by an anonymous server session.
    #[default]
    Guest,
    /// Authenticated user.
    User(UserId),
}

impl Identity {
    /// Build an identity from an optional user id.
    #[must_use]
    pub fn from_user(user: Option<UserId>) -> Self {
        user.map_or(Self::Guest, Self::User)
    }

    /// The authenticated user, if any.
    #[must_use]
    pub const fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::Guest => None,
            Self::User(id) => Some(id),
        }
    }

    /// Returns `true` for the guest identity.
    #[must_use]
    pub const fn is_guest(&self) -> bool {
        matches!(self, Self::Guest)
    }

    /// Local cache namespace (`guest` or `user:<id>`).
    #[must_use]
    pub fn namespace(&self) -> String {
        match self {
            Self::Guest => "guest".to_string(),
            Self::User(id) => format!("user:{id}"),
        }
    }

    /// Path segment used in remote resource URLs (`guest` or the user id).
    #[must_use]
    pub fn path_segment(&self) -> &str {
        match self {
            Self::Guest => "guest",
            Self::User(id) => id.as_str(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.namespace())
    }
}

/// Error returned when parsing a [`Surface`] or [`Role`] from a string.
#[derive(Debug, Clone, Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseKindError {
    kind: &'static str,
    value: String,
}

/// Client surface a session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    /// Public storefront.
    #[default]
    Storefront,
    /// Back-office administration.
    Admin,
    /// Warehouse / inventory tooling.
    Inventory,
}

impl Surface {
    /// Key prefix for everything this surface stores locally.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Storefront => "storefront",
            Self::Admin => "admin",
            Self::Inventory => "inventory",
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Surface {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "storefront" => Ok(Self::Storefront),
            "admin" => Ok(Self::Admin),
            "inventory" => Ok(Self::Inventory),
            other => Err(ParseKindError {
                kind: "surface",
                value: other.to_string(),
            }),
        }
    }
}

/// Role granted to an authenticated session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular shopper.
    #[default]
    Customer,
    /// Store administrator.
    Admin,
    /// Inventory / warehouse staff.
    Inventory,
}

impl Role {
    /// Wire / storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Admin => "admin",
            Self::Inventory => "inventory",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(Self::Customer),
            "admin" => Ok(Self::Admin),
            "inventory" => Ok(Self::Inventory),
            other => Err(ParseKindError {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}
