//! Data models
//!
//! Rows of the four remote collections. Every row is owned by the backend;
//! the client holds read-only snapshots and sends typed inserts/patches.
//! IDs are opaque strings assigned by the backend.

pub mod cart;
pub mod menu_item;
pub mod order;

// Re-exports
pub use cart::*;
pub use menu_item::*;
pub use order::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Remote collection names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    MenuItems,
    CartItems,
    Orders,
    OrderLines,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::MenuItems,
        Collection::CartItems,
        Collection::Orders,
        Collection::OrderLines,
    ];

    /// Table name on the backend
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::MenuItems => "menu_items",
            Collection::CartItems => "cart_items",
            Collection::Orders => "orders",
            Collection::OrderLines => "order_lines",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown collection: {}", s))
    }
}
