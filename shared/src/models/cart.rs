//! Cart Model

use serde::{Deserialize, Serialize};

use super::MenuItem;

/// Cart line entity
///
/// At most one line exists per (user_id, menu_item_id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: String,
    pub user_id: String,
    /// Menu item reference (String ID)
    pub menu_item_id: String,
    pub quantity: u32,
}

/// Create cart line payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLineCreate {
    pub user_id: String,
    pub menu_item_id: String,
    pub quantity: u32,
}

/// Update cart line payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLineUpdate {
    pub quantity: u32,
}

/// Cart line joined with its menu item (read-time view, never stored)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartEntry {
    pub line: CartLine,
    pub item: MenuItem,
}

impl CartEntry {
    /// price × quantity
    pub fn subtotal(&self) -> u64 {
        self.item.price.saturating_mul(u64::from(self.line.quantity))
    }
}
