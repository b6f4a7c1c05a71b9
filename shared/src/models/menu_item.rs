//! Menu Item Model

use serde::{Deserialize, Serialize};

/// Menu item entity (a dish on the live menu)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: String,
    pub name: String,
    /// Whole currency units, no minor unit
    pub price: u64,
    /// Grouping key on the menu
    pub category: String,
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
}
