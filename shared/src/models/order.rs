//! Order Model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Order status
///
/// Monotonic: `Pending → Preparing → Completed`. Only the kitchen side
/// moves it forward; the derived `Ord` follows the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    #[serde(alias = "En attente")]
    Pending,
    #[serde(alias = "En préparation")]
    Preparing,
    #[serde(alias = "Terminée")]
    Completed,
}

impl OrderStatus {
    /// Terminal state, the order lifecycle ends here
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed)
    }

    /// Whether moving to `next` keeps the lifecycle monotonic
    pub fn can_advance_to(&self, next: OrderStatus) -> bool {
        next > *self
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Preparing => "Preparing",
            OrderStatus::Completed => "Completed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment method tag (fixed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "wave")]
    Wave,
    #[serde(rename = "orange_money")]
    OrangeMoney,
    #[serde(rename = "mtn_momo")]
    MtnMomo,
    #[serde(rename = "moov_money")]
    MoovMoney,
    #[serde(rename = "carte")]
    Card,
    #[serde(rename = "especes")]
    Cash,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 6] = [
        PaymentMethod::Wave,
        PaymentMethod::OrangeMoney,
        PaymentMethod::MtnMomo,
        PaymentMethod::MoovMoney,
        PaymentMethod::Card,
        PaymentMethod::Cash,
    ];

    /// Wire id stored in `orders.payment_method`
    pub fn id(&self) -> &'static str {
        match self {
            PaymentMethod::Wave => "wave",
            PaymentMethod::OrangeMoney => "orange_money",
            PaymentMethod::MtnMomo => "mtn_momo",
            PaymentMethod::MoovMoney => "moov_money",
            PaymentMethod::Card => "carte",
            PaymentMethod::Cash => "especes",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PaymentMethod::Wave => "Wave",
            PaymentMethod::OrangeMoney => "Orange Money",
            PaymentMethod::MtnMomo => "MTN Mobile Money",
            PaymentMethod::MoovMoney => "Moov Money",
            PaymentMethod::Card => "Bank card",
            PaymentMethod::Cash => "Cash",
        }
    }

    /// Everything except cash goes through a payment provider
    pub fn is_electronic(&self) -> bool {
        !matches!(self, PaymentMethod::Cash)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentMethod::ALL
            .into_iter()
            .find(|m| m.id() == s)
            .ok_or_else(|| format!("unknown payment method: {}", s))
    }
}

/// Order entity
///
/// Immutable once created except `status`, which only the backend moves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub table_number: u32,
    /// Σ unit price × quantity, computed client-side at submission
    pub total_amount: u64,
    pub status: OrderStatus,
    /// Email or phone
    pub contact: String,
    pub payment_method: PaymentMethod,
    /// RFC 3339, set by the backend
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Order {
    /// Short human reference (first 8 chars of the id, upper-cased)
    pub fn short_ref(&self) -> String {
        self.id.chars().take(8).collect::<String>().to_uppercase()
    }
}

/// Create order payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreate {
    pub user_id: String,
    pub table_number: u32,
    pub total_amount: u64,
    pub status: OrderStatus,
    pub contact: String,
    pub payment_method: PaymentMethod,
}

/// Order line entity
///
/// `unit_price` is captured at order time so historical invoices do not
/// move with later menu price changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub order_id: String,
    pub menu_item_id: String,
    pub quantity: u32,
    pub unit_price: u64,
}

impl OrderLine {
    pub fn line_total(&self) -> u64 {
        self.unit_price.saturating_mul(u64::from(self.quantity))
    }
}
