//! Order history
//!
//! All orders of the user, newest first, each joined with its lines and
//! the menu item names. Re-fetched on any change to the user's orders.

use parking_lot::RwLock;
use shared::models::{Collection, MenuItem, Order, OrderLine};
use shared::query::{Filter, Query, Sort};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::RestaurantConfig;
use crate::gateway::Gateway;
use crate::invoice::{self, InvoiceDocument, InvoiceLine};
use crate::message::{BusError, ChangeBus, ChannelSpec, Watch, watch};
use crate::ClientResult;

/// Bus channel of the history watcher
pub const HISTORY_CHANNEL: &str = "orders-history";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRecord {
    pub order: Order,
    pub lines: Vec<InvoiceLine>,
}

impl OrderRecord {
    /// Σ quantity
    pub fn total_articles(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).fold(0, u32::saturating_add)
    }
}

#[derive(Clone)]
pub struct OrderHistory {
    gateway: Gateway,
    user_id: Arc<str>,
    records: Arc<RwLock<Vec<OrderRecord>>>,
}

impl std::fmt::Debug for OrderHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderHistory")
            .field("user_id", &self.user_id)
            .field("orders", &self.records.read().len())
            .finish()
    }
}

impl OrderHistory {
    pub fn new(gateway: Gateway, user_id: impl Into<Arc<str>>) -> Self {
        Self {
            gateway,
            user_id: user_id.into(),
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn refresh(&self) -> ClientResult<Vec<OrderRecord>> {
        let orders: Vec<Order> = self
            .gateway
            .list(
                &Query::all(Collection::Orders)
                    .filter(Filter::eq("user_id", self.user_id.as_ref()))
                    .order_by(Sort::desc("created_at")),
            )
            .await?;

        let records = if orders.is_empty() {
            Vec::new()
        } else {
            let order_ids: Vec<String> = orders.iter().map(|o| o.id.clone()).collect();
            let lines: Vec<OrderLine> = self
                .gateway
                .list(&Query::all(Collection::OrderLines).filter(Filter::is_in("order_id", order_ids)))
                .await?;

            let mut item_ids: Vec<String> = lines.iter().map(|l| l.menu_item_id.clone()).collect();
            item_ids.sort();
            item_ids.dedup();
            let names: HashMap<String, String> = if item_ids.is_empty() {
                HashMap::new()
            } else {
                self.gateway
                    .list::<MenuItem>(&Query::all(Collection::MenuItems).filter(Filter::is_in("id", item_ids)))
                    .await?
                    .into_iter()
                    .map(|item| (item.id, item.name))
                    .collect()
            };

            let mut by_order: HashMap<String, Vec<InvoiceLine>> = HashMap::new();
            for line in lines {
                let name = names
                    .get(&line.menu_item_id)
                    .cloned()
                    .unwrap_or_else(|| line.menu_item_id.clone());
                by_order.entry(line.order_id).or_default().push(InvoiceLine {
                    name,
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                });
            }

            orders
                .into_iter()
                .map(|order| OrderRecord {
                    lines: by_order.remove(&order.id).unwrap_or_default(),
                    order,
                })
                .collect()
        };

        *self.records.write() = records.clone();
        Ok(records)
    }

    pub fn records(&self) -> Vec<OrderRecord> {
        self.records.read().clone()
    }

    pub fn find(&self, order_id: &str) -> Option<OrderRecord> {
        self.records
            .read()
            .iter()
            .find(|r| r.order.id == order_id)
            .cloned()
    }

    /// Invoice of a loaded order
    pub fn invoice(&self, order_id: &str, restaurant: &RestaurantConfig) -> Option<InvoiceDocument> {
        self.find(order_id)
            .map(|record| invoice::render(&record.order, &record.lines, restaurant))
    }

    pub fn watch(&self, bus: &ChangeBus) -> Result<Watch, BusError> {
        let history = self.clone();
        let spec = ChannelSpec::new(HISTORY_CHANNEL, Collection::Orders)
            .filter(Filter::eq("user_id", self.user_id.as_ref()));
        watch(bus, spec, move || {
            let history = history.clone();
            async move {
                if let Err(e) = history.refresh().await {
                    tracing::error!(user_id = %history.user_id, error = %e, "Order history refresh failed");
                }
            }
        })
    }
}
