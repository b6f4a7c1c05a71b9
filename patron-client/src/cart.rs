//! Cart synchronizer
//!
//! Every intent is a remote mutation followed by a full re-fetch; the
//! re-fetched snapshot is the only state the UI sees. Nothing is applied
//! optimistically, so a failed call leaves the last snapshot in place.

use parking_lot::RwLock;
use shared::models::{CartEntry, CartLine, CartLineCreate, CartLineUpdate, Collection, MenuItem};
use shared::query::{Filter, Query};
use std::collections::HashMap;
use std::sync::Arc;

use crate::gateway::Gateway;
use crate::message::{BusError, ChangeBus, ChannelSpec, Watch, watch};
use crate::transient::{Notice, NoticeBoard};
use crate::{ClientResult, ValidationError};

/// Bus channel of the cart watcher
pub const CART_CHANNEL: &str = "cart";

/// Cart lines joined with their menu items
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartSnapshot {
    pub entries: Vec<CartEntry>,
}

impl CartSnapshot {
    /// Σ price × quantity, recomputed on every call
    pub fn total(&self) -> u64 {
        self.entries
            .iter()
            .map(CartEntry::subtotal)
            .fold(0, u64::saturating_add)
    }

    /// Badge count (Σ quantity)
    pub fn item_count(&self) -> u32 {
        self.entries
            .iter()
            .map(|e| e.line.quantity)
            .fold(0, u32::saturating_add)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn line_for(&self, menu_item_id: &str) -> Option<&CartEntry> {
        self.entries
            .iter()
            .find(|e| e.line.menu_item_id == menu_item_id)
    }
}

#[derive(Clone)]
pub struct CartSync {
    gateway: Gateway,
    user_id: Arc<str>,
    snapshot: Arc<RwLock<CartSnapshot>>,
    notices: Arc<NoticeBoard>,
}

impl std::fmt::Debug for CartSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartSync")
            .field("user_id", &self.user_id)
            .field("lines", &self.snapshot.read().len())
            .finish()
    }
}

impl CartSync {
    pub fn new(gateway: Gateway, user_id: impl Into<Arc<str>>, notices: Arc<NoticeBoard>) -> Self {
        Self {
            gateway,
            user_id: user_id.into(),
            snapshot: Arc::new(RwLock::new(CartSnapshot::default())),
            notices,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Last fetched snapshot
    pub fn snapshot(&self) -> CartSnapshot {
        self.snapshot.read().clone()
    }

    fn user_filter(&self) -> Filter {
        Filter::eq("user_id", self.user_id.as_ref())
    }

    /// Re-read the cart and join it with the menu
    pub async fn refresh(&self) -> ClientResult<CartSnapshot> {
        let lines: Vec<CartLine> = self
            .gateway
            .list(&Query::all(Collection::CartItems).filter(self.user_filter()))
            .await?;

        let entries = if lines.is_empty() {
            Vec::new()
        } else {
            let ids: Vec<String> = lines.iter().map(|l| l.menu_item_id.clone()).collect();
            let items: HashMap<String, MenuItem> = self
                .gateway
                .list::<MenuItem>(&Query::all(Collection::MenuItems).filter(Filter::is_in("id", ids)))
                .await?
                .into_iter()
                .map(|item| (item.id.clone(), item))
                .collect();

            lines
                .into_iter()
                .filter_map(|line| match items.get(&line.menu_item_id) {
                    Some(item) => Some(CartEntry {
                        item: item.clone(),
                        line,
                    }),
                    None => {
                        tracing::warn!(
                            line_id = %line.id,
                            menu_item_id = %line.menu_item_id,
                            "Cart line references an unknown menu item, skipped"
                        );
                        None
                    }
                })
                .collect()
        };

        let snapshot = CartSnapshot { entries };
        *self.snapshot.write() = snapshot.clone();
        Ok(snapshot)
    }

    /// Add `quantity` of a menu item, merging into the existing line
    pub async fn add(&self, menu_item_id: &str, quantity: u32) -> ClientResult<CartSnapshot> {
        if quantity == 0 {
            return Err(ValidationError::InvalidQuantity(quantity).into());
        }
        tracing::info!(user_id = %self.user_id, menu_item_id, quantity, "Add to cart");

        let result = async {
            self.upsert(menu_item_id, quantity).await?;
            self.refresh().await
        }
        .await;

        match result {
            Ok(snapshot) => {
                let name = snapshot
                    .line_for(menu_item_id)
                    .map(|e| e.item.name.clone())
                    .unwrap_or_else(|| "Item".to_string());
                self.notices
                    .show(Notice::success(format!("{} added to your cart", name)));
                Ok(snapshot)
            }
            Err(e) => {
                tracing::error!(user_id = %self.user_id, menu_item_id, error = %e, "Add to cart failed");
                self.notices.show(Notice::error("Could not add to cart"));
                Err(e)
            }
        }
    }

    async fn upsert(&self, menu_item_id: &str, quantity: u32) -> ClientResult<()> {
        let existing: Option<CartLine> = self
            .gateway
            .find_one(
                Collection::CartItems,
                vec![self.user_filter(), Filter::eq("menu_item_id", menu_item_id)],
            )
            .await?;

        match existing {
            Some(line) => {
                let patch = CartLineUpdate {
                    quantity: line.quantity.saturating_add(quantity),
                };
                self.gateway
                    .update(Collection::CartItems, &line.id, &patch)
                    .await
            }
            None => {
                let row = CartLineCreate {
                    user_id: self.user_id.to_string(),
                    menu_item_id: menu_item_id.to_string(),
                    quantity,
                };
                let _: CartLine = self.gateway.insert(Collection::CartItems, &row).await?;
                Ok(())
            }
        }
    }

    /// Delete one line
    pub async fn remove(&self, line_id: &str) -> ClientResult<CartSnapshot> {
        tracing::info!(user_id = %self.user_id, line_id, "Remove from cart");
        let result = async {
            self.delete_line(line_id).await?;
            self.refresh().await
        }
        .await;
        self.report(result, "Item removed from your cart", "Could not remove the item")
    }

    /// Set a line's quantity; zero deletes it
    pub async fn set_quantity(&self, line_id: &str, quantity: u32) -> ClientResult<CartSnapshot> {
        if quantity == 0 {
            return self.remove(line_id).await;
        }
        tracing::info!(user_id = %self.user_id, line_id, quantity, "Set cart quantity");
        let result = async {
            self.gateway
                .update(Collection::CartItems, line_id, &CartLineUpdate { quantity })
                .await?;
            self.refresh().await
        }
        .await;
        self.report(result, "Cart updated", "Could not update the cart")
    }

    async fn delete_line(&self, line_id: &str) -> ClientResult<()> {
        self.gateway
            .delete_where(
                Collection::CartItems,
                &[Filter::eq("id", line_id), self.user_filter()],
            )
            .await
    }

    fn report(
        &self,
        result: ClientResult<CartSnapshot>,
        success: &str,
        failure: &str,
    ) -> ClientResult<CartSnapshot> {
        match &result {
            Ok(_) => self.notices.show(Notice::success(success)),
            Err(e) => {
                tracing::error!(user_id = %self.user_id, error = %e, "{}", failure);
                self.notices.show(Notice::error(failure));
            }
        }
        result
    }

    /// Re-fetch on any change to this user's cart lines
    pub fn watch(&self, bus: &ChangeBus) -> Result<Watch, BusError> {
        let cart = self.clone();
        let spec = ChannelSpec::new(CART_CHANNEL, Collection::CartItems).filter(self.user_filter());
        watch(bus, spec, move || {
            let cart = cart.clone();
            async move {
                if let Err(e) = cart.refresh().await {
                    tracing::error!(user_id = %cart.user_id, error = %e, "Cart refresh failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{MemoryStore, StoreOp};
    use crate::transient::{NOTICE_DURATION, NoticeLevel};
    use crate::ClientError;
    use serde_json::json;

    fn cart() -> (CartSync, Arc<MemoryStore>, Arc<NoticeBoard>) {
        let store = Arc::new(MemoryStore::new());
        store.seed(
            Collection::MenuItems,
            vec![
                json!({"id": "a", "name": "Garba", "price": 1500, "category": "Plats", "available": true}),
                json!({"id": "b", "name": "Bissap", "price": 500, "category": "Boissons", "available": true}),
            ],
        );
        let notices = Arc::new(NoticeBoard::new(NOTICE_DURATION));
        let cart = CartSync::new(Gateway::new(store.clone()), "u1", notices.clone());
        (cart, store, notices)
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_add_merges_into_one_line() {
        let (cart, store, _) = cart();
        cart.add("a", 1).await.unwrap();
        let snapshot = cart.add("a", 2).await.unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.entries[0].line.quantity, 3);
        assert_eq!(snapshot.total(), 4500);
        assert_eq!(store.rows(Collection::CartItems).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_total_is_recomputed_from_snapshot() {
        let (cart, _, _) = cart();
        cart.add("a", 2).await.unwrap();
        let snapshot = cart.add("b", 3).await.unwrap();
        assert_eq!(snapshot.total(), 2 * 1500 + 3 * 500);
        assert_eq!(snapshot.item_count(), 5);

        let line_b = snapshot.line_for("b").unwrap().line.id.clone();
        let snapshot = cart.set_quantity(&line_b, 1).await.unwrap();
        assert_eq!(snapshot.total(), 3500);

        let snapshot = cart.set_quantity(&line_b, 0).await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.total(), 3000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_add_keeps_snapshot_and_notices() {
        let (cart, store, notices) = cart();
        cart.add("a", 1).await.unwrap();
        store.fail_next(Collection::CartItems, StoreOp::Update);

        let err = cart.add("a", 1).await.unwrap_err();
        assert!(matches!(err, ClientError::Remote { .. }));
        assert_eq!(cart.snapshot().entries[0].line.quantity, 1);
        let notice = notices.current().unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn test_zero_quantity_add_never_calls_backend() {
        let (cart, store, _) = cart();
        let err = cart.add("a", 0).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Validation(ValidationError::InvalidQuantity(0))
        ));
        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_only_touches_own_lines() {
        let (cart, store, _) = cart();
        store.seed(
            Collection::CartItems,
            vec![json!({"id": "other", "user_id": "u2", "menu_item_id": "a", "quantity": 1})],
        );
        cart.remove("other").await.unwrap();
        assert_eq!(store.rows(Collection::CartItems).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_refreshes_on_foreign_write() {
        let (cart, store, _) = cart();
        let bus = ChangeBus::start(Arc::new(crate::message::MemoryTransport::new(
            &store.change_sender(),
        )));
        let _watch = cart.watch(&bus).unwrap();

        // same user on another device
        let other = CartSync::new(
            Gateway::new(store.clone()),
            "u1",
            Arc::new(NoticeBoard::new(NOTICE_DURATION)),
        );
        other.add("b", 2).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(cart.snapshot().total(), 1000);
    }
}
