//! Menu catalog
//!
//! Read-only snapshot of the available menu items, ordered by category.

use parking_lot::RwLock;
use shared::models::{Collection, MenuItem};
use shared::query::{Filter, Query, Sort};
use std::sync::Arc;

use crate::gateway::Gateway;
use crate::message::{BusError, ChangeBus, ChannelSpec, Watch, watch};
use crate::transient::{Notice, NoticeBoard};
use crate::ClientResult;

/// Bus channel of the menu watcher
pub const MENU_CHANNEL: &str = "menu";

#[derive(Clone)]
pub struct MenuCatalog {
    gateway: Gateway,
    items: Arc<RwLock<Vec<MenuItem>>>,
    notices: Arc<NoticeBoard>,
}

impl std::fmt::Debug for MenuCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MenuCatalog")
            .field("items", &self.items.read().len())
            .finish()
    }
}

impl MenuCatalog {
    pub fn new(gateway: Gateway, notices: Arc<NoticeBoard>) -> Self {
        Self {
            gateway,
            items: Arc::new(RwLock::new(Vec::new())),
            notices,
        }
    }

    /// `available = true` ordered by category
    pub fn query() -> Query {
        Query::all(Collection::MenuItems)
            .filter(Filter::eq("available", true))
            .order_by(Sort::asc("category"))
    }

    /// Re-read the menu; on failure the last snapshot is kept
    pub async fn refresh(&self) -> ClientResult<()> {
        match self.gateway.list::<MenuItem>(&Self::query()).await {
            Ok(items) => {
                tracing::debug!(count = items.len(), "Menu loaded");
                *self.items.write() = items;
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load menu");
                self.notices.show(Notice::error("Could not load the menu"));
                Err(e)
            }
        }
    }

    pub fn items(&self) -> Vec<MenuItem> {
        self.items.read().clone()
    }

    pub fn find(&self, id: &str) -> Option<MenuItem> {
        self.items.read().iter().find(|item| item.id == id).cloned()
    }

    /// Items grouped by category, groups in first-seen order
    pub fn grouped(&self) -> Vec<(String, Vec<MenuItem>)> {
        let mut groups: Vec<(String, Vec<MenuItem>)> = Vec::new();
        for item in self.items.read().iter() {
            match groups.iter_mut().find(|(category, _)| *category == item.category) {
                Some((_, items)) => items.push(item.clone()),
                None => groups.push((item.category.clone(), vec![item.clone()])),
            }
        }
        groups
    }

    /// Re-fetch on every menu change
    pub fn watch(&self, bus: &ChangeBus) -> Result<Watch, BusError> {
        let catalog = self.clone();
        watch(
            bus,
            ChannelSpec::new(MENU_CHANNEL, Collection::MenuItems),
            move || {
                let catalog = catalog.clone();
                async move {
                    // failure already logged and noticed
                    let _ = catalog.refresh().await;
                }
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{MemoryStore, RemoteStore, StoreOp};
    use crate::transient::NOTICE_DURATION;
    use serde_json::json;
    use std::time::Duration;

    fn seeded() -> (MenuCatalog, Arc<MemoryStore>, Arc<NoticeBoard>) {
        let store = Arc::new(MemoryStore::new());
        store.seed(
            Collection::MenuItems,
            vec![
                json!({"id": "m1", "name": "Garba", "price": 1500, "category": "Plats", "available": true}),
                json!({"id": "m2", "name": "Bissap", "price": 500, "category": "Boissons", "available": true}),
                json!({"id": "m3", "name": "Alloco", "price": 1000, "category": "Plats", "available": true}),
                json!({"id": "m4", "name": "Kedjenou", "price": 3000, "category": "Plats", "available": false}),
            ],
        );
        let notices = Arc::new(NoticeBoard::new(NOTICE_DURATION));
        let catalog = MenuCatalog::new(Gateway::new(store.clone()), notices.clone());
        (catalog, store, notices)
    }

    #[tokio::test]
    async fn test_refresh_filters_and_groups() {
        let (catalog, _, _) = seeded();
        catalog.refresh().await.unwrap();

        let groups = catalog.grouped();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "Boissons");
        assert_eq!(groups[1].0, "Plats");
        assert_eq!(groups[1].1.len(), 2);
        assert!(catalog.find("m4").is_none());
        assert_eq!(catalog.find("m1").unwrap().price, 1500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_keeps_snapshot() {
        let (catalog, store, notices) = seeded();
        catalog.refresh().await.unwrap();
        store.fail_next(Collection::MenuItems, StoreOp::Select);

        assert!(catalog.refresh().await.is_err());
        assert_eq!(catalog.items().len(), 3);
        assert_eq!(notices.current().unwrap().text, "Could not load the menu");
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_picks_up_new_items() {
        let (catalog, store, _) = seeded();
        let bus = ChangeBus::start(Arc::new(crate::message::MemoryTransport::new(
            &store.change_sender(),
        )));
        let _watch = catalog.watch(&bus).unwrap();

        store
            .insert(
                Collection::MenuItems,
                vec![json!({"name": "Attieke", "price": 800, "category": "Plats", "available": true})],
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(catalog.items().len(), 4);
    }
}
