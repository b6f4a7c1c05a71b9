//! Order lifecycle tracker
//!
//! Follows the most recent order of the user. Status updates are taken
//! straight from the change event payload instead of a re-fetch, so the
//! popup reacts to the kitchen's transition without waiting on a read.
//! Observed status never goes backwards: stale or repeated statuses for
//! the tracked order are dropped.

use parking_lot::RwLock;
use shared::message::{ChangeEvent, ChangeKind};
use shared::models::{Collection, Order, OrderStatus};
use shared::query::{Filter, Query, Sort};
use std::sync::Arc;
use tokio::sync::watch;

use crate::config::Theme;
use crate::gateway::Gateway;
use crate::message::{BusError, ChangeBus, ChannelSpec, Subscription};
use crate::transient::{POPUP_DURATION, TransientSlot};
use crate::ClientResult;

/// Bus channel of the tracker
pub const TRACKER_CHANNEL: &str = "orders";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusIcon {
    Clock,
    Package,
}

/// How a status is shown to the patron
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPresentation {
    pub icon: StatusIcon,
    /// Theme color token value
    pub color: String,
    pub text: &'static str,
    pub description: &'static str,
}

/// Pure status mapping; `None` for the terminal state
pub fn present(status: OrderStatus, theme: &Theme) -> Option<StatusPresentation> {
    match status {
        OrderStatus::Pending => Some(StatusPresentation {
            icon: StatusIcon::Clock,
            color: theme.warning.clone(),
            text: "Your order is in queue",
            description: "We are getting your order ready",
        }),
        OrderStatus::Preparing => Some(StatusPresentation {
            icon: StatusIcon::Package,
            color: theme.info.clone(),
            text: "Your order is being prepared",
            description: "The chef is at work!",
        }),
        OrderStatus::Completed => None,
    }
}

/// What the tracker renders for the current order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerView {
    pub order_id: String,
    pub table_number: u32,
    pub total_amount: u64,
    pub status: OrderStatus,
    pub presentation: StatusPresentation,
}

struct TrackerState {
    user_id: String,
    theme: Theme,
    order: RwLock<Option<Order>>,
    popup: TransientSlot<OrderStatus>,
    status_tx: watch::Sender<Option<Order>>,
}

/// Outcome of offering an order snapshot to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Became the tracked state
    Adopted,
    /// Same or earlier status of the tracked order, or an older order
    Ignored,
}

impl TrackerState {
    /// Monotonic merge of an incoming order snapshot
    fn offer(&self, incoming: Order, from_event: bool) -> Applied {
        let mut current = self.order.write();
        let adopt = match current.as_ref() {
            None => true,
            Some(cur) if cur.id == incoming.id => cur.status.can_advance_to(incoming.status),
            // different order: the newer one wins
            Some(cur) => match (&cur.created_at, &incoming.created_at) {
                (Some(a), Some(b)) => b > a,
                _ => from_event,
            },
        };
        if !adopt {
            tracing::debug!(
                order_id = %incoming.id,
                status = %incoming.status,
                "Ignoring stale order status"
            );
            return Applied::Ignored;
        }

        tracing::info!(
            user_id = %self.user_id,
            order_id = %incoming.id,
            status = %incoming.status,
            "Order status"
        );
        let status = incoming.status;
        *current = Some(incoming.clone());
        drop(current);

        if status.is_terminal() {
            self.popup.clear();
        } else if from_event {
            self.popup.show(status);
        }
        self.status_tx.send_replace(Some(incoming));
        Applied::Adopted
    }

    fn view(&self) -> Option<TrackerView> {
        let order = self.order.read();
        let order = order.as_ref()?;
        let presentation = present(order.status, &self.theme)?;
        Some(TrackerView {
            order_id: order.id.clone(),
            table_number: order.table_number,
            total_amount: order.total_amount,
            status: order.status,
            presentation,
        })
    }
}

pub struct OrderTracker {
    state: Arc<TrackerState>,
    gateway: Gateway,
    _subscription: Subscription,
}

impl std::fmt::Debug for OrderTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderTracker")
            .field("user_id", &self.state.user_id)
            .field("order", &*self.state.order.read())
            .finish()
    }
}

impl OrderTracker {
    /// Subscribe to the user's order updates, then load the latest order
    ///
    /// Subscribing first means an update racing the initial read is not
    /// lost; the monotonic merge sorts out the order of arrival.
    pub async fn start(
        gateway: Gateway,
        bus: &ChangeBus,
        user_id: &str,
        theme: Theme,
    ) -> Result<Self, BusError> {
        let (status_tx, _) = watch::channel(None);
        let state = Arc::new(TrackerState {
            user_id: user_id.to_string(),
            theme,
            order: RwLock::new(None),
            popup: TransientSlot::new(POPUP_DURATION),
            status_tx,
        });

        let spec = ChannelSpec::new(TRACKER_CHANNEL, Collection::Orders)
            .filter(Filter::eq("user_id", user_id))
            .kinds(&[ChangeKind::Update]);
        let handler_state = state.clone();
        let subscription = bus.subscribe(spec, move |event: &ChangeEvent| {
            match event.parse_record::<Order>() {
                Some(Ok(order)) => {
                    handler_state.offer(order, true);
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Unparseable order update");
                }
                None => {}
            }
        })?;

        let tracker = Self {
            state,
            gateway,
            _subscription: subscription,
        };
        if let Err(e) = tracker.refresh().await {
            // no order to show is not an error for the patron
            tracing::warn!(user_id, error = %e, "Could not load latest order");
        }
        Ok(tracker)
    }

    /// Query of the user's most recent order
    pub fn latest_query(user_id: &str) -> Query {
        Query::all(Collection::Orders)
            .filter(Filter::eq("user_id", user_id))
            .order_by(Sort::desc("created_at"))
            .limit(1)
    }

    /// Re-read the latest order (no popup)
    pub async fn refresh(&self) -> ClientResult<Option<Order>> {
        let latest: Vec<Order> = self
            .gateway
            .list(&Self::latest_query(&self.state.user_id))
            .await?;
        if let Some(order) = latest.into_iter().next() {
            self.state.offer(order, false);
        }
        Ok(self.order())
    }

    /// Feed an order snapshot as if it arrived as an update event
    pub fn apply_update(&self, order: Order) -> Applied {
        self.state.offer(order, true)
    }

    /// Tracked order, if any
    pub fn order(&self) -> Option<Order> {
        self.state.order.read().clone()
    }

    /// Status bar view; `None` without an order or once completed
    pub fn banner(&self) -> Option<TrackerView> {
        self.state.view()
    }

    /// Popup view, visible for 5 s after the latest status change
    pub fn popup(&self) -> Option<TrackerView> {
        self.state.popup.current()?;
        self.state.view()
    }

    /// Watch the tracked order (CLI follow mode)
    pub fn subscribe_status(&self) -> watch::Receiver<Option<Order>> {
        self.state.status_tx.subscribe()
    }
}

impl Drop for OrderTracker {
    fn drop(&mut self) {
        self.state.popup.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryStore;
    use serde_json::json;
    use shared::models::PaymentMethod;
    use std::time::Duration;
    use tokio::time::sleep;

    fn order(id: &str, status: OrderStatus, created_at: &str) -> Order {
        Order {
            id: id.to_string(),
            user_id: "u1".into(),
            table_number: 7,
            total_amount: 4500,
            status,
            contact: "a@b.com".into(),
            payment_method: PaymentMethod::Cash,
            created_at: Some(created_at.to_string()),
        }
    }

    async fn tracker() -> (OrderTracker, ChangeBus) {
        let store = Arc::new(MemoryStore::new());
        let bus = ChangeBus::detached();
        let tracker = OrderTracker::start(Gateway::new(store), &bus, "u1", Theme::default())
            .await
            .unwrap();
        (tracker, bus)
    }

    #[test]
    fn test_presentation_mapping() {
        let theme = Theme::default();
        let pending = present(OrderStatus::Pending, &theme).unwrap();
        assert_eq!(pending.color, theme.warning);
        assert!(pending.text.contains("in queue"));
        let preparing = present(OrderStatus::Preparing, &theme).unwrap();
        assert_eq!(preparing.color, theme.info);
        assert!(preparing.text.contains("being prepared"));
        assert!(present(OrderStatus::Completed, &theme).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_order_renders_nothing() {
        let (tracker, bus) = tracker().await;
        assert!(tracker.order().is_none());
        assert!(tracker.banner().is_none());
        assert!(tracker.popup().is_none());
        assert_eq!(bus.active_channels(), vec![TRACKER_CHANNEL.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_regression_and_duplicate_are_ignored() {
        let (tracker, _bus) = tracker().await;
        let t = "2026-01-01T10:00:00.000000Z";
        assert_eq!(tracker.apply_update(order("o1", OrderStatus::Preparing, t)), Applied::Adopted);
        assert_eq!(tracker.apply_update(order("o1", OrderStatus::Pending, t)), Applied::Ignored);
        assert_eq!(tracker.apply_update(order("o1", OrderStatus::Preparing, t)), Applied::Ignored);
        assert_eq!(tracker.order().unwrap().status, OrderStatus::Preparing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_order_replaces_older() {
        let (tracker, _bus) = tracker().await;
        tracker.apply_update(order("o1", OrderStatus::Preparing, "2026-01-01T10:00:00.000000Z"));
        let applied =
            tracker.apply_update(order("o2", OrderStatus::Pending, "2026-01-01T11:00:00.000000Z"));
        assert_eq!(applied, Applied::Adopted);
        assert_eq!(tracker.order().unwrap().id, "o2");

        let applied =
            tracker.apply_update(order("o1", OrderStatus::Completed, "2026-01-01T10:00:00.000000Z"));
        assert_eq!(applied, Applied::Ignored);
    }

    #[tokio::test(start_paused = true)]
    async fn test_popup_single_timer() {
        let (tracker, bus) = tracker().await;
        let t = "2026-01-01T10:00:00.000000Z";
        let pending = json!(order("o1", OrderStatus::Pending, t));
        let preparing = json!(order("o1", OrderStatus::Preparing, t));

        bus.dispatch(&ChangeEvent::update(Collection::Orders, pending, None));
        sleep(Duration::from_millis(600)).await;
        bus.dispatch(&ChangeEvent::update(Collection::Orders, preparing, None));

        // one popup at any instant, showing the latest status
        let popup = tracker.popup().unwrap();
        assert_eq!(popup.status, OrderStatus::Preparing);

        sleep(Duration::from_millis(4700)).await;
        assert!(tracker.popup().is_some());
        sleep(Duration::from_millis(400)).await;
        assert!(tracker.popup().is_none());
        assert!(tracker.banner().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_for_other_users_are_filtered() {
        let (tracker, bus) = tracker().await;
        let mut foreign = order("o9", OrderStatus::Preparing, "2026-01-01T10:00:00.000000Z");
        foreign.user_id = "u2".into();
        bus.dispatch(&ChangeEvent::update(Collection::Orders, json!(foreign), None));
        assert!(tracker.order().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases_subscription() {
        let (tracker, bus) = tracker().await;
        drop(tracker);
        assert!(bus.active_channels().is_empty());
    }
}
