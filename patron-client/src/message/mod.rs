//! 推送通道模块 - 变更订阅、传输层和错误类型
//!
//! The backend pushes one [`ChangeEvent`] per row mutation. A
//! [`Transport`] delivers them, the [`ChangeBus`] routes each event to the
//! handlers whose [`ChannelSpec`] matches it.

pub mod bus;
pub mod transport;

pub use bus::{ChangeBus, Subscription, Watch, watch};
pub use shared::message::{ChangeEvent, ChangeKind, FrameError};
pub use transport::{MemoryTransport, TcpTransport, Transport};

use shared::models::Collection;
use shared::query::{Filter, matches_all};
use thiserror::Error;

/// Push channel errors
#[derive(Debug, Error)]
pub enum BusError {
    /// Channel name already registered on this bus
    #[error("Channel already subscribed: {0}")]
    DuplicateChannel(String),

    /// Bus dispatch loop has stopped
    #[error("Bus is not running")]
    NotRunning,

    /// Transport closed by the peer
    #[error("Transport closed")]
    Closed,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Undecodable frame, the stream itself is still usable
    #[error("Invalid frame: {0}")]
    Frame(#[from] FrameError),
}

impl BusError {
    /// Whether the dispatch loop can keep reading after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, BusError::Frame(FrameError::Payload(_)))
    }
}

/// What a subscription listens to
///
/// One logical channel per screen and scope; `name` is unique on a bus.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSpec {
    pub name: String,
    pub collection: Collection,
    /// Evaluated against the event row, all must match
    pub filters: Vec<Filter>,
    /// Empty means every kind
    pub kinds: Vec<ChangeKind>,
}

impl ChannelSpec {
    pub fn new(name: impl Into<String>, collection: Collection) -> Self {
        Self {
            name: name.into(),
            collection,
            filters: Vec::new(),
            kinds: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn kinds(mut self, kinds: &[ChangeKind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if event.collection != self.collection {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        if self.filters.is_empty() {
            return true;
        }
        event.row().is_some_and(|row| matches_all(&self.filters, row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_channel_spec_matching() {
        let spec = ChannelSpec::new("orders", Collection::Orders)
            .filter(Filter::eq("user_id", "u1"))
            .kinds(&[ChangeKind::Update]);

        let mine = ChangeEvent::update(Collection::Orders, json!({"user_id": "u1"}), None);
        let other_user = ChangeEvent::update(Collection::Orders, json!({"user_id": "u2"}), None);
        let insert = ChangeEvent::insert(Collection::Orders, json!({"user_id": "u1"}));
        let other_table = ChangeEvent::update(Collection::CartItems, json!({"user_id": "u1"}), None);

        assert!(spec.matches(&mine));
        assert!(!spec.matches(&other_user));
        assert!(!spec.matches(&insert));
        assert!(!spec.matches(&other_table));
    }

    #[test]
    fn test_delete_matches_on_old_record() {
        let spec = ChannelSpec::new("cart", Collection::CartItems).filter(Filter::eq("user_id", "u1"));
        let delete = ChangeEvent::delete(Collection::CartItems, json!({"user_id": "u1"}));
        assert!(spec.matches(&delete));
    }
}
