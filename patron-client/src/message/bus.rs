//! Change bus: routes feed events to subscribed handlers
//!
//! A [`Subscription`] handle is owned by the component that created it and
//! unregisters its handler synchronously on drop. A channel name can be
//! registered once per bus; a second registration under the same name is
//! rejected instead of silently doubling handler calls.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::{BusError, ChannelSpec, Transport};
use shared::message::ChangeEvent;

type Handler = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

struct Registration {
    id: u64,
    spec: ChannelSpec,
    handler: Handler,
}

struct BusInner {
    channels: DashMap<String, Registration>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

impl BusInner {
    fn dispatch(&self, event: &ChangeEvent) -> usize {
        // Collect first: a handler may subscribe or unsubscribe
        let handlers: Vec<(String, Handler)> = self
            .channels
            .iter()
            .filter(|entry| entry.spec.matches(event))
            .map(|entry| (entry.key().clone(), entry.handler.clone()))
            .collect();

        for (channel, handler) in &handlers {
            tracing::debug!(
                channel = %channel,
                kind = %event.kind,
                collection = %event.collection,
                "Dispatching change event"
            );
            handler(event);
        }
        handlers.len()
    }
}

/// Change bus handle (cheap to clone)
///
/// The dispatch loop stops when the transport closes or the last handle is
/// dropped.
#[derive(Clone)]
pub struct ChangeBus {
    inner: Arc<BusInner>,
    _guard: Arc<DropGuard>,
}

impl std::fmt::Debug for ChangeBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeBus")
            .field("channels", &self.active_channels())
            .field("running", &self.is_running())
            .finish()
    }
}

impl ChangeBus {
    /// Start the dispatch loop over a transport (needs a tokio runtime)
    pub fn start(transport: Arc<dyn Transport>) -> Self {
        let bus = Self::detached();
        let inner = bus.inner.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = inner.shutdown.cancelled() => {
                        tracing::debug!("Change bus shut down");
                        break;
                    }
                    result = transport.read_event() => match result {
                        Ok(event) => {
                            if inner.dispatch(&event) == 0 {
                                tracing::trace!(collection = %event.collection, "No subscriber for event");
                            }
                        }
                        Err(e) if e.is_recoverable() => {
                            tracing::warn!(error = %e, "Skipping undecodable change event");
                        }
                        Err(BusError::Closed) => {
                            tracing::info!("Change feed closed");
                            break;
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Change feed read error");
                            break;
                        }
                    }
                }
            }
            if let Err(e) = transport.close().await {
                tracing::debug!(error = %e, "Transport close failed");
            }
            inner.shutdown.cancel();
        });

        bus
    }

    /// Bus without a transport; events are fed with [`ChangeBus::dispatch`]
    pub fn detached() -> Self {
        let shutdown = CancellationToken::new();
        Self {
            _guard: Arc::new(shutdown.clone().drop_guard()),
            inner: Arc::new(BusInner {
                channels: DashMap::new(),
                next_id: AtomicU64::new(1),
                shutdown,
            }),
        }
    }

    /// Register a handler for a channel
    pub fn subscribe<F>(&self, spec: ChannelSpec, handler: F) -> Result<Subscription, BusError>
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        if !self.is_running() {
            return Err(BusError::NotRunning);
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let name = spec.name.clone();
        match self.inner.channels.entry(name.clone()) {
            Entry::Occupied(_) => return Err(BusError::DuplicateChannel(name)),
            Entry::Vacant(slot) => {
                slot.insert(Registration {
                    id,
                    spec,
                    handler: Arc::new(handler),
                });
            }
        }
        tracing::debug!(channel = %name, "Subscribed");
        Ok(Subscription {
            bus: Arc::downgrade(&self.inner),
            channel: name,
            id,
        })
    }

    /// Release a subscription (same as dropping it)
    pub fn unsubscribe(&self, subscription: Subscription) {
        drop(subscription);
    }

    /// Route one event to matching handlers, returns how many ran
    pub fn dispatch(&self, event: &ChangeEvent) -> usize {
        self.inner.dispatch(event)
    }

    /// Registered channel names, sorted
    pub fn active_channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .channels
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn is_running(&self) -> bool {
        !self.inner.shutdown.is_cancelled()
    }

    /// Stop the dispatch loop; registered handlers stay until dropped
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }
}

/// Owned subscription; dropping it unregisters the handler
#[derive(Debug)]
pub struct Subscription {
    bus: Weak<BusInner>,
    channel: String,
    id: u64,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade()
            && inner
                .channels
                .remove_if(&self.channel, |_, reg| reg.id == self.id)
                .is_some()
        {
            tracing::debug!(channel = %self.channel, "Unsubscribed");
        }
    }
}

/// A coalescing watcher: subscription plus re-fetch task
///
/// Events only signal; the task re-reads authoritative state. Events that
/// arrive while a refresh is running collapse into one follow-up refresh.
/// Dropping the watch releases the subscription and stops the task.
#[derive(Debug)]
pub struct Watch {
    _subscription: Subscription,
    _stop: DropGuard,
}

/// Subscribe `spec` and run `refresh` after each burst of matching events
pub fn watch<F, Fut>(bus: &ChangeBus, spec: ChannelSpec, refresh: F) -> Result<Watch, BusError>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let notify = Arc::new(Notify::new());
    let signal = notify.clone();
    let subscription = bus.subscribe(spec, move |_| signal.notify_one())?;

    let stop = CancellationToken::new();
    let token = stop.clone();
    let channel = subscription.channel().to_string();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = notify.notified() => {
                    tracing::debug!(channel = %channel, "Refreshing after change");
                    refresh().await;
                }
            }
        }
    });

    Ok(Watch {
        _subscription: subscription,
        _stop: stop.drop_guard(),
    })
}
