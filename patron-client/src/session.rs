//! Patron session
//!
//! Wires identity, configuration, gateway, change bus and the views of one
//! patron, and exposes the UI intents. Dropping the session releases every
//! subscription and pending timer.

use parking_lot::Mutex;
use shared::models::{Order, PaymentMethod};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::cart::{CartSnapshot, CartSync};
use crate::checkout::{AUTO_CLOSE_DELAY, Checkout, CheckoutStep, Contact};
use crate::gateway::{Gateway, HttpStore, MemoryStore};
use crate::history::OrderHistory;
use crate::identity::Identity;
use crate::invoice::InvoiceDocument;
use crate::menu::MenuCatalog;
use crate::message::{ChangeBus, MemoryTransport, TcpTransport, Watch};
use crate::payment::{PaymentInitiator, SimulatedPayment};
use crate::tracker::OrderTracker;
use crate::transient::{NOTICE_DURATION, Notice, NoticeBoard};
use crate::{ClientConfig, ClientError, ClientResult, ValidationError};

/// Open checkout; `generation` moves on every open/close so a submission
/// finishing late does not resurrect a checkout the user left
#[derive(Default)]
struct CheckoutSlot {
    generation: u64,
    current: Option<Checkout>,
}

pub struct PatronSession {
    config: Arc<ClientConfig>,
    identity: Identity,
    gateway: Gateway,
    bus: ChangeBus,
    notices: Arc<NoticeBoard>,
    menu: MenuCatalog,
    cart: CartSync,
    history: OrderHistory,
    tracker: OrderTracker,
    payments: Arc<dyn PaymentInitiator>,
    checkout: Arc<Mutex<CheckoutSlot>>,
    auto_close: Mutex<Option<JoinHandle<()>>>,
    _watches: Vec<Watch>,
}

impl std::fmt::Debug for PatronSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatronSession")
            .field("identity", &self.identity)
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

impl PatronSession {
    /// Hosted backend; TCP change feed when `realtime_addr` is set
    pub async fn connect(config: ClientConfig, identity: Identity) -> ClientResult<Self> {
        let store = Arc::new(HttpStore::new(&config)?);
        let bus = match config.realtime_addr.as_deref() {
            Some(addr) => ChangeBus::start(Arc::new(TcpTransport::connect(addr).await?)),
            None => {
                tracing::info!("No realtime address configured, live updates disabled");
                ChangeBus::detached()
            }
        };
        Self::start(
            Arc::new(config),
            identity,
            Gateway::new(store),
            bus,
            Arc::new(SimulatedPayment::default()),
        )
        .await
    }

    /// In-process backend with its change feed
    pub async fn in_memory(
        config: ClientConfig,
        identity: Identity,
        store: Arc<MemoryStore>,
        payments: Arc<dyn PaymentInitiator>,
    ) -> ClientResult<Self> {
        let bus = ChangeBus::start(Arc::new(MemoryTransport::new(&store.change_sender())));
        Self::start(Arc::new(config), identity, Gateway::new(store), bus, payments).await
    }

    /// Load every view and open the subscriptions
    pub async fn start(
        config: Arc<ClientConfig>,
        identity: Identity,
        gateway: Gateway,
        bus: ChangeBus,
        payments: Arc<dyn PaymentInitiator>,
    ) -> ClientResult<Self> {
        let user_id = identity.user_id.clone();
        tracing::info!(user_id = %user_id, table = ?identity.table_number, "Starting patron session");

        let notices = Arc::new(NoticeBoard::new(NOTICE_DURATION));
        let menu = MenuCatalog::new(gateway.clone(), notices.clone());
        let cart = CartSync::new(gateway.clone(), user_id.as_str(), notices.clone());
        let history = OrderHistory::new(gateway.clone(), user_id.as_str());

        let watches = vec![menu.watch(&bus)?, cart.watch(&bus)?, history.watch(&bus)?];
        let tracker = OrderTracker::start(
            gateway.clone(),
            &bus,
            &user_id,
            config.restaurant.theme.clone(),
        )
        .await?;

        // initial loads; failures are logged and the views stay empty
        let _ = menu.refresh().await;
        if let Err(e) = cart.refresh().await {
            tracing::error!(user_id = %user_id, error = %e, "Initial cart load failed");
        }
        if let Err(e) = history.refresh().await {
            tracing::error!(user_id = %user_id, error = %e, "Initial history load failed");
        }

        Ok(Self {
            config,
            identity,
            gateway,
            bus,
            notices,
            menu,
            cart,
            history,
            tracker,
            payments,
            checkout: Arc::new(Mutex::new(CheckoutSlot::default())),
            auto_close: Mutex::new(None),
            _watches: watches,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    pub fn menu(&self) -> &MenuCatalog {
        &self.menu
    }

    pub fn cart(&self) -> &CartSync {
        &self.cart
    }

    pub fn history(&self) -> &OrderHistory {
        &self.history
    }

    pub fn tracker(&self) -> &OrderTracker {
        &self.tracker
    }

    /// Currently visible notice
    pub fn notice(&self) -> Option<Notice> {
        self.notices.current()
    }

    // ========== Cart ==========

    pub async fn add_to_cart(&self, menu_item_id: &str, quantity: u32) -> ClientResult<CartSnapshot> {
        self.cart.add(menu_item_id, quantity).await
    }

    pub async fn remove_from_cart(&self, line_id: &str) -> ClientResult<CartSnapshot> {
        self.cart.remove(line_id).await
    }

    pub async fn set_quantity(&self, line_id: &str, quantity: u32) -> ClientResult<CartSnapshot> {
        self.cart.set_quantity(line_id, quantity).await
    }

    // ========== Checkout ==========

    /// Enter checkout with the current cart snapshot (local checks only)
    pub fn open_checkout(&self) -> Result<(), ValidationError> {
        match Checkout::open(
            self.identity.user_id.as_str(),
            self.identity.table_number,
            self.cart.snapshot(),
        ) {
            Ok(checkout) => {
                self.cancel_auto_close();
                let mut slot = self.checkout.lock();
                slot.generation += 1;
                slot.current = Some(checkout);
                Ok(())
            }
            Err(e) => {
                tracing::info!(user_id = %self.identity.user_id, reason = %e, "Checkout refused");
                self.notices.show(Notice::error(e.to_string()));
                Err(e)
            }
        }
    }

    pub fn checkout_step(&self) -> Option<CheckoutStep> {
        self.checkout.lock().current.as_ref().map(Checkout::step)
    }

    pub fn checkout_total(&self) -> Option<u64> {
        self.checkout.lock().current.as_ref().map(Checkout::total)
    }

    fn with_checkout<T>(
        &self,
        f: impl FnOnce(&mut Checkout) -> Result<T, ValidationError>,
    ) -> Result<T, ValidationError> {
        let mut slot = self.checkout.lock();
        let checkout = slot.current.as_mut().ok_or(ValidationError::CheckoutClosed)?;
        f(checkout)
    }

    pub fn checkout_contact(&self, raw: &str) -> Result<Contact, ValidationError> {
        self.with_checkout(|c| c.submit_contact(raw).cloned())
    }

    pub fn checkout_back(&self) -> Result<(), ValidationError> {
        self.with_checkout(Checkout::back)
    }

    pub fn checkout_select_payment(&self, method: PaymentMethod) -> Result<(), ValidationError> {
        self.with_checkout(|c| c.select_payment(method))
    }

    /// Submit the order; on success the checkout closes after 2 s
    ///
    /// The order is built from a fresh read of the cart, not from the
    /// snapshot taken when the checkout opened.
    pub async fn confirm_checkout(&self) -> ClientResult<Order> {
        let (mut checkout, generation) = {
            let mut slot = self.checkout.lock();
            let checkout = slot.current.take().ok_or(ValidationError::CheckoutClosed)?;
            (checkout, slot.generation)
        };

        let result = self.submit_checkout(&mut checkout).await;
        let channel = checkout.contact().map(Contact::delivery_channel);
        let restored = {
            let mut slot = self.checkout.lock();
            if slot.generation == generation && slot.current.is_none() {
                slot.current = Some(checkout);
                true
            } else {
                tracing::debug!(user_id = %self.identity.user_id, "Checkout closed during submission");
                false
            }
        };

        match result {
            Ok(order) => {
                self.notices.show(Notice::success(format!(
                    "Order placed! Your invoice will be sent by {}",
                    channel.unwrap_or("email")
                )));
                if let Err(e) = self.cart.refresh().await {
                    tracing::error!(user_id = %self.identity.user_id, error = %e, "Cart refresh after checkout failed");
                }
                if let Err(e) = self.tracker.refresh().await {
                    tracing::warn!(order_id = %order.id, error = %e, "Tracker refresh after checkout failed");
                }
                if restored {
                    self.schedule_auto_close();
                }
                Ok(order)
            }
            Err(e) => {
                self.notices.show(Notice::error(e.user_message()));
                Err(e)
            }
        }
    }

    async fn submit_checkout(&self, checkout: &mut Checkout) -> ClientResult<Order> {
        // local checks first: a bad draft never reaches the backend
        checkout.draft()?;
        let cart = self.cart.refresh().await?;
        checkout
            .confirm(cart, &self.gateway, self.payments.clone())
            .await
    }

    /// Close the checkout (user dismiss or auto-close)
    pub fn close_checkout(&self) {
        self.cancel_auto_close();
        let mut slot = self.checkout.lock();
        slot.generation += 1;
        slot.current = None;
    }

    fn schedule_auto_close(&self) {
        let slot = self.checkout.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(AUTO_CLOSE_DELAY).await;
            let mut slot = slot.lock();
            if slot
                .current
                .as_ref()
                .is_some_and(|c| c.step() == CheckoutStep::Confirmed)
            {
                slot.generation += 1;
                slot.current = None;
            }
        });
        if let Some(previous) = self.auto_close.lock().replace(handle) {
            previous.abort();
        }
    }

    fn cancel_auto_close(&self) {
        if let Some(handle) = self.auto_close.lock().take() {
            handle.abort();
        }
    }

    // ========== Invoices ==========

    /// Invoice of one of the user's orders
    pub async fn export_invoice(&self, order_id: &str) -> ClientResult<InvoiceDocument> {
        if let Some(doc) = self.history.invoice(order_id, &self.config.restaurant) {
            return Ok(doc);
        }
        self.history.refresh().await?;
        self.history
            .invoice(order_id, &self.config.restaurant)
            .ok_or_else(|| ClientError::NotFound(format!("order {}", order_id)))
    }
}

impl Drop for PatronSession {
    fn drop(&mut self) {
        self.cancel_auto_close();
        self.notices.clear();
    }
}
