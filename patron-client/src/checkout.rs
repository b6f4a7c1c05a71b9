//! Checkout orchestrator
//!
//! Local three-step machine (contact, payment method, confirmation) and the
//! order submission sequence. Submission is three sequential remote calls
//! with no rollback; a failure reports the stage it stopped at and the id
//! of the order header if one was already created.

use shared::models::{
    CartEntry, Collection, Order, OrderCreate, OrderLine, OrderStatus, PaymentMethod,
};
use shared::query::Filter;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::cart::CartSnapshot;
use crate::gateway::Gateway;
use crate::payment::{PaymentInitiator, PaymentRequest, spawn_initiation};
use crate::{ClientError, ClientResult, SubmissionError, SubmissionStage, ValidationError};

/// Delay before a confirmed checkout closes itself
pub const AUTO_CLOSE_DELAY: Duration = Duration::from_secs(2);

const PHONE_MIN_LEN: usize = 8;

/// Validated contact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contact {
    Email(String),
    Phone(String),
}

impl Contact {
    /// Email if it contains `@`, phone if it is at least 8 of
    /// digits, spaces, `+`, `(`, `)`, `-`
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(ValidationError::MissingContact);
        }
        if value.contains('@') {
            return Ok(Contact::Email(value.to_string()));
        }
        let phone_like = value
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_whitespace() || matches!(c, '+' | '(' | ')' | '-'));
        if phone_like && value.chars().count() >= PHONE_MIN_LEN {
            return Ok(Contact::Phone(value.to_string()));
        }
        Err(ValidationError::InvalidContact(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Contact::Email(v) | Contact::Phone(v) => v,
        }
    }

    /// How the invoice reaches the patron
    pub fn delivery_channel(&self) -> &'static str {
        match self {
            Contact::Email(_) => "email",
            Contact::Phone(_) => "SMS",
        }
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutStep {
    CollectingContact,
    SelectingPayment,
    Confirmed,
}

impl CheckoutStep {
    fn name(&self) -> &'static str {
        match self {
            CheckoutStep::CollectingContact => "contact",
            CheckoutStep::SelectingPayment => "payment",
            CheckoutStep::Confirmed => "confirmation",
        }
    }
}

/// Everything needed to submit one order
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub user_id: String,
    pub table_number: u32,
    pub contact: Contact,
    pub payment_method: PaymentMethod,
    pub entries: Vec<CartEntry>,
}

impl OrderDraft {
    /// Σ unit price × quantity over the cart snapshot
    pub fn total(&self) -> u64 {
        self.entries
            .iter()
            .map(CartEntry::subtotal)
            .fold(0, u64::saturating_add)
    }
}

/// Insert header, insert lines, clear the ordered cart lines; no rollback
///
/// Only the lines in the draft are deleted, so a line added meanwhile from
/// another device stays in the cart.
pub async fn submit_order(gateway: &Gateway, draft: &OrderDraft) -> Result<Order, SubmissionError> {
    let fail = |stage: SubmissionStage, order_id: Option<&str>, source: ClientError| {
        tracing::error!(
            user_id = %draft.user_id,
            order_id = order_id.unwrap_or("-"),
            stage = %stage,
            error = %source,
            "Order submission failed"
        );
        SubmissionError {
            stage,
            order_id: order_id.map(str::to_string),
            source: Box::new(source),
        }
    };

    let header = OrderCreate {
        user_id: draft.user_id.clone(),
        table_number: draft.table_number,
        total_amount: draft.total(),
        status: OrderStatus::Pending,
        contact: draft.contact.as_str().to_string(),
        payment_method: draft.payment_method,
    };
    let order: Order = gateway
        .insert(Collection::Orders, &header)
        .await
        .map_err(|e| fail(SubmissionStage::InsertOrder, None, e))?;

    let lines: Vec<OrderLine> = draft
        .entries
        .iter()
        .map(|entry| OrderLine {
            order_id: order.id.clone(),
            menu_item_id: entry.line.menu_item_id.clone(),
            quantity: entry.line.quantity,
            unit_price: entry.item.price,
        })
        .collect();
    gateway
        .insert_many(Collection::OrderLines, &lines)
        .await
        .map_err(|e| fail(SubmissionStage::InsertLines, Some(order.id.as_str()), e))?;

    let ordered: Vec<String> = draft.entries.iter().map(|e| e.line.id.clone()).collect();
    if !ordered.is_empty() {
        gateway
            .delete_where(
                Collection::CartItems,
                &[
                    Filter::eq("user_id", draft.user_id.as_str()),
                    Filter::is_in("id", ordered),
                ],
            )
            .await
            .map_err(|e| fail(SubmissionStage::ClearCart, Some(order.id.as_str()), e))?;
    }

    tracing::info!(
        user_id = %draft.user_id,
        order_id = %order.id,
        total = order.total_amount,
        lines = lines.len(),
        "Order submitted"
    );
    Ok(order)
}

/// One checkout session over a cart snapshot
#[derive(Debug, Clone)]
pub struct Checkout {
    user_id: String,
    table_number: u32,
    cart: CartSnapshot,
    step: CheckoutStep,
    contact: Option<Contact>,
    payment_method: Option<PaymentMethod>,
    placed: Option<Order>,
}

impl Checkout {
    /// Enter checkout; empty cart or missing table is refused locally
    pub fn open(
        user_id: impl Into<String>,
        table_number: Option<u32>,
        cart: CartSnapshot,
    ) -> Result<Self, ValidationError> {
        if cart.is_empty() {
            return Err(ValidationError::EmptyCart);
        }
        let table_number = table_number
            .filter(|n| *n > 0)
            .ok_or(ValidationError::MissingTable)?;
        Ok(Self {
            user_id: user_id.into(),
            table_number,
            cart,
            step: CheckoutStep::CollectingContact,
            contact: None,
            payment_method: None,
            placed: None,
        })
    }

    pub fn step(&self) -> CheckoutStep {
        self.step
    }

    pub fn cart(&self) -> &CartSnapshot {
        &self.cart
    }

    pub fn total(&self) -> u64 {
        self.cart.total()
    }

    pub fn table_number(&self) -> u32 {
        self.table_number
    }

    pub fn contact(&self) -> Option<&Contact> {
        self.contact.as_ref()
    }

    pub fn payment_method(&self) -> Option<PaymentMethod> {
        self.payment_method
    }

    /// Order created by a successful confirmation
    pub fn placed_order(&self) -> Option<&Order> {
        self.placed.as_ref()
    }

    fn expect_step(&self, step: CheckoutStep) -> Result<(), ValidationError> {
        if self.step == step {
            Ok(())
        } else {
            Err(ValidationError::WrongStep(step.name()))
        }
    }

    /// Validate the contact and move to payment selection
    pub fn submit_contact(&mut self, raw: &str) -> Result<&Contact, ValidationError> {
        self.expect_step(CheckoutStep::CollectingContact)?;
        let contact = Contact::parse(raw)?;
        self.step = CheckoutStep::SelectingPayment;
        Ok(&*self.contact.insert(contact))
    }

    /// Back from payment selection to contact entry
    pub fn back(&mut self) -> Result<(), ValidationError> {
        self.expect_step(CheckoutStep::SelectingPayment)?;
        self.step = CheckoutStep::CollectingContact;
        Ok(())
    }

    /// Local selection only
    pub fn select_payment(&mut self, method: PaymentMethod) -> Result<(), ValidationError> {
        self.expect_step(CheckoutStep::SelectingPayment)?;
        self.payment_method = Some(method);
        Ok(())
    }

    /// Draft for submission, once contact and method are set
    pub fn draft(&self) -> Result<OrderDraft, ValidationError> {
        self.expect_step(CheckoutStep::SelectingPayment)?;
        let contact = self.contact.clone().ok_or(ValidationError::MissingContact)?;
        let payment_method = self
            .payment_method
            .ok_or(ValidationError::MissingPaymentMethod)?;
        Ok(OrderDraft {
            user_id: self.user_id.clone(),
            table_number: self.table_number,
            contact,
            payment_method,
            entries: self.cart.entries.clone(),
        })
    }

    /// Initiate payment (electronic methods) and submit the order
    ///
    /// `cart` is the cart as read right before submission; it replaces the
    /// snapshot taken at `open` and must still be non-empty.
    pub async fn confirm(
        &mut self,
        cart: CartSnapshot,
        gateway: &Gateway,
        payments: Arc<dyn PaymentInitiator>,
    ) -> ClientResult<Order> {
        self.draft()?;
        if cart.is_empty() {
            return Err(ValidationError::EmptyCart.into());
        }
        self.cart = cart;
        let draft = self.draft()?;
        tracing::info!(
            user_id = %draft.user_id,
            table = draft.table_number,
            method = %draft.payment_method,
            total = draft.total(),
            "Confirming checkout"
        );

        spawn_initiation(
            payments,
            PaymentRequest {
                method: draft.payment_method,
                contact: draft.contact.as_str().to_string(),
                amount: draft.total(),
            },
        );

        let order = submit_order(gateway, &draft).await?;
        self.step = CheckoutStep::Confirmed;
        self.placed = Some(order.clone());
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{MemoryStore, StoreOp};
    use crate::payment::SimulatedPayment;
    use shared::models::{CartLine, MenuItem};

    fn snapshot() -> CartSnapshot {
        CartSnapshot {
            entries: vec![CartEntry {
                line: CartLine {
                    id: "c1".into(),
                    user_id: "u1".into(),
                    menu_item_id: "a".into(),
                    quantity: 3,
                },
                item: MenuItem {
                    id: "a".into(),
                    name: "Garba".into(),
                    price: 1500,
                    category: "Plats".into(),
                    available: true,
                    description: None,
                    image_ref: None,
                },
            }],
        }
    }

    #[test]
    fn test_contact_validation() {
        assert_eq!(
            Contact::parse("a@b.com"),
            Ok(Contact::Email("a@b.com".into()))
        );
        assert_eq!(
            Contact::parse(" 07 12 34 56 78 "),
            Ok(Contact::Phone("07 12 34 56 78".into()))
        );
        assert_eq!(
            Contact::parse("+225 (07) 123-456").map(|c| c.delivery_channel()),
            Ok("SMS")
        );
        assert_eq!(Contact::parse("   "), Err(ValidationError::MissingContact));
        assert!(matches!(
            Contact::parse("1234567"),
            Err(ValidationError::InvalidContact(_))
        ));
        assert!(matches!(
            Contact::parse("call me maybe"),
            Err(ValidationError::InvalidContact(_))
        ));
    }

    #[test]
    fn test_open_preconditions() {
        assert_eq!(
            Checkout::open("u1", Some(7), CartSnapshot::default()).unwrap_err(),
            ValidationError::EmptyCart
        );
        assert_eq!(
            Checkout::open("u1", None, snapshot()).unwrap_err(),
            ValidationError::MissingTable
        );
        assert!(Checkout::open("u1", Some(7), snapshot()).is_ok());
    }

    #[test]
    fn test_step_transitions() {
        let mut checkout = Checkout::open("u1", Some(7), snapshot()).unwrap();
        assert_eq!(
            checkout.select_payment(PaymentMethod::Cash),
            Err(ValidationError::WrongStep("payment"))
        );
        assert!(checkout.submit_contact("nope").is_err());
        assert_eq!(checkout.step(), CheckoutStep::CollectingContact);

        checkout.submit_contact("a@b.com").unwrap();
        assert_eq!(checkout.step(), CheckoutStep::SelectingPayment);
        assert_eq!(
            checkout.draft().unwrap_err(),
            ValidationError::MissingPaymentMethod
        );

        checkout.back().unwrap();
        checkout.submit_contact("0712345678").unwrap();
        checkout.select_payment(PaymentMethod::Wave).unwrap();
        let draft = checkout.draft().unwrap();
        assert_eq!(draft.contact, Contact::Phone("0712345678".into()));
        assert_eq!(draft.total(), 4500);
    }

    #[tokio::test]
    async fn test_confirm_without_method_never_calls_backend() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Gateway::new(store.clone());
        let mut checkout = Checkout::open("u1", Some(7), snapshot()).unwrap();
        checkout.submit_contact("a@b.com").unwrap();

        let err = checkout
            .confirm(snapshot(), &gateway, Arc::new(SimulatedPayment::default()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Validation(ValidationError::MissingPaymentMethod)
        ));
        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test]
    async fn test_partial_failure_reports_stage_and_order() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Gateway::new(store.clone());
        let mut checkout = Checkout::open("u1", Some(7), snapshot()).unwrap();
        checkout.submit_contact("a@b.com").unwrap();
        checkout.select_payment(PaymentMethod::Cash).unwrap();
        let draft = checkout.draft().unwrap();

        store.fail_next(Collection::OrderLines, StoreOp::Insert);
        let err = submit_order(&gateway, &draft).await.unwrap_err();
        assert_eq!(err.stage, SubmissionStage::InsertLines);
        let orphan = err.order_id.clone().unwrap();
        assert_eq!(store.rows(Collection::Orders)[0]["id"], orphan.as_str());
        assert!(store.rows(Collection::OrderLines).is_empty());

        store.fail_next(Collection::Orders, StoreOp::Insert);
        let err = submit_order(&gateway, &draft).await.unwrap_err();
        assert_eq!(err.stage, SubmissionStage::InsertOrder);
        assert!(err.order_id.is_none());
    }

    #[tokio::test]
    async fn test_confirm_with_emptied_cart_is_refused() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Gateway::new(store.clone());
        let mut checkout = Checkout::open("u1", Some(7), snapshot()).unwrap();
        checkout.submit_contact("a@b.com").unwrap();
        checkout.select_payment(PaymentMethod::Cash).unwrap();

        let err = checkout
            .confirm(
                CartSnapshot::default(),
                &gateway,
                Arc::new(SimulatedPayment::default()),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Validation(ValidationError::EmptyCart)
        ));
        assert_eq!(store.call_count(), 0);
        assert_eq!(checkout.step(), CheckoutStep::SelectingPayment);
    }

    #[tokio::test]
    async fn test_confirm_orders_the_cart_it_is_given() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Gateway::new(store.clone());
        let mut checkout = Checkout::open("u1", Some(7), snapshot()).unwrap();
        checkout.submit_contact("a@b.com").unwrap();
        checkout.select_payment(PaymentMethod::Cash).unwrap();

        let mut fresh = snapshot();
        let mut extra = fresh.entries[0].clone();
        extra.line.id = "c2".into();
        extra.line.menu_item_id = "b".into();
        extra.line.quantity = 2;
        extra.item.id = "b".into();
        extra.item.price = 500;
        fresh.entries.push(extra);

        let order = checkout
            .confirm(fresh, &gateway, Arc::new(SimulatedPayment::default()))
            .await
            .unwrap();
        assert_eq!(order.total_amount, 5500);
        assert_eq!(checkout.total(), 5500);
        assert_eq!(store.rows(Collection::OrderLines).len(), 2);
    }

    #[tokio::test]
    async fn test_clear_cart_keeps_lines_not_ordered() {
        let store = Arc::new(MemoryStore::new());
        store.seed(
            Collection::CartItems,
            vec![
                serde_json::json!({"id": "c1", "user_id": "u1", "menu_item_id": "a", "quantity": 3}),
                serde_json::json!({"id": "c9", "user_id": "u1", "menu_item_id": "b", "quantity": 1}),
            ],
        );
        let gateway = Gateway::new(store.clone());
        let mut checkout = Checkout::open("u1", Some(7), snapshot()).unwrap();
        checkout.submit_contact("a@b.com").unwrap();
        checkout.select_payment(PaymentMethod::Cash).unwrap();

        submit_order(&gateway, &checkout.draft().unwrap()).await.unwrap();
        let left = store.rows(Collection::CartItems);
        assert_eq!(left.len(), 1);
        assert_eq!(left[0]["id"], "c9");
    }
}
