//! End-to-end patron flows against the in-memory backend

use patron_client::cart::CartSync;
use patron_client::checkout::CheckoutStep;
use patron_client::gateway::StoreOp;
use patron_client::identity::Identity;
use patron_client::payment::SimulatedPayment;
use patron_client::transient::{NOTICE_DURATION, NoticeBoard, NoticeLevel};
use patron_client::{
    ClientConfig, ClientError, Collection, Gateway, MemoryStore, OrderStatus, PatronSession,
    PaymentMethod, RemoteStore, SubmissionStage, ValidationError,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.seed(
        Collection::MenuItems,
        vec![
            json!({"id": "a", "name": "Garba", "price": 1500, "category": "Plats", "available": true}),
            json!({"id": "b", "name": "Bissap", "price": 500, "category": "Boissons", "available": true}),
            json!({"id": "c", "name": "Kedjenou", "price": 4000, "category": "Plats", "available": false}),
        ],
    );
    store
}

async fn session(store: &Arc<MemoryStore>, table: Option<u32>) -> PatronSession {
    let identity = Identity {
        user_id: "u1".into(),
        table_number: table,
    };
    PatronSession::in_memory(
        ClientConfig::default(),
        identity,
        store.clone(),
        Arc::new(SimulatedPayment::new(Duration::from_millis(10))),
    )
    .await
    .unwrap()
}

/// Let the dispatch loop and the watch tasks catch up
async fn settle() {
    sleep(Duration::from_millis(50)).await;
}

async fn place_order(
    session: &PatronSession,
    contact: &str,
    method: PaymentMethod,
) -> Result<String, ClientError> {
    session.open_checkout()?;
    session.checkout_contact(contact)?;
    session.checkout_select_payment(method)?;
    session.confirm_checkout().await.map(|order| order.id)
}

#[tokio::test(start_paused = true)]
async fn test_add_twice_then_checkout_cash() {
    let store = seeded_store();
    let session = session(&store, Some(7)).await;

    let names: Vec<String> = session.menu().items().into_iter().map(|i| i.name).collect();
    assert_eq!(names.len(), 2);
    assert!(!names.contains(&"Kedjenou".to_string()));

    session.add_to_cart("a", 1).await.unwrap();
    let cart = session.add_to_cart("a", 2).await.unwrap();
    assert_eq!(cart.len(), 1);
    assert_eq!(cart.entries[0].line.quantity, 3);
    assert_eq!(cart.total(), 4500);
    assert_eq!(session.notice().unwrap().text, "Garba added to your cart");

    session.open_checkout().unwrap();
    assert_eq!(session.checkout_total(), Some(4500));
    session.checkout_contact("a@b.com").unwrap();
    session.checkout_select_payment(PaymentMethod::Cash).unwrap();
    let order = session.confirm_checkout().await.unwrap();

    assert_eq!(order.total_amount, 4500);
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.table_number, 7);
    assert_eq!(order.payment_method, PaymentMethod::Cash);
    assert_eq!(session.checkout_step(), Some(CheckoutStep::Confirmed));
    assert_eq!(
        session.notice().unwrap().text,
        "Order placed! Your invoice will be sent by email"
    );

    assert!(store.rows(Collection::CartItems).is_empty());
    assert!(session.cart().snapshot().is_empty());
    let lines = store.rows(Collection::OrderLines);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["order_id"], json!(order.id));
    assert_eq!(lines[0]["quantity"], json!(3));
    assert_eq!(lines[0]["unit_price"], json!(1500));

    // tracker picks up the new order without a popup
    assert_eq!(session.tracker().order().unwrap().id, order.id);
    assert!(session.tracker().popup().is_none());

    // checkout closes itself
    sleep(Duration::from_millis(2100)).await;
    assert_eq!(session.checkout_step(), None);
}

#[tokio::test(start_paused = true)]
async fn test_checkout_orders_lines_added_from_another_device() {
    let store = seeded_store();
    let session = session(&store, Some(7)).await;
    session.add_to_cart("a", 1).await.unwrap();
    session.open_checkout().unwrap();
    assert_eq!(session.checkout_total(), Some(1500));

    // same user on a second device
    let other = CartSync::new(
        Gateway::new(store.clone()),
        "u1",
        Arc::new(NoticeBoard::new(NOTICE_DURATION)),
    );
    other.add("b", 2).await.unwrap();

    session.checkout_contact("a@b.com").unwrap();
    session.checkout_select_payment(PaymentMethod::Cash).unwrap();
    let order = session.confirm_checkout().await.unwrap();

    assert_eq!(order.total_amount, 2500);
    assert_eq!(session.checkout_total(), Some(2500));
    assert_eq!(store.rows(Collection::OrderLines).len(), 2);
    assert!(store.rows(Collection::CartItems).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_checkout_refused_when_cart_emptied_elsewhere() {
    let store = seeded_store();
    let session = session(&store, Some(7)).await;
    let line = session.add_to_cart("a", 1).await.unwrap().entries[0].line.id.clone();
    session.open_checkout().unwrap();
    session.checkout_contact("a@b.com").unwrap();
    session.checkout_select_payment(PaymentMethod::Cash).unwrap();

    let other = CartSync::new(
        Gateway::new(store.clone()),
        "u1",
        Arc::new(NoticeBoard::new(NOTICE_DURATION)),
    );
    other.remove(&line).await.unwrap();

    assert!(matches!(
        session.confirm_checkout().await,
        Err(ClientError::Validation(ValidationError::EmptyCart))
    ));
    assert!(store.rows(Collection::Orders).is_empty());
    assert_eq!(session.checkout_step(), Some(CheckoutStep::SelectingPayment));
}

#[tokio::test(start_paused = true)]
async fn test_kitchen_updates_drive_the_tracker() {
    let store = seeded_store();
    let session = session(&store, Some(7)).await;
    session.add_to_cart("b", 2).await.unwrap();
    let order_id = place_order(&session, "0707070707", PaymentMethod::Wave)
        .await
        .unwrap();
    settle().await;

    let banner = session.tracker().banner().unwrap();
    assert!(banner.presentation.text.contains("in queue"));

    store
        .update(Collection::Orders, &order_id, json!({"status": "Preparing"}))
        .await
        .unwrap();
    settle().await;

    let popup = session.tracker().popup().unwrap();
    assert_eq!(popup.status, OrderStatus::Preparing);
    assert!(popup.presentation.text.contains("being prepared"));

    store
        .update(Collection::Orders, &order_id, json!({"status": "Completed"}))
        .await
        .unwrap();
    settle().await;

    assert!(session.tracker().popup().is_none());
    assert!(session.tracker().banner().is_none());
    assert_eq!(session.tracker().order().unwrap().status, OrderStatus::Completed);

    // history followed the same changes
    let record = session.history().find(&order_id).unwrap();
    assert_eq!(record.order.status, OrderStatus::Completed);
    assert_eq!(record.lines[0].name, "Bissap");
}

#[tokio::test(start_paused = true)]
async fn test_close_updates_show_one_popup() {
    let store = seeded_store();
    let session = session(&store, Some(3)).await;

    // the kitchen side created this order after the session loaded
    store.seed(
        Collection::Orders,
        vec![json!({"id": "o1", "user_id": "u1", "table_number": 3, "total_amount": 500,
                    "status": "Pending", "contact": "a@b.com", "payment_method": "wave",
                    "created_at": "2026-01-01T10:00:00.000000Z"})],
    );
    store
        .update(Collection::Orders, "o1", json!({"status": "Pending"}))
        .await
        .unwrap();
    settle().await;
    assert_eq!(session.tracker().popup().unwrap().status, OrderStatus::Pending);

    sleep(Duration::from_millis(600)).await;
    store
        .update(Collection::Orders, "o1", json!({"status": "Preparing"}))
        .await
        .unwrap();
    settle().await;
    assert_eq!(session.tracker().popup().unwrap().status, OrderStatus::Preparing);

    // five seconds from the latest update, not the first
    sleep(Duration::from_millis(4800)).await;
    assert!(session.tracker().popup().is_some());
    sleep(Duration::from_millis(300)).await;
    assert!(session.tracker().popup().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_checkout_preconditions_stay_local() {
    let store = seeded_store();

    let no_table = session(&store, None).await;
    let calls = store.call_count();
    assert_eq!(no_table.open_checkout(), Err(ValidationError::EmptyCart));
    assert_eq!(no_table.notice().unwrap().level, NoticeLevel::Error);

    no_table.add_to_cart("a", 1).await.unwrap();
    let calls_after_add = store.call_count();
    assert!(calls_after_add > calls);
    assert_eq!(no_table.open_checkout(), Err(ValidationError::MissingTable));
    assert_eq!(store.call_count(), calls_after_add);
    drop(no_table);
    settle().await;

    let session = session(&store, Some(4)).await;
    settle().await;
    let calls = store.call_count();
    session.open_checkout().unwrap();
    assert!(matches!(
        session.checkout_contact("not a contact"),
        Err(ValidationError::InvalidContact(_))
    ));
    assert_eq!(session.checkout_step(), Some(CheckoutStep::CollectingContact));
    session.checkout_contact("a@b.com").unwrap();
    assert!(matches!(
        session.confirm_checkout().await,
        Err(ClientError::Validation(ValidationError::MissingPaymentMethod))
    ));
    assert_eq!(store.call_count(), calls);
    assert!(store.rows(Collection::Orders).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_line_insert_reports_the_order() {
    let store = seeded_store();
    let session = session(&store, Some(7)).await;
    session.add_to_cart("a", 1).await.unwrap();

    store.fail_next(Collection::OrderLines, StoreOp::Insert);
    let err = place_order(&session, "a@b.com", PaymentMethod::Cash)
        .await
        .unwrap_err();

    let ClientError::Submission(failure) = err else {
        panic!("expected a submission error, got {err:?}");
    };
    assert_eq!(failure.stage, SubmissionStage::InsertLines);
    let orders = store.rows(Collection::Orders);
    assert_eq!(orders.len(), 1);
    assert_eq!(failure.order_id.as_deref(), orders[0]["id"].as_str());

    // no rollback: the cart is still there and the checkout can be retried
    assert_eq!(store.rows(Collection::CartItems).len(), 1);
    assert_eq!(session.checkout_step(), Some(CheckoutStep::SelectingPayment));
    let notice = session.notice().unwrap();
    assert_eq!(notice.level, NoticeLevel::Error);
    assert!(notice.text.contains("partly recorded"));
}

#[tokio::test(start_paused = true)]
async fn test_invoice_export_after_checkout() {
    let store = seeded_store();
    let session = session(&store, Some(7)).await;
    session.add_to_cart("a", 3).await.unwrap();
    let order_id = place_order(&session, "a@b.com", PaymentMethod::Card)
        .await
        .unwrap();

    let doc = session.export_invoice(&order_id).await.unwrap();
    assert!(doc.file_name.ends_with("-Dabali Xpress.html"));
    assert!(doc.html.contains("Table 7"));
    assert!(doc.html.contains("4 500 FCFA"));

    assert!(matches!(
        session.export_invoice("missing").await,
        Err(ClientError::NotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_session_drop_releases_subscriptions() {
    let store = seeded_store();
    let session = session(&store, Some(7)).await;
    let bus = session.bus().clone();
    assert_eq!(bus.active_channels().len(), 4);

    drop(session);
    settle().await;
    assert!(bus.active_channels().is_empty());
}
