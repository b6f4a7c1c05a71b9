//! Payment initiation
//!
//! The provider integration is a black box behind [`PaymentInitiator`];
//! checkout fires it and does not wait for the outcome.

use async_trait::async_trait;
use shared::models::PaymentMethod;
use std::sync::Arc;
use std::time::Duration;

/// Payment request handed to the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub method: PaymentMethod,
    pub contact: String,
    pub amount: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Initiated,
    Declined,
}

#[async_trait]
pub trait PaymentInitiator: Send + Sync {
    async fn initiate(&self, request: PaymentRequest) -> PaymentOutcome;
}

/// Stand-in provider: waits, logs, succeeds
#[derive(Debug, Clone)]
pub struct SimulatedPayment {
    delay: Duration,
}

impl SimulatedPayment {
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(1500);

    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for SimulatedPayment {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DELAY)
    }
}

#[async_trait]
impl PaymentInitiator for SimulatedPayment {
    async fn initiate(&self, request: PaymentRequest) -> PaymentOutcome {
        tokio::time::sleep(self.delay).await;
        tracing::info!(
            method = %request.method,
            amount = request.amount,
            "Simulated payment initiated"
        );
        PaymentOutcome::Initiated
    }
}

/// Fire-and-forget initiation for electronic methods; cash is a no-op
pub fn spawn_initiation(
    initiator: Arc<dyn PaymentInitiator>,
    request: PaymentRequest,
) -> Option<tokio::task::JoinHandle<PaymentOutcome>> {
    if !request.method.is_electronic() {
        return None;
    }
    Some(tokio::spawn(async move {
        let method = request.method;
        let outcome = initiator.initiate(request).await;
        if outcome == PaymentOutcome::Declined {
            tracing::warn!(method = %method, "Payment declined by provider");
        }
        outcome
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: PaymentMethod) -> PaymentRequest {
        PaymentRequest {
            method,
            contact: "0712345678".into(),
            amount: 4500,
        }
    }

    #[tokio::test]
    async fn test_cash_is_not_initiated() {
        let initiator: Arc<dyn PaymentInitiator> = Arc::new(SimulatedPayment::default());
        assert!(spawn_initiation(initiator, request(PaymentMethod::Cash)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_payment_takes_delay() {
        let initiator: Arc<dyn PaymentInitiator> = Arc::new(SimulatedPayment::default());
        let started = tokio::time::Instant::now();
        let handle = spawn_initiation(initiator, request(PaymentMethod::Wave)).unwrap();
        assert_eq!(handle.await.unwrap(), PaymentOutcome::Initiated);
        assert!(started.elapsed() >= SimulatedPayment::DEFAULT_DELAY);
    }
}
