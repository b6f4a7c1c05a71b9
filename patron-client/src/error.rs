//! Client error types

use std::fmt;
use thiserror::Error;

use crate::message::BusError;

/// Coarse classification used by the UI layer
///
/// - `Validation`: local, never reached the network, shown immediately
/// - `Remote`: a backend call failed, shown as a transient notice
/// - `NotFound`: expected branch outcome, recovered by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Remote,
    NotFound,
}

/// Local precondition failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Your cart is empty")]
    EmptyCart,

    #[error("No table number, scan the QR code on your table")]
    MissingTable,

    #[error("Enter your email or phone number")]
    MissingContact,

    #[error("Invalid contact: enter an email or a phone number")]
    InvalidContact(String),

    #[error("Choose a payment method")]
    MissingPaymentMethod,

    #[error("Quantity must be at least 1, got {0}")]
    InvalidQuantity(u32),

    #[error("Checkout is not open")]
    CheckoutClosed,

    #[error("Checkout is not at the {0} step")]
    WrongStep(&'static str),
}

/// Step of the order submission sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStage {
    /// Insert the order header
    InsertOrder,
    /// Bulk insert the order lines
    InsertLines,
    /// Delete the user's cart lines
    ClearCart,
}

impl fmt::Display for SubmissionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionStage::InsertOrder => write!(f, "insert_order"),
            SubmissionStage::InsertLines => write!(f, "insert_lines"),
            SubmissionStage::ClearCart => write!(f, "clear_cart"),
        }
    }
}

/// Order submission failed part way
///
/// Steps are not rolled back. `order_id` is set when the header was
/// already created, which leaves an order without lines (InsertLines) or
/// stale cart lines (ClearCart) for manual reconciliation.
#[derive(Debug, Error)]
#[error("Order submission failed at {stage}: {source}")]
pub struct SubmissionError {
    pub stage: SubmissionStage,
    pub order_id: Option<String>,
    #[source]
    pub source: Box<ClientError>,
}

/// Client error type
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with an error status
    #[error("Remote error ({status}): {message}")]
    Remote { status: u16, message: String },

    /// Invalid response format
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Request refused before sending
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Authentication required
    #[error("Authentication required")]
    Unauthorized,

    /// Permission denied
    #[error("Permission denied: {0}")]
    Forbidden(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Push channel error
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// Partial order submission
    #[error(transparent)]
    Submission(#[from] SubmissionError),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Validation(_) => ErrorKind::Validation,
            ClientError::NotFound(_) => ErrorKind::NotFound,
            _ => ErrorKind::Remote,
        }
    }

    /// Short text suitable for a transient notice
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Validation(e) => e.to_string(),
            ClientError::NotFound(_) => "Not found".to_string(),
            ClientError::Submission(e) if e.order_id.is_some() => format!(
                "Order {} was only partly recorded, please ask the staff",
                e.order_id.as_deref().unwrap_or_default()
            ),
            _ => "Something went wrong, please try again".to_string(),
        }
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            ClientError::from(ValidationError::EmptyCart).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            ClientError::NotFound("orders".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(ClientError::Unauthorized.kind(), ErrorKind::Remote);

        let partial = ClientError::from(SubmissionError {
            stage: SubmissionStage::InsertLines,
            order_id: Some("abc".into()),
            source: Box::new(ClientError::Remote {
                status: 500,
                message: "boom".into(),
            }),
        });
        assert_eq!(partial.kind(), ErrorKind::Remote);
        assert!(partial.to_string().contains("insert_lines"));
        assert!(partial.user_message().contains("abc"));
    }
}
