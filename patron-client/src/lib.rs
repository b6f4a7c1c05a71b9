//! FastOrder patron client
//!
//! Client-side synchronization core of the patron app: anonymous identity,
//! typed access to the remote collections, the change bus, and the menu,
//! cart, order tracker, checkout and invoice views built on them.

pub mod cart;
pub mod checkout;
pub mod config;
pub mod error;
pub mod gateway;
pub mod history;
pub mod identity;
pub mod invoice;
pub mod logger;
pub mod menu;
pub mod message;
pub mod payment;
pub mod session;
pub mod tracker;
pub mod transient;

pub use config::{ClientConfig, RestaurantConfig, Theme};
pub use error::{
    ClientError, ClientResult, ErrorKind, SubmissionError, SubmissionStage, ValidationError,
};
pub use gateway::{Gateway, HttpStore, MemoryStore, RemoteStore};
pub use session::PatronSession;

// Push channel types
pub use message::{BusError, ChangeBus, ChannelSpec, Subscription};

// Re-export shared types for convenience
pub use shared::models::{
    CartEntry, CartLine, Collection, MenuItem, Order, OrderLine, OrderStatus, PaymentMethod,
};
