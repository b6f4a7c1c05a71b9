//! Shared types for FastOrder
//!
//! Data models, query descriptions and push-channel messages used by the
//! patron client and by any backend adapter speaking to it.

pub mod message;
pub mod models;
pub mod query;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

// Push channel re-exports (for convenient access)
pub use message::{ChangeEvent, ChangeKind};

// Query re-exports
pub use query::{Filter, FilterOp, Query, Sort};
