pub mod adapter;
pub mod client;
pub mod parser;
pub mod remote;
pub mod subscriptions;

pub use adapter::*;
pub use client::*;
pub use parser::*;
pub use remote::*;
pub use subscriptions::*;

use firewatch_core::IncidentStore;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared handle to the canonical store. Single-writer in practice: the feed
/// adapter and the mutation coordinator take the write lock, view consumers
/// only read.
pub type SharedStore = Arc<RwLock<IncidentStore>>;
