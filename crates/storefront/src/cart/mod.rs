//! Cart store runtime.
//!
//! # Components
//!
//! - [`CartStore`] - one cart behind a lock with write-through persistence
//! - [`CartPersister`] - bounded, coalescing background writer
//! - [`CartStorage`] - durable slots (file, memory, Postgres in [`crate::db`])
//! - [`CartRegistry`] - per-device stores for the server

pub mod persister;
mod registry;
mod storage;
mod store;

pub use persister::CartPersister;
pub use registry::{CartRegistry, device_slot};
pub use storage::{CartStorage, FileCartStorage, MemoryCartStorage, StorageError};
pub use store::{CartStore, CartView};

/// Slot key used by single-device clients.
pub const LOCAL_SLOT: &str = "cart";
