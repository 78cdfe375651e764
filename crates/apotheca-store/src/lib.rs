//! # apotheca-store: Replicated Store Runtime
//!
//! Owns the state of one origin and keeps it converging with its peers.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          apotheca-store                                 │
//! │                                                                         │
//! │   DispatcherHandle ──► Dispatcher task                                  │
//! │                          │                                              │
//! │                          ▼                                              │
//! │                       Workspace                                         │
//! │            ┌─────────────┼──────────────┐                               │
//! │            ▼             ▼              ▼                               │
//! │   InventoryStore     ConfigStore     AlertCenter                        │
//! │   (collections,      (AlertSettings, (user, acks,                       │
//! │    housekeeping)      admin-only)     last view)                        │
//! │            │             │              │                               │
//! │            └──── PersistHandle ◄────────┘      (apotheca-db)            │
//! │            └──── Transport ───► peers          (apotheca-sync)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`store`] - Inventory collections, local mutations, remote merge
//! - [`housekeeping`] - Daily supplier returns for expired batches
//! - [`config_store`] - Replicated alert configuration
//! - [`alert_center`] - Per-user acknowledgments and the current alert view
//! - [`workspace`] - The three owned together
//! - [`dispatcher`] - The task that serializes every input
//! - [`clock`] - Time source
//! - [`error`] - Store error types

pub mod alert_center;
pub mod clock;
pub mod config_store;
pub mod dispatcher;
pub mod error;
pub mod housekeeping;
pub mod store;
pub mod workspace;

pub use alert_center::AlertCenter;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config_store::ConfigStore;
pub use dispatcher::{Dispatcher, DispatcherConfig, DispatcherHandle};
pub use error::{StoreError, StoreResult};
pub use housekeeping::HousekeepingReport;
pub use store::{ChangeSource, InventorySnapshot, InventoryStore, StoreChange};
pub use workspace::Workspace;
