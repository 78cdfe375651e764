//! # apotheca-sync: Transport for Apotheca
//!
//! Keeps several origins (processes or tabs) looking at the same pharmacy
//! consistent without a central database.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   ┌───────────── host 1 ─────────────┐     ┌──────── host 2 ────────┐  │
//! │   │  RealtimeBus A    RealtimeBus B  │     │  RealtimeBus C         │  │
//! │   │       │  ▲            │  ▲       │     │      │  ▲              │  │
//! │   │       ▼  │            ▼  │       │     │      ▼  │              │  │
//! │   │   ┌───────────────────────────┐  │     │  ┌──────────────┐     │  │
//! │   │   │      LocalBroadcast       │  │     │  │LocalBroadcast│     │  │
//! │   │   └───────────────────────────┘  │     │  └──────────────┘     │  │
//! │   │       │ NetworkChannel           │     │      │ NetworkChannel │  │
//! │   └───────┼──────────────────────────┘     └──────┼────────────────┘  │
//! │           │          ┌──────────────┐              │                   │
//! │           └──── ws ──► RelayServer  ◄──── ws ──────┘                   │
//! │                      │  fan-out     │                                  │
//! │                      └──────────────┘                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`protocol`] - `Envelope`, `Topic` and typed payloads
//! - [`transport`] - `Transport` trait, `Subscription`, handler registry
//! - [`local`] - Same-host broadcast channel
//! - [`network`] - WebSocket client with reconnection
//! - [`bus`] - `RealtimeBus`, the production transport
//! - [`relay`] - WebSocket fan-out server
//! - [`config`] - TOML/env configuration
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use apotheca_sync::{LocalBroadcast, RealtimeBus, Topic, Transport};
//!
//! let local = LocalBroadcast::default();
//! let bus = RealtimeBus::in_process(&local);
//!
//! let _sub = bus.subscribe(Topic::MedicationDelete, Arc::new(|payload, origin| {
//!     println!("{origin} deleted {}", payload["id"]);
//! }));
//! bus.publish(Topic::MedicationDelete, json!({ "id": "m1" }));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod bus;
pub mod config;
pub mod error;
pub mod local;
pub mod network;
pub mod protocol;
pub mod relay;
pub mod transport;

// =============================================================================
// Re-exports
// =============================================================================

pub use bus::RealtimeBus;
pub use config::NodeConfig;
pub use error::{SyncError, SyncResult};
pub use local::LocalBroadcast;
pub use network::{ConnectionState, NetworkChannel, NetworkConfig, NetworkHandle};
pub use protocol::{ConfigUpdate, EntityRef, EntityUpdate, Envelope, Topic};
pub use relay::{RelayConfig, RelayHandle, RelayServer};
pub use transport::{Handler, HandlerRegistry, Subscription, Transport};
