//! # apotheca-db: Persistence Medium
//!
//! Local key-value storage that lets an origin survive a restart.
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`keys`] - Persistence key layout
//! - [`repository`] - Raw and typed repositories
//! - [`queue`] - Fire-and-forget write queue used by the store
//! - [`error`] - Database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use apotheca_db::{Database, DbConfig, PersistWriter};
//!
//! let db = Database::new(DbConfig::new("apotheca.db")).await?;
//! let inventory = db.state().load_inventory().await;
//! let (persist, _writer) = PersistWriter::spawn(db.kv());
//! persist.put(apotheca_db::keys::MEDICATIONS, &inventory.medications)?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod keys;
pub mod migrations;
pub mod pool;
pub mod queue;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use queue::{PersistHandle, PersistOp, PersistWriter};
pub use repository::kv::KvRepository;
pub use repository::state::{InventoryData, StateRepository};
