//! SQLite persistence for the audience extension.
//!
//! This crate provides:
//! - [`DurableQueue`]: the ordered, crash-safe FIFO the hit processor drains
//! - [`SqliteHitQueue`] / [`MemoryHitQueue`]: its two implementations
//! - [`ProfileStore`]: where uuid and visitor profile survive restarts
//! - Versioned schema migrations
//!
//! # Example
//!
//! ```ignore
//! let db = AudienceDatabase::open(&paths.database_file())?;
//! let queue = db.hit_queue();
//! queue.on_privacy_change(PrivacyStatus::OptedIn)?;
//! queue.enqueue(&payload)?;
//! ```

mod db;
mod error;
mod memory_queue;
mod migrations;
mod profile;
mod queue;
mod sqlite_queue;

pub use db::AudienceDatabase;
pub use error::{DatabaseError, DatabaseResult};
pub use memory_queue::MemoryHitQueue;
pub use migrations::{run_migrations, CURRENT_VERSION};
pub use profile::{MemoryProfileStore, ProfileStore, SqliteProfileStore, StoredProfile};
pub use queue::{DurableQueue, QueuedRecord, RecordId};
pub use sqlite_queue::SqliteHitQueue;
