//! Storage tiers for cache entries.
//!
//! Two backends exist: an ephemeral in-process map (`MemoryStore`) and a
//! durable SQLite store (`SqliteStore`) queryable by timestamp. Named
//! stores are lightweight handles over the durable backend, each carrying
//! a generation-tagged name and a soft capacity bound.

mod memory;
mod named;
mod sqlite;

pub use memory::MemoryStore;
pub use named::NamedStore;
pub use sqlite::SqliteStore;
