//! Database layer
//!
//! The store seam plus its MongoDB and in-memory implementations.

pub mod memory;
pub mod mongo;
pub mod store;

pub use memory::MemoryStore;
pub use mongo::MongoClient;
pub use store::{
    CursorOptions, DocumentCursor, DocumentStore, Query, UpdateOutcome, UpdateScope,
};
