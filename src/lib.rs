//! Mongo Holder - typed MongoDB access for audited entities
//!
//! Entities carry an optional ObjectId and a flattened [`entity::Audit`]
//! block. [`holder::MongoHolder`] stores them through a [`db::DocumentStore`],
//! either the MongoDB driver ([`db::MongoClient`]) or the in-process
//! [`db::MemoryStore`], and adds selective updates and cursor scans on top.

pub mod codec;
pub mod config;
pub mod db;
pub mod entity;
pub mod holder;
pub mod types;

// Used by `impl_entity!` expansions in downstream crates
pub use bson;

pub use codec::DocumentCodec;
pub use config::{Args, MongoArgs};
pub use db::{MemoryStore, MongoClient, Query};
pub use entity::{Audit, Entity};
pub use holder::{MongoHolder, ScanOptions, Update, UpdateMode};
pub use types::{HolderError, Result};
