//! Shared types for the holder

pub mod error;

pub use error::{HolderError, Result};
