//! Entity <-> document conversion
//!
//! The same rules serve persistence and update building, so a value placed
//! in an update document is exactly what an insert would have stored.

mod converters;
pub mod decimal;

pub use converters::{DecimalToDouble, WriteConverter};

use bson::Document;
use serde::de::DeserializeOwned;

use crate::entity::{Entity, ID_FIELD};
use crate::types::{HolderError, Result};

/// Converts entities to store documents and back
pub struct DocumentCodec {
    write_converters: Vec<Box<dyn WriteConverter>>,
}

impl Default for DocumentCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DocumentCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.write_converters.iter().map(|c| c.name()).collect();
        f.debug_struct("DocumentCodec")
            .field("write_converters", &names)
            .finish()
    }
}

impl DocumentCodec {
    /// Codec with the default converters (decimal stored as double)
    pub fn new() -> Self {
        Self {
            write_converters: vec![Box::new(DecimalToDouble)],
        }
    }

    /// Codec with no converters
    pub fn plain() -> Self {
        Self {
            write_converters: Vec::new(),
        }
    }

    /// Append a converter; converters run in registration order
    pub fn with_converter(mut self, converter: impl WriteConverter + 'static) -> Self {
        self.write_converters.push(Box::new(converter));
        self
    }

    /// Serialize an entity into a flat field document
    ///
    /// The identity field is never part of the result.
    pub fn write<T: Entity>(&self, entity: &T) -> Result<Document> {
        let mut doc = bson::to_document(entity)?;
        doc.remove(ID_FIELD);
        Ok(self.convert(doc))
    }

    /// Decode a stored document into `T`
    pub fn read<T: DeserializeOwned>(&self, doc: Document) -> Result<T> {
        bson::from_document(doc).map_err(HolderError::from)
    }

    /// Run the write converters over a document
    pub fn convert(&self, doc: Document) -> Document {
        if self.write_converters.is_empty() {
            return doc;
        }
        converters::apply_document(&self.write_converters, doc)
    }
}
