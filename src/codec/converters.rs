//! Write converters
//!
//! Value-level coercions applied to every written document before it reaches
//! the store.

use bson::{Bson, Decimal128, Document};
use tracing::warn;

/// Coerces one stored value on the way to the store
pub trait WriteConverter: Send + Sync {
    /// Short name for logging
    fn name(&self) -> &'static str;

    /// Return `Some(replacement)` to rewrite the value, `None` to keep it
    fn convert(&self, value: &Bson) -> Option<Bson>;
}

/// Stores decimals as doubles
#[derive(Debug, Clone, Copy, Default)]
pub struct DecimalToDouble;

impl WriteConverter for DecimalToDouble {
    fn name(&self) -> &'static str {
        "decimal-to-double"
    }

    fn convert(&self, value: &Bson) -> Option<Bson> {
        let Bson::Decimal128(decimal) = value else {
            return None;
        };
        match decimal_to_f64(decimal) {
            Some(double) => Some(Bson::Double(double)),
            None => {
                warn!("Decimal {} has no double form, stored unchanged", decimal);
                None
            }
        }
    }
}

pub(crate) fn decimal_to_f64(decimal: &Decimal128) -> Option<f64> {
    decimal.to_string().parse::<f64>().ok()
}

/// Apply `converters` to every value of `doc`, recursively
pub(crate) fn apply_document(converters: &[Box<dyn WriteConverter>], doc: Document) -> Document {
    doc.into_iter()
        .map(|(key, nested)| (key, apply(converters, nested)))
        .collect()
}

/// Apply `converters` in order to `value` and everything nested in it
pub(crate) fn apply(converters: &[Box<dyn WriteConverter>], value: Bson) -> Bson {
    match value {
        Bson::Document(doc) => Bson::Document(apply_document(converters, doc)),
        Bson::Array(items) => {
            Bson::Array(items.into_iter().map(|v| apply(converters, v)).collect())
        }
        scalar => converters.iter().fold(scalar, |current, converter| {
            converter.convert(&current).unwrap_or(current)
        }),
    }
}
