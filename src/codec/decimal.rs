//! Serde helper for decimal entity fields
//!
//! Use as `#[serde(default, with = "mongo_holder::codec::decimal")]` on an
//! `Option<Decimal128>` field. Reads a stored double or decimal, writes a
//! decimal (which the default write converter stores as a double).

use bson::{Bson, Decimal128};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

pub fn serialize<S>(value: &Option<Decimal128>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    value.serialize(serializer)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Decimal128>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Bson>::deserialize(deserializer)? {
        None | Some(Bson::Null) => Ok(None),
        Some(Bson::Decimal128(decimal)) => Ok(Some(decimal)),
        Some(Bson::Double(double)) => parse(&double.to_string()).map(Some),
        Some(Bson::Int32(n)) => parse(&n.to_string()).map(Some),
        Some(Bson::Int64(n)) => parse(&n.to_string()).map(Some),
        Some(Bson::String(s)) => parse(&s).map(Some),
        Some(other) => Err(D::Error::custom(format!(
            "expected a number for a decimal field, found {:?}",
            other.element_type()
        ))),
    }
}

fn parse<E: serde::de::Error>(text: &str) -> Result<Decimal128, E> {
    text.parse::<Decimal128>()
        .map_err(|e| E::custom(format!("invalid decimal {:?}: {}", text, e)))
}
