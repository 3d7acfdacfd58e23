//! Selective update builder
//!
//! Projects an entity through the codec and turns the result into a
//! `$set`/`$unset` document. Nothing here ever produces a replacement
//! document.

use bson::{Bson, Document};

use crate::codec::DocumentCodec;
use crate::entity::Entity;
use crate::types::{HolderError, Result};

/// Which fields of an entity an update touches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateMode {
    /// Exactly the named fields: set when the entity has a value, unset otherwise
    FieldSubset(Vec<String>),
    /// Every field with a value; null fields are left alone
    FullDiff,
    /// Every written field, nulls included, overwriting the record's field set
    AllFields,
}

impl UpdateMode {
    /// Field mode from any list of names
    pub fn fields<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::FieldSubset(names.into_iter().map(Into::into).collect())
    }
}

/// One field-level instruction
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Set(Bson),
    Unset,
}

/// Field-level set/unset instructions, in the order they were added
///
/// Built fresh for each update call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    ops: Vec<(String, FieldUpdate)>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `field`, replacing any earlier instruction for it
    pub fn set(&mut self, field: impl Into<String>, value: Bson) -> &mut Self {
        self.put(field.into(), FieldUpdate::Set(value))
    }

    /// Unset `field`, replacing any earlier instruction for it
    pub fn unset(&mut self, field: impl Into<String>) -> &mut Self {
        self.put(field.into(), FieldUpdate::Unset)
    }

    fn put(&mut self, field: String, op: FieldUpdate) -> &mut Self {
        match self.ops.iter_mut().find(|(name, _)| *name == field) {
            Some(existing) => existing.1 = op,
            None => self.ops.push((field, op)),
        }
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldUpdate> {
        self.ops
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, op)| op)
    }

    /// Names of all touched fields
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.ops.iter().map(|(name, _)| name.as_str())
    }

    pub fn is_set(&self, field: &str) -> bool {
        matches!(self.get(field), Some(FieldUpdate::Set(_)))
    }

    pub fn is_unset(&self, field: &str) -> bool {
        matches!(self.get(field), Some(FieldUpdate::Unset))
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Render as an update document (`$set` / `$unset`, empty parts omitted)
    pub fn to_document(&self) -> Document {
        let mut set = Document::new();
        let mut unset = Document::new();
        for (name, op) in &self.ops {
            match op {
                FieldUpdate::Set(value) => {
                    set.insert(name.clone(), value.clone());
                }
                FieldUpdate::Unset => {
                    unset.insert(name.clone(), "");
                }
            }
        }

        let mut update = Document::new();
        if !set.is_empty() {
            update.insert("$set", set);
        }
        if !unset.is_empty() {
            update.insert("$unset", unset);
        }
        update
    }

    /// Build the update for `entity` under `mode`
    ///
    /// Fails with `InvalidArgument` when the entity is absent or a named
    /// field is blank. Field names are looked up at the top level of the
    /// written document.
    pub fn from_entity<T: Entity>(
        codec: &DocumentCodec,
        entity: Option<&T>,
        mode: &UpdateMode,
    ) -> Result<Self> {
        let entity = entity.ok_or_else(|| HolderError::invalid("entity to update is absent"))?;

        if let UpdateMode::FieldSubset(names) = mode {
            if names.iter().any(|name| name.trim().is_empty()) {
                return Err(HolderError::invalid("update field names must not be blank"));
            }
        }

        let written = codec.write(entity)?;
        let mut update = Update::new();

        match mode {
            UpdateMode::FieldSubset(names) if !names.is_empty() => {
                for name in names {
                    match written.get(name) {
                        Some(Bson::Null) | None => update.unset(name.as_str()),
                        Some(value) => update.set(name.as_str(), value.clone()),
                    };
                }
            }
            // An empty field list selects nothing explicitly; behave as FullDiff
            UpdateMode::FieldSubset(_) | UpdateMode::FullDiff => {
                for (name, value) in written {
                    if value != Bson::Null {
                        update.set(name, value);
                    }
                }
            }
            UpdateMode::AllFields => {
                for (name, value) in written {
                    update.set(name, value);
                }
            }
        }

        Ok(update)
    }
}

impl From<&Update> for Document {
    fn from(update: &Update) -> Self {
        update.to_document()
    }
}
