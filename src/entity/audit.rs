//! Audit fields shared by every entity
//!
//! Soft-delete flag plus creator/updater stamps. Timestamps are epoch seconds.

use serde::{Deserialize, Serialize};

/// Audit fields carried by every persisted document
///
/// Flattened into the owning entity, so the fields sit at the top level of
/// the stored document (`deleted`, `createdBy`, `createdAt`, ...). Unset
/// fields are written as nulls.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Audit {
    /// Soft-delete flag (false: live, true: deleted)
    #[serde(default)]
    pub deleted: Option<bool>,

    #[serde(default)]
    pub created_by: Option<String>,

    #[serde(default)]
    pub created_by_name: Option<String>,

    /// Creation time, epoch seconds
    #[serde(default)]
    pub created_at: Option<i64>,

    #[serde(default)]
    pub updated_by: Option<String>,

    #[serde(default)]
    pub updated_by_name: Option<String>,

    /// Last update time, epoch seconds
    #[serde(default)]
    pub updated_at: Option<i64>,
}

impl Audit {
    /// Audit block for a freshly created record
    pub fn created(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        let mut audit = Self::default();
        audit.stamp_created(user_id, user_name);
        audit
    }

    /// Stamp creator and creation time; also marks the record live and
    /// mirrors the stamp into the update fields
    pub fn stamp_created(&mut self, user_id: impl Into<String>, user_name: impl Into<String>) {
        let now = chrono::Utc::now().timestamp();
        let user_id = user_id.into();
        let user_name = user_name.into();

        self.deleted = Some(false);
        self.created_by = Some(user_id.clone());
        self.created_by_name = Some(user_name.clone());
        self.created_at = Some(now);
        self.updated_by = Some(user_id);
        self.updated_by_name = Some(user_name);
        self.updated_at = Some(now);
    }

    /// Stamp updater and update time
    pub fn stamp_updated(&mut self, user_id: impl Into<String>, user_name: impl Into<String>) {
        self.updated_by = Some(user_id.into());
        self.updated_by_name = Some(user_name.into());
        self.updated_at = Some(chrono::Utc::now().timestamp());
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.unwrap_or(false)
    }
}
