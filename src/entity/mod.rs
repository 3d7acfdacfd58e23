//! Entity capability
//!
//! Every persisted type carries a store-assigned identity and the shared
//! [`Audit`] fields. Field-level mapping is the type's serde derive; the
//! [`impl_entity!`](crate::impl_entity) macro wires up the accessors.

mod audit;

pub use audit::Audit;

use bson::oid::ObjectId;
use serde::{de::DeserializeOwned, Serialize};

/// Name of the identity field in stored documents
pub const ID_FIELD: &str = "_id";

/// A record the holder can persist
///
/// The identity is assigned by the store on insert. Callers never set it
/// for create operations; a pre-set identity is discarded on write.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + Unpin {
    /// Collection the entity is stored in
    const COLLECTION: &'static str;

    fn id(&self) -> Option<ObjectId>;

    fn set_id(&mut self, id: ObjectId);

    fn audit(&self) -> &Audit;

    fn audit_mut(&mut self) -> &mut Audit;

    /// Hex form of the identity, if assigned
    fn id_hex(&self) -> Option<String> {
        self.id().map(|id| id.to_hex())
    }
}

/// Implement [`Entity`] for a struct with `id: Option<ObjectId>` and
/// `audit: Audit` fields.
///
/// ```ignore
/// #[derive(Serialize, Deserialize, Default)]
/// pub struct UserInfo {
///     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
///     pub id: Option<ObjectId>,
///     #[serde(flatten)]
///     pub audit: Audit,
///     pub user_name: Option<String>,
/// }
///
/// impl_entity!(UserInfo, "t_user_info");
/// ```
#[macro_export]
macro_rules! impl_entity {
    ($ty:ty, $collection:expr) => {
        impl $crate::entity::Entity for $ty {
            const COLLECTION: &'static str = $collection;

            fn id(&self) -> Option<$crate::bson::oid::ObjectId> {
                self.id
            }

            fn set_id(&mut self, id: $crate::bson::oid::ObjectId) {
                self.id = Some(id);
            }

            fn audit(&self) -> &$crate::entity::Audit {
                &self.audit
            }

            fn audit_mut(&mut self) -> &mut $crate::entity::Audit {
                &mut self.audit
            }
        }
    };
}

/// Entity used across the crate's unit tests
#[cfg(test)]
pub(crate) mod fixtures {
    use super::Audit;
    use bson::{oid::ObjectId, Decimal128};
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
    #[serde(rename_all = "camelCase")]
    pub struct UserInfo {
        #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
        pub id: Option<ObjectId>,

        #[serde(flatten)]
        pub audit: Audit,

        #[serde(default)]
        pub user_name: Option<String>,

        #[serde(default)]
        pub age: Option<i32>,

        #[serde(default, with = "crate::codec::decimal")]
        pub balance: Option<Decimal128>,
    }

    crate::impl_entity!(UserInfo, "t_user_info");

    impl UserInfo {
        pub fn named(name: &str, age: i32) -> Self {
            Self {
                user_name: Some(name.to_string()),
                age: Some(age),
                ..Default::default()
            }
        }
    }
}
