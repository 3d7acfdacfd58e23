//! Entity access helper
//!
//! [`MongoHolder`] offers typed CRUD, aggregation, selective updates and
//! cursor scans over any [`Entity`]. Storage goes through an injected
//! [`DocumentStore`]; the holder keeps no state between calls and can be
//! cloned and shared freely.

mod scan;
mod update;

pub use scan::{Page, ScanOptions, DEFAULT_BATCH_SIZE};
pub use update::{FieldUpdate, Update, UpdateMode};

use bson::{doc, oid::ObjectId, Bson, Document};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::codec::DocumentCodec;
use crate::db::store::{DocumentStore, Query, UpdateOutcome, UpdateScope};
use crate::entity::Entity;
use crate::types::{HolderError, Result};

/// Parse a hex identity token
fn parse_id(id: &str) -> Result<ObjectId> {
    let id = id.trim();
    if id.is_empty() {
        return Err(HolderError::invalid("identity must not be blank"));
    }
    Ok(ObjectId::parse_str(id)?)
}

fn id_filter(id: ObjectId) -> Document {
    doc! { "_id": id }
}

fn inserted_object_id(id: Bson) -> Result<ObjectId> {
    id.as_object_id()
        .ok_or_else(|| HolderError::Backend(format!("Inserted id {} is not an ObjectId", id)))
}

/// Typed access to entity collections
#[derive(Clone)]
pub struct MongoHolder {
    store: Arc<dyn DocumentStore>,
    codec: Arc<DocumentCodec>,
}

impl std::fmt::Debug for MongoHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoHolder")
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

impl MongoHolder {
    /// Holder over `store` with the default codec
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_codec(store, DocumentCodec::new())
    }

    pub fn with_codec(store: Arc<dyn DocumentStore>, codec: DocumentCodec) -> Self {
        Self {
            store,
            codec: Arc::new(codec),
        }
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub fn codec(&self) -> &DocumentCodec {
        &self.codec
    }

    /// Collection an entity type is stored in
    pub fn collection_name<T: Entity>(&self) -> &'static str {
        T::COLLECTION
    }

    /// Store one entity and return it with its assigned identity
    ///
    /// Any identity already on the entity is replaced by the store's.
    pub async fn insert<T: Entity>(&self, mut entity: T) -> Result<T> {
        if entity.id().is_some() {
            warn!(
                "Insert into '{}' carries an identity; the store assigns a new one",
                T::COLLECTION
            );
        }

        let doc = self.codec.write(&entity)?;
        let id = self.store.insert_one(T::COLLECTION, doc).await?;
        entity.set_id(inserted_object_id(id)?);

        debug!("Inserted into '{}'", T::COLLECTION);
        Ok(entity)
    }

    /// Store a batch of entities in order
    ///
    /// A failure part-way leaves earlier records stored; nothing is rolled back.
    pub async fn insert_all<T: Entity>(&self, mut entities: Vec<T>) -> Result<Vec<T>> {
        if entities.is_empty() {
            return Ok(entities);
        }

        let docs = entities
            .iter()
            .map(|entity| self.codec.write(entity))
            .collect::<Result<Vec<_>>>()?;

        let ids = self.store.insert_many(T::COLLECTION, docs).await?;
        if ids.len() != entities.len() {
            return Err(HolderError::Backend(format!(
                "Store reported {} ids for {} inserted records",
                ids.len(),
                entities.len()
            )));
        }

        for (entity, id) in entities.iter_mut().zip(ids) {
            entity.set_id(inserted_object_id(id)?);
        }

        debug!("Inserted {} into '{}'", entities.len(), T::COLLECTION);
        Ok(entities)
    }

    /// All matches, in the query's sort order
    pub async fn find<T: Entity>(&self, query: &Query) -> Result<Vec<T>> {
        debug!("Find on '{}'", T::COLLECTION);
        self.store
            .find(T::COLLECTION, query)
            .await?
            .into_iter()
            .map(|doc| self.codec.read(doc))
            .collect()
    }

    /// First match, or `None`
    pub async fn find_one<T: Entity>(&self, query: &Query) -> Result<Option<T>> {
        let first = query.clone().limit(1);
        let mut found = self.find::<T>(&first).await?;
        Ok(if found.is_empty() {
            None
        } else {
            Some(found.swap_remove(0))
        })
    }

    /// Record with the given hex identity, or `None`
    pub async fn find_by_id<T: Entity>(&self, id: &str) -> Result<Option<T>> {
        let id = parse_id(id)?;
        self.find_one::<T>(&Query::new(id_filter(id))).await
    }

    /// Number of matches, honoring the query's skip and limit
    pub async fn count<T: Entity>(&self, query: &Query) -> Result<u64> {
        self.store.count(T::COLLECTION, query).await
    }

    /// Delete every match, returning how many were removed
    pub async fn remove<T: Entity>(&self, query: &Query) -> Result<u64> {
        let removed = self
            .store
            .delete_many(T::COLLECTION, query.filter.clone())
            .await?;
        debug!("Removed {} from '{}'", removed, T::COLLECTION);
        Ok(removed)
    }

    pub async fn remove_by_id<T: Entity>(&self, id: &str) -> Result<u64> {
        let id = parse_id(id)?;
        self.remove::<T>(&Query::new(id_filter(id))).await
    }

    /// Run a pipeline over `T`'s collection, decoding results as `O`
    pub async fn aggregate<T, O>(&self, pipeline: Vec<Document>) -> Result<Vec<O>>
    where
        T: Entity,
        O: DeserializeOwned,
    {
        debug!(
            "Aggregate on '{}' ({} stages)",
            T::COLLECTION,
            pipeline.len()
        );
        self.store
            .aggregate(T::COLLECTION, pipeline)
            .await?
            .into_iter()
            .map(|doc| self.codec.read(doc))
            .collect()
    }

    /// Apply a selective update of `entity` to the first match
    pub async fn update_first<T: Entity>(
        &self,
        query: &Query,
        entity: &T,
        mode: &UpdateMode,
    ) -> Result<UpdateOutcome> {
        self.apply_update(query.filter.clone(), entity, mode, UpdateScope::First)
            .await
    }

    /// Apply a selective update of `entity` to every match
    pub async fn update_multi<T: Entity>(
        &self,
        query: &Query,
        entity: &T,
        mode: &UpdateMode,
    ) -> Result<UpdateOutcome> {
        self.apply_update(query.filter.clone(), entity, mode, UpdateScope::All)
            .await
    }

    /// Apply a selective update of `entity` to the identified record
    pub async fn update_by_id<T: Entity>(
        &self,
        id: &str,
        entity: &T,
        mode: &UpdateMode,
    ) -> Result<UpdateOutcome> {
        let id = parse_id(id)?;
        self.apply_update(id_filter(id), entity, mode, UpdateScope::First)
            .await
    }

    /// Overwrite every field of the identified record with `entity`'s
    pub async fn update_all_by_id<T: Entity>(&self, id: &str, entity: &T) -> Result<UpdateOutcome> {
        self.update_by_id(id, entity, &UpdateMode::AllFields).await
    }

    async fn apply_update<T: Entity>(
        &self,
        filter: Document,
        entity: &T,
        mode: &UpdateMode,
        scope: UpdateScope,
    ) -> Result<UpdateOutcome> {
        let update = Update::from_entity(&self.codec, Some(entity), mode)?;
        if update.is_empty() {
            return Err(HolderError::invalid(format!(
                "update of '{}' touches no fields",
                T::COLLECTION
            )));
        }

        let outcome = self
            .store
            .update(T::COLLECTION, filter, update.to_document(), scope)
            .await?;

        debug!(
            "Updated '{}' ({:?}): matched {}, modified {}",
            T::COLLECTION,
            scope,
            outcome.matched,
            outcome.modified
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::entity::fixtures::UserInfo;
    use serde::Deserialize;

    fn holder() -> (Arc<MemoryStore>, MongoHolder) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), MongoHolder::new(store))
    }

    async fn insert_named(holder: &MongoHolder, names: &[(&str, i32)]) -> Vec<UserInfo> {
        let users = names
            .iter()
            .map(|(name, age)| UserInfo::named(name, *age))
            .collect();
        holder.insert_all(users).await.unwrap()
    }

    #[test]
    fn test_collection_name() {
        let (_, holder) = holder();
        assert_eq!(holder.collection_name::<UserInfo>(), "t_user_info");
    }

    #[tokio::test]
    async fn test_insert_assigns_identity() {
        let (store, holder) = holder();
        let user = holder.insert(UserInfo::named("alice", 30)).await.unwrap();

        assert!(user.id.is_some());
        assert_eq!(store.len(UserInfo::COLLECTION), 1);

        let found: UserInfo = holder
            .find_by_id(&user.id.unwrap().to_hex())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, user);
    }

    #[tokio::test]
    async fn test_insert_overwrites_preset_identity() {
        let (_, holder) = holder();
        let preset = ObjectId::new();
        let mut user = UserInfo::named("bob", 41);
        user.id = Some(preset);

        let stored = holder.insert(user).await.unwrap();
        assert_ne!(stored.id, Some(preset));

        let by_preset: Option<UserInfo> = holder.find_by_id(&preset.to_hex()).await.unwrap();
        assert!(by_preset.is_none());
    }

    #[tokio::test]
    async fn test_insert_all_populates_identities() {
        let (_, holder) = holder();
        let users = insert_named(&holder, &[("a", 1), ("b", 2), ("c", 3)]).await;

        assert!(users.iter().all(|u| u.id.is_some()));
        assert_eq!(users[1].user_name.as_deref(), Some("b"));
        assert!(holder.insert_all::<UserInfo>(Vec::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_and_count() {
        let (_, holder) = holder();
        insert_named(&holder, &[("a", 10), ("b", 20), ("c", 30)]).await;

        let query = Query::new(doc! { "age": { "$gte": 20 } }).sort(doc! { "age": -1 });
        let found: Vec<UserInfo> = holder.find(&query).await.unwrap();
        let names: Vec<&str> = found.iter().filter_map(|u| u.user_name.as_deref()).collect();
        assert_eq!(names, vec!["c", "b"]);

        assert_eq!(holder.count::<UserInfo>(&query).await.unwrap(), 2);
        let none: Vec<UserInfo> = holder.find(&Query::new(doc! { "age": 99 })).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_count_agrees_with_find_under_paging() {
        let (_, holder) = holder();
        insert_named(&holder, &[("a", 1), ("b", 2), ("c", 3)]).await;

        for query in [
            Query::all().skip(1).limit(1),
            Query::all().skip(2),
            Query::all().limit(2),
            Query::all().skip(5),
        ] {
            let found: Vec<UserInfo> = holder.find(&query).await.unwrap();
            let counted = holder.count::<UserInfo>(&query).await.unwrap();
            assert_eq!(counted, found.len() as u64, "{:?}", query);
        }
        assert_eq!(
            holder
                .count::<UserInfo>(&Query::all().skip(1).limit(1))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_find_one_empty_is_none() {
        let (_, holder) = holder();
        let found: Option<UserInfo> = holder
            .find_one(&Query::new(doc! { "userName": "nobody" }))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_find_one_respects_sort() {
        let (_, holder) = holder();
        insert_named(&holder, &[("young", 5), ("old", 90)]).await;

        let oldest: UserInfo = holder
            .find_one(&Query::all().sort(doc! { "age": -1 }))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(oldest.user_name.as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn test_malformed_identity_rejected() {
        let (_, holder) = holder();
        for bad in ["", "  ", "xyz", "0123456789abcdef0123456"] {
            let result = holder.find_by_id::<UserInfo>(bad).await;
            assert!(matches!(result, Err(HolderError::InvalidArgument(_))), "{:?}", bad);
        }
        let result = holder.remove_by_id::<UserInfo>("nope").await;
        assert!(matches!(result, Err(HolderError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_remove_and_remove_by_id() {
        let (_, holder) = holder();
        let users = insert_named(&holder, &[("a", 1), ("b", 2), ("c", 3)]).await;

        let removed = holder
            .remove_by_id::<UserInfo>(&users[0].id.unwrap().to_hex())
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let removed = holder
            .remove::<UserInfo>(&Query::new(doc! { "age": { "$gt": 1 } }))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(holder.count::<UserInfo>(&Query::all()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_aggregate_into_output_type() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct Total {
            total: i64,
        }

        let (_, holder) = holder();
        insert_named(&holder, &[("a", 10), ("b", 20), ("c", 30)]).await;

        let totals: Vec<Total> = holder
            .aggregate::<UserInfo, Total>(vec![
                doc! { "$match": { "age": { "$gt": 15 } } },
                doc! { "$count": "total" },
            ])
            .await
            .unwrap();
        assert_eq!(totals, vec![Total { total: 2 }]);
    }

    #[tokio::test]
    async fn test_update_by_id_fields_can_clear() {
        let (_, holder) = holder();
        let mut user = UserInfo::named("alice", 30);
        user.audit.created_by = Some("u-1".into());
        let user = holder.insert(user).await.unwrap();
        let id = user.id.unwrap().to_hex();

        let patch = UserInfo {
            age: Some(31),
            ..Default::default()
        };
        let outcome = holder
            .update_by_id(&id, &patch, &UpdateMode::fields(["age", "createdBy"]))
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome { matched: 1, modified: 1 });

        let stored: UserInfo = holder.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(stored.age, Some(31));
        assert_eq!(stored.audit.created_by, None);
        // untouched
        assert_eq!(stored.user_name.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_update_first_full_diff_keeps_other_fields() {
        let (_, holder) = holder();
        insert_named(&holder, &[("a", 1), ("a", 2)]).await;

        let mut patch = UserInfo::default();
        patch.audit.updated_by = Some("admin".into());

        let query = Query::new(doc! { "userName": "a" });
        let outcome = holder
            .update_first(&query, &patch, &UpdateMode::FullDiff)
            .await
            .unwrap();
        assert_eq!(outcome.matched, 1);

        let updated = holder
            .count::<UserInfo>(&Query::new(doc! { "updatedBy": "admin", "userName": "a" }))
            .await
            .unwrap();
        assert_eq!(updated, 1);
    }

    #[tokio::test]
    async fn test_update_multi_touches_every_match() {
        let (_, holder) = holder();
        insert_named(&holder, &[("a", 1), ("b", 2), ("c", 3)]).await;

        let patch = UserInfo {
            user_name: Some("renamed".into()),
            ..Default::default()
        };
        let outcome = holder
            .update_multi(
                &Query::new(doc! { "age": { "$lte": 2 } }),
                &patch,
                &UpdateMode::fields(["userName"]),
            )
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome { matched: 2, modified: 2 });
        assert_eq!(
            holder
                .count::<UserInfo>(&Query::new(doc! { "userName": "renamed" }))
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_update_all_by_id_overwrites_with_nulls() {
        let (_, holder) = holder();
        let mut user = UserInfo::named("alice", 30);
        user.audit = crate::entity::Audit::created("u-1", "Alice");
        let user = holder.insert(user).await.unwrap();
        let id = user.id.unwrap().to_hex();

        let replacement = UserInfo::named("alicia", 31);
        holder.update_all_by_id(&id, &replacement).await.unwrap();

        let stored: UserInfo = holder.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(stored.user_name.as_deref(), Some("alicia"));
        assert_eq!(stored.age, Some(31));
        assert_eq!(stored.audit.created_by, None);
        assert_eq!(stored.id, user.id);
    }

    #[tokio::test]
    async fn test_update_naming_identity_is_refused() {
        let (_, holder) = holder();
        let user = holder.insert(UserInfo::named("alice", 30)).await.unwrap();
        let id = user.id.unwrap().to_hex();

        let result = holder
            .update_by_id(&id, &UserInfo::named("x", 1), &UpdateMode::fields(["_id"]))
            .await;
        assert!(result.unwrap_err().is_store());

        let stored: UserInfo = holder.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(stored, user);
    }

    #[tokio::test]
    async fn test_update_all_by_id_blank_id_rejected() {
        let (_, holder) = holder();
        let result = holder
            .update_all_by_id("", &UserInfo::named("x", 1))
            .await;
        assert!(matches!(result, Err(HolderError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_empty_update_rejected_before_store() {
        let (_, holder) = holder();
        insert_named(&holder, &[("a", 1)]).await;

        let result = holder
            .update_multi(&Query::all(), &UserInfo::default(), &UpdateMode::FullDiff)
            .await;
        assert!(matches!(result, Err(HolderError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let (_, holder) = holder();
        insert_named(&holder, &[("a", 1)]).await;

        let result = holder
            .find::<UserInfo>(&Query::new(doc! { "age": { "$where": "1" } }))
            .await;
        assert!(result.unwrap_err().is_store());
    }
}
