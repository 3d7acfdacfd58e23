//! MongoDB client
//!
//! Driver-backed [`DocumentStore`]. Authentication, pooling, TLS and
//! heartbeats are the driver's; this only maps calls.

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures_util::{StreamExt, TryStreamExt};
use mongodb::{
    options::{CountOptions, FindOptions},
    Client, Collection, Cursor,
};
use tracing::{debug, info};

use crate::config::MongoArgs;
use crate::db::store::{
    CursorOptions, DocumentCursor, DocumentStore, Query, UpdateOutcome, UpdateScope,
};
use crate::types::{HolderError, Result};

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Connect with the configured addresses, credentials and pool options
    pub async fn connect(args: &MongoArgs) -> Result<Self> {
        let options = args.client_options().await?;
        info!(
            "Connecting to MongoDB at {:?} (database '{}')",
            options.hosts, args.database
        );
        let client = Client::with_options(options)?;
        Self::verified(client, &args.database).await
    }

    async fn verified(client: Client, db_name: &str) -> Result<Self> {
        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.client.database(&self.db_name).collection(name)
    }

    /// Get the raw MongoDB client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the database name
    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

fn find_options(query: &Query) -> FindOptions {
    let mut options = FindOptions::default();
    options.sort = query.sort.clone();
    options.projection = query.projection.clone();
    options.skip = query.skip;
    options.limit = query.limit;
    options
}

fn count_options(query: &Query) -> CountOptions {
    let mut options = CountOptions::default();
    options.skip = query.skip;
    // Zero means no limit; a negative find limit counts by its magnitude
    options.limit = query.limit.filter(|n| *n != 0).map(i64::unsigned_abs);
    options
}

/// Scan cursors never time out server-side and always carry the sort
fn cursor_find_options(options: CursorOptions) -> FindOptions {
    let mut find = FindOptions::default();
    find.no_cursor_timeout = Some(options.no_timeout);
    find.batch_size = Some(options.batch_size);
    find.sort = Some(options.sort);
    find.skip = options.skip;
    find.limit = options.limit;
    find
}

/// Driver cursor; the driver kills the server cursor when it is dropped
struct DriverCursor {
    inner: Cursor<Document>,
}

#[async_trait]
impl DocumentCursor for DriverCursor {
    async fn next_document(&mut self) -> Option<Result<Document>> {
        self.inner
            .next()
            .await
            .map(|item| item.map_err(HolderError::from))
    }
}

#[async_trait]
impl DocumentStore for MongoClient {
    async fn insert_one(&self, collection: &str, doc: Document) -> Result<Bson> {
        let result = self.collection(collection).insert_one(doc).await?;
        Ok(result.inserted_id)
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<Vec<Bson>> {
        let expected = docs.len();
        let result = self.collection(collection).insert_many(docs).await?;

        (0..expected)
            .map(|index| {
                result.inserted_ids.get(&index).cloned().ok_or_else(|| {
                    HolderError::Backend(format!("No inserted id reported for document {}", index))
                })
            })
            .collect()
    }

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        let cursor = self
            .collection(collection)
            .find(query.filter.clone())
            .with_options(find_options(query))
            .await?;

        Ok(cursor.try_collect().await?)
    }

    async fn update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        scope: UpdateScope,
    ) -> Result<UpdateOutcome> {
        let coll = self.collection(collection);
        let result = match scope {
            UpdateScope::First => coll.update_one(filter, update).await?,
            UpdateScope::All => coll.update_many(filter, update).await?,
        };

        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> Result<u64> {
        let result = self.collection(collection).delete_many(filter).await?;
        Ok(result.deleted_count)
    }

    async fn count(&self, collection: &str, query: &Query) -> Result<u64> {
        Ok(self
            .collection(collection)
            .count_documents(query.filter.clone())
            .with_options(count_options(query))
            .await?)
    }

    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> Result<Vec<Document>> {
        let cursor = self.collection(collection).aggregate(pipeline).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn open_cursor(
        &self,
        collection: &str,
        filter: Document,
        options: CursorOptions,
    ) -> Result<Box<dyn DocumentCursor>> {
        debug!(
            "Opening cursor on '{}' (batch size {}, skip {:?}, limit {:?})",
            collection, options.batch_size, options.skip, options.limit
        );

        let cursor = self
            .collection(collection)
            .find(filter)
            .with_options(cursor_find_options(options))
            .await?;

        Ok(Box::new(DriverCursor { inner: cursor }))
    }

    async fn collection_names(&self) -> Result<Vec<String>> {
        Ok(self
            .client
            .database(&self.db_name)
            .list_collection_names()
            .await?)
    }
}
