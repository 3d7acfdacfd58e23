//! Store client seam
//!
//! The holder talks to storage only through [`DocumentStore`]. The driver
//! implementation lives in [`super::mongo`], an in-process one in
//! [`super::memory`].

use async_trait::async_trait;
use bson::{Bson, Document};

use crate::types::Result;

/// Filter, sort and paging descriptor
///
/// The holder passes it through untouched; only the sort is read for cursor
/// scans.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Document,
    pub sort: Option<Document>,
    pub projection: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
}

impl Query {
    pub fn new(filter: Document) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    /// Query matching every record
    pub fn all() -> Self {
        Self::default()
    }

    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sort document, empty when none was given
    pub fn sort_document(&self) -> Document {
        self.sort.clone().unwrap_or_default()
    }
}

/// Cursor settings for a scan
#[derive(Debug, Clone, PartialEq)]
pub struct CursorOptions {
    /// Records fetched per round-trip
    pub batch_size: u32,
    /// Keep the server cursor alive until closed
    pub no_timeout: bool,
    /// Always applied, possibly empty
    pub sort: Document,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
}

/// Result of an update call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
}

/// Whether an update touches the first match or every match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateScope {
    First,
    All,
}

/// An open server-side cursor
///
/// Dropping the cursor releases it.
#[async_trait]
pub trait DocumentCursor: Send {
    /// Next raw record, `None` once exhausted
    async fn next_document(&mut self) -> Option<Result<Document>>;
}

/// Document store client
///
/// Implementations must be safe to share between concurrent callers.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert one document, returning its assigned `_id`
    async fn insert_one(&self, collection: &str, doc: Document) -> Result<Bson>;

    /// Insert documents in order, returning their `_id`s in the same order
    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<Vec<Bson>>;

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>>;

    async fn update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        scope: UpdateScope,
    ) -> Result<UpdateOutcome>;

    /// Delete every match, returning the removed count
    async fn delete_many(&self, collection: &str, filter: Document) -> Result<u64>;

    /// Matches after the query's skip and limit; sort and projection are ignored
    async fn count(&self, collection: &str, query: &Query) -> Result<u64>;

    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> Result<Vec<Document>>;

    async fn open_cursor(
        &self,
        collection: &str,
        filter: Document,
        options: CursorOptions,
    ) -> Result<Box<dyn DocumentCursor>>;

    async fn collection_names(&self) -> Result<Vec<String>>;
}
