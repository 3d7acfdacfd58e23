//! In-memory document store
//!
//! Implements [`DocumentStore`] over process memory so the holder can be
//! exercised without a server. Cursor bookkeeping is exposed for tests:
//! every cursor handed out is counted on open and again on drop.

mod filter;

use async_trait::async_trait;
use bson::{oid::ObjectId, Bson, Document};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::db::store::{
    CursorOptions, DocumentCursor, DocumentStore, Query, UpdateOutcome, UpdateScope,
};
use crate::entity::ID_FIELD;
use crate::types::{HolderError, Result};

#[derive(Debug, Default)]
struct CursorStats {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// Snapshot cursor over matched records
struct MemoryCursor {
    pending: VecDeque<Document>,
    stats: Arc<CursorStats>,
}

impl Drop for MemoryCursor {
    fn drop(&mut self) {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentCursor for MemoryCursor {
    async fn next_document(&mut self) -> Option<Result<Document>> {
        self.pending.pop_front().map(Ok)
    }
}

/// Document store held in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Collection name -> documents in insertion order
    collections: DashMap<String, Vec<Document>>,
    /// Collection name -> options of the most recent cursor
    last_cursor: DashMap<String, CursorOptions>,
    cursors: Arc<CursorStats>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursors handed out so far
    pub fn cursors_opened(&self) -> usize {
        self.cursors.opened.load(Ordering::SeqCst)
    }

    /// Cursors released so far
    pub fn cursors_closed(&self) -> usize {
        self.cursors.closed.load(Ordering::SeqCst)
    }

    /// Cursors currently held by callers
    pub fn cursors_open(&self) -> usize {
        self.cursors_opened().saturating_sub(self.cursors_closed())
    }

    /// Options the last cursor on `collection` was opened with
    pub fn last_cursor_options(&self, collection: &str) -> Option<CursorOptions> {
        self.last_cursor.get(collection).map(|entry| entry.clone())
    }

    /// Number of records held in `collection`
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn insert_into(docs: &mut Vec<Document>, mut doc: Document) -> Result<Bson> {
        let id = match doc.get(ID_FIELD) {
            Some(existing) => existing.clone(),
            None => {
                let id = Bson::ObjectId(ObjectId::new());
                doc.insert(ID_FIELD, id.clone());
                id
            }
        };

        if docs.iter().any(|stored| stored.get(ID_FIELD) == Some(&id)) {
            return Err(HolderError::Backend(format!(
                "Duplicate key error: _id {}",
                id
            )));
        }

        docs.push(doc);
        Ok(id)
    }

    /// Matching documents, sorted, then skipped and limited
    fn select(
        &self,
        collection: &str,
        filter: &Document,
        sort: Option<&Document>,
        skip: Option<u64>,
        limit: Option<i64>,
    ) -> Result<Vec<Document>> {
        let mut selected = Vec::new();
        if let Some(docs) = self.collections.get(collection) {
            for doc in docs.iter() {
                if filter::matches(doc, filter)? {
                    selected.push(doc.clone());
                }
            }
        }

        if let Some(sort) = sort {
            filter::sort_documents(&mut selected, sort);
        }

        let skip = skip.unwrap_or(0) as usize;
        // A negative limit means "single batch" to the server; treat it as its magnitude
        let limit = match limit {
            Some(0) | None => usize::MAX,
            Some(n) => n.unsigned_abs() as usize,
        };

        Ok(selected.into_iter().skip(skip).take(limit).collect())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_one(&self, collection: &str, doc: Document) -> Result<Bson> {
        let mut docs = self.collections.entry(collection.to_string()).or_default();
        Self::insert_into(&mut docs, doc)
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<Vec<Bson>> {
        let mut stored = self.collections.entry(collection.to_string()).or_default();
        // Ordered insert: stop at the first failure, keep what went in before it
        docs.into_iter()
            .map(|doc| Self::insert_into(&mut stored, doc))
            .collect()
    }

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        let found = self.select(
            collection,
            &query.filter,
            query.sort.as_ref(),
            query.skip,
            query.limit,
        )?;

        Ok(match &query.projection {
            Some(projection) => found
                .into_iter()
                .map(|doc| filter::project(doc, projection))
                .collect(),
            None => found,
        })
    }

    async fn update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        scope: UpdateScope,
    ) -> Result<UpdateOutcome> {
        let mut outcome = UpdateOutcome::default();
        let Some(mut docs) = self.collections.get_mut(collection) else {
            return Ok(outcome);
        };

        for doc in docs.iter_mut() {
            if !filter::matches(doc, &filter)? {
                continue;
            }
            outcome.matched += 1;
            if filter::apply_update(doc, &update)? {
                outcome.modified += 1;
            }
            if scope == UpdateScope::First {
                break;
            }
        }

        Ok(outcome)
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> Result<u64> {
        let Some(mut docs) = self.collections.get_mut(collection) else {
            return Ok(0);
        };

        let doomed = docs
            .iter()
            .map(|doc| filter::matches(doc, &filter))
            .collect::<Result<Vec<bool>>>()?;

        let before = docs.len();
        let mut flags = doomed.into_iter();
        docs.retain(|_| !flags.next().unwrap_or(false));

        Ok((before - docs.len()) as u64)
    }

    async fn count(&self, collection: &str, query: &Query) -> Result<u64> {
        let counted = self.select(collection, &query.filter, None, query.skip, query.limit)?;
        Ok(counted.len() as u64)
    }

    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> Result<Vec<Document>> {
        let mut current = self.select(collection, &Document::new(), None, None, None)?;

        for stage in pipeline {
            let (name, spec) = stage
                .into_iter()
                .next()
                .ok_or_else(|| HolderError::Backend("Empty pipeline stage".into()))?;

            current = match (name.as_str(), spec) {
                ("$match", Bson::Document(filter)) => {
                    let mut kept = Vec::new();
                    for doc in current {
                        if filter::matches(&doc, &filter)? {
                            kept.push(doc);
                        }
                    }
                    kept
                }
                ("$sort", Bson::Document(sort)) => {
                    filter::sort_documents(&mut current, &sort);
                    current
                }
                ("$skip", n) => {
                    let n = n.as_i64().or_else(|| n.as_i32().map(i64::from)).unwrap_or(0);
                    current.into_iter().skip(n.max(0) as usize).collect()
                }
                ("$limit", n) => {
                    let n = n.as_i64().or_else(|| n.as_i32().map(i64::from)).unwrap_or(0);
                    current.into_iter().take(n.max(0) as usize).collect()
                }
                ("$count", Bson::String(field)) => {
                    if current.is_empty() {
                        Vec::new()
                    } else {
                        let mut counted = Document::new();
                        counted.insert(field, current.len() as i64);
                        vec![counted]
                    }
                }
                (other, _) => {
                    return Err(HolderError::Backend(format!(
                        "Unsupported by memory store: pipeline stage {}",
                        other
                    )))
                }
            };
        }

        Ok(current)
    }

    async fn open_cursor(
        &self,
        collection: &str,
        filter: Document,
        options: CursorOptions,
    ) -> Result<Box<dyn DocumentCursor>> {
        let pending = self.select(
            collection,
            &filter,
            Some(&options.sort),
            options.skip,
            options.limit,
        )?;

        debug!(
            "Memory cursor on '{}' holds {} records (batch size {})",
            collection,
            pending.len(),
            options.batch_size
        );

        self.last_cursor.insert(collection.to_string(), options);
        self.cursors.opened.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MemoryCursor {
            pending: pending.into(),
            stats: Arc::clone(&self.cursors),
        }))
    }

    async fn collection_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .collections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        Ok(names)
    }
}
