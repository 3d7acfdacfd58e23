//! Cursor scan
//!
//! Streams matching records through a visitor one at a time without
//! materializing the result set. The cursor is owned by the scan call and
//! released when it returns, whatever the outcome.

use tracing::{debug, warn};

use super::MongoHolder;
use crate::db::store::{CursorOptions, Query};
use crate::entity::Entity;
use crate::types::{HolderError, Result};

/// Records fetched per round-trip when no positive batch size is given
pub const DEFAULT_BATCH_SIZE: u32 = 1000;

/// One page of a scan: records `(num - 1) * size` onwards, at most `size`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number
    pub num: u64,
    pub size: u64,
}

impl Page {
    pub fn new(num: u64, size: u64) -> Self {
        Self { num, size }
    }

    fn skip(&self) -> Result<u64> {
        if self.num < 1 || self.size < 1 {
            return Err(HolderError::invalid(format!(
                "page number and size must be at least 1 (got {} / {})",
                self.num, self.size
            )));
        }
        (self.num - 1)
            .checked_mul(self.size)
            .ok_or_else(|| HolderError::invalid("page offset overflows"))
    }

    fn limit(&self) -> Result<i64> {
        i64::try_from(self.size).map_err(|_| HolderError::invalid("page size too large"))
    }
}

/// Optional scan parameters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// Fetch chunk size; absent or non-positive means [`DEFAULT_BATCH_SIZE`]
    pub batch_size: Option<i64>,
    pub page: Option<Page>,
}

impl ScanOptions {
    pub fn batched(batch_size: i64) -> Self {
        Self {
            batch_size: Some(batch_size),
            page: None,
        }
    }

    pub fn paged(num: u64, size: u64) -> Self {
        Self {
            batch_size: None,
            page: Some(Page::new(num, size)),
        }
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Batch size actually sent to the store
    pub fn effective_batch_size(&self) -> u32 {
        match self.batch_size {
            Some(n) if n > 0 => u32::try_from(n).unwrap_or(u32::MAX),
            _ => DEFAULT_BATCH_SIZE,
        }
    }

    /// Cursor settings for `query`: no timeout, the query's sort, paging
    pub(crate) fn cursor_options(&self, query: &Query) -> Result<CursorOptions> {
        let (skip, limit) = match &self.page {
            Some(page) => (Some(page.skip()?), Some(page.limit()?)),
            None => (None, None),
        };

        Ok(CursorOptions {
            batch_size: self.effective_batch_size(),
            no_timeout: true,
            sort: query.sort_document(),
            skip,
            limit,
        })
    }
}

impl MongoHolder {
    /// Scan with default batch size and no paging
    pub async fn cursor_scan<T, V>(&self, query: Option<&Query>, visitor: Option<V>) -> Result<()>
    where
        T: Entity,
        V: FnMut(T) -> anyhow::Result<()>,
    {
        self.cursor_scan_with(query, ScanOptions::default(), visitor)
            .await
    }

    /// Scan with an explicit batch size and no paging
    pub async fn cursor_scan_batched<T, V>(
        &self,
        query: Option<&Query>,
        batch_size: Option<i64>,
        visitor: Option<V>,
    ) -> Result<()>
    where
        T: Entity,
        V: FnMut(T) -> anyhow::Result<()>,
    {
        let options = ScanOptions {
            batch_size,
            page: None,
        };
        self.cursor_scan_with(query, options, visitor).await
    }

    /// Visit every record matching `query`, in sort order, one at a time
    ///
    /// Without a visitor or a query this returns immediately. Only the
    /// query's filter and sort are used; paging comes from `options`. The
    /// first visitor, decode or store error aborts the scan; a visitor error
    /// comes back as [`HolderError::Visitor`].
    pub async fn cursor_scan_with<T, V>(
        &self,
        query: Option<&Query>,
        options: ScanOptions,
        visitor: Option<V>,
    ) -> Result<()>
    where
        T: Entity,
        V: FnMut(T) -> anyhow::Result<()>,
    {
        let Some(mut visitor) = visitor else {
            return Ok(());
        };
        let Some(query) = query else {
            return Ok(());
        };

        let collection = T::COLLECTION;
        let cursor_options = options.cursor_options(query)?;
        debug!(
            "Cursor scan on '{}' (batch size {}, page {:?})",
            collection, cursor_options.batch_size, options.page
        );

        let mut cursor = self
            .store()
            .open_cursor(collection, query.filter.clone(), cursor_options)
            .await?;

        let mut visited: u64 = 0;
        while let Some(raw) = cursor.next_document().await {
            let item: T = self.codec().read(raw?)?;
            if let Err(e) = visitor(item) {
                warn!(
                    "Cursor scan on '{}' stopped by visitor after {} records: {}",
                    collection, visited, e
                );
                return Err(HolderError::Visitor(e));
            }
            visited += 1;
        }

        debug!("Cursor scan on '{}' visited {} records", collection, visited);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DocumentStore, MemoryStore};
    use crate::entity::fixtures::UserInfo;
    use bson::doc;
    use std::sync::Arc;

    type Visit = fn(UserInfo) -> anyhow::Result<()>;

    async fn seeded(count: i32) -> (Arc<MemoryStore>, MongoHolder) {
        let store = Arc::new(MemoryStore::new());
        let holder = MongoHolder::new(store.clone());
        // inserted out of order so the sort is what orders the scan
        let mut users: Vec<UserInfo> = (1..=count)
            .map(|n| UserInfo::named(&format!("user-{}", n), n))
            .collect();
        users.reverse();
        holder.insert_all(users).await.unwrap();
        (store, holder)
    }

    fn by_age() -> Query {
        Query::all().sort(doc! { "age": 1 })
    }

    #[tokio::test]
    async fn test_scan_visits_all_in_sort_order() {
        let (store, holder) = seeded(12).await;
        let mut ages = Vec::new();

        holder
            .cursor_scan(
                Some(&by_age()),
                Some(|u: UserInfo| {
                    ages.push(u.age.unwrap());
                    Ok(())
                }),
            )
            .await
            .unwrap();

        assert_eq!(ages, (1..=12).collect::<Vec<_>>());
        assert_eq!(store.cursors_open(), 0);
    }

    #[tokio::test]
    async fn test_second_page_of_ten() {
        let (_store, holder) = seeded(25).await;
        let mut ages = Vec::new();

        holder
            .cursor_scan_with(
                Some(&by_age()),
                ScanOptions::paged(2, 10),
                Some(|u: UserInfo| {
                    ages.push(u.age.unwrap());
                    Ok(())
                }),
            )
            .await
            .unwrap();

        assert_eq!(ages, (11..=20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_non_positive_batch_size_uses_default() {
        let (store, holder) = seeded(5).await;

        for batch_size in [None, Some(0), Some(-3), Some(DEFAULT_BATCH_SIZE as i64)] {
            let mut seen = Vec::new();
            holder
                .cursor_scan_batched(
                    Some(&by_age()),
                    batch_size,
                    Some(|u: UserInfo| {
                        seen.push(u.age.unwrap());
                        Ok(())
                    }),
                )
                .await
                .unwrap();

            assert_eq!(seen, vec![1, 2, 3, 4, 5]);
            let options = store.last_cursor_options(UserInfo::COLLECTION).unwrap();
            assert_eq!(options.batch_size, DEFAULT_BATCH_SIZE);
        }
    }

    #[tokio::test]
    async fn test_cursor_options_sent_to_store() {
        let (store, holder) = seeded(3).await;
        holder
            .cursor_scan_with(
                Some(&by_age()),
                ScanOptions::paged(1, 2).with_batch_size(50),
                Some(|_: UserInfo| Ok(())),
            )
            .await
            .unwrap();

        let options = store.last_cursor_options(UserInfo::COLLECTION).unwrap();
        assert_eq!(
            options,
            CursorOptions {
                batch_size: 50,
                no_timeout: true,
                sort: doc! { "age": 1 },
                skip: Some(0),
                limit: Some(2),
            }
        );
    }

    #[tokio::test]
    async fn test_visitor_failure_releases_cursor() {
        let (store, holder) = seeded(10).await;
        let mut calls = 0;

        let result = holder
            .cursor_scan(
                Some(&by_age()),
                Some(|_: UserInfo| {
                    calls += 1;
                    if calls == 3 {
                        anyhow::bail!("third record rejected");
                    }
                    Ok(())
                }),
            )
            .await;

        assert!(matches!(result, Err(HolderError::Visitor(_))));
        assert_eq!(calls, 3);
        assert_eq!(store.cursors_opened(), 1);
        assert_eq!(store.cursors_closed(), 1);
    }

    #[tokio::test]
    async fn test_decode_failure_releases_cursor() {
        let (store, holder) = seeded(2).await;
        store
            .insert_one(UserInfo::COLLECTION, doc! { "age": "not a number" })
            .await
            .unwrap();

        let mut visited = 0;
        let result = holder
            .cursor_scan(
                Some(&Query::all()),
                Some(|_: UserInfo| {
                    visited += 1;
                    Ok(())
                }),
            )
            .await;

        assert!(matches!(result, Err(HolderError::Decode(_))));
        assert_eq!(visited, 2);
        assert_eq!(store.cursors_open(), 0);
    }

    #[tokio::test]
    async fn test_missing_visitor_or_query_is_noop() {
        let (store, holder) = seeded(3).await;

        holder
            .cursor_scan::<UserInfo, Visit>(Some(&by_age()), None)
            .await
            .unwrap();
        holder
            .cursor_scan(None, Some(|_: UserInfo| anyhow::bail!("never called")))
            .await
            .unwrap();

        assert_eq!(store.cursors_opened(), 0);
    }

    #[tokio::test]
    async fn test_invalid_page_rejected() {
        let (store, holder) = seeded(3).await;
        for options in [ScanOptions::paged(0, 10), ScanOptions::paged(1, 0)] {
            let result = holder
                .cursor_scan_with(Some(&by_age()), options, Some(|_: UserInfo| Ok(())))
                .await;
            assert!(matches!(result, Err(HolderError::InvalidArgument(_))));
        }
        assert_eq!(store.cursors_opened(), 0);
    }

    #[test]
    fn test_effective_batch_size() {
        assert_eq!(ScanOptions::default().effective_batch_size(), DEFAULT_BATCH_SIZE);
        assert_eq!(ScanOptions::batched(-1).effective_batch_size(), DEFAULT_BATCH_SIZE);
        assert_eq!(ScanOptions::batched(64).effective_batch_size(), 64);
        assert_eq!(ScanOptions::batched(i64::MAX).effective_batch_size(), u32::MAX);
    }
}
