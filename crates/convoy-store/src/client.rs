//! Store: the client every Convoy component talks to.
//!
//! Wraps a [`KvBackend`] with a per-call timeout, drains paged scans and
//! queries, and chunks batch reads. Every call that outlives the timeout
//! fails with `StoreError::Unavailable`.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use convoy_core::Segment;
use convoy_core::config::StoreConfig;
use tracing::{debug, warn};

use crate::backend::{IndexQuery, KvBackend, StoreFuture};
use crate::error::{StoreError, StoreResult};
use crate::item::Item;
use crate::records::Record;
use crate::tables::Table;

/// Maximum keys per backend batch read.
pub const BATCH_GET_LIMIT: usize = 100;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn KvBackend>,
    timeout: Duration,
    page_size: usize,
}

impl Store {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend,
            timeout: DEFAULT_TIMEOUT,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn from_config(backend: Arc<dyn KvBackend>, config: &StoreConfig) -> Self {
        Self::new(backend)
            .with_timeout(config.timeout())
            .with_page_size(config.page_size)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T>(&self, op: &'static str, call: StoreFuture<'_, T>) -> StoreResult<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Unavailable {
                op,
                reason: format!("timed out after {:?}", self.timeout),
            }),
        }
    }

    // ── Raw items ──────────────────────────────────────────────────

    /// Fetch one item; `None` when the key does not exist.
    pub async fn get(&self, table: Table, key: &str) -> StoreResult<Option<Item>> {
        self.bounded("get", self.backend.get(table, key)).await
    }

    pub async fn put(&self, table: Table, item: Item, overwrite: bool) -> StoreResult<()> {
        self.bounded("put", self.backend.put(table, item, overwrite)).await
    }

    /// Fetch many items. Missing keys are omitted; result order is unspecified.
    pub async fn batch_get(&self, table: Table, keys: &[String]) -> StoreResult<Vec<Item>> {
        let unique: Vec<String> = keys
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let mut items = Vec::with_capacity(unique.len());
        for chunk in unique.chunks(BATCH_GET_LIMIT) {
            items.extend(self.bounded("batch_get", self.backend.batch_get(table, chunk)).await?);
        }
        Ok(items)
    }

    /// Lazily page through one segment of a table.
    pub fn scan_pages(&self, table: Table, segment: Segment) -> Cursor<'_> {
        Cursor::new(self, table, Source::Scan(segment))
    }

    /// Lazily page through items matching an index query.
    pub fn query_pages(&self, table: Table, query: IndexQuery) -> Cursor<'_> {
        Cursor::new(self, table, Source::Query(query))
    }

    /// Every item in one segment of a table.
    pub async fn scan(&self, table: Table, segment: Segment) -> StoreResult<Vec<Item>> {
        self.scan_pages(table, segment).collect().await
    }

    /// Every item matching an index query.
    pub async fn query(&self, table: Table, query: IndexQuery) -> StoreResult<Vec<Item>> {
        self.query_pages(table, query).collect().await
    }

    // ── Typed records ──────────────────────────────────────────────

    /// Fetch and decode one record. A malformed row is an error.
    pub async fn get_record<R: Record>(&self, key: &str) -> StoreResult<Option<R>> {
        match self.get(R::TABLE, key).await? {
            Some(item) => Ok(Some(R::from_item(item)?)),
            None => Ok(None),
        }
    }

    pub async fn put_record<R: Record>(&self, record: &R, overwrite: bool) -> StoreResult<()> {
        self.put(R::TABLE, record.to_item()?, overwrite).await
    }

    /// Fetch and decode many records, skipping malformed rows.
    pub async fn batch_get_records<R: Record>(&self, keys: &[String]) -> StoreResult<Vec<R>> {
        let items = self.batch_get(R::TABLE, keys).await?;
        Ok(decode_lenient(items))
    }

    /// Decode every record in a segment, skipping malformed rows.
    pub async fn scan_records<R: Record>(&self, segment: Segment) -> StoreResult<Vec<R>> {
        let items = self.scan(R::TABLE, segment).await?;
        Ok(decode_lenient(items))
    }

    /// Decode every record matching a query, skipping malformed rows.
    pub async fn query_records<R: Record>(&self, query: IndexQuery) -> StoreResult<Vec<R>> {
        let items = self.query(R::TABLE, query).await?;
        Ok(decode_lenient(items))
    }
}

fn decode_lenient<R: Record>(items: Vec<Item>) -> Vec<R> {
    items
        .into_iter()
        .filter_map(|item| {
            let key = item.key(R::TABLE).unwrap_or("<no key>").to_string();
            match R::from_item(item) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(table = %R::TABLE, %key, error = %e, "skipping malformed item");
                    None
                }
            }
        })
        .collect()
}

enum Source {
    Scan(Segment),
    Query(IndexQuery),
}

/// A finite, lazily-fetched sequence of pages.
///
/// Each cursor starts from the beginning of the table; create a new one to
/// restart.
pub struct Cursor<'s> {
    store: &'s Store,
    table: Table,
    source: Source,
    after: Option<String>,
    done: bool,
    pages: usize,
}

impl<'s> Cursor<'s> {
    fn new(store: &'s Store, table: Table, source: Source) -> Self {
        Self {
            store,
            table,
            source,
            after: None,
            done: false,
            pages: 0,
        }
    }

    /// Fetch the next page, `None` once exhausted.
    pub async fn next_page(&mut self) -> StoreResult<Option<Vec<Item>>> {
        if self.done {
            return Ok(None);
        }
        let store = self.store;
        let after = self.after.as_deref();
        let page = match &self.source {
            Source::Scan(segment) => {
                store
                    .bounded(
                        "scan",
                        store.backend.scan(self.table, *segment, after, store.page_size),
                    )
                    .await?
            }
            Source::Query(query) => {
                store
                    .bounded(
                        "query",
                        store.backend.query(self.table, query, after, store.page_size),
                    )
                    .await?
            }
        };
        self.pages += 1;
        match page.next {
            Some(next) => self.after = Some(next),
            None => self.done = true,
        }
        Ok(Some(page.items))
    }

    /// Drain every remaining page.
    pub async fn collect(mut self) -> StoreResult<Vec<Item>> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await? {
            items.extend(page);
        }
        debug!(table = %self.table, pages = self.pages, items = items.len(), "sequence drained");
        Ok(items)
    }
}
