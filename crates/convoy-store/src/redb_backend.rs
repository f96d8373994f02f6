//! RedbBackend: embedded redb engine for the coordination tables.
//!
//! Each logical table is a redb table with `&str` keys and JSON-serialized
//! items as `&[u8]` values. Supports on-disk and in-memory databases (the
//! latter for tests and single-process demos).
//!
//! redb calls block, so every request runs on the blocking pool and the
//! returned future only awaits its join handle. Dropping that future (for
//! instance when [`crate::Store`] times the call out) abandons the wait; the
//! transaction itself finishes or aborts on its own thread.
//!
//! A database file can be open in one process at a time. A second open
//! fails with [`StoreError::Locked`].

use std::path::Path;
use std::sync::Arc;

use convoy_core::Segment;
use redb::{Database, DatabaseError, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::backend::{IndexQuery, KvBackend, Page, StoreFuture};
use crate::error::{StoreError, StoreResult};
use crate::item::Item;
use crate::tables::Table;

/// Map any `Display` error into `StoreError::Unavailable` for an operation.
macro_rules! unavailable {
    ($op:expr) => {
        |e| StoreError::Unavailable {
            op: $op,
            reason: e.to_string(),
        }
    };
}

/// Thread-safe redb-backed store engine.
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    /// Open (or create) a persistent database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(|e| match e {
            DatabaseError::DatabaseAlreadyOpen => StoreError::Locked(path.to_path_buf()),
            e => StoreError::Open(e.to_string()),
        })?;
        let backend = Self { db: Arc::new(db) };
        backend.ensure_tables()?;
        debug!(?path, "redb store opened");
        Ok(backend)
    }

    /// Create an ephemeral in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        let memory = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(memory)
            .map_err(|e| StoreError::Open(e.to_string()))?;
        let backend = Self { db: Arc::new(db) };
        backend.ensure_tables()?;
        debug!("in-memory redb store opened");
        Ok(backend)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(|e| StoreError::Open(e.to_string()))?;
        for table in Table::ALL {
            txn.open_table(table.definition())
                .map_err(|e| StoreError::Open(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Open(e.to_string()))?;
        Ok(())
    }

    fn get_item(&self, table: Table, key: &str) -> StoreResult<Option<Item>> {
        let txn = self.db.begin_read().map_err(unavailable!("get"))?;
        let t = txn.open_table(table.definition()).map_err(unavailable!("get"))?;
        match t.get(key).map_err(unavailable!("get"))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    fn put_item(&self, table: Table, item: &Item, overwrite: bool) -> StoreResult<()> {
        let key = item
            .key(table)
            .ok_or_else(|| StoreError::malformed(table, format!("missing key `{}`", table.key_attribute())))?;
        let value = serde_json::to_vec(item).map_err(|e| StoreError::Serialize(e.to_string()))?;
        let txn = self.db.begin_write().map_err(unavailable!("put"))?;
        {
            let mut t = txn.open_table(table.definition()).map_err(unavailable!("put"))?;
            if !overwrite {
                let exists = t.get(key).map_err(unavailable!("put"))?.is_some();
                if exists {
                    return Err(StoreError::Conflict {
                        table,
                        key: key.to_string(),
                    });
                }
            }
            t.insert(key, value.as_slice()).map_err(unavailable!("put"))?;
        }
        txn.commit().map_err(unavailable!("put"))?;
        Ok(())
    }

    fn batch_get_items(&self, table: Table, keys: &[String]) -> StoreResult<Vec<Item>> {
        let txn = self.db.begin_read().map_err(unavailable!("batch_get"))?;
        let t = txn.open_table(table.definition()).map_err(unavailable!("batch_get"))?;
        let mut items = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(guard) = t.get(key.as_str()).map_err(unavailable!("batch_get"))? {
                items.push(decode(guard.value())?);
            }
        }
        Ok(items)
    }

    /// Run `call` on the blocking pool against a handle to this database.
    fn blocking<T, F>(&self, op: &'static str, call: F) -> StoreFuture<'static, T>
    where
        T: Send + 'static,
        F: FnOnce(&RedbBackend) -> StoreResult<T> + Send + 'static,
    {
        let backend = self.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || call(&backend))
                .await
                .map_err(unavailable!(op))?
        })
    }

    /// Walk keys after `start_after` in order, keeping up to `limit`
    /// items accepted by `select`.
    fn collect_page(
        &self,
        op: &'static str,
        table: Table,
        start_after: Option<&str>,
        limit: usize,
        mut select: impl FnMut(&str, Item) -> Option<Item>,
    ) -> StoreResult<Page> {
        let limit = limit.max(1);
        let txn = self.db.begin_read().map_err(unavailable!(op))?;
        let t = txn.open_table(table.definition()).map_err(unavailable!(op))?;
        let mut page = Page::default();
        let mut last_key: Option<String> = None;
        for entry in t.iter().map_err(unavailable!(op))? {
            let (key, value) = entry.map_err(unavailable!(op))?;
            let key = key.value();
            if start_after.is_some_and(|after| key <= after) {
                continue;
            }
            let Some(item) = select(key, decode(value.value())?) else {
                continue;
            };
            if page.items.len() == limit {
                page.next = last_key;
                break;
            }
            page.items.push(item);
            last_key = Some(key.to_string());
        }
        Ok(page)
    }
}

impl KvBackend for RedbBackend {
    fn get<'a>(&'a self, table: Table, key: &'a str) -> StoreFuture<'a, Option<Item>> {
        let key = key.to_string();
        self.blocking("get", move |b| b.get_item(table, &key))
    }

    fn put<'a>(&'a self, table: Table, item: Item, overwrite: bool) -> StoreFuture<'a, ()> {
        self.blocking("put", move |b| b.put_item(table, &item, overwrite))
    }

    fn batch_get<'a>(&'a self, table: Table, keys: &'a [String]) -> StoreFuture<'a, Vec<Item>> {
        let keys = keys.to_vec();
        self.blocking("batch_get", move |b| b.batch_get_items(table, &keys))
    }

    fn scan<'a>(
        &'a self,
        table: Table,
        segment: Segment,
        start_after: Option<&'a str>,
        limit: usize,
    ) -> StoreFuture<'a, Page> {
        let start_after = start_after.map(str::to_string);
        self.blocking("scan", move |b| {
            b.collect_page("scan", table, start_after.as_deref(), limit, |key, item| {
                segment.contains(key).then_some(item)
            })
        })
    }

    fn query<'a>(
        &'a self,
        table: Table,
        query: &'a IndexQuery,
        start_after: Option<&'a str>,
        limit: usize,
    ) -> StoreFuture<'a, Page> {
        let query = query.clone();
        let start_after = start_after.map(str::to_string);
        self.blocking("query", move |b| {
            b.collect_page("query", table, start_after.as_deref(), limit, |_, item| {
                query.matches(&item).then(|| query.shape(table, item))
            })
        })
    }
}

fn decode(bytes: &[u8]) -> StoreResult<Item> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Deserialize(e.to_string()))
}
