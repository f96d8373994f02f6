//! The key-value backend seam.
//!
//! A backend implements single-call primitives over the five tables.
//! Timeouts, paging loops, and batch chunking live in [`crate::Store`], so a
//! backend only has to answer one request at a time.

use std::future::Future;
use std::pin::Pin;

use convoy_core::Segment;
use serde_json::Value;

use crate::error::StoreResult;
use crate::item::Item;
use crate::tables::Table;

/// Boxed future returned by backend calls.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// One page of a scan or query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Item>,
    /// Key to resume after, `None` once the sequence is exhausted.
    pub next: Option<String>,
}

/// Equality lookup on a secondary attribute, with optional projection.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexQuery {
    pub attribute: String,
    pub equals: Value,
    /// Attributes to return. The table key is always included.
    pub projection: Option<Vec<String>>,
}

impl IndexQuery {
    pub fn eq(attribute: impl Into<String>, equals: impl Into<Value>) -> Self {
        Self {
            attribute: attribute.into(),
            equals: equals.into(),
            projection: None,
        }
    }

    pub fn project<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(attributes.into_iter().map(Into::into).collect());
        self
    }

    pub fn matches(&self, item: &Item) -> bool {
        item.get(&self.attribute) == Some(&self.equals)
    }

    /// Apply the projection, keeping the key attribute of `table`.
    pub fn shape(&self, table: Table, item: Item) -> Item {
        match &self.projection {
            None => item,
            Some(names) => {
                let key = table.key_attribute();
                let mut names = names.clone();
                if !names.iter().any(|n| n == key) {
                    names.push(key.to_string());
                }
                item.project(&names)
            }
        }
    }
}

/// Single-request operations against a key-value engine.
///
/// `get` returns `None` for a missing key. `batch_get` silently omits
/// missing keys and makes no ordering promise. `put` with
/// `overwrite = false` fails with `Conflict` when the key exists.
pub trait KvBackend: Send + Sync {
    fn get<'a>(&'a self, table: Table, key: &'a str) -> StoreFuture<'a, Option<Item>>;

    fn put<'a>(&'a self, table: Table, item: Item, overwrite: bool) -> StoreFuture<'a, ()>;

    fn batch_get<'a>(&'a self, table: Table, keys: &'a [String]) -> StoreFuture<'a, Vec<Item>>;

    fn scan<'a>(
        &'a self,
        table: Table,
        segment: Segment,
        start_after: Option<&'a str>,
        limit: usize,
    ) -> StoreFuture<'a, Page>;

    fn query<'a>(
        &'a self,
        table: Table,
        query: &'a IndexQuery,
        start_after: Option<&'a str>,
        limit: usize,
    ) -> StoreFuture<'a, Page>;
}
