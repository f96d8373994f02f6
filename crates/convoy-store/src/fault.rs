//! Fault injection for failure-semantics tests.
//!
//! `FaultyBackend` forwards to a real backend but can fail or stall chosen
//! operations, and can start failing an operation after a number of
//! successful calls.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use convoy_core::Segment;

use crate::backend::{IndexQuery, KvBackend, Page, StoreFuture};
use crate::error::StoreError;
use crate::item::Item;
use crate::tables::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Get,
    Put,
    BatchGet,
    Scan,
    Query,
}

impl Op {
    fn name(self) -> &'static str {
        match self {
            Op::Get => "get",
            Op::Put => "put",
            Op::BatchGet => "batch_get",
            Op::Scan => "scan",
            Op::Query => "query",
        }
    }
}

#[derive(Debug, Default)]
struct Faults {
    failing: HashSet<(Op, Option<Table>)>,
    stalled: HashSet<Op>,
    /// Total successful calls allowed per op before it starts failing.
    budgets: HashMap<Op, usize>,
    /// Calls that reached the inner backend.
    calls: HashMap<Op, usize>,
}

enum Verdict {
    Pass,
    Fail,
    Stall,
}

pub struct FaultyBackend {
    inner: Arc<dyn KvBackend>,
    faults: Mutex<Faults>,
}

impl FaultyBackend {
    pub fn new(inner: Arc<dyn KvBackend>) -> Self {
        Self {
            inner,
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Fail every call of `op` on any table.
    pub fn fail(&self, op: Op) {
        self.lock().failing.insert((op, None));
    }

    /// Fail calls of `op` on one table only.
    pub fn fail_on(&self, op: Op, table: Table) {
        self.lock().failing.insert((op, Some(table)));
    }

    /// Make calls of `op` never complete.
    pub fn stall(&self, op: Op) {
        self.lock().stalled.insert(op);
    }

    /// Allow `n` more successful calls of `op`, then fail the rest.
    pub fn fail_after(&self, op: Op, n: usize) {
        let mut faults = self.lock();
        let budget = faults.calls.get(&op).copied().unwrap_or(0) + n;
        faults.budgets.insert(op, budget);
    }

    /// Clear every injected fault.
    pub fn heal(&self) {
        let mut faults = self.lock();
        faults.failing.clear();
        faults.stalled.clear();
        faults.budgets.clear();
    }

    /// Number of calls of `op` that reached the inner backend.
    pub fn call_count(&self, op: Op) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Number of puts that reached the inner backend.
    pub fn put_count(&self) -> usize {
        self.call_count(Op::Put)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn verdict(&self, op: Op, table: Table) -> Verdict {
        let mut faults = self.lock();
        if faults.stalled.contains(&op) {
            return Verdict::Stall;
        }
        if faults.failing.contains(&(op, None)) || faults.failing.contains(&(op, Some(table))) {
            return Verdict::Fail;
        }
        let calls = faults.calls.get(&op).copied().unwrap_or(0);
        if faults.budgets.get(&op).is_some_and(|&budget| calls >= budget) {
            return Verdict::Fail;
        }
        faults.calls.insert(op, calls + 1);
        Verdict::Pass
    }

    fn guarded<'a, T: Send + 'a>(&'a self, op: Op, table: Table, call: StoreFuture<'a, T>) -> StoreFuture<'a, T> {
        let verdict = self.verdict(op, table);
        Box::pin(async move {
            match verdict {
                Verdict::Pass => call.await,
                Verdict::Fail => Err(StoreError::Unavailable {
                    op: op.name(),
                    reason: "injected fault".to_string(),
                }),
                Verdict::Stall => std::future::pending().await,
            }
        })
    }
}

impl KvBackend for FaultyBackend {
    fn get<'a>(&'a self, table: Table, key: &'a str) -> StoreFuture<'a, Option<Item>> {
        self.guarded(Op::Get, table, self.inner.get(table, key))
    }

    fn put<'a>(&'a self, table: Table, item: Item, overwrite: bool) -> StoreFuture<'a, ()> {
        self.guarded(Op::Put, table, self.inner.put(table, item, overwrite))
    }

    fn batch_get<'a>(&'a self, table: Table, keys: &'a [String]) -> StoreFuture<'a, Vec<Item>> {
        self.guarded(Op::BatchGet, table, self.inner.batch_get(table, keys))
    }

    fn scan<'a>(
        &'a self,
        table: Table,
        segment: Segment,
        start_after: Option<&'a str>,
        limit: usize,
    ) -> StoreFuture<'a, Page> {
        self.guarded(Op::Scan, table, self.inner.scan(table, segment, start_after, limit))
    }

    fn query<'a>(
        &'a self,
        table: Table,
        query: &'a IndexQuery,
        start_after: Option<&'a str>,
        limit: usize,
    ) -> StoreFuture<'a, Page> {
        self.guarded(Op::Query, table, self.inner.query(table, query, start_after, limit))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::client::Store;
    use crate::redb_backend::RedbBackend;

    fn faulty() -> Arc<FaultyBackend> {
        Arc::new(FaultyBackend::new(Arc::new(RedbBackend::open_in_memory().unwrap())))
    }

    #[tokio::test]
    async fn injected_failure_is_unavailable() {
        let backend = faulty();
        backend.fail(Op::Get);
        let store = Store::new(backend.clone());
        let err = store.get(Table::Status, "i-1").await.unwrap_err();
        assert!(err.is_transient());

        backend.heal();
        assert!(store.get(Table::Status, "i-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stalled_call_times_out_as_unavailable() {
        let backend = faulty();
        backend.stall(Op::Scan);
        let store = Store::new(backend).with_timeout(Duration::from_millis(20));
        let err = store.scan(Table::Services, Segment::whole()).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { op: "scan", .. }));
    }

    #[tokio::test]
    async fn puts_fail_after_budget() {
        let backend = faulty();
        backend.fail_after(Op::Put, 1);
        let store = Store::new(backend.clone());
        let item = |id: &str| Item::new().with("instance_id", id);
        store.put(Table::Assignments, item("i-1"), true).await.unwrap();
        assert!(store.put(Table::Assignments, item("i-2"), true).await.is_err());
        assert_eq!(backend.put_count(), 1);
    }

    #[tokio::test]
    async fn budgets_are_per_op() {
        let backend = faulty();
        backend.fail_after(Op::Get, 2);
        let store = Store::new(backend.clone());
        store.get(Table::Status, "a").await.unwrap();
        store.get(Table::Status, "b").await.unwrap();
        assert!(store.get(Table::Status, "c").await.is_err());
        store.put(Table::Status, Item::new().with("instance_id", "i-1"), true).await.unwrap();
        assert_eq!(backend.call_count(Op::Get), 2);
        assert_eq!(backend.put_count(), 1);

        backend.heal();
        assert!(store.get(Table::Status, "c").await.is_ok());
    }

    #[tokio::test]
    async fn table_scoped_failure() {
        let backend = faulty();
        backend.fail_on(Op::Get, Table::Revisions);
        let store = Store::new(backend);
        assert!(store.get(Table::Units, "u").await.is_ok());
        assert!(store.get(Table::Revisions, "r").await.is_err());
    }
}
