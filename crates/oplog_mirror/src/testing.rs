//! In-memory fakes of [`OplogSource`] and [`SecondaryStore`], generalized
//! from `fivetran_source::tests::FakeSource`'s in-memory tables + changelog
//! pattern to oplog semantics: an append-only vector standing in for the
//! oplog, a flat map standing in for the routing front-end's current
//! document images, and a flat map standing in for the secondary store.
//!
//! Gated behind the `testing` feature so production binaries never link
//! these fakes in.

use std::sync::Mutex;

use async_trait::async_trait;
use bson::{
    Bson,
    Document,
};

use crate::{
    document::{
        DocStub,
        LogEntry,
        MirroredDoc,
        Namespace,
        Op,
    },
    secondary_store::SecondaryStore,
    source::OplogSource,
    timestamp::LogTimestamp,
};

#[derive(Default)]
struct SourceState {
    oplog: Vec<LogEntry>,
    // (namespace, id) -> current document image on the routing front-end.
    documents: Vec<(Namespace, Bson, Document)>,
}

/// An in-memory stand-in for the source cluster: an oplog vector plus a
/// flat "routing front-end" document table.
#[derive(Default)]
pub struct InMemorySource {
    state: Mutex<SourceState>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_entry_insert(&self, ns: Namespace, ts: LogTimestamp, o: Document) {
        self.push_entry(LogEntry {
            ts,
            op: Op::Insert,
            ns,
            o,
            o2: None,
        });
    }

    pub fn push_entry_update(&self, ns: Namespace, ts: LogTimestamp, set: Document, id: Bson) {
        self.push_entry(LogEntry {
            ts,
            op: Op::Update,
            ns,
            o: set,
            o2: Some(bson::doc! {"_id": id}),
        });
    }

    pub fn push_entry_delete(&self, ns: Namespace, ts: LogTimestamp, id: Bson) {
        self.push_entry(LogEntry {
            ts,
            op: Op::Delete,
            ns,
            o: bson::doc! {"_id": id},
            o2: None,
        });
    }

    pub fn push_entry_other(&self, ns: Namespace, ts: LogTimestamp) {
        self.push_entry(LogEntry {
            ts,
            op: Op::Other,
            ns,
            o: bson::doc! {},
            o2: None,
        });
    }

    fn push_entry(&self, entry: LogEntry) {
        let mut state = self.state.lock().unwrap();
        state.oplog.push(entry);
        state.oplog.sort_by_key(|e| e.ts);
    }

    /// Seeds (or overwrites) the current image of `id` in `ns`, as the
    /// routing front-end would report it.
    pub fn seed_document(&self, ns: &Namespace, id: Bson, doc: Document) {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state
            .documents
            .iter_mut()
            .find(|(n, i, _)| n == ns && *i == id)
        {
            existing.2 = doc;
        } else {
            state.documents.push((ns.clone(), id, doc));
        }
    }

    /// Removes `id` from the routing front-end, simulating a later deletion
    /// (used for the "resolver miss" scenario: spec.md §8 scenario D).
    pub fn delete_document(&self, ns: &Namespace, id: &Bson) {
        let mut state = self.state.lock().unwrap();
        state.documents.retain(|(n, i, _)| !(n == ns && i == id));
    }

    pub fn wipe_oplog(&self) {
        self.state.lock().unwrap().oplog.clear();
    }

    pub fn truncate_oplog_after(&self, keep_up_to: LogTimestamp) {
        self.state.lock().unwrap().oplog.retain(|e| e.ts <= keep_up_to);
    }
}

#[async_trait]
impl OplogSource for InMemorySource {
    async fn entry_at(&self, ts: LogTimestamp) -> anyhow::Result<Option<LogEntry>> {
        Ok(self.state.lock().unwrap().oplog.iter().find(|e| e.ts == ts).cloned())
    }

    async fn greatest_entry_before(&self, ts: LogTimestamp) -> anyhow::Result<Option<LogEntry>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .oplog
            .iter()
            .filter(|e| e.ts < ts)
            .max_by_key(|e| e.ts)
            .cloned())
    }

    async fn entries_after(
        &self,
        from: LogTimestamp,
        limit: usize,
    ) -> anyhow::Result<Vec<LogEntry>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .oplog
            .iter()
            .filter(|e| e.ts > from)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn tail_timestamp(&self) -> anyhow::Result<Option<LogTimestamp>> {
        Ok(self.state.lock().unwrap().oplog.last().map(|e| e.ts))
    }

    async fn resolve_one(&self, ns: &Namespace, id: &Bson) -> anyhow::Result<Option<Document>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .documents
            .iter()
            .find(|(n, i, _)| n == ns && i == id)
            .map(|(_, _, doc)| doc.clone()))
    }

    async fn resolve_many(
        &self,
        ns: &Namespace,
        ids: &[Bson],
    ) -> anyhow::Result<Vec<(Bson, Document)>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .documents
            .iter()
            .filter(|(n, i, _)| n == ns && ids.contains(i))
            .map(|(_, i, doc)| (i.clone(), doc.clone()))
            .collect())
    }

    async fn scan_collection(&self, ns: &Namespace) -> anyhow::Result<Vec<Document>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .documents
            .iter()
            .filter(|(n, _, _)| n == ns)
            .map(|(_, _, doc)| doc.clone())
            .collect())
    }
}

/// An in-memory stand-in for the secondary store's adapter contract.
#[derive(Default)]
pub struct InMemoryStore {
    docs: Mutex<Vec<MirroredDoc>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: looks up the currently-mirrored doc for `(ns, id)`.
    pub async fn get(&self, ns: &Namespace, id: &Bson) -> Option<MirroredDoc> {
        self.docs
            .lock()
            .unwrap()
            .iter()
            .find(|d| &d.ns == ns && &d.id == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.docs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SecondaryStore for InMemoryStore {
    async fn upsert(&self, doc: MirroredDoc) -> anyhow::Result<()> {
        let mut docs = self.docs.lock().unwrap();
        if let Some(existing) = docs.iter_mut().find(|d| d.ns == doc.ns && d.id == doc.id) {
            *existing = doc;
        } else {
            docs.push(doc);
        }
        Ok(())
    }

    async fn remove(&self, stub: DocStub) -> anyhow::Result<()> {
        self.docs
            .lock()
            .unwrap()
            .retain(|d| !(d.ns == stub.ns && d.id == stub.id));
        Ok(())
    }

    async fn commit(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn get_last_doc(&self) -> anyhow::Result<Option<MirroredDoc>> {
        Ok(self.docs.lock().unwrap().iter().max_by_key(|d| d.ts).cloned())
    }

    async fn search(
        &self,
        start_ts: LogTimestamp,
        end_ts: LogTimestamp,
    ) -> anyhow::Result<Vec<MirroredDoc>> {
        let (start, end) = (start_ts.encode(), end_ts.encode());
        Ok(self
            .docs
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.ts >= start && d.ts <= end)
            .cloned()
            .collect())
    }
}
