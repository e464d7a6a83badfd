use std::fmt;

use bson::{
    Bson,
    Document,
};

use crate::timestamp::LogTimestamp;

/// A fully-qualified `database.collection` identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Namespace(pub String);

impl Namespace {
    pub fn new(database: &str, collection: &str) -> Self {
        Self(format!("{database}.{collection}"))
    }

    /// Splits `database.collection` at the first dot, matching the source
    /// database's own namespace convention (collection names may themselves
    /// contain dots).
    pub fn split(&self) -> Option<(&str, &str)> {
        self.0.split_once('.')
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Namespace {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The mutation kinds the tailer acts on. `Other` covers everything the
/// source database's oplog can produce that isn't a document mutation
/// (`noop`, command invalidation entries, etc.) — these are observed and
/// ignored (spec.md §4.6: "Other op codes: ignore").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Insert,
    Update,
    Delete,
    Noop,
    Other,
}

impl Op {
    pub fn from_code(code: &str) -> Self {
        match code {
            "i" => Op::Insert,
            "u" => Op::Update,
            "d" => Op::Delete,
            "n" => Op::Noop,
            _ => Op::Other,
        }
    }
}

/// One record produced by the source database for a single mutation
/// (spec.md §3). Only the fields the tailer core needs are modeled;
/// everything else in the raw oplog entry is irrelevant to the core.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub ts: LogTimestamp,
    pub op: Op,
    pub ns: Namespace,
    /// For insert: the full document. For update: the update spec. For
    /// delete: a key-only stub carrying at least `_id`.
    pub o: Document,
    /// Present only on update; carries the document identifier.
    pub o2: Option<Document>,
}

impl LogEntry {
    /// The identifier to resolve against the routing front-end: `o2._id`
    /// when present (updates), otherwise `o._id` (spec.md §4.3).
    pub fn resolve_id(&self) -> Option<Bson> {
        self.o2
            .as_ref()
            .and_then(|o2| o2.get("_id"))
            .or_else(|| self.o.get("_id"))
            .cloned()
    }

    /// The `_id` to remove, for `delete` entries (spec.md §4.6: "construct a
    /// deletion request carrying `_id` from `o._id`").
    pub fn delete_id(&self) -> Option<Bson> {
        self.o.get("_id").cloned()
    }
}

/// The representation written into the secondary store (spec.md §3).
#[derive(Debug, Clone, PartialEq)]
pub struct MirroredDoc {
    pub id: Bson,
    pub ns: Namespace,
    pub ts: u64,
    /// All user fields from the resolved source document, alongside the
    /// bookkeeping fields above, in whatever shape the secondary store's
    /// native representation requires.
    pub fields: Document,
}

impl MirroredDoc {
    pub fn new(id: Bson, ns: Namespace, ts: LogTimestamp, fields: Document) -> Self {
        Self {
            id,
            ns,
            ts: ts.encode(),
            fields,
        }
    }
}

/// A minimal stub naming a document to delete from the secondary store.
#[derive(Debug, Clone)]
pub struct DocStub {
    pub id: Bson,
    pub ns: Namespace,
}
