use async_trait::async_trait;
use bson::{
    Bson,
    Document,
};

use crate::{
    document::{
        LogEntry,
        Namespace,
    },
    timestamp::LogTimestamp,
};

/// The operations the tailer core needs from the source cluster (spec.md
/// §6). The source database client library and its native cursor
/// primitives are explicitly out of scope (spec.md §1); this trait is the
/// narrow surface a real driver-backed adapter would implement.
#[async_trait]
pub trait OplogSource: Send + Sync {
    /// Point query `ts = T` on the oplog.
    async fn entry_at(&self, ts: LogTimestamp) -> anyhow::Result<Option<LogEntry>>;

    /// Point query `ts < T` on the oplog, returning the greatest such entry
    /// (natural-descending order, limit 1).
    async fn greatest_entry_before(&self, ts: LogTimestamp) -> anyhow::Result<Option<LogEntry>>;

    /// Entries currently available with `ts > from`, natural-ascending
    /// order, up to `limit`. An empty result means "nothing more right
    /// now," not end-of-log — the real oplog is append-only and awaits new
    /// data; the tailer treats an empty batch as the end of this STREAM
    /// cycle (spec.md §4.6).
    async fn entries_after(
        &self,
        from: LogTimestamp,
        limit: usize,
    ) -> anyhow::Result<Vec<LogEntry>>;

    /// The timestamp of the latest entry in the oplog, or `None` if the
    /// oplog is empty.
    async fn tail_timestamp(&self) -> anyhow::Result<Option<LogTimestamp>>;

    /// Resolves the current image of the document identified by `id` in
    /// namespace `ns` via the routing front-end, or `None` if the document
    /// does not exist there (spec.md §4.3).
    async fn resolve_one(&self, ns: &Namespace, id: &Bson) -> anyhow::Result<Option<Document>>;

    /// Resolves current images for a set of ids in a single namespace via one
    /// multi-key query (spec.md §4.5 step 4). Returns only the ids that
    /// still exist; ids absent from the result are the "absent" partition.
    async fn resolve_many(
        &self,
        ns: &Namespace,
        ids: &[Bson],
    ) -> anyhow::Result<Vec<(Bson, Document)>>;

    /// A full scan of `ns`, used for the cold-start bulk dump (spec.md §4.6
    /// INIT). Not optimized; a straightforward scan is sufficient (spec.md
    /// §1 Non-goals).
    async fn scan_collection(&self, ns: &Namespace) -> anyhow::Result<Vec<Document>>;
}
