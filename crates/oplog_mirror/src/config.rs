use std::{
    collections::BTreeSet,
    path::PathBuf,
    time::Duration,
};

use crate::document::Namespace;

/// The per-tailer options spec.md §6 recognizes. The concrete source and
/// secondary-store handles aren't config fields here: `Tailer` is generic
/// over `OplogSource` and `SecondaryStore` implementations instead, since
/// wiring a real driver connection is the enclosing process's job (spec.md
/// §1 Out of scope).
#[derive(Debug, Clone)]
pub struct TailerConfig {
    /// Identifies this source connection inside a (possibly shared)
    /// checkpoint file. Corresponds to spec.md §3's "string form of the
    /// primary connection."
    pub conn_id: String,

    /// When `false`, `Tailer::run` logs and returns immediately without
    /// doing any work (spec.md §6; standalone/unreplicated support is
    /// unspecified, spec.md §9 Open Question 2).
    pub is_sharded: bool,

    /// Path to the shared checkpoint file, or `None` to disable
    /// persistence (checkpoints still advance in memory but nothing
    /// survives a restart).
    pub oplog_file: Option<PathBuf>,

    /// Namespaces eligible for the cold-start bulk dump. The streaming
    /// path does not filter by this set (spec.md §9 Open Question 1).
    pub namespace_set: BTreeSet<Namespace>,

    /// Upper bound on entries drained from the oplog per STREAM cycle.
    pub batch_size: usize,

    /// Delay between a COMMIT/ERROR and the next PREPARE (spec.md §4.6:
    /// "sleep briefly (≈2s)").
    pub cycle_sleep: Duration,

    /// Backoff interval for unbounded transient-error retries against the
    /// source cluster (spec.md §4.3: "fixed small backoff (≈1s)").
    pub transport_retry_interval: Duration,
}

impl TailerConfig {
    pub fn new(conn_id: impl Into<String>) -> Self {
        Self {
            conn_id: conn_id.into(),
            is_sharded: true,
            oplog_file: None,
            namespace_set: BTreeSet::new(),
            batch_size: 1000,
            cycle_sleep: Duration::from_secs(2),
            transport_retry_interval: Duration::from_secs(1),
        }
    }

    pub fn with_namespace_set(mut self, namespaces: impl IntoIterator<Item = Namespace>) -> Self {
        self.namespace_set = namespaces.into_iter().collect();
        self
    }

    pub fn with_oplog_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.oplog_file = Some(path.into());
        self
    }
}
