use async_trait::async_trait;

use crate::{
    document::{
        DocStub,
        MirroredDoc,
    },
    timestamp::LogTimestamp,
};

/// The contract required of the secondary store adapter (spec.md §6). A
/// concrete implementation (a search/index backend client) is out of scope
/// for the tailer core; this trait is what `Tailer` is generic over.
///
/// Implementations must be safe for concurrent callers: spec.md §5 notes the
/// secondary store is the only resource shared across tailers.
#[async_trait]
pub trait SecondaryStore: Send + Sync {
    /// Insert-or-replace by `_id`.
    async fn upsert(&self, doc: MirroredDoc) -> anyhow::Result<()>;

    /// Delete by `_id`.
    async fn remove(&self, stub: DocStub) -> anyhow::Result<()>;

    /// Force durability of prior operations. Required before `get_last_doc`
    /// and `search` observe a consistent view.
    async fn commit(&self) -> anyhow::Result<()>;

    /// The `MirroredDoc` with the greatest `_ts`, or `None` if the store is
    /// empty (spec.md §4.5 step 1).
    async fn get_last_doc(&self) -> anyhow::Result<Option<MirroredDoc>>;

    /// Every `MirroredDoc` with `_ts` in `[start_ts, end_ts]` inclusive of
    /// both bounds (spec.md §6: "the reconciler's logic depends only on the
    /// range being inclusive of both bounds").
    async fn search(
        &self,
        start_ts: LogTimestamp,
        end_ts: LogTimestamp,
    ) -> anyhow::Result<Vec<MirroredDoc>>;
}
