use std::{
    collections::BTreeMap,
    time::Duration,
};

use anyhow::Context;

use crate::{
    document::{
        DocStub,
        MirroredDoc,
        Namespace,
    },
    error::TailerError,
    retry::{
        retry_until_ok,
        unbounded_policy,
    },
    secondary_store::SecondaryStore,
    source::OplogSource,
    timestamp::LogTimestamp,
};

/// Default interval for the unbounded transport retries this module issues
/// against the source cluster (spec.md §4.3: "fixed small backoff (≈1s)").
/// `reconcile` doesn't have a `TailerConfig` to read a tuned value from
/// (it's also reachable from tests with no config in scope), so it uses
/// this constant directly.
const TRANSPORT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Repairs divergence between the oplog and the secondary store after an
/// upstream rollback, per spec.md §4.5's five-step algorithm. Returns the
/// new safe resume timestamp (`rollback_cutoff`), or `None` if
/// reconciliation is impossible (no surviving oplog entry predates
/// everything the secondary store has mirrored).
///
/// `commit()` failures are deliberately not retried: spec.md §7 classifies
/// "secondary-store commit failure" as an abort-the-cycle error, distinct
/// from the unbounded-retry "transient transport" row that covers plain
/// reads against the source and secondary store.
pub async fn reconcile(
    source: &dyn OplogSource,
    store: &dyn SecondaryStore,
) -> anyhow::Result<Option<LogTimestamp>> {
    store
        .commit()
        .await
        .map_err(TailerError::CommitFailed)
        .context("failed to flush secondary store before reconciling")?;

    let Some(last_mirrored) = store.get_last_doc().await? else {
        tracing::info!("secondary store is empty, nothing to reconcile");
        return Ok(None);
    };
    let backend_ts = LogTimestamp::decode(last_mirrored.ts);

    let boundary = retry_until_ok(
        unbounded_policy(TRANSPORT_RETRY_INTERVAL),
        || source.greatest_entry_before(backend_ts),
        |_| true,
    )
    .await?;
    let Some(boundary_entry) = boundary else {
        tracing::warn!(%backend_ts, "no surviving oplog entry predates the secondary store's peak _ts; reconciliation is impossible");
        return Ok(None);
    };
    let rollback_cutoff = boundary_entry.ts;

    let candidates = store.search(rollback_cutoff, backend_ts).await?;
    let mut by_ns: BTreeMap<Namespace, Vec<MirroredDoc>> = BTreeMap::new();
    for doc in candidates {
        // `search` is inclusive of both bounds; the rollback window is the
        // open-lower interval `(rollback_cutoff, backend_ts]`, so exclude
        // anything stamped exactly at the cutoff.
        if doc.ts == rollback_cutoff.encode() {
            continue;
        }
        by_ns.entry(doc.ns.clone()).or_default().push(doc);
    }

    tracing::info!(
        %rollback_cutoff,
        %backend_ts,
        affected_namespaces = by_ns.len(),
        "reconciling rollback window"
    );

    for (ns, docs) in by_ns {
        let ids: Vec<_> = docs.iter().map(|doc| doc.id.clone()).collect();
        let present = retry_until_ok(
            unbounded_policy(TRANSPORT_RETRY_INTERVAL),
            || source.resolve_many(&ns, &ids),
            |_| true,
        )
        .await?;

        for doc in docs {
            match present.iter().find(|(id, _)| *id == doc.id) {
                Some((id, fresh)) => {
                    store
                        .upsert(MirroredDoc::new(
                            id.clone(),
                            ns.clone(),
                            rollback_cutoff,
                            fresh.clone(),
                        ))
                        .await
                        .context("failed to re-stamp a surviving document during reconciliation")?;
                },
                None => {
                    store
                        .remove(DocStub {
                            id: doc.id,
                            ns: ns.clone(),
                        })
                        .await
                        .context("failed to remove a rolled-back document during reconciliation")?;
                },
            }
        }
    }

    Ok(Some(rollback_cutoff))
}
