use std::time::Duration;

use crate::{
    reconciler,
    retry::{
        retry_until_ok,
        unbounded_policy,
    },
    secondary_store::SecondaryStore,
    source::OplogSource,
    timestamp::LogTimestamp,
};

/// Cursor lifecycle, spec.md §4.4: `None -> OpenedUnvalidated -> Open |
/// Lost`. `Lost` transitions via reconciliation or a cold start back to
/// `None`. The tailer loop only ever observes the terminal `Open` (resume
/// from a validated timestamp) or `None` (caller must cold-start) outcome;
/// this enum exists to name the intermediate states spec.md describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    None,
    OpenedUnvalidated,
    Open,
    Lost,
}

/// A safety net against runaway reconciliation recursion in pathological
/// test doubles; a real oplog can only roll back a finite number of times
/// before reconciliation legitimately runs out of options and returns
/// `None`.
const MAX_RECONCILIATION_ATTEMPTS: usize = 64;

/// Validates and, if necessary, repositions the tailing cursor's resume
/// point, implementing spec.md §4.4's algorithm. Returns the timestamp the
/// tailer should resume streaming *after* (`Some`), or `None` if the caller
/// must cold-start (the oplog has been wiped, or reconciliation could not
/// find a safe resume point).
pub async fn position_cursor(
    source: &dyn OplogSource,
    store: &dyn SecondaryStore,
    requested_ts: LogTimestamp,
    transport_retry_interval: Duration,
) -> anyhow::Result<Option<LogTimestamp>> {
    let mut ts = requested_ts;
    for _ in 0..MAX_RECONCILIATION_ATTEMPTS {
        let found = retry_until_ok(
            unbounded_policy(transport_retry_interval),
            || source.entry_at(ts),
            |_| true,
        )
        .await?;

        if let Some(entry) = found {
            if entry.ts == ts {
                tracing::debug!(%ts, "cursor resume point is still present in the oplog");
                return Ok(Some(ts));
            }
        }

        // The resume point is no longer the next entry in the oplog: run
        // the divergence probe (spec.md §4.4).
        let older = retry_until_ok(
            unbounded_policy(transport_retry_interval),
            || source.greatest_entry_before(ts),
            |_| true,
        )
        .await?;

        match older {
            Some(_) => {
                tracing::warn!(%ts, "resume point missing from an otherwise-intact oplog, reconciling");
                match reconciler::reconcile(source, store).await? {
                    Some(new_ts) => {
                        ts = new_ts;
                        continue;
                    },
                    None => {
                        tracing::error!("reconciliation could not find a safe resume point, cold starting");
                        return Ok(None);
                    },
                }
            },
            None => {
                tracing::error!(%ts, "oplog has been wiped, cold starting");
                return Ok(None);
            },
        }
    }

    anyhow::bail!(
        "exceeded {MAX_RECONCILIATION_ATTEMPTS} reconciliation attempts without converging on a \
         resume point"
    );
}
