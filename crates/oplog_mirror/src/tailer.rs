use std::sync::{
    atomic::{
        AtomicBool,
        Ordering,
    },
    Arc,
};

use anyhow::Context;

use crate::{
    checkpoint::{
        Checkpoint,
        CheckpointStore,
    },
    config::TailerConfig,
    cursor,
    document::{
        DocStub,
        MirroredDoc,
        Op,
    },
    retry::{
        retry_until_ok,
        unbounded_policy,
    },
    secondary_store::SecondaryStore,
    source::OplogSource,
    timestamp::LogTimestamp,
};

/// A cooperative handle that stops a running [`Tailer`] at the next loop
/// iteration boundary (spec.md §4.6 Termination, §5). Cloning and sharing
/// this handle is the sole cancellation mechanism; there is no per-call
/// timeout (spec.md §5: "the tailer must be robust to long primary
/// elections; bounded timeouts would amplify, not dampen, churn").
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The top-level state machine composing the Oplog Mirror's collaborators
/// (spec.md §4.6). One `Tailer` owns exactly one checkpoint, one source
/// handle, and one secondary-store handle, for the lifetime of the worker
/// (spec.md §3 Lifecycles).
pub struct Tailer<S, D> {
    source: S,
    store: D,
    config: TailerConfig,
    checkpoint_store: Option<CheckpointStore>,
    running: Arc<AtomicBool>,
}

impl<S, D> Tailer<S, D>
where
    S: OplogSource,
    D: SecondaryStore,
{
    pub fn new(source: S, store: D, config: TailerConfig) -> Self {
        let checkpoint_store = config.oplog_file.as_ref().map(CheckpointStore::new);
        Self {
            source,
            store,
            config,
            checkpoint_store,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A handle the enclosing process can use to request a stop.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.running.clone())
    }

    /// Test-only accessor to the secondary store for asserting on its
    /// contents; production code only ever sees the store through the
    /// `SecondaryStore` trait's upsert/remove/search surface.
    #[cfg(feature = "testing")]
    pub fn store_for_testing(&self) -> &D {
        &self.store
    }

    pub fn retry_policy(&self) -> backoff::ExponentialBackoff {
        unbounded_policy(self.config.transport_retry_interval)
    }

    /// Runs the tailer loop until `stop()` is called. Never returns an
    /// `Err` in steady state (spec.md §7: "Nothing is surfaced to a caller
    /// as a raised failure at steady state"); the only early return is the
    /// `is_sharded = false` no-op.
    pub async fn run(&self) -> anyhow::Result<()> {
        if !self.config.is_sharded {
            tracing::info!(conn_id = %self.config.conn_id, "is_sharded=false, standalone mode is not implemented");
            return Ok(());
        }

        self.running.store(true, Ordering::SeqCst);

        let mut checkpoint = Checkpoint {
            commit_ts: self.read_checkpoint(),
        };
        // Same policy as the PREPARE arm's cold-start fallback below: a
        // failed cold start is logged and retried, never propagated. Spec.md
        // §7: "Nothing is surfaced to a caller as a raised failure at steady
        // state ... only stop() ends the loop."
        while checkpoint.commit_ts.is_none() && self.running.load(Ordering::SeqCst) {
            match self.cold_start().await {
                Ok(now) => {
                    checkpoint.commit_ts = Some(now);
                    self.persist(now);
                },
                Err(e) => {
                    tracing::error!(error = ?e, "initial cold start failed, will retry");
                    tokio::time::sleep(self.config.cycle_sleep).await;
                },
            }
        }

        while self.running.load(Ordering::SeqCst) {
            self.run_one_cycle(&mut checkpoint).await;
            tokio::time::sleep(self.config.cycle_sleep).await;
        }

        Ok(())
    }

    /// Runs a single PREPARE -> STREAM -> COMMIT (or ERROR) cycle. Broken
    /// out of `run` so tests can drive the state machine one cycle at a
    /// time without sleeping between cycles.
    pub async fn run_one_cycle(&self, checkpoint: &mut Checkpoint) {
        let commit_ts = checkpoint
            .commit_ts
            .expect("run_one_cycle requires an initialized checkpoint");

        // PREPARE
        let resume_ts = match cursor::position_cursor(
            &self.source,
            &self.store,
            commit_ts,
            self.config.transport_retry_interval,
        )
        .await
        {
            Ok(Some(ts)) => ts,
            Ok(None) => match self.cold_start().await {
                Ok(now) => {
                    checkpoint.commit_ts = Some(now);
                    self.persist(now);
                    now
                },
                Err(e) => {
                    tracing::error!(error = ?e, "cold start failed, will retry next cycle");
                    return;
                },
            },
            Err(e) => {
                tracing::error!(error = ?e, "failed to prepare cursor, will retry next cycle");
                return;
            },
        };

        // STREAM
        match self.stream_and_apply(resume_ts).await {
            Ok(Some(last_ts)) => {
                // COMMIT
                checkpoint.commit_ts = Some(last_ts);
                self.persist(last_ts);
            },
            Ok(None) => {
                // No entries were available this cycle; nothing to commit.
            },
            Err(e) => {
                // ERROR: abort the batch without committing. `checkpoint`
                // still holds the previous commit_ts, so the next cycle
                // resumes at or before the failed entry.
                tracing::error!(error = ?e, "stream cycle aborted, will retry next cycle");
            },
        }
    }

    fn read_checkpoint(&self) -> Option<LogTimestamp> {
        self.checkpoint_store
            .as_ref()
            .and_then(|store| store.read(&self.config.conn_id))
    }

    fn persist(&self, commit_ts: LogTimestamp) {
        let Some(store) = self.checkpoint_store.as_ref() else {
            return;
        };
        if let Err(e) = store.write(&self.config.conn_id, commit_ts) {
            // spec.md §4.2: write errors are fatal for the current
            // iteration and retried on the next checkpoint attempt, not
            // retried inline.
            tracing::error!(error = ?e, %commit_ts, "failed to persist checkpoint");
        }
    }

    /// spec.md §4.6 INIT: read the oplog's current tail timestamp and bulk
    /// dump the configured namespace set against it.
    async fn cold_start(&self) -> anyhow::Result<LogTimestamp> {
        let tail = retry_until_ok(self.retry_policy(), || self.source.tail_timestamp(), |_| true).await?;
        let now = tail.unwrap_or(LogTimestamp::new(0, 0));

        for ns in &self.config.namespace_set {
            let docs =
                retry_until_ok(self.retry_policy(), || self.source.scan_collection(ns), |_| true).await?;
            for doc in docs {
                let id = doc
                    .get("_id")
                    .cloned()
                    .with_context(|| format!("scanned document in {ns} is missing _id"))?;
                retry_until_ok(
                    self.retry_policy(),
                    || self.store.upsert(MirroredDoc::new(id.clone(), ns.clone(), now, doc.clone())),
                    |_| true,
                )
                .await?;
            }
        }

        tracing::info!(%now, namespaces = self.config.namespace_set.len(), "cold dump complete");
        Ok(now)
    }

    /// spec.md §4.6 STREAM: drains entries after `from` and applies each to
    /// the secondary store. Returns the timestamp of the last entry
    /// processed, or `None` if no entries were available this cycle.
    async fn stream_and_apply(&self, from: LogTimestamp) -> anyhow::Result<Option<LogTimestamp>> {
        let entries = retry_until_ok(
            self.retry_policy(),
            || self.source.entries_after(from, self.config.batch_size),
            |_| true,
        )
        .await?;

        let mut last_ts = None;
        for entry in entries {
            match entry.op {
                Op::Delete => {
                    if let Some(id) = entry.delete_id() {
                        let stub = DocStub {
                            id,
                            ns: entry.ns.clone(),
                        };
                        retry_until_ok(self.retry_policy(), || self.store.remove(stub.clone()), |_| true)
                            .await?;
                    }
                },
                Op::Insert | Op::Update => {
                    if let Some(id) = entry.resolve_id() {
                        let resolved = retry_until_ok(
                            self.retry_policy(),
                            || self.source.resolve_one(&entry.ns, &id),
                            |_| true,
                        )
                        .await?;
                        if let Some(doc) = resolved {
                            let mirrored = MirroredDoc::new(id, entry.ns.clone(), entry.ts, doc);
                            retry_until_ok(self.retry_policy(), || self.store.upsert(mirrored.clone()), |_| true)
                                .await?;
                        }
                        // A resolver miss means the document was deleted by
                        // a later operation; nothing is upserted, but the
                        // checkpoint still advances past this entry
                        // (spec.md §8 scenario D).
                    }
                },
                Op::Noop | Op::Other => {
                    // Unknown/no-op entries are observed and ignored
                    // (spec.md §4.6, §7).
                },
            }
            last_ts = Some(entry.ts);
        }

        Ok(last_ts)
    }
}
