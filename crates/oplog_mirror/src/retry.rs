use std::{
    future::Future,
    time::Duration,
};

use backoff::{
    backoff::Backoff as _,
    future::retry,
    Error as BackoffError,
    ExponentialBackoff,
    ExponentialBackoffBuilder,
};

/// Builds the backoff policy used for unbounded transient-error retries
/// (spec.md §4.3, §5: "fixed small backoff (≈1s), unbounded"). The interval
/// is capped at `max_interval` almost immediately, so in steady state calls
/// are retried roughly every `max_interval` with jitter — the closest
/// faithful translation of "fixed ≈1s backoff" that still avoids a
/// thundering herd of unjittered retries against a struggling primary.
pub fn unbounded_policy(max_interval: Duration) -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(max_interval)
        .with_max_interval(max_interval)
        .with_multiplier(1.0)
        .with_max_elapsed_time(None)
        .build()
}

/// The "retry-until-ok" combinator design note §9 calls for: retries `op`
/// under `policy` until it succeeds or returns a terminal error. `classify`
/// decides, for each error `op` returns, whether it is transient (keep
/// retrying) or terminal (stop and propagate). Never swallows an error
/// silently — a terminal error is always returned to the caller.
pub async fn retry_until_ok<T, E, F, Fut, C>(
    mut policy: ExponentialBackoff,
    mut op: F,
    classify: C,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> bool,
{
    // `backoff::future::retry` needs a plain `Backoff` with `next_backoff`;
    // the exponential policy above already degenerates to a fixed interval,
    // so this is the real jittered source of the retry cadence.
    policy.reset();
    retry(policy, move || {
        let fut = op();
        async move {
            fut.await.map_err(|e| {
                if classify(&e) {
                    BackoffError::transient(e)
                } else {
                    BackoffError::Permanent(e)
                }
            })
        }
    })
    .await
    .map_err(|e| match e {
        BackoffError::Permanent(e) => e,
        BackoffError::Transient { err, .. } => err,
    })
}
