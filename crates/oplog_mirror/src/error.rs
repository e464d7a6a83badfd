use thiserror::Error;

/// Errors raised at points where spec.md §7's error table calls for
/// something other than plain unbounded retry: a malformed checkpoint file
/// or a secondary-store commit failure, both of which abort the current
/// cycle rather than being retried in place. Transient transport errors and
/// the cursor-lost/log-wiped outcomes are classified and handled inline by
/// `retry::retry_until_ok` and `cursor::position_cursor` respectively
/// (they resolve to a retry or to `Option::None`, not to a raised error),
/// so they have no variant here.
#[derive(Debug, Error)]
pub enum TailerError {
    /// The on-disk checkpoint file could not be parsed.
    #[error("checkpoint file malformed or absent: {0}")]
    CheckpointCorrupt(#[source] anyhow::Error),

    /// The secondary store did not durably commit prior operations.
    #[error("secondary store commit failed: {0}")]
    CommitFailed(#[source] anyhow::Error),
}
