//! Core of a change-data-capture worker that tails a replicated document
//! database's oplog and mirrors mutations into an external secondary
//! store.
//!
//! The source database client, the secondary-store adapter, and the
//! top-level process that owns one [`Tailer`] per shard are external
//! collaborators; this crate only implements the tailer's state machine,
//! cursor positioning, entry-to-document translation, rollback
//! reconciliation, and progress checkpointing against the [`OplogSource`]
//! and [`SecondaryStore`] trait contracts.

pub mod checkpoint;
pub mod config;
pub mod cursor;
pub mod document;
pub mod error;
pub mod reconciler;
pub mod retry;
pub mod secondary_store;
pub mod source;
pub mod tailer;
pub mod timestamp;

#[cfg(feature = "testing")]
pub mod testing;

pub use checkpoint::{
    Checkpoint,
    CheckpointStore,
};
pub use config::TailerConfig;
pub use document::{
    DocStub,
    LogEntry,
    MirroredDoc,
    Namespace,
    Op,
};
pub use error::TailerError;
pub use secondary_store::SecondaryStore;
pub use source::OplogSource;
pub use tailer::{
    StopHandle,
    Tailer,
};
pub use timestamp::LogTimestamp;
