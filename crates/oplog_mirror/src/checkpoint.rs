use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

use anyhow::Context;
use serde_json::Value;

use crate::{
    error::TailerError,
    timestamp::LogTimestamp,
};

/// The durable record of the last fully-applied log timestamp for one
/// source-connection identity, scoped inside a shared checkpoint file
/// (spec.md §3, §4.2).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Checkpoint {
    pub commit_ts: Option<LogTimestamp>,
}

/// A checkpoint file is a flat JSON array of alternating
/// `[conn_id_string, encoded_ts_number, conn_id_string, encoded_ts_number,
/// ...]` entries (spec.md §6). Read and write are scoped to one `conn_id`
/// key so multiple shards can safely share a single file.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Reads the checkpoint for `conn_id`. Any read or parse failure is
    /// treated as "no checkpoint," forcing a cold start, per spec.md §7's
    /// "Checkpoint file malformed/absent → treat as no checkpoint" policy —
    /// this intentionally does not distinguish "file absent" from "file
    /// corrupt" (spec.md §9 Open Question 3).
    pub fn read(&self, conn_id: &str) -> Option<LogTimestamp> {
        match self.try_read(conn_id) {
            Ok(ts) => ts,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "checkpoint read failed, cold starting");
                None
            },
        }
    }

    fn try_read(&self, conn_id: &str) -> anyhow::Result<Option<LogTimestamp>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if contents.trim().is_empty() {
            return Ok(None);
        }
        let entries: Vec<Value> = serde_json::from_str(&contents).map_err(|e| TailerError::CheckpointCorrupt(e.into()))?;
        find_entry(&entries, conn_id)
    }

    /// Writes `commit_ts` for `conn_id`, replacing any prior entry for the
    /// same key and preserving every other key's entry verbatim (spec.md
    /// §5 shared-resource policy). Writes to a sibling temp file, then
    /// renames atomically over the original (spec.md §4.2, §6).
    pub fn write(&self, conn_id: &str, commit_ts: LogTimestamp) -> anyhow::Result<()> {
        let mut entries = match self.try_read_raw() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "existing checkpoint file unreadable, rewriting from scratch"
                );
                Vec::new()
            },
        };
        remove_entry(&mut entries, conn_id);
        entries.push(Value::String(conn_id.to_string()));
        entries.push(Value::from(commit_ts.encode()));

        let tmp_path = self.path.with_extension("tmp");
        let serialized =
            serde_json::to_string(&Value::Array(entries)).context("failed to serialize checkpoint")?;
        fs::write(&tmp_path, serialized)
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("failed to rename {} into place", self.path.display()))?;
        Ok(())
    }

    fn try_read_raw(&self) -> anyhow::Result<Vec<Value>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }
}

fn find_entry(entries: &[Value], conn_id: &str) -> anyhow::Result<Option<LogTimestamp>> {
    let mut iter = entries.iter();
    while let Some(key) = iter.next() {
        let ts_value = iter
            .next()
            .context("checkpoint file has an odd number of entries")?;
        if key.as_str() == Some(conn_id) {
            let encoded = ts_value
                .as_u64()
                .context("checkpoint timestamp is not a valid integer")?;
            return Ok(Some(LogTimestamp::decode(encoded)));
        }
    }
    Ok(None)
}

fn remove_entry(entries: &mut Vec<Value>, conn_id: &str) {
    let mut i = 0;
    while i + 1 < entries.len() {
        if entries[i].as_str() == Some(conn_id) {
            entries.drain(i..=i + 1);
        } else {
            i += 2;
        }
    }
}

/// Helper used by tests and by the demo binary to point a `CheckpointStore`
/// at a path inside a fresh temp directory.
pub fn default_path(base: &Path, conn_id: &str) -> PathBuf {
    base.join(format!("{conn_id}.oplog-checkpoint.json"))
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn round_trips_a_single_key() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));
        let ts = LogTimestamp::new(100, 7);

        store.write("shard-a", ts).unwrap();
        assert_eq!(store.read("shard-a"), Some(ts));
    }

    #[test]
    fn distinct_keys_are_independent() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));

        store.write("shard-a", LogTimestamp::new(100, 1)).unwrap();
        store.write("shard-b", LogTimestamp::new(200, 2)).unwrap();
        store.write("shard-a", LogTimestamp::new(150, 3)).unwrap();

        assert_eq!(store.read("shard-a"), Some(LogTimestamp::new(150, 3)));
        assert_eq!(store.read("shard-b"), Some(LogTimestamp::new(200, 2)));
    }

    #[test]
    fn missing_file_reads_as_no_checkpoint() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("does-not-exist.json"));
        assert_eq!(store.read("shard-a"), None);
    }

    #[test]
    fn malformed_file_reads_as_no_checkpoint() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        fs::write(&path, "not json at all").unwrap();
        let store = CheckpointStore::new(path);
        assert_eq!(store.read("shard-a"), None);
    }

    #[test]
    fn empty_file_reads_as_no_checkpoint() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        fs::write(&path, "").unwrap();
        let store = CheckpointStore::new(path);
        assert_eq!(store.read("shard-a"), None);
    }

    #[test]
    fn write_preserves_other_keys_verbatim() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));
        store.write("shard-a", LogTimestamp::new(1, 1)).unwrap();
        store.write("shard-b", LogTimestamp::new(2, 2)).unwrap();
        store.write("shard-a", LogTimestamp::new(3, 3)).unwrap();

        let raw = fs::read_to_string(dir.path().join("checkpoint.json")).unwrap();
        let entries: Vec<Value> = serde_json::from_str(&raw).unwrap();
        assert_eq!(entries.len(), 4);
    }
}
