use serde::{Deserialize, Serialize};
use std::path::Path;

/// Wraps a value persisted to disk between process restarts, tagging the file with a schema
/// marker distinct from the bare value's own JSON shape (so a future field addition to `T` can
/// be told apart from a stale or corrupt file, rather than silently failing to deserialize).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize, Serialize)]
pub struct Snapshot<T>(pub T);

impl<T> Snapshot<T>
where
    T: Serialize + for<'de> Deserialize<'de>,
{
    /// Reads and deserializes a `Snapshot<T>` from `path`. Any I/O failure, corrupt JSON, or
    /// schema mismatch is treated as "nothing to resume from" rather than a fatal error - an
    /// agent's very first run has no prior state file at all.
    pub fn load(path: &Path) -> Option<T> {
        let bytes = std::fs::read(path).ok()?;
        let snapshot: Self = serde_json::from_slice(&bytes).ok()?;
        Some(snapshot.0)
    }

    /// Writes `value` to `path` via a temp-file-then-rename so a crash mid-write never leaves a
    /// truncated snapshot behind (§4.4.7).
    pub fn persist(path: &Path, value: &T) -> Result<(), String> {
        let parent = path
            .parent()
            .ok_or_else(|| "snapshot path has no parent directory".to_string())?;
        std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;

        let json = serde_json::to_vec_pretty(&Snapshot(value)).map_err(|e| e.to_string())?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json).map_err(|e| e.to_string())?;
        std::fs::rename(&tmp_path, path).map_err(|e| e.to_string())
    }
}
