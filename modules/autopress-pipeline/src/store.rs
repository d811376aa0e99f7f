//! Whole-file JSON persistence for the two durable records (knowledge store,
//! content plan). Both tolerate an absent file (bootstrap to empty) and a
//! corrupted one (log and reset) without crashing the process.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use autopress_common::AutopressError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

/// Load a persisted record, falling back to `Default` when the file is
/// missing, unreadable, or corrupt.
pub fn load_or_default<T: DeserializeOwned + Default>(path: &Path, what: &str) -> T {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return T::default(),
        Err(e) => {
            warn!(path = %path.display(), what, error = %e, "store unreadable, resetting to empty");
            return T::default();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(path = %path.display(), what, error = %e, "store corrupt, resetting to empty");
            T::default()
        }
    }
}

/// Serialize a record to its file, creating parent directories as needed.
/// Write-through, not transactional; a single writer is assumed.
pub fn save<T: Serialize>(path: &Path, value: &T) -> Result<(), AutopressError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| AutopressError::Storage(format!("create {}: {e}", parent.display())))?;
    }
    let raw = serde_json::to_string_pretty(value)
        .map_err(|e| AutopressError::Storage(format!("serialize {}: {e}", path.display())))?;
    fs::write(path, raw)
        .map_err(|e| AutopressError::Storage(format!("write {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use autopress_common::ContentPlan;

    #[test]
    fn absent_file_bootstraps_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let plan: ContentPlan = load_or_default(&dir.path().join("missing.json"), "plan");
        assert!(plan.queue.is_empty());
        assert!(plan.active_series_name.is_none());
    }

    #[test]
    fn corrupt_file_resets_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        fs::write(&path, "{not valid json").unwrap();
        let plan: ContentPlan = load_or_default(&path, "plan");
        assert!(plan.queue.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/plan.json");
        let mut plan = ContentPlan::default();
        plan.active_series_name = Some("Rust async internals".to_string());
        plan.queue.push_back("Part two".to_string());

        save(&path, &plan).unwrap();
        let loaded: ContentPlan = load_or_default(&path, "plan");
        assert_eq!(loaded.active_series_name.as_deref(), Some("Rust async internals"));
        assert_eq!(loaded.queue.len(), 1);
    }
}
