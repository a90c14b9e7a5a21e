//! JSON state file holding a full store snapshot

use std::path::Path;

use anyhow::{Context, Result};
use pulse_engine::{InMemoryStore, StoreSnapshot};

/// Read a snapshot file into a fresh in-memory store
pub fn load(path: &Path) -> Result<InMemoryStore> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read state file {}", path.display()))?;
    let snapshot: StoreSnapshot = serde_json::from_str(&contents)
        .with_context(|| format!("Invalid state file {}", path.display()))?;
    Ok(InMemoryStore::from_snapshot(snapshot))
}

/// Write the store back, replacing the file atomically
pub async fn save(store: &InMemoryStore, path: &Path) -> Result<()> {
    let snapshot = store.snapshot().await;
    let json = serde_json::to_string_pretty(&snapshot)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to write state file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pulse_engine::{Signal, SignalSource, UserId};

    #[tokio::test]
    async fn save_then_load_keeps_signals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = InMemoryStore::new();
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap();
        store
            .add_signal(Signal::new(
                UserId::from("u1"),
                "steps",
                8000.0,
                "count",
                ts,
                SignalSource::Wearable,
            ))
            .await;
        save(&store, &path).await.unwrap();

        let loaded = load(&path).unwrap();
        let snapshot = loaded.snapshot().await;
        assert_eq!(snapshot.signals.len(), 1);
        assert_eq!(snapshot.signals[0].metric_key, "steps");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load(Path::new("/nonexistent/state.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/state.json"));
    }
}
