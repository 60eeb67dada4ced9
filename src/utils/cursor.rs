use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
struct LevelMarker {
    level: u64,
}

/// Durable marker for the last fully processed block level.
///
/// Persisted as a tiny JSON file outside the database so a restarted run
/// resumes from `level + 1` instead of reprocessing or skipping a range.
pub struct LevelCursor {
    path: PathBuf,
    indexing_start: u64,
}

impl LevelCursor {
    pub fn new(path: impl Into<PathBuf>, indexing_start: u64) -> Self {
        Self {
            path: path.into(),
            indexing_start,
        }
    }

    /// Last recorded level, or the configured indexing start when no
    /// marker file exists yet.
    pub async fn last_level(&self) -> anyhow::Result<u64> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let marker: LevelMarker = serde_json::from_str(&contents)
                    .with_context(|| format!("Corrupt level marker at {}", self.path.display()))?;
                Ok(marker.level)
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(self.indexing_start),
            Err(e) => Err(e).context("Failed to read level marker"),
        }
    }

    /// Persist `level` as the last fully processed block level.
    pub async fn record(&self, level: u64) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create level marker directory")?;
        }

        let payload = serde_json::to_string(&LevelMarker { level })?;
        tokio::fs::write(&self.path, payload)
            .await
            .with_context(|| format!("Failed to write level marker at {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_marker(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("plentyd-cursor-{}-{}.json", std::process::id(), name))
    }

    #[tokio::test]
    async fn missing_file_falls_back_to_indexing_start() {
        let cursor = LevelCursor::new(temp_marker("missing"), 2_525_525);
        assert_eq!(cursor.last_level().await.unwrap(), 2_525_525);
    }

    #[tokio::test]
    async fn record_then_read_round_trips() {
        let path = temp_marker("roundtrip");
        let cursor = LevelCursor::new(&path, 0);
        cursor.record(3_000_000).await.unwrap();
        assert_eq!(cursor.last_level().await.unwrap(), 3_000_000);
        let _ = tokio::fs::remove_file(&path).await;
    }
}
