//! Flat JSON snapshot of the in-memory state. Every map is written as an
//! ordered list of `[key, value]` pairs.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::activity::MediaWindows;
use crate::stats::{CommandUsageKey, GroupCounters};
use crate::window::ScopeKey;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserActivitySection {
    pub messages: Vec<(ScopeKey, Vec<u64>)>,
    pub mentions: Vec<(ScopeKey, Vec<u64>)>,
    pub replies: Vec<(ScopeKey, Vec<u64>)>,
    pub media: Vec<(ScopeKey, MediaWindows)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusMentionSection {
    pub limits: Vec<(String, bool)>,
    pub mentions: Vec<(ScopeKey, Vec<u64>)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub version: u32,
    pub saved_at_ms: u64,
    pub user_activity: UserActivitySection,
    pub group_stats: Vec<(String, GroupCounters)>,
    pub warnings: Vec<(ScopeKey, u32)>,
    pub flood_windows: Vec<(ScopeKey, Vec<u64>)>,
    pub status_mentions: StatusMentionSection,
    pub command_usage: Vec<(CommandUsageKey, u64)>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at_ms: 0,
            user_activity: UserActivitySection::default(),
            group_stats: Vec::new(),
            warnings: Vec::new(),
            flood_windows: Vec::new(),
            status_mentions: StatusMentionSection::default(),
            command_usage: Vec::new(),
        }
    }
}

pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes to a sibling temp file and renames it over the previous
    /// snapshot.
    pub async fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }

        let body = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!("Snapshot written to {} ({} bytes)", self.path.display(), body.len());
        Ok(())
    }

    /// A missing file is not an error: the caller starts empty.
    pub async fn load(&self) -> Result<Option<Snapshot>, SnapshotError> {
        let body = match tokio::fs::read(&self.path).await {
            Ok(body) => body,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No snapshot at {}, starting empty", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let snapshot: Snapshot = serde_json::from_slice(&body)?;
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::EventWindow;

    #[tokio::test]
    async fn test_missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("absent.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_creates_directories_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("nested/data/snapshot.json"));

        let mut snapshot = Snapshot::default();
        snapshot.saved_at_ms = 42;
        snapshot.warnings.push((ScopeKey::new("g", "u"), 2));
        snapshot.user_activity.media.push((
            ScopeKey::new("g", "u"),
            MediaWindows {
                image: EventWindow::from_stamps([5, 7]),
                ..MediaWindows::default()
            },
        ));

        store.save(&snapshot).await.unwrap();
        assert!(!store.path().with_extension("json.tmp").exists());
        assert_eq!(store.load().await.unwrap(), Some(snapshot));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, b"{not json").unwrap();
        let err = SnapshotStore::new(path).load().await.unwrap_err();
        assert!(matches!(err, SnapshotError::Json(_)));
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let snapshot: Snapshot = serde_json::from_str(
            r#"{"warnings": [[{"group":"g","subject":"u"}, 1]], "status_mentions": {"limits": [["g", true]]}}"#,
        )
        .unwrap();
        assert_eq!(snapshot.version, SNAPSHOT_VERSION);
        assert_eq!(snapshot.warnings, vec![(ScopeKey::new("g", "u"), 1)]);
        assert_eq!(snapshot.status_mentions.limits, vec![("g".to_string(), true)]);
        assert!(snapshot.status_mentions.mentions.is_empty());
        assert!(snapshot.user_activity.messages.is_empty());
    }
}
