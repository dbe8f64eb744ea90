//! Device-local idempotence markers.
//!
//! One flag per session token meaning "this device already submitted here".
//! Keys follow the `tossed:{session_id}` form so a marker file reads the same
//! as the browser storage it replaces.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use super::traits::BaseMarkerStore;
use crate::common::SessionId;

pub fn marker_key(session_id: SessionId) -> String {
    format!("tossed:{}", session_id)
}

/// Markers kept as a JSON object on disk, rewritten atomically on change.
pub struct FileMarkerStore {
    path: PathBuf,
    // serializes read-modify-write of the file within this process
    write_lock: AsyncMutex<()>,
}

impl FileMarkerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: AsyncMutex::new(()),
        }
    }

    /// `.coin-toss/markers.json` under the current directory.
    pub fn default_path() -> PathBuf {
        PathBuf::from(".coin-toss").join("markers.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, bool>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Corrupt marker file {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", self.path.display())),
        }
    }

    async fn save(&self, markers: &BTreeMap<String, bool>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(markers)?;
        tokio::fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl BaseMarkerStore for FileMarkerStore {
    async fn has_submitted(&self, session_id: SessionId) -> Result<bool> {
        let markers = self.load().await?;
        Ok(markers.get(&marker_key(session_id)).copied().unwrap_or(false))
    }

    async fn mark_submitted(&self, session_id: SessionId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut markers = self.load().await?;
        markers.insert(marker_key(session_id), true);
        self.save(&markers).await?;
        debug!(session_id = %session_id, path = %self.path.display(), "Marked session as submitted");
        Ok(())
    }
}

/// Markers that live as long as the process.
#[derive(Default)]
pub struct MemoryMarkerStore {
    marked: Mutex<HashSet<SessionId>>,
}

impl MemoryMarkerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BaseMarkerStore for MemoryMarkerStore {
    async fn has_submitted(&self, session_id: SessionId) -> Result<bool> {
        Ok(self
            .marked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&session_id))
    }

    async fn mark_submitted(&self, session_id: SessionId) -> Result<()> {
        self.marked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session_id);
        Ok(())
    }
}
