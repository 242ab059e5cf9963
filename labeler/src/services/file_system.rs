//! Real file system state store
//!
//! Persists engine snapshots as a single JSON document. Every write goes to
//! its own uniquely named temporary file in the target's directory, which is
//! then renamed over the target. Readers only ever see a complete snapshot,
//! even while several saves overlap.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::fs;

use crate::core::state::EngineSnapshot;
use crate::error::{LabelerError, LabelerResult};
use crate::traits::StateStore;
use shared::{component_debug, Component};

/// JSON snapshot file on the local file system
pub struct RealStateStore {
    path: PathBuf,
}

impl RealStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, operation: &str, message: impl ToString) -> LabelerError {
        LabelerError::persistence(operation, self.path.display(), message)
    }
}

#[async_trait]
impl StateStore for RealStateStore {
    async fn save(&self, snapshot: &EngineSnapshot) -> LabelerResult<()> {
        let content = serde_json::to_vec_pretty(snapshot).map_err(|e| self.error("serialize", e))?;
        let bytes = content.len();

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_replacing(&path, &content))
            .await
            .map_err(|e| self.error("write", e))?
            .map_err(|(operation, e)| self.error(operation, e))?;

        component_debug!(
            Component::Persistence,
            "Wrote {} bytes to {}",
            bytes,
            self.path.display()
        );
        Ok(())
    }

    async fn load(&self) -> LabelerResult<Option<EngineSnapshot>> {
        let content = match fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.error("read", e)),
        };

        let snapshot = serde_json::from_slice(&content).map_err(|e| self.error("parse", e))?;
        Ok(Some(snapshot))
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Write `content` to a fresh temporary file beside `path` and rename it into place
///
/// The temporary file is removed when any step fails.
fn write_replacing(path: &Path, content: &[u8]) -> Result<(), (&'static str, io::Error)> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| ("create directory", e))?;

    let mut file = NamedTempFile::new_in(dir).map_err(|e| ("create", e))?;
    file.write_all(content).map_err(|e| ("write", e))?;
    file.as_file().sync_all().map_err(|e| ("sync", e))?;
    file.persist(path).map_err(|e| ("rename", e.error))?;
    Ok(())
}
