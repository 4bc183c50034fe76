//! Durable counter of discovery runs

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::models::RunId;

/// File-backed store of the last issued run id
///
/// The file holds a single decimal number. A missing file means no run has
/// happened yet, so the first id handed out is 1.
#[derive(Debug)]
pub struct RunIdStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl RunIdStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last persisted run id, if any
    pub async fn last(&self) -> Result<Option<RunId>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.error(e)),
        };

        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        trimmed
            .parse::<RunId>()
            .map(Some)
            .map_err(|e| self.error(format!("invalid run id {trimmed:?}: {e}")))
    }

    /// Issue the next run id and persist it before returning
    pub async fn next(&self) -> Result<RunId> {
        let _guard = self.lock.lock().await;

        let next = self.last().await?.unwrap_or(0) + 1;
        self.persist(next).await?;

        tracing::debug!(run_id = next, path = %self.path.display(), "Issued run id");
        Ok(next)
    }

    async fn persist(&self, run_id: RunId) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| self.error(e))?;
        }

        // Write to temp file first, then rename
        let mut temp_name = self.path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| self.error(e))?;
        file.write_all(format!("{run_id}\n").as_bytes())
            .await
            .map_err(|e| self.error(e))?;
        file.sync_all().await.map_err(|e| self.error(e))?;
        drop(file);

        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| self.error(e))
    }

    fn error(&self, reason: impl ToString) -> Error {
        Error::RunIdStore {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}
