//! File-backed pod mapping document for the reverse proxy.
//!
//! The whole document is read, updated and written back on every upsert.
//! Writers in this process are serialized; writers in other processes are
//! not, so the last one wins. Entries are never removed.

use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;

use api_types::MappingDocument;
use api_types::MappingEntry;
use error_stack::Report;
use error_stack::ResultExt;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("Failed to read mapping document {path}")]
    Read { path: String },
    #[error("Mapping document {path} is not valid JSON")]
    Parse { path: String },
    #[error("Failed to write mapping document {path}")]
    Write { path: String },
}

pub struct MappingStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl MappingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current document; a missing file is an empty document.
    ///
    /// # Errors
    ///
    /// - [`MappingError::Read`] if the file exists but cannot be read
    /// - [`MappingError::Parse`] if its content is not a mapping document
    pub async fn load(&self) -> Result<MappingDocument, Report<MappingError>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(MappingDocument::new()),
            Err(e) => {
                return Err(Report::new(e).change_context(MappingError::Read {
                    path: self.path.display().to_string(),
                }))
            }
        };

        if content.trim().is_empty() {
            return Ok(MappingDocument::new());
        }

        serde_json::from_str(&content).change_context(MappingError::Parse {
            path: self.path.display().to_string(),
        })
    }

    /// Insert or overwrite the entry for `workload`.
    ///
    /// The document is replaced through a rename so readers never observe a
    /// partially written file.
    ///
    /// # Errors
    ///
    /// Any [`MappingError`]; an unreadable document is left untouched.
    #[tracing::instrument(skip(self, entry), fields(path = %self.path.display()))]
    pub async fn upsert(
        &self,
        workload: &str,
        entry: MappingEntry,
    ) -> Result<(), Report<MappingError>> {
        let _guard = self.write_lock.lock().await;

        let mut document = self.load().await?;
        document.insert(workload.to_string(), entry);

        let write_error = || MappingError::Write {
            path: self.path.display().to_string(),
        };
        let content = serde_json::to_vec_pretty(&document).change_context_lazy(write_error)?;

        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, content)
            .await
            .change_context_lazy(write_error)?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .change_context_lazy(write_error)?;

        info!(entries = document.len(), "Recorded pod mapping");
        Ok(())
    }
}
