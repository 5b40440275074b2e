//! Local JSON mirror of the merged record collection.

use std::path::{Path, PathBuf};

use fsumi_core::NewsRecord;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("decoding {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct LocalBackup {
    path: PathBuf,
}

impl LocalBackup {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when the file does not exist yet.
    pub async fn load(&self) -> Result<Option<Vec<NewsRecord>>, BackupError> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(BackupError::Io {
                    action: "reading",
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| BackupError::Json {
                path: self.path.clone(),
                source,
            })
    }

    /// Pretty-printed JSON, written to a temp file and renamed into place.
    pub async fn save(&self, records: &[NewsRecord]) -> Result<(), BackupError> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)
            .await
            .map_err(io_error("creating directory", parent))?;

        let bytes = serde_json::to_vec_pretty(records).map_err(|source| BackupError::Json {
            path: self.path.clone(),
            source,
        })?;

        let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(io_error("opening temp file", &temp_path))?;
        file.write_all(&bytes)
            .await
            .map_err(io_error("writing temp file", &temp_path))?;
        file.flush()
            .await
            .map_err(io_error("flushing temp file", &temp_path))?;
        drop(file);

        if let Err(source) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(BackupError::Io {
                action: "renaming temp file onto",
                path: self.path.clone(),
                source,
            });
        }
        Ok(())
    }
}

fn io_error(action: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> BackupError {
    let path = path.to_path_buf();
    move |source| BackupError::Io {
        action,
        path,
        source,
    }
}
