use std::io;
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile};
use tracing::{debug, warn};

/// Hands out uniquely named scratch files for downloaded and synthesized media.
#[derive(Debug, Clone)]
pub struct TempFileStore {
    dir: PathBuf,
}

impl TempFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        TempFileStore { dir: dir.into() }
    }

    pub async fn acquire(&self, prefix: &str, suffix: &str) -> io::Result<TempMediaFile> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let dir = self.dir.clone();
        let (prefix, suffix) = (prefix.to_string(), suffix.to_string());
        let file = tokio::task::spawn_blocking(move || {
            Builder::new()
                .prefix(&prefix)
                .suffix(&suffix)
                .tempfile_in(&dir)
        })
        .await
        .map_err(io::Error::other)??;
        debug!("Acquired temp media file {}", file.path().display());
        Ok(TempMediaFile { file: Some(file) })
    }
}

/// A media file owned by one pipeline invocation.
///
/// The file is removed by [`TempMediaFile::release`] or, failing that, when the
/// value is dropped.
#[derive(Debug)]
pub struct TempMediaFile {
    file: Option<NamedTempFile>,
}

impl TempMediaFile {
    pub fn path(&self) -> &Path {
        match &self.file {
            Some(file) => file.path(),
            None => Path::new(""),
        }
    }

    pub async fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        tokio::fs::write(self.path(), bytes).await
    }

    pub async fn read_all(&self) -> io::Result<Vec<u8>> {
        tokio::fs::read(self.path()).await
    }

    pub fn file_name(&self) -> String {
        self.path()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "media".to_string())
    }

    pub fn release(mut self) -> io::Result<()> {
        match self.file.take() {
            Some(file) => {
                let path = file.path().to_path_buf();
                file.close()?;
                debug!("Released temp media file {}", path.display());
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for TempMediaFile {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let path = file.path().to_path_buf();
            if let Err(err) = file.close() {
                warn!("Failed to remove temp media file {}: {err}", path.display());
            }
        }
    }
}
