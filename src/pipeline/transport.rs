use std::io;
use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::media::MediaDownloadError;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Telegram(#[from] teloxide::RequestError),
    #[error(transparent)]
    Download(#[from] MediaDownloadError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One user's side of the conversation: where attachments come from and
/// where replies go.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Stores the attachment identified by `file_id` at `destination`.
    async fn download(&self, file_id: &str, destination: &Path) -> Result<(), TransportError>;

    async fn send_text(&self, text: &str) -> Result<(), TransportError>;

    async fn send_voice(&self, audio: &Path) -> Result<(), TransportError>;
}
