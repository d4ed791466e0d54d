use reqwest::StatusCode;
use thiserror::Error;
use tracing::warn;

use crate::utils::http::get_http_client;

const MEDIA_DOWNLOAD_ERROR_BODY_LIMIT: usize = 800;

#[derive(Debug, Error)]
pub enum MediaDownloadError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server answered {status}: {body}")]
    Status { status: StatusCode, body: String },
}

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

pub fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

/// Fetches a media blob in a single attempt; failures surface to the caller.
pub async fn download_media(url: &str) -> Result<Vec<u8>, MediaDownloadError> {
    let response = get_http_client().get(url).send().await.map_err(|err| {
        warn!(
            "Failed to fetch media: {err} (timeout={}, connect={})",
            err.is_timeout(),
            err.is_connect()
        );
        err.without_url()
    })?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let body = truncate_for_log(&body, MEDIA_DOWNLOAD_ERROR_BODY_LIMIT);
        warn!("Media download failed with status {status}: {body}");
        return Err(MediaDownloadError::Status { status, body });
    }

    let bytes = response.bytes().await.map_err(|err| err.without_url())?;
    Ok(bytes.to_vec())
}
