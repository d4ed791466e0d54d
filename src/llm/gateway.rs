use async_trait::async_trait;
use thiserror::Error;

use crate::session::ChatTurn;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{operation} request failed: {source}")]
    Http {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{operation} failed with status {status}: {message}")]
    Api {
        operation: &'static str,
        status: u16,
        message: String,
    },
    #[error("{0} returned no usable content")]
    EmptyResponse(&'static str),
}

/// The four request kinds the relay sends to the generative-AI service.
#[async_trait]
pub trait AiGateway: Send + Sync {
    /// Completes a conversation; `history` is sent verbatim as context.
    async fn complete_chat(&self, history: &[ChatTurn]) -> Result<String, GatewayError>;

    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String, GatewayError>;

    async fn describe_image(&self, prompt: &str, image: Vec<u8>) -> Result<String, GatewayError>;

    /// Returns OGG/Opus audio suitable for a voice reply.
    async fn synthesize_speech(&self, text: &str) -> Result<Vec<u8>, GatewayError>;
}
