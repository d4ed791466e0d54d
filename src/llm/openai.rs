use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::Config;
use crate::llm::gateway::{AiGateway, GatewayError};
use crate::llm::media::{detect_mime_type, truncate_for_log};
use crate::session::ChatTurn;
use crate::utils::timing::log_llm_timing;

const PROVIDER: &str = "openai";
const OP_CHAT: &str = "chat completion";
const OP_VISION: &str = "image analysis";
const OP_TRANSCRIBE: &str = "transcription";
const OP_SPEECH: &str = "speech synthesis";
const OP_CLIENT: &str = "client setup";
const ERROR_BODY_LIMIT: usize = 2000;

pub struct OpenAiGateway {
    client: Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    vision_model: String,
    transcribe_model: String,
    tts_model: String,
    tts_voice: String,
}

fn summarize_error_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if let Some(message) = value
            .pointer("/error/message")
            .or_else(|| value.get("message"))
            .and_then(Value::as_str)
        {
            return message.to_string();
        }
        return truncate_for_log(&value.to_string(), ERROR_BODY_LIMIT);
    }

    truncate_for_log(trimmed, ERROR_BODY_LIMIT)
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Pulls the reply text out of a Responses API payload.
///
/// Reasoning models put a `reasoning` item before the message, so the first
/// `output_text` part wins over positional lookup.
pub fn extract_response_text(response: &Value) -> Option<String> {
    let items = response.get("output").and_then(Value::as_array);
    for item in items.into_iter().flatten() {
        let parts = item.get("content").and_then(Value::as_array);
        for part in parts.into_iter().flatten() {
            if part.get("type").and_then(Value::as_str) != Some("output_text") {
                continue;
            }
            if let Some(text) = part.get("text").and_then(Value::as_str).and_then(non_empty) {
                return Some(text);
            }
        }
    }

    response
        .pointer("/output/0/content/0/text")
        .or_else(|| response.get("output_text"))
        .and_then(Value::as_str)
        .and_then(non_empty)
}

fn build_image_input(prompt: &str, image: &[u8]) -> Value {
    let mime_type = detect_mime_type(image).unwrap_or_else(|| "image/jpeg".to_string());
    let data_url = format!(
        "data:{};base64,{}",
        mime_type,
        general_purpose::STANDARD.encode(image)
    );
    json!([{
        "role": "user",
        "content": [
            { "type": "input_text", "text": prompt },
            { "type": "input_image", "image_url": data_url }
        ]
    }])
}

impl OpenAiGateway {
    pub fn new(config: &Config) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.openai_timeout)
            .build()
            .map_err(|source| GatewayError::Http {
                operation: OP_CLIENT,
                source,
            })?;

        Ok(OpenAiGateway {
            client,
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            api_key: config.openai_api_key.clone(),
            chat_model: config.chat_model.clone(),
            vision_model: config.vision_model.clone(),
            transcribe_model: config.transcribe_model.clone(),
            tts_model: config.tts_model.clone(),
            tts_voice: config.tts_voice.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn check_status(
        operation: &'static str,
        response: Response,
    ) -> Result<Response, GatewayError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = summarize_error_body(&body);
        warn!("OpenAI {operation} error: status={status}, detail={message}");
        Err(GatewayError::Api {
            operation,
            status: status.as_u16(),
            message,
        })
    }

    async fn post_json(
        &self,
        operation: &'static str,
        path: &str,
        payload: &Value,
    ) -> Result<Response, GatewayError> {
        let response = self
            .client
            .post(self.endpoint(path))
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|source| GatewayError::Http { operation, source })?;
        Self::check_status(operation, response).await
    }

    async fn create_response(
        &self,
        operation: &'static str,
        model: &str,
        input: Value,
    ) -> Result<String, GatewayError> {
        let payload = json!({ "model": model, "input": input });
        let response = self.post_json(operation, "responses", &payload).await?;
        let value = response
            .json::<Value>()
            .await
            .map_err(|source| GatewayError::Http { operation, source })?;
        match extract_response_text(&value) {
            Some(text) => Ok(text),
            None => {
                warn!(
                    "OpenAI {operation} response had no output text: {}",
                    truncate_for_log(&value.to_string(), ERROR_BODY_LIMIT)
                );
                Err(GatewayError::EmptyResponse(operation))
            }
        }
    }
}

#[async_trait]
impl AiGateway for OpenAiGateway {
    async fn complete_chat(&self, history: &[ChatTurn]) -> Result<String, GatewayError> {
        debug!("OpenAI chat request: model={}, turns={}", self.chat_model, history.len());
        let input = json!(history);
        log_llm_timing(PROVIDER, &self.chat_model, OP_CHAT, || {
            self.create_response(OP_CHAT, &self.chat_model, input)
        })
        .await
    }

    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String, GatewayError> {
        debug!(
            "OpenAI transcription request: model={}, bytes={}",
            self.transcribe_model,
            audio.len()
        );
        log_llm_timing(PROVIDER, &self.transcribe_model, OP_TRANSCRIBE, || async {
            let part = Part::bytes(audio)
                .file_name(file_name.to_string())
                .mime_str("audio/ogg")
                .map_err(|source| GatewayError::Http {
                    operation: OP_TRANSCRIBE,
                    source,
                })?;
            let form = Form::new()
                .text("model", self.transcribe_model.clone())
                .part("file", part);

            let response = self
                .client
                .post(self.endpoint("audio/transcriptions"))
                .bearer_auth(&self.api_key)
                .multipart(form)
                .send()
                .await
                .map_err(|source| GatewayError::Http {
                    operation: OP_TRANSCRIBE,
                    source,
                })?;
            let value = Self::check_status(OP_TRANSCRIBE, response)
                .await?
                .json::<Value>()
                .await
                .map_err(|source| GatewayError::Http {
                    operation: OP_TRANSCRIBE,
                    source,
                })?;

            value
                .get("text")
                .and_then(Value::as_str)
                .and_then(non_empty)
                .ok_or(GatewayError::EmptyResponse(OP_TRANSCRIBE))
        })
        .await
    }

    async fn describe_image(&self, prompt: &str, image: Vec<u8>) -> Result<String, GatewayError> {
        debug!(
            "OpenAI image request: model={}, bytes={}",
            self.vision_model,
            image.len()
        );
        let input = build_image_input(prompt, &image);
        log_llm_timing(PROVIDER, &self.vision_model, OP_VISION, || {
            self.create_response(OP_VISION, &self.vision_model, input)
        })
        .await
    }

    async fn synthesize_speech(&self, text: &str) -> Result<Vec<u8>, GatewayError> {
        let payload = json!({
            "model": self.tts_model,
            "voice": self.tts_voice,
            "input": text,
            "response_format": "opus"
        });
        log_llm_timing(PROVIDER, &self.tts_model, OP_SPEECH, || async {
            let response = self.post_json(OP_SPEECH, "audio/speech", &payload).await?;
            let audio = response
                .bytes()
                .await
                .map_err(|source| GatewayError::Http {
                    operation: OP_SPEECH,
                    source,
                })?;
            if audio.is_empty() {
                return Err(GatewayError::EmptyResponse(OP_SPEECH));
            }
            Ok(audio.to_vec())
        })
        .await
    }
}
