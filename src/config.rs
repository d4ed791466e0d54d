use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const BOT_TOKEN_VAR: &str = "TELEGRAM_BOT_TOKEN";
pub const OPENAI_API_KEY_VAR: &str = "OPENAI_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
}

#[derive(Clone)]
pub struct Config {
    pub bot_token: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub chat_model: String,
    pub vision_model: String,
    pub transcribe_model: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub openai_timeout: Duration,
    pub image_prompt: String,
    pub enable_image_enhancement: bool,
    pub media_temp_dir: PathBuf,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bot_token", &"[REDACTED]")
            .field("openai_api_key", &"[REDACTED]")
            .field("openai_base_url", &self.openai_base_url)
            .field("chat_model", &self.chat_model)
            .field("vision_model", &self.vision_model)
            .field("transcribe_model", &self.transcribe_model)
            .field("tts_model", &self.tts_model)
            .field("tts_voice", &self.tts_voice)
            .field("openai_timeout", &self.openai_timeout)
            .field("image_prompt", &self.image_prompt)
            .field("enable_image_enhancement", &self.enable_image_enhancement)
            .field("media_temp_dir", &self.media_temp_dir)
            .finish()
    }
}

type Lookup<'a> = dyn Fn(&str) -> Option<String> + 'a;

fn env_string(lookup: &Lookup, name: &str, default: &str) -> String {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_bool(lookup: &Lookup, name: &str, default: bool) -> bool {
    lookup(name)
        .map(|value| value.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn env_u64(lookup: &Lookup, name: &str, default: u64) -> u64 {
    lookup(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_required(lookup: &Lookup, name: &'static str) -> Result<String, ConfigError> {
    let value = lookup(name).unwrap_or_default();
    if value.trim().is_empty() {
        return Err(ConfigError::Missing(name));
    }
    Ok(value.trim().to_string())
}

/// Logging is configured before the rest of the configuration is validated.
pub fn log_level_from_env() -> String {
    env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
}

pub fn logs_dir_from_env() -> PathBuf {
    PathBuf::from(env::var("LOGS_DIR").unwrap_or_else(|_| "logs".to_string()))
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(&|name: &str| env::var(name).ok())
    }

    pub fn from_lookup(lookup: &Lookup) -> Result<Self, ConfigError> {
        let bot_token = env_required(lookup, BOT_TOKEN_VAR)?;
        let openai_api_key = env_required(lookup, OPENAI_API_KEY_VAR)?;

        let media_temp_dir = lookup("MEDIA_TEMP_DIR")
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(env::temp_dir);

        Ok(Config {
            bot_token,
            openai_api_key,
            openai_base_url: env_string(lookup, "OPENAI_BASE_URL", "https://api.openai.com/v1"),
            chat_model: env_string(lookup, "OPENAI_CHAT_MODEL", "gpt-4o-mini"),
            vision_model: env_string(lookup, "OPENAI_VISION_MODEL", "gpt-4o-mini"),
            transcribe_model: env_string(
                lookup,
                "OPENAI_TRANSCRIBE_MODEL",
                "gpt-4o-mini-transcribe",
            ),
            tts_model: env_string(lookup, "OPENAI_TTS_MODEL", "gpt-4o-mini-tts"),
            tts_voice: env_string(lookup, "OPENAI_TTS_VOICE", "alloy"),
            openai_timeout: Duration::from_secs(env_u64(lookup, "OPENAI_TIMEOUT_SECONDS", 60)),
            image_prompt: env_string(lookup, "IMAGE_PROMPT", DEFAULT_IMAGE_PROMPT),
            enable_image_enhancement: env_bool(lookup, "ENABLE_IMAGE_ENHANCEMENT", true),
            media_temp_dir,
        })
    }
}

pub const DEFAULT_IMAGE_PROMPT: &str = "Describe this image";

pub const START_GREETING: &str = "👋 Hi, {first_name}!\n\nI'm a bot powered by GPT-4o. Send me a message, a voice note or a photo and I'll do my best to help 😊";

pub const NEW_DIALOG_BUTTON: &str = "💬 New dialog";
pub const RESET_CALLBACK_DATA: &str = "reset";
pub const RESET_ANSWER: &str = "Context cleared.";
pub const RESET_CONFIRMATION: &str = "🧹 Context reset. We can start over!";
pub const VOICE_ON_CONFIRMATION: &str = "🔊 Voice replies are on.";
pub const VOICE_OFF_CONFIRMATION: &str = "🔇 Voice replies are off.";
