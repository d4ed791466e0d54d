use std::path::Path;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{FileId, InputFile, MessageId, ReplyParameters};
use tracing::debug;

use crate::llm::media::download_media;
use crate::pipeline::{ChatTransport, TransportError};
use crate::utils::telegram::{split_message, TELEGRAM_MAX_LENGTH};

/// Talks back to the chat an update came from, replying to the original message.
pub struct TelegramTransport {
    bot: Bot,
    chat_id: ChatId,
    reply_to: MessageId,
}

impl TelegramTransport {
    pub fn for_message(bot: Bot, message: &Message) -> Self {
        TelegramTransport {
            bot,
            chat_id: message.chat.id,
            reply_to: message.id,
        }
    }

    async fn get_file_url(&self, file_id: &str) -> Result<String, TransportError> {
        let file = self.bot.get_file(FileId(file_id.to_string())).await?;
        Ok(format!(
            "https://api.telegram.org/file/bot{}/{}",
            self.bot.token(),
            file.path
        ))
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn download(&self, file_id: &str, destination: &Path) -> Result<(), TransportError> {
        let url = self.get_file_url(file_id).await?;
        let bytes = download_media(&url).await?;
        debug!(
            "Downloaded {} bytes into {}",
            bytes.len(),
            destination.display()
        );
        tokio::fs::write(destination, bytes).await?;
        Ok(())
    }

    async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        for chunk in split_message(text, TELEGRAM_MAX_LENGTH) {
            self.bot
                .send_message(self.chat_id, chunk)
                .reply_parameters(ReplyParameters::new(self.reply_to))
                .await?;
        }
        Ok(())
    }

    async fn send_voice(&self, audio: &Path) -> Result<(), TransportError> {
        self.bot
            .send_voice(self.chat_id, InputFile::file(audio.to_path_buf()))
            .reply_parameters(ReplyParameters::new(self.reply_to))
            .await?;
        Ok(())
    }
}
