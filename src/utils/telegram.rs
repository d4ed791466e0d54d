use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::{ChatAction, User};
use tokio::task::JoinHandle;
use tracing::debug;

const CHAT_ACTION_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(4);

/// Keeps a chat action ("typing", "recording voice") visible until dropped.
pub struct ChatActionHeartbeat {
    task_handle: JoinHandle<()>,
}

impl Drop for ChatActionHeartbeat {
    fn drop(&mut self) {
        self.task_handle.abort();
    }
}

pub fn start_chat_action_heartbeat(
    bot: Bot,
    chat_id: ChatId,
    action: ChatAction,
) -> ChatActionHeartbeat {
    let task_handle = tokio::spawn(async move {
        loop {
            if let Err(err) = bot.send_chat_action(chat_id, action.clone()).await {
                debug!("send_chat_action failed for chat {}: {err}", chat_id.0);
                return;
            }
            tokio::time::sleep(CHAT_ACTION_HEARTBEAT_INTERVAL).await;
        }
    });

    ChatActionHeartbeat { task_handle }
}

pub fn display_first_name(user: Option<&User>) -> String {
    user.map(|user| user.first_name.trim())
        .filter(|name| !name.is_empty())
        .unwrap_or("there")
        .to_string()
}

/// Telegram rejects messages above 4096 UTF-16 units; stay comfortably below.
pub const TELEGRAM_MAX_LENGTH: usize = 4000;

/// Splits `text` into chunks of at most `limit` UTF-16 units, preferring line breaks.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    // A single astral character needs two units.
    let limit = limit.max(2);
    let mut chunks = Vec::new();
    let mut remaining: Vec<char> = text.chars().collect();

    loop {
        let mut units = 0;
        let mut end = 0;
        while end < remaining.len() && units + remaining[end].len_utf16() <= limit {
            units += remaining[end].len_utf16();
            end += 1;
        }
        if end == remaining.len() {
            break;
        }

        let cut = remaining[..end]
            .iter()
            .rposition(|ch| *ch == '\n')
            .filter(|pos| *pos > 0)
            .map(|pos| pos + 1)
            .unwrap_or(end);
        let chunk: String = remaining[..cut].iter().collect();
        chunks.push(chunk.trim_end_matches('\n').to_string());
        remaining.drain(..cut);
    }

    if !remaining.is_empty() || chunks.is_empty() {
        chunks.push(remaining.into_iter().collect());
    }
    chunks
}
