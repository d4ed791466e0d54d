use std::future::Future;
use std::time::Instant;

use chrono::{DateTime, Utc};
use teloxide::types::Message;
use tracing::info;

const TEXT_PREVIEW_LIMIT: usize = 120;

#[derive(Debug)]
pub struct CommandTimer {
    command: String,
    chat_id: i64,
    user_id: Option<u64>,
    message_id: i32,
    text: Option<String>,
    started_at: DateTime<Utc>,
    started_perf: Instant,
    completed: bool,
}

impl CommandTimer {
    pub fn from_message(command: &str, message: &Message) -> Self {
        let text = message.text().map(|value| {
            let flattened = value.replace('\n', " ");
            if flattened.chars().count() > TEXT_PREVIEW_LIMIT {
                flattened.chars().take(TEXT_PREVIEW_LIMIT).collect()
            } else {
                flattened
            }
        });

        CommandTimer {
            command: command.to_string(),
            chat_id: message.chat.id.0,
            user_id: message.from.as_ref().map(|user| user.id.0),
            message_id: message.id.0,
            text,
            started_at: Utc::now(),
            started_perf: Instant::now(),
            completed: false,
        }
    }

    fn received_line(&self) -> String {
        format!(
            "event=command_received command={} chat_id={} user_id={:?} message_id={} received_at={} text={:?}",
            self.command,
            self.chat_id,
            self.user_id,
            self.message_id,
            self.started_at.to_rfc3339(),
            self.text
        )
    }

    fn completed_line(&self, status: &str, detail: Option<&str>) -> String {
        format!(
            "event=command_completed command={} chat_id={} user_id={:?} message_id={} started_at={} completed_at={} duration_s={:.3} status={} detail={}",
            self.command,
            self.chat_id,
            self.user_id,
            self.message_id,
            self.started_at.to_rfc3339(),
            Utc::now().to_rfc3339(),
            self.started_perf.elapsed().as_secs_f64(),
            status,
            detail.unwrap_or_default()
        )
    }

    fn log_received(&self) {
        info!(target: "bot.timing", "{}", self.received_line());
    }

    pub fn complete(&mut self, status: &str, detail: Option<&str>) {
        if self.completed {
            return;
        }
        self.completed = true;
        info!(target: "bot.timing", "{}", self.completed_line(status, detail));
    }
}

impl Drop for CommandTimer {
    fn drop(&mut self) {
        self.complete("dropped", None);
    }
}

pub fn start_command_timer(command: &str, message: &Message) -> CommandTimer {
    let timer = CommandTimer::from_message(command, message);
    timer.log_received();
    timer
}

pub async fn log_llm_timing<T, E, F, Fut>(
    provider: &str,
    model: &str,
    operation: &str,
    call: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let started_at = Utc::now();
    let started_perf = Instant::now();
    info!(
        target: "bot.timing",
        "event=llm_request provider={} model={} operation={} started_at={}",
        provider,
        model,
        operation,
        started_at.to_rfc3339()
    );

    let result = call().await;
    let status = if result.is_ok() { "success" } else { "error" };

    info!(
        target: "bot.timing",
        "event=llm_response provider={} model={} operation={} completed_at={} duration_s={:.3} status={}",
        provider,
        model,
        operation,
        Utc::now().to_rfc3339(),
        started_perf.elapsed().as_secs_f64(),
        status
    );

    result
}
