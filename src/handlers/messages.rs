use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::ChatAction;

use crate::handlers::transport::TelegramTransport;
use crate::pipeline::PipelineReport;
use crate::state::AppState;
use crate::utils::telegram::start_chat_action_heartbeat;
use crate::utils::timing::{start_command_timer, CommandTimer};

fn complete_timer(timer: &mut CommandTimer, report: &PipelineReport) {
    let detail = format!(
        "stage={:?} voice_sent={} reply_chars={} error={}",
        report.stage,
        report.voice_sent,
        report
            .reply
            .as_ref()
            .map(|reply| reply.chars().count())
            .unwrap_or(0),
        report.error.as_deref().unwrap_or("-")
    );
    let status = if report.is_failed() { "error" } else { "success" };
    timer.complete(status, Some(&detail));
}

pub async fn text_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let (Some(user), Some(text)) = (message.from.as_ref(), message.text()) else {
        return Ok(());
    };
    if text.trim_start().starts_with('/') {
        return Ok(());
    }

    let mut timer = start_command_timer("text", &message);
    let _typing = start_chat_action_heartbeat(bot.clone(), message.chat.id, ChatAction::Typing);
    let transport = TelegramTransport::for_message(bot, &message);
    let report = state.pipeline.handle_text(user.id, text, &transport).await;
    complete_timer(&mut timer, &report);
    Ok(())
}

pub async fn voice_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let (Some(user), Some(voice)) = (message.from.as_ref(), message.voice()) else {
        return Ok(());
    };

    let mut timer = start_command_timer("voice", &message);
    let _typing = start_chat_action_heartbeat(bot.clone(), message.chat.id, ChatAction::Typing);
    let transport = TelegramTransport::for_message(bot, &message);
    let report = state
        .pipeline
        .handle_voice(user.id, &voice.file.id.0, &transport)
        .await;
    complete_timer(&mut timer, &report);
    Ok(())
}

pub async fn photo_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let Some(user) = message.from.as_ref() else {
        return Ok(());
    };
    // Telegram lists sizes smallest first.
    let Some(photo) = message.photo().and_then(|sizes| sizes.last()) else {
        return Ok(());
    };

    let mut timer = start_command_timer("photo", &message);
    let _typing = start_chat_action_heartbeat(bot.clone(), message.chat.id, ChatAction::Typing);
    let transport = TelegramTransport::for_message(bot, &message);
    let report = state
        .pipeline
        .handle_photo(user.id, &photo.file.id.0, &transport)
        .await;
    complete_timer(&mut timer, &report);
    Ok(())
}
