use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, ReplyParameters, User};
use tracing::info;

use crate::config::{
    NEW_DIALOG_BUTTON, RESET_ANSWER, RESET_CALLBACK_DATA, RESET_CONFIRMATION, START_GREETING,
    VOICE_OFF_CONFIRMATION, VOICE_ON_CONFIRMATION,
};
use crate::state::AppState;
use crate::utils::telegram::display_first_name;

fn new_dialog_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        NEW_DIALOG_BUTTON,
        RESET_CALLBACK_DATA,
    )]])
}

/// Inline-button presses the bot understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Reset,
}

impl CallbackAction {
    pub fn parse(data: Option<&str>) -> Option<Self> {
        match data {
            Some(RESET_CALLBACK_DATA) => Some(CallbackAction::Reset),
            _ => None,
        }
    }
}

fn render_greeting(user: Option<&User>) -> String {
    START_GREETING.replace("{first_name}", &display_first_name(user))
}

pub async fn start_handler(bot: Bot, message: Message) -> Result<()> {
    bot.send_message(message.chat.id, render_greeting(message.from.as_ref()))
        .reply_markup(new_dialog_keyboard())
        .await?;
    Ok(())
}

pub async fn voice_toggle_handler(
    bot: Bot,
    state: AppState,
    message: Message,
    enabled: bool,
) -> Result<()> {
    let Some(user) = message.from.as_ref() else {
        return Ok(());
    };
    state.sessions.set_voice_enabled(user.id, enabled);
    info!("User {} set voice replies to {}", user.id.0, enabled);

    let confirmation = if enabled {
        VOICE_ON_CONFIRMATION
    } else {
        VOICE_OFF_CONFIRMATION
    };
    bot.send_message(message.chat.id, confirmation)
        .reply_parameters(ReplyParameters::new(message.id))
        .await?;
    Ok(())
}

pub async fn reset_callback(bot: Bot, state: AppState, query: CallbackQuery) -> Result<()> {
    state.sessions.reset(query.from.id);
    info!("User {} reset their conversation", query.from.id.0);

    bot.answer_callback_query(query.id.clone())
        .text(RESET_ANSWER)
        .await?;
    if let Some(message) = query.message.as_ref() {
        bot.edit_message_text(message.chat().id, message.id(), RESET_CONFIRMATION)
            .await?;
    }
    Ok(())
}
