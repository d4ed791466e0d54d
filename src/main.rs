use std::error::Error;
use std::sync::Arc;

use dotenvy::dotenv;
use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};

mod config;
mod handlers;
mod llm;
mod media;
mod pipeline;
mod session;
mod state;
mod utils;

use config::{log_level_from_env, logs_dir_from_env, Config};
use handlers::commands::{self, CallbackAction};
use handlers::messages;
use llm::{AiGateway, OpenAiGateway};
use state::AppState;
use utils::logging::init_logging;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "snake_case", description = "Available commands:")]
enum Command {
    #[command(description = "greet and offer a fresh dialog")]
    Start,
    #[command(description = "answer with voice messages too")]
    VoiceOn,
    #[command(description = "answer with text only")]
    VoiceOff,
}

type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

#[tokio::main]
async fn main() -> HandlerResult {
    dotenv().ok();
    let _guards = init_logging(&log_level_from_env(), &logs_dir_from_env());

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            error!("Configuration error: {err}");
            return Err(err.into());
        }
    };

    let gateway: Arc<dyn AiGateway> = Arc::new(OpenAiGateway::new(&config)?);
    let state = AppState::new(&config, gateway);
    let bot = Bot::new(config.bot_token.clone());
    info!(
        "Starting voice relay bot (chat_model={}, transcribe_model={}, tts_model={}, temp_dir={})",
        config.chat_model,
        config.transcribe_model,
        config.tts_model,
        config.media_temp_dir.display()
    );

    if let Err(err) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register bot commands: {err}");
    }

    let command_handler = dptree::entry()
        .filter_command::<Command>()
        .endpoint(handle_command);

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .branch(
            dptree::filter(|msg: Message| msg.voice().is_some()).endpoint(handle_voice_message),
        )
        .branch(
            dptree::filter(|msg: Message| msg.photo().is_some()).endpoint(handle_photo_message),
        )
        .branch(dptree::filter(|msg: Message| msg.text().is_some()).endpoint(handle_text_message))
        .endpoint(ignore_message);

    let callback_handler = Update::filter_callback_query().endpoint(handle_callback_query);

    let handler = dptree::entry()
        .branch(message_handler)
        .branch(callback_handler);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Voice relay bot stopped");
    Ok(())
}

async fn handle_command(
    bot: Bot,
    state: AppState,
    message: Message,
    command: Command,
) -> HandlerResult {
    match command {
        Command::Start => commands::start_handler(bot, message).await?,
        Command::VoiceOn => commands::voice_toggle_handler(bot, state, message, true).await?,
        Command::VoiceOff => commands::voice_toggle_handler(bot, state, message, false).await?,
    }
    Ok(())
}

async fn handle_callback_query(bot: Bot, state: AppState, query: CallbackQuery) -> HandlerResult {
    match CallbackAction::parse(query.data.as_deref()) {
        Some(CallbackAction::Reset) => commands::reset_callback(bot, state, query).await?,
        None => {
            warn!("Ignoring unknown callback data: {:?}", query.data);
            bot.answer_callback_query(query.id.clone()).await?;
        }
    }
    Ok(())
}

async fn handle_text_message(bot: Bot, state: AppState, message: Message) -> HandlerResult {
    messages::text_handler(bot, state, message).await?;
    Ok(())
}

async fn handle_voice_message(bot: Bot, state: AppState, message: Message) -> HandlerResult {
    messages::voice_handler(bot, state, message).await?;
    Ok(())
}

async fn handle_photo_message(bot: Bot, state: AppState, message: Message) -> HandlerResult {
    messages::photo_handler(bot, state, message).await?;
    Ok(())
}

async fn ignore_message(_message: Message) -> HandlerResult {
    Ok(())
}
