use std::error::Error;
use std::sync::Arc;

use dotenvy::dotenv;
use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};

mod acl;
mod broadcast;
mod config;
mod cover;
mod db;
mod errors;
mod gate;
mod handlers;
mod messenger;
mod relay;
mod scheduler;
mod state;
#[cfg(test)]
mod testing;
mod utils;

use config::Config;
use db::store::UserStore;
use handlers::{commands, media};
use messenger::{Messenger, TelegramMessenger};
use state::AppState;
use utils::logging::init_logging;
use utils::timing::{complete_command_timer, start_command_timer};

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
enum Command {
    Start,
    Help,
    Ping,
    SetCover,
    ShowCover,
    DelCover,
    AddAdmin(String),
    RemoveAdmin(String),
    ShowAdmins,
    Ban(String),
    Unban(String),
    Users,
    Stats,
    Broadcast,
    DBroadcast(String),
    Restart,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Help => "help",
            Command::Ping => "ping",
            Command::SetCover => "setcover",
            Command::ShowCover => "showcover",
            Command::DelCover => "delcover",
            Command::AddAdmin(_) => "addadmin",
            Command::RemoveAdmin(_) => "removeadmin",
            Command::ShowAdmins => "showadmins",
            Command::Ban(_) => "ban",
            Command::Unban(_) => "unban",
            Command::Users => "users",
            Command::Stats => "stats",
            Command::Broadcast => "broadcast",
            Command::DBroadcast(_) => "dbroadcast",
            Command::Restart => "restart",
        }
    }
}

type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

#[tokio::main]
async fn main() -> HandlerResult {
    dotenv().ok();
    let config = Config::load()?;
    let _guards = init_logging(&config.log_dir, &config.log_level);

    let bot = Bot::new(config.bot_token.clone());
    info!("Starting coverbot");

    let store = UserStore::open(config.data_file.clone()).await?;
    info!(
        "Loaded {} users from {}",
        store.user_ids().len(),
        config.data_file.display()
    );
    let messenger: Arc<dyn Messenger> = Arc::new(TelegramMessenger::new(bot.clone()));
    let state = AppState::new(config, store, messenger.clone());
    let _deletion_task = state.deletions.spawn(messenger);
    info!(
        "Force-subscribe channel: {}",
        state.gate.channel().unwrap_or("disabled")
    );

    let command_handler = dptree::entry()
        .filter_command::<Command>()
        .endpoint(handle_command);

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .branch(dptree::filter(|msg: Message| msg.photo().is_some()).endpoint(handle_image))
        .branch(
            dptree::filter(|msg: Message| {
                msg.video().is_some() || msg.document().is_some() || msg.audio().is_some()
            })
            .endpoint(handle_media),
        )
        .endpoint(ignore_message);

    let callback_handler = Update::filter_callback_query().endpoint(handle_callback_query);

    let handler = dptree::entry()
        .branch(message_handler)
        .branch(callback_handler);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state.clone()])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    if !state.deletions.is_empty() {
        warn!(
            "{} scheduled deletions dropped on shutdown",
            state.deletions.len()
        );
    }
    if let Err(err) = state.store.flush().await {
        error!("Failed to flush store on shutdown: {err}");
    }
    info!("coverbot stopped");
    Ok(())
}

async fn handle_command(
    bot: Bot,
    state: AppState,
    message: Message,
    command: Command,
) -> HandlerResult {
    let name = command.name();
    let mut timer = start_command_timer(name, &message);
    let result = match command {
        Command::Start => commands::start_handler(bot, state, message).await,
        Command::Help => commands::help_handler(bot, state, message).await,
        Command::Ping => commands::ping_handler(bot, state, message).await,
        Command::SetCover => commands::setcover_handler(bot, state, message).await,
        Command::ShowCover => commands::showcover_handler(bot, state, message).await,
        Command::DelCover => commands::delcover_handler(bot, state, message).await,
        Command::AddAdmin(arg) => commands::addadmin_handler(bot, state, message, arg).await,
        Command::RemoveAdmin(arg) => {
            commands::removeadmin_handler(bot, state, message, arg).await
        }
        Command::ShowAdmins => commands::showadmins_handler(bot, state, message).await,
        Command::Ban(arg) => commands::ban_handler(bot, state, message, arg).await,
        Command::Unban(arg) => commands::unban_handler(bot, state, message, arg).await,
        Command::Users => commands::users_handler(bot, state, message).await,
        Command::Stats => commands::stats_handler(bot, state, message).await,
        Command::Broadcast => commands::broadcast_handler(bot, state, message).await,
        Command::DBroadcast(arg) => commands::dbroadcast_handler(bot, state, message, arg).await,
        Command::Restart => commands::restart_handler(bot, state, message).await,
    };
    if let Err(err) = result {
        error!("{name} handler failed: {err}");
        complete_command_timer(&mut timer, "error", Some(err.to_string()));
    }
    Ok(())
}

async fn handle_image(bot: Bot, state: AppState, message: Message) -> HandlerResult {
    if let Err(err) = media::image_handler(bot, state, message).await {
        error!("image handler failed: {err}");
    }
    Ok(())
}

async fn handle_media(bot: Bot, state: AppState, message: Message) -> HandlerResult {
    if let Err(err) = media::media_handler(bot, state, message).await {
        error!("media handler failed: {err}");
    }
    Ok(())
}

async fn handle_callback_query(bot: Bot, state: AppState, query: CallbackQuery) -> HandlerResult {
    if let Err(err) = commands::cover_callback(bot, state, query).await {
        error!("cover callback failed: {err}");
    }
    Ok(())
}

async fn ignore_message(_message: Message) -> HandlerResult {
    Ok(())
}
