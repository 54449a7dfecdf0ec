use std::sync::Arc;

use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use teloxide::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use rentier::assistant::telegram::{self, BotIdentity, TelegramClient};
use rentier::assistant::{Assistant, SettingsStore};
use rentier::config::Config;

struct BotState {
    assistant: Assistant,
    telegram: TelegramClient,
    identity: BotIdentity,
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "rentier.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let bot = Bot::new(&config.telegram_bot_token);

    // Setup logging
    let log_dir = config.log_dir();
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("rentier.log"))
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file in {}: {e}", log_dir.display());
            std::process::exit(1);
        }
    };
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting rentier...");
    info!("Loaded config from {config_path}");
    info!("Owner IDs: {:?}", config.owner_ids);

    let identity = match bot.get_me().await {
        Ok(me) => {
            info!("Bot user ID: {}, username: @{}", me.id, me.username());
            BotIdentity {
                user_id: me.id.0 as i64,
                username: config
                    .bot_username
                    .clone()
                    .unwrap_or_else(|| me.username().to_string()),
            }
        }
        Err(e) => match &config.bot_username {
            Some(username) => {
                warn!("Failed to get bot info: {e}");
                BotIdentity { user_id: 0, username: username.clone() }
            }
            None => {
                error!("Failed to get bot info and no bot_username configured: {e}");
                std::process::exit(1);
            }
        },
    };

    let store = match SettingsStore::open(&config.database_path()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to open settings at {}: {e}", config.database_path().display());
            std::process::exit(1);
        }
    };
    info!("Settings at {}", config.database_path().display());

    let assistant = Assistant::new(config.assistant_config(&identity.username), store.clone());
    let state = Arc::new(BotState {
        assistant,
        telegram: TelegramClient::new(bot.clone(), config.photo_dir.clone()),
        identity,
    });

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Shutting down");
    match Arc::try_unwrap(store) {
        Ok(store) => {
            if let Err(e) = store.close() {
                error!("Failed to close settings: {e}");
            }
        }
        Err(_) => warn!("Settings still in use at shutdown, not closing explicitly"),
    }
}

async fn handle_message(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(event) = telegram::to_event(&msg, &state.identity) else {
        return Ok(());
    };

    let mut rng = StdRng::from_entropy();
    let outbound = state.assistant.handle(event, Utc::now(), &mut rng).await;
    if outbound.is_empty() {
        return Ok(());
    }

    // Sends of one event stay in order; the dispatcher moves on.
    tokio::spawn(async move {
        for out in &outbound {
            if let Err(e) = state.telegram.deliver(out).await {
                warn!("Failed to send to chat {}: {e}", out.chat_id());
                state.assistant.on_delivery_error(out.chat_id(), &e);
            }
        }
    });

    Ok(())
}
