use crate::bot::handlers::{self, get_user_id_safe, Command};
use crate::bot::{callbacks, DownloadStats, PendingLinks};
use crate::config::Settings;
use crate::downloader::{MediaExtractor, YtDlp};
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};

/// Run the Telegram bot until Ctrl+C.
pub async fn run_bot(settings: Arc<Settings>) {
    let bot = init_bot(&settings);

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register bot commands: {e}");
    }

    if let Err(e) = tokio::fs::create_dir_all(&settings.download_dir).await {
        error!(
            "Failed to create download directory {}: {e}",
            settings.download_dir.display()
        );
        std::process::exit(1);
    }

    let extractor: Arc<dyn MediaExtractor> = Arc::new(YtDlp::from_settings(&settings));
    let pending = init_pending_links(&settings);
    let stats = Arc::new(DownloadStats::default());
    let handler = setup_handler();

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![settings, extractor, pending, stats])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

fn init_bot(settings: &Settings) -> Bot {
    let bot = Bot::new(settings.telegram_token.clone());

    let Some(api_url) = settings
        .telegram_api_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
    else {
        return bot;
    };

    match api_url.parse::<reqwest::Url>() {
        Ok(url) => {
            info!("Using custom Telegram Bot API server: {url}");
            bot.set_api_url(url)
        }
        Err(e) => {
            warn!("Ignoring invalid TELEGRAM_API_URL '{api_url}': {e}");
            bot
        }
    }
}

fn init_pending_links(settings: &Settings) -> PendingLinks {
    info!(
        "Initializing pending links (ttl: {}s, max_size: {})",
        settings.pending_link_ttl_secs, settings.pending_link_max_entries
    );
    PendingLinks::new(
        settings.pending_link_ttl_secs,
        settings.pending_link_max_entries,
    )
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(
            Update::filter_callback_query()
                .branch(
                    dptree::filter(|q: CallbackQuery, settings: Arc<Settings>| {
                        is_callback_allowed(&q, &settings)
                    })
                    .endpoint(handle_callback),
                )
                .branch(
                    dptree::filter(|q: CallbackQuery, settings: Arc<Settings>| {
                        !is_callback_allowed(&q, &settings)
                    })
                    .endpoint(handle_unauthorized_callback),
                ),
        )
        .branch(
            Update::filter_message().branch(
                // Main branch for authorized users
                dptree::filter(|msg: Message, settings: Arc<Settings>| {
                    settings.is_user_allowed(get_user_id_safe(&msg))
                })
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(handle_command),
                )
                .branch(
                    dptree::filter(|msg: Message| msg.text().is_some()).endpoint(handle_text),
                ),
            ),
        )
        .branch(
            // All who are not in the filter above: unauthorized
            Update::filter_message()
                .filter(|msg: Message, settings: Arc<Settings>| {
                    !settings.is_user_allowed(get_user_id_safe(&msg))
                })
                .endpoint(handle_unauthorized),
        )
}

fn is_callback_allowed(q: &CallbackQuery, settings: &Settings) -> bool {
    settings.is_user_allowed(q.from.id.0.cast_signed())
}

async fn handle_unauthorized_callback(
    bot: Bot,
    q: CallbackQuery,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::handle_unauthorized_callback(bot, q).await {
        error!("Failed to answer unauthorized callback: {}", e);
    }
    respond(())
}

async fn handle_unauthorized(bot: Bot, msg: Message) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::handle_unauthorized(bot, msg).await {
        error!("Failed to send access denied message: {}", e);
    }
    respond(())
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    extractor: Arc<dyn MediaExtractor>,
    settings: Arc<Settings>,
    pending: PendingLinks,
    stats: Arc<DownloadStats>,
) -> Result<(), teloxide::RequestError> {
    let res = match cmd {
        Command::Start => handlers::start(bot, msg).await,
        Command::Help => handlers::help(bot, msg).await,
        Command::Audio(arg) => handlers::audio(bot, msg, arg, extractor, settings, stats).await,
        Command::Healthcheck => handlers::healthcheck(bot, msg).await,
        Command::Stats => handlers::stats(bot, msg, stats, pending).await,
    };
    if let Err(e) = res {
        error!("Command error: {}", e);
    }
    respond(())
}

async fn handle_text(
    bot: Bot,
    msg: Message,
    pending: PendingLinks,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::handle_text(bot, msg, pending).await {
        error!("Text handler error: {}", e);
    }
    respond(())
}

async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    pending: PendingLinks,
    extractor: Arc<dyn MediaExtractor>,
    settings: Arc<Settings>,
    stats: Arc<DownloadStats>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) =
        callbacks::handle_format_callback(bot, q, pending, extractor, settings, stats).await
    {
        error!("Callback handler error: {}", e);
    }
    respond(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(allowed_users: &str) -> Result<Settings, serde_json::Error> {
        serde_json::from_value(serde_json::json!({
            "telegram_token": "123:abc",
            "allowed_users": allowed_users,
        }))
    }

    fn press_from(user_id: u64) -> Result<CallbackQuery, serde_json::Error> {
        serde_json::from_value(serde_json::json!({
            "id": "4382bfdwdsb323b2d9",
            "from": { "id": user_id, "is_bot": false, "first_name": "Ann" },
            "chat_instance": "-1234",
            "data": "best",
        }))
    }

    #[test]
    fn test_callback_access_list() -> Result<(), serde_json::Error> {
        let restricted = settings("111, 222")?;
        assert!(is_callback_allowed(&press_from(111)?, &restricted));
        assert!(!is_callback_allowed(&press_from(333)?, &restricted));

        let open = settings("")?;
        assert!(is_callback_allowed(&press_from(333)?, &open));
        Ok(())
    }
}
