use super::delivery::{spawn_delivery, DeliveryJob};
use super::pending::PendingLinks;
use super::resilient::send_status;
use super::stats::DownloadStats;
use super::views;
use crate::config::Settings;
use crate::downloader::{MediaExtractor, MediaFormat};
use crate::utils::extract_url;
use anyhow::Result;
use std::sync::Arc;
use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message, ParseMode},
    utils::command::BotCommands,
};
use tracing::info;

// Helper function to get user name from Message
fn get_user_name(msg: &Message) -> String {
    if let Some(ref user) = msg.from {
        if let Some(ref username) = user.username {
            return username.clone();
        }
        if !user.first_name.is_empty() {
            return user.first_name.clone();
        }
    }
    "Unknown".to_string()
}

/// Get user ID safely from a message; `0` for anonymous senders
#[must_use]
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

/// Bot commands
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Show the welcome message
    #[command(description = "Start the bot.")]
    Start,
    /// Show the command list
    #[command(description = "Show this help.")]
    Help,
    /// Download audio straight away
    #[command(description = "Download audio only: /audio <link>")]
    Audio(String),
    /// Liveness probe
    #[command(description = "Check bot health.")]
    Healthcheck,
    /// Download counters
    #[command(description = "Show bot statistics.")]
    Stats,
}

/// Start command handler
///
/// # Errors
///
/// Returns an error if the welcome message cannot be sent.
pub async fn start(bot: Bot, msg: Message) -> Result<()> {
    let user_name = get_user_name(&msg);
    let (user_id, first_name) = msg
        .from
        .as_ref()
        .map_or((0, "there".to_string()), |u| (u.id.0, u.first_name.clone()));

    info!("User {user_id} ({user_name}) initiated /start command.");

    bot.send_message(msg.chat.id, views::welcome(user_id, &first_name))
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

/// Help command handler
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn help(bot: Bot, msg: Message) -> Result<()> {
    bot.send_message(msg.chat.id, Command::descriptions().to_string())
        .await?;
    Ok(())
}

/// Healthcheck handler
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn healthcheck(bot: Bot, msg: Message) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    info!("Healthcheck command received from user {user_id}.");
    bot.send_message(msg.chat.id, "OK").await?;
    Ok(())
}

/// Stats handler
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn stats(
    bot: Bot,
    msg: Message,
    stats: Arc<DownloadStats>,
    pending: PendingLinks,
) -> Result<()> {
    let text = views::stats(stats.completed(), stats.failed(), pending.len());
    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

/// `/audio <link>`: download audio without showing the keyboard
///
/// # Errors
///
/// Returns an error if the status message cannot be sent.
pub async fn audio(
    bot: Bot,
    msg: Message,
    arg: String,
    extractor: Arc<dyn MediaExtractor>,
    settings: Arc<Settings>,
    stats: Arc<DownloadStats>,
) -> Result<()> {
    let Some(url) = extract_url(&arg) else {
        bot.send_message(msg.chat.id, views::audio_usage()).await?;
        return Ok(());
    };

    if !MediaFormat::Audio.supports_link(&url) {
        bot.send_message(msg.chat.id, views::audio_not_available())
            .await?;
        return Ok(());
    }

    info!(user_id = get_user_id_safe(&msg), url = %url, "Audio request");

    let status = send_status(&bot, msg.chat.id, views::processing()).await?;
    let job = DeliveryJob {
        chat_id: msg.chat.id,
        status_id: status.id,
        url,
        format: MediaFormat::Audio,
    };
    spawn_delivery(bot, job, extractor, settings, stats);
    Ok(())
}

/// Plain text: remember the link and offer the format keyboard
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn handle_text(bot: Bot, msg: Message, pending: PendingLinks) -> Result<()> {
    let text = msg.text().unwrap_or_default();

    let Some(url) = extract_url(text) else {
        bot.send_message(msg.chat.id, views::no_link_found()).await?;
        return Ok(());
    };

    let user_id = get_user_id_safe(&msg);
    info!(user_id, url = %url, "Link received");

    let keyboard = views::format_keyboard(&url);
    bot.send_message(msg.chat.id, views::choose_format(&url))
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboard)
        .await?;

    pending.put(user_id, url).await;
    Ok(())
}

/// Reply for users outside the access list
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn handle_unauthorized(bot: Bot, msg: Message) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    info!(
        "⛔️ Unauthorized access from user {} ({}).",
        user_id,
        get_user_name(&msg)
    );
    bot.send_message(msg.chat.id, views::access_denied()).await?;
    Ok(())
}

/// Answer a button press from a user outside the access list
///
/// # Errors
///
/// Returns an error if the callback cannot be answered.
pub async fn handle_unauthorized_callback(bot: Bot, q: CallbackQuery) -> Result<()> {
    info!("⛔️ Unauthorized button press from user {}.", q.from.id);
    bot.answer_callback_query(q.id)
        .text(views::access_denied())
        .show_alert(true)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_command_parses_argument() {
        let cmd = Command::parse("/audio https://youtu.be/abc", "media_bot");
        assert!(matches!(cmd, Ok(Command::Audio(ref url)) if url == "https://youtu.be/abc"));
    }

    #[test]
    fn test_audio_command_without_argument() {
        let cmd = Command::parse("/audio", "media_bot");
        assert!(matches!(cmd, Ok(Command::Audio(ref url)) if url.is_empty()));
    }

    #[test]
    fn test_descriptions_list_commands() {
        let text = Command::descriptions().to_string();
        for name in ["/start", "/help", "/audio", "/healthcheck", "/stats"] {
            assert!(text.contains(name), "missing {name}");
        }
    }
}
