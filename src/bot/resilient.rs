//! Status-message plumbing with automatic retry for Telegram API operations.
//!
//! Every request shows a single status message that is edited as the
//! download progresses and deleted at the end. These wrappers retry
//! transient network failures (see [`crate::utils::retry_telegram_operation`])
//! and report "not modified" edits as [`EditOutcome::Unchanged`].
//!
//! # Usage
//!
//! ```ignore
//! use media_fetch_bot::bot::resilient::{send_status, edit_status};
//!
//! let status = send_status(&bot, chat_id, "🔗 Processing your link...").await?;
//! edit_status(&bot, chat_id, status.id, "📥 Downloading, please wait...").await;
//! ```

use crate::config::TELEGRAM_MESSAGE_SAFE_LEN;
use crate::utils::{retry_telegram_operation, truncate_str};
use anyhow::{Context, Result};
use teloxide::prelude::*;
use teloxide::types::{ChatId, Message, MessageId, ParseMode};
use teloxide::{ApiError, RequestError};
use tracing::{debug, warn};

/// Result of [`edit_status`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// The message now shows the new text
    Edited,
    /// The message already showed this text
    Unchanged,
    /// The message is gone or the edit failed after retries
    Failed,
}

impl EditOutcome {
    /// Whether the user can see the requested text
    #[must_use]
    pub const fn is_shown(self) -> bool {
        matches!(self, Self::Edited | Self::Unchanged)
    }

    fn from_error(error: &anyhow::Error) -> Self {
        const ERROR_NOT_MODIFIED: &str = "message is not modified";

        match error.downcast_ref::<RequestError>() {
            Some(RequestError::Api(ApiError::MessageNotModified)) => Self::Unchanged,
            Some(RequestError::Api(ApiError::MessageToEditNotFound)) => Self::Failed,
            _ if format!("{error:#}").contains(ERROR_NOT_MODIFIED) => Self::Unchanged,
            _ => Self::Failed,
        }
    }
}

/// Keep text under the safe message length
fn fit_message(text: &str) -> String {
    if text.chars().count() > TELEGRAM_MESSAGE_SAFE_LEN {
        format!("{}...", truncate_str(text, TELEGRAM_MESSAGE_SAFE_LEN))
    } else {
        text.to_string()
    }
}

/// Send an HTML status message with automatic retry on network failures.
///
/// # Errors
///
/// Returns an error after all retries are exhausted.
pub async fn send_status(bot: &Bot, chat_id: ChatId, text: impl Into<String>) -> Result<Message> {
    let text = fit_message(&text.into());
    retry_telegram_operation(|| async {
        bot.send_message(chat_id, text.clone())
            .parse_mode(ParseMode::Html)
            .await
            .context("Telegram send error")
    })
    .await
}

/// Edit a message with automatic retry on network failures.
///
/// Editing text without a reply markup also removes an inline keyboard.
///
/// # Errors
///
/// Returns an error after all retries are exhausted.
pub async fn edit_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    msg_id: MessageId,
    text: impl Into<String>,
) -> Result<Message> {
    let text = text.into();
    retry_telegram_operation(|| async {
        bot.edit_message_text(chat_id, msg_id, text.clone())
            .parse_mode(ParseMode::Html)
            .await
            .context("Telegram edit error")
    })
    .await
}

/// Edit a status message with graceful degradation.
///
/// Truncates overly long text and retries transient errors. "Not modified"
/// counts as [`EditOutcome::Unchanged`]; any other failure is logged.
pub async fn edit_status(
    bot: &Bot,
    chat_id: ChatId,
    msg_id: MessageId,
    text: &str,
) -> EditOutcome {
    match edit_message_resilient(bot, chat_id, msg_id, fit_message(text)).await {
        Ok(_) => EditOutcome::Edited,
        Err(e) => {
            let outcome = EditOutcome::from_error(&e);
            match outcome {
                EditOutcome::Unchanged => debug!("Status update skipped: {e:#}"),
                _ => warn!("Failed to edit status message: {e:#}"),
            }
            outcome
        }
    }
}

/// Replace the status message with `text`, or send `text` as a new message
/// when the status message can no longer be edited.
pub async fn report(bot: &Bot, chat_id: ChatId, msg_id: MessageId, text: &str) {
    if edit_status(bot, chat_id, msg_id, text).await.is_shown() {
        return;
    }
    if let Err(e) = send_status(bot, chat_id, text).await {
        warn!("Failed to report to chat {chat_id}: {e:#}");
    }
}

/// Delete the status message; failures are only logged.
pub async fn delete_status(bot: &Bot, chat_id: ChatId, msg_id: MessageId) {
    if let Err(e) = bot.delete_message(chat_id, msg_id).await {
        debug!("Could not delete status message: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(e: ApiError) -> anyhow::Error {
        anyhow::Error::new(RequestError::Api(e)).context("Telegram edit error")
    }

    #[test]
    fn test_not_modified_counts_as_shown() {
        let outcome = EditOutcome::from_error(&api_error(ApiError::MessageNotModified));
        assert_eq!(outcome, EditOutcome::Unchanged);
        assert!(outcome.is_shown());
    }

    #[test]
    fn test_missing_message_needs_fresh_send() {
        let outcome = EditOutcome::from_error(&api_error(ApiError::MessageToEditNotFound));
        assert_eq!(outcome, EditOutcome::Failed);
        assert!(!outcome.is_shown());
    }

    #[test]
    fn test_network_failure_is_failed() {
        let outcome = EditOutcome::from_error(&anyhow::anyhow!("connection reset"));
        assert_eq!(outcome, EditOutcome::Failed);
    }

    #[test]
    fn test_fit_message() {
        let long = "x".repeat(TELEGRAM_MESSAGE_SAFE_LEN + 10);
        assert_eq!(fit_message(&long).chars().count(), TELEGRAM_MESSAGE_SAFE_LEN + 3);
        assert_eq!(fit_message("short"), "short");
    }
}
