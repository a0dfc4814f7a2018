//! Format keyboard button presses

use super::delivery::{spawn_delivery, DeliveryJob};
use super::pending::PendingLinks;
use super::resilient::{edit_status, report};
use super::stats::DownloadStats;
use super::views::{self, CallbackAction, CallbackPayload};
use crate::config::Settings;
use crate::downloader::{MediaExtractor, MediaFormat};
use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use tracing::{debug, info};

/// Where a button press leads once the payload and pending link are resolved
#[derive(Debug, PartialEq, Eq)]
enum Resolution {
    Cancel,
    Expired,
    Download { format: MediaFormat, url: String },
}

fn resolve(payload: CallbackPayload, pending_url: Option<String>) -> Resolution {
    match payload.action {
        CallbackAction::Cancel => Resolution::Cancel,
        CallbackAction::Download(format) => match payload.url.or(pending_url) {
            // Stale keyboards may still offer audio for stories
            Some(url) if !format.supports_link(&url) => Resolution::Download {
                format: MediaFormat::BestVideo,
                url,
            },
            Some(url) => Resolution::Download { format, url },
            None => Resolution::Expired,
        },
    }
}

/// Resolve a press, consuming the pending link only when the press relies on it.
///
/// Buttons carrying their own URL leave the pending link alone, so pressing an
/// older keyboard does not void the keyboard of a newer, longer link.
async fn resolve_press(
    payload: CallbackPayload,
    user_id: i64,
    pending: &PendingLinks,
) -> Resolution {
    let needs_pending = payload.url.is_none() || matches!(payload.action, CallbackAction::Cancel);
    let pending_url = if needs_pending {
        pending.take(user_id).await
    } else {
        None
    };
    resolve(payload, pending_url)
}

/// Handle a press on the format keyboard.
///
/// The callback is always answered. Presses that rely on the pending link
/// consume it, so each such keyboard triggers at most one download.
///
/// # Errors
///
/// Returns an error if the callback carries no message to reply to.
pub async fn handle_format_callback(
    bot: Bot,
    q: CallbackQuery,
    pending: PendingLinks,
    extractor: Arc<dyn MediaExtractor>,
    settings: Arc<Settings>,
    stats: Arc<DownloadStats>,
) -> Result<()> {
    let _ = bot.answer_callback_query(q.id.clone()).await;

    let Some(payload) = q.data.as_deref().and_then(CallbackPayload::parse) else {
        debug!(data = ?q.data, "Ignoring unknown callback payload");
        return Ok(());
    };

    let (chat_id, msg_id) = q
        .message
        .as_ref()
        .map(|msg| (msg.chat().id, msg.id()))
        .ok_or_else(|| anyhow::anyhow!("Callback message missing chat id"))?;

    let user_id = q.from.id.0.cast_signed();

    match resolve_press(payload, user_id, &pending).await {
        Resolution::Cancel => {
            info!(user_id, "Format choice cancelled");
            edit_status(&bot, chat_id, msg_id, views::cancelled()).await;
        }
        Resolution::Expired => {
            report(&bot, chat_id, msg_id, views::link_expired()).await;
        }
        Resolution::Download { format, url } => {
            info!(user_id, url = %url, format = format.tag(), "Format chosen");
            // Dropping the keyboard here stops a second press on the same message
            edit_status(&bot, chat_id, msg_id, views::processing()).await;
            let job = DeliveryJob {
                chat_id,
                status_id: msg_id,
                url,
                format,
            };
            spawn_delivery(bot, job, extractor, settings, stats);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(data: &str) -> CallbackPayload {
        CallbackPayload::parse(data).expect("known payload")
    }

    #[test]
    fn test_inline_url_wins() {
        let got = resolve(
            payload("720|https://a.example/inline"),
            Some("https://a.example/pending".to_string()),
        );
        assert_eq!(
            got,
            Resolution::Download {
                format: MediaFormat::Video720,
                url: "https://a.example/inline".to_string()
            }
        );
    }

    #[test]
    fn test_bare_tag_uses_pending_link() {
        let got = resolve(payload("audio"), Some("https://a.example/long".to_string()));
        assert_eq!(
            got,
            Resolution::Download {
                format: MediaFormat::Audio,
                url: "https://a.example/long".to_string()
            }
        );
    }

    #[test]
    fn test_bare_tag_without_pending_link_expires() {
        assert_eq!(resolve(payload("best"), None), Resolution::Expired);
    }

    #[test]
    fn test_audio_press_on_stories_falls_back_to_video() {
        let got = resolve(
            payload("audio"),
            Some("https://www.instagram.com/stories/someone/".to_string()),
        );
        assert_eq!(
            got,
            Resolution::Download {
                format: MediaFormat::BestVideo,
                url: "https://www.instagram.com/stories/someone/".to_string()
            }
        );
    }

    #[test]
    fn test_cancel_ignores_links() {
        let got = resolve(payload("cancel"), Some("https://a.example/x".to_string()));
        assert_eq!(got, Resolution::Cancel);
    }

    #[tokio::test]
    async fn test_inline_press_keeps_newer_pending_link() {
        let pending = PendingLinks::new(60, 100);
        pending
            .put(1, "https://a.example/long-link-b".to_string())
            .await;

        // Older keyboard for a short link A
        let first = resolve_press(payload("best|https://a.example/a"), 1, &pending).await;
        assert_eq!(
            first,
            Resolution::Download {
                format: MediaFormat::BestVideo,
                url: "https://a.example/a".to_string()
            }
        );

        // Keyboard for B still works
        let second = resolve_press(payload("720"), 1, &pending).await;
        assert_eq!(
            second,
            Resolution::Download {
                format: MediaFormat::Video720,
                url: "https://a.example/long-link-b".to_string()
            }
        );

        // and only once
        assert_eq!(resolve_press(payload("720"), 1, &pending).await, Resolution::Expired);
    }

    #[tokio::test]
    async fn test_cancel_clears_pending_link() {
        let pending = PendingLinks::new(60, 100);
        pending.put(1, "https://a.example/b".to_string()).await;

        assert_eq!(resolve_press(payload("cancel"), 1, &pending).await, Resolution::Cancel);
        assert_eq!(resolve_press(payload("best"), 1, &pending).await, Resolution::Expired);
    }
}
