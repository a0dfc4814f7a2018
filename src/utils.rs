//! Utility functions for link extraction, text truncation and Telegram retries.
//!
//! Regex patterns are compiled with `lazy-regex`, so they are validated at
//! compile time and initialised on first use.

// lazy_regex! builds on once_cell internally
#![allow(clippy::non_std_lazy_statics)]

use anyhow::Result;
use lazy_regex::lazy_regex;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, warn};

/// First `http://` or `https://` link in a message, up to whitespace
static RE_HTTP_LINK: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"https?://[^\s<>]+");

/// Extracts the first http(s) link from free text.
///
/// Trailing punctuation that commonly follows a link in prose is dropped.
///
/// # Examples
///
/// ```
/// use media_fetch_bot::utils::extract_url;
/// let url = extract_url("look: https://youtu.be/dQw4w9WgXcQ!");
/// assert_eq!(url.as_deref(), Some("https://youtu.be/dQw4w9WgXcQ"));
/// assert_eq!(extract_url("no links here"), None);
/// ```
#[must_use]
pub fn extract_url(text: &str) -> Option<String> {
    RE_HTTP_LINK.find(text).map(|m| {
        m.as_str()
            .trim_end_matches(['.', ',', '!', '?', ')', ';', ':', '"', '\''])
            .to_string()
    })
}

/// Safely truncates a string to a maximum character length (not bytes).
///
/// This is UTF-8 safe and will not panic on multi-byte characters.
///
/// # Examples
///
/// ```
/// use media_fetch_bot::utils::truncate_str;
/// let s = "Привет, мир!";
/// assert_eq!(truncate_str(s, 6), "Привет");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

/// Whether retrying cannot help: the Bot API rejected the request itself
/// (message not modified, file too big, bad markup, ...).
///
/// Only errors that keep the [`teloxide::RequestError`] in their chain are
/// recognised; wrap with `anyhow::Error::new(e).context(..)` to keep it.
#[must_use]
pub fn is_permanent_telegram_error(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<teloxide::RequestError>(),
        Some(teloxide::RequestError::Api(_))
    )
}

/// Retry a Telegram API operation with exponential backoff.
///
/// Used for status edits and file uploads, which can fail on transient
/// network errors. Backoff starts at 500ms, caps at 4s, with jitter. After
/// the first attempt up to [`crate::config::TELEGRAM_API_MAX_RETRIES`]
/// retries follow. API rejections (see [`is_permanent_telegram_error`]) are
/// returned immediately.
///
/// # Errors
///
/// Returns the last error if every attempt fails.
///
/// # Examples
///
/// ```no_run
/// use media_fetch_bot::utils::retry_telegram_operation;
/// use anyhow::Result;
///
/// async fn upload() -> Result<()> {
///     Ok(())
/// }
///
/// # async fn example() -> Result<()> {
/// retry_telegram_operation(|| async { upload().await }).await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_telegram_operation<F, Fut, T>(operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    use crate::config::{
        TELEGRAM_API_INITIAL_BACKOFF_MS, TELEGRAM_API_MAX_BACKOFF_MS, TELEGRAM_API_MAX_RETRIES,
    };

    let retry_strategy = ExponentialBackoff::from_millis(TELEGRAM_API_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(TELEGRAM_API_MAX_BACKOFF_MS))
        .map(jitter)
        .take(TELEGRAM_API_MAX_RETRIES);

    RetryIf::spawn(retry_strategy, operation, |e: &anyhow::Error| {
        !is_permanent_telegram_error(e)
    })
    .await
    .map_err(|e| {
        if is_permanent_telegram_error(&e) {
            debug!("Telegram API rejected the request: {e:#}");
        } else {
            warn!(
                "Telegram API operation failed after {} retries: {e:#}",
                TELEGRAM_API_MAX_RETRIES
            );
        }
        e
    })
}
