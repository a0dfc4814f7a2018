//! View layer: message texts, the format keyboard and callback payloads.
//!
//! Every text returned here is Telegram HTML; dynamic parts are escaped.

use crate::config::TELEGRAM_MESSAGE_SAFE_LEN;
use crate::downloader::{DownloadError, FailureKind, MediaFormat};
use crate::utils::truncate_str;
use html_escape::encode_text;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

// ─────────────────────────────────────────────────────────────────────────────
// Callback payloads
// ─────────────────────────────────────────────────────────────────────────────

/// Telegram rejects callback data longer than this many bytes
pub const CALLBACK_DATA_LIMIT: usize = 64;
/// Escaped error detail budget; leaves room for the headline under the message limit
const ERROR_DETAIL_MAX_CHARS: usize = TELEGRAM_MESSAGE_SAFE_LEN - 500;
/// Callback tag of the cancel button
pub const CALLBACK_CANCEL: &str = "cancel";
/// Separator between action tag and inline URL
const CALLBACK_SEPARATOR: char = '|';

/// What a pressed button asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    /// Download in the given format
    Download(MediaFormat),
    /// Drop the pending link
    Cancel,
}

impl CallbackAction {
    fn tag(self) -> &'static str {
        match self {
            Self::Download(format) => format.tag(),
            Self::Cancel => CALLBACK_CANCEL,
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        if tag == CALLBACK_CANCEL {
            Some(Self::Cancel)
        } else {
            MediaFormat::from_tag(tag).map(Self::Download)
        }
    }
}

/// Decoded callback data: `action|url`, or a bare `action` resolved against the pending link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackPayload {
    /// Requested action
    pub action: CallbackAction,
    /// URL carried inline, when it fit
    pub url: Option<String>,
}

impl CallbackPayload {
    /// Encode `action` with `url` inline if the result fits the callback limit,
    /// otherwise just the action tag.
    #[must_use]
    pub fn encode(action: CallbackAction, url: &str) -> String {
        let tag = action.tag();
        if matches!(action, CallbackAction::Cancel) || url.contains(CALLBACK_SEPARATOR) {
            return tag.to_string();
        }

        let inline = format!("{tag}{CALLBACK_SEPARATOR}{url}");
        if inline.len() <= CALLBACK_DATA_LIMIT {
            inline
        } else {
            tag.to_string()
        }
    }

    /// Parse callback data; unknown tags yield `None`.
    #[must_use]
    pub fn parse(data: &str) -> Option<Self> {
        let (tag, url) = match data.split_once(CALLBACK_SEPARATOR) {
            Some((tag, url)) => (tag, Some(url.trim()).filter(|u| !u.is_empty())),
            None => (data, None),
        };

        Some(Self {
            action: CallbackAction::from_tag(tag)?,
            url: url.map(ToString::to_string),
        })
    }
}

/// Inline keyboard offered for a freshly sent link
#[must_use]
pub fn format_keyboard(url: &str) -> InlineKeyboardMarkup {
    let button = |label: &str, action: CallbackAction| {
        InlineKeyboardButton::callback(label.to_string(), CallbackPayload::encode(action, url))
    };

    let mut second_row = Vec::with_capacity(2);
    if MediaFormat::Audio.supports_link(url) {
        second_row.push(button("🎵 Audio (MP3)", CallbackAction::Download(MediaFormat::Audio)));
    }
    second_row.push(button("📄 As file", CallbackAction::Download(MediaFormat::File)));

    InlineKeyboardMarkup::new(vec![
        vec![
            button("🎬 Best quality", CallbackAction::Download(MediaFormat::BestVideo)),
            button("📺 720p", CallbackAction::Download(MediaFormat::Video720)),
            button("📱 480p", CallbackAction::Download(MediaFormat::Video480)),
        ],
        second_row,
        vec![button("✖️ Cancel", CallbackAction::Cancel)],
    ])
}

// ─────────────────────────────────────────────────────────────────────────────
// Texts
// ─────────────────────────────────────────────────────────────────────────────

/// Welcome text for `/start`
#[must_use]
pub fn welcome(user_id: u64, first_name: &str) -> String {
    format!(
        "Hi <a href=\"tg://user?id={user_id}\">{}</a>! 👋\n\n\
         I am your personal media downloader bot.\n\n\
         ➡️ <b>To download a video:</b> just send me the link and pick a format.\n\
         ➡️ <b>To download audio only:</b> send /audio &lt;link&gt;\n\n\
         Powered by yt-dlp.",
        encode_text(first_name)
    )
}

/// Prompt shown above the format keyboard
#[must_use]
pub fn choose_format(url: &str) -> String {
    format!(
        "🔗 <code>{}</code>\n\nChoose a format:",
        encode_text(&truncate_str(url, 300))
    )
}

/// Reply for text without a link
#[must_use]
pub const fn no_link_found() -> &'static str {
    "Send me a link starting with http:// or https:// and I will fetch the media for you."
}

/// Usage hint for `/audio` without an argument
#[must_use]
pub const fn audio_usage() -> &'static str {
    "Please provide a link after the /audio command.\nExample: /audio https://youtu.be/dQw4w9WgXcQ"
}

/// `/audio` with a stories link
#[must_use]
pub const fn audio_not_available() -> &'static str {
    "Stories have no audio-only download. Send the link without /audio and pick a format."
}

/// Status: request accepted
#[must_use]
pub const fn processing() -> &'static str {
    "🔗 Processing your link..."
}

/// Status: yt-dlp running
#[must_use]
pub const fn downloading() -> &'static str {
    "📥 Downloading, please wait..."
}

/// Status: uploading to Telegram
#[must_use]
pub const fn uploading() -> &'static str {
    "⬆️ Uploading to Telegram..."
}

/// The keyboard was dismissed
#[must_use]
pub const fn cancelled() -> &'static str {
    "✖️ Cancelled."
}

/// Button pressed but the pending link is gone
#[must_use]
pub const fn link_expired() -> &'static str {
    "⌛️ This link has expired. Please send it again."
}

/// Reply for users outside the access list
#[must_use]
pub const fn access_denied() -> &'static str {
    "⛔️ Access denied"
}

/// User-facing report for a failed download, with the raw error echoed back
#[must_use]
pub fn download_failed(error: &DownloadError) -> String {
    let headline = match error {
        DownloadError::Failed { kind, .. } => match kind {
            FailureKind::Unavailable => {
                "Sorry, I couldn't download from that link. The media is private, removed, region-locked or too large."
            }
            FailureKind::Unsupported => "Sorry, this link is not supported.",
            FailureKind::AuthRequired => {
                "Sorry, this media requires a signed-in account to download."
            }
            FailureKind::Transient => {
                "The source did not respond properly. Please try again in a minute."
            }
            FailureKind::Other => "Sorry, I couldn't download from that link.",
        },
        DownloadError::Timeout(_) => "The download took too long and was stopped.",
        DownloadError::MissingOutput => "The download finished but no file was produced.",
        DownloadError::TooLarge { .. } => "The file is too large to send via Telegram.",
        DownloadError::Spawn(_) | DownloadError::Io(_) => {
            "The downloader is not available right now."
        }
    };

    format!("❌ {headline}\n\n{}", code_block(&error.to_string()))
}

/// Report for an error outside the download itself (upload, filesystem)
#[must_use]
pub fn unexpected_error(error: &str) -> String {
    format!("❌ An unexpected error occurred:\n\n{}", code_block(error))
}

/// `/stats` output
#[must_use]
pub fn stats(completed: u64, failed: u64, pending: u64) -> String {
    format!(
        "<b>📊 Bot Statistics</b>\n\n\
         • Completed downloads: {completed}\n\
         • Failed downloads: {failed}\n\
         • Links waiting for a format: {pending}"
    )
}

fn code_block(raw: &str) -> String {
    format!(
        "<code>{}</code>",
        truncate_escaped(&encode_text(raw), ERROR_DETAIL_MAX_CHARS)
    )
}

/// Cut already escaped text to `max_chars` without splitting an entity such as `&amp;`
fn truncate_escaped(escaped: &str, max_chars: usize) -> String {
    let cut = truncate_str(escaped, max_chars);
    if cut.len() == escaped.len() {
        return cut;
    }
    let cut = match cut.rfind('&') {
        Some(amp) if !cut[amp..].contains(';') => &cut[..amp],
        _ => cut.as_str(),
    };
    format!("{cut}...")
}
