//! Media extraction
//!
//! The bot never talks to media sites itself: every download goes through a
//! [`MediaExtractor`], and the production extractor runs yt-dlp as a child
//! process.

mod error;
/// yt-dlp process wrapper
pub mod ytdlp;

pub use error::{DownloadError, FailureKind};
pub use ytdlp::YtDlp;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Format the user picked for a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFormat {
    /// Best MP4 video with merged audio
    BestVideo,
    /// Video capped at 720p
    Video720,
    /// Video capped at 480p
    Video480,
    /// Audio only, converted to MP3
    Audio,
    /// Best video, delivered as a document
    File,
}

impl MediaFormat {
    /// All formats in keyboard order
    pub const ALL: [Self; 5] = [
        Self::BestVideo,
        Self::Video720,
        Self::Video480,
        Self::Audio,
        Self::File,
    ];

    /// Short tag used in callback payloads
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::BestVideo => "best",
            Self::Video720 => "720",
            Self::Video480 => "480",
            Self::Audio => "audio",
            Self::File => "file",
        }
    }

    /// Inverse of [`MediaFormat::tag`]
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.tag() == tag)
    }

    /// yt-dlp `-f` selector
    #[must_use]
    pub const fn selector(self) -> &'static str {
        match self {
            Self::BestVideo | Self::File => "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best",
            Self::Video720 => {
                "bestvideo[height<=720][ext=mp4]+bestaudio[ext=m4a]/best[height<=720][ext=mp4]/best[height<=720]/best"
            }
            Self::Video480 => {
                "bestvideo[height<=480][ext=mp4]+bestaudio[ext=m4a]/best[height<=480][ext=mp4]/best[height<=480]/best"
            }
            Self::Audio => "bestaudio/best",
        }
    }

    /// Whether yt-dlp should extract audio to MP3
    #[must_use]
    pub const fn is_audio(self) -> bool {
        matches!(self, Self::Audio)
    }

    /// Whether this format makes sense for `url`; stories mix photos and
    /// clips, so they have no audio-only download
    #[must_use]
    pub fn supports_link(self, url: &str) -> bool {
        !(self.is_audio() && is_stories_link(url))
    }
}

/// How a produced file is sent to Telegram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// `sendVideo`
    Video,
    /// `sendAudio`
    Audio,
    /// `sendPhoto`
    Photo,
    /// `sendDocument`
    Document,
}

impl MediaKind {
    /// Pick the upload method for a file.
    ///
    /// The file format forces a document and the audio format forces audio,
    /// except for images, which are never sent as audio. Otherwise the
    /// extension decides, which is what lets a stories playlist mix photos
    /// and clips.
    #[must_use]
    pub fn detect(format: MediaFormat, ext: &str) -> Self {
        let by_ext = match ext.to_ascii_lowercase().as_str() {
            "mp4" | "mkv" | "webm" | "mov" | "m4v" => Self::Video,
            "jpg" | "jpeg" | "png" | "webp" | "heic" => Self::Photo,
            "mp3" | "m4a" | "opus" | "ogg" | "aac" | "flac" => Self::Audio,
            _ => Self::Document,
        };

        match (format, by_ext) {
            (MediaFormat::File, _) => Self::Document,
            (MediaFormat::Audio, Self::Photo) => Self::Photo,
            (MediaFormat::Audio, _) => Self::Audio,
            (_, kind) => kind,
        }
    }
}

/// A single download job
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// Link to fetch
    pub url: String,
    /// Requested format
    pub format: MediaFormat,
    /// Job directory the files are written into
    pub output_dir: PathBuf,
    /// Fetch every item behind the link instead of a single one
    pub playlist: bool,
}

impl DownloadRequest {
    /// Build a request for `url`, switching to playlist mode for story links.
    #[must_use]
    pub fn new(url: impl Into<String>, format: MediaFormat, output_dir: impl AsRef<Path>) -> Self {
        let url = url.into();
        let playlist = is_stories_link(&url);
        Self {
            url,
            format,
            output_dir: output_dir.as_ref().to_path_buf(),
            playlist,
        }
    }
}

/// A file produced by the extractor
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedMedia {
    /// Final path after post-processing
    pub path: PathBuf,
    /// Media title
    pub title: Option<String>,
    /// Uploader / channel name
    pub uploader: Option<String>,
    /// File extension
    pub ext: String,
}

impl DownloadedMedia {
    /// Title for captions, with a per-kind fallback
    #[must_use]
    pub fn display_title(&self, kind: MediaKind) -> String {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map_or_else(
                || match kind {
                    MediaKind::Audio => "Downloaded Audio".to_string(),
                    _ => "Downloaded Video".to_string(),
                },
                ToString::to_string,
            )
    }
}

/// Something that can turn a link into local files
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Download the media behind `request.url` into `request.output_dir`.
    ///
    /// # Errors
    ///
    /// Returns a [`DownloadError`] when the extractor fails, times out or
    /// produces no file.
    async fn fetch(&self, request: &DownloadRequest) -> Result<Vec<DownloadedMedia>, DownloadError>;
}

/// Instagram story links are playlists of photos and clips
#[must_use]
pub fn is_stories_link(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.contains("instagram.com/stories/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_tags_resolve() {
        for format in MediaFormat::ALL {
            assert_eq!(MediaFormat::from_tag(format.tag()), Some(format));
        }
        assert_eq!(MediaFormat::from_tag("4k"), None);
    }

    #[test]
    fn test_media_kind_forced_by_format() {
        assert_eq!(MediaKind::detect(MediaFormat::Audio, "webm"), MediaKind::Audio);
        assert_eq!(MediaKind::detect(MediaFormat::File, "mp4"), MediaKind::Document);
    }

    #[test]
    fn test_audio_format_keeps_images_as_photos() {
        assert_eq!(MediaKind::detect(MediaFormat::Audio, "jpg"), MediaKind::Photo);
        assert_eq!(MediaKind::detect(MediaFormat::Audio, "mp3"), MediaKind::Audio);
        assert_eq!(MediaKind::detect(MediaFormat::Audio, "webm"), MediaKind::Audio);
    }

    #[test]
    fn test_no_audio_for_stories() {
        let stories = "https://www.instagram.com/stories/someone/3141";
        assert!(!MediaFormat::Audio.supports_link(stories));
        assert!(MediaFormat::BestVideo.supports_link(stories));
        assert!(MediaFormat::Audio.supports_link("https://youtu.be/x"));
    }

    #[test]
    fn test_media_kind_from_extension() {
        assert_eq!(MediaKind::detect(MediaFormat::BestVideo, "MP4"), MediaKind::Video);
        assert_eq!(MediaKind::detect(MediaFormat::BestVideo, "jpg"), MediaKind::Photo);
        assert_eq!(MediaKind::detect(MediaFormat::Video720, "gif"), MediaKind::Document);
    }

    #[test]
    fn test_stories_links_use_playlist_mode() {
        let req = DownloadRequest::new(
            "https://www.instagram.com/stories/someone/",
            MediaFormat::BestVideo,
            "/tmp/job",
        );
        assert!(req.playlist);

        let req = DownloadRequest::new(
            "https://www.instagram.com/reel/Cx1/",
            MediaFormat::BestVideo,
            "/tmp/job",
        );
        assert!(!req.playlist);
    }

    #[test]
    fn test_display_title_fallback() {
        let media = DownloadedMedia {
            path: PathBuf::from("a.mp3"),
            title: Some("  ".to_string()),
            uploader: None,
            ext: "mp3".to_string(),
        };
        assert_eq!(media.display_title(MediaKind::Audio), "Downloaded Audio");
        assert_eq!(media.display_title(MediaKind::Video), "Downloaded Video");
    }
}
