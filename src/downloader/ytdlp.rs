//! yt-dlp process wrapper
//!
//! Translates a [`DownloadRequest`] into yt-dlp arguments, runs the binary
//! with a timeout and reads back the final file paths yt-dlp prints after
//! post-processing.

use super::{DownloadError, DownloadRequest, DownloadedMedia, MediaExtractor};
use crate::config::Settings;
use async_trait::async_trait;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Output file name inside the job directory (title capped in bytes for the filesystem)
const OUTPUT_TEMPLATE: &str = "%(title).150B.%(ext)s";

/// Printed once per item after it reaches its final location
const PRINT_TEMPLATE: &str = "after_move:%(.{filepath,title,uploader,ext})j";

/// Audio post-processing: MP3 at 192 kbps
const AUDIO_CODEC: &str = "mp3";
const AUDIO_QUALITY: &str = "192K";

/// Container the video formats are merged into
const MERGE_FORMAT: &str = "mp4";

/// Leftovers yt-dlp may keep next to finished files
const PARTIAL_SUFFIXES: &[&str] = &[".part", ".ytdl", ".temp"];

/// One line of `--print` output
#[derive(Debug, Deserialize)]
struct PrintedItem {
    filepath: Option<PathBuf>,
    title: Option<String>,
    uploader: Option<String>,
    ext: Option<String>,
}

/// [`MediaExtractor`] backed by the yt-dlp executable
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: String,
    cookies_file: Option<PathBuf>,
    audio_max_filesize_mb: u64,
    timeout: Duration,
}

impl YtDlp {
    /// Create an extractor running `program` with default limits
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            cookies_file: None,
            audio_max_filesize_mb: crate::config::DEFAULT_AUDIO_MAX_FILESIZE_MB,
            timeout: Duration::from_secs(crate::config::DEFAULT_DOWNLOAD_TIMEOUT_SECS),
        }
    }

    /// Build the extractor from settings.
    ///
    /// A configured cookie file that does not exist is ignored with a warning,
    /// so a bad path degrades to anonymous extraction instead of failing every
    /// download.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        let mut ytdlp = Self::new(settings.ytdlp_path.clone())
            .with_timeout(Duration::from_secs(settings.download_timeout_secs))
            .with_audio_max_filesize_mb(settings.audio_max_filesize_mb);

        if let Some(path) = &settings.cookies_file {
            if path.is_file() {
                info!(path = %path.display(), "Using cookie file for authenticated extraction");
                ytdlp = ytdlp.with_cookies_file(path.clone());
            } else {
                warn!(path = %path.display(), "Configured cookie file not found, ignoring it");
            }
        }

        ytdlp
    }

    /// Pass `--cookies <path>` on every run
    #[must_use]
    pub fn with_cookies_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cookies_file = Some(path.into());
        self
    }

    /// Kill yt-dlp if it runs longer than `timeout`
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `--max-filesize` for audio downloads
    #[must_use]
    pub const fn with_audio_max_filesize_mb(mut self, mb: u64) -> Self {
        self.audio_max_filesize_mb = mb;
        self
    }

    /// Command-line arguments for `request`
    #[must_use]
    pub fn build_args(&self, request: &DownloadRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::with_capacity(24);
        let mut push = |arg: &str| args.push(OsString::from(arg));

        push("--no-warnings");
        push("--no-progress");
        push("--no-simulate");
        push("-f");
        push(request.format.selector());
        push(if request.playlist {
            "--yes-playlist"
        } else {
            "--no-playlist"
        });

        if request.format.is_audio() {
            push("-x");
            push("--audio-format");
            push(AUDIO_CODEC);
            push("--audio-quality");
            push(AUDIO_QUALITY);
            push("--max-filesize");
            push(&format!("{}M", self.audio_max_filesize_mb));
        } else {
            push("--merge-output-format");
            push(MERGE_FORMAT);
        }

        push("--print");
        push(PRINT_TEMPLATE);

        args.push(OsString::from("-o"));
        args.push(request.output_dir.join(OUTPUT_TEMPLATE).into_os_string());

        if let Some(cookies) = &self.cookies_file {
            args.push(OsString::from("--cookies"));
            args.push(cookies.clone().into_os_string());
        }

        args.push(OsString::from("--"));
        args.push(OsString::from(&request.url));
        args
    }

    async fn run(&self, request: &DownloadRequest) -> Result<String, DownloadError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.build_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(url = %request.url, format = request.format.tag(), "Spawning yt-dlp");
        let child = cmd.spawn().map_err(DownloadError::Spawn)?;

        // Dropping the future on timeout drops the child, which kills it
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| DownloadError::Timeout(self.timeout))??;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            Ok(stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(url = %request.url, status = %output.status, "yt-dlp exited with an error");
            Err(DownloadError::from_output(&stderr, &stdout))
        }
    }
}

#[async_trait]
impl MediaExtractor for YtDlp {
    async fn fetch(&self, request: &DownloadRequest) -> Result<Vec<DownloadedMedia>, DownloadError> {
        tokio::fs::create_dir_all(&request.output_dir).await?;

        let stdout = self.run(request).await?;
        let mut items = parse_printed_items(&stdout);
        if items.is_empty() {
            debug!(dir = %request.output_dir.display(), "No printed paths, scanning job directory");
            items = scan_job_dir(&request.output_dir).await?;
        }

        let media = keep_existing(items, request.playlist).await?;
        info!(url = %request.url, files = media.len(), "yt-dlp finished");
        Ok(media)
    }
}

/// Parse the JSON lines produced by [`PRINT_TEMPLATE`]; non-JSON lines are ignored.
fn parse_printed_items(stdout: &str) -> Vec<DownloadedMedia> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .filter_map(|line| match serde_json::from_str::<PrintedItem>(line) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable yt-dlp output line");
                None
            }
        })
        .filter_map(|item| {
            let path = item.filepath?;
            let ext = extension_of(&path)
                .or(item.ext)
                .unwrap_or_default();
            Some(DownloadedMedia {
                path,
                title: item.title,
                uploader: item.uploader,
                ext,
            })
        })
        .collect()
}

/// Every finished file in the job directory, in name order
async fn scan_job_dir(dir: &Path) -> Result<Vec<DownloadedMedia>, DownloadError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut found = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if !entry.file_type().await?.is_file()
            || PARTIAL_SUFFIXES.iter().any(|s| name.ends_with(s))
        {
            continue;
        }
        found.push(DownloadedMedia {
            title: path.file_stem().map(|s| s.to_string_lossy().into_owned()),
            uploader: None,
            ext: extension_of(&path).unwrap_or_default(),
            path,
        });
    }

    found.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(found)
}

/// Drop items whose file is gone. A single download with a missing file is an
/// error; in a playlist the item is skipped and the rest continue.
async fn keep_existing(
    items: Vec<DownloadedMedia>,
    playlist: bool,
) -> Result<Vec<DownloadedMedia>, DownloadError> {
    let mut kept = Vec::with_capacity(items.len());

    for item in items {
        if tokio::fs::metadata(&item.path).await.is_ok() {
            kept.push(item);
        } else if playlist {
            warn!(path = %item.path.display(), "Playlist item missing on disk, skipping");
        } else {
            return Err(DownloadError::MissingOutput);
        }
    }

    if kept.is_empty() {
        return Err(DownloadError::MissingOutput);
    }
    Ok(kept)
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .filter(|e| !e.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::MediaFormat;

    fn args_as_strings(ytdlp: &YtDlp, request: &DownloadRequest) -> Vec<String> {
        ytdlp
            .build_args(request)
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_video_args() {
        let ytdlp = YtDlp::new("yt-dlp");
        let req = DownloadRequest::new("https://youtu.be/x", MediaFormat::Video720, "/tmp/job");
        let args = args_as_strings(&ytdlp, &req);

        assert!(args.contains(&"--no-playlist".to_string()));
        assert!(args.contains(&"--merge-output-format".to_string()));
        assert!(!args.contains(&"-x".to_string()));
        assert!(!args.contains(&"--cookies".to_string()));
        let f = args.iter().position(|a| a == "-f").map(|i| &args[i + 1]);
        assert_eq!(f.map(String::as_str), Some(MediaFormat::Video720.selector()));
        assert_eq!(args.last().map(String::as_str), Some("https://youtu.be/x"));
        assert_eq!(args[args.len() - 2], "--");
    }

    #[test]
    fn test_audio_args() {
        let ytdlp = YtDlp::new("yt-dlp").with_audio_max_filesize_mb(20);
        let req = DownloadRequest::new("https://youtu.be/x", MediaFormat::Audio, "/tmp/job");
        let args = args_as_strings(&ytdlp, &req);

        let joined = args.join(" ");
        assert!(joined.contains("-x --audio-format mp3 --audio-quality 192K"));
        assert!(joined.contains("--max-filesize 20M"));
        assert!(!args.contains(&"--merge-output-format".to_string()));
    }

    #[test]
    fn test_output_template_in_job_dir() {
        let ytdlp = YtDlp::new("yt-dlp");
        let req = DownloadRequest::new("https://youtu.be/x", MediaFormat::BestVideo, "/tmp/job");
        let args = args_as_strings(&ytdlp, &req);
        let o = args.iter().position(|a| a == "-o").map(|i| args[i + 1].clone());
        assert_eq!(o, Some(format!("/tmp/job/{OUTPUT_TEMPLATE}")));
    }

    #[test]
    fn test_cookies_and_playlist_args() {
        let ytdlp = YtDlp::new("yt-dlp").with_cookies_file("/srv/cookies.txt");
        let req = DownloadRequest::new(
            "https://www.instagram.com/stories/someone/",
            MediaFormat::BestVideo,
            "/tmp/job",
        );
        let args = args_as_strings(&ytdlp, &req);

        assert!(args.contains(&"--yes-playlist".to_string()));
        let c = args.iter().position(|a| a == "--cookies").map(|i| args[i + 1].clone());
        assert_eq!(c.as_deref(), Some("/srv/cookies.txt"));
    }

    #[test]
    fn test_parse_printed_items() {
        let stdout = concat!(
            "[download] noise\n",
            r#"{"filepath": "/tmp/job/Song.mp3", "title": "Song", "uploader": "Band", "ext": "webm"}"#,
            "\n",
            r#"{"title": "no path"}"#,
            "\n",
            "{broken\n",
        );
        let items = parse_printed_items(stdout);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].path, PathBuf::from("/tmp/job/Song.mp3"));
        assert_eq!(items[0].uploader.as_deref(), Some("Band"));
        // The real extension wins over the pre-conversion one
        assert_eq!(items[0].ext, "mp3");
    }

    #[tokio::test]
    async fn test_keep_existing_single_missing_is_error() {
        let items = vec![DownloadedMedia {
            path: PathBuf::from("/definitely/not/here.mp4"),
            title: None,
            uploader: None,
            ext: "mp4".to_string(),
        }];
        let result = keep_existing(items, false).await;
        assert!(matches!(result, Err(DownloadError::MissingOutput)));
    }

    #[tokio::test]
    async fn test_keep_existing_playlist_skips_missing() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let present = dir.path().join("a.jpg");
        tokio::fs::write(&present, b"jpg").await?;

        let items = vec![
            DownloadedMedia {
                path: dir.path().join("gone.mp4"),
                title: None,
                uploader: None,
                ext: "mp4".to_string(),
            },
            DownloadedMedia {
                path: present.clone(),
                title: None,
                uploader: None,
                ext: "jpg".to_string(),
            },
        ];
        let kept = keep_existing(items, true).await?;
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].path, present);
        Ok(())
    }

    #[tokio::test]
    async fn test_scan_job_dir_skips_partials() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        tokio::fs::write(dir.path().join("clip.mp4"), b"v").await?;
        tokio::fs::write(dir.path().join("clip.f137.mp4.part"), b"p").await?;

        let found = scan_job_dir(dir.path()).await?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title.as_deref(), Some("clip"));
        assert_eq!(found[0].ext, "mp4");
        Ok(())
    }
}
