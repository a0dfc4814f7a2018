//! Download → upload → cleanup for one request.
//!
//! Each request gets its own job directory under the configured download
//! root. The directory is removed whatever the outcome, so failed requests
//! leave no files behind.

use super::resilient::{delete_status, edit_status, report};
use super::stats::DownloadStats;
use super::views;
use crate::config::Settings;
use crate::downloader::{
    DownloadError, DownloadRequest, DownloadedMedia, MediaExtractor, MediaFormat, MediaKind,
};
use crate::utils::{retry_telegram_operation, truncate_str};
use anyhow::Context;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InputFile, MessageId};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Telegram caption limit is 1024 characters
const CAPTION_MAX_CHARS: usize = 1000;

/// A format choice ready to run
#[derive(Debug, Clone)]
pub struct DeliveryJob {
    /// Chat to upload into
    pub chat_id: ChatId,
    /// Status message edited along the way
    pub status_id: MessageId,
    /// Link to fetch
    pub url: String,
    /// Chosen format
    pub format: MediaFormat,
}

#[derive(Debug, Error)]
enum DeliveryError {
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error("{0}")]
    Upload(anyhow::Error),
}

/// Run `job` to completion and report the outcome in the chat.
///
/// Never fails: every error ends up as a message to the user and a log line.
pub async fn deliver(
    bot: &Bot,
    job: DeliveryJob,
    extractor: &dyn MediaExtractor,
    settings: &Settings,
    stats: &DownloadStats,
) {
    let job_ref = &job;
    let result = in_job_dir(&settings.download_dir, |dir| async move {
        run_job(bot, job_ref, &dir, extractor, settings).await
    })
    .await;

    match result {
        Ok(sent) => {
            stats.record_success();
            info!(url = %job.url, format = job.format.tag(), files = sent, "Delivered media");
            delete_status(bot, job.chat_id, job.status_id).await;
        }
        Err(DeliveryError::Download(e)) => {
            stats.record_failure();
            error!(url = %job.url, kind = ?e.kind(), "Download error: {e}");
            report(bot, job.chat_id, job.status_id, &views::download_failed(&e)).await;
        }
        Err(DeliveryError::Upload(e)) => {
            stats.record_failure();
            error!(url = %job.url, "Upload error: {e:#}");
            report(
                bot,
                job.chat_id,
                job.status_id,
                &views::unexpected_error(&format!("{e:#}")),
            )
            .await;
        }
    }
}

/// Run [`deliver`] on its own task so the dispatcher keeps serving updates
pub fn spawn_delivery(
    bot: Bot,
    job: DeliveryJob,
    extractor: Arc<dyn MediaExtractor>,
    settings: Arc<Settings>,
    stats: Arc<DownloadStats>,
) {
    tokio::spawn(async move {
        deliver(&bot, job, extractor.as_ref(), &settings, &stats).await;
    });
}

async fn run_job(
    bot: &Bot,
    job: &DeliveryJob,
    job_dir: &Path,
    extractor: &dyn MediaExtractor,
    settings: &Settings,
) -> Result<usize, DeliveryError> {
    edit_status(bot, job.chat_id, job.status_id, views::downloading()).await;

    let request = DownloadRequest::new(job.url.clone(), job.format, job_dir);
    let media = extractor.fetch(&request).await?;

    edit_status(bot, job.chat_id, job.status_id, views::uploading()).await;

    let mut sized = Vec::with_capacity(media.len());
    for item in &media {
        let size = tokio::fs::metadata(&item.path)
            .await
            .map_err(DownloadError::from)?
            .len();
        sized.push((item, size));
    }

    let uploads = plan_uploads(sized, settings.max_upload_bytes(), settings.max_upload_mb)?;
    for item in &uploads {
        let kind = MediaKind::detect(job.format, &item.ext);
        upload(bot, job.chat_id, item, kind)
            .await
            .map_err(DeliveryError::Upload)?;
    }
    Ok(uploads.len())
}

/// Pick the files that fit the upload limit.
///
/// A single oversized file is an error. In a multi-item download oversized
/// items are skipped, and the request only fails when none is left.
fn plan_uploads(
    sized: Vec<(&DownloadedMedia, u64)>,
    limit_bytes: u64,
    limit_mb: u64,
) -> Result<Vec<&DownloadedMedia>, DownloadError> {
    let single = sized.len() == 1;
    let mut uploads = Vec::with_capacity(sized.len());
    let mut skipped = None;

    for (item, size) in sized {
        if size <= limit_bytes {
            uploads.push(item);
            continue;
        }
        let too_large = DownloadError::TooLarge {
            size_mb: bytes_to_mb(size),
            limit_mb,
        };
        if single {
            return Err(too_large);
        }
        warn!(path = %item.path.display(), "Skipping playlist item: {too_large}");
        skipped = Some(too_large);
    }

    if uploads.is_empty() {
        return Err(skipped.unwrap_or(DownloadError::MissingOutput));
    }
    Ok(uploads)
}

/// Send one file with the upload method matching `kind`
async fn upload(
    bot: &Bot,
    chat_id: ChatId,
    item: &DownloadedMedia,
    kind: MediaKind,
) -> anyhow::Result<()> {
    let title = truncate_str(item.display_title(kind), CAPTION_MAX_CHARS);

    retry_telegram_operation(|| async {
        let file = InputFile::file(item.path.clone());
        let sent = match kind {
            MediaKind::Video => bot
                .send_video(chat_id, file)
                .caption(title.clone())
                .supports_streaming(true)
                .await
                .map(drop),
            MediaKind::Audio => {
                let mut req = bot.send_audio(chat_id, file).title(title.clone());
                if let Some(performer) = &item.uploader {
                    req = req.performer(performer.clone());
                }
                req.await.map(drop)
            }
            MediaKind::Photo => bot.send_photo(chat_id, file).await.map(drop),
            MediaKind::Document => bot
                .send_document(chat_id, file)
                .caption(title.clone())
                .await
                .map(drop),
        };
        sent.context("Telegram upload error")
    })
    .await
}

/// Run `work` in a fresh job directory under `root`, removing it afterwards
async fn in_job_dir<F, Fut, T>(root: &Path, work: F) -> T
where
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = T>,
{
    let dir = job_dir_for(root);
    let out = work(dir.clone()).await;
    cleanup_job_dir(&dir).await;
    out
}

fn job_dir_for(root: &Path) -> PathBuf {
    root.join(Uuid::new_v4().as_simple().to_string())
}

async fn cleanup_job_dir(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(dir = %dir.display(), "Failed to remove job directory: {e}"),
    }
}

#[allow(clippy::cast_precision_loss)]
fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / 1024.0 / 1024.0
}
