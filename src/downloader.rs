use crate::error::DownloadError;
use crate::escaper::escape_body;
use crate::report::ErrorLog;
use crate::transifex::TranslationApi;
use crate::types::{DownloadReport, DownloadStatus, TranslationTask};
use crate::validator::ensure_file_valid;
use crate::workspace::{parse_timestamp, touch};
use log::{debug, error, info, warn};
use std::path::Path;
use std::time::{Duration, Instant, SystemTime};
use tokio::time::sleep;

/// Bounded retry with exponential backoff for transport failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts including the first one.
    pub max_attempts: u32,
    /// Unit of the backoff; the wait after attempt `n` is `base_delay * 2^n`.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_secs(1),
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Downloads one (resource, language) pair at a time into the working tree.
pub struct Downloader<'a> {
    api: &'a dyn TranslationApi,
    retry: RetryPolicy,
}

impl<'a> Downloader<'a> {
    pub fn new(api: &'a dyn TranslationApi, retry: RetryPolicy) -> Self {
        Self { api, retry }
    }

    /// Runs the task to completion. Failures end up in `errors`, never in the return value.
    pub async fn download(&self, task: TranslationTask, errors: &mut ErrorLog) -> DownloadReport {
        let start_time = Instant::now();
        let file_path = task.file_path();
        let mut attempts = 0;

        let (status, bytes_written, failure) = loop {
            attempts += 1;
            debug!(
                "Requesting {} (attempt {}/{})",
                file_path.display(),
                attempts,
                self.retry.max_attempts
            );

            match self.fetch_once(&task).await {
                Ok(bytes) => break (DownloadStatus::Fulfilled, bytes, None),
                Err(e) if e.is_retryable() && attempts < self.retry.max_attempts => {
                    let delay = self.retry.delay_after(attempts);
                    warn!(
                        "Translation download for {} failed with {}. Retrying in {:?}",
                        file_path.display(),
                        e,
                        delay
                    );
                    sleep(delay).await;
                }
                Err(e) if e.is_content() => break (DownloadStatus::Rejected, 0, Some(e)),
                Err(e) => break (DownloadStatus::Failed, 0, Some(e)),
            }
        };

        let error = failure.map(|e| {
            let message = e.to_string();
            error!(
                "Encountered error during \"{}\" download. Error: {}",
                file_path.display(),
                message
            );
            errors.append(format!(
                "Encountered error during {} download. Error: {}.",
                file_path.display(),
                message
            ));
            message
        });

        if status == DownloadStatus::Fulfilled {
            info!("Translation for {} was downloaded successfully!", file_path.display());
        }

        DownloadReport {
            task,
            status,
            attempts,
            bytes_written,
            duration: start_time.elapsed(),
            error,
        }
    }

    /// One attempt: fetch, escape, write, stamp and validate.
    async fn fetch_once(&self, task: &TranslationTask) -> Result<u64, DownloadError> {
        let body = self.api.download_translation(&task.slug, &task.language).await?;
        let content = escape_body(body)?;

        let bundle_dir = task.bundle_dir();
        let file_path = task.file_path();
        tokio::fs::create_dir_all(&bundle_dir)
            .await
            .map_err(|source| io_error(&bundle_dir, source))?;
        tokio::fs::write(&file_path, content.as_bytes())
            .await
            .map_err(|source| io_error(&file_path, source))?;

        let stamp = last_update_time(task);
        touch(&file_path, stamp).map_err(|source| io_error(&file_path, source))?;
        touch(&bundle_dir, stamp).map_err(|source| io_error(&bundle_dir, source))?;

        ensure_file_valid(&file_path)?;
        Ok(content.len() as u64)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> DownloadError {
    DownloadError::IoError {
        path: path.to_path_buf(),
        source,
    }
}

/// Upstream `last_update`, falling back to the reference date when it is missing or malformed.
fn last_update_time(task: &TranslationTask) -> SystemTime {
    parse_timestamp(&task.last_update).unwrap_or_else(|| {
        warn!(
            "Invalid last_update {:?} for {}/{}, using reference date",
            task.last_update, task.slug, task.language
        );
        crate::workspace::reference_time()
    })
}
