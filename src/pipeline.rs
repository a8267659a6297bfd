//! One complete run: prepare, enumerate and download, package, publish.

use crate::downloader::{Downloader, RetryPolicy};
use crate::error::PackerError;
use crate::packager::PackageBuilder;
use crate::publisher::{self, ObjectStore, DEFAULT_KEY_PREFIX};
use crate::report::write_download_report;
use crate::resources::process_all_resources;
use crate::stats::StatsEvaluator;
use crate::transifex::TranslationApi;
use crate::types::{LanguageFilter, RunState, RunStatus, RunSummary, SkipLanguages};
use crate::workspace::Workspace;
use chrono::Local;
use log::{error, info, warn};
use std::path::PathBuf;

pub const ERROR_LOG_FILE: &str = "errors.txt";
pub const DOWNLOAD_REPORT_FILE: &str = "download_report.csv";

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub filter: LanguageFilter,
    pub bypass_completion: bool,
    /// Minimum completion percentage.
    pub completion: u32,
    pub retry: RetryPolicy,
    pub translations_dir: PathBuf,
    pub packages_dir: PathBuf,
    pub source_language: String,
    pub key_prefix: String,
    pub show_progress: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            filter: LanguageFilter::All,
            bypass_completion: false,
            completion: 80,
            retry: RetryPolicy::default(),
            translations_dir: PathBuf::from("translations"),
            packages_dir: PathBuf::from("packages"),
            source_language: "en".to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            show_progress: true,
        }
    }
}

impl RunOptions {
    /// The source language and any deny-listed codes.
    fn initial_skip(&self) -> SkipLanguages {
        let mut skip = SkipLanguages::new([self.source_language.as_str()]);
        if let LanguageFilter::Except(codes) = &self.filter {
            for code in codes {
                skip.insert(code);
            }
        }
        skip
    }
}

/// Runs every stage in order. Packaging starts only after all downloads finished.
pub async fn run(
    api: &dyn TranslationApi,
    options: &RunOptions,
    store: Option<&dyn ObjectStore>,
) -> Result<RunSummary, PackerError> {
    let workspace = Workspace::new(&options.translations_dir, &options.packages_dir);
    let translations_dir =
        workspace
            .init_translations_dir()
            .await
            .map_err(|source| PackerError::WorkingTree {
                path: options.translations_dir.clone(),
                source,
            })?;

    let error_log = translations_dir.join(ERROR_LOG_FILE);
    let mut state = RunState::new(options.initial_skip(), &error_log);

    let evaluator = StatsEvaluator::new(
        api,
        Downloader::new(api, options.retry.clone()),
        translations_dir.clone(),
        options.filter.clone(),
        options.completion,
        options.bypass_completion,
    );
    let tasks = process_all_resources(api, &evaluator, &mut state, options.show_progress).await?;
    info!("Finished {} translation tasks.", tasks);

    let report_path = translations_dir.join(DOWNLOAD_REPORT_FILE);
    match write_download_report(&state.downloads, &report_path) {
        Ok(()) => info!("Download report written to {}", report_path.display()),
        Err(e) => error!("Failed to write {}: {}", report_path.display(), e),
    }

    let packages_dir = workspace
        .init_packages_dir(Local::now())
        .await
        .map_err(|source| PackerError::WorkingTree {
            path: options.packages_dir.clone(),
            source,
        })?;

    let builder = PackageBuilder::new(api, translations_dir, packages_dir.clone());
    let build = builder.build(&state.skip, &state.codes, &mut state.errors).await;
    info!(
        "Packaged {} languages, manifest {}",
        build.packaged.len(),
        build.manifest_path.display()
    );

    let publish = match store {
        Some(store) => {
            let report = publisher::publish(store, &packages_dir, &options.key_prefix).await;
            for failure in &report.failures {
                state.errors.append(failure.clone());
            }
            if !report.failures.is_empty() {
                warn!("Encountered error during language packages upload.");
            }
            Some(report)
        }
        None => None,
    };

    let status = if state.errors.is_empty() {
        RunStatus::Clean
    } else {
        RunStatus::CompletedWithWarnings {
            warnings: state.errors.len(),
        }
    };

    Ok(RunSummary {
        status,
        downloads: state.downloads,
        build,
        publish,
        packages_dir,
        error_log,
    })
}
