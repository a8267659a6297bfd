use crate::report::ErrorLog;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A translatable unit as listed by the remote API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub slug: String,
    pub name: String,
}

impl Resource {
    /// Splits `name` into its `(bundle, file)` pair.
    ///
    /// Returns `None` unless the name is exactly two non-empty, space separated tokens.
    pub fn bundle_and_file(&self) -> Option<(&str, &str)> {
        let mut parts = self.name.split(' ');
        let bundle = parts.next()?;
        let file = parts.next()?;
        if parts.next().is_some() || bundle.is_empty() || file.is_empty() {
            return None;
        }
        Some((bundle, file))
    }
}

/// Completion measurement of one resource in one language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageStat {
    /// Composite identifier, e.g. `o:mautic:p:mautic:r:addonbundle-flashes:l:af`.
    pub id: String,
    pub translated_words: u64,
    pub total_words: u64,
    pub last_update: String,
}

impl LanguageStat {
    /// Last colon-delimited segment of the composite id.
    pub fn language_code(&self) -> &str {
        self.id.rsplit(':').next().unwrap_or_default()
    }

    pub fn completion_percent(&self) -> f64 {
        if self.total_words == 0 {
            return 0.0;
        }
        self.translated_words as f64 / self.total_words as f64 * 100.0
    }

    /// Integer comparison so that a language sitting exactly on the threshold is included.
    pub fn meets_threshold(&self, threshold: u32) -> bool {
        if self.total_words == 0 {
            return threshold == 0;
        }
        self.translated_words * 100 >= u64::from(threshold) * self.total_words
    }
}

/// Display metadata for a language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageDetails {
    pub code: String,
    pub name: String,
}

/// Unit of work for one (resource, language) pair.
#[derive(Debug, Clone)]
pub struct TranslationTask {
    pub slug: String,
    /// Upstream language code, used for API calls.
    pub language: String,
    pub translations_dir: PathBuf,
    pub bundle: String,
    pub file: String,
    pub last_update: String,
}

impl TranslationTask {
    pub fn bundle_dir(&self) -> PathBuf {
        self.translations_dir
            .join(LanguageCodes::directory_name(&self.language))
            .join(&self.bundle)
    }

    pub fn file_path(&self) -> PathBuf {
        self.bundle_dir().join(format!("{}.ini", self.file))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Fulfilled,
    /// Remote side kept failing until attempts ran out, or the file could not be written.
    Failed,
    /// Content arrived but could not be escaped or validated.
    Rejected,
}

#[derive(Debug)]
pub struct DownloadReport {
    pub task: TranslationTask,
    pub status: DownloadStatus,
    pub attempts: u32,
    pub bytes_written: u64,
    pub duration: Duration,
    pub error: Option<String>,
}

/// Which languages a run should consider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LanguageFilter {
    #[default]
    All,
    Only(BTreeSet<String>),
    Except(BTreeSet<String>),
}

impl LanguageFilter {
    pub fn allows(&self, code: &str) -> bool {
        match self {
            LanguageFilter::All => true,
            LanguageFilter::Only(codes) => codes.contains(code),
            LanguageFilter::Except(codes) => !codes.contains(code),
        }
    }
}

/// Languages excluded from downloading and packaging. Only ever grows during a run.
#[derive(Debug, Clone, Default)]
pub struct SkipLanguages(BTreeSet<String>);

impl SkipLanguages {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            codes
                .into_iter()
                .map(|code| {
                    let code: String = code.into();
                    LanguageCodes::directory_name(&code)
                })
                .collect(),
        )
    }

    /// Matches both the upstream form (`pt-BR`) and the directory form (`pt_BR`).
    pub fn contains(&self, code: &str) -> bool {
        self.0.contains(&LanguageCodes::directory_name(code))
    }

    /// Returns `true` if the code was not skipped before.
    pub fn insert(&mut self, code: &str) -> bool {
        self.0.insert(LanguageCodes::directory_name(code))
    }
}

/// Bidirectional mapping between upstream language codes and working-tree directory names.
///
/// Directory names replace `-` with `_`; the upstream form is needed again when
/// querying language metadata during packaging.
#[derive(Debug, Clone, Default)]
pub struct LanguageCodes {
    by_directory: BTreeMap<String, String>,
}

impl LanguageCodes {
    pub fn directory_name(code: &str) -> String {
        code.replace('-', "_")
    }

    /// Records `code` and returns its directory name.
    pub fn register(&mut self, code: &str) -> String {
        let directory = Self::directory_name(code);
        self.by_directory
            .entry(directory.clone())
            .or_insert_with(|| code.to_string());
        directory
    }

    /// Upstream code for a directory; unknown directories are assumed to be upstream codes already.
    pub fn upstream_code<'a>(&'a self, directory: &'a str) -> &'a str {
        self.by_directory
            .get(directory)
            .map(String::as_str)
            .unwrap_or(directory)
    }
}

/// Contents of `config.json` inside each package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageMetadata {
    pub name: String,
    pub locale: String,
    pub author: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub name: String,
    pub code: String,
}

#[derive(Debug, Default)]
pub struct BuildSummary {
    pub packaged: Vec<ManifestEntry>,
    pub failed: usize,
    pub manifest_path: PathBuf,
}

#[derive(Debug, Default)]
pub struct PublishReport {
    pub uploaded: Vec<String>,
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Clean,
    CompletedWithWarnings { warnings: usize },
}

#[derive(Debug)]
pub struct RunSummary {
    pub status: RunStatus,
    pub downloads: Vec<DownloadReport>,
    pub build: BuildSummary,
    pub publish: Option<PublishReport>,
    pub packages_dir: PathBuf,
    pub error_log: PathBuf,
}

/// State threaded through every stage of a run.
#[derive(Debug)]
pub struct RunState {
    pub skip: SkipLanguages,
    pub codes: LanguageCodes,
    pub errors: ErrorLog,
    pub downloads: Vec<DownloadReport>,
}

impl RunState {
    pub fn new(skip: SkipLanguages, error_log: &Path) -> Self {
        Self {
            skip,
            codes: LanguageCodes::default(),
            errors: ErrorLog::new(error_log),
            downloads: Vec::new(),
        }
    }
}
