//! Turns the populated working tree into one reproducible archive per language.

use crate::error::{ArchiveError, PackageError};
use crate::report::ErrorLog;
use crate::transifex::TranslationApi;
use crate::types::{BuildSummary, LanguageCodes, ManifestEntry, PackageMetadata, SkipLanguages};
use crate::workspace::{reference_time, touch};
use chrono::{DateTime, Datelike, Timelike, Utc};
use log::{error, info, warn};
use serde::Serialize;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const PACKAGE_AUTHOR: &str = "Mautic Translators";

pub struct PackageBuilder<'a> {
    api: &'a dyn TranslationApi,
    translations_dir: PathBuf,
    /// `packages/{timestamp}`; the manifest goes next to it as `{timestamp}.txt`.
    packages_dir: PathBuf,
}

impl<'a> PackageBuilder<'a> {
    pub fn new(api: &'a dyn TranslationApi, translations_dir: PathBuf, packages_dir: PathBuf) -> Self {
        Self {
            api,
            translations_dir,
            packages_dir,
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.packages_dir.with_extension("txt")
    }

    /// Builds every eligible language, then writes the manifest once.
    pub async fn build(
        &self,
        skip: &SkipLanguages,
        codes: &LanguageCodes,
        errors: &mut ErrorLog,
    ) -> BuildSummary {
        let mut summary = BuildSummary {
            manifest_path: self.manifest_path(),
            ..BuildSummary::default()
        };

        let languages = match self.language_dirs() {
            Ok(languages) => languages,
            Err(e) => {
                let message = format!(
                    "Unable to list {}: {}",
                    self.translations_dir.display(),
                    e
                );
                error!("{}", message);
                errors.append(message);
                summary.failed += 1;
                Vec::new()
            }
        };

        for language in languages {
            if skip.contains(&language) {
                info!("Skipping package for \"{}\" language.", language);
                continue;
            }

            let language_dir = self.translations_dir.join(&language);
            match is_empty_dir(&language_dir) {
                Ok(true) => continue,
                Ok(false) => {}
                Err(source) => {
                    self.record(
                        errors,
                        &mut summary,
                        PackageError::IoError {
                            language: language.clone(),
                            path: language_dir,
                            source,
                        },
                    );
                    continue;
                }
            }

            match self.build_language(&language, codes.upstream_code(&language)).await {
                Ok(Some(entry)) => summary.packaged.push(entry),
                Ok(None) => warn!("No details for \"{}\" language, not packaged.", language),
                Err(e) => self.record(errors, &mut summary, e),
            }
        }

        if let Err(e) = write_manifest(&summary.packaged, &summary.manifest_path) {
            let message = format!(
                "Unable to write manifest {}: {}",
                summary.manifest_path.display(),
                e
            );
            error!("{}", message);
            errors.append(message);
            summary.failed += 1;
        }

        summary
    }

    fn record(&self, errors: &mut ErrorLog, summary: &mut BuildSummary, e: PackageError) {
        error!("{}", e);
        errors.append(e.to_string());
        summary.failed += 1;
    }

    /// Top-level directories of the working tree, sorted by name.
    fn language_dirs(&self) -> io::Result<Vec<String>> {
        let mut languages = Vec::new();
        for entry in std::fs::read_dir(&self.translations_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                languages.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        languages.sort();
        Ok(languages)
    }

    async fn build_language(
        &self,
        language: &str,
        upstream: &str,
    ) -> Result<Option<ManifestEntry>, PackageError> {
        let details = self
            .api
            .language_details(upstream)
            .await
            .map_err(|source| PackageError::LanguageDetails {
                language: language.to_string(),
                source,
            })?;
        let Some(details) = details else {
            return Ok(None);
        };

        let language_dir = self.translations_dir.join(language);
        let io_err = |path: &Path| {
            let language = language.to_string();
            let path = path.to_path_buf();
            move |source| PackageError::IoError {
                language,
                path,
                source,
            }
        };

        let metadata = PackageMetadata {
            name: details.name.clone(),
            locale: details.code.clone(),
            author: PACKAGE_AUTHOR.to_string(),
        };
        let json = serde_json::to_string(&metadata).map_err(|source| PackageError::JsonError {
            language: language.to_string(),
            source,
        })?;

        let config_php = language_dir.join("config.php");
        let config_json = language_dir.join("config.json");
        std::fs::write(&config_php, render_config(&metadata)).map_err(io_err(&config_php))?;
        std::fs::write(&config_json, format!("{}\n", escape_like_php(&json)))
            .map_err(io_err(&config_json))?;

        let fixed = reference_time();
        for path in [&config_php, &config_json, &language_dir] {
            touch(path, fixed).map_err(io_err(path))?;
        }

        let archive = self.packages_dir.join(format!("{}.zip", language));
        create_archive(&self.translations_dir, language, &archive).map_err(|e| match e {
            ArchiveError::Io(source) => PackageError::IoError {
                language: language.to_string(),
                path: archive.clone(),
                source,
            },
            ArchiveError::Zip(source) => PackageError::ZipError {
                language: language.to_string(),
                source,
            },
        })?;

        let metadata_copy = self.packages_dir.join(format!("{}.json", language));
        std::fs::copy(&config_json, &metadata_copy).map_err(io_err(&metadata_copy))?;

        info!("Creating package for \"{}\" language.", language_dir.display());

        Ok(Some(ManifestEntry {
            name: details.name,
            code: details.code,
        }))
    }
}

fn is_empty_dir(path: &Path) -> io::Result<bool> {
    Ok(std::fs::read_dir(path)?.next().is_none())
}

/// Renders the descriptor as a PHP array, which is what the product loads.
pub fn render_config(metadata: &PackageMetadata) -> String {
    let quote = |value: &str| value.replace('\\', "\\\\").replace('\'', "\\'");
    let mut out = String::from("<?php\n$config = [\n");
    for (key, value) in [
        ("name", &metadata.name),
        ("locale", &metadata.locale),
        ("author", &metadata.author),
    ] {
        out.push_str(&format!("\t'{}' => '{}',\n", key, quote(value)));
    }
    out.push_str("];\n\nreturn $config;");
    out
}

/// Pretty-printed `[{"name", "code"}]` with four-space indentation.
pub fn write_manifest(entries: &[ManifestEntry], path: &Path) -> io::Result<()> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    entries.serialize(&mut ser).map_err(io::Error::other)?;
    let json = String::from_utf8(buf).map_err(io::Error::other)?;
    std::fs::write(path, escape_like_php(&json))
}

/// Escapes `/` and every non-ASCII character as `\uXXXX`, matching what the
/// product's PHP `json_encode` emits for the same data.
pub fn escape_like_php(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '/' => out.push_str("\\/"),
            c if c.is_ascii() => out.push(c),
            c => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{:04x}", unit));
                }
            }
        }
    }
    out
}

/// Zips everything below `root/language` into `dest`.
///
/// Entries are named `language/...`, sorted bytewise, and carry only their
/// modification time and fixed permissions, so identical trees give identical bytes.
pub fn create_archive(root: &Path, language: &str, dest: &Path) -> Result<(), ArchiveError> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(root.join(language)).min_depth(1) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let mut name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let is_dir = entry.file_type().is_dir();
        if is_dir {
            name.push('/');
        }
        let modified = entry.metadata().map_err(io::Error::from)?.modified()?;
        entries.push((name, entry.path().to_path_buf(), is_dir, modified));
    }
    entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

    let mut zip = ZipWriter::new(File::create(dest)?);
    for (name, path, is_dir, modified) in entries {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip_time(modified))
            .unix_permissions(if is_dir { 0o755 } else { 0o644 });
        if is_dir {
            zip.add_directory(name, options)?;
        } else {
            zip.start_file(name, options)?;
            zip.write_all(&std::fs::read(&path)?)?;
        }
    }
    zip.finish()?;
    Ok(())
}

fn zip_time(time: SystemTime) -> zip::DateTime {
    let dt: DateTime<Utc> = time.into();
    zip::DateTime::from_date_and_time(
        dt.year().clamp(1980, 2107) as u16,
        dt.month() as u8,
        dt.day() as u8,
        dt.hour() as u8,
        dt.minute() as u8,
        dt.second() as u8,
    )
    .unwrap_or_default()
}
