use crate::types::DownloadReport;
use log::error;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only log of every non-fatal failure in a run.
///
/// Entries are kept in memory and mirrored to disk so an operator can read
/// them after the run. A failing disk write is reported but never aborts.
#[derive(Debug)]
pub struct ErrorLog {
    path: PathBuf,
    entries: Vec<String>,
}

impl ErrorLog {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            entries: Vec::new(),
        }
    }

    pub fn append(&mut self, entry: impl Into<String>) {
        let entry = entry.into();
        let written = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| write!(file, "{}\n\n", entry));
        if let Err(e) = written {
            error!("Failed to append to {}: {}", self.path.display(), e);
        }
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Writes one CSV row per download task.
pub fn write_download_report(reports: &[DownloadReport], path: &Path) -> Result<(), csv::Error> {
    let mut wtr = csv::WriterBuilder::new().from_path(path)?;

    wtr.write_record([
        "File",
        "Language",
        "Resource",
        "Status",
        "Attempts",
        "Size (bytes)",
        "Duration (s)",
        "Error",
    ])?;

    for report in reports {
        wtr.write_record([
            report.task.file_path().display().to_string(),
            report.task.language.clone(),
            report.task.slug.clone(),
            format!("{:?}", report.status),
            report.attempts.to_string(),
            report.bytes_written.to_string(),
            format!("{:.2}", report.duration.as_secs_f64()),
            report.error.clone().unwrap_or_default(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
