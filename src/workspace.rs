//! Working-tree layout and reproducible timestamps.

use chrono::{DateTime, Local, TimeZone, Utc};
use filetime::FileTime;
use log::{debug, info};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Fixed modification time for generated files, so archives do not depend on when a run happens.
pub fn reference_time() -> SystemTime {
    Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0)
        .single()
        .map(SystemTime::from)
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Parses an upstream `last_update` value such as `2015-05-21T08:06:10Z`.
pub fn parse_timestamp(value: &str) -> Option<SystemTime> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| SystemTime::from(dt.with_timezone(&Utc)))
}

/// Sets access and modification time of a file or directory.
pub fn touch(path: &Path, when: SystemTime) -> io::Result<()> {
    let time = FileTime::from_system_time(when);
    filetime::set_file_times(path, time, time)
}

#[derive(Debug, Clone)]
pub struct Workspace {
    translations_dir: PathBuf,
    packages_dir: PathBuf,
}

impl Workspace {
    pub fn new(translations_dir: impl Into<PathBuf>, packages_dir: impl Into<PathBuf>) -> Self {
        Self {
            translations_dir: translations_dir.into(),
            packages_dir: packages_dir.into(),
        }
    }

    pub fn translations_dir(&self) -> &Path {
        &self.translations_dir
    }

    pub fn packages_dir(&self) -> &Path {
        &self.packages_dir
    }

    /// Removes any previous pull and recreates an empty translations directory.
    pub async fn init_translations_dir(&self) -> io::Result<PathBuf> {
        match tokio::fs::remove_dir_all(&self.translations_dir).await {
            Ok(()) => debug!("Removed previous {}", self.translations_dir.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        tokio::fs::create_dir_all(&self.translations_dir).await?;
        info!("Prepared translations dir {}", self.translations_dir.display());
        Ok(self.translations_dir.clone())
    }

    /// Creates `packages/{YYYYmmddHHMMSS}` for this run's artifacts.
    pub async fn init_packages_dir(&self, now: DateTime<Local>) -> io::Result<PathBuf> {
        let timestamp_dir = self
            .packages_dir
            .join(now.format("%Y%m%d%H%M%S").to_string());
        tokio::fs::create_dir_all(&timestamp_dir).await?;
        info!("Prepared packages dir {}", timestamp_dir.display());
        Ok(timestamp_dir)
    }
}
