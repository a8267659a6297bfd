use crate::transifex::DEFAULT_API_URL;
use anyhow::{bail, Context, Result};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    // Transifex
    pub api_token: String,
    pub organisation: String,
    pub project: String,
    pub api_url: String,
    pub source_language: String,

    // Selection
    pub completion: u32,
    pub max_attempts: u32,

    // Working tree
    pub translations_dir: PathBuf,
    pub packages_dir: PathBuf,

    // S3
    pub s3_bucket: Option<String>,
    pub aws_region: String,
    pub s3_key_prefix: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source; unset or empty means default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let parsed = |name: &str, default: u32| -> Result<u32> {
            match var(name) {
                Some(v) => v
                    .trim()
                    .parse()
                    .with_context(|| format!("{} must be a whole number, got {:?}", name, v)),
                None => Ok(default),
            }
        };

        let completion = parsed("TRANSLATIONS_COMPLETION", 80)?;
        if completion > 100 {
            bail!("TRANSLATIONS_COMPLETION must be between 0 and 100, got {}", completion);
        }

        Ok(Self {
            // Transifex
            api_token: var("TRANSIFEX_API_TOKEN").context("TRANSIFEX_API_TOKEN not set")?,
            organisation: var("TRANSIFEX_ORGANISATION").unwrap_or_else(|| "mautic".to_string()),
            project: var("TRANSIFEX_PROJECT").unwrap_or_else(|| "mautic".to_string()),
            api_url: var("TRANSIFEX_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            source_language: var("TRANSIFEX_SOURCE_LANGUAGE").unwrap_or_else(|| "en".to_string()),

            // Selection
            completion,
            max_attempts: parsed("DOWNLOAD_MAX_ATTEMPTS", 3)?.max(1),

            // Working tree
            translations_dir: var("TRANSLATIONS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("translations")),
            packages_dir: var("PACKAGES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("packages")),

            // S3
            s3_bucket: var("AWS_S3_BUCKET"),
            aws_region: var("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            s3_key_prefix: var("AWS_S3_KEY_PREFIX").unwrap_or_else(|| "languages/".to_string()),
        })
    }
}
