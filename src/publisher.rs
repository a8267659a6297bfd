//! Uploads built packages to object storage.

use crate::error::PublishError;
use crate::types::PublishReport;
use async_trait::async_trait;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use log::{error, info};
use std::path::{Path, PathBuf};

pub const DEFAULT_KEY_PREFIX: &str = "languages/";

/// Remote storage the packages end up in.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Removes every object whose key starts with `prefix`.
    async fn delete_matching(&self, prefix: &str) -> Result<(), PublishError>;

    /// Uploads `path` under `key` with public-read visibility and returns its URL.
    async fn put_public(&self, key: &str, path: &Path) -> Result<String, PublishError>;
}

pub struct S3Store {
    client: Client,
    bucket: String,
    region: String,
}

impl S3Store {
    /// Credentials come from the default provider chain.
    pub async fn connect(bucket: Option<String>, region: String) -> Result<Self, PublishError> {
        let bucket = bucket
            .filter(|b| !b.is_empty())
            .ok_or(PublishError::MissingBucket)?;
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.clone()))
            .load()
            .await;

        Ok(Self {
            client: Client::new(&sdk_config),
            bucket,
            region,
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("https://{}.s3.{}.amazonaws.com/{}", self.bucket, self.region, key)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn delete_matching(&self, prefix: &str) -> Result<(), PublishError> {
        let delete_error = |message: String| PublishError::DeleteError {
            key: prefix.to_string(),
            message,
        };

        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| delete_error(DisplayErrorContext(&e).to_string()))?;

            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        for key in keys {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
                .map_err(|e| delete_error(DisplayErrorContext(&e).to_string()))?;
        }
        Ok(())
    }

    async fn put_public(&self, key: &str, path: &Path) -> Result<String, PublishError> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| PublishError::PutError {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| PublishError::PutError {
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        Ok(self.object_url(key))
    }
}

/// Replaces the remote copy of every file in `dir`, in name order.
///
/// Failures are collected per file and never stop the remaining uploads.
pub async fn publish(store: &dyn ObjectStore, dir: &Path, prefix: &str) -> PublishReport {
    let mut report = PublishReport::default();

    let files = match package_files(dir) {
        Ok(files) => files,
        Err(source) => {
            let e = PublishError::IoError {
                path: dir.to_path_buf(),
                source,
            };
            error!("{}", e);
            report.failures.push(e.to_string());
            return report;
        }
    };

    for (name, path) in files {
        let key = format!("{}{}", prefix, name);

        if let Err(e) = store.delete_matching(&key).await {
            error!("{}", e);
            report.failures.push(e.to_string());
            continue;
        }

        match store.put_public(&key, &path).await {
            Ok(url) => {
                info!("Uploaded {} to S3, URL: {}.", path.display(), url);
                report.uploaded.push(key);
            }
            Err(e) => {
                error!("{}", e);
                report.failures.push(e.to_string());
            }
        }
    }

    report
}

fn package_files(dir: &Path) -> std::io::Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
        }
    }
    files.sort();
    Ok(files)
}
