//! Client for the translation-management REST API (JSON:API flavoured).

use crate::error::ApiError;
use crate::types::{LanguageDetails, LanguageStat, Resource};
use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::time::sleep;

pub const DEFAULT_API_URL: &str = "https://rest.api.transifex.com";
const MEDIA_TYPE: &str = "application/vnd.api+json";

/// Operations the pipeline needs from the remote service.
#[async_trait]
pub trait TranslationApi: Send + Sync {
    async fn list_resources(&self) -> Result<Vec<Resource>, ApiError>;

    /// Statistics for one resource, optionally scoped to one language.
    async fn language_stats(
        &self,
        slug: &str,
        language: Option<&str>,
    ) -> Result<Vec<LanguageStat>, ApiError>;

    /// Requests an asynchronous download and waits until the content is available.
    async fn download_translation(&self, slug: &str, language: &str) -> Result<Vec<u8>, ApiError>;

    /// `None` when the service knows nothing about the language.
    async fn language_details(&self, code: &str) -> Result<Option<LanguageDetails>, ApiError>;
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub api_token: String,
    pub organisation: String,
    pub project: String,
    /// Wait before each poll of an async download.
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl ClientSettings {
    pub fn new(api_token: impl Into<String>, organisation: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            api_token: api_token.into(),
            organisation: organisation.into(),
            project: project.into(),
            poll_interval: Duration::from_millis(500),
            max_polls: 30,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_polling(mut self, poll_interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = poll_interval;
        self.max_polls = max_polls.max(1);
        self
    }

    fn project_id(&self) -> String {
        format!("o:{}:p:{}", self.organisation, self.project)
    }

    fn resource_id(&self, slug: &str) -> String {
        format!("{}:r:{}", self.project_id(), slug)
    }
}

#[derive(Debug, Deserialize)]
struct Collection<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    #[serde(default)]
    links: Links,
}

#[derive(Debug, Default, Deserialize)]
struct Links {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Document<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ResourceItem {
    #[serde(default)]
    attributes: ResourceAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct ResourceAttributes {
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatItem {
    id: String,
    #[serde(default)]
    attributes: StatAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct StatAttributes {
    #[serde(default)]
    translated_words: Option<u64>,
    #[serde(default)]
    total_words: Option<u64>,
    #[serde(default)]
    last_update: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LanguageItem {
    #[serde(default)]
    attributes: Option<LanguageAttributes>,
}

#[derive(Debug, Default, Deserialize)]
struct LanguageAttributes {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobItem {
    id: String,
    #[serde(default)]
    attributes: Option<JobAttributes>,
}

#[derive(Debug, Deserialize)]
struct JobAttributes {
    status: String,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

/// reqwest-backed implementation of [`TranslationApi`].
pub struct TransifexClient {
    client: Client,
    settings: ClientSettings,
}

impl TransifexClient {
    pub fn new(settings: ClientSettings) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(MEDIA_TYPE));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(MEDIA_TYPE));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", settings.api_token))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { client, settings })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.settings.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let resp = request.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let url = resp.url().to_string();
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::StatusError { status, url, body });
        }
        Ok(resp)
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
        let url = resp.url().to_string();
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|source| ApiError::DecodeError { url, source })
    }

    /// Follows `links.next` until the collection is exhausted.
    async fn fetch_all<T: DeserializeOwned>(
        &self,
        first: reqwest::RequestBuilder,
    ) -> Result<Vec<T>, ApiError> {
        let mut items = Vec::new();
        let mut page: Collection<T> = Self::decode(self.send(first).await?).await?;
        loop {
            items.append(&mut page.data);
            match page.links.next.take() {
                Some(next) if !next.is_empty() => {
                    debug!("Fetching next page {}", next);
                    page = Self::decode(self.send(self.client.get(&next)).await?).await?;
                }
                _ => break,
            }
        }
        Ok(items)
    }

    async fn start_download(&self, slug: &str, language: &str) -> Result<String, ApiError> {
        let body = json!({
            "data": {
                "attributes": {
                    "content_encoding": "text",
                    "file_type": "default",
                    "mode": "default",
                },
                "relationships": {
                    "language": {
                        "data": { "id": format!("l:{}", language), "type": "languages" }
                    },
                    "resource": {
                        "data": { "id": self.settings.resource_id(slug), "type": "resources" }
                    },
                },
                "type": "resource_translations_async_downloads",
            }
        });

        let resp = self
            .send(
                self.client
                    .post(self.url("resource_translations_async_downloads"))
                    .body(body.to_string()),
            )
            .await?;
        let job: Document<JobItem> = Self::decode(resp).await?;
        Ok(job.data.id)
    }

    /// Polls the job; a JSON:API status document means "not yet", anything else is the file.
    async fn await_download(&self, job: &str) -> Result<Vec<u8>, ApiError> {
        let url = self.url(&format!("resource_translations_async_downloads/{}", job));

        for poll in 1..=self.settings.max_polls {
            sleep(self.settings.poll_interval).await;
            let resp = self.send(self.client.get(&url)).await?;
            let bytes = resp.bytes().await?;

            let status = match serde_json::from_slice::<Document<JobItem>>(&bytes) {
                Ok(Document {
                    data: JobItem {
                        attributes: Some(attributes),
                        ..
                    },
                }) => attributes,
                _ => return Ok(bytes.to_vec()),
            };

            match status.status.as_str() {
                "pending" | "processing" => {
                    debug!("Download {} is {} (poll {})", job, status.status, poll);
                }
                other => {
                    let reason = if status.errors.is_empty() {
                        format!("status {}", other)
                    } else {
                        serde_json::Value::Array(status.errors).to_string()
                    };
                    return Err(ApiError::JobFailed {
                        job: job.to_string(),
                        reason,
                    });
                }
            }
        }

        Err(ApiError::JobTimeout {
            job: job.to_string(),
            polls: self.settings.max_polls,
        })
    }
}

#[async_trait]
impl TranslationApi for TransifexClient {
    async fn list_resources(&self) -> Result<Vec<Resource>, ApiError> {
        let request = self
            .client
            .get(self.url("resources"))
            .query(&[("filter[project]", self.settings.project_id())]);
        let items: Vec<ResourceItem> = self.fetch_all(request).await?;

        Ok(items
            .into_iter()
            .map(|item| Resource {
                slug: item.attributes.slug.unwrap_or_default(),
                name: item.attributes.name.unwrap_or_default(),
            })
            .collect())
    }

    async fn language_stats(
        &self,
        slug: &str,
        language: Option<&str>,
    ) -> Result<Vec<LanguageStat>, ApiError> {
        let mut query = vec![
            ("filter[resource]", self.settings.resource_id(slug)),
            ("filter[project]", self.settings.project_id()),
        ];
        if let Some(language) = language {
            query.push(("filter[language]", format!("l:{}", language)));
        }
        let request = self
            .client
            .get(self.url("resource_language_stats"))
            .query(&query);
        let items: Vec<StatItem> = self.fetch_all(request).await?;

        Ok(items
            .into_iter()
            .map(|item| LanguageStat {
                id: item.id,
                translated_words: item.attributes.translated_words.unwrap_or(0),
                total_words: item.attributes.total_words.unwrap_or(0),
                last_update: item.attributes.last_update.unwrap_or_default(),
            })
            .collect())
    }

    async fn download_translation(&self, slug: &str, language: &str) -> Result<Vec<u8>, ApiError> {
        let job = self.start_download(slug, language).await?;
        debug!("Started async download {} for {}/{}", job, slug, language);
        self.await_download(&job).await
    }

    async fn language_details(&self, code: &str) -> Result<Option<LanguageDetails>, ApiError> {
        let resp = self
            .send(self.client.get(self.url(&format!("languages/l:{}", code))))
            .await?;
        let doc: Document<LanguageItem> = Self::decode(resp).await?;

        Ok(doc.data.attributes.and_then(|attributes| {
            let code = attributes.code.unwrap_or_default();
            let name = attributes.name.unwrap_or_default();
            if code.is_empty() && name.is_empty() {
                None
            } else {
                Some(LanguageDetails { code, name })
            }
        }))
    }
}
