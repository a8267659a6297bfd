//! End-to-end runs of the pipeline against a mocked Transifex API.

use std::fs::File;
use std::io::Read;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use wiremock::{
    matchers::{header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use language_packer::downloader::RetryPolicy;
use language_packer::error::PackerError;
use language_packer::pipeline::{self, RunOptions};
use language_packer::transifex::{ClientSettings, TransifexClient, TranslationApi};
use language_packer::types::{DownloadStatus, LanguageFilter, RunStatus};

const FLASHES: &str = "mautic.addon.notice.reloaded=\"%added% addons were added\"\n";

// ==================== Test Helpers ====================

fn client(server: &MockServer) -> TransifexClient {
    let settings = ClientSettings::new("test-token", "mautic", "mautic")
        .with_base_url(server.uri())
        .with_polling(Duration::from_millis(5), 5);
    TransifexClient::new(settings).unwrap()
}

fn options(root: &TempDir) -> RunOptions {
    RunOptions {
        filter: LanguageFilter::All,
        retry: RetryPolicy::new(3).with_base_delay(Duration::from_millis(1)),
        translations_dir: root.path().join("translations"),
        packages_dir: root.path().join("packages"),
        show_progress: false,
        ..RunOptions::default()
    }
}

fn resource(slug: &str, name: &str) -> serde_json::Value {
    json!({ "id": format!("o:mautic:p:mautic:r:{}", slug), "attributes": { "slug": slug, "name": name } })
}

async fn mount_resources(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/resources"))
        .and(query_param("filter[project]", "o:mautic:p:mautic"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                resource("addonbundle-flashes", "AddonBundle flashes"),
                resource("single", "Single"),
            ],
            "links": { "next": null }
        })))
        .mount(server)
        .await;
}

async fn mount_stats(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/resource_language_stats"))
        .and(query_param(
            "filter[resource]",
            "o:mautic:p:mautic:r:addonbundle-flashes",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {
                    "id": "o:mautic:p:mautic:r:addonbundle-flashes:l:af",
                    "attributes": {
                        "translated_words": 10,
                        "total_words": 10,
                        "last_update": "2015-05-21T08:06:10Z"
                    }
                },
                {
                    "id": "o:mautic:p:mautic:r:addonbundle-flashes:l:cs",
                    "attributes": {
                        "translated_words": 1,
                        "total_words": 10,
                        "last_update": "2015-05-21T08:06:10Z"
                    }
                }
            ],
            "links": {}
        })))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_download(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/resource_translations_async_downloads"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "data": { "id": "job-1", "attributes": { "status": "pending", "errors": [] } }
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/resource_translations_async_downloads/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "id": "job-1", "attributes": { "status": "processing", "errors": [] } }
        })))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/resource_translations_async_downloads/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FLASHES))
        .mount(server)
        .await;
}

async fn mount_language(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/languages/l:af"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "id": "l:af", "attributes": { "code": "af", "name": "Afrikaans" } }
        })))
        .mount(server)
        .await;
}

fn archive_entries(path: &std::path::Path) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

// ==================== Pipeline Runs ====================

#[tokio::test]
async fn test_single_language_is_packaged() {
    let server = MockServer::start().await;
    mount_resources(&server).await;
    mount_stats(&server).await;
    mount_download(&server).await;
    mount_language(&server).await;
    let root = TempDir::new().unwrap();

    let summary = pipeline::run(&client(&server), &options(&root), None)
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Clean);
    assert_eq!(summary.downloads.len(), 1);
    assert_eq!(summary.downloads[0].status, DownloadStatus::Fulfilled);

    let ini = root.path().join("translations/af/AddonBundle/flashes.ini");
    assert_eq!(std::fs::read_to_string(&ini).unwrap(), FLASHES);

    let zip_path = summary.packages_dir.join("af.zip");
    assert_eq!(
        archive_entries(&zip_path),
        vec![
            "af/AddonBundle/",
            "af/AddonBundle/flashes.ini",
            "af/config.json",
            "af/config.php"
        ]
    );

    let mut archive = zip::ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
    let mut php = String::new();
    archive
        .by_name("af/config.php")
        .unwrap()
        .read_to_string(&mut php)
        .unwrap();
    assert!(php.contains("'name' => 'Afrikaans',"));
    assert!(php.contains("'author' => 'Mautic Translators',"));

    let manifest = std::fs::read_to_string(&summary.build.manifest_path).unwrap();
    let manifest: serde_json::Value = serde_json::from_str(&manifest).unwrap();
    assert_eq!(manifest, json!([{ "name": "Afrikaans", "code": "af" }]));
}

#[tokio::test]
async fn test_persistent_transport_failure_completes_with_warnings() {
    let server = MockServer::start().await;
    mount_resources(&server).await;
    mount_stats(&server).await;
    Mock::given(method("POST"))
        .and(path("/resource_translations_async_downloads"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream unavailable"))
        .expect(3)
        .mount(&server)
        .await;
    let root = TempDir::new().unwrap();

    let summary = pipeline::run(&client(&server), &options(&root), None)
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::CompletedWithWarnings { warnings: 1 });
    assert_eq!(summary.downloads[0].status, DownloadStatus::Failed);
    assert_eq!(summary.downloads[0].attempts, 3);
    assert!(!root
        .path()
        .join("translations/af/AddonBundle/flashes.ini")
        .exists());
    assert!(summary.build.packaged.is_empty());

    let log = std::fs::read_to_string(&summary.error_log).unwrap();
    assert!(log.starts_with("Encountered error during "));
    assert!(log.contains("flashes.ini download."));
}

#[tokio::test]
async fn test_resource_listing_failure_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resources"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "errors": [{ "status": "400", "detail": "bad filter" }]
        })))
        .mount(&server)
        .await;
    let root = TempDir::new().unwrap();

    let result = pipeline::run(&client(&server), &options(&root), None).await;

    match result {
        Err(e @ PackerError::ResourceEnumeration(_)) => {
            assert!(e
                .to_string()
                .starts_with("Encountered error during fetching all resources."));
        }
        other => panic!("expected enumeration failure, got {:?}", other.map(|s| s.status)),
    }
}

// ==================== Client Behaviour ====================

#[tokio::test]
async fn test_collections_follow_next_links() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resources"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [resource("first", "CoreBundle messages")],
            "links": { "next": format!("{}/resources?page=2", server.uri()) }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/resources"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [resource("second", "CoreBundle flashes")],
            "links": { "next": null }
        })))
        .with_priority(1)
        .mount(&server)
        .await;

    let resources = client(&server).list_resources().await.unwrap();

    let slugs: Vec<_> = resources.iter().map(|r| r.slug.as_str()).collect();
    assert_eq!(slugs, vec!["first", "second"]);
}

#[tokio::test]
async fn test_failed_download_job_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/resource_translations_async_downloads"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "data": { "id": "job-9", "attributes": { "status": "pending", "errors": [] } }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/resource_translations_async_downloads/job-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "id": "job-9",
                "attributes": { "status": "failed", "errors": [{ "detail": "boom" }] }
            }
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .download_translation("addonbundle-flashes", "af")
        .await
        .unwrap_err();

    assert!(err.to_string().contains("boom"));
}

#[tokio::test]
async fn test_unknown_language_has_no_details() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/languages/l:xx"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "id": "l:xx", "attributes": {} }
        })))
        .mount(&server)
        .await;

    let details = client(&server).language_details("xx").await.unwrap();

    assert!(details.is_none());
}
