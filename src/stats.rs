use crate::downloader::Downloader;
use crate::transifex::TranslationApi;
use crate::types::{DownloadStatus, LanguageFilter, LanguageStat, Resource, RunState, TranslationTask};
use log::{debug, error, info};
use std::path::PathBuf;

/// Decides which languages of a resource qualify and hands them to the [`Downloader`].
pub struct StatsEvaluator<'a> {
    api: &'a dyn TranslationApi,
    downloader: Downloader<'a>,
    translations_dir: PathBuf,
    filter: LanguageFilter,
    completion: u32,
    bypass_completion: bool,
}

impl<'a> StatsEvaluator<'a> {
    pub fn new(
        api: &'a dyn TranslationApi,
        downloader: Downloader<'a>,
        translations_dir: PathBuf,
        filter: LanguageFilter,
        completion: u32,
        bypass_completion: bool,
    ) -> Self {
        Self {
            api,
            downloader,
            translations_dir,
            filter,
            completion,
            bypass_completion,
        }
    }

    /// Processes every qualifying language of `resource`; returns how many tasks ran.
    pub async fn process_resource(&self, resource: &Resource, state: &mut RunState) -> usize {
        let Some((bundle, file)) = resource.bundle_and_file() else {
            debug!(
                "Skipping resource {} with malformed name {:?}",
                resource.slug, resource.name
            );
            return 0;
        };

        let mut processed = 0;
        match &self.filter {
            LanguageFilter::Only(languages) => {
                for language in languages {
                    if let Some(stats) = self.fetch_stats(resource, Some(language), state).await {
                        processed += self.process_stats(resource, bundle, file, stats, state).await;
                    }
                }
            }
            _ => {
                if let Some(stats) = self.fetch_stats(resource, None, state).await {
                    processed += self.process_stats(resource, bundle, file, stats, state).await;
                }
            }
        }
        processed
    }

    async fn fetch_stats(
        &self,
        resource: &Resource,
        language: Option<&str>,
        state: &mut RunState,
    ) -> Option<Vec<LanguageStat>> {
        match self.api.language_stats(&resource.slug, language).await {
            Ok(stats) => Some(stats),
            Err(e) => {
                let mut message = format!(
                    "Encountered error during fetching statistics for \"{}\" resource",
                    resource.slug
                );
                if let Some(language) = language {
                    message.push_str(&format!(" of \"{}\" language.", language));
                }
                message.push_str(&format!(" Error: {}", e));
                error!("{}", message);
                state.errors.append(message);
                None
            }
        }
    }

    async fn process_stats(
        &self,
        resource: &Resource,
        bundle: &str,
        file: &str,
        stats: Vec<LanguageStat>,
        state: &mut RunState,
    ) -> usize {
        let mut processed = 0;

        for stat in stats {
            let language = stat.language_code().to_string();

            if !self.qualifies(&stat, &language, state) {
                continue;
            }

            state.codes.register(&language);
            info!(
                "Processing the {} \"{}\" resource in \"{}\" language.",
                bundle, file, language
            );

            let task = TranslationTask {
                slug: resource.slug.clone(),
                language: language.clone(),
                translations_dir: self.translations_dir.clone(),
                bundle: bundle.to_string(),
                file: file.to_string(),
                last_update: stat.last_update,
            };
            let report = self.downloader.download(task, &mut state.errors).await;

            if report.status == DownloadStatus::Rejected && state.skip.insert(&language) {
                info!("Language \"{}\" will not be packaged", language);
            }
            state.downloads.push(report);
            processed += 1;
        }

        processed
    }

    fn qualifies(&self, stat: &LanguageStat, language: &str, state: &RunState) -> bool {
        if language.is_empty() || state.skip.contains(language) || !self.filter.allows(language) {
            debug!("Skipping filtered language {:?}", language);
            return false;
        }
        if !self.bypass_completion && !stat.meets_threshold(self.completion) {
            debug!(
                "Skipping \"{}\" at {:.1}% completion (threshold {}%)",
                language,
                stat.completion_percent(),
                self.completion
            );
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::tests::FakeApi;
    use crate::downloader::RetryPolicy;
    use crate::types::SkipLanguages;
    use std::time::Duration;
    use tempfile::TempDir;

    const SLUG: &str = "addonbundle-flashes";

    fn resource(name: &str) -> Resource {
        Resource {
            slug: SLUG.to_string(),
            name: name.to_string(),
        }
    }

    fn stat(language: &str, translated: u64, total: u64) -> LanguageStat {
        LanguageStat {
            id: format!("o:mautic:p:mautic:r:{}:l:{}", SLUG, language),
            translated_words: translated,
            total_words: total,
            last_update: "2015-05-21T08:06:10Z".to_string(),
        }
    }

    fn api_with(stats: Vec<LanguageStat>) -> FakeApi {
        let mut api = FakeApi::default();
        api.stats.insert(SLUG.to_string(), stats);
        api
    }

    fn evaluator<'a>(
        api: &'a FakeApi,
        dir: &TempDir,
        filter: LanguageFilter,
        bypass: bool,
    ) -> StatsEvaluator<'a> {
        let retry = RetryPolicy::new(3).with_base_delay(Duration::from_millis(1));
        StatsEvaluator::new(
            api,
            Downloader::new(api, retry),
            dir.path().to_path_buf(),
            filter,
            80,
            bypass,
        )
    }

    fn state(dir: &TempDir, skip: &[&str]) -> RunState {
        RunState::new(SkipLanguages::new(skip.iter().copied()), &dir.path().join("errors.txt"))
    }

    #[tokio::test]
    async fn test_threshold_boundary() {
        let dir = TempDir::new().unwrap();
        let api = api_with(vec![stat("af", 80, 100), stat("cs", 79, 100)]);
        api.script(SLUG, "af", vec![Ok("key=\"value\"")]);
        let mut state = state(&dir, &[]);

        let processed = evaluator(&api, &dir, LanguageFilter::All, false)
            .process_resource(&resource("AddonBundle flashes"), &mut state)
            .await;

        assert_eq!(processed, 1);
        assert_eq!(
            *api.download_calls.lock().unwrap(),
            vec![(SLUG.to_string(), "af".to_string())]
        );
    }

    #[tokio::test]
    async fn test_bypass_includes_everything() {
        let dir = TempDir::new().unwrap();
        let api = api_with(vec![stat("af", 80, 100), stat("cs", 0, 100), stat("de", 0, 0)]);
        for language in ["af", "cs", "de"] {
            api.script(SLUG, language, vec![Ok("key=\"value\"")]);
        }
        let mut state = state(&dir, &[]);

        let processed = evaluator(&api, &dir, LanguageFilter::All, true)
            .process_resource(&resource("AddonBundle flashes"), &mut state)
            .await;

        assert_eq!(processed, 3);
        assert!(state.errors.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_name_is_skipped_silently() {
        let dir = TempDir::new().unwrap();
        let api = api_with(vec![stat("af", 100, 100)]);
        let mut state = state(&dir, &[]);

        let processed = evaluator(&api, &dir, LanguageFilter::All, false)
            .process_resource(&resource("AddonBundleFlashes"), &mut state)
            .await;

        assert_eq!(processed, 0);
        assert!(api.stats_calls.lock().unwrap().is_empty());
        assert!(state.errors.is_empty());
    }

    #[tokio::test]
    async fn test_skip_list_and_source_language() {
        let dir = TempDir::new().unwrap();
        let api = api_with(vec![stat("en", 100, 100), stat("af", 100, 100), stat("es", 100, 100)]);
        api.script(SLUG, "es", vec![Ok("key=\"valor\"")]);
        let mut state = state(&dir, &["en", "af"]);

        let processed = evaluator(&api, &dir, LanguageFilter::All, false)
            .process_resource(&resource("AddonBundle flashes"), &mut state)
            .await;

        assert_eq!(processed, 1);
        assert_eq!(api.download_calls.lock().unwrap()[0].1, "es");
    }

    #[tokio::test]
    async fn test_allow_list_scopes_statistics_requests() {
        let dir = TempDir::new().unwrap();
        let api = api_with(vec![stat("af", 100, 100), stat("cs", 100, 100)]);
        api.script(SLUG, "cs", vec![Ok("key=\"hodnota\"")]);
        let mut state = state(&dir, &[]);
        let filter = LanguageFilter::Only(["cs".to_string()].into());

        let processed = evaluator(&api, &dir, filter, false)
            .process_resource(&resource("AddonBundle flashes"), &mut state)
            .await;

        assert_eq!(processed, 1);
        assert_eq!(
            *api.stats_calls.lock().unwrap(),
            vec![(SLUG.to_string(), Some("cs".to_string()))]
        );
    }

    #[tokio::test]
    async fn test_stats_failure_is_logged_and_skipped() {
        let dir = TempDir::new().unwrap();
        let mut api = api_with(vec![]);
        api.failing_stats.push(SLUG.to_string());
        let mut state = state(&dir, &[]);
        let filter = LanguageFilter::Only(["es".to_string()].into());

        let processed = evaluator(&api, &dir, filter, false)
            .process_resource(&resource("AddonBundle flashes"), &mut state)
            .await;

        assert_eq!(processed, 0);
        assert_eq!(state.errors.len(), 1);
        assert!(state.errors.entries()[0].contains(
            "fetching statistics for \"addonbundle-flashes\" resource of \"es\" language."
        ));
    }

    #[tokio::test]
    async fn test_rejected_content_adds_language_to_skip_set() {
        let dir = TempDir::new().unwrap();
        let api = api_with(vec![stat("af", 100, 100)]);
        api.script(SLUG, "af", vec![Ok("true=\"x\"")]);
        let mut state = state(&dir, &[]);

        evaluator(&api, &dir, LanguageFilter::All, false)
            .process_resource(&resource("AddonBundle flashes"), &mut state)
            .await;

        assert!(state.skip.contains("af"));
        assert_eq!(state.downloads[0].status, DownloadStatus::Rejected);
    }
}
