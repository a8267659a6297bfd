use crate::error::PackerError;
use crate::stats::StatsEvaluator;
use crate::transifex::TranslationApi;
use crate::types::RunState;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;

/// Lists every resource once and feeds each one to the [`StatsEvaluator`].
///
/// Failing to list resources is the one fatal error of a run.
pub async fn process_all_resources(
    api: &dyn TranslationApi,
    evaluator: &StatsEvaluator<'_>,
    state: &mut RunState,
    show_progress: bool,
) -> Result<usize, PackerError> {
    let resources = api
        .list_resources()
        .await
        .map_err(PackerError::ResourceEnumeration)?;

    info!("Processing \"{}\" resources.", resources.len());

    let pb = create_progress_bar(resources.len() as u64, show_progress);
    let mut tasks = 0;

    for resource in &resources {
        pb.set_message(resource.slug.clone());
        if resource.slug.is_empty() || resource.name.is_empty() {
            pb.inc(1);
            continue;
        }
        tasks += evaluator.process_resource(resource, state).await;
        pb.inc(1);
    }

    pb.finish_with_message(format!("{} translation tasks", tasks));
    Ok(tasks)
}

fn create_progress_bar(len: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}
