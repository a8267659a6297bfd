use anyhow::Result;
use clap::Parser;
use colored::*;
use language_packer::cli::Cli;
use language_packer::config::Config;
use language_packer::downloader::RetryPolicy;
use language_packer::pipeline::{self, RunOptions};
use language_packer::publisher::{ObjectStore, S3Store};
use language_packer::transifex::{ClientSettings, TransifexClient};
use language_packer::types::{DownloadStatus, RunStatus, RunSummary};
use log::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Starting language packer");

    let cli = Cli::parse();
    let config = Config::from_env()?;
    info!(
        "Packing {}/{} at {}% completion",
        config.organisation, config.project, config.completion
    );

    let settings = ClientSettings::new(&config.api_token, &config.organisation, &config.project)
        .with_base_url(&config.api_url);
    let client = TransifexClient::new(settings)?;

    let store = if cli.upload_package {
        Some(S3Store::connect(config.s3_bucket.clone(), config.aws_region.clone()).await?)
    } else {
        None
    };

    let options = RunOptions {
        filter: cli.language_filter(),
        bypass_completion: cli.bypass_completion,
        completion: config.completion,
        retry: RetryPolicy::new(config.max_attempts),
        translations_dir: config.translations_dir.clone(),
        packages_dir: config.packages_dir.clone(),
        source_language: config.source_language.clone(),
        key_prefix: config.s3_key_prefix.clone(),
        show_progress: !cli.quiet,
    };

    match pipeline::run(&client, &options, store.as_ref().map(|s| s as &dyn ObjectStore)).await {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", "Language packing failed".red());
            Err(e.into())
        }
    }
}

fn print_summary(summary: &RunSummary) {
    let count = |status: DownloadStatus| {
        summary
            .downloads
            .iter()
            .filter(|r| r.status == status)
            .count()
    };

    println!("\n{}", "Run Summary:".bold());
    println!("Translation files: {}", summary.downloads.len());
    println!("Downloaded: {}", count(DownloadStatus::Fulfilled).to_string().green());
    println!("Failed: {}", count(DownloadStatus::Failed).to_string().red());
    println!("Rejected: {}", count(DownloadStatus::Rejected).to_string().red());
    println!(
        "Packages: {} built, {} failed, in {}",
        summary.build.packaged.len().to_string().green(),
        summary.build.failed.to_string().red(),
        summary.packages_dir.display()
    );
    println!("Manifest: {}", summary.build.manifest_path.display());

    if let Some(publish) = &summary.publish {
        println!(
            "Uploaded: {} files, {} failures",
            publish.uploaded.len().to_string().green(),
            publish.failures.len().to_string().red()
        );
    }

    let failed: Vec<_> = summary
        .downloads
        .iter()
        .filter(|r| r.status != DownloadStatus::Fulfilled)
        .collect();
    if !failed.is_empty() {
        println!("\n{}", "Failed Downloads:".red().bold());
        for report in failed {
            println!(
                "✗ {} - Error: {}",
                report.task.file_path().display().to_string().red(),
                report.error.as_deref().unwrap_or("unknown")
            );
        }
    }

    match summary.status {
        RunStatus::Clean => println!("\n{}", "All languages packaged successfully".green()),
        RunStatus::CompletedWithWarnings { warnings } => println!(
            "\n{} (see {})",
            format!("Completed with {} warnings", warnings).yellow(),
            summary.error_log.display()
        ),
    }
}
