use crate::types::LanguageFilter;
use clap::Parser;
use std::collections::BTreeSet;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Only package these languages (comma separated or repeated)
    #[arg(short, long, value_delimiter = ',', conflicts_with = "skip_languages")]
    pub languages: Vec<String>,

    /// Never package these languages (comma separated or repeated)
    #[arg(short, long, value_delimiter = ',')]
    pub skip_languages: Vec<String>,

    /// Include languages below the completion threshold
    #[arg(short, long)]
    pub bypass_completion: bool,

    /// Upload the built packages to S3
    #[arg(short, long)]
    pub upload_package: bool,

    /// Hide the progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    pub fn language_filter(&self) -> LanguageFilter {
        if !self.languages.is_empty() {
            LanguageFilter::Only(codes(&self.languages))
        } else if !self.skip_languages.is_empty() {
            LanguageFilter::Except(codes(&self.skip_languages))
        } else {
            LanguageFilter::All
        }
    }
}

fn codes(list: &[String]) -> BTreeSet<String> {
    list.iter()
        .map(|code| code.trim().to_string())
        .filter(|code| !code.is_empty())
        .collect()
}
