//! Pulls translations from Transifex, validates them and packs one archive per language.

pub mod cli;
pub mod config;
pub mod downloader;
pub mod error;
pub mod escaper;
pub mod packager;
pub mod pipeline;
pub mod publisher;
pub mod report;
pub mod resources;
pub mod stats;
pub mod transifex;
pub mod types;
pub mod validator;
pub mod workspace;
