mod app;
mod cli;
mod settings;

use anyhow::{Context, Result};
use clap::Parser;

use crate::cli::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_level()))
        .init();

    let settings_path = cli
        .config
        .clone()
        .unwrap_or_else(settings::get_settings_path);
    let mut settings = settings::load_settings(&settings_path);
    settings.apply_env(|name| std::env::var(name).ok());
    if let Some(url) = cli.panel_url.clone() {
        settings.panel_url = url;
    }
    if let Some(key) = cli.api_key.clone() {
        settings.api_key = Some(key);
    }
    log::debug!("Using settings {:?}", settings);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .thread_name("panel-session")
        .build()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(app::run(settings, cli.route))
}
