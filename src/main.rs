use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

mod app;
mod client;
mod config;
mod format;
mod handler;
mod logging;
mod status;
mod tui;
mod ui;

use app::App;
use client::ApiClient;
use config::{Config, BASE_URL_ENV};

#[derive(Parser)]
#[command(name = "alpha-insights")]
#[command(version, about = "Chat with the Alpha Insights sales-data assistant from the terminal")]
struct Cli {
    /// Backend base URL (overrides ALPHA_INSIGHTS_URL and the config file)
    #[arg(short, long)]
    base_url: Option<String>,

    /// Config file to use instead of the default location
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Where to write logs
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Save --base-url to the config file for future sessions
    #[arg(long, requires = "base_url")]
    remember: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::get_config_path()?,
    };
    let mut config = Config::load_from(&config_path)?;

    if cli.remember {
        config.base_url = cli.base_url.clone();
        config.save_to(&config_path)?;
    }

    let log_path = match cli.log_file.clone().or_else(|| config.log_file.clone()) {
        Some(path) => path,
        None => logging::default_log_path()?,
    };
    logging::init(&log_path)?;

    let env_url = std::env::var(BASE_URL_ENV).ok();
    let base_url = config.resolve_base_url(cli.base_url.as_deref(), env_url.as_deref());
    let client = ApiClient::new(&base_url);
    tracing::info!(base_url = %client.base_url(), "starting session");

    let mut app = App::new(Arc::new(client), base_url, config.status_clear_delay());

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let result = run(&mut terminal, &mut app).await;

    app.shutdown();
    tui::restore()?;

    if let Err(e) = &result {
        tracing::error!(error = %e, "session ended with error");
    }
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App) -> Result<()> {
    let mut events = tui::EventHandler::new(tui::TICK_RATE);

    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }

    tracing::info!(messages = app.messages.len(), "session closed");
    Ok(())
}
