use anyhow::Result;
use clap::Parser;

mod app;
mod client;
mod config;
mod handler;
mod stream;
mod transcript;
mod tui;
mod ui;

use app::App;
use client::{ChatParams, WorkerClient, DEFAULT_ENDPOINT};
use config::Config;

#[derive(Parser)]
#[command(name = "worker-chat")]
#[command(about = "Terminal chat client for a remote inference proxy")]
struct Cli {
    /// Proxy endpoint URL
    #[arg(long)]
    endpoint: Option<String>,
    /// Model to request
    #[arg(short, long)]
    model: Option<String>,
    /// System prompt
    #[arg(short, long)]
    system: Option<String>,
    /// Provider hint forwarded to the proxy
    #[arg(long)]
    provider: Option<String>,
    /// Sampling temperature (0.0 to 2.0)
    #[arg(short, long)]
    temperature: Option<f32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // CLI flags override the config file, which overrides the defaults.
    let config = Config::load().unwrap_or_else(|_| Config::new());
    let defaults = ChatParams::default();

    let endpoint = cli
        .endpoint
        .or(config.endpoint)
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
    let params = ChatParams {
        provider: cli.provider.or(config.provider),
        model: cli.model.or(config.default_model).unwrap_or(defaults.model),
        temperature: cli
            .temperature
            .or(config.temperature)
            .unwrap_or(defaults.temperature),
        system: cli.system.or(config.system_prompt).unwrap_or(defaults.system),
    };

    let mut app = App::new(WorkerClient::new(&endpoint), params);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();

    let result = run(&mut app, &mut terminal, &mut events).await;

    tui::restore()?;
    result
}

async fn run(app: &mut App, terminal: &mut tui::Tui, events: &mut tui::EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        let Some(event) = events.next().await else {
            break;
        };
        handler::handle_event(app, event, events.sender())?;
    }
    Ok(())
}
