mod bot;
mod commands;
mod config;
mod platform;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::{Dispatcher, DispatcherCell};
use crate::config::{Config, LogConfig};
use crate::platform::telegram::TelegramClient;

fn init_logging(log: &LogConfig) {
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info,hookbot=debug".into()),
    );
    let layer = tracing_subscriber::fmt::layer()
        .with_file(log.show_caller())
        .with_line_number(log.show_caller());

    match (log.show_time(), log.time_format()) {
        (false, _) => registry.with(layer.without_time()).init(),
        (true, Some(format)) => registry
            .with(layer.with_timer(ChronoLocal::new(format.to_string())))
            .init(),
        (true, None) => registry.with(layer).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Optional TOML file; environment variables override it
    let config_path = std::env::args().nth(1).map(PathBuf::from);

    let config = Config::load(config_path.as_deref()).context("Failed to load configuration")?;

    init_logging(&config.log);

    info!("Configuration loaded successfully");
    info!("  API: {}", config.api);
    info!("  Port: {}", config.port);
    info!("  Webhook path: {}", config.webhook_path);
    info!("  Failure policy: {:?}", config.policy);

    let cell = DispatcherCell::new();
    let dispatcher = cell.get_or_init(|| {
        let client = TelegramClient::new(&config.api, &config.token);
        let mut dispatcher = Dispatcher::new(client).with_policy(config.policy);
        commands::register_defaults(&mut dispatcher);
        dispatcher
    });

    info!("Commands: {:?}", dispatcher.commands());
    info!("Bot is starting...");
    bot::run(dispatcher, config.port, &config.webhook_path).await?;

    Ok(())
}
