use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hola_core::{AppConfig, LoadOptions, LogFormat};
use hola_slack::events::EventDispatcher;
use hola_slack::live::{SocketModeTransport, WebApiClient};
use hola_slack::socket::{ReconnectPolicy, SocketListener};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())
        .context("failed to load configuration")?;
    init_logging(&config);
    run(config).await
}

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(config: AppConfig) -> Result<()> {
    let chat: Arc<WebApiClient> = Arc::new(WebApiClient::new(config.slack.bot_token.clone()));
    let transport = Arc::new(SocketModeTransport::new(config.slack.app_token.clone()));
    let dispatcher = EventDispatcher::new(chat);

    let cancel = CancellationToken::new();
    let listener =
        SocketListener::new(transport, dispatcher, cancel.clone(), ReconnectPolicy::default());

    info!("starting socket mode listener");
    let mut listener_task = tokio::spawn(async move { listener.run().await });

    tokio::select! {
        outcome = &mut listener_task => {
            outcome.context("socket mode listener panicked")??;
            info!("socket mode listener stopped on its own");
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    cancel.cancel();
    listener_task.await.context("socket mode listener panicked")??;
    info!("shutdown complete");
    Ok(())
}
