use std::{sync::Arc, time::Duration};

use clap::Parser;
use tokio_util::sync::CancellationToken;

use ica_core::{
    assistant::{Assistant, Channels},
    cache::CachedMarketData,
    config::{Config, Transport},
    ports::{ChannelFeed, MarketData},
};
use ica_market::MarketApiClient;
use ica_mcp::McpServer;
use ica_telegram::TelegramWebFeed;

/// Crypto market briefing MCP server.
#[derive(Debug, Parser)]
#[command(name = "ica", version, about)]
struct Cli {
    /// `http` or `stdio`; overrides MCP_TRANSPORT.
    #[arg(long)]
    transport: Option<String>,

    /// Overrides HOST.
    #[arg(long)]
    host: Option<String>,

    /// Overrides PORT.
    #[arg(long)]
    port: Option<u16>,
}

const BOT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = Config::load()?;
    apply_cli_overrides(&mut cfg, cli)?;

    ica_core::logging::init("ica", &cfg.log_level)?;
    let cfg = Arc::new(cfg);

    let assistant = Arc::new(build_assistant(&cfg)?);
    log_integrations(&cfg);

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let bot = cfg.telegram_bot_token.is_some().then(|| {
        let (cfg, assistant, cancel) = (cfg.clone(), assistant.clone(), cancel.clone());
        tokio::spawn(async move {
            if let Err(e) = ica_telegram::router::run_polling(cfg, assistant, cancel).await {
                tracing::error!(error = %e, "telegram bot failed");
            }
        })
    });

    let server = Arc::new(McpServer::new(assistant, cfg.version.clone()));
    let served = match cfg.transport {
        Transport::Http => ica_mcp::http::serve(server, &cfg, cancel.clone()).await,
        Transport::Stdio => ica_mcp::stdio::serve(&server, cancel.clone()).await,
    };

    // The transport may end on its own (stdin EOF); stop the bot with it.
    cancel.cancel();
    if let Some(mut handle) = bot {
        match tokio::time::timeout(BOT_SHUTDOWN_TIMEOUT, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "telegram bot task did not finish cleanly"),
            Err(_) => {
                tracing::warn!("telegram bot did not stop in time; aborting");
                handle.abort();
            }
        }
    }

    served?;
    tracing::info!("shutdown complete");
    Ok(())
}

/// Command-line flags win over the environment and `.env`.
fn apply_cli_overrides(cfg: &mut Config, cli: Cli) -> ica_core::Result<()> {
    if let Some(t) = cli.transport.as_deref() {
        cfg.transport = t.parse()?;
    }
    if let Some(host) = cli.host {
        cfg.host = host;
    }
    if let Some(port) = cli.port {
        cfg.port = port;
    }
    Ok(())
}

fn build_assistant(cfg: &Config) -> ica_core::Result<Assistant> {
    let client: Arc<dyn MarketData> = Arc::new(MarketApiClient::from_config(cfg)?);
    let market = CachedMarketData::wrap(client, cfg.market_cache_ttl);

    let feed = if cfg.telegram_feed_enabled {
        let feed: Arc<dyn ChannelFeed> = Arc::new(TelegramWebFeed::from_config(cfg)?);
        Some(feed)
    } else {
        None
    };

    Ok(Assistant::new(market, feed, Channels::from_config(cfg)))
}

fn log_integrations(cfg: &Config) {
    tracing::info!(
        version = %cfg.version,
        transport = %cfg.transport,
        coingecko_key = cfg.coingecko_api_key.is_some(),
        market_cache_secs = cfg.market_cache_ttl.as_secs(),
        telegram_feed = cfg.telegram_feed_enabled,
        news_channels = cfg.news_channels.len(),
        whale_channel = %cfg.whale_channel,
        telegram_bot = cfg.telegram_bot_token.is_some(),
        mtproto_credentials = cfg.telegram_credentials.is_some(),
        "starting intelligent crypto assistant"
    );
    if cfg.coingecko_api_key.is_none() {
        tracing::warn!("COINGECKO_API_KEY is not set; dominance and coin details are unavailable");
    }
}

async fn cancel_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("shutdown signal received");
    cancel.cancel();
}
