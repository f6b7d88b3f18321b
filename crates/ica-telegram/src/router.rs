use std::{sync::Arc, time::Duration};

use teloxide::{
    dispatching::{Dispatcher, ShutdownToken},
    dptree,
    prelude::*,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use ica_core::{assistant::Assistant, config::Config, security::RateLimiter};

use crate::handlers;

pub struct AppState {
    pub cfg: Arc<Config>,
    pub assistant: Arc<Assistant>,
    pub rate_limiter: Mutex<RateLimiter>,
}

impl AppState {
    pub fn new(cfg: Arc<Config>, assistant: Arc<Assistant>) -> Self {
        let rate_limiter = Mutex::new(RateLimiter::new(
            cfg.rate_limit_enabled,
            cfg.rate_limit_requests,
            cfg.rate_limit_window,
        ));
        Self {
            cfg,
            assistant,
            rate_limiter,
        }
    }
}

const SHUTDOWN_RETRY: Duration = Duration::from_millis(100);

/// Long-poll Telegram until `cancel` fires.
pub async fn run_polling(
    cfg: Arc<Config>,
    assistant: Arc<Assistant>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let Some(token) = cfg.telegram_bot_token.clone() else {
        anyhow::bail!("TELEGRAM_BOT_TOKEN is not set");
    };
    run_with_bot(Bot::new(token), cfg, assistant, cancel).await
}

pub async fn run_with_bot(
    bot: Bot,
    cfg: Arc<Config>,
    assistant: Arc<Assistant>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let me = tokio::select! {
        _ = cancel.cancelled() => {
            tracing::info!("telegram bot cancelled before start");
            return Ok(());
        }
        me = async { bot.get_me().await } => me,
    };
    match me {
        Ok(me) => tracing::info!(username = %me.username(), "telegram bot started"),
        Err(e) => anyhow::bail!("telegram getMe failed: {e}"),
    }
    if cfg.telegram_allowed_users.is_empty() {
        tracing::info!("telegram bot open to all users");
    } else {
        tracing::info!(
            allowed = cfg.telegram_allowed_users.len(),
            "telegram bot restricted to allow-list"
        );
    }

    let state = Arc::new(AppState::new(cfg, assistant));

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build();

    if cancel.is_cancelled() {
        return Ok(());
    }

    let stopper = tokio::spawn(stop_on_cancel(dispatcher.shutdown_token(), cancel));
    dispatcher.dispatch().await;
    stopper.abort();

    tracing::info!("telegram bot stopped");
    Ok(())
}

/// The dispatcher rejects shutdown until it is running, so keep asking.
async fn stop_on_cancel(token: ShutdownToken, cancel: CancellationToken) {
    cancel.cancelled().await;
    loop {
        match token.shutdown() {
            Ok(done) => {
                done.await;
                return;
            }
            Err(e) => {
                tracing::debug!(error = %e, "bot dispatcher not running yet; retrying shutdown");
                tokio::time::sleep(SHUTDOWN_RETRY).await;
            }
        }
    }
}
