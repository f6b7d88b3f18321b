//! Telegram update handlers.
//!
//! Each handler checks authorization, turns the update into an assistant
//! call and replies in plain text split to Telegram's message limit.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use ica_core::formatting::split_message;
use ica_core::security::is_authorized;

use crate::router::AppState;

mod commands;

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let user_id = msg.from().map(|u| u.id.0 as i64);

    if !is_authorized(user_id, &state.cfg.telegram_allowed_users) {
        tracing::info!(?user_id, "unauthorized telegram user");
        if let Err(e) = bot
            .send_message(
                msg.chat.id,
                "Unauthorized. Contact the bot owner for access.",
            )
            .await
        {
            tracing::warn!(chat_id = msg.chat.id.0, error = %e, "telegram send failed");
        }
        return Ok(());
    }

    let Some(text) = msg.text() else {
        return Ok(());
    };
    if !text.starts_with('/') {
        reply(&bot, &msg, &state, commands::HELP_TEXT).await;
        return Ok(());
    }

    if let Err(e) = bot
        .send_chat_action(msg.chat.id, teloxide::types::ChatAction::Typing)
        .await
    {
        tracing::debug!(chat_id = msg.chat.id.0, error = %e, "typing action failed");
    }

    let answer = commands::respond(&state, user_id.unwrap_or_default(), text).await;
    reply(&bot, &msg, &state, &answer).await;
    Ok(())
}

async fn reply(bot: &Bot, msg: &Message, state: &AppState, text: &str) {
    for chunk in split_message(text, state.cfg.telegram_safe_limit) {
        if let Err(e) = bot.send_message(msg.chat.id, chunk).await {
            tracing::warn!(chat_id = msg.chat.id.0, error = %e, "telegram send failed");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{private_message, spawn_bot_api, state};

    fn message(user_id: i64, text: &str) -> Message {
        serde_json::from_value(private_message(user_id, text)).unwrap()
    }

    #[tokio::test]
    async fn unauthorized_user_is_told_even_if_send_fails() {
        let api = spawn_bot_api(true).await;
        let bot = Bot::new("123:TEST").set_api_url(api.url.clone());
        let s = Arc::new(state(&[("TELEGRAM_ALLOWED_USERS", "1")]));

        handle_message(bot, message(5, "/market"), s).await.unwrap();

        let sent = api.bodies("sendmessage");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["chat_id"], 5);
        assert!(sent[0]["text"].as_str().unwrap().starts_with("Unauthorized."));
        assert!(api.bodies("sendchataction").is_empty());
    }

    #[tokio::test]
    async fn command_gets_typing_action_then_reply() {
        let api = spawn_bot_api(false).await;
        let bot = Bot::new("123:TEST").set_api_url(api.url.clone());
        let s = Arc::new(state(&[]));

        handle_message(bot, message(5, "/help"), s).await.unwrap();

        assert_eq!(api.methods(), vec!["sendchataction", "sendmessage"]);
        assert_eq!(api.bodies("sendmessage")[0]["text"], commands::HELP_TEXT);
    }

    #[tokio::test]
    async fn failed_sends_do_not_fail_the_handler() {
        let api = spawn_bot_api(true).await;
        let bot = Bot::new("123:TEST").set_api_url(api.url.clone());
        let s = Arc::new(state(&[]));

        assert!(handle_message(bot, message(5, "/help"), s).await.is_ok());
        assert_eq!(api.bodies("sendmessage").len(), 1);
    }
}
