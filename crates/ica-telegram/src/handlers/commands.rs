use ica_core::tools::parse_hours;
use serde_json::Value;

use crate::router::AppState;

pub const HELP_TEXT: &str = "Intelligent Crypto Assistant\n\n\
/market - market overview (sentiment, dominance, whale moves)\n\
/coin <id> - coin details by CoinGecko id, e.g. /coin bitcoin\n\
/news [hours] - Telegram channel news, 1-72 hours (default 1)\n\
/help - this message";

#[derive(Clone, Debug, PartialEq, Eq)]
enum BotCommand {
    Help,
    Market,
    Coin(String),
    News(String),
    Unknown(String),
}

fn parse_command(text: &str) -> BotCommand {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    match cmd.as_str() {
        "start" | "help" => BotCommand::Help,
        "market" | "overview" => BotCommand::Market,
        "coin" => BotCommand::Coin(rest),
        "news" => BotCommand::News(rest),
        other => BotCommand::Unknown(other.to_string()),
    }
}

/// Produce the reply text for a command message from `user_id`.
pub(super) async fn respond(state: &AppState, user_id: i64, text: &str) -> String {
    let (allowed, retry_after) = state.rate_limiter.lock().await.check(user_id);
    if !allowed {
        let secs = retry_after.map(|d| d.as_secs_f64().ceil() as u64).unwrap_or(1);
        return format!("Rate limited. Try again in {secs}s.");
    }

    let cmd = parse_command(text);
    tracing::debug!(user_id, ?cmd, "telegram command");

    let result = match cmd {
        BotCommand::Help => return HELP_TEXT.to_string(),
        BotCommand::Market => Ok(state.assistant.market_overview().await),
        BotCommand::Coin(id) if id.is_empty() => {
            return "Usage: /coin <coingecko id>\nExample: /coin bitcoin".to_string()
        }
        BotCommand::Coin(id) => state.assistant.coin_details(&id).await,
        BotCommand::News(arg) => {
            let hours = if arg.is_empty() {
                None
            } else {
                Some(Value::String(arg))
            };
            match parse_hours(hours.as_ref()) {
                Ok(h) => state.assistant.realtime_news(h).await,
                Err(e) => Err(e),
            }
        }
        BotCommand::Unknown(name) => {
            return format!("Unknown command /{name}\n\n{HELP_TEXT}");
        }
    };

    match result {
        Ok(text) => text,
        Err(e) => format!("⚠️ {}", e.user_message()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::state;

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command("/help"), BotCommand::Help);
        assert_eq!(parse_command("/start"), BotCommand::Help);
        assert_eq!(parse_command("/Market@ica_bot"), BotCommand::Market);
        assert_eq!(
            parse_command("/coin  bitcoin "),
            BotCommand::Coin("bitcoin".to_string())
        );
        assert_eq!(parse_command("/news"), BotCommand::News(String::new()));
        assert_eq!(
            parse_command("/price btc"),
            BotCommand::Unknown("price".to_string())
        );
    }

    #[tokio::test]
    async fn responds_to_commands() {
        let s = state(&[("NEWS_CHANNELS", "news")]);

        let market = respond(&s, 1, "/market").await;
        assert!(market.contains("'Fear' (index: 40)"));
        assert!(!market.contains("Dominance"));

        let coin = respond(&s, 1, "/coin nocoin").await;
        assert_eq!(coin, "⚠️ coin 'nocoin' was not found");

        assert!(respond(&s, 1, "/coin").await.starts_with("Usage: /coin"));

        let news = respond(&s, 1, "/news 6").await;
        assert!(news.starts_with("Top news from the last 6 hour(s):"));
        assert!(news.contains("@news: headline"));

        let bad = respond(&s, 1, "/news 100").await;
        assert_eq!(bad, "⚠️ 'hours' must be between 1 and 72");

        assert!(respond(&s, 1, "/foo").await.starts_with("Unknown command /foo"));
    }

    #[tokio::test]
    async fn rate_limits_per_user() {
        let s = state(&[("NEWS_CHANNELS", "news"), ("RATE_LIMIT_REQUESTS", "1")]);
        assert_eq!(respond(&s, 5, "/help").await, HELP_TEXT);
        let limited = respond(&s, 5, "/help").await;
        assert!(limited.starts_with("Rate limited."));
        assert_eq!(respond(&s, 6, "/help").await, HELP_TEXT);
    }
}
