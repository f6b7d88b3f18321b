//! Tool registry exposed over MCP.

use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    assistant::{Assistant, MAX_NEWS_HOURS, MIN_NEWS_HOURS},
    errors::Error,
    Result,
};

pub const GET_MARKET_OVERVIEW: &str = "get_market_overview";
pub const GET_COIN_DETAILS: &str = "get_coin_details";
pub const GET_REALTIME_NEWS: &str = "get_realtime_news";

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

/// Result of a tool invocation. Failures are reported to the model as text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolOutcome {
    pub text: String,
    pub is_error: bool,
}

impl ToolOutcome {
    fn ok(text: String) -> Self {
        Self {
            text,
            is_error: false,
        }
    }

    fn from_result(res: Result<String>) -> Self {
        match res {
            Ok(text) => Self::ok(text),
            Err(e) => {
                tracing::info!(error = %e, "tool call failed");
                Self {
                    text: e.user_message(),
                    is_error: true,
                }
            }
        }
    }
}

pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: GET_MARKET_OVERVIEW,
            description: "Brief the current state of the crypto market: sentiment (Fear & Greed index), BTC/ETH dominance and notable whale fund movements from the last hour.",
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
        ToolSpec {
            name: GET_COIN_DETAILS,
            description: "Show details for one cryptocurrency: market cap rank, current KRW price and homepage. Requires a CoinGecko id such as 'bitcoin'.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "coin_id": {
                        "type": "string",
                        "description": "CoinGecko coin id, e.g. 'bitcoin' or 'ethereum'"
                    }
                },
                "required": ["coin_id"]
            }),
        },
        ToolSpec {
            name: GET_REALTIME_NEWS,
            description: "Fetch the latest crypto news posted to tracked Telegram channels. Only the last 72 hours (3 days) can be queried.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "hours": {
                        "type": "integer",
                        "description": "How many hours back to look. Default 1, maximum 72.",
                        "default": 1,
                        "minimum": MIN_NEWS_HOURS,
                        "maximum": MAX_NEWS_HOURS
                    }
                }
            }),
        },
    ]
}

/// Dispatch a tool call. Returns `None` for an unknown tool name.
pub async fn call_tool(assistant: &Assistant, name: &str, arguments: &Value) -> Option<ToolOutcome> {
    let outcome = match name {
        GET_MARKET_OVERVIEW => ToolOutcome::ok(assistant.market_overview().await),
        GET_COIN_DETAILS => {
            let res = match required_str(arguments, "coin_id") {
                Ok(id) => assistant.coin_details(&id).await,
                Err(e) => Err(e),
            };
            ToolOutcome::from_result(res)
        }
        GET_REALTIME_NEWS => {
            let res = match parse_hours(arguments.get("hours")) {
                Ok(hours) => assistant.realtime_news(hours).await,
                Err(e) => Err(e),
            };
            ToolOutcome::from_result(res)
        }
        _ => return None,
    };
    Some(outcome)
}

fn required_str(args: &Value, key: &str) -> Result<String> {
    match args.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Null) | None => Err(Error::InvalidArgument(format!(
            "missing required argument '{key}'"
        ))),
        Some(other) => Err(Error::InvalidArgument(format!(
            "'{key}' must be a string, got {other}"
        ))),
    }
}

/// Accept integers, integral floats and numeric strings; default 1.
pub fn parse_hours(v: Option<&Value>) -> Result<u32> {
    let out_of_range = || {
        Error::InvalidArgument(format!(
            "'hours' must be between {MIN_NEWS_HOURS} and {MAX_NEWS_HOURS}"
        ))
    };

    let n: i64 = match v {
        None | Some(Value::Null) => return Ok(MIN_NEWS_HOURS),
        Some(Value::Number(n)) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i,
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < 1e9 => f as i64,
            _ => return Err(Error::InvalidArgument("'hours' must be an integer".to_string())),
        },
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| Error::InvalidArgument("'hours' must be an integer".to_string()))?,
        Some(_) => return Err(Error::InvalidArgument("'hours' must be an integer".to_string())),
    };

    u32::try_from(n)
        .ok()
        .filter(|h| (MIN_NEWS_HOURS..=MAX_NEWS_HOURS).contains(h))
        .ok_or_else(out_of_range)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::assistant::{
        testing::{FakeFeed, FakeMarket},
        Channels,
    };
    use crate::ports::ChannelFeed;

    fn assistant() -> Assistant {
        let feed: Arc<dyn ChannelFeed> =
            Arc::new(FakeFeed::default().with("news", 1, 1, "headline"));
        Assistant::new(
            Arc::new(FakeMarket::default()),
            Some(feed),
            Channels {
                news: vec!["news".to_string()],
                whale: "whales".to_string(),
            },
        )
    }

    #[test]
    fn specs_cover_three_tools() {
        let specs = tool_specs();
        let names: Vec<_> = specs.iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![GET_MARKET_OVERVIEW, GET_COIN_DETAILS, GET_REALTIME_NEWS]
        );
        let v = serde_json::to_value(&specs[1]).unwrap();
        assert_eq!(v["inputSchema"]["required"], json!(["coin_id"]));
    }

    #[test]
    fn hours_parsing() {
        assert_eq!(parse_hours(None).unwrap(), 1);
        assert_eq!(parse_hours(Some(&json!(null))).unwrap(), 1);
        assert_eq!(parse_hours(Some(&json!(24))).unwrap(), 24);
        assert_eq!(parse_hours(Some(&json!(12.0))).unwrap(), 12);
        assert_eq!(parse_hours(Some(&json!(" 6 "))).unwrap(), 6);
        assert!(parse_hours(Some(&json!(0))).is_err());
        assert!(parse_hours(Some(&json!(73))).is_err());
        assert!(parse_hours(Some(&json!(-5))).is_err());
        assert!(parse_hours(Some(&json!(1.5))).is_err());
        assert!(parse_hours(Some(&json!([1]))).is_err());
    }

    #[tokio::test]
    async fn unknown_tool_is_none() {
        assert!(call_tool(&assistant(), "nope", &json!({})).await.is_none());
    }

    #[tokio::test]
    async fn tool_errors_become_error_outcomes() {
        let a = assistant();

        let missing = call_tool(&a, GET_COIN_DETAILS, &json!({})).await.unwrap();
        assert!(missing.is_error);
        assert_eq!(missing.text, "missing required argument 'coin_id'");

        let not_found = call_tool(&a, GET_COIN_DETAILS, &json!({"coin_id": "nocoin"}))
            .await
            .unwrap();
        assert!(not_found.is_error);
        assert!(not_found.text.contains("nocoin"));

        let range = call_tool(&a, GET_REALTIME_NEWS, &json!({"hours": 100}))
            .await
            .unwrap();
        assert!(range.is_error);
        assert_eq!(range.text, "'hours' must be between 1 and 72");
    }

    #[tokio::test]
    async fn successful_calls() {
        let a = assistant();

        let coin = call_tool(&a, GET_COIN_DETAILS, &json!({"coin_id": "bitcoin"}))
            .await
            .unwrap();
        assert!(!coin.is_error);
        assert!(coin.text.contains("(BTC)"));

        let news = call_tool(&a, GET_REALTIME_NEWS, &Value::Null).await.unwrap();
        assert!(!news.is_error);
        assert!(news.text.contains("@news: headline"));

        let overview = call_tool(&a, GET_MARKET_OVERVIEW, &json!({})).await.unwrap();
        assert!(overview.text.starts_with("Market overview briefing:"));
    }
}
