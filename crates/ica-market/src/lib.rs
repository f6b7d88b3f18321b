//! Market data adapter (CoinGecko + alternative.me).
//!
//! Implements the `ica-core` MarketData port over the public REST APIs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::HeaderMap, header::HeaderValue, StatusCode};
use serde_json::Value;

use ica_core::{
    config::Config,
    domain::{CoinDetails, FearGreed, GlobalMarket},
    errors::Error,
    ports::MarketData,
    Result,
};

const COINGECKO: &str = "coingecko";
const FEAR_GREED: &str = "alternative.me";
const API_KEY_HEADER: &str = "x-cg-demo-api-key";

#[derive(Clone, Debug)]
pub struct MarketApiClient {
    http: reqwest::Client,
    coingecko_base_url: String,
    coingecko_api_key: Option<String>,
    fear_greed_url: String,
}

impl MarketApiClient {
    pub fn new(
        coingecko_base_url: impl Into<String>,
        coingecko_api_key: Option<String>,
        fear_greed_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("accept", HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .user_agent(concat!("ica/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::External(format!("http client build failed: {e}")))?;

        Ok(Self {
            http,
            coingecko_base_url: coingecko_base_url.into().trim_end_matches('/').to_string(),
            coingecko_api_key,
            fear_greed_url: fear_greed_url.into(),
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(
            cfg.coingecko_base_url.clone(),
            cfg.coingecko_api_key.clone(),
            cfg.fear_greed_url.clone(),
            cfg.http_timeout,
        )
    }

    fn api_key(&self) -> Result<&str> {
        self.coingecko_api_key.as_deref().ok_or_else(|| {
            Error::Unavailable("CoinGecko API key is not configured on this server".to_string())
        })
    }

    async fn get_json(
        &self,
        service: &'static str,
        url: &str,
        api_key: Option<&str>,
    ) -> Result<(StatusCode, Value)> {
        let mut req = self.http.get(url);
        if let Some(key) = api_key {
            req = req.header(API_KEY_HEADER, key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| Error::External(format!("{service} request error: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Ok((status, Value::String(body.chars().take(200).collect())));
        }

        let v = resp
            .json::<Value>()
            .await
            .map_err(|e| Error::External(format!("{service} json error: {e}")))?;
        Ok((status, v))
    }
}

fn upstream(service: &'static str, status: StatusCode, body: Value) -> Error {
    Error::Upstream {
        service,
        status: status.as_u16(),
        message: body.as_str().unwrap_or_default().to_string(),
    }
}

#[async_trait]
impl MarketData for MarketApiClient {
    async fn fear_and_greed(&self) -> Result<FearGreed> {
        let (status, v) = self.get_json(FEAR_GREED, &self.fear_greed_url, None).await?;
        if !status.is_success() {
            return Err(upstream(FEAR_GREED, status, v));
        }
        parse_fear_greed(&v)
    }

    async fn global_market(&self) -> Result<GlobalMarket> {
        let key = self.api_key()?;
        let url = format!("{}/global", self.coingecko_base_url);
        let (status, v) = self.get_json(COINGECKO, &url, Some(key)).await?;
        if !status.is_success() {
            return Err(upstream(COINGECKO, status, v));
        }
        parse_global(&v)
    }

    async fn coin_details(&self, coin_id: &str) -> Result<CoinDetails> {
        let key = self.api_key()?;
        let url = format!(
            "{}/coins/{coin_id}?localization=false&tickers=false&community_data=false&developer_data=false",
            self.coingecko_base_url
        );
        let (status, v) = self.get_json(COINGECKO, &url, Some(key)).await?;
        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!(
                "coin '{coin_id}' was not found. Check the CoinGecko id."
            )));
        }
        if !status.is_success() {
            tracing::warn!(coin_id, status = status.as_u16(), "coingecko coin lookup failed");
            return Err(upstream(COINGECKO, status, v));
        }
        Ok(parse_coin(coin_id, &v))
    }
}

fn parse_fear_greed(v: &Value) -> Result<FearGreed> {
    let entry = v
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .ok_or_else(|| Error::External("fear & greed response has no data".to_string()))?;

    Ok(FearGreed {
        value: scalar_string(entry.get("value")),
        classification: scalar_string(entry.get("value_classification")),
    })
}

fn parse_global(v: &Value) -> Result<GlobalMarket> {
    let pct = v
        .get("data")
        .and_then(|d| d.get("market_cap_percentage"))
        .ok_or_else(|| {
            Error::External("global market response has no market_cap_percentage".to_string())
        })?;

    Ok(GlobalMarket {
        btc_dominance: pct.get("btc").and_then(|x| x.as_f64()).unwrap_or(0.0),
        eth_dominance: pct.get("eth").and_then(|x| x.as_f64()).unwrap_or(0.0),
    })
}

fn parse_coin(coin_id: &str, v: &Value) -> CoinDetails {
    let homepage = v
        .get("links")
        .and_then(|l| l.get("homepage"))
        .and_then(|h| h.as_array())
        .and_then(|h| h.first())
        .and_then(|x| x.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    CoinDetails {
        id: v
            .get("id")
            .and_then(|x| x.as_str())
            .unwrap_or(coin_id)
            .to_string(),
        name: scalar_string(v.get("name")),
        symbol: scalar_string(v.get("symbol")),
        market_cap_rank: v
            .get("market_cap_rank")
            .and_then(|x| x.as_u64())
            .and_then(|r| u32::try_from(r).ok()),
        price_krw: v
            .get("market_data")
            .and_then(|m| m.get("current_price"))
            .and_then(|p| p.get("krw"))
            .and_then(|x| x.as_f64()),
        homepage,
    }
}

/// Strings verbatim, numbers rendered, anything else empty.
fn scalar_string(v: Option<&Value>) -> String {
    match v {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        extract::Path,
        http::{HeaderMap as AxumHeaders, StatusCode as AxumStatus},
        routing::get,
        Json, Router,
    };
    use serde_json::json;

    use super::*;

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(base: &str, key: Option<&str>) -> MarketApiClient {
        MarketApiClient::new(
            format!("{base}/api/v3/"),
            key.map(|k| k.to_string()),
            format!("{base}/fng/?limit=1"),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn has_key(headers: &AxumHeaders) -> bool {
        headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) == Some("demo-key")
    }

    fn stub() -> Router {
        Router::new()
            .route(
                "/fng/",
                get(|| async {
                    Json(json!({
                        "name": "Fear and Greed Index",
                        "data": [{ "value": "64", "value_classification": "Greed", "timestamp": "1760572800" }]
                    }))
                }),
            )
            .route(
                "/api/v3/global",
                get(|headers: AxumHeaders| async move {
                    if !has_key(&headers) {
                        return (AxumStatus::UNAUTHORIZED, Json(json!({"error": "key"})));
                    }
                    (
                        AxumStatus::OK,
                        Json(json!({
                            "data": { "market_cap_percentage": { "btc": 57.31, "eth": 13.02, "usdt": 4.1 } }
                        })),
                    )
                }),
            )
            .route(
                "/api/v3/coins/:id",
                get(|Path(id): Path<String>, headers: AxumHeaders| async move {
                    if !has_key(&headers) {
                        return (AxumStatus::UNAUTHORIZED, Json(json!({"error": "key"})));
                    }
                    match id.as_str() {
                        "bitcoin" => (
                            AxumStatus::OK,
                            Json(json!({
                                "id": "bitcoin",
                                "symbol": "btc",
                                "name": "Bitcoin",
                                "market_cap_rank": 1,
                                "links": { "homepage": ["http://www.bitcoin.org", "", ""] },
                                "market_data": { "current_price": { "krw": 152345678, "usd": 110000 } }
                            })),
                        ),
                        "ratelimited" => (
                            AxumStatus::TOO_MANY_REQUESTS,
                            Json(json!({"status": {"error_code": 429}})),
                        ),
                        _ => (AxumStatus::NOT_FOUND, Json(json!({"error": "coin not found"}))),
                    }
                }),
            )
    }

    #[tokio::test]
    async fn fetches_fear_and_greed_without_key() {
        let base = spawn(stub()).await;
        let fg = client(&base, None).fear_and_greed().await.unwrap();
        assert_eq!(
            fg,
            FearGreed {
                value: "64".to_string(),
                classification: "Greed".to_string()
            }
        );
    }

    #[tokio::test]
    async fn global_market_sends_api_key() {
        let base = spawn(stub()).await;
        let g = client(&base, Some("demo-key")).global_market().await.unwrap();
        assert_eq!(g.btc_dominance, 57.31);
        assert_eq!(g.eth_dominance, 13.02);

        let err = client(&base, Some("wrong")).global_market().await.unwrap_err();
        assert!(matches!(err, Error::Upstream { status: 401, .. }));
    }

    #[tokio::test]
    async fn coingecko_calls_require_key() {
        let c = client("http://127.0.0.1:9", None);
        assert!(matches!(c.global_market().await, Err(Error::Unavailable(_))));
        assert!(matches!(
            c.coin_details("bitcoin").await,
            Err(Error::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn coin_details_maps_statuses() {
        let base = spawn(stub()).await;
        let c = client(&base, Some("demo-key"));

        let btc = c.coin_details("bitcoin").await.unwrap();
        assert_eq!(btc.name, "Bitcoin");
        assert_eq!(btc.symbol, "btc");
        assert_eq!(btc.market_cap_rank, Some(1));
        assert_eq!(btc.price_krw, Some(152_345_678.0));
        assert_eq!(btc.homepage.as_deref(), Some("http://www.bitcoin.org"));

        assert!(matches!(
            c.coin_details("no-such-coin").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            c.coin_details("ratelimited").await,
            Err(Error::Upstream { status: 429, .. })
        ));
    }

    #[tokio::test]
    async fn unreachable_upstream_is_external() {
        let c = client("http://127.0.0.1:9", Some("demo-key"));
        assert!(matches!(c.fear_and_greed().await, Err(Error::External(_))));
    }

    #[test]
    fn parses_sparse_payloads() {
        assert!(parse_fear_greed(&json!({"data": []})).is_err());
        assert!(parse_global(&json!({"data": {}})).is_err());

        let g = parse_global(&json!({"data": {"market_cap_percentage": {"btc": 50}}})).unwrap();
        assert_eq!(g.eth_dominance, 0.0);

        let coin = parse_coin(
            "mystery",
            &json!({"name": "Mystery", "symbol": "mys", "market_cap_rank": null, "links": {"homepage": [""]}}),
        );
        assert_eq!(coin.id, "mystery");
        assert_eq!(coin.market_cap_rank, None);
        assert_eq!(coin.price_krw, None);
        assert_eq!(coin.homepage, None);
    }
}
