use std::{
    env, fmt, fs,
    path::Path,
    str::FromStr,
    time::Duration,
};

use crate::{errors::Error, Result};

pub const DEFAULT_PORT: u16 = 8123;
pub const DEFAULT_NEWS_CHANNELS: &[&str] = &["wublockchainenglish", "watcherguru"];
pub const DEFAULT_WHALE_CHANNEL: &str = "whale_alert_io";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    Http,
    Stdio,
}

impl FromStr for Transport {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "http" | "streamable-http" => Ok(Transport::Http),
            "stdio" => Ok(Transport::Stdio),
            other => Err(Error::Config(format!(
                "MCP_TRANSPORT must be 'http' or 'stdio', got {other:?}"
            ))),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Http => f.write_str("http"),
            Transport::Stdio => f.write_str("stdio"),
        }
    }
}

/// MTProto application credentials.
///
/// Deployments inject these alongside the CoinGecko key. The public preview
/// feed does not need them; they are validated and reported at startup.
#[derive(Clone)]
pub struct TelegramCredentials {
    pub api_id: i32,
    pub api_hash: String,
}

impl fmt::Debug for TelegramCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramCredentials")
            .field("api_id", &self.api_id)
            .field("api_hash", &"<redacted>")
            .finish()
    }
}

/// Typed configuration, sourced from the environment (and `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Service
    pub log_level: String,
    pub version: String,
    pub transport: Transport,
    pub host: String,
    pub port: u16,
    pub mcp_path: String,
    pub mcp_session_idle_ttl: Duration,
    pub mcp_max_sessions: usize,

    // Market data
    pub coingecko_api_key: Option<String>,
    pub coingecko_base_url: String,
    pub fear_greed_url: String,
    pub http_timeout: Duration,
    pub market_cache_ttl: Duration,

    // Channel feed
    pub telegram_feed_enabled: bool,
    pub telegram_web_base_url: String,
    pub telegram_feed_max_pages: usize,
    pub news_channels: Vec<String>,
    pub whale_channel: String,
    pub telegram_credentials: Option<TelegramCredentials>,

    // Bot front-end
    pub telegram_bot_token: Option<String>,
    pub telegram_allowed_users: Vec<i64>,
    pub telegram_safe_limit: usize,
    pub rate_limit_enabled: bool,
    pub rate_limit_requests: u32,
    pub rate_limit_window: Duration,
}

impl Config {
    /// Load `.env` (without overriding the environment) and build the config.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let log_level = get("LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        let version = get("VERSION").unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

        let transport = match get("MCP_TRANSPORT") {
            Some(s) => s.parse()?,
            None => Transport::Http,
        };
        let host = get("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or("PORT", get("PORT"), DEFAULT_PORT)?;
        let mcp_path = normalize_path(&get("MCP_PATH").unwrap_or_else(|| "/mcp".to_string()));
        let mcp_session_idle_ttl = Duration::from_secs(
            parse_or("MCP_SESSION_IDLE_SECS", get("MCP_SESSION_IDLE_SECS"), 1800u64)?.max(1),
        );
        let mcp_max_sessions =
            parse_or("MCP_MAX_SESSIONS", get("MCP_MAX_SESSIONS"), 1000usize)?.max(1);

        let coingecko_api_key = get("COINGECKO_API_KEY");
        let coingecko_base_url = trim_slash(
            get("COINGECKO_BASE_URL")
                .unwrap_or_else(|| "https://api.coingecko.com/api/v3".to_string()),
        );
        let fear_greed_url = get("FEAR_GREED_URL")
            .unwrap_or_else(|| "https://api.alternative.me/fng/?limit=1".to_string());
        let http_timeout = Duration::from_secs(parse_or(
            "HTTP_TIMEOUT_SECS",
            get("HTTP_TIMEOUT_SECS"),
            10u64,
        )?);
        if http_timeout.is_zero() {
            return Err(Error::Config("HTTP_TIMEOUT_SECS must be positive".to_string()));
        }
        let market_cache_ttl = Duration::from_secs(parse_or(
            "MARKET_CACHE_TTL_SECS",
            get("MARKET_CACHE_TTL_SECS"),
            30u64,
        )?);

        let telegram_feed_enabled = parse_bool(get("TELEGRAM_FEED_ENABLED")).unwrap_or(true);
        let telegram_web_base_url = trim_slash(
            get("TELEGRAM_WEB_BASE_URL").unwrap_or_else(|| "https://t.me/s".to_string()),
        );
        let telegram_feed_max_pages =
            parse_or("TELEGRAM_FEED_MAX_PAGES", get("TELEGRAM_FEED_MAX_PAGES"), 5usize)?.max(1);
        let news_channels = parse_csv(get("NEWS_CHANNELS"))
            .unwrap_or_else(|| DEFAULT_NEWS_CHANNELS.iter().map(|s| s.to_string()).collect());
        let whale_channel =
            get("WHALE_CHANNEL").unwrap_or_else(|| DEFAULT_WHALE_CHANNEL.to_string());
        let telegram_credentials = match (get("TELEGRAM_API_ID"), get("TELEGRAM_API_HASH")) {
            (Some(id), Some(api_hash)) => Some(TelegramCredentials {
                api_id: id.trim().parse().map_err(|_| {
                    Error::Config(format!("TELEGRAM_API_ID must be numeric, got {id:?}"))
                })?,
                api_hash,
            }),
            _ => None,
        };

        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN");
        let telegram_allowed_users = parse_csv_i64(get("TELEGRAM_ALLOWED_USERS"));
        let telegram_safe_limit =
            parse_or("TELEGRAM_SAFE_LIMIT", get("TELEGRAM_SAFE_LIMIT"), 4000usize)?.max(200);
        let rate_limit_enabled = parse_bool(get("RATE_LIMIT_ENABLED")).unwrap_or(true);
        let rate_limit_requests =
            parse_or("RATE_LIMIT_REQUESTS", get("RATE_LIMIT_REQUESTS"), 20u32)?;
        let rate_limit_window = Duration::from_secs(parse_or(
            "RATE_LIMIT_WINDOW",
            get("RATE_LIMIT_WINDOW"),
            60u64,
        )?);

        Ok(Self {
            log_level,
            version,
            transport,
            host,
            port,
            mcp_path,
            mcp_session_idle_ttl,
            mcp_max_sessions,
            coingecko_api_key,
            coingecko_base_url,
            fear_greed_url,
            http_timeout,
            market_cache_ttl,
            telegram_feed_enabled,
            telegram_web_base_url,
            telegram_feed_max_pages,
            news_channels,
            whale_channel,
            telegram_credentials,
            telegram_bot_token,
            telegram_allowed_users,
            telegram_safe_limit,
            rate_limit_enabled,
            rate_limit_requests,
            rate_limit_window,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in dotenv_additions(&contents, |key| env::var_os(key).is_some()) {
        env::set_var(key, val);
    }
}

/// Entries of a `.env` file that are not already set; existing variables win.
fn dotenv_additions(contents: &str, is_set: impl Fn(&str) -> bool) -> Vec<(String, String)> {
    parse_dotenv(contents)
        .into_iter()
        .filter(|(key, _)| !is_set(key))
        .collect()
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        None => Ok(default),
        Some(s) => s
            .trim()
            .parse::<T>()
            .map_err(|_| Error::Config(format!("{key} has invalid value {s:?}"))),
    }
}

fn parse_bool(v: Option<String>) -> Option<bool> {
    v.map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn parse_csv(v: Option<String>) -> Option<Vec<String>> {
    let out = v?
        .split(',')
        .map(|s| s.trim().trim_start_matches('@'))
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect::<Vec<_>>();
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn normalize_path(p: &str) -> String {
    let p = p.trim().trim_end_matches('/');
    if p.starts_with('/') {
        p.to_string()
    } else {
        format!("/{p}")
    }
}

fn trim_slash(s: String) -> String {
    s.trim_end_matches('/').to_string()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
