//! Public channel reader over the `t.me/s/<channel>` web preview.
//!
//! The preview lists the most recent ~20 posts of a public channel as HTML;
//! older pages are reached with `?before=<post id>`.

use std::{sync::OnceLock, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;

use ica_core::{
    config::Config, domain::ChannelPost, errors::Error, ports::ChannelFeed, Result,
};

const SERVICE: &str = "telegram";

#[derive(Clone, Debug)]
pub struct TelegramWebFeed {
    http: reqwest::Client,
    base_url: String,
    max_pages: usize,
}

impl TelegramWebFeed {
    pub fn new(base_url: impl Into<String>, max_pages: usize, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ica/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::External(format!("http client build failed: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_pages: max_pages.max(1),
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(
            cfg.telegram_web_base_url.clone(),
            cfg.telegram_feed_max_pages,
            cfg.http_timeout,
        )
    }

    async fn fetch_page(&self, channel: &str, before: Option<i64>) -> Result<Vec<ChannelPost>> {
        let mut url = format!("{}/{channel}", self.base_url);
        if let Some(id) = before {
            url.push_str(&format!("?before={id}"));
        }

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::External(format!("telegram request error: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Upstream {
                service: SERVICE,
                status: status.as_u16(),
                message: format!("preview page for @{channel} unavailable"),
            });
        }

        let html = resp
            .text()
            .await
            .map_err(|e| Error::External(format!("telegram body error: {e}")))?;
        Ok(parse_preview(channel, &html))
    }
}

#[async_trait]
impl ChannelFeed for TelegramWebFeed {
    async fn posts_since(&self, channel: &str, since: DateTime<Utc>) -> Result<Vec<ChannelPost>> {
        validate_channel(channel)?;

        let mut out: Vec<ChannelPost> = Vec::new();
        let mut before = None;

        for page in 0..self.max_pages {
            let posts = self.fetch_page(channel, before).await?;
            let Some(oldest) = posts.iter().min_by_key(|p| p.id) else {
                break;
            };
            let reached_since = oldest.date < since;
            let oldest_id = oldest.id;

            tracing::debug!(channel, page, count = posts.len(), "fetched preview page");
            out.extend(posts.into_iter().filter(|p| p.date >= since));

            if reached_since || before.is_some_and(|b| oldest_id >= b) {
                break;
            }
            before = Some(oldest_id);
        }

        Ok(out)
    }
}

/// Telegram public usernames: 5-32 chars in practice; accept a looser superset.
pub fn validate_channel(channel: &str) -> Result<()> {
    let ok = !channel.is_empty()
        && channel.len() <= 64
        && channel
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "'{channel}' is not a valid public channel name"
        )))
    }
}

fn post_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"data-post="([A-Za-z0-9_]+)/(\d+)""#).expect("valid regex"))
}

fn text_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<div class="tgme_widget_message_text[^"]*"[^>]*>(.*?)</div>"#)
            .expect("valid regex")
    })
}

fn time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"<time[^>]*datetime="([^"]+)""#).expect("valid regex"))
}

/// Extract posts from a preview page. Posts without text or a date are skipped.
pub fn parse_preview(channel: &str, html: &str) -> Vec<ChannelPost> {
    let starts: Vec<_> = post_re().captures_iter(html).collect();
    let mut out = Vec::new();

    for (i, caps) in starts.iter().enumerate() {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let end = starts
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(html.len());
        let block = &html[whole.end()..end];

        let Some(id) = caps.get(2).and_then(|m| m.as_str().parse::<i64>().ok()) else {
            continue;
        };
        let Some(date) = time_re()
            .captures(block)
            .and_then(|c| c.get(1))
            .and_then(|m| DateTime::parse_from_rfc3339(m.as_str()).ok())
            .map(|d| d.with_timezone(&Utc))
        else {
            continue;
        };
        let Some(raw_text) = text_re().captures(block).and_then(|c| c.get(1)) else {
            continue;
        };

        let text = html_to_text(raw_text.as_str());
        if text.is_empty() {
            continue;
        }

        out.push(ChannelPost {
            channel: channel.to_string(),
            id,
            date,
            text,
        });
    }

    out
}

fn br_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<br\s*/?>").expect("valid regex"))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid regex"))
}

fn entity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").expect("valid regex"))
}

fn html_to_text(fragment: &str) -> String {
    let with_breaks = br_re().replace_all(fragment, "\n");
    let stripped = tag_re().replace_all(&with_breaks, "");
    let decoded = entity_re().replace_all(&stripped, |caps: &regex::Captures| {
        let name = &caps[1];
        decode_entity(name).unwrap_or_else(|| caps[0].to_string())
    });
    decoded.trim().to_string()
}

fn decode_entity(name: &str) -> Option<String> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    let s = match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => " ",
        _ => return None,
    };
    Some(s.to_string())
}
