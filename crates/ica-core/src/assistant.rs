use std::sync::Arc;

use chrono::{Duration, Utc};
use futures_util::future::join_all;

use crate::{
    config::Config,
    domain::PostOrder,
    errors::Error,
    ports::{select_posts, ChannelFeed, MarketData},
    report, Result,
};

pub const MIN_NEWS_HOURS: u32 = 1;
pub const MAX_NEWS_HOURS: u32 = 72;
const WHALE_ALERT_LIMIT: usize = 5;
const NEWS_PER_CHANNEL_LIMIT: usize = 10;

#[derive(Clone, Debug)]
pub struct Channels {
    pub news: Vec<String>,
    pub whale: String,
}

impl Channels {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            news: cfg.news_channels.clone(),
            whale: cfg.whale_channel.clone(),
        }
    }
}

/// Application service behind every tool and bot command.
#[derive(Clone)]
pub struct Assistant {
    market: Arc<dyn MarketData>,
    feed: Option<Arc<dyn ChannelFeed>>,
    channels: Channels,
}

impl Assistant {
    pub fn new(
        market: Arc<dyn MarketData>,
        feed: Option<Arc<dyn ChannelFeed>>,
        channels: Channels,
    ) -> Self {
        Self {
            market,
            feed,
            channels,
        }
    }

    pub fn feed_enabled(&self) -> bool {
        self.feed.is_some()
    }

    /// Sentiment, dominance and last-hour whale movements, fetched concurrently.
    ///
    /// Never fails: each section is omitted (or reported empty) when its
    /// source errors.
    pub async fn market_overview(&self) -> String {
        let (fear_greed, global, whales) = tokio::join!(
            self.market.fear_and_greed(),
            self.market.global_market(),
            self.whale_alerts(),
        );

        let fear_greed = fear_greed
            .map_err(|e| tracing::warn!(error = %e, "fear & greed fetch failed"))
            .ok();
        let global = global
            .map_err(|e| tracing::warn!(error = %e, "global market fetch failed"))
            .ok();
        let whales = whales
            .map_err(|e| tracing::warn!(error = %e, "whale alert fetch failed"))
            .unwrap_or_default();

        report::market_overview(fear_greed.as_ref(), global.as_ref(), &whales)
    }

    async fn whale_alerts(&self) -> Result<Vec<String>> {
        let feed = self.require_feed()?;
        let since = Utc::now() - Duration::hours(1);
        let posts = feed.posts_since(&self.channels.whale, since).await?;
        Ok(
            select_posts(posts, since, PostOrder::NewestFirst, WHALE_ALERT_LIMIT)
                .into_iter()
                .map(|p| p.text)
                .collect(),
        )
    }

    pub async fn coin_details(&self, coin_id: &str) -> Result<String> {
        let coin_id = normalize_coin_id(coin_id)?;
        let details = self.market.coin_details(&coin_id).await?;
        Ok(report::coin_details(&details))
    }

    pub async fn realtime_news(&self, hours: u32) -> Result<String> {
        if !(MIN_NEWS_HOURS..=MAX_NEWS_HOURS).contains(&hours) {
            return Err(Error::InvalidArgument(format!(
                "'hours' must be between {MIN_NEWS_HOURS} and {MAX_NEWS_HOURS}"
            )));
        }
        let feed = self.require_feed()?;
        let since = Utc::now() - Duration::hours(i64::from(hours));

        let results = join_all(
            self.channels
                .news
                .iter()
                .map(|ch| async move { (ch, feed.posts_since(ch, since).await) }),
        )
        .await;

        let mut posts = Vec::new();
        let mut first_err = None;
        let mut failures = 0usize;
        for (channel, res) in results {
            match res {
                Ok(found) => posts.extend(select_posts(
                    found,
                    since,
                    PostOrder::OldestFirst,
                    NEWS_PER_CHANNEL_LIMIT,
                )),
                Err(e) => {
                    tracing::warn!(channel = %channel, error = %e, "news fetch failed");
                    failures += 1;
                    first_err.get_or_insert(e);
                }
            }
        }

        if failures > 0 && failures == self.channels.news.len() {
            if let Some(e) = first_err {
                return Err(e);
            }
        }

        Ok(report::realtime_news(hours, &posts))
    }

    fn require_feed(&self) -> Result<&Arc<dyn ChannelFeed>> {
        self.feed.as_ref().ok_or_else(|| {
            Error::Unavailable("Telegram channel reading is disabled on this server".to_string())
        })
    }
}

/// CoinGecko ids are lowercase slugs (`bitcoin`, `usd-coin`, `wrapped-steth`).
pub fn normalize_coin_id(raw: &str) -> Result<String> {
    let id = raw.trim().to_lowercase();
    if id.is_empty() {
        return Err(Error::InvalidArgument("'coin_id' must not be empty".to_string()));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'))
    {
        return Err(Error::InvalidArgument(format!(
            "'{raw}' is not a valid CoinGecko id (e.g. 'bitcoin')"
        )));
    }
    Ok(id)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use crate::{
        domain::{ChannelPost, CoinDetails, FearGreed, GlobalMarket},
        errors::Error,
        ports::{ChannelFeed, MarketData},
        Result,
    };

    #[derive(Default)]
    pub struct FakeMarket {
        pub fail_sentiment: bool,
        pub no_key: bool,
    }

    #[async_trait]
    impl MarketData for FakeMarket {
        async fn fear_and_greed(&self) -> Result<FearGreed> {
            if self.fail_sentiment {
                return Err(Error::External("timeout".to_string()));
            }
            Ok(FearGreed {
                value: "25".to_string(),
                classification: "Extreme Fear".to_string(),
            })
        }

        async fn global_market(&self) -> Result<GlobalMarket> {
            if self.no_key {
                return Err(Error::Unavailable("no key".to_string()));
            }
            Ok(GlobalMarket {
                btc_dominance: 56.78,
                eth_dominance: 12.34,
            })
        }

        async fn coin_details(&self, coin_id: &str) -> Result<CoinDetails> {
            if self.no_key {
                return Err(Error::Unavailable(
                    "CoinGecko API key is not configured on this server".to_string(),
                ));
            }
            if coin_id != "bitcoin" {
                return Err(Error::NotFound(format!("coin '{coin_id}' was not found")));
            }
            Ok(CoinDetails {
                id: "bitcoin".to_string(),
                name: "Bitcoin".to_string(),
                symbol: "btc".to_string(),
                market_cap_rank: Some(1),
                price_krw: Some(100_000_000.0),
                homepage: Some("http://www.bitcoin.org".to_string()),
            })
        }
    }

    /// Posts keyed by channel, dated relative to `now` in minutes.
    #[derive(Default)]
    pub struct FakeFeed {
        pub posts: HashMap<String, Vec<(i64, i64, String)>>,
        pub failing: Vec<String>,
    }

    impl FakeFeed {
        pub fn with(mut self, channel: &str, id: i64, minutes_ago: i64, text: &str) -> Self {
            self.posts
                .entry(channel.to_string())
                .or_default()
                .push((id, minutes_ago, text.to_string()));
            self
        }

        pub fn failing(mut self, channel: &str) -> Self {
            self.failing.push(channel.to_string());
            self
        }
    }

    #[async_trait]
    impl ChannelFeed for FakeFeed {
        async fn posts_since(
            &self,
            channel: &str,
            since: DateTime<Utc>,
        ) -> Result<Vec<ChannelPost>> {
            if self.failing.iter().any(|c| c == channel) {
                return Err(Error::External(format!("{channel} unreachable")));
            }
            let now = Utc::now();
            Ok(self
                .posts
                .get(channel)
                .into_iter()
                .flatten()
                .map(|(id, ago, text)| ChannelPost {
                    channel: channel.to_string(),
                    id: *id,
                    date: now - chrono::Duration::minutes(*ago),
                    text: text.clone(),
                })
                .filter(|p| p.date >= since)
                .collect())
        }
    }
}
