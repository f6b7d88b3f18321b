use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    domain::{ChannelPost, CoinDetails, FearGreed, GlobalMarket, PostOrder},
    Result,
};

/// Hexagonal port for market data (CoinGecko + alternative.me today).
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn fear_and_greed(&self) -> Result<FearGreed>;
    async fn global_market(&self) -> Result<GlobalMarket>;
    async fn coin_details(&self, coin_id: &str) -> Result<CoinDetails>;
}

/// Hexagonal port for reading public channels.
///
/// Implementations return posts dated at or after `since`, in any order. The
/// result may be truncated by the adapter's paging limits.
#[async_trait]
pub trait ChannelFeed: Send + Sync {
    async fn posts_since(&self, channel: &str, since: DateTime<Utc>) -> Result<Vec<ChannelPost>>;
}

/// Drop posts older than `since` or without text, order them and keep `limit`.
pub fn select_posts(
    mut posts: Vec<ChannelPost>,
    since: DateTime<Utc>,
    order: PostOrder,
    limit: usize,
) -> Vec<ChannelPost> {
    posts.retain(|p| p.date >= since && !p.text.trim().is_empty());
    match order {
        PostOrder::OldestFirst => posts.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id))),
        PostOrder::NewestFirst => posts.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id))),
    }
    posts.dedup_by(|a, b| a.id == b.id && a.channel == b.channel);
    posts.truncate(limit);
    posts
}
