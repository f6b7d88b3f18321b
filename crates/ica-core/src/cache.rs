use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    domain::{CoinDetails, FearGreed, GlobalMarket},
    ports::MarketData,
    Result,
};

#[derive(Clone)]
struct CacheEntry<T> {
    data: T,
    at: Instant,
}

/// Small keyed TTL cache. Expired entries are replaced lazily on write.
pub struct TtlCache<T> {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry<T>>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        self.get_at(key, Instant::now()).await
    }

    async fn get_at(&self, key: &str, now: Instant) -> Option<T> {
        let map = self.entries.lock().await;
        map.get(key)
            .filter(|e| now.duration_since(e.at) < self.ttl)
            .map(|e| e.data.clone())
    }

    pub async fn insert(&self, key: impl Into<String>, value: T) {
        self.insert_at(key.into(), value, Instant::now()).await;
    }

    async fn insert_at(&self, key: String, value: T, at: Instant) {
        let mut map = self.entries.lock().await;
        map.retain(|_, e| at.duration_since(e.at) < self.ttl);
        map.insert(key, CacheEntry { data: value, at });
    }
}

/// MarketData decorator caching successful lookups for a fixed TTL.
///
/// Errors are never cached, so a failed upstream call is retried on the next
/// request.
pub struct CachedMarketData {
    inner: Arc<dyn MarketData>,
    fear_greed: TtlCache<FearGreed>,
    global: TtlCache<GlobalMarket>,
    coins: TtlCache<CoinDetails>,
}

impl CachedMarketData {
    pub fn new(inner: Arc<dyn MarketData>, ttl: Duration) -> Self {
        Self {
            inner,
            fear_greed: TtlCache::new(ttl),
            global: TtlCache::new(ttl),
            coins: TtlCache::new(ttl),
        }
    }

    /// Wrap `inner` unless `ttl` is zero.
    pub fn wrap(inner: Arc<dyn MarketData>, ttl: Duration) -> Arc<dyn MarketData> {
        if ttl.is_zero() {
            inner
        } else {
            Arc::new(Self::new(inner, ttl))
        }
    }
}

#[async_trait]
impl MarketData for CachedMarketData {
    async fn fear_and_greed(&self) -> Result<FearGreed> {
        if let Some(v) = self.fear_greed.get("latest").await {
            return Ok(v);
        }
        let v = self.inner.fear_and_greed().await?;
        self.fear_greed.insert("latest", v.clone()).await;
        Ok(v)
    }

    async fn global_market(&self) -> Result<GlobalMarket> {
        if let Some(v) = self.global.get("global").await {
            return Ok(v);
        }
        let v = self.inner.global_market().await?;
        self.global.insert("global", v).await;
        Ok(v)
    }

    async fn coin_details(&self, coin_id: &str) -> Result<CoinDetails> {
        if let Some(v) = self.coins.get(coin_id).await {
            tracing::debug!(coin_id, "coin details served from cache");
            return Ok(v);
        }
        let v = self.inner.coin_details(coin_id).await?;
        self.coins.insert(coin_id, v.clone()).await;
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::errors::Error;

    #[derive(Default)]
    struct CountingMarket {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl MarketData for CountingMarket {
        async fn fear_and_greed(&self) -> Result<FearGreed> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::External("down".to_string()));
            }
            Ok(FearGreed {
                value: "50".to_string(),
                classification: "Neutral".to_string(),
            })
        }

        async fn global_market(&self) -> Result<GlobalMarket> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(GlobalMarket::default())
        }

        async fn coin_details(&self, coin_id: &str) -> Result<CoinDetails> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CoinDetails {
                id: coin_id.to_string(),
                name: coin_id.to_string(),
                symbol: "x".to_string(),
                market_cap_rank: None,
                price_krw: None,
                homepage: None,
            })
        }
    }

    #[tokio::test]
    async fn ttl_cache_expires_entries() {
        let cache = TtlCache::new(Duration::from_secs(10));
        let t0 = Instant::now();
        cache.insert_at("k".to_string(), 1u32, t0).await;
        assert_eq!(cache.get_at("k", t0 + Duration::from_secs(5)).await, Some(1));
        assert_eq!(cache.get_at("k", t0 + Duration::from_secs(11)).await, None);
    }

    #[tokio::test]
    async fn caches_successes_per_key() {
        let inner = Arc::new(CountingMarket::default());
        let cached = CachedMarketData::new(inner.clone(), Duration::from_secs(60));

        cached.coin_details("bitcoin").await.unwrap();
        cached.coin_details("bitcoin").await.unwrap();
        cached.coin_details("ethereum").await.unwrap();
        cached.global_market().await.unwrap();
        cached.global_market().await.unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_cache_errors() {
        let inner = Arc::new(CountingMarket {
            fail: true,
            ..Default::default()
        });
        let cached = CachedMarketData::new(inner.clone(), Duration::from_secs(60));

        assert!(cached.fear_and_greed().await.is_err());
        assert!(cached.fear_and_greed().await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}
