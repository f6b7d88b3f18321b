use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// alternative.me Fear & Greed reading.
///
/// The API reports the index as a string; it is kept verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FearGreed {
    pub value: String,
    pub classification: String,
}

/// Market cap dominance in percent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalMarket {
    pub btc_dominance: f64,
    pub eth_dominance: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoinDetails {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub market_cap_rank: Option<u32>,
    pub price_krw: Option<f64>,
    pub homepage: Option<String>,
}

/// A single post read from a public channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelPost {
    pub channel: String,
    pub id: i64,
    pub date: DateTime<Utc>,
    pub text: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PostOrder {
    NewestFirst,
    OldestFirst,
}
