//! Plain-text report builders for the assistant tools.

use crate::{
    domain::{ChannelPost, CoinDetails, FearGreed, GlobalMarket},
    formatting::one_line,
};

const NA: &str = "N/A";

pub fn market_overview(
    fear_greed: Option<&FearGreed>,
    global: Option<&GlobalMarket>,
    whale_alerts: &[String],
) -> String {
    let mut report = vec!["Market overview briefing:".to_string()];

    if let Some(fg) = fear_greed {
        report.push(format!(
            "- Sentiment: '{}' (index: {})",
            or_na(&fg.classification),
            or_na(&fg.value)
        ));
    }

    if let Some(g) = global {
        report.push(format!(
            "- Dominance: BTC {:.1}%, ETH {:.1}%",
            g.btc_dominance, g.eth_dominance
        ));
    }

    if whale_alerts.is_empty() {
        report.push("- Notable fund movements (last 1h): none detected".to_string());
    } else {
        report.push("- Notable fund movements (last 1h):".to_string());
        for alert in whale_alerts {
            report.push(format!("  - {}", one_line(alert)));
        }
    }

    report.join("\n")
}

pub fn coin_details(d: &CoinDetails) -> String {
    let rank = d
        .market_cap_rank
        .map(|r| format!("#{r}"))
        .unwrap_or_else(|| NA.to_string());
    let price = d
        .price_krw
        .map(|p| format!("₩{}", format_krw(p)))
        .unwrap_or_else(|| NA.to_string());
    let homepage = d.homepage.as_deref().unwrap_or(NA);

    [
        format!(
            "'{}' ({}) details:",
            or_na(&d.name),
            or_na(&d.symbol.to_uppercase())
        ),
        format!("- Market cap rank: {rank}"),
        format!("- Current price: {price}"),
        format!("- Homepage: {homepage}"),
    ]
    .join("\n")
}

pub fn realtime_news(hours: u32, posts: &[ChannelPost]) -> String {
    if posts.is_empty() {
        return format!("No new posts in the tracked channels over the last {hours} hour(s).");
    }

    let mut report = vec![format!("Top news from the last {hours} hour(s):")];
    report.extend(posts.iter().map(news_line));
    report.join("\n")
}

fn news_line(p: &ChannelPost) -> String {
    format!(
        "- [{}] @{}: {}",
        p.date.format("%m-%d %H:%M"),
        p.channel,
        one_line(&p.text)
    )
}

/// Group the integer part with `,`; keep the fraction only when non-zero.
pub fn format_krw(value: f64) -> String {
    if !value.is_finite() {
        return NA.to_string();
    }

    let raw = format!("{}", value.abs());
    let (int_part, frac_part) = match raw.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (raw, None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 { "-" } else { "" };
    match frac_part {
        Some(f) if f.chars().any(|c| c != '0') => format!("{sign}{grouped}.{f}"),
        _ => format!("{sign}{grouped}"),
    }
}

fn or_na(s: &str) -> &str {
    if s.trim().is_empty() {
        NA
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn krw_grouping() {
        assert_eq!(format_krw(95_123_456.0), "95,123,456");
        assert_eq!(format_krw(1234.5), "1,234.5");
        assert_eq!(format_krw(999.0), "999");
        assert_eq!(format_krw(0.0123), "0.0123");
        assert_eq!(format_krw(-1000.0), "-1,000");
    }

    #[test]
    fn overview_with_all_sections() {
        let fg = FearGreed {
            value: "72".to_string(),
            classification: "Greed".to_string(),
        };
        let g = GlobalMarket {
            btc_dominance: 54.234,
            eth_dominance: 17.06,
        };
        let alerts = vec!["🚨 1,000 #BTC\ntransferred".to_string()];
        let r = market_overview(Some(&fg), Some(&g), &alerts);
        assert_eq!(
            r,
            "Market overview briefing:\n\
             - Sentiment: 'Greed' (index: 72)\n\
             - Dominance: BTC 54.2%, ETH 17.1%\n\
             - Notable fund movements (last 1h):\n\
             \x20 - 🚨 1,000 #BTC transferred"
        );
    }

    #[test]
    fn overview_without_data() {
        let r = market_overview(None, None, &[]);
        assert_eq!(
            r,
            "Market overview briefing:\n- Notable fund movements (last 1h): none detected"
        );
    }

    #[test]
    fn coin_details_formats_missing_fields() {
        let d = CoinDetails {
            id: "bitcoin".to_string(),
            name: "Bitcoin".to_string(),
            symbol: "btc".to_string(),
            market_cap_rank: Some(1),
            price_krw: Some(140_000_000.0),
            homepage: None,
        };
        assert_eq!(
            coin_details(&d),
            "'Bitcoin' (BTC) details:\n- Market cap rank: #1\n- Current price: ₩140,000,000\n- Homepage: N/A"
        );
    }

    #[test]
    fn news_lines_use_utc_month_day() {
        let posts = vec![ChannelPost {
            channel: "watcherguru".to_string(),
            id: 1,
            date: Utc.with_ymd_and_hms(2026, 10, 16, 9, 5, 0).unwrap(),
            text: "JUST IN:\nBitcoin hits new high".to_string(),
        }];
        assert_eq!(
            realtime_news(3, &posts),
            "Top news from the last 3 hour(s):\n- [10-16 09:05] @watcherguru: JUST IN: Bitcoin hits new high"
        );
        assert_eq!(
            realtime_news(1, &[]),
            "No new posts in the tracked channels over the last 1 hour(s)."
        );
    }
}
