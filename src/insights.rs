// =============================================================================
// Insight scoring: coarse buy/sell ratings for listing rows
// =============================================================================
//
// Ratings are integer scores in [1, 5] assembled from three thresholds:
// 24h price direction, 24h volume above $100M, market cap above $1B.
// Missing upstream figures score as zero.
// =============================================================================

use serde::Serialize;

use crate::upstream::CoinMarket;

const HIGH_VOLUME: f64 = 100_000_000.0;
const LARGE_CAP: f64 = 1_000_000_000.0;
const MOMENTUM_PCT: f64 = 5.0;

const MIN_RATING: u8 = 1;
const MAX_RATING: u8 = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Insights {
    pub buy_rating: u8,
    pub sell_rating: u8,
    pub reasons: Vec<String>,
}

pub fn generate_insights(coin: &CoinMarket) -> Insights {
    score(
        coin.price_change_percentage_24h.unwrap_or(0.0),
        coin.total_volume.unwrap_or(0.0),
        coin.market_cap.unwrap_or(0.0),
    )
}

fn score(change_24h: f64, volume_24h: f64, market_cap: f64) -> Insights {
    let high_volume = volume_24h > HIGH_VOLUME;
    let large_cap = market_cap > LARGE_CAP;

    let buy: u8 = (if change_24h > 0.0 { 3 } else { 1 })
        + (if high_volume { 2 } else { 0 })
        + u8::from(large_cap);
    let sell: u8 = (if change_24h < 0.0 { 3 } else { 1 })
        + u8::from(high_volume)
        + u8::from(large_cap);

    let mut reasons = Vec::new();
    if change_24h > MOMENTUM_PCT {
        reasons.push("Strong positive momentum".to_string());
    } else if change_24h < -MOMENTUM_PCT {
        reasons.push("Significant price drop".to_string());
    }
    if high_volume {
        reasons.push("High trading volume".to_string());
    }
    if large_cap {
        reasons.push("Large market cap".to_string());
    }
    if reasons.is_empty() {
        reasons.push("Neutral market activity".to_string());
    }

    Insights {
        buy_rating: buy.clamp(MIN_RATING, MAX_RATING),
        sell_rating: sell.clamp(MIN_RATING, MAX_RATING),
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coin(change: Option<f64>, volume: Option<f64>, cap: Option<f64>) -> CoinMarket {
        CoinMarket {
            id: "x".into(),
            name: "X".into(),
            symbol: "x".into(),
            current_price: Some(1.0),
            price_change_percentage_24h: change,
            total_volume: volume,
            market_cap: cap,
        }
    }

    #[test]
    fn strong_large_liquid_coin_maxes_buy() {
        let i = generate_insights(&coin(Some(10.0), Some(2e8), Some(2e9)));
        assert_eq!(i.buy_rating, 5);
        assert_eq!(i.sell_rating, 3);
        assert_eq!(
            i.reasons,
            vec!["Strong positive momentum", "High trading volume", "Large market cap"]
        );
    }

    #[test]
    fn falling_coin_leans_sell() {
        let i = generate_insights(&coin(Some(-8.0), Some(5e8), Some(5e8)));
        assert_eq!(i.buy_rating, 3);
        assert_eq!(i.sell_rating, 4);
        assert_eq!(i.reasons, vec!["Significant price drop", "High trading volume"]);
    }

    #[test]
    fn quiet_coin_is_neutral() {
        let i = generate_insights(&coin(Some(0.0), Some(1e6), Some(1e7)));
        assert_eq!(i.buy_rating, 1);
        assert_eq!(i.sell_rating, 1);
        assert_eq!(i.reasons, vec!["Neutral market activity"]);
    }

    #[test]
    fn missing_figures_score_as_zero() {
        let i = generate_insights(&coin(None, None, None));
        assert_eq!((i.buy_rating, i.sell_rating), (1, 1));
        assert_eq!(i.reasons, vec!["Neutral market activity"]);
    }

    #[test]
    fn thresholds_are_strict() {
        let i = generate_insights(&coin(Some(5.0), Some(1e8), Some(1e9)));
        assert_eq!(i.buy_rating, 3);
        assert_eq!(i.reasons, vec!["Neutral market activity"]);
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(score(1.0, 0.0, 0.0)).unwrap();
        assert_eq!(json["buyRating"], 3);
        assert!(json.get("sellRating").is_some());
    }
}
