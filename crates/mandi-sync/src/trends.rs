//! Day-over-day trend derivation over the stored price history.
//!
//! Every run recomputes all commodities from the store; nothing is carried
//! over from earlier runs.

use chrono::{DateTime, Utc};
use mandi_core::{CommodityTrend, PriceRecord, TrendLabel};
use mandi_storage::{PriceStore, StoreError};
use tracing::info;

pub const DEFAULT_TREND_WINDOW: usize = 20;

/// Changes within this many percent either way are reported as `Stable`.
pub const NOISE_BAND_PCT: f64 = 0.1;

fn round2(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

pub fn classify_change(percentage_change: f64) -> TrendLabel {
    if percentage_change > NOISE_BAND_PCT {
        TrendLabel::Rising
    } else if percentage_change < -NOISE_BAND_PCT {
        TrendLabel::Falling
    } else {
        TrendLabel::Stable
    }
}

/// Derive a trend from `history`, newest first.
///
/// The first row is `latest`, even when other markets reported on the same
/// date; `previous` is the first row with a different date.
pub fn derive_trend(commodity: &str, history: &[PriceRecord], now: DateTime<Utc>) -> CommodityTrend {
    let stable = |current_price: f64| CommodityTrend {
        commodity: commodity.to_string(),
        current_price,
        percentage_change: 0.0,
        trend_label: TrendLabel::Stable,
        updated_at: now,
    };

    let Some(latest) = history.first() else {
        return stable(0.0);
    };
    if history.len() < 2 {
        return stable(latest.modal_price);
    }

    let previous = history
        .iter()
        .find(|h| h.observation_date != latest.observation_date)
        .filter(|p| p.modal_price != 0.0);
    let Some(previous) = previous else {
        return stable(latest.modal_price);
    };

    let change = (latest.modal_price - previous.modal_price) / previous.modal_price * 100.0;
    if !change.is_finite() {
        return stable(latest.modal_price);
    }
    let percentage_change = round2(change);

    CommodityTrend {
        commodity: commodity.to_string(),
        current_price: latest.modal_price,
        percentage_change,
        trend_label: classify_change(percentage_change),
        updated_at: now,
    }
}

/// Recompute and replace the trend of every stored commodity.
pub async fn calculate_trends(store: &dyn PriceStore, window: usize) -> Result<usize, StoreError> {
    let commodities = store.distinct_commodities().await?;
    if commodities.is_empty() {
        info!("no commodity data found; trends unchanged");
        return Ok(0);
    }

    let now = Utc::now();
    let mut trends = Vec::with_capacity(commodities.len());
    for commodity in &commodities {
        let history = store.recent_prices(commodity, window.max(2)).await?;
        trends.push(derive_trend(commodity, &history, now));
    }

    store.upsert_trends(&trends).await?;
    info!(count = trends.len(), "commodity trends updated");
    Ok(trends.len())
}

/// Read side for the ticker: every current trend, ordered by commodity.
pub async fn list_current_trends(store: &dyn PriceStore) -> Result<Vec<CommodityTrend>, StoreError> {
    let mut trends = store.list_trends().await?;
    trends.sort_by(|a, b| a.commodity.cmp(&b.commodity));
    Ok(trends)
}
