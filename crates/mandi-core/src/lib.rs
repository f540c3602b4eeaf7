//! Core domain model for mandi price ingestion and trend derivation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "mandi-core";

/// One observed modal price for one commodity in one market on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub commodity: String,
    pub state: String,
    pub district: String,
    pub market: String,
    pub modal_price: f64,
    pub arrival_volume: Option<f64>,
    pub observation_date: NaiveDate,
}

impl PriceRecord {
    pub fn key(&self) -> PriceKey {
        PriceKey {
            commodity: self.commodity.clone(),
            market: self.market.clone(),
            observation_date: self.observation_date,
        }
    }

    /// Records without a commodity or market never reach the store.
    pub fn has_identity(&self) -> bool {
        !self.commodity.trim().is_empty() && !self.market.trim().is_empty()
    }
}

/// Uniqueness key of a stored observation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PriceKey {
    pub commodity: String,
    pub market: String,
    pub observation_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrendLabel {
    Rising,
    Falling,
    Stable,
}

impl TrendLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendLabel::Rising => "Rising",
            TrendLabel::Falling => "Falling",
            TrendLabel::Stable => "Stable",
        }
    }
}

impl fmt::Display for TrendLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTrendLabel(pub String);

impl fmt::Display for UnknownTrendLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown trend label `{}`", self.0)
    }
}

impl std::error::Error for UnknownTrendLabel {}

impl FromStr for TrendLabel {
    type Err = UnknownTrendLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Rising" => Ok(TrendLabel::Rising),
            "Falling" => Ok(TrendLabel::Falling),
            "Stable" => Ok(TrendLabel::Stable),
            other => Err(UnknownTrendLabel(other.to_string())),
        }
    }
}

/// Latest derived trend for a commodity. Exactly one exists per commodity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommodityTrend {
    pub commodity: String,
    pub current_price: f64,
    pub percentage_change: f64,
    #[serde(rename = "trend")]
    pub trend_label: TrendLabel,
    pub updated_at: DateTime<Utc>,
}
