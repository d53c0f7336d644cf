//! Per-symbol grid-trade configuration as persisted in the trade store.
//!
//! Field names follow the stored documents (camelCase) so existing
//! configurations load unchanged.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::utils::types::{f64_from_any, opt_f64_from_any};

/// Kline intervals understood by the exchange and the chart feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandleInterval {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "3m")]
    M3,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "2h")]
    H2,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "6h")]
    H6,
    #[serde(rename = "8h")]
    H8,
    #[serde(rename = "12h")]
    H12,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "3d")]
    D3,
    #[serde(rename = "1w")]
    W1,
    #[serde(rename = "1M")]
    Mo1,
}

impl CandleInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandleInterval::M1 => "1m",
            CandleInterval::M3 => "3m",
            CandleInterval::M5 => "5m",
            CandleInterval::M15 => "15m",
            CandleInterval::M30 => "30m",
            CandleInterval::H1 => "1h",
            CandleInterval::H2 => "2h",
            CandleInterval::H4 => "4h",
            CandleInterval::H6 => "6h",
            CandleInterval::H8 => "8h",
            CandleInterval::H12 => "12h",
            CandleInterval::D1 => "1d",
            CandleInterval::D3 => "3d",
            CandleInterval::W1 => "1w",
            CandleInterval::Mo1 => "1M",
        }
    }
}

impl fmt::Display for CandleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CandleInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("unknown interval '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandlesConfig {
    pub interval: CandleInterval,
    pub limit: usize,
}

/// Fill details of an executed grid leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutedOrder {
    #[serde(default)]
    pub order_id: i64,
    #[serde(default)]
    pub side: String,
    #[serde(deserialize_with = "f64_from_any")]
    pub price: f64,
    #[serde(deserialize_with = "f64_from_any")]
    pub executed_qty: f64,
    #[serde(deserialize_with = "f64_from_any")]
    pub cummulative_quote_qty: f64,
    #[serde(default)]
    pub transact_time: i64,
}

/// One rung of a buy or sell ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridTradeLeg {
    pub trigger_percentage: f64,
    #[serde(default)]
    pub stop_percentage: f64,
    pub limit_percentage: f64,
    #[serde(default, deserialize_with = "opt_f64_from_any", skip_serializing_if = "Option::is_none")]
    pub max_purchase_amount: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64_from_any", skip_serializing_if = "Option::is_none")]
    pub quantity_percentage: Option<f64>,
    #[serde(default)]
    pub executed: bool,
    #[serde(default)]
    pub executed_order: Option<ExecutedOrder>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AthRestriction {
    pub enabled: bool,
    pub candles: CandlesConfig,
    pub restriction_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyConfig {
    /// -1 when no buy leg is active
    pub current_grid_trade_index: i64,
    pub grid_trade: Vec<GridTradeLeg>,
    pub ath_restriction: AthRestriction,
}

impl BuyConfig {
    pub fn current_grid_trade(&self) -> Option<&GridTradeLeg> {
        leg_at(&self.grid_trade, self.current_grid_trade_index)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopLossConfig {
    pub enabled: bool,
    pub max_loss_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConservativeMode {
    pub enabled: bool,
    pub factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SellConfig {
    /// -1 when no sell leg is active
    pub current_grid_trade_index: i64,
    pub grid_trade: Vec<GridTradeLeg>,
    pub stop_loss: StopLossConfig,
    pub conservative_mode: ConservativeMode,
}

impl SellConfig {
    pub fn current_grid_trade(&self) -> Option<&GridTradeLeg> {
        leg_at(&self.grid_trade, self.current_grid_trade_index)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolConfiguration {
    #[serde(default)]
    pub key: String,
    pub candles: CandlesConfig,
    pub buy: BuyConfig,
    pub sell: SellConfig,
}

/// Immutable view of which ladder legs are active for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GridPosition {
    pub buy_index: Option<usize>,
    pub sell_index: Option<usize>,
}

impl GridPosition {
    pub fn of(cfg: &SymbolConfiguration) -> Self {
        Self {
            buy_index: usize::try_from(cfg.buy.current_grid_trade_index).ok(),
            sell_index: usize::try_from(cfg.sell.current_grid_trade_index).ok(),
        }
    }
}

fn leg_at(ladder: &[GridTradeLeg], index: i64) -> Option<&GridTradeLeg> {
    usize::try_from(index).ok().and_then(|i| ladder.get(i))
}
