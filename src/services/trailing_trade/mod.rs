//! Per-symbol trailing-trade pipeline. Each step takes the symbol's
//! [`TradeData`] record and returns it updated.

pub mod determine_ath_interval;
pub mod get_indicators;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    config::symbol::SymbolConfiguration,
    db::store::{
        cache_get_json, cache_set_json, CacheMirror, CandleStore, TradeStore, CONFIGURATIONS_HASH,
    },
    services::{
        binance::SymbolInfo,
        indicators::{BuySnapshot, Indicators, OpenOrder, SellSnapshot},
    },
    utils::{errors::StoreError, types::f64_from_any},
};

pub use determine_ath_interval::determine_ath_interval;
pub use get_indicators::get_indicators;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseAssetBalance {
    pub free: f64,
    pub locked: f64,
    pub total: f64,
    pub estimated_value: Option<f64>,
    pub is_less_than_min_notional_value: Option<bool>,
}

impl BaseAssetBalance {
    pub fn new(free: f64, locked: f64) -> Self {
        Self { free, locked, total: free + locked, ..Default::default() }
    }
}

/// Most recent ticker event for a symbol, as mirrored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestCandle {
    pub event_type: String,
    pub event_time: i64,
    pub symbol: String,
    #[serde(deserialize_with = "f64_from_any")]
    pub close: f64,
}

/// The record a symbol carries through the pipeline steps.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeData {
    pub symbol: String,
    pub symbol_info: SymbolInfo,
    pub symbol_configuration: SymbolConfiguration,
    pub base_asset_balance: BaseAssetBalance,
    pub open_orders: Vec<OpenOrder>,
    pub indicators: Option<Indicators>,
    pub last_candle: Option<LatestCandle>,
    pub trading_view: serde_json::Value,
    pub buy: Option<BuySnapshot>,
    pub sell: Option<SellSnapshot>,
    /// cleared when a step could not produce a usable snapshot
    pub save_to_cache: bool,
}

impl TradeData {
    pub fn new(
        symbol: impl Into<String>,
        symbol_info: SymbolInfo,
        symbol_configuration: SymbolConfiguration,
        base_asset_balance: BaseAssetBalance,
        open_orders: Vec<OpenOrder>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            symbol_info,
            symbol_configuration,
            base_asset_balance,
            open_orders,
            indicators: None,
            last_candle: None,
            trading_view: serde_json::Value::Object(Default::default()),
            buy: None,
            sell: None,
            save_to_cache: true,
        }
    }
}

/// Collaborators shared by every step.
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    pub candles: &'a dyn CandleStore,
    pub trades: &'a dyn TradeStore,
    pub cache: &'a dyn CacheMirror,
    pub now: DateTime<Utc>,
}

/// Configuration for `symbol`, cache first.
pub async fn load_symbol_configuration(
    trades: &dyn TradeStore,
    cache: &dyn CacheMirror,
    symbol: &str,
) -> Result<Option<SymbolConfiguration>, StoreError> {
    if let Some(cfg) = cache_get_json(cache, CONFIGURATIONS_HASH, symbol).await? {
        return Ok(Some(cfg));
    }
    let cfg = trades.symbol_configuration(symbol).await?;
    if let Some(cfg) = &cfg {
        cache_set_json(cache, CONFIGURATIONS_HASH, symbol, cfg).await?;
    }
    Ok(cfg)
}

/// Persist and drop the cached copy so the next read sees the update.
pub async fn save_symbol_configuration(
    trades: &dyn TradeStore,
    cache: &dyn CacheMirror,
    symbol: &str,
    cfg: &SymbolConfiguration,
) -> Result<(), StoreError> {
    trades.save_symbol_configuration(symbol, cfg).await?;
    cache.hdel(CONFIGURATIONS_HASH, symbol).await
}
