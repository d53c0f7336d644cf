//! Storage seams: candle windows, trade documents and the hash cache mirror.
//!
//! Production runs on Postgres ([`crate::db::queries::PgStore`]) and Redis
//! ([`crate::db::redis::RedisPool`]); [`crate::db::memory::MemoryStore`]
//! implements every trait for tests and database-less runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    config::symbol::{CandleInterval, GridTradeLeg, SymbolConfiguration},
    services::indicators::Candle,
    utils::{errors::StoreError, types::f64_from_any},
};

/// Cache hash holding per-symbol runtime fields (latest candle, ...).
pub const SYMBOLS_HASH: &str = "trailing-trade-symbols";
pub const TRADINGVIEW_HASH: &str = "trailing-trade-tradingview";
pub const COMMON_HASH: &str = "trailing-trade-common";
/// Cached symbol configurations, invalidated on every save.
pub const CONFIGURATIONS_HASH: &str = "trailing-trade-configurations";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandleCollection {
    /// candles driving the trade triggers
    Trade,
    /// candles of the all-time-high restriction window
    Ath,
}

impl CandleCollection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandleCollection::Trade => "trade",
            CandleCollection::Ath => "ath",
        }
    }
}

#[async_trait]
pub trait CandleStore: Send + Sync {
    /// Up to `limit` candles, newest first.
    async fn recent_candles(
        &self,
        collection: CandleCollection,
        symbol: &str,
        interval: CandleInterval,
        limit: usize,
    ) -> Result<Vec<Candle>, StoreError>;

    /// Upsert by open time.
    async fn save_candles(
        &self,
        collection: CandleCollection,
        symbol: &str,
        interval: CandleInterval,
        candles: &[Candle],
    ) -> Result<(), StoreError>;

    /// Drop all but the newest `keep` candles of one series; returns how many went.
    /// `keep == 0` leaves the series untouched.
    async fn prune_candles(
        &self,
        collection: CandleCollection,
        symbol: &str,
        interval: CandleInterval,
        keep: usize,
    ) -> Result<u64, StoreError>;
}

/// Executed stop-loss market order of an archived grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopLossOrder {
    pub order_id: i64,
    pub transact_time: i64,
    pub side: String,
    #[serde(default)]
    pub time_in_force: Option<String>,
    #[serde(deserialize_with = "f64_from_any")]
    pub executed_qty: f64,
    #[serde(default)]
    pub fills: Vec<StopLossFill>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopLossFill {
    #[serde(deserialize_with = "f64_from_any")]
    pub price: f64,
}

/// A grid-trade cycle moved out of the live configuration once closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridTradeArchive {
    pub symbol: String,
    pub buy: Vec<GridTradeLeg>,
    pub sell: Vec<GridTradeLeg>,
    #[serde(default)]
    pub stop_loss: Option<StopLossOrder>,
    #[serde(default)]
    pub stop_loss_quote_qty: Option<f64>,
    /// true while buy legs were still pending when archived
    pub buy_grid_trade_executed: bool,
    pub sell_grid_trade_executed: bool,
    pub archived_at: DateTime<Utc>,
}

impl GridTradeArchive {
    /// Completed through every sell leg, or exited via stop loss.
    pub fn is_closed(&self) -> bool {
        let fully_executed = !self.buy_grid_trade_executed && !self.sell_grid_trade_executed;
        let stopped_out =
            self.buy_grid_trade_executed && !self.sell_grid_trade_executed && self.stop_loss.is_some();
        fully_executed || stopped_out
    }
}

/// The grid currently being traded, as tracked by the trade loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveGrid {
    pub key: String,
    pub buy: Vec<GridTradeLeg>,
    pub sell: Vec<GridTradeLeg>,
}

/// A queued, user-triggered instruction picked up by the next job run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideAction {
    pub action: String,
    #[serde(default)]
    pub params: serde_json::Value,
    pub action_at: DateTime<Utc>,
    pub triggered_by: String,
    #[serde(default)]
    pub message: String,
}

#[async_trait]
pub trait TradeStore: Send + Sync {
    async fn symbol_configuration(&self, symbol: &str) -> Result<Option<SymbolConfiguration>, StoreError>;
    async fn save_symbol_configuration(&self, symbol: &str, cfg: &SymbolConfiguration) -> Result<(), StoreError>;

    async fn last_buy_price(&self, symbol: &str) -> Result<Option<f64>, StoreError>;
    async fn save_last_buy_price(&self, symbol: &str, price: f64) -> Result<(), StoreError>;

    /// Milliseconds since epoch.
    async fn last_underwater_timestamp(&self, symbol: &str) -> Result<Option<i64>, StoreError>;
    async fn save_last_underwater_timestamp(&self, symbol: &str, ts: i64) -> Result<(), StoreError>;
    async fn remove_last_underwater_timestamp(&self, symbol: &str) -> Result<(), StoreError>;

    async fn archived_grids(&self, symbol: &str) -> Result<Vec<GridTradeArchive>, StoreError>;
    async fn archive_grid(&self, archive: &GridTradeArchive) -> Result<(), StoreError>;
    async fn active_grid(&self, symbol: &str) -> Result<Option<ActiveGrid>, StoreError>;
    async fn save_active_grid(&self, grid: &ActiveGrid) -> Result<(), StoreError>;

    /// `scope` is a symbol or `global`.
    async fn save_override_action(&self, scope: &str, action: &OverrideAction) -> Result<(), StoreError>;
    /// Pops the oldest pending action.
    async fn take_override_action(&self, scope: &str) -> Result<Option<OverrideAction>, StoreError>;
}

/// Hash-field cache in front of the trade store.
#[async_trait]
pub trait CacheMirror: Send + Sync {
    async fn hget(&self, hash: &str, field: &str) -> Result<Option<String>, StoreError>;
    async fn hset(&self, hash: &str, field: &str, value: &str) -> Result<(), StoreError>;
    async fn hdel(&self, hash: &str, field: &str) -> Result<(), StoreError>;
}

/// Typed helpers over [`CacheMirror`].
pub async fn cache_get_json<T>(cache: &dyn CacheMirror, hash: &str, field: &str) -> Result<Option<T>, StoreError>
where
    T: serde::de::DeserializeOwned,
{
    match cache.hget(hash, field).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub async fn cache_set_json<T>(cache: &dyn CacheMirror, hash: &str, field: &str, value: &T) -> Result<(), StoreError>
where
    T: Serialize + Sync,
{
    let raw = serde_json::to_string(value)?;
    cache.hset(hash, field, &raw).await
}

/// Field naming in the per-symbol cache hashes.
pub fn symbol_field(symbol: &str, suffix: &str) -> String {
    format!("{symbol}-{suffix}")
}
