//! Exchange access. The trait is the seam the pipeline steps and handlers
//! are written against; [`api::BinanceClient`] is the live implementation.

pub mod api;
pub mod auth;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    config::symbol::CandleInterval,
    db::store::{cache_set_json, CacheMirror, COMMON_HASH},
    services::{balance_transfer::BalanceTransferRequest, indicators::{Candle, OpenOrder}},
    utils::{
        errors::{ApiError, StepError},
        types::{f64_from_any, opt_f64_from_any},
    },
};

pub use api::BinanceClient;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolFilter {
    pub filter_type: String,
    #[serde(default, deserialize_with = "opt_f64_from_any", skip_serializing_if = "Option::is_none")]
    pub tick_size: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64_from_any", skip_serializing_if = "Option::is_none")]
    pub min_notional: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeSymbol {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    #[serde(default)]
    pub filters: Vec<SymbolFilter>,
}

impl ExchangeSymbol {
    fn filter(&self, kind: &str) -> Option<&SymbolFilter> {
        self.filters.iter().find(|f| f.filter_type == kind)
    }

    pub fn tick_size(&self) -> Option<f64> {
        self.filter("PRICE_FILTER").and_then(|f| f.tick_size)
    }

    pub fn min_notional(&self) -> f64 {
        self.filter("MIN_NOTIONAL")
            .or_else(|| self.filter("NOTIONAL"))
            .and_then(|f| f.min_notional)
            .unwrap_or(0.0)
    }

    /// Chart price scale: `round(1 / tickSize)`, 1 without a price filter.
    pub fn price_scale(&self) -> f64 {
        match self.tick_size() {
            Some(t) if t > 0.0 => (1.0 / t).round(),
            _ => 1.0,
        }
    }

    pub fn info(&self) -> SymbolInfo {
        SymbolInfo {
            base_asset: self.base_asset.clone(),
            quote_asset: self.quote_asset.clone(),
            min_notional: self.min_notional(),
            tick_size: self.tick_size().unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<ExchangeSymbol>,
}

impl ExchangeInfo {
    pub fn symbol(&self, symbol: &str) -> Option<&ExchangeSymbol> {
        self.symbols.iter().find(|s| s.symbol == symbol)
    }
}

/// The slice of exchange metadata the trade pipeline needs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub base_asset: String,
    pub quote_asset: String,
    pub min_notional: f64,
    pub tick_size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetBalance {
    pub asset: String,
    #[serde(deserialize_with = "f64_from_any")]
    pub free: f64,
    #[serde(deserialize_with = "f64_from_any")]
    pub locked: f64,
}

/// Balances of the master account or one sub-account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBalances {
    pub email: String,
    pub balance: Vec<AssetBalance>,
}

/// Label of the master account in balance listings.
pub const MASTER_ACCOUNT: &str = "master";

#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn exchange_info(&self) -> Result<ExchangeInfo, ApiError>;

    /// Oldest first; `end_time` bounds the newest candle's open time.
    async fn candles(
        &self,
        symbol: &str,
        interval: CandleInterval,
        end_time: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Candle>, ApiError>;

    async fn current_price(&self, symbol: &str) -> Result<f64, ApiError>;

    async fn account_balances(&self) -> Result<Vec<AssetBalance>, ApiError>;

    async fn open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>, ApiError>;

    /// Master account first, then every sub-account.
    async fn sub_account_balances(&self) -> Result<Vec<AccountBalances>, ApiError>;

    /// `Ok(false)` when the exchange accepted the call but reported no transfer.
    async fn transfer(&self, request: &BalanceTransferRequest) -> Result<bool, ApiError>;
}

const EXCHANGE_INFO_FIELD: &str = "exchange-info";

/// How long cached exchange metadata is trusted before refetching.
pub const EXCHANGE_INFO_TTL_SECS: i64 = 3_600;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedExchangeInfo {
    cached_at: DateTime<Utc>,
    info: ExchangeInfo,
}

/// Exchange metadata, cache first, refetched when missing or older than
/// [`EXCHANGE_INFO_TTL_SECS`].
pub async fn cached_exchange_info(
    cache: &dyn CacheMirror,
    exchange: &dyn ExchangeClient,
) -> Result<ExchangeInfo, StepError> {
    cached_exchange_info_at(cache, exchange, Utc::now()).await
}

async fn cached_exchange_info_at(
    cache: &dyn CacheMirror,
    exchange: &dyn ExchangeClient,
    now: DateTime<Utc>,
) -> Result<ExchangeInfo, StepError> {
    // unreadable entries count as a miss
    let cached = cache
        .hget(COMMON_HASH, EXCHANGE_INFO_FIELD)
        .await?
        .and_then(|raw| serde_json::from_str::<CachedExchangeInfo>(&raw).ok());
    if let Some(entry) = cached {
        if (now - entry.cached_at).num_seconds() < EXCHANGE_INFO_TTL_SECS {
            return Ok(entry.info);
        }
        log::debug!("exchange info expired cached_at={}", entry.cached_at);
    }

    let info = exchange.exchange_info().await?;
    let entry = CachedExchangeInfo { cached_at: now, info };
    cache_set_json(cache, COMMON_HASH, EXCHANGE_INFO_FIELD, &entry).await?;
    log::info!("exchange info cached symbols={}", entry.info.symbols.len());
    Ok(entry.info)
}
