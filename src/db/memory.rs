// src/db/memory.rs
use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{
    config::symbol::{CandleInterval, SymbolConfiguration},
    services::indicators::Candle,
    utils::errors::StoreError,
};

use super::store::{
    ActiveGrid, CacheMirror, CandleCollection, CandleStore, GridTradeArchive, OverrideAction,
    TradeStore,
};

type CandleKey = (CandleCollection, String, CandleInterval);

/// Process-local implementation of every storage seam.
#[derive(Default)]
pub struct MemoryStore {
    candles: DashMap<CandleKey, BTreeMap<i64, Candle>>,
    configurations: DashMap<String, SymbolConfiguration>,
    last_buy_prices: DashMap<String, f64>,
    underwater: DashMap<String, i64>,
    archives: DashMap<String, Vec<GridTradeArchive>>,
    active_grids: DashMap<String, ActiveGrid>,
    overrides: DashMap<String, VecDeque<OverrideAction>>,
    hashes: DashMap<(String, String), String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CandleStore for MemoryStore {
    async fn recent_candles(
        &self,
        collection: CandleCollection,
        symbol: &str,
        interval: CandleInterval,
        limit: usize,
    ) -> Result<Vec<Candle>, StoreError> {
        let key = (collection, symbol.to_string(), interval);
        Ok(self
            .candles
            .get(&key)
            .map(|series| series.values().rev().take(limit).copied().collect())
            .unwrap_or_default())
    }

    async fn save_candles(
        &self,
        collection: CandleCollection,
        symbol: &str,
        interval: CandleInterval,
        candles: &[Candle],
    ) -> Result<(), StoreError> {
        let mut series = self.candles.entry((collection, symbol.to_string(), interval)).or_default();
        for c in candles {
            series.insert(c.open_time.timestamp_millis(), *c);
        }
        Ok(())
    }

    async fn prune_candles(
        &self,
        collection: CandleCollection,
        symbol: &str,
        interval: CandleInterval,
        keep: usize,
    ) -> Result<u64, StoreError> {
        if keep == 0 {
            return Ok(0);
        }
        let Some(mut series) = self.candles.get_mut(&(collection, symbol.to_string(), interval)) else {
            return Ok(0);
        };
        let mut removed = 0;
        while series.len() > keep && series.pop_first().is_some() {
            removed += 1;
        }
        Ok(removed)
    }
}

#[async_trait]
impl TradeStore for MemoryStore {
    async fn symbol_configuration(&self, symbol: &str) -> Result<Option<SymbolConfiguration>, StoreError> {
        Ok(self.configurations.get(symbol).map(|c| c.clone()))
    }

    async fn save_symbol_configuration(&self, symbol: &str, cfg: &SymbolConfiguration) -> Result<(), StoreError> {
        self.configurations.insert(symbol.to_string(), cfg.clone());
        Ok(())
    }

    async fn last_buy_price(&self, symbol: &str) -> Result<Option<f64>, StoreError> {
        Ok(self.last_buy_prices.get(symbol).map(|p| *p))
    }

    async fn save_last_buy_price(&self, symbol: &str, price: f64) -> Result<(), StoreError> {
        self.last_buy_prices.insert(symbol.to_string(), price);
        Ok(())
    }

    async fn last_underwater_timestamp(&self, symbol: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.underwater.get(symbol).map(|t| *t))
    }

    async fn save_last_underwater_timestamp(&self, symbol: &str, ts: i64) -> Result<(), StoreError> {
        self.underwater.insert(symbol.to_string(), ts);
        Ok(())
    }

    async fn remove_last_underwater_timestamp(&self, symbol: &str) -> Result<(), StoreError> {
        self.underwater.remove(symbol);
        Ok(())
    }

    async fn archived_grids(&self, symbol: &str) -> Result<Vec<GridTradeArchive>, StoreError> {
        Ok(self.archives.get(symbol).map(|a| a.clone()).unwrap_or_default())
    }

    async fn archive_grid(&self, archive: &GridTradeArchive) -> Result<(), StoreError> {
        self.archives.entry(archive.symbol.clone()).or_default().push(archive.clone());
        Ok(())
    }

    async fn active_grid(&self, symbol: &str) -> Result<Option<ActiveGrid>, StoreError> {
        Ok(self.active_grids.get(symbol).map(|g| g.clone()))
    }

    async fn save_active_grid(&self, grid: &ActiveGrid) -> Result<(), StoreError> {
        self.active_grids.insert(grid.key.clone(), grid.clone());
        Ok(())
    }

    async fn save_override_action(&self, scope: &str, action: &OverrideAction) -> Result<(), StoreError> {
        self.overrides.entry(scope.to_string()).or_default().push_back(action.clone());
        Ok(())
    }

    async fn take_override_action(&self, scope: &str) -> Result<Option<OverrideAction>, StoreError> {
        Ok(self.overrides.get_mut(scope).and_then(|mut q| q.pop_front()))
    }
}

#[async_trait]
impl CacheMirror for MemoryStore {
    async fn hget(&self, hash: &str, field: &str) -> Result<Option<String>, StoreError> {
        Ok(self.hashes.get(&(hash.to_string(), field.to_string())).map(|v| v.clone()))
    }

    async fn hset(&self, hash: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.hashes.insert((hash.to_string(), field.to_string()), value.to_string());
        Ok(())
    }

    async fn hdel(&self, hash: &str, field: &str) -> Result<(), StoreError> {
        self.hashes.remove(&(hash.to_string(), field.to_string()));
        Ok(())
    }
}
