use async_trait::async_trait;
use sqlx::{types::Json, PgPool};

use crate::{
    config::symbol::{CandleInterval, SymbolConfiguration},
    db::models::*,
    services::indicators::Candle,
    utils::errors::StoreError,
};

use super::store::{
    ActiveGrid, CandleCollection, CandleStore, GridTradeArchive, OverrideAction, TradeStore,
};

/// Postgres-backed candle and trade store. Documents live in `jsonb`
/// columns so the stored shape matches the serde models.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(include_str!("../../migrations/0001_init.sql"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// CANDLES
#[async_trait]
impl CandleStore for PgStore {
    async fn recent_candles(
        &self,
        collection: CandleCollection,
        symbol: &str,
        interval: CandleInterval,
        limit: usize,
    ) -> Result<Vec<Candle>, StoreError> {
        let rows = sqlx::query_as::<_, CandleRow>(
            r#"SELECT open_time, open, high, low, close, volume
                 FROM candles
                WHERE collection = $1 AND symbol = $2 AND interval = $3
                ORDER BY open_time DESC
                LIMIT $4"#,
        )
        .bind(collection.as_str())
        .bind(symbol)
        .bind(interval.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Candle::from).collect())
    }

    async fn save_candles(
        &self,
        collection: CandleCollection,
        symbol: &str,
        interval: CandleInterval,
        candles: &[Candle],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for c in candles {
            sqlx::query(
                r#"INSERT INTO candles (collection, symbol, interval, open_time, open, high, low, close, volume)
                   VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
                   ON CONFLICT (collection, symbol, interval, open_time)
                   DO UPDATE SET open = EXCLUDED.open, high = EXCLUDED.high, low = EXCLUDED.low,
                                 close = EXCLUDED.close, volume = EXCLUDED.volume"#,
            )
            .bind(collection.as_str())
            .bind(symbol)
            .bind(interval.as_str())
            .bind(c.open_time)
            .bind(c.open)
            .bind(c.high)
            .bind(c.low)
            .bind(c.close)
            .bind(c.volume)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
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
        // the subquery is NULL while the series holds fewer than `keep` rows
        let res = sqlx::query(
            r#"DELETE FROM candles
                WHERE collection = $1 AND symbol = $2 AND interval = $3
                  AND open_time < (SELECT open_time
                                     FROM candles
                                    WHERE collection = $1 AND symbol = $2 AND interval = $3
                                    ORDER BY open_time DESC
                                   OFFSET $4 LIMIT 1)"#,
        )
        .bind(collection.as_str())
        .bind(symbol)
        .bind(interval.as_str())
        .bind(keep.saturating_sub(1) as i64)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }
}

#[async_trait]
impl TradeStore for PgStore {
    // SYMBOL CONFIGURATION
    async fn symbol_configuration(&self, symbol: &str) -> Result<Option<SymbolConfiguration>, StoreError> {
        let row = sqlx::query_as::<_, SymbolConfigurationRow>(
            "SELECT symbol, document, updated_at FROM symbol_configurations WHERE symbol = $1",
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.document.0))
    }

    async fn save_symbol_configuration(&self, symbol: &str, cfg: &SymbolConfiguration) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO symbol_configurations (symbol, document, updated_at)
               VALUES ($1, $2, now())
               ON CONFLICT (symbol) DO UPDATE SET document = EXCLUDED.document, updated_at = now()"#,
        )
        .bind(symbol)
        .bind(Json(cfg))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // LAST BUY PRICE
    async fn last_buy_price(&self, symbol: &str) -> Result<Option<f64>, StoreError> {
        let row: Option<(f64,)> = sqlx::query_as("SELECT last_buy_price FROM last_buy_prices WHERE symbol = $1")
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.0))
    }

    async fn save_last_buy_price(&self, symbol: &str, price: f64) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO last_buy_prices (symbol, last_buy_price, updated_at)
               VALUES ($1, $2, now())
               ON CONFLICT (symbol) DO UPDATE SET last_buy_price = EXCLUDED.last_buy_price, updated_at = now()"#,
        )
        .bind(symbol)
        .bind(price)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // UNDERWATER TIMESTAMP
    async fn last_underwater_timestamp(&self, symbol: &str) -> Result<Option<i64>, StoreError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT last_underwater_timestamp FROM underwater_timestamps WHERE symbol = $1")
                .bind(symbol)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.0))
    }

    async fn save_last_underwater_timestamp(&self, symbol: &str, ts: i64) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO underwater_timestamps (symbol, last_underwater_timestamp)
               VALUES ($1, $2)
               ON CONFLICT (symbol) DO UPDATE SET last_underwater_timestamp = EXCLUDED.last_underwater_timestamp"#,
        )
        .bind(symbol)
        .bind(ts)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_last_underwater_timestamp(&self, symbol: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM underwater_timestamps WHERE symbol = $1")
            .bind(symbol)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // GRID TRADES
    async fn archived_grids(&self, symbol: &str) -> Result<Vec<GridTradeArchive>, StoreError> {
        let rows = sqlx::query_as::<_, ArchiveRow>(
            "SELECT archive_id, document FROM grid_trade_archive WHERE symbol = $1 ORDER BY archived_at",
        )
        .bind(symbol)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.document.0).collect())
    }

    async fn archive_grid(&self, archive: &GridTradeArchive) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO grid_trade_archive (symbol, document, archived_at) VALUES ($1, $2, $3)")
            .bind(&archive.symbol)
            .bind(Json(archive))
            .bind(archive.archived_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn active_grid(&self, symbol: &str) -> Result<Option<ActiveGrid>, StoreError> {
        let row = sqlx::query_as::<_, ActiveGridRow>("SELECT symbol, document FROM active_grids WHERE symbol = $1")
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.document.0))
    }

    async fn save_active_grid(&self, grid: &ActiveGrid) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO active_grids (symbol, document) VALUES ($1, $2)
               ON CONFLICT (symbol) DO UPDATE SET document = EXCLUDED.document"#,
        )
        .bind(&grid.key)
        .bind(Json(grid))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // OVERRIDE ACTIONS
    async fn save_override_action(&self, scope: &str, action: &OverrideAction) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO override_actions (scope, document) VALUES ($1, $2)")
            .bind(scope)
            .bind(Json(action))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn take_override_action(&self, scope: &str) -> Result<Option<OverrideAction>, StoreError> {
        let row = sqlx::query_as::<_, OverrideActionRow>(
            r#"DELETE FROM override_actions
                WHERE action_id = (
                    SELECT action_id FROM override_actions
                     WHERE scope = $1
                     ORDER BY action_id
                     LIMIT 1
                     FOR UPDATE SKIP LOCKED)
            RETURNING action_id, scope, document"#,
        )
        .bind(scope)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.document.0))
    }
}
