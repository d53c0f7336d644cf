//! Widen the ATH-restriction candle interval the longer the price stays
//! below the second buy leg's trigger.

use crate::{
    config::symbol::CandleInterval,
    db::store::{symbol_field, COMMON_HASH},
    utils::errors::{StepError, StoreError},
};

use super::{save_symbol_configuration, StepContext, TradeData};

/// Interval used whenever the symbol is not underwater.
pub const DEFAULT_ATH_INTERVAL: CandleInterval = CandleInterval::M5;

/// Buy leg whose trigger defines "underwater".
const UNDERWATER_GRID_INDEX: i64 = 1;

/// Interval for the time spent underwater.
pub fn interval_for_minutes_underwater(minutes: f64) -> CandleInterval {
    if minutes < 3.0 * 15.0 {
        CandleInterval::M15
    } else if minutes < 3.0 * 30.0 {
        CandleInterval::M30
    } else if minutes < 3.0 * 60.0 {
        CandleInterval::H1
    } else if minutes < 6.0 * 60.0 {
        CandleInterval::H2
    } else {
        CandleInterval::H4
    }
}

fn underwater_field(symbol: &str) -> String {
    symbol_field(symbol, "last-underwater-timestamp")
}

async fn last_underwater_timestamp(ctx: StepContext<'_>, symbol: &str) -> Result<Option<i64>, StoreError> {
    let field = underwater_field(symbol);
    if let Some(raw) = ctx.cache.hget(COMMON_HASH, &field).await? {
        if let Ok(ts) = raw.trim().parse::<i64>() {
            return Ok(Some(ts));
        }
    }

    let ts = ctx.trades.last_underwater_timestamp(symbol).await?;
    if let Some(ts) = ts {
        ctx.cache.hset(COMMON_HASH, &field, &ts.to_string()).await?;
    }
    Ok(ts)
}

async fn save_last_underwater_timestamp(ctx: StepContext<'_>, symbol: &str, ts: i64) -> Result<(), StoreError> {
    ctx.trades.save_last_underwater_timestamp(symbol, ts).await?;
    ctx.cache.hset(COMMON_HASH, &underwater_field(symbol), &ts.to_string()).await?;
    log::info!("the last underwater timestamp has been saved symbol={symbol} ts={ts}");
    Ok(())
}

async fn remove_last_underwater_timestamp(ctx: StepContext<'_>, symbol: &str) -> Result<(), StoreError> {
    ctx.trades.remove_last_underwater_timestamp(symbol).await?;
    ctx.cache.hdel(COMMON_HASH, &underwater_field(symbol)).await?;
    log::info!("the last underwater timestamp has been removed symbol={symbol}");
    Ok(())
}

pub async fn determine_ath_interval(ctx: StepContext<'_>, mut data: TradeData) -> Result<TradeData, StepError> {
    let symbol = data.symbol.clone();
    let grid_index = data.symbol_configuration.buy.current_grid_trade_index;
    let difference = data.buy.as_ref().and_then(|b| b.difference);
    let underwater = difference.is_some_and(|d| d < 0.0);

    let last_ts = last_underwater_timestamp(ctx, &symbol).await?;

    if underwater && grid_index == UNDERWATER_GRID_INDEX {
        let Some(since) = last_ts else {
            save_last_underwater_timestamp(ctx, &symbol, ctx.now.timestamp_millis()).await?;
            return Ok(data);
        };

        let minutes = (ctx.now.timestamp_millis() - since) as f64 / 60_000.0;
        let interval = interval_for_minutes_underwater(minutes);
        let candles = &mut data.symbol_configuration.buy.ath_restriction.candles;
        if candles.interval != interval {
            candles.interval = interval;
            save_symbol_configuration(ctx.trades, ctx.cache, &symbol, &data.symbol_configuration).await?;
            log::info!("the ATH interval has been updated symbol={symbol} interval={interval}");
        }
    }

    if last_ts.is_some() && (grid_index != UNDERWATER_GRID_INDEX || !underwater) {
        remove_last_underwater_timestamp(ctx, &symbol).await?;
        data.symbol_configuration.buy.ath_restriction.candles.interval = DEFAULT_ATH_INTERVAL;
        save_symbol_configuration(ctx.trades, ctx.cache, &symbol, &data.symbol_configuration).await?;
        log::info!("the ATH interval has been restored symbol={symbol} interval={DEFAULT_ATH_INTERVAL}");
    }

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::symbol::SymbolConfiguration,
        db::{
            memory::MemoryStore,
            store::{CacheMirror, TradeStore},
        },
        services::{
            indicators::{
                pricing::tests::{config, leg},
                BuySnapshot, Restriction,
            },
            trailing_trade::tests::{ctx, trade_data},
        },
    };
    use chrono::Utc;

    const MIN: i64 = 60_000;
    const T0: i64 = 1_700_000_000_000;

    fn ladder() -> SymbolConfiguration {
        config(
            vec![leg(1.0, 1.0, Some((100.0, 1.0))), leg(0.9, 1.0, None)],
            1,
            vec![leg(1.05, 0.99, None)],
        )
    }

    /// Trade data whose buy snapshot sits `difference` percent from the trigger.
    fn data_with_difference(cfg: SymbolConfiguration, difference: f64) -> TradeData {
        let mut d = trade_data(cfg);
        d.buy = Some(BuySnapshot {
            current_price: 88.0,
            limit_price: None,
            highest_price: 101.0,
            lowest_price: 85.0,
            ath_price: None,
            ath_restriction_price: Restriction::Disabled,
            kagi_restriction: Restriction::Unavailable,
            trigger_price: Some(90.0),
            difference: Some(difference),
            next_best_buy_amount: None,
            next_best_buy_calculation: None,
            open_orders: vec![],
            process_message: String::new(),
            updated_at: Utc::now(),
        });
        d
    }

    #[test]
    fn interval_ladder() {
        assert_eq!(interval_for_minutes_underwater(0.0), CandleInterval::M15);
        assert_eq!(interval_for_minutes_underwater(44.9), CandleInterval::M15);
        assert_eq!(interval_for_minutes_underwater(45.0), CandleInterval::M30);
        assert_eq!(interval_for_minutes_underwater(89.0), CandleInterval::M30);
        assert_eq!(interval_for_minutes_underwater(90.0), CandleInterval::H1);
        assert_eq!(interval_for_minutes_underwater(179.0), CandleInterval::H1);
        assert_eq!(interval_for_minutes_underwater(180.0), CandleInterval::H2);
        assert_eq!(interval_for_minutes_underwater(359.0), CandleInterval::H2);
        assert_eq!(interval_for_minutes_underwater(360.0), CandleInterval::H4);
    }

    #[tokio::test]
    async fn first_underwater_tick_only_records_timestamp() {
        let store = MemoryStore::new();
        let data = data_with_difference(ladder(), -2.0);
        let out = determine_ath_interval(ctx(&store, T0), data).await.unwrap();

        assert_eq!(store.last_underwater_timestamp("BTCUSDT").await.unwrap(), Some(T0));
        assert_eq!(
            store.hget(COMMON_HASH, "BTCUSDT-last-underwater-timestamp").await.unwrap().as_deref(),
            Some(T0.to_string().as_str())
        );
        assert_eq!(out.symbol_configuration.buy.ath_restriction.candles.interval, CandleInterval::M5);
        assert!(store.symbol_configuration("BTCUSDT").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn interval_widens_with_time_underwater() {
        let store = MemoryStore::new();
        store.save_last_underwater_timestamp("BTCUSDT", T0).await.unwrap();

        let data = data_with_difference(ladder(), -2.0);
        let out = determine_ath_interval(ctx(&store, T0 + 100 * MIN), data).await.unwrap();
        assert_eq!(out.symbol_configuration.buy.ath_restriction.candles.interval, CandleInterval::H1);

        let saved = store.symbol_configuration("BTCUSDT").await.unwrap().unwrap();
        assert_eq!(saved.buy.ath_restriction.candles.interval, CandleInterval::H1);
        // store fallback populated the cache
        assert!(store.hget(COMMON_HASH, "BTCUSDT-last-underwater-timestamp").await.unwrap().is_some());
        // still underwater, timestamp kept
        assert_eq!(store.last_underwater_timestamp("BTCUSDT").await.unwrap(), Some(T0));
    }

    #[tokio::test]
    async fn cached_timestamp_wins_over_store() {
        let store = MemoryStore::new();
        store.save_last_underwater_timestamp("BTCUSDT", T0).await.unwrap();
        store
            .hset(COMMON_HASH, "BTCUSDT-last-underwater-timestamp", &(T0 + 400 * MIN).to_string())
            .await
            .unwrap();

        let data = data_with_difference(ladder(), -2.0);
        let out = determine_ath_interval(ctx(&store, T0 + 410 * MIN), data).await.unwrap();
        assert_eq!(out.symbol_configuration.buy.ath_restriction.candles.interval, CandleInterval::M15);
    }

    #[tokio::test]
    async fn recovery_restores_default_interval() {
        let store = MemoryStore::new();
        store.save_last_underwater_timestamp("BTCUSDT", T0).await.unwrap();
        let mut cfg = ladder();
        cfg.buy.ath_restriction.candles.interval = CandleInterval::H2;

        let data = data_with_difference(cfg, 1.5);
        let out = determine_ath_interval(ctx(&store, T0 + 500 * MIN), data).await.unwrap();

        assert_eq!(out.symbol_configuration.buy.ath_restriction.candles.interval, CandleInterval::M5);
        assert!(store.last_underwater_timestamp("BTCUSDT").await.unwrap().is_none());
        assert!(store.hget(COMMON_HASH, "BTCUSDT-last-underwater-timestamp").await.unwrap().is_none());
        let saved = store.symbol_configuration("BTCUSDT").await.unwrap().unwrap();
        assert_eq!(saved.buy.ath_restriction.candles.interval, CandleInterval::M5);
    }

    #[tokio::test]
    async fn leaving_second_leg_restores_default_interval() {
        let store = MemoryStore::new();
        store.save_last_underwater_timestamp("BTCUSDT", T0).await.unwrap();
        let mut cfg = ladder();
        cfg.buy.current_grid_trade_index = 2;

        let data = data_with_difference(cfg, -5.0);
        determine_ath_interval(ctx(&store, T0 + MIN), data).await.unwrap();
        assert!(store.last_underwater_timestamp("BTCUSDT").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn nothing_happens_above_water_without_timestamp() {
        let store = MemoryStore::new();
        let data = data_with_difference(ladder(), 3.0);
        let out = determine_ath_interval(ctx(&store, T0), data).await.unwrap();
        assert_eq!(out.symbol_configuration.buy.ath_restriction.candles.interval, CandleInterval::M5);
        assert!(store.symbol_configuration("BTCUSDT").await.unwrap().is_none());
        assert!(store.last_underwater_timestamp("BTCUSDT").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_snapshot_counts_as_not_underwater() {
        let store = MemoryStore::new();
        store.save_last_underwater_timestamp("BTCUSDT", T0).await.unwrap();
        let data = trade_data(ladder());
        determine_ath_interval(ctx(&store, T0 + MIN), data).await.unwrap();
        assert!(store.last_underwater_timestamp("BTCUSDT").await.unwrap().is_none());
    }
}
