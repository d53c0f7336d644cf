use crate::{
    db::store::{
        cache_get_json, symbol_field, CandleCollection, SYMBOLS_HASH, TRADINGVIEW_HASH,
    },
    services::indicators::{compute_indicators, IndicatorInput},
    utils::errors::StepError,
};

use super::{LatestCandle, StepContext, TradeData};

/// Recompute the buy/sell snapshots from the stored candle window.
///
/// An empty window clears `save_to_cache` and leaves everything else as is.
pub async fn get_indicators(ctx: StepContext<'_>, mut data: TradeData) -> Result<TradeData, StepError> {
    let symbol = data.symbol.clone();
    let cfg = &data.symbol_configuration;

    let candles = ctx
        .candles
        .recent_candles(CandleCollection::Trade, &symbol, cfg.candles.interval, cfg.candles.limit)
        .await?;
    let Some(newest) = candles.first().copied() else {
        log::warn!("no candles stored symbol={symbol}; snapshot skipped");
        data.save_to_cache = false;
        return Ok(data);
    };

    let ath = &cfg.buy.ath_restriction;
    let ath_candles = if ath.enabled {
        log::debug!(
            "retrieving ATH candles symbol={symbol} interval={} limit={}",
            ath.candles.interval,
            ath.candles.limit
        );
        Some(
            ctx.candles
                .recent_candles(CandleCollection::Ath, &symbol, ath.candles.interval, ath.candles.limit)
                .await?,
        )
    } else {
        log::debug!("ATH restriction is disabled symbol={symbol}");
        None
    };

    let latest_field = symbol_field(&symbol, "latest-candle");
    let last_candle = match cache_get_json::<LatestCandle>(ctx.cache, SYMBOLS_HASH, &latest_field).await? {
        Some(c) => c,
        None => LatestCandle {
            event_type: "24hrMiniTicker".into(),
            event_time: newest.open_time.timestamp_millis(),
            symbol: symbol.clone(),
            close: newest.close,
        },
    };
    let trading_view = cache_get_json::<serde_json::Value>(ctx.cache, TRADINGVIEW_HASH, &symbol)
        .await?
        .unwrap_or_else(|| serde_json::json!({}));

    let last_buy_price = ctx.trades.last_buy_price(&symbol).await?;

    let input = IndicatorInput {
        config: cfg,
        candles: &candles,
        ath_candles: ath_candles.as_deref(),
        current_price: last_candle.close,
        last_buy_price,
        base_asset_total: data.base_asset_balance.total,
        min_notional: data.symbol_info.min_notional,
        open_orders: &data.open_orders,
        now: ctx.now,
    };
    let Some(out) = compute_indicators(input) else {
        data.save_to_cache = false;
        return Ok(data);
    };

    let mut buy = out.buy;
    let mut sell = out.sell;
    buy.process_message = data.buy.take().map(|b| b.process_message).unwrap_or_default();
    sell.process_message = data.sell.take().map(|s| s.process_message).unwrap_or_default();

    log::debug!(
        "indicators symbol={symbol} price={} low={} high={} buy_trigger={:?} sell_trigger={:?}",
        buy.current_price,
        out.indicators.lowest_price,
        out.indicators.highest_price,
        buy.trigger_price,
        sell.trigger_price
    );

    data.indicators = Some(out.indicators);
    data.base_asset_balance.estimated_value = Some(out.base_asset_estimated_value);
    data.base_asset_balance.is_less_than_min_notional_value = Some(out.is_less_than_min_notional_value);
    data.last_candle = Some(last_candle);
    data.trading_view = trading_view;
    data.buy = Some(buy);
    data.sell = Some(sell);
    Ok(data)
}
