//! Pure composition of the indicator core: candles + configuration in,
//! buy/sell snapshots out. No I/O happens here.

use chrono::{DateTime, Utc};

use crate::config::symbol::{GridPosition, SymbolConfiguration};

use super::{
    common::{price_range, Candle},
    orders::{annotate_orders, OpenOrder, OrderLimits, OrderSide},
    pricing::{
        ath_restriction_price, buy_triggers, current_profit, filled, next_best_buy, sell_triggers,
        stop_loss, Restriction,
    },
    snapshot::{BuySnapshot, Indicators, SellSnapshot},
    trend::{heikin_ashi, kagi_trend, HeikinAshiCandle},
};

pub const KAGI_PERIOD: usize = 10;
/// Raw candles needed before the Kagi check is evaluated at all.
pub const KAGI_MIN_CANDLES: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct IndicatorInput<'a> {
    pub config: &'a SymbolConfiguration,
    /// newest first, as read from the candle store
    pub candles: &'a [Candle],
    /// `None` when the ATH restriction is disabled
    pub ath_candles: Option<&'a [Candle]>,
    pub current_price: f64,
    pub last_buy_price: Option<f64>,
    pub base_asset_total: f64,
    pub min_notional: f64,
    pub open_orders: &'a [OpenOrder],
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorOutput {
    pub indicators: Indicators,
    pub buy: BuySnapshot,
    pub sell: SellSnapshot,
    pub base_asset_estimated_value: f64,
    pub is_less_than_min_notional_value: bool,
}

/// Returns `None` for an empty candle window.
pub fn compute_indicators(input: IndicatorInput<'_>) -> Option<IndicatorOutput> {
    let cfg = input.config;
    let pos = GridPosition::of(cfg);
    let (lowest_price, highest_price) = price_range(input.candles)?;
    let ath_price = input.ath_candles.and_then(price_range).map(|(_, high)| high);
    let current_price = input.current_price;
    let last_buy_price = input.last_buy_price;

    // ── buy side
    let buy = buy_triggers(cfg.buy.current_grid_trade(), pos, current_price, last_buy_price, lowest_price);
    let ath = &cfg.buy.ath_restriction;
    let ath_restriction = ath_restriction_price(ath.enabled, ath_price, ath.restriction_percentage);

    // ── sell side
    let sell = sell_triggers(&cfg.sell, &cfg.buy.grid_trade, current_price, last_buy_price);
    let stop = stop_loss(cfg.sell.stop_loss.max_loss_percentage, current_price, last_buy_price);
    let profit = current_profit(current_price, last_buy_price, input.base_asset_total);

    let next = filled(last_buy_price).map(|last_buy| next_best_buy(cfg, pos, current_price, last_buy));

    // ── trend restrictions, oldest first
    let ascending: Vec<Candle> = input.candles.iter().rev().copied().collect();
    let smoothed: Vec<HeikinAshiCandle> = heikin_ashi(&ascending).collect();
    let heikin_ashi_restriction = heikin_ashi_up_trend(&smoothed);
    let kagi_restriction = kagi_restriction(&smoothed, input.candles.len());

    // ── open orders
    let limits = OrderLimits { buy_limit_price: buy.limit_price, sell_limit_price: sell.limit_price };
    let annotated = annotate_orders(input.open_orders, current_price, limits, last_buy_price);
    let (buy_orders, sell_orders): (Vec<_>, Vec<_>) =
        annotated.into_iter().partition(|o| o.order.side == OrderSide::Buy);

    let estimated_value = input.base_asset_total * current_price;

    Some(IndicatorOutput {
        indicators: Indicators { highest_price, lowest_price, ath_price },
        buy: BuySnapshot {
            current_price,
            limit_price: buy.limit_price,
            highest_price,
            lowest_price,
            ath_price,
            ath_restriction_price: ath_restriction,
            kagi_restriction,
            trigger_price: buy.trigger_price,
            difference: buy.difference,
            next_best_buy_amount: next.and_then(|n| n.amount),
            next_best_buy_calculation: next.map(|n| n.calculation),
            open_orders: buy_orders,
            process_message: String::new(),
            updated_at: input.now,
        },
        sell: SellSnapshot {
            current_price,
            limit_price: sell.limit_price,
            last_buy_price,
            trigger_price: sell.trigger_price,
            difference: sell.difference,
            stop_loss_trigger_price: stop.trigger_price,
            stop_loss_difference: stop.difference,
            current_profit: profit.amount,
            current_profit_percentage: profit.percentage,
            conservative_mode_applicable: sell.conservative_mode_applicable,
            trigger_percentage: sell.trigger_percentage,
            heikin_ashi_restriction,
            open_orders: sell_orders,
            process_message: String::new(),
            updated_at: input.now,
        },
        base_asset_estimated_value: estimated_value,
        is_less_than_min_notional_value: estimated_value < input.min_notional,
    })
}

/// Both of the last two smoothed candles closed above their open.
fn heikin_ashi_up_trend(smoothed: &[HeikinAshiCandle]) -> Restriction<bool> {
    match smoothed {
        [.., prev, last] => Restriction::Active(last.close > last.open && prev.close > prev.open),
        _ => Restriction::Unavailable,
    }
}

/// Kagi over double-smoothed candles; the restriction lifts only when the
/// previous and the current reading both point up.
fn kagi_restriction(smoothed: &[HeikinAshiCandle], raw_len: usize) -> Restriction<bool> {
    if raw_len < KAGI_MIN_CANDLES {
        return Restriction::Unavailable;
    }
    let double: Vec<HeikinAshiCandle> = heikin_ashi(smoothed).collect();
    let previous = kagi_trend(&double[..double.len() - 1], KAGI_PERIOD);
    let current = kagi_trend(&double, KAGI_PERIOD);

    match (previous, current) {
        (Some(p), Some(c)) => Restriction::Active(!(p > 0.0 && c > 0.0)),
        _ => Restriction::Unavailable,
    }
}
