//! Buy/sell trigger prices, stop-loss levels and next-best-buy sizing.
//!
//! Every function takes the grid position as an explicit snapshot and never
//! touches the configuration it reads from.

use serde::Serialize;

use crate::config::symbol::{GridPosition, GridTradeLeg, SellConfig, SymbolConfiguration};

use super::grid_state::{last_executed_index, GridState};

/// A guard that can be switched off, unavailable for lack of data, or
/// evaluated to a value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "camelCase")]
pub enum Restriction<T> {
    Disabled,
    Unavailable,
    Active(T),
}

impl<T> Restriction<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Restriction::Active(v) => Some(v),
            _ => None,
        }
    }
}

/// Last buy price only when a real fill exists.
pub fn filled(last_buy_price: Option<f64>) -> Option<f64> {
    last_buy_price.filter(|p| *p > 0.0)
}

/// Scale the required profit down as more buy legs execute.
pub fn apply_conservative_sell(trigger_percentage: f64, factor: f64, depth: usize) -> f64 {
    1.0 + (trigger_percentage - 1.0) * factor.powi(depth as i32)
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BuyTriggers {
    pub trigger_price: Option<f64>,
    pub difference: Option<f64>,
    pub limit_price: Option<f64>,
}

/// First leg trails the window low; later legs trail the last fill.
pub fn buy_triggers(
    leg: Option<&GridTradeLeg>,
    pos: GridPosition,
    current_price: f64,
    last_buy_price: Option<f64>,
    lowest_price: f64,
) -> BuyTriggers {
    let Some(leg) = leg else {
        return BuyTriggers::default();
    };

    let base = match filled(last_buy_price) {
        Some(last) if pos.buy_index != Some(0) => last,
        _ => lowest_price,
    };
    let trigger_price = base * leg.trigger_percentage;

    BuyTriggers {
        trigger_price: Some(trigger_price),
        difference: Some((1.0 - current_price / trigger_price) * -100.0),
        limit_price: Some(current_price * leg.limit_percentage),
    }
}

pub fn ath_restriction_price(
    enabled: bool,
    ath_price: Option<f64>,
    restriction_percentage: f64,
) -> Restriction<f64> {
    match (enabled, ath_price) {
        (false, _) => Restriction::Disabled,
        (true, None) => Restriction::Unavailable,
        (true, Some(ath)) => Restriction::Active(ath * restriction_percentage),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SellTriggers {
    pub trigger_price: Option<f64>,
    pub difference: Option<f64>,
    pub limit_price: Option<f64>,
    pub trigger_percentage: Option<f64>,
    pub conservative_mode_applicable: bool,
}

pub fn sell_triggers(
    sell: &SellConfig,
    buy_ladder: &[GridTradeLeg],
    current_price: f64,
    last_buy_price: Option<f64>,
) -> SellTriggers {
    let (Some(last_buy), Some(leg)) = (filled(last_buy_price), sell.current_grid_trade()) else {
        return SellTriggers::default();
    };

    let depth = last_executed_index(buy_ladder);
    let conservative = &sell.conservative_mode;
    let applicable = conservative.enabled && depth.is_some_and(|d| d >= 1);

    let trigger_percentage = match depth {
        Some(d) if applicable => apply_conservative_sell(leg.trigger_percentage, conservative.factor, d),
        _ => leg.trigger_percentage,
    };
    let trigger_price = last_buy * trigger_percentage;

    SellTriggers {
        trigger_price: Some(trigger_price),
        difference: Some((1.0 - trigger_price / current_price) * 100.0),
        limit_price: Some(current_price * leg.limit_percentage),
        trigger_percentage: Some(trigger_percentage),
        conservative_mode_applicable: applicable,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StopLossLevels {
    pub trigger_price: Option<f64>,
    pub difference: Option<f64>,
}

pub fn stop_loss(max_loss_percentage: f64, current_price: f64, last_buy_price: Option<f64>) -> StopLossLevels {
    match filled(last_buy_price) {
        None => StopLossLevels::default(),
        Some(last_buy) => {
            let trigger = last_buy * max_loss_percentage;
            StopLossLevels {
                trigger_price: Some(trigger),
                difference: Some((1.0 - trigger / current_price) * 100.0),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Profit {
    pub amount: Option<f64>,
    pub percentage: Option<f64>,
}

pub fn current_profit(current_price: f64, last_buy_price: Option<f64>, base_total: f64) -> Profit {
    match filled(last_buy_price) {
        None => Profit::default(),
        Some(last_buy) => Profit {
            amount: Some((current_price - last_buy) * base_total),
            percentage: Some((current_price / last_buy - 1.0) * 100.0),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextBestBuyCalculation {
    pub current_price: f64,
    pub last_buy_price: f64,
    pub total_bought_amount: f64,
    pub total_bought_qty: f64,
    pub buy_trigger: f64,
    pub sell_trigger: Option<f64>,
    pub has_obvious_manual_trade: bool,
    pub is_single_sell_grid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NextBestBuy {
    /// `None` whenever the ladder state makes the estimate misleading
    pub amount: Option<f64>,
    pub calculation: NextBestBuyCalculation,
}

/// Quote amount to buy now so that one sell at `sell_trigger` recovers the
/// whole position.
pub fn next_best_buy_amount(
    total_amount: f64,
    total_qty: f64,
    buy_trigger: f64,
    last_buy_price: f64,
    sell_trigger: f64,
) -> f64 {
    (total_amount - total_qty * buy_trigger * last_buy_price * sell_trigger) / (sell_trigger - 1.0)
}

pub fn next_best_buy(
    cfg: &SymbolConfiguration,
    pos: GridPosition,
    current_price: f64,
    last_buy_price: f64,
) -> NextBestBuy {
    let buy_ladder = &cfg.buy.grid_trade;
    let conservative = &cfg.sell.conservative_mode;

    let sell_trigger = cfg.sell.current_grid_trade().map(|leg| {
        if conservative.enabled {
            let depth = last_executed_index(buy_ladder).map_or(0, |i| i + 1);
            apply_conservative_sell(leg.trigger_percentage, conservative.factor, depth)
        } else {
            leg.trigger_percentage
        }
    });

    let state = GridState::evaluate(buy_ladder, &cfg.sell.grid_trade, pos);

    let (total_amount, total_qty) = buy_ladder
        .iter()
        .filter(|t| t.executed)
        .filter_map(|t| t.executed_order.as_ref())
        .fold((0.0, 0.0), |(amount, qty), o| {
            (amount + o.cummulative_quote_qty, qty + o.executed_qty)
        });

    let buy_trigger = 1.0 + (current_price - last_buy_price) / last_buy_price;

    let amount = sell_trigger
        .filter(|t| *t != 1.0 && state.allows_next_best_buy())
        .map(|t| next_best_buy_amount(total_amount, total_qty, buy_trigger, last_buy_price, t));

    NextBestBuy {
        amount,
        calculation: NextBestBuyCalculation {
            current_price,
            last_buy_price,
            total_bought_amount: total_amount,
            total_bought_qty: total_qty,
            buy_trigger,
            sell_trigger,
            has_obvious_manual_trade: state.has_obvious_manual_trade,
            is_single_sell_grid: state.is_single_sell_grid,
        },
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::symbol::{
        AthRestriction, BuyConfig, CandleInterval, CandlesConfig, ConservativeMode, ExecutedOrder,
        StopLossConfig,
    };
    use approx::assert_relative_eq;

    pub(crate) fn leg(trigger: f64, limit: f64, fill: Option<(f64, f64)>) -> GridTradeLeg {
        GridTradeLeg {
            trigger_percentage: trigger,
            stop_percentage: 1.0,
            limit_percentage: limit,
            max_purchase_amount: None,
            quantity_percentage: None,
            executed: fill.is_some(),
            executed_order: fill.map(|(amount, qty)| ExecutedOrder {
                order_id: 1,
                side: "BUY".into(),
                price: amount / qty,
                executed_qty: qty,
                cummulative_quote_qty: amount,
                transact_time: 0,
            }),
        }
    }

    pub(crate) fn config(buy: Vec<GridTradeLeg>, buy_index: i64, sell: Vec<GridTradeLeg>) -> SymbolConfiguration {
        SymbolConfiguration {
            key: "BTCUSDT".into(),
            candles: CandlesConfig { interval: CandleInterval::H1, limit: 10 },
            buy: BuyConfig {
                current_grid_trade_index: buy_index,
                grid_trade: buy,
                ath_restriction: AthRestriction {
                    enabled: false,
                    candles: CandlesConfig { interval: CandleInterval::M5, limit: 30 },
                    restriction_percentage: 0.9,
                },
            },
            sell: SellConfig {
                current_grid_trade_index: if sell.is_empty() { -1 } else { 0 },
                grid_trade: sell,
                stop_loss: StopLossConfig { enabled: true, max_loss_percentage: 0.8 },
                conservative_mode: ConservativeMode { enabled: false, factor: 0.5 },
            },
        }
    }

    // ───────────────────────────────────────── buy side
    #[test]
    fn first_leg_trails_window_low() {
        let cfg = config(vec![leg(1.01, 1.02, None)], 0, vec![]);
        let b = buy_triggers(cfg.buy.current_grid_trade(), GridPosition::of(&cfg), 105.0, Some(90.0), 100.0);
        assert_relative_eq!(b.trigger_price.unwrap(), 101.0, epsilon = 1e-9);
        assert_relative_eq!(b.difference.unwrap(), (1.0 - 105.0 / 101.0) * -100.0, epsilon = 1e-9);
        assert_relative_eq!(b.limit_price.unwrap(), 105.0 * 1.02, epsilon = 1e-9);
    }

    #[test]
    fn later_leg_trails_last_buy() {
        let cfg = config(vec![leg(1.0, 1.02, Some((90.0, 1.0))), leg(0.8, 1.02, None)], 1, vec![]);
        let b = buy_triggers(cfg.buy.current_grid_trade(), GridPosition::of(&cfg), 80.0, Some(90.0), 70.0);
        assert_relative_eq!(b.trigger_price.unwrap(), 72.0, epsilon = 1e-9);

        // without a recorded fill the window low is used again
        let b = buy_triggers(cfg.buy.current_grid_trade(), GridPosition::of(&cfg), 80.0, None, 70.0);
        assert_relative_eq!(b.trigger_price.unwrap(), 56.0, epsilon = 1e-9);
    }

    #[test]
    fn no_active_buy_leg_means_no_trigger() {
        let cfg = config(vec![leg(1.0, 1.0, Some((90.0, 1.0)))], -1, vec![]);
        assert_eq!(
            buy_triggers(cfg.buy.current_grid_trade(), GridPosition::of(&cfg), 80.0, Some(90.0), 70.0),
            BuyTriggers::default()
        );
    }

    #[test]
    fn ath_restriction_states() {
        assert_eq!(ath_restriction_price(false, Some(100.0), 0.9), Restriction::Disabled);
        assert_eq!(ath_restriction_price(true, None, 0.9), Restriction::Unavailable);
        assert_eq!(ath_restriction_price(true, Some(100.0), 0.9), Restriction::Active(90.0));
    }

    // ───────────────────────────────────────── sell side
    #[test]
    fn sell_requires_a_fill() {
        let cfg = config(vec![leg(1.0, 1.0, None)], 0, vec![leg(1.06, 0.99, None)]);
        assert_eq!(sell_triggers(&cfg.sell, &cfg.buy.grid_trade, 100.0, None), SellTriggers::default());
        assert_eq!(sell_triggers(&cfg.sell, &cfg.buy.grid_trade, 100.0, Some(0.0)), SellTriggers::default());
    }

    #[test]
    fn plain_sell_trigger() {
        let cfg = config(vec![leg(1.0, 1.0, Some((90.0, 1.0)))], -1, vec![leg(1.06, 0.99, None)]);
        let s = sell_triggers(&cfg.sell, &cfg.buy.grid_trade, 100.0, Some(90.0));
        assert_relative_eq!(s.trigger_price.unwrap(), 95.4, epsilon = 1e-9);
        assert_relative_eq!(s.difference.unwrap(), (1.0 - 95.4 / 100.0) * 100.0, epsilon = 1e-9);
        assert_relative_eq!(s.limit_price.unwrap(), 99.0, epsilon = 1e-9);
        assert!(!s.conservative_mode_applicable);
    }

    #[test]
    fn conservative_sell_scales_with_depth() {
        let mut cfg = config(
            vec![
                leg(1.0, 1.0, Some((100.0, 1.0))),
                leg(0.9, 1.0, Some((90.0, 1.0))),
                leg(0.9, 1.0, Some((81.0, 1.0))),
            ],
            -1,
            vec![leg(1.08, 0.99, None)],
        );
        cfg.sell.conservative_mode.enabled = true;

        let s = sell_triggers(&cfg.sell, &cfg.buy.grid_trade, 85.0, Some(90.0));
        assert!(s.conservative_mode_applicable);
        // depth 2 → 1 + 0.08 * 0.25
        assert_relative_eq!(s.trigger_percentage.unwrap(), 1.02, epsilon = 1e-9);
        assert_relative_eq!(s.trigger_price.unwrap(), 90.0 * 1.02, epsilon = 1e-9);
    }

    #[test]
    fn conservative_sell_skipped_for_first_leg_only() {
        let mut cfg = config(vec![leg(1.0, 1.0, Some((100.0, 1.0))), leg(0.9, 1.0, None)], 1, vec![leg(1.08, 0.99, None)]);
        cfg.sell.conservative_mode.enabled = true;
        let s = sell_triggers(&cfg.sell, &cfg.buy.grid_trade, 100.0, Some(100.0));
        assert!(!s.conservative_mode_applicable);
        assert_relative_eq!(s.trigger_percentage.unwrap(), 1.08, epsilon = 1e-9);
    }

    #[test]
    fn stop_loss_and_profit() {
        let sl = stop_loss(0.8, 100.0, Some(90.0));
        assert_relative_eq!(sl.trigger_price.unwrap(), 72.0, epsilon = 1e-9);
        assert_relative_eq!(sl.difference.unwrap(), 28.0, epsilon = 1e-9);
        assert_eq!(stop_loss(0.8, 100.0, None), StopLossLevels::default());

        let p = current_profit(100.0, Some(80.0), 2.0);
        assert_relative_eq!(p.amount.unwrap(), 40.0, epsilon = 1e-9);
        assert_relative_eq!(p.percentage.unwrap(), 25.0, epsilon = 1e-9);
        assert_eq!(current_profit(100.0, None, 2.0), Profit::default());
    }

    // ───────────────────────────────────────── next best buy
    #[test]
    fn buy_trigger_ratio() {
        let cfg = config(vec![leg(1.0, 1.0, Some((900.0, 10.0)))], -1, vec![leg(1.05, 0.99, None)]);
        let n = next_best_buy(&cfg, GridPosition::of(&cfg), 100.0, 90.0);
        assert_eq!(n.calculation.buy_trigger, 1.0 + (100.0 - 90.0) / 90.0);
        assert_relative_eq!(n.calculation.buy_trigger, 1.111_111_111_111_111, epsilon = 1e-15);
    }

    #[test]
    fn next_best_buy_regression() {
        let cfg = config(vec![leg(1.0, 1.0, Some((900.0, 10.0)))], -1, vec![leg(1.05, 0.99, None)]);
        let n = next_best_buy(&cfg, GridPosition::of(&cfg), 100.0, 90.0);
        assert_eq!(n.calculation.total_bought_amount, 900.0);
        assert_eq!(n.calculation.total_bought_qty, 10.0);
        assert!(!n.calculation.has_obvious_manual_trade);
        assert!(n.calculation.is_single_sell_grid);
        assert_relative_eq!(n.amount.unwrap(), -3000.0, epsilon = 1e-6);

        // pinned with the rounded ratio
        assert_relative_eq!(next_best_buy_amount(900.0, 10.0, 1.1111, 90.0, 1.05), -2999.79, epsilon = 1e-6);
    }

    #[test]
    fn next_best_buy_withheld_for_manual_trade() {
        let cfg = config(vec![leg(1.0, 1.0, None), leg(0.9, 1.0, Some((900.0, 10.0)))], 0, vec![leg(1.05, 0.99, None)]);
        let n = next_best_buy(&cfg, GridPosition::of(&cfg), 100.0, 90.0);
        assert!(n.calculation.has_obvious_manual_trade);
        assert!(n.amount.is_none());
    }

    #[test]
    fn next_best_buy_withheld_for_multi_sell_grid() {
        let cfg = config(
            vec![leg(1.0, 1.0, Some((900.0, 10.0)))],
            -1,
            vec![leg(1.05, 0.99, None), leg(1.1, 0.99, None)],
        );
        let n = next_best_buy(&cfg, GridPosition::of(&cfg), 100.0, 90.0);
        assert!(!n.calculation.is_single_sell_grid);
        assert!(n.amount.is_none());
    }

    #[test]
    fn next_best_buy_uses_next_depth_when_conservative() {
        let mut cfg = config(vec![leg(1.0, 1.0, Some((900.0, 10.0)))], -1, vec![leg(1.1, 0.99, None)]);
        cfg.sell.conservative_mode.enabled = true;
        let n = next_best_buy(&cfg, GridPosition::of(&cfg), 100.0, 90.0);
        // last executed index 0 → depth 1
        assert_relative_eq!(n.calculation.sell_trigger.unwrap(), 1.05, epsilon = 1e-9);
    }
}
