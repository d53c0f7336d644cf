// src/services/indicators/grid_state.rs
use serde::Serialize;

use crate::config::symbol::{GridPosition, GridTradeLeg};

/// Ladder shape flags used to decide whether next-best-buy sizing is safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridState {
    /// Ladder monotonicity was broken, usually by a manually set last buy price.
    pub has_obvious_manual_trade: bool,
    pub is_single_sell_grid: bool,
}

impl GridState {
    pub fn evaluate(buy: &[GridTradeLeg], sell: &[GridTradeLeg], pos: GridPosition) -> Self {
        let first_pending = buy.iter().position(|t| !t.executed);
        let first_executed = buy.iter().position(|t| t.executed);

        let has_obvious_manual_trade = match (first_pending, first_executed) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(pending), Some(executed)) => {
                pending < executed || pos.buy_index.is_some_and(|active| pending < active)
            }
        };

        Self {
            has_obvious_manual_trade,
            is_single_sell_grid: pos.sell_index.is_some() && sell.len() == 1,
        }
    }

    /// Sizing is only meaningful for a clean ladder closing in one sell.
    pub fn allows_next_best_buy(&self) -> bool {
        !self.has_obvious_manual_trade && self.is_single_sell_grid
    }
}

/// Index of the last executed buy leg, if any.
pub fn last_executed_index(buy: &[GridTradeLeg]) -> Option<usize> {
    buy.iter().rposition(|t| t.executed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leg(executed: bool) -> GridTradeLeg {
        GridTradeLeg {
            trigger_percentage: 1.0,
            stop_percentage: 1.0,
            limit_percentage: 1.0,
            max_purchase_amount: None,
            quantity_percentage: None,
            executed,
            executed_order: None,
        }
    }

    fn ladder(flags: &[bool]) -> Vec<GridTradeLeg> {
        flags.iter().map(|&f| leg(f)).collect()
    }

    fn pos(buy: Option<usize>, sell: Option<usize>) -> GridPosition {
        GridPosition { buy_index: buy, sell_index: sell }
    }

    #[test]
    fn monotonic_ladders_are_clean() {
        let sell = ladder(&[false]);
        for flags in [
            vec![true, false, false],
            vec![true, true, false],
            vec![true, true, true],
        ] {
            let active = flags.iter().position(|f| !f);
            let s = GridState::evaluate(&ladder(&flags), &sell, pos(active, Some(0)));
            assert!(!s.has_obvious_manual_trade, "{flags:?}");
        }
    }

    #[test]
    fn nothing_executed_is_manual() {
        let s = GridState::evaluate(&ladder(&[false, false]), &[], pos(Some(0), None));
        assert!(s.has_obvious_manual_trade);
    }

    #[test]
    fn gap_before_executed_leg_is_manual() {
        let s = GridState::evaluate(&ladder(&[false, true]), &[], pos(Some(0), None));
        assert!(s.has_obvious_manual_trade);
    }

    #[test]
    fn pending_leg_behind_active_index_is_manual() {
        // leg 1 pending, but the active index already moved on to 2
        let s = GridState::evaluate(&ladder(&[true, false, false]), &[], pos(Some(2), None));
        assert!(s.has_obvious_manual_trade);
    }

    #[test]
    fn single_sell_grid_requires_active_sell_and_one_leg() {
        let buy = ladder(&[true]);
        assert!(GridState::evaluate(&buy, &ladder(&[false]), pos(None, Some(0))).is_single_sell_grid);
        assert!(!GridState::evaluate(&buy, &ladder(&[false]), pos(None, None)).is_single_sell_grid);
        assert!(!GridState::evaluate(&buy, &ladder(&[false, false]), pos(None, Some(0))).is_single_sell_grid);
    }

    #[test]
    fn last_executed() {
        assert_eq!(last_executed_index(&ladder(&[true, true, false])), Some(1));
        assert_eq!(last_executed_index(&ladder(&[false, false])), None);
    }
}
