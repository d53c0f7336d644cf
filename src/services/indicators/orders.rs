// src/services/indicators/orders.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::types::f64_from_any;

use super::pricing::filled;

pub const STOP_LOSS_LIMIT: &str = "STOP_LOSS_LIMIT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    #[serde(alias = "buy")]
    Buy,
    #[serde(alias = "sell")]
    Sell,
}

/// Open order as reported by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrder {
    pub symbol: String,
    pub order_id: i64,
    pub side: OrderSide,
    #[serde(rename = "type")]
    pub order_type: String,
    #[serde(deserialize_with = "f64_from_any")]
    pub price: f64,
    #[serde(deserialize_with = "f64_from_any")]
    pub orig_qty: f64,
    #[serde(default, deserialize_with = "f64_from_any")]
    pub stop_price: f64,
    /// creation time, ms since epoch
    pub time: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedOrder {
    #[serde(flatten)]
    pub order: OpenOrder,
    pub current_price: f64,
    pub updated_at: DateTime<Utc>,
    pub difference_to_execute: Option<f64>,
    pub difference_to_cancel: Option<f64>,
    pub minimum_profit: Option<f64>,
    pub minimum_profit_percentage: Option<f64>,
}

/// Limit prices the open stop orders are measured against.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderLimits {
    pub buy_limit_price: Option<f64>,
    pub sell_limit_price: Option<f64>,
}

pub fn annotate_orders(
    orders: &[OpenOrder],
    current_price: f64,
    limits: OrderLimits,
    last_buy_price: Option<f64>,
) -> Vec<AnnotatedOrder> {
    orders
        .iter()
        .map(|o| annotate(o, current_price, limits, last_buy_price))
        .collect()
}

fn annotate(
    order: &OpenOrder,
    current_price: f64,
    limits: OrderLimits,
    last_buy_price: Option<f64>,
) -> AnnotatedOrder {
    let mut out = AnnotatedOrder {
        order: order.clone(),
        current_price,
        updated_at: DateTime::<Utc>::from_timestamp_millis(order.time).unwrap_or_default(),
        difference_to_execute: None,
        difference_to_cancel: None,
        minimum_profit: None,
        minimum_profit_percentage: None,
    };

    if order.order_type != STOP_LOSS_LIMIT {
        return out;
    }

    let distance = |reference: f64| (1.0 - order.stop_price / reference) * 100.0;
    let limit = match order.side {
        OrderSide::Buy => limits.buy_limit_price,
        OrderSide::Sell => limits.sell_limit_price,
    };

    out.difference_to_execute = Some(distance(current_price));
    out.difference_to_cancel = limit.filter(|l| *l > 0.0).map(distance);

    if order.side == OrderSide::Sell {
        if let Some(last_buy) = filled(last_buy_price) {
            out.minimum_profit = Some((order.price - last_buy) * order.orig_qty);
            out.minimum_profit_percentage = Some((order.price / last_buy - 1.0) * 100.0);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn order(side: OrderSide, order_type: &str, price: f64, stop: f64) -> OpenOrder {
        OpenOrder {
            symbol: "BTCUSDT".into(),
            order_id: 42,
            side,
            order_type: order_type.into(),
            price,
            orig_qty: 2.0,
            stop_price: stop,
            time: 1_650_000_000_000,
        }
    }

    #[test]
    fn parses_exchange_payload() {
        let raw = r#"{"symbol":"BTCUSDT","orderId":1,"side":"SELL","type":"STOP_LOSS_LIMIT",
                      "price":"101.5","origQty":"0.1","stopPrice":"101.6","time":1650000000000,
                      "status":"NEW"}"#;
        let o: OpenOrder = serde_json::from_str(raw).unwrap();
        assert_eq!(o.side, OrderSide::Sell);
        assert_eq!(o.stop_price, 101.6);
    }

    #[test]
    fn plain_orders_only_get_price_and_time() {
        let out = annotate_orders(&[order(OrderSide::Buy, "LIMIT", 99.0, 0.0)], 100.0, OrderLimits::default(), None);
        assert_eq!(out[0].current_price, 100.0);
        assert_eq!(out[0].updated_at.timestamp_millis(), 1_650_000_000_000);
        assert!(out[0].difference_to_execute.is_none());
        assert!(out[0].difference_to_cancel.is_none());
    }

    #[test]
    fn buy_stop_distances() {
        let limits = OrderLimits { buy_limit_price: Some(102.0), sell_limit_price: None };
        let out = annotate_orders(&[order(OrderSide::Buy, STOP_LOSS_LIMIT, 101.1, 101.0)], 100.0, limits, Some(90.0));
        assert_relative_eq!(out[0].difference_to_execute.unwrap(), -1.0, epsilon = 1e-9);
        assert_relative_eq!(out[0].difference_to_cancel.unwrap(), (1.0 - 101.0 / 102.0) * 100.0, epsilon = 1e-9);
        assert!(out[0].minimum_profit.is_none());
    }

    #[test]
    fn sell_stop_without_limit_or_fill() {
        let out = annotate_orders(&[order(OrderSide::Sell, STOP_LOSS_LIMIT, 99.0, 99.5)], 100.0, OrderLimits::default(), None);
        assert_relative_eq!(out[0].difference_to_execute.unwrap(), 0.5, epsilon = 1e-9);
        assert!(out[0].difference_to_cancel.is_none());
        assert!(out[0].minimum_profit.is_none());
        assert!(out[0].minimum_profit_percentage.is_none());
    }

    #[test]
    fn sell_stop_minimum_profit() {
        let limits = OrderLimits { buy_limit_price: None, sell_limit_price: Some(99.0) };
        let out = annotate_orders(&[order(OrderSide::Sell, STOP_LOSS_LIMIT, 99.0, 99.5)], 100.0, limits, Some(90.0));
        assert_relative_eq!(out[0].minimum_profit.unwrap(), 18.0, epsilon = 1e-9);
        assert_relative_eq!(out[0].minimum_profit_percentage.unwrap(), 10.0, epsilon = 1e-9);
        assert!(out[0].difference_to_cancel.unwrap() < 0.0);
    }
}
