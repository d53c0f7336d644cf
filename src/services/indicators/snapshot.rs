// src/services/indicators/snapshot.rs
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{
    orders::AnnotatedOrder,
    pricing::{NextBestBuyCalculation, Restriction},
};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Indicators {
    pub highest_price: f64,
    pub lowest_price: f64,
    pub ath_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuySnapshot {
    pub current_price: f64,
    pub limit_price: Option<f64>,
    pub highest_price: f64,
    pub lowest_price: f64,
    pub ath_price: Option<f64>,
    pub ath_restriction_price: Restriction<f64>,
    /// `Active(true)` holds buys back while the Kagi trend is not up
    pub kagi_restriction: Restriction<bool>,
    pub trigger_price: Option<f64>,
    pub difference: Option<f64>,
    pub next_best_buy_amount: Option<f64>,
    pub next_best_buy_calculation: Option<NextBestBuyCalculation>,
    pub open_orders: Vec<AnnotatedOrder>,
    pub process_message: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SellSnapshot {
    pub current_price: f64,
    pub limit_price: Option<f64>,
    pub last_buy_price: Option<f64>,
    pub trigger_price: Option<f64>,
    pub difference: Option<f64>,
    pub stop_loss_trigger_price: Option<f64>,
    pub stop_loss_difference: Option<f64>,
    pub current_profit: Option<f64>,
    pub current_profit_percentage: Option<f64>,
    pub conservative_mode_applicable: bool,
    pub trigger_percentage: Option<f64>,
    /// `Active(true)` while the last two smoothed candles are bullish
    pub heikin_ashi_restriction: Restriction<bool>,
    pub open_orders: Vec<AnnotatedOrder>,
    pub process_message: String,
    pub updated_at: DateTime<Utc>,
}
