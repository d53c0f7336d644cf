// src/routes/udf.rs

//! TradingView Universal Data Feed endpoints plus the grid-trade overlay
//! the dashboard chart draws on top of the candles.

use std::sync::Arc;

use actix_web::{get, web, HttpResponse, Responder, Scope};
use chrono::{TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    config::symbol::{CandleInterval, ExecutedOrder, GridTradeLeg, SymbolConfiguration},
    db::store::{CacheMirror, GridTradeArchive, StopLossOrder, TradeStore},
    services::{
        binance::{cached_exchange_info, ExchangeClient, ExchangeSymbol},
        trailing_trade::load_symbol_configuration,
    },
    utils::errors::StepError,
};

pub const SUPPORTED_RESOLUTIONS: [&str; 15] = [
    "1", "3", "5", "15", "30", "60", "120", "240", "360", "480", "720", "1D", "3D", "1W", "1M",
];

const EXCHANGE: &str = "BINANCE";
const DEFAULT_COUNTBACK: usize = 500;

/// Kline interval for a chart resolution. Bare `D`, `W` and `M` are accepted too.
pub fn resolution_interval(resolution: &str) -> Option<CandleInterval> {
    Some(match resolution {
        "1" => CandleInterval::M1,
        "3" => CandleInterval::M3,
        "5" => CandleInterval::M5,
        "15" => CandleInterval::M15,
        "30" => CandleInterval::M30,
        "60" => CandleInterval::H1,
        "120" => CandleInterval::H2,
        "240" => CandleInterval::H4,
        "360" => CandleInterval::H6,
        "480" => CandleInterval::H8,
        "720" => CandleInterval::H12,
        "D" | "1D" => CandleInterval::D1,
        "3D" => CandleInterval::D3,
        "W" | "1W" => CandleInterval::W1,
        "M" | "1M" => CandleInterval::Mo1,
        _ => return None,
    })
}

/// Length of one bar in seconds.
pub fn resolution_seconds(resolution: &str) -> Option<i64> {
    Some(match resolution {
        "1" => 60,
        "3" => 180,
        "5" => 300,
        "15" => 900,
        "30" => 1_800,
        "60" => 3_600,
        "120" => 7_200,
        "240" => 14_400,
        "360" => 21_600,
        "480" => 28_800,
        "720" => 43_200,
        "1D" => 86_400,
        "3D" => 259_200,
        "1W" => 604_800,
        "1M" => 2_592_000,
        _ => return None,
    })
}

#[derive(Clone)]
pub struct UdfState {
    pub cache: Arc<dyn CacheMirror>,
    pub trades: Arc<dyn TradeStore>,
    pub exchange: Arc<dyn ExchangeClient>,
    pub timezone: Tz,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UdfSymbol {
    pub symbol: String,
    pub ticker: String,
    pub name: String,
    pub full_name: String,
    pub description: String,
    pub exchange: &'static str,
    pub listed_exchange: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub currency_code: String,
    pub session: &'static str,
    pub timezone: String,
    pub minmovement: u32,
    pub minmov: u32,
    pub minmovement2: u32,
    pub minmov2: u32,
    pub pricescale: f64,
    pub supported_resolutions: &'static [&'static str],
    pub has_intraday: bool,
    pub has_daily: bool,
    pub has_weekly_and_monthly: bool,
    pub data_status: &'static str,
}

impl UdfSymbol {
    pub fn from_exchange(s: &ExchangeSymbol, tz: Tz) -> Self {
        Self {
            symbol: s.symbol.clone(),
            ticker: s.symbol.clone(),
            name: s.symbol.clone(),
            full_name: s.symbol.clone(),
            description: format!("{} / {}", s.base_asset, s.quote_asset),
            exchange: EXCHANGE,
            listed_exchange: EXCHANGE,
            kind: "crypto",
            currency_code: s.quote_asset.clone(),
            session: "24x7",
            timezone: tz.name().to_string(),
            minmovement: 1,
            minmov: 1,
            minmovement2: 0,
            minmov2: 0,
            pricescale: s.price_scale(),
            supported_resolutions: &SUPPORTED_RESOLUTIONS,
            has_intraday: true,
            has_daily: true,
            has_weekly_and_monthly: true,
            data_status: "streaming",
        }
    }
}

async fn lookup_symbol(state: &UdfState, symbol: &str) -> Result<Option<UdfSymbol>, StepError> {
    let info = cached_exchange_info(state.cache.as_ref(), state.exchange.as_ref()).await?;
    Ok(info.symbol(symbol).map(|s| UdfSymbol::from_exchange(s, state.timezone)))
}

fn internal_error(what: &str, e: impl std::fmt::Display) -> HttpResponse {
    log::error!("udf {what} failed: {e}");
    HttpResponse::InternalServerError().json(json!({"s": "error", "errmsg": e.to_string()}))
}

#[derive(Debug, Deserialize)]
pub struct SymbolQuery {
    #[serde(default)]
    pub symbol: String,
}

#[get("/symbols")]
async fn udf_symbols(state: web::Data<UdfState>, q: web::Query<SymbolQuery>) -> impl Responder {
    match lookup_symbol(&state, &q.symbol).await {
        Ok(Some(info)) => HttpResponse::Ok().json(info),
        Ok(None) => HttpResponse::Ok().json(json!({})),
        Err(e) => internal_error("symbols", e),
    }
}

#[get("/time")]
async fn udf_time() -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/plain")
        .body(Utc::now().timestamp().to_string())
}

#[get("/config")]
async fn udf_config() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "exchanges": [{"value": EXCHANGE, "name": "Binance", "desc": "Binance Exchange"}],
        "symbols_types": [{"value": "crypto", "name": "Cryptocurrency"}],
        "supported_resolutions": SUPPORTED_RESOLUTIONS,
        "supports_search": true,
        "supports_group_request": false,
        "supports_marks": false,
        "supports_timescale_marks": false,
        "supports_time": true,
    }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub resolution: String,
    /// unix seconds
    pub to: Option<i64>,
    pub countback: Option<usize>,
}

#[get("/history")]
async fn udf_history(state: web::Data<UdfState>, q: web::Query<HistoryQuery>) -> impl Responder {
    match lookup_symbol(&state, &q.symbol).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            log::error!("Invalid symbol {}", q.symbol);
            return HttpResponse::InternalServerError()
                .json(json!({"s": "error", "errmsg": format!("Invalid symbol {}", q.symbol)}));
        }
        Err(e) => return internal_error("history", e),
    }

    let Some(interval) = resolution_interval(&q.resolution) else {
        return HttpResponse::Ok().json(json!({"s": "no_data", "m": "invalid resolution"}));
    };

    let end_time = q.to.and_then(|t| Utc.timestamp_opt(t, 0).single());
    let limit = q.countback.unwrap_or(DEFAULT_COUNTBACK);
    let candles = match state.exchange.candles(&q.symbol, interval, end_time, limit).await {
        Ok(c) => c,
        Err(e) => return internal_error("history", e),
    };

    if candles.is_empty() {
        return HttpResponse::Ok().json(json!({"s": "no_data", "m": "no candles"}));
    }

    HttpResponse::Ok().json(json!({
        "s": "ok",
        "t": candles.iter().map(|c| c.open_time.timestamp()).collect::<Vec<_>>(),
        "c": candles.iter().map(|c| c.close).collect::<Vec<_>>(),
        "o": candles.iter().map(|c| c.open).collect::<Vec<_>>(),
        "h": candles.iter().map(|c| c.high).collect::<Vec<_>>(),
        "l": candles.iter().map(|c| c.low).collect::<Vec<_>>(),
        "v": candles.iter().map(|c| c.volume).collect::<Vec<_>>(),
    }))
}

// ───────────────────────────────────────── marks

/// Column-oriented chart marks, one index per executed order.
#[derive(Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Marks {
    pub id: Vec<i64>,
    pub time: Vec<f64>,
    pub color: Vec<&'static str>,
    pub text: Vec<String>,
    pub price: Vec<f64>,
    pub label: Vec<&'static str>,
    pub label_font_color: Vec<&'static str>,
    pub min_size: Vec<u32>,
}

struct MarkSource<'a> {
    id: i64,
    transact_time: i64,
    side: &'a str,
    price: f64,
    time_in_force: Option<&'a str>,
}

impl<'a> From<&'a ExecutedOrder> for MarkSource<'a> {
    fn from(o: &'a ExecutedOrder) -> Self {
        Self { id: o.order_id, transact_time: o.transact_time, side: &o.side, price: o.price, time_in_force: None }
    }
}

impl<'a> From<&'a StopLossOrder> for MarkSource<'a> {
    fn from(o: &'a StopLossOrder) -> Self {
        Self {
            id: o.order_id,
            transact_time: o.transact_time,
            side: &o.side,
            price: o.fills.first().map(|f| f.price).unwrap_or_default(),
            time_in_force: o.time_in_force.as_deref(),
        }
    }
}

fn executed_orders(legs: &[GridTradeLeg]) -> impl Iterator<Item = &ExecutedOrder> {
    legs.iter().filter(|l| l.executed).filter_map(|l| l.executed_order.as_ref())
}

fn local_time(tz: Tz, ms: i64) -> String {
    tz.timestamp_millis_opt(ms)
        .single()
        .map(|t| t.format("%a %b %d %Y %H:%M:%S GMT%z").to_string())
        .unwrap_or_default()
}

/// Sells, then buys, then stop losses. Times are shifted one bar left so the
/// mark lands on the bar the order filled in.
pub fn build_marks(archives: &[GridTradeArchive], bar_seconds: i64, tz: Tz) -> Marks {
    let sells = archives.iter().flat_map(|a| executed_orders(&a.sell)).map(MarkSource::from);
    let buys = archives.iter().flat_map(|a| executed_orders(&a.buy)).map(MarkSource::from);
    let stops = archives.iter().filter_map(|a| a.stop_loss.as_ref()).map(MarkSource::from);

    let mut out = Marks::default();
    for src in sells.chain(buys).chain(stops) {
        let is_buy = src.side == "BUY";
        out.id.push(src.id);
        out.time.push(src.transact_time as f64 / 1_000.0 - bar_seconds as f64);
        out.color.push(if is_buy {
            "red"
        } else if src.time_in_force == Some("GTC") {
            "orange"
        } else {
            "green"
        });
        out.text.push(format!("@{} {}", src.price, local_time(tz, src.transact_time)));
        out.price.push(src.price);
        out.label.push(if is_buy { "B" } else { "S" });
        out.label_font_color.push("white");
        out.min_size.push(14);
    }
    out
}

#[derive(Debug, Deserialize)]
pub struct MarksQuery {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub resolution: String,
}

#[get("/marks")]
async fn udf_marks(state: web::Data<UdfState>, q: web::Query<MarksQuery>) -> impl Responder {
    let archives = match state.trades.archived_grids(&q.symbol).await {
        Ok(a) => a,
        Err(e) => return internal_error("marks", e),
    };
    let bar = resolution_seconds(&q.resolution).unwrap_or(0);
    HttpResponse::Ok().json(build_marks(&archives, bar, state.timezone))
}

// ───────────────────────────────────────── grid trades

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// One chart overlay row. `to` is the next row's time, `null` for the last.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridTradeRow {
    pub time: f64,
    pub side: TradeSide,
    pub price: f64,
    pub qty: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sell_trigger: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buy_trigger: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_buy_price: Option<f64>,
    pub scale: f64,
    pub from: f64,
    pub to: Option<f64>,
}

/// Ladder view shared by archived and active grids.
pub struct GridView<'a> {
    pub buy: &'a [GridTradeLeg],
    pub sell: &'a [GridTradeLeg],
    pub stop_loss: Option<&'a StopLossOrder>,
    pub stop_loss_quote_qty: Option<f64>,
}

enum Exit<'a> {
    Sold(&'a ExecutedOrder),
    StoppedOut(&'a StopLossOrder),
}

impl<'a> GridView<'a> {
    fn exit(&self) -> Option<Exit<'a>> {
        if let Some(order) = self.sell.first().filter(|l| l.executed).and_then(|l| l.executed_order.as_ref()) {
            return Some(Exit::Sold(order));
        }
        self.stop_loss_quote_qty.and(self.stop_loss).map(Exit::StoppedOut)
    }
}

fn trigger_at(ladder: &[GridTradeLeg], index: usize) -> f64 {
    ladder.get(index).map(|l| l.trigger_percentage).unwrap_or(0.0)
}

fn exit_row(exit: &Exit<'_>, scale: f64) -> Option<GridTradeRow> {
    let (at_ms, price, qty, stop_loss) = match exit {
        Exit::Sold(o) => (o.transact_time, o.price, o.executed_qty, false),
        Exit::StoppedOut(o) => (o.transact_time, o.fills.first()?.price, o.executed_qty, true),
    };
    Some(GridTradeRow {
        time: at_ms as f64 / 1_000.0,
        side: TradeSide::Sell,
        price,
        qty,
        stop_loss: Some(stop_loss),
        sell_trigger: None,
        buy_trigger: None,
        last_buy_price: None,
        scale,
        from: 0.0,
        to: None,
    })
}

/// Trade rows for every grid, sorted by time and chained through `from`/`to`.
///
/// Grids without an exit take their triggers from `live` when given.
pub fn build_grid_trades(grids: &[GridView<'_>], live: Option<&SymbolConfiguration>, scale: f64) -> Vec<GridTradeRow> {
    let mut rows = Vec::new();

    for grid in grids {
        let exit = grid.exit();
        if let Some(row) = exit.as_ref().and_then(|e| exit_row(e, scale)) {
            rows.push(row);
        }

        let (buy_ladder, sell_ladder) = match (&exit, live) {
            (None, Some(cfg)) => (cfg.buy.grid_trade.as_slice(), cfg.sell.grid_trade.as_slice()),
            _ => (grid.buy, grid.sell),
        };

        let mut qty = 0.0;
        let mut amount = 0.0;
        for (b, leg) in grid.buy.iter().enumerate() {
            let Some(order) = leg.executed_order.as_ref().filter(|_| leg.executed) else {
                continue;
            };
            qty += order.executed_qty;
            amount += order.cummulative_quote_qty;

            rows.push(GridTradeRow {
                time: order.transact_time as f64 / 1_000.0,
                side: TradeSide::Buy,
                price: order.price,
                qty: order.executed_qty,
                stop_loss: None,
                sell_trigger: Some(trigger_at(sell_ladder, 0) * scale),
                buy_trigger: Some(trigger_at(buy_ladder, b + 1) * scale),
                last_buy_price: Some(if qty > 0.0 { amount / qty } else { 0.0 }),
                scale,
                from: 0.0,
                to: None,
            });
        }
    }

    rows.sort_by(|a, b| a.time.total_cmp(&b.time));
    let next_times: Vec<Option<f64>> = rows.iter().skip(1).map(|r| Some(r.time)).chain([None]).collect();
    for (row, to) in rows.iter_mut().zip(next_times) {
        row.from = row.time;
        row.to = to;
    }
    rows
}

async fn grid_trades_for(state: &UdfState, symbol: &str) -> Result<Option<Vec<GridTradeRow>>, StepError> {
    let Some(udf_symbol) = lookup_symbol(state, symbol).await? else {
        return Ok(None);
    };
    let live = load_symbol_configuration(state.trades.as_ref(), state.cache.as_ref(), symbol).await?;
    let archives: Vec<_> = state
        .trades
        .archived_grids(symbol)
        .await?
        .into_iter()
        .filter(|a| a.is_closed())
        .collect();
    let active = state.trades.active_grid(symbol).await?;

    let mut views: Vec<GridView<'_>> = archives
        .iter()
        .map(|a| GridView {
            buy: &a.buy,
            sell: &a.sell,
            stop_loss: a.stop_loss.as_ref(),
            stop_loss_quote_qty: a.stop_loss_quote_qty,
        })
        .collect();
    if let Some(g) = &active {
        views.push(GridView { buy: &g.buy, sell: &g.sell, stop_loss: None, stop_loss_quote_qty: None });
    }

    Ok(Some(build_grid_trades(&views, live.as_ref(), udf_symbol.pricescale)))
}

#[get("/grid_trades")]
async fn udf_grid_trades(state: web::Data<UdfState>, q: web::Query<SymbolQuery>) -> impl Responder {
    match grid_trades_for(&state, &q.symbol).await {
        Ok(Some(rows)) => HttpResponse::Ok().json(rows),
        Ok(None) => HttpResponse::InternalServerError()
            .json(json!({"s": "error", "errmsg": format!("Invalid symbol {}", q.symbol)})),
        Err(e) => internal_error("grid_trades", e),
    }
}

pub fn udf_scope() -> Scope {
    web::scope("/udf")
        .service(udf_symbols)
        .service(udf_time)
        .service(udf_config)
        .service(udf_history)
        .service(udf_marks)
        .service(udf_grid_trades)
}
