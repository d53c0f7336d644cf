// tests/routes.rs
use std::sync::Arc;

use actix_web::{test, web, App};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use gridbot_backend::{
    config::symbol::{CandleInterval, ExecutedOrder, GridTradeLeg},
    db::{
        memory::MemoryStore,
        store::{ActiveGrid, GridTradeArchive, TradeStore},
    },
    routes::{
        health::health_scope,
        udf::{udf_scope, UdfState},
    },
    services::{
        balance_transfer::BalanceTransferRequest,
        binance::{AccountBalances, AssetBalance, ExchangeClient, ExchangeInfo},
        indicators::{Candle, OpenOrder},
    },
    utils::errors::ApiError,
};

struct ChartExchange {
    candles: Vec<Candle>,
}

#[async_trait]
impl ExchangeClient for ChartExchange {
    async fn exchange_info(&self) -> Result<ExchangeInfo, ApiError> {
        Ok(serde_json::from_value(json!({"symbols": [{
            "symbol": "BTCUSDT", "baseAsset": "BTC", "quoteAsset": "USDT",
            "filters": [{"filterType": "PRICE_FILTER", "tickSize": "0.01000000"}]
        }]}))?)
    }
    async fn candles(
        &self,
        _symbol: &str,
        _interval: CandleInterval,
        end_time: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Candle>, ApiError> {
        Ok(self
            .candles
            .iter()
            .filter(|c| end_time.map_or(true, |end| c.open_time <= end))
            .take(limit)
            .copied()
            .collect())
    }
    async fn current_price(&self, _symbol: &str) -> Result<f64, ApiError> {
        Ok(100.0)
    }
    async fn account_balances(&self) -> Result<Vec<AssetBalance>, ApiError> {
        Ok(vec![])
    }
    async fn open_orders(&self, _symbol: &str) -> Result<Vec<OpenOrder>, ApiError> {
        Ok(vec![])
    }
    async fn sub_account_balances(&self) -> Result<Vec<AccountBalances>, ApiError> {
        Ok(vec![])
    }
    async fn transfer(&self, _request: &BalanceTransferRequest) -> Result<bool, ApiError> {
        Ok(false)
    }
}

fn candle(minute: i64, close: f64) -> Candle {
    Candle {
        open_time: Utc.timestamp_opt(minute * 60, 0).unwrap(),
        open: close - 1.0,
        high: close + 2.0,
        low: close - 2.0,
        close,
        volume: 3.0,
    }
}

fn state(store: Arc<MemoryStore>, candles: Vec<Candle>) -> UdfState {
    UdfState {
        cache: store.clone(),
        trades: store,
        exchange: Arc::new(ChartExchange { candles }),
        timezone: chrono_tz::Europe::Madrid,
    }
}

fn fill(side: &str, trigger: f64, price: f64, qty: f64, at_ms: i64) -> GridTradeLeg {
    GridTradeLeg {
        trigger_percentage: trigger,
        stop_percentage: 1.0,
        limit_percentage: 1.0,
        max_purchase_amount: None,
        quantity_percentage: None,
        executed: true,
        executed_order: Some(ExecutedOrder {
            order_id: at_ms,
            side: side.into(),
            price,
            executed_qty: qty,
            cummulative_quote_qty: price * qty,
            transact_time: at_ms,
        }),
    }
}

async fn get_json(state: UdfState, uri: &str) -> (u16, Value) {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .service(udf_scope()),
    )
    .await;
    let req = test::TestRequest::get().uri(uri).to_request();
    let resp = test::call_service(&app, req).await;
    let status = resp.status().as_u16();
    let body = test::read_body(resp).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

#[actix_rt::test]
async fn health_reports_ok() {
    let app = test::init_service(App::new().service(health_scope())).await;
    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "OK");
}

#[actix_rt::test]
async fn symbols_known_and_unknown() {
    let store = Arc::new(MemoryStore::new());
    let (status, body) = get_json(state(store.clone(), vec![]), "/udf/symbols?symbol=BTCUSDT").await;
    assert_eq!(status, 200);
    assert_eq!(body["description"], "BTC / USDT");
    assert_eq!(body["pricescale"], 100.0);
    assert_eq!(body["timezone"], "Europe/Madrid");
    assert_eq!(body["type"], "crypto");
    assert_eq!(body["supported_resolutions"].as_array().unwrap().len(), 15);

    let (status, body) = get_json(state(store, vec![]), "/udf/symbols?symbol=NOPE").await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({}));
}

#[actix_rt::test]
async fn config_and_time() {
    let store = Arc::new(MemoryStore::new());
    let (_, body) = get_json(state(store.clone(), vec![]), "/udf/config").await;
    assert_eq!(body["supports_time"], true);
    assert_eq!(body["supports_marks"], false);
    assert_eq!(body["exchanges"][0]["value"], "BINANCE");

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state(store, vec![])))
            .service(udf_scope()),
    )
    .await;
    let resp = test::call_service(&app, test::TestRequest::get().uri("/udf/time").to_request()).await;
    assert_eq!(resp.status(), 200);
    let body = test::read_body(resp).await;
    let secs: i64 = std::str::from_utf8(&body).unwrap().parse().unwrap();
    assert!((secs - Utc::now().timestamp()).abs() < 5);
}

#[actix_rt::test]
async fn history_ok_and_no_data() {
    let store = Arc::new(MemoryStore::new());
    let candles = vec![candle(1, 100.0), candle(2, 101.0), candle(3, 102.0)];

    let (status, body) = get_json(
        state(store.clone(), candles.clone()),
        "/udf/history?symbol=BTCUSDT&resolution=1&to=120&countback=10",
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["s"], "ok");
    assert_eq!(body["t"], json!([60, 120]));
    assert_eq!(body["c"], json!([100.0, 101.0]));
    assert_eq!(body["v"], json!([3.0, 3.0]));

    let (_, body) = get_json(state(store.clone(), candles), "/udf/history?symbol=BTCUSDT&resolution=7").await;
    assert_eq!(body, json!({"s": "no_data", "m": "invalid resolution"}));

    let (_, body) = get_json(state(store.clone(), vec![]), "/udf/history?symbol=BTCUSDT&resolution=1D").await;
    assert_eq!(body, json!({"s": "no_data", "m": "no candles"}));

    let (status, _) = get_json(state(store, vec![]), "/udf/history?symbol=NOPE&resolution=1").await;
    assert_eq!(status, 500);
}

#[actix_rt::test]
async fn marks_and_grid_trades_from_archive() {
    let store = Arc::new(MemoryStore::new());
    store
        .archive_grid(&GridTradeArchive {
            symbol: "BTCUSDT".into(),
            buy: vec![fill("BUY", 1.0, 100.0, 1.0, 60_000)],
            sell: vec![fill("SELL", 1.05, 105.0, 1.0, 180_000)],
            stop_loss: None,
            stop_loss_quote_qty: None,
            buy_grid_trade_executed: false,
            sell_grid_trade_executed: false,
            archived_at: Utc::now(),
        })
        .await
        .unwrap();
    store
        .save_active_grid(&ActiveGrid {
            key: "BTCUSDT".into(),
            buy: vec![fill("BUY", 1.0, 90.0, 2.0, 240_000)],
            sell: vec![],
        })
        .await
        .unwrap();

    let (status, marks) = get_json(state(store.clone(), vec![]), "/udf/marks?symbol=BTCUSDT&resolution=1").await;
    assert_eq!(status, 200);
    assert_eq!(marks["label"], json!(["S", "B"]));
    assert_eq!(marks["color"], json!(["green", "red"]));
    assert_eq!(marks["time"], json!([120.0, 0.0]));

    let (status, rows) = get_json(state(store, vec![]), "/udf/grid_trades?symbol=BTCUSDT").await;
    assert_eq!(status, 200);
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["side"], "BUY");
    assert_eq!(rows[0]["sellTrigger"], 105.0);
    assert_eq!(rows[1]["side"], "SELL");
    assert_eq!(rows[2]["lastBuyPrice"], 90.0);
    assert_eq!(rows[0]["to"], rows[1]["time"]);
    assert_eq!(rows[2]["to"], Value::Null);
}
