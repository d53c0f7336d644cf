use crate::{
    config::{settings::Settings, symbol::SymbolConfiguration},
    db::store::{
        cache_set_json, symbol_field, CacheMirror, CandleCollection, CandleStore, TradeStore,
        SYMBOLS_HASH,
    },
    services::{
        balance_transfer::{execute_balance_transfer, IndicatorJobData},
        binance::{cached_exchange_info, ExchangeClient},
        frontend_ws::GLOBAL_SCOPE,
        notifier::Notifier,
        trailing_trade::{
            determine_ath_interval, get_indicators, load_symbol_configuration, BaseAssetBalance,
            LatestCandle, StepContext, TradeData,
        },
    },
    utils::errors::StepError,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::{abortable, AbortHandle};
use metrics::{histogram, increment_counter};
use std::{sync::Arc, time::Duration};

type TaskMap = DashMap<String, AbortHandle>;
static TASKS: once_cell::sync::Lazy<TaskMap> = once_cell::sync::Lazy::new(TaskMap::default);

/// Everything a background task needs, shared behind `Arc`s.
#[derive(Clone)]
pub struct Services {
    pub candles: Arc<dyn CandleStore>,
    pub trades: Arc<dyn TradeStore>,
    pub cache: Arc<dyn CacheMirror>,
    pub exchange: Arc<dyn ExchangeClient>,
    pub notifier: Arc<dyn Notifier>,
}

impl Services {
    fn step_context(&self, now: DateTime<Utc>) -> StepContext<'_> {
        StepContext {
            candles: self.candles.as_ref(),
            trades: self.trades.as_ref(),
            cache: self.cache.as_ref(),
            now,
        }
    }
}

/// Keys of the tasks currently registered.
pub fn running_tasks() -> Vec<String> {
    let mut keys: Vec<String> = TASKS.iter().map(|e| e.key().clone()).collect();
    keys.sort();
    keys
}

pub async fn reconcile(svc: &Services, settings: &Settings) -> anyhow::Result<()> {
    // ---------------------------------------------------------
    // 1. Wanted tasks: listed symbols + the indicator job
    // ---------------------------------------------------------
    let info = cached_exchange_info(svc.cache.as_ref(), svc.exchange.as_ref()).await?;
    let mut wanted: Vec<String> = settings
        .symbols
        .iter()
        .filter(|s| {
            let listed = info.symbol(s).is_some();
            if !listed {
                log::warn!("scheduler: symbol={s} is not listed on the exchange; skipped");
            }
            listed
        })
        .cloned()
        .collect();
    wanted.push(GLOBAL_SCOPE.to_string());

    let every = Duration::from_secs(settings.step_interval_secs.max(1));

    // ---------------------------------------------------------
    // 2. Spawn missing tasks
    // ---------------------------------------------------------
    for key in &wanted {
        if TASKS.contains_key(key) {
            continue;
        }

        let s = svc.clone();
        let k = key.clone();
        let (task, abort) = abortable(async move {
            if k == GLOBAL_SCOPE {
                indicator_loop(s, every).await
            } else {
                symbol_loop(s, k, every).await
            }
        });

        tokio::spawn(task);
        TASKS.insert(key.clone(), abort);
        log::info!("scheduler: started task={key}");
    }

    // ---------------------------------------------------------
    // 3. Reap tasks whose symbol left the configured set
    // ---------------------------------------------------------
    let stale: Vec<String> = TASKS
        .iter()
        .map(|e| e.key().clone())
        .filter(|k| !wanted.contains(k))
        .collect();
    for key in stale {
        if let Some((_, abort)) = TASKS.remove(&key) {
            abort.abort();
            log::info!("scheduler: stopped task={key}");
        }
    }

    Ok(())
}

async fn symbol_loop(svc: Services, symbol: String, every: Duration) {
    let mut iv = tokio::time::interval(every);
    loop {
        iv.tick().await;
        let started = std::time::Instant::now();
        match run_symbol_once(&svc, &symbol, Utc::now()).await {
            Ok(_) => {
                histogram!(
                    "trailing_trade_tick_ms",
                    started.elapsed().as_secs_f64() * 1_000.0,
                    "symbol" => symbol.clone(),
                );
            }
            Err(e) => {
                log::error!("trailing trade tick failed symbol={symbol}: {e}");
                increment_counter!("trailing_trade_errors_total", "symbol" => symbol.clone());
            }
        }
    }
}

async fn indicator_loop(svc: Services, every: Duration) {
    let mut iv = tokio::time::interval(every);
    loop {
        iv.tick().await;
        if let Err(e) = run_indicator_job_once(&svc).await {
            log::error!("indicator job failed: {e}");
        }
    }
}

async fn refresh_candles(svc: &Services, symbol: &str, cfg: &SymbolConfiguration) -> Result<(), StepError> {
    let trade = svc
        .exchange
        .candles(symbol, cfg.candles.interval, None, cfg.candles.limit)
        .await?;
    svc.candles
        .save_candles(CandleCollection::Trade, symbol, cfg.candles.interval, &trade)
        .await?;
    svc.candles
        .prune_candles(CandleCollection::Trade, symbol, cfg.candles.interval, cfg.candles.limit)
        .await?;

    let ath = &cfg.buy.ath_restriction;
    if ath.enabled {
        let batch = svc
            .exchange
            .candles(symbol, ath.candles.interval, None, ath.candles.limit)
            .await?;
        svc.candles
            .save_candles(CandleCollection::Ath, symbol, ath.candles.interval, &batch)
            .await?;
        svc.candles
            .prune_candles(CandleCollection::Ath, symbol, ath.candles.interval, ath.candles.limit)
            .await?;
    }
    Ok(())
}

/// One trailing-trade tick: refresh inputs, run the steps, mirror the result.
///
/// `Ok(None)` when the symbol has no stored configuration yet.
pub async fn run_symbol_once(
    svc: &Services,
    symbol: &str,
    now: DateTime<Utc>,
) -> Result<Option<TradeData>, StepError> {
    let Some(cfg) = load_symbol_configuration(svc.trades.as_ref(), svc.cache.as_ref(), symbol).await? else {
        log::warn!("no configuration stored symbol={symbol}; tick skipped");
        return Ok(None);
    };

    let info = cached_exchange_info(svc.cache.as_ref(), svc.exchange.as_ref()).await?;
    let symbol_info = info
        .symbol(symbol)
        .map(|s| s.info())
        .ok_or_else(|| StepError::InvalidRequest(format!("{symbol} is not listed on the exchange")))?;

    refresh_candles(svc, symbol, &cfg).await?;

    let price = svc.exchange.current_price(symbol).await?;
    let latest = LatestCandle {
        event_type: "24hrMiniTicker".into(),
        event_time: now.timestamp_millis(),
        symbol: symbol.to_string(),
        close: price,
    };
    cache_set_json(svc.cache.as_ref(), SYMBOLS_HASH, &symbol_field(symbol, "latest-candle"), &latest).await?;

    let base = svc
        .exchange
        .account_balances()
        .await?
        .into_iter()
        .find(|b| b.asset == symbol_info.base_asset)
        .map(|b| BaseAssetBalance::new(b.free, b.locked))
        .unwrap_or_default();
    let open_orders = svc.exchange.open_orders(symbol).await?;

    let ctx = svc.step_context(now);
    let data = TradeData::new(symbol, symbol_info, cfg, base, open_orders);
    let data = get_indicators(ctx, data).await?;
    let data = determine_ath_interval(ctx, data).await?;

    if data.save_to_cache {
        cache_set_json(svc.cache.as_ref(), SYMBOLS_HASH, &symbol_field(symbol, "data"), &data).await?;
    }
    increment_counter!("trailing_trade_ticks_total", "symbol" => symbol.to_string());
    Ok(Some(data))
}

/// Pop one queued override action and run it. `Ok(false)` when the queue was empty.
pub async fn run_indicator_job_once(svc: &Services) -> Result<bool, StepError> {
    let Some(action) = svc.trades.take_override_action(GLOBAL_SCOPE).await? else {
        return Ok(false);
    };
    log::info!(
        "indicator job picked override action={} triggered_by={} queued_at={}",
        action.action,
        action.triggered_by,
        action.action_at
    );

    let data = IndicatorJobData {
        action: Some(action.action),
        override_params: Some(action.params),
    };
    execute_balance_transfer(data, svc.exchange.as_ref(), svc.notifier.as_ref()).await;
    Ok(true)
}
