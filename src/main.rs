use std::{net::SocketAddr, sync::Arc};

use actix_web::{middleware::Logger, web, App, HttpServer};
use metrics_exporter_prometheus::PrometheusBuilder;
use sqlx::postgres::PgPoolOptions;

use gridbot_backend::{
    config::settings::Settings,
    db::{
        memory::MemoryStore,
        queries::PgStore,
        redis::RedisPool,
        store::{CacheMirror, CandleStore, TradeStore},
    },
    middleware::metrics::Metrics,
    routes::{
        health::health_scope,
        udf::{udf_scope, UdfState},
    },
    services::{
        binance::{BinanceClient, ExchangeClient},
        frontend_ws::{self, WsState},
        notifier::BusNotifier,
        scheduler::{self, Services},
    },
};

fn init_logging() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
        .init();
}

fn fail(what: &str, e: impl std::fmt::Display) -> ! {
    log::error!("{what}: {e}");
    std::process::exit(1);
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    init_logging();
    log::info!("Starting grid bot backend…");

    let settings = Settings::new().unwrap_or_else(|e| fail("Failed to load settings", e));
    let port = settings.server_port;

    if let Some(metrics_port) = settings.metrics_port {
        let addr = SocketAddr::from(([0, 0, 0, 0], metrics_port));
        if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
            fail("prometheus exporter", e);
        }
        log::info!("metrics exporter listening port={metrics_port}");
    }

    // --- storage -------------------------------------------------------------
    let memory = Arc::new(MemoryStore::new());
    let (candles, trades): (Arc<dyn CandleStore>, Arc<dyn TradeStore>) = match &settings.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await
                .unwrap_or_else(|e| fail("postgres", e));
            let pg = Arc::new(PgStore::new(pool));
            pg.migrate().await.unwrap_or_else(|e| fail("postgres migrations", e));
            (pg.clone() as Arc<dyn CandleStore>, pg as Arc<dyn TradeStore>)
        }
        None => {
            log::warn!("DATABASE_URL not set; using the in-memory store");
            (memory.clone() as Arc<dyn CandleStore>, memory.clone() as Arc<dyn TradeStore>)
        }
    };
    let cache: Arc<dyn CacheMirror> = match &settings.redis_url {
        Some(url) => Arc::new(RedisPool::new(url).await.unwrap_or_else(|e| fail("redis", e))) as Arc<dyn CacheMirror>,
        None => {
            log::warn!("REDIS_URL not set; using the in-memory cache");
            memory.clone()
        }
    };

    let exchange: Arc<dyn ExchangeClient> = Arc::new(BinanceClient::new(&settings));
    let notifier = BusNotifier::new();

    let services = Services {
        candles,
        trades: trades.clone(),
        cache: cache.clone(),
        exchange: exchange.clone(),
        notifier: Arc::new(notifier.clone()),
    };

    // --- scheduler reconciler ----------------------------------------------
    {
        let svc = services.clone();
        let s_copy = settings.clone();
        tokio::spawn(async move {
            let mut iv = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                iv.tick().await;
                if let Err(e) = scheduler::reconcile(&svc, &s_copy).await {
                    log::error!("scheduler: {e:?}");
                }
            }
        });
    }

    // --- dashboard websocket -----------------------------------------------
    {
        let ws_state = WsState {
            trades: trades.clone(),
            exchange: exchange.clone(),
            notifier,
            jwt_secret: settings.jwt_secret.clone(),
        };
        let ws_port = settings.ws_port;
        tokio::spawn(async move {
            if let Err(e) = frontend_ws::serve(ws_port, ws_state).await {
                log::error!("websocket server stopped: {e:?}");
            }
        });
    }

    let udf = UdfState {
        cache,
        trades,
        exchange,
        timezone: settings.udf_timezone,
    };

    HttpServer::new(move || {
        App::new()
            .wrap(Metrics)
            .wrap(Logger::default())
            .app_data(web::Data::new(udf.clone()))

            //scope
            .service(udf_scope())
            .service(health_scope())
    })
        .bind(("0.0.0.0", port))?
        .run()
        .await
}
