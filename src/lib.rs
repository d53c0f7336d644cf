pub mod config;
pub mod db;
pub mod middleware {
    pub mod auth;
    pub mod metrics;
}
pub mod routes {
    pub mod health;
    pub mod udf;
}
pub mod services {
    pub mod balance_transfer;
    pub mod binance;
    pub mod frontend_ws;
    pub mod indicators;
    pub mod notifier;
    pub mod scheduler;
    pub mod trailing_trade;
}

pub mod utils;
