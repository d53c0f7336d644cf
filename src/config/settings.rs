use chrono_tz::Tz;
use dotenv::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_port: u16,
    pub ws_port: u16,
    pub metrics_port: Option<u16>,
    pub binance_api_key: String,
    pub binance_api_secret: String,
    pub binance_base_url: String,
    /// `None` runs against the in-memory store
    pub database_url: Option<String>,
    /// `None` runs against the in-memory cache
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub symbols: Vec<String>,
    pub step_interval_secs: u64,
    pub udf_timezone: Tz,
}

impl Settings {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        dotenv().ok(); // loads `.env` file automatically

        let server_port = env::var("SERVER_PORT")
            .map_err(|_| "SERVER_PORT missing from env")?
            .parse::<u16>()
            .map_err(|_| "SERVER_PORT must be a valid u16")?;

        let ws_port = env::var("WS_PORT")
            .unwrap_or_else(|_| "8081".into())
            .parse::<u16>()
            .map_err(|_| "WS_PORT must be a valid u16")?;

        let metrics_port = match env::var("METRICS_PORT") {
            Ok(v) => Some(v.parse::<u16>().map_err(|_| "METRICS_PORT must be a valid u16")?),
            Err(_) => None,
        };

        let binance_api_key = env::var("BINANCE_API_KEY").map_err(|_| "BINANCE_API_KEY missing")?;
        let binance_api_secret = env::var("BINANCE_API_SECRET").map_err(|_| "BINANCE_API_SECRET missing")?;
        let binance_base_url = env::var("BINANCE_BASE_URL")
            .unwrap_or_else(|_| "https://api.binance.com".into());

        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());
        let redis_url = env::var("REDIS_URL").ok().filter(|s| !s.is_empty());
        let jwt_secret = env::var("JWT_SECRET").map_err(|_| "JWT_SECRET missing")?;

        let symbols = parse_symbols(&env::var("SYMBOLS").unwrap_or_default());

        let step_interval_secs = env::var("STEP_INTERVAL_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse::<u64>()
            .map_err(|_| "STEP_INTERVAL_SECS must be a number of seconds")?;

        let udf_timezone = env::var("UDF_TIMEZONE")
            .unwrap_or_else(|_| "Europe/Madrid".into())
            .parse::<Tz>()
            .map_err(|_| "UDF_TIMEZONE must be an IANA time zone")?;

        Ok(Self {
            server_port,
            ws_port,
            metrics_port,
            binance_api_key,
            binance_api_secret,
            binance_base_url,
            database_url,
            redis_url,
            jwt_secret,
            symbols,
            step_interval_secs,
            udf_timezone,
        })
    }
}

fn parse_symbols(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}
