// src/services/binance/api.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method};
use serde::{de::DeserializeOwned, Deserialize};

use crate::{
    config::{settings::Settings, symbol::CandleInterval},
    services::{
        balance_transfer::BalanceTransferRequest,
        indicators::{Candle, OpenOrder},
    },
    utils::{errors::ApiError, types::f64_from_any},
};

use super::{
    auth, AccountBalances, AssetBalance, ExchangeClient, ExchangeInfo, MASTER_ACCOUNT,
};

#[derive(Debug, Deserialize)]
struct ExchangeErrorBody {
    code: i64,
    msg: String,
}

/// `[openTime, open, high, low, close, volume, closeTime, ...]`
#[derive(Deserialize)]
struct RawKline(i64, String, String, String, String, String, i64, serde_json::Value, serde_json::Value, serde_json::Value, serde_json::Value, serde_json::Value);

#[derive(Deserialize)]
struct TickerPrice {
    #[serde(deserialize_with = "f64_from_any")]
    price: f64,
}

#[derive(Deserialize)]
struct AccountInfo {
    balances: Vec<AssetBalance>,
}

#[derive(Deserialize)]
struct SubAccount {
    email: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubAccountList {
    sub_accounts: Vec<SubAccount>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferResult {
    tran_id: Option<i64>,
}

/// Binance spot REST client.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl BinanceClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            client: Client::new(),
            base_url: settings.binance_base_url.trim_end_matches('/').to_string(),
            api_key: settings.binance_api_key.clone(),
            api_secret: settings.binance_api_secret.clone(),
        }
    }

    async fn public<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T, ApiError> {
        let mut url = format!("{}{}", self.base_url, path);
        if !params.is_empty() {
            url = format!("{url}?{}", auth::query_string(params)?);
        }
        let resp = self.client.get(&url).send().await?;
        Self::decode(resp).await
    }

    async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        mut params: Vec<(&str, String)>,
    ) -> Result<T, ApiError> {
        params.push(("timestamp", auth::current_timestamp()));
        let query = auth::query_string(&params)?;
        let signature = auth::sign_query(&self.api_secret, &query)?;
        let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);

        let resp = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
        let status = resp.status();
        let text = resp.text().await?;
        if status.is_success() {
            return Ok(serde_json::from_str(&text)?);
        }
        match serde_json::from_str::<ExchangeErrorBody>(&text) {
            Ok(body) => Err(ApiError::Exchange { code: body.code, msg: body.msg }),
            Err(_) => Err(ApiError::Other(format!("HTTP {status}: {text}"))),
        }
    }
}

fn parse_price(raw: &str) -> Result<f64, ApiError> {
    raw.parse::<f64>()
        .map_err(|e| ApiError::Other(format!("invalid price '{raw}': {e}")))
}

fn kline_to_candle(raw: RawKline) -> Result<Candle, ApiError> {
    Ok(Candle {
        open_time: DateTime::<Utc>::from_timestamp_millis(raw.0)
            .ok_or_else(|| ApiError::Other(format!("invalid open time {}", raw.0)))?,
        open: parse_price(&raw.1)?,
        high: parse_price(&raw.2)?,
        low: parse_price(&raw.3)?,
        close: parse_price(&raw.4)?,
        volume: parse_price(&raw.5)?,
    })
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    async fn exchange_info(&self) -> Result<ExchangeInfo, ApiError> {
        self.public("/api/v3/exchangeInfo", &[]).await
    }

    async fn candles(
        &self,
        symbol: &str,
        interval: CandleInterval,
        end_time: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Candle>, ApiError> {
        let mut params = vec![
            ("symbol", symbol.to_string()),
            ("interval", interval.as_str().to_string()),
            ("limit", limit.clamp(1, 1000).to_string()),
        ];
        if let Some(end) = end_time {
            params.push(("endTime", end.timestamp_millis().to_string()));
        }
        let raw: Vec<RawKline> = self.public("/api/v3/klines", &params).await?;
        raw.into_iter().map(kline_to_candle).collect()
    }

    async fn current_price(&self, symbol: &str) -> Result<f64, ApiError> {
        let t: TickerPrice = self
            .public("/api/v3/ticker/price", &[("symbol", symbol.to_string())])
            .await?;
        Ok(t.price)
    }

    async fn account_balances(&self) -> Result<Vec<AssetBalance>, ApiError> {
        let info: AccountInfo = self.signed(Method::GET, "/api/v3/account", vec![]).await?;
        Ok(info.balances)
    }

    async fn open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>, ApiError> {
        self.signed(Method::GET, "/api/v3/openOrders", vec![("symbol", symbol.to_string())])
            .await
    }

    async fn sub_account_balances(&self) -> Result<Vec<AccountBalances>, ApiError> {
        let non_zero = |b: &AssetBalance| b.free > 0.0 || b.locked > 0.0;

        let master = self.account_balances().await?;
        let mut out = vec![AccountBalances {
            email: MASTER_ACCOUNT.to_string(),
            balance: master.into_iter().filter(non_zero).collect(),
        }];

        let list: SubAccountList = self
            .signed(Method::GET, "/sapi/v1/sub-account/list", vec![])
            .await?;
        for sub in list.sub_accounts {
            let assets: AccountInfo = self
                .signed(Method::GET, "/sapi/v3/sub-account/assets", vec![("email", sub.email.clone())])
                .await?;
            out.push(AccountBalances {
                email: sub.email,
                balance: assets.balances.into_iter().filter(non_zero).collect(),
            });
        }
        Ok(out)
    }

    async fn transfer(&self, request: &BalanceTransferRequest) -> Result<bool, ApiError> {
        let res: TransferResult = self
            .signed(Method::POST, "/sapi/v1/sub-account/universalTransfer", transfer_params(request))
            .await?;
        log::info!("balance transfer submitted asset={} tran_id={:?}", request.asset, res.tran_id);
        Ok(res.tran_id.is_some())
    }
}

fn transfer_params(request: &BalanceTransferRequest) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("fromAccountType", "SPOT".to_string()),
        ("toAccountType", "SPOT".to_string()),
        ("asset", request.asset.clone()),
        ("amount", auth::decimal_param(request.amount)),
    ];
    if let Some(from) = &request.from_email {
        params.push(("fromEmail", from.clone()));
    }
    if let Some(to) = &request.to_email {
        params.push(("toEmail", to.clone()));
    }
    params
}
