//! Sub-account balance transfers, requested from the dashboard and executed
//! by the next indicator job run.

use serde::{Deserialize, Serialize};

use crate::{
    services::{
        binance::{ExchangeClient, MASTER_ACCOUNT},
        notifier::{FrontendNotification, NotificationKind, Notifier},
    },
    utils::{errors::StepError, types::f64_from_any},
};

pub const BALANCE_TRANSFER_ACTION: &str = "balance-transfer";

/// A transfer between the master account and sub-accounts.
/// An absent email means the master account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceTransferRequest {
    pub asset: String,
    #[serde(deserialize_with = "f64_from_any")]
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_email: Option<String>,
}

fn account(email: &Option<String>) -> Option<&str> {
    email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty() && *e != MASTER_ACCOUNT)
}

impl BalanceTransferRequest {
    /// Blank and `master` emails both collapse to `None`.
    pub fn normalized(self) -> Self {
        Self {
            asset: self.asset.trim().to_uppercase(),
            amount: self.amount,
            from_email: account(&self.from_email).map(str::to_string),
            to_email: account(&self.to_email).map(str::to_string),
        }
    }

    pub fn validate(&self) -> Result<(), StepError> {
        if self.asset.trim().is_empty() {
            return Err(StepError::InvalidRequest("asset is required".into()));
        }
        if self.amount.is_nan() || self.amount <= 0.0 {
            return Err(StepError::InvalidRequest("amount must be greater than zero".into()));
        }
        if account(&self.from_email) == account(&self.to_email) {
            return Err(StepError::InvalidRequest("source and destination accounts must differ".into()));
        }
        Ok(())
    }
}

/// Record handed to the indicator-job steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorJobData {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub override_params: Option<serde_json::Value>,
}

/// Run a queued balance transfer. Failures are reported, never propagated.
pub async fn execute_balance_transfer(
    data: IndicatorJobData,
    exchange: &dyn ExchangeClient,
    notifier: &dyn Notifier,
) -> IndicatorJobData {
    if data.action.as_deref() != Some(BALANCE_TRANSFER_ACTION) {
        log::info!("Do not process balance transfer because action is not '{BALANCE_TRANSFER_ACTION}'.");
        return data;
    }

    match transfer(&data, exchange).await {
        Ok(()) => {
            notifier
                .frontend(FrontendNotification::new(
                    NotificationKind::Success,
                    "The balance transfer has been executed successfully. The account information will be updated soon.",
                ))
                .await;
            notifier.operator("Balance Transfer Result:\n- Result: success").await;
        }
        Err(e) => {
            log::error!("balance transfer execution failed: {e}");
            notifier
                .frontend(FrontendNotification::new(
                    NotificationKind::Error,
                    "The balance transfer is failed to execute. Try again later.",
                ))
                .await;
            notifier
                .operator(&format!("Balance Transfer Error:\n- Message: {e}"))
                .await;
        }
    }

    data
}

async fn transfer(data: &IndicatorJobData, exchange: &dyn ExchangeClient) -> Result<(), StepError> {
    let params = data
        .override_params
        .clone()
        .ok_or_else(|| StepError::InvalidRequest("missing transfer parameters".into()))?;
    let request: BalanceTransferRequest = serde_json::from_value(params)
        .map_err(|e| StepError::InvalidRequest(e.to_string()))?;
    let request = request.normalized();
    request.validate()?;

    if exchange.transfer(&request).await? {
        Ok(())
    } else {
        Err(StepError::InvalidRequest("Failed to transfer assets".into()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        config::symbol::CandleInterval,
        services::{
            binance::{AccountBalances, AssetBalance, ExchangeInfo},
            indicators::{Candle, OpenOrder},
        },
        utils::errors::ApiError,
    };
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use std::sync::Mutex;

    /// Scriptable exchange double shared by the step and handler tests.
    #[derive(Default)]
    pub(crate) struct FakeExchange {
        pub transfer_result: Option<bool>,
        pub transfers: Mutex<Vec<BalanceTransferRequest>>,
        pub candles: Vec<Candle>,
        pub info: ExchangeInfo,
        pub balances: Vec<AccountBalances>,
    }

    #[async_trait]
    impl ExchangeClient for FakeExchange {
        async fn exchange_info(&self) -> Result<ExchangeInfo, ApiError> {
            Ok(self.info.clone())
        }
        async fn candles(
            &self,
            _symbol: &str,
            _interval: CandleInterval,
            _end_time: Option<DateTime<Utc>>,
            limit: usize,
        ) -> Result<Vec<Candle>, ApiError> {
            Ok(self.candles.iter().take(limit).copied().collect())
        }
        async fn current_price(&self, _symbol: &str) -> Result<f64, ApiError> {
            Ok(self.candles.last().map(|c| c.close).unwrap_or_default())
        }
        async fn account_balances(&self) -> Result<Vec<AssetBalance>, ApiError> {
            Ok(vec![])
        }
        async fn open_orders(&self, _symbol: &str) -> Result<Vec<OpenOrder>, ApiError> {
            Ok(vec![])
        }
        async fn sub_account_balances(&self) -> Result<Vec<AccountBalances>, ApiError> {
            Ok(self.balances.clone())
        }
        async fn transfer(&self, request: &BalanceTransferRequest) -> Result<bool, ApiError> {
            self.transfers.lock().unwrap().push(request.clone());
            self.transfer_result
                .ok_or_else(|| ApiError::Exchange { code: -1100, msg: "rejected".into() })
        }
    }

    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub frontend: Mutex<Vec<FrontendNotification>>,
        pub operator: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn frontend(&self, notification: FrontendNotification) {
            self.frontend.lock().unwrap().push(notification);
        }
        async fn operator(&self, message: &str) {
            self.operator.lock().unwrap().push(message.to_string());
        }
    }

    fn job(params: serde_json::Value) -> IndicatorJobData {
        IndicatorJobData {
            action: Some(BALANCE_TRANSFER_ACTION.into()),
            override_params: Some(params),
        }
    }

    #[test]
    fn validation_rules() {
        let ok = BalanceTransferRequest { asset: "USDT".into(), amount: 10.0, from_email: None, to_email: Some("a@x.io".into()) };
        assert!(ok.validate().is_ok());

        let zero = BalanceTransferRequest { amount: 0.0, ..ok.clone() };
        assert!(zero.validate().is_err());

        let same = BalanceTransferRequest { from_email: Some("master".into()), to_email: None, ..ok.clone() };
        assert!(same.validate().is_err());

        let no_asset = BalanceTransferRequest { asset: " ".into(), ..ok };
        assert!(no_asset.validate().is_err());
    }

    #[tokio::test]
    async fn other_actions_are_ignored() {
        let exchange = FakeExchange::default();
        let notifier = RecordingNotifier::default();
        let data = IndicatorJobData { action: Some("something-else".into()), override_params: None };
        let out = execute_balance_transfer(data.clone(), &exchange, &notifier).await;
        assert_eq!(out, data);
        assert!(exchange.transfers.lock().unwrap().is_empty());
        assert!(notifier.frontend.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn successful_transfer_notifies_both_channels() {
        let exchange = FakeExchange { transfer_result: Some(true), ..Default::default() };
        let notifier = RecordingNotifier::default();
        let params = json!({"asset":"usdt","amount":"25","fromEmail":"master","toEmail":"sub@x.io"});
        execute_balance_transfer(job(params), &exchange, &notifier).await;

        let sent = exchange.transfers.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].asset, "USDT");
        assert_eq!(sent[0].from_email, None);
        assert_eq!(sent[0].to_email.as_deref(), Some("sub@x.io"));

        let frontend = notifier.frontend.lock().unwrap();
        assert_eq!(frontend[0].kind, NotificationKind::Success);
        assert!(notifier.operator.lock().unwrap()[0].contains("success"));
    }

    #[tokio::test]
    async fn false_result_is_a_failure() {
        let exchange = FakeExchange { transfer_result: Some(false), ..Default::default() };
        let notifier = RecordingNotifier::default();
        execute_balance_transfer(job(json!({"asset":"BTC","amount":1,"toEmail":"s@x.io"})), &exchange, &notifier).await;

        assert_eq!(notifier.frontend.lock().unwrap()[0].kind, NotificationKind::Error);
        assert!(notifier.operator.lock().unwrap()[0].contains("Failed to transfer assets"));
    }

    #[tokio::test]
    async fn exchange_error_text_reaches_operator() {
        let exchange = FakeExchange::default();
        let notifier = RecordingNotifier::default();
        execute_balance_transfer(job(json!({"asset":"BTC","amount":1,"toEmail":"s@x.io"})), &exchange, &notifier).await;

        assert_eq!(notifier.frontend.lock().unwrap()[0].kind, NotificationKind::Error);
        assert!(notifier.operator.lock().unwrap()[0].contains("rejected"));
    }
}
