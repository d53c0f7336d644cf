// src/services/frontend_ws.rs

//!  Dashboard websocket server
//!
//!  * Accepts plain websocket connections on `WS_PORT`
//!  * Every command carries an `authToken` (JWT) checked before dispatch
//!  * Pushes frontend notifications from the [`BusNotifier`] to each client

use std::sync::Arc;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tungstenite::Message;

use crate::{
    db::store::{OverrideAction, TradeStore},
    middleware::auth::verify_token,
    services::{
        balance_transfer::{BalanceTransferRequest, BALANCE_TRANSFER_ACTION},
        binance::ExchangeClient,
        notifier::BusNotifier,
    },
    utils::errors::StepError,
};

/// Scope of override actions consumed by the indicator job.
pub const GLOBAL_SCOPE: &str = "global";

#[derive(Clone)]
pub struct WsState {
    pub trades: Arc<dyn TradeStore>,
    pub exchange: Arc<dyn ExchangeClient>,
    pub notifier: BusNotifier,
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Command {
    command: String,
    #[serde(default)]
    auth_token: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Bind and serve until the listener fails.
pub async fn serve(port: u16, state: WsState) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    log::info!("dashboard websocket listening port={port}");

    loop {
        let (stream, peer) = listener.accept().await?;
        let st = state.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, st).await {
                log::warn!("websocket client {peer} closed with error: {e}");
            }
        });
    }
}

async fn handle_connection(stream: TcpStream, state: WsState) -> Result<(), tungstenite::Error> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut tx, mut rx) = ws.split();
    let mut notifications = state.notifier.subscribe();

    tx.send(Message::Text(json!({"result": true, "type": "connection_success"}).to_string().into()))
        .await?;

    loop {
        tokio::select! {
            msg = rx.next() => {
                let Some(msg) = msg else { break };
                match msg? {
                    Message::Text(txt) => {
                        let reply = handle_command(&state, &txt).await;
                        tx.send(Message::Text(reply.to_string().into())).await?;
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            note = notifications.recv() => match note {
                Ok(n) => {
                    let push = json!({"result": true, "type": "notification", "message": n});
                    tx.send(Message::Text(push.to_string().into())).await?;
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("websocket client lagging, skipped {skipped} notifications");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
    Ok(())
}

/// Parse, authenticate and dispatch one command; always yields a reply.
pub async fn handle_command(state: &WsState, raw: &str) -> Value {
    let cmd: Command = match serde_json::from_str(raw) {
        Ok(c) => c,
        Err(e) => return json!({"result": false, "type": "error", "message": format!("invalid command: {e}")}),
    };

    if verify_token(&state.jwt_secret, cmd.auth_token.as_deref()).is_none() {
        return json!({"result": false, "type": "not-authenticated", "message": "You must be authenticated."});
    }

    log::info!("websocket command={}", cmd.command);
    match cmd.command.as_str() {
        "balances-get" => balances_get(state).await,
        "balance-transfer-execute" => balance_transfer_execute(state, &cmd.data).await,
        other => json!({"result": false, "type": "error", "message": format!("unknown command '{other}'")}),
    }
}

async fn balances_get(state: &WsState) -> Value {
    match state.exchange.sub_account_balances().await {
        Ok(accounts) => json!({
            "result": true,
            "type": "balances-get-result",
            "balanceTransfer": accounts,
        }),
        Err(e) => {
            log::error!("balances-get failed: {e}");
            json!({"result": false, "type": "balances-get-result", "message": e.to_string()})
        }
    }
}

async fn balance_transfer_execute(state: &WsState, data: &Value) -> Value {
    match queue_balance_transfer(state.trades.as_ref(), data).await {
        Ok(()) => json!({
            "result": true,
            "type": "balance-transfer-execute-result",
            "message": "The balance transfer request received.",
        }),
        Err(e) => {
            log::warn!("balance-transfer-execute rejected: {e}");
            json!({"result": false, "type": "balance-transfer-execute-result", "message": e.to_string()})
        }
    }
}

async fn queue_balance_transfer(trades: &dyn TradeStore, data: &Value) -> Result<(), StepError> {
    let raw = data
        .get("balanceTransfer")
        .cloned()
        .ok_or_else(|| StepError::InvalidRequest("balanceTransfer is required".into()))?;
    let request: BalanceTransferRequest =
        serde_json::from_value(raw).map_err(|e| StepError::InvalidRequest(e.to_string()))?;
    let request = request.normalized();
    request.validate()?;

    let action = OverrideAction {
        action: BALANCE_TRANSFER_ACTION.to_string(),
        params: serde_json::to_value(&request).map_err(|e| StepError::InvalidRequest(e.to_string()))?,
        action_at: Utc::now(),
        triggered_by: "user".to_string(),
        message: "The balance transfer request received by the bot. Wait for executing the balance transfer."
            .to_string(),
    };
    trades.save_override_action(GLOBAL_SCOPE, &action).await?;
    Ok(())
}
