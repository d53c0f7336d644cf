//! Notification fan-out.
//!
//! Frontend notifications are published on a `tokio::broadcast` channel that
//! every connected dashboard socket subscribes to. Operator messages go to
//! the `operator` log target.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, Receiver, Sender};

const CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontendNotification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
}

impl FrontendNotification {
    pub fn new(kind: NotificationKind, title: impl Into<String>) -> Self {
        Self { kind, title: title.into() }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn frontend(&self, notification: FrontendNotification);
    async fn operator(&self, message: &str);
}

#[derive(Clone)]
pub struct BusNotifier {
    frontend: Sender<FrontendNotification>,
}

impl BusNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CAPACITY);
        Self { frontend: tx }
    }

    pub fn subscribe(&self) -> Receiver<FrontendNotification> {
        self.frontend.subscribe()
    }
}

impl Default for BusNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for BusNotifier {
    async fn frontend(&self, notification: FrontendNotification) {
        // no subscribers is not an error
        if self.frontend.send(notification).is_err() {
            log::debug!("frontend notification dropped: no dashboard connected");
        }
    }

    async fn operator(&self, message: &str) {
        log::info!(target: "operator", "{message}");
    }
}
