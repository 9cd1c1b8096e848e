use chrono::{DateTime, Utc};
use cl_api_types::WithdrawalStatus;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

/// Payload posted to the partner dashboard when an admin decides a
/// withdrawal request.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct WithdrawalDecisionEvent {
    pub(crate) id: Uuid,
    pub(crate) organizer_id: String,
    pub(crate) status: WithdrawalStatus,
    pub(crate) amount_gross: u64,
    pub(crate) amount_net: u64,
    pub(crate) decided_at: DateTime<Utc>,
}

pub(crate) trait WithdrawalCallback: Send + Sync {
    fn notify_decision(&self, event: &WithdrawalDecisionEvent);
}

/// Fire-and-forget HTTP POST; delivery failures are logged and dropped.
/// With no URL configured this is a no-op.
pub(crate) struct HttpWithdrawalCallback {
    url: Option<String>,
    http: reqwest::Client,
}

impl HttpWithdrawalCallback {
    pub(crate) fn new(url: Option<String>) -> Self {
        Self {
            url,
            http: reqwest::Client::new(),
        }
    }
}

impl WithdrawalCallback for HttpWithdrawalCallback {
    fn notify_decision(&self, event: &WithdrawalDecisionEvent) {
        let Some(url) = self.url.clone() else {
            return;
        };

        let http = self.http.clone();
        let event = event.clone();
        tokio::spawn(async move {
            if let Err(err) = http.post(url).json(&event).send().await {
                warn!("withdrawal decision callback failed for {}: {err}", event.id);
            }
        });
    }
}
