//! Best-effort side channel for enrolment and attempt events.
//!
//! Callers never see delivery outcomes: `notify` returns nothing and failures
//! are only logged.

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    Enrolled,
    Reenrolled,
    Disenrolled,
    PathwayEnrolled,
    PathwayDisenrolled,
    StatusChanged,
    AnswersSubmitted,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, event: NotificationEvent, entity_id: Uuid);
}

/// Logs events and does nothing else.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: NotificationEvent, entity_id: Uuid) {
        tracing::debug!(?event, %entity_id, "notification");
    }
}

#[derive(Serialize)]
struct WebhookPayload {
    event: NotificationEvent,
    entity_id: Uuid,
    occurred_at: chrono::DateTime<Utc>,
}

/// Posts each event as JSON on a detached task.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, event: NotificationEvent, entity_id: Uuid) {
        let payload = WebhookPayload {
            event,
            entity_id,
            occurred_at: Utc::now(),
        };
        let client = self.client.clone();
        let url = self.url.clone();
        tokio::spawn(async move {
            let res = client
                .post(&url)
                .json(&payload)
                .send()
                .await
                .and_then(|r| r.error_for_status());
            if let Err(e) = res {
                tracing::warn!(error = %e, ?event, %entity_id, "notification delivery failed");
            }
        });
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_webhook_does_not_surface() {
        // Port 9 (discard) on localhost: the send fails and is only logged.
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/hook");
        notifier.notify(NotificationEvent::Enrolled, Uuid::new_v4());
    }

    #[test]
    fn payload_uses_snake_case_event_names() {
        let payload = WebhookPayload {
            event: NotificationEvent::AnswersSubmitted,
            entity_id: Uuid::nil(),
            occurred_at: Utc::now(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["event"], "answers_submitted");
    }
}
