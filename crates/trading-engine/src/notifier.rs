use async_trait::async_trait;
use notification_service::{Alert, AlertItem, AlertType, NotificationService};

/// Best-effort outbound alerts. Returns whether delivery succeeded; callers
/// never fail a run on `false`.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_alert(&self, subject: &str, message: &str, items: &[AlertItem]) -> bool;
}

#[async_trait]
impl Notifier for NotificationService {
    async fn send_alert(&self, subject: &str, message: &str, items: &[AlertItem]) -> bool {
        let alert_type = if items.is_empty() {
            AlertType::Notice
        } else {
            AlertType::TradesSubmitted {
                items: items.to_vec(),
            }
        };
        self.send_alert_async(&Alert::new(alert_type, subject, message))
            .await
    }
}
