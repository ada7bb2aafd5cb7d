pub mod templates;
pub mod twilio;

pub use templates::NotificationTemplates;
pub use twilio::TwilioNotifier;

use crate::entities::recipient;
use async_trait::async_trait;

/// Escalation channel the orchestrator talks to when a check-in call goes
/// unanswered. Delivery is best-effort; the caller logs failures and moves on.
#[async_trait]
pub trait ConcernNotifier: Send + Sync {
    async fn notify_missed(
        &self,
        recipient: &recipient::Model,
        message: &str,
    ) -> Result<(), String>;
}
