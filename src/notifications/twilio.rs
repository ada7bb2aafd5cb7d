use super::{ConcernNotifier, NotificationTemplates};
use crate::entities::recipient;
use async_trait::async_trait;
use sendgrid::SGClient;
use sendgrid::{Destination, Mail};
use std::env;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct TwilioNotifier {
    sendgrid_client: Option<SGClient>,
    twilio_client: Option<twilio::Client>,
    sms_from: String,
    email_from: String,
}

impl TwilioNotifier {
    pub fn new() -> Self {
        let sendgrid_api_key = env::var("TWILIO_SENDGRID_API_KEY").ok();
        let twilio_account_sid = env::var("TWILIO_ACCOUNT_SID").ok();
        let twilio_auth_token = env::var("TWILIO_AUTH_TOKEN").ok();
        let sms_from = env::var("TWILIO_SMS_FROM_NUMBER").unwrap_or_default();
        let email_from = env::var("NOTIFICATION_EMAIL_FROM")
            .unwrap_or_else(|_| "nora@carecall.club".to_string());

        let sendgrid_client = sendgrid_api_key.map(SGClient::new);

        let twilio_client = if let (Some(sid), Some(token)) = (twilio_account_sid, twilio_auth_token)
        {
            Some(twilio::Client::new(&sid, &token))
        } else {
            None
        };

        if sendgrid_client.is_none() {
            warn!("SendGrid API key not found. Email notifications will be mocked.");
        }
        if twilio_client.is_none() {
            warn!("Twilio credentials not found. SMS notifications will be mocked.");
        }

        Self {
            sendgrid_client,
            twilio_client,
            sms_from,
            email_from,
        }
    }

    pub async fn send_email(&self, to_email: &str, subject: &str, body: &str) -> Result<(), String> {
        if let Some(client) = &self.sendgrid_client {
            // Must own data to move into the blocking closure
            let to_email = to_email.to_string();
            let subject = subject.to_string();
            let body = body.to_string();
            let email_from = self.email_from.clone();
            let client = client.clone();
            let to_email_log = to_email.clone();

            match tokio::task::spawn_blocking(move || {
                let mail_info = Mail::new()
                    .add_to(Destination {
                        address: &to_email,
                        name: "CareCall Member",
                    })
                    .add_from(&email_from)
                    .add_subject(&subject)
                    .add_html(&body);

                client.send(mail_info)
            })
            .await
            {
                Ok(result) => match result {
                    Ok(_) => {
                        info!("Email sent to {}", to_email_log);
                        crate::metrics::increment_notifications_sent("email");
                        Ok(())
                    }
                    Err(e) => {
                        error!("Failed to send email: {}", e);
                        crate::metrics::increment_notifications_failed("email");
                        Err(format!("SendGrid Error: {}", e))
                    }
                },
                Err(e) => Err(format!("Task Join Error: {}", e)),
            }
        } else {
            // Mock mode
            info!("(Mock) 📧 Would send email to: {}", to_email);
            info!("(Mock) Subject: {}", subject);
            crate::metrics::increment_notifications_sent("email");
            Ok(())
        }
    }

    pub async fn send_sms(&self, to_number: &str, body: &str) -> Result<(), String> {
        if let Some(client) = &self.twilio_client {
            if self.sms_from.is_empty() {
                return Err("TWILIO_SMS_FROM_NUMBER not set".to_string());
            }

            match client
                .send_message(twilio::OutboundMessage::new(&self.sms_from, to_number, body))
                .await
            {
                Ok(_) => {
                    info!("SMS sent to {}", to_number);
                    crate::metrics::increment_notifications_sent("sms");
                    Ok(())
                }
                Err(e) => {
                    error!("Failed to send SMS: {}", e);
                    crate::metrics::increment_notifications_failed("sms");
                    Err(format!("Twilio Error: {}", e))
                }
            }
        } else {
            // Mock mode
            info!("(Mock) 📱 Would send SMS to: {}", to_number);
            info!("(Mock) Body: {}", body);
            crate::metrics::increment_notifications_sent("sms");
            Ok(())
        }
    }
}

impl Default for TwilioNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConcernNotifier for TwilioNotifier {
    async fn notify_missed(
        &self,
        recipient: &recipient::Model,
        message: &str,
    ) -> Result<(), String> {
        // Alert email to the emergency contact rides along when one is on
        // file; the SMS to the recipient is the delivery the caller awaits.
        if let Some(contact_email) = recipient.emergency_contact_email.clone() {
            let contact_name = recipient
                .emergency_contact_name
                .clone()
                .unwrap_or_else(|| "there".to_string());
            let missed_at = chrono::Utc::now().format("%Y-%m-%d %H:%M").to_string();
            let body = NotificationTemplates::missed_checkin_email(
                &recipient.name,
                &contact_name,
                &missed_at,
            );
            let subject = format!("CareCall: {} missed a wellness check-in", recipient.name);

            let notifier = self.clone();
            tokio::spawn(async move {
                let _ = notifier.send_email(&contact_email, &subject, &body).await;
            });
        }

        self.send_sms(&recipient.phone_number, message).await
    }
}
