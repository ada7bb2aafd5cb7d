use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::env;
use tracing::{error, info, warn};

/// Failure placing an outbound call. The orchestrator treats all variants
/// the same (the attempt resolves as NO_ANSWER); the split drives log detail.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("invalid destination number: {0}")]
    InvalidDestination(String),
    #[error("call provider denied the request: {0}")]
    Denied(String),
    #[error("transient call provider failure: {0}")]
    Transient(String),
}

/// Places outbound calls and hands back the provider's call identifier.
#[async_trait]
pub trait CallPlacer: Send + Sync {
    /// `callback_base` is the externally reachable base URL; the provider
    /// will hit `{base}/api/twilio/voice` when the call is answered and
    /// `{base}/api/twilio/status` with the terminal outcome.
    async fn place_call(&self, to_number: &str, callback_base: &str) -> Result<String, CallError>;
}

#[derive(Clone)]
pub struct TwilioCallClient {
    http: Client,
    credentials: Option<(String, String)>,
    voice_from: String,
}

impl TwilioCallClient {
    pub fn new() -> Self {
        let account_sid = env::var("TWILIO_ACCOUNT_SID").ok();
        let auth_token = env::var("TWILIO_AUTH_TOKEN").ok();
        let voice_from = env::var("TWILIO_VOICE_FROM_NUMBER").unwrap_or_default();

        let credentials = match (account_sid, auth_token) {
            (Some(sid), Some(token)) => Some((sid, token)),
            _ => {
                warn!("Twilio credentials not found. Outbound calls will be mocked.");
                None
            }
        };

        Self {
            http: Client::new(),
            credentials,
            voice_from,
        }
    }
}

impl Default for TwilioCallClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CallPlacer for TwilioCallClient {
    async fn place_call(&self, to_number: &str, callback_base: &str) -> Result<String, CallError> {
        let Some((account_sid, auth_token)) = &self.credentials else {
            // Mock mode: pretend the call was queued so the rest of the
            // pipeline can be exercised locally.
            let sid = format!("CAmock{}", uuid::Uuid::new_v4().simple());
            info!("(Mock) 📞 Would place call to {} ({})", to_number, sid);
            return Ok(sid);
        };

        if self.voice_from.is_empty() {
            return Err(CallError::Denied(
                "TWILIO_VOICE_FROM_NUMBER not set".to_string(),
            ));
        }

        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Calls.json",
            account_sid
        );

        // AMD gives the status callback its AnsweredBy field; the completed
        // event carries CallDuration.
        let voice_url = format!("{}/api/twilio/voice", callback_base);
        let status_url = format!("{}/api/twilio/status", callback_base);
        let params = [
            ("To", to_number),
            ("From", self.voice_from.as_str()),
            ("Url", voice_url.as_str()),
            ("StatusCallback", status_url.as_str()),
            ("StatusCallbackEvent", "completed"),
            ("MachineDetection", "Enable"),
        ];

        let res = self
            .http
            .post(&url)
            .basic_auth(account_sid, Some(auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| CallError::Transient(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            error!("Twilio call placement failed ({}): {}", status, body);
            return Err(match status.as_u16() {
                400 | 404 => CallError::InvalidDestination(body),
                401 | 403 | 429 => CallError::Denied(body),
                _ => CallError::Transient(body),
            });
        }

        let json: Value = res
            .json()
            .await
            .map_err(|e| CallError::Transient(e.to_string()))?;

        json["sid"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| CallError::Transient("No sid in Twilio response".to_string()))
    }
}
