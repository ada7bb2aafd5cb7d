use crate::pipeline::CheckInPipeline;
use axum::{
    extract::{Extension, Form},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{error, info};

/// Twilio posts webhook payloads as form-encoded PascalCase fields.
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VoiceWebhookPayload {
    pub call_sid: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusCallbackPayload {
    pub call_sid: String,
    pub call_status: Option<String>,
    pub answered_by: Option<String>,
    /// Twilio sends the duration as a decimal string.
    pub call_duration: Option<String>,
}

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Minimal TwiML: read the script aloud, then hang up.
fn say_twiml(script: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Say voice=\"alice\">{}</Say></Response>",
        xml_escape(script)
    )
}

/// "Call answered, need the script." Always answers with TwiML; the
/// pipeline degrades to a fallback script rather than leaving dead air.
pub async fn handle_voice(
    Extension(pipeline): Extension<CheckInPipeline>,
    Form(payload): Form<VoiceWebhookPayload>,
) -> Response {
    info!(call_sid = %payload.call_sid, "Voice webhook received");
    let script = pipeline.answer_script(&payload.call_sid).await;

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/xml")],
        say_twiml(&script),
    )
        .into_response()
}

/// Terminal status callback. 200 covers success and every expected no-op
/// (duplicate or orphaned deliveries); 500 only on a store failure so
/// Twilio redelivers.
pub async fn handle_status(
    Extension(pipeline): Extension<CheckInPipeline>,
    Form(payload): Form<StatusCallbackPayload>,
) -> Response {
    let duration_secs = payload
        .call_duration
        .as_deref()
        .and_then(|d| d.parse::<i64>().ok())
        .unwrap_or(0);

    info!(
        call_sid = %payload.call_sid,
        call_status = payload.call_status.as_deref().unwrap_or("unknown"),
        answered_by = payload.answered_by.as_deref().unwrap_or("unknown"),
        duration_secs,
        "Status callback received"
    );

    match pipeline
        .on_terminal_callback(
            &payload.call_sid,
            payload.answered_by.as_deref(),
            duration_secs,
        )
        .await
    {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            error!(call_sid = %payload.call_sid, "Status callback processing failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{say_twiml, xml_escape};

    #[test]
    fn twiml_escapes_script_text() {
        let twiml = say_twiml("Drink < 2 cups & rest");
        assert!(twiml.contains("Drink &lt; 2 cups &amp; rest"));
        assert!(twiml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(twiml.ends_with("</Say></Response>"));
    }

    #[test]
    fn xml_escape_handles_quotes() {
        assert_eq!(xml_escape("say \"hi\""), "say &quot;hi&quot;");
        assert_eq!(xml_escape("it's"), "it&apos;s");
    }
}
