use crate::entities::recipient;
use crate::gemini::GeminiClient;
use tracing::warn;

/// Generates the spoken check-in script and the missed-call SMS text.
///
/// Both entry points are infallible: when Gemini is unavailable, times out,
/// or returns unusable output, a deterministic template takes over. Every
/// returned string, generated or fallback, is sanitized for the TTS/SMS
/// channel. This component performs no I/O against the check-in store.
#[derive(Clone)]
pub struct ScriptGenerator {
    gemini: GeminiClient,
}

impl ScriptGenerator {
    pub fn new(gemini: GeminiClient) -> Self {
        Self { gemini }
    }

    pub async fn generate_script(
        &self,
        recipient: &recipient::Model,
        caregiver_name: Option<&str>,
    ) -> String {
        let current_date = chrono::Utc::now().format("%A, %B %d").to_string();
        let caregiver_ref = caregiver_name.unwrap_or("your caregiver");

        let prompt = format!(
            "You are Nora, a caring AI assistant from CareCall making a wellness \
             check-in call to {name}.\n\n\
             CALL CONTEXT:\n\
             - Date: {date}\n\
             - Recipient: {name}\n\
             - Health Condition: {condition}\n\
             - Caregiver: {caregiver}\n\n\
             TASK: Generate a natural, caring 6-7 sentence script for a phone call that:\n\
             1. Introduces yourself as \"Nora from CareCall\" and mentions today's date ({date})\n\
             2. Asks specifically about how their {condition} is affecting them today\n\
             3. Offers 1-2 condition-specific daily wellness tips or reminders\n\
             4. Inquires about any symptoms or challenges they're experiencing\n\
             5. Offers support and reminds them to contact {caregiver} if needed\n\
             6. Ends with a warm goodbye like \"Take care and have a wonderful day!\"\n\n\
             IMPORTANT:\n\
             - Be warm, empathetic, and conversational\n\
             - Keep it concise (6-7 sentences total)\n\
             - Sound natural when spoken aloud\n\n\
             Generate the script:",
            name = recipient.name,
            date = current_date,
            condition = recipient.condition,
            caregiver = caregiver_ref,
        );

        match self.gemini.generate_text(&prompt).await {
            Ok(text) => sanitize_for_speech(&text),
            Err(e) => {
                warn!(recipient_id = recipient.id, "Script generation failed: {}", e);
                fallback_script(&current_date)
            }
        }
    }

    pub async fn generate_concern_sms(&self, recipient: &recipient::Model) -> String {
        let prompt = format!(
            "You are Nora, a caring AI assistant from CareCall. Write a short, warm \
             SMS to {name} letting them know we missed them for their scheduled \
             wellness check-in call. Mention that if they need anything, they can \
             reply to this message or contact their caregiver. Sign off as Nora \
             from CareCall.",
            name = recipient.name,
        );

        match self.gemini.generate_text(&prompt).await {
            Ok(text) => sanitize_for_speech(&text),
            Err(e) => {
                warn!(recipient_id = recipient.id, "Concern SMS generation failed: {}", e);
                fallback_concern_sms(&recipient.name)
            }
        }
    }
}

/// The deterministic script used whenever generation fails. Never empty.
pub fn fallback_script(current_date: &str) -> String {
    sanitize_for_speech(&format!(
        "Hello! This is Nora from CareCall. Today is {}. \
         We hope you're doing well today. \
         If you need any assistance, please contact your caregiver. \
         Take care and have a wonderful day!",
        current_date
    ))
}

pub fn fallback_concern_sms(recipient_name: &str) -> String {
    sanitize_for_speech(&format!(
        "Hi {}, this is Nora from CareCall. We missed you for your wellness \
         check-in today. If you need anything, reply to this message or contact \
         your caregiver. Take care! - Nora from CareCall",
        recipient_name
    ))
}

/// Normalizes model output for the TTS/SMS channel: typographic quotes and
/// dashes become ASCII, ellipsis glyphs become periods, and all runs of
/// whitespace (including line breaks) collapse to single spaces. Gemini
/// sometimes wraps the whole script in quotes; those are stripped first.
pub fn sanitize_for_speech(text: &str) -> String {
    let mut s = text.trim();
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        s = &s[1..s.len() - 1];
    }

    let mut replaced = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\u{201C}' | '\u{201D}' => replaced.push('"'),
            '\u{2018}' | '\u{2019}' => replaced.push('\''),
            '\u{2013}' | '\u{2014}' => replaced.push('-'),
            '\u{2026}' => replaced.push_str("..."),
            _ => replaced.push(c),
        }
    }

    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_normalizes_typographic_characters() {
        let input = "She said \u{201C}hello\u{201D} \u{2014} then\npaused\u{2026} twice";
        let out = sanitize_for_speech(input);
        assert_eq!(out, "She said \"hello\" - then paused... twice");
    }

    #[test]
    fn sanitize_collapses_line_breaks_and_repeated_whitespace() {
        let out = sanitize_for_speech("line one\r\n\r\nline   two\tend");
        assert_eq!(out, "line one line two end");
    }

    #[test]
    fn sanitize_strips_wrapping_quotes() {
        let out = sanitize_for_speech("\"Hello there.\"");
        assert_eq!(out, "Hello there.");
    }

    #[test]
    fn sanitize_normalizes_smart_apostrophes() {
        let out = sanitize_for_speech("you\u{2019}re fine");
        assert_eq!(out, "you're fine");
    }

    #[test]
    fn fallback_script_is_sanitized_and_non_empty() {
        let script = fallback_script("Monday, June 01");
        assert!(!script.is_empty());
        assert!(script.contains("Nora from CareCall"));
        assert!(script.contains("Monday, June 01"));
        assert!(!script.chars().any(|c| matches!(
            c,
            '\u{201C}' | '\u{201D}' | '\u{2018}' | '\u{2019}' | '\u{2013}' | '\u{2014}' | '\u{2026}'
        )));
    }

    #[tokio::test]
    async fn generator_falls_back_when_gemini_is_unconfigured() {
        // No GEMINI_API_KEY in the test environment, so the generative path
        // fails without any network traffic.
        std::env::remove_var("GEMINI_API_KEY");
        let generator = ScriptGenerator::new(GeminiClient::new());
        let recipient = crate::entities::recipient::Model {
            id: 1,
            user_id: 1,
            name: "Edna".to_string(),
            phone_number: "+15550100100".to_string(),
            condition: "arthritis".to_string(),
            preferred_time: "09:00".to_string(),
            emergency_contact_name: None,
            emergency_contact_phone: None,
            emergency_contact_email: None,
            created_at: chrono::Utc::now().naive_utc(),
            updated_at: chrono::Utc::now().naive_utc(),
        };

        let script = generator.generate_script(&recipient, Some("Alice")).await;
        assert!(!script.is_empty());
        assert!(!script.contains('\n'));

        let sms = generator.generate_concern_sms(&recipient).await;
        assert!(sms.contains("Edna"));
    }
}
