use reqwest::Client;
use serde_json::{json, Value};
use std::env;
use std::time::Duration;
use tracing::warn;

/// Script generation must never hold a live call open waiting on the model.
const GENERATE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    model: String,
}

impl GeminiClient {
    pub fn new() -> Self {
        let api_key = env::var("GEMINI_API_KEY").ok();
        let model = env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".to_string());

        if api_key.is_none() {
            warn!("GEMINI_API_KEY not set. Script generation will use fallback templates.");
        }

        Self {
            client: Client::new(),
            api_key,
            model,
        }
    }

    /// Sends a single-turn prompt to the generateContent endpoint and returns
    /// the candidate text. Any failure (no key, transport error, bad status,
    /// empty candidate) is an `Err`; callers are expected to fall back.
    pub async fn generate_text(&self, prompt: &str) -> Result<String, String> {
        let api_key = self.api_key.as_deref().ok_or("Gemini not configured")?;

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, api_key
        );

        let body = json!({
            "contents": [{
                "parts": [{ "text": prompt }]
            }]
        });

        let res = self
            .client
            .post(&url)
            .timeout(GENERATE_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("Generate request failed: {}", e))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(format!("Generate failed ({}): {}", status, text));
        }

        let json: Value = res.json().await.map_err(|e| e.to_string())?;

        // Extract text from: candidates[0].content.parts[0].text
        let text = json["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or("No text in Gemini response")?;

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err("Gemini returned an empty candidate".to_string());
        }

        Ok(trimmed.to_string())
    }
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self::new()
    }
}
