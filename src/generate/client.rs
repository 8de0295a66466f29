//! Text generation over an OpenAI-compatible chat completions API.

use anyhow::{anyhow, bail, Context};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmSettings;

/// Single-prompt text completion. Any failure is an error; callers decide the
/// fallback.
pub trait TextGenerator: Send + Sync {
    fn complete(&self, prompt: &str, temperature: f32, max_tokens: u32) -> anyhow::Result<String>;
}

pub struct GroqClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl GroqClient {
    /// Builds a blocking client; must not be called from inside an async runtime.
    pub fn new(settings: &LlmSettings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("build http client")?;
        let api_key = std::env::var(&settings.api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        if api_key.is_none() {
            tracing::warn!(
                env = %settings.api_key_env,
                "no API key set; generation requests will likely be rejected"
            );
        }
        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            model: settings.model.clone(),
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl TextGenerator for GroqClient {
    fn complete(&self, prompt: &str, temperature: f32, max_tokens: u32) -> anyhow::Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature,
            max_tokens,
        };
        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .with_context(|| format!("call chat completions: {url}"))?;

        if response.status() != StatusCode::OK {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            bail!("chat completions returned {status}: {}", normalize_err_body(&body));
        }

        let parsed: ChatResponse = response
            .json()
            .context("decode chat completions response")?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("chat completions returned no content"))?;
        debug!(model = %self.model, chars = text.len(), "completion received");
        Ok(text)
    }
}

fn normalize_err_body(body: &str) -> String {
    let compact = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if compact.chars().count() > 300 {
        let cut: String = compact.chars().take(300).collect();
        format!("{cut}...")
    } else {
        compact
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_err_body, ChatMessage, ChatRequest, ChatResponse};

    #[test]
    fn request_body_shape() {
        let req = ChatRequest {
            model: "m",
            messages: [ChatMessage {
                role: "user",
                content: "hi",
            }],
            temperature: 0.5,
            max_tokens: 10,
        };
        let v = serde_json::to_value(&req).expect("json");
        assert_eq!(v["messages"][0]["role"], "user");
        assert_eq!(v["max_tokens"], 10);
    }

    #[test]
    fn response_content_is_optional() {
        let r: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant"}}]}"#).expect("json");
        assert!(r.choices[0].message.content.is_none());
        let r: ChatResponse = serde_json::from_str("{}").expect("json");
        assert!(r.choices.is_empty());
    }

    #[test]
    fn error_bodies_are_compacted() {
        assert_eq!(normalize_err_body("a\n  b"), "a b");
        assert!(normalize_err_body(&"x ".repeat(400)).ends_with("..."));
    }
}
