use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// One conversation turn in the generative-language wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part { text: text.into() }],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: "model".to_string(),
            parts: vec![Part { text: text.into() }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: &'a [Content],
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

/// Client for the hosted generative-language API.
///
/// Owned by `AppState` and handed to the services that need it; conversation
/// state always lives with the caller, never in this client.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http_client: Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_url: String, api_key: String, model: String) -> Self {
        Self {
            http_client: Client::new(),
            api_url,
            api_key,
            model,
        }
    }

    /// Single-turn completion from a plain prompt.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_contents(&[Content::user(prompt)], None)
            .await
    }

    /// Multi-turn completion over an explicit conversation, with the bounded
    /// output settings the chat widget uses.
    pub async fn generate_chat_reply(&self, contents: &[Content]) -> Result<String> {
        self.generate_with_contents(
            contents,
            Some(GenerationConfig {
                max_output_tokens: 500,
                temperature: 0.2,
            }),
        )
        .await
    }

    async fn generate_with_contents(
        &self,
        contents: &[Content],
        generation_config: Option<GenerationConfig>,
    ) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(anyhow!("generative-language API key not configured"));
        }

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_url, self.model, self.api_key
        );

        let request = GenerateContentRequest {
            contents,
            generation_config,
        };

        tracing::debug!(model = %self.model, turns = contents.len(), "Calling generative-language API");

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .context("Failed to call generative-language API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "Generative-language API returned error {}: {}",
                status,
                error_text
            ));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .context("Failed to parse generative-language API response")?;

        let text = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| anyhow!("Generative-language API returned no candidates"))?;

        Ok(text)
    }
}
