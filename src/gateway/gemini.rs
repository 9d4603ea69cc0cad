// Google Gemini API gateway
//
// Gemini uses a different request shape (contents/parts, inline_data for
// images, key in the query string) so the conversion lives here rather
// than leaking into the pipeline.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{error_for_status, transport_error, ModelGateway, RequestPart};
use crate::errors::ServiceError;
use crate::session::SessionToken;
use async_trait::async_trait;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct GeminiGateway {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiGateway {
    pub fn new(api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_key,
            model: "gemini-2.0-flash".to_string(),
            base_url: GEMINI_BASE_URL.to_string(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn to_request(&self, system: &str, parts: &[RequestPart]) -> GeminiRequest {
        let parts = parts
            .iter()
            .map(|part| match part {
                RequestPart::Text(text) => GeminiPart::Text { text: text.clone() },
                RequestPart::Image { media_type, data } => GeminiPart::InlineData {
                    inline_data: GeminiInlineData {
                        mime_type: media_type.clone(),
                        data: data.clone(),
                    },
                },
            })
            .collect();

        GeminiRequest {
            system_instruction: GeminiSystemInstruction {
                parts: vec![GeminiPart::Text {
                    text: system.to_string(),
                }],
            },
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts,
            }],
        }
    }
}

#[async_trait]
impl ModelGateway for GeminiGateway {
    async fn send(
        &self,
        session: &SessionToken,
        system: &str,
        parts: &[RequestPart],
    ) -> Result<String, ServiceError> {
        // Single-turn requests carry no conversation state; the token only
        // correlates client-side logs.
        tracing::debug!(session = %session, model = %self.model, "sending generation request");

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let request = self.to_request(system, parts);

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(e, REQUEST_TIMEOUT))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(status, body));
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::MalformedResponse(e.to_string()))?;

        Ok(parsed.text())
    }

    fn name(&self) -> &str {
        "gemini"
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct GeminiRequest {
    #[serde(rename = "system_instruction")]
    system_instruction: GeminiSystemInstruction,
    contents: Vec<GeminiContent>,
}

#[derive(Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        inline_data: GeminiInlineData,
    },
}

#[derive(Serialize)]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiCandidateContent,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl GeminiResponse {
    fn text(&self) -> String {
        self.candidates
            .iter()
            .flat_map(|c| c.content.parts.iter())
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
