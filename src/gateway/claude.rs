// Anthropic Messages API gateway

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{error_for_status, transport_error, ModelGateway, RequestPart};
use crate::errors::ServiceError;
use crate::session::SessionToken;
use async_trait::async_trait;

const CLAUDE_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_TOKENS: u32 = 4096;

pub struct ClaudeGateway {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl ClaudeGateway {
    pub fn new(api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_key,
            model: "claude-sonnet-4-20250514".to_string(),
            base_url: CLAUDE_API_URL.to_string(),
        })
    }

    /// Override the default model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the endpoint URL (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn to_request<'a>(&'a self, session: &'a SessionToken, system: &'a str, parts: &[RequestPart]) -> MessagesRequest<'a> {
        let content = parts
            .iter()
            .map(|part| match part {
                RequestPart::Text(text) => ApiContent::Text { text: text.clone() },
                RequestPart::Image { media_type, data } => ApiContent::Image {
                    source: ImageSource {
                        source_type: "base64",
                        media_type: media_type.clone(),
                        data: data.clone(),
                    },
                },
            })
            .collect();

        MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![ApiMessage {
                role: "user",
                content,
            }],
            metadata: Metadata {
                user_id: session.as_str(),
            },
        }
    }
}

#[async_trait]
impl ModelGateway for ClaudeGateway {
    async fn send(
        &self,
        session: &SessionToken,
        system: &str,
        parts: &[RequestPart],
    ) -> Result<String, ServiceError> {
        let request = self.to_request(session, system, parts);
        tracing::debug!(session = %session, model = %self.model, "sending generation request");

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::MalformedResponse(e.to_string()))?;

        Ok(parsed.text())
    }

    fn name(&self) -> &str {
        "claude"
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<ApiMessage<'a>>,
    metadata: Metadata<'a>,
}

#[derive(Serialize)]
struct Metadata<'a> {
    user_id: &'a str,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: Vec<ApiContent>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ApiContent {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
    },
}

#[derive(Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    source_type: &'static str,
    media_type: String,
    data: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ResponseBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

impl MessagesResponse {
    fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(text.as_str()),
                ResponseBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
