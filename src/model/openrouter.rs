//! OpenRouter API client for multimodal chat completions.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{GenerationRequest, GenerativeModel, Part};

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";

/// OpenRouter client for chat completions.
#[derive(Clone)]
pub struct OpenRouterClient {
    client: Client,
    api_key: String,
    model: String,
}

impl OpenRouterClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Create a client with a specific model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn build_request(&self, request: GenerationRequest) -> ChatCompletionRequest {
        let content = if request.parts.is_empty() {
            MessageContent::Text(request.prompt)
        } else {
            let mut parts = vec![ContentPart::Text {
                text: request.prompt,
            }];
            parts.extend(
                request
                    .parts
                    .into_iter()
                    .enumerate()
                    .map(|(i, part)| ContentPart::from_part(i, part)),
            );
            MessageContent::Parts(parts)
        };

        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: Role::User,
                content,
            }],
            max_tokens: Some(16384),
            response_format: request.json_output.then_some(ResponseFormat::JsonObject),
            // Lock to Google: PDFs are passed natively only there
            provider: Some(ProviderRouting {
                only: Some(vec!["Google".to_string()]),
                allow_fallbacks: Some(false),
            }),
        }
    }

    async fn send_request(&self, request: ChatCompletionRequest) -> Result<String> {
        debug!("Sending request to OpenRouter: model={}", request.model);

        let response = self
            .client
            .post(OPENROUTER_API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .context("Failed to send request to OpenRouter")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenRouter API error ({}): {}", status, error_text);
        }

        let response: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse OpenRouter response")?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if let Some(usage) = response.usage {
            info!(
                "OpenRouter response: {} tokens (prompt: {}, completion: {})",
                usage.total_tokens, usage.prompt_tokens, usage.completion_tokens
            );
        }

        Ok(content)
    }
}

#[async_trait::async_trait]
impl GenerativeModel for OpenRouterClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String> {
        let request = self.build_request(request);
        self.send_request(request).await
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<ProviderRouting>,
}

#[derive(Debug, Serialize)]
struct ProviderRouting {
    #[serde(skip_serializing_if = "Option::is_none")]
    only: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    allow_fallbacks: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseFormat {
    JsonObject,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: Role,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum Role {
    User,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
    File { file: FileData },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct FileData {
    filename: String,
    file_data: String,
}

impl ContentPart {
    /// Images travel as `image_url`, everything else (PDF, DOCX) as `file`.
    fn from_part(index: usize, part: Part) -> Self {
        match part {
            Part::Text(text) => ContentPart::Text { text },
            Part::InlineMedia {
                mime_type,
                base64_data,
            } => {
                let data_url = format!("data:{};base64,{}", mime_type, base64_data);
                if mime_type.starts_with("image/") {
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    }
                } else {
                    ContentPart::File {
                        file: FileData {
                            filename: format!("attachment-{}", index + 1),
                            file_data: data_url,
                        },
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_only_request_uses_plain_content() {
        let client = OpenRouterClient::new("key").with_model("test/model");
        let request = client.build_request(GenerationRequest::json("Compare these"));
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["model"], "test/model");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Compare these");
        assert_eq!(body["response_format"], json!({"type": "json_object"}));
    }

    #[test]
    fn test_media_parts_are_mapped_by_mime_type() {
        let client = OpenRouterClient::new("key");
        let request = GenerationRequest::json("Analyse").with_parts(vec![
            Part::InlineMedia {
                mime_type: "application/pdf".to_string(),
                base64_data: "JVBERi0=".to_string(),
            },
            Part::InlineMedia {
                mime_type: "image/jpeg".to_string(),
                base64_data: "/9j/".to_string(),
            },
            Part::Text("--- DOCUMENT START (x) ---".to_string()),
        ]);
        let body = serde_json::to_value(client.build_request(request)).unwrap();
        let parts = body["messages"][0]["content"].as_array().unwrap();

        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], json!({"type": "text", "text": "Analyse"}));
        assert_eq!(parts[1]["type"], "file");
        assert_eq!(
            parts[1]["file"]["file_data"],
            "data:application/pdf;base64,JVBERi0="
        );
        assert_eq!(parts[2]["type"], "image_url");
        assert_eq!(parts[2]["image_url"]["url"], "data:image/jpeg;base64,/9j/");
        assert_eq!(parts[3]["type"], "text");
    }

    #[test]
    fn test_plain_output_omits_response_format() {
        let client = OpenRouterClient::new("key");
        let mut request = GenerationRequest::json("hi");
        request.json_output = false;
        let body = serde_json::to_value(client.build_request(request)).unwrap();
        assert!(body.get("response_format").is_none());
    }
}
