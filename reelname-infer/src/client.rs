//! OpenAI-compatible chat completion client

use crate::config::InferConfig;
use crate::error::{InferError, Result};
use crate::improver::InferenceClient;
use crate::response::descriptor_from_content;
use async_trait::async_trait;
use reelname_parse::MediaDescriptor;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const SYSTEM_PROMPT: &str = "You are a media file analysis tool. You extract structured \
information about movies and TV episodes from file and directory names.";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

fn user_prompt(filename: &str, parent_dir: Option<&str>) -> String {
    let context = match parent_dir {
        Some(dir) if !dir.is_empty() => format!("\nIt is stored in a directory named \"{dir}\"."),
        _ => String::new(),
    };
    format!(
        "Extract media information from the file name \"{filename}\".{context}\n\n\
         Answer with a single JSON object and nothing else:\n\
         {{\"type\": \"movie\" or \"tv\", \"title\": string, \"year\": number or null, \
         \"season\": number or null, \"episode\": number or null, \
         \"resolution\": string or null, \"confidence\": number between 0 and 1}}"
    )
}

/// Asks a chat completion endpoint to describe a filename
#[derive(Debug, Clone)]
pub struct ChatCompletionClient {
    client: Client,
    url: String,
    api_key: String,
    model: String,
    inferred_confidence: f32,
    timeout: Duration,
}

impl ChatCompletionClient {
    /// Build a client from an enabled, validated configuration
    pub fn new(config: &InferConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(InferError::unavailable)?;
        Ok(Self {
            client,
            url: format!("{}/chat/completions", config.endpoint.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            inferred_confidence: config.inferred_confidence,
            timeout: config.timeout(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl InferenceClient for ChatCompletionClient {
    async fn infer(&self, filename: &str, parent_dir: Option<&str>) -> Result<MediaDescriptor> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt(filename, parent_dir),
                },
            ],
            temperature: 0.0,
        };

        let mut builder = self.client.post(&self.url).json(&request);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                InferError::Timeout {
                    timeout: self.timeout,
                }
            } else {
                InferError::unavailable(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(InferError::Status {
                status: status.as_u16(),
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| InferError::malformed(e.to_string()))?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| InferError::malformed("response has no message content"))?;

        debug!("Inference answer for {}: {}", filename, content);
        descriptor_from_content(&content, self.inferred_confidence)
    }

    fn client_name(&self) -> &str {
        &self.model
    }
}
