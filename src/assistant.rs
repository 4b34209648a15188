use log::{error, trace};
use serde::{Deserialize, Serialize};

use crate::config::AssistantConfig;
use crate::error::FolioError;

/// Shown in the transcript instead of a reply when the assistant fails
pub const FAILURE_PLACEHOLDER: &str = "Error: Could not get response from AI";

pub fn summarize_prompt(content: &str) -> String {
    format!("Summarize the following text: \"{}\"", content)
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Deserialize)]
struct ReplyPart {
    text: String,
}

#[derive(Deserialize)]
struct ReplyContent {
    parts: Vec<ReplyPart>,
}

#[derive(Deserialize)]
struct Candidate {
    content: ReplyContent,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

/// Single-prompt, single-completion text generation client
pub struct Assistant {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl Assistant {
    pub fn new(config: &AssistantConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.url.clone(),
            api_key: config.api_key.clone(),
        }
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, FolioError> {
        let body = serde_json::to_string(&GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        })
        .map_err(|e| FolioError::assistant(&e.to_string()))?;
        let res = self
            .client
            .post(&self.url)
            .query(&[("key", &self.api_key)])
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| FolioError::assistant(&e.to_string()))?;
        if !res.status().is_success() {
            return Err(FolioError::assistant(&format!(
                "Assistant responded with {}",
                res.status()
            )));
        }
        let text = res
            .text()
            .await
            .map_err(|e| FolioError::assistant(&e.to_string()))?;
        let parsed: GenerateResponse = serde_json::from_str(&text)
            .map_err(|_| FolioError::assistant("Malformed assistant response"))?;
        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .map(|part| part.text)
            .ok_or_else(|| FolioError::assistant("Assistant returned no candidates"))
    }

    pub async fn summarize(&self, content: &str) -> Result<String, FolioError> {
        self.generate(&summarize_prompt(content)).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub text: String,
    pub from_user: bool,
}

/// Chat history with the assistant, independent of any document state
#[derive(Debug, Default)]
pub struct ChatTranscript {
    messages: Vec<ChatMessage>,
}

impl ChatTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Sends `prompt` and appends both it and the reply. Blank prompts are
    /// ignored; a failed request appends the failure placeholder instead.
    pub async fn send(&mut self, assistant: &Assistant, prompt: &str) {
        if prompt.trim().is_empty() {
            return;
        }
        self.messages.push(ChatMessage {
            text: prompt.to_string(),
            from_user: true,
        });
        let text = match assistant.generate(prompt).await {
            Ok(reply) => {
                trace!("assistant: reply of {} bytes", reply.len());
                reply
            }
            Err(err) => {
                error!("assistant: {}", err);
                FAILURE_PLACEHOLDER.to_string()
            }
        };
        self.messages.push(ChatMessage {
            text,
            from_user: false,
        });
    }

    /// Asks for a summary of `content`, shown as a user turn with the
    /// full instruction
    pub async fn summarize(&mut self, assistant: &Assistant, content: &str) {
        self.send(assistant, &summarize_prompt(content)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_wraps_content() {
        assert_eq!(
            summarize_prompt("hello world"),
            "Summarize the following text: \"hello world\""
        );
    }

    #[test]
    fn request_shape() {
        let body = serde_json::to_value(GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: "hi" }],
            }],
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"contents": [{"parts": [{"text": "hi"}]}]})
        );
    }
}
