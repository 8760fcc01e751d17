use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

use crate::record::SampleRecord;

pub const DEFAULT_API_URL: &str = "https://api.deepseek.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "deepseek-chat";

#[derive(Error, Debug)]
pub enum ExplainError {
    #[error("chat request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("chat service returned {status}: {body}")]
    Status { status: reqwest::StatusCode, body: String },

    #[error("chat service returned no choices")]
    EmptyResponse,

    #[error("no explanation requested yet")]
    NoConversation,

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }

    fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".into(), content: content.into() }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: usize,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Sends a record and its predicted label to an OpenAI-compatible chat
/// endpoint and returns prose. Keeps the conversation so follow-up
/// questions have the record in context.
pub struct ExplainClient {
    client: Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
    conversation: Vec<ChatMessage>,
}

impl ExplainClient {
    pub fn new(api_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            api_url: api_url.into(),
            api_key,
            model: DEFAULT_MODEL.to_string(),
            conversation: Vec::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn conversation(&self) -> &[ChatMessage] {
        &self.conversation
    }

    /// Starts a fresh conversation about `record`.
    pub async fn explain(&mut self, record: &SampleRecord, predicted: &str) -> Result<String, ExplainError> {
        self.conversation = vec![ChatMessage::user(build_prompt(record, predicted)?)];
        self.complete().await
    }

    pub async fn follow_up(&mut self, question: &str) -> Result<String, ExplainError> {
        if self.conversation.is_empty() {
            return Err(ExplainError::NoConversation);
        }
        self.conversation.push(ChatMessage::user(question));
        self.complete().await
    }

    async fn complete(&mut self) -> Result<String, ExplainError> {
        let body = ChatRequest {
            model: &self.model,
            messages: &self.conversation,
            temperature: 0.7,
            max_tokens: 1024,
        };

        let mut request = self.client.post(&self.api_url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExplainError::Status { status, body });
        }

        let parsed: ChatResponse = response.json().await?;
        let message = parsed.choices.into_iter().next().ok_or(ExplainError::EmptyResponse)?.message;
        let cleaned = clean_response(&message.content);
        self.conversation.push(ChatMessage::assistant(message.content));
        Ok(cleaned)
    }
}

pub fn build_prompt(record: &SampleRecord, predicted: &str) -> Result<String, serde_json::Error> {
    let behaviour = serde_json::to_string_pretty(record)?;
    Ok(format!(
        "A sample has been classified with label: {predicted}.\n\
         Behavior JSON:\n\n{behaviour}\n\n\
         The JSON is a chronological record of the sample's file, registry, network and process \
         activity inside a sandbox, followed by a numeric rollup.\n\
         State whether these actions look malicious and how likely that is.\n\n\
         Please provide:\n\
         1. A human-readable explanation of this sample's behavior.\n\
         2. Relevant MITRE ATT&CK techniques and tactics.\n\
         3. Recommended mitigation strategies and monitoring actions.\n\
         4. Any other insights or observations."
    ))
}

/// Strips markdown decoration that reads badly in a terminal: bold `###`
/// headings and table cells. Blank-line runs collapse to one.
pub fn clean_response(content: &str) -> String {
    static HEADINGS: OnceLock<Regex> = OnceLock::new();
    static TABLE_CELLS: OnceLock<Regex> = OnceLock::new();
    static BLANK_RUNS: OnceLock<Regex> = OnceLock::new();

    let headings = HEADINGS.get_or_init(|| Regex::new(r"### \*\*.*?\*\*").expect("static regex"));
    let cells = TABLE_CELLS.get_or_init(|| Regex::new(r"\|.*?\|").expect("static regex"));
    let blanks = BLANK_RUNS.get_or_init(|| Regex::new(r"\n{2,}").expect("static regex"));

    let text = headings.replace_all(content, "");
    let text = cells.replace_all(&text, "");
    blanks.replace_all(&text, "\n\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_strips_headings_and_tables() {
        let raw = "### **Summary**\nDrops files.\n\n\n\n|T1486|\nDone.\n";
        assert_eq!(clean_response(raw), "Drops files.\n\nDone.");
    }
}
