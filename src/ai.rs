use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::AiConfig;

/// Exact answer of a correction request when the text needs no change.
pub const NO_CORRECTION: &str = "RAS";

const CHAT_PROMPT: &str = "You are Warden, the assistant of a group chat moderation bot. \
Answer clearly and concisely in at most 500 characters. Use emojis sparingly. \
You cannot browse the internet or run code, and you do not give sensitive medical, \
legal or financial advice.";

const CORRECTION_PROMPT: &str = "You are an expert proofreader. Fix ONLY spelling, grammar \
and syntax mistakes. Keep the author's tone, style and vocabulary. \
If the text is already correct, answer exactly \"RAS\". \
Do not add any comment, only the corrected text.";

#[derive(Error, Debug)]
pub enum AiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {body}")]
    Api { status: StatusCode, body: String },
    #[error("Empty completion")]
    EmptyResponse,
    #[error("AI service not configured")]
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    Chat,
    Correction,
}

impl CompletionMode {
    fn system_prompt(self) -> &'static str {
        match self {
            CompletionMode::Chat => CHAT_PROMPT,
            CompletionMode::Correction => CORRECTION_PROMPT,
        }
    }

    fn temperature(self) -> f32 {
        match self {
            CompletionMode::Chat => 0.7,
            CompletionMode::Correction => 0.3,
        }
    }
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        context: Option<&str>,
        mode: CompletionMode,
    ) -> Result<String, AiError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Client for any OpenAI-compatible chat-completions endpoint.
pub struct OpenAiCompatClient {
    client: Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
    chat_max_tokens: u32,
    correction_max_tokens: u32,
}

impl OpenAiCompatClient {
    pub fn new(config: &AiConfig, api_key: Option<String>) -> Result<Self, AiError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: config.model.clone(),
            chat_max_tokens: config.chat_max_tokens,
            correction_max_tokens: config.correction_max_tokens,
        })
    }

    /// Reads the key from the environment variable named in the config. A
    /// missing key leaves the client disabled rather than failing startup.
    pub fn from_config(config: &AiConfig) -> Result<Self, AiError> {
        let api_key = std::env::var(&config.api_key_env).ok();
        if api_key.is_none() {
            warn!("{} not set, AI commands are disabled", config.api_key_env);
        }
        Self::new(config, api_key)
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    fn max_tokens(&self, mode: CompletionMode) -> u32 {
        match mode {
            CompletionMode::Chat => self.chat_max_tokens,
            CompletionMode::Correction => self.correction_max_tokens,
        }
    }
}

fn user_content(prompt: &str, context: Option<&str>) -> String {
    match context {
        Some(context) if !context.trim().is_empty() => {
            format!("Context: {}\n\nQuestion: {}", context, prompt)
        }
        _ => prompt.to_string(),
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatClient {
    async fn complete(
        &self,
        prompt: &str,
        context: Option<&str>,
        mode: CompletionMode,
    ) -> Result<String, AiError> {
        let api_key = self.api_key.as_deref().ok_or(AiError::Disabled)?;
        let content = user_content(prompt, context);

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: mode.system_prompt(),
                },
                ChatMessage {
                    role: "user",
                    content: &content,
                },
            ],
            temperature: mode.temperature(),
            max_tokens: self.max_tokens(mode),
            top_p: 1.0,
            stream: false,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Api { status, body });
        }

        let parsed = response.json::<ChatResponse>().await?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(AiError::EmptyResponse)?;

        debug!("Completion ({:?}) returned {} chars", mode, text.len());
        Ok(text)
    }
}

const COMMON_WORDS: &[&str] = &[
    "yes", "no", "thanks", "good", "fine", "okay", "with", "without", "from", "this", "that",
];

/// Pre-filter for the spelling correction command: enough words, not just
/// emojis, and at least one word that could be misspelled.
pub fn worth_correcting(text: &str, min_words: usize) -> bool {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() < min_words {
        return false;
    }
    if !text.chars().any(char::is_alphanumeric) {
        return false;
    }

    words.iter().any(|word| {
        let word: String = word.chars().filter(|c| c.is_alphabetic()).collect();
        word.chars().count() > 3 && !COMMON_WORDS.contains(&word.to_lowercase().as_str())
    })
}
