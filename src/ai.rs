use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::sync::Arc;
use std::time::Duration;

// --- Provider trait ---

/// What shape the caller expects back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyFormat {
    /// Short free text, e.g. an id list.
    Text,
    /// One JSON object.
    Json,
}

pub trait AIProvider: Send + Sync {
    fn complete(&self, prompt: &str, max_tokens: u32, format: ReplyFormat) -> Result<String>;
    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone)]
pub enum ProviderKind {
    Anthropic,
    OpenAI,
    ClaudeCode,
}

#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub provider: ProviderKind,
    pub model_id: String,
    pub short_name: String,
}

/// Short names accepted by `resolve_model`, in display order.
pub const AVAILABLE_MODELS: &[(&str, &str)] = &[
    ("gpt-4o-mini", "OpenAI gpt-4o-mini (default, OPENAI_API_KEY)"),
    ("gpt-4o", "OpenAI gpt-4o (OPENAI_API_KEY)"),
    ("api-sonnet", "Anthropic API claude-sonnet (ANTHROPIC_API_KEY)"),
    ("api-haiku", "Anthropic API claude-haiku (ANTHROPIC_API_KEY)"),
    ("claude-sonnet", "local `claude` CLI, sonnet"),
    ("claude-haiku", "local `claude` CLI, haiku"),
];

pub fn resolve_model(name: &str) -> Result<ModelSpec> {
    match name {
        // OpenAI (requires OPENAI_API_KEY)
        "gpt-4o-mini" | "mini" => Ok(ModelSpec {
            provider: ProviderKind::OpenAI,
            model_id: "gpt-4o-mini".to_string(),
            short_name: "gpt-4o-mini".to_string(),
        }),
        "gpt-4o" => Ok(ModelSpec {
            provider: ProviderKind::OpenAI,
            model_id: "gpt-4o".to_string(),
            short_name: "gpt-4o".to_string(),
        }),
        // Direct Anthropic API (requires ANTHROPIC_API_KEY)
        "api-sonnet" => Ok(ModelSpec {
            provider: ProviderKind::Anthropic,
            model_id: "claude-sonnet-4-5-20250929".to_string(),
            short_name: "api-sonnet".to_string(),
        }),
        "api-haiku" => Ok(ModelSpec {
            provider: ProviderKind::Anthropic,
            model_id: "claude-haiku-4-5-20251001".to_string(),
            short_name: "api-haiku".to_string(),
        }),
        // Claude Code provider (uses `claude` CLI, no API key needed)
        "claude-sonnet" | "sonnet" => Ok(ModelSpec {
            provider: ProviderKind::ClaudeCode,
            model_id: "claude-sonnet-4-5-20250929".to_string(),
            short_name: "claude-sonnet".to_string(),
        }),
        "claude-haiku" | "haiku" => Ok(ModelSpec {
            provider: ProviderKind::ClaudeCode,
            model_id: "claude-haiku-4-5-20251001".to_string(),
            short_name: "claude-haiku".to_string(),
        }),
        _ => Err(anyhow!(
            "Unknown model '{}'. Available: {}",
            name,
            AVAILABLE_MODELS
                .iter()
                .map(|(n, _)| *n)
                .collect::<Vec<_>>()
                .join(", ")
        )),
    }
}

pub fn create_provider(spec: &ModelSpec) -> Result<Arc<dyn AIProvider>> {
    match spec.provider {
        ProviderKind::ClaudeCode => {
            let provider = ClaudeCodeProvider::new(spec.model_id.clone())?;
            Ok(Arc::new(provider))
        }
        ProviderKind::Anthropic => {
            let provider = AnthropicProvider::new(spec.model_id.clone())?;
            Ok(Arc::new(provider))
        }
        ProviderKind::OpenAI => {
            let provider = OpenAIProvider::new(spec.model_id.clone())?;
            Ok(Arc::new(provider))
        }
    }
}

// --- Shared request plumbing ---

const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

const BASE_SYSTEM_PROMPT: &str = "You help a web scraper read German and English company websites. \
    Answer only from the page material in the prompt and never invent links, ids or job listings.";

/// System prompt for the requested reply format.
pub fn system_prompt(format: ReplyFormat) -> String {
    match format {
        ReplyFormat::Text => format!("{} Reply with the requested answer only, no explanation.", BASE_SYSTEM_PROMPT),
        ReplyFormat::Json => format!(
            "{} Reply with a single JSON object and nothing else. Use null for values the page does not contain.",
            BASE_SYSTEM_PROMPT
        ),
    }
}

fn http_client() -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")
}

fn ensure_success(response: reqwest::blocking::Response, api: &str) -> Result<reqwest::blocking::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let error_text = response.text().unwrap_or_default();
    Err(anyhow!("{} request failed with status {}: {}", api, status, error_text))
}

fn non_empty_reply(text: Option<String>, api: &str) -> Result<String> {
    text.map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| anyhow!("Empty reply from {}", api))
}

// --- Anthropic provider ---

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    system: String,
    messages: Vec<AnthropicMessage>,
}

impl AnthropicRequest {
    fn new(model: &str, prompt: &str, max_tokens: u32, format: ReplyFormat) -> Self {
        Self {
            model: model.to_string(),
            max_tokens,
            temperature: 0.0,
            system: system_prompt(format),
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt.to_string(),
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug)]
pub struct AnthropicProvider {
    api_key: String,
    model_id: String,
    client: reqwest::blocking::Client,
}

impl AnthropicProvider {
    pub fn new(model_id: String) -> Result<Self> {
        let api_key = env::var("ANTHROPIC_API_KEY")
            .context("ANTHROPIC_API_KEY environment variable not set. Add it to .env or export it")?;
        Ok(Self { api_key, model_id, client: http_client()? })
    }
}

impl AIProvider for AnthropicProvider {
    fn complete(&self, prompt: &str, max_tokens: u32, format: ReplyFormat) -> Result<String> {
        let request = AnthropicRequest::new(&self.model_id, prompt, max_tokens, format);

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .context("Failed to send request to Anthropic API")?;

        let api_response: AnthropicResponse = ensure_success(response, "Anthropic API")?
            .json()
            .context("Failed to parse Anthropic API response")?;

        let text = api_response
            .content
            .into_iter()
            .find(|block| block.content_type == "text")
            .and_then(|block| block.text);
        non_empty_reply(text, "Anthropic API")
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

// --- Claude Code provider (shells out to `claude` CLI) ---

#[derive(Debug)]
pub struct ClaudeCodeProvider {
    model_id: String,
}

impl ClaudeCodeProvider {
    pub fn new(model_id: String) -> Result<Self> {
        std::process::Command::new("claude")
            .arg("--version")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .context("'claude' CLI not found. Install it or pick an API model (see `jobscout models`)")?;
        Ok(Self { model_id })
    }
}

impl AIProvider for ClaudeCodeProvider {
    fn complete(&self, prompt: &str, _max_tokens: u32, format: ReplyFormat) -> Result<String> {
        let output = std::process::Command::new("claude")
            .arg("-p")
            .arg(prompt)
            .arg("--model")
            .arg(&self.model_id)
            .arg("--append-system-prompt")
            .arg(system_prompt(format))
            .arg("--output-format")
            .arg("text")
            .output()
            .context("Failed to run 'claude' CLI")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("claude CLI failed: {}", stderr.trim()));
        }

        let reply = String::from_utf8(output.stdout).context("Invalid UTF-8 in claude CLI output")?;
        non_empty_reply(Some(reply), "claude CLI")
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

// --- OpenAI provider ---

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct OpenAIResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<OpenAIResponseFormat>,
}

impl OpenAIRequest {
    fn new(model: &str, prompt: &str, max_tokens: u32, format: ReplyFormat) -> Self {
        Self {
            model: model.to_string(),
            max_tokens,
            temperature: 0.0,
            messages: vec![
                OpenAIMessage {
                    role: "system",
                    content: system_prompt(format),
                },
                OpenAIMessage {
                    role: "user",
                    content: prompt.to_string(),
                },
            ],
            response_format: match format {
                ReplyFormat::Json => Some(OpenAIResponseFormat { format_type: "json_object" }),
                ReplyFormat::Text => None,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug)]
pub struct OpenAIProvider {
    api_key: String,
    model_id: String,
    client: reqwest::blocking::Client,
}

impl OpenAIProvider {
    pub fn new(model_id: String) -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY environment variable not set. Add it to .env or export it")?;
        Ok(Self { api_key, model_id, client: http_client()? })
    }
}

impl AIProvider for OpenAIProvider {
    fn complete(&self, prompt: &str, max_tokens: u32, format: ReplyFormat) -> Result<String> {
        let request = OpenAIRequest::new(&self.model_id, prompt, max_tokens, format);

        let response = self
            .client
            .post(OPENAI_API_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .context("Failed to send request to OpenAI API")?;

        let api_response: OpenAIResponse = ensure_success(response, "OpenAI API")?
            .json()
            .context("Failed to parse OpenAI API response")?;

        let text = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content);
        non_empty_reply(text, "OpenAI API")
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

// --- Reply parsing ---

/// First JSON value in a model reply. Code fences and prose around it are ignored.
pub fn parse_json_reply(reply: &str) -> Result<Value> {
    let start = reply
        .find(|c| c == '{' || c == '[')
        .ok_or_else(|| anyhow!("No JSON found in model reply"))?;

    let mut stream = serde_json::Deserializer::from_str(&reply[start..]).into_iter::<Value>();
    match stream.next() {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => Err(anyhow!("Malformed JSON in model reply: {}", e)),
        None => Err(anyhow!("No JSON found in model reply")),
    }
}

/// Element ids from a reply like `12, 4, 7`. `NONE` (or no digits) yields an empty list.
pub fn parse_id_list(reply: &str) -> Vec<usize> {
    let mut ids = Vec::new();
    if reply.trim().eq_ignore_ascii_case("none") {
        return ids;
    }
    for token in reply.split(|c: char| !c.is_ascii_digit()) {
        if let Ok(id) = token.parse::<usize>() {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}
