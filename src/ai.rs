use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::path::Path;

use crate::error::ConfigError;
use crate::models::{CandidateProfile, Seniority};

pub const DEFAULT_MODEL: &str = "groq";

// --- Provider trait ---

pub trait AIProvider {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String>;
    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderKind {
    Anthropic,
    OpenAI,
    Groq,
}

#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub provider: ProviderKind,
    pub model_id: String,
    pub short_name: String,
}

pub fn resolve_model(name: &str) -> Result<ModelSpec> {
    let (provider, model_id, short_name) = match name {
        // Groq hosted Llama (requires GROQ_API_KEY)
        "groq" | "llama" | "llama-3.3-70b" => (ProviderKind::Groq, "llama-3.3-70b-versatile", "groq"),
        "llama-3.1-8b" => (ProviderKind::Groq, "llama-3.1-8b-instant", "llama-3.1-8b"),
        // Anthropic API (requires ANTHROPIC_API_KEY)
        "api-sonnet" | "sonnet" => (ProviderKind::Anthropic, "claude-sonnet-4-5-20250929", "api-sonnet"),
        "api-haiku" | "haiku" => (ProviderKind::Anthropic, "claude-haiku-4-5-20251001", "api-haiku"),
        // OpenAI (requires OPENAI_API_KEY)
        "gpt-4o" => (ProviderKind::OpenAI, "gpt-4o", "gpt-4o"),
        "gpt-4o-mini" => (ProviderKind::OpenAI, "gpt-4o-mini", "gpt-4o-mini"),
        _ => {
            return Err(anyhow!(
                "Unknown model '{}'. Available: groq (default), llama-3.1-8b, api-sonnet, \
                 api-haiku, gpt-4o, gpt-4o-mini",
                name
            ));
        }
    };
    Ok(ModelSpec {
        provider,
        model_id: model_id.to_string(),
        short_name: short_name.to_string(),
    })
}

pub fn create_provider(spec: &ModelSpec) -> Result<Box<dyn AIProvider>> {
    match spec.provider {
        ProviderKind::Anthropic => Ok(Box::new(AnthropicProvider::new(spec.model_id.clone())?)),
        ProviderKind::OpenAI => Ok(Box::new(OpenAIProvider::openai(spec.model_id.clone())?)),
        ProviderKind::Groq => Ok(Box::new(OpenAIProvider::groq(spec.model_id.clone())?)),
    }
}

fn api_key(var: &'static str) -> Result<String, ConfigError> {
    env::var(var)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .ok_or(ConfigError::Missing(var))
}

// --- Anthropic provider ---

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

impl ChatRequest {
    fn user(model: &str, prompt: &str, max_tokens: u32) -> Self {
        Self {
            model: model.to_string(),
            max_tokens,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    text: String,
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
        let api_key = api_key("ANTHROPIC_API_KEY")?;
        let client = reqwest::blocking::Client::new();
        Ok(Self { api_key, model_id, client })
    }
}

impl AIProvider for AnthropicProvider {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&ChatRequest::user(&self.model_id, prompt, max_tokens))
            .send()
            .context("Failed to send request to Anthropic API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            return Err(anyhow!(
                "Anthropic API request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let api_response: AnthropicResponse = response
            .json()
            .context("Failed to parse Anthropic API response")?;

        api_response
            .content
            .first()
            .map(|block| block.text.clone())
            .ok_or_else(|| anyhow!("No content in Anthropic API response"))
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

// --- OpenAI-compatible chat completions (OpenAI, Groq) ---

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const GROQ_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: String,
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
    vendor: &'static str,
    api_url: &'static str,
    api_key: String,
    model_id: String,
    client: reqwest::blocking::Client,
}

impl OpenAIProvider {
    pub fn openai(model_id: String) -> Result<Self> {
        Self::with_endpoint("OpenAI", OPENAI_API_URL, "OPENAI_API_KEY", model_id)
    }

    pub fn groq(model_id: String) -> Result<Self> {
        Self::with_endpoint("Groq", GROQ_API_URL, "GROQ_API_KEY", model_id)
    }

    fn with_endpoint(
        vendor: &'static str,
        api_url: &'static str,
        key_var: &'static str,
        model_id: String,
    ) -> Result<Self> {
        let api_key = api_key(key_var)?;
        let client = reqwest::blocking::Client::new();
        Ok(Self {
            vendor,
            api_url,
            api_key,
            model_id,
            client,
        })
    }
}

impl AIProvider for OpenAIProvider {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let response = self
            .client
            .post(self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&ChatRequest::user(&self.model_id, prompt, max_tokens))
            .send()
            .with_context(|| format!("Failed to send request to {} API", self.vendor))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            return Err(anyhow!(
                "{} API request failed with status {}: {}",
                self.vendor,
                status,
                error_text
            ));
        }

        let api_response: OpenAIResponse = response
            .json()
            .with_context(|| format!("Failed to parse {} API response", self.vendor))?;

        api_response
            .choices
            .first()
            .map(|choice| choice.message.content.clone())
            .ok_or_else(|| anyhow!("No choices in {} API response", self.vendor))
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

// --- Resume analysis ---

/// Turns free-form resume text into a structured profile.
pub trait ProfileAnalyzer {
    fn analyze(&self, resume_text: &str) -> Result<CandidateProfile>;
}

pub struct LlmProfileAnalyzer {
    provider: Box<dyn AIProvider>,
}

impl LlmProfileAnalyzer {
    pub fn new(provider: Box<dyn AIProvider>) -> Self {
        Self { provider }
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }
}

impl ProfileAnalyzer for LlmProfileAnalyzer {
    fn analyze(&self, resume_text: &str) -> Result<CandidateProfile> {
        let prompt = format!(
            "Read the resume below and answer with ONLY a JSON object using these keys:\n\n\
            {{\n  \
              \"area\": \"Backend|Frontend|Data|Product|Design|QA\",\n  \
              \"senioridade\": \"Junior|Pleno|Senior|Lead\",\n  \
              \"skills\": [\"skill1\", \"skill2\"],\n  \
              \"soft_skills\": [\"skill1\", \"skill2\"],\n  \
              \"anos_experiencia\": <number>,\n  \
              \"keywords\": [\"word1\", \"word2\"]\n\
            }}\n\n\
            Resume:\n{}\n\n\
            Return the JSON only, no commentary.",
            resume_text
        );

        let response = self.provider.complete(&prompt, 1024)?;
        profile_from_response(&response)
    }
}

/// Build a profile from a model reply that contains a JSON object somewhere
/// in it. Missing fields fall back to a mid-level backend profile.
pub fn profile_from_response(response: &str) -> Result<CandidateProfile> {
    let json = extract_json_object(response)
        .ok_or_else(|| anyhow!("Could not find a JSON object in the model response: {}", response))?;
    let data: Value = serde_json::from_str(json).context("Model returned malformed JSON")?;

    let seniority = str_field(&data, "senioridade")
        .or_else(|| str_field(&data, "seniority"))
        .and_then(|s| s.parse::<Seniority>().ok())
        .unwrap_or(Seniority::Pleno);
    let years = data
        .get("anos_experiencia")
        .or_else(|| data.get("years_experience"))
        .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f.max(0.0) as u64)))
        .unwrap_or(0);

    Ok(CandidateProfile {
        area: str_field(&data, "area")
            .filter(|a| !a.is_empty())
            .unwrap_or("Backend")
            .to_string(),
        seniority: Some(seniority),
        skills: list_field(&data, "skills"),
        soft_skills: list_field(&data, "soft_skills"),
        years_experience: u32::try_from(years).unwrap_or(u32::MAX),
        keywords: list_field(&data, "keywords"),
    })
}

fn str_field<'a>(data: &'a Value, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str).map(str::trim)
}

fn list_field(data: &Value, key: &str) -> Vec<String> {
    data.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// First balanced `{...}` in `text`, skipping braces inside JSON strings.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Plain-text resume with whitespace collapsed.
pub fn read_resume(path: &Path) -> Result<String> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    if !matches!(extension.as_str(), "txt" | "md" | "") {
        return Err(anyhow!(
            "Unsupported resume format '.{}'; export it as plain text first",
            extension
        ));
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read resume: {}", path.display()))?;
    Ok(text.split_whitespace().collect::<Vec<_>>().join(" "))
}
