//! AI assistance: commit messages, PR descriptions and code review.
//!
//! Every diff handed to this module is sanitized before it is put into a
//! prompt, so callers pass raw `git diff` output.

pub mod review;

pub use review::{CodeIssue, CodeReviewer, ReviewReport};

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Deserialize;
use serde_json::json;

use crate::config::Settings;
use crate::error::AiError;
use crate::http::JsonClient;
use crate::sanitize;

const OPENAI_API: &str = "https://api.openai.com/v1";
const ANTHROPIC_API: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_LOCAL_MODEL: &str = "llama3";

const TEMPERATURE: f64 = 0.3;
const GENERATION_MAX_TOKENS: u32 = 500;

const COMMIT_SYSTEM: &str = "You are a helpful commit message generator.";
const PR_SYSTEM: &str = "You are a helpful PR description generator.";

const COMMIT_MESSAGE_PROMPT: &str = "\
Write a concise commit message for the following git diff.

## Rules
1. Follow Conventional Commits: `<type>: <description>`
2. type is one of: feat, fix, docs, style, refactor, test, chore
3. Keep the description under 72 characters
4. If there are several related changes, summarise the main one in a single sentence

## Git diff
{diff}

## Task title (for context)
{task_title}

Reply with the commit message only, without any explanation.";

const PR_DESCRIPTION_PROMPT: &str = "\
Write a pull request description from the information below.

## Git diff
{diff}

## Task
- Title: {task_title}
- Type: {task_type}
- Description: {task_description}

## Requirements
1. A 2-3 line summary of the main changes
2. The key changes as bullet points
3. Testing notes if tests changed
4. A reference to the task in the form Task #{task_id}

Reply in Markdown.";

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

/// OpenAI-compatible `/chat/completions`, used for OpenAI itself and for
/// locally served models.
#[derive(Debug)]
pub struct ChatCompletions {
    client: JsonClient,
    model: String,
}

impl ChatCompletions {
    pub fn new(base_url: &str, api_key: Option<&str>, model: &str) -> Self {
        let mut client = JsonClient::new(base_url);
        if let Some(key) = api_key {
            client = client.with_header("Authorization", &format!("Bearer {}", key));
        }
        Self {
            client,
            model: model.to_string(),
        }
    }

    fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<String, AiError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": TEMPERATURE,
            "max_tokens": max_tokens,
        });
        let resp: ChatCompletionsResponse = self.client.post("/chat/completions", &body)?;
        Ok(resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

/// Anthropic `/messages`.
#[derive(Debug)]
pub struct Messages {
    client: JsonClient,
    model: String,
}

impl Messages {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        let client = JsonClient::new(base_url)
            .with_header("x-api-key", api_key)
            .with_header("anthropic-version", ANTHROPIC_VERSION);
        Self {
            client,
            model: model.to_string(),
        }
    }

    fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<String, AiError> {
        let body = json!({
            "model": self.model,
            "system": system,
            "max_tokens": max_tokens,
            "temperature": TEMPERATURE,
            "messages": [{ "role": "user", "content": user }],
        });
        let resp: MessagesResponse = self.client.post("/messages", &body)?;
        Ok(resp
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[derive(Debug)]
pub enum AiBackend {
    OpenAi(ChatCompletions),
    Anthropic(Messages),
    Local(ChatCompletions),
}

impl AiBackend {
    pub fn name(&self) -> &'static str {
        match self {
            AiBackend::OpenAi(_) => "openai",
            AiBackend::Anthropic(_) => "anthropic",
            AiBackend::Local(_) => "local",
        }
    }
}

/// A configured AI backend plus the diff size limit applied to every prompt.
#[derive(Debug)]
pub struct AiClient {
    backend: AiBackend,
    max_diff_length: usize,
}

impl AiClient {
    pub fn new(backend: AiBackend, max_diff_length: usize) -> Self {
        Self {
            backend,
            max_diff_length,
        }
    }

    /// Resolve the backend from settings. Returns `None` when AI is not
    /// configured or a required credential is missing; callers then skip AI
    /// assistance.
    pub fn from_settings(settings: &Settings) -> Option<Self> {
        let provider = settings.ai_provider.as_deref()?;
        let model = settings.ai_model.as_deref();
        let base_url = settings.ai_base_url.as_deref();
        let api_key = settings.ai_api_key.as_deref();

        let backend = match provider {
            "openai" => AiBackend::OpenAi(ChatCompletions::new(
                base_url.unwrap_or(OPENAI_API),
                Some(api_key?),
                model.unwrap_or(DEFAULT_OPENAI_MODEL),
            )),
            "anthropic" => AiBackend::Anthropic(Messages::new(
                base_url.unwrap_or(ANTHROPIC_API),
                api_key?,
                model.unwrap_or(DEFAULT_ANTHROPIC_MODEL),
            )),
            "local" => AiBackend::Local(ChatCompletions::new(
                base_url?,
                api_key,
                model.unwrap_or(DEFAULT_LOCAL_MODEL),
            )),
            other => {
                tracing::warn!(provider = other, "unknown AI provider, AI assistance disabled");
                return None;
            }
        };
        tracing::debug!(provider = backend.name(), "AI backend configured");
        Some(Self::new(backend, settings.ai_diff_max_length))
    }

    pub fn backend(&self) -> &AiBackend {
        &self.backend
    }

    pub fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<String, AiError> {
        tracing::debug!(provider = self.backend.name(), prompt_len = user.len(), "calling AI backend");
        let text = match &self.backend {
            AiBackend::OpenAi(c) | AiBackend::Local(c) => c.complete(system, user, max_tokens)?,
            AiBackend::Anthropic(c) => c.complete(system, user, max_tokens)?,
        };
        let text = text.trim();
        if text.is_empty() {
            return Err(AiError::EmptyResponse);
        }
        Ok(text.to_string())
    }

    pub(crate) fn sanitize(&self, diff: &str) -> String {
        sanitize::sanitize(diff, self.max_diff_length)
    }

    pub fn generate_commit_message(&self, diff: &str, task_title: &str) -> Result<String, AiError> {
        let diff = self.sanitize(diff);
        let prompt = render(COMMIT_MESSAGE_PROMPT, &[("task_title", task_title), ("diff", diff.as_str())]);
        let text = self.complete(COMMIT_SYSTEM, &prompt, GENERATION_MAX_TOKENS)?;
        let message = strip_code_fence(&text);
        if message.is_empty() {
            return Err(AiError::EmptyResponse);
        }
        Ok(message)
    }

    pub fn generate_pr_description(
        &self,
        diff: &str,
        task_id: u64,
        task_title: &str,
        task_type: &str,
        task_description: &str,
    ) -> Result<String, AiError> {
        let diff = self.sanitize(diff);
        let task_id = task_id.to_string();
        let prompt = render(
            PR_DESCRIPTION_PROMPT,
            &[
                ("task_id", task_id.as_str()),
                ("task_title", task_title),
                ("task_type", task_type),
                ("task_description", task_description),
                ("diff", diff.as_str()),
            ],
        );
        self.complete(PR_SYSTEM, &prompt, GENERATION_MAX_TOKENS)
    }
}

/// Description used when AI is unavailable or fails.
pub fn fallback_pr_description(task_id: u64, task_description: &str) -> String {
    format!("Task #{}\n\n{}", task_id, task_description)
}

/// Fill `{name}` placeholders in a single pass, so substituted text is never
/// expanded again. Unknown placeholders are kept verbatim.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    let placeholder = PLACEHOLDER.get_or_init(|| Regex::new(r"\{(\w+)\}").expect("valid placeholder pattern"));
    placeholder
        .replace_all(template, |caps: &Captures| {
            values
                .iter()
                .find(|(name, _)| *name == &caps[1])
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Models sometimes wrap a one-line answer in a fence or quotes.
fn strip_code_fence(text: &str) -> String {
    let mut lines: Vec<&str> = text.trim().lines().collect();
    if lines.first().is_some_and(|l| l.trim_start().starts_with("```")) {
        lines.remove(0);
        if lines.last().is_some_and(|l| l.trim() == "```") {
            lines.pop();
        }
    }
    let joined = lines.join("\n");
    joined
        .trim()
        .trim_matches(|c| c == '"' || c == '`')
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings::default()
    }

    #[test]
    fn no_provider_means_no_client() {
        assert!(AiClient::from_settings(&settings()).is_none());
    }

    #[test]
    fn hosted_provider_requires_key() {
        let mut s = settings();
        s.ai_provider = Some("openai".to_string());
        assert!(AiClient::from_settings(&s).is_none());
        s.ai_api_key = Some("sk-test".to_string());
        let client = AiClient::from_settings(&s).unwrap();
        assert_eq!(client.backend().name(), "openai");
    }

    #[test]
    fn local_provider_requires_base_url_only() {
        let mut s = settings();
        s.ai_provider = Some("local".to_string());
        assert!(AiClient::from_settings(&s).is_none());
        s.ai_base_url = Some("http://127.0.0.1:11434/v1".to_string());
        let client = AiClient::from_settings(&s).unwrap();
        assert_eq!(client.backend().name(), "local");
    }

    #[test]
    fn unknown_provider_is_ignored() {
        let mut s = settings();
        s.ai_provider = Some("mystery".to_string());
        s.ai_api_key = Some("k".to_string());
        assert!(AiClient::from_settings(&s).is_none());
    }

    #[test]
    fn strip_fence_around_message() {
        assert_eq!(strip_code_fence("```\nfix: handle timeout\n```"), "fix: handle timeout");
        assert_eq!(strip_code_fence("\"feat: add login\""), "feat: add login");
        assert_eq!(strip_code_fence("docs: update readme"), "docs: update readme");
    }

    #[test]
    fn render_fills_each_placeholder_once() {
        let out = render(
            "T: {task_title}\nD: {diff}\nK: {other}",
            &[("task_title", "Fix {diff} escaping"), ("diff", "+{task_title}")],
        );
        assert_eq!(out, "T: Fix {diff} escaping\nD: +{task_title}\nK: {other}");
    }

    #[test]
    fn fallback_description_format() {
        assert_eq!(fallback_pr_description(7, "Null check"), "Task #7\n\nNull check");
    }
}
