//! Commit summaries from a language model
//!
//! Two wire formats: the Anthropic Messages API and any OpenAI-compatible
//! chat completions endpoint. The OpenAI-compatible endpoint wins when both
//! are configured. Only filenames and the diff stat line are sent.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;
use vault_core::{BackupError, LlmConfig, Summarizer};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 100;
/// Filenames listed in the prompt before the rest are counted instead
const MAX_PROMPT_FILES: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    Anthropic {
        url: String,
        api_key: String,
        model: String,
    },
    OpenAiCompatible {
        url: String,
        api_key: Option<String>,
        model: String,
    },
}

impl Provider {
    /// `None` when no model endpoint is configured
    pub fn from_config(config: &LlmConfig) -> Option<Self> {
        if let Some(url) = &config.api_url {
            return Some(Self::OpenAiCompatible {
                url: url.clone(),
                api_key: config.api_key.clone(),
                model: config.model.clone(),
            });
        }
        config.anthropic_api_key.as_ref().map(|key| Self::Anthropic {
            url: config.anthropic_api_url.clone(),
            api_key: key.clone(),
            model: config.anthropic_model.clone(),
        })
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Anthropic { .. } => "anthropic",
            Self::OpenAiCompatible { .. } => "openai-compatible",
        }
    }

    fn model(&self) -> &str {
        match self {
            Self::Anthropic { model, .. } | Self::OpenAiCompatible { model, .. } => model,
        }
    }
}

pub struct LlmSummarizer {
    client: reqwest::Client,
    provider: Provider,
}

impl LlmSummarizer {
    pub fn new(provider: Provider) -> Self {
        Self {
            client: reqwest::Client::new(),
            provider,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Option<Self> {
        Provider::from_config(config).map(Self::new)
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    async fn request(&self, prompt: &str, timeout: Duration) -> anyhow::Result<String> {
        let body = json!({
            "model": self.provider.model(),
            "max_tokens": MAX_TOKENS,
            "messages": [{"role": "user", "content": prompt}],
        });

        let request = match &self.provider {
            Provider::Anthropic { url, api_key, .. } => self
                .client
                .post(url)
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            Provider::OpenAiCompatible { url, api_key, .. } => {
                let request = self.client.post(url);
                match api_key {
                    Some(key) => request.bearer_auth(key),
                    None => request,
                }
            }
        };

        let response: Value = request
            .timeout(timeout)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        extract_text(&self.provider, &response)
            .ok_or_else(|| anyhow::anyhow!("response carried no message text"))
    }
}

/// Prompt listing the changed filenames and the stat line
pub fn build_prompt(files: &[String], stats: &str) -> String {
    let mut listed = files
        .iter()
        .take(MAX_PROMPT_FILES)
        .cloned()
        .collect::<Vec<_>>()
        .join("\n");
    if files.len() > MAX_PROMPT_FILES {
        listed.push_str(&format!("\n(and {} more)", files.len() - MAX_PROMPT_FILES));
    }

    format!(
        "Write a single-line commit message (at most 60 characters) describing these \
         changes to an Obsidian vault. Be specific about what changed based on the \
         filenames. Use lowercase and no trailing period.\n\n\
         Changed files:\n{listed}\n\nStats: {stats}"
    )
}

fn extract_text(provider: &Provider, response: &Value) -> Option<String> {
    let text = match provider {
        Provider::Anthropic { .. } => response.pointer("/content/0/text"),
        Provider::OpenAiCompatible { .. } => response.pointer("/choices/0/message/content"),
    }?;
    text.as_str()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(
        &self,
        files: &[String],
        stats: &str,
        timeout: Duration,
    ) -> vault_core::Result<String> {
        info!(
            provider = self.provider.name(),
            model = self.provider.model(),
            "Requesting AI commit message"
        );
        self.request(&build_prompt(files, stats), timeout)
            .await
            .map_err(|e| BackupError::MessageGenerationFailed(format!("{e:#}")))
    }
}
