//! Text rewriting stage: providers and the ordered fallback chain.

use crate::defaults;
use crate::error::{Result, VoxtaskError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Result of a rewrite: one revised sentence plus optional extras.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteResult {
    pub revised: String,
    /// 0–2 alternative phrasings with the same meaning.
    #[serde(default)]
    pub alternatives: Vec<String>,
    /// 1–3 short labels of what was fixed.
    #[serde(default)]
    pub corrections: Vec<String>,
}

impl RewriteResult {
    /// Pass-through result carrying the original text unchanged.
    pub fn passthrough(original: &str) -> Self {
        Self {
            revised: original.to_string(),
            alternatives: Vec::new(),
            corrections: Vec::new(),
        }
    }

    /// Pass-through annotated with the "rewrite unavailable" marker,
    /// used when every provider failed.
    pub fn unavailable(original: &str) -> Self {
        Self {
            revised: original.to_string(),
            alternatives: Vec::new(),
            corrections: vec![defaults::REWRITE_UNAVAILABLE_MARKER.to_string()],
        }
    }

    /// Format the notes body persisted alongside the task title.
    pub fn format_task_body(&self, original: &str) -> String {
        let mut lines = Vec::new();
        if !self.corrections.is_empty() {
            lines.push(format!("Corrections: {}", self.corrections.join(", ")));
        }
        for (i, alt) in self.alternatives.iter().enumerate() {
            lines.push(format!("Alt {}: {}", i + 1, alt));
        }
        lines.push(format!("Original: {}", original));
        lines.join("\n")
    }
}

/// A rewrite provider. Internals (local model, HTTP service) are external;
/// the pipeline only sees text in, [`RewriteResult`] out.
#[async_trait]
pub trait Rewriter: Send + Sync {
    async fn rewrite(&self, original: &str) -> Result<RewriteResult>;

    /// Name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Ordered chain of rewrite providers with pass-through degradation.
///
/// Providers are tried strictly in sequence, each only after the previous
/// one failed, never in parallel. The chain itself never fails: if every
/// provider errors, the original text passes through with an
/// "unavailable" marker; an empty chain passes through silently.
#[derive(Default, Clone)]
pub struct RewriteChain {
    providers: Vec<Arc<dyn Rewriter>>,
}

impl RewriteChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: Arc<dyn Rewriter>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Rewrite with fallback. This stage never hard-fails a segment.
    pub async fn rewrite_with_fallback(&self, original: &str) -> RewriteResult {
        if self.providers.is_empty() {
            return RewriteResult::passthrough(original);
        }

        for provider in &self.providers {
            match provider.rewrite(original).await {
                Ok(result) => return result,
                Err(error) => {
                    tracing::warn!(
                        provider = provider.name(),
                        %error,
                        "rewrite provider failed, trying next"
                    );
                }
            }
        }

        tracing::warn!("all rewrite providers failed, passing transcript through");
        RewriteResult::unavailable(original)
    }
}

/// Rewrite provider backed by OpenRouter's chat completions API.
pub struct OpenRouterRewriter {
    api_key: String,
    endpoint: String,
    client: reqwest::Client,
}

const SYSTEM_PROMPT: &str = "\
You are an English writing assistant.
Rewrite the user's sentence: fix grammar, improve naturalness for spoken English.
Preserve the original meaning exactly. Do not add explanations.

Respond in JSON only:
{\"revised\": \"...\", \"alternatives\": [\"...\", \"...\"], \"corrections\": [\"...\", \"...\"]}

Rules:
- \"revised\": one corrected, natural-sounding sentence
- \"alternatives\": 0-2 variations with same meaning (omit array items if unnecessary)
- \"corrections\": 1-3 short labels of what was fixed (e.g. \"verb tense\", \"missing article\")
- No commentary beyond the JSON";

impl OpenRouterRewriter {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: defaults::OPENROUTER_ENDPOINT.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Override the endpoint (local gateways, tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Request body for the chat completions call. The primary model plus a
    /// server-side fallback route, so one HTTP call tries several models.
    pub fn build_request_body(text: &str) -> serde_json::Value {
        serde_json::json!({
            "model": defaults::OPENROUTER_MODELS[0],
            "models": defaults::OPENROUTER_MODELS,
            "route": "fallback",
            "temperature": 0.3,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": text },
            ],
        })
    }

    /// Parse the completion response; the rewrite JSON rides inside the
    /// assistant message content.
    pub fn parse_response(body: &str) -> Result<RewriteResult> {
        #[derive(Deserialize)]
        struct Message {
            content: String,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct Response {
            choices: Vec<Choice>,
        }

        let response: Response =
            serde_json::from_str(body).map_err(|_| VoxtaskError::RewriteInvalidResponse)?;
        let content = response
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .ok_or(VoxtaskError::RewriteInvalidResponse)?;

        serde_json::from_str(content).map_err(|_| VoxtaskError::RewriteInvalidResponse)
    }
}

#[async_trait]
impl Rewriter for OpenRouterRewriter {
    async fn rewrite(&self, original: &str) -> Result<RewriteResult> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("X-Title", "voxtask")
            .json(&Self::build_request_body(original))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(VoxtaskError::HttpStatus {
                service: "openrouter",
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        Self::parse_response(&body)
    }

    fn name(&self) -> &'static str {
        "openrouter"
    }
}
