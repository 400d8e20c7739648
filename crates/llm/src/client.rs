//! Prompt assembly and reply parsing for the three enrichment calls.

use std::sync::OnceLock;

use anyhow::Result;
use regex::Regex;
use tracing::{debug, warn};

use notegarden_config::{AppConfig, LimitsConfig, PromptsConfig};

use crate::GenerationError;
use crate::provider::{TextGenerator, build_generator};

/// A semantically related document handed to insight generation.
#[derive(Debug, Clone)]
pub struct RelatedDocument {
    pub source: String,
    pub path: String,
    pub content: String,
}

const DEFAULT_TAGGING_TEMPLATE: &str = "\
You are a knowledge-management assistant. Extract 3-5 core tags for the note below.
Known tags: {existing_tags}
Reply with a JSON array only, e.g. [\"tag1\", \"tag2\"].
Content:
{content}";

const DEFAULT_SUMMARY_TEMPLATE: &str = "\
Condense the following note into two or three plain sentences. Reply with the
summary only.
Content:
{content}";

const DEFAULT_INSIGHT_TEMPLATE: &str = "\
Analyse how the current note relates to the reference notes and write a short
cross-reference callout for it. If there is no meaningful relation, reply with
exactly {sentinel}.
Current note: {current_title}
References:
{context}
Content:
{current_content}";

/// High-level client for the two generation roles: the primary backend
/// (tagging, insights) and the summarization backend.
pub struct GenerationClient {
    primary: Box<dyn TextGenerator>,
    summarizer: Box<dyn TextGenerator>,
    limits: LimitsConfig,
    prompts: PromptsConfig,
}

impl GenerationClient {
    pub fn new(
        primary: Box<dyn TextGenerator>,
        summarizer: Box<dyn TextGenerator>,
        limits: LimitsConfig,
        prompts: PromptsConfig,
    ) -> Self {
        Self {
            primary,
            summarizer,
            limits,
            prompts,
        }
    }

    /// Resolve both roles from configuration via the provider factory.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let primary = build_generator(config.active_provider()?);
        let summarizer = build_generator(config.summary_provider()?);
        Ok(Self::new(
            primary,
            summarizer,
            config.limits.clone(),
            config.prompts.clone(),
        ))
    }

    /// Suggest tags for a note.  The reply must contain a JSON string array;
    /// surrounding commentary and code fences are tolerated, anything else is
    /// a [`GenerationError::MalformedReply`].
    pub async fn generate_tags(
        &self,
        content: &str,
        existing_tags: &[String],
    ) -> Result<Vec<String>, GenerationError> {
        let existing = if existing_tags.is_empty() {
            "(none)".to_string()
        } else {
            existing_tags.join(", ")
        };

        let template = pick_template(&self.prompts.tagging, DEFAULT_TAGGING_TEMPLATE);
        let prompt = template
            .replace("{existing_tags}", &existing)
            .replace("{content}", &truncate_chars(content, self.limits.tag_content_chars));

        let response = self.primary.generate(&prompt).await?;
        extract_tag_array(&response)
    }

    /// Condense a note.  Never fails: any backend problem degrades to a
    /// hard-truncated prefix of the original, because summarization is an
    /// optimization, not a required step.
    pub async fn summarize(&self, content: &str) -> String {
        let template = pick_template(&self.prompts.summary, DEFAULT_SUMMARY_TEMPLATE);
        let prompt = template.replace(
            "{content}",
            &truncate_chars(content, self.limits.summary_content_chars),
        );

        match self.summarizer.generate(&prompt).await {
            Ok(summary) => summary,
            Err(err) => {
                warn!(%err, "summarization failed, falling back to truncated prefix");
                truncate_chars(content, self.limits.summary_fallback_chars)
            }
        }
    }

    /// Generate a cross-reference insight for a note given its nearest
    /// neighbours.  An empty string means "no relation found".
    pub async fn generate_insight(
        &self,
        title: &str,
        content: &str,
        related: &[RelatedDocument],
    ) -> Result<String, GenerationError> {
        if related.is_empty() {
            return Ok(String::new());
        }

        let mut context = String::new();
        for (i, doc) in related.iter().enumerate() {
            let snippet = if doc.content.chars().count() > self.limits.related_snippet_threshold {
                if self.limits.enable_summary {
                    self.summarize(&doc.content).await
                } else {
                    truncate_chars(&doc.content, self.limits.related_snippet_chars)
                }
            } else {
                doc.content.clone()
            };
            context.push_str(&format!("\n[Reference {}]: {}\n{}\n", i + 1, doc.source, snippet));
        }

        let template = pick_template(&self.prompts.insight, DEFAULT_INSIGHT_TEMPLATE);
        let prompt = template
            .replace("{sentinel}", &self.limits.no_relation_sentinel)
            .replace("{current_title}", title)
            .replace("{context}", &context)
            .replace(
                "{current_content}",
                &truncate_chars(content, self.limits.insight_content_chars),
            );

        let response = self.primary.generate(&prompt).await?;
        if response.contains(&self.limits.no_relation_sentinel) {
            debug!(title, "backend reported no relation");
            return Ok(String::new());
        }
        Ok(response)
    }
}

fn pick_template<'a>(configured: &'a str, default: &'a str) -> &'a str {
    if configured.trim().is_empty() {
        default
    } else {
        configured
    }
}

/// Character-bounded prefix; caps are measured in characters, not bytes, so
/// multi-byte text never splits mid-codepoint.
fn truncate_chars(text: &str, cap: usize) -> String {
    text.chars().take(cap).collect()
}

/// Pull the first bracketed JSON array out of a chatty reply.  Code fences
/// are stripped first; anything that does not parse into an array is a
/// malformed reply.
fn extract_tag_array(response: &str) -> Result<Vec<String>, GenerationError> {
    static ARRAY: OnceLock<Regex> = OnceLock::new();
    let array = ARRAY.get_or_init(|| Regex::new(r"(?s)\[.*\]").unwrap());

    let cleaned = response.replace("```json", "").replace("```", "");
    let candidate = array
        .find(cleaned.trim())
        .map(|m| m.as_str())
        .ok_or_else(|| {
            GenerationError::MalformedReply(format!("no JSON array in reply: {response}"))
        })?;

    let parsed: serde_json::Value = serde_json::from_str(candidate).map_err(|err| {
        GenerationError::MalformedReply(format!("invalid JSON array: {err}"))
    })?;

    let items = parsed.as_array().ok_or_else(|| {
        GenerationError::MalformedReply(format!("expected a JSON array, got: {parsed}"))
    })?;

    Ok(items
        .iter()
        .map(|item| match item {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect())
}

// ── Tests ────────────────────────────────────────────────────────────────────
