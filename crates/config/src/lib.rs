use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};

// ── Provider selection ────────────────────────────────────────────────────────

/// Which wire protocol a text-generation provider speaks.
///
/// | Kind               | Endpoint shape                                      |
/// |--------------------|-----------------------------------------------------|
/// | `openai`           | `POST {base}/chat/completions`, bearer auth         |
/// | `openai_compatible`| Same as `openai`, against a self-chosen base URL    |
/// | `anthropic`        | `POST {base}/v1/messages`, `x-api-key` header       |
/// | `google`           | `POST {base}/models/{m}:generateContent?key=...`    |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "openai_compatible")]
    OpenAiCompatible,
    Anthropic,
    Google,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Base URL override.  Required for `openai_compatible`; the other kinds
    /// fall back to their public endpoints when empty.
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::OpenAi,
            base_url: String::new(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Name of the provider entry used for tagging and insight generation.
    pub active_provider: String,
    /// Provider entry used for summarization.  Empty means "same as active".
    pub summary_provider: String,
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            active_provider: "default".to_string(),
            summary_provider: String::new(),
            providers: BTreeMap::new(),
        }
    }
}

// ── Embedding backend ─────────────────────────────────────────────────────────

/// Embedding backend selector: a local Ollama instance or a remote
/// OpenAI-compatible embeddings API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    #[default]
    Ollama,
    Api,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    pub model: String,
    /// Overridden at runtime by `OLLAMA_BASE_URL` when set (ollama backend).
    pub base_url: String,
    pub api_key: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Ollama,
            model: "nomic-embed-text".to_string(),
            base_url: "http://localhost:11434".to_string(),
            api_key: String::new(),
        }
    }
}

// ── Safety / backups ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub enable_backup: bool,
    /// Date directories older than this many days are pruned.  Non-positive
    /// disables pruning.
    pub retention_days: i64,
    pub backup_path: String,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            enable_backup: true,
            retention_days: 7,
            backup_path: ".notegarden/backups".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub data_dir: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            data_dir: ".notegarden/index".to_string(),
        }
    }
}

// ── Prompt-cost limits ────────────────────────────────────────────────────────

/// Character caps that bound token cost per backend call.  These are
/// configuration, not constants: heavy vaults tune them down, small local
/// models tune them up.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Content prefix embedded into the tagging prompt.
    pub tag_content_chars: usize,
    /// Content prefix embedded into the insight prompt.
    pub insight_content_chars: usize,
    /// Content prefix sent to the summarization role.
    pub summary_content_chars: usize,
    /// Fallback prefix length when summarization fails.
    pub summary_fallback_chars: usize,
    /// Related documents longer than this are condensed before entering the
    /// insight context.
    pub related_snippet_threshold: usize,
    /// Hard-truncation length for related documents when summarization is off.
    pub related_snippet_chars: usize,
    /// Use the summarization role to condense long related documents.
    pub enable_summary: bool,
    /// Reply token meaning "these documents are unrelated".
    pub no_relation_sentinel: String,
    /// Nearest neighbours retrieved per document.
    pub retrieval_k: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            tag_content_chars: 3000,
            insight_content_chars: 2000,
            summary_content_chars: 2000,
            summary_fallback_chars: 300,
            related_snippet_threshold: 800,
            related_snippet_chars: 500,
            enable_summary: true,
            no_relation_sentinel: "NO_RELATION".to_string(),
            retrieval_k: 3,
        }
    }
}

/// Optional prompt template overrides.  Empty string means "use the built-in
/// default".  Templates use `{placeholder}` substitution; see
/// `notegarden-llm` for the recognised placeholders.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub tagging: String,
    pub summary: String,
    pub insight: String,
}

// ── Top-level config ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub vault_path: String,
    /// Directory for tool state: vocabulary files and the change cursor.
    pub state_dir: String,
    pub generation: GenerationConfig,
    pub embedding: EmbeddingConfig,
    pub safety: SafetyConfig,
    pub index: IndexConfig,
    pub limits: LimitsConfig,
    pub prompts: PromptsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            vault_path: String::new(),
            state_dir: ".notegarden".to_string(),
            generation: GenerationConfig::default(),
            embedding: EmbeddingConfig::default(),
            safety: SafetyConfig::default(),
            index: IndexConfig::default(),
            limits: LimitsConfig::default(),
            prompts: PromptsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load and validate a config file.  A missing file is a hard error: the
    /// tool mutates user notes and must never run against guessed settings.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("config file not found: {}", path.display()))?;

        let expanded = expand_env_vars(&raw);
        let config: AppConfig = toml::from_str(&expanded)
            .with_context(|| format!("invalid config file {}", path.display()))?;

        if config.vault_path.trim().is_empty() {
            bail!("config: vault_path must be set");
        }

        let mut config = config;
        if let Ok(value) = env::var("OLLAMA_BASE_URL") {
            if !value.is_empty() {
                config.embedding.base_url = value;
            }
        }

        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    /// Resolve the provider entry for tagging and insight generation.
    pub fn active_provider(&self) -> Result<&ProviderConfig> {
        self.generation
            .providers
            .get(&self.generation.active_provider)
            .with_context(|| {
                format!(
                    "active provider '{}' is not defined under [generation.providers]",
                    self.generation.active_provider
                )
            })
    }

    /// Resolve the provider entry for summarization, falling back to the
    /// active provider when no dedicated one is configured.
    pub fn summary_provider(&self) -> Result<&ProviderConfig> {
        if self.generation.summary_provider.is_empty() {
            return self.active_provider();
        }
        self.generation
            .providers
            .get(&self.generation.summary_provider)
            .with_context(|| {
                format!(
                    "summary provider '{}' is not defined under [generation.providers]",
                    self.generation.summary_provider
                )
            })
    }

    pub fn vault_root(&self) -> PathBuf {
        PathBuf::from(&self.vault_path)
    }

    pub fn cursor_path(&self) -> PathBuf {
        Path::new(&self.state_dir).join("last_run")
    }

    pub fn allowed_tags_path(&self) -> PathBuf {
        Path::new(&self.state_dir).join("tags.json")
    }

    pub fn forbidden_tags_path(&self) -> PathBuf {
        Path::new(&self.state_dir).join("tags_blacklist.json")
    }
}

/// Replace `${VAR}` placeholders in the raw config text with values from the
/// environment.  Unset variables are left as-is so the TOML error points at
/// the offending placeholder instead of an empty string.
fn expand_env_vars(raw: &str) -> String {
    let pattern = Regex::new(r"\$\{([^}]+)\}").unwrap();
    pattern
        .replace_all(raw, |caps: &regex::Captures<'_>| {
            env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn minimal_toml() -> &'static str {
        r#"
vault_path = "/tmp/vault"

[generation]
active_provider = "main"

[generation.providers.main]
kind = "openai_compatible"
base_url = "http://localhost:8080/v1"
model = "qwen2.5:14b"
temperature = 0.2
"#
    }

    #[test]
    fn load_minimal_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notegarden.toml");
        fs::write(&path, minimal_toml()).unwrap();

        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.vault_path, "/tmp/vault");
        let provider = cfg.active_provider().unwrap();
        assert_eq!(provider.kind, ProviderKind::OpenAiCompatible);
        assert_eq!(provider.model, "qwen2.5:14b");
        // Unspecified sections fall back to defaults.
        assert!(cfg.safety.enable_backup);
        assert_eq!(cfg.safety.retention_days, 7);
        assert_eq!(cfg.limits.tag_content_chars, 3000);
        assert_eq!(cfg.limits.retrieval_k, 3);
    }

    #[test]
    fn load_missing_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        assert!(AppConfig::load_from(dir.path().join("nope.toml")).is_err());
    }

    #[test]
    fn load_rejects_empty_vault_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "state_dir = \".notegarden\"\n").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }

    #[test]
    fn unknown_active_provider_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cfg.toml");
        fs::write(&path, "vault_path = \"/tmp/vault\"\n").unwrap();

        let cfg = AppConfig::load_from(&path).unwrap();
        assert!(cfg.active_provider().is_err());
    }

    #[test]
    fn summary_provider_falls_back_to_active() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cfg.toml");
        fs::write(&path, minimal_toml()).unwrap();

        let cfg = AppConfig::load_from(&path).unwrap();
        let summary = cfg.summary_provider().unwrap();
        assert_eq!(summary.model, "qwen2.5:14b");
    }

    #[test]
    fn env_placeholders_expand_in_string_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cfg.toml");
        fs::write(
            &path,
            r#"
vault_path = "/tmp/vault"

[generation]
active_provider = "main"

[generation.providers.main]
kind = "anthropic"
api_key = "${NOTEGARDEN_TEST_KEY}"
model = "claude-3-5-haiku-latest"
"#,
        )
        .unwrap();

        // SAFETY: test is single-threaded for this env var.
        unsafe { env::set_var("NOTEGARDEN_TEST_KEY", "sk-test-123") };
        let cfg = AppConfig::load_from(&path).unwrap();
        unsafe { env::remove_var("NOTEGARDEN_TEST_KEY") };

        assert_eq!(cfg.active_provider().unwrap().api_key, "sk-test-123");
    }

    #[test]
    fn unset_env_placeholder_is_left_verbatim() {
        assert_eq!(
            expand_env_vars("key = \"${NOTEGARDEN_DOES_NOT_EXIST}\""),
            "key = \"${NOTEGARDEN_DOES_NOT_EXIST}\""
        );
    }

    #[test]
    fn save_and_reload_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub/notegarden.toml");

        let mut cfg = AppConfig::default();
        cfg.vault_path = "/home/notes".to_string();
        cfg.safety.retention_days = 14;
        cfg.limits.enable_summary = false;
        cfg.generation.providers.insert(
            "main".to_string(),
            ProviderConfig {
                kind: ProviderKind::Google,
                model: "gemini-2.0-flash".to_string(),
                ..ProviderConfig::default()
            },
        );

        cfg.save_to(&path).unwrap();
        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.vault_path, "/home/notes");
        assert_eq!(loaded.safety.retention_days, 14);
        assert!(!loaded.limits.enable_summary);
        assert_eq!(
            loaded.generation.providers["main"].kind,
            ProviderKind::Google
        );
    }

    #[test]
    fn state_paths_derive_from_state_dir() {
        let mut cfg = AppConfig::default();
        cfg.state_dir = "/data/ng".to_string();
        assert_eq!(cfg.cursor_path(), PathBuf::from("/data/ng/last_run"));
        assert_eq!(cfg.allowed_tags_path(), PathBuf::from("/data/ng/tags.json"));
        assert_eq!(
            cfg.forbidden_tags_path(),
            PathBuf::from("/data/ng/tags_blacklist.json")
        );
    }

    #[test]
    fn provider_kind_serde_labels() {
        for (kind, label) in [
            (ProviderKind::OpenAi, "\"openai\""),
            (ProviderKind::OpenAiCompatible, "\"openai_compatible\""),
            (ProviderKind::Anthropic, "\"anthropic\""),
            (ProviderKind::Google, "\"google\""),
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, label);
            let back: ProviderKind = serde_json::from_str(&json).unwrap();
            assert_eq!(back, kind);
        }
    }
}
