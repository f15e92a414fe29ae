use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub state: StateConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub models: ModelsConfig,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ModelsConfig {
    /// Answer generation (general / RAG / DB explanation).
    #[serde(default)]
    pub primary: String,
    /// Routing and SQL generation; cheap, deterministic calls.
    #[serde(default)]
    pub fast: String,
}

impl ModelsConfig {
    /// Fill in unset model tiers. `fast` defaults to `primary`.
    pub fn apply_defaults(&mut self) {
        if self.primary.is_empty() {
            self.primary = "gemini-2.5-flash".to_string();
        }
        if self.fast.is_empty() {
            self.fast = self.primary.clone();
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,
    /// Vector collections are named `{collection_prefix}{session_id}`.
    #[serde(default = "default_collection_prefix")]
    pub collection_prefix: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Base URL that uploaded files are served from; citation links are
    /// built as `{public_base_url}/{session_id}/{file_name}`.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            qdrant_url: default_qdrant_url(),
            collection_prefix: default_collection_prefix(),
            top_k: default_top_k(),
            public_base_url: default_public_base_url(),
        }
    }
}

fn default_qdrant_url() -> String {
    "http://localhost:6333".to_string()
}

fn default_collection_prefix() -> String {
    "session_".to_string()
}

fn default_top_k() -> usize {
    5
}

fn default_public_base_url() -> String {
    "http://localhost:8000/uploads".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    /// Root for per-session persisted state (database connection records).
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> String {
    "./data".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file and apply model-tier defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))?;
        let mut config: AppConfig = toml::from_str(&content)?;
        config.provider.models.apply_defaults();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let toml = r#"
            [provider]
            api_key = "sk-test"
        "#;
        let mut config: AppConfig = toml::from_str(toml).unwrap();
        config.provider.models.apply_defaults();

        assert_eq!(config.provider.base_url, "https://api.openai.com/v1");
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.collection_prefix, "session_");
        assert_eq!(config.state.data_dir, "./data");
        assert!(!config.provider.models.primary.is_empty());
        assert_eq!(config.provider.models.fast, config.provider.models.primary);
    }

    #[test]
    fn fast_model_defaults_to_primary() {
        let mut models = ModelsConfig {
            primary: "big-model".to_string(),
            fast: String::new(),
        };
        models.apply_defaults();
        assert_eq!(models.fast, "big-model");
    }
}
