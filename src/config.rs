use crate::chunker::ChunkConfig;
use crate::db::Database;
use crate::error::{RagError, Result};
use crate::index::IndexKind;
use crate::llm::ollama::{DEFAULT_BASE_URL, DEFAULT_EMBEDDING_MODEL};
use crate::llm::OllamaConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_GENERATION_MODEL: &str = "llama3";

/// Keys accepted in the `settings` table
pub const SETTING_KEYS: &[&str] = &[
    "base_url",
    "generation_model",
    "embedding_model",
    "chunk_length",
    "chunk_overlap",
    "top_k",
    "request_timeout_secs",
    "index",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub base_url: String,
    pub generation_model: String,
    pub embedding_model: String,
    pub chunk_length: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub request_timeout_secs: u64,
    pub index: IndexKind,
}

impl Default for RagConfig {
    fn default() -> Self {
        let chunk = ChunkConfig::default();
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            chunk_length: chunk.chunk_length,
            chunk_overlap: chunk.overlap,
            top_k: 5,
            request_timeout_secs: 120,
            index: IndexKind::Linear,
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| RagError::data(format!("Invalid value for {}: {}", key, value)))
}

impl RagConfig {
    /// Defaults overlaid with whatever is persisted in the settings table
    pub fn from_settings(db: &Database) -> Result<Self> {
        let mut config = Self::default();
        for key in SETTING_KEYS {
            if let Some(value) = db.get_setting(key)? {
                config.apply(key, &value)?;
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Set one field from its string form
    pub fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "base_url" => self.base_url = value.to_string(),
            "generation_model" => self.generation_model = value.to_string(),
            "embedding_model" => self.embedding_model = value.to_string(),
            "chunk_length" => self.chunk_length = parse_number(key, value)?,
            "chunk_overlap" => self.chunk_overlap = parse_number(key, value)?,
            "top_k" => self.top_k = parse_number(key, value)?,
            "request_timeout_secs" => self.request_timeout_secs = parse_number(key, value)?,
            "index" => self.index = value.parse().map_err(RagError::Data)?,
            _ => return Err(RagError::data(format!("Unknown setting key: {}", key))),
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.chunk_config().validate()?;
        if self.top_k == 0 {
            return Err(RagError::data("top_k must be at least 1"));
        }
        Ok(())
    }

    pub fn chunk_config(&self) -> ChunkConfig {
        ChunkConfig {
            chunk_length: self.chunk_length,
            overlap: self.chunk_overlap,
        }
    }

    pub fn ollama_config(&self) -> OllamaConfig {
        OllamaConfig {
            base_url: self.base_url.clone(),
            embedding_model: self.embedding_model.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}
