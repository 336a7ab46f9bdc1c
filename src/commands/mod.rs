pub mod chat;
pub mod knowledge;
pub mod settings;

use crate::config::RagConfig;
use crate::db::Database;
use crate::error::{Reporter, Result};
use crate::llm::OllamaClient;
use crate::store::EmbeddingStore;

/// Everything one pipeline needs: the store, the backend client and the
/// resolved configuration. Single owner; not meant to be shared between
/// concurrent pipelines.
pub struct Rag {
    pub store: EmbeddingStore,
    pub client: OllamaClient,
    pub config: RagConfig,
}

impl Rag {
    pub fn new(db: Database, config: RagConfig, reporter: Reporter) -> Result<Self> {
        let client = OllamaClient::new(config.ollama_config())?;
        Ok(Self::with_client(db, client, config, reporter))
    }

    pub fn with_client(
        db: Database,
        client: OllamaClient,
        config: RagConfig,
        reporter: Reporter,
    ) -> Self {
        let store = EmbeddingStore::with_index(db, config.index.build(), reporter);
        Self {
            store,
            client,
            config,
        }
    }

    pub fn reporter(&self) -> &Reporter {
        self.store.reporter()
    }
}
