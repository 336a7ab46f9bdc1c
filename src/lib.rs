pub mod chunker;
pub mod cli;
pub mod commands;
pub mod config;
pub mod db;
pub mod doc_processor;
pub mod embedding;
pub mod error;
pub mod index;
pub mod llm;
pub mod store;

pub use commands::Rag;
pub use config::RagConfig;
pub use error::{RagError, Reporter, Result};
pub use llm::{OllamaClient, Session, StreamEvent};
pub use store::EmbeddingStore;

use clap::Parser;

/// Install the env_logger backend; `RUST_LOG` overrides the `info` default.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

pub async fn run() {
    init_logging();
    let cli = cli::Cli::parse();
    if let Err(e) = cli::execute(cli).await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
