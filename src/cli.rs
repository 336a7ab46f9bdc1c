use crate::commands::{chat, knowledge, settings, Rag};
use crate::config::RagConfig;
use crate::db::Database;
use crate::doc_processor::load_dir;
use crate::error::{Reporter, Result};
use crate::index::IndexKind;
use crate::llm::{PromptOutcome, Session, StreamEvent};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(
    name = "rag-box",
    version,
    about = "Ask questions about a folder of documents using a local Ollama server"
)]
pub struct Cli {
    /// Directory holding embeddings.db
    #[arg(long, global = true, env = "RAG_BOX_DATA_DIR", default_value = ".rag-box")]
    pub data_dir: PathBuf,

    /// Ollama API root
    #[arg(long, global = true, env = "RAG_BOX_BASE_URL")]
    pub base_url: Option<String>,

    /// Model used to generate answers
    #[arg(long, global = true, env = "RAG_BOX_MODEL")]
    pub model: Option<String>,

    /// Model used for chunk and question embeddings
    #[arg(long, global = true, env = "RAG_BOX_EMBEDDING_MODEL")]
    pub embedding_model: Option<String>,

    /// Number of chunks passed as context
    #[arg(long, global = true, env = "RAG_BOX_TOP_K")]
    pub top_k: Option<usize>,

    /// Maximum chunk length in characters
    #[arg(long, global = true, env = "RAG_BOX_CHUNK_LENGTH")]
    pub chunk_length: Option<usize>,

    #[arg(long, global = true, env = "RAG_BOX_CHUNK_OVERLAP")]
    pub chunk_overlap: Option<usize>,

    #[arg(long, global = true, env = "RAG_BOX_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,

    /// Similarity search strategy (linear or binary)
    #[arg(long, global = true, env = "RAG_BOX_INDEX")]
    pub index: Option<IndexKind>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ingest every .pdf, .txt and .md file in a directory
    Ingest { dir: PathBuf },
    /// Answer one question
    Ask { question: String },
    /// Interactive conversation; /reset, /model <name> and /quit are understood
    Chat,
    /// Show the chunks closest to a query
    Search { query: String },
    /// List ingested documents
    Collections,
    /// Print a stored chunk by sequence number
    Show { sequence: i64 },
    /// Delete a chunk by id
    Remove { id: String },
    /// Read or change persisted settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum SettingsAction {
    Get,
    Set { key: String, value: String },
    Delete { key: String },
}

impl Cli {
    /// Flags and environment variables that override persisted settings
    fn overrides(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        if let Some(v) = &self.base_url {
            out.push(("base_url", v.clone()));
        }
        if let Some(v) = &self.model {
            out.push(("generation_model", v.clone()));
        }
        if let Some(v) = &self.embedding_model {
            out.push(("embedding_model", v.clone()));
        }
        if let Some(v) = self.top_k {
            out.push(("top_k", v.to_string()));
        }
        if let Some(v) = self.chunk_length {
            out.push(("chunk_length", v.to_string()));
        }
        if let Some(v) = self.chunk_overlap {
            out.push(("chunk_overlap", v.to_string()));
        }
        if let Some(v) = self.request_timeout_secs {
            out.push(("request_timeout_secs", v.to_string()));
        }
        if let Some(v) = self.index {
            out.push(("index", v.to_string()));
        }
        out
    }

    pub fn resolve_config(&self, db: &Database) -> Result<RagConfig> {
        let mut config = RagConfig::from_settings(db)?;
        for (key, value) in self.overrides() {
            config.apply(key, &value)?;
        }
        config.validate()?;
        Ok(config)
    }
}

pub async fn execute(cli: Cli) -> Result<()> {
    let db = Database::new(&cli.data_dir)?;

    // settings are edited before a full config is resolved so a bad stored
    // value can still be repaired
    if let Command::Settings { action } = &cli.command {
        return match action {
            SettingsAction::Get => {
                for (key, value) in settings::get_settings(&db)? {
                    println!("{} = {}", key, value);
                }
                Ok(())
            }
            SettingsAction::Set { key, value } => settings::set_setting(&db, key, value),
            SettingsAction::Delete { key } => settings::delete_setting(&db, key),
        };
    }

    let config = cli.resolve_config(&db)?;
    let rag = Rag::new(db, config, Reporter::default())?;

    match cli.command {
        Command::Ingest { dir } => {
            let docs = load_dir(&dir)?;
            let summary = knowledge::ingest_all(&rag, docs).await;
            println!(
                "{} ingested, {} already present, {} failed, {} chunks stored",
                summary.ingested, summary.skipped, summary.failed, summary.chunks_stored
            );
        }
        Command::Ask { question } => {
            let mut session = Session::new(rag.config.generation_model.clone());
            answer(&rag, &mut session, &question).await?;
        }
        Command::Chat => chat_loop(&rag).await?,
        Command::Search { query } => {
            for result in knowledge::search_knowledge_base(&rag, &query, None).await? {
                println!(
                    "[{}] {} ({:.4})\n{}\n",
                    result.sequence, result.chunk_id, result.score, result.text
                );
            }
        }
        Command::Collections => {
            for (i, name) in rag.store.list_collections().iter().enumerate() {
                println!("{:>4}  {}", i, name);
            }
        }
        Command::Show { sequence } => match rag.store.document_at(sequence) {
            Some(chunk) => println!("{} ({})\n\n{}", chunk.id, chunk.document_name(), chunk.text),
            None => println!("No chunk with sequence {}", sequence),
        },
        Command::Remove { id } => {
            if rag.store.remove_document(&id) {
                println!("Removed {}", id);
            } else {
                println!("Could not remove {}; see the log for the database error", id);
            }
        }
        Command::Settings { .. } => {}
    }
    Ok(())
}

/// Stream one answer to stdout, then its sources. Ctrl-C cancels the
/// request; tokens already printed stay in the session history.
async fn answer(rag: &Rag, session: &mut Session, question: &str) -> Result<()> {
    let prepared = chat::prepare(rag, question).await?;
    let mut handle = rag.client.spawn_prompt(session.clone(), prepared.prompt);

    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(StreamEvent::Token(token)) => {
                    print!("{}", token);
                    let _ = std::io::stdout().flush();
                }
                Some(StreamEvent::Finished) | Some(StreamEvent::Error(_)) | None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                handle.cancel();
                println!("\n[cancelled]");
                break;
            }
        }
    }

    let (returned, outcome) = handle.join().await;
    *session = returned;
    match outcome? {
        PromptOutcome::Completed(_) => {
            println!();
            if !prepared.sources.is_empty() {
                println!("Sources: {}", chat::sources_markdown(&prepared.sources));
            }
        }
        PromptOutcome::Cancelled => {}
    }
    Ok(())
}

async fn chat_loop(rag: &Rag) -> Result<()> {
    let mut session = Session::new(rag.config.generation_model.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" => break,
            "/reset" => {
                session = session.reset();
                continue;
            }
            _ => {}
        }
        if let Some(model) = line.strip_prefix("/model ") {
            if let Some(next) = session.switch_model(model.trim()) {
                session = next;
            }
            continue;
        }

        if let Err(e) = answer(rag, &mut session, line).await {
            rag.reporter().report("Question failed", &e);
        }
    }
    Ok(())
}
