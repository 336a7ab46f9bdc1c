//! Client for the Ollama generate/embeddings API.
//!
//! Embedding and non-streaming generate requests are awaited to completion.
//! Streaming prompts decode the response body incrementally and report each
//! token as it arrives, either to a callback ([`OllamaClient::stream_prompt`])
//! or over a channel from a background task ([`OllamaClient::spawn_prompt`]).

use super::frames::FrameDecoder;
use super::{Session, StreamEvent};
use crate::error::{RagError, Result};
use futures::{Stream, StreamExt};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Default Ollama API root
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434/api";
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    /// Model used for every embedding request, independent of the chat model
    pub embedding_model: String,
    /// Upper bound for the awaited (non-streaming) requests
    pub request_timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f64>,
    error: Option<String>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    error: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// How a spawned prompt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptOutcome {
    /// Full response text
    Completed(String),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    config: OllamaConfig,
    http: Client,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let mut builder = Client::builder().connect_timeout(Duration::from_secs(10));
        if is_loopback(&config.base_url) {
            builder = builder.no_proxy();
        }
        Ok(Self {
            http: builder.build()?,
            config,
        })
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    /// Embedding vector for `text` from the configured embedding model
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let resp = self
            .http
            .post(self.url("embeddings"))
            .timeout(self.config.request_timeout)
            .json(&EmbeddingRequest {
                model: &self.config.embedding_model,
                prompt: text,
                stream: false,
            })
            .send()
            .await?;

        let data: EmbeddingResponse = read_json(resp).await?;
        if let Some(message) = data.error {
            return Err(RagError::protocol(message));
        }
        if data.embedding.is_empty() {
            return Err(RagError::protocol("response carried no embedding"));
        }
        Ok(data.embedding.into_iter().map(|v| v as f32).collect())
    }

    /// Single-shot completion of `prompt`; no conversation history involved
    pub async fn generate(&self, model: &str, prompt: &str) -> Result<String> {
        let resp = self
            .http
            .post(self.url("generate"))
            .timeout(self.config.request_timeout)
            .json(&GenerateRequest {
                model,
                prompt,
                stream: Some(false),
            })
            .send()
            .await?;

        let data: GenerateResponse = read_json(resp).await?;
        match data.error {
            Some(message) => Err(RagError::protocol(message)),
            None => Ok(data.response),
        }
    }

    /// Send `text` as the next turn of `session` and stream the answer.
    ///
    /// The question is committed to the history once the backend accepts the
    /// request; every token is appended as it arrives. Returns the full
    /// response text after the completion frame.
    pub async fn stream_prompt<F>(
        &self,
        session: &mut Session,
        text: &str,
        mut on_event: F,
    ) -> Result<String>
    where
        F: FnMut(StreamEvent) + Send,
    {
        let prompt = session.prompt_for(text);
        let resp = self
            .http
            .post(self.url("generate"))
            .json(&GenerateRequest {
                model: session.model(),
                prompt: &prompt,
                stream: None,
            })
            .send()
            .await?;
        let resp = check_status(resp).await?;

        session.commit_prompt(prompt);
        consume_stream(resp.bytes_stream(), session, &mut on_event).await
    }

    /// Run [`stream_prompt`](Self::stream_prompt) on a background task.
    ///
    /// The session moves into the task and comes back from
    /// [`PromptHandle::join`]. Dropping the handle cancels the request.
    pub fn spawn_prompt(&self, session: Session, text: impl Into<String>) -> PromptHandle {
        let client = self.clone();
        let text = text.into();
        let fallback = session.clone();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut session = session;
            let token_tx = events_tx.clone();
            let outcome = tokio::select! {
                result = client.stream_prompt(&mut session, &text, move |event| {
                    let _ = token_tx.send(event);
                }) => result.map(PromptOutcome::Completed),
                _ = cancel_rx => Ok(PromptOutcome::Cancelled),
            };

            match &outcome {
                Ok(PromptOutcome::Cancelled) => {
                    log::info!("Prompt cancelled in session {}", session.id())
                }
                Err(e) => {
                    let _ = events_tx.send(StreamEvent::Error(e.to_string()));
                }
                Ok(PromptOutcome::Completed(_)) => {}
            }
            (session, outcome)
        });

        PromptHandle {
            events: events_rx,
            cancel: Some(cancel_tx),
            cancelled: false,
            fallback,
            task,
        }
    }
}

/// A streaming prompt running in the background
pub struct PromptHandle {
    events: mpsc::UnboundedReceiver<StreamEvent>,
    cancel: Option<oneshot::Sender<()>>,
    cancelled: bool,
    fallback: Session,
    task: JoinHandle<(Session, Result<PromptOutcome>)>,
}

impl PromptHandle {
    /// Next event, or `None` once the stream has ended or been cancelled
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        if self.cancelled {
            return None;
        }
        self.events.recv().await
    }

    /// Abort the request. The connection is dropped and no further events
    /// are delivered, including ones already queued.
    pub fn cancel(&mut self) {
        self.cancelled = true;
        self.events.close();
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
    }

    /// Wait for the task and take the session back
    pub async fn join(self) -> (Session, Result<PromptOutcome>) {
        match self.task.await {
            Ok(result) => result,
            Err(e) => (
                self.fallback,
                Err(RagError::protocol(format!("prompt task failed: {}", e))),
            ),
        }
    }
}

/// Decode a streaming generate body into events, appending tokens to the session.
pub(crate) async fn consume_stream<S, B, E, F>(
    body: S,
    session: &mut Session,
    on_event: &mut F,
) -> Result<String>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    RagError: From<E>,
    F: FnMut(StreamEvent),
{
    futures::pin_mut!(body);
    let mut decoder = FrameDecoder::new();
    let mut answer = String::new();

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        for frame in decoder.push(chunk.as_ref())? {
            if let Some(message) = frame.error {
                return Err(RagError::protocol(message));
            }
            if frame.done {
                on_event(StreamEvent::Finished);
                return Ok(answer);
            }
            session.push_response(&frame.response);
            answer.push_str(&frame.response);
            on_event(StreamEvent::Token(frame.response));
        }
    }

    Err(RagError::protocol(format!(
        "stream ended before completion ({} bytes pending)",
        decoder.pending()
    )))
}

async fn check_status(resp: Response) -> Result<Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|b| b.error)
        .unwrap_or(text);
    Err(RagError::Api { status, message })
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let bytes = check_status(resp).await?.bytes().await?;
    serde_json::from_slice(&bytes)
        .map_err(|e| RagError::protocol(format!("invalid response body: {}", e)))
}

fn is_loopback(base_url: &str) -> bool {
    Url::parse(base_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| matches!(h, "localhost" | "127.0.0.1" | "[::1]")))
        .unwrap_or(false)
}
