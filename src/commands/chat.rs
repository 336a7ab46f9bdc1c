use super::Rag;
use crate::db::models::{document_name, SearchResult};
use crate::error::Result;
use crate::llm::{Session, StreamEvent};
use serde::Serialize;

const PROMPT_TEMPLATE: &str = "Answer the question based only on the following context:\n\n{context}\n\n---\n\nAnswer only the question based on the above context and do not start a conversation: {question}";

/// A retrieved chunk the answer was grounded on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    pub chunk_id: String,
    pub sequence: i64,
}

impl Citation {
    /// Display form of the chunk id, e.g. `my-report.pdf:2:0` -> `myreport:2:0`
    pub fn label(&self) -> String {
        self.chunk_id.replace(".pdf", "").replace('-', "")
    }

    pub fn markdown(&self) -> String {
        format!("[{}]({})", self.label(), self.sequence)
    }

    pub fn document(&self) -> &str {
        document_name(&self.chunk_id)
    }
}

impl From<&SearchResult> for Citation {
    fn from(result: &SearchResult) -> Self {
        Self {
            chunk_id: result.chunk_id.clone(),
            sequence: result.sequence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<Citation>,
}

impl Answer {
    pub fn sources_markdown(&self) -> String {
        sources_markdown(&self.sources)
    }
}

/// Citations as one line of markdown links
pub fn sources_markdown(sources: &[Citation]) -> String {
    sources
        .iter()
        .map(Citation::markdown)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn build_prompt(question: &str, results: &[SearchResult]) -> String {
    let context: String = results
        .iter()
        .map(|r| format!("{}\n\n", r.text))
        .collect();
    PROMPT_TEMPLATE
        .replace("{context}", &context)
        .replace("{question}", question)
}

/// A question made ready for generation: the filled-in prompt and the chunks
/// it was built from
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedQuestion {
    pub prompt: String,
    pub sources: Vec<Citation>,
}

/// Embed `question`, rank stored chunks and fill the prompt template.
pub async fn prepare(rag: &Rag, question: &str) -> Result<PreparedQuestion> {
    let embedding = rag.client.embed(question).await?;
    let results = rag.store.find_documents(&embedding, rag.config.top_k);
    log::debug!("{} context chunk(s) for the question", results.len());

    Ok(PreparedQuestion {
        prompt: build_prompt(question, &results),
        sources: results.iter().map(Citation::from).collect(),
    })
}

/// Answer `question` from the knowledge base as the next turn of `session`.
///
/// Tokens are passed to `on_event` as they stream in. If the question cannot
/// be embedded the session is left as it was.
pub async fn ask<F>(
    rag: &Rag,
    session: &mut Session,
    question: &str,
    on_event: F,
) -> Result<Answer>
where
    F: FnMut(StreamEvent) + Send,
{
    let prepared = prepare(rag, question).await?;
    let text = rag
        .client
        .stream_prompt(session, &prepared.prompt, on_event)
        .await?;

    Ok(Answer {
        text,
        sources: prepared.sources,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RagConfig;
    use crate::db::Database;
    use crate::error::{RagError, Reporter};
    use crate::llm::ollama::tests::{fake_ollama, Reply};
    use crate::llm::OllamaClient;

    fn rag(client: OllamaClient, top_k: usize) -> Rag {
        let config = RagConfig {
            top_k,
            ..Default::default()
        };
        let rag = Rag::with_client(
            Database::open_in_memory().unwrap(),
            client,
            config,
            Reporter::default(),
        );
        rag.store.add_document("cats.pdf:1:0", "Cats purr.", &[1.0, 0.0, 0.0]);
        rag.store.add_document("dogs.pdf:1:0", "Dogs bark.", &[0.8, 0.6, 0.0]);
        rag.store.add_document("fish.pdf:1:0", "Fish swim.", &[0.0, 0.0, 1.0]);
        rag
    }

    #[test]
    fn test_citation_label() {
        let citation = Citation {
            chunk_id: "my-report.pdf:2:0".into(),
            sequence: 7,
        };
        assert_eq!(citation.label(), "myreport:2:0");
        assert_eq!(citation.markdown(), "[myreport:2:0](7)");
        assert_eq!(citation.document(), "my-report.pdf");
    }

    #[test]
    fn test_prompt_layout() {
        let results = vec![SearchResult {
            chunk_id: "a:1:0".into(),
            text: "ctx".into(),
            sequence: 1,
            score: 1.0,
        }];
        assert_eq!(
            build_prompt("why?", &results),
            "Answer the question based only on the following context:\n\nctx\n\n\n\n---\n\nAnswer only the question based on the above context and do not start a conversation: why?"
        );
    }

    #[tokio::test]
    async fn test_ask_uses_top_k_context() {
        let (client, requests) = fake_ollama(vec![
            Reply::ok(&["{\"embedding\":[1.0,0.1,0.0]}"]),
            Reply::ok(&[
                "{\"response\":\"They purr\",\"done\":false}\n",
                "{\"done\":true}\n",
            ]),
        ])
        .await;
        let rag = rag(client, 2);
        let mut session = Session::new("llama3");
        let mut tokens = Vec::new();

        let answer = ask(&rag, &mut session, "What do cats do?", |e| {
            if let StreamEvent::Token(t) = e {
                tokens.push(t);
            }
        })
        .await
        .unwrap();

        assert_eq!(answer.text, "They purr");
        assert_eq!(tokens, vec!["They purr"]);
        assert_eq!(answer.sources_markdown(), "[cats:1:0](1) [dogs:1:0](2)");

        let requests = requests.lock().unwrap();
        assert_eq!(requests[0]["prompt"], "What do cats do?");
        let prompt = requests[1]["prompt"].as_str().unwrap();
        assert!(prompt.starts_with("Prompter:Answer the question"));
        assert!(prompt.contains("Cats purr.\n\nDogs bark.\n\n"));
        assert!(!prompt.contains("Fish"));
        assert!(session.history().ends_with("AI:They purr"));
    }

    #[tokio::test]
    async fn test_prepared_question_runs_in_background() {
        let (client, requests) = fake_ollama(vec![
            Reply::ok(&["{\"embedding\":[0.0,0.1,1.0]}"]),
            Reply::ok(&["{\"response\":\"Fins\",\"done\":false}\n{\"done\":true}\n"]),
        ])
        .await;
        let rag = rag(client, 1);

        let prepared = prepare(&rag, "How do fish move?").await.unwrap();
        assert_eq!(prepared.sources.len(), 1);
        assert_eq!(prepared.sources[0].chunk_id, "fish.pdf:1:0");

        let mut handle = rag
            .client
            .spawn_prompt(Session::new("llama3"), prepared.prompt.clone());
        let mut events = Vec::new();
        while let Some(event) = handle.next_event().await {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![StreamEvent::Token("Fins".into()), StreamEvent::Finished]
        );
        let (session, outcome) = handle.join().await;
        assert!(outcome.is_ok());
        assert!(session.history().ends_with("AI:Fins"));
        assert!(requests.lock().unwrap()[1]["prompt"]
            .as_str()
            .unwrap()
            .contains("Fish swim."));
    }

    #[tokio::test]
    async fn test_failed_embedding_leaves_session() {
        let (client, requests) = fake_ollama(vec![Reply {
            status: 500,
            pieces: vec![b"{\"error\":\"embedding model missing\"}".to_vec()],
            hold_open: false,
        }])
        .await;
        let rag = rag(client, 2);
        let mut session = Session::new("llama3");

        let err = ask(&rag, &mut session, "anything", |_| {}).await.unwrap_err();
        assert!(matches!(err, RagError::Api { status: 500, .. }));
        assert!(session.history().is_empty());
        assert_eq!(requests.lock().unwrap().len(), 1);
    }
}
