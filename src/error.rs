use serde::Serialize;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("Database error: {0}")]
    Store(#[from] rusqlite::Error),
    #[error("Malformed vector for {id}: {len} bytes is not a whole number of f32 values")]
    MalformedVector { id: String, len: usize },
    #[error("HTTP error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Data error: {0}")]
    Data(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Document error: {0}")]
    Document(String),
}

/// Coarse classification used by callers that only care about where a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Store,
    Network,
    Protocol,
    Data,
    Io,
}

impl RagError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::Store(_) | RagError::MalformedVector { .. } => ErrorKind::Store,
            RagError::Network(_) | RagError::Api { .. } => ErrorKind::Network,
            RagError::Protocol(_) => ErrorKind::Protocol,
            RagError::Data(_) => ErrorKind::Data,
            RagError::Io(_) | RagError::Document(_) => ErrorKind::Io,
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        RagError::Protocol(message.into())
    }

    pub fn data(message: impl Into<String>) -> Self {
        RagError::Data(message.into())
    }
}

impl Serialize for RagError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RagError>;

type ErrorHook = Arc<dyn Fn(&RagError) + Send + Sync>;

/// Caller-visible error channel.
///
/// Every report is logged; if a hook is installed it also receives the error.
/// Components that must not fail hard (the store, the ingestion loop) report
/// here and hand back an empty result instead.
#[derive(Clone, Default)]
pub struct Reporter {
    hook: Option<ErrorHook>,
}

impl Reporter {
    pub fn new(hook: impl Fn(&RagError) + Send + Sync + 'static) -> Self {
        Self {
            hook: Some(Arc::new(hook)),
        }
    }

    pub fn report(&self, context: &str, err: &RagError) {
        log::error!("{}: {}", context, err);
        if let Some(hook) = &self.hook {
            hook(err);
        }
    }

    /// Unwrap `result`, reporting the error and substituting `fallback`.
    pub fn or_report<T>(&self, context: &str, result: Result<T>, fallback: T) -> T {
        match result {
            Ok(value) => value,
            Err(e) => {
                self.report(context, &e);
                fallback
            }
        }
    }
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_kind_classification() {
        assert_eq!(RagError::data("x").kind(), ErrorKind::Data);
        assert_eq!(RagError::protocol("x").kind(), ErrorKind::Protocol);
        assert_eq!(
            RagError::Api {
                status: 500,
                message: "boom".into()
            }
            .kind(),
            ErrorKind::Network
        );
        assert_eq!(
            RagError::MalformedVector {
                id: "a".into(),
                len: 3
            }
            .kind(),
            ErrorKind::Store
        );
    }

    #[test]
    fn test_reporter_forwards_and_falls_back() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let reporter = Reporter::new(move |e| sink.lock().unwrap().push(e.to_string()));

        let value = reporter.or_report("lookup", Err(RagError::data("bad")), 7);
        assert_eq!(value, 7);
        assert_eq!(reporter.or_report("lookup", Ok(1), 7), 1);
        assert_eq!(seen.lock().unwrap().as_slice(), ["Data error: bad"]);
    }

    #[test]
    fn test_serializes_as_message() {
        let json = serde_json::to_string(&RagError::protocol("eof")).unwrap();
        assert_eq!(json, "\"Protocol error: eof\"");
    }
}
