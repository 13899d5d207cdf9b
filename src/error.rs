use thiserror::Error;

/// Errors surfaced by the gauge persistence path (§4.11).
///
/// Nothing else in the engine returns a `Result` to its caller: per spec,
/// ingestion is best-effort and a malformed line is logged and dropped,
/// never propagated. See [`crate::parse::BadLine`] for that path's (purely
/// internal, non-propagating) error type.
#[derive(Debug, Error)]
pub enum GaugePersistError {
    #[error("gauge file IO error at {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("gauge file at {path} is not valid JSON")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
