//! Shared error and result types for Gazette.

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, GazetteError>;

/// Errors surfaced by Gazette components
///
/// No variant is fatal to the pipeline; the unit of failure isolation is a
/// single event. External-call failures (identity, renderer) are handled
/// locally and normally never reach callers as errors.
#[derive(Debug, thiserror::Error)]
pub enum GazetteError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Artwork renderer error: {0}")]
    Renderer(String),

    #[error("Event feed error: {0}")]
    Feed(String),
}

impl From<bson::ser::Error> for GazetteError {
    fn from(e: bson::ser::Error) -> Self {
        GazetteError::Serialization(format!("BSON encode failed: {e}"))
    }
}

impl From<bson::de::Error> for GazetteError {
    fn from(e: bson::de::Error) -> Self {
        GazetteError::Serialization(format!("BSON decode failed: {e}"))
    }
}
