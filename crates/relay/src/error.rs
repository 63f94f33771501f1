#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The relational store failed. The operation is aborted rather than
    /// continuing with partial state.
    #[error("store unavailable: {0}")]
    Store(#[from] hublink_store::Error),

    #[error(transparent)]
    Cache(#[from] hublink_cache::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
