use {hublink_common::FromMessage, thiserror::Error};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// A stored column held a value the domain types reject.
    #[error(transparent)]
    Common(#[from] hublink_common::Error),

    #[error("hub {hub_id} already has the maximum of {max} block-word rules")]
    RuleLimit { hub_id: String, max: usize },

    #[error("{message}")]
    Message { message: String },
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

hublink_common::impl_context!();
