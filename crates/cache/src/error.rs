#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The backing cache could not be reached.
    #[error("cache unavailable: {message}")]
    Unavailable { message: String },

    #[error("key {key:?} holds a {found}, expected a {expected}")]
    WrongType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("field {field:?} of {key:?} is not an integer")]
    NotAnInteger { key: String, field: String },
}

impl Error {
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
