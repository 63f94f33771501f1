/// How the relay should react to a failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Worth trying again with the next message; the connection stays.
    Transient,
    /// The endpoint is gone or refuses us; the connection is dropped.
    Permanent,
}

impl FailureClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
        }
    }
}

/// 401, 403 and 404 mean the webhook was deleted or its token revoked.
/// Everything else, rate limits and other rejected 4xx included, is transient.
pub fn classify_status(status: u16) -> FailureClass {
    match status {
        401 | 403 | 404 => FailureClass::Permanent,
        _ => FailureClass::Transient,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("webhook responded {status}: {body}")]
    Status { status: u16, body: String },

    #[error("webhook delivery timed out")]
    Timeout,

    #[error("webhook transport error: {message}")]
    Network { message: String },

    #[error("invalid webhook url: {message}")]
    InvalidUrl { message: String },

    #[error("unexpected webhook response: {message}")]
    Decode { message: String },
}

impl DeliveryError {
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn class(&self) -> FailureClass {
        match self {
            Self::Status { status, .. } => classify_status(*status),
            Self::InvalidUrl { .. } => FailureClass::Permanent,
            Self::Timeout | Self::Network { .. } | Self::Decode { .. } => FailureClass::Transient,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.class() == FailureClass::Permanent
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode {
                message: err.to_string(),
            }
        } else {
            Self::network(err.to_string())
        }
    }
}
