use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The prompt or the response is blocked by the provider.
    Moderated,
    /// The model provider is rate limited.
    RateLimitExceeded,
    /// The provider answered with something we cannot understand.
    MalformedResponse,
    /// Any other errors.
    Other,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Moderated => write!(f, "Moderated"),
            ErrorKind::RateLimitExceeded => write!(f, "Rate limit exceeded"),
            ErrorKind::MalformedResponse => write!(f, "Malformed response"),
            ErrorKind::Other => write!(f, "Other"),
        }
    }
}
