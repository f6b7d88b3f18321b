/// Core error type.
///
/// Adapter crates map their specific errors into this type so tool handlers
/// and the bot can report failures consistently.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{service} returned {status}: {message}")]
    Upstream {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// Message suitable for end users (tool results, bot replies).
    ///
    /// Caller mistakes and missing integrations are reported verbatim; the
    /// rest is summarized so upstream bodies do not leak into chat.
    pub fn user_message(&self) -> String {
        match self {
            Error::InvalidArgument(m) | Error::Unavailable(m) | Error::NotFound(m) => m.clone(),
            Error::Upstream {
                service, status, ..
            } => format!("{service} request failed with status {status}"),
            Error::Config(m) => format!("server misconfigured: {m}"),
            other => format!("request failed: {other}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
