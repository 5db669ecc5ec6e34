use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An optional backend was not compiled in.
    #[error("{capability} is not available in this build; rebuild with `--features {feature}` to enable it")]
    MissingCapability { capability: String, feature: String },

    #[error("Request to {url} failed{}: {message}", status_suffix(.status))]
    Transport { url: String, status: Option<u16>, message: String },

    #[error("Embedding backend failed: {0}")]
    Backend(String),

    #[error("Tokenization failed: {0}")]
    Tokenizer(String),
}

impl Error {
    pub fn missing_capability(capability: impl Into<String>, feature: impl Into<String>) -> Self {
        Self::MissingCapability { capability: capability.into(), feature: feature.into() }
    }

    pub fn transport(url: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport { url: url.into(), status, message: message.into() }
    }

    /// Whether a retry has any chance of changing the outcome. Client errors
    /// (4xx other than 408 and 429) are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { status: Some(s), .. } if (400..500).contains(s) => matches!(*s, 408 | 429),
            Self::Transport { .. } | Self::Backend(_) => true,
            _ => false,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" with status {s}")).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_permanent_except_timeouts_and_rate_limits() {
        for status in [400, 401, 403, 404, 422] {
            assert!(!Error::transport("http://x", Some(status), "nope").is_transient(), "{status}");
        }
        for status in [408, 429, 500, 502, 503] {
            assert!(Error::transport("http://x", Some(status), "again").is_transient(), "{status}");
        }
        assert!(Error::transport("http://x", None, "connection refused").is_transient());
        assert!(Error::Backend("oom".into()).is_transient());
        assert!(!Error::Tokenizer("bad".into()).is_transient());
    }
}
