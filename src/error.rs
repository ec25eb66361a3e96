//! Error types shared across qbatch.
//!
//! Completion errors are always contained to a single batch slot. Config
//! errors are fatal and abort startup before any batch is accepted.

use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single completion call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompletionError {
    /// Could not reach the endpoint, or the connection failed mid-request.
    #[error("transport error: {0}")]
    Transport(String),

    /// The endpoint answered with a non-success status.
    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    /// The response body could not be decoded.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The response decoded but carried no choices.
    #[error("empty response from model")]
    EmptyResponse,

    /// The caller's cancellation token fired before a response arrived.
    #[error("request cancelled")]
    Cancelled,

    /// The unit of work died without producing a result.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CompletionError::MalformedResponse(err.to_string())
        } else {
            CompletionError::Transport(err.to_string())
        }
    }
}

/// Startup configuration failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "API key not found. Set GROQ_API_KEY (or OPENAI_API_KEY), \
         or add api_key under [completion] in the config file"
    )]
    MissingApiKey,

    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_message_mentions_cancellation() {
        assert!(CompletionError::Cancelled.to_string().contains("cancelled"));
    }

    #[test]
    fn test_upstream_message_includes_status() {
        let err = CompletionError::Upstream {
            status: 401,
            message: "Invalid API Key".to_string(),
        };
        assert_eq!(err.to_string(), "upstream returned 401: Invalid API Key");
    }
}
