use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::types::NodeSide;

/// Failure to obtain a response from an endpoint.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("GET {url} timed out after {}s", .timeout.as_secs())]
    Timeout { url: String, timeout: Duration },

    #[error("GET {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("GET {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("GET {url} body exceeds {limit} bytes")]
    TooLarge { url: String, limit: usize },
}

/// Response body could not be turned into an index. The watchdog treats all
/// variants alike; they only differ in what gets logged.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("body is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("field `{0}` is missing")]
    MissingField(&'static str),

    #[error("field `{field}` is not a non-negative integer: {value}")]
    NotAnIndex {
        field: &'static str,
        value: serde_json::Value,
    },
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extract(#[from] ExtractionError),
}

/// One or both index readings failed.
#[derive(Debug)]
pub struct IndicesUnavailable {
    pub failures: Vec<(NodeSide, IndexError)>,
}

impl fmt::Display for IndicesUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (side, err)) in self.failures.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{} index unavailable: {}", side, err)?;
        }
        Ok(())
    }
}

impl std::error::Error for IndicesUnavailable {}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("invalid URL for `{key}` ({value}): {reason}")]
    InvalidUrl {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid node identifier {0:?}: must be non-empty and contain no whitespace")]
    InvalidNodeId(String),

    #[error("restart command must name a program")]
    EmptyRestartCommand,

    #[error("`{0}` must be greater than zero")]
    ZeroDuration(&'static str),
}
