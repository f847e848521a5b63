use std::fmt;
use tracing::debug;

use crate::error::{ConfigError, FetchError};
use crate::fetcher::{endpoint, HttpFetcher};
use crate::types::{MatchPolicy, RegistryStatus, REGISTRY_NODES_PATH};

/// Identifier this node is listed under in the registry, usually its
/// hostname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentifier(String);

impl NodeIdentifier {
    pub fn new(id: impl Into<String>) -> Result<Self, ConfigError> {
        let id = id.into();
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidNodeId(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-sensitive search for this identifier in a registry listing.
    pub fn is_listed_in(&self, listing: &str, policy: MatchPolicy) -> bool {
        match policy {
            MatchPolicy::Substring => listing.contains(self.as_str()),
            MatchPolicy::Token => contains_token(listing, self.as_str()),
        }
    }
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_hostname_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_')
}

/// True if `needle` occurs in `haystack` with no hostname character directly
/// before or after it. A `.` right after the match is accepted so a short
/// hostname still matches its FQDN.
fn contains_token(haystack: &str, needle: &str) -> bool {
    let bytes = haystack.as_bytes();
    let step = needle.chars().next().map_or(1, char::len_utf8);
    let mut from = 0;

    while let Some(pos) = haystack[from..].find(needle) {
        let start = from + pos;
        let end = start + needle.len();

        let before_ok = start == 0 || !is_hostname_byte(bytes[start - 1]);
        let after_ok = end == bytes.len()
            || bytes[end] == b'.'
            || !is_hostname_byte(bytes[end]);
        if before_ok && after_ok {
            return true;
        }

        from = start + step;
    }

    false
}

/// Query `<registry_url>/nodes` and look for `node` in the listing.
pub async fn check_registry(
    fetcher: &HttpFetcher,
    registry_url: &str,
    node: &NodeIdentifier,
    policy: MatchPolicy,
) -> Result<RegistryStatus, FetchError> {
    let url = endpoint(registry_url, REGISTRY_NODES_PATH);
    let resp = fetcher.fetch(&url).await?;

    if !resp.is_success() {
        return Ok(RegistryStatus::Unavailable {
            status: resp.status,
        });
    }

    let present = node.is_listed_in(&resp.text(), policy);
    debug!(
        "Registry listing {} bytes, node {} present={} (policy={})",
        resp.body.len(),
        node,
        present,
        policy
    );

    Ok(RegistryStatus::Listed {
        status: resp.status,
        present,
    })
}
