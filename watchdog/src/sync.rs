use tracing::debug;

use crate::error::{IndexError, IndicesUnavailable};
use crate::extractor::extract_index;
use crate::fetcher::{endpoint, HttpFetcher};
use crate::types::{NodeSide, SyncVerdict, LAST_INDEX_PATH};

/// Classify the gap between two indices. `tolerance` is inclusive and a
/// local node that is ahead of the reference is always synced.
pub fn judge(local: u64, reference: u64, tolerance: u64) -> SyncVerdict {
    // Both indices are capped at i64::MAX by the extractor
    let diff = reference as i64 - local as i64;
    let synced = diff <= 0 || (diff as u64) <= tolerance;

    SyncVerdict {
        local,
        reference,
        diff,
        tolerance,
        synced,
    }
}

async fn read_index(fetcher: &HttpFetcher, base_url: &str) -> Result<u64, IndexError> {
    let body = fetcher.fetch_ok(&endpoint(base_url, LAST_INDEX_PATH)).await?;
    Ok(extract_index(&body)?)
}

/// Read both indices concurrently and judge the gap.
pub async fn evaluate(
    fetcher: &HttpFetcher,
    local_url: &str,
    reference_url: &str,
    tolerance: u64,
) -> Result<SyncVerdict, IndicesUnavailable> {
    let (local, reference) = tokio::join!(
        read_index(fetcher, local_url),
        read_index(fetcher, reference_url)
    );

    match (local, reference) {
        (Ok(local), Ok(reference)) => {
            debug!("Indices: local={}, reference={}", local, reference);
            Ok(judge(local, reference, tolerance))
        }
        (local, reference) => {
            let mut failures = Vec::new();
            if let Err(e) = local {
                failures.push((NodeSide::Local, e));
            }
            if let Err(e) = reference {
                failures.push((NodeSide::Reference, e));
            }
            Err(IndicesUnavailable { failures })
        }
    }
}
