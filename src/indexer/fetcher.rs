use alloy::primitives::{Address, B256};
use alloy::rpc::types::Log;

use super::endpoint::{ChainEndpoint, LogQueryError};
use crate::config::FetchConfig;

/// How the fallback path carves up a rejected range.
#[derive(Debug, Clone, Copy)]
pub struct FetchPolicy {
    pub batch_size: u64,
    pub max_split_depth: u32,
}

impl From<&FetchConfig> for FetchPolicy {
    fn from(config: &FetchConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_split_depth: config.max_split_depth,
        }
    }
}

/// Fetch every log for `address` in `[from_block, to_block]`, resolving `to_block`
/// to the current head when omitted.
///
/// One query is tried over the whole range. If the endpoint rejects it as too
/// large, the range is re-fetched in consecutive windows of `batch_size` blocks
/// starting at `max(from_block, deployment_floor)`, and results are concatenated
/// in block order. A failing window aborts the fetch unless `max_split_depth`
/// allows it to be halved.
pub async fn fetch_logs<E: ChainEndpoint>(
    endpoint: &E,
    address: Address,
    topics: &[B256],
    from_block: u64,
    to_block: Option<u64>,
    policy: &FetchPolicy,
) -> eyre::Result<Vec<Log>> {
    let to_block = match to_block {
        Some(b) => b,
        None => endpoint.head_block().await?,
    };

    if from_block > to_block {
        tracing::debug!(
            endpoint = endpoint.name(),
            from_block,
            to_block,
            "Start block past chain head, nothing to fetch"
        );
        return Ok(Vec::new());
    }

    match endpoint.get_logs(address, topics, from_block, to_block).await {
        Ok(logs) => Ok(logs),
        Err(LogQueryError::TooLarge(reason)) => {
            tracing::info!(
                endpoint = endpoint.name(),
                %address,
                from = from_block,
                to = to_block,
                reason = %reason,
                "Full-range log query rejected, falling back to batched windows"
            );
            fetch_in_windows(endpoint, address, topics, from_block, to_block, policy).await
        }
        Err(LogQueryError::Fatal(e)) => Err(e.wrap_err(format!(
            "Failed to fetch logs for {} on '{}' ({}-{})",
            address,
            endpoint.name(),
            from_block,
            to_block
        ))),
    }
}

/// Inclusive `[start, end]` windows of at most `batch_size` blocks covering `[from, to]`.
pub fn block_windows(from: u64, to: u64, batch_size: u64) -> Vec<(u64, u64)> {
    let mut windows = Vec::new();
    if batch_size == 0 || from > to {
        return windows;
    }

    let mut start = from;
    loop {
        let end = start.saturating_add(batch_size - 1).min(to);
        windows.push((start, end));
        if end >= to {
            break;
        }
        start = end + 1;
    }
    windows
}

async fn fetch_in_windows<E: ChainEndpoint>(
    endpoint: &E,
    address: Address,
    topics: &[B256],
    from_block: u64,
    to_block: u64,
    policy: &FetchPolicy,
) -> eyre::Result<Vec<Log>> {
    let start = from_block.max(endpoint.deployment_floor());
    if start > to_block {
        // The range held too many logs, so an empty result here would be wrong.
        return Err(eyre::eyre!(
            "Log query {}-{} for {} on '{}' was rejected, but deployment floor {} leaves no window to retry",
            from_block,
            to_block,
            address,
            endpoint.name(),
            endpoint.deployment_floor()
        ));
    }
    let windows = block_windows(start, to_block, policy.batch_size);

    // Stack of (from, to, split depth); popped in increasing block order.
    let mut pending: Vec<(u64, u64, u32)> =
        windows.into_iter().rev().map(|(lo, hi)| (lo, hi, 0)).collect();
    let mut logs = Vec::new();

    while let Some((lo, hi, depth)) = pending.pop() {
        tracing::info!(
            endpoint = endpoint.name(),
            from = lo,
            to = hi,
            depth,
            "Fetching log window"
        );

        match endpoint.get_logs(address, topics, lo, hi).await {
            Ok(batch) => {
                logs.extend(batch);
                if !logs.is_empty() {
                    tracing::info!(total = logs.len(), "Total logs count");
                }
            }
            Err(LogQueryError::TooLarge(reason)) if depth < policy.max_split_depth && lo < hi => {
                let mid = lo + (hi - lo) / 2;
                tracing::warn!(
                    endpoint = endpoint.name(),
                    from = lo,
                    to = hi,
                    reason = %reason,
                    "Log window rejected, halving"
                );
                pending.push((mid + 1, hi, depth + 1));
                pending.push((lo, mid, depth + 1));
            }
            Err(LogQueryError::TooLarge(reason)) => {
                return Err(eyre::eyre!(
                    "Log window {}-{} for {} on '{}' rejected: {}",
                    lo,
                    hi,
                    address,
                    endpoint.name(),
                    reason
                ));
            }
            Err(LogQueryError::Fatal(e)) => {
                return Err(e.wrap_err(format!(
                    "Log window {}-{} for {} on '{}' failed",
                    lo,
                    hi,
                    address,
                    endpoint.name()
                )));
            }
        }
    }

    Ok(logs)
}
