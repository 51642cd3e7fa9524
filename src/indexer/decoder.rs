use alloy::rpc::types::Log;

use super::schema::EventRegistry;
use super::types::DecodedEvent;

/// Decode every log that matches a registered schema, preserving input order.
///
/// Logs with an unknown topic[0], or whose topics/data do not fit the matched
/// schema, are dropped. Feed contracts emit more than one event type, so this
/// is expected rather than an error.
pub fn decode_logs(logs: &[Log], registry: &EventRegistry) -> Vec<DecodedEvent> {
    let mut events = Vec::with_capacity(logs.len());
    let mut dropped = 0usize;

    for log in logs {
        match try_decode_log(log, registry) {
            Some(evt) => events.push(evt),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        tracing::debug!(
            dropped,
            decoded = events.len(),
            "Dropped logs not matching any known event"
        );
    }
    events
}

fn try_decode_log(log: &Log, registry: &EventRegistry) -> Option<DecodedEvent> {
    let topics = log.inner.data.topics();
    let sig = topics.first()?;
    let schema = registry.lookup(sig)?;
    let fields = schema.decode(log)?;

    Some(DecodedEvent {
        schema: schema.name,
        fields,
        block_number: log.block_number.unwrap_or(0),
        tx_hash: log.transaction_hash.unwrap_or_default(),
        log_index: log.log_index.unwrap_or(0),
    })
}
