use alloy::primitives::B256;
use alloy::rpc::types::Log;
use alloy::sol;
use alloy::sol_types::SolEvent;
use std::collections::HashSet;
use std::fmt;

use super::types::EventFields;

// Events emitted by the Chainlink aggregator behind each price feed proxy.
sol! {
    #[sol(rpc)]
    interface AggregatorV3 {
        function decimals() external view returns (uint8);

        event AnswerUpdated(int256 indexed current, uint256 indexed roundId, uint256 updatedAt);

        event NewRound(uint256 indexed roundId, address indexed startedBy, uint256 startedAt);
    }
}

pub use AggregatorV3::{AnswerUpdated, NewRound};

/// Decoding layout for one event type.
#[derive(Clone)]
pub struct EventSchema {
    pub name: &'static str,
    pub signature: &'static str,
    pub selector: B256,
    /// Signature topic plus indexed fields.
    pub topic_count: usize,
    /// Non-indexed fields, one 32-byte word each.
    pub data_words: usize,
    decode: fn(&Log) -> Option<EventFields>,
}

impl fmt::Debug for EventSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSchema")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("selector", &self.selector)
            .finish()
    }
}

impl EventSchema {
    /// Decode a log against this schema. `None` on any arity or ABI mismatch.
    pub fn decode(&self, log: &Log) -> Option<EventFields> {
        let topics = log.inner.data.topics();
        if topics.len() != self.topic_count || topics[0] != self.selector {
            return None;
        }
        if log.inner.data.data.len() != self.data_words * 32 {
            return None;
        }
        (self.decode)(log)
    }
}

fn decode_answer_updated(log: &Log) -> Option<EventFields> {
    let decoded = AnswerUpdated::decode_log(&log.inner).ok()?;
    Some(EventFields::AnswerUpdated {
        current: decoded.current,
        round_id: decoded.roundId,
        updated_at: decoded.updatedAt,
    })
}

fn decode_new_round(log: &Log) -> Option<EventFields> {
    let decoded = NewRound::decode_log(&log.inner).ok()?;
    Some(EventFields::NewRound {
        round_id: decoded.roundId,
        started_by: decoded.startedBy,
        started_at: decoded.startedAt,
    })
}

pub fn answer_updated_schema() -> EventSchema {
    EventSchema {
        name: "AnswerUpdated",
        signature: AnswerUpdated::SIGNATURE,
        selector: AnswerUpdated::SIGNATURE_HASH,
        topic_count: 3,
        data_words: 1,
        decode: decode_answer_updated,
    }
}

pub fn new_round_schema() -> EventSchema {
    EventSchema {
        name: "NewRound",
        signature: NewRound::SIGNATURE,
        selector: NewRound::SIGNATURE_HASH,
        topic_count: 3,
        data_words: 1,
        decode: decode_new_round,
    }
}

/// Ordered set of event schemas, keyed by topic[0].
#[derive(Debug, Clone)]
pub struct EventRegistry {
    schemas: Vec<EventSchema>,
}

impl EventRegistry {
    /// Build a registry. Two schemas sharing a selector is a configuration error.
    pub fn new(schemas: Vec<EventSchema>) -> eyre::Result<Self> {
        let mut seen = HashSet::new();
        for schema in &schemas {
            if !seen.insert(schema.selector) {
                return Err(eyre::eyre!(
                    "Event schema '{}' collides with an earlier schema on selector {}",
                    schema.signature,
                    schema.selector
                ));
            }
        }
        Ok(Self { schemas })
    }

    /// The aggregator events this indexer understands.
    pub fn price_feed() -> Self {
        Self {
            schemas: vec![answer_updated_schema(), new_round_schema()],
        }
    }

    pub fn lookup(&self, selector: &B256) -> Option<&EventSchema> {
        self.schemas.iter().find(|s| &s.selector == selector)
    }

    pub fn schemas(&self) -> &[EventSchema] {
        &self.schemas
    }
}
