use alloy::primitives::{Address, B256, I256, U256};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};

/// Field values of a log that matched a registered event schema.
#[derive(Debug, Clone, PartialEq)]
pub enum EventFields {
    AnswerUpdated {
        current: I256,
        round_id: U256,
        updated_at: U256,
    },
    NewRound {
        round_id: U256,
        started_by: Address,
        started_at: U256,
    },
}

/// A raw log resolved against a schema, still tied to where it was emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub schema: &'static str,
    pub fields: EventFields,
    pub block_number: u64,
    pub tx_hash: B256,
    pub log_index: u64,
}

/// Static per-asset metadata merged into every row for that asset.
#[derive(Debug, Clone)]
pub struct AssetMeta {
    pub ticker: String,
    pub chain: String,
    pub decimals: u8,
    pub threshold: f64,
    pub base: String,
    pub heartbeat: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationType {
    Direct,
}

impl ObservationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationType::Direct => "direct",
        }
    }
}

/// One normalized price update, ready for the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceObservation {
    pub ticker: String,
    pub chain: String,
    pub updated_at: DateTime<Utc>,
    pub price: BigDecimal,
    pub price_decimal: f64,
    pub observation_type: ObservationType,
    pub threshold: f64,
    pub base: String,
    pub heartbeat: f64,
    pub decimals: u8,
    pub block_number: u64,
    pub tx_hash: B256,
}
