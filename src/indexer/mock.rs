//! In-memory chain endpoint for tests.

use alloy::primitives::{address, Address, B256, I256, U256};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use std::collections::HashMap;
use std::sync::Mutex;

use super::endpoint::{ChainEndpoint, LogQueryError};
use super::schema::{AnswerUpdated, NewRound};

pub const FEED: Address = address!("1111111111111111111111111111111111111111");

#[derive(Default)]
pub struct MockEndpoint {
    pub name: String,
    pub floor: u64,
    pub head: u64,
    pub logs: Vec<Log>,
    pub decimals: HashMap<Address, u8>,
    /// Queries matching more logs than this are rejected as too large.
    pub max_results: Option<usize>,
    /// Any query falling entirely inside one of these ranges fails outright.
    pub broken_ranges: Vec<(u64, u64)>,
    pub calls: Mutex<Vec<(u64, u64)>>,
    /// Topic filter of the most recent query.
    pub last_topics: Mutex<Vec<B256>>,
}

impl MockEndpoint {
    pub fn new(name: &str, head: u64) -> Self {
        Self {
            name: name.to_string(),
            head,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<(u64, u64)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn topics(&self) -> Vec<B256> {
        self.last_topics.lock().unwrap().clone()
    }
}

impl ChainEndpoint for MockEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn deployment_floor(&self) -> u64 {
        self.floor
    }

    async fn head_block(&self) -> eyre::Result<u64> {
        Ok(self.head)
    }

    async fn get_logs(
        &self,
        address: Address,
        topics: &[B256],
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, LogQueryError> {
        self.calls.lock().unwrap().push((from_block, to_block));
        *self.last_topics.lock().unwrap() = topics.to_vec();

        if self
            .broken_ranges
            .iter()
            .any(|&(lo, hi)| lo <= from_block && to_block <= hi)
        {
            return Err(LogQueryError::Fatal(eyre::eyre!("connection reset")));
        }

        let matched: Vec<Log> = self
            .logs
            .iter()
            .filter(|l| l.inner.address == address)
            .filter(|l| {
                topics.is_empty()
                    || l.inner.data.topics().first().is_some_and(|t| topics.contains(t))
            })
            .filter(|l| {
                let n = l.block_number.unwrap_or(0);
                n >= from_block && n <= to_block
            })
            .cloned()
            .collect();

        match self.max_results {
            Some(cap) if matched.len() > cap => Err(LogQueryError::TooLarge(format!(
                "query returned more than {} results",
                cap
            ))),
            _ => Ok(matched),
        }
    }

    async fn decimals(&self, address: Address) -> eyre::Result<u8> {
        self.decimals
            .get(&address)
            .copied()
            .ok_or_else(|| eyre::eyre!("execution reverted"))
    }
}

fn wrap(address: Address, data: alloy::primitives::LogData, block: u64, tx: u8, index: u64) -> Log {
    Log {
        inner: alloy::primitives::Log { address, data },
        block_number: Some(block),
        transaction_hash: Some(B256::repeat_byte(tx)),
        log_index: Some(index),
        ..Default::default()
    }
}

pub fn answer_log(address: Address, block: u64, current: i64, updated_at: u64) -> Log {
    let event = AnswerUpdated {
        current: I256::try_from(current).unwrap(),
        roundId: U256::from(block),
        updatedAt: U256::from(updated_at),
    };
    wrap(address, event.encode_log_data(), block, (block % 251) as u8, 0)
}

pub fn new_round_log(address: Address, block: u64, started_at: u64) -> Log {
    let event = NewRound {
        roundId: U256::from(block),
        startedBy: Address::repeat_byte(0x22),
        startedAt: U256::from(started_at),
    };
    wrap(address, event.encode_log_data(), block, (block % 251) as u8, 1)
}

/// A log whose topic[0] belongs to no known event.
pub fn foreign_log(address: Address, block: u64) -> Log {
    let data = alloy::primitives::LogData::new_unchecked(
        vec![B256::repeat_byte(0xee)],
        vec![0u8; 32].into(),
    );
    wrap(address, data, block, 0xee, 2)
}
