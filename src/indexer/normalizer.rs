use alloy::primitives::I256;
use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::DateTime;
use std::str::FromStr;

use super::types::{AssetMeta, DecodedEvent, EventFields, ObservationType, PriceObservation};

fn i256_to_bd(val: I256) -> BigDecimal {
    BigDecimal::from_str(&val.to_string()).unwrap_or_default()
}

/// `price / 10^decimals` in floating point.
pub fn scale_price(price: &BigDecimal, decimals: u8) -> f64 {
    price.to_f64().unwrap_or(f64::NAN) / 10f64.powi(decimals as i32)
}

/// Turn decoded `AnswerUpdated` events into output rows for one asset.
///
/// Other event kinds are skipped. The answer is kept as-is, negative values included.
pub fn normalize(events: &[DecodedEvent], asset: &AssetMeta) -> Vec<PriceObservation> {
    let mut rows = Vec::with_capacity(events.len());

    for event in events {
        let EventFields::AnswerUpdated {
            current,
            updated_at,
            ..
        } = &event.fields
        else {
            continue;
        };

        let updated_at = match i64::try_from(*updated_at)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
        {
            Some(ts) => ts,
            None => {
                tracing::warn!(
                    chain = %asset.chain,
                    ticker = %asset.ticker,
                    block = event.block_number,
                    updated_at = %updated_at,
                    "updatedAt out of timestamp range, skipping row"
                );
                continue;
            }
        };

        let price = i256_to_bd(*current);
        let price_decimal = scale_price(&price, asset.decimals);

        rows.push(PriceObservation {
            ticker: asset.ticker.clone(),
            chain: asset.chain.clone(),
            updated_at,
            price,
            price_decimal,
            observation_type: ObservationType::Direct,
            threshold: asset.threshold,
            base: asset.base.clone(),
            heartbeat: asset.heartbeat,
            decimals: asset.decimals,
            block_number: event.block_number,
            tx_hash: event.tx_hash,
        });
    }

    rows
}
