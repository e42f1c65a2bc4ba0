//! Decimal rendering of on-chain amounts.
//!
//! Balances, thresholds and token ids are `U256` internally. At the wire
//! boundary they are base-10 strings so JSON clients never lose precision.

use alloy_primitives::U256;
use serde::Serializer;
use std::collections::BTreeMap;

/// Serialize a `U256` as a decimal string.
pub fn serialize<S: Serializer>(amount: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(amount)
}

/// Serialize an optional `U256` as a decimal string or `null`.
pub fn serialize_opt<S: Serializer>(
    amount: &Option<U256>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match amount {
        Some(amount) => serializer.collect_str(amount),
        None => serializer.serialize_none(),
    }
}

/// Serialize an ordinal-keyed balance map with decimal-string values.
pub fn serialize_map<S: Serializer>(
    balances: &BTreeMap<usize, U256>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(balances.iter().map(|(ordinal, amount)| (ordinal, amount.to_string())))
}

/// Render in whole units, e.g. `150000000000000000000` at 18 decimals is `150`.
pub fn format_units(amount: U256, decimals: u8) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let scale = U256::from(10u64).pow(U256::from(decimals));
    let (whole, fraction) = amount.div_rem(scale);
    if fraction.is_zero() {
        return whole.to_string();
    }
    let fraction = format!("{:0>width$}", fraction.to_string(), width = decimals as usize);
    format!("{}.{}", whole, fraction.trim_end_matches('0'))
}
