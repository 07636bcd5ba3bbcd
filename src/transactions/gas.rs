//! Intrinsic gas accounting for inbox transactions.

use eyre::Result;

/// Base cost of any L1 transaction.
const TX_GAS: u64 = 21_000;
/// Cost per zero calldata byte.
const TX_DATA_ZERO_GAS: u64 = 4;
/// Cost per non-zero calldata byte.
const TX_DATA_NON_ZERO_GAS: u64 = 16;

/// Computes the intrinsic gas lower bound for a transaction carrying
/// `data` as calldata.
///
/// This is an offline floor, not an estimate: the driver pins it as the
/// candidate's gas limit so the transaction manager can skip estimation.
pub fn intrinsic_gas(data: &[u8]) -> Result<u64> {
    let zeroes = data.iter().filter(|b| **b == 0).count() as u64;
    let non_zeroes = data.len() as u64 - zeroes;

    let data_gas = non_zeroes
        .checked_mul(TX_DATA_NON_ZERO_GAS)
        .and_then(|g| g.checked_add(zeroes.checked_mul(TX_DATA_ZERO_GAS)?))
        .ok_or_else(|| eyre::eyre!("intrinsic gas overflow for {} data bytes", data.len()))?;

    TX_GAS
        .checked_add(data_gas)
        .ok_or_else(|| eyre::eyre!("intrinsic gas overflow for {} data bytes", data.len()))
}
