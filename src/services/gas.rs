//! Gas estimation gate
//!
//! A failed estimate means the call would fail: callers abort instead of
//! submitting with a guessed limit. Estimates are never retried.

use crate::config::TxSettings;
use crate::contracts::{Contract, ContractCall};
use crate::logging::TxLog;
use crate::services::chain_errors::ChainError;
use alloy::primitives::Address;

/// Outcome of a gas estimation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasEstimate {
    Estimated(u64),
    /// Estimation impossible or failed: do not submit
    Unknown,
}

impl GasEstimate {
    pub fn gas(&self) -> Option<u64> {
        match self {
            GasEstimate::Estimated(gas) => Some(*gas),
            GasEstimate::Unknown => None,
        }
    }
}

/// Gas price and limit attached to a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasOverrides {
    /// Wei per gas
    pub gas_price: u128,
    pub gas_limit: u64,
}

impl GasOverrides {
    /// Limit is the estimate plus 20%, plus the configured absolute buffer
    pub fn from_estimate(estimate: u64, settings: &TxSettings) -> Self {
        let with_margin = estimate.saturating_mul(120) / 100;
        Self {
            gas_price: settings.gas_price_wei(),
            gas_limit: with_margin.saturating_add(settings.gas_limit_buffer),
        }
    }
}

/// Estimate gas for `call`, mapping any failure to `GasEstimate::Unknown`.
pub async fn estimate_gas<C>(
    contract: &C,
    call: &C::Call,
    log: &dyn TxLog,
    wallet: Option<Address>,
) -> GasEstimate
where
    C: Contract + ?Sized,
{
    match contract.estimate_gas(call).await {
        Ok(gas) => {
            log.debug(
                wallet,
                &format!("[Gas] {} on {} estimated at {}", call.name(), contract.address(), gas),
            );
            GasEstimate::Estimated(gas)
        }
        Err(ChainError::NoSigner(address)) => {
            log.warn(
                wallet,
                &format!(
                    "[Gas] {} on {} cannot be estimated: handle is read-only",
                    call.name(),
                    address
                ),
            );
            GasEstimate::Unknown
        }
        Err(err) => {
            log.warn(
                wallet,
                &format!(
                    "[Gas] Estimation failed for {} on {}: {}",
                    call.name(),
                    contract.address(),
                    err
                ),
            );
            GasEstimate::Unknown
        }
    }
}
