//! Sell sizing for "sell all" liquidations
//!
//! The market maker quotes how many outcome tokens a given collateral return
//! costs, not the reverse. We search the quote for the largest return the
//! wallet's balance can pay for: first by doubling to find a bracket, then by
//! bisection inside it.
//!
//! Quotes are sent to the contract directly. A reverting quote means the return
//! is infeasible (e.g. more than the pool holds), so it is never retried.
//! The quote must be non-decreasing in the return amount; other quoting
//! functions give an arbitrary feasible answer.

use crate::contracts::{Contract, Market};
use crate::units::one_unit;
use alloy::primitives::U256;
use tracing::debug;

/// Maximum doublings while looking for an infeasible upper bound
pub const MAX_EXPANSIONS: u32 = 40;
/// Maximum bisections inside the bracket
pub const MAX_BISECTIONS: u32 = 50;

/// Largest collateral return whose quote fits in `token_balance`.
///
/// Returns zero when not even the smallest quoted amount is affordable.
pub async fn estimate_max_redeemable<M>(
    market: &M,
    outcome_index: u64,
    token_balance: U256,
    collateral_decimals: u8,
) -> U256
where
    M: Market + ?Sized,
{
    let mut low = U256::ZERO;
    let mut high = one_unit(collateral_decimals);

    for _ in 0..MAX_EXPANSIONS {
        if !is_feasible(market, high, outcome_index, token_balance).await {
            break;
        }
        low = high;
        high = match high.checked_mul(U256::from(2u64)) {
            Some(next) => next,
            None => break,
        };
    }

    debug!(
        "[SellEstimate] {} outcome {}: bracket [{}, {}] for balance {}",
        market.address(),
        outcome_index,
        low,
        high,
        token_balance
    );

    for _ in 0..MAX_BISECTIONS {
        let mid = low + (high - low) / U256::from(2u64);
        if mid == low || mid == high {
            break;
        }
        match market.calc_sell_amount(mid, outcome_index).await {
            Ok(required) if required <= token_balance => low = mid,
            Ok(_) => high = mid,
            Err(err) => {
                debug!(
                    "[SellEstimate] Quote for {} reverted ({}), settling on {}",
                    mid, err, low
                );
                return low;
            }
        }
    }

    debug!(
        "[SellEstimate] {} outcome {}: max redeemable {}",
        market.address(),
        outcome_index,
        low
    );
    low
}

async fn is_feasible<M>(market: &M, return_amount: U256, outcome_index: u64, token_balance: U256) -> bool
where
    M: Market + ?Sized,
{
    match market.calc_sell_amount(return_amount, outcome_index).await {
        Ok(required) => required <= token_balance,
        Err(_) => false,
    }
}
