//! Polymarket On-Chain Library
//!
//! Transaction coordination for trading against prediction-market contracts:
//!
//! 1. **Transaction lock**: one in-flight mutating transaction per wallet, FIFO.
//! 2. **Gas-gated submission**: every transaction is estimated first and aborted
//!    when the estimate fails, never sent with a guessed limit.
//! 3. **Approvals**: idempotent ERC-20 allowance and ERC-1155 operator approval.
//! 4. **Sell sizing**: search the market maker's quote for the largest return a
//!    position can pay for.

pub mod config;
pub mod contracts;
pub mod logging;
pub mod services;
pub mod units;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::{Config, TxSettings};
pub use contracts::{ChainAccess, ContractFactory, TxConfirmation};
pub use logging::{Severity, TracingLog, TxLog};
pub use services::{
    ApprovalManager, ApprovalOutcome, ChainError, MarketTrader, TradeOutcome, TransactionLock,
};
