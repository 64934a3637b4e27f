//! Transaction coordination services

pub mod approvals;
pub mod chain_errors;
pub mod gas;
pub mod retry;
pub mod sell_estimator;
pub mod trader;
pub mod tx_lock;

pub use approvals::{ApprovalManager, ApprovalOutcome, ApprovalStep};
pub use chain_errors::ChainError;
pub use gas::{estimate_gas, GasEstimate, GasOverrides};
pub use retry::{with_retry, RetryConfig};
pub use sell_estimator::estimate_max_redeemable;
pub use trader::{index_set_for, position_id_for, MarketTrader, TradeOutcome};
pub use tx_lock::TransactionLock;
