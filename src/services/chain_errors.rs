//! Chain RPC Error Differentiation
//!
//! Classifies errors coming back from the RPC endpoint (through alloy) into
//! structured types so the retrier knows which failures are transient.

use alloy::primitives::{Address, B256};
use std::time::Duration;
use thiserror::Error;

/// Structured chain RPC error types
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    /// Call reverted but the node returned no revert data.
    /// Usually a lagging or inconsistent node rather than a real revert.
    #[error("execution reverted without data")]
    RevertedWithoutData,
    /// Call reverted with a reason or custom error payload
    #[error("execution reverted: {0}")]
    Reverted(String),
    /// Rate limited by the RPC provider
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// Connection-level failure (refused, reset, DNS, transport timeout)
    #[error("connection error: {0}")]
    Connection(String),
    /// Our own deadline elapsed before the call resolved
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// Handle is bound to a reader and cannot estimate or send transactions
    #[error("contract {0} is bound to a read-only provider")]
    NoSigner(Address),
    /// Transaction was mined but the receipt reports failure
    #[error("transaction {0} failed on-chain")]
    TransactionFailed(B256),
    /// Anything else the node told us
    #[error("rpc error: {0}")]
    Rpc(String),
}

impl ChainError {
    /// Classify a raw error message returned by the provider or contract layer.
    pub fn from_message(message: &str) -> Self {
        let msg_lower = message.to_lowercase();

        // Rate limiting
        if msg_lower.contains("429")
            || msg_lower.contains("rate limit")
            || msg_lower.contains("too many requests")
            || (msg_lower.contains("exceeded") && msg_lower.contains("capacity"))
        {
            return ChainError::RateLimited(message.to_string());
        }

        // Connection-level failures
        if msg_lower.contains("connection")
            || msg_lower.contains("error sending request")
            || msg_lower.contains("timed out")
            || msg_lower.contains("timeout")
            || msg_lower.contains("broken pipe")
            || msg_lower.contains("dns")
            || msg_lower.contains("502")
            || msg_lower.contains("503")
            || msg_lower.contains("504")
        {
            return ChainError::Connection(message.to_string());
        }

        // Reverts: distinguish "no data" from a real reason
        if msg_lower.contains("missing revert data") {
            return ChainError::RevertedWithoutData;
        }
        if let Some(idx) = msg_lower.find("execution reverted") {
            let tail = message
                .get(idx + "execution reverted".len()..)
                .unwrap_or_default()
                .trim_start_matches([':', ' '])
                .trim();
            if tail.is_empty() || tail == "0x" {
                return ChainError::RevertedWithoutData;
            }
            return ChainError::Reverted(tail.to_string());
        }
        if msg_lower.contains("revert") {
            return ChainError::Reverted(message.to_string());
        }

        ChainError::Rpc(message.to_string())
    }

    /// Classify an alloy contract call error
    pub fn from_contract(err: alloy::contract::Error) -> Self {
        Self::from_message(&err.to_string())
    }

    /// Classify an error raised while waiting for a transaction receipt
    pub fn from_pending(err: alloy::providers::PendingTransactionError) -> Self {
        Self::from_message(&err.to_string())
    }

    /// Whether this error is worth retrying with exponential backoff.
    /// Business errors (real reverts, failed transactions) never are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChainError::RevertedWithoutData | ChainError::RateLimited(_) | ChainError::Connection(_)
        )
    }
}
