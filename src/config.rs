//! Configuration management
//!
//! `Config` is loaded from the environment by the binary. The library core only
//! ever sees `TxSettings`, handed to it explicitly.

use crate::services::retry::RetryConfig;
use crate::units::gwei_to_wei;
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use std::env;

/// Settings consumed by the transaction core
#[derive(Debug, Clone)]
pub struct TxSettings {
    /// Blocks to wait after inclusion before a transaction counts as final
    pub confirmations: u64,
    /// Fixed gas price in gwei, no fee-market bidding
    pub gas_price_gwei: u64,
    /// Absolute gas added on top of the 20% margin
    pub gas_limit_buffer: u64,
    /// Retry policy for RPC reads and submissions
    pub retry: RetryConfig,
}

impl Default for TxSettings {
    fn default() -> Self {
        Self {
            confirmations: 1,
            gas_price_gwei: 50,
            gas_limit_buffer: 50_000,
            retry: RetryConfig::default(),
        }
    }
}

impl TxSettings {
    pub fn gas_price_wei(&self) -> u128 {
        gwei_to_wei(self.gas_price_gwei)
    }
}

/// Process configuration loaded from environment
#[derive(Debug, Clone)]
pub struct Config {
    /// Polygon RPC URL
    pub polygon_rpc_url: String,

    /// Private key for signing (optional, read-only commands work without it)
    pub private_key: Option<String>,

    /// Transaction core settings
    pub tx: TxSettings,

    /// Slippage tolerance for buys in basis points (default: 100 = 1%)
    pub slippage_bps: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let polygon_rpc_url = env::var("POLYGON_RPC_URL")
            .unwrap_or_else(|_| "https://polygon-rpc.com".to_string());

        let private_key = env::var("POLYMARKET_PRIVATE_KEY").ok().filter(|s| !s.is_empty());

        let defaults = TxSettings::default();

        let confirmations = env_parse("TX_CONFIRMATIONS").unwrap_or(defaults.confirmations);
        let gas_price_gwei = env_parse("GAS_PRICE_GWEI").unwrap_or(defaults.gas_price_gwei);
        let gas_limit_buffer = env_parse("GAS_LIMIT_BUFFER").unwrap_or(defaults.gas_limit_buffer);
        let max_attempts = env_parse("RPC_MAX_ATTEMPTS").unwrap_or(defaults.retry.max_attempts);

        let slippage_bps = env_parse("SLIPPAGE_BPS").unwrap_or(100); // Default 1%

        if slippage_bps > 10_000 {
            anyhow::bail!("SLIPPAGE_BPS must be at most 10000, got {}", slippage_bps);
        }

        Ok(Self {
            polygon_rpc_url,
            private_key,
            tx: TxSettings {
                confirmations,
                gas_price_gwei,
                gas_limit_buffer,
                retry: RetryConfig {
                    max_attempts,
                    ..defaults.retry
                },
            },
            slippage_bps,
        })
    }

    /// Parse the configured private key into a signer
    pub fn signer(&self) -> Result<PrivateKeySigner> {
        let key = self
            .private_key
            .as_ref()
            .context("POLYMARKET_PRIVATE_KEY required for signing")?;
        key.parse().context("Failed to parse private key")
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
