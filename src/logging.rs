//! Logging boundary for transaction workflows
//!
//! The core never formats for a terminal or file itself. Every retry, approval
//! step and gas abort is reported as `(wallet, severity, message)` to a `TxLog`
//! collaborator. `TracingLog` forwards those records to `tracing`.

use alloy::primitives::Address;
use std::fmt;
use tracing::{debug, error, info, warn};

/// Severity tag attached to each log record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Debug => write!(f, "DEBUG"),
            Severity::Info => write!(f, "INFO"),
            Severity::Warn => write!(f, "WARN"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// External logging collaborator
pub trait TxLog: Send + Sync {
    fn log(&self, wallet: Option<Address>, severity: Severity, message: &str);

    fn debug(&self, wallet: Option<Address>, message: &str) {
        self.log(wallet, Severity::Debug, message);
    }

    fn info(&self, wallet: Option<Address>, message: &str) {
        self.log(wallet, Severity::Info, message);
    }

    fn warn(&self, wallet: Option<Address>, message: &str) {
        self.log(wallet, Severity::Warn, message);
    }
}

/// Default collaborator: structured `tracing` events with the wallet as a field
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl TxLog for TracingLog {
    fn log(&self, wallet: Option<Address>, severity: Severity, message: &str) {
        match (wallet, severity) {
            (Some(wallet), Severity::Debug) => debug!(%wallet, "{}", message),
            (Some(wallet), Severity::Info) => info!(%wallet, "{}", message),
            (Some(wallet), Severity::Warn) => warn!(%wallet, "{}", message),
            (Some(wallet), Severity::Error) => error!(%wallet, "{}", message),
            (None, Severity::Debug) => debug!("{}", message),
            (None, Severity::Info) => info!("{}", message),
            (None, Severity::Warn) => warn!("{}", message),
            (None, Severity::Error) => error!("{}", message),
        }
    }
}
