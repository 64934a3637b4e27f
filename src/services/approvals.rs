//! Allowance and operator-approval workflows
//!
//! Both workflows run under the wallet's transaction lock, gate every
//! submission on a successful gas estimate, and read chain state fresh on every
//! call. Business aborts come back as `ApprovalOutcome` values; transport
//! errors that survive the retrier come back as `Err`.

use crate::config::TxSettings;
use crate::contracts::{Contract, ContractCall, FungibleToken, SemiFungibleToken, TxConfirmation};
use crate::logging::TxLog;
use crate::services::chain_errors::ChainError;
use crate::services::gas::{estimate_gas, GasOverrides};
use crate::services::retry::with_retry;
use crate::services::tx_lock::TransactionLock;
use alloy::primitives::{Address, U256};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Allowance reads that take longer than this count as failed
pub const ALLOWANCE_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Which transaction of a workflow a gas abort happened on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStep {
    ResetAllowance,
    SetAllowance,
    SetOperator,
}

impl fmt::Display for ApprovalStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalStep::ResetAllowance => write!(f, "reset allowance to zero"),
            ApprovalStep::SetAllowance => write!(f, "set allowance"),
            ApprovalStep::SetOperator => write!(f, "set operator approval"),
        }
    }
}

/// Result of an approval workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// Chain state already satisfied the request; nothing was sent
    AlreadyApproved,
    /// Approval transactions were confirmed (and, for allowances, verified)
    Approved { transactions: Vec<TxConfirmation> },
    /// Gas estimation failed for `step`; nothing further was sent
    GasUnknown { step: ApprovalStep },
    /// Transactions confirmed but the re-read allowance is still short
    StillInsufficient { current: U256 },
}

impl ApprovalOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ApprovalOutcome::AlreadyApproved | ApprovalOutcome::Approved { .. })
    }

    /// Number of transactions this workflow sent
    pub fn transaction_count(&self) -> usize {
        match self {
            ApprovalOutcome::Approved { transactions } => transactions.len(),
            _ => 0,
        }
    }
}

/// Idempotent approval workflows for collateral and outcome tokens
pub struct ApprovalManager {
    lock: Arc<TransactionLock>,
    settings: TxSettings,
    log: Arc<dyn TxLog>,
}

impl ApprovalManager {
    pub fn new(lock: Arc<TransactionLock>, settings: TxSettings, log: Arc<dyn TxLog>) -> Self {
        Self { lock, settings, log }
    }

    /// Make sure `spender` may move at least `needed` of `token` on `wallet`'s behalf.
    ///
    /// A nonzero allowance below `needed` is reset to zero before the new
    /// approval, since some tokens refuse to change a nonzero allowance.
    pub async fn ensure_allowance<T>(
        &self,
        wallet: Address,
        token: &T,
        spender: Address,
        needed: U256,
    ) -> Result<ApprovalOutcome, ChainError>
    where
        T: FungibleToken + ?Sized,
    {
        self.lock
            .with_lock(wallet, || self.allowance_workflow(wallet, token, spender, needed))
            .await
    }

    async fn allowance_workflow<T>(
        &self,
        wallet: Address,
        token: &T,
        spender: Address,
        needed: U256,
    ) -> Result<ApprovalOutcome, ChainError>
    where
        T: FungibleToken + ?Sized,
    {
        let current = self.read_allowance(wallet, token, spender).await?;
        if current >= needed {
            self.log.debug(
                Some(wallet),
                &format!(
                    "[Approval] Allowance {} for {} on {} already covers {}",
                    current,
                    spender,
                    token.address(),
                    needed
                ),
            );
            return Ok(ApprovalOutcome::AlreadyApproved);
        }

        let mut transactions = Vec::with_capacity(2);

        if current > U256::ZERO {
            self.log.info(
                Some(wallet),
                &format!(
                    "[Approval] Resetting allowance for {} on {} from {} to 0",
                    spender,
                    token.address(),
                    current
                ),
            );
            let call = token.approve_call(spender, U256::ZERO);
            match self.send_gated(wallet, token, &call).await? {
                Some(tx) => transactions.push(tx),
                None => {
                    return Ok(ApprovalOutcome::GasUnknown {
                        step: ApprovalStep::ResetAllowance,
                    })
                }
            }
        }

        self.log.info(
            Some(wallet),
            &format!(
                "[Approval] Approving {} for {} on {}",
                needed,
                spender,
                token.address()
            ),
        );
        let call = token.approve_call(spender, needed);
        match self.send_gated(wallet, token, &call).await? {
            Some(tx) => transactions.push(tx),
            None => {
                return Ok(ApprovalOutcome::GasUnknown {
                    step: ApprovalStep::SetAllowance,
                })
            }
        }

        let updated = self.read_allowance(wallet, token, spender).await?;
        if updated < needed {
            self.log.warn(
                Some(wallet),
                &format!(
                    "[Approval] Allowance for {} on {} is {} after approval, needed {}",
                    spender,
                    token.address(),
                    updated,
                    needed
                ),
            );
            return Ok(ApprovalOutcome::StillInsufficient { current: updated });
        }

        self.log.info(
            Some(wallet),
            &format!(
                "[Approval] Allowance for {} on {} verified at {} ({} tx)",
                spender,
                token.address(),
                updated,
                transactions.len()
            ),
        );
        Ok(ApprovalOutcome::Approved { transactions })
    }

    /// Make sure `operator` may move all of `wallet`'s positions on `token`.
    pub async fn ensure_operator_approval<T>(
        &self,
        wallet: Address,
        token: &T,
        operator: Address,
    ) -> Result<ApprovalOutcome, ChainError>
    where
        T: SemiFungibleToken + ?Sized,
    {
        self.lock
            .with_lock(wallet, || self.operator_workflow(wallet, token, operator))
            .await
    }

    async fn operator_workflow<T>(
        &self,
        wallet: Address,
        token: &T,
        operator: Address,
    ) -> Result<ApprovalOutcome, ChainError>
    where
        T: SemiFungibleToken + ?Sized,
    {
        let approved = with_retry(
            &self.settings.retry,
            self.log.as_ref(),
            Some(wallet),
            "isApprovedForAll",
            || token.is_approved_for_all(wallet, operator),
        )
        .await;

        // A spurious approval is cheaper than a stuck workflow
        let approved = match approved {
            Ok(approved) => approved,
            Err(err) => {
                self.log.warn(
                    Some(wallet),
                    &format!(
                        "[Approval] Could not read operator approval for {} on {}: {}; approving anyway",
                        operator,
                        token.address(),
                        err
                    ),
                );
                false
            }
        };

        if approved {
            self.log.debug(
                Some(wallet),
                &format!(
                    "[Approval] Operator {} already approved on {}",
                    operator,
                    token.address()
                ),
            );
            return Ok(ApprovalOutcome::AlreadyApproved);
        }

        self.log.info(
            Some(wallet),
            &format!(
                "[Approval] Setting operator approval for {} on {}",
                operator,
                token.address()
            ),
        );
        let call = token.set_approval_call(operator, true);
        match self.send_gated(wallet, token, &call).await? {
            Some(tx) => Ok(ApprovalOutcome::Approved {
                transactions: vec![tx],
            }),
            None => Ok(ApprovalOutcome::GasUnknown {
                step: ApprovalStep::SetOperator,
            }),
        }
    }

    /// Allowance read through the retrier, raced against a 10s deadline
    async fn read_allowance<T>(&self, wallet: Address, token: &T, spender: Address) -> Result<U256, ChainError>
    where
        T: FungibleToken + ?Sized,
    {
        let read = with_retry(
            &self.settings.retry,
            self.log.as_ref(),
            Some(wallet),
            "allowance",
            || token.allowance(wallet, spender),
        );

        match tokio::time::timeout(ALLOWANCE_READ_TIMEOUT, read).await {
            Ok(result) => result,
            Err(_) => {
                self.log.warn(
                    Some(wallet),
                    &format!(
                        "[Approval] Allowance read for {} on {} timed out after {:?}",
                        spender,
                        token.address(),
                        ALLOWANCE_READ_TIMEOUT
                    ),
                );
                Err(ChainError::Timeout(ALLOWANCE_READ_TIMEOUT))
            }
        }
    }

    /// Estimate, then submit and wait for confirmations. `None` when gas is unknown.
    async fn send_gated<C>(
        &self,
        wallet: Address,
        contract: &C,
        call: &C::Call,
    ) -> Result<Option<TxConfirmation>, ChainError>
    where
        C: Contract + ?Sized,
    {
        submit_gated(&self.settings, self.log.as_ref(), wallet, contract, call).await
    }
}

/// Gas-gated submission shared by every mutating workflow.
///
/// Callers must already hold the wallet's transaction lock.
pub(crate) async fn submit_gated<C>(
    settings: &TxSettings,
    log: &dyn TxLog,
    wallet: Address,
    contract: &C,
    call: &C::Call,
) -> Result<Option<TxConfirmation>, ChainError>
where
    C: Contract + ?Sized,
{
    let Some(gas) = estimate_gas(contract, call, log, Some(wallet)).await.gas() else {
        log.warn(
            Some(wallet),
            &format!(
                "[Gas] Aborting {} on {}: gas estimate unknown",
                call.name(),
                contract.address()
            ),
        );
        return Ok(None);
    };

    let overrides = GasOverrides::from_estimate(gas, settings);

    // Only the broadcast itself may be retried; once a hash exists the
    // transaction is out and retries only look up its receipt.
    let hash = with_retry(&settings.retry, log, Some(wallet), call.name(), || {
        contract.send(call, &overrides)
    })
    .await?;

    log.info(
        Some(wallet),
        &format!(
            "[Tx] {} on {} sent: {} (gas limit {})",
            call.name(),
            contract.address(),
            hash,
            overrides.gas_limit
        ),
    );

    let confirmation = with_retry(&settings.retry, log, Some(wallet), "receipt", || {
        contract.confirm(hash, settings.confirmations)
    })
    .await?;

    log.info(
        Some(wallet),
        &format!(
            "[Tx] {} on {} confirmed: {} (block {:?}, gas used {})",
            call.name(),
            contract.address(),
            confirmation.hash,
            confirmation.block_number,
            confirmation.gas_used
        ),
    );
    Ok(Some(confirmation))
}
