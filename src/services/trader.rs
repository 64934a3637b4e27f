//! Market Trader
//!
//! Buy, sell-all and redeem paths built from the approval manager, the sell
//! estimator and gas-gated submission. Approval and trade each take the
//! wallet's transaction lock on their own; the lock is never nested.

use crate::config::TxSettings;
use crate::contracts::{ConditionalTokens, Contract, FungibleToken, Market, SemiFungibleToken, TxConfirmation};
use crate::logging::TxLog;
use crate::services::approvals::{submit_gated, ApprovalManager};
use crate::services::chain_errors::ChainError;
use crate::services::retry::{with_retry, RetryConfig};
use crate::services::sell_estimator::estimate_max_redeemable;
use crate::services::tx_lock::TransactionLock;
use alloy::primitives::{Address, B256, U256};
use serde::Serialize;
use std::sync::Arc;

const BPS_DENOMINATOR: u64 = 10_000;

/// Result of a trading path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TradeOutcome {
    /// Transaction confirmed
    Submitted(TxConfirmation),
    /// Nothing to do (zero balance, unresolved condition, ...)
    Skipped { reason: String },
    /// A precondition failed (approval, gas estimate); nothing was traded
    Aborted { reason: String },
}

impl TradeOutcome {
    pub fn confirmation(&self) -> Option<&TxConfirmation> {
        match self {
            TradeOutcome::Submitted(tx) => Some(tx),
            _ => None,
        }
    }
}

/// Index set of a single outcome slot: bit `outcome_index` set
pub fn index_set_for(outcome_index: u64) -> U256 {
    U256::from(1u64) << (outcome_index as usize)
}

/// ERC-1155 position id of one outcome of a top-level condition.
///
/// The registry computes the collection id and position id on chain, so this
/// matches whatever hashing scheme the deployment uses.
pub async fn position_id_for<R>(
    registry: &R,
    collateral: Address,
    condition_id: B256,
    index_set: U256,
    retry: &RetryConfig,
    log: &dyn TxLog,
) -> Result<U256, ChainError>
where
    R: ConditionalTokens + ?Sized,
{
    let collection_id = with_retry(retry, log, None, "getCollectionId", || {
        registry.collection_id(B256::ZERO, condition_id, index_set)
    })
    .await?;
    let position_id = with_retry(retry, log, None, "getPositionId", || {
        registry.position_id(collateral, collection_id)
    })
    .await?;

    log.debug(
        None,
        &format!(
            "[Trader] Position for condition {} index set {}: {}",
            condition_id, index_set, position_id
        ),
    );
    Ok(position_id)
}

/// Apply a slippage tolerance to a quoted token amount
pub fn min_with_slippage(quote: U256, slippage_bps: u32) -> U256 {
    let keep = BPS_DENOMINATOR.saturating_sub(u64::from(slippage_bps));
    quote.saturating_mul(U256::from(keep)) / U256::from(BPS_DENOMINATOR)
}

pub struct MarketTrader {
    lock: Arc<TransactionLock>,
    approvals: ApprovalManager,
    settings: TxSettings,
    log: Arc<dyn TxLog>,
}

impl MarketTrader {
    /// The approval manager shares `lock`, so approvals and trades for one
    /// wallet queue together.
    pub fn new(lock: Arc<TransactionLock>, settings: TxSettings, log: Arc<dyn TxLog>) -> Self {
        let approvals = ApprovalManager::new(lock.clone(), settings.clone(), log.clone());
        Self {
            lock,
            approvals,
            settings,
            log,
        }
    }

    pub fn approvals(&self) -> &ApprovalManager {
        &self.approvals
    }

    /// Spend `investment` collateral on `outcome_index`, accepting up to
    /// `slippage_bps` fewer tokens than quoted.
    pub async fn buy<M, T>(
        &self,
        wallet: Address,
        market: &M,
        collateral: &T,
        investment: U256,
        outcome_index: u64,
        slippage_bps: u32,
    ) -> Result<TradeOutcome, ChainError>
    where
        M: Market + ?Sized,
        T: FungibleToken + ?Sized,
    {
        if investment.is_zero() {
            return Ok(skipped("investment is zero"));
        }

        let balance = with_retry(
            &self.settings.retry,
            self.log.as_ref(),
            Some(wallet),
            "balanceOf",
            || collateral.balance_of(wallet),
        )
        .await?;
        if balance < investment {
            return Ok(skipped(format!(
                "collateral balance {} is below investment {}",
                balance, investment
            )));
        }

        let quote = with_retry(
            &self.settings.retry,
            self.log.as_ref(),
            Some(wallet),
            "calcBuyAmount",
            || market.calc_buy_amount(investment, outcome_index),
        )
        .await?;
        let min_tokens = min_with_slippage(quote, slippage_bps);

        let approval = self
            .approvals
            .ensure_allowance(wallet, collateral, market.address(), investment)
            .await?;
        if !approval.is_success() {
            return Ok(aborted(format!("collateral approval failed: {:?}", approval)));
        }

        self.log.info(
            Some(wallet),
            &format!(
                "[Trader] Buying outcome {} on {} for {} (quote {}, min {})",
                outcome_index,
                market.address(),
                investment,
                quote,
                min_tokens
            ),
        );

        let call = market.buy_call(investment, outcome_index, min_tokens);
        self.submit(wallet, market, &call).await
    }

    /// Sell the wallet's whole position for the largest collateral return its
    /// balance covers.
    pub async fn sell_all<M, R>(
        &self,
        wallet: Address,
        market: &M,
        registry: &R,
        position_id: U256,
        outcome_index: u64,
        collateral_decimals: u8,
    ) -> Result<TradeOutcome, ChainError>
    where
        M: Market + ?Sized,
        R: SemiFungibleToken + ?Sized,
    {
        let balance = with_retry(
            &self.settings.retry,
            self.log.as_ref(),
            Some(wallet),
            "balanceOf",
            || registry.balance_of(wallet, position_id),
        )
        .await?;
        if balance.is_zero() {
            return Ok(skipped("no position to sell"));
        }

        let approval = self
            .approvals
            .ensure_operator_approval(wallet, registry, market.address())
            .await?;
        if !approval.is_success() {
            return Ok(aborted(format!("operator approval failed: {:?}", approval)));
        }

        let return_amount =
            estimate_max_redeemable(market, outcome_index, balance, collateral_decimals).await;
        if return_amount.is_zero() {
            return Ok(skipped(format!(
                "position of {} tokens is not sellable for any collateral",
                balance
            )));
        }

        self.log.info(
            Some(wallet),
            &format!(
                "[Trader] Selling up to {} tokens of outcome {} on {} for {}",
                balance,
                outcome_index,
                market.address(),
                return_amount
            ),
        );

        let call = market.sell_call(return_amount, outcome_index, balance);
        self.submit(wallet, market, &call).await
    }

    /// Redeem positions of a resolved condition for collateral
    pub async fn redeem<R>(
        &self,
        wallet: Address,
        registry: &R,
        collateral: Address,
        condition_id: B256,
        index_sets: Vec<U256>,
    ) -> Result<TradeOutcome, ChainError>
    where
        R: ConditionalTokens + ?Sized,
    {
        let denominator = with_retry(
            &self.settings.retry,
            self.log.as_ref(),
            Some(wallet),
            "payoutDenominator",
            || registry.payout_denominator(condition_id),
        )
        .await?;
        if denominator.is_zero() {
            return Ok(skipped(format!("condition {} is not resolved", condition_id)));
        }

        self.log.info(
            Some(wallet),
            &format!(
                "[Trader] Redeeming condition {} index sets {:?}",
                condition_id, index_sets
            ),
        );

        let call = registry.redeem_call(collateral, condition_id, index_sets);
        self.submit(wallet, registry, &call).await
    }

    async fn submit<C>(&self, wallet: Address, contract: &C, call: &C::Call) -> Result<TradeOutcome, ChainError>
    where
        C: Contract + ?Sized,
    {
        let sent = self
            .lock
            .with_lock(wallet, || {
                submit_gated(&self.settings, self.log.as_ref(), wallet, contract, call)
            })
            .await?;

        Ok(match sent {
            Some(tx) => TradeOutcome::Submitted(tx),
            None => aborted("gas estimate unknown"),
        })
    }
}

fn skipped(reason: impl Into<String>) -> TradeOutcome {
    TradeOutcome::Skipped {
        reason: reason.into(),
    }
}

fn aborted(reason: impl Into<String>) -> TradeOutcome {
    TradeOutcome::Aborted {
        reason: reason.into(),
    }
}
