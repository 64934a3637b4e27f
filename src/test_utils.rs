//! In-memory contract fakes and log capture for unit tests

use crate::contracts::{
    ConditionalTokens, Contract, ContractCall, FungibleToken, Market, MarketCall, RegistryCall,
    SemiFungibleToken, TokenCall, TxConfirmation,
};
use crate::logging::{Severity, TxLog};
use crate::services::chain_errors::ChainError;
use crate::services::gas::GasOverrides;
use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Captures records so tests can assert on what was reported
#[derive(Default)]
pub(crate) struct RecordingLog {
    records: Mutex<Vec<(Option<Address>, Severity, String)>>,
}

impl RecordingLog {
    pub fn records(&self) -> Vec<(Option<Address>, Severity, String)> {
        self.records.lock().unwrap().clone()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s, _)| *s == severity)
            .count()
    }

    pub fn messages(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, m)| m.clone())
            .collect()
    }
}

impl TxLog for RecordingLog {
    fn log(&self, wallet: Option<Address>, severity: Severity, message: &str) {
        self.records
            .lock()
            .unwrap()
            .push((wallet, severity, message.to_string()));
    }
}

/// Shared estimate/send/confirm bookkeeping for the fakes
pub(crate) struct CallRecorder<C> {
    estimate_failure: Mutex<Option<ChainError>>,
    estimate_failure_for: Mutex<Option<(C, ChainError)>>,
    estimates: AtomicUsize,
    send_failures: Mutex<VecDeque<ChainError>>,
    confirm_failures: Mutex<VecDeque<ChainError>>,
    confirm_attempts: AtomicUsize,
    submitted: Mutex<Vec<(C, GasOverrides)>>,
}

impl<C: ContractCall + PartialEq> CallRecorder<C> {
    fn new() -> Self {
        Self {
            estimate_failure: Mutex::new(None),
            estimate_failure_for: Mutex::new(None),
            estimates: AtomicUsize::new(0),
            send_failures: Mutex::new(VecDeque::new()),
            confirm_failures: Mutex::new(VecDeque::new()),
            confirm_attempts: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
        }
    }

    /// Fail the next sends before anything reaches the mempool
    pub fn fail_submits(&self, errors: Vec<ChainError>) {
        *self.send_failures.lock().unwrap() = errors.into();
    }

    /// Fail the next receipt waits; the transaction itself is already out
    pub fn fail_confirmations(&self, errors: Vec<ChainError>) {
        *self.confirm_failures.lock().unwrap() = errors.into();
    }

    fn estimate(&self, call: &C, gas: u64) -> Result<u64, ChainError> {
        self.estimates.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.estimate_failure.lock().unwrap().clone() {
            return Err(err);
        }
        if let Some((failing, err)) = self.estimate_failure_for.lock().unwrap().clone() {
            if &failing == call {
                return Err(err);
            }
        }
        Ok(gas)
    }

    fn send(&self, call: &C, overrides: &GasOverrides) -> Result<B256, ChainError> {
        if let Some(err) = self.send_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push((call.clone(), *overrides));
        Ok(B256::with_last_byte(submitted.len() as u8))
    }

    fn confirm(&self, hash: B256) -> Result<TxConfirmation, ChainError> {
        self.confirm_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.confirm_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(TxConfirmation {
            hash,
            block_number: Some(100 + u64::from(hash.0[31])),
            gas_used: 21_000,
        })
    }

    /// Transactions that reached the mempool
    pub fn broadcasts(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }

    pub fn confirm_attempts(&self) -> usize {
        self.confirm_attempts.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<C> {
        self.submitted
            .lock()
            .unwrap()
            .iter()
            .map(|(c, _)| c.clone())
            .collect()
    }

    pub fn overrides(&self) -> Vec<GasOverrides> {
        self.submitted.lock().unwrap().iter().map(|(_, o)| *o).collect()
    }
}

/// ERC-20 fake with a single (owner, spender) allowance
pub(crate) struct MockToken {
    allowance: Mutex<U256>,
    balance: Mutex<U256>,
    allowance_read_failures: Mutex<VecDeque<ChainError>>,
    allowance_reads: AtomicUsize,
    allowance_delay: Mutex<Option<Duration>>,
    /// When set, approvals are mined but do not change the allowance
    ignore_approvals: Mutex<bool>,
    pub recorder: CallRecorder<TokenCall>,
}

impl MockToken {
    pub const ADDRESS: Address = Address::new([0xAA; 20]);
    pub const GAS: u64 = 46_000;

    pub fn new(allowance: U256) -> Self {
        Self {
            allowance: Mutex::new(allowance),
            balance: Mutex::new(U256::ZERO),
            allowance_read_failures: Mutex::new(VecDeque::new()),
            allowance_reads: AtomicUsize::new(0),
            allowance_delay: Mutex::new(None),
            ignore_approvals: Mutex::new(false),
            recorder: CallRecorder::new(),
        }
    }

    pub fn set_balance(&self, balance: U256) {
        *self.balance.lock().unwrap() = balance;
    }

    pub fn current_allowance(&self) -> U256 {
        *self.allowance.lock().unwrap()
    }

    pub fn fail_estimates(&self, err: ChainError) {
        *self.recorder.estimate_failure.lock().unwrap() = Some(err);
    }

    pub fn fail_estimate_for(&self, call: TokenCall, err: ChainError) {
        *self.recorder.estimate_failure_for.lock().unwrap() = Some((call, err));
    }

    pub fn fail_allowance_reads(&self, errors: Vec<ChainError>) {
        *self.allowance_read_failures.lock().unwrap() = errors.into();
    }

    pub fn delay_allowance_reads(&self, delay: Duration) {
        *self.allowance_delay.lock().unwrap() = Some(delay);
    }

    pub fn ignore_approvals(&self) {
        *self.ignore_approvals.lock().unwrap() = true;
    }

    pub fn estimate_count(&self) -> usize {
        self.recorder.estimates.load(Ordering::SeqCst)
    }

    pub fn allowance_reads(&self) -> usize {
        self.allowance_reads.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> Vec<TokenCall> {
        self.recorder.calls()
    }
}

#[async_trait]
impl Contract for MockToken {
    type Call = TokenCall;

    fn address(&self) -> Address {
        Self::ADDRESS
    }

    async fn estimate_gas(&self, call: &TokenCall) -> Result<u64, ChainError> {
        self.recorder.estimate(call, Self::GAS)
    }

    async fn send(&self, call: &TokenCall, overrides: &GasOverrides) -> Result<B256, ChainError> {
        let hash = self.recorder.send(call, overrides)?;
        let TokenCall::Approve { amount, .. } = call;
        if !*self.ignore_approvals.lock().unwrap() {
            *self.allowance.lock().unwrap() = *amount;
        }
        Ok(hash)
    }

    async fn confirm(&self, hash: B256, _confirmations: u64) -> Result<TxConfirmation, ChainError> {
        self.recorder.confirm(hash)
    }
}

#[async_trait]
impl FungibleToken for MockToken {
    async fn balance_of(&self, _owner: Address) -> Result<U256, ChainError> {
        Ok(*self.balance.lock().unwrap())
    }

    async fn allowance(&self, _owner: Address, _spender: Address) -> Result<U256, ChainError> {
        self.allowance_reads.fetch_add(1, Ordering::SeqCst);
        let delay = *self.allowance_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.allowance_read_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(*self.allowance.lock().unwrap())
    }

    fn approve_call(&self, spender: Address, amount: U256) -> TokenCall {
        TokenCall::Approve { spender, amount }
    }
}

/// Conditional tokens registry fake (ERC-1155 with operator approvals)
pub(crate) struct MockConditionalTokens {
    approved: Mutex<bool>,
    approval_read_failure: Mutex<Option<ChainError>>,
    approval_reads: AtomicUsize,
    balances: Mutex<HashMap<U256, U256>>,
    payout_denominator: Mutex<U256>,
    pub recorder: CallRecorder<RegistryCall>,
}

impl MockConditionalTokens {
    pub const ADDRESS: Address = Address::new([0xCC; 20]);
    pub const GAS: u64 = 48_000;

    pub fn new(approved: bool) -> Self {
        Self {
            approved: Mutex::new(approved),
            approval_read_failure: Mutex::new(None),
            approval_reads: AtomicUsize::new(0),
            balances: Mutex::new(HashMap::new()),
            payout_denominator: Mutex::new(U256::ZERO),
            recorder: CallRecorder::new(),
        }
    }

    pub fn set_balance(&self, id: U256, balance: U256) {
        self.balances.lock().unwrap().insert(id, balance);
    }

    pub fn resolve(&self) {
        *self.payout_denominator.lock().unwrap() = U256::from(1u64);
    }

    pub fn fail_approval_reads(&self, err: ChainError) {
        *self.approval_read_failure.lock().unwrap() = Some(err);
    }

    pub fn fail_estimates(&self, err: ChainError) {
        *self.recorder.estimate_failure.lock().unwrap() = Some(err);
    }

    pub fn approval_reads(&self) -> usize {
        self.approval_reads.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> Vec<RegistryCall> {
        self.recorder.calls()
    }
}

#[async_trait]
impl Contract for MockConditionalTokens {
    type Call = RegistryCall;

    fn address(&self) -> Address {
        Self::ADDRESS
    }

    async fn estimate_gas(&self, call: &RegistryCall) -> Result<u64, ChainError> {
        self.recorder.estimate(call, Self::GAS)
    }

    async fn send(&self, call: &RegistryCall, overrides: &GasOverrides) -> Result<B256, ChainError> {
        let hash = self.recorder.send(call, overrides)?;
        if let RegistryCall::SetApprovalForAll { approved, .. } = call {
            *self.approved.lock().unwrap() = *approved;
        }
        Ok(hash)
    }

    async fn confirm(&self, hash: B256, _confirmations: u64) -> Result<TxConfirmation, ChainError> {
        self.recorder.confirm(hash)
    }
}

#[async_trait]
impl SemiFungibleToken for MockConditionalTokens {
    async fn balance_of(&self, _owner: Address, id: U256) -> Result<U256, ChainError> {
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&id)
            .copied()
            .unwrap_or(U256::ZERO))
    }

    async fn is_approved_for_all(&self, _owner: Address, _operator: Address) -> Result<bool, ChainError> {
        self.approval_reads.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.approval_read_failure.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(*self.approved.lock().unwrap())
    }

    fn set_approval_call(&self, operator: Address, approved: bool) -> RegistryCall {
        RegistryCall::SetApprovalForAll { operator, approved }
    }
}

#[async_trait]
impl ConditionalTokens for MockConditionalTokens {
    async fn collection_id(
        &self,
        _parent_collection_id: B256,
        condition_id: B256,
        index_set: U256,
    ) -> Result<B256, ChainError> {
        Ok(B256::from(U256::from_be_bytes(condition_id.0) ^ index_set))
    }

    async fn position_id(&self, _collateral: Address, collection_id: B256) -> Result<U256, ChainError> {
        Ok(U256::from_be_bytes(collection_id.0))
    }

    async fn payout_denominator(&self, _condition_id: B256) -> Result<U256, ChainError> {
        Ok(*self.payout_denominator.lock().unwrap())
    }

    fn redeem_call(&self, collateral: Address, condition_id: B256, index_sets: Vec<U256>) -> RegistryCall {
        RegistryCall::RedeemPositions {
            collateral,
            parent_collection_id: B256::ZERO,
            condition_id,
            index_sets,
        }
    }
}

type QuoteFn = Box<dyn Fn(U256) -> Result<U256, ChainError> + Send + Sync>;

/// Market maker fake driven by a quote function
pub(crate) struct MockMarket {
    sell_quote: QuoteFn,
    buy_quote: QuoteFn,
    quotes: Mutex<Vec<U256>>,
    pub recorder: CallRecorder<MarketCall>,
}

impl MockMarket {
    pub const ADDRESS: Address = Address::new([0xBB; 20]);
    pub const GAS: u64 = 180_000;

    pub fn new<F>(sell_quote: F) -> Self
    where
        F: Fn(U256) -> Result<U256, ChainError> + Send + Sync + 'static,
    {
        Self {
            sell_quote: Box::new(sell_quote),
            buy_quote: Box::new(|investment: U256| Ok::<U256, ChainError>(investment)),
            quotes: Mutex::new(Vec::new()),
            recorder: CallRecorder::new(),
        }
    }

    pub fn with_buy_quote<F>(mut self, buy_quote: F) -> Self
    where
        F: Fn(U256) -> Result<U256, ChainError> + Send + Sync + 'static,
    {
        self.buy_quote = Box::new(buy_quote);
        self
    }

    pub fn quotes(&self) -> Vec<U256> {
        self.quotes.lock().unwrap().clone()
    }

    pub fn fail_estimates(&self, err: ChainError) {
        *self.recorder.estimate_failure.lock().unwrap() = Some(err);
    }

    pub fn submitted(&self) -> Vec<MarketCall> {
        self.recorder.calls()
    }
}

#[async_trait]
impl Contract for MockMarket {
    type Call = MarketCall;

    fn address(&self) -> Address {
        Self::ADDRESS
    }

    async fn estimate_gas(&self, call: &MarketCall) -> Result<u64, ChainError> {
        self.recorder.estimate(call, Self::GAS)
    }

    async fn send(&self, call: &MarketCall, overrides: &GasOverrides) -> Result<B256, ChainError> {
        self.recorder.send(call, overrides)
    }

    async fn confirm(&self, hash: B256, _confirmations: u64) -> Result<TxConfirmation, ChainError> {
        self.recorder.confirm(hash)
    }
}

#[async_trait]
impl Market for MockMarket {
    async fn calc_sell_amount(&self, return_amount: U256, _outcome_index: u64) -> Result<U256, ChainError> {
        self.quotes.lock().unwrap().push(return_amount);
        (self.sell_quote)(return_amount)
    }

    async fn calc_buy_amount(&self, investment: U256, _outcome_index: u64) -> Result<U256, ChainError> {
        (self.buy_quote)(investment)
    }

    fn buy_call(&self, investment: U256, outcome_index: u64, min_tokens: U256) -> MarketCall {
        MarketCall::Buy {
            investment,
            outcome_index,
            min_tokens,
        }
    }

    fn sell_call(&self, return_amount: U256, outcome_index: u64, max_tokens: U256) -> MarketCall {
        MarketCall::Sell {
            return_amount,
            outcome_index,
            max_tokens,
        }
    }
}
