//! Stub implementations for testing.
//!
//! These implementations simulate chain and projection behavior
//! without touching a node or the query API.

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anchor_domain::{HealthFactor, HealthFactorProjection, ScaledAmount};

use crate::error::{ExecError, ExecResult};
use crate::ports::{
    ChainPort, ContractCall, ContractFunction, ProjectionPort, ProjectionQuery, Receipt,
    ReceiptStatus, SimulationOutcome, TxHandle,
};

// =============================================================================
// Stub Chain
// =============================================================================

struct StubTx {
    nonce: u64,
    call: ContractCall,
    from: Address,
    held: bool,
    outcome: ReceiptStatus,
    mined: Option<Receipt>,
}

#[derive(Default)]
struct ChainState {
    allowances: HashMap<(Address, Address, Address), ScaledAmount>,
    reverts: HashMap<String, String>,
    reject_next_signature: bool,
    fail_next_read: bool,
    stall_reads: bool,
    hold_receipts: bool,
    revert_next_receipt: Option<String>,
    txs: HashMap<B256, StubTx>,
    submitted: Vec<ContractCall>,
    nonce: u64,
    block: u64,
    simulations: usize,
    signature_requests: usize,
    receipt_lookups: usize,
}

/// In-memory chain for testing.
///
/// Transactions are mined on the first receipt lookup unless receipts are
/// held. A mined approval sets the allowance it names, like ERC-20 does.
#[derive(Default)]
pub struct StubChain {
    state: Mutex<ChainState>,
}

impl StubChain {
    /// Create an empty chain: zero allowances, every simulation passes.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set `IERC20(token).allowance(owner, spender)`.
    pub fn set_allowance(&self, token: Address, owner: Address, spender: Address, amount: ScaledAmount) {
        self.state().allowances.insert((token, owner, spender), amount);
    }

    /// Make every simulation of `function` revert with `reason`.
    pub fn set_revert(&self, function: &str, reason: &str) {
        self.state().reverts.insert(function.to_string(), reason.to_string());
    }

    /// The next signature request is declined.
    pub fn reject_next_signature(&self) {
        self.state().reject_next_signature = true;
    }

    /// The next allowance read fails with an RPC error.
    pub fn fail_next_read(&self) {
        self.state().fail_next_read = true;
    }

    /// While set, allowance reads and simulations never answer.
    pub fn stall_reads(&self, stall: bool) {
        self.state().stall_reads = stall;
    }

    /// While set, newly submitted transactions stay pending until released.
    pub fn hold_receipts(&self, hold: bool) {
        self.state().hold_receipts = hold;
    }

    /// The next submitted transaction is mined with a reverted status.
    pub fn revert_next_receipt(&self, reason: &str) {
        self.state().revert_next_receipt = Some(reason.to_string());
    }

    /// Let a held transaction be mined.
    pub fn release(&self, hash: B256) {
        if let Some(tx) = self.state().txs.get_mut(&hash) {
            tx.held = false;
        }
    }

    /// Mine a held transaction as reverted.
    pub fn revert_held(&self, hash: B256, reason: &str) {
        if let Some(tx) = self.state().txs.get_mut(&hash) {
            tx.outcome = ReceiptStatus::Reverted { reason: reason.to_string() };
            tx.held = false;
        }
    }

    /// Calls broadcast so far, in order.
    pub fn submitted_calls(&self) -> Vec<ContractCall> {
        self.state().submitted.clone()
    }

    /// Hashes of transactions broadcast but not yet mined.
    pub fn pending_hashes(&self) -> Vec<B256> {
        let state = self.state();
        let mut pending: Vec<(u64, B256)> = state
            .txs
            .iter()
            .filter(|(_, tx)| tx.mined.is_none())
            .map(|(hash, tx)| (tx.nonce, *hash))
            .collect();
        pending.sort();
        pending.into_iter().map(|(_, hash)| hash).collect()
    }

    /// Number of simulations run
    pub fn simulations(&self) -> usize {
        self.state().simulations
    }

    /// Number of signature requests, declined ones included
    pub fn signature_requests(&self) -> usize {
        self.state().signature_requests
    }

    /// Number of receipt lookups
    pub fn receipt_lookups(&self) -> usize {
        self.state().receipt_lookups
    }
}

#[async_trait]
impl ChainPort for StubChain {
    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> ExecResult<ScaledAmount> {
        let stalled = self.state().stall_reads;
        if stalled {
            std::future::pending::<()>().await;
        }

        let mut state = self.state();
        if std::mem::take(&mut state.fail_next_read) {
            return Err(ExecError::Rpc("Simulated RPC failure".to_string()));
        }
        Ok(state
            .allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or(ScaledAmount::ZERO))
    }

    async fn simulate(&self, call: &ContractCall, _from: Address) -> ExecResult<SimulationOutcome> {
        let stalled = self.state().stall_reads;
        if stalled {
            std::future::pending::<()>().await;
        }

        let mut state = self.state();
        state.simulations += 1;

        Ok(match state.reverts.get(call.name()) {
            Some(reason) => SimulationOutcome::Reverted { reason: reason.clone() },
            None => SimulationOutcome::Ok,
        })
    }

    async fn submit(&self, call: &ContractCall, from: Address) -> ExecResult<TxHandle> {
        let mut state = self.state();
        state.signature_requests += 1;

        if std::mem::take(&mut state.reject_next_signature) {
            return Err(ExecError::SignatureRejected("User rejected the request".to_string()));
        }

        state.nonce += 1;
        let nonce = state.nonce;
        let hash = B256::left_padding_from(&nonce.to_be_bytes());
        let outcome = match state.revert_next_receipt.take() {
            Some(reason) => ReceiptStatus::Reverted { reason },
            None => ReceiptStatus::Success,
        };
        let held = state.hold_receipts;

        state.submitted.push(call.clone());
        state.txs.insert(
            hash,
            StubTx { nonce, call: call.clone(), from, held, outcome, mined: None },
        );

        tracing::debug!(function = call.name(), tx_hash = %hash, "Stub: transaction broadcast");

        Ok(TxHandle {
            hash,
            function: call.name().to_string(),
            submitted_at: Utc::now(),
        })
    }

    async fn receipt(&self, tx_hash: B256) -> ExecResult<Option<Receipt>> {
        let mut guard = self.state();
        let state = &mut *guard;
        state.receipt_lookups += 1;

        let Some(stub_tx) = state.txs.get_mut(&tx_hash) else {
            return Err(ExecError::Rpc(format!("Unknown transaction {}", tx_hash)));
        };

        if stub_tx.mined.is_none() && !stub_tx.held {
            state.block += 1;
            let receipt = Receipt {
                tx_hash,
                block_number: state.block,
                gas_used: 50_000,
                status: stub_tx.outcome.clone(),
            };

            if receipt.status == ReceiptStatus::Success {
                if let ContractFunction::Approve { spender, amount } = stub_tx.call.function {
                    state.allowances.insert((stub_tx.call.to, stub_tx.from, spender), amount);
                }
            }
            stub_tx.mined = Some(receipt);
        }

        Ok(stub_tx.mined.clone())
    }
}

// =============================================================================
// Stub Projections
// =============================================================================

#[derive(Default)]
struct ProjectionState {
    canned: HashMap<&'static str, HealthFactorProjection>,
    queries: Vec<ProjectionQuery>,
    delay: Option<Duration>,
    failing: bool,
}

/// Stub projection source for testing.
///
/// Without a canned result, a query for amount `n` projects debt,
/// collateral value and raw health factor all equal to `n`, so tests can
/// tell which input a result belongs to.
#[derive(Default)]
pub struct StubProjections {
    state: Mutex<ProjectionState>,
}

fn query_key(query: &ProjectionQuery) -> &'static str {
    match query {
        ProjectionQuery::Mint { .. } => "mint",
        ProjectionQuery::Burn { .. } => "burn",
        ProjectionQuery::Deposit { .. } => "deposit",
        ProjectionQuery::Redeem { .. } => "redeem",
    }
}

fn query_amount(query: &ProjectionQuery) -> ScaledAmount {
    match *query {
        ProjectionQuery::Mint { amount }
        | ProjectionQuery::Burn { amount }
        | ProjectionQuery::Deposit { amount, .. }
        | ProjectionQuery::Redeem { amount, .. } => amount,
    }
}

impl StubProjections {
    /// Create a stub with echo projections and no delay.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ProjectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Canned result for every query of `kind` ("mint", "burn", "deposit", "redeem").
    pub fn set_projection(&self, kind: &'static str, projection: HealthFactorProjection) {
        self.state().canned.insert(kind, projection);
    }

    /// Delay every answer (simulates a slow query API).
    pub fn set_delay(&self, delay: Duration) {
        self.state().delay = Some(delay);
    }

    /// Make every query fail.
    pub fn set_failing(&self, failing: bool) {
        self.state().failing = failing;
    }

    /// Queries received so far
    pub fn queries(&self) -> Vec<ProjectionQuery> {
        self.state().queries.clone()
    }

    /// Number of queries received
    pub fn call_count(&self) -> usize {
        self.state().queries.len()
    }
}

#[async_trait]
impl ProjectionPort for StubProjections {
    async fn project(
        &self,
        _account: Address,
        query: &ProjectionQuery,
    ) -> ExecResult<HealthFactorProjection> {
        let (delay, failing, canned) = {
            let mut state = self.state();
            state.queries.push(*query);
            (state.delay, state.failing, state.canned.get(query_key(query)).copied())
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if failing {
            return Err(ExecError::Query("Simulated query failure".to_string()));
        }

        Ok(canned.unwrap_or_else(|| {
            let amount = query_amount(query);
            HealthFactorProjection {
                health_factor: HealthFactor::from_raw(amount.as_u256()),
                projected_debt: amount,
                projected_collateral_value: amount,
            }
        }))
    }
}
