//! Operation Orchestrator: sequences the allowance gate and the executor.
//!
//! # State machine
//!
//! ```text
//! idle → checkingAllowance → awaitingApprovalSignature → approvalPending → approvalConfirmed
//!                         ↘                                                   ↓ (continuation)
//! idle ───────────────────→ awaitingExecutionSignature → executionPending → confirmed
//!
//! any step → failed;  confirmed | failed → idle after the grace period
//! ```
//!
//! Only one request is in flight at a time. The guard on `idle`/terminal
//! and the first transition happen under the same lock, so a concurrent
//! `submit` observes the new state and is rejected.
//!
//! When an approval is needed, the original request is parked as a
//! [`PendingApprovalContinuation`] while the approval confirms and is
//! resumed automatically afterwards. A failed approval clears it.

use alloy_primitives::{Address, B256};
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use anchor_domain::{
    AssetDescriptor, Delegation, OperationId, OperationKind, OperationRequest, OperationState,
};
use anchor_exec::{AllowanceGate, ChainPort, ContractCall, Receipt, TransactionExecutor, TxHandle};

use crate::config::{Config, OrchestratorConfig};
use crate::error::{ClientError, ClientResult};
use crate::event_bus::{ClientEvent, EventBus, EventReceiver, TxPurpose};

// =============================================================================
// Machine
// =============================================================================

/// A request parked until its approval confirms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingApprovalContinuation {
    /// Request to resume
    pub request: OperationRequest,
    /// Approval transaction it waits for
    pub approval_tx: B256,
}

#[derive(Debug, Default)]
struct Machine {
    state: OperationState,
    operation_id: Option<OperationId>,
    kind: Option<OperationKind>,
    continuation: Option<PendingApprovalContinuation>,
    /// Bumped per request; a stale reset timer must not touch a newer one
    generation: u64,
}

fn lock(machine: &Mutex<Machine>) -> MutexGuard<'_, Machine> {
    machine.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Drives one operation request at a time to completion.
pub struct OperationOrchestrator<C: ChainPort + 'static> {
    executor: Arc<TransactionExecutor<C>>,
    gate: AllowanceGate<C>,
    /// Collateral engine; also the spender of every approval
    engine: Address,
    stablecoin: AssetDescriptor,
    config: OrchestratorConfig,
    machine: Arc<Mutex<Machine>>,
    events: Arc<EventBus>,
    cancel: CancellationToken,
}

impl<C: ChainPort + 'static> OperationOrchestrator<C> {
    /// Create an orchestrator for the configured account.
    ///
    /// # Errors
    /// `ClientError::Config` if no account is configured.
    pub fn new(chain: Arc<C>, config: &Config, events: Arc<EventBus>) -> ClientResult<Self> {
        let account = config.require_account()?;
        let executor = Arc::new(
            TransactionExecutor::new(chain, account, config.orchestrator.receipt_poll_interval)
                .with_read_timeout(config.orchestrator.rpc_timeout),
        );

        Ok(Self {
            gate: AllowanceGate::new(executor.clone()),
            executor,
            engine: config.chain.engine_address,
            stablecoin: config.chain.stablecoin.clone(),
            config: config.orchestrator.clone(),
            machine: Arc::new(Mutex::new(Machine::default())),
            events,
            cancel: CancellationToken::new(),
        })
    }

    /// Current state
    pub fn state(&self) -> OperationState {
        lock(&self.machine).state
    }

    /// Request in flight (or just settled)
    pub fn operation_id(&self) -> Option<OperationId> {
        lock(&self.machine).operation_id
    }

    /// Whether a request is parked behind an approval
    pub fn has_pending_continuation(&self) -> bool {
        lock(&self.machine).continuation.is_some()
    }

    /// Subscribe to the status stream.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Sending account
    pub fn account(&self) -> Address {
        self.executor.account()
    }

    /// Submit `request` and drive it to a terminal state.
    ///
    /// # Errors
    /// - `OperationInProgress` if another request has not settled
    /// - `SignatureRejected`, `SimulationReverted`, `ExecutionReverted`
    ///   with the wallet's or contract's reason
    /// - `ConfirmationTimeout` when the wait ended but the transaction may
    ///   still land; re-query with [`Self::check_transaction`]
    /// - `Chain` when a read or simulation fails or exceeds `rpc_timeout`
    /// - `Cancelled` when [`Self::shutdown`] interrupts any step
    pub async fn submit(&self, request: OperationRequest) -> ClientResult<Receipt> {
        if self.cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        let delegation = request.delegation(&self.stablecoin);
        let first = match delegation {
            Some(_) => OperationState::CheckingAllowance,
            None => OperationState::AwaitingExecutionSignature,
        };

        let started = {
            let mut machine = lock(&self.machine);
            if machine.state.accepts_new_request() {
                let from = machine.state;
                machine.state = first;
                machine.operation_id = Some(request.id());
                machine.kind = Some(request.kind());
                machine.continuation = None;
                machine.generation += 1;
                Ok((from, machine.generation))
            } else {
                Err(machine.state)
            }
        };

        let (from, generation) = match started {
            Ok(started) => started,
            Err(state) => {
                warn!(
                    operation_id = %request.id(),
                    kind = %request.kind(),
                    state = %state,
                    "Submit rejected, operation in progress"
                );
                return Err(ClientError::OperationInProgress { state });
            }
        };

        info!(
            operation_id = %request.id(),
            kind = %request.kind(),
            asset = %request.asset().symbol,
            amount = %request.amount(),
            "Operation submitted"
        );
        self.emit_state_changed(Some(request.id()), Some(request.kind()), from, first);

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!(operation_id = %request.id(), "Operation interrupted by shutdown");
                Err(ClientError::Cancelled)
            }
            result = self.drive(&request, delegation) => result,
        };

        if let Err(ref err) = result {
            self.fail(&request, err);
        }
        self.schedule_reset(generation);

        result
    }

    /// Single receipt lookup, e.g. after a `ConfirmationTimeout`.
    pub async fn check_transaction(&self, tx_hash: B256) -> ClientResult<Option<Receipt>> {
        Ok(self.executor.check(tx_hash).await?)
    }

    /// Interrupt the request in flight, whatever step it is on, and reject
    /// new requests.
    ///
    /// Broadcast transactions are unaffected.
    pub fn shutdown(&self) {
        info!("Orchestrator shutdown requested");
        self.cancel.cancel();
    }

    async fn drive(
        &self,
        request: &OperationRequest,
        delegation: Option<Delegation>,
    ) -> ClientResult<Receipt> {
        let Some(delegation) = delegation else {
            return self.execute(request).await;
        };

        let check = self
            .gate
            .ensure_allowance(self.executor.account(), self.engine, delegation.token, delegation.amount)
            .await?;

        if check.sufficient {
            self.transition(OperationState::AwaitingExecutionSignature)?;
            return self.execute(request).await;
        }

        debug!(
            operation_id = %request.id(),
            current = %check.current,
            required = %check.required,
            "Allowance insufficient, requesting approval"
        );
        self.transition(OperationState::AwaitingApprovalSignature)?;

        let approval = self
            .gate
            .request_approval(delegation.token, self.engine, delegation.amount)
            .await?;
        self.park(request, &approval);
        self.transition(OperationState::ApprovalPending)?;
        self.emit_submitted(request.id(), TxPurpose::Approval, approval.hash);

        self.executor
            .await_confirmation(&approval, self.config.confirmation_timeout, &self.cancel)
            .await?;
        self.transition(OperationState::ApprovalConfirmed)?;

        let continuation = lock(&self.machine).continuation.take().ok_or_else(|| {
            ClientError::InvalidRequest("approval confirmed without a parked request".to_string())
        })?;
        info!(
            operation_id = %continuation.request.id(),
            approval_tx = %continuation.approval_tx,
            "Approval confirmed, resuming operation"
        );

        self.transition(OperationState::AwaitingExecutionSignature)?;
        self.execute(&continuation.request).await
    }

    async fn execute(&self, request: &OperationRequest) -> ClientResult<Receipt> {
        let call = ContractCall::for_request(self.engine, request)?;
        let handle = self.executor.execute(&call).await?;

        self.transition(OperationState::ExecutionPending)?;
        self.emit_submitted(request.id(), TxPurpose::Execution, handle.hash);

        let receipt = self
            .executor
            .await_confirmation(&handle, self.config.confirmation_timeout, &self.cancel)
            .await?;

        self.transition(OperationState::Confirmed)?;
        info!(
            operation_id = %request.id(),
            kind = %request.kind(),
            tx_hash = %receipt.tx_hash,
            block = receipt.block_number,
            "Operation confirmed"
        );
        self.events.send(ClientEvent::OperationConfirmed {
            operation_id: request.id(),
            receipt: receipt.clone(),
        });

        Ok(receipt)
    }

    fn park(&self, request: &OperationRequest, approval: &TxHandle) {
        lock(&self.machine).continuation = Some(PendingApprovalContinuation {
            request: request.clone(),
            approval_tx: approval.hash,
        });
    }

    fn transition(&self, to: OperationState) -> ClientResult<()> {
        let (from, operation_id, kind) = {
            let mut machine = lock(&self.machine);
            let from = machine.state;
            machine.state = from.transition(to)?;
            (from, machine.operation_id, machine.kind)
        };

        self.emit_state_changed(operation_id, kind, from, to);
        Ok(())
    }

    fn fail(&self, request: &OperationRequest, err: &ClientError) {
        let from = {
            let mut machine = lock(&self.machine);
            machine.continuation = None;
            let from = machine.state;
            if from.can_transition_to(OperationState::Failed) {
                machine.state = OperationState::Failed;
                Some(from)
            } else {
                None
            }
        };

        if let Some(from) = from {
            self.emit_state_changed(
                Some(request.id()),
                Some(request.kind()),
                from,
                OperationState::Failed,
            );
        }

        if err.is_soft() {
            warn!(operation_id = %request.id(), error = %err, "Operation wait ended");
        } else {
            error!(operation_id = %request.id(), error = %err, "Operation failed");
        }
        self.events.send(ClientEvent::OperationFailed {
            operation_id: request.id(),
            reason: err.to_string(),
        });
    }

    /// Return to `idle` after the grace period, unless a newer request
    /// has started meanwhile.
    fn schedule_reset(&self, generation: u64) {
        let machine = self.machine.clone();
        let events = self.events.clone();
        let cancel = self.cancel.clone();
        let grace = self.config.completion_grace;

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(grace) => {}
            }

            let reset = {
                let mut machine = lock(&machine);
                if machine.generation == generation && machine.state.is_terminal() {
                    let from = machine.state;
                    let operation_id = machine.operation_id.take();
                    let kind = machine.kind.take();
                    machine.state = OperationState::Idle;
                    Some((from, operation_id, kind))
                } else {
                    None
                }
            };

            if let Some((from, operation_id, kind)) = reset {
                debug!(from = %from, "Grace period elapsed, back to idle");
                events.send(ClientEvent::StateChanged {
                    operation_id,
                    kind,
                    from,
                    to: OperationState::Idle,
                    timestamp: Utc::now(),
                });
            }
        });
    }

    fn emit_state_changed(
        &self,
        operation_id: Option<OperationId>,
        kind: Option<OperationKind>,
        from: OperationState,
        to: OperationState,
    ) {
        info!(operation_id = ?operation_id, from = %from, to = %to, "State transition");
        self.events.send(ClientEvent::StateChanged {
            operation_id,
            kind,
            from,
            to,
            timestamp: Utc::now(),
        });
    }

    fn emit_submitted(&self, operation_id: OperationId, purpose: TxPurpose, tx_hash: B256) {
        self.events.send(ClientEvent::TransactionSubmitted {
            operation_id,
            purpose,
            tx_hash,
            timestamp: Utc::now(),
        });
    }
}

impl<C: ChainPort + 'static> Drop for OperationOrchestrator<C> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// =============================================================================
// Tests
// =============================================================================
