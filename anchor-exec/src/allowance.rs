//! Allowance Gate: token delegation checks and approvals.

use alloy_primitives::Address;
use std::sync::Arc;
use tracing::{debug, info};

use anchor_domain::ScaledAmount;

use crate::error::ExecResult;
use crate::executor::TransactionExecutor;
use crate::ports::{ChainPort, ContractCall, TxHandle};

/// Result of an allowance read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllowanceCheck {
    /// Current delegation covers the required amount
    pub sufficient: bool,
    /// Delegation currently on chain
    pub current: ScaledAmount,
    /// Amount the operation needs
    pub required: ScaledAmount,
}

/// Decides whether a delegation is sufficient and requests approvals.
///
/// # Invariants
/// - Reads never mutate state.
/// - Approvals are always for exactly the amount the triggering operation
///   needs, never rounded up.
pub struct AllowanceGate<C: ChainPort> {
    executor: Arc<TransactionExecutor<C>>,
}

impl<C: ChainPort> AllowanceGate<C> {
    /// Create a gate submitting approvals through `executor`.
    pub fn new(executor: Arc<TransactionExecutor<C>>) -> Self {
        Self { executor }
    }

    /// Compare `owner`'s delegation to `spender` on `token` with `required`.
    ///
    /// Equality is sufficient.
    pub async fn ensure_allowance(
        &self,
        owner: Address,
        spender: Address,
        token: Address,
        required: ScaledAmount,
    ) -> ExecResult<AllowanceCheck> {
        let current = self.executor.allowance(token, owner, spender).await?;
        let sufficient = current >= required;

        debug!(
            %token,
            %owner,
            %spender,
            current = %current,
            required = %required,
            sufficient,
            "Allowance checked"
        );

        Ok(AllowanceCheck { sufficient, current, required })
    }

    /// Submit an approval of exactly `amount` and return without waiting.
    ///
    /// Completion is observed through
    /// [`TransactionExecutor::await_confirmation`] on the returned handle.
    pub async fn request_approval(
        &self,
        token: Address,
        spender: Address,
        amount: ScaledAmount,
    ) -> ExecResult<TxHandle> {
        let call = ContractCall::approve(token, spender, amount);
        let handle = self.executor.submit(&call).await?;

        info!(%token, %spender, amount = %amount, tx_hash = %handle.hash, "Approval requested");
        Ok(handle)
    }
}
