//! Transaction Executor: simulate, submit, await confirmation.
//!
//! # Flow
//!
//! ```text
//! ContractCall → simulate (material calls only) → submit (signature) → poll receipt
//! ```
//!
//! The confirmation wait is the only long-blocking step. It is bounded by an
//! optional timeout and stops on cancellation; neither affects a transaction
//! that was already broadcast. Reads and simulations are bounded by the read
//! timeout and fail with `ExecError::Rpc` when it elapses.

use alloy_primitives::{Address, B256};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ExecError, ExecResult};
use anchor_domain::ScaledAmount;

use crate::ports::{ChainPort, ContractCall, Receipt, ReceiptStatus, SimulationOutcome, TxHandle};

/// Default receipt polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Default bound on a single chain read or simulation.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Executes contract calls on behalf of one account.
pub struct TransactionExecutor<C: ChainPort> {
    /// Chain port for simulation, signing and receipts
    chain: Arc<C>,
    /// Sender of every transaction
    account: Address,
    /// Delay between receipt lookups
    poll_interval: Duration,
    /// Bound on each read, simulation and receipt lookup
    read_timeout: Duration,
}

impl<C: ChainPort> TransactionExecutor<C> {
    /// Create a new executor.
    pub fn new(chain: Arc<C>, account: Address, poll_interval: Duration) -> Self {
        Self { chain, account, poll_interval, read_timeout: DEFAULT_READ_TIMEOUT }
    }

    /// Override the bound on chain reads and simulations.
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Sending account
    pub fn account(&self) -> Address {
        self.account
    }

    /// Read `IERC20(token).allowance(owner, spender)`.
    pub async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> ExecResult<ScaledAmount> {
        self.bounded("allowance", self.chain.allowance(token, owner, spender)).await
    }

    /// Simulate `call` against current state.
    ///
    /// # Errors
    /// `ExecError::SimulationReverted` with the contract's reason verbatim.
    pub async fn simulate(&self, call: &ContractCall) -> ExecResult<()> {
        match self.bounded(call.name(), self.chain.simulate(call, self.account)).await? {
            SimulationOutcome::Ok => {
                debug!(function = call.name(), to = %call.to, "Simulation passed");
                Ok(())
            }
            SimulationOutcome::Reverted { reason } => {
                warn!(function = call.name(), %reason, "Simulation reverted");
                Err(ExecError::SimulationReverted {
                    function: call.name().to_string(),
                    reason,
                })
            }
        }
    }

    /// Request a signature and broadcast `call` without simulating.
    pub async fn submit(&self, call: &ContractCall) -> ExecResult<TxHandle> {
        let handle = self.chain.submit(call, self.account).await?;
        info!(
            function = call.name(),
            to = %call.to,
            tx_hash = %handle.hash,
            "Transaction submitted"
        );
        Ok(handle)
    }

    /// Simulate (when the call mutates material state) then submit.
    ///
    /// A failing simulation returns before any signature is requested.
    pub async fn execute(&self, call: &ContractCall) -> ExecResult<TxHandle> {
        if call.requires_simulation() {
            self.simulate(call).await?;
        }
        self.submit(call).await
    }

    /// Single receipt lookup, no waiting.
    pub async fn check(&self, tx_hash: B256) -> ExecResult<Option<Receipt>> {
        self.bounded("receipt", self.chain.receipt(tx_hash)).await
    }

    async fn bounded<T>(
        &self,
        what: &str,
        read: impl Future<Output = ExecResult<T>>,
    ) -> ExecResult<T> {
        match tokio::time::timeout(self.read_timeout, read).await {
            Ok(result) => result,
            Err(_) => {
                warn!(what, limit = ?self.read_timeout, "Chain read timed out");
                Err(ExecError::Rpc(format!(
                    "{} timed out after {:?}",
                    what, self.read_timeout
                )))
            }
        }
    }

    /// Wait until `handle` is mined.
    ///
    /// # Errors
    /// - `ExecError::ExecutionReverted` if mined with a failed status
    /// - `ExecError::ConfirmationTimeout` once `timeout` elapses
    /// - `ExecError::Cancelled` when `cancel` fires
    pub async fn await_confirmation(
        &self,
        handle: &TxHandle,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> ExecResult<Receipt> {
        let wait = self.poll_receipt(handle);

        let bounded = async move {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, wait).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(tx_hash = %handle.hash, ?limit, "Confirmation wait timed out");
                        Err(ExecError::ConfirmationTimeout { tx_hash: handle.hash })
                    }
                },
                None => wait.await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(tx_hash = %handle.hash, "Confirmation wait cancelled");
                Err(ExecError::Cancelled)
            }
            result = bounded => result,
        }
    }

    async fn poll_receipt(&self, handle: &TxHandle) -> ExecResult<Receipt> {
        loop {
            if let Some(receipt) = self.check(handle.hash).await? {
                return match &receipt.status {
                    ReceiptStatus::Success => {
                        info!(
                            tx_hash = %receipt.tx_hash,
                            block = receipt.block_number,
                            "Transaction confirmed"
                        );
                        Ok(receipt)
                    }
                    ReceiptStatus::Reverted { reason } => Err(ExecError::ExecutionReverted {
                        tx_hash: receipt.tx_hash,
                        reason: reason.clone(),
                    }),
                };
            }

            debug!(tx_hash = %handle.hash, "Receipt pending");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ContractFunction;
    use crate::stub::StubChain;
    use anchor_domain::ScaledAmount;
    use alloy_primitives::U256;

    const ACCOUNT: Address = Address::repeat_byte(0xac);
    const ENGINE: Address = Address::repeat_byte(0xee);

    fn mint_call() -> ContractCall {
        ContractCall {
            to: ENGINE,
            function: ContractFunction::MintStablecoin {
                amount: ScaledAmount::from_base_units(U256::from(100u64)),
            },
        }
    }

    fn executor(chain: Arc<StubChain>) -> TransactionExecutor<StubChain> {
        TransactionExecutor::new(chain, ACCOUNT, Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_simulation_failure_prevents_signature() {
        let chain = Arc::new(StubChain::new());
        chain.set_revert("mintAUSD", "AUSDEngine__BreaksHealthFactor");
        let executor = executor(chain.clone());

        let err = executor.execute(&mint_call()).await.unwrap_err();
        assert_eq!(
            err,
            ExecError::SimulationReverted {
                function: "mintAUSD".to_string(),
                reason: "AUSDEngine__BreaksHealthFactor".to_string(),
            }
        );
        assert_eq!(chain.signature_requests(), 0);
    }

    #[tokio::test]
    async fn test_execute_and_confirm() {
        let chain = Arc::new(StubChain::new());
        let executor = executor(chain.clone());

        let handle = executor.execute(&mint_call()).await.unwrap();
        let receipt = executor
            .await_confirmation(&handle, None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(receipt.tx_hash, handle.hash);
        assert_eq!(receipt.status, ReceiptStatus::Success);
        assert_eq!(chain.simulations(), 1);
        assert_eq!(chain.signature_requests(), 1);
    }

    #[tokio::test]
    async fn test_reverted_receipt_surfaces_reason() {
        let chain = Arc::new(StubChain::new());
        chain.revert_next_receipt("AUSDEngine__HealthFactorOk");
        let executor = executor(chain);

        let handle = executor.execute(&mint_call()).await.unwrap();
        let err = executor
            .await_confirmation(&handle, None, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ExecError::ExecutionReverted { ref reason, .. } if reason == "AUSDEngine__HealthFactorOk"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_timeout() {
        let chain = Arc::new(StubChain::new());
        chain.hold_receipts(true);
        let executor = executor(chain.clone());

        let handle = executor.execute(&mint_call()).await.unwrap();
        let err = executor
            .await_confirmation(&handle, Some(Duration::from_secs(5)), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err, ExecError::ConfirmationTimeout { tx_hash: handle.hash });

        // The transaction can still land afterwards
        chain.release(handle.hash);
        assert!(executor.check(handle.hash).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_waiting() {
        let chain = Arc::new(StubChain::new());
        chain.hold_receipts(true);
        let executor = executor(chain);
        let cancel = CancellationToken::new();

        let handle = executor.execute(&mint_call()).await.unwrap();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });

        let err = executor.await_confirmation(&handle, None, &cancel).await.unwrap_err();
        assert_eq!(err, ExecError::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_simulation_times_out() {
        let chain = Arc::new(StubChain::new());
        chain.stall_reads(true);
        let executor = executor(chain.clone()).with_read_timeout(Duration::from_secs(5));

        let err = executor.execute(&mint_call()).await.unwrap_err();
        assert!(matches!(err, ExecError::Rpc(ref msg) if msg.contains("mintAUSD")));
        assert_eq!(chain.signature_requests(), 0);

        let err = executor.allowance(ENGINE, ACCOUNT, ENGINE).await.unwrap_err();
        assert!(matches!(err, ExecError::Rpc(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_released() {
        let chain = Arc::new(StubChain::new());
        chain.hold_receipts(true);
        let executor = Arc::new(executor(chain.clone()));

        let handle = executor.execute(&mint_call()).await.unwrap();

        let waiter = {
            let executor = executor.clone();
            let handle = handle.clone();
            tokio::spawn(async move {
                executor.await_confirmation(&handle, None, &CancellationToken::new()).await
            })
        };

        tokio::time::sleep(Duration::from_millis(450)).await;
        assert!(!waiter.is_finished());
        chain.release(handle.hash);

        let receipt = waiter.await.unwrap().unwrap();
        assert_eq!(receipt.tx_hash, handle.hash);
        assert!(chain.receipt_lookups() >= 5);
    }
}
