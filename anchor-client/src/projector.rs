//! Health-Factor Projector: debounced "what if" reads.
//!
//! Runs as a background task next to the orchestrator and never blocks on
//! it. Every input change restarts the quiet period; once it elapses the
//! latest input is projected through the `ProjectionPort`. A newer input
//! supersedes a projection that is still in flight, and a result is only
//! published while its generation is still the current one.
//!
//! # Flow
//!
//! ```text
//! update(input) → generation += 1, publish Pending
//!              → worker: debounce → project_once → publish Ready | Unavailable
//! ```

use alloy_primitives::Address;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use anchor_domain::{
    DomainError, HealthFactorProjection, LiquidationThreshold, OperationKind, OperationRequest,
    ScaledAmount,
};
use anchor_exec::{ExecError, ExecResult, ProjectionPort, ProjectionQuery};

use crate::config::ProjectorConfig;

// =============================================================================
// Types
// =============================================================================

/// Inputs of one projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectionInput {
    /// Operation being considered
    pub kind: OperationKind,
    /// Primary amount (redeem amount for redeem-and-burn)
    pub amount: ScaledAmount,
    /// Burn amount of a redeem-and-burn
    pub burn_amount: Option<ScaledAmount>,
    /// Token the amount is denominated in
    pub asset: Address,
}

impl ProjectionInput {
    /// Projection input for a fully built request.
    pub fn from_request(request: &OperationRequest) -> Self {
        Self {
            kind: request.kind(),
            amount: request.amount(),
            burn_amount: request.secondary_amount(),
            asset: request.asset().address,
        }
    }
}

/// What the display should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionUpdate {
    /// No input
    Cleared,
    /// Waiting for the quiet period or for the read
    Pending,
    /// Projection for `input`
    Ready {
        /// Inputs the projection belongs to
        input: ProjectionInput,
        /// Projected position
        projection: HealthFactorProjection,
    },
    /// The read failed or the operation has no projection
    Unavailable {
        /// Inputs that could not be projected
        input: ProjectionInput,
    },
}

impl ProjectionUpdate {
    /// Projection, if one is available.
    pub fn projection(&self) -> Option<&HealthFactorProjection> {
        match self {
            ProjectionUpdate::Ready { projection, .. } => Some(projection),
            _ => None,
        }
    }

    /// Advisory: the projected position would be liquidatable.
    pub fn breaks_minimum(&self) -> bool {
        self.projection().is_some_and(HealthFactorProjection::breaks_minimum)
    }
}

/// Published state, tagged with the input generation it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionSnapshot {
    /// Input generation
    pub generation: u64,
    /// Current update
    pub update: ProjectionUpdate,
}

#[derive(Debug, Clone, Default)]
struct InputSlot {
    generation: u64,
    input: Option<ProjectionInput>,
}

// =============================================================================
// Single projection
// =============================================================================

/// Project `input` once, without debouncing.
///
/// Redeem-and-burn issues the burn and redeem reads concurrently and
/// derives one health factor from the burn leg's debt and the redeem leg's
/// collateral value. Liquidation has no projection and returns `None`.
pub async fn project_once<P: ProjectionPort + ?Sized>(
    port: &P,
    account: Address,
    input: &ProjectionInput,
    threshold: LiquidationThreshold,
) -> ExecResult<Option<HealthFactorProjection>> {
    let amount = input.amount;

    let projection = match input.kind {
        OperationKind::Mint => port.project(account, &ProjectionQuery::Mint { amount }).await?,
        OperationKind::Burn => port.project(account, &ProjectionQuery::Burn { amount }).await?,
        OperationKind::Deposit => {
            let query = ProjectionQuery::Deposit { token: input.asset, amount };
            port.project(account, &query).await?
        }
        OperationKind::Redeem => {
            let query = ProjectionQuery::Redeem { token: input.asset, amount };
            port.project(account, &query).await?
        }
        OperationKind::RedeemAndBurn => {
            let burn = input.burn_amount.ok_or_else(|| {
                ExecError::Domain(DomainError::InvalidRequest(
                    "redeemAndBurn projection requires a burn amount".to_string(),
                ))
            })?;
            let burn_query = ProjectionQuery::Burn { amount: burn };
            let redeem_query = ProjectionQuery::Redeem { token: input.asset, amount };

            let (burn_leg, redeem_leg) = tokio::try_join!(
                port.project(account, &burn_query),
                port.project(account, &redeem_query)
            )?;
            HealthFactorProjection::combine_redeem_and_burn(&burn_leg, &redeem_leg, threshold)
        }
        OperationKind::Liquidate => return Ok(None),
    };

    Ok(Some(projection))
}

// =============================================================================
// Projector
// =============================================================================

/// Debounced background projector for one account.
pub struct HealthProjector {
    input_tx: watch::Sender<InputSlot>,
    output_tx: Arc<watch::Sender<ProjectionSnapshot>>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl HealthProjector {
    /// Spawn the projector task on the current runtime.
    pub fn spawn<P: ProjectionPort + 'static>(
        port: Arc<P>,
        account: Address,
        config: &ProjectorConfig,
    ) -> Self {
        let (input_tx, input_rx) = watch::channel(InputSlot::default());
        let (output_tx, _) = watch::channel(ProjectionSnapshot {
            generation: 0,
            update: ProjectionUpdate::Cleared,
        });
        let output_tx = Arc::new(output_tx);
        let cancel = CancellationToken::new();

        let worker = ProjectionWorker {
            port,
            account,
            debounce: config.debounce,
            threshold: config.liquidation_threshold,
            input_rx,
            output_tx: output_tx.clone(),
            cancel: cancel.clone(),
        };

        info!(
            %account,
            debounce_ms = config.debounce.as_millis() as u64,
            threshold = config.liquidation_threshold.percent(),
            "Health projector started"
        );

        let handle = tokio::spawn(worker.run());

        Self { input_tx, output_tx, cancel, handle: Some(handle) }
    }

    /// Replace the input; `None` clears the projection.
    ///
    /// Returns the new generation.
    pub fn update(&self, input: Option<ProjectionInput>) -> u64 {
        let mut generation = 0;
        self.input_tx.send_modify(|slot| {
            slot.generation += 1;
            slot.input = input;
            generation = slot.generation;
        });

        let update = match input {
            Some(_) => ProjectionUpdate::Pending,
            None => ProjectionUpdate::Cleared,
        };
        self.output_tx.send_replace(ProjectionSnapshot { generation, update });

        debug!(generation, "Projection input updated");
        generation
    }

    /// Clear the input.
    pub fn clear(&self) -> u64 {
        self.update(None)
    }

    /// Current update.
    pub fn latest(&self) -> ProjectionUpdate {
        self.output_tx.borrow().update.clone()
    }

    /// Watch published snapshots.
    pub fn subscribe(&self) -> watch::Receiver<ProjectionSnapshot> {
        self.output_tx.subscribe()
    }

    /// Stop the worker and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for HealthProjector {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct ProjectionWorker<P: ProjectionPort> {
    port: Arc<P>,
    account: Address,
    debounce: Duration,
    threshold: LiquidationThreshold,
    input_rx: watch::Receiver<InputSlot>,
    output_tx: Arc<watch::Sender<ProjectionSnapshot>>,
    cancel: CancellationToken,
}

impl<P: ProjectionPort> ProjectionWorker<P> {
    async fn run(mut self) {
        // Set when a change arrived while a projection was in flight
        let mut dirty = false;

        loop {
            if !dirty {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break,
                    changed = self.input_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            dirty = false;

            if !self.debounce().await {
                break;
            }

            let slot = self.input_rx.borrow_and_update().clone();
            let Some(input) = slot.input else {
                continue;
            };

            debug!(generation = slot.generation, kind = %input.kind, "Projecting");

            let port = self.port.clone();
            let account = self.account;
            let threshold = self.threshold;

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                changed = self.input_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    debug!(generation = slot.generation, "Projection superseded, discarding");
                    dirty = true;
                }
                result = project_once(port.as_ref(), account, &input, threshold) => {
                    self.publish(slot.generation, input, result);
                }
            }
        }

        debug!("Health projector stopped");
    }

    /// Wait until the input has been quiet for the debounce period.
    ///
    /// Returns `false` on shutdown.
    async fn debounce(&mut self) -> bool {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return false,
                changed = self.input_rx.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                    debug!("Projection input changed during quiet period");
                }
                _ = tokio::time::sleep(self.debounce) => return true,
            }
        }
    }

    fn publish(
        &self,
        generation: u64,
        input: ProjectionInput,
        result: ExecResult<Option<HealthFactorProjection>>,
    ) {
        let update = match result {
            Ok(Some(projection)) => ProjectionUpdate::Ready { input, projection },
            Ok(None) => ProjectionUpdate::Unavailable { input },
            Err(e) => {
                warn!(error = %e, kind = %input.kind, "Projection unavailable");
                ProjectionUpdate::Unavailable { input }
            }
        };

        // The input slot moves before the output snapshot, check both
        let published = self.output_tx.send_if_modified(|snapshot| {
            let current = self.input_rx.borrow().generation;
            if snapshot.generation != generation || current != generation {
                return false;
            }
            snapshot.update = update;
            true
        });

        if !published {
            debug!(generation, "Stale projection dropped");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
