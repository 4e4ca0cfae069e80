//! AnchorUSD Client Library
//!
//! Drives stablecoin operations (deposit, mint, burn, redeem,
//! redeem-and-burn, liquidate) against the collateral engine and projects
//! their effect on the account's health factor.
//!
//! # Architecture
//!
//! ```text
//! OperationInput → OperationRequest → Orchestrator → AllowanceGate / Executor → ChainPort
//!                                          ↓
//!                                 Event Bus (status stream)
//!
//! OperationInput → ProjectionInput → HealthProjector (debounced) → ProjectionPort
//! ```
//!
//! # Components
//!
//! - **Orchestrator**: State machine with approval continuation and auto reset
//! - **Projector**: Debounced, superseding health-factor projections
//! - **Input**: Raw user values to validated requests
//! - **Event Bus**: Status stream for the presentation layer
//! - **Config**: Environment-based configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use anchor_client::{Config, EventBus, OperationInput, OperationOrchestrator};
//! use anchor_domain::OperationKind;
//!
//! let config = Config::from_env()?;
//! let registry = config.asset_registry()?;
//! let orchestrator = OperationOrchestrator::new(chain, &config, Arc::new(EventBus::default()))?;
//!
//! let request = OperationInput::new(OperationKind::Deposit, "1.5")
//!     .with_asset("WETH")
//!     .to_request(&registry)?;
//! let receipt = orchestrator.submit(request).await?;
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod event_bus;
pub mod input;
pub mod orchestrator;
pub mod projector;

// Re-exports for convenience
pub use config::{
    ChainConfig, Config, Environment, OrchestratorConfig, ProjectorConfig, QueryApiConfig,
    STABLECOIN_NAME, STABLECOIN_SYMBOL,
};
pub use error::{ClientError, ClientResult};
pub use event_bus::{ClientEvent, EventBus, EventReceiver, TxPurpose};
pub use input::OperationInput;
pub use orchestrator::{OperationOrchestrator, PendingApprovalContinuation};
pub use projector::{
    project_once, HealthProjector, ProjectionInput, ProjectionSnapshot, ProjectionUpdate,
};
