//! AnchorUSD Client Domain Layer
//!
//! Pure domain logic with zero I/O dependencies.
//! Contains the amount codec, assets, operation requests, the orchestrator
//! state machine and health-factor math.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod entities;
pub mod health;
pub mod value_objects;

// Re-export commonly used types
pub use entities::{
    AssetDescriptor, AssetRegistry, Delegation, OperationId, OperationKind, OperationRequest,
    OperationState,
};
pub use health::{
    compute_health_factor, max_mintable, HealthFactor, HealthFactorProjection, HealthStatus,
    LiquidationThreshold,
};
pub use value_objects::{
    pow10, DomainError, DomainResult, ScaledAmount, DEFAULT_DISPLAY_DECIMALS, STABLECOIN_DECIMALS,
};
