//! AnchorUSD Connectors
//!
//! Adapters for the read-only query API (HTTP/JSON).
//! Normalizes API payloads to domain types.

#![warn(clippy::all)]

// Public modules
pub mod query_api;

// Re-exports
pub use query_api::{
    CollateralBreakdown, CollateralDeposited, DashboardMetrics, HealthFactorCalculation,
    HistoryData, LiquidatableUser, ProtocolHealth, QueryApiClient, QueryApiError, StableSupply,
    TotalCollateral, Transaction, TransactionStatus, TransactionType, UserData,
};
