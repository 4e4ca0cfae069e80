//! Client error types.
//!
//! One enum for every failure a caller of the orchestrator, projector or
//! input builder can observe.

use alloy_primitives::B256;
use anchor_connectors::QueryApiError;
use anchor_domain::{DomainError, OperationState};
use anchor_exec::ExecError;
use thiserror::Error;

/// Client-level errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Malformed user-typed amount; re-prompt
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Asset symbol or address not configured
    #[error("Unknown asset: {0}")]
    UnknownAsset(String),

    /// Request is structurally incomplete
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Another operation has not settled yet; retry afterwards
    #[error("Operation in progress (state: {state})")]
    OperationInProgress {
        /// State of the operation in flight
        state: OperationState,
    },

    /// The wallet declined to sign
    #[error("Signature rejected: {0}")]
    SignatureRejected(String),

    /// Simulation reverted; nothing was signed
    #[error("Simulation of {function} reverted: {reason}")]
    SimulationReverted {
        /// Contract function
        function: String,
        /// Contract-reported reason, verbatim
        reason: String,
    },

    /// Transaction mined but reverted
    #[error("Transaction {tx_hash} reverted: {reason}")]
    ExecutionReverted {
        /// Mined transaction
        tx_hash: B256,
        /// Contract-reported reason, verbatim
        reason: String,
    },

    /// Stopped waiting; the transaction may still confirm later
    #[error("No confirmation for {tx_hash} yet; it may still confirm")]
    ConfirmationTimeout {
        /// Transaction to re-query
        tx_hash: B256,
    },

    /// Local wait cancelled by teardown
    #[error("Cancelled")]
    Cancelled,

    /// Chain RPC error
    #[error("Chain error: {0}")]
    Chain(String),

    /// Query API error
    #[error("Query error: {0}")]
    Query(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Domain invariant violated
    #[error("Domain error: {0}")]
    Domain(DomainError),
}

impl ClientError {
    /// Soft failures leave the outcome on chain undecided.
    pub fn is_soft(&self) -> bool {
        matches!(self, ClientError::ConfirmationTimeout { .. } | ClientError::Cancelled)
    }
}

impl From<DomainError> for ClientError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidAmount(msg) => ClientError::InvalidAmount(msg),
            DomainError::UnknownAsset(msg) => ClientError::UnknownAsset(msg),
            DomainError::InvalidAddress(msg) => {
                ClientError::InvalidRequest(format!("invalid address: {}", msg))
            }
            DomainError::InvalidRequest(msg) => ClientError::InvalidRequest(msg),
            other @ DomainError::InvalidStateTransition(_) => ClientError::Domain(other),
        }
    }
}

impl From<ExecError> for ClientError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Rpc(msg) => ClientError::Chain(msg),
            ExecError::SignatureRejected(msg) => ClientError::SignatureRejected(msg),
            ExecError::SimulationReverted { function, reason } => {
                ClientError::SimulationReverted { function, reason }
            }
            ExecError::ExecutionReverted { tx_hash, reason } => {
                ClientError::ExecutionReverted { tx_hash, reason }
            }
            ExecError::ConfirmationTimeout { tx_hash } => ClientError::ConfirmationTimeout { tx_hash },
            ExecError::Cancelled => ClientError::Cancelled,
            ExecError::Query(msg) => ClientError::Query(msg),
            ExecError::Domain(err) => err.into(),
        }
    }
}

impl From<QueryApiError> for ClientError {
    fn from(err: QueryApiError) -> Self {
        ClientError::Query(err.to_string())
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_errors_map_to_taxonomy() {
        let err: ClientError = ExecError::SimulationReverted {
            function: "mintAUSD".to_string(),
            reason: "AUSDEngine__BreaksHealthFactor".to_string(),
        }
        .into();
        assert_eq!(
            err,
            ClientError::SimulationReverted {
                function: "mintAUSD".to_string(),
                reason: "AUSDEngine__BreaksHealthFactor".to_string(),
            }
        );

        let err: ClientError = ExecError::Domain(DomainError::InvalidAmount("x".into())).into();
        assert!(matches!(err, ClientError::InvalidAmount(_)));

        let err: ClientError = ExecError::ConfirmationTimeout { tx_hash: B256::ZERO }.into();
        assert!(err.is_soft());
    }
}
