//! Execution layer error types.

use alloy_primitives::B256;
use thiserror::Error;

/// Errors that can occur while talking to the chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    /// RPC transport or node error
    #[error("RPC error: {0}")]
    Rpc(String),

    /// The signer declined to sign
    #[error("Signature rejected: {0}")]
    SignatureRejected(String),

    /// Simulation against current state reverted; nothing was signed
    #[error("Simulation of {function} reverted: {reason}")]
    SimulationReverted {
        /// Contract function that was simulated
        function: String,
        /// Revert reason as reported by the contract
        reason: String,
    },

    /// Transaction was mined but reverted
    #[error("Transaction {tx_hash} reverted: {reason}")]
    ExecutionReverted {
        /// Hash of the mined transaction
        tx_hash: B256,
        /// Revert reason as reported by the contract
        reason: String,
    },

    /// Gave up waiting for a receipt. The transaction may still land.
    #[error("Timed out waiting for confirmation of {tx_hash}")]
    ConfirmationTimeout {
        /// Hash of the transaction still pending
        tx_hash: B256,
    },

    /// Local wait was cancelled (owner torn down)
    #[error("Cancelled while waiting for confirmation")]
    Cancelled,

    /// Projection/query source error
    #[error("Query error: {0}")]
    Query(String),

    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] anchor_domain::DomainError),
}

/// Result type for execution operations.
pub type ExecResult<T> = Result<T, ExecError>;
