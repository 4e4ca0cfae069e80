//! AnchorUSD Execution Layer
//!
//! Allowance checks, simulation, submission and confirmation of
//! collateral-engine transactions.
//!
//! # Architecture
//!
//! ```text
//! OperationRequest → ContractCall → AllowanceGate → TransactionExecutor → ChainPort
//! ```
//!
//! # Components
//!
//! - **ABI**: Typed calldata for the stablecoin token and the collateral engine
//! - **Ports**: Traits for the chain (read/simulate/submit/receipt) and projections
//! - **Allowance Gate**: Delegation checks and exact-amount approvals
//! - **Executor**: Simulate-then-submit, cancellable confirmation wait
//! - **Stub**: In-memory chain and projection sources for tests
//!
//! # Example
//!
//! ```rust,ignore
//! use anchor_exec::{ContractCall, StubChain, TransactionExecutor};
//! use std::sync::Arc;
//!
//! let chain = Arc::new(StubChain::new());
//! let executor = TransactionExecutor::new(chain, account, Duration::from_secs(1));
//!
//! let handle = executor.execute(&ContractCall::for_request(engine, &request)).await?;
//! let receipt = executor.await_confirmation(&handle, None, &cancel).await?;
//! ```

#![warn(clippy::all)]

pub mod abi;
pub mod allowance;
pub mod error;
pub mod executor;
pub mod ports;
pub mod stub;

// Re-exports for convenience
pub use allowance::{AllowanceCheck, AllowanceGate};
pub use error::{ExecError, ExecResult};
pub use executor::TransactionExecutor;
pub use ports::{
    ChainPort, ContractCall, ContractFunction, ProjectionPort, ProjectionQuery, Receipt,
    ReceiptStatus, SimulationOutcome, TxHandle,
};
pub use stub::{StubChain, StubProjections};
