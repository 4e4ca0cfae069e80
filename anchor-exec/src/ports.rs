//! Execution layer port definitions.
//!
//! Ports define the interfaces for external services (chain RPC + signer,
//! projection queries). Adapters implement these ports for specific services
//! (stub, HTTP query API, etc.).

use alloy_primitives::{Address, Bytes, B256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use anchor_domain::{
    DomainError, HealthFactorProjection, OperationKind, OperationRequest, ScaledAmount,
};

use crate::abi::{IAnchorEngine, IERC20};
use crate::error::ExecResult;

// =============================================================================
// Action descriptors
// =============================================================================

/// A contract function with its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractFunction {
    /// `IERC20.approve(spender, amount)`
    Approve {
        /// Delegate
        spender: Address,
        /// Exact delegated amount
        amount: ScaledAmount,
    },
    /// `depositCollateral(token, amount)`
    DepositCollateral {
        /// Collateral token
        collateral: Address,
        /// Amount at the token's precision
        amount: ScaledAmount,
    },
    /// `mintAUSD(amount)`
    MintStablecoin {
        /// Stablecoin amount
        amount: ScaledAmount,
    },
    /// `burnAUSD(amount)`
    BurnStablecoin {
        /// Stablecoin amount
        amount: ScaledAmount,
    },
    /// `redeemCollateral(token, amount)`
    RedeemCollateral {
        /// Collateral token
        collateral: Address,
        /// Amount at the token's precision
        amount: ScaledAmount,
    },
    /// `redeemCollateralForAUSD(token, amount, burn)`
    RedeemCollateralForStablecoin {
        /// Collateral token
        collateral: Address,
        /// Collateral amount to withdraw
        collateral_amount: ScaledAmount,
        /// Stablecoin amount to burn
        burn_amount: ScaledAmount,
    },
    /// `liquidate(collateral, user, debtToCover)`
    Liquidate {
        /// Collateral to seize
        collateral: Address,
        /// Account being liquidated
        user: Address,
        /// Stablecoin debt repaid by the liquidator
        debt_to_cover: ScaledAmount,
    },
}

impl ContractFunction {
    /// Solidity function name
    pub fn name(&self) -> &'static str {
        match self {
            ContractFunction::Approve { .. } => "approve",
            ContractFunction::DepositCollateral { .. } => "depositCollateral",
            ContractFunction::MintStablecoin { .. } => "mintAUSD",
            ContractFunction::BurnStablecoin { .. } => "burnAUSD",
            ContractFunction::RedeemCollateral { .. } => "redeemCollateral",
            ContractFunction::RedeemCollateralForStablecoin { .. } => "redeemCollateralForAUSD",
            ContractFunction::Liquidate { .. } => "liquidate",
        }
    }

    /// ABI-encoded calldata, selector included.
    pub fn abi_encode(&self) -> Vec<u8> {
        match *self {
            ContractFunction::Approve { spender, amount } => IERC20::approveCall {
                spender,
                amount: amount.as_u256(),
            }
            .abi_encode(),
            ContractFunction::DepositCollateral { collateral, amount } => {
                IAnchorEngine::depositCollateralCall {
                    tokenCollateralAddress: collateral,
                    amountCollateral: amount.as_u256(),
                }
                .abi_encode()
            }
            ContractFunction::MintStablecoin { amount } => IAnchorEngine::mintAUSDCall {
                amountAUSDToMint: amount.as_u256(),
            }
            .abi_encode(),
            ContractFunction::BurnStablecoin { amount } => IAnchorEngine::burnAUSDCall {
                amount: amount.as_u256(),
            }
            .abi_encode(),
            ContractFunction::RedeemCollateral { collateral, amount } => {
                IAnchorEngine::redeemCollateralCall {
                    tokenCollateralAddress: collateral,
                    amountCollateral: amount.as_u256(),
                }
                .abi_encode()
            }
            ContractFunction::RedeemCollateralForStablecoin {
                collateral,
                collateral_amount,
                burn_amount,
            } => IAnchorEngine::redeemCollateralForAUSDCall {
                tokenCollateralAddress: collateral,
                amountCollateral: collateral_amount.as_u256(),
                amountAUSDToBurn: burn_amount.as_u256(),
            }
            .abi_encode(),
            ContractFunction::Liquidate { collateral, user, debt_to_cover } => {
                IAnchorEngine::liquidateCall {
                    collateral,
                    user,
                    debtToCover: debt_to_cover.as_u256(),
                }
                .abi_encode()
            }
        }
    }
}

/// A contract interaction: target address plus function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCall {
    /// Contract address
    pub to: Address,
    /// Function and arguments
    pub function: ContractFunction,
}

impl ContractCall {
    /// ERC-20 approval of exactly `amount` to `spender`.
    pub fn approve(token: Address, spender: Address, amount: ScaledAmount) -> Self {
        Self {
            to: token,
            function: ContractFunction::Approve { spender, amount },
        }
    }

    /// Engine call carrying out an operation request.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidRequest` if a redeem-and-burn lacks its
    /// burn amount or a liquidation lacks its target.
    pub fn for_request(engine: Address, request: &OperationRequest) -> Result<Self, DomainError> {
        let asset = request.asset().address;
        let amount = request.amount();

        let function = match request.kind() {
            OperationKind::Deposit => ContractFunction::DepositCollateral { collateral: asset, amount },
            OperationKind::Mint => ContractFunction::MintStablecoin { amount },
            OperationKind::Burn => ContractFunction::BurnStablecoin { amount },
            OperationKind::Redeem => ContractFunction::RedeemCollateral { collateral: asset, amount },
            OperationKind::RedeemAndBurn => {
                let burn_amount = request.secondary_amount().ok_or_else(|| {
                    DomainError::InvalidRequest("redeemAndBurn requires a burn amount".to_string())
                })?;
                ContractFunction::RedeemCollateralForStablecoin {
                    collateral: asset,
                    collateral_amount: amount,
                    burn_amount,
                }
            }
            OperationKind::Liquidate => {
                let user = request.liquidation_target().ok_or_else(|| {
                    DomainError::InvalidRequest("liquidate requires a target account".to_string())
                })?;
                ContractFunction::Liquidate { collateral: asset, user, debt_to_cover: amount }
            }
        };

        Ok(Self { to: engine, function })
    }

    /// Calldata for the signer/RPC adapter.
    pub fn calldata(&self) -> Bytes {
        Bytes::from(self.function.abi_encode())
    }

    /// 4-byte function selector.
    pub fn selector(&self) -> [u8; 4] {
        let data = self.function.abi_encode();
        [data[0], data[1], data[2], data[3]]
    }

    /// Material state changes are simulated before signing; approvals are not.
    pub fn requires_simulation(&self) -> bool {
        !matches!(self.function, ContractFunction::Approve { .. })
    }

    /// Function name, for logs
    pub fn name(&self) -> &'static str {
        self.function.name()
    }
}

// =============================================================================
// Chain Port
// =============================================================================

/// Outcome of simulating a call against current chain state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationOutcome {
    /// The call would succeed
    Ok,
    /// The call would revert
    Reverted {
        /// Contract-reported reason, verbatim
        reason: String,
    },
}

/// A broadcast transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxHandle {
    /// Transaction hash
    pub hash: B256,
    /// Function that was called
    pub function: String,
    /// When the signed transaction was broadcast
    pub submitted_at: DateTime<Utc>,
}

/// Receipt status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptStatus {
    /// Executed successfully
    Success,
    /// Mined but reverted
    Reverted {
        /// Revert reason, verbatim
        reason: String,
    },
}

/// Block receipt of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Transaction hash
    pub tx_hash: B256,
    /// Block the transaction was included in
    pub block_number: u64,
    /// Gas used
    pub gas_used: u64,
    /// Execution status
    pub status: ReceiptStatus,
}

/// Port for chain interaction (reads, simulation, signing + broadcast, receipts).
///
/// Implementations:
/// - `StubChain` - In-memory chain for tests
///
/// Wallet cryptography lives behind `submit`; callers never see keys.
#[async_trait]
pub trait ChainPort: Send + Sync {
    /// Read `IERC20(token).allowance(owner, spender)`.
    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> ExecResult<ScaledAmount>;

    /// Simulate `call` as if sent by `from`.
    async fn simulate(&self, call: &ContractCall, from: Address) -> ExecResult<SimulationOutcome>;

    /// Request a signature and broadcast.
    ///
    /// # Errors
    /// `ExecError::SignatureRejected` if the signer declines.
    async fn submit(&self, call: &ContractCall, from: Address) -> ExecResult<TxHandle>;

    /// Look up the receipt; `None` while the transaction is pending.
    async fn receipt(&self, tx_hash: B256) -> ExecResult<Option<Receipt>>;
}

// =============================================================================
// Projection Port
// =============================================================================

/// A single "what if" question for the engine's query surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectionQuery {
    /// Health after minting `amount`
    Mint {
        /// Stablecoin amount
        amount: ScaledAmount,
    },
    /// Health after burning `amount`
    Burn {
        /// Stablecoin amount
        amount: ScaledAmount,
    },
    /// Health after depositing `amount` of `token`
    Deposit {
        /// Collateral token
        token: Address,
        /// Amount at the token's precision
        amount: ScaledAmount,
    },
    /// Health after redeeming `amount` of `token`
    Redeem {
        /// Collateral token
        token: Address,
        /// Amount at the token's precision
        amount: ScaledAmount,
    },
}

/// Port for read-only health-factor projections.
///
/// Implementations:
/// - `StubProjections` - Canned results for tests
/// - `QueryApiClient` - HTTP query API (anchor-connectors)
#[async_trait]
pub trait ProjectionPort: Send + Sync {
    /// Project `account`'s position after the queried operation.
    async fn project(
        &self,
        account: Address,
        query: &ProjectionQuery,
    ) -> ExecResult<HealthFactorProjection>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchor_domain::AssetDescriptor;

    fn weth() -> AssetDescriptor {
        AssetDescriptor::new("WETH", "Wrapped Ethereum", Address::repeat_byte(0x11), 18)
    }

    fn amount(value: &str) -> ScaledAmount {
        ScaledAmount::from_decimal_str(value, 18).unwrap()
    }

    #[test]
    fn test_request_maps_to_engine_function() {
        let engine = Address::repeat_byte(0xee);

        let deposit = OperationRequest::deposit(weth(), amount("2")).unwrap();
        let call = ContractCall::for_request(engine, &deposit).unwrap();
        assert_eq!(call.to, engine);
        assert_eq!(call.name(), "depositCollateral");
        assert!(call.requires_simulation());

        let combined = OperationRequest::redeem_and_burn(weth(), amount("1"), amount("50")).unwrap();
        let call = ContractCall::for_request(engine, &combined).unwrap();
        assert_eq!(
            call.function,
            ContractFunction::RedeemCollateralForStablecoin {
                collateral: weth().address,
                collateral_amount: amount("1"),
                burn_amount: amount("50"),
            }
        );

        let target = Address::repeat_byte(0x42);
        let liquidation = OperationRequest::liquidate(weth(), target, amount("10")).unwrap();
        let call = ContractCall::for_request(engine, &liquidation).unwrap();
        assert!(matches!(call.function, ContractFunction::Liquidate { user, .. } if user == target));
    }

    #[test]
    fn test_approval_is_not_simulated() {
        let call = ContractCall::approve(weth().address, Address::repeat_byte(0xee), amount("2"));
        assert!(!call.requires_simulation());
        assert_eq!(call.selector(), IERC20::approveCall::SELECTOR);
        assert_eq!(call.calldata().len(), 4 + 64);
    }

    #[test]
    fn test_selector_matches_engine_binding() {
        let call = ContractCall {
            to: Address::ZERO,
            function: ContractFunction::MintStablecoin { amount: amount("1") },
        };
        assert_eq!(call.selector(), IAnchorEngine::mintAUSDCall::SELECTOR);
    }
}
