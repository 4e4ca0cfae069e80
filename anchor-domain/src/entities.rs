//! Domain Entities for the AnchorUSD client
//!
//! Assets, operation requests and the orchestrator's state machine.

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::value_objects::{DomainError, DomainResult, ScaledAmount, STABLECOIN_DECIMALS};

/// Unique identifier for an OperationRequest
pub type OperationId = Uuid;

// =============================================================================
// Assets
// =============================================================================

/// A token known to the client.
///
/// Loaded from configuration at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    /// Ticker, e.g. "WETH"
    pub symbol: String,
    /// Human-readable name
    pub name: String,
    /// ERC-20 contract address
    pub address: Address,
    /// Token decimals
    pub decimals: u8,
}

impl AssetDescriptor {
    /// Create a descriptor.
    pub fn new(symbol: impl Into<String>, name: impl Into<String>, address: Address, decimals: u8) -> Self {
        Self {
            symbol: symbol.into(),
            name: name.into(),
            address,
            decimals,
        }
    }

    /// Parse a user-typed amount at this asset's precision.
    pub fn parse_amount(&self, input: &str) -> DomainResult<ScaledAmount> {
        ScaledAmount::from_decimal_str(input, self.decimals)
    }

    /// Format an amount of this asset for display.
    pub fn format_amount(&self, amount: ScaledAmount, max_display_decimals: u8) -> String {
        amount.to_decimal_string(self.decimals, max_display_decimals)
    }
}

/// Immutable symbol → asset mapping, with the stablecoin held apart.
///
/// # Invariants
/// - The stablecoin always has 18 decimals.
/// - Symbols are unique (case-insensitive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRegistry {
    stablecoin: AssetDescriptor,
    collateral: BTreeMap<String, AssetDescriptor>,
}

impl AssetRegistry {
    /// Build the registry.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidRequest` if the stablecoin precision is not
    /// 18 or if a symbol is duplicated.
    pub fn new(stablecoin: AssetDescriptor, collateral: Vec<AssetDescriptor>) -> DomainResult<Self> {
        if stablecoin.decimals != STABLECOIN_DECIMALS {
            return Err(DomainError::InvalidRequest(format!(
                "stablecoin precision is fixed at {}, got {}",
                STABLECOIN_DECIMALS, stablecoin.decimals
            )));
        }

        let mut map = BTreeMap::new();
        for asset in collateral {
            let key = asset.symbol.to_uppercase();
            if key == stablecoin.symbol.to_uppercase() || map.contains_key(&key) {
                return Err(DomainError::InvalidRequest(format!(
                    "duplicate asset symbol: {}",
                    asset.symbol
                )));
            }
            map.insert(key, asset);
        }

        Ok(Self { stablecoin, collateral: map })
    }

    /// The stablecoin descriptor
    pub fn stablecoin(&self) -> &AssetDescriptor {
        &self.stablecoin
    }

    /// Collateral assets, ordered by symbol
    pub fn collateral(&self) -> impl Iterator<Item = &AssetDescriptor> {
        self.collateral.values()
    }

    /// Look up any asset (stablecoin included) by symbol, ignoring case.
    pub fn by_symbol(&self, symbol: &str) -> DomainResult<&AssetDescriptor> {
        let key = symbol.to_uppercase();
        if key == self.stablecoin.symbol.to_uppercase() {
            return Ok(&self.stablecoin);
        }
        self.collateral
            .get(&key)
            .ok_or_else(|| DomainError::UnknownAsset(symbol.to_string()))
    }

    /// Look up a collateral asset by symbol, ignoring case.
    pub fn collateral_by_symbol(&self, symbol: &str) -> DomainResult<&AssetDescriptor> {
        self.collateral
            .get(&symbol.to_uppercase())
            .ok_or_else(|| DomainError::UnknownAsset(symbol.to_string()))
    }

    /// Look up any asset by contract address.
    pub fn by_address(&self, address: Address) -> DomainResult<&AssetDescriptor> {
        if self.stablecoin.address == address {
            return Ok(&self.stablecoin);
        }
        self.collateral
            .values()
            .find(|a| a.address == address)
            .ok_or_else(|| DomainError::UnknownAsset(address.to_string()))
    }
}

// =============================================================================
// OperationKind
// =============================================================================

/// The user-facing actions against the collateral engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    /// Deposit collateral
    Deposit,
    /// Mint stablecoin against deposited collateral
    Mint,
    /// Burn stablecoin to repay debt
    Burn,
    /// Withdraw collateral
    Redeem,
    /// Withdraw collateral and burn stablecoin in one transaction
    RedeemAndBurn,
    /// Repay another account's debt and seize its collateral
    Liquidate,
}

impl OperationKind {
    /// Name for logs and display
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Deposit => "deposit",
            OperationKind::Mint => "mint",
            OperationKind::Burn => "burn",
            OperationKind::Redeem => "redeem",
            OperationKind::RedeemAndBurn => "redeemAndBurn",
            OperationKind::Liquidate => "liquidate",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for OperationKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "deposit" => Ok(OperationKind::Deposit),
            "mint" => Ok(OperationKind::Mint),
            "burn" => Ok(OperationKind::Burn),
            "redeem" => Ok(OperationKind::Redeem),
            "redeemandburn" => Ok(OperationKind::RedeemAndBurn),
            "liquidate" => Ok(OperationKind::Liquidate),
            other => Err(DomainError::InvalidRequest(format!("unknown operation kind: {}", other))),
        }
    }
}

// =============================================================================
// OperationRequest
// =============================================================================

/// A token delegation an operation needs before it can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delegation {
    /// Token whose allowance must cover `amount`
    pub token: Address,
    /// Exact amount the operation consumes
    pub amount: ScaledAmount,
}

/// One user intent, consumed once by the orchestrator.
///
/// Fields are private: a request is never mutated after creation, a retry
/// builds a new one. Deserialization runs the same checks as the
/// constructors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RequestRecord")]
pub struct OperationRequest {
    id: OperationId,
    kind: OperationKind,
    amount: ScaledAmount,
    secondary_amount: Option<ScaledAmount>,
    asset: AssetDescriptor,
    liquidation_target: Option<Address>,
    created_at: DateTime<Utc>,
}

/// Wire shape of a request before validation.
#[derive(Deserialize)]
struct RequestRecord {
    id: OperationId,
    kind: OperationKind,
    amount: ScaledAmount,
    secondary_amount: Option<ScaledAmount>,
    asset: AssetDescriptor,
    liquidation_target: Option<Address>,
    created_at: DateTime<Utc>,
}

impl TryFrom<RequestRecord> for OperationRequest {
    type Error = DomainError;

    fn try_from(record: RequestRecord) -> DomainResult<Self> {
        Self::validate(
            record.kind,
            record.amount,
            record.secondary_amount,
            record.liquidation_target,
        )?;

        Ok(Self {
            id: record.id,
            kind: record.kind,
            amount: record.amount,
            secondary_amount: record.secondary_amount,
            asset: record.asset,
            liquidation_target: record.liquidation_target,
            created_at: record.created_at,
        })
    }
}

impl OperationRequest {
    fn validate(
        kind: OperationKind,
        amount: ScaledAmount,
        secondary_amount: Option<ScaledAmount>,
        liquidation_target: Option<Address>,
    ) -> DomainResult<()> {
        if amount.is_zero() || secondary_amount.is_some_and(|a| a.is_zero()) {
            return Err(DomainError::InvalidAmount(format!(
                "{} amount must be greater than zero",
                kind
            )));
        }

        match kind {
            OperationKind::RedeemAndBurn if secondary_amount.is_none() => Err(
                DomainError::InvalidRequest("redeemAndBurn requires a burn amount".to_string()),
            ),
            OperationKind::Liquidate => match liquidation_target {
                Some(target) if target != Address::ZERO => Ok(()),
                _ => Err(DomainError::InvalidRequest(
                    "liquidation target must not be the zero address".to_string(),
                )),
            },
            _ => Ok(()),
        }
    }

    fn build(
        kind: OperationKind,
        asset: AssetDescriptor,
        amount: ScaledAmount,
        secondary_amount: Option<ScaledAmount>,
        liquidation_target: Option<Address>,
    ) -> DomainResult<Self> {
        Self::validate(kind, amount, secondary_amount, liquidation_target)?;

        Ok(Self {
            id: Uuid::now_v7(),
            kind,
            amount,
            secondary_amount,
            asset,
            liquidation_target,
            created_at: Utc::now(),
        })
    }

    /// Deposit `amount` of a collateral asset.
    pub fn deposit(collateral: AssetDescriptor, amount: ScaledAmount) -> DomainResult<Self> {
        Self::build(OperationKind::Deposit, collateral, amount, None, None)
    }

    /// Mint `amount` of stablecoin.
    pub fn mint(stablecoin: AssetDescriptor, amount: ScaledAmount) -> DomainResult<Self> {
        Self::build(OperationKind::Mint, stablecoin, amount, None, None)
    }

    /// Burn `amount` of stablecoin.
    pub fn burn(stablecoin: AssetDescriptor, amount: ScaledAmount) -> DomainResult<Self> {
        Self::build(OperationKind::Burn, stablecoin, amount, None, None)
    }

    /// Redeem `amount` of a collateral asset.
    pub fn redeem(collateral: AssetDescriptor, amount: ScaledAmount) -> DomainResult<Self> {
        Self::build(OperationKind::Redeem, collateral, amount, None, None)
    }

    /// Redeem collateral and burn stablecoin atomically.
    pub fn redeem_and_burn(
        collateral: AssetDescriptor,
        redeem_amount: ScaledAmount,
        burn_amount: ScaledAmount,
    ) -> DomainResult<Self> {
        Self::build(
            OperationKind::RedeemAndBurn,
            collateral,
            redeem_amount,
            Some(burn_amount),
            None,
        )
    }

    /// Liquidate `target`, covering `debt_to_cover` and seizing `collateral`.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidRequest` for the zero address.
    pub fn liquidate(
        collateral: AssetDescriptor,
        target: Address,
        debt_to_cover: ScaledAmount,
    ) -> DomainResult<Self> {
        Self::build(OperationKind::Liquidate, collateral, debt_to_cover, None, Some(target))
    }

    /// Request ID
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Operation kind
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Primary amount (deposit/mint/burn/redeem amount, debt to cover)
    pub fn amount(&self) -> ScaledAmount {
        self.amount
    }

    /// Burn amount of a combined redeem-and-burn
    pub fn secondary_amount(&self) -> Option<ScaledAmount> {
        self.secondary_amount
    }

    /// Target asset (stablecoin for mint/burn)
    pub fn asset(&self) -> &AssetDescriptor {
        &self.asset
    }

    /// Account being liquidated
    pub fn liquidation_target(&self) -> Option<Address> {
        self.liquidation_target
    }

    /// When the request was created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Token delegation this request needs, if any.
    ///
    /// Deposit delegates the collateral; burn and the burn leg of
    /// redeem-and-burn delegate the stablecoin. Mint, redeem and liquidate
    /// execute directly.
    pub fn delegation(&self, stablecoin: &AssetDescriptor) -> Option<Delegation> {
        match self.kind {
            OperationKind::Deposit | OperationKind::Burn => Some(Delegation {
                token: self.asset.address,
                amount: self.amount,
            }),
            OperationKind::RedeemAndBurn => self.secondary_amount.map(|burn| Delegation {
                token: stablecoin.address,
                amount: burn,
            }),
            OperationKind::Mint | OperationKind::Redeem | OperationKind::Liquidate => None,
        }
    }
}

// =============================================================================
// OperationState
// =============================================================================

/// Orchestrator state machine.
///
/// ```text
/// idle ─┬─> checkingAllowance ─┬─> awaitingApprovalSignature ─> approvalPending ─> approvalConfirmed ─┐
///       │                      └──────────────────────────────────────────────────────────────────────┤
///       └────────────────────────────────────────────────────────────────> awaitingExecutionSignature <┘
///                                         awaitingExecutionSignature ─> executionPending ─> confirmed
/// any non-terminal ─> failed;   confirmed | failed ─(grace period)─> idle
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationState {
    /// Nothing in flight
    #[default]
    Idle,
    /// Reading the current token delegation
    CheckingAllowance,
    /// Waiting for the wallet to sign the approval
    AwaitingApprovalSignature,
    /// Approval broadcast, waiting for its receipt
    ApprovalPending,
    /// Approval mined; the original request resumes next
    ApprovalConfirmed,
    /// Simulating and waiting for the wallet to sign the main transaction
    AwaitingExecutionSignature,
    /// Main transaction broadcast, waiting for its receipt
    ExecutionPending,
    /// Main transaction mined successfully
    Confirmed,
    /// Operation ended in error
    Failed,
}

impl OperationState {
    /// Get the name of the state for display
    pub fn name(&self) -> &'static str {
        match self {
            OperationState::Idle => "idle",
            OperationState::CheckingAllowance => "checkingAllowance",
            OperationState::AwaitingApprovalSignature => "awaitingApprovalSignature",
            OperationState::ApprovalPending => "approvalPending",
            OperationState::ApprovalConfirmed => "approvalConfirmed",
            OperationState::AwaitingExecutionSignature => "awaitingExecutionSignature",
            OperationState::ExecutionPending => "executionPending",
            OperationState::Confirmed => "confirmed",
            OperationState::Failed => "failed",
        }
    }

    /// Terminal states auto-reset to idle after a grace period.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationState::Confirmed | OperationState::Failed)
    }

    /// A new request may only start from idle or a terminal state.
    pub fn accepts_new_request(&self) -> bool {
        matches!(self, OperationState::Idle) || self.is_terminal()
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: OperationState) -> bool {
        use OperationState::*;

        match (self, next) {
            (Idle | Confirmed | Failed, CheckingAllowance | AwaitingExecutionSignature) => true,
            (Confirmed | Failed, Idle) => true,
            (CheckingAllowance, AwaitingApprovalSignature | AwaitingExecutionSignature) => true,
            (AwaitingApprovalSignature, ApprovalPending) => true,
            (ApprovalPending, ApprovalConfirmed) => true,
            (ApprovalConfirmed, AwaitingExecutionSignature) => true,
            (AwaitingExecutionSignature, ExecutionPending) => true,
            (ExecutionPending, Confirmed) => true,
            (
                CheckingAllowance
                | AwaitingApprovalSignature
                | ApprovalPending
                | ApprovalConfirmed
                | AwaitingExecutionSignature
                | ExecutionPending,
                Failed,
            ) => true,
            _ => false,
        }
    }

    /// Validate a transition.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidStateTransition` for an illegal edge.
    pub fn transition(&self, next: OperationState) -> DomainResult<OperationState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidStateTransition(format!(
                "{} -> {}",
                self.name(),
                next.name()
            )))
        }
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn weth() -> AssetDescriptor {
        AssetDescriptor::new("WETH", "Wrapped Ethereum", Address::repeat_byte(0x11), 18)
    }

    fn ausd() -> AssetDescriptor {
        AssetDescriptor::new("AUSD", "Anchor USD", Address::repeat_byte(0xaa), 18)
    }

    fn amount(value: &str) -> ScaledAmount {
        ScaledAmount::from_decimal_str(value, 18).unwrap()
    }

    #[test]
    fn test_registry_lookup_is_case_insensitive() {
        let registry = AssetRegistry::new(ausd(), vec![weth()]).unwrap();

        assert_eq!(registry.by_symbol("weth").unwrap().symbol, "WETH");
        assert_eq!(registry.by_symbol("ausd").unwrap().symbol, "AUSD");
        assert!(registry.collateral_by_symbol("AUSD").is_err());
        assert_eq!(
            registry.by_address(Address::repeat_byte(0x11)).unwrap().symbol,
            "WETH"
        );
        assert!(matches!(registry.by_symbol("WBTC"), Err(DomainError::UnknownAsset(_))));
    }

    #[test]
    fn test_registry_rejects_bad_stablecoin_and_duplicates() {
        let mut six = ausd();
        six.decimals = 6;
        assert!(AssetRegistry::new(six, vec![]).is_err());

        let dup = AssetDescriptor::new("weth", "dup", Address::repeat_byte(0x22), 18);
        assert!(AssetRegistry::new(ausd(), vec![weth(), dup]).is_err());
    }

    #[test]
    fn test_request_rejects_zero_amounts() {
        assert!(matches!(
            OperationRequest::deposit(weth(), ScaledAmount::ZERO),
            Err(DomainError::InvalidAmount(_))
        ));
        assert!(matches!(
            OperationRequest::redeem_and_burn(weth(), amount("1"), ScaledAmount::ZERO),
            Err(DomainError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_state_and_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&OperationState::AwaitingApprovalSignature).unwrap(),
            "\"awaitingApprovalSignature\""
        );
        let state: OperationState = serde_json::from_str("\"executionPending\"").unwrap();
        assert_eq!(state, OperationState::ExecutionPending);
        assert_eq!(state.to_string(), state.name());

        assert_eq!("redeem-and-burn".parse::<OperationKind>().unwrap(), OperationKind::RedeemAndBurn);
        assert_eq!("Redeem_And_Burn".parse::<OperationKind>().unwrap(), OperationKind::RedeemAndBurn);
        assert!("swap".parse::<OperationKind>().is_err());
    }

    #[test]
    fn test_deserialized_request_is_validated() {
        let request = OperationRequest::redeem_and_burn(weth(), amount("1"), amount("50")).unwrap();
        let json = serde_json::to_value(&request).unwrap();
        let parsed: OperationRequest = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(parsed, request);

        let mut zero = json.clone();
        zero["amount"] = serde_json::to_value(ScaledAmount::ZERO).unwrap();
        assert!(serde_json::from_value::<OperationRequest>(zero).is_err());

        let mut no_burn = json;
        no_burn["secondary_amount"] = serde_json::Value::Null;
        assert!(serde_json::from_value::<OperationRequest>(no_burn).is_err());
    }

    #[test]
    fn test_liquidation_requires_target() {
        assert!(matches!(
            OperationRequest::liquidate(weth(), Address::ZERO, amount("10")),
            Err(DomainError::InvalidRequest(_))
        ));

        let target = Address::repeat_byte(0x42);
        let request = OperationRequest::liquidate(weth(), target, amount("10")).unwrap();
        assert_eq!(request.liquidation_target(), Some(target));
        assert_eq!(request.kind(), OperationKind::Liquidate);
    }

    #[test]
    fn test_delegation_targets() {
        let stable = ausd();

        let deposit = OperationRequest::deposit(weth(), amount("2")).unwrap();
        assert_eq!(
            deposit.delegation(&stable),
            Some(Delegation { token: weth().address, amount: amount("2") })
        );

        let burn = OperationRequest::burn(stable.clone(), amount("100")).unwrap();
        assert_eq!(burn.delegation(&stable).unwrap().token, stable.address);

        // Burn leg delegates the stablecoin, not the redeemed collateral
        let combined = OperationRequest::redeem_and_burn(weth(), amount("1"), amount("50")).unwrap();
        assert_eq!(
            combined.delegation(&stable),
            Some(Delegation { token: stable.address, amount: amount("50") })
        );

        let mint = OperationRequest::mint(stable.clone(), amount("10")).unwrap();
        assert!(mint.delegation(&stable).is_none());
        let redeem = OperationRequest::redeem(weth(), amount("1")).unwrap();
        assert!(redeem.delegation(&stable).is_none());
        let liquidate = OperationRequest::liquidate(weth(), Address::repeat_byte(1), amount("5")).unwrap();
        assert!(liquidate.delegation(&stable).is_none());
    }

    #[test]
    fn test_state_guards() {
        assert!(OperationState::Idle.accepts_new_request());
        assert!(OperationState::Confirmed.accepts_new_request());
        assert!(OperationState::Failed.accepts_new_request());
        assert!(!OperationState::CheckingAllowance.accepts_new_request());
        assert!(!OperationState::ApprovalPending.accepts_new_request());
        assert!(!OperationState::ExecutionPending.accepts_new_request());
    }

    #[test]
    fn test_state_transitions() {
        use OperationState::*;

        assert!(Idle.can_transition_to(CheckingAllowance));
        assert!(Idle.can_transition_to(AwaitingExecutionSignature));
        assert!(CheckingAllowance.can_transition_to(AwaitingApprovalSignature));
        assert!(ApprovalConfirmed.can_transition_to(AwaitingExecutionSignature));
        assert!(ExecutionPending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Idle));

        assert!(!Idle.can_transition_to(ExecutionPending));
        assert!(!CheckingAllowance.can_transition_to(ApprovalConfirmed));
        assert!(!Idle.can_transition_to(Failed));
        assert!(!Confirmed.can_transition_to(Failed));

        assert!(matches!(
            AwaitingApprovalSignature.transition(Confirmed),
            Err(DomainError::InvalidStateTransition(_))
        ));
    }
}
