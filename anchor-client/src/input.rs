//! User input → operation request.
//!
//! Raw form values are parsed through the amount codec at the precision of
//! the asset they denominate.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use anchor_domain::{
    AssetRegistry, OperationKind, OperationRequest, ScaledAmount, STABLECOIN_DECIMALS,
};

use crate::error::{ClientError, ClientResult};

/// Raw values as typed by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationInput {
    /// Operation kind
    pub kind: OperationKind,
    /// Primary amount (collateral for deposit/redeem, stablecoin otherwise)
    pub amount: String,
    /// Burn amount of a redeem-and-burn
    pub secondary_amount: Option<String>,
    /// Collateral symbol (ignored for mint/burn)
    pub asset: Option<String>,
    /// Account to liquidate
    pub liquidation_target: Option<String>,
}

impl OperationInput {
    /// Input for a single-amount operation.
    pub fn new(kind: OperationKind, amount: impl Into<String>) -> Self {
        Self {
            kind,
            amount: amount.into(),
            secondary_amount: None,
            asset: None,
            liquidation_target: None,
        }
    }

    /// Set the collateral symbol.
    pub fn with_asset(mut self, symbol: impl Into<String>) -> Self {
        self.asset = Some(symbol.into());
        self
    }

    /// Set the burn amount of a redeem-and-burn.
    pub fn with_secondary_amount(mut self, amount: impl Into<String>) -> Self {
        self.secondary_amount = Some(amount.into());
        self
    }

    /// Set the account to liquidate.
    pub fn with_liquidation_target(mut self, target: impl Into<String>) -> Self {
        self.liquidation_target = Some(target.into());
        self
    }

    /// Build the immutable request.
    ///
    /// # Errors
    /// - `InvalidAmount` for malformed or zero amounts
    /// - `UnknownAsset` for a symbol missing from `registry`
    /// - `InvalidRequest` for a missing symbol, burn amount or target
    pub fn to_request(&self, registry: &AssetRegistry) -> ClientResult<OperationRequest> {
        let stablecoin = registry.stablecoin();

        let request = match self.kind {
            OperationKind::Mint => {
                OperationRequest::mint(stablecoin.clone(), stable_amount(&self.amount)?)?
            }
            OperationKind::Burn => {
                OperationRequest::burn(stablecoin.clone(), stable_amount(&self.amount)?)?
            }
            OperationKind::Deposit => {
                let collateral = self.collateral(registry)?;
                let amount = collateral.parse_amount(&self.amount)?;
                OperationRequest::deposit(collateral.clone(), amount)?
            }
            OperationKind::Redeem => {
                let collateral = self.collateral(registry)?;
                let amount = collateral.parse_amount(&self.amount)?;
                OperationRequest::redeem(collateral.clone(), amount)?
            }
            OperationKind::RedeemAndBurn => {
                let collateral = self.collateral(registry)?;
                let redeem = collateral.parse_amount(&self.amount)?;
                let burn = self.secondary_amount.as_deref().ok_or_else(|| {
                    ClientError::InvalidRequest("redeemAndBurn requires a burn amount".to_string())
                })?;
                OperationRequest::redeem_and_burn(collateral.clone(), redeem, stable_amount(burn)?)?
            }
            OperationKind::Liquidate => {
                let collateral = self.collateral(registry)?;
                let raw_target = self.liquidation_target.as_deref().ok_or_else(|| {
                    ClientError::InvalidRequest("liquidate requires a target account".to_string())
                })?;
                let target = Address::from_str(raw_target.trim()).map_err(|_| {
                    ClientError::InvalidRequest(format!("invalid liquidation target: {}", raw_target))
                })?;
                OperationRequest::liquidate(collateral.clone(), target, stable_amount(&self.amount)?)?
            }
        };

        Ok(request)
    }

    fn collateral<'a>(
        &self,
        registry: &'a AssetRegistry,
    ) -> ClientResult<&'a anchor_domain::AssetDescriptor> {
        let symbol = self.asset.as_deref().ok_or_else(|| {
            ClientError::InvalidRequest(format!("{} requires a collateral asset", self.kind))
        })?;
        Ok(registry.collateral_by_symbol(symbol)?)
    }
}

fn stable_amount(input: &str) -> ClientResult<ScaledAmount> {
    Ok(ScaledAmount::from_decimal_str(input, STABLECOIN_DECIMALS)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use alloy_primitives::U256;

    fn registry() -> AssetRegistry {
        Config::test().asset_registry().unwrap()
    }

    #[test]
    fn test_deposit_uses_collateral_precision() {
        let request = OperationInput::new(OperationKind::Deposit, "0.5")
            .with_asset("wbtc")
            .to_request(&registry())
            .unwrap();

        assert_eq!(request.asset().symbol, "WBTC");
        assert_eq!(request.amount().as_u256(), U256::from(50_000_000u64));
    }

    #[test]
    fn test_mint_targets_stablecoin() {
        let request = OperationInput::new(OperationKind::Mint, "100")
            .with_asset("WETH")
            .to_request(&registry())
            .unwrap();

        assert_eq!(request.asset().symbol, "AUSD");
        assert_eq!(request.amount().to_decimal_string(18, 4), "100");
    }

    #[test]
    fn test_redeem_and_burn_amounts() {
        let request = OperationInput::new(OperationKind::RedeemAndBurn, "0.1")
            .with_asset("WBTC")
            .with_secondary_amount("250.5")
            .to_request(&registry())
            .unwrap();

        assert_eq!(request.amount().as_u256(), U256::from(10_000_000u64));
        assert_eq!(request.secondary_amount().unwrap().to_decimal_string(18, 4), "250.5");

        let missing = OperationInput::new(OperationKind::RedeemAndBurn, "0.1")
            .with_asset("WBTC")
            .to_request(&registry());
        assert!(matches!(missing, Err(ClientError::InvalidRequest(_))));
    }

    #[test]
    fn test_liquidation_target() {
        let request = OperationInput::new(OperationKind::Liquidate, "10")
            .with_asset("WETH")
            .with_liquidation_target("0x4242424242424242424242424242424242424242")
            .to_request(&registry())
            .unwrap();
        assert_eq!(request.liquidation_target(), Some(Address::repeat_byte(0x42)));

        let bad = OperationInput::new(OperationKind::Liquidate, "10")
            .with_asset("WETH")
            .with_liquidation_target("not-an-address")
            .to_request(&registry());
        assert!(matches!(bad, Err(ClientError::InvalidRequest(_))));
    }

    #[test]
    fn test_rejections() {
        let registry = registry();

        let malformed = OperationInput::new(OperationKind::Mint, "1,5").to_request(&registry);
        assert!(matches!(malformed, Err(ClientError::InvalidAmount(_))));

        let zero = OperationInput::new(OperationKind::Burn, "0.000").to_request(&registry);
        assert!(matches!(zero, Err(ClientError::InvalidAmount(_))));

        let unknown = OperationInput::new(OperationKind::Deposit, "1")
            .with_asset("DOGE")
            .to_request(&registry);
        assert!(matches!(unknown, Err(ClientError::UnknownAsset(_))));

        let no_asset = OperationInput::new(OperationKind::Redeem, "1").to_request(&registry);
        assert!(matches!(no_asset, Err(ClientError::InvalidRequest(_))));

        // Below collateral precision truncates to zero
        let dust = OperationInput::new(OperationKind::Deposit, "0.000000001")
            .with_asset("WBTC")
            .to_request(&registry);
        assert!(matches!(dust, Err(ClientError::InvalidAmount(_))));
    }
}
