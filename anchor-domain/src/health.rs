//! Health-factor math mirrored from the collateral engine.
//!
//! All values are 18-decimal fixed-point integers:
//!
//! ```text
//! health_factor = collateral_value × threshold ÷ threshold_precision × 1e18 ÷ debt
//! ```
//!
//! A position with zero debt has an infinite health factor. Nothing here
//! divides by a zero debt.

use alloy_primitives::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value_objects::{DomainError, DomainResult, ScaledAmount, STABLECOIN_DECIMALS};

/// `1e18`, the fixed-point unit for health factors and USD values.
pub const PRECISION: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

// =============================================================================
// LiquidationThreshold
// =============================================================================

/// Share of collateral value that counts towards backing debt.
///
/// Expressed against [`LiquidationThreshold::PRECISION`] (percent), the same
/// scale the engine uses on-chain.
///
/// # Invariants
/// - `1 <= percent <= 100`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationThreshold {
    percent: u64,
}

impl LiquidationThreshold {
    /// Denominator of the threshold.
    pub const PRECISION: u64 = 100;

    /// Create a threshold from a percentage.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidRequest` when outside `1..=100`.
    pub fn from_percent(percent: u64) -> DomainResult<Self> {
        if percent == 0 || percent > Self::PRECISION {
            return Err(DomainError::InvalidRequest(format!(
                "liquidation threshold must be within 1..=100 percent, got {}",
                percent
            )));
        }
        Ok(Self { percent })
    }

    /// Get the percentage
    pub fn percent(&self) -> u64 {
        self.percent
    }

    /// Collateral value discounted by the threshold.
    pub fn adjust(&self, collateral_value: ScaledAmount) -> U256 {
        collateral_value.as_u256().saturating_mul(U256::from(self.percent)) / U256::from(Self::PRECISION)
    }
}

impl Default for LiquidationThreshold {
    fn default() -> Self {
        Self { percent: 50 }
    }
}

// =============================================================================
// HealthFactor
// =============================================================================

/// Collateralization ratio as an 18-decimal fixed-point number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HealthFactor(U256);

impl HealthFactor {
    /// Health factor of a debt-free position.
    pub const INFINITE: Self = Self(U256::MAX);

    /// Below this the position can be liquidated.
    pub const MIN: Self = Self(PRECISION);

    /// Wrap a raw 18-decimal value.
    pub const fn from_raw(raw: U256) -> Self {
        Self(raw)
    }

    /// Get the raw 18-decimal value
    pub fn as_u256(&self) -> U256 {
        self.0
    }

    /// True for the debt-free sentinel
    pub fn is_infinite(&self) -> bool {
        *self == Self::INFINITE
    }

    /// True when the engine would allow liquidation
    pub fn is_liquidatable(&self) -> bool {
        *self < Self::MIN
    }

    /// Lossy conversion for display and tiering.
    ///
    /// Returns `None` for infinite or out-of-range values.
    pub fn to_decimal(&self) -> Option<Decimal> {
        if self.is_infinite() {
            return None;
        }
        let raw = u128::try_from(self.0).ok()?;
        let raw = i128::try_from(raw).ok()?;
        Decimal::try_from_i128_with_scale(raw, STABLECOIN_DECIMALS as u32)
            .ok()
            .map(|d| d.normalize())
    }

    /// Display tier.
    pub fn status(&self) -> HealthStatus {
        HealthStatus::classify(*self)
    }

    /// Fill level of a 0..=3 gauge, in percent.
    pub fn gauge_percent(&self) -> Decimal {
        let hundred = Decimal::ONE_HUNDRED;
        match self.to_decimal() {
            Some(value) => (value / Decimal::from(3) * hundred).min(hundred),
            None => hundred,
        }
    }
}

impl fmt::Display for HealthFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinite() {
            return write!(f, "∞");
        }
        let value = ScaledAmount::from_base_units(self.0);
        write!(f, "{}", value.to_decimal_string(STABLECOIN_DECIMALS, 2))
    }
}

/// Health factor for a collateral value and debt, both in 18-decimal USD.
///
/// # Examples
/// ```
/// # use anchor_domain::health::{compute_health_factor, HealthFactor, LiquidationThreshold};
/// # use anchor_domain::value_objects::ScaledAmount;
/// let collateral = ScaledAmount::from_decimal_str("4000", 18).unwrap();
/// let debt = ScaledAmount::from_decimal_str("1000", 18).unwrap();
/// let hf = compute_health_factor(collateral, debt, LiquidationThreshold::default());
/// assert_eq!(hf.to_string(), "2");
///
/// let no_debt = compute_health_factor(collateral, ScaledAmount::ZERO, LiquidationThreshold::default());
/// assert!(no_debt.is_infinite());
/// ```
pub fn compute_health_factor(
    collateral_value: ScaledAmount,
    debt: ScaledAmount,
    threshold: LiquidationThreshold,
) -> HealthFactor {
    if debt.is_zero() {
        return HealthFactor::INFINITE;
    }

    let adjusted = threshold.adjust(collateral_value);
    HealthFactor(adjusted.saturating_mul(PRECISION) / debt.as_u256())
}

/// Stablecoin that can still be minted without breaching the threshold.
pub fn max_mintable(
    collateral_value: ScaledAmount,
    debt: ScaledAmount,
    threshold: LiquidationThreshold,
) -> ScaledAmount {
    let adjusted = threshold.adjust(collateral_value);
    ScaledAmount::from_base_units(adjusted.saturating_sub(debt.as_u256()))
}

// =============================================================================
// HealthStatus
// =============================================================================

/// Risk tier used for display and guard-rails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// >= 2.0
    Healthy,
    /// >= 1.5
    Moderate,
    /// >= 1.2
    AtRisk,
    /// < 1.2
    Critical,
}

impl HealthStatus {
    /// Classify a health factor.
    pub fn classify(health_factor: HealthFactor) -> Self {
        let raw = health_factor.as_u256();
        let tenths = |n: u64| PRECISION / U256::from(10u8) * U256::from(n);

        if raw >= tenths(20) {
            HealthStatus::Healthy
        } else if raw >= tenths(15) {
            HealthStatus::Moderate
        } else if raw >= tenths(12) {
            HealthStatus::AtRisk
        } else {
            HealthStatus::Critical
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "Healthy"),
            HealthStatus::Moderate => write!(f, "Moderate"),
            HealthStatus::AtRisk => write!(f, "At Risk"),
            HealthStatus::Critical => write!(f, "Critical"),
        }
    }
}

// =============================================================================
// HealthFactorProjection
// =============================================================================

/// "What would my position look like after this operation."
///
/// Purely derivative: always recomputed as a whole, never patched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthFactorProjection {
    /// Projected health factor
    pub health_factor: HealthFactor,
    /// Projected stablecoin debt (18 decimals)
    pub projected_debt: ScaledAmount,
    /// Projected collateral value in USD (18 decimals)
    pub projected_collateral_value: ScaledAmount,
}

impl HealthFactorProjection {
    /// Build a projection, deriving the health factor from debt and collateral.
    pub fn derive(
        projected_collateral_value: ScaledAmount,
        projected_debt: ScaledAmount,
        threshold: LiquidationThreshold,
    ) -> Self {
        Self {
            health_factor: compute_health_factor(projected_collateral_value, projected_debt, threshold),
            projected_debt,
            projected_collateral_value,
        }
    }

    /// Merge the burn leg (debt after burn) and the redeem leg (collateral
    /// value after redeem) of a combined redeem-and-burn.
    pub fn combine_redeem_and_burn(
        burn_leg: &HealthFactorProjection,
        redeem_leg: &HealthFactorProjection,
        threshold: LiquidationThreshold,
    ) -> Self {
        Self::derive(redeem_leg.projected_collateral_value, burn_leg.projected_debt, threshold)
    }

    /// Advisory guard-rail: the operation would leave the position liquidatable.
    pub fn breaks_minimum(&self) -> bool {
        self.health_factor.is_liquidatable()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn usd(value: &str) -> ScaledAmount {
        ScaledAmount::from_decimal_str(value, 18).unwrap()
    }

    fn hf(value: &str) -> HealthFactor {
        HealthFactor::from_raw(usd(value).as_u256())
    }

    #[test]
    fn test_health_factor_formula() {
        let threshold = LiquidationThreshold::default();

        let result = compute_health_factor(usd("3000"), usd("1000"), threshold);
        assert_eq!(result, hf("1.5"));

        let result = compute_health_factor(usd("1000"), usd("1000"), threshold);
        assert_eq!(result, hf("0.5"));
        assert!(result.is_liquidatable());
    }

    #[test]
    fn test_zero_debt_is_infinite() {
        let result = compute_health_factor(usd("1000"), ScaledAmount::ZERO, LiquidationThreshold::default());
        assert!(result.is_infinite());
        assert!(!result.is_liquidatable());
        assert_eq!(result.to_string(), "∞");
        assert_eq!(result.status(), HealthStatus::Healthy);

        let empty = compute_health_factor(ScaledAmount::ZERO, ScaledAmount::ZERO, LiquidationThreshold::default());
        assert!(empty.is_infinite());
    }

    #[test]
    fn test_threshold_is_configurable() {
        let eighty = LiquidationThreshold::from_percent(80).unwrap();
        let result = compute_health_factor(usd("1000"), usd("400"), eighty);
        assert_eq!(result, hf("2"));

        assert!(LiquidationThreshold::from_percent(0).is_err());
        assert!(LiquidationThreshold::from_percent(101).is_err());
    }

    #[test]
    fn test_max_mintable_never_negative() {
        let threshold = LiquidationThreshold::default();
        assert_eq!(max_mintable(usd("1000"), usd("100"), threshold), usd("400"));
        assert_eq!(max_mintable(usd("1000"), usd("900"), threshold), ScaledAmount::ZERO);
    }

    #[test]
    fn test_status_tiers() {
        assert_eq!(hf("2").status(), HealthStatus::Healthy);
        assert_eq!(hf("1.99").status(), HealthStatus::Moderate);
        assert_eq!(hf("1.5").status(), HealthStatus::Moderate);
        assert_eq!(hf("1.2").status(), HealthStatus::AtRisk);
        assert_eq!(hf("1.19").status(), HealthStatus::Critical);
    }

    #[test]
    fn test_to_decimal_and_gauge() {
        assert_eq!(hf("1.5").to_decimal(), Some(dec!(1.5)));
        assert_eq!(HealthFactor::INFINITE.to_decimal(), None);
        assert_eq!(hf("1.5").gauge_percent(), dec!(50));
        assert_eq!(hf("4").gauge_percent(), dec!(100));
    }

    #[test]
    fn test_combined_projection_uses_both_legs() {
        let threshold = LiquidationThreshold::default();
        let burn_leg = HealthFactorProjection::derive(usd("5000"), usd("500"), threshold);
        let redeem_leg = HealthFactorProjection::derive(usd("2000"), usd("1000"), threshold);

        let combined = HealthFactorProjection::combine_redeem_and_burn(&burn_leg, &redeem_leg, threshold);

        assert_eq!(combined.projected_debt, usd("500"));
        assert_eq!(combined.projected_collateral_value, usd("2000"));
        assert_eq!(combined.health_factor, hf("2"));
    }

    #[test]
    fn test_combined_projection_with_debt_fully_burned() {
        let threshold = LiquidationThreshold::default();
        let burn_leg = HealthFactorProjection::derive(usd("5000"), ScaledAmount::ZERO, threshold);
        let redeem_leg = HealthFactorProjection::derive(usd("100"), usd("1000"), threshold);

        let combined = HealthFactorProjection::combine_redeem_and_burn(&burn_leg, &redeem_leg, threshold);
        assert!(combined.health_factor.is_infinite());
        assert!(!combined.breaks_minimum());
    }
}
