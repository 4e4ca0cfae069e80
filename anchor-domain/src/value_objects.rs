//! Value Objects for the AnchorUSD client domain
//!
//! Immutable, validated domain primitives.
//! Token quantities are fixed-point integers; no binary floating point is
//! involved at any step of parsing or formatting.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol-fixed precision of the stablecoin and of every USD value and
/// health factor reported by the engine.
pub const STABLECOIN_DECIMALS: u8 = 18;

/// Default number of fractional digits shown to users.
pub const DEFAULT_DISPLAY_DECIMALS: u8 = 4;

/// Domain errors for value object validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Malformed user-typed amount (caller must re-prompt)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Asset symbol or address not present in the registry
    #[error("Unknown asset: {0}")]
    UnknownAsset(String),

    /// Malformed on-chain address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Operation request is structurally incomplete
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid state transition
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

// =============================================================================
// ScaledAmount
// =============================================================================

/// A token quantity as a non-negative fixed-point integer.
///
/// The value is the quantity multiplied by `10^precision`, where the precision
/// is the token's decimals (18 for the stablecoin, collateral-specific
/// otherwise). The precision is not stored: it belongs to the asset.
///
/// # Invariants
/// - Never constructed from a float; user input goes through
///   [`ScaledAmount::from_decimal_str`], which keeps every digit up to the
///   target precision and truncates the rest.
/// - Bounded by `uint256`, the on-chain representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ScaledAmount(U256);

impl ScaledAmount {
    /// Zero amount.
    pub const ZERO: Self = Self(U256::ZERO);

    /// Wrap a raw base-unit integer.
    pub const fn from_base_units(value: U256) -> Self {
        Self(value)
    }

    /// Parse a user-typed decimal string at the given precision.
    ///
    /// # Examples
    /// ```
    /// # use anchor_domain::value_objects::ScaledAmount;
    /// # use alloy_primitives::U256;
    /// let amount = ScaledAmount::from_decimal_str("0.1", 18).unwrap();
    /// assert_eq!(amount.as_u256(), U256::from(100_000_000_000_000_000u128));
    ///
    /// let usdc = ScaledAmount::from_decimal_str("5", 6).unwrap();
    /// assert_eq!(usdc.as_u256(), U256::from(5_000_000u64));
    /// ```
    ///
    /// # Errors
    /// Returns `DomainError::InvalidAmount` if the input contains characters
    /// outside `[0-9.]`, more than one `.`, no digit at all, or a value that
    /// does not fit in 256 bits.
    pub fn from_decimal_str(input: &str, precision: u8) -> DomainResult<Self> {
        if let Some(bad) = input.chars().find(|c| !c.is_ascii_digit() && *c != '.') {
            return Err(DomainError::InvalidAmount(format!(
                "unexpected character '{}' in \"{}\"",
                bad, input
            )));
        }
        if input.matches('.').count() > 1 {
            return Err(DomainError::InvalidAmount(format!(
                "more than one decimal point in \"{}\"",
                input
            )));
        }
        if !input.chars().any(|c| c.is_ascii_digit()) {
            return Err(DomainError::InvalidAmount(format!("no digits in \"{}\"", input)));
        }

        let (whole, fraction) = input.split_once('.').unwrap_or((input, ""));
        let whole: String = whole.chars().filter(char::is_ascii_digit).collect();
        let mut fraction: String = fraction.chars().filter(char::is_ascii_digit).collect();

        // Excess fractional digits are dropped, never rounded.
        fraction.truncate(precision as usize);
        while fraction.len() < precision as usize {
            fraction.push('0');
        }

        let overflow = || DomainError::InvalidAmount(format!("\"{}\" exceeds the uint256 range", input));

        let whole = parse_digits(&whole).ok_or_else(overflow)?;
        let fraction = parse_digits(&fraction).ok_or_else(overflow)?;
        let scale = pow10(precision).ok_or_else(overflow)?;

        whole
            .checked_mul(scale)
            .and_then(|scaled| scaled.checked_add(fraction))
            .map(Self)
            .ok_or_else(overflow)
    }

    /// Render the amount as a decimal string for display.
    ///
    /// Fractional digits beyond `max_display_decimals` are truncated, trailing
    /// zeros are trimmed, and the integer part is never rounded.
    ///
    /// # Examples
    /// ```
    /// # use anchor_domain::value_objects::ScaledAmount;
    /// let amount = ScaledAmount::from_decimal_str("1234.56789", 18).unwrap();
    /// assert_eq!(amount.to_decimal_string(18, 4), "1234.5678");
    /// assert_eq!(amount.to_decimal_string(18, 0), "1234");
    /// ```
    pub fn to_decimal_string(&self, precision: u8, max_display_decimals: u8) -> String {
        let digits = self.0.to_string();
        let precision = precision as usize;

        let (integer, fraction) = if digits.len() > precision {
            let (integer, fraction) = digits.split_at(digits.len() - precision);
            (integer.to_string(), fraction.to_string())
        } else {
            ("0".to_string(), format!("{:0>width$}", digits, width = precision))
        };

        let shown = &fraction[..fraction.len().min(max_display_decimals as usize)];
        let shown = shown.trim_end_matches('0');

        if shown.is_empty() {
            integer
        } else {
            format!("{}.{}", integer, shown)
        }
    }

    /// Get the underlying base-unit integer
    pub fn as_u256(&self) -> U256 {
        self.0
    }

    /// True when the amount is zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl From<U256> for ScaledAmount {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl fmt::Display for ScaledAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `10^exponent`, or `None` past the uint256 range.
pub fn pow10(exponent: u8) -> Option<U256> {
    U256::from(10u8).checked_pow(U256::from(exponent))
}

fn parse_digits(digits: &str) -> Option<U256> {
    if digits.is_empty() {
        return Some(U256::ZERO);
    }
    U256::from_str_radix(digits, 10).ok()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn scaled(input: &str, precision: u8) -> U256 {
        ScaledAmount::from_decimal_str(input, precision).unwrap().as_u256()
    }

    #[test]
    fn test_parse_fixed_examples() {
        assert_eq!(scaled("0.1", 18), U256::from(100_000_000_000_000_000u128));
        assert_eq!(scaled("5", 6), U256::from(5_000_000u64));
        assert_eq!(scaled("2", 18), U256::from(2_000_000_000_000_000_000u128));
    }

    #[test]
    fn test_parse_partial_forms() {
        assert_eq!(scaled(".5", 6), U256::from(500_000u64));
        assert_eq!(scaled("7.", 6), U256::from(7_000_000u64));
        assert_eq!(scaled("007.25", 2), U256::from(725u64));
        assert_eq!(scaled("0", 18), U256::ZERO);
    }

    #[test]
    fn test_excess_fraction_is_truncated_not_rounded() {
        assert_eq!(scaled("1.999999", 2), U256::from(199u64));
        assert_eq!(scaled("0.0000009", 6), U256::ZERO);
        assert_eq!(scaled("3.99", 0), U256::from(3u64));
    }

    #[test]
    fn test_rejects_invalid_characters() {
        for input in ["1,5", "-1", "1e18", " 1", "abc", "0x10"] {
            let result = ScaledAmount::from_decimal_str(input, 18);
            assert!(
                matches!(result, Err(DomainError::InvalidAmount(_))),
                "expected InvalidAmount for {:?}",
                input
            );
        }
    }

    #[test]
    fn test_rejects_multiple_points_and_empty() {
        assert!(matches!(
            ScaledAmount::from_decimal_str("1.2.3", 18),
            Err(DomainError::InvalidAmount(_))
        ));
        assert!(matches!(
            ScaledAmount::from_decimal_str("", 18),
            Err(DomainError::InvalidAmount(_))
        ));
        assert!(matches!(
            ScaledAmount::from_decimal_str(".", 18),
            Err(DomainError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_rejects_values_beyond_uint256() {
        let huge = "1".repeat(80);
        assert!(matches!(
            ScaledAmount::from_decimal_str(&huge, 0),
            Err(DomainError::InvalidAmount(_))
        ));
        assert!(matches!(
            ScaledAmount::from_decimal_str("1", 78),
            Err(DomainError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_display_trims_and_truncates() {
        let amount = ScaledAmount::from_decimal_str("10.500", 18).unwrap();
        assert_eq!(amount.to_decimal_string(18, 18), "10.5");

        let amount = ScaledAmount::from_decimal_str("0.00009", 18).unwrap();
        assert_eq!(amount.to_decimal_string(18, 4), "0");
        assert_eq!(amount.to_decimal_string(18, 5), "0.00009");

        let amount = ScaledAmount::from_decimal_str("123456789.987654321", 9).unwrap();
        assert_eq!(amount.to_decimal_string(9, 2), "123456789.98");
    }

    #[test]
    fn test_display_small_values_pad_left() {
        let amount = ScaledAmount::from_base_units(U256::from(5u64));
        assert_eq!(amount.to_decimal_string(6, 6), "0.000005");
        assert_eq!(ScaledAmount::ZERO.to_decimal_string(18, 4), "0");
    }

    #[test]
    fn test_round_trip_preserves_value() {
        let cases = [
            ("0.1", 18, "0.1"),
            ("5", 6, "5"),
            ("1.000001", 6, "1.000001"),
            ("42.50", 8, "42.5"),
            ("0", 18, "0"),
            ("98765.4321", 4, "98765.4321"),
        ];

        for (input, precision, expected) in cases {
            let amount = ScaledAmount::from_decimal_str(input, precision).unwrap();
            assert_eq!(amount.to_decimal_string(precision, precision), expected, "input {}", input);
        }
    }

    #[test]
    fn test_pow10_bounds() {
        assert_eq!(pow10(0), Some(U256::from(1u8)));
        assert_eq!(pow10(6), Some(U256::from(1_000_000u64)));
        assert!(pow10(77).is_some());
        assert!(pow10(78).is_none());
    }
}
