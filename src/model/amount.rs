//! Amount type for handling monetary values with optional currency symbols.
//!
//! This module provides the `Amount` type which wraps `Decimal` and handles parsing values that
//! may or may not include a euro or dollar sign and thousands separators. Receipts in the wild
//! carry either symbol, so both are accepted; the default rendering is euro.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

/// The currency symbol that was (or should be) used when formatting an amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Symbol {
    /// No currency symbol.
    None,
    /// A `€` prefix.
    #[default]
    Euro,
    /// A `$` prefix.
    Dollar,
}

impl Symbol {
    fn as_str(&self) -> &'static str {
        match self {
            Symbol::None => "",
            Symbol::Euro => "€",
            Symbol::Dollar => "$",
        }
    }
}

/// Represents how amounts were (or should be) formatted.
///
/// # Examples
///  - `AmountFormat{ symbol: Symbol::Euro, commas: true }` -> `-€60,000.00`
///  - `AmountFormat{ symbol: Symbol::None, commas: true }` -> `-60,000.00`
///  - `AmountFormat{ symbol: Symbol::None, commas: false }` -> `-60000.00`
///  - `AmountFormat{ symbol: Symbol::Dollar, commas: false }` -> `-$60000.00`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AmountFormat {
    /// The currency symbol present in the formatting.
    symbol: Symbol,
    /// Whether commas are present as thousands separators in the formatting.
    commas: bool,
}

impl Default for AmountFormat {
    fn default() -> Self {
        DEFAULT_FORMAT
    }
}

/// The default format has a euro sign and commas: e.g. `-€60,000.00`.
const DEFAULT_FORMAT: AmountFormat = AmountFormat {
    symbol: Symbol::Euro,
    commas: true,
};

/// Represents a monetary amount.
///
/// This type wraps `Decimal` and provides custom serialization/deserialization to handle amounts
/// that may be formatted with or without currency signs or commas.
///
/// Formatting is considered significant for the purposes of equality, so for numeric comparisons,
/// you should access the `Decimal` value and use that.
///
/// # Examples
///
/// Parsing with a currency sign:
/// ```
/// # use receipt_sync::model::Amount;
/// # use std::str::FromStr;
/// let amount = Amount::from_str("-€50.00").unwrap();
/// assert_eq!(amount.to_string(), "-€50.00");
/// ```
///
/// Parsing without a currency sign:
/// ```
/// # use receipt_sync::model::Amount;
/// # use std::str::FromStr;
/// let amount = Amount::from_str("-50.00").unwrap();
/// assert_ne!(amount.to_string(), "-€50.00");
/// assert_eq!(amount.to_string(), "-50.00");
/// ```
///
/// Value equivalency, but not absolute equivalency
/// ```
/// # use receipt_sync::model::Amount;
/// # use std::str::FromStr;
/// let a = Amount::from_str("5000.00").unwrap();
/// let b = Amount::from_str("€5,000.00").unwrap();
/// assert_ne!(a, b);
/// assert_ne!(a.to_string(), b.to_string());
/// assert_eq!(a.value(), b.value());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount {
    /// The parsed numerical value.
    value: Decimal,
    /// The way the numerical value was parsed from, or should be written to, a `String`.
    format: AmountFormat,
}

impl Amount {
    /// Creates a new Amount from a Decimal value with default `String` formatting.
    pub const fn new(value: Decimal) -> Self {
        Self {
            value,
            format: DEFAULT_FORMAT,
        }
    }

    /// Creates a new Amount from a Decimal value with the specified formatting.
    pub const fn new_with_format(value: Decimal, format: AmountFormat) -> Self {
        Self { value, format }
    }

    /// Returns the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.value
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.value().is_zero()
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.value().is_sign_positive()
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.value().is_sign_negative()
    }
}

/// An error that can occur when parsing strings into `Decimal` values.
pub struct AmountError(rust_decimal::Error);

impl Debug for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl Display for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl std::error::Error for AmountError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut symbol = Symbol::None;

        // Remove whitespace
        let trimmed = s.trim();

        // Handle empty string
        if trimmed.is_empty() {
            return Ok(Amount::default());
        }

        // Remove the currency sign if present. The sign may come before or after the minus sign
        // and, for euro receipts, sometimes trails the number.
        let mut stripped = String::with_capacity(trimmed.len());
        let mut negative = false;
        for c in trimmed.chars() {
            match c {
                '€' => symbol = Symbol::Euro,
                '$' => symbol = Symbol::Dollar,
                '-' => negative = true,
                ' ' => {}
                other => stripped.push(other),
            }
        }

        // Remove commas (thousands separators)
        let without_commas = stripped.replace(',', "");
        let commas = without_commas.len() < stripped.len();

        // Parse the decimal value
        let mut value = Decimal::from_str(&without_commas).map_err(AmountError)?;
        if negative {
            value.set_sign_negative(true);
        }
        Ok(Amount {
            value,
            format: AmountFormat { symbol, commas },
        })
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (sign, num) = if self.is_negative() {
            (String::from("-"), self.value().abs())
        } else {
            (String::new(), self.value())
        };

        let sym = self.format.symbol.as_str();

        if self.format.commas {
            write!(
                f,
                "{sign}{sym}{}",
                format_num::format_num!(",.2", num.to_f64().unwrap_or_default())
            )
        } else {
            write!(f, "{sign}{sym}{num}")
        }
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Serialize as a string with the currency sign
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Amount::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Amount::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_euro_sign() {
        let amount = Amount::from_str("€50.00").unwrap();
        assert_eq!(amount.value(), Decimal::from_str("50.00").unwrap());
    }

    #[test]
    fn test_parse_with_trailing_euro_sign() {
        let amount = Amount::from_str("50.00 €").unwrap();
        assert_eq!(amount.value(), Decimal::from_str("50.00").unwrap());
        assert_eq!(amount.to_string(), "€50.00");
    }

    #[test]
    fn test_parse_with_dollar_sign() {
        let amount = Amount::from_str("$50.00").unwrap();
        assert_eq!(amount.value(), Decimal::from_str("50.00").unwrap());
        assert_eq!(amount.to_string(), "$50.00");
    }

    #[test]
    fn test_parse_without_sign() {
        let amount = Amount::from_str("50.00").unwrap();
        assert_eq!(amount.value(), Decimal::from_str("50.00").unwrap());
    }

    #[test]
    fn test_parse_negative_with_euro_sign() {
        let amount = Amount::from_str("-€50.00").unwrap();
        assert_eq!(amount.value(), Decimal::from_str("-50.00").unwrap());
    }

    #[test]
    fn test_parse_negative_without_sign() {
        let amount = Amount::from_str("-50.00").unwrap();
        assert_eq!(amount.value(), Decimal::from_str("-50.00").unwrap());
    }

    #[test]
    fn test_parse_empty_string() {
        let amount = Amount::from_str("").unwrap();
        assert_eq!(amount.value(), Decimal::ZERO);
    }

    #[test]
    fn test_parse_whitespace() {
        let amount = Amount::from_str("  €50.00  ").unwrap();
        assert_eq!(amount.value(), Decimal::from_str("50.00").unwrap());
    }

    #[test]
    fn test_display_positive() {
        let amount = Amount::new(Decimal::from_str("50.00").unwrap());
        assert_eq!(amount.to_string(), "€50.00");
    }

    #[test]
    fn test_display_negative() {
        let amount = Amount::new(Decimal::from_str("-50.00").unwrap());
        assert_eq!(amount.to_string(), "-€50.00");
    }

    #[test]
    fn test_display_zero() {
        let amount = Amount::new(Decimal::ZERO);
        assert_eq!(amount.to_string(), "€0.00");
    }

    #[test]
    fn test_serialize() {
        let amount = Amount::new(Decimal::from_str("50.00").unwrap());
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "\"€50.00\"");
    }

    #[test]
    fn test_deserialize_with_euro() {
        let json = "\"€50.00\"";
        let amount: Amount = serde_json::from_str(json).unwrap();
        assert_eq!(amount.value(), Decimal::from_str("50.00").unwrap());
    }

    #[test]
    fn test_deserialize_negative() {
        let json = "\"-€50.00\"";
        let amount: Amount = serde_json::from_str(json).unwrap();
        assert_eq!(amount.value(), Decimal::from_str("-50.00").unwrap());
    }

    #[test]
    fn test_equality() {
        let a1 = Amount::from_str("€50.00").unwrap();
        let a2 = Amount::from_str("50.00").unwrap();
        assert_ne!(a1, a2);
        assert_eq!(a1.value(), a2.value());
    }

    #[test]
    fn test_ordering() {
        let a1 = Amount::from_str("€30.00").unwrap();
        let a2 = Amount::from_str("€50.00").unwrap();
        assert!(a1 < a2);
    }

    #[test]
    fn test_zero_is_not_positive_or_negative() {
        let zero = Amount::from_str("€0.00").unwrap();
        assert!(!zero.is_positive());
        assert!(!zero.is_negative());
        assert!(zero.is_zero());
    }

    #[test]
    fn test_parse_with_commas() {
        let amount = Amount::from_str("€1,000.00").unwrap();
        assert_eq!(amount.value(), Decimal::from_str("1000.00").unwrap());
    }

    #[test]
    fn test_parse_multiple_commas() {
        let amount = Amount::from_str("€1,234,567.89").unwrap();
        assert_eq!(amount.value(), Decimal::from_str("1234567.89").unwrap());
    }

    #[test]
    fn test_parse_retain_commas_no_sign() {
        let s = "1,000,000.00";
        let amount = Amount::from_str(s).unwrap();
        let actual = amount.to_string();
        assert_eq!(actual, s);
    }

    #[test]
    fn test_parse_no_commas_retain_sign() {
        let s = "-€1000000.00";
        let amount = Amount::from_str(s).unwrap();
        let actual = amount.to_string();
        assert_eq!(actual, s);
    }
}
