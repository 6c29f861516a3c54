//! Resource quantity grammar.
//!
//! Quantities follow the Kubernetes convention: a decimal number optionally
//! followed by a unit or exponent suffix (`200m`, `0.1`, `512M`, `1Gi`, `1e3`).

use std::sync::OnceLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::ParamError;

/// Pattern every CPU/memory request must match.
pub const QUANTITY_PATTERN: &str = r"^([+-]?[0-9.]+)([eEinumkKMGTP]*[-+]?[0-9]*)$";

fn quantity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(QUANTITY_PATTERN).expect("quantity pattern compiles"))
}

/// Returns true if `value` matches the quantity grammar.
pub fn is_quantity(value: &str) -> bool {
    quantity_regex().is_match(value)
}

/// A resource quantity string that has passed the grammar check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(String);

impl Quantity {
    /// Validate `value` for the named parameter.
    pub fn parse(field: &'static str, value: &str) -> Result<Self, ParamError> {
        if is_quantity(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(ParamError::InvalidQuantity {
                field,
                value: value.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_documented_forms() {
        for value in ["200m", "500m", "0.1", "1.5", "5", "512M", "1G", "8G", "1Gi", "128974848", "129e6", "+1"] {
            assert!(is_quantity(value), "{value} should be accepted");
        }
    }

    #[test]
    fn test_rejects_malformed_forms() {
        for value in ["1BB", "", "M", "abc", "1 G", "1GB", "-", "1.5.x"] {
            assert!(!is_quantity(value), "{value} should be rejected");
        }
    }

    #[test]
    fn test_parse_reports_field() {
        let err = Quantity::parse("driver-memory", "1BB").unwrap_err();
        assert_eq!(
            err,
            ParamError::InvalidQuantity {
                field: "driver-memory",
                value: "1BB".to_string()
            }
        );
        assert_eq!(err.parameter(), "driver-memory");
    }

    #[test]
    fn test_parse_keeps_input_text() {
        let q = Quantity::parse("executor-core-request", "500m").unwrap();
        assert_eq!(q.as_str(), "500m");
        assert_eq!(q.to_string(), "500m");
    }
}
