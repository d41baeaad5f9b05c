//! Column selectors
//!
//! A `ColumnSelector` names either a whole column family (`"networks"`) or a
//! fully qualified column (`"info:name"`). Family-only selectors are used for
//! family-level policy attachments on map-type families.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Error raised when parsing a selector string.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ColumnParseError {
    #[error("Empty column selector")]
    Empty,

    #[error("Empty family in column selector: {0}")]
    EmptyFamily(String),

    #[error("Empty qualifier in column selector: {0}")]
    EmptyQualifier(String),
}

/// Selector for a column family or a fully qualified column.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnSelector {
    /// Column family name.
    pub family: String,
    /// Qualifier within the family, absent for family-level selectors.
    pub qualifier: Option<String>,
}

impl ColumnSelector {
    /// Create a family-level selector.
    pub fn family(family: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            qualifier: None,
        }
    }

    /// Create a fully qualified selector.
    pub fn qualified(family: impl Into<String>, qualifier: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            qualifier: Some(qualifier.into()),
        }
    }

    /// Whether this selector names a whole family.
    pub fn is_family(&self) -> bool {
        self.qualifier.is_none()
    }

    /// The family-level selector covering this column.
    pub fn family_selector(&self) -> ColumnSelector {
        ColumnSelector::family(self.family.clone())
    }
}

impl fmt::Display for ColumnSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{}:{}", self.family, q),
            None => write!(f, "{}", self.family),
        }
    }
}

impl FromStr for ColumnSelector {
    type Err = ColumnParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ColumnParseError::Empty);
        }
        match s.split_once(':') {
            None => Ok(ColumnSelector::family(s)),
            Some((family, qualifier)) => {
                if family.is_empty() {
                    return Err(ColumnParseError::EmptyFamily(s.to_string()));
                }
                if qualifier.is_empty() {
                    return Err(ColumnParseError::EmptyQualifier(s.to_string()));
                }
                Ok(ColumnSelector::qualified(family, qualifier))
            }
        }
    }
}

impl Serialize for ColumnSelector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ColumnSelector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(DeError::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_family_selector() {
        let selector: ColumnSelector = "networks".parse().unwrap();
        assert_eq!(selector, ColumnSelector::family("networks"));
        assert!(selector.is_family());
    }

    #[test]
    fn test_parse_qualified_selector() {
        let selector: ColumnSelector = "info:name".parse().unwrap();
        assert_eq!(selector, ColumnSelector::qualified("info", "name"));
        assert!(!selector.is_family());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!("".parse::<ColumnSelector>(), Err(ColumnParseError::Empty));
        assert!(matches!(
            ":name".parse::<ColumnSelector>(),
            Err(ColumnParseError::EmptyFamily(_))
        ));
        assert!(matches!(
            "info:".parse::<ColumnSelector>(),
            Err(ColumnParseError::EmptyQualifier(_))
        ));
    }

    #[test]
    fn test_display_round_trip() {
        for raw in ["info:name", "networks"] {
            let selector: ColumnSelector = raw.parse().unwrap();
            assert_eq!(selector.to_string(), raw);
        }
    }

    #[test]
    fn test_serde_string_form() {
        let selector = ColumnSelector::qualified("info", "email");
        let json = serde_json::to_string(&selector).unwrap();
        assert_eq!(json, "\"info:email\"");
        let back: ColumnSelector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, selector);
    }

    #[test]
    fn test_family_selector_of_qualified() {
        let selector = ColumnSelector::qualified("info", "name");
        assert_eq!(selector.family_selector(), ColumnSelector::family("info"));
    }
}
