//! Ad unit identifiers and the names derived from them.
//!
//! Every per-unit artifact (cookie names, store keys, the hook element id)
//! is derived here so that the controller, the ledger and the injected
//! scripts can never disagree about spelling.

use crate::result::{AdSlotError, AdSlotResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one remote ad script
///
/// Opaque to this crate apart from being substituted into a URL path and
/// several names, so only URL-safe characters are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UnitId(String);

impl UnitId {
    /// Validate and wrap a unit id
    pub fn new(id: impl Into<String>) -> AdSlotResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(AdSlotError::InvalidUnitId {
                unit_id: id,
                message: "must not be empty".to_string(),
            });
        }
        if let Some(bad) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(AdSlotError::InvalidUnitId {
                unit_id: id.clone(),
                message: format!("unexpected character {bad:?}"),
            });
        }
        Ok(Self(id))
    }

    /// Borrow the raw id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Cookie carrying the session tracker, `clever-last-tracker-{id}`
    #[must_use]
    pub fn tracker_cookie_name(&self) -> String {
        format!("clever-last-tracker-{}", self.0)
    }

    /// Cookie signalling the unit was counted, `clever-counter-{id}`
    #[must_use]
    pub fn counter_cookie_name(&self) -> String {
        format!("clever-counter-{}", self.0)
    }

    /// Store key of the frequency-cap flag
    #[must_use]
    pub fn counter_key(&self) -> String {
        format!("counter:{}", self.0)
    }

    /// Store key of the replayable tracker value
    #[must_use]
    pub fn tracker_key(&self) -> String {
        format!("last-tracker:{}", self.0)
    }

    /// DOM id of the element the unit hooks are conditioned on
    #[must_use]
    pub fn hook_element_id(&self) -> String {
        format!("clever-{}", self.0)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u32> for UnitId {
    fn from(id: u32) -> Self {
        Self(id.to_string())
    }
}

impl From<u64> for UnitId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl TryFrom<String> for UnitId {
    type Error = AdSlotError;

    fn try_from(value: String) -> AdSlotResult<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for UnitId {
    type Error = AdSlotError;

    fn try_from(value: &str) -> AdSlotResult<Self> {
        Self::new(value)
    }
}

impl From<UnitId> for String {
    fn from(id: UnitId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod validation_tests {
        use super::*;

        #[test]
        fn test_numeric_id_accepted() {
            let id = UnitId::new("42").unwrap();
            assert_eq!(id.as_str(), "42");
            assert_eq!(UnitId::from(42_u32), id);
        }

        #[test]
        fn test_empty_id_rejected() {
            assert!(matches!(
                UnitId::new(""),
                Err(AdSlotError::InvalidUnitId { .. })
            ));
        }

        #[test]
        fn test_path_characters_rejected() {
            for bad in ["1/2", "7?x=1", "a b", "9#", "5|callback"] {
                assert!(UnitId::new(bad).is_err(), "{bad} should be rejected");
            }
        }

        #[test]
        fn test_serde_goes_through_validation() {
            let ok: UnitId = serde_json::from_str("\"abc_1\"").unwrap();
            assert_eq!(ok.as_str(), "abc_1");
            assert!(serde_json::from_str::<UnitId>("\"a/b\"").is_err());
        }
    }

    mod naming_tests {
        use super::*;

        #[test]
        fn test_cookie_names() {
            let id = UnitId::from(7_u32);
            assert_eq!(id.tracker_cookie_name(), "clever-last-tracker-7");
            assert_eq!(id.counter_cookie_name(), "clever-counter-7");
        }

        #[test]
        fn test_store_keys_are_distinct_from_cookie_names() {
            let id = UnitId::from(7_u32);
            assert_eq!(id.counter_key(), "counter:7");
            assert_eq!(id.tracker_key(), "last-tracker:7");
            assert_ne!(id.tracker_key(), id.tracker_cookie_name());
        }

        #[test]
        fn test_hook_element_id() {
            assert_eq!(UnitId::from(12_u64).hook_element_id(), "clever-12");
        }
    }
}
