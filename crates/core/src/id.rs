//! Strongly-typed identifiers used across the domain.
//!
//! UUID-backed ids are generated locally; string-backed ids are issued by external
//! systems and validated (non-blank, trimmed) at construction.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a user aggregate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

/// Identifier of a vehicle aggregate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(Uuid);

macro_rules! impl_uuid_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
            /// for determinism.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

impl_uuid_newtype!(UserId, "UserId");
impl_uuid_newtype!(VehicleId, "VehicleId");

/// Subject identifier issued by the external identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExternalId(String);

/// Account identifier issued by the vehicle-telemetry provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TeslaAccountId(String);

/// Normalized (trimmed, lower-cased) email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

fn non_blank(field: &'static str, raw: &str) -> Result<String, DomainError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DomainError::argument(field, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

macro_rules! impl_string_newtype {
    ($t:ty) => {
        impl $t {
            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $t {
            type Error = DomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(&value)
            }
        }

        impl TryFrom<&str> for $t {
            type Error = DomainError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }
    };
}

impl ExternalId {
    pub fn new(raw: &str) -> Result<Self, DomainError> {
        non_blank("external_id", raw).map(Self)
    }
}

impl TeslaAccountId {
    pub fn new(raw: &str) -> Result<Self, DomainError> {
        non_blank("account_id", raw).map(Self)
    }
}

impl Email {
    /// Parse and normalize an email address.
    ///
    /// Only the structural shape is checked (`local@domain`, no whitespace);
    /// deliverability is not this type's concern.
    pub fn new(raw: &str) -> Result<Self, DomainError> {
        let value = non_blank("email", raw)?.to_lowercase();

        let mut parts = value.split('@');
        let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
            (Some(local), Some(domain), None) => (local, domain),
            _ => return Err(DomainError::argument("email", "must contain a single '@'")),
        };
        if local.is_empty() || domain.is_empty() {
            return Err(DomainError::argument("email", "local part and domain are required"));
        }
        if value.chars().any(char::is_whitespace) {
            return Err(DomainError::argument("email", "must not contain whitespace"));
        }

        Ok(Self(value))
    }
}

impl_string_newtype!(ExternalId);
impl_string_newtype!(TeslaAccountId);
impl_string_newtype!(Email);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_ids_reject_blank_input() {
        assert!(ExternalId::new("").is_err());
        assert!(ExternalId::new("   ").is_err());
        assert!(TeslaAccountId::new("\t\n").is_err());
        assert!(Email::new(" ").is_err());
    }

    #[test]
    fn string_ids_are_trimmed_and_compare_by_value() {
        let a = ExternalId::new("  ext-1 ").unwrap();
        let b = ExternalId::new("ext-1").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "ext-1");
    }

    #[test]
    fn email_is_normalized() {
        let email = Email::new("  Alice@Example.COM ").unwrap();
        assert_eq!(email.as_str(), "alice@example.com");
    }

    #[test]
    fn email_shape_is_checked() {
        assert!(Email::new("no-at-sign").is_err());
        assert!(Email::new("@example.com").is_err());
        assert!(Email::new("alice@").is_err());
        assert!(Email::new("a@b@c").is_err());
        assert!(Email::new("al ice@example.com").is_err());
    }

    #[test]
    fn blank_input_reports_field() {
        let err = TeslaAccountId::new("").unwrap_err();
        assert!(matches!(
            err,
            DomainError::ArgumentInvalid { field: "account_id", .. }
        ));
    }

    #[test]
    fn deserialization_validates() {
        let ok: Result<Email, _> = serde_json::from_str("\"a@x.com\"");
        assert!(ok.is_ok());

        let bad: Result<ExternalId, _> = serde_json::from_str("\"  \"");
        assert!(bad.is_err());
    }

    #[test]
    fn uuid_ids_parse_and_display() {
        let id = UserId::new();
        let parsed: UserId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<VehicleId>().is_err());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: any input with a non-blank core is accepted and trimmed.
            #[test]
            fn non_blank_input_is_trimmed(
                body in "[A-Za-z0-9_-]{1,32}",
                pad_left in " {0,4}",
                pad_right in " {0,4}",
            ) {
                let raw = format!("{pad_left}{body}{pad_right}");
                let id = TeslaAccountId::new(&raw).unwrap();
                prop_assert_eq!(id.as_str(), body.as_str());
            }

            /// Property: whitespace-only input is always rejected.
            #[test]
            fn whitespace_only_is_rejected(raw in "[ \t\n]{0,8}") {
                prop_assert!(ExternalId::new(&raw).is_err());
            }
        }
    }
}
