//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Prefix the accounting system uses for code references (`code:ABC`).
pub const CODE_PREFIX: &str = "code:";

/// Longest code the accounting system accepts.
const MAX_CODE_LEN: usize = 20;

/// Identifier of one processing run (correlates logs and reports).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Create a new identifier.
    ///
    /// Uses UUIDv7 (time-ordered).
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

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for RunId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

macro_rules! impl_code_newtype {
    ($t:ident, $name:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $t(String);

        impl $t {
            /// Decode a code as the accounting system reports it, with or
            /// without the `code:` reference prefix.
            pub fn decode(raw: &str) -> Result<Self, DomainError> {
                let trimmed = raw.trim();
                let bare = trimmed.strip_prefix(CODE_PREFIX).unwrap_or(trimmed).trim();

                if bare.is_empty() {
                    return Err(DomainError::invalid_code(format!("{}: empty code", $name)));
                }
                if bare.chars().count() > MAX_CODE_LEN {
                    return Err(DomainError::invalid_code(format!(
                        "{}: '{}' is longer than {} characters",
                        $name, bare, MAX_CODE_LEN
                    )));
                }
                if bare.chars().any(char::is_whitespace) {
                    return Err(DomainError::invalid_code(format!(
                        "{}: '{}' contains whitespace",
                        $name, bare
                    )));
                }

                Ok(Self(bare.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Reference form understood by the accounting system (`code:ABC`).
            pub fn as_reference(&self) -> String {
                format!("{}{}", CODE_PREFIX, self.0)
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::decode(s)
            }
        }
    };
}

impl_code_newtype!(CustomerCode, "CustomerCode");
impl_code_newtype!(DocumentCode, "DocumentCode");
impl_code_newtype!(ProductCode, "ProductCode");

/// Strip the `code:` prefix without validating the remainder.
///
/// Used for directory lookups keyed by the billing provider's external id.
pub fn uncode(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed.strip_prefix(CODE_PREFIX).unwrap_or(trimmed).trim()
}
