//! Validated identifier newtypes: `RuleName` and `SensorId`.
//!
//! Both share the same surface grammar (`^[A-Za-z_][A-Za-z0-9_]*$`) but are
//! kept as distinct types so a rule name can never be passed where a sensor
//! identifier is expected, and vice versa.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::validation::is_valid_identifier;

macro_rules! validated_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate and construct. Fails if `s` does not match the
            /// identifier grammar.
            pub fn new(s: impl Into<String>) -> CoreResult<Self> {
                let s = s.into();
                if !is_valid_identifier(&s) {
                    return Err(CoreError::InvalidIdentifier(s));
                }
                Ok(Self(s))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = CoreError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                $name::new(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl TryFrom<&str> for $name {
            type Error = CoreError;

            fn try_from(s: &str) -> Result<Self, Self::Error> {
                $name::new(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

validated_id!(RuleName, "A rule's unique name within a compilation unit.");
validated_id!(SensorId, "A sensor identifier, physical, virtual or buffer-backed.");
