use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::ensure;
use uuid::Uuid;

use super::error::{InvalidIdSnafu, StorageError, StorageResult};

// Ids are minted by the chat backend, so the wrappers hold opaque strings and only
// reject values that could never address a document.
macro_rules! define_storage_id {
    ($name:ident, $id_type:literal) => {
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn parse(raw: &str) -> StorageResult<Self> {
                let trimmed = raw.trim();
                ensure!(
                    !trimmed.is_empty(),
                    InvalidIdSnafu {
                        stage: "parse-storage-id",
                        id_type: $id_type,
                        raw: raw.to_string(),
                        reason: "identifier is blank",
                    }
                );
                ensure!(
                    !trimmed.contains('/'),
                    InvalidIdSnafu {
                        stage: "parse-storage-id",
                        id_type: $id_type,
                        raw: raw.to_string(),
                        reason: "identifier must not contain '/'",
                    }
                );
                Ok(Self(trimmed.to_string()))
            }

            /// Wraps a compile-time literal; callers guarantee it is a valid id.
            pub fn from_static(raw: &'static str) -> Self {
                debug_assert!(Self::parse(raw).is_ok(), "invalid static id {raw:?}");
                Self(raw.to_string())
            }

            pub fn new_v7() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = StorageError;

            fn from_str(raw: &str) -> StorageResult<Self> {
                Self::parse(raw)
            }
        }

        impl TryFrom<String> for $name {
            type Error = StorageError;

            fn try_from(raw: String) -> StorageResult<Self> {
                Self::parse(&raw)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

define_storage_id!(SessionId, "session-id");
define_storage_id!(UserId, "user-id");
