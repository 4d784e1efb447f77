//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of different ID types (e.g., passing a
//! `RepositoryId` where a `JobId` is expected) and make signatures self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                $name(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }
    };
}

string_id!(
    /// An internal user identifier.
    UserId
);

string_id!(
    /// An import job identifier.
    JobId
);

string_id!(
    /// An internal identifier for a tracked repository record.
    RepositoryId
);

string_id!(
    /// A source-system identifier for an activity item.
    ///
    /// For commits this is the SHA; for pull requests and reviews it is the
    /// numeric GitHub id rendered as a string. Together with a [`UserId`] it
    /// forms the deduplication key for stored events.
    ExternalId
);

string_id!(
    /// A GitHub webhook delivery ID (`X-GitHub-Delivery`).
    DeliveryId
);

impl From<u64> for ExternalId {
    fn from(n: u64) -> Self {
        ExternalId(n.to_string())
    }
}

/// A pull request number within a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrNumber(pub u64);

impl fmt::Display for PrNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for PrNumber {
    fn from(n: u64) -> Self {
        PrNumber(n)
    }
}
