//! Newtype wrappers around `String` for the identifiers that flow through
//! the engine. Kept distinct so a raw path string can never be mistaken for
//! a `DataNodeId` by the type checker.

use std::fmt;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(SessionId);
string_id!(DataNodeId);
string_id!(ToolCallId);
string_id!(ResourceKey);

impl ResourceKey {
    /// `file:<abs-path>`.
    pub fn for_file(abs_path: &str) -> Self {
        Self(format!("file:{abs_path}"))
    }
}

/// The three id-prefix families defined in the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPrefix {
    User,
    Obs,
    File,
}

impl IdPrefix {
    pub fn as_str(self) -> &'static str {
        match self {
            IdPrefix::User => "user",
            IdPrefix::Obs => "obs",
            IdPrefix::File => "file",
        }
    }
}

/// Builds a `<prefix>:t<turn>:<suffix>` id per the data model invariant
/// that ids are never mutated once created.
pub fn make_data_node_id(prefix: IdPrefix, turn: u64, suffix: &str) -> DataNodeId {
    DataNodeId::new(format!("{}:t{turn}:{suffix}", prefix.as_str()))
}
