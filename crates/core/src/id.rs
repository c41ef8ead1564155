// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ID newtypes and generation

/// Trait for truncating identifiers to a short prefix.
pub trait ShortId {
    /// Returns a string slice truncated to at most `n` characters.
    fn short(&self, n: usize) -> &str;
}

impl ShortId for str {
    fn short(&self, n: usize) -> &str {
        if self.len() <= n {
            self
        } else {
            &self[..n]
        }
    }
}

/// Define a newtype ID wrapper around `String`.
///
/// Generates `new()`, `as_str()`, `short()`, `Display`, `From<String>`, `From<&str>`,
/// `PartialEq<str>`, `PartialEq<&str>`, and `Borrow<str>` implementations.
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns a string slice truncated to at most `n` characters.
            pub fn short(&self, n: usize) -> &str {
                if self.0.len() <= n {
                    &self.0
                } else {
                    &self.0[..n]
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
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

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for one execution of a workflow.
    ///
    /// Generated ids sort lexically in creation order (hex epoch-millis
    /// prefix), so `meow ls` style listings come out newest-last without
    /// parsing timestamps.
    #[derive(Default)]
    pub struct RunId;
}

define_id! {
    /// Identifier of a step within a run.
    ///
    /// Children created by expansion are namespaced under their parent:
    /// `<parent>.<local-id>` or `<parent>.<index>`.
    #[derive(Default)]
    pub struct StepId;
}

define_id! {
    /// Identifier of an agent within a run (workflow-author chosen).
    #[derive(Default)]
    pub struct AgentId;
}

impl RunId {
    /// Generate a fresh, time-ordered run id: `<epoch-ms-hex>-<uuid-prefix>`.
    pub fn generate(epoch_ms: u64) -> Self {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{:012x}-{}", epoch_ms, uuid.short(8)))
    }
}

impl StepId {
    /// Id for a child produced by expanding this step.
    pub fn child(&self, local: &str) -> StepId {
        StepId(format!("{}.{}", self.0, local))
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
