// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dynamically-typed configuration values.
//!
//! Config sections carry free-form `args` objects whose shape is only
//! known to the component consuming them. They are kept as raw TOML
//! values and probed through [`DynamicExt`].

/// A dynamically-typed value from the configuration document.
pub type Dynamic = toml::Value;

/// Convenience accessors over [`Dynamic`] tables.
pub trait DynamicExt {
    fn get_str(&self, key: &str) -> Option<&str>;
    fn get_u64(&self, key: &str) -> Option<u64>;
    fn get_bool(&self, key: &str) -> Option<bool>;
}

impl DynamicExt for Dynamic {
    fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_str())
    }

    fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.as_integer()).and_then(|v| {
            if v >= 0 {
                Some(v as u64)
            } else {
                None
            }
        })
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }
}

#[cfg(test)]
#[path = "dynamic_tests.rs"]
mod tests;
