// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! App manifest.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::AppName;

/// Errors from manifest validation.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("app name must not be empty")]
    EmptyName,
    #[error("executable path must not be empty")]
    EmptyExecutable,
}

/// Immutable description of how to run an app's workers.
///
/// The `endpoint` is the local-domain socket path workers connect back on;
/// it is derived from the runtime directory when the app is started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: AppName,
    /// Worker executable.
    pub executable: PathBuf,
    /// Extra arguments passed to every spawned worker.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment passed to every spawned worker.
    #[serde(default)]
    pub env: Vec<(String, String)>,
    /// Local socket path for worker uplinks.
    pub endpoint: PathBuf,
}

impl Manifest {
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.name.as_str().is_empty() {
            return Err(ManifestError::EmptyName);
        }
        if self.executable.as_os_str().is_empty() {
            return Err(ManifestError::EmptyExecutable);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
