// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The node configuration document.
//!
//! One TOML file describes the whole node: filesystem paths, network
//! binding, logging, plugin-style service and storage sections with
//! dynamic args, app definitions, profiles, and routing groups.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;

use drover_core::{AppName, Dynamic, Manifest, Profile};

/// Errors from loading or validating the document.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("app '{0}': {1}")]
    App(String, String),
    #[error("profile '{0}': {1}")]
    Profile(String, String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Runtime state directory: pid file, app sockets.
    pub runtime: PathBuf,
    /// Plugin directory. Unused by the core itself.
    #[serde(default)]
    pub plugins: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PortsConfig {
    /// Service name → fixed port.
    #[serde(default)]
    pub pinned: IndexMap<String, u16>,
    /// Inclusive range services draw from when not pinned.
    #[serde(default)]
    pub shared: Option<(u16, u16)>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Address every service binds on.
    #[serde(default = "NetworkConfig::default_endpoint")]
    pub endpoint: IpAddr,
    #[serde(default)]
    pub hostname: Option<String>,
    /// Acceptor pool hint. Kept for document compatibility.
    #[serde(default = "NetworkConfig::default_pool")]
    pub pool: usize,
    #[serde(default)]
    pub ports: PortsConfig,
}

impl NetworkConfig {
    fn default_endpoint() -> IpAddr {
        IpAddr::from([127, 0, 0, 1])
    }

    fn default_pool() -> usize {
        2
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            endpoint: Self::default_endpoint(),
            hostname: None,
            pool: Self::default_pool(),
            ports: PortsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// A plugin-style section: a type tag plus free-form args.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "PluginConfig::default_args")]
    pub args: Dynamic,
}

impl PluginConfig {
    fn default_args() -> Dynamic {
        Dynamic::Table(toml::map::Map::new())
    }
}

/// One app definition: what to run and with which profile.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub executable: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<(String, String)>,
    /// Named profile; apps without one run the default profile.
    #[serde(default)]
    pub profile: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub paths: PathsConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub services: IndexMap<String, PluginConfig>,
    #[serde(default)]
    pub storages: IndexMap<String, PluginConfig>,
    #[serde(default)]
    pub profiles: IndexMap<String, Profile>,
    #[serde(default)]
    pub apps: IndexMap<String, AppConfig>,
    #[serde(default)]
    pub routing: IndexMap<String, BTreeMap<String, u32>>,
}

impl Config {
    /// Load and validate a document.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, profile) in &self.profiles {
            profile
                .validate()
                .map_err(|err| ConfigError::Profile(name.clone(), err.to_string()))?;
        }
        for (name, app) in &self.apps {
            if app.executable.as_os_str().is_empty() {
                return Err(ConfigError::App(name.clone(), "empty executable".into()));
            }
            if let Some(profile) = &app.profile {
                if !self.profiles.contains_key(profile) {
                    return Err(ConfigError::App(
                        name.clone(),
                        format!("references unknown profile '{}'", profile),
                    ));
                }
            }
        }
        Ok(())
    }

    /// The pid file guarding this runtime directory.
    pub fn pid_path(&self) -> PathBuf {
        self.paths.runtime.join("droverd.pid")
    }

    /// Directory of per-app worker sockets.
    pub fn apps_path(&self) -> PathBuf {
        self.paths.runtime.join("apps")
    }

    /// The daemon log file.
    pub fn log_path(&self) -> PathBuf {
        self.paths.runtime.join("droverd.log")
    }

    /// Build the manifest for a configured app.
    pub fn manifest_for(&self, name: &str) -> Option<Manifest> {
        let app = self.apps.get(name)?;
        Some(Manifest {
            name: AppName::new(name),
            executable: app.executable.clone(),
            args: app.args.clone(),
            env: app.env.clone(),
            endpoint: self.apps_path().join(name),
        })
    }

    /// Resolve an app's profile: named, or the default.
    pub fn profile_for(&self, name: &str) -> Profile {
        self.apps
            .get(name)
            .and_then(|app| app.profile.as_ref())
            .and_then(|profile| self.profiles.get(profile))
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
