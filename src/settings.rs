// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Operator settings read once from the process environment.
//!
//! [`OperatorSettings`] is built at startup and shared read-only through the
//! controller [`Context`](crate::context::Context). Parsing goes through a lookup
//! closure so tests never touch the real environment.

use crate::constants::{
    DEFAULT_OPERATOR_CONFIG_NAME, ENV_OPERATOR_CONFIG_NAME, ENV_OPERATOR_NAMESPACE,
    ENV_SERVICE_ACCOUNT_PREFIX, ENV_WATCH_NAMESPACE,
};
use anyhow::{bail, Result};

/// Immutable operator settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorSettings {
    /// Namespace the operator runs in. Holds the `OperatorConfig` singleton.
    pub operator_namespace: String,

    /// Name of the `OperatorConfig` singleton.
    pub operator_config_name: String,

    /// Namespaces watched by the controllers, operator namespace first, no duplicates.
    pub watch_namespaces: Vec<String>,

    /// Prefix for the default driver service account names.
    pub service_account_prefix: String,
}

impl OperatorSettings {
    /// Read settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `OPERATOR_NAMESPACE` is missing or empty, or if
    /// `OPERATOR_CONFIG_NAME` is set to an empty value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same conditions as [`OperatorSettings::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let operator_namespace = lookup(ENV_OPERATOR_NAMESPACE).unwrap_or_default();
        if operator_namespace.trim().is_empty() {
            bail!("required environment variable {ENV_OPERATOR_NAMESPACE} is not set");
        }
        let operator_namespace = operator_namespace.trim().to_string();

        let operator_config_name = match lookup(ENV_OPERATOR_CONFIG_NAME) {
            None => DEFAULT_OPERATOR_CONFIG_NAME.to_string(),
            Some(name) if name.trim().is_empty() => {
                bail!("{ENV_OPERATOR_CONFIG_NAME} is set but empty")
            }
            Some(name) => name.trim().to_string(),
        };

        let mut watch_namespaces = vec![operator_namespace.clone()];
        if let Some(extra) = lookup(ENV_WATCH_NAMESPACE) {
            for ns in extra.split(',').map(str::trim).filter(|ns| !ns.is_empty()) {
                if !watch_namespaces.iter().any(|known| known == ns) {
                    watch_namespaces.push(ns.to_string());
                }
            }
        }

        let service_account_prefix = lookup(ENV_SERVICE_ACCOUNT_PREFIX).unwrap_or_default();

        Ok(Self {
            operator_namespace,
            operator_config_name,
            watch_namespaces,
            service_account_prefix,
        })
    }
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod settings_tests;
