// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Operator error types.
//!
//! Reconcilers return `anyhow::Result`. Failures that callers need to classify (for
//! `Driver` status reasons and error metrics) are raised as [`OperatorError`] and
//! recovered with `downcast_ref`. Helpers at the bottom of the module recognise the
//! API server responses the reconcilers branch on.

use crate::status_reasons::{
    REASON_INVALID_CONFIG, REASON_INVALID_DRIVER_NAME, REASON_NAME_CONFLICT,
    REASON_RECONCILE_FAILED,
};
use thiserror::Error;

/// Validation and data errors raised by the operator itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperatorError {
    /// The `Driver` name does not identify a known driver variant.
    #[error("invalid driver name '{name}': expected <prefix>.(rbd|cephfs|nfs).csi.ceph.com")]
    InvalidDriverName { name: String },

    /// A `CSIDriver` with the same name exists and belongs to someone else.
    #[error("CSIDriver '{name}' is already owned by {owner}")]
    NameConflict { name: String, owner: String },

    /// The log rotation block cannot be turned into a logrotate configuration.
    #[error("invalid log rotation settings: {reason}")]
    InvalidLogRotation { reason: String },

    /// A `ClientProfile` without a `CephConnection` name.
    #[error("ClientProfile '{profile}' has an empty cephConnectionRef.name")]
    MissingCephConnectionRef { profile: String },

    /// Existing JSON in the shared `ConfigMap` could not be parsed.
    #[error("malformed {key} in ConfigMap {config_map}: {reason}")]
    MalformedClusterConfig {
        config_map: String,
        key: String,
        reason: String,
    },

    /// A required image role has no image after resolution.
    #[error("no image configured for '{role}'")]
    MissingImage { role: String },

    /// One or more child reconciles failed.
    #[error("{}", .0.join("; "))]
    Multiple(Vec<String>),
}

impl OperatorError {
    /// Reason recorded on the `Driver` status for this error.
    #[must_use]
    pub fn status_reason(&self) -> &'static str {
        match self {
            Self::InvalidDriverName { .. } => REASON_INVALID_DRIVER_NAME,
            Self::NameConflict { .. } => REASON_NAME_CONFLICT,
            Self::InvalidLogRotation { .. }
            | Self::MissingCephConnectionRef { .. }
            | Self::MissingImage { .. } => REASON_INVALID_CONFIG,
            Self::MalformedClusterConfig { .. } | Self::Multiple(_) => REASON_RECONCILE_FAILED,
        }
    }

    /// Label used for the `error_type` metric dimension.
    #[must_use]
    pub fn metric_label(&self) -> &'static str {
        match self {
            Self::MalformedClusterConfig { .. } => "serialization_error",
            Self::Multiple(_) => "child_reconcile_error",
            _ => "validation_error",
        }
    }
}

/// Status reason for an arbitrary reconcile error.
#[must_use]
pub fn status_reason_for(err: &anyhow::Error) -> &'static str {
    err.downcast_ref::<OperatorError>()
        .map_or(REASON_RECONCILE_FAILED, OperatorError::status_reason)
}

/// Metric label for an arbitrary reconcile error.
#[must_use]
pub fn metric_label_for(err: &anyhow::Error) -> &'static str {
    if let Some(op) = err.downcast_ref::<OperatorError>() {
        return op.metric_label();
    }
    if err.downcast_ref::<kube::Error>().is_some() {
        return "api_error";
    }
    "unknown_error"
}

/// Join the errors of concurrently reconciled children into one error.
///
/// Returns `Ok(())` when every child succeeded.
///
/// # Errors
///
/// Returns the only error unchanged, or an [`OperatorError::Multiple`] listing all of them.
pub fn join_errors(results: Vec<anyhow::Result<()>>) -> anyhow::Result<()> {
    let mut errors: Vec<anyhow::Error> = results.into_iter().filter_map(Result::err).collect();
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(OperatorError::Multiple(errors.iter().map(|e| format!("{e:#}")).collect()).into()),
    }
}

// ============================================================================
// API server error classification
// ============================================================================

fn api_code(err: &kube::Error) -> Option<u16> {
    match err {
        kube::Error::Api(ae) => Some(ae.code),
        _ => None,
    }
}

/// HTTP 404 from the API server.
#[must_use]
pub fn is_not_found(err: &kube::Error) -> bool {
    api_code(err) == Some(404)
}

/// HTTP 422, returned when an update touches an immutable field.
#[must_use]
pub fn is_invalid(err: &kube::Error) -> bool {
    api_code(err) == Some(422)
}

/// Like [`is_invalid`] for an error that went through `anyhow`.
#[must_use]
pub fn is_invalid_anyhow(err: &anyhow::Error) -> bool {
    err.downcast_ref::<kube::Error>().is_some_and(is_invalid)
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
