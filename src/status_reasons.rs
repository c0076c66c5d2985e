// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status phases and reasons reported on `Driver` resources.
//!
//! Reasons are programmatic identifiers in CamelCase that explain why a `Driver` is in
//! its current phase.
//!
//! # Example Status
//!
//! ```yaml
//! status:
//!   phase: Failed
//!   reason: NameConflict
//!   message: "CSIDriver 'rbd.csi.ceph.com' is already owned by other-ns/rbd.csi.ceph.com"
//! ```

// ============================================================================
// Phases
// ============================================================================

/// Every child object was reconciled.
pub const PHASE_READY: &str = "Ready";

/// The last reconcile failed. See `reason` and `message`.
pub const PHASE_FAILED: &str = "Failed";

// ============================================================================
// Reasons
// ============================================================================

/// All child objects match the resolved spec.
pub const REASON_RECONCILE_SUCCEEDED: &str = "ReconcileSucceeded";

/// The resource name does not match `<prefix>.(rbd|cephfs|nfs).csi.ceph.com`.
pub const REASON_INVALID_DRIVER_NAME: &str = "InvalidDriverName";

/// The `CSIDriver` object is owned by another `Driver` or by nobody we know.
pub const REASON_NAME_CONFLICT: &str = "NameConflict";

/// The resolved spec cannot be rendered (e.g. log rotation without a size limit).
pub const REASON_INVALID_CONFIG: &str = "InvalidConfig";

/// An API call or child reconcile failed.
pub const REASON_RECONCILE_FAILED: &str = "ReconcileFailed";
