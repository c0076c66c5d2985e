// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label and annotation constants used across all reconcilers.
//!
//! This module defines standard Kubernetes labels and the operator's own labels to
//! ensure consistency across all resources created by the controller.

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the component name within the architecture (e.g., "ctrlplugin")
pub const K8S_COMPONENT: &str = "app.kubernetes.io/component";

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Standard label for the name of the application
pub const K8S_NAME: &str = "app.kubernetes.io/name";

/// Standard label for a unique name identifying the instance of an application
pub const K8S_INSTANCE: &str = "app.kubernetes.io/instance";

/// Standard label for the name of a higher-level application this one is part of
pub const K8S_PART_OF: &str = "app.kubernetes.io/part-of";

// ============================================================================
// Kubernetes Standard Label Values
// ============================================================================

/// Value for `app.kubernetes.io/part-of`
pub const PART_OF_CEPH_CSI: &str = "ceph-csi";

/// Value for `app.kubernetes.io/managed-by`
pub const MANAGED_BY_OPERATOR: &str = "ceph-csi-operator";

/// Value for `app.kubernetes.io/name`
pub const APP_NAME_CEPH_CSI: &str = "ceph-csi";

/// Component value for the controller plugin Deployment
pub const COMPONENT_CTRL_PLUGIN: &str = "ctrlplugin";

/// Component value for the node plugin `DaemonSet`
pub const COMPONENT_NODE_PLUGIN: &str = "nodeplugin";

/// Component value for the liveness Service
pub const COMPONENT_LIVENESS: &str = "liveness";

/// Component value for the log rotation `ConfigMap`
pub const COMPONENT_LOG_ROTATE: &str = "logrotate";

/// Component value for the cluster-scoped `CSIDriver`
pub const COMPONENT_CSI_DRIVER: &str = "csidriver";

// ============================================================================
// Pod Selector Labels
// ============================================================================

/// Pod selector label carrying the workload name
pub const APP_LABEL: &str = "app";

/// Pod label used by the liveness Service selector
pub const CONTAINS_LABEL: &str = "contains";
