// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the Ceph CSI operator.
//!
//! This module contains the numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// Fully qualified API version (group/version)
pub const API_GROUP_VERSION: &str = "csi.ceph.io/v1";

/// Kind name for `Driver` resource
pub const KIND_DRIVER: &str = "Driver";

/// Kind name for `ClientProfile` resource
pub const KIND_CLIENT_PROFILE: &str = "ClientProfile";

/// Kind name for `ClientProfileMapping` resource
pub const KIND_CLIENT_PROFILE_MAPPING: &str = "ClientProfileMapping";

// ============================================================================
// Ownership and Finalizers
// ============================================================================

/// Annotation on cluster-scoped objects naming the namespaced `Driver` that owns them
pub const OWNER_REF_ANNOTATION: &str = "csi.ceph.io/ownerref";

/// Finalizer retracting a `ClientProfile` entry from the shared config document
pub const CLEANUP_FINALIZER: &str = "csi.ceph.com/cleanup";

// ============================================================================
// Shared ConfigMaps
// ============================================================================

/// Name of the `ConfigMap` shared by every driver and client profile in a namespace
pub const CSI_CONFIG_MAP_NAME: &str = "ceph-csi-config";

/// Key holding the cluster-info list
pub const CSI_CONFIG_KEY: &str = "config.json";

/// Key holding the cluster-mapping list
pub const CLUSTER_MAPPING_KEY: &str = "cluster-mapping.json";

/// Name of the KMS `ConfigMap` volume mounted into encrypted drivers
pub const KMS_CONFIG_VOLUME_NAME: &str = "ceph-csi-kms-config";

/// Key of the KMS configuration inside the encryption `ConfigMap`
pub const KMS_CONFIG_KEY: &str = "config.json";

/// Key of the logrotate configuration in `<driver>-logrotate-config`
pub const LOG_ROTATE_CONFIG_KEY: &str = "csi";

// ============================================================================
// Operator Environment
// ============================================================================

/// Namespace the operator runs in (required)
pub const ENV_OPERATOR_NAMESPACE: &str = "OPERATOR_NAMESPACE";

/// Comma-separated list of additional namespaces to watch
pub const ENV_WATCH_NAMESPACE: &str = "WATCH_NAMESPACE";

/// Name of the `OperatorConfig` singleton
pub const ENV_OPERATOR_CONFIG_NAME: &str = "OPERATOR_CONFIG_NAME";

/// Prefix prepended to the default driver service account names
pub const ENV_SERVICE_ACCOUNT_PREFIX: &str = "CSI_SERVICE_ACCOUNT_PREFIX";

/// Default name of the `OperatorConfig` singleton
pub const DEFAULT_OPERATOR_CONFIG_NAME: &str = "ceph-csi-operator-config";

/// Field manager recorded on writes made by the operator
pub const FIELD_MANAGER: &str = "ceph-csi-operator";

// ============================================================================
// Driver Defaults
// ============================================================================

/// Default gRPC timeout for driver sidecars
pub const DEFAULT_GRPC_TIMEOUT_SECS: i32 = 150;

/// Default kubelet root directory
pub const DEFAULT_KUBELET_DIR_PATH: &str = "/var/lib/kubelet";

/// Default host directory for driver log files
pub const DEFAULT_LOG_HOST_PATH: &str = "/var/lib/cephcsi";

/// Default number of rotated log files kept
pub const DEFAULT_LOG_ROTATE_MAX_FILES: i32 = 7;

/// Default image pull policy for driver containers
pub const DEFAULT_IMAGE_PULL_POLICY: &str = "IfNotPresent";

/// Default sidecar leader election lease duration
pub const DEFAULT_LEASE_DURATION_SECS: i32 = 137;

/// Default sidecar leader election renew deadline
pub const DEFAULT_RENEW_DEADLINE_SECS: i32 = 107;

/// Default sidecar leader election retry period
pub const DEFAULT_RETRY_PERIOD_SECS: i32 = 26;

/// Default controller plugin replicas
pub const DEFAULT_CONTROLLER_REPLICAS: i32 = 2;

/// Highest `--v` verbosity accepted by Ceph CSI
pub const MAX_LOG_VERBOSITY: i32 = 5;

// ============================================================================
// Image Keys
// ============================================================================

/// Image key for the `csi-provisioner` sidecar
pub const IMAGE_PROVISIONER: &str = "provisioner";

/// Image key for the `csi-attacher` sidecar
pub const IMAGE_ATTACHER: &str = "attacher";

/// Image key for the `csi-resizer` sidecar
pub const IMAGE_RESIZER: &str = "resizer";

/// Image key for the `csi-snapshotter` sidecar
pub const IMAGE_SNAPSHOTTER: &str = "snapshotter";

/// Image key for the `csi-node-driver-registrar` sidecar
pub const IMAGE_REGISTRAR: &str = "registrar";

/// Image key for the Ceph CSI plugin (also used by liveness, omap generator and log rotator)
pub const IMAGE_PLUGIN: &str = "plugin";

/// Image key for the csi-addons sidecar
pub const IMAGE_ADDONS: &str = "addons";

// ============================================================================
// Ports
// ============================================================================

/// csi-addons controller port for the rbd controller plugin
pub const RBD_CTRL_PLUGIN_CSI_ADDONS_PORT: i32 = 9070;

/// csi-addons controller port for the cephfs controller plugin
pub const CEPHFS_CTRL_PLUGIN_CSI_ADDONS_PORT: i32 = 9080;

/// csi-addons port for the rbd node plugin (host network)
pub const NODE_PLUGIN_CSI_ADDONS_PORT: i32 = 9071;

/// Port exposed by the liveness metrics Service
pub const LIVENESS_SERVICE_PORT: i32 = 8080;

/// Name of the liveness metrics Service port
pub const LIVENESS_SERVICE_PORT_NAME: &str = "csi-http-metrics";

// ============================================================================
// Controller Error Handling Constants
// ============================================================================

/// Requeue duration for controller errors (30 seconds)
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

/// Requeue duration after a successful reconcile (5 minutes)
pub const SUCCESS_REQUEUE_DURATION_SECS: u64 = 300;

// ============================================================================
// Leader Election Constants
// ============================================================================

/// Default operator leader election lease duration (15 seconds)
pub const OPERATOR_LEASE_DURATION_SECS: u64 = 15;

/// Grace period before an expired lease is taken over (2 seconds)
pub const OPERATOR_LEASE_GRACE_SECS: u64 = 2;

/// Default name of the leader election `Lease`
pub const DEFAULT_LEASE_NAME: &str = "ceph-csi-operator-lock";

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

// ============================================================================
// Metrics and Probe Server Constants
// ============================================================================

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Default bind address for metrics HTTP server
pub const METRICS_SERVER_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default bind address for health probe HTTP server
pub const HEALTH_PROBE_BIND_ADDRESS: &str = "0.0.0.0:8081";
