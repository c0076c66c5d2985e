// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions (CRDs) for Ceph CSI management.
//!
//! All resources live in the `csi.ceph.io/v1` API group and are namespaced.
//!
//! # Resource Types
//!
//! ## Drivers
//!
//! - [`Driver`] - One Ceph CSI driver deployment (rbd, cephfs or nfs), selected by name
//! - [`OperatorConfig`] - Operator-wide defaults applied underneath every `Driver`
//!
//! ## Cluster configuration
//!
//! - [`CephConnection`] - Monitor addresses and read-affinity settings of a Ceph cluster
//! - [`ClientProfile`] - Binds a `CephConnection` to per-protocol client settings
//! - [`ClientProfileMapping`] - Local/remote profile and pool-ID translations for mirroring
//!
//! # Presence tracking
//!
//! Every optional `DriverSpec` field is an `Option`. A field that is `None` has not been
//! set by the user and is filled from the next configuration layer (see
//! [`crate::merge`]); an explicit zero or `false` is a real value and is kept.
//!
//! # Example: a default RBD driver
//!
//! ```yaml
//! apiVersion: csi.ceph.io/v1
//! kind: Driver
//! metadata:
//!   name: rook-ceph.rbd.csi.ceph.com
//!   namespace: rook-ceph
//! spec:
//!   attachRequired: true
//!   log:
//!     verbosity: 2
//! ```

use k8s_openapi::api::apps::v1::{DaemonSetUpdateStrategy, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    Affinity, LocalObjectReference, ResourceRequirements, SecretReference, Toleration, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Driver
// ============================================================================

/// Log rotation frequency understood by logrotate.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Periodicity {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl Periodicity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Periodicity::Hourly => "hourly",
            Periodicity::Daily => "daily",
            Periodicity::Weekly => "weekly",
            Periodicity::Monthly => "monthly",
        }
    }
}

/// Log rotation settings for the driver containers.
///
/// The presence of this block enables the `log-rotator` sidecar and file logging in
/// every driver container.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogRotationSpec {
    /// Number of rotated log files to keep. Defaults to 7.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_files: Option<i32>,

    /// Rotate once a log file grows past this size (e.g. `100Mi`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_log_size: Option<Quantity>,

    /// Rotate on a fixed schedule. Requires `maxLogSize`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub periodicity: Option<Periodicity>,

    /// Host directory holding the log files. Defaults to `/var/lib/cephcsi`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_host_path: Option<String>,
}

/// Logging configuration for driver pods.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogSpec {
    /// Log verbosity from 0 (default) to 5 (trace).
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 0, max = 5))]
    pub verbosity: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<LogRotationSpec>,
}

/// Snapshot support deployed with the controller plugin.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SnapshotPolicy {
    /// No snapshotter sidecar.
    None,
    Autodetect,
    VolumeSnapshot,
    VolumeGroupSnapshot,
}

/// Mount client used by the cephfs plugin.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CephFsClientType {
    Kernel,
    Fuse,
}

/// Volume ownership policy published on the `CSIDriver` object.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum FsGroupPolicy {
    None,
    File,
    ReadWriteOnceWithFSType,
}

impl FsGroupPolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FsGroupPolicy::None => "None",
            FsGroupPolicy::File => "File",
            FsGroupPolicy::ReadWriteOnceWithFSType => "ReadWriteOnceWithFSType",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionSpec {
    /// `ConfigMap` holding the KMS configuration (`config.json`).
    pub config_map_name: LocalObjectReference,
}

/// An extra volume together with the mount added to the driver containers.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct VolumeSpec {
    pub volume: Volume,
    pub mount: VolumeMount,
}

/// Pod settings shared by the node and controller plugins.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodCommonSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,

    /// Extra pod labels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,

    /// Extra pod annotations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<Toleration>>,

    /// Volumes added to the pod and mounted into the plugin container.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<VolumeSpec>>,

    /// Pull policy applied to every container of the pod.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodePluginResourcesSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registrar: Option<ResourceRequirements>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liveness: Option<ResourceRequirements>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addons: Option<ResourceRequirements>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_rotator: Option<ResourceRequirements>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<ResourceRequirements>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TopologySpec {
    /// Node labels whose values describe the node's failure domain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_labels: Option<Vec<String>>,
}

/// Node plugin (DaemonSet) configuration.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodePluginSpec {
    #[serde(flatten)]
    pub pod_common: PodCommonSpec,

    /// Defaults to `RollingUpdate` with `maxUnavailable: 1`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_strategy: Option<DaemonSetUpdateStrategy>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<NodePluginResourcesSpec>,

    /// Kubelet root directory. Defaults to `/var/lib/kubelet`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubelet_dir_path: Option<String>,

    /// Mount the host `/etc/selinux` into the plugin and enable `seLinuxMount`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_se_linux_host_mount: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub topology: Option<TopologySpec>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControllerPluginResourcesSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attacher: Option<ResourceRequirements>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshotter: Option<ResourceRequirements>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resizer: Option<ResourceRequirements>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioner: Option<ResourceRequirements>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub omap_generator: Option<ResourceRequirements>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liveness: Option<ResourceRequirements>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addons: Option<ResourceRequirements>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_rotator: Option<ResourceRequirements>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<ResourceRequirements>,
}

/// Controller plugin (Deployment) configuration.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControllerPluginSpec {
    #[serde(flatten)]
    pub pod_common: PodCommonSpec,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_network: Option<bool>,

    /// Defaults to `RollingUpdate` with 25% surge and unavailability.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_strategy: Option<DeploymentStrategy>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 0))]
    pub replicas: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ControllerPluginResourcesSpec>,

    /// Run the log rotator privileged (required on some SELinux hosts).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub privileged: Option<bool>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LivenessSpec {
    /// Port the liveness sidecar serves metrics on.
    #[schemars(range(min = 1024, max = 65535))]
    pub metrics_port: i32,
}

/// Leader election timings for the controller sidecars, in seconds.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderElectionSpec {
    /// Defaults to 137.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease_duration: Option<i32>,
    /// Defaults to 107.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renew_deadline: Option<i32>,
    /// Defaults to 26.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_period: Option<i32>,
}

/// `Driver` deploys one Ceph CSI driver.
///
/// The resource name selects the driver variant and must match
/// `^(?:.+\.)?(rbd|cephfs|nfs)\.csi\.ceph\.com$`. The controller creates a
/// `<name>-ctrlplugin` Deployment, a `<name>-nodeplugin` DaemonSet and a cluster-scoped
/// `CSIDriver` named after the resource.
///
/// # Example
///
/// ```yaml
/// apiVersion: csi.ceph.io/v1
/// kind: Driver
/// metadata:
///   name: cephfs.csi.ceph.com
///   namespace: ceph-csi
/// spec:
///   cephFsClientType: kernel
///   kernelMountOptions:
///     ms_mode: secure
///   liveness:
///     metricsPort: 8081
/// ```
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[kube(
    group = "csi.ceph.io",
    version = "v1",
    kind = "Driver",
    namespaced,
    doc = "Driver deploys and configures one Ceph CSI driver (rbd, cephfs or nfs). The variant is derived from the resource name."
)]
#[kube(status = "DriverStatus")]
#[serde(rename_all = "camelCase")]
pub struct DriverSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<LogSpec>,

    /// `ConfigMap` overriding container images, keyed by image role.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_set: Option<LocalObjectReference>,

    /// Identifier recorded as metadata on subvolumes and images.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_metadata: Option<bool>,

    /// gRPC timeout in seconds. Defaults to 150.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 0))]
    pub grpc_timeout: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_policy: Option<SnapshotPolicy>,

    /// Deploy the omap generator sidecar (rbd only).
    #[serde(rename = "generateOMapInfo", skip_serializing_if = "Option::is_none")]
    pub generate_omap_info: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fs_group_policy: Option<FsGroupPolicy>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption: Option<EncryptionSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_plugin: Option<NodePluginSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller_plugin: Option<ControllerPluginSpec>,

    /// Whether volumes need a `VolumeAttachment`. Defaults to true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attach_required: Option<bool>,

    /// Deploys the liveness sidecar and metrics Service when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liveness: Option<LivenessSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub leader_election: Option<LeaderElectionSpec>,

    /// Deploy the csi-addons sidecar.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deploy_csi_addons: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ceph_fs_client_type: Option<CephFsClientType>,

    /// Kernel mount options passed to the cephfs node plugin.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kernel_mount_options: Option<BTreeMap<String, String>>,

    /// FUSE mount options passed to the cephfs node plugin.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuse_mount_options: Option<BTreeMap<String, String>>,
}

/// Coarse `Driver` status.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct DriverStatus {
    /// `Ready` or `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ============================================================================
// OperatorConfig
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct OperatorLogSpec {
    /// Operator log verbosity from 0 to 5.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 0, max = 5))]
    pub verbosity: Option<i32>,
}

/// `OperatorConfig` holds defaults merged underneath every `Driver`.
///
/// Only the instance named by `OPERATOR_CONFIG_NAME` in the operator namespace is
/// consulted. Changing it re-reconciles every `Driver`.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[kube(
    group = "csi.ceph.io",
    version = "v1",
    kind = "OperatorConfig",
    namespaced,
    doc = "OperatorConfig holds operator-wide settings and the DriverSpec defaults applied to every Driver."
)]
#[serde(rename_all = "camelCase")]
pub struct OperatorConfigSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<OperatorLogSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_spec_defaults: Option<DriverSpec>,
}

// ============================================================================
// CephConnection
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReadAffinitySpec {
    /// CRUSH location labels used for localized reads.
    #[serde(default)]
    pub crush_location_labels: Vec<String>,
}

/// `CephConnection` describes how to reach a Ceph cluster.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[kube(
    group = "csi.ceph.io",
    version = "v1",
    kind = "CephConnection",
    namespaced,
    doc = "CephConnection holds the monitor endpoints and read-affinity settings of a Ceph cluster."
)]
#[serde(rename_all = "camelCase")]
pub struct CephConnectionSpec {
    /// Monitor addresses (`host:port`).
    #[schemars(length(min = 1))]
    pub monitors: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_affinity: Option<ReadAffinitySpec>,

    /// Number of rbd-mirror daemons running against the cluster.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 0))]
    pub rbd_mirror_daemon_count: Option<i32>,
}

// ============================================================================
// ClientProfile
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CephCsiSecretsSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller_publish_secret: Option<SecretReference>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CephFsConfigSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_volume_group: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kernel_mount_options: Option<BTreeMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuse_mount_options: Option<BTreeMap<String, String>>,

    /// Immutable once set.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(extend("x-kubernetes-validations" = [{"rule": "self == oldSelf", "message": "field is immutable"}]))]
    pub rados_namespace: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ceph_csi_secrets: Option<CephCsiSecretsSpec>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RbdConfigSpec {
    /// Immutable once set.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(extend("x-kubernetes-validations" = [{"rule": "self == oldSelf", "message": "field is immutable"}]))]
    pub rados_namespace: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ceph_csi_secrets: Option<CephCsiSecretsSpec>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct NfsConfigSpec {}

/// `ClientProfile` binds a `CephConnection` to per-protocol client settings.
///
/// Each profile contributes one entry, keyed by the profile name, to the
/// `config.json` document of the shared `ceph-csi-config` `ConfigMap`.
///
/// # Example
///
/// ```yaml
/// apiVersion: csi.ceph.io/v1
/// kind: ClientProfile
/// metadata:
///   name: storage
///   namespace: ceph-csi
/// spec:
///   cephConnectionRef:
///     name: ceph-cluster-1
///   cephFs:
///     subVolumeGroup: csi
///   rbd:
///     radosNamespace: tenant-a
/// ```
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[kube(
    group = "csi.ceph.io",
    version = "v1",
    kind = "ClientProfile",
    namespaced,
    doc = "ClientProfile binds a CephConnection to CephFS, RBD and NFS client settings."
)]
#[serde(rename_all = "camelCase")]
pub struct ClientProfileSpec {
    #[schemars(extend("x-kubernetes-validations" = [{"rule": "self.name != \"\"", "message": "'.name' cannot be empty"}]))]
    pub ceph_connection_ref: LocalObjectReference,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ceph_fs: Option<CephFsConfigSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rbd: Option<RbdConfigSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub nfs: Option<NfsConfigSpec>,
}

// ============================================================================
// ClientProfileMapping
// ============================================================================

/// One local/remote profile translation.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MappingsSpec {
    pub local_client_profile: String,
    pub remote_client_profile: String,

    /// Pairs of `[localPoolId, remotePoolId]`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub block_pool_id_mapping: Vec<Vec<String>>,
}

/// `ClientProfileMapping` declares profile and pool-ID translations between clusters.
///
/// All mappings in a namespace are folded together into `cluster-mapping.json`.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[kube(
    group = "csi.ceph.io",
    version = "v1",
    kind = "ClientProfileMapping",
    namespaced,
    doc = "ClientProfileMapping maps local client profiles and block pool IDs to their counterparts on a remote cluster."
)]
#[serde(rename_all = "camelCase")]
pub struct ClientProfileMappingSpec {
    #[serde(default)]
    pub mappings: Vec<MappingsSpec>,
}
