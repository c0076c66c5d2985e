// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Volumes, mounts, environment variables and arguments shared by the Ceph CSI
//! containers.
//!
//! Everything here is a small pure constructor used by
//! [`csi_resources`](crate::csi_resources) to assemble pod templates.

use crate::constants::{CSI_CONFIG_MAP_NAME, KMS_CONFIG_KEY, KMS_CONFIG_VOLUME_NAME, MAX_LOG_VERBOSITY};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, EmptyDirVolumeSource, EnvVar, EnvVarSource, HostPathVolumeSource,
    KeyToPath, LocalObjectReference, ObjectFieldSelector, ProjectedVolumeSource,
    ServiceAccountTokenProjection, Volume, VolumeMount, VolumeProjection,
};
use std::collections::BTreeMap;

// ============================================================================
// Paths and Names
// ============================================================================

/// Directory holding the CSI sockets inside the containers
pub const SOCKET_DIR: &str = "/csi";

/// CSI gRPC endpoint
pub const CSI_ENDPOINT: &str = "unix:///csi/csi.sock";

/// csi-addons gRPC endpoint
pub const CSI_ADDONS_ENDPOINT: &str = "unix:///csi/csi-addons.sock";

pub const SOCKET_DIR_VOLUME: &str = "socket-dir";
pub const HOST_DEV_VOLUME: &str = "host-dev";
pub const HOST_SYS_VOLUME: &str = "host-sys";
pub const HOST_RUN_MOUNT_VOLUME: &str = "host-run-mount";
pub const LIB_MODULES_VOLUME: &str = "lib-modules";
pub const KEYS_TMP_DIR_VOLUME: &str = "keys-tmp-dir";
pub const OIDC_TOKEN_VOLUME: &str = "oidc-token";
pub const CSI_CONFIG_VOLUME: &str = "ceph-csi-config";
pub const ETC_SELINUX_VOLUME: &str = "etc-selinux";
pub const PLUGIN_DIR_VOLUME: &str = "plugin-dir";
pub const PLUGIN_MOUNT_DIR_VOLUME: &str = "plugin-mount-dir";
pub const PODS_MOUNT_DIR_VOLUME: &str = "pods-mount-dir";
pub const REGISTRATION_DIR_VOLUME: &str = "registration-dir";
pub const LOGS_DIR_VOLUME: &str = "logs-dir";
pub const LOG_ROTATE_DIR_VOLUME: &str = "log-rotate-dir";

const HOST_PATH_DIRECTORY: &str = "Directory";
const HOST_PATH_DIRECTORY_OR_CREATE: &str = "DirectoryOrCreate";
const MOUNT_PROPAGATION_BIDIRECTIONAL: &str = "Bidirectional";

/// Name of the log rotation `ConfigMap` for a driver.
#[must_use]
pub fn log_rotate_config_map_name(driver_name: &str) -> String {
    format!("{driver_name}-logrotate-config")
}

// ============================================================================
// Volumes
// ============================================================================

fn host_path_volume(name: &str, path: String, type_: Option<&str>) -> Volume {
    Volume {
        name: name.to_string(),
        host_path: Some(HostPathVolumeSource {
            path,
            type_: type_.map(str::to_string),
        }),
        ..Default::default()
    }
}

fn memory_volume(name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        empty_dir: Some(EmptyDirVolumeSource {
            medium: Some("Memory".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn config_map_volume(name: &str, config_map: &str, items: Option<Vec<KeyToPath>>) -> Volume {
    Volume {
        name: name.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map.to_string(),
            items,
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[must_use]
pub fn socket_dir_volume() -> Volume {
    memory_volume(SOCKET_DIR_VOLUME)
}

#[must_use]
pub fn keys_tmp_dir_volume() -> Volume {
    memory_volume(KEYS_TMP_DIR_VOLUME)
}

#[must_use]
pub fn host_dev_volume() -> Volume {
    host_path_volume(HOST_DEV_VOLUME, "/dev".to_string(), None)
}

#[must_use]
pub fn host_sys_volume() -> Volume {
    host_path_volume(HOST_SYS_VOLUME, "/sys".to_string(), None)
}

#[must_use]
pub fn host_run_mount_volume() -> Volume {
    host_path_volume(HOST_RUN_MOUNT_VOLUME, "/run/mount".to_string(), None)
}

#[must_use]
pub fn lib_modules_volume() -> Volume {
    host_path_volume(LIB_MODULES_VOLUME, "/lib/modules".to_string(), None)
}

#[must_use]
pub fn etc_selinux_volume() -> Volume {
    host_path_volume(ETC_SELINUX_VOLUME, "/etc/selinux".to_string(), None)
}

/// Projected service account token used by KMS integrations.
#[must_use]
pub fn oidc_token_volume() -> Volume {
    Volume {
        name: OIDC_TOKEN_VOLUME.to_string(),
        projected: Some(ProjectedVolumeSource {
            sources: Some(vec![VolumeProjection {
                service_account_token: Some(ServiceAccountTokenProjection {
                    path: "oidc-token".to_string(),
                    expiration_seconds: Some(3600),
                    audience: Some("ceph-csi-kms".to_string()),
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// The shared `ceph-csi-config` `ConfigMap`.
#[must_use]
pub fn csi_config_volume() -> Volume {
    config_map_volume(CSI_CONFIG_VOLUME, CSI_CONFIG_MAP_NAME, None)
}

/// KMS configuration projected from the driver's encryption `ConfigMap`.
#[must_use]
pub fn kms_config_volume(config_ref: &LocalObjectReference) -> Volume {
    config_map_volume(
        KMS_CONFIG_VOLUME_NAME,
        &config_ref.name,
        Some(vec![KeyToPath {
            key: KMS_CONFIG_KEY.to_string(),
            path: KMS_CONFIG_KEY.to_string(),
            ..Default::default()
        }]),
    )
}

#[must_use]
pub fn plugin_dir_volume(kubelet_dir: &str, driver_name: &str) -> Volume {
    host_path_volume(
        PLUGIN_DIR_VOLUME,
        format!("{kubelet_dir}/plugins/{driver_name}"),
        Some(HOST_PATH_DIRECTORY_OR_CREATE),
    )
}

#[must_use]
pub fn plugin_mount_dir_volume(kubelet_dir: &str) -> Volume {
    host_path_volume(
        PLUGIN_MOUNT_DIR_VOLUME,
        format!("{kubelet_dir}/plugins"),
        Some(HOST_PATH_DIRECTORY),
    )
}

#[must_use]
pub fn pods_mount_dir_volume(kubelet_dir: &str) -> Volume {
    host_path_volume(
        PODS_MOUNT_DIR_VOLUME,
        format!("{kubelet_dir}/pods"),
        Some(HOST_PATH_DIRECTORY),
    )
}

#[must_use]
pub fn registration_dir_volume(kubelet_dir: &str) -> Volume {
    host_path_volume(
        REGISTRATION_DIR_VOLUME,
        format!("{kubelet_dir}/plugins_registry"),
        Some(HOST_PATH_DIRECTORY),
    )
}

/// Host directory the driver containers write their log files to.
#[must_use]
pub fn logs_dir_volume(log_host_path: &str, workload_name: &str) -> Volume {
    host_path_volume(
        LOGS_DIR_VOLUME,
        format!("{log_host_path}/{workload_name}"),
        Some(HOST_PATH_DIRECTORY_OR_CREATE),
    )
}

#[must_use]
pub fn log_rotate_dir_volume(driver_name: &str) -> Volume {
    config_map_volume(
        LOG_ROTATE_DIR_VOLUME,
        &log_rotate_config_map_name(driver_name),
        None,
    )
}

// ============================================================================
// Volume Mounts
// ============================================================================

fn mount(name: &str, path: &str, read_only: bool) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        read_only: read_only.then_some(true),
        ..Default::default()
    }
}

fn bidirectional_mount(name: &str, path: String) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path,
        mount_propagation: Some(MOUNT_PROPAGATION_BIDIRECTIONAL.to_string()),
        ..Default::default()
    }
}

#[must_use]
pub fn socket_dir_mount() -> VolumeMount {
    mount(SOCKET_DIR_VOLUME, SOCKET_DIR, false)
}

#[must_use]
pub fn host_dev_mount() -> VolumeMount {
    mount(HOST_DEV_VOLUME, "/dev", false)
}

#[must_use]
pub fn host_sys_mount() -> VolumeMount {
    mount(HOST_SYS_VOLUME, "/sys", false)
}

#[must_use]
pub fn host_run_mount_mount() -> VolumeMount {
    mount(HOST_RUN_MOUNT_VOLUME, "/run/mount", false)
}

#[must_use]
pub fn lib_modules_mount() -> VolumeMount {
    mount(LIB_MODULES_VOLUME, "/lib/modules", true)
}

#[must_use]
pub fn keys_tmp_dir_mount() -> VolumeMount {
    mount(KEYS_TMP_DIR_VOLUME, "/tmp/csi/keys", false)
}

#[must_use]
pub fn oidc_token_mount() -> VolumeMount {
    mount(OIDC_TOKEN_VOLUME, "/run/secrets/tokens", true)
}

#[must_use]
pub fn csi_config_mount() -> VolumeMount {
    mount(CSI_CONFIG_VOLUME, "/etc/ceph-csi-config", false)
}

#[must_use]
pub fn kms_config_mount() -> VolumeMount {
    mount(KMS_CONFIG_VOLUME_NAME, "/etc/ceph-csi-encryption-kms-config/", true)
}

/// The node plugin mounts its host plugin directory as the socket directory.
#[must_use]
pub fn plugin_dir_mount() -> VolumeMount {
    mount(PLUGIN_DIR_VOLUME, SOCKET_DIR, false)
}

#[must_use]
pub fn registration_dir_mount() -> VolumeMount {
    mount(REGISTRATION_DIR_VOLUME, "/registration", false)
}

#[must_use]
pub fn etc_selinux_mount() -> VolumeMount {
    mount(ETC_SELINUX_VOLUME, "/etc/selinux", true)
}

#[must_use]
pub fn logs_dir_mount() -> VolumeMount {
    mount(LOGS_DIR_VOLUME, "/csi-logs", false)
}

#[must_use]
pub fn log_rotate_dir_mount() -> VolumeMount {
    mount(LOG_ROTATE_DIR_VOLUME, "/logrotate-config", false)
}

#[must_use]
pub fn pods_mount_dir_mount(kubelet_dir: &str) -> VolumeMount {
    bidirectional_mount(PODS_MOUNT_DIR_VOLUME, format!("{kubelet_dir}/pods"))
}

#[must_use]
pub fn plugin_mount_dir_mount(kubelet_dir: &str) -> VolumeMount {
    bidirectional_mount(PLUGIN_MOUNT_DIR_VOLUME, format!("{kubelet_dir}/plugins"))
}

// ============================================================================
// Environment Variables
// ============================================================================

fn field_ref_env(name: &str, field_path: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: field_path.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[must_use]
pub fn pod_ip_env() -> EnvVar {
    field_ref_env("POD_IP", "status.podIP")
}

#[must_use]
pub fn pod_name_env() -> EnvVar {
    field_ref_env("POD_NAME", "metadata.name")
}

#[must_use]
pub fn pod_namespace_env() -> EnvVar {
    field_ref_env("POD_NAMESPACE", "metadata.namespace")
}

#[must_use]
pub fn pod_uid_env() -> EnvVar {
    field_ref_env("POD_UID", "metadata.uid")
}

#[must_use]
pub fn node_id_env() -> EnvVar {
    field_ref_env("NODE_ID", "spec.nodeName")
}

#[must_use]
pub fn driver_namespace_env() -> EnvVar {
    field_ref_env("DRIVER_NAMESPACE", "metadata.namespace")
}

// ============================================================================
// Container Arguments
// ============================================================================
//
// Conditional arguments return `Option<String>`; a container's argument list is
// collected with `flatten()` so absent arguments leave no empty strings behind.

pub const ARG_CONTROLLER_SERVER: &str = "--controllerserver=true";
pub const ARG_NODE_SERVER: &str = "--nodeserver=true";
pub const ARG_LEADER_ELECTION: &str = "--leader-election=true";
pub const ARG_PID_LIMIT: &str = "--pidlimit=-1";
pub const ARG_RETRY_INTERVAL_START: &str = "--retry-interval-start=500ms";
pub const ARG_DEFAULT_FS_TYPE: &str = "--default-fstype=ext4";
pub const ARG_HANDLE_VOLUME_INUSE_ERROR: &str = "--handle-volume-inuse-error=false";
pub const ARG_METRICS_PATH: &str = "--metricspath=/metrics";
pub const ARG_POLL_TIME: &str = "--polltime=60s";
pub const ARG_EXTRA_CREATE_METADATA: &str = "--extra-create-metadata=true";
pub const ARG_PREVENT_VOLUME_MODE_CONVERSION: &str = "--prevent-volume-mode-conversion=true";
pub const ARG_HONOR_PV_RECLAIM_POLICY: &str = "--feature-gates=HonorPVReclaimPolicy=true";
pub const ARG_IMMEDIATE_TOPOLOGY: &str = "--immediate-topology=false";
pub const ARG_RECOVER_VOLUME_EXPANSION_FAILURE: &str =
    "--feature-gates=RecoverVolumeExpansionFailure=true";
pub const ARG_ENABLE_VOLUME_GROUP_SNAPSHOTS: &str = "--enable-volume-group-snapshots=true";
pub const ARG_FORCE_CEPH_KERNEL_CLIENT: &str = "--forcecephkernelclient=true";
pub const ARG_LOG_TO_STDERR: &str = "--logtostderr=false";
pub const ARG_ALSO_LOG_TO_STDERR: &str = "--alsologtostderr=true";
pub const ARG_NODE_ID: &str = "--nodeid=$(NODE_ID)";
pub const ARG_CSI_ADDONS_NODE_ID: &str = "--node-id=$(NODE_ID)";
pub const ARG_POD_UID: &str = "--pod-uid=$(POD_UID)";
pub const ARG_POD: &str = "--pod=$(POD_NAME)";
pub const ARG_NAMESPACE: &str = "--namespace=$(POD_NAMESPACE)";
pub const ARG_DRIVER_NAMESPACE: &str = "--drivernamespace=$(DRIVER_NAMESPACE)";

#[must_use]
pub fn csi_address_arg() -> String {
    format!("--csi-address={CSI_ENDPOINT}")
}

#[must_use]
pub fn endpoint_arg() -> String {
    format!("--endpoint={CSI_ENDPOINT}")
}

#[must_use]
pub fn csi_addons_endpoint_arg() -> String {
    format!("--csi-addons-endpoint={CSI_ADDONS_ENDPOINT}")
}

#[must_use]
pub fn csi_addons_address_arg() -> String {
    format!("--csi-addons-address={CSI_ADDONS_ENDPOINT}")
}

/// `--v=N` with `N` clamped to the range Ceph CSI accepts.
#[must_use]
pub fn log_verbosity_arg(level: i32) -> String {
    format!("--v={}", level.clamp(0, MAX_LOG_VERBOSITY))
}

#[must_use]
pub fn log_file_arg(container: &str) -> String {
    format!("--log_file=csi-logs/{container}.log")
}

/// `--type=...` for the plugin roles Ceph CSI knows; anything else yields nothing.
#[must_use]
pub fn type_arg(plugin_type: &str) -> Option<String> {
    matches!(plugin_type, "rbd" | "cephfs" | "nfs" | "controller" | "liveness")
        .then(|| format!("--type={plugin_type}"))
}

#[must_use]
pub fn set_metadata_arg(enabled: bool) -> Option<String> {
    enabled.then(|| "--setmetadata=true".to_string())
}

#[must_use]
pub fn timeout_arg(seconds: i32) -> String {
    format!("--timeout={seconds}s")
}

#[must_use]
pub fn leader_election_namespace_arg(namespace: &str) -> Option<String> {
    (!namespace.is_empty()).then(|| format!("--leader-election-namespace={namespace}"))
}

#[must_use]
pub fn leader_election_lease_duration_arg(seconds: i32) -> String {
    format!("--leader-election-lease-duration={seconds}s")
}

#[must_use]
pub fn leader_election_renew_deadline_arg(seconds: i32) -> String {
    format!("--leader-election-renew-deadline={seconds}s")
}

#[must_use]
pub fn leader_election_retry_period_arg(seconds: i32) -> String {
    format!("--leader-election-retry-period={seconds}s")
}

#[must_use]
pub fn driver_name_arg(name: &str) -> Option<String> {
    (!name.is_empty()).then(|| format!("--drivername={name}"))
}

#[must_use]
pub fn cluster_name_arg(name: &str) -> Option<String> {
    (!name.is_empty()).then(|| format!("--clustername={name}"))
}

#[must_use]
pub fn metrics_port_arg(port: i32) -> String {
    format!("--metricsport={port}")
}

#[must_use]
pub fn controller_port_arg(port: i32) -> String {
    format!("--controller-port={port}")
}

#[must_use]
pub fn kubelet_registration_path_arg(kubelet_dir: &str, driver_name: &str) -> String {
    format!("--kubelet-registration-path={kubelet_dir}/plugins/{driver_name}/csi.sock")
}

#[must_use]
pub fn staging_path_arg(kubelet_dir: &str) -> String {
    format!("--stagingpath={kubelet_dir}/plugins/kubernetes.io/csi/")
}

/// Render a mount option map as `k=v,k2,k3=v3`. Keys with an empty value render bare.
#[must_use]
pub fn mount_options_to_string(options: &BTreeMap<String, String>) -> String {
    options
        .iter()
        .map(|(k, v)| {
            if v.is_empty() {
                k.clone()
            } else {
                format!("{k}={v}")
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[must_use]
pub fn kernel_mount_options_arg(options: Option<&BTreeMap<String, String>>) -> Option<String> {
    options
        .filter(|o| !o.is_empty())
        .map(|o| format!("--kernelmountoptions={}", mount_options_to_string(o)))
}

#[must_use]
pub fn fuse_mount_options_arg(options: Option<&BTreeMap<String, String>>) -> Option<String> {
    options
        .filter(|o| !o.is_empty())
        .map(|o| format!("--fusemountoptions={}", mount_options_to_string(o)))
}

#[must_use]
pub fn domain_labels_arg(labels: Option<&Vec<String>>) -> Option<String> {
    labels
        .filter(|l| !l.is_empty())
        .map(|l| format!("--domainlabels={}", l.join(",")))
}

#[cfg(test)]
#[path = "csi_volumes_tests.rs"]
mod csi_volumes_tests;
