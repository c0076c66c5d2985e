// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Layered `DriverSpec` resolution.
//!
//! The effective spec of a `Driver` is built from three layers, highest priority first:
//!
//! 1. the `Driver` resource's own spec
//! 2. `OperatorConfig.spec.driverSpecDefaults`
//! 3. the compiled-in defaults from [`builtin_driver_defaults`]
//!
//! Merging is "first set wins" per field: a field present in a higher layer is never
//! overwritten. `leaderElection`, the plugin blocks (`nodePlugin`, `controllerPlugin`)
//! and their `resources` are merged field by field; every other block is taken as a
//! whole.
//!
//! Container images follow the same layering through [`resolve_images`], with image-set
//! `ConfigMap` data as the higher layers.

use crate::constants::{
    DEFAULT_CONTROLLER_REPLICAS, DEFAULT_GRPC_TIMEOUT_SECS, DEFAULT_IMAGE_PULL_POLICY,
    DEFAULT_KUBELET_DIR_PATH, DEFAULT_LEASE_DURATION_SECS, DEFAULT_RENEW_DEADLINE_SECS,
    DEFAULT_RETRY_PERIOD_SECS, IMAGE_ADDONS, IMAGE_ATTACHER, IMAGE_PLUGIN, IMAGE_PROVISIONER,
    IMAGE_REGISTRAR, IMAGE_RESIZER, IMAGE_SNAPSHOTTER,
};
use crate::crd::{
    ControllerPluginResourcesSpec, ControllerPluginSpec, DriverSpec, FsGroupPolicy,
    LeaderElectionSpec, NodePluginResourcesSpec, NodePluginSpec, PodCommonSpec, SnapshotPolicy,
};
use k8s_openapi::api::apps::v1::{
    DaemonSetUpdateStrategy, DeploymentStrategy, RollingUpdateDaemonSet, RollingUpdateDeployment,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

/// Copy each listed field from `$src` into `$dest` when it is unset in `$dest`.
macro_rules! fill_unset {
    ($dest:expr, $src:expr, $($field:ident),+ $(,)?) => {{
        $(
            if $dest.$field.is_none() {
                $dest.$field.clone_from(&$src.$field);
            }
        )+
    }};
}

/// Fill every unset field of `dest` from `src`.
///
/// `src` is only read; anything taken from it is cloned, so `dest` never shares
/// data with the lower layer.
pub fn merge_driver_specs(dest: &mut DriverSpec, src: &DriverSpec) {
    fill_unset!(
        dest,
        src,
        log,
        image_set,
        cluster_name,
        enable_metadata,
        grpc_timeout,
        snapshot_policy,
        generate_omap_info,
        fs_group_policy,
        encryption,
        attach_required,
        liveness,
        deploy_csi_addons,
        ceph_fs_client_type,
        kernel_mount_options,
        fuse_mount_options,
    );

    if let Some(src_election) = &src.leader_election {
        match dest.leader_election.as_mut() {
            Some(dest_election) => fill_unset!(
                dest_election,
                src_election,
                lease_duration,
                renew_deadline,
                retry_period,
            ),
            None => dest.leader_election = Some(src_election.clone()),
        }
    }

    if let Some(src_plugin) = &src.node_plugin {
        match dest.node_plugin.as_mut() {
            Some(dest_plugin) => merge_node_plugin(dest_plugin, src_plugin),
            None => dest.node_plugin = Some(src_plugin.clone()),
        }
    }

    if let Some(src_plugin) = &src.controller_plugin {
        match dest.controller_plugin.as_mut() {
            Some(dest_plugin) => merge_controller_plugin(dest_plugin, src_plugin),
            None => dest.controller_plugin = Some(src_plugin.clone()),
        }
    }
}

fn merge_pod_common(dest: &mut PodCommonSpec, src: &PodCommonSpec) {
    fill_unset!(
        dest,
        src,
        service_account_name,
        priority_class_name,
        labels,
        annotations,
        affinity,
        tolerations,
        volumes,
        image_pull_policy,
    );
}

fn merge_node_plugin(dest: &mut NodePluginSpec, src: &NodePluginSpec) {
    merge_pod_common(&mut dest.pod_common, &src.pod_common);
    fill_unset!(
        dest,
        src,
        update_strategy,
        kubelet_dir_path,
        enable_se_linux_host_mount,
        topology,
    );

    if let Some(src_resources) = &src.resources {
        match dest.resources.as_mut() {
            Some(dest_resources) => merge_node_resources(dest_resources, src_resources),
            None => dest.resources = Some(src_resources.clone()),
        }
    }
}

fn merge_node_resources(dest: &mut NodePluginResourcesSpec, src: &NodePluginResourcesSpec) {
    fill_unset!(dest, src, registrar, liveness, addons, log_rotator, plugin);
}

fn merge_controller_plugin(dest: &mut ControllerPluginSpec, src: &ControllerPluginSpec) {
    merge_pod_common(&mut dest.pod_common, &src.pod_common);
    fill_unset!(
        dest,
        src,
        host_network,
        deployment_strategy,
        replicas,
        privileged,
    );

    if let Some(src_resources) = &src.resources {
        match dest.resources.as_mut() {
            Some(dest_resources) => merge_controller_resources(dest_resources, src_resources),
            None => dest.resources = Some(src_resources.clone()),
        }
    }
}

fn merge_controller_resources(
    dest: &mut ControllerPluginResourcesSpec,
    src: &ControllerPluginResourcesSpec,
) {
    fill_unset!(
        dest,
        src,
        attacher,
        snapshotter,
        resizer,
        provisioner,
        omap_generator,
        liveness,
        addons,
        log_rotator,
        plugin,
    );
}

/// Compiled-in defaults, the lowest configuration layer.
#[must_use]
pub fn builtin_driver_defaults() -> DriverSpec {
    DriverSpec {
        grpc_timeout: Some(DEFAULT_GRPC_TIMEOUT_SECS),
        snapshot_policy: Some(SnapshotPolicy::VolumeSnapshot),
        fs_group_policy: Some(FsGroupPolicy::File),
        attach_required: Some(true),
        leader_election: Some(LeaderElectionSpec {
            lease_duration: Some(DEFAULT_LEASE_DURATION_SECS),
            renew_deadline: Some(DEFAULT_RENEW_DEADLINE_SECS),
            retry_period: Some(DEFAULT_RETRY_PERIOD_SECS),
        }),
        node_plugin: Some(NodePluginSpec {
            pod_common: PodCommonSpec {
                image_pull_policy: Some(DEFAULT_IMAGE_PULL_POLICY.to_string()),
                ..Default::default()
            },
            update_strategy: Some(DaemonSetUpdateStrategy {
                type_: Some("RollingUpdate".to_string()),
                rolling_update: Some(RollingUpdateDaemonSet {
                    max_unavailable: Some(IntOrString::Int(1)),
                    ..Default::default()
                }),
            }),
            kubelet_dir_path: Some(DEFAULT_KUBELET_DIR_PATH.to_string()),
            ..Default::default()
        }),
        controller_plugin: Some(ControllerPluginSpec {
            pod_common: PodCommonSpec {
                image_pull_policy: Some(DEFAULT_IMAGE_PULL_POLICY.to_string()),
                ..Default::default()
            },
            deployment_strategy: Some(DeploymentStrategy {
                type_: Some("RollingUpdate".to_string()),
                rolling_update: Some(RollingUpdateDeployment {
                    max_surge: Some(IntOrString::String("25%".to_string())),
                    max_unavailable: Some(IntOrString::String("25%".to_string())),
                }),
            }),
            replicas: Some(DEFAULT_CONTROLLER_REPLICAS),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Resolve the effective spec of a driver.
///
/// `driver` is cloned; neither input is modified.
#[must_use]
pub fn resolve_driver_spec(driver: &DriverSpec, operator_defaults: Option<&DriverSpec>) -> DriverSpec {
    let mut resolved = driver.clone();
    if let Some(defaults) = operator_defaults {
        merge_driver_specs(&mut resolved, defaults);
    }
    merge_driver_specs(&mut resolved, &builtin_driver_defaults());
    resolved
}

/// Compiled-in image map keyed by image role.
#[must_use]
pub fn default_images() -> BTreeMap<String, String> {
    [
        (IMAGE_PROVISIONER, "registry.k8s.io/sig-storage/csi-provisioner:v5.3.0"),
        (IMAGE_ATTACHER, "registry.k8s.io/sig-storage/csi-attacher:v4.9.0"),
        (IMAGE_RESIZER, "registry.k8s.io/sig-storage/csi-resizer:v1.13.2"),
        (IMAGE_SNAPSHOTTER, "registry.k8s.io/sig-storage/csi-snapshotter:v8.2.0"),
        (IMAGE_REGISTRAR, "registry.k8s.io/sig-storage/csi-node-driver-registrar:v2.14.0"),
        (IMAGE_PLUGIN, "quay.io/cephcsi/cephcsi:v3.15.0"),
        (IMAGE_ADDONS, "quay.io/csiaddons/k8s-sidecar:v0.13.0"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Overlay image-set `ConfigMap` data on the compiled-in images.
///
/// The operator image set is applied first and the driver's own image set last, so a
/// key present in both takes the driver's value.
#[must_use]
pub fn resolve_images(
    operator_set: Option<&BTreeMap<String, String>>,
    driver_set: Option<&BTreeMap<String, String>>,
) -> BTreeMap<String, String> {
    let mut images = default_images();
    for layer in [operator_set, driver_set].into_iter().flatten() {
        images.extend(layer.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    images
}

#[cfg(test)]
#[path = "merge_tests.rs"]
mod merge_tests;
