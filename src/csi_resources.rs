// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Desired-state builders for the objects that make up a Ceph CSI driver.
//!
//! Every builder is a pure function of a [`DesiredState`]: the `Driver`, its resolved
//! spec (see [`crate::merge`]), the variant parsed from its name and the resolved image
//! map. Identical inputs always produce identical objects.
//!
//! | object | name |
//! |---|---|
//! | controller plugin `Deployment` | `<driver>-ctrlplugin` |
//! | node plugin `DaemonSet` | `<driver>-nodeplugin` |
//! | liveness `Service` | `<driver>-liveness`, sanitized |
//! | log rotation `ConfigMap` | `<driver>-logrotate-config` |
//! | `CSIDriver` (cluster scoped) | `<driver>` |

use crate::constants::{
    API_GROUP_VERSION, CEPHFS_CTRL_PLUGIN_CSI_ADDONS_PORT, DEFAULT_LEASE_DURATION_SECS,
    DEFAULT_LOG_HOST_PATH, DEFAULT_LOG_ROTATE_MAX_FILES, DEFAULT_RENEW_DEADLINE_SECS,
    DEFAULT_RETRY_PERIOD_SECS, IMAGE_ADDONS, IMAGE_ATTACHER, IMAGE_PLUGIN, IMAGE_PROVISIONER,
    IMAGE_REGISTRAR, IMAGE_RESIZER, IMAGE_SNAPSHOTTER, KIND_DRIVER, LIVENESS_SERVICE_PORT,
    LIVENESS_SERVICE_PORT_NAME, LOG_ROTATE_CONFIG_KEY, NODE_PLUGIN_CSI_ADDONS_PORT,
    OWNER_REF_ANNOTATION, RBD_CTRL_PLUGIN_CSI_ADDONS_PORT,
};
use crate::crd::{
    CephFsClientType, ControllerPluginSpec, Driver, DriverSpec, LogRotationSpec, NodePluginSpec,
    SnapshotPolicy,
};
use crate::csi_volumes::*;
use crate::driver_type::DriverType;
use crate::errors::OperatorError;
use crate::labels::{
    APP_LABEL, APP_NAME_CEPH_CSI, COMPONENT_CSI_DRIVER, COMPONENT_CTRL_PLUGIN,
    COMPONENT_LIVENESS, COMPONENT_LOG_ROTATE, COMPONENT_NODE_PLUGIN, CONTAINS_LABEL, K8S_COMPONENT, K8S_INSTANCE, K8S_MANAGED_BY, K8S_NAME,
    K8S_PART_OF, MANAGED_BY_OPERATOR, PART_OF_CEPH_CSI,
};
use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec, Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Affinity, Capabilities, ConfigMap, Container, ContainerPort, PodAffinityTerm,
    PodAntiAffinity, PodSpec, PodTemplateSpec, ResourceRequirements, SecurityContext, Service,
    ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::api::storage::v1::{CSIDriver, CSIDriverSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::debug;

/// Shell loop run by the `log-rotator` sidecar.
pub const LOG_ROTATE_COMMAND: &str =
    "while true; do logrotate --verbose /logrotate-config/csi; sleep 15m; done";

const HOSTNAME_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";
const LIVENESS_TIMEOUT_SECS: i32 = 3;

static SERVICE_NAME_INVALID_CHARS: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"[^a-z0-9-]").unwrap());

/// Everything the builders need to render one driver.
#[derive(Clone, Copy, Debug)]
pub struct DesiredState<'a> {
    /// The `Driver` resource (name, namespace, uid).
    pub driver: &'a Driver,

    /// The driver spec after layering with operator and built-in defaults.
    pub spec: &'a DriverSpec,

    pub driver_type: DriverType,

    /// Image role to image reference.
    pub images: &'a BTreeMap<String, String>,

    /// Prefix for the default service account names.
    pub service_account_prefix: &'a str,
}

impl DesiredState<'_> {
    fn name(&self) -> String {
        self.driver.name_any()
    }

    fn namespace(&self) -> String {
        self.driver.namespace().unwrap_or_default()
    }

    fn image(&self, role: &str) -> Result<String, OperatorError> {
        self.images
            .get(role)
            .filter(|image| !image.is_empty())
            .cloned()
            .ok_or_else(|| OperatorError::MissingImage {
                role: role.to_string(),
            })
    }

    fn log_verbosity(&self) -> i32 {
        self.spec.log.as_ref().and_then(|l| l.verbosity).unwrap_or(0)
    }

    fn log_rotation(&self) -> Option<&LogRotationSpec> {
        self.spec.log.as_ref().and_then(|l| l.rotation.as_ref())
    }

    fn deploy_csi_addons(&self) -> bool {
        self.spec.deploy_csi_addons.unwrap_or(false)
    }

    fn force_kernel_client(&self) -> bool {
        self.driver_type == DriverType::CephFs
            && self.spec.ceph_fs_client_type == Some(CephFsClientType::Kernel)
    }

    fn plugin_container_name(&self) -> String {
        format!("csi-{}plugin", self.driver_type)
    }

    fn log_host_path(&self) -> String {
        self.log_rotation()
            .and_then(|r| r.log_host_path.clone())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_HOST_PATH.to_string())
    }
}

// ============================================================================
// Names, Labels and Owner References
// ============================================================================

/// `<driver>-ctrlplugin`
#[must_use]
pub fn controller_plugin_name(driver_name: &str) -> String {
    format!("{driver_name}-ctrlplugin")
}

/// `<driver>-nodeplugin`
#[must_use]
pub fn node_plugin_name(driver_name: &str) -> String {
    format!("{driver_name}-nodeplugin")
}

/// Service name for a driver-derived name: every character outside `[a-z0-9-]`
/// becomes `-`.
#[must_use]
pub fn service_name(driver_name: &str, suffix: &str) -> String {
    SERVICE_NAME_INVALID_CHARS
        .replace_all(&format!("{driver_name}-{suffix}"), "-")
        .into_owned()
}

/// Name of the liveness `Service` of a driver.
#[must_use]
pub fn liveness_service_name(driver_name: &str) -> String {
    service_name(driver_name, "liveness")
}

/// Standard labels for an object derived from a `Driver`.
#[must_use]
pub fn build_labels(driver_name: &str, component: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(K8S_NAME.into(), APP_NAME_CEPH_CSI.into());
    labels.insert(K8S_INSTANCE.into(), driver_name.into());
    labels.insert(K8S_COMPONENT.into(), component.into());
    labels.insert(K8S_MANAGED_BY.into(), MANAGED_BY_OPERATOR.into());
    labels.insert(K8S_PART_OF.into(), PART_OF_CEPH_CSI.into());
    labels
}

/// Controller owner reference pointing at the `Driver`, so children are garbage
/// collected with it.
#[must_use]
pub fn build_owner_references(driver: &Driver) -> Vec<OwnerReference> {
    vec![OwnerReference {
        api_version: API_GROUP_VERSION.to_string(),
        kind: KIND_DRIVER.to_string(),
        name: driver.name_any(),
        uid: driver.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }]
}

/// Identity of the `Driver` recorded in the [`OWNER_REF_ANNOTATION`] of cluster-scoped
/// objects.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnerKey {
    #[serde(alias = "Namespace")]
    pub namespace: String,
    #[serde(alias = "Name")]
    pub name: String,
}

impl OwnerKey {
    #[must_use]
    pub fn of(driver: &Driver) -> Self {
        Self {
            namespace: driver.namespace().unwrap_or_default(),
            name: driver.name_any(),
        }
    }

    /// Parse the owner annotation of an object. `None` when absent or unreadable.
    #[must_use]
    pub fn from_annotations(annotations: &BTreeMap<String, String>) -> Option<Self> {
        annotations
            .get(OWNER_REF_ANNOTATION)
            .and_then(|value| serde_json::from_str(value).ok())
    }
}

impl std::fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Controller pod affinity: the user's affinity, plus a required anti-affinity that
/// spreads replicas across hosts unless the user brought their own pod anti-affinity.
#[must_use]
pub fn controller_pod_affinity(user: Option<&Affinity>, selector: &LabelSelector) -> Affinity {
    if let Some(affinity) = user.filter(|a| a.pod_anti_affinity.is_some()) {
        return affinity.clone();
    }

    let mut affinity = user.cloned().unwrap_or_default();
    affinity.pod_anti_affinity = Some(PodAntiAffinity {
        required_during_scheduling_ignored_during_execution: Some(vec![PodAffinityTerm {
            label_selector: Some(selector.clone()),
            topology_key: HOSTNAME_TOPOLOGY_KEY.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    });
    affinity
}

// ============================================================================
// Container Helpers
// ============================================================================

fn collect_args(args: impl IntoIterator<Item = Option<String>>) -> Option<Vec<String>> {
    Some(args.into_iter().flatten().collect())
}

fn arg(value: impl Into<String>) -> Option<String> {
    Some(value.into())
}

/// `--logtostderr=false --alsologtostderr=true --log_file=...` when rotation is on.
fn log_file_args(enabled: bool, container: &str) -> [Option<String>; 3] {
    if enabled {
        [
            arg(ARG_LOG_TO_STDERR),
            arg(ARG_ALSO_LOG_TO_STDERR),
            arg(log_file_arg(container)),
        ]
    } else {
        [None, None, None]
    }
}

fn privileged_drop_all() -> SecurityContext {
    SecurityContext {
        privileged: Some(true),
        capabilities: Some(Capabilities {
            drop: Some(vec!["All".to_string()]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn container(name: &str, image: String, pull_policy: Option<&String>) -> Container {
    Container {
        name: name.to_string(),
        image: Some(image),
        image_pull_policy: pull_policy.cloned(),
        ..Default::default()
    }
}

fn addons_port(port: i32) -> ContainerPort {
    ContainerPort {
        name: Some("csi-addons".to_string()),
        container_port: port,
        ..Default::default()
    }
}

fn log_rotator_container(
    image: String,
    pull_policy: Option<&String>,
    security_context: Option<SecurityContext>,
    resources: Option<ResourceRequirements>,
) -> Container {
    Container {
        command: Some(vec![
            "/bin/bash".to_string(),
            "-c".to_string(),
            LOG_ROTATE_COMMAND.to_string(),
        ]),
        security_context,
        resources,
        volume_mounts: Some(vec![logs_dir_mount(), log_rotate_dir_mount()]),
        ..container("log-rotator", image, pull_policy)
    }
}

fn pod_labels(
    user: Option<&BTreeMap<String, String>>,
    app: &str,
    contains: Option<String>,
) -> BTreeMap<String, String> {
    let mut labels = user.cloned().unwrap_or_default();
    labels.insert(APP_LABEL.to_string(), app.to_string());
    if let Some(contains) = contains {
        labels.insert(CONTAINS_LABEL.to_string(), contains);
    }
    labels
}

fn user_volumes_and_mounts(
    specs: Option<&Vec<crate::crd::VolumeSpec>>,
) -> (Vec<Volume>, Vec<VolumeMount>) {
    specs
        .map(|v| {
            v.iter()
                .map(|spec| (spec.volume.clone(), spec.mount.clone()))
                .unzip()
        })
        .unwrap_or_default()
}

// ============================================================================
// Controller Plugin Deployment
// ============================================================================

/// Build the controller plugin `Deployment`.
///
/// Containers, in order: plugin, `csi-provisioner`, `csi-resizer`, `csi-attacher`,
/// then `csi-snapshotter` (unless the snapshot policy is `none`), `csi-addons`
/// (enabled and not nfs), `csi-omap-generator` (rbd with `generateOMapInfo`),
/// `liveness-prometheus` (liveness configured) and `log-rotator` (rotation configured).
///
/// # Errors
///
/// Returns [`OperatorError::MissingImage`] if a required image is not configured.
#[allow(clippy::too_many_lines)]
pub fn build_controller_deployment(state: &DesiredState<'_>) -> Result<Deployment, OperatorError> {
    let driver_name = state.name();
    let namespace = state.namespace();
    let name = controller_plugin_name(&driver_name);
    let default_plugin = ControllerPluginSpec::default();
    let plugin = state.spec.controller_plugin.as_ref().unwrap_or(&default_plugin);
    let resources = plugin.resources.clone().unwrap_or_default();
    let pull_policy = plugin.pod_common.image_pull_policy.as_ref();

    debug!(
        driver = %driver_name,
        namespace = %namespace,
        deployment = %name,
        "Building controller plugin Deployment"
    );

    let driver_type = state.driver_type;
    let is_rbd = driver_type == DriverType::Rbd;
    let is_nfs = driver_type == DriverType::Nfs;
    let verbosity = state.log_verbosity();
    let grpc_timeout = state.spec.grpc_timeout.unwrap_or_default();
    let snapshot_policy = state.spec.snapshot_policy.unwrap_or(SnapshotPolicy::VolumeSnapshot);
    let rotation_enabled = state.log_rotation().is_some();
    let plugin_container = state.plugin_container_name();

    let rotate_security_context = plugin
        .privileged
        .filter(|_| rotation_enabled)
        .map(|privileged| SecurityContext {
            privileged: Some(privileged),
            capabilities: Some(Capabilities {
                drop: Some(vec!["All".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        });

    let leader_election = state.spec.leader_election.clone().unwrap_or_default();
    let lease_duration = leader_election
        .lease_duration
        .unwrap_or(DEFAULT_LEASE_DURATION_SECS);
    let renew_deadline = leader_election
        .renew_deadline
        .unwrap_or(DEFAULT_RENEW_DEADLINE_SECS);
    let retry_period = leader_election.retry_period.unwrap_or(DEFAULT_RETRY_PERIOD_SECS);
    let leader_election_args = [
        leader_election_namespace_arg(&namespace),
        arg(leader_election_lease_duration_arg(lease_duration)),
        arg(leader_election_renew_deadline_arg(renew_deadline)),
        arg(leader_election_retry_period_arg(retry_period)),
        arg(ARG_LEADER_ELECTION),
    ];
    let sidecar_args = |extra: Vec<Option<String>>| {
        collect_args(
            leader_election_args
                .iter()
                .cloned()
                .chain([
                    arg(log_verbosity_arg(verbosity)),
                    arg(csi_address_arg()),
                    arg(timeout_arg(grpc_timeout)),
                ])
                .chain(extra),
        )
    };

    let (user_volumes, user_mounts) = user_volumes_and_mounts(plugin.pod_common.volumes.as_ref());

    // Plugin
    let mut plugin_mounts = user_mounts;
    plugin_mounts.extend([
        socket_dir_mount(),
        host_dev_mount(),
        host_sys_mount(),
        lib_modules_mount(),
        keys_tmp_dir_mount(),
        csi_config_mount(),
    ]);
    if state.spec.encryption.is_some() {
        plugin_mounts.push(kms_config_mount());
    }
    if is_rbd {
        plugin_mounts.push(oidc_token_mount());
    }
    if rotation_enabled {
        plugin_mounts.push(logs_dir_mount());
    }

    let mut containers = vec![
        Container {
            security_context: rotate_security_context.clone(),
            args: collect_args(
                [
                    type_arg(driver_type.as_str()),
                    arg(log_verbosity_arg(verbosity)),
                    arg(endpoint_arg()),
                    arg(ARG_NODE_ID),
                    arg(ARG_CONTROLLER_SERVER),
                    driver_name_arg(&driver_name),
                    arg(ARG_PID_LIMIT),
                    set_metadata_arg(state.spec.enable_metadata.unwrap_or(false)),
                    cluster_name_arg(state.spec.cluster_name.as_deref().unwrap_or_default()),
                    state.force_kernel_client().then(|| ARG_FORCE_CEPH_KERNEL_CLIENT.to_string()),
                    state.deploy_csi_addons().then(csi_addons_endpoint_arg),
                ]
                .into_iter()
                .chain(log_file_args(rotation_enabled, &plugin_container)),
            ),
            env: Some(vec![pod_ip_env(), node_id_env(), pod_namespace_env()]),
            volume_mounts: Some(plugin_mounts),
            resources: resources.plugin.clone(),
            ..container(&plugin_container, state.image(IMAGE_PLUGIN)?, pull_policy)
        },
        Container {
            args: sidecar_args(vec![
                arg(ARG_RETRY_INTERVAL_START),
                arg(ARG_DEFAULT_FS_TYPE),
                arg(ARG_PREVENT_VOLUME_MODE_CONVERSION),
                arg(ARG_HONOR_PV_RECLAIM_POLICY),
                is_rbd.then(|| ARG_IMMEDIATE_TOPOLOGY.to_string()),
                (!is_nfs).then(|| ARG_EXTRA_CREATE_METADATA.to_string()),
            ]),
            volume_mounts: Some(vec![socket_dir_mount()]),
            resources: resources.provisioner.clone(),
            ..container("csi-provisioner", state.image(IMAGE_PROVISIONER)?, pull_policy)
        },
        Container {
            args: sidecar_args(vec![
                arg(ARG_HANDLE_VOLUME_INUSE_ERROR),
                arg(ARG_RECOVER_VOLUME_EXPANSION_FAILURE),
            ]),
            volume_mounts: Some(vec![socket_dir_mount()]),
            resources: resources.resizer.clone(),
            ..container("csi-resizer", state.image(IMAGE_RESIZER)?, pull_policy)
        },
        Container {
            args: sidecar_args(vec![is_rbd.then(|| ARG_DEFAULT_FS_TYPE.to_string())]),
            volume_mounts: Some(vec![socket_dir_mount()]),
            resources: resources.attacher.clone(),
            ..container("csi-attacher", state.image(IMAGE_ATTACHER)?, pull_policy)
        },
    ];

    if snapshot_policy != SnapshotPolicy::None {
        containers.push(Container {
            args: sidecar_args(vec![
                (!is_nfs).then(|| ARG_EXTRA_CREATE_METADATA.to_string()),
                (!is_nfs && snapshot_policy == SnapshotPolicy::VolumeGroupSnapshot)
                    .then(|| ARG_ENABLE_VOLUME_GROUP_SNAPSHOTS.to_string()),
            ]),
            volume_mounts: Some(vec![socket_dir_mount()]),
            resources: resources.snapshotter.clone(),
            ..container("csi-snapshotter", state.image(IMAGE_SNAPSHOTTER)?, pull_policy)
        });
    }

    if !is_nfs && state.deploy_csi_addons() {
        let port = if driver_type == DriverType::CephFs {
            CEPHFS_CTRL_PLUGIN_CSI_ADDONS_PORT
        } else {
            RBD_CTRL_PLUGIN_CSI_ADDONS_PORT
        };
        let mut mounts = vec![socket_dir_mount()];
        if rotation_enabled {
            mounts.push(logs_dir_mount());
        }
        containers.push(Container {
            security_context: rotate_security_context.clone(),
            args: collect_args(
                [
                    leader_election_namespace_arg(&namespace),
                    arg(leader_election_lease_duration_arg(lease_duration)),
                    arg(leader_election_renew_deadline_arg(renew_deadline)),
                    arg(leader_election_retry_period_arg(retry_period)),
                    arg(log_verbosity_arg(verbosity)),
                    arg(ARG_CSI_ADDONS_NODE_ID),
                    arg(ARG_POD),
                    arg(ARG_POD_UID),
                    arg(csi_addons_address_arg()),
                    arg(controller_port_arg(port)),
                    arg(ARG_NAMESPACE),
                ]
                .into_iter()
                .chain(log_file_args(rotation_enabled, "csi-addons")),
            ),
            ports: Some(vec![addons_port(port)]),
            env: Some(vec![node_id_env(), pod_uid_env(), pod_name_env(), pod_namespace_env()]),
            volume_mounts: Some(mounts),
            resources: resources.addons.clone(),
            ..container("csi-addons", state.image(IMAGE_ADDONS)?, pull_policy)
        });
    }

    if is_rbd && state.spec.generate_omap_info.unwrap_or(false) {
        containers.push(Container {
            args: collect_args([
                arg(log_verbosity_arg(verbosity)),
                type_arg("controller"),
                arg(ARG_DRIVER_NAMESPACE),
                driver_name_arg(&driver_name),
                set_metadata_arg(state.spec.enable_metadata.unwrap_or(false)),
                cluster_name_arg(state.spec.cluster_name.as_deref().unwrap_or_default()),
            ]),
            env: Some(vec![driver_namespace_env()]),
            volume_mounts: Some(vec![csi_config_mount(), keys_tmp_dir_mount()]),
            resources: resources.omap_generator.clone(),
            ..container("csi-omap-generator", state.image(IMAGE_PLUGIN)?, pull_policy)
        });
    }

    if let Some(liveness) = &state.spec.liveness {
        containers.push(Container {
            args: liveness_args(liveness.metrics_port),
            env: Some(vec![pod_ip_env()]),
            volume_mounts: Some(vec![socket_dir_mount()]),
            resources: resources.liveness.clone(),
            ..container("liveness-prometheus", state.image(IMAGE_PLUGIN)?, pull_policy)
        });
    }

    let mut volumes = user_volumes;
    volumes.extend([
        host_dev_volume(),
        host_sys_volume(),
        lib_modules_volume(),
        socket_dir_volume(),
        keys_tmp_dir_volume(),
        oidc_token_volume(),
        csi_config_volume(),
    ]);
    if let Some(encryption) = &state.spec.encryption {
        volumes.push(kms_config_volume(&encryption.config_map_name));
    }
    if rotation_enabled {
        containers.push(log_rotator_container(
            state.image(IMAGE_PLUGIN)?,
            pull_policy,
            rotate_security_context,
            resources.log_rotator.clone(),
        ));
        volumes.push(logs_dir_volume(&state.log_host_path(), &name));
        volumes.push(log_rotate_dir_volume(&driver_name));
    }

    let selector = LabelSelector {
        match_labels: Some(BTreeMap::from([(APP_LABEL.to_string(), name.clone())])),
        ..Default::default()
    };

    Ok(Deployment {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(namespace),
            labels: Some(build_labels(&driver_name, COMPONENT_CTRL_PLUGIN)),
            owner_references: Some(build_owner_references(state.driver)),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: plugin.replicas,
            selector: selector.clone(),
            strategy: plugin.deployment_strategy.clone(),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels(plugin.pod_common.labels.as_ref(), &name, None)),
                    annotations: plugin.pod_common.annotations.clone(),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(
                        plugin.pod_common.service_account_name.clone().unwrap_or_else(|| {
                            format!(
                                "{}{}-ctrlplugin-sa",
                                state.service_account_prefix, driver_type
                            )
                        }),
                    ),
                    priority_class_name: plugin.pod_common.priority_class_name.clone(),
                    host_network: plugin.host_network.filter(|h| *h),
                    affinity: Some(controller_pod_affinity(
                        plugin.pod_common.affinity.as_ref(),
                        &selector,
                    )),
                    tolerations: plugin.pod_common.tolerations.clone(),
                    containers,
                    volumes: Some(volumes),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn liveness_args(metrics_port: i32) -> Option<Vec<String>> {
    collect_args([
        type_arg("liveness"),
        arg(endpoint_arg()),
        arg(metrics_port_arg(metrics_port)),
        arg(ARG_METRICS_PATH),
        arg(ARG_POLL_TIME),
        arg(timeout_arg(LIVENESS_TIMEOUT_SECS)),
    ])
}

// ============================================================================
// Node Plugin DaemonSet
// ============================================================================

/// Build the node plugin `DaemonSet`.
///
/// Containers, in order: the privileged plugin, `driver-registrar`, then for rbd with
/// csi-addons enabled `csi-addons` and (with liveness) `liveness-prometheus`, and
/// `log-rotator` when rotation is configured.
///
/// # Errors
///
/// Returns [`OperatorError::MissingImage`] if a required image is not configured.
#[allow(clippy::too_many_lines)]
pub fn build_node_daemonset(state: &DesiredState<'_>) -> Result<DaemonSet, OperatorError> {
    let driver_name = state.name();
    let namespace = state.namespace();
    let name = node_plugin_name(&driver_name);
    let default_plugin = NodePluginSpec::default();
    let plugin = state.spec.node_plugin.as_ref().unwrap_or(&default_plugin);
    let resources = plugin.resources.clone().unwrap_or_default();
    let pull_policy = plugin.pod_common.image_pull_policy.as_ref();

    debug!(
        driver = %driver_name,
        namespace = %namespace,
        daemonset = %name,
        "Building node plugin DaemonSet"
    );

    let driver_type = state.driver_type;
    let is_rbd = driver_type == DriverType::Rbd;
    let is_cephfs = driver_type == DriverType::CephFs;
    let verbosity = state.log_verbosity();
    let kubelet_dir = plugin
        .kubelet_dir_path
        .clone()
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| crate::constants::DEFAULT_KUBELET_DIR_PATH.to_string());
    let rotation_enabled = state.log_rotation().is_some();
    let se_linux_host_mount = plugin.enable_se_linux_host_mount.unwrap_or(false);
    let plugin_container = state.plugin_container_name();
    let domain_labels = plugin
        .topology
        .as_ref()
        .and_then(|t| t.domain_labels.as_ref())
        .filter(|_| is_rbd);

    let (user_volumes, user_mounts) = user_volumes_and_mounts(plugin.pod_common.volumes.as_ref());

    let mut plugin_mounts = user_mounts;
    plugin_mounts.extend([
        host_dev_mount(),
        host_sys_mount(),
        host_run_mount_mount(),
        lib_modules_mount(),
        keys_tmp_dir_mount(),
        plugin_dir_mount(),
        csi_config_mount(),
        plugin_mount_dir_mount(&kubelet_dir),
        pods_mount_dir_mount(&kubelet_dir),
    ]);
    if se_linux_host_mount {
        plugin_mounts.push(etc_selinux_mount());
    }
    if state.spec.encryption.is_some() {
        plugin_mounts.push(kms_config_mount());
    }
    if is_rbd {
        plugin_mounts.push(oidc_token_mount());
    }
    if rotation_enabled {
        plugin_mounts.push(logs_dir_mount());
    }

    let mut containers = vec![
        Container {
            security_context: Some(SecurityContext {
                privileged: Some(true),
                capabilities: Some(Capabilities {
                    add: Some(vec!["SYS_ADMIN".to_string()]),
                    drop: Some(vec!["All".to_string()]),
                }),
                allow_privilege_escalation: Some(true),
                ..Default::default()
            }),
            args: collect_args(
                [
                    arg(log_verbosity_arg(verbosity)),
                    type_arg(driver_type.as_str()),
                    arg(ARG_NODE_SERVER),
                    arg(ARG_NODE_ID),
                    driver_name_arg(&driver_name),
                    arg(endpoint_arg()),
                    arg(ARG_PID_LIMIT),
                    state.force_kernel_client().then(|| ARG_FORCE_CEPH_KERNEL_CLIENT.to_string()),
                    state.deploy_csi_addons().then(csi_addons_endpoint_arg),
                    is_rbd.then(|| staging_path_arg(&kubelet_dir)),
                    kernel_mount_options_arg(state.spec.kernel_mount_options.as_ref())
                        .filter(|_| is_cephfs),
                    fuse_mount_options_arg(state.spec.fuse_mount_options.as_ref())
                        .filter(|_| is_cephfs),
                    domain_labels_arg(domain_labels),
                ]
                .into_iter()
                .chain(log_file_args(rotation_enabled, &plugin_container)),
            ),
            env: Some(vec![pod_ip_env(), node_id_env(), pod_namespace_env()]),
            volume_mounts: Some(plugin_mounts),
            resources: resources.plugin.clone(),
            ..container(&plugin_container, state.image(IMAGE_PLUGIN)?, pull_policy)
        },
        Container {
            security_context: Some(privileged_drop_all()),
            args: collect_args([
                arg(log_verbosity_arg(verbosity)),
                arg(kubelet_registration_path_arg(&kubelet_dir, &driver_name)),
                arg(csi_address_arg()),
            ]),
            volume_mounts: Some(vec![plugin_dir_mount(), registration_dir_mount()]),
            resources: resources.registrar.clone(),
            ..container("driver-registrar", state.image(IMAGE_REGISTRAR)?, pull_policy)
        },
    ];

    if is_rbd && state.deploy_csi_addons() {
        let mut mounts = vec![plugin_dir_mount()];
        if rotation_enabled {
            mounts.push(logs_dir_mount());
        }
        containers.push(Container {
            security_context: Some(privileged_drop_all()),
            args: collect_args(
                [
                    arg(ARG_CSI_ADDONS_NODE_ID),
                    arg(log_verbosity_arg(verbosity)),
                    arg(csi_addons_address_arg()),
                    arg(controller_port_arg(NODE_PLUGIN_CSI_ADDONS_PORT)),
                    arg(ARG_POD),
                    arg(ARG_NAMESPACE),
                    arg(ARG_POD_UID),
                    arg(staging_path_arg(&kubelet_dir)),
                ]
                .into_iter()
                .chain(log_file_args(rotation_enabled, "csi-addons")),
            ),
            ports: Some(vec![addons_port(NODE_PLUGIN_CSI_ADDONS_PORT)]),
            env: Some(vec![node_id_env(), pod_name_env(), pod_namespace_env(), pod_uid_env()]),
            volume_mounts: Some(mounts),
            resources: resources.addons.clone(),
            ..container("csi-addons", state.image(IMAGE_ADDONS)?, pull_policy)
        });

        if let Some(liveness) = &state.spec.liveness {
            containers.push(Container {
                security_context: Some(privileged_drop_all()),
                args: liveness_args(liveness.metrics_port),
                env: Some(vec![pod_ip_env()]),
                volume_mounts: Some(vec![plugin_dir_mount()]),
                resources: resources.liveness.clone(),
                ..container("liveness-prometheus", state.image(IMAGE_PLUGIN)?, pull_policy)
            });
        }
    }

    let mut volumes = user_volumes;
    volumes.extend([
        host_dev_volume(),
        host_sys_volume(),
        host_run_mount_volume(),
        lib_modules_volume(),
        keys_tmp_dir_volume(),
        csi_config_volume(),
        plugin_dir_volume(&kubelet_dir, &driver_name),
        plugin_mount_dir_volume(&kubelet_dir),
        pods_mount_dir_volume(&kubelet_dir),
        registration_dir_volume(&kubelet_dir),
    ]);
    if se_linux_host_mount {
        volumes.push(etc_selinux_volume());
    }
    if let Some(encryption) = &state.spec.encryption {
        volumes.push(kms_config_volume(&encryption.config_map_name));
    }
    if is_rbd {
        volumes.push(oidc_token_volume());
    }
    if rotation_enabled {
        containers.push(log_rotator_container(
            state.image(IMAGE_PLUGIN)?,
            pull_policy,
            Some(privileged_drop_all()),
            resources.log_rotator.clone(),
        ));
        volumes.push(logs_dir_volume(&state.log_host_path(), &name));
        volumes.push(log_rotate_dir_volume(&driver_name));
    }

    let contains = state.spec.liveness.as_ref().map(|_| format!("{name}-metrics"));

    Ok(DaemonSet {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(namespace),
            labels: Some(build_labels(&driver_name, COMPONENT_NODE_PLUGIN)),
            owner_references: Some(build_owner_references(state.driver)),
            ..Default::default()
        },
        spec: Some(DaemonSetSpec {
            selector: LabelSelector {
                match_labels: Some(BTreeMap::from([(APP_LABEL.to_string(), name.clone())])),
                ..Default::default()
            },
            update_strategy: plugin.update_strategy.clone(),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels(plugin.pod_common.labels.as_ref(), &name, contains)),
                    annotations: plugin.pod_common.annotations.clone(),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(
                        plugin.pod_common.service_account_name.clone().unwrap_or_else(|| {
                            format!(
                                "{}{}-nodeplugin-sa",
                                state.service_account_prefix, driver_type
                            )
                        }),
                    ),
                    priority_class_name: plugin.pod_common.priority_class_name.clone(),
                    host_network: Some(true),
                    host_pid: is_rbd.then_some(true),
                    dns_policy: Some("ClusterFirstWithHostNet".to_string()),
                    affinity: plugin.pod_common.affinity.clone(),
                    tolerations: plugin.pod_common.tolerations.clone(),
                    containers,
                    volumes: Some(volumes),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

// ============================================================================
// Liveness Service
// ============================================================================

/// Build the liveness metrics `Service`, or `None` when liveness is not configured.
///
/// The Service selects the node plugin pods, which carry
/// `contains: <driver>-nodeplugin-metrics` while liveness is enabled.
#[must_use]
pub fn build_liveness_service(state: &DesiredState<'_>) -> Option<Service> {
    let liveness = state.spec.liveness.as_ref()?;
    let driver_name = state.name();

    Some(Service {
        metadata: ObjectMeta {
            name: Some(liveness_service_name(&driver_name)),
            namespace: Some(state.namespace()),
            labels: Some(build_labels(&driver_name, COMPONENT_LIVENESS)),
            owner_references: Some(build_owner_references(state.driver)),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                name: Some(LIVENESS_SERVICE_PORT_NAME.to_string()),
                port: LIVENESS_SERVICE_PORT,
                protocol: Some("TCP".to_string()),
                target_port: Some(IntOrString::Int(liveness.metrics_port)),
                ..Default::default()
            }]),
            selector: Some(BTreeMap::from([(
                CONTAINS_LABEL.to_string(),
                format!("{}-metrics", node_plugin_name(&driver_name)),
            )])),
            ..Default::default()
        }),
        ..Default::default()
    })
}

// ============================================================================
// Log Rotation ConfigMap
// ============================================================================

/// True when a quantity string has a zero (or unparseable) numeric part.
fn quantity_is_zero(quantity: &str) -> bool {
    let numeric: String = quantity
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit() || matches!(*c, '.' | '+' | '-'))
        .collect();
    numeric.parse::<f64>().map_or(true, |value| value.abs() < f64::EPSILON)
}

/// Render the logrotate configuration for the driver log files.
///
/// # Errors
///
/// Returns [`OperatorError::InvalidLogRotation`] when `periodicity` is set without a
/// non-zero `maxLogSize`, or when neither is set.
pub fn render_log_rotate_config(rotation: &LogRotationSpec) -> Result<String, OperatorError> {
    let max_size = rotation
        .max_log_size
        .as_ref()
        .map(|q| q.0.trim())
        .filter(|q| !quantity_is_zero(q));

    match (rotation.periodicity, max_size) {
        (Some(_), None) => {
            return Err(OperatorError::InvalidLogRotation {
                reason: "periodicity requires a non-zero maxLogSize".to_string(),
            })
        }
        (None, None) => {
            return Err(OperatorError::InvalidLogRotation {
                reason: "either maxLogSize or periodicity must be set".to_string(),
            })
        }
        _ => {}
    }

    let max_files = rotation
        .max_files
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_LOG_ROTATE_MAX_FILES);

    let mut settings = vec![
        "\tmissingok".to_string(),
        "\tcompress".to_string(),
        "\tcopytruncate".to_string(),
        "\tnotifempty".to_string(),
        format!("\trotate {max_files}"),
    ];
    if let Some(periodicity) = rotation.periodicity {
        settings.push(format!("\t{}", periodicity.as_str()));
    }
    if let Some(size) = max_size {
        settings.push(format!("\tmaxsize {size}"));
    }

    Ok(format!("/csi-logs/*.log {{\n{}\n}}\n", settings.join("\n")))
}

/// Build `<driver>-logrotate-config`, or `None` when rotation is not configured.
///
/// # Errors
///
/// Propagates [`render_log_rotate_config`] errors.
pub fn build_log_rotate_config_map(
    state: &DesiredState<'_>,
) -> Result<Option<ConfigMap>, OperatorError> {
    let Some(rotation) = state.log_rotation() else {
        return Ok(None);
    };
    let driver_name = state.name();
    let config = render_log_rotate_config(rotation)?;

    Ok(Some(ConfigMap {
        metadata: ObjectMeta {
            name: Some(log_rotate_config_map_name(&driver_name)),
            namespace: Some(state.namespace()),
            labels: Some(build_labels(&driver_name, COMPONENT_LOG_ROTATE)),
            owner_references: Some(build_owner_references(state.driver)),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(LOG_ROTATE_CONFIG_KEY.to_string(), config)])),
        ..Default::default()
    }))
}

// ============================================================================
// CSIDriver
// ============================================================================

/// Build the cluster-scoped `CSIDriver` object, annotated with its owning `Driver`.
///
/// # Errors
///
/// Returns an error if the owner annotation cannot be serialized.
pub fn build_csi_driver(state: &DesiredState<'_>) -> anyhow::Result<CSIDriver> {
    let driver_name = state.name();
    let owner = serde_json::to_string(&OwnerKey::of(state.driver))?;

    Ok(CSIDriver {
        metadata: ObjectMeta {
            name: Some(driver_name.clone()),
            labels: Some(build_labels(&driver_name, COMPONENT_CSI_DRIVER)),
            annotations: Some(BTreeMap::from([(OWNER_REF_ANNOTATION.to_string(), owner)])),
            ..Default::default()
        },
        spec: CSIDriverSpec {
            attach_required: Some(state.spec.attach_required.unwrap_or(true)),
            pod_info_on_mount: Some(false),
            fs_group_policy: Some(
                state
                    .spec
                    .fs_group_policy
                    .unwrap_or(crate::crd::FsGroupPolicy::File)
                    .as_str()
                    .to_string(),
            ),
            se_linux_mount: state
                .spec
                .node_plugin
                .as_ref()
                .and_then(|np| np.enable_se_linux_host_mount),
            ..Default::default()
        },
    })
}

#[cfg(test)]
#[path = "csi_resources_tests.rs"]
mod csi_resources_tests;
