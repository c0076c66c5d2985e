// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Documents stored in the shared `ceph-csi-config` `ConfigMap`.
//!
//! Two keys are maintained:
//!
//! - `config.json`: a JSON array with one [`ClusterInfo`] record per `ClientProfile`,
//!   keyed by `clusterID` (the profile name). Records are upserted in place and removed
//!   with a swap-remove, so array order is not stable across deletions.
//! - `cluster-mapping.json`: a JSON array of [`ClusterMapping`] records rebuilt from
//!   every `ClientProfileMapping` in the namespace.
//!
//! Ceph CSI reads both keys from the mounted volume; the field names below are its
//! wire format and must not change.

use crate::crd::{CephConnection, ClientProfile, ClientProfileMapping};
use crate::csi_volumes::mount_options_to_string;
use crate::errors::OperatorError;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

// ============================================================================
// config.json
// ============================================================================

/// CephFS section of a cluster record. Mount option strings are always emitted.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CephFsClusterInfo {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subvolume_group: String,
    #[serde(default)]
    pub kernel_mount_options: String,
    #[serde(default)]
    pub fuse_mount_options: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RbdClusterInfo {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rados_namespace: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub mirror_count: i32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NfsClusterInfo {}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReadAffinityInfo {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub crush_location_labels: Vec<String>,
}

/// One entry of `config.json`.
///
/// Fields this operator does not know about are kept on read and written back
/// unchanged.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ClusterInfo {
    #[serde(rename = "clusterID", default, skip_serializing_if = "String::is_empty")]
    pub cluster_id: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub monitors: Vec<String>,

    #[serde(rename = "cephFS", default)]
    pub ceph_fs: CephFsClusterInfo,

    #[serde(default)]
    pub rbd: RbdClusterInfo,

    #[serde(default)]
    pub nfs: NfsClusterInfo,

    #[serde(rename = "readAffinity", default)]
    pub read_affinity: ReadAffinityInfo,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(value: &i32) -> bool {
    *value == 0
}

/// Compose the `config.json` record for a profile and its `CephConnection`.
#[must_use]
pub fn compose_cluster_info(profile: &ClientProfile, connection: &CephConnection) -> ClusterInfo {
    let mut record = ClusterInfo {
        cluster_id: profile.name_any(),
        monitors: connection.spec.monitors.clone(),
        ..Default::default()
    };

    if let Some(ceph_fs) = &profile.spec.ceph_fs {
        record.ceph_fs.subvolume_group = ceph_fs.sub_volume_group.clone().unwrap_or_default();
        if let Some(options) = &ceph_fs.kernel_mount_options {
            record.ceph_fs.kernel_mount_options = mount_options_to_string(options);
        }
        if let Some(options) = &ceph_fs.fuse_mount_options {
            record.ceph_fs.fuse_mount_options = mount_options_to_string(options);
        }
    }

    if let Some(rbd) = &profile.spec.rbd {
        record.rbd.rados_namespace = rbd.rados_namespace.clone().unwrap_or_default();
        record.rbd.mirror_count = connection.spec.rbd_mirror_daemon_count.unwrap_or(0);
    }

    if let Some(read_affinity) = &connection.spec.read_affinity {
        record.read_affinity.enabled = !read_affinity.crush_location_labels.is_empty();
        record
            .read_affinity
            .crush_location_labels
            .clone_from(&read_affinity.crush_location_labels);
    }

    record
}

/// Parse `config.json`. Missing or empty data is an empty list.
///
/// # Errors
///
/// Returns [`OperatorError::MalformedClusterConfig`] if the data is not a JSON array of
/// records.
pub fn parse_cluster_infos(
    config_map: &str,
    data: Option<&str>,
) -> Result<Vec<ClusterInfo>, OperatorError> {
    parse_json_list(config_map, crate::constants::CSI_CONFIG_KEY, data)
}

/// Replace the record with the same `clusterID`, or append it.
pub fn upsert_cluster_info(records: &mut Vec<ClusterInfo>, record: ClusterInfo) {
    match records.iter_mut().find(|r| r.cluster_id == record.cluster_id) {
        Some(existing) => *existing = record,
        None => records.push(record),
    }
}

/// Remove the record for `cluster_id` by moving the last record into its slot.
///
/// Returns `true` if a record was removed.
pub fn remove_cluster_info(records: &mut Vec<ClusterInfo>, cluster_id: &str) -> bool {
    match records.iter().position(|r| r.cluster_id == cluster_id) {
        Some(index) => {
            records.swap_remove(index);
            true
        }
        None => false,
    }
}

/// Apply one profile change to the `config.json` text and return the new text.
///
/// With `record` set the record is upserted; with `None` the record named
/// `cluster_id` is removed.
///
/// # Errors
///
/// Fails on malformed input or if the list cannot be serialized.
pub fn update_config_json(
    config_map: &str,
    data: Option<&str>,
    cluster_id: &str,
    record: Option<ClusterInfo>,
) -> anyhow::Result<String> {
    let mut records = parse_cluster_infos(config_map, data)?;
    match record {
        Some(record) => upsert_cluster_info(&mut records, record),
        None => {
            remove_cluster_info(&mut records, cluster_id);
        }
    }
    Ok(serde_json::to_string(&records)?)
}

// ============================================================================
// cluster-mapping.json
// ============================================================================

/// One entry of `cluster-mapping.json`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterMapping {
    /// Single `{local: remote}` profile pair.
    #[serde(rename = "clusterIdMapping", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cluster_id_mapping: BTreeMap<String, String>,

    /// `{localPoolId: remotePoolId}` pairs.
    #[serde(rename = "RBDPoolIDMapping", default, skip_serializing_if = "Vec::is_empty")]
    pub rbd_pool_id_mapping: Vec<BTreeMap<String, String>>,
}

/// Fold every mapping of a namespace into `cluster-mapping.json` records.
///
/// Records are grouped by `(local, remote)` profile pair in first-seen order. Each
/// `(local, remote, localPool, remotePool)` combination is emitted once; pool pairs
/// that do not have exactly two entries are skipped.
#[must_use]
pub fn build_cluster_mappings(mappings: &[ClientProfileMapping]) -> Vec<ClusterMapping> {
    let mut records: Vec<ClusterMapping> = Vec::new();
    let mut index_by_pair: HashMap<(&str, &str), usize> = HashMap::new();
    let mut seen: HashSet<(&str, &str, &str, &str)> = HashSet::new();

    for mapping in mappings.iter().flat_map(|m| m.spec.mappings.iter()) {
        let local = mapping.local_client_profile.as_str();
        let remote = mapping.remote_client_profile.as_str();

        let index = *index_by_pair.entry((local, remote)).or_insert_with(|| {
            records.push(ClusterMapping {
                cluster_id_mapping: BTreeMap::from([(local.to_string(), remote.to_string())]),
                rbd_pool_id_mapping: Vec::new(),
            });
            records.len() - 1
        });

        for pair in &mapping.block_pool_id_mapping {
            let [pool_local, pool_remote] = pair.as_slice() else {
                continue;
            };
            if seen.insert((local, remote, pool_local.as_str(), pool_remote.as_str())) {
                records[index]
                    .rbd_pool_id_mapping
                    .push(BTreeMap::from([(pool_local.clone(), pool_remote.clone())]));
            }
        }
    }

    records
}

// ============================================================================
// Shared helpers
// ============================================================================

fn parse_json_list<T: for<'de> Deserialize<'de>>(
    config_map: &str,
    key: &str,
    data: Option<&str>,
) -> Result<Vec<T>, OperatorError> {
    match data.map(str::trim) {
        None | Some("") => Ok(Vec::new()),
        Some(json) => {
            serde_json::from_str(json).map_err(|e| OperatorError::MalformedClusterConfig {
                config_map: config_map.to_string(),
                key: key.to_string(),
                reason: e.to_string(),
            })
        }
    }
}

/// Add (`on`) or remove a plain owner reference, matched by UID.
///
/// Returns `true` if `meta` changed.
pub fn toggle_owner_reference(meta: &mut ObjectMeta, owner: &OwnerReference, on: bool) -> bool {
    let refs = meta.owner_references.get_or_insert_with(Vec::new);
    let position = refs.iter().position(|r| r.uid == owner.uid);

    let changed = match (on, position) {
        (true, None) => {
            refs.push(owner.clone());
            true
        }
        (false, Some(index)) => {
            refs.remove(index);
            true
        }
        _ => false,
    };

    if refs.is_empty() {
        meta.owner_references = None;
    }
    changed
}

#[cfg(test)]
#[path = "cluster_config_tests.rs"]
mod cluster_config_tests;
