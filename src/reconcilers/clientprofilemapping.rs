// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `ClientProfileMapping` aggregation.
//!
//! `cluster-mapping.json` in the shared `ceph-csi-config` `ConfigMap` is a fold over every
//! mapping of the namespace, so it is always rebuilt from a fresh list rather than edited
//! per mapping. The reconcile is keyed on the shared `ConfigMap`: any mapping event in a
//! namespace (including a delete) triggers one rebuild for that namespace.
//!
//! Each mapping that contributes at least one entry holds a plain owner reference on the
//! `ConfigMap`; references of mappings that no longer contribute are dropped.

use crate::cluster_config::build_cluster_mappings;
use crate::constants::{
    API_GROUP_VERSION, CLUSTER_MAPPING_KEY, CSI_CONFIG_MAP_NAME, KIND_CLIENT_PROFILE_MAPPING,
};
use crate::context::Context;
use crate::crd::ClientProfileMapping;
use crate::reconcilers::plain_owner_reference;
use crate::reconcilers::resources::create_or_update;
use anyhow::{Context as _, Result};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::ListParams;
use kube::{Api, ResourceExt};
use std::collections::HashSet;
use tracing::{debug, info};

/// Rebuild `cluster-mapping.json` for `namespace` from every `ClientProfileMapping` in it.
///
/// # Errors
///
/// Returns an error if the mappings cannot be listed or the shared `ConfigMap` cannot be
/// written.
pub async fn reconcile_client_profile_mappings(ctx: &Context, namespace: &str) -> Result<()> {
    info!(namespace = %namespace, "Rebuilding cluster mappings");

    let mappings_api: Api<ClientProfileMapping> = Api::namespaced(ctx.client.clone(), namespace);
    let mut mappings = mappings_api
        .list(&ListParams::default())
        .await
        .with_context(|| format!("failed to list ClientProfileMappings in {namespace}"))?
        .items;
    mappings.retain(|m| m.metadata.deletion_timestamp.is_none());
    mappings.sort_by_key(ResourceExt::name_any);

    let owners = mappings
        .iter()
        .filter(|m| !m.spec.mappings.is_empty())
        .map(plain_owner_reference)
        .collect::<Result<Vec<_>>>()?;
    let records = build_cluster_mappings(&mappings);
    let record_count = records.len();
    let rendered = serde_json::to_string(&records)?;
    debug!(
        namespace = %namespace,
        mappings = mappings.len(),
        records = record_count,
        contributing = owners.len(),
        "Rendered cluster mappings"
    );

    let api: Api<ConfigMap> = Api::namespaced(ctx.client.clone(), namespace);
    let _guard = ctx.lock_csi_config().await;

    create_or_update(&api, CSI_CONFIG_MAP_NAME, |cm| {
        sync_mapping_owners(&mut cm.metadata, &owners);
        cm.data
            .get_or_insert_with(Default::default)
            .insert(CLUSTER_MAPPING_KEY.to_string(), rendered);
        Ok(())
    })
    .await?;

    crate::metrics::record_csi_config_records(namespace, CLUSTER_MAPPING_KEY, record_count);
    Ok(())
}

/// Make the `ClientProfileMapping` owner references on `meta` exactly `owners`.
///
/// References of any other kind are left alone.
pub fn sync_mapping_owners(meta: &mut ObjectMeta, owners: &[OwnerReference]) {
    let wanted: HashSet<&str> = owners.iter().map(|o| o.uid.as_str()).collect();
    let refs = meta.owner_references.get_or_insert_with(Vec::new);

    refs.retain(|r| !is_mapping_reference(r) || wanted.contains(r.uid.as_str()));
    for owner in owners {
        if !refs.iter().any(|r| r.uid == owner.uid) {
            refs.push(owner.clone());
        }
    }

    if refs.is_empty() {
        meta.owner_references = None;
    }
}

fn is_mapping_reference(reference: &OwnerReference) -> bool {
    reference.kind == KIND_CLIENT_PROFILE_MAPPING && reference.api_version == API_GROUP_VERSION
}

#[cfg(test)]
#[path = "clientprofilemapping_tests.rs"]
mod clientprofilemapping_tests;
