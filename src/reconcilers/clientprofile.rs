// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `ClientProfile` reconciliation.
//!
//! A profile contributes one record, keyed by its name, to `config.json` in the shared
//! `ceph-csi-config` `ConfigMap` of its namespace. While the profile exists it also holds
//! a plain owner reference on its `CephConnection` and on the shared `ConfigMap`.
//!
//! The profile carries the `csi.ceph.com/cleanup` finalizer; [`cleanup_client_profile`]
//! retracts the record and both owner references before the finalizer is removed.

use crate::cluster_config::{
    compose_cluster_info, parse_cluster_infos, toggle_owner_reference, update_config_json,
    ClusterInfo,
};
use crate::constants::{CSI_CONFIG_KEY, CSI_CONFIG_MAP_NAME};
use crate::context::Context;
use crate::crd::{CephConnection, ClientProfile};
use crate::errors::OperatorError;
use crate::reconcilers::plain_owner_reference;
use crate::reconcilers::resources::create_or_update;
use anyhow::{anyhow, Context as _, Result};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::PostParams;
use kube::{Api, ResourceExt};
use tracing::{debug, info};

/// Add or refresh the profile's record and owner references.
///
/// # Errors
///
/// Returns [`OperatorError::MissingCephConnectionRef`] for an empty reference, an error
/// if the `CephConnection` does not exist, and any API or JSON error from the update of
/// the shared `ConfigMap`.
pub async fn reconcile_client_profile(ctx: &Context, profile: &ClientProfile) -> Result<()> {
    let name = profile.name_any();
    let namespace = profile_namespace(profile)?;
    info!(client_profile = %name, namespace = %namespace, "Reconciling ClientProfile");

    let connection_name = &profile.spec.ceph_connection_ref.name;
    if connection_name.is_empty() {
        return Err(OperatorError::MissingCephConnectionRef { profile: name }.into());
    }

    let connections: Api<CephConnection> = Api::namespaced(ctx.client.clone(), &namespace);
    let connection = connections
        .get(connection_name)
        .await
        .with_context(|| format!("failed loading CephConnection {namespace}/{connection_name}"))?;

    let record = compose_cluster_info(profile, &connection);
    toggle_connection_owner(&connections, connection, profile, true).await?;
    sync_cluster_info(ctx, profile, Some(&record)).await?;

    info!(client_profile = %name, namespace = %namespace, "ClientProfile reconciled");
    Ok(())
}

/// Remove the profile's record and owner references.
///
/// A missing `CephConnection` or shared `ConfigMap` is not an error: there is nothing to
/// retract from it.
///
/// # Errors
///
/// Returns any API or JSON error from the updates.
pub async fn cleanup_client_profile(ctx: &Context, profile: &ClientProfile) -> Result<()> {
    let name = profile.name_any();
    let namespace = profile_namespace(profile)?;
    info!(client_profile = %name, namespace = %namespace, "Cleaning up ClientProfile");

    let connection_name = &profile.spec.ceph_connection_ref.name;
    if !connection_name.is_empty() {
        let connections: Api<CephConnection> = Api::namespaced(ctx.client.clone(), &namespace);
        match connections.get_opt(connection_name).await? {
            Some(connection) => toggle_connection_owner(&connections, connection, profile, false).await?,
            None => debug!(client_profile = %name, "CephConnection already gone"),
        }
    }

    sync_cluster_info(ctx, profile, None).await?;

    info!(client_profile = %name, namespace = %namespace, "ClientProfile cleaned up");
    Ok(())
}

fn profile_namespace(profile: &ClientProfile) -> Result<String> {
    profile
        .namespace()
        .ok_or_else(|| anyhow!("ClientProfile {} has no namespace", profile.name_any()))
}

/// Add (`on`) or remove the profile's owner reference on its `CephConnection`.
async fn toggle_connection_owner(
    connections: &Api<CephConnection>,
    mut connection: CephConnection,
    profile: &ClientProfile,
    on: bool,
) -> Result<()> {
    let owner = plain_owner_reference(profile)?;
    if !toggle_owner_reference(&mut connection.metadata, &owner, on) {
        return Ok(());
    }

    let connection_name = connection.name_any();
    debug!(
        client_profile = %profile.name_any(),
        ceph_connection = %connection_name,
        add = on,
        "Updating owner reference on CephConnection"
    );
    connections
        .replace(&connection_name, &PostParams::default(), &connection)
        .await
        .with_context(|| format!("failed to update CephConnection {connection_name}"))?;
    Ok(())
}

/// Upsert (`record` set) or evict the profile's `config.json` record under the shared
/// `ConfigMap` lock.
async fn sync_cluster_info(
    ctx: &Context,
    profile: &ClientProfile,
    record: Option<&ClusterInfo>,
) -> Result<()> {
    let name = profile.name_any();
    let namespace = profile.namespace().unwrap_or_default();
    let owner = plain_owner_reference(profile)?;
    let api: Api<ConfigMap> = Api::namespaced(ctx.client.clone(), &namespace);

    let _guard = ctx.lock_csi_config().await;

    if record.is_none() && api.get_opt(CSI_CONFIG_MAP_NAME).await?.is_none() {
        debug!(client_profile = %name, "Shared ConfigMap absent, nothing to retract");
        return Ok(());
    }

    let mut record_count = 0;
    create_or_update(&api, CSI_CONFIG_MAP_NAME, |cm| {
        toggle_owner_reference(&mut cm.metadata, &owner, record.is_some());

        let data = cm.data.get_or_insert_with(Default::default);
        let updated = update_config_json(
            CSI_CONFIG_MAP_NAME,
            data.get(CSI_CONFIG_KEY).map(String::as_str),
            &name,
            record.cloned(),
        )?;
        record_count = parse_cluster_infos(CSI_CONFIG_MAP_NAME, Some(&updated))?.len();
        data.insert(CSI_CONFIG_KEY.to_string(), updated);
        Ok(())
    })
    .await?;

    crate::metrics::record_csi_config_records(&namespace, CSI_CONFIG_KEY, record_count);
    Ok(())
}

#[cfg(test)]
#[path = "clientprofile_tests.rs"]
mod clientprofile_tests;
