// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `Driver` reconciliation.
//!
//! A reconcile runs in three steps:
//!
//! 1. **Load and validate** - parse the variant from the name, make sure the
//!    cluster-scoped `CSIDriver` of the same name is ours (or absent), read the
//!    `OperatorConfig` and any image-set `ConfigMap`s, and resolve the effective spec.
//! 2. **Children** - reconcile the six child objects concurrently. Every child is
//!    attempted even when another fails; all failures are reported together.
//! 3. **Status** - record `Ready` or `Failed` on the `Driver`.

use crate::cluster_config::toggle_owner_reference;
use crate::constants::CSI_CONFIG_MAP_NAME;
use crate::context::Context;
use crate::crd::{Driver, OperatorConfig};
use crate::csi_resources::{
    build_controller_deployment, build_csi_driver, build_liveness_service, build_log_rotate_config_map,
    build_node_daemonset, liveness_service_name, DesiredState, OwnerKey,
};
use crate::csi_volumes::log_rotate_config_map_name;
use crate::driver_type::DriverType;
use crate::errors::{is_invalid_anyhow, join_errors, OperatorError};
use crate::merge::{resolve_driver_spec, resolve_images};
use crate::reconcilers::plain_owner_reference;
use crate::reconcilers::resources::{create, create_or_update, delete_if_exists, merge_metadata};
use crate::reconcilers::status::{driver_status, update_driver_status};
use anyhow::{anyhow, Context as _, Result};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::{ConfigMap, LocalObjectReference, Service, ServiceSpec};
use k8s_openapi::api::storage::v1::{CSIDriver, CSIDriverSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Api, Client, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reconcile a `Driver` and record the outcome on its status.
///
/// # Errors
///
/// Returns the validation error, or the joined errors of every failed child. A status
/// update failure is returned only when the reconcile itself succeeded.
pub async fn reconcile_driver(ctx: Arc<Context>, driver: Driver) -> Result<()> {
    let name = driver.name_any();
    let namespace = driver
        .namespace()
        .ok_or_else(|| anyhow!("Driver {name} has no namespace"))?;

    info!(driver = %name, namespace = %namespace, "Reconciling Driver");

    let outcome = reconcile_driver_state(&ctx, &driver).await;

    let api: Api<Driver> = Api::namespaced(ctx.client.clone(), &namespace);
    if let Err(e) = update_driver_status(&api, &driver, driver_status(&outcome)).await {
        warn!(driver = %name, namespace = %namespace, error = %e, "Failed to update Driver status");
        if outcome.is_ok() {
            return Err(e);
        }
    }

    outcome
}

async fn reconcile_driver_state(ctx: &Context, driver: &Driver) -> Result<()> {
    let name = driver.name_any();
    let namespace = driver.namespace().unwrap_or_default();

    let driver_type = DriverType::from_driver_name(&name)?;
    validate_csi_driver_ownership(&ctx.client, driver).await?;

    let operator_config = load_operator_config(ctx).await?;
    let defaults = operator_config
        .as_ref()
        .and_then(|config| config.spec.driver_spec_defaults.as_ref());

    let operator_images = load_image_set(
        &ctx.client,
        &ctx.settings.operator_namespace,
        defaults.and_then(|d| d.image_set.as_ref()),
    )
    .await?;
    let driver_images = load_image_set(&ctx.client, &namespace, driver.spec.image_set.as_ref()).await?;

    let spec = resolve_driver_spec(&driver.spec, defaults);
    let images = resolve_images(operator_images.as_ref(), driver_images.as_ref());
    let state = DesiredState {
        driver,
        spec: &spec,
        driver_type,
        images: &images,
        service_account_prefix: &ctx.settings.service_account_prefix,
    };

    debug!(driver = %name, driver_type = %driver_type, "Desired state resolved");

    let (csi_config, log_rotate, csi_driver, deployment, daemonset, liveness) = futures::join!(
        reconcile_csi_config_map(ctx, driver),
        reconcile_log_rotate_config_map(ctx, &state),
        reconcile_csi_driver(ctx, &state),
        reconcile_controller_deployment(ctx, &state),
        reconcile_node_daemonset(ctx, &state),
        reconcile_liveness_service(ctx, &state),
    );

    join_errors(vec![
        csi_config.context("csi config map"),
        log_rotate.context("log rotate config map"),
        csi_driver.context("CSIDriver"),
        deployment.context("controller plugin deployment"),
        daemonset.context("node plugin daemonset"),
        liveness.context("liveness service"),
    ])?;

    info!(driver = %name, namespace = %namespace, "Driver reconciled");
    Ok(())
}

// ============================================================================
// Load and validate
// ============================================================================

/// Fail when a `CSIDriver` with the driver's name exists and is not annotated as
/// belonging to this `Driver`.
///
/// # Errors
///
/// Returns [`OperatorError::NameConflict`] for a foreign `CSIDriver`, or the API error
/// if it cannot be read.
pub async fn validate_csi_driver_ownership(client: &Client, driver: &Driver) -> Result<()> {
    let name = driver.name_any();
    let api: Api<CSIDriver> = Api::all(client.clone());

    let Some(existing) = api.get_opt(&name).await? else {
        return Ok(());
    };

    let owner = OwnerKey::from_annotations(existing.annotations());
    if owner.as_ref() == Some(&OwnerKey::of(driver)) {
        return Ok(());
    }

    let owner = owner.map_or_else(|| "an unannotated owner".to_string(), |o| o.to_string());
    warn!(driver = %name, owner = %owner, "Desired name already in use by a different CSIDriver");
    Err(OperatorError::NameConflict { name, owner }.into())
}

async fn load_operator_config(ctx: &Context) -> Result<Option<OperatorConfig>> {
    let api: Api<OperatorConfig> =
        Api::namespaced(ctx.client.clone(), &ctx.settings.operator_namespace);
    api.get_opt(&ctx.settings.operator_config_name)
        .await
        .with_context(|| {
            format!(
                "failed to load OperatorConfig {}/{}",
                ctx.settings.operator_namespace, ctx.settings.operator_config_name
            )
        })
}

/// Read an image-set `ConfigMap`. A reference with an empty name is ignored.
async fn load_image_set(
    client: &Client,
    namespace: &str,
    reference: Option<&LocalObjectReference>,
) -> Result<Option<BTreeMap<String, String>>> {
    let Some(name) = reference.map(|r| r.name.as_str()).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    let config_map = api
        .get(name)
        .await
        .with_context(|| format!("failed to load image set ConfigMap {namespace}/{name}"))?;
    Ok(Some(config_map.data.unwrap_or_default()))
}

// ============================================================================
// Children
// ============================================================================

/// Ensure the shared `ceph-csi-config` `ConfigMap` exists and references the driver.
async fn reconcile_csi_config_map(ctx: &Context, driver: &Driver) -> Result<()> {
    let owner = plain_owner_reference(driver)?;
    let api: Api<ConfigMap> =
        Api::namespaced(ctx.client.clone(), &driver.namespace().unwrap_or_default());

    let _guard = ctx.lock_csi_config().await;
    create_or_update(&api, CSI_CONFIG_MAP_NAME, |cm| {
        toggle_owner_reference(&mut cm.metadata, &owner, true);
        Ok(())
    })
    .await?;
    Ok(())
}

async fn reconcile_log_rotate_config_map(ctx: &Context, state: &DesiredState<'_>) -> Result<()> {
    let namespace = state.driver.namespace().unwrap_or_default();
    let api: Api<ConfigMap> = Api::namespaced(ctx.client.clone(), &namespace);

    match build_log_rotate_config_map(state)? {
        Some(desired) => {
            let name = desired.name_any();
            create_or_update(&api, &name, |cm| {
                merge_metadata(&mut cm.metadata, &desired.metadata);
                cm.data.clone_from(&desired.data);
                Ok(())
            })
            .await?;
        }
        None => {
            delete_if_exists(&api, &log_rotate_config_map_name(&state.driver.name_any())).await?;
        }
    }
    Ok(())
}

/// Copy the fields the operator manages onto an existing `CSIDriver` spec.
///
/// `seLinuxMount` is only overwritten when the driver sets it.
pub fn apply_csi_driver_spec(dest: &mut CSIDriverSpec, desired: &CSIDriverSpec) {
    dest.attach_required = desired.attach_required;
    dest.pod_info_on_mount = desired.pod_info_on_mount;
    dest.fs_group_policy.clone_from(&desired.fs_group_policy);
    if desired.se_linux_mount.is_some() {
        dest.se_linux_mount = desired.se_linux_mount;
    }
}

/// Create or update the `CSIDriver`, recreating it when an immutable field changed.
pub(crate) async fn reconcile_csi_driver(ctx: &Context, state: &DesiredState<'_>) -> Result<()> {
    let desired = build_csi_driver(state)?;
    let name = desired.name_any();
    let api: Api<CSIDriver> = Api::all(ctx.client.clone());

    let result = create_or_update(&api, &name, |csi_driver| {
        merge_metadata(&mut csi_driver.metadata, &desired.metadata);
        apply_csi_driver_spec(&mut csi_driver.spec, &desired.spec);
        Ok(())
    })
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_invalid_anyhow(&e) => recreate_csi_driver(&api, &desired, e).await,
        Err(e) => Err(e),
    }
}

/// Delete and recreate a `CSIDriver` whose update was rejected as invalid.
///
/// The new object keeps the existing labels, annotations and spec, overlaid with the
/// desired ones. `update_error` is returned when there is nothing to recreate.
async fn recreate_csi_driver(
    api: &Api<CSIDriver>,
    desired: &CSIDriver,
    update_error: anyhow::Error,
) -> Result<()> {
    let name = desired.name_any();
    let Some(existing) = api.get_opt(&name).await? else {
        return Err(update_error);
    };
    info!(csi_driver = %name, "CSIDriver exists but cannot be updated, recreating");

    let mut replacement = CSIDriver {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            labels: existing.metadata.labels,
            annotations: existing.metadata.annotations,
            ..Default::default()
        },
        spec: existing.spec,
    };
    merge_metadata(&mut replacement.metadata, &desired.metadata);
    apply_csi_driver_spec(&mut replacement.spec, &desired.spec);

    delete_if_exists(api, &name)
        .await
        .context("failed deleting existing CSIDriver")?;
    create(api, &replacement)
        .await
        .context("failed recreating CSIDriver")?;

    info!(csi_driver = %name, "CSIDriver recreated");
    Ok(())
}

async fn reconcile_controller_deployment(ctx: &Context, state: &DesiredState<'_>) -> Result<()> {
    let desired = build_controller_deployment(state)?;
    let api: Api<Deployment> =
        Api::namespaced(ctx.client.clone(), &state.driver.namespace().unwrap_or_default());

    create_or_update(&api, &desired.name_any(), |deployment| {
        merge_metadata(&mut deployment.metadata, &desired.metadata);
        deployment.spec.clone_from(&desired.spec);
        Ok(())
    })
    .await?;
    Ok(())
}

async fn reconcile_node_daemonset(ctx: &Context, state: &DesiredState<'_>) -> Result<()> {
    let desired = build_node_daemonset(state)?;
    let api: Api<DaemonSet> =
        Api::namespaced(ctx.client.clone(), &state.driver.namespace().unwrap_or_default());

    create_or_update(&api, &desired.name_any(), |daemonset| {
        merge_metadata(&mut daemonset.metadata, &desired.metadata);
        daemonset.spec.clone_from(&desired.spec);
        Ok(())
    })
    .await?;
    Ok(())
}

/// Only ports and selector are managed; the API server owns the rest of the spec
/// (`clusterIP` is immutable).
async fn reconcile_liveness_service(ctx: &Context, state: &DesiredState<'_>) -> Result<()> {
    let api: Api<Service> =
        Api::namespaced(ctx.client.clone(), &state.driver.namespace().unwrap_or_default());

    let Some(desired) = build_liveness_service(state) else {
        delete_if_exists(&api, &liveness_service_name(&state.driver.name_any())).await?;
        return Ok(());
    };

    let desired_spec = desired.spec.clone().unwrap_or_default();
    create_or_update(&api, &desired.name_any(), |service| {
        merge_metadata(&mut service.metadata, &desired.metadata);
        let spec = service.spec.get_or_insert_with(ServiceSpec::default);
        spec.ports.clone_from(&desired_spec.ports);
        spec.selector.clone_from(&desired_spec.selector);
        Ok(())
    })
    .await?;
    Ok(())
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod driver_tests;
