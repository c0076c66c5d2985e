// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Controller wiring.
//!
//! One set of controllers runs per watched namespace:
//!
//! - `Driver` - owns the driver workloads and services, and is requeued by changes to the
//!   `OperatorConfig` singleton, to annotated `CSIDriver` objects and to `ConfigMap`s it
//!   owns
//! - `ClientProfile` - finalizer-guarded; requeued by the `CephConnection`s and the shared
//!   `ConfigMap` it holds owner references on
//! - cluster mappings - keyed on the watched `Namespace`; every `ClientProfileMapping`
//!   event, deletes included, and every change to the shared `ConfigMap` requeue it
//!
//! Reconcile wrappers record metrics and translate outcomes into [`Action`]s. Failed
//! reconciles go through [`error_policy`] and are retried after
//! [`ERROR_REQUEUE_DURATION_SECS`].

use crate::constants::{
    CLEANUP_FINALIZER, CSI_CONFIG_MAP_NAME, ERROR_REQUEUE_DURATION_SECS, KIND_CLIENT_PROFILE,
    KIND_CLIENT_PROFILE_MAPPING, KIND_DRIVER, SUCCESS_REQUEUE_DURATION_SECS,
};
use crate::context::Context;
use crate::crd::{CephConnection, ClientProfile, ClientProfileMapping, Driver, OperatorConfig};
use crate::errors::metric_label_for;
use crate::reconcilers::{
    cleanup_client_profile, reconcile_client_profile, reconcile_client_profile_mappings,
    reconcile_driver,
};
use crate::watches::{
    csi_driver_to_driver, namespace_of, operator_config_to_drivers, owners_of_kind,
};
use anyhow::{anyhow, Result};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Service};
use k8s_openapi::api::storage::v1::CSIDriver;
use kube::api::Api;
use kube::runtime::controller::Action;
use kube::runtime::finalizer;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Resource, ResourceExt};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Reconciliation error wrapper
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ReconcileError(#[from] anyhow::Error);

/// Error policy shared by all controllers.
///
/// Logs the full error chain and requeues the object after a fixed delay.
#[allow(clippy::needless_pass_by_value)] // Signature required by kube::runtime::Controller
pub fn error_policy<K>(resource: Arc<K>, err: &ReconcileError, _ctx: Arc<Context>) -> Action
where
    K: Resource<DynamicType = ()> + Debug,
{
    let kind = K::kind(&());
    error!(
        error = %format!("{:#}", err.0),
        kind = %kind,
        name = %resource.name_any(),
        namespace = ?resource.namespace(),
        "Reconciliation error - will retry in {}s",
        ERROR_REQUEUE_DURATION_SECS
    );
    crate::metrics::record_reconciliation_requeue(&kind, "error");
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
}

fn success_action() -> Action {
    Action::requeue(Duration::from_secs(SUCCESS_REQUEUE_DURATION_SECS))
}

/// Record duration and outcome metrics for one reconcile.
fn record_outcome(kind: &str, start: Instant, result: Result<(), &anyhow::Error>) {
    let duration = start.elapsed();
    match result {
        Ok(()) => crate::metrics::record_reconciliation_success(kind, duration),
        Err(err) => {
            crate::metrics::record_reconciliation_error(kind, duration);
            crate::metrics::record_error(kind, metric_label_for(err));
        }
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Run the `Driver` controller for `namespace`.
///
/// # Errors
///
/// Returns an error if the controller stream ends, which only happens on shutdown.
pub async fn run_driver_controller(ctx: Arc<Context>, namespace: String) -> Result<()> {
    info!(namespace = %namespace, "Starting Driver controller");

    let client = ctx.client.clone();
    let settings = ctx.settings.clone();
    let config_fields = format!("metadata.name={}", settings.operator_config_name);
    let config_api =
        Api::<OperatorConfig>::namespaced(client.clone(), &settings.operator_namespace);

    let controller = Controller::new(
        Api::<Driver>::namespaced(client.clone(), &namespace),
        WatcherConfig::default(),
    );
    let drivers = controller.store();
    let csi_namespace = namespace.clone();

    controller
        .owns(
            Api::<Deployment>::namespaced(client.clone(), &namespace),
            WatcherConfig::default(),
        )
        .owns(
            Api::<DaemonSet>::namespaced(client.clone(), &namespace),
            WatcherConfig::default(),
        )
        .owns(
            Api::<Service>::namespaced(client.clone(), &namespace),
            WatcherConfig::default(),
        )
        .watches(
            Api::<ConfigMap>::namespaced(client.clone(), &namespace),
            WatcherConfig::default(),
            |cm| owners_of_kind::<Driver>(&cm.metadata),
        )
        .watches(
            config_api,
            WatcherConfig::default().fields(&config_fields),
            move |config| operator_config_to_drivers(&config, &settings, &drivers),
        )
        .watches(
            Api::<CSIDriver>::all(client),
            WatcherConfig::default(),
            move |csi_driver| csi_driver_to_driver(&csi_driver, &csi_namespace),
        )
        .run(reconcile_driver_wrapper, error_policy, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    Err(anyhow!("Driver controller for {namespace} stopped"))
}

async fn reconcile_driver_wrapper(
    driver: Arc<Driver>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    debug!(
        driver = %driver.name_any(),
        namespace = ?driver.namespace(),
        "Reconcile wrapper called for Driver"
    );

    let result = reconcile_driver(ctx, (*driver).clone()).await;
    record_outcome(KIND_DRIVER, start, result.as_ref().map(|_| ()));
    result?;

    info!("Successfully reconciled Driver: {}", driver.name_any());
    Ok(success_action())
}

// ============================================================================
// ClientProfile
// ============================================================================

/// Run the `ClientProfile` controller for `namespace`.
///
/// # Errors
///
/// Returns an error if the controller stream ends, which only happens on shutdown.
pub async fn run_client_profile_controller(ctx: Arc<Context>, namespace: String) -> Result<()> {
    info!(namespace = %namespace, "Starting ClientProfile controller");

    let client = ctx.client.clone();

    Controller::new(
        Api::<ClientProfile>::namespaced(client.clone(), &namespace),
        WatcherConfig::default(),
    )
    .watches(
        Api::<CephConnection>::namespaced(client.clone(), &namespace),
        WatcherConfig::default(),
        |connection| owners_of_kind::<ClientProfile>(&connection.metadata),
    )
    .watches(
        Api::<ConfigMap>::namespaced(client, &namespace),
        WatcherConfig::default().fields(&format!("metadata.name={CSI_CONFIG_MAP_NAME}")),
        |cm| owners_of_kind::<ClientProfile>(&cm.metadata),
    )
    .run(reconcile_client_profile_wrapper, error_policy, ctx)
    .for_each(|_| futures::future::ready(()))
    .await;

    Err(anyhow!("ClientProfile controller for {namespace} stopped"))
}

/// Finalizer-guarded `ClientProfile` reconcile.
///
/// `Apply` publishes the profile's record; `Cleanup` retracts it before the
/// finalizer is released.
async fn reconcile_client_profile_wrapper(
    profile: Arc<ClientProfile>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let namespace = profile
        .namespace()
        .ok_or_else(|| ReconcileError::from(anyhow!("{KIND_CLIENT_PROFILE} has no namespace")))?;
    let api: Api<ClientProfile> = Api::namespaced(ctx.client.clone(), &namespace);

    let result = finalizer(&api, CLEANUP_FINALIZER, profile, |event| async move {
        match event {
            finalizer::Event::Apply(profile) => {
                reconcile_client_profile(&ctx, &profile)
                    .await
                    .map_err(ReconcileError::from)?;
                info!("Successfully reconciled ClientProfile: {}", profile.name_any());
                Ok(success_action())
            }
            finalizer::Event::Cleanup(profile) => {
                cleanup_client_profile(&ctx, &profile)
                    .await
                    .map_err(ReconcileError::from)?;
                info!("Successfully cleaned up ClientProfile: {}", profile.name_any());
                Ok(Action::await_change())
            }
        }
    })
    .await
    .map_err(|e: finalizer::Error<ReconcileError>| match e {
        finalizer::Error::ApplyFailed(err) | finalizer::Error::CleanupFailed(err) => err,
        finalizer::Error::AddFinalizer(err) | finalizer::Error::RemoveFinalizer(err) => {
            ReconcileError::from(anyhow!("Finalizer error: {err}"))
        }
        finalizer::Error::UnnamedObject => {
            ReconcileError::from(anyhow!("{KIND_CLIENT_PROFILE} has no name"))
        }
        finalizer::Error::InvalidFinalizer => {
            ReconcileError::from(anyhow!("Invalid finalizer for {KIND_CLIENT_PROFILE}"))
        }
    });

    record_outcome(
        KIND_CLIENT_PROFILE,
        start,
        result.as_ref().map(|_| ()).map_err(|e| &e.0),
    );
    result
}

// ============================================================================
// ClientProfileMapping
// ============================================================================

/// Run the cluster-mapping aggregation for `namespace`.
///
/// The controller's primary object is the watched `Namespace` itself, which always exists.
/// Every `ClientProfileMapping` event of the namespace, deletes included, and every change
/// to the shared `ConfigMap` requeue one rebuild, which creates the `ConfigMap` when it is
/// missing.
///
/// # Errors
///
/// Returns an error if the controller stream ends, which only happens on shutdown.
pub async fn run_client_profile_mapping_controller(
    ctx: Arc<Context>,
    namespace: String,
) -> Result<()> {
    info!(namespace = %namespace, "Starting ClientProfileMapping controller");

    let client = ctx.client.clone();

    Controller::new(
        Api::<Namespace>::all(client.clone()),
        WatcherConfig::default().fields(&format!("metadata.name={namespace}")),
    )
    .watches(
        Api::<ClientProfileMapping>::namespaced(client.clone(), &namespace),
        WatcherConfig::default(),
        |mapping| namespace_of(&mapping.metadata),
    )
    .watches(
        Api::<ConfigMap>::namespaced(client, &namespace),
        WatcherConfig::default().fields(&format!("metadata.name={CSI_CONFIG_MAP_NAME}")),
        |config_map| namespace_of(&config_map.metadata),
    )
    .run(reconcile_client_profile_mappings_wrapper, error_policy, ctx)
    .for_each(|_| futures::future::ready(()))
    .await;

    Err(anyhow!("ClientProfileMapping controller for {namespace} stopped"))
}

async fn reconcile_client_profile_mappings_wrapper(
    namespace: Arc<Namespace>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let namespace = namespace.name_any();

    let result = reconcile_client_profile_mappings(&ctx, &namespace).await;
    record_outcome(
        KIND_CLIENT_PROFILE_MAPPING,
        start,
        result.as_ref().map(|_| ()),
    );
    result?;

    debug!(namespace = %namespace, "Cluster mappings up to date");
    Ok(success_action())
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod controller_tests;
