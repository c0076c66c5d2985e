// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Watch mappers: route events on related objects to the object that must be reconciled.
//!
//! Each function is the body of a `Controller::watches` mapper and is kept free of API
//! calls so it can be tested directly.

use crate::crd::{Driver, OperatorConfig};
use crate::csi_resources::OwnerKey;
use crate::settings::OperatorSettings;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::storage::v1::CSIDriver;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::runtime::reflector::{ObjectRef, Store};
use kube::{Resource, ResourceExt};

/// A change to the `OperatorConfig` singleton requeues every cached `Driver`.
///
/// Objects that are not the singleton (wrong name or namespace) map to nothing.
#[must_use]
pub fn operator_config_to_drivers(
    config: &OperatorConfig,
    settings: &OperatorSettings,
    drivers: &Store<Driver>,
) -> Vec<ObjectRef<Driver>> {
    let is_singleton = config.name_any() == settings.operator_config_name
        && config.namespace().as_deref() == Some(settings.operator_namespace.as_str());
    if !is_singleton {
        return Vec::new();
    }

    drivers
        .state()
        .iter()
        .map(|driver| ObjectRef::from_obj(driver.as_ref()))
        .collect()
}

/// Route a `CSIDriver` event to the `Driver` named in its owner annotation, when that
/// `Driver` lives in `namespace`.
#[must_use]
pub fn csi_driver_to_driver(csi_driver: &CSIDriver, namespace: &str) -> Option<ObjectRef<Driver>> {
    let owner = OwnerKey::from_annotations(csi_driver.annotations())?;
    (owner.namespace == namespace).then(|| ObjectRef::new(&owner.name).within(&owner.namespace))
}

/// Owners of kind `K` among the owner references of a namespaced object.
///
/// Matches on both kind and API version; the owners are assumed to share the object's
/// namespace, as Kubernetes requires for namespaced owners.
#[must_use]
pub fn owners_of_kind<K>(meta: &ObjectMeta) -> Vec<ObjectRef<K>>
where
    K: Resource<DynamicType = ()>,
{
    let Some(namespace) = meta.namespace.as_deref() else {
        return Vec::new();
    };
    let kind = K::kind(&());
    let api_version = K::api_version(&());

    meta.owner_references
        .iter()
        .flatten()
        .filter(|owner| owner.kind == kind && owner.api_version == api_version)
        .map(|owner| ObjectRef::new(&owner.name).within(namespace))
        .collect()
}

/// Any namespaced object maps to its own `Namespace`.
///
/// Cluster-mapping aggregation is keyed on the namespace, so mapping events (deletes
/// included) and changes to the shared `ConfigMap` all requeue the same rebuild.
#[must_use]
pub fn namespace_of(meta: &ObjectMeta) -> Option<ObjectRef<Namespace>> {
    meta.namespace.as_deref().map(ObjectRef::new)
}

#[cfg(test)]
#[path = "watches_tests.rs"]
mod watches_tests;
