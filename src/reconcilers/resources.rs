// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Generic read-modify-write helpers for child resources.
//!
//! Every object the operator owns is written through [`create_or_update`]: the current
//! object is read (or started from an empty one), mutated in place by a closure, and
//! written back only when the mutation changed something. Updates are full replaces
//! carrying the `resourceVersion` that was read, so a concurrent writer makes the API
//! server reject the update with a conflict instead of losing data.
//!
//! # Example
//!
//! ```rust,no_run
//! use ceph_csi_operator::reconcilers::resources::create_or_update;
//! use k8s_openapi::api::core::v1::ConfigMap;
//! use kube::{Api, Client};
//!
//! async fn example(client: Client) -> anyhow::Result<()> {
//!     let api: Api<ConfigMap> = Api::namespaced(client, "ceph-csi");
//!     create_or_update(&api, "ceph-csi-config", |cm| {
//!         cm.data.get_or_insert_with(Default::default);
//!         Ok(())
//!     })
//!     .await?;
//!     Ok(())
//! }
//! ```

use crate::constants::FIELD_MANAGER;
use crate::errors::is_not_found;
use anyhow::{Context as _, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{DeleteParams, PostParams};
use kube::{Api, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::{debug, info};

/// Outcome of [`create_or_update`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationResult {
    /// The object existed and the mutation left it unchanged; nothing was written.
    Unchanged,
    /// The object did not exist and was created.
    Created,
    /// The object existed and was replaced.
    Updated,
}

impl OperationResult {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::Created => "created",
            Self::Updated => "updated",
        }
    }
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    }
}

/// Create or update the object `name` through `api`.
///
/// `mutate` receives the current object, or an empty one carrying only its name when it
/// does not exist yet, and edits it towards the desired state. The object is compared
/// before and after the call; when it is unchanged no request is sent.
///
/// Returns the object as stored by the API server (or as read, when unchanged).
///
/// # Errors
///
/// Returns an error if `mutate` fails, or if the read, create or replace request fails.
/// A replace that races with another writer fails with HTTP 409.
pub async fn create_or_update<K, F>(api: &Api<K>, name: &str, mutate: F) -> Result<(K, OperationResult)>
where
    K: Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Default,
    F: FnOnce(&mut K) -> Result<()>,
{
    let kind = K::kind(&());
    let existing = api
        .get_opt(name)
        .await
        .with_context(|| format!("failed to read {kind} {name}"))?;

    let Some(current) = existing else {
        let mut object = K::default();
        object.meta_mut().name = Some(name.to_string());
        mutate(&mut object)?;

        let created = api
            .create(&post_params(), &object)
            .await
            .with_context(|| format!("failed to create {kind} {name}"))?;
        info!(kind = %kind, name = %name, "Created");
        crate::metrics::record_object_created(&kind);
        return Ok((created, OperationResult::Created));
    };

    let before = serde_json::to_value(&current)?;
    let mut object = current.clone();
    mutate(&mut object)?;

    if serde_json::to_value(&object)? == before {
        debug!(kind = %kind, name = %name, "Unchanged");
        return Ok((current, OperationResult::Unchanged));
    }

    let updated = api
        .replace(name, &post_params(), &object)
        .await
        .with_context(|| format!("failed to update {kind} {name}"))?;
    info!(kind = %kind, name = %name, "Updated");
    crate::metrics::record_object_updated(&kind);
    Ok((updated, OperationResult::Updated))
}

/// Create `object` unconditionally.
///
/// # Errors
///
/// Returns an error if the object has no name or the create request fails.
pub async fn create<K>(api: &Api<K>, object: &K) -> Result<K>
where
    K: Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned,
{
    let kind = K::kind(&());
    let name = object
        .meta()
        .name
        .clone()
        .ok_or_else(|| anyhow::anyhow!("{kind} must have a name"))?;
    let created = api
        .create(&post_params(), object)
        .await
        .with_context(|| format!("failed to create {kind} {name}"))?;
    info!(kind = %kind, name = %name, "Created");
    crate::metrics::record_object_created(&kind);
    Ok(created)
}

/// Delete the object `name`, ignoring a missing object.
///
/// Returns `true` if a delete was issued for an existing object.
///
/// # Errors
///
/// Returns an error for any API failure other than HTTP 404.
pub async fn delete_if_exists<K>(api: &Api<K>, name: &str) -> Result<bool>
where
    K: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned,
{
    let kind = K::kind(&());
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => {
            info!(kind = %kind, name = %name, "Deleted");
            crate::metrics::record_object_deleted(&kind);
            Ok(true)
        }
        Err(e) if is_not_found(&e) => {
            debug!(kind = %kind, name = %name, "Already absent");
            Ok(false)
        }
        Err(e) => Err(anyhow::Error::new(e).context(format!("failed to delete {kind} {name}"))),
    }
}

/// Overlay the operator-managed parts of `desired` onto `dest`.
///
/// Labels and annotations from `desired` are inserted, leaving other keys set by users
/// or other controllers alone. Owner references are added when no reference with the
/// same UID exists.
pub fn merge_metadata(dest: &mut ObjectMeta, desired: &ObjectMeta) {
    if let Some(labels) = &desired.labels {
        dest.labels
            .get_or_insert_with(Default::default)
            .extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    if let Some(annotations) = &desired.annotations {
        dest.annotations
            .get_or_insert_with(Default::default)
            .extend(annotations.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    if let Some(owners) = &desired.owner_references {
        let refs = dest.owner_references.get_or_insert_with(Vec::new);
        for owner in owners {
            match refs.iter_mut().find(|r| r.uid == owner.uid) {
                Some(existing) => *existing = owner.clone(),
                None => refs.push(owner.clone()),
            }
        }
    }
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod resources_tests;
