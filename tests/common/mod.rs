// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

// Common test utilities for integration tests

#![allow(dead_code)]

use kube::{
    api::{Api, DeleteParams, PostParams},
    client::Client,
    Resource,
};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::time::Duration;
use tokio::time::sleep;

/// Namespace watched by the operator under test.
pub fn test_namespace() -> String {
    std::env::var("CEPH_CSI_TEST_NAMESPACE").unwrap_or_else(|_| "ceph-csi".to_string())
}

/// Get a Kubernetes client or skip the test if not in a cluster
pub async fn get_kube_client_or_skip() -> Option<Client> {
    match Client::try_default().await {
        Ok(client) => {
            println!("✓ Successfully connected to Kubernetes cluster");
            Some(client)
        }
        Err(e) => {
            eprintln!("⊘ Skipping integration test: not running in Kubernetes cluster: {e}");
            None
        }
    }
}

/// Create an object, treating "already exists" as success
pub async fn create_or_skip<K>(api: &Api<K>, obj: &K) -> Result<(), Box<dyn std::error::Error>>
where
    K: Resource + Clone + DeserializeOwned + serde::Serialize + Debug,
{
    let name = obj.meta().name.clone().unwrap_or_default();
    match api.create(&PostParams::default(), obj).await {
        Ok(_) => {
            println!("✓ Created {name}");
            Ok(())
        }
        Err(kube::Error::Api(ae)) if ae.code == 409 => {
            println!("  {name} already exists");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

/// Delete an object, treating "not found" as success
pub async fn delete_quietly<K>(api: &Api<K>, name: &str)
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => println!("✓ Deleted {name}"),
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            println!("  {name} already deleted");
        }
        Err(e) => eprintln!("⚠ Failed to delete {name}: {e}"),
    }
}

/// Poll `api` for `name` until `ready` accepts it or the timeout expires
pub async fn wait_for<K, F>(api: &Api<K>, name: &str, timeout_secs: u64, ready: F) -> Option<K>
where
    K: Resource + Clone + DeserializeOwned + Debug,
    F: Fn(&K) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_secs);
    while tokio::time::Instant::now() < deadline {
        if let Ok(Some(obj)) = api.get_opt(name).await {
            if ready(&obj) {
                return Some(obj);
            }
        }
        sleep(Duration::from_secs(2)).await;
    }
    None
}
