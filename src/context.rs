// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for all controllers.
//!
//! Every controller receives an `Arc<Context>` holding:
//! - the Kubernetes client
//! - the immutable [`OperatorSettings`] read at startup
//! - the lock that serializes writes to the shared `ceph-csi-config` `ConfigMap`

use crate::settings::OperatorSettings;
use kube::Client;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Shared context passed to all controllers.
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client for API operations
    pub client: Client,

    /// Process settings from the environment
    pub settings: OperatorSettings,

    /// Critical section around read-modify-write of the shared `ceph-csi-config`
    /// `ConfigMap`. The Driver, `ClientProfile` and `ClientProfileMapping` reconcilers
    /// all write to it.
    pub csi_config_lock: Arc<Mutex<()>>,
}

impl Context {
    #[must_use]
    pub fn new(client: Client, settings: OperatorSettings) -> Self {
        Self {
            client,
            settings,
            csi_config_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Enter the shared `ConfigMap` critical section. The lock is released when the
    /// guard is dropped.
    pub async fn lock_csi_config(&self) -> MutexGuard<'_, ()> {
        self.csi_config_lock.lock().await
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
