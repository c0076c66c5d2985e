// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # Ceph CSI Operator for Kubernetes
//!
//! A Kubernetes operator that deploys and configures Ceph CSI drivers (RBD, CephFS and
//! NFS) from a small set of Custom Resource Definitions.
//!
//! ## Overview
//!
//! This library provides the core functionality of the operator:
//!
//! - Custom Resource Definitions for drivers, operator defaults and Ceph cluster access
//! - Layering of a `Driver` spec over the operator-wide defaults
//! - Rendering of the driver's Deployment, DaemonSet, `CSIDriver` and supporting objects
//! - Aggregation of `ClientProfile` and `ClientProfileMapping` objects into the shared
//!   `ceph-csi-config` `ConfigMap` read by the drivers
//!
//! ## Modules
//!
//! - [`crd`] - Custom Resource Definition types
//! - [`merge`] - Layering of `DriverSpec` defaults and image sets
//! - [`csi_resources`] / [`csi_volumes`] - Desired child objects of a `Driver`
//! - [`cluster_config`] - `config.json` and `cluster-mapping.json` documents
//! - [`reconcilers`] - Reconciliation logic for each resource type
//! - [`controller`] / [`watches`] - Controller wiring and watch mappers
//! - [`context`] / [`settings`] - Shared controller state and environment settings
//! - [`metrics`] / [`server`] - Prometheus metrics and probe endpoints
//!
//! ## Example
//!
//! ```rust,no_run
//! use ceph_csi_operator::crd::{DriverSpec, OperatorConfigSpec};
//! use ceph_csi_operator::merge::resolve_driver_spec;
//!
//! let defaults = OperatorConfigSpec {
//!     driver_spec_defaults: Some(DriverSpec {
//!         grpc_timeout: Some(60),
//!         ..Default::default()
//!     }),
//!     ..Default::default()
//! };
//!
//! let driver = DriverSpec {
//!     attach_required: Some(false),
//!     ..Default::default()
//! };
//!
//! let resolved = resolve_driver_spec(&driver, defaults.driver_spec_defaults.as_ref());
//! assert_eq!(resolved.grpc_timeout, Some(60));
//! ```

pub mod cluster_config;
pub mod constants;
pub mod context;
pub mod controller;
pub mod crd;
pub mod csi_resources;
pub mod csi_volumes;
pub mod driver_type;
pub mod errors;
pub mod labels;
pub mod merge;
pub mod metrics;
pub mod reconcilers;
pub mod server;
pub mod settings;
pub mod status_reasons;
pub mod watches;
