// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared fixtures for reconciler tests that talk to a mock API server.

use crate::context::Context;
use crate::settings::OperatorSettings;
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::{MockServer, Request, Respond, ResponseTemplate};

pub const TEST_NAMESPACE: &str = "ceph-csi";

/// A kube client pointed at `server`.
pub fn mock_client(server: &MockServer) -> kube::Client {
    let config = kube::Config::new(server.uri().parse().unwrap());
    kube::Client::try_from(config).unwrap()
}

pub fn test_settings() -> OperatorSettings {
    OperatorSettings {
        operator_namespace: TEST_NAMESPACE.to_string(),
        operator_config_name: "ceph-csi-operator-config".to_string(),
        watch_namespaces: vec![TEST_NAMESPACE.to_string()],
        service_account_prefix: String::new(),
    }
}

pub fn mock_context(server: &MockServer) -> Arc<Context> {
    Arc::new(Context::new(mock_client(server), test_settings()))
}

/// An API server `Status` failure response.
pub fn status_response(code: u16, reason: &str) -> ResponseTemplate {
    ResponseTemplate::new(code).set_body_json(json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Failure",
        "message": format!("{reason} ({code})"),
        "reason": reason,
        "code": code,
    }))
}

pub fn not_found() -> ResponseTemplate {
    status_response(404, "NotFound")
}

/// A successful response echoing `body`.
pub fn json_response(code: u16, body: Value) -> ResponseTemplate {
    ResponseTemplate::new(code).set_body_json(body)
}

/// A `ConfigMap` as the API server would return it.
pub fn config_map_json(name: &str, data: Value, owner_refs: Value) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {
            "name": name,
            "namespace": TEST_NAMESPACE,
            "resourceVersion": "7",
            "uid": format!("{name}-uid"),
            "ownerReferences": owner_refs,
        },
        "data": data,
    })
}

/// Responds to a create with the submitted object, as the API server would.
pub struct EchoCreated;

impl Respond for EchoCreated {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        ResponseTemplate::new(201).set_body_raw(request.body.clone(), "application/json")
    }
}

/// Responds to a replace with the submitted object.
pub struct EchoReplaced;

impl Respond for EchoReplaced {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(request.body.clone(), "application/json")
    }
}

/// Requests received by `server` with the given method and path.
pub async fn requests_to(server: &MockServer, http_method: &str, url_path: &str) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.as_str() == http_method && r.url.path() == url_path)
        .collect()
}
