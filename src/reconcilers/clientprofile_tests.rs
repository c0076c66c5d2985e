// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `clientprofile.rs`

#[cfg(test)]
mod tests {
    use crate::crd::{ClientProfile, ClientProfileSpec, RbdConfigSpec};
    use crate::errors::OperatorError;
    use crate::reconcilers::clientprofile::{cleanup_client_profile, reconcile_client_profile};
    use crate::reconcilers::test_helpers::{
        config_map_json, json_response, mock_context, not_found, requests_to, EchoReplaced,
        TEST_NAMESPACE,
    };
    use k8s_openapi::api::core::v1::LocalObjectReference;
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer};

    const CONNECTION_PATH: &str =
        "/apis/csi.ceph.io/v1/namespaces/ceph-csi/cephconnections/ceph-cluster-1";
    const CM_PATH: &str = "/api/v1/namespaces/ceph-csi/configmaps/ceph-csi-config";

    fn profile(connection: &str) -> ClientProfile {
        let mut profile = ClientProfile::new(
            "storage",
            ClientProfileSpec {
                ceph_connection_ref: LocalObjectReference {
                    name: connection.to_string(),
                },
                rbd: Some(RbdConfigSpec {
                    rados_namespace: Some("tenant-a".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        profile.metadata.namespace = Some(TEST_NAMESPACE.to_string());
        profile.metadata.uid = Some("profile-uid".to_string());
        profile
    }

    fn profile_owner() -> Value {
        json!({
            "apiVersion": "csi.ceph.io/v1",
            "kind": "ClientProfile",
            "name": "storage",
            "uid": "profile-uid",
        })
    }

    fn connection_json(owner_refs: Value) -> Value {
        json!({
            "apiVersion": "csi.ceph.io/v1",
            "kind": "CephConnection",
            "metadata": {
                "name": "ceph-cluster-1",
                "namespace": TEST_NAMESPACE,
                "uid": "connection-uid",
                "resourceVersion": "11",
                "ownerReferences": owner_refs,
            },
            "spec": {"monitors": ["10.0.0.1:6789"], "rbdMirrorDaemonCount": 2},
        })
    }

    #[tokio::test]
    async fn test_empty_connection_ref_is_rejected() {
        let server = MockServer::start().await;
        let ctx = mock_context(&server);

        let err = reconcile_client_profile(&ctx, &profile("")).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<OperatorError>(),
            Some(OperatorError::MissingCephConnectionRef { .. })
        ));
    }

    #[tokio::test]
    async fn test_apply_adds_owner_refs_and_upserts_record() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CONNECTION_PATH))
            .respond_with(json_response(200, connection_json(json!([]))))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(CONNECTION_PATH))
            .respond_with(EchoReplaced)
            .expect(1)
            .mount(&server)
            .await;
        let existing = r#"[{"clusterID":"other","monitors":["m"],"cephFS":{"kernelMountOptions":"","fuseMountOptions":""},"rbd":{},"nfs":{},"readAffinity":{}}]"#;
        Mock::given(method("GET"))
            .and(path(CM_PATH))
            .respond_with(json_response(
                200,
                config_map_json("ceph-csi-config", json!({"config.json": existing}), json!([])),
            ))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(CM_PATH))
            .respond_with(EchoReplaced)
            .expect(1)
            .mount(&server)
            .await;

        let ctx = mock_context(&server);
        reconcile_client_profile(&ctx, &profile("ceph-cluster-1")).await.unwrap();

        let connection_puts = requests_to(&server, "PUT", CONNECTION_PATH).await;
        let connection: Value = serde_json::from_slice(&connection_puts[0].body).unwrap();
        assert_eq!(connection["metadata"]["ownerReferences"][0]["uid"], "profile-uid");

        let cm_puts = requests_to(&server, "PUT", CM_PATH).await;
        let cm: Value = serde_json::from_slice(&cm_puts[0].body).unwrap();
        assert_eq!(cm["metadata"]["ownerReferences"], json!([profile_owner()]));
        let records: Value =
            serde_json::from_str(cm["data"]["config.json"].as_str().unwrap()).unwrap();
        assert_eq!(records[0]["clusterID"], "other");
        assert_eq!(records[1]["clusterID"], "storage");
        assert_eq!(records[1]["rbd"], json!({"radosNamespace": "tenant-a", "mirrorCount": 2}));
    }

    #[tokio::test]
    async fn test_apply_fails_without_connection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(not_found())
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(not_found())
            .expect(0)
            .mount(&server)
            .await;

        let ctx = mock_context(&server);
        let err = reconcile_client_profile(&ctx, &profile("ceph-cluster-1"))
            .await
            .unwrap_err();

        assert!(format!("{err:#}").contains("ceph-cluster-1"));
    }

    #[tokio::test]
    async fn test_cleanup_retracts_record_and_owner_refs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CONNECTION_PATH))
            .respond_with(json_response(200, connection_json(json!([profile_owner()]))))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(CONNECTION_PATH))
            .respond_with(EchoReplaced)
            .expect(1)
            .mount(&server)
            .await;
        let existing = r#"[{"clusterID":"storage","monitors":["10.0.0.1:6789"],"cephFS":{"kernelMountOptions":"","fuseMountOptions":""},"rbd":{},"nfs":{},"readAffinity":{}}]"#;
        Mock::given(method("GET"))
            .and(path(CM_PATH))
            .respond_with(json_response(
                200,
                config_map_json(
                    "ceph-csi-config",
                    json!({"config.json": existing}),
                    json!([profile_owner()]),
                ),
            ))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(CM_PATH))
            .respond_with(EchoReplaced)
            .expect(1)
            .mount(&server)
            .await;

        let ctx = mock_context(&server);
        cleanup_client_profile(&ctx, &profile("ceph-cluster-1")).await.unwrap();

        let cm_puts = requests_to(&server, "PUT", CM_PATH).await;
        let cm: Value = serde_json::from_slice(&cm_puts[0].body).unwrap();
        assert_eq!(cm["data"]["config.json"], "[]");
        assert!(cm["metadata"].get("ownerReferences").is_none());
    }

    #[tokio::test]
    async fn test_cleanup_tolerates_missing_objects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(not_found())
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(not_found())
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(not_found())
            .expect(0)
            .mount(&server)
            .await;

        let ctx = mock_context(&server);

        cleanup_client_profile(&ctx, &profile("ceph-cluster-1")).await.unwrap();
    }
}
