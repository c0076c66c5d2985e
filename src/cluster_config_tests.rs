// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `cluster_config.rs`

#[cfg(test)]
mod tests {
    use crate::cluster_config::*;
    use crate::crd::{
        CephConnection, CephConnectionSpec, CephFsConfigSpec, ClientProfile, ClientProfileMapping,
        ClientProfileMappingSpec, ClientProfileSpec, MappingsSpec, RbdConfigSpec,
        ReadAffinitySpec,
    };
    use crate::errors::OperatorError;
    use k8s_openapi::api::core::v1::LocalObjectReference;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn profile(name: &str, spec: ClientProfileSpec) -> ClientProfile {
        let mut profile = ClientProfile::new(name, spec);
        profile.metadata.namespace = Some("ceph-csi".to_string());
        profile
    }

    fn connection() -> CephConnection {
        CephConnection::new(
            "ceph-cluster-1",
            CephConnectionSpec {
                monitors: vec!["10.0.0.1:6789".to_string(), "10.0.0.2:6789".to_string()],
                read_affinity: None,
                rbd_mirror_daemon_count: Some(2),
            },
        )
    }

    fn connection_ref() -> LocalObjectReference {
        LocalObjectReference {
            name: "ceph-cluster-1".to_string(),
        }
    }

    fn mapping(name: &str, mappings: Vec<MappingsSpec>) -> ClientProfileMapping {
        ClientProfileMapping::new(name, ClientProfileMappingSpec { mappings })
    }

    fn pools(pairs: &[(&str, &str)]) -> Vec<Vec<String>> {
        pairs
            .iter()
            .map(|(l, r)| vec![(*l).to_string(), (*r).to_string()])
            .collect()
    }

    fn owner(uid: &str) -> OwnerReference {
        OwnerReference {
            api_version: "csi.ceph.io/v1".to_string(),
            kind: "ClientProfile".to_string(),
            name: "storage".to_string(),
            uid: uid.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_compose_full_record() {
        let profile = profile(
            "storage",
            ClientProfileSpec {
                ceph_connection_ref: connection_ref(),
                ceph_fs: Some(CephFsConfigSpec {
                    sub_volume_group: Some("csi".to_string()),
                    kernel_mount_options: Some(BTreeMap::from([
                        ("ms_mode".to_string(), "secure".to_string()),
                        ("noatime".to_string(), String::new()),
                    ])),
                    ..Default::default()
                }),
                rbd: Some(RbdConfigSpec {
                    rados_namespace: Some("tenant-a".to_string()),
                    ..Default::default()
                }),
                nfs: None,
            },
        );
        let mut conn = connection();
        conn.spec.read_affinity = Some(ReadAffinitySpec {
            crush_location_labels: vec!["topology.kubernetes.io/zone".to_string()],
        });

        let record = compose_cluster_info(&profile, &conn);
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(
            value,
            json!({
                "clusterID": "storage",
                "monitors": ["10.0.0.1:6789", "10.0.0.2:6789"],
                "cephFS": {
                    "subvolumeGroup": "csi",
                    "kernelMountOptions": "ms_mode=secure,noatime",
                    "fuseMountOptions": ""
                },
                "rbd": {"radosNamespace": "tenant-a", "mirrorCount": 2},
                "nfs": {},
                "readAffinity": {
                    "enabled": true,
                    "crushLocationLabels": ["topology.kubernetes.io/zone"]
                }
            })
        );
    }

    #[test]
    fn test_mirror_count_only_with_rbd() {
        let profile = profile(
            "fs-only",
            ClientProfileSpec {
                ceph_connection_ref: connection_ref(),
                ..Default::default()
            },
        );

        let record = compose_cluster_info(&profile, &connection());

        assert_eq!(record.rbd.mirror_count, 0);
        assert!(!record.read_affinity.enabled);
    }

    #[test]
    fn test_profile_lifecycle_against_empty_list() {
        let conn = connection();
        let first = compose_cluster_info(
            &profile(
                "a",
                ClientProfileSpec {
                    ceph_connection_ref: connection_ref(),
                    ..Default::default()
                },
            ),
            &conn,
        );

        let created = update_config_json("ceph-csi-config", None, "a", Some(first.clone())).unwrap();
        let records = parse_cluster_infos("ceph-csi-config", Some(&created)).unwrap();
        assert_eq!(records, vec![first.clone()]);

        let mut changed = first;
        changed.monitors = vec!["10.0.0.9:6789".to_string()];
        let updated =
            update_config_json("ceph-csi-config", Some(&created), "a", Some(changed.clone()))
                .unwrap();
        let records = parse_cluster_infos("ceph-csi-config", Some(&updated)).unwrap();
        assert_eq!(records, vec![changed]);

        let deleted = update_config_json("ceph-csi-config", Some(&updated), "a", None).unwrap();
        assert_eq!(deleted, "[]");
    }

    #[test]
    fn test_swap_remove_moves_last_record() {
        let mut records: Vec<ClusterInfo> = ["a", "b", "c"]
            .iter()
            .map(|id| ClusterInfo {
                cluster_id: (*id).to_string(),
                ..Default::default()
            })
            .collect();

        assert!(remove_cluster_info(&mut records, "a"));
        assert!(!remove_cluster_info(&mut records, "missing"));

        let ids: Vec<&str> = records.iter().map(|r| r.cluster_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let existing = r#"[{"clusterID":"other","monitors":["m"],"cephFS":{"kernelMountOptions":"","fuseMountOptions":""},"rbd":{},"nfs":{},"readAffinity":{},"futureField":{"x":1}}]"#;

        let updated = update_config_json(
            "ceph-csi-config",
            Some(existing),
            "new",
            Some(ClusterInfo {
                cluster_id: "new".to_string(),
                ..Default::default()
            }),
        )
        .unwrap();

        let value: serde_json::Value = serde_json::from_str(&updated).unwrap();
        assert_eq!(value[0]["futureField"], json!({"x": 1}));
        assert_eq!(value[1]["clusterID"], "new");
    }

    #[test]
    fn test_malformed_config_json_is_an_error() {
        let err = parse_cluster_infos("ceph-csi-config", Some("{not json")).unwrap_err();
        assert!(matches!(err, OperatorError::MalformedClusterConfig { .. }));

        assert!(parse_cluster_infos("ceph-csi-config", Some("  ")).unwrap().is_empty());
    }

    #[test]
    fn test_mapping_groups_and_dedups_pool_pairs() {
        let mappings = vec![
            mapping(
                "first",
                vec![MappingsSpec {
                    local_client_profile: "a".to_string(),
                    remote_client_profile: "b".to_string(),
                    block_pool_id_mapping: pools(&[("1", "2")]),
                }],
            ),
            mapping(
                "second",
                vec![MappingsSpec {
                    local_client_profile: "a".to_string(),
                    remote_client_profile: "b".to_string(),
                    block_pool_id_mapping: pools(&[("1", "2"), ("3", "4")]),
                }],
            ),
        ];

        let records = build_cluster_mappings(&mappings);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].cluster_id_mapping["a"], "b");
        assert_eq!(
            records[0].rbd_pool_id_mapping,
            vec![
                BTreeMap::from([("1".to_string(), "2".to_string())]),
                BTreeMap::from([("3".to_string(), "4".to_string())]),
            ]
        );
    }

    #[test]
    fn test_mapping_wire_format() {
        let mappings = vec![mapping(
            "m",
            vec![
                MappingsSpec {
                    local_client_profile: "a".to_string(),
                    remote_client_profile: "b".to_string(),
                    block_pool_id_mapping: pools(&[("1", "2")]),
                },
                MappingsSpec {
                    local_client_profile: "c".to_string(),
                    remote_client_profile: "d".to_string(),
                    block_pool_id_mapping: vec![vec!["only-one".to_string()]],
                },
            ],
        )];

        let rendered = serde_json::to_value(build_cluster_mappings(&mappings)).unwrap();

        assert_eq!(
            rendered,
            json!([
                {"clusterIdMapping": {"a": "b"}, "RBDPoolIDMapping": [{"1": "2"}]},
                {"clusterIdMapping": {"c": "d"}}
            ])
        );
        assert_eq!(
            serde_json::to_string(&build_cluster_mappings(&[])).unwrap(),
            "[]"
        );
    }

    #[test]
    fn test_toggle_owner_reference_by_uid() {
        let mut meta = ObjectMeta::default();

        assert!(toggle_owner_reference(&mut meta, &owner("uid-1"), true));
        assert!(!toggle_owner_reference(&mut meta, &owner("uid-1"), true));
        assert!(toggle_owner_reference(&mut meta, &owner("uid-2"), true));
        assert_eq!(meta.owner_references.as_ref().unwrap().len(), 2);

        assert!(toggle_owner_reference(&mut meta, &owner("uid-1"), false));
        assert!(!toggle_owner_reference(&mut meta, &owner("uid-1"), false));
        assert!(toggle_owner_reference(&mut meta, &owner("uid-2"), false));
        assert_eq!(meta.owner_references, None);
    }
}
