// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `csi_volumes.rs`

#[cfg(test)]
mod tests {
    use crate::csi_volumes::*;
    use k8s_openapi::api::core::v1::LocalObjectReference;
    use std::collections::BTreeMap;

    #[test]
    fn test_log_verbosity_is_clamped() {
        assert_eq!(log_verbosity_arg(-3), "--v=0");
        assert_eq!(log_verbosity_arg(2), "--v=2");
        assert_eq!(log_verbosity_arg(9), "--v=5");
    }

    #[test]
    fn test_type_arg_only_for_known_roles() {
        assert_eq!(type_arg("rbd").as_deref(), Some("--type=rbd"));
        assert_eq!(type_arg("liveness").as_deref(), Some("--type=liveness"));
        assert_eq!(type_arg("snapshotter"), None);
    }

    #[test]
    fn test_empty_values_yield_no_argument() {
        assert_eq!(leader_election_namespace_arg(""), None);
        assert_eq!(cluster_name_arg(""), None);
        assert_eq!(driver_name_arg(""), None);
        assert_eq!(set_metadata_arg(false), None);
        assert_eq!(kernel_mount_options_arg(Some(&BTreeMap::new())), None);
        assert_eq!(fuse_mount_options_arg(None), None);
        assert_eq!(domain_labels_arg(Some(&vec![])), None);
    }

    #[test]
    fn test_mount_options_rendering() {
        let options = BTreeMap::from([
            ("ms_mode".to_string(), "secure".to_string()),
            ("noatime".to_string(), String::new()),
            ("debug".to_string(), "1".to_string()),
        ]);

        assert_eq!(mount_options_to_string(&options), "debug=1,ms_mode=secure,noatime");
        assert_eq!(
            kernel_mount_options_arg(Some(&options)).as_deref(),
            Some("--kernelmountoptions=debug=1,ms_mode=secure,noatime")
        );
        assert_eq!(
            fuse_mount_options_arg(Some(&options)).as_deref(),
            Some("--fusemountoptions=debug=1,ms_mode=secure,noatime")
        );
    }

    #[test]
    fn test_kubelet_paths() {
        assert_eq!(
            kubelet_registration_path_arg("/var/lib/kubelet", "rbd.csi.ceph.com"),
            "--kubelet-registration-path=/var/lib/kubelet/plugins/rbd.csi.ceph.com/csi.sock"
        );
        assert_eq!(
            staging_path_arg("/var/lib/kubelet"),
            "--stagingpath=/var/lib/kubelet/plugins/kubernetes.io/csi/"
        );

        let plugin_dir = plugin_dir_volume("/var/lib/kubelet", "rbd.csi.ceph.com");
        let host_path = plugin_dir.host_path.unwrap();
        assert_eq!(host_path.path, "/var/lib/kubelet/plugins/rbd.csi.ceph.com");
        assert_eq!(host_path.type_.as_deref(), Some("DirectoryOrCreate"));
    }

    #[test]
    fn test_kms_volume_projects_config_json() {
        let volume = kms_config_volume(&LocalObjectReference {
            name: "kms-settings".to_string(),
        });

        assert_eq!(volume.name, "ceph-csi-kms-config");
        assert_eq!(volume.name, kms_config_mount().name);
        let cm = volume.config_map.unwrap();
        assert_eq!(cm.name, "kms-settings");
        let items = cm.items.unwrap();
        assert_eq!(items[0].key, "config.json");
        assert_eq!(items[0].path, "config.json");
    }

    #[test]
    fn test_bidirectional_mounts() {
        let mount = pods_mount_dir_mount("/var/lib/kubelet");
        assert_eq!(mount.mount_path, "/var/lib/kubelet/pods");
        assert_eq!(mount.mount_propagation.as_deref(), Some("Bidirectional"));
        assert_eq!(lib_modules_mount().read_only, Some(true));
        assert_eq!(socket_dir_mount().read_only, None);
    }

    #[test]
    fn test_field_ref_env() {
        let env = node_id_env();
        assert_eq!(env.name, "NODE_ID");
        assert_eq!(
            env.value_from.unwrap().field_ref.unwrap().field_path,
            "spec.nodeName"
        );
    }
}
