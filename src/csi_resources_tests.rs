// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `csi_resources.rs`

#[cfg(test)]
mod tests {
    use crate::crd::{
        CephFsClientType, ControllerPluginSpec, Driver, DriverSpec, LeaderElectionSpec,
        LivenessSpec, LogRotationSpec, LogSpec, NodePluginSpec, Periodicity, PodCommonSpec, SnapshotPolicy,
    };
    use crate::csi_resources::*;
    use crate::driver_type::DriverType;
    use crate::errors::OperatorError;
    use crate::merge::{default_images, resolve_driver_spec};
    use k8s_openapi::api::core::v1::{
        Affinity, Container, PodAffinityTerm, PodAntiAffinity, PodSpec,
    };
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
    use std::collections::BTreeMap;

    const NAMESPACE: &str = "ceph-csi";

    fn driver(name: &str, spec: DriverSpec) -> Driver {
        let mut driver = Driver::new(name, spec);
        driver.metadata.namespace = Some(NAMESPACE.to_string());
        driver.metadata.uid = Some("0b7c6f1e-uid".to_string());
        driver
    }

    /// Render with the spec resolved against the compiled-in defaults.
    fn render<T>(
        driver: &Driver,
        build: impl Fn(&DesiredState<'_>) -> T,
    ) -> T {
        let resolved = resolve_driver_spec(&driver.spec, None);
        let images = default_images();
        let driver_type = DriverType::from_driver_name(&driver.metadata.name.clone().unwrap())
            .unwrap();
        let state = DesiredState {
            driver,
            spec: &resolved,
            driver_type,
            images: &images,
            service_account_prefix: "ceph-csi-",
        };
        build(&state)
    }

    fn pod_spec_of_deployment(driver: &Driver) -> PodSpec {
        render(driver, build_controller_deployment)
            .unwrap()
            .spec
            .unwrap()
            .template
            .spec
            .unwrap()
    }

    fn pod_spec_of_daemonset(driver: &Driver) -> PodSpec {
        render(driver, build_node_daemonset)
            .unwrap()
            .spec
            .unwrap()
            .template
            .spec
            .unwrap()
    }

    fn names(containers: &[Container]) -> Vec<&str> {
        containers.iter().map(|c| c.name.as_str()).collect()
    }

    fn args_of<'a>(containers: &'a [Container], name: &str) -> &'a Vec<String> {
        containers
            .iter()
            .find(|c| c.name == name)
            .and_then(|c| c.args.as_ref())
            .unwrap()
    }

    fn rotation() -> LogSpec {
        LogSpec {
            verbosity: Some(2),
            rotation: Some(LogRotationSpec {
                max_files: Some(5),
                max_log_size: Some(Quantity("10Mi".to_string())),
                periodicity: Some(Periodicity::Daily),
                log_host_path: None,
            }),
        }
    }

    #[test]
    fn test_rbd_controller_deployment_defaults() {
        let driver = driver("test.rbd.csi.ceph.com", DriverSpec::default());
        let deployment = render(&driver, build_controller_deployment).unwrap();

        assert_eq!(
            deployment.metadata.name.as_deref(),
            Some("test.rbd.csi.ceph.com-ctrlplugin")
        );
        assert_eq!(deployment.metadata.namespace.as_deref(), Some(NAMESPACE));
        let owner = &deployment.metadata.owner_references.as_ref().unwrap()[0];
        assert_eq!(owner.kind, "Driver");
        assert_eq!(owner.controller, Some(true));

        let spec = deployment.spec.unwrap();
        assert_eq!(spec.replicas, Some(2));
        let pod = spec.template.spec.unwrap();
        assert_eq!(
            names(&pod.containers),
            vec![
                "csi-rbdplugin",
                "csi-provisioner",
                "csi-resizer",
                "csi-attacher",
                "csi-snapshotter"
            ]
        );
        assert_eq!(
            pod.service_account_name.as_deref(),
            Some("ceph-csi-rbd-ctrlplugin-sa")
        );

        let plugin_args = args_of(&pod.containers, "csi-rbdplugin");
        assert!(plugin_args.contains(&"--type=rbd".to_string()));
        assert!(plugin_args.contains(&"--controllerserver=true".to_string()));
        assert!(plugin_args.contains(&"--drivername=test.rbd.csi.ceph.com".to_string()));

        let provisioner = args_of(&pod.containers, "csi-provisioner");
        assert!(provisioner.contains(&"--leader-election-namespace=ceph-csi".to_string()));
        assert!(provisioner.contains(&"--timeout=150s".to_string()));
        assert!(provisioner.contains(&"--immediate-topology=false".to_string()));
        assert_eq!(
            provisioner.iter().filter(|a| a.starts_with("--default-fstype")).count(),
            1
        );

        let volumes: Vec<&str> = pod
            .volumes
            .as_ref()
            .unwrap()
            .iter()
            .map(|v| v.name.as_str())
            .collect();
        assert!(volumes.contains(&"oidc-token"));
        assert!(!volumes.contains(&"logs-dir"));
    }

    #[test]
    fn test_partial_leader_election_renders_default_timings() {
        let driver = driver(
            "test.rbd.csi.ceph.com",
            DriverSpec {
                leader_election: Some(LeaderElectionSpec {
                    lease_duration: Some(60),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        let pod = pod_spec_of_deployment(&driver);

        let provisioner = args_of(&pod.containers, "csi-provisioner");
        assert!(provisioner.contains(&"--leader-election-lease-duration=60s".to_string()));
        assert!(provisioner.contains(&"--leader-election-renew-deadline=107s".to_string()));
        assert!(provisioner.contains(&"--leader-election-retry-period=26s".to_string()));
        assert!(!provisioner.iter().any(|a| a.ends_with("=0s")));
    }

    #[test]
    fn test_controller_sidecars_follow_spec_toggles() {
        let driver = driver(
            "test.rbd.csi.ceph.com",
            DriverSpec {
                deploy_csi_addons: Some(true),
                generate_omap_info: Some(true),
                snapshot_policy: Some(SnapshotPolicy::VolumeGroupSnapshot),
                liveness: Some(LivenessSpec { metrics_port: 8680 }),
                log: Some(rotation()),
                ..Default::default()
            },
        );
        let pod = pod_spec_of_deployment(&driver);

        assert_eq!(
            names(&pod.containers),
            vec![
                "csi-rbdplugin",
                "csi-provisioner",
                "csi-resizer",
                "csi-attacher",
                "csi-snapshotter",
                "csi-addons",
                "csi-omap-generator",
                "liveness-prometheus",
                "log-rotator"
            ]
        );
        assert!(args_of(&pod.containers, "csi-snapshotter")
            .contains(&"--enable-volume-group-snapshots=true".to_string()));
        assert!(args_of(&pod.containers, "csi-addons")
            .contains(&"--controller-port=9070".to_string()));
        assert!(args_of(&pod.containers, "liveness-prometheus")
            .contains(&"--metricsport=8680".to_string()));
        assert!(args_of(&pod.containers, "csi-rbdplugin")
            .contains(&"--log_file=csi-logs/csi-rbdplugin.log".to_string()));

        let volumes: Vec<&str> = pod
            .volumes
            .as_ref()
            .unwrap()
            .iter()
            .map(|v| v.name.as_str())
            .collect();
        assert!(volumes.contains(&"logs-dir"));
        assert!(volumes.contains(&"log-rotate-dir"));
    }

    #[test]
    fn test_nfs_controller_skips_rbd_only_sidecars() {
        let driver = driver(
            "nfs.csi.ceph.com",
            DriverSpec {
                deploy_csi_addons: Some(true),
                snapshot_policy: Some(SnapshotPolicy::None),
                ..Default::default()
            },
        );
        let pod = pod_spec_of_deployment(&driver);

        assert_eq!(
            names(&pod.containers),
            vec!["csi-nfsplugin", "csi-provisioner", "csi-resizer", "csi-attacher"]
        );
        assert!(!args_of(&pod.containers, "csi-provisioner")
            .contains(&"--extra-create-metadata=true".to_string()));
    }

    #[test]
    fn test_cephfs_addons_port_and_kernel_client() {
        let driver = driver(
            "cephfs.csi.ceph.com",
            DriverSpec {
                deploy_csi_addons: Some(true),
                ceph_fs_client_type: Some(CephFsClientType::Kernel),
                kernel_mount_options: Some(BTreeMap::from([(
                    "ms_mode".to_string(),
                    "secure".to_string(),
                )])),
                ..Default::default()
            },
        );

        let controller = pod_spec_of_deployment(&driver);
        assert!(args_of(&controller.containers, "csi-addons")
            .contains(&"--controller-port=9080".to_string()));
        assert!(args_of(&controller.containers, "csi-cephfsplugin")
            .contains(&"--forcecephkernelclient=true".to_string()));

        let node = pod_spec_of_daemonset(&driver);
        let plugin_args = args_of(&node.containers, "csi-cephfsplugin");
        assert!(plugin_args.contains(&"--kernelmountoptions=ms_mode=secure".to_string()));
        assert!(!plugin_args.iter().any(|a| a.starts_with("--stagingpath")));
        assert_eq!(names(&node.containers), vec!["csi-cephfsplugin", "driver-registrar"]);
        assert_eq!(node.host_pid, None);
    }

    #[test]
    fn test_rbd_node_daemonset() {
        let driver = driver(
            "test.rbd.csi.ceph.com",
            DriverSpec {
                deploy_csi_addons: Some(true),
                liveness: Some(LivenessSpec { metrics_port: 8680 }),
                node_plugin: Some(NodePluginSpec {
                    kubelet_dir_path: Some("/data/kubelet".to_string()),
                    enable_se_linux_host_mount: Some(true),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        let daemonset = render(&driver, build_node_daemonset).unwrap();
        assert_eq!(
            daemonset.metadata.name.as_deref(),
            Some("test.rbd.csi.ceph.com-nodeplugin")
        );

        let template = daemonset.spec.unwrap().template;
        let labels = template.metadata.unwrap().labels.unwrap();
        assert_eq!(labels["app"], "test.rbd.csi.ceph.com-nodeplugin");
        assert_eq!(labels["contains"], "test.rbd.csi.ceph.com-nodeplugin-metrics");

        let pod = template.spec.unwrap();
        assert_eq!(pod.host_network, Some(true));
        assert_eq!(pod.host_pid, Some(true));
        assert_eq!(pod.dns_policy.as_deref(), Some("ClusterFirstWithHostNet"));
        assert_eq!(
            names(&pod.containers),
            vec!["csi-rbdplugin", "driver-registrar", "csi-addons", "liveness-prometheus"]
        );

        let plugin = &pod.containers[0];
        let sc = plugin.security_context.as_ref().unwrap();
        assert_eq!(sc.privileged, Some(true));
        assert_eq!(
            sc.capabilities.as_ref().unwrap().add.as_deref(),
            Some(&["SYS_ADMIN".to_string()][..])
        );
        assert!(plugin
            .args
            .as_ref()
            .unwrap()
            .contains(&"--stagingpath=/data/kubelet/plugins/kubernetes.io/csi/".to_string()));
        assert!(args_of(&pod.containers, "driver-registrar").contains(
            &"--kubelet-registration-path=/data/kubelet/plugins/test.rbd.csi.ceph.com/csi.sock"
                .to_string()
        ));
        assert!(args_of(&pod.containers, "csi-addons")
            .contains(&"--controller-port=9071".to_string()));

        let volumes: Vec<&str> = pod
            .volumes
            .as_ref()
            .unwrap()
            .iter()
            .map(|v| v.name.as_str())
            .collect();
        assert!(volumes.contains(&"etc-selinux"));
        assert!(volumes.contains(&"registration-dir"));
    }

    #[test]
    fn test_user_pod_settings_are_applied() {
        let driver = driver(
            "rbd.csi.ceph.com",
            DriverSpec {
                controller_plugin: Some(ControllerPluginSpec {
                    pod_common: PodCommonSpec {
                        service_account_name: Some("custom-sa".to_string()),
                        labels: Some(BTreeMap::from([
                            ("team".to_string(), "storage".to_string()),
                            ("app".to_string(), "overridden".to_string()),
                        ])),
                        image_pull_policy: Some("Always".to_string()),
                        ..Default::default()
                    },
                    replicas: Some(1),
                    host_network: Some(true),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        let deployment = render(&driver, build_controller_deployment).unwrap();
        let spec = deployment.spec.unwrap();
        assert_eq!(spec.replicas, Some(1));

        let labels = spec.template.metadata.unwrap().labels.unwrap();
        assert_eq!(labels["team"], "storage");
        assert_eq!(labels["app"], "rbd.csi.ceph.com-ctrlplugin");

        let pod = spec.template.spec.unwrap();
        assert_eq!(pod.service_account_name.as_deref(), Some("custom-sa"));
        assert_eq!(pod.host_network, Some(true));
        assert!(pod
            .containers
            .iter()
            .all(|c| c.image_pull_policy.as_deref() == Some("Always")));
    }

    #[test]
    fn test_controller_anti_affinity() {
        let selector = LabelSelector {
            match_labels: Some(BTreeMap::from([("app".to_string(), "x".to_string())])),
            ..Default::default()
        };

        let generated = controller_pod_affinity(None, &selector);
        let term = &generated
            .pod_anti_affinity
            .unwrap()
            .required_during_scheduling_ignored_during_execution
            .unwrap()[0];
        assert_eq!(term.topology_key, "kubernetes.io/hostname");
        assert_eq!(term.label_selector.as_ref(), Some(&selector));

        let user = Affinity {
            pod_anti_affinity: Some(PodAntiAffinity {
                required_during_scheduling_ignored_during_execution: Some(vec![PodAffinityTerm {
                    topology_key: "topology.kubernetes.io/zone".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(controller_pod_affinity(Some(&user), &selector), user);
    }

    #[test]
    fn test_missing_image_is_reported() {
        let driver = driver("rbd.csi.ceph.com", DriverSpec::default());
        let resolved = resolve_driver_spec(&driver.spec, None);
        let mut images = default_images();
        images.remove("resizer");
        let state = DesiredState {
            driver: &driver,
            spec: &resolved,
            driver_type: DriverType::Rbd,
            images: &images,
            service_account_prefix: "",
        };

        assert_eq!(
            build_controller_deployment(&state).unwrap_err(),
            OperatorError::MissingImage {
                role: "resizer".to_string()
            }
        );
    }

    #[test]
    fn test_builders_are_deterministic() {
        let driver = driver(
            "test.rbd.csi.ceph.com",
            DriverSpec {
                deploy_csi_addons: Some(true),
                log: Some(rotation()),
                liveness: Some(LivenessSpec { metrics_port: 8680 }),
                ..Default::default()
            },
        );

        let first = render(&driver, |s| {
            serde_json::to_string(&(
                build_controller_deployment(s).unwrap(),
                build_node_daemonset(s).unwrap(),
                build_liveness_service(s),
                build_log_rotate_config_map(s).unwrap(),
                build_csi_driver(s).unwrap(),
            ))
            .unwrap()
        });
        let second = render(&driver, |s| {
            serde_json::to_string(&(
                build_controller_deployment(s).unwrap(),
                build_node_daemonset(s).unwrap(),
                build_liveness_service(s),
                build_log_rotate_config_map(s).unwrap(),
                build_csi_driver(s).unwrap(),
            ))
            .unwrap()
        });

        assert_eq!(first, second);
    }

    #[test]
    fn test_liveness_service() {
        let without = driver("rbd.csi.ceph.com", DriverSpec::default());
        assert!(render(&without, build_liveness_service).is_none());

        let with = driver(
            "my_cluster.rbd.csi.ceph.com",
            DriverSpec {
                liveness: Some(LivenessSpec { metrics_port: 8680 }),
                ..Default::default()
            },
        );
        let service = render(&with, build_liveness_service).unwrap();

        assert_eq!(
            service.metadata.name.as_deref(),
            Some("my-cluster-rbd-csi-ceph-com-liveness")
        );
        let spec = service.spec.unwrap();
        let port = &spec.ports.unwrap()[0];
        assert_eq!(port.port, 8080);
        assert_eq!(port.name.as_deref(), Some("csi-http-metrics"));
        assert_eq!(
            spec.selector.unwrap()["contains"],
            "my_cluster.rbd.csi.ceph.com-nodeplugin-metrics"
        );
    }

    #[test]
    fn test_service_name_sanitization() {
        assert_eq!(service_name("a.B_c", "svc"), "a---c-svc");
        assert_eq!(liveness_service_name("rbd.csi.ceph.com"), "rbd-csi-ceph-com-liveness");
    }

    #[test]
    fn test_log_rotate_config_rendering() {
        let rendered = render_log_rotate_config(&rotation().rotation.unwrap()).unwrap();

        assert_eq!(
            rendered,
            "/csi-logs/*.log {\n\tmissingok\n\tcompress\n\tcopytruncate\n\tnotifempty\n\trotate 5\n\tdaily\n\tmaxsize 10Mi\n}\n"
        );

        let size_only = render_log_rotate_config(&LogRotationSpec {
            max_log_size: Some(Quantity("1G".to_string())),
            ..Default::default()
        })
        .unwrap();
        assert!(size_only.contains("\trotate 7\n"));
        assert!(size_only.contains("\tmaxsize 1G\n"));
    }

    #[test]
    fn test_log_rotate_config_rejects_incomplete_settings() {
        let periodicity_only = LogRotationSpec {
            periodicity: Some(Periodicity::Weekly),
            max_log_size: Some(Quantity("0".to_string())),
            ..Default::default()
        };
        assert!(matches!(
            render_log_rotate_config(&periodicity_only),
            Err(OperatorError::InvalidLogRotation { .. })
        ));
        assert!(matches!(
            render_log_rotate_config(&LogRotationSpec::default()),
            Err(OperatorError::InvalidLogRotation { .. })
        ));
    }

    #[test]
    fn test_log_rotate_config_map() {
        let without = driver("rbd.csi.ceph.com", DriverSpec::default());
        assert_eq!(render(&without, build_log_rotate_config_map).unwrap(), None);

        let with = driver(
            "rbd.csi.ceph.com",
            DriverSpec {
                log: Some(rotation()),
                ..Default::default()
            },
        );
        let cm = render(&with, build_log_rotate_config_map).unwrap().unwrap();
        assert_eq!(cm.metadata.name.as_deref(), Some("rbd.csi.ceph.com-logrotate-config"));
        assert!(cm.data.unwrap().contains_key("csi"));
    }

    #[test]
    fn test_csi_driver_object() {
        let driver = driver(
            "cephfs.csi.ceph.com",
            DriverSpec {
                attach_required: Some(false),
                node_plugin: Some(NodePluginSpec {
                    enable_se_linux_host_mount: Some(true),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        let csi_driver = render(&driver, build_csi_driver).unwrap();

        assert_eq!(csi_driver.metadata.name.as_deref(), Some("cephfs.csi.ceph.com"));
        assert_eq!(csi_driver.metadata.namespace, None);
        assert!(csi_driver.metadata.owner_references.is_none());
        assert_eq!(csi_driver.spec.attach_required, Some(false));
        assert_eq!(csi_driver.spec.pod_info_on_mount, Some(false));
        assert_eq!(csi_driver.spec.fs_group_policy.as_deref(), Some("File"));
        assert_eq!(csi_driver.spec.se_linux_mount, Some(true));

        let owner = OwnerKey::from_annotations(&csi_driver.metadata.annotations.unwrap()).unwrap();
        assert_eq!(
            owner,
            OwnerKey {
                namespace: NAMESPACE.to_string(),
                name: "cephfs.csi.ceph.com".to_string()
            }
        );
    }

    #[test]
    fn test_owner_key_accepts_capitalized_fields() {
        let annotations = BTreeMap::from([(
            "csi.ceph.io/ownerref".to_string(),
            r#"{"Namespace":"ns","Name":"rbd.csi.ceph.com"}"#.to_string(),
        )]);
        let owner = OwnerKey::from_annotations(&annotations).unwrap();
        assert_eq!(owner.to_string(), "ns/rbd.csi.ceph.com");
        assert_eq!(OwnerKey::from_annotations(&BTreeMap::new()), None);
    }
}
