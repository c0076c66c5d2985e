// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for operator error types.

#[cfg(test)]
mod tests {
    use crate::errors::{
        is_invalid, is_invalid_anyhow, is_not_found, join_errors, metric_label_for,
        status_reason_for, OperatorError,
    };
    use crate::status_reasons::{
        REASON_INVALID_CONFIG, REASON_INVALID_DRIVER_NAME, REASON_NAME_CONFLICT,
        REASON_RECONCILE_FAILED,
    };
    use kube::core::response::{Status, StatusSummary};

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(Box::new(Status {
            status: Some(StatusSummary::Failure),
            message: format!("{reason} error"),
            reason: reason.to_string(),
            details: None,
            metadata: None,
            code,
        }))
    }

    #[test]
    fn test_invalid_driver_name_message() {
        let error = OperatorError::InvalidDriverName {
            name: "invalid.csi.ceph.com".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "invalid driver name 'invalid.csi.ceph.com': expected <prefix>.(rbd|cephfs|nfs).csi.ceph.com"
        );
        assert_eq!(error.status_reason(), REASON_INVALID_DRIVER_NAME);
    }

    #[test]
    fn test_status_reason_mapping() {
        let conflict = OperatorError::NameConflict {
            name: "rbd.csi.ceph.com".to_string(),
            owner: "other/rbd.csi.ceph.com".to_string(),
        };
        assert_eq!(conflict.status_reason(), REASON_NAME_CONFLICT);

        let rotation = OperatorError::InvalidLogRotation {
            reason: "maxLogSize is required".to_string(),
        };
        assert_eq!(rotation.status_reason(), REASON_INVALID_CONFIG);
        assert_eq!(rotation.metric_label(), "validation_error");

        let malformed = OperatorError::MalformedClusterConfig {
            config_map: "ceph-csi-config".to_string(),
            key: "config.json".to_string(),
            reason: "EOF".to_string(),
        };
        assert_eq!(malformed.status_reason(), REASON_RECONCILE_FAILED);
        assert_eq!(malformed.metric_label(), "serialization_error");
    }

    #[test]
    fn test_status_reason_for_downcasts() {
        let err: anyhow::Error = OperatorError::NameConflict {
            name: "x".to_string(),
            owner: "y".to_string(),
        }
        .into();
        assert_eq!(status_reason_for(&err), REASON_NAME_CONFLICT);

        let err = anyhow::anyhow!("connection refused");
        assert_eq!(status_reason_for(&err), REASON_RECONCILE_FAILED);
        assert_eq!(metric_label_for(&err), "unknown_error");

        let err: anyhow::Error = api_error(500, "InternalError").into();
        assert_eq!(metric_label_for(&err), "api_error");
    }

    #[test]
    fn test_join_errors_all_ok() {
        assert!(join_errors(vec![Ok(()), Ok(()), Ok(())]).is_ok());
        assert!(join_errors(vec![]).is_ok());
    }

    #[test]
    fn test_join_errors_single_error_is_preserved() {
        let err = join_errors(vec![
            Ok(()),
            Err(OperatorError::InvalidLogRotation {
                reason: "bad".to_string(),
            }
            .into()),
        ])
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<OperatorError>(),
            Some(OperatorError::InvalidLogRotation { .. })
        ));
    }

    #[test]
    fn test_join_errors_collects_every_failure() {
        let err = join_errors(vec![
            Err(anyhow::anyhow!("deployment failed")),
            Ok(()),
            Err(anyhow::anyhow!("service failed")),
        ])
        .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("deployment failed"));
        assert!(message.contains("service failed"));
        assert!(matches!(
            err.downcast_ref::<OperatorError>(),
            Some(OperatorError::Multiple(v)) if v.len() == 2
        ));
    }

    #[test]
    fn test_api_error_classification() {
        assert!(is_not_found(&api_error(404, "NotFound")));
        assert!(!is_not_found(&api_error(409, "AlreadyExists")));
        assert!(is_invalid(&api_error(422, "Invalid")));
        assert!(!is_invalid(&api_error(400, "BadRequest")));

        let wrapped: anyhow::Error = api_error(422, "Invalid").into();
        assert!(is_invalid_anyhow(&wrapped));
        assert!(!is_invalid_anyhow(&anyhow::anyhow!("422")));
    }
}
