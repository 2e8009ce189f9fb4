//! Cluster spec — the desired-state document for one deployment.
//!
//! [`ClusterSpec`] is the loosely-typed document exactly as users write it
//! into a `StrataDeployment` custom resource: every field is optional so
//! that a malformed spec still deserializes and can be rejected with a
//! useful message. [`ClusterSpec::validate`] is the single
//! parse-and-validate step that turns it into a [`ClusterConfig`], in which
//! every field the builders need is present.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ImagesConfig;
use crate::lifecycle::ResourceStatus;
use crate::types::ResourceRequirements;

/// Errors produced while validating a [`ClusterSpec`].
///
/// These are never retryable: the same spec will fail the same way until a
/// user edits it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required field(s): {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Desired state of one database deployment.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "strata.dev",
    version = "v1alpha1",
    kind = "StrataDeployment",
    plural = "stratadeployments",
    shortname = "sdep",
    status = "ResourceStatus",
    namespaced,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Reason","type":"string","jsonPath":".status.reason"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_config: Option<StorageConfigSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_node: Option<ComponentOverrides>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_broker: Option<ComponentOverrides>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane: Option<ComponentOverrides>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_server: Option<ComponentOverrides>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_keeper: Option<ComponentOverrides>,
}

/// Object store location and credentials as written by the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfigSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<CredentialsSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_in_bucket: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CredentialsSpec {
    #[serde(
        rename = "awsAccessKeyID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub aws_access_key_id: Option<String>,
    #[serde(
        rename = "awsSecretAccessKey",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub aws_secret_access_key: Option<String>,
}

/// Per-component overrides. Anything left out falls back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
    /// Volume size for components with persistent data (page server,
    /// control plane).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_capacity: Option<String>,
}

// ── Validated form ────────────────────────────────────────────────

/// Validated cluster configuration consumed by the resource builders.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterConfig {
    pub namespace: String,
    pub credentials: StorageCredentials,
    pub object_store: ObjectStoreLocation,
    pub storage_broker: ComponentSettings,
    pub safekeeper: ComponentSettings,
    pub control_plane: ComponentSettings,
    pub pageserver: ComponentSettings,
    pub compute_node: ComponentSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStoreLocation {
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub prefix: String,
}

/// Fully resolved settings for one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentSettings {
    pub image: String,
    pub image_pull_policy: String,
    pub replicas: u32,
    pub resources: ResourceRequirements,
    pub storage_capacity: String,
}

const DEFAULT_STORAGE_CAPACITY: &str = "1Gi";

impl ClusterSpec {
    /// Validate the cluster spec and resolve defaults.
    ///
    /// Credentials and all four object-store fields are checked together;
    /// every missing one is reported in a single error so a user can fix
    /// the resource in one edit.
    pub fn validate(
        &self,
        namespace: &str,
        images: &ImagesConfig,
    ) -> Result<ClusterConfig, ConfigError> {
        let storage = self.storage_config.clone().unwrap_or_default();
        let creds = storage.credentials.clone().unwrap_or_default();

        let mut missing = Vec::new();
        let access_key_id = required(
            creds.aws_access_key_id,
            "storageConfig.credentials.awsAccessKeyID",
            &mut missing,
        );
        let secret_access_key = required(
            creds.aws_secret_access_key,
            "storageConfig.credentials.awsSecretAccessKey",
            &mut missing,
        );
        let endpoint = required(storage.endpoint, "storageConfig.endpoint", &mut missing);
        let bucket = required(storage.bucket_name, "storageConfig.bucketName", &mut missing);
        let region = required(storage.region, "storageConfig.region", &mut missing);
        let prefix = required(
            storage.prefix_in_bucket,
            "storageConfig.prefixInBucket",
            &mut missing,
        );

        if !missing.is_empty() {
            return Err(ConfigError::MissingFields(missing));
        }

        // Every control plane replica would be its own generation authority.
        let control_plane = resolve(
            self.control_plane.as_ref(),
            "controlPlane.replicas",
            &images.control_plane,
            images,
            1,
        )?;
        if control_plane.replicas != 1 {
            return Err(ConfigError::InvalidValue {
                field: "controlPlane.replicas",
                reason: "the control plane runs as exactly one replica".to_string(),
            });
        }

        if namespace.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "metadata.namespace",
                reason: "namespace must not be empty".to_string(),
            });
        }

        Ok(ClusterConfig {
            namespace: namespace.to_string(),
            credentials: StorageCredentials {
                access_key_id,
                secret_access_key,
            },
            object_store: ObjectStoreLocation {
                endpoint,
                bucket,
                region,
                prefix,
            },
            storage_broker: resolve(
                self.storage_broker.as_ref(),
                "storageBroker.replicas",
                &images.storage_broker,
                images,
                1,
            )?,
            safekeeper: resolve(
                self.safe_keeper.as_ref(),
                "safeKeeper.replicas",
                &images.safekeeper,
                images,
                3,
            )?,
            control_plane,
            pageserver: resolve(
                self.page_server.as_ref(),
                "pageServer.replicas",
                &images.pageserver,
                images,
                1,
            )?,
            compute_node: resolve(
                self.compute_node.as_ref(),
                "computeNode.replicas",
                &images.compute_node,
                images,
                1,
            )?,
        })
    }
}

/// Record `field` as missing when `value` is absent or blank.
fn required(value: Option<String>, field: &'static str, missing: &mut Vec<&'static str>) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => {
            missing.push(field);
            String::new()
        }
    }
}

fn resolve(
    overrides: Option<&ComponentOverrides>,
    replicas_field: &'static str,
    default_image: &str,
    images: &ImagesConfig,
    default_replicas: u32,
) -> Result<ComponentSettings, ConfigError> {
    let o = overrides.cloned().unwrap_or_default();
    let replicas = o.replicas.unwrap_or(default_replicas);
    if replicas == 0 {
        return Err(ConfigError::InvalidValue {
            field: replicas_field,
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(ComponentSettings {
        image: o.image.unwrap_or_else(|| default_image.to_string()),
        image_pull_policy: o
            .image_pull_policy
            .unwrap_or_else(|| images.pull_policy.clone()),
        replicas,
        resources: o.resources.unwrap_or_default(),
        storage_capacity: o
            .storage_capacity
            .unwrap_or_else(|| DEFAULT_STORAGE_CAPACITY.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_spec() -> ClusterSpec {
        serde_json::from_value(serde_json::json!({
            "storageConfig": {
                "credentials": {
                    "awsAccessKeyID": "minio",
                    "awsSecretAccessKey": "password"
                },
                "endpoint": "http://minio:9000",
                "bucketName": "neon",
                "region": "eu-north-1",
                "prefixInBucket": "/pageserver/"
            },
            "safeKeeper": { "replicas": 5 },
            "pageServer": {
                "image": "neondatabase/neon:release-5000",
                "resources": {
                    "requests": { "cpu": "1", "memory": "2Gi" },
                    "limits": { "cpu": "2", "memory": "4Gi" }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn complete_spec_validates() {
        let cfg = complete_spec()
            .validate("neon", &ImagesConfig::default())
            .unwrap();
        assert_eq!(cfg.namespace, "neon");
        assert_eq!(cfg.credentials.access_key_id, "minio");
        assert_eq!(cfg.object_store.bucket, "neon");
        assert_eq!(cfg.object_store.prefix, "/pageserver/");
        assert_eq!(cfg.safekeeper.replicas, 5);
        assert_eq!(cfg.pageserver.image, "neondatabase/neon:release-5000");
        assert_eq!(cfg.pageserver.resources.limits["memory"], "4Gi");
    }

    #[test]
    fn missing_overrides_fall_back_to_defaults() {
        let images = ImagesConfig::default();
        let cfg = complete_spec().validate("neon", &images).unwrap();
        assert_eq!(cfg.storage_broker.replicas, 1);
        assert_eq!(cfg.storage_broker.image, images.storage_broker);
        assert_eq!(cfg.compute_node.resources, ResourceRequirements::default());
        assert_eq!(cfg.pageserver.storage_capacity, "1Gi");
        assert_eq!(cfg.control_plane.image_pull_policy, "IfNotPresent");
    }

    #[test]
    fn each_missing_storage_field_is_rejected() {
        let clears: [(&str, fn(&mut StorageConfigSpec)); 4] = [
            ("storageConfig.endpoint", |s| s.endpoint = None),
            ("storageConfig.bucketName", |s| s.bucket_name = None),
            ("storageConfig.region", |s| s.region = None),
            ("storageConfig.prefixInBucket", |s| s.prefix_in_bucket = None),
        ];
        for (field, clear) in clears {
            let mut spec = complete_spec();
            clear(spec.storage_config.as_mut().unwrap());
            let err = spec.validate("neon", &ImagesConfig::default()).unwrap_err();
            assert_eq!(err, ConfigError::MissingFields(vec![field]));
        }
    }

    #[test]
    fn blank_credentials_count_as_missing() {
        let mut spec = complete_spec();
        let creds = spec
            .storage_config
            .as_mut()
            .unwrap()
            .credentials
            .as_mut()
            .unwrap();
        creds.aws_secret_access_key = Some("   ".to_string());
        let err = spec.validate("neon", &ImagesConfig::default()).unwrap_err();
        assert!(err.to_string().contains("awsSecretAccessKey"));
    }

    #[test]
    fn empty_spec_reports_every_missing_field() {
        let err = ClusterSpec::default()
            .validate("neon", &ImagesConfig::default())
            .unwrap_err();
        match err {
            ConfigError::MissingFields(fields) => assert_eq!(fields.len(), 6),
            other => panic!("expected MissingFields, got {other:?}"),
        }
    }

    #[test]
    fn zero_replicas_rejected() {
        let mut spec = complete_spec();
        spec.storage_broker = Some(ComponentOverrides {
            replicas: Some(0),
            ..Default::default()
        });
        let err = spec.validate("neon", &ImagesConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "storageBroker.replicas",
                ..
            }
        ));
    }

    #[test]
    fn control_plane_is_pinned_to_one_replica() {
        for replicas in [0, 2, 3] {
            let mut spec = complete_spec();
            spec.control_plane = Some(ComponentOverrides {
                replicas: Some(replicas),
                ..Default::default()
            });
            let err = spec.validate("neon", &ImagesConfig::default()).unwrap_err();
            assert!(
                matches!(
                    err,
                    ConfigError::InvalidValue {
                        field: "controlPlane.replicas",
                        ..
                    }
                ),
                "replicas={replicas}: {err:?}"
            );
        }

        let mut spec = complete_spec();
        spec.control_plane = Some(ComponentOverrides {
            replicas: Some(1),
            ..Default::default()
        });
        let cfg = spec.validate("neon", &ImagesConfig::default()).unwrap();
        assert_eq!(cfg.control_plane.replicas, 1);
    }

    #[test]
    fn custom_resource_wraps_spec() {
        let dep = StrataDeployment::new("main", complete_spec());
        let json = serde_json::to_value(&dep).unwrap();
        assert_eq!(json["kind"], "StrataDeployment");
        assert_eq!(json["apiVersion"], "strata.dev/v1alpha1");
        assert_eq!(json["spec"]["storageConfig"]["bucketName"], "neon");
    }
}
