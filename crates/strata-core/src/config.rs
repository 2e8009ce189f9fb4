//! strata.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StrataConfig {
    /// Namespace the operator manages and the control plane lives in.
    pub namespace: String,
    pub control_plane: ControlPlaneConfig,
    pub operator: OperatorConfig,
    pub images: ImagesConfig,
    pub storage_node: StorageNodeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControlPlaneConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    /// Whether the control plane also reconciles tenant and timeline
    /// resources.
    pub watch_tenants: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OperatorConfig {
    /// Upper bound for every call to the orchestration backend.
    pub call_timeout_secs: u64,
    /// Requeue interval for healthy resources.
    pub resync_secs: u64,
    /// Requeue interval after a retryable failure.
    pub retry_secs: u64,
    /// Requeue interval while a component is still starting.
    pub not_ready_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImagesConfig {
    pub pageserver: String,
    pub safekeeper: String,
    pub storage_broker: String,
    pub compute_node: String,
    pub control_plane: String,
    pub pull_policy: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageNodeConfig {
    pub http_port: u16,
    pub timeout_secs: u64,
}

impl Default for StrataConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            control_plane: ControlPlaneConfig::default(),
            operator: OperatorConfig::default(),
            images: ImagesConfig::default(),
            storage_node: StorageNodeConfig::default(),
        }
    }
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            port: 1234,
            data_dir: PathBuf::from("/var/lib/strata"),
            watch_tenants: true,
        }
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: 10,
            resync_secs: 300,
            retry_secs: 15,
            not_ready_secs: 10,
        }
    }
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            pageserver: "neondatabase/neon".to_string(),
            safekeeper: "neondatabase/neon".to_string(),
            storage_broker: "neondatabase/neon:latest".to_string(),
            compute_node: "neondatabase/compute-node-v16:latest".to_string(),
            control_plane: "ghcr.io/strata-dev/stratad:main".to_string(),
            pull_policy: "IfNotPresent".to_string(),
        }
    }
}

impl Default for StorageNodeConfig {
    fn default() -> Self {
        Self {
            http_port: 9898,
            timeout_secs: 10,
        }
    }
}

impl OperatorConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn resync(&self) -> Duration {
        Duration::from_secs(self.resync_secs)
    }

    pub fn retry(&self) -> Duration {
        Duration::from_secs(self.retry_secs)
    }

    pub fn not_ready(&self) -> Duration {
        Duration::from_secs(self.not_ready_secs)
    }
}

impl StorageNodeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl StrataConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: StrataConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise use defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let config: StrataConfig = toml::from_str("namespace = \"neon\"\n").unwrap();
        assert_eq!(config.namespace, "neon");
        assert_eq!(config.control_plane.port, 1234);
        assert_eq!(config.operator.call_timeout(), Duration::from_secs(10));
        assert_eq!(config.storage_node.http_port, 9898);
    }

    #[test]
    fn test_parse_overrides() {
        let toml_str = r#"
namespace = "db"

[operator]
call_timeout_secs = 3
retry_secs = 5

[images]
pageserver = "registry.local/neon:dev"
"#;
        let config: StrataConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.operator.call_timeout_secs, 3);
        assert_eq!(config.operator.retry(), Duration::from_secs(5));
        assert_eq!(config.operator.resync_secs, 300);
        assert_eq!(config.images.pageserver, "registry.local/neon:dev");
        assert_eq!(config.images.safekeeper, "neondatabase/neon");
    }

    #[test]
    fn test_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strata.toml");
        let mut config = StrataConfig::default();
        config.namespace = "prod".to_string();
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        let loaded = StrataConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_without_path_uses_defaults() {
        let config = StrataConfig::load(None).unwrap();
        assert_eq!(config, StrataConfig::default());
    }
}
