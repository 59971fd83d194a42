use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub permissions: PermissionsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Where item-model definitions are read from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Resource pack root; entries live in `assets/<namespace>/items/`.
    #[serde(default = "default_resource_pack")]
    pub resource_pack: PathBuf,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Write example definitions when the resource pack root is missing.
    #[serde(default = "default_bootstrap_examples")]
    pub bootstrap_examples: bool,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Sent to viewers who press the import control.
    #[serde(default = "default_import_url")]
    pub import_url: String,
    /// First numeric model-data tag. `None` disables the tag entirely.
    #[serde(default)]
    pub custom_model_data_base: Option<i32>,
    #[serde(default = "default_inventory_capacity")]
    pub inventory_capacity: usize,
}

/// Something a viewer may be allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Receive fresh preview items from the browser.
    Give,
    /// Reload the catalog.
    Admin,
    Delete,
    Upload,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Give => "give",
            Capability::Admin => "admin",
            Capability::Delete => "delete",
            Capability::Upload => "upload",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionsConfig {
    /// Granted to every viewer not listed in `viewers`.
    #[serde(default = "default_capabilities")]
    pub default: BTreeSet<Capability>,
    /// Per-viewer grants; these replace `default` for that viewer.
    #[serde(default)]
    pub viewers: BTreeMap<String, BTreeSet<Capability>>,
}

impl PermissionsConfig {
    pub fn capabilities_for(&self, viewer: &str) -> BTreeSet<Capability> {
        self.viewers
            .get(viewer)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            resource_pack: default_resource_pack(),
            namespace: default_namespace(),
            bootstrap_examples: default_bootstrap_examples(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            import_url: default_import_url(),
            custom_model_data_base: None,
            inventory_capacity: default_inventory_capacity(),
        }
    }
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            default: default_capabilities(),
            viewers: BTreeMap::new(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    platform::DAEMON_TCP_PORT
}

fn default_resource_pack() -> PathBuf {
    platform::data_dir().join("resourcepack")
}

fn default_namespace() -> String {
    "minecraft".to_string()
}

fn default_bootstrap_examples() -> bool {
    true
}

fn default_max_upload_bytes() -> usize {
    u16::MAX as usize
}

fn default_page_size() -> usize {
    45
}

fn default_import_url() -> String {
    "http://127.0.0.1:8123/model-import".to_string()
}

fn default_inventory_capacity() -> usize {
    36
}

fn default_capabilities() -> BTreeSet<Capability> {
    BTreeSet::from([Capability::Give])
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.browser.page_size == 0 {
            anyhow::bail!("browser.page_size must be at least 1");
        }
        if self.catalog.namespace.is_empty() || self.catalog.namespace.contains(':') {
            anyhow::bail!("catalog.namespace {:?} is not a valid namespace", self.catalog.namespace);
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon: DaemonConfig::default(),
            catalog: CatalogConfig::default(),
            browser: BrowserConfig::default(),
            permissions: PermissionsConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.daemon.port, platform::DAEMON_TCP_PORT);
        assert_eq!(config.daemon.bind_address, "127.0.0.1");
        assert_eq!(config.browser.page_size, 45);
        assert_eq!(config.catalog.namespace, "minecraft");
        assert!(config.browser.custom_model_data_base.is_none());
        assert!(config.catalog.resource_pack.ends_with("modelbrowser/resourcepack"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [browser]
            page_size = 9

            [permissions.viewers]
            alex = ["give", "admin"]
            "#,
        )
        .unwrap();
        assert_eq!(config.browser.page_size, 9);
        assert_eq!(config.browser.inventory_capacity, 36);
        assert_eq!(
            config.permissions.capabilities_for("alex"),
            BTreeSet::from([Capability::Give, Capability::Admin])
        );
        assert_eq!(
            config.permissions.capabilities_for("steve"),
            BTreeSet::from([Capability::Give])
        );
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let mut config = Config::default();
        config.browser.page_size = 0;
        assert!(config.validate().is_err());
    }
}
