//! Store configuration
//!
//! A `StoreConfig` value is built once (defaults, YAML file, environment)
//! and handed explicitly to the metadata store, blob store and managers.
//! Nothing in the crate reads configuration from ambient state.
//!
//! # YAML Schema v1
//!
//! ```yaml
//! version: 1
//! data_root: /srv/docvault
//! busy_timeout_ms: 10000
//! extensions:
//!   program: [".nc", ".tap"]
//! roles:
//!   admin: ["*"]
//!   engineer: ["manage_documents"]
//! ```

pub mod error;

pub use error::{ConfigError, ConfigResult};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::MANAGE_DOCUMENTS;
use crate::domain::ArtifactKind;

pub const ENV_DATA_ROOT: &str = "DOCVAULT_DATA_ROOT";
pub const ENV_DATABASE: &str = "DOCVAULT_DATABASE";
pub const ENV_BUSY_TIMEOUT_MS: &str = "DOCVAULT_BUSY_TIMEOUT_MS";

const DEFAULT_DATABASE_FILE: &str = "docvault.db";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_IMPORT_RETRIES: u32 = 2;
const DEFAULT_HASH_BUFFER_BYTES: usize = 1024 * 1024;
const SUPPORTED_VERSIONS: &[u32] = &[1];

/// Configuration shared by every store component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root of the data tree; blob paths are stored relative to it
    pub data_root: PathBuf,

    /// SQLite database file (defaults to `<data_root>/docvault.db`)
    pub database_path: Option<PathBuf>,

    /// How long a writer waits for another seat's transaction
    pub busy_timeout_ms: u64,

    /// Extra import attempts after a conflict
    pub import_retries: u32,

    /// Read buffer used while hashing
    pub hash_buffer_bytes: usize,

    /// Per-kind extension overrides (empty list allows everything)
    pub extensions: BTreeMap<ArtifactKind, Vec<String>>,

    /// Role name -> granted permissions (`*` grants all)
    pub roles: BTreeMap<String, Vec<String>>,
}

impl StoreConfig {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        let mut roles = BTreeMap::new();
        roles.insert("admin".to_string(), vec![MANAGE_DOCUMENTS.to_string()]);
        roles.insert("engineer".to_string(), vec![MANAGE_DOCUMENTS.to_string()]);

        Self {
            data_root: data_root.into(),
            database_path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            import_retries: DEFAULT_IMPORT_RETRIES,
            hash_buffer_bytes: DEFAULT_HASH_BUFFER_BYTES,
            extensions: BTreeMap::new(),
            roles,
        }
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.data_root.join(DEFAULT_DATABASE_FILE))
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Allowed extensions for a kind, lowercase with leading dot
    pub fn allowed_extensions(&self, kind: ArtifactKind) -> Vec<String> {
        match self.extensions.get(&kind) {
            Some(list) => list.iter().map(|ext| ext.to_lowercase()).collect(),
            None => kind
                .default_extensions()
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }

    pub fn is_extension_allowed(&self, kind: ArtifactKind, path: &Path) -> bool {
        let allowed = self.allowed_extensions(kind);
        if allowed.is_empty() {
            return true;
        }
        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!(".{}", ext.to_lowercase()),
            None => return false,
        };
        allowed.iter().any(|candidate| *candidate == ext)
    }

    /// Load a versioned YAML file on top of the defaults
    pub fn from_yaml(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let file: ConfigFileV1 = serde_yaml::from_str(content)?;

        let version = file.version.ok_or(ConfigError::MissingVersion)?;
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(ConfigError::UnsupportedVersion {
                found: version,
                supported: SUPPORTED_VERSIONS.to_vec(),
            });
        }

        let data_root = file
            .data_root
            .ok_or_else(|| ConfigError::invalid("data_root", "required"))?;
        let mut config = Self::new(data_root);
        config.database_path = file.database_path;
        if let Some(timeout) = file.busy_timeout_ms {
            config.busy_timeout_ms = timeout;
        }
        if let Some(retries) = file.import_retries {
            config.import_retries = retries;
        }
        if let Some(buffer) = file.hash_buffer_bytes {
            config.hash_buffer_bytes = buffer;
        }
        if let Some(extensions) = file.extensions {
            config.extensions = extensions;
        }
        if let Some(roles) = file.roles {
            config.roles = roles;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> ConfigResult<String> {
        let file = ConfigFileV1 {
            version: Some(1),
            data_root: Some(self.data_root.clone()),
            database_path: self.database_path.clone(),
            busy_timeout_ms: Some(self.busy_timeout_ms),
            import_retries: Some(self.import_retries),
            hash_buffer_bytes: Some(self.hash_buffer_bytes),
            extensions: Some(self.extensions.clone()),
            roles: Some(self.roles.clone()),
        };
        Ok(serde_yaml::to_string(&file)?)
    }

    /// Apply `DOCVAULT_*` overrides from the process environment
    pub fn apply_env(self) -> ConfigResult<Self> {
        self.apply_env_with(|name| std::env::var(name).ok())
    }

    pub fn apply_env_with<F>(mut self, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(ENV_DATA_ROOT) {
            self.data_root = PathBuf::from(root);
        }
        if let Some(db) = lookup(ENV_DATABASE) {
            self.database_path = Some(PathBuf::from(db));
        }
        if let Some(raw) = lookup(ENV_BUSY_TIMEOUT_MS) {
            self.busy_timeout_ms = raw.trim().parse().map_err(|e| ConfigError::Env {
                var: ENV_BUSY_TIMEOUT_MS.to_string(),
                value: raw.clone(),
                reason: format!("{}", e),
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.data_root.as_os_str().is_empty() {
            return Err(ConfigError::invalid("data_root", "must not be empty"));
        }
        if self.hash_buffer_bytes == 0 {
            return Err(ConfigError::invalid("hash_buffer_bytes", "must be positive"));
        }
        for (kind, list) in &self.extensions {
            if let Some(bad) = list.iter().find(|ext| !ext.starts_with('.') || ext.len() < 2) {
                return Err(ConfigError::invalid(
                    format!("extensions.{}", kind.as_str()),
                    format!("'{}' must look like '.ext'", bad),
                ));
            }
        }
        Ok(())
    }
}

/// On-disk schema (every field optional so defaults can fill the gaps)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFileV1 {
    version: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    data_root: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    database_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    busy_timeout_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    import_retries: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    hash_buffer_bytes: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    extensions: Option<BTreeMap<ArtifactKind, Vec<String>>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    roles: Option<BTreeMap<String, Vec<String>>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::new("/srv/docvault");
        assert_eq!(
            config.database_path(),
            PathBuf::from("/srv/docvault/docvault.db")
        );
        assert_eq!(config.busy_timeout(), Duration::from_secs(10));
        assert_eq!(config.import_retries, 2);
        assert_eq!(config.hash_buffer_bytes, 1024 * 1024);
        assert_eq!(
            config.roles.get("engineer"),
            Some(&vec!["manage_documents".to_string()])
        );
    }

    #[test]
    fn test_kind_extensions() {
        let config = StoreConfig::new("/data");
        assert!(config.is_extension_allowed(ArtifactKind::Program, Path::new("op10.NC")));
        assert!(config.is_extension_allowed(ArtifactKind::Print, Path::new("bracket.pdf")));
        assert!(!config.is_extension_allowed(ArtifactKind::Program, Path::new("bracket.pdf")));
        assert!(!config.is_extension_allowed(ArtifactKind::Print, Path::new("no_extension")));
    }

    #[test]
    fn test_empty_override_allows_everything() {
        let mut config = StoreConfig::new("/data");
        config.extensions.insert(ArtifactKind::Print, Vec::new());
        assert!(config.is_extension_allowed(ArtifactKind::Print, Path::new("scan.tiff")));
        assert!(config.is_extension_allowed(ArtifactKind::Print, Path::new("README")));
    }

    #[test]
    fn test_yaml_loading() {
        let yaml_content = r#"
version: 1
data_root: /srv/shop
busy_timeout_ms: 2500
extensions:
  program: [".NC", ".h"]
roles:
  lead: ["*"]
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = StoreConfig::from_yaml(temp_file.path()).unwrap();
        assert_eq!(config.data_root, PathBuf::from("/srv/shop"));
        assert_eq!(config.busy_timeout_ms, 2500);
        assert_eq!(
            config.allowed_extensions(ArtifactKind::Program),
            vec![".nc".to_string(), ".h".to_string()]
        );
        assert_eq!(config.roles.len(), 1);
        assert!(config.roles.contains_key("lead"));
    }

    #[test]
    fn test_yaml_missing_version() {
        let result = StoreConfig::from_yaml_str("data_root: /srv/shop\n");
        assert!(matches!(result, Err(ConfigError::MissingVersion)));
    }

    #[test]
    fn test_yaml_unsupported_version() {
        let result = StoreConfig::from_yaml_str("version: 7\ndata_root: /srv\n");
        match result {
            Err(ConfigError::UnsupportedVersion { found, supported }) => {
                assert_eq!(found, 7);
                assert_eq!(supported, vec![1]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_yaml_unknown_field_rejected() {
        let result = StoreConfig::from_yaml_str("version: 1\ndata_root: /srv\ncolour: blue\n");
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = StoreConfig::new("/srv/shop").with_database_path("/var/db/vault.db");
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("version: 1"));

        let loaded = StoreConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_DATA_ROOT, "/mnt/vault"),
            (ENV_BUSY_TIMEOUT_MS, "500"),
        ]
        .into_iter()
        .collect();

        let config = StoreConfig::new("/srv")
            .apply_env_with(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.data_root, PathBuf::from("/mnt/vault"));
        assert_eq!(config.busy_timeout_ms, 500);
        assert_eq!(config.database_path(), PathBuf::from("/mnt/vault/docvault.db"));
    }

    #[test]
    fn test_env_override_parse_failure() {
        let result = StoreConfig::new("/srv").apply_env_with(|name| {
            (name == ENV_BUSY_TIMEOUT_MS).then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Env { .. })));
    }

    #[test]
    fn test_validate_rejects_bad_extension() {
        let mut config = StoreConfig::new("/srv");
        config
            .extensions
            .insert(ArtifactKind::Program, vec!["nc".to_string()]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_buffer() {
        let mut config = StoreConfig::new("/srv");
        config.hash_buffer_bytes = 0;
        assert!(config.validate().is_err());
    }
}
