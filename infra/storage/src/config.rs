//! Deserializable settings for every provider, plus a layered loader.

use crate::error::{StorageError, StorageErrorExt};
use crate::node::NodeId;
use crate::tree::{DEFAULT_TTL, RootScope};
use config::{Config, Environment, File, Map};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Prefix of environment overrides, e.g. `DEPOT__TREE__CACHE__TTL_SECONDS`.
pub const ENV_PREFIX: &str = "DEPOT";

/// Top-level settings document.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DepotConfig {
    pub filesystem: FileSystemConfig,
    pub ftp: Option<FtpSettings>,
    pub tree: TreeConfig,
}

/// Node tree cache tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
}

impl CacheConfig {
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileSystemConfig {
    pub root: PathBuf,
    pub create: bool,
    pub delete_root_on_close: bool,
}

/// Connection data handed to FTP client factories.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub validate_any_certificate: bool,
    /// Directory every provider path is placed under.
    pub root: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Slash path of the subtree the provider is scoped to.
    pub root: Option<String>,
    /// Backend id of the scope root; wins over `root`.
    pub root_id: Option<String>,
    pub release_backend_on_close: bool,
    pub cache: CacheConfig,
}

impl TreeConfig {
    /// The cache scope these settings describe.
    #[must_use]
    pub fn scope(&self) -> RootScope {
        match &self.root_id {
            Some(id) if !id.trim().is_empty() => RootScope::Id(NodeId::new(id)),
            _ => RootScope::from_path(self.root.as_deref()),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_seconds: DEFAULT_TTL.as_secs() }
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self { root: None, root_id: None, release_backend_on_close: true, cache: CacheConfig::default() }
    }
}

impl Default for FileSystemConfig {
    fn default() -> Self {
        Self { root: PathBuf::from("data"), create: true, delete_root_on_close: false }
    }
}

impl Default for FtpSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 21,
            username: "anonymous".to_owned(),
            password: String::new(),
            validate_any_certificate: false,
            root: None,
        }
    }
}

/// Loads `T` from a required settings file overlaid with `DEPOT__*` environment
/// variables. Nested keys use `__`: `DEPOT__FTP__HOST` maps to `ftp.host`.
///
/// # Errors
/// [`StorageError::Config`] when the file is missing or does not match `T`.
///
/// # Example
/// ```rust,no_run
/// use depot_storage::config::{DepotConfig, load_config};
///
/// let config: DepotConfig = load_config("depot.toml").unwrap_or_default();
/// ```
pub fn load_config<T>(path: impl AsRef<Path>) -> Result<T, StorageError>
where
    T: DeserializeOwned,
{
    load_layered(path.as_ref(), None)
}

/// `env` replaces the process environment when given.
fn load_layered<T>(path: &Path, env: Option<Map<String, String>>) -> Result<T, StorageError>
where
    T: DeserializeOwned,
{
    let builder = Config::builder().add_source(File::from(path).required(true)).add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .convert_case(config::Case::Snake)
            .source(env),
    );

    info!(path = %path.display(), "Loading config");

    builder
        .build()
        .context("Failed to build config")?
        .try_deserialize::<T>()
        .context("Failed to deserialize config")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn settings_file(body: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("depot.toml");
        std::fs::write(&path, body).unwrap();
        (dir, path)
    }

    #[test]
    fn defaults_are_sane() {
        assert_eq!(CacheConfig::default().ttl(), Duration::from_secs(600));
        assert_eq!(FtpSettings::default().port, 21);
        assert!(FileSystemConfig::default().create);
        assert!(matches!(TreeConfig::default().scope(), RootScope::Backend));
        assert!(TreeConfig::default().release_backend_on_close);
    }

    #[test]
    #[serial]
    fn file_values_fill_nested_sections() {
        let (_dir, path) = settings_file(
            r#"
            [tree]
            root = "/projects/alpha"
            [tree.cache]
            ttl_seconds = 30
            [ftp]
            host = "ftp.example.org"
            "#,
        );
        let config: DepotConfig = load_config(&path).unwrap();
        assert_eq!(config.tree.cache.ttl(), Duration::from_secs(30));
        assert!(matches!(config.tree.scope(), RootScope::Path(p) if p == "/projects/alpha"));
        let ftp = config.ftp.unwrap();
        assert_eq!(ftp.host, "ftp.example.org");
        assert_eq!(ftp.port, 21);
    }

    #[test]
    fn environment_overrides_the_file() {
        let (_dir, path) = settings_file("[tree.cache]\nttl_seconds = 30\n");
        let env = Map::from([
            ("DEPOT__TREE__CACHE__TTL_SECONDS".to_owned(), "5".to_owned()),
            ("DEPOT__TREE__ROOT_ID".to_owned(), "node-7".to_owned()),
        ]);
        let config: DepotConfig = load_layered(&path, Some(env)).unwrap();
        assert_eq!(config.tree.cache.ttl_seconds, 5);
        assert!(matches!(config.tree.scope(), RootScope::Id(id) if id.as_str() == "node-7"));
    }

    #[test]
    #[serial]
    fn missing_file_is_a_config_error() {
        let err = load_config::<DepotConfig>("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, StorageError::Config { .. }));
    }
}
