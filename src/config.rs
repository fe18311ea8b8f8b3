use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BundleError, Result};
use crate::remote::Remote;

/// Directory under the project root holding project configuration.
pub const PROJECT_DIR: &str = ".bundlekit";

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub install: InstallConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub remotes: Vec<Remote>,
}

impl Config {
    /// Defaults, then the global and project files (or only `explicit_path`
    /// / `BUNDLEKIT_CONFIG`), then environment overrides.
    pub fn load(explicit_path: Option<&Path>, project_root: &Path) -> Result<Self> {
        let mut config = Self::default();

        let explicit = explicit_path
            .map(PathBuf::from)
            .or_else(|| std::env::var("BUNDLEKIT_CONFIG").ok().map(PathBuf::from));

        if let Some(path) = explicit {
            let patch = Self::load_patch(&path)?.ok_or_else(|| {
                BundleError::Config(format!("config file {} does not exist", path.display()))
            })?;
            config.merge_patch(patch);
        } else {
            if let Some(global) = Self::load_global()? {
                config.merge_patch(global);
            }
            if let Some(project) = Self::load_patch(&Self::project_path(project_root))? {
                config.merge_patch(project);
            }
        }

        config.apply_overrides(&|key| std::env::var(key).ok())?;

        Ok(config)
    }

    /// `<project_root>/.bundlekit/config.toml`
    pub fn project_path(project_root: &Path) -> PathBuf {
        project_root.join(PROJECT_DIR).join(CONFIG_FILE)
    }

    fn load_global() -> Result<Option<ConfigPatch>> {
        let Some(dir) = dirs::config_dir() else {
            return Ok(None);
        };
        Self::load_patch(&dir.join("bundlekit").join(CONFIG_FILE))
    }

    fn load_patch(path: &Path) -> Result<Option<ConfigPatch>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|err| BundleError::Config(format!("read config {}: {err}", path.display())))?;
        let patch = toml::from_str(&raw)
            .map_err(|err| BundleError::Config(format!("parse config {}: {err}", path.display())))?;
        Ok(Some(patch))
    }

    fn merge_patch(&mut self, patch: ConfigPatch) {
        if let Some(patch) = patch.store {
            self.store.merge(patch);
        }
        if let Some(patch) = patch.install {
            self.install.merge(patch);
        }
        if let Some(patch) = patch.http {
            self.http.merge(patch);
        }
        if let Some(remotes) = patch.remotes {
            merge_remotes(&mut self.remotes, remotes);
        }
    }

    fn apply_overrides(&mut self, lookup: &dyn Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = env_path(lookup, "BUNDLEKIT_BUNDLES_ROOT") {
            self.store.bundles_root = value;
        }
        if let Some(value) = env_path(lookup, "BUNDLEKIT_ARCHIVES_DIR") {
            self.store.archives_directory = value;
        }
        if let Some(value) = env_u64(lookup, "BUNDLEKIT_LOCK_WAIT_MS")? {
            self.store.lock_wait_ms = value;
        }
        if let Some(value) = env_path(lookup, "BUNDLEKIT_HTTP_CACHE_DIR") {
            self.http.cache_directory = Some(value);
        }
        Ok(())
    }

    pub fn remote(&self, name: &str) -> Option<&Remote> {
        self.remotes.iter().find(|remote| remote.name == name)
    }
}

/// Same-named remotes are replaced in place; new ones are appended.
fn merge_remotes(existing: &mut Vec<Remote>, incoming: Vec<Remote>) {
    for remote in incoming {
        match existing.iter_mut().find(|r| r.name == remote.name) {
            Some(slot) => *slot = remote,
            None => existing.push(remote),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_bundles_root")]
    pub bundles_root: PathBuf,
    #[serde(default = "default_archives_directory")]
    pub archives_directory: PathBuf,
    #[serde(default = "default_lock_wait_ms")]
    pub lock_wait_ms: u64,
    /// Stable key for the install lock; lets a restarted process re-enter a
    /// lock it held before crashing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_key: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            bundles_root: default_bundles_root(),
            archives_directory: default_archives_directory(),
            lock_wait_ms: default_lock_wait_ms(),
            lock_key: None,
        }
    }
}

impl StoreConfig {
    pub const fn lock_wait_interval(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }

    fn merge(&mut self, patch: StorePatch) {
        if let Some(value) = patch.bundles_root {
            self.bundles_root = value;
        }
        if let Some(value) = patch.archives_directory {
            self.archives_directory = value;
        }
        if let Some(value) = patch.lock_wait_ms {
            self.lock_wait_ms = value;
        }
        if let Some(value) = patch.lock_key {
            self.lock_key = Some(value);
        }
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bundlekit")
}

fn default_bundles_root() -> PathBuf {
    data_dir().join("bundles")
}

fn default_archives_directory() -> PathBuf {
    data_dir().join("archives")
}

const fn default_lock_wait_ms() -> u64 {
    100
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Directory that descriptor file selections are relative to. Defaults
    /// to the directory holding the descriptor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_directory: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_context_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imports_context_key: Option<String>,
}

impl InstallConfig {
    fn merge(&mut self, patch: InstallPatch) {
        if let Some(value) = patch.source_directory {
            self.source_directory = Some(value);
        }
        if let Some(value) = patch.default_context_key {
            self.default_context_key = Some(value);
        }
        if let Some(value) = patch.imports_context_key {
            self.imports_context_key = Some(value);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Downloaded archives are kept here when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_directory: Option<PathBuf>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            cache_directory: None,
            user_agent: default_user_agent(),
        }
    }
}

impl HttpConfig {
    fn merge(&mut self, patch: HttpPatch) {
        if let Some(value) = patch.cache_directory {
            self.cache_directory = Some(value);
        }
        if let Some(value) = patch.user_agent {
            self.user_agent = value;
        }
    }
}

fn default_user_agent() -> String {
    format!("bundlekit/{}", crate::VERSION)
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigPatch {
    pub store: Option<StorePatch>,
    pub install: Option<InstallPatch>,
    pub http: Option<HttpPatch>,
    pub remotes: Option<Vec<Remote>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StorePatch {
    pub bundles_root: Option<PathBuf>,
    pub archives_directory: Option<PathBuf>,
    pub lock_wait_ms: Option<u64>,
    pub lock_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct InstallPatch {
    pub source_directory: Option<PathBuf>,
    pub default_context_key: Option<String>,
    pub imports_context_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct HttpPatch {
    pub cache_directory: Option<PathBuf>,
    pub user_agent: Option<String>,
}

// =============================================================================
// PROJECT REMOTES
// =============================================================================

/// Add or replace a remote in the project config file, keeping every other
/// setting in that file untouched.
pub fn save_project_remote(project_root: &Path, remote: &Remote) -> Result<PathBuf> {
    edit_project_remotes(project_root, |remotes| {
        merge_remotes(remotes, vec![remote.clone()]);
        true
    })
}

/// Remove a remote from the project config file. Returns whether it was
/// present.
pub fn remove_project_remote(project_root: &Path, name: &str) -> Result<bool> {
    let mut removed = false;
    edit_project_remotes(project_root, |remotes| {
        let before = remotes.len();
        remotes.retain(|remote| remote.name != name);
        removed = remotes.len() != before;
        removed
    })?;
    Ok(removed)
}

fn edit_project_remotes(
    project_root: &Path,
    edit: impl FnOnce(&mut Vec<Remote>) -> bool,
) -> Result<PathBuf> {
    let path = Config::project_path(project_root);
    let mut table: toml::Table = if path.exists() {
        let raw = std::fs::read_to_string(&path)
            .map_err(|err| BundleError::Config(format!("read config {}: {err}", path.display())))?;
        toml::from_str(&raw)
            .map_err(|err| BundleError::Config(format!("parse config {}: {err}", path.display())))?
    } else {
        toml::Table::new()
    };

    let mut remotes: Vec<Remote> = match table.remove("remotes") {
        Some(value) => value.try_into().map_err(|err| {
            BundleError::Config(format!("invalid remotes in {}: {err}", path.display()))
        })?,
        None => Vec::new(),
    };
    let changed = edit(&mut remotes);
    if !changed {
        return Ok(path);
    }

    if !remotes.is_empty() {
        let value = toml::Value::try_from(&remotes)
            .map_err(|err| BundleError::Config(format!("encode remotes: {err}")))?;
        table.insert("remotes".to_string(), value);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let rendered = toml::to_string_pretty(&table)
        .map_err(|err| BundleError::Config(format!("encode config: {err}")))?;
    std::fs::write(&path, rendered)?;
    Ok(path)
}

// =============================================================================
// ENVIRONMENT
// =============================================================================

fn env_path(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<PathBuf> {
    lookup(key).filter(|value| !value.is_empty()).map(PathBuf::from)
}

fn env_u64(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>> {
    match lookup(key) {
        Some(value) => value
            .parse::<u64>()
            .map(Some)
            .map_err(|err| BundleError::Config(format!("invalid {key} value {value}: {err}"))),
        None => Ok(None),
    }
}
