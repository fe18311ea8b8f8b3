//! Install-time bundle descriptors.
//!
//! ```yaml
//! id: example/bundle
//! name: Example
//! version: 2
//! includes:
//!   - http://example.org/ctx/a
//! patterns:
//!   - glob:http://example.org/ctx/data-*
//!   - rgx:^http://example\.org/extra/\d+$
//! files:
//!   root: data
//!   includes: [README.md]
//!   patterns: ["docs/*.txt"]
//! dependencies:
//!   - other/bundle
//!   - { id: pinned/bundle, version: 3 }
//! ```

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;

use crate::bundler::manifest::DependencyRef;
use crate::error::{BundleError, Result};

/// Predicate over context identifiers.
#[derive(Debug, Clone)]
pub enum ContextPattern {
    Glob(glob::Pattern),
    Regex(Regex),
}

impl ContextPattern {
    /// Parse `rgx:<regex>` or `glob:<glob>`; unprefixed input is a glob.
    pub fn parse(input: &str) -> Result<Self> {
        if let Some(expr) = input.strip_prefix("rgx:") {
            let regex = Regex::new(expr).map_err(|err| {
                BundleError::InvalidDescriptor(format!("invalid regex pattern {expr:?}: {err}"))
            })?;
            return Ok(Self::Regex(regex));
        }
        let expr = input.strip_prefix("glob:").unwrap_or(input);
        let pattern = glob::Pattern::new(expr).map_err(|err| {
            BundleError::InvalidDescriptor(format!("invalid glob pattern {expr:?}: {err}"))
        })?;
        Ok(Self::Glob(pattern))
    }

    pub fn matches(&self, context: &str) -> bool {
        match self {
            Self::Glob(pattern) => pattern.matches(context),
            Self::Regex(regex) => regex.is_match(context),
        }
    }
}

/// Files copied into a bundle, relative to a source directory.
#[derive(Debug, Clone, Default)]
pub struct FileSelector {
    /// Overrides the installer's source directory when set; relative roots
    /// resolve against it.
    pub root: Option<PathBuf>,
    pub includes: Vec<PathBuf>,
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Descriptor {
    pub id: String,
    pub name: String,
    pub version: u64,
    pub description: Option<String>,
    pub includes: Vec<String>,
    pub patterns: Vec<ContextPattern>,
    pub files: FileSelector,
    pub dependencies: Vec<DependencyRef>,
}

impl Descriptor {
    /// A descriptor for `id` at version 1 selecting nothing.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            version: 1,
            description: None,
            includes: Vec::new(),
            patterns: Vec::new(),
            files: FileSelector::default(),
            dependencies: Vec::new(),
        }
    }

    #[must_use]
    pub const fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn include(mut self, context: impl Into<String>) -> Self {
        self.includes.push(context.into());
        self
    }

    pub fn pattern(mut self, pattern: &str) -> Result<Self> {
        self.patterns.push(ContextPattern::parse(pattern)?);
        Ok(self)
    }

    #[must_use]
    pub fn include_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.includes.push(path.into());
        self
    }

    #[must_use]
    pub fn file_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.files.patterns.push(pattern.into());
        self
    }

    #[must_use]
    pub fn depends_on(mut self, id: impl Into<String>, version: Option<u64>) -> Self {
        self.dependencies.push(DependencyRef {
            id: id.into(),
            version,
        });
        self
    }

    /// Whether `context` is selected by an include or a pattern.
    pub fn selects_context(&self, context: &str) -> bool {
        self.includes.iter().any(|inc| inc == context)
            || self.patterns.iter().any(|p| p.matches(context))
    }

    pub fn from_yaml_str(input: &str) -> Result<Self> {
        let raw: RawDescriptor = serde_yaml::from_str(input)?;
        raw.try_into()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|err| {
            BundleError::InvalidDescriptor(format!("read {}: {err}", path.display()))
        })?;
        Self::from_yaml_str(&content)
    }
}

#[derive(Deserialize)]
struct RawDescriptor {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<u64>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    includes: Vec<String>,
    #[serde(default)]
    patterns: Vec<String>,
    #[serde(default)]
    files: Option<RawFiles>,
    #[serde(default)]
    dependencies: Vec<RawDependency>,
}

#[derive(Deserialize, Default)]
struct RawFiles {
    #[serde(default)]
    root: Option<PathBuf>,
    #[serde(default)]
    includes: Vec<PathBuf>,
    #[serde(default)]
    patterns: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDependency {
    Bare(String),
    Full(DependencyRef),
}

impl TryFrom<RawDescriptor> for Descriptor {
    type Error = BundleError;

    fn try_from(raw: RawDescriptor) -> Result<Self> {
        if raw.id.trim().is_empty() {
            return Err(BundleError::InvalidDescriptor("id must be non-empty".to_string()));
        }
        let version = raw.version.unwrap_or(1);
        if version == 0 {
            return Err(BundleError::InvalidDescriptor(
                "version must be a positive integer".to_string(),
            ));
        }
        let patterns = raw
            .patterns
            .iter()
            .map(|p| ContextPattern::parse(p))
            .collect::<Result<Vec<_>>>()?;
        let files = raw.files.unwrap_or_default();
        let dependencies = raw
            .dependencies
            .into_iter()
            .map(|dep| match dep {
                RawDependency::Bare(id) => DependencyRef { id, version: None },
                RawDependency::Full(dep) => dep,
            })
            .collect();

        Ok(Self {
            name: raw.name.unwrap_or_else(|| raw.id.clone()),
            id: raw.id,
            version,
            description: raw.description,
            includes: raw.includes,
            patterns,
            files: FileSelector {
                root: files.root,
                includes: files.includes,
                patterns: files.patterns,
            },
            dependencies,
        })
    }
}
