//! Resolution and validation of file paths returned by the generation service
//!
//! The service runs in its own working directory and reports paths that may be
//! absolute, relative to that directory, or bare file names. Those strings come
//! from another process, so nothing is read or uploaded until the canonical
//! path has passed [`PathPolicy`].

use crate::config::PathsConfig;
use fable_core::{FableError, Result};
use std::path::{Path, PathBuf};

/// Finds the local file a service-reported path refers to
#[derive(Debug, Clone)]
pub struct PathResolver {
    roots: Vec<PathBuf>,
}

impl PathResolver {
    /// Search the current directory, the service workdir, the process
    /// working directory and the system temp directory, in that order
    pub fn new<P: AsRef<Path>>(service_workdir: P) -> Self {
        let mut roots = vec![PathBuf::from("."), service_workdir.as_ref().to_path_buf()];
        if let Ok(cwd) = std::env::current_dir() {
            roots.push(cwd);
        }
        roots.push(std::env::temp_dir());
        Self { roots }
    }

    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// First existing candidate, or the absolute form of `raw` when none exists
    pub fn resolve(&self, raw: &str) -> PathBuf {
        let raw = raw.trim();
        let direct = Path::new(raw);

        if direct.is_absolute() && direct.exists() {
            return direct.to_path_buf();
        }

        let relative = raw.strip_prefix("./").unwrap_or(raw);
        let by_root = self.roots.iter().map(|root| root.join(relative));
        let by_name = direct
            .file_name()
            .into_iter()
            .flat_map(|name| self.roots.iter().map(move |root| root.join(name)));

        if let Some(found) = by_root.chain(by_name).find(|candidate| candidate.exists()) {
            tracing::debug!(raw, resolved = %found.display(), "resolved service path");
            return found;
        }

        std::path::absolute(direct).unwrap_or_else(|_| direct.to_path_buf())
    }
}

/// Allow/deny rules a canonical asset path must satisfy
#[derive(Debug, Clone)]
pub struct PathPolicy {
    allow_markers: Vec<String>,
    deny_prefixes: Vec<String>,
    extensions: Vec<String>,
}

impl PathPolicy {
    pub fn from_config(config: &PathsConfig) -> Self {
        let lower = |values: &[String]| values.iter().map(|v| v.to_lowercase()).collect();
        Self {
            allow_markers: lower(&config.allow_markers),
            deny_prefixes: lower(&config.deny_prefixes),
            extensions: config
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    pub fn is_safe(&self, path: &Path) -> bool {
        self.ensure_safe(path).is_ok()
    }

    /// Canonicalize `path` and check it, returning the canonical path
    pub fn ensure_safe(&self, path: &Path) -> Result<PathBuf> {
        if !path.exists() {
            return Err(FableError::AssetNotFound(path.to_path_buf()));
        }
        let canonical = std::fs::canonicalize(path)?;
        self.check_canonical(&canonical)?;
        Ok(canonical)
    }

    /// Apply the rules to an already-canonical path
    pub fn check_canonical(&self, canonical: &Path) -> Result<()> {
        let reject = |reason: &str| {
            tracing::warn!(path = %canonical.display(), reason, "rejected asset path");
            Err(FableError::UnsafePath(canonical.to_path_buf()))
        };

        let has_image_ext = canonical
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.contains(&e.to_lowercase()))
            .unwrap_or(false);

        if self.is_denied(canonical) {
            return reject("system directory");
        }
        let allowed = has_image_ext || self.in_working_location(canonical);
        if !allowed {
            return reject("outside working locations");
        }
        if !has_image_ext {
            return reject("not an image file");
        }
        Ok(())
    }
}

impl PathPolicy {
    /// Whether a canonical path lies under a protected system directory
    pub fn is_denied(&self, canonical: &Path) -> bool {
        let text = canonical.to_string_lossy().to_lowercase();
        self.deny_prefixes.iter().any(|p| text.starts_with(p.as_str()))
    }

    /// Whether a canonical path lies in a scratch or service working location
    pub fn in_working_location(&self, canonical: &Path) -> bool {
        let text = canonical.to_string_lossy().to_lowercase();
        !self.is_denied(canonical) && self.allow_markers.iter().any(|m| text.contains(m.as_str()))
    }
}

impl Default for PathPolicy {
    fn default() -> Self {
        Self::from_config(&PathsConfig::default())
    }
}
