//! Layered configuration system
//!
//! Config is loaded with three layers of precedence (highest wins):
//! 1. Environment variables: `FABLE_SERVICE_URL`, `FABLE_STORAGE_ROOT`, ...
//! 2. Project-local: `.fable/config.toml`
//! 3. Global: `~/.fable/config.toml`

use fable_core::{FableError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_SERVICE_URL: &str = "http://localhost:8000";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_READ_TIMEOUT_SECS: u64 = 900;
const DEFAULT_SERVICE_WORKDIR: &str = "../python";
const DEFAULT_STORAGE_ROOT: &str = ".fable/objects";
const DEFAULT_PUBLIC_URL: &str = "https://fable-assets.s3.amazonaws.com";
const DEFAULT_RECORDS_ROOT: &str = ".fable/records";
const DEFAULT_PLACEHOLDER_URL: &str = "https://picsum.photos/800/600";
const DEFAULT_VOICE: &str = "alloy";
const DEFAULT_CHILD_NAME: &str = "our child";

/// Substrings marking legitimate working/temp locations or project directories
pub const DEFAULT_ALLOW_MARKERS: &[&str] = &[
    "/tmp/",
    "/var/folders/",
    "/temp/",
    "temp",
    "fable",
    "python",
];

/// Sensitive system prefixes a generated asset may never live under
pub const DEFAULT_DENY_PREFIXES: &[&str] = &[
    "/etc/",
    "/bin/",
    "/usr/bin/",
    "/System/",
    "C:\\Windows\\",
    "C:\\Program Files\\",
    "/root/",
    "/home/",
];

pub const DEFAULT_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// `[service]` section as written in a config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceSection {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    #[serde(default)]
    pub read_timeout_secs: Option<u64>,
    #[serde(default)]
    pub workdir: Option<PathBuf>,
}

/// `[storage]` section as written in a config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSection {
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default)]
    pub public_url: Option<String>,
    #[serde(default)]
    pub presign_secret: Option<String>,
}

/// `[records]` section as written in a config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordsSection {
    #[serde(default)]
    pub root: Option<PathBuf>,
}

/// `[paths]` section as written in a config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsSection {
    #[serde(default)]
    pub allow_markers: Option<Vec<String>>,
    #[serde(default)]
    pub deny_prefixes: Option<Vec<String>>,
    #[serde(default)]
    pub extensions: Option<Vec<String>>,
}

/// `[generation]` section as written in a config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationSection {
    #[serde(default)]
    pub placeholder_url: Option<String>,
    #[serde(default)]
    pub default_voice: Option<String>,
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
    #[serde(default)]
    pub default_child_name: Option<String>,
}

/// Top-level config file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FableConfigFile {
    #[serde(default)]
    pub service: ServiceSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub records: RecordsSection,
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub generation: GenerationSection,
}

/// Generation service connection settings
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Working directory of the generation service, for relative asset paths
    pub workdir: PathBuf,
}

/// Object storage settings
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub public_url: String,
    pub presign_secret: String,
}

/// Path safety policy settings
#[derive(Debug, Clone)]
pub struct PathsConfig {
    pub allow_markers: Vec<String>,
    pub deny_prefixes: Vec<String>,
    pub extensions: Vec<String>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            allow_markers: to_strings(DEFAULT_ALLOW_MARKERS),
            deny_prefixes: to_strings(DEFAULT_DENY_PREFIXES),
            extensions: to_strings(DEFAULT_IMAGE_EXTENSIONS),
        }
    }
}

/// Generation defaults
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub placeholder_url: String,
    pub default_voice: String,
    /// Directory for scoped temporary files
    pub scratch_dir: PathBuf,
    pub default_child_name: String,
}

/// Resolved configuration with environment variable overrides applied
#[derive(Debug, Clone)]
pub struct FableConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub records_root: PathBuf,
    pub paths: PathsConfig,
    pub generation: GenerationConfig,
}

impl Default for FableConfig {
    fn default() -> Self {
        Self::resolve(FableConfigFile::default())
    }
}

impl FableConfig {
    /// Load config with layered precedence: global < project < env vars
    pub fn load() -> Result<Self> {
        let mut config = FableConfigFile::default();

        // Layer 1: Global config (~/.fable/config.toml)
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                let global = Self::load_file(&global_path)?;
                Self::merge_into(&mut config, global);
            }
        }

        // Layer 2: Project-local config (.fable/config.toml)
        let local_path = PathBuf::from(".fable/config.toml");
        if local_path.exists() {
            let local = Self::load_file(&local_path)?;
            Self::merge_into(&mut config, local);
        }

        // Layer 3: Environment variable overrides
        Self::apply_env_overrides(&mut config);

        Ok(Self::resolve(config))
    }

    /// Load config from a specific file path only (for testing)
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let mut config = Self::load_file(path)?;
        Self::apply_env_overrides(&mut config);
        Ok(Self::resolve(config))
    }

    /// Rebase every relative storage location under `dir`
    pub fn rooted_at(mut self, dir: &Path) -> Self {
        if self.storage.root.is_relative() {
            self.storage.root = dir.join(&self.storage.root);
        }
        if self.records_root.is_relative() {
            self.records_root = dir.join(&self.records_root);
        }
        self
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".fable").join("config.toml"))
    }

    fn load_file(path: &Path) -> Result<FableConfigFile> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            FableError::ConfigError(format!("Failed to parse config {}: {}", path.display(), e))
        })
    }

    fn merge_into(base: &mut FableConfigFile, overlay: FableConfigFile) {
        fn take<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        take(&mut base.service.base_url, overlay.service.base_url);
        take(
            &mut base.service.connect_timeout_secs,
            overlay.service.connect_timeout_secs,
        );
        take(&mut base.service.read_timeout_secs, overlay.service.read_timeout_secs);
        take(&mut base.service.workdir, overlay.service.workdir);

        take(&mut base.storage.root, overlay.storage.root);
        take(&mut base.storage.public_url, overlay.storage.public_url);
        take(&mut base.storage.presign_secret, overlay.storage.presign_secret);

        take(&mut base.records.root, overlay.records.root);

        take(&mut base.paths.allow_markers, overlay.paths.allow_markers);
        take(&mut base.paths.deny_prefixes, overlay.paths.deny_prefixes);
        take(&mut base.paths.extensions, overlay.paths.extensions);

        take(&mut base.generation.placeholder_url, overlay.generation.placeholder_url);
        take(&mut base.generation.default_voice, overlay.generation.default_voice);
        take(&mut base.generation.scratch_dir, overlay.generation.scratch_dir);
        take(
            &mut base.generation.default_child_name,
            overlay.generation.default_child_name,
        );
    }

    fn apply_env_overrides(config: &mut FableConfigFile) {
        let env = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        if let Some(url) = env("FABLE_SERVICE_URL") {
            config.service.base_url = Some(url);
        }
        if let Some(root) = env("FABLE_STORAGE_ROOT") {
            config.storage.root = Some(PathBuf::from(root));
        }
        if let Some(url) = env("FABLE_PUBLIC_URL") {
            config.storage.public_url = Some(url);
        }
        if let Some(secret) = env("FABLE_PRESIGN_SECRET") {
            config.storage.presign_secret = Some(secret);
        }
        if let Some(root) = env("FABLE_RECORDS_ROOT") {
            config.records.root = Some(PathBuf::from(root));
        }
        if let Some(dir) = env("FABLE_SCRATCH_DIR") {
            config.generation.scratch_dir = Some(PathBuf::from(dir));
        }
    }

    fn resolve(file: FableConfigFile) -> Self {
        let defaults = PathsConfig::default();

        FableConfig {
            service: ServiceConfig {
                base_url: file
                    .service
                    .base_url
                    .unwrap_or_else(|| DEFAULT_SERVICE_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                connect_timeout: Duration::from_secs(
                    file.service
                        .connect_timeout_secs
                        .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
                ),
                read_timeout: Duration::from_secs(
                    file.service
                        .read_timeout_secs
                        .unwrap_or(DEFAULT_READ_TIMEOUT_SECS),
                ),
                workdir: file
                    .service
                    .workdir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SERVICE_WORKDIR)),
            },
            storage: StorageConfig {
                root: file
                    .storage
                    .root
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_ROOT)),
                public_url: file
                    .storage
                    .public_url
                    .unwrap_or_else(|| DEFAULT_PUBLIC_URL.to_string()),
                presign_secret: file.storage.presign_secret.unwrap_or_default(),
            },
            records_root: file
                .records
                .root
                .unwrap_or_else(|| PathBuf::from(DEFAULT_RECORDS_ROOT)),
            paths: PathsConfig {
                allow_markers: file.paths.allow_markers.unwrap_or(defaults.allow_markers),
                deny_prefixes: file.paths.deny_prefixes.unwrap_or(defaults.deny_prefixes),
                extensions: file.paths.extensions.unwrap_or(defaults.extensions),
            },
            generation: GenerationConfig {
                placeholder_url: file
                    .generation
                    .placeholder_url
                    .unwrap_or_else(|| DEFAULT_PLACEHOLDER_URL.to_string()),
                default_voice: file
                    .generation
                    .default_voice
                    .unwrap_or_else(|| DEFAULT_VOICE.to_string()),
                scratch_dir: file
                    .generation
                    .scratch_dir
                    .unwrap_or_else(|| std::env::temp_dir().join("fable")),
                default_child_name: file
                    .generation
                    .default_child_name
                    .unwrap_or_else(|| DEFAULT_CHILD_NAME.to_string()),
            },
        }
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}
