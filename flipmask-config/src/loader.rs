use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail, ensure};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{ACK_TOKEN_ENV, CONFIG_FILE_NAME, CONFIG_PATH_ENV, defaults};
use crate::debug::DebugConfig;

/// Root configuration document.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FlipConfig {
    #[serde(default)]
    pub transform: TransformConfig,
    #[serde(default)]
    pub approval: ApprovalConfig,
    #[serde(default)]
    pub debug: DebugConfig,
}

/// Settings for the backup-and-transform engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransformConfig {
    /// Bytes read from the backup per iteration.
    #[serde(default = "TransformConfig::default_chunk_size")]
    pub chunk_size: usize,
    /// Flush the output to disk before renaming it over the original.
    #[serde(default = "TransformConfig::default_sync_output")]
    pub sync_output: bool,
}

impl TransformConfig {
    const fn default_chunk_size() -> usize {
        defaults::CHUNK_SIZE
    }

    const fn default_sync_output() -> bool {
        defaults::SYNC_OUTPUT
    }
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            chunk_size: Self::default_chunk_size(),
            sync_output: Self::default_sync_output(),
        }
    }
}

/// Settings for the supervised approval daemon.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApprovalConfig {
    /// File inside the sandbox holding the acknowledgement token.
    #[serde(default = "ApprovalConfig::default_ack_file")]
    pub ack_file: String,
    /// Token the acknowledgement file must contain after trimming.
    #[serde(default = "ApprovalConfig::default_token")]
    pub token: String,
    /// Suffix identifying approval markers, `<target><suffix>`.
    #[serde(default = "ApprovalConfig::default_marker_suffix")]
    pub marker_suffix: String,
    /// Force dry runs for every approval, in addition to `--dry`.
    #[serde(default)]
    pub dry_run: bool,
}

impl ApprovalConfig {
    fn default_ack_file() -> String {
        defaults::ACK_FILE.to_string()
    }

    fn default_token() -> String {
        defaults::ACK_TOKEN.to_string()
    }

    fn default_marker_suffix() -> String {
        defaults::MARKER_SUFFIX.to_string()
    }
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            ack_file: Self::default_ack_file(),
            token: Self::default_token(),
            marker_suffix: Self::default_marker_suffix(),
            dry_run: false,
        }
    }
}

impl FlipConfig {
    /// Parse a TOML document and validate it.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.transform.chunk_size > 0,
            "transform.chunk_size must be greater than zero"
        );
        ensure!(
            !self.approval.token.trim().is_empty(),
            "approval.token must not be empty"
        );
        ensure!(
            !self.approval.marker_suffix.is_empty(),
            "approval.marker_suffix must not be empty"
        );

        let ack = Path::new(&self.approval.ack_file);
        let mut components = ack.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(()),
            _ => bail!(
                "approval.ack_file must be a plain file name, got {:?}",
                self.approval.ack_file
            ),
        }
    }

    /// Apply environment overrides. `lookup` is injected so callers (and
    /// tests) control where values come from.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(ACK_TOKEN_ENV) {
            let token = token.trim();
            if !token.is_empty() {
                debug!("approval token overridden from {}", ACK_TOKEN_ENV);
                self.approval.token = token.to_string();
            }
        }
    }
}

/// Locates, loads and validates the configuration.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: FlipConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration using the process environment.
    ///
    /// Resolution order: `explicit`, then `FLIPMASK_CONFIG_PATH`, then
    /// `<search_dir>/.flipmask.toml` when present, then defaults.
    pub fn load(explicit: Option<&Path>, search_dir: &Path) -> Result<Self> {
        Self::load_with_env(explicit, search_dir, |key| std::env::var(key).ok())
    }

    pub fn load_with_env<F>(explicit: Option<&Path>, search_dir: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_path = lookup(CONFIG_PATH_ENV)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);

        let mut manager = if let Some(path) = explicit {
            Self::load_from_file(path)?
        } else if let Some(path) = env_path {
            Self::load_from_file(&path).with_context(|| {
                format!(
                    "Failed to load configuration from {}={}",
                    CONFIG_PATH_ENV,
                    path.display()
                )
            })?
        } else {
            let candidate = search_dir.join(CONFIG_FILE_NAME);
            if candidate.is_file() {
                Self::load_from_file(&candidate)?
            } else {
                Self {
                    config: FlipConfig::default(),
                    config_path: None,
                }
            }
        };

        manager.config.apply_env_overrides(lookup);
        manager.config.validate()?;
        Ok(manager)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = FlipConfig::from_toml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(Self {
            config,
            config_path: Some(path.to_path_buf()),
        })
    }

    pub fn config(&self) -> &FlipConfig {
        &self.config
    }

    /// File the configuration came from, if any.
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn into_config(self) -> FlipConfig {
        self.config
    }
}
