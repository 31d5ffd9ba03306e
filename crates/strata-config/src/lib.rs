//! Strata configuration
//!
//! Settings are read from `strata.toml`, then overridden by `STRATA_*`
//! environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file, looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = "strata.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StrataConfig {
    /// Backend and device capability settings
    pub rendering: RenderingConfig,
    /// Debug overlays
    pub debug: DebugConfig,
    /// Output of the snapshot tool
    pub snapshot: SnapshotConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// CPU rasterizer, always available.
    #[default]
    Software,
    Wgpu,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "software" => Ok(Self::Software),
            "wgpu" | "gpu" => Ok(Self::Wgpu),
            other => Err(format!("unknown backend `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderingConfig {
    pub backend: BackendKind,
    /// Advanced blends read the destination in the shader instead of
    /// through a copy of the pass texture.
    pub framebuffer_fetch: bool,
    pub texture_blits: bool,
    pub mipmap_generation: bool,
    /// Largest texture side the allocator hands out
    pub max_texture_size: Option<u32>,
}

impl Default for RenderingConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Software,
            framebuffer_fetch: false,
            texture_blits: true,
            mipmap_generation: true,
            max_texture_size: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DebugConfig {
    /// Draw a checkerboard over every offscreen layer
    pub offscreen_checkerboard: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub width: u32,
    pub height: u32,
    pub output: PathBuf,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            output: PathBuf::from("strata-snapshot.png"),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

impl StrataConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `strata.toml` from the current directory. A missing file means
    /// defaults; a broken one is reported and also falls back to defaults.
    pub fn load_or_default() -> Self {
        match Self::load_from_file(DEFAULT_CONFIG_FILE) {
            Ok(config) => config,
            Err(ConfigError::Read { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                Self::default()
            }
            Err(err) => {
                eprintln!("strata: {err}; using default configuration");
                Self::default()
            }
        }
    }

    /// Environment variables take precedence over file values.
    pub fn merge_with_env(&mut self) {
        self.merge_with_vars(|name| std::env::var(name).ok());
    }

    /// Applies overrides from `lookup`, keyed by `STRATA_*` variable names.
    /// Values that fail to parse are ignored.
    pub fn merge_with_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Rendering settings
        if let Some(val) = lookup("STRATA_BACKEND") {
            if let Ok(backend) = val.parse() {
                self.rendering.backend = backend;
            }
        }
        if let Some(val) = lookup("STRATA_FRAMEBUFFER_FETCH") {
            self.rendering.framebuffer_fetch = parse_flag(&val);
        }
        if let Some(val) = lookup("STRATA_TEXTURE_BLITS") {
            self.rendering.texture_blits = parse_flag(&val);
        }
        if let Some(val) = lookup("STRATA_MIPMAP_GENERATION") {
            self.rendering.mipmap_generation = parse_flag(&val);
        }
        if let Some(val) = lookup("STRATA_MAX_TEXTURE_SIZE") {
            if let Ok(size) = val.parse::<u32>() {
                self.rendering.max_texture_size = Some(size);
            }
        }

        if let Some(val) = lookup("STRATA_OFFSCREEN_CHECKERBOARD") {
            self.debug.offscreen_checkerboard = parse_flag(&val);
        }

        // Snapshot settings
        if let Some(val) = lookup("STRATA_SNAPSHOT_WIDTH") {
            if let Ok(width) = val.parse::<u32>() {
                self.snapshot.width = width;
            }
        }
        if let Some(val) = lookup("STRATA_SNAPSHOT_HEIGHT") {
            if let Ok(height) = val.parse::<u32>() {
                self.snapshot.height = height;
            }
        }
        if let Some(path) = lookup("STRATA_SNAPSHOT_OUTPUT") {
            self.snapshot.output = PathBuf::from(path);
        }
    }

    /// Load `strata.toml` (or defaults), then apply environment overrides.
    pub fn load() -> Self {
        let mut config = Self::load_or_default();
        config.merge_with_env();
        config
    }
}
