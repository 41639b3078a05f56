use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::heap::{HeapConfig, DEFAULT_LARGE_ALLOC_WARNING};

pub const DEFAULT_INSTRUCTION_LIMIT: u32 = 1_000_000;

/// Settings for one interpreter instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Install the full debug hook and allow interactive breaks.
    pub debug: bool,
    /// Stop on the first Lua function of every protected call.
    pub break_on_entry: bool,
    pub max_heap_bytes: usize,
    pub initial_heap_bytes: usize,
    pub large_alloc_warning: usize,
    /// Instructions a protected call may run before it is aborted. 0 disables
    /// the limit.
    pub instruction_limit: u32,
}

impl Default for HostConfig {
    fn default() -> Self {
        let heap = HeapConfig::default();
        Self {
            debug: false,
            break_on_entry: true,
            max_heap_bytes: heap.max_bytes,
            initial_heap_bytes: heap.initial_bytes,
            large_alloc_warning: DEFAULT_LARGE_ALLOC_WARNING,
            instruction_limit: DEFAULT_INSTRUCTION_LIMIT,
        }
    }
}

impl HostConfig {
    pub fn heap(&self) -> HeapConfig {
        HeapConfig {
            max_bytes: self.max_heap_bytes,
            initial_bytes: self.initial_heap_bytes.min(self.max_heap_bytes),
            large_alloc_warning: self.large_alloc_warning,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Entry script, relative to `asset_root`.
    pub script: PathBuf,
    pub asset_root: PathBuf,
    /// Budget for each `update` call; falls back to the host limit when unset.
    pub update_instruction_limit: Option<u32>,
    pub draw_instruction_limit: Option<u32>,
    /// `update` calls per frame.
    pub speed: u32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            script: PathBuf::from("main.lua"),
            asset_root: PathBuf::from("."),
            update_instruction_limit: None,
            draw_instruction_limit: None,
            speed: 1,
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub host: HostConfig,
    pub scene: SceneConfig,
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: EngineConfig =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.max_heap_bytes == 0 {
            return Err(ConfigError::Invalid("host.max_heap_bytes must be non-zero".into()));
        }
        if self.host.initial_heap_bytes > self.host.max_heap_bytes {
            return Err(ConfigError::Invalid(format!(
                "host.initial_heap_bytes ({}) exceeds host.max_heap_bytes ({})",
                self.host.initial_heap_bytes, self.host.max_heap_bytes
            )));
        }
        if self.scene.speed == 0 {
            return Err(ConfigError::Invalid("scene.speed must be at least 1".into()));
        }
        Ok(())
    }
}
