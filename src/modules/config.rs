use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::constants::*;

/// Settings that shape how paths become commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsConfig {
    /// Program and arguments placed before the command text
    pub argv_prefix: Vec<String>,
    /// Text inserted between decoded path segments
    pub separator: String,
    /// Name of the entry that runs the command when opened
    pub terminal_name: String,
    /// Filesystem name reported to the kernel
    pub fs_name: String,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            argv_prefix: DEFAULT_ARGV_PREFIX.iter().map(|s| s.to_string()).collect(),
            separator: DEFAULT_SEPARATOR.to_string(),
            terminal_name: DEFAULT_TERMINAL_NAME.to_string(),
            fs_name: DEFAULT_FS_NAME.to_string(),
        }
    }
}

impl FsConfig {
    /// Loads a configuration from a JSON file.
    ///
    /// Missing fields take their default values.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: FsConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration can produce runnable commands.
    pub fn validate(&self) -> Result<()> {
        if self.argv_prefix.is_empty() {
            return Err(anyhow!("argv prefix must name a program"));
        }
        match self.terminal_name.as_str() {
            "" | "." | ".." => Err(anyhow!(
                "invalid terminal name {:?}",
                self.terminal_name
            )),
            name if name.contains('/') => Err(anyhow!(
                "terminal name must not contain '/': {:?}",
                name
            )),
            _ => Ok(()),
        }
    }
}
