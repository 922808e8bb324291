//! Config and fixture loader.
//!
//! Loads the optional harness config file and reads fixture files from disk.

use crate::error::SetupError;
use crate::schema::HarnessConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for config loading operations.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Failed to read the file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse YAML.
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// Failed to parse TOML.
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    /// Unsupported file extension.
    #[error("unsupported config format: {0} (expected .yaml, .yml, or .toml)")]
    UnsupportedFormat(String),
}

/// Config file names looked up in the fixture folder, in priority order.
pub const CONFIG_FILENAMES: [&str; 3] = ["iotest.yaml", "iotest.yml", "iotest.toml"];

/// Load a harness config from a file path.
pub fn load_config(path: &Path) -> Result<HarnessConfig, LoadError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let contents = std::fs::read_to_string(path)?;

    match ext {
        "yaml" | "yml" => Ok(serde_yaml::from_str(&contents)?),
        "toml" => Ok(toml::from_str(&contents)?),
        other => Err(LoadError::UnsupportedFormat(other.to_string())),
    }
}

/// Find the config file of a fixture folder, if there is one.
pub fn find_config(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Load the config of a fixture folder.
///
/// Returns `None` if the folder has no config file, `Err` if it exists but is invalid.
pub fn load_folder_config(dir: &Path) -> Result<Option<HarnessConfig>, LoadError> {
    find_config(dir).map(|path| load_config(&path)).transpose()
}

/// Read a fixture file as text.
pub fn read_fixture(path: &Path) -> Result<String, SetupError> {
    std::fs::read_to_string(path).map_err(|source| SetupError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a fixture file as a list of lines.
///
/// A trailing newline does not produce an empty last line; empty lines in
/// between are kept.
pub fn read_lines(path: &Path) -> Result<Vec<String>, SetupError> {
    Ok(read_fixture(path)?.lines().map(str::to_string).collect())
}

/// Read the first line of a fixture file, trimmed.
pub fn read_first_line(path: &Path) -> Result<String, SetupError> {
    read_fixture(path)?
        .lines()
        .next()
        .map(|line| line.trim().to_string())
        .ok_or_else(|| SetupError::EmptyFixture(path.to_path_buf()))
}
