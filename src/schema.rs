//! Schema of the optional harness config file.
//!
//! The config file lives next to the fixtures (`iotest.yaml`, `iotest.yml` or
//! `iotest.toml`) and provides defaults that command-line flags override.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Harness-level configuration shared by every test in a fixture folder.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    /// Executable of the program under test followed by its fixed arguments.
    #[serde(default)]
    pub main: Vec<String>,

    /// Default timeout in seconds for every phase of every test.
    /// Use -1 to wait indefinitely. A `.timeout` fixture overrides it per test.
    #[serde(default)]
    pub timeout: Option<i64>,

    /// Custom fixture extensions, exactly one per role, in role order:
    /// stdin, stdout, stderr, arguments, exit code, stdin generator,
    /// reference solver, timeout, run directory, input files, output files,
    /// environment, description.
    #[serde(default)]
    pub extensions: Option<Vec<String>>,

    /// Environment variables set for every phase. A `.envmap` fixture
    /// overrides individual keys per test.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Generate the JSON schema of the config file.
pub fn generate_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(HarnessConfig)
}
