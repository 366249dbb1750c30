//! Engine configuration.
//!
//! A process-wide immutable configuration object, built once at startup and
//! passed explicitly to the components that need it. Loadable from TOML:
//!
//! ```toml
//! bare_dimension = "caption"
//! default_limit = 1000
//! max_in_list = 500
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// What a bare dimension name resolves to when both `$id` and `$caption`
/// forms exist.
///
/// The engine applies one policy everywhere: by default a bare `team`
/// means `team$caption`, matching what callers usually want displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BareDimension {
    /// Bare `team` resolves to `team$caption` (default).
    Caption,
    /// Bare `team` resolves to `team$id`.
    Id,
}

impl Default for BareDimension {
    fn default() -> Self {
        BareDimension::Caption
    }
}

/// Engine-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Resolution policy for bare dimension names.
    pub bare_dimension: BareDimension,

    /// Row limit applied when a request carries none.
    pub default_limit: Option<u64>,

    /// Maximum number of elements accepted in an `in` / `not in` list.
    pub max_in_list: Option<usize>,
}

impl EngineConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}
