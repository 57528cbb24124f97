//! CLI configuration loaded from environment variables.
//!
//! Everything has a default so the demo runs with zero configuration.

use std::path::PathBuf;

/// Demo configuration.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Directory for the file-backed secure stores. When unset, each
    /// simulated device keeps its keys in memory only.
    /// Env: `CAUSERIE_DATA_DIR`
    pub data_dir: Option<PathBuf>,
}

impl CliConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("CAUSERIE_DATA_DIR") {
            if !dir.is_empty() {
                config.data_dir = Some(PathBuf::from(dir));
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}
