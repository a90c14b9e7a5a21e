//! Engine configuration discovery

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pulse_engine::EngineConfig;
use tracing::debug;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load the engine config from `explicit`, else the user config file,
    /// else defaults
    pub fn load(explicit: Option<&Path>) -> Result<EngineConfig> {
        if let Some(path) = explicit {
            return EngineConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()));
        }

        if let Some(user_path) = Self::user_config_path()
            && user_path.exists()
        {
            debug!(path = %user_path.display(), "Loading user config");
            return EngineConfig::load(&user_path)
                .with_context(|| format!("Failed to load config from {}", user_path.display()));
        }

        Ok(EngineConfig::default())
    }

    /// Get user config path (platform-specific)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("pulse").join("pulse.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn explicit_path_wins() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[windows]\nchange_days = 5").unwrap();

        let config = ConfigLoader::load(Some(file.path())).unwrap();
        assert_eq!(config.windows.change_days, 5);
    }

    #[test]
    fn invalid_explicit_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[windows]\nchange_days = 0").unwrap();

        let err = ConfigLoader::load(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("Failed to load config"));
    }

    #[test]
    fn user_config_path_ends_with_pulse_toml() {
        if let Some(path) = ConfigLoader::user_config_path() {
            assert!(path.ends_with("pulse/pulse.toml"));
        }
    }
}
