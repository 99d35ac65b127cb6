//! Project configuration (`rbxtree.yaml`).
//!
//! Every field has a default, so a missing file is not an error. The CLI
//! layers its flags on top of whatever was loaded here.
//!
//! ```yaml
//! server_url: http://localhost:44755
//! batch_size: 50
//! batch_timeout_secs: 300
//! services: [Workspace, ReplicatedStorage]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::graph::ServiceSet;

/// File name looked up in the project directory (the parent of `src/`).
pub const CONFIG_FILE: &str = "rbxtree.yaml";

pub const DEFAULT_SERVER_URL: &str = "http://localhost:44755";
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Settings for a sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub server_url: String,
    pub batch_size: usize,
    pub health_timeout_secs: u64,
    pub batch_timeout_secs: u64,
    pub command_timeout_secs: u64,
    pub services: ServiceSet,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            health_timeout_secs: 5,
            batch_timeout_secs: 300,
            command_timeout_secs: 30,
            services: ServiceSet::default(),
        }
    }
}

impl SyncConfig {
    /// Load `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: SyncConfig =
            serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Look for [`CONFIG_FILE`] beside the source root.
    pub fn discover(source_root: &Path) -> Result<Self, ConfigError> {
        match source_root.parent() {
            Some(project) => Self::load(&project.join(CONFIG_FILE)),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "batch_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.server_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "server_url",
                reason: "must not be empty".to_string(),
            });
        }
        let timeouts = [
            ("health_timeout_secs", self.health_timeout_secs),
            ("batch_timeout_secs", self.batch_timeout_secs),
            ("command_timeout_secs", self.command_timeout_secs),
        ];
        for (field, secs) in timeouts {
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "timeout must be at least 1 second".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Default working directories under `~/rbxsync/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultDirs {
    pub home: PathBuf,
}

impl DefaultDirs {
    pub fn from_home() -> Result<Self, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(Self { home })
    }

    pub fn at(home: &Path) -> Self {
        Self {
            home: home.to_path_buf(),
        }
    }

    /// Where the extractor drops `extract_*` directories.
    pub fn extractions(&self) -> PathBuf {
        self.home.join("rbxsync").join(".rbxsync")
    }

    pub fn consolidated(&self) -> PathBuf {
        self.home.join("rbxsync").join("output")
    }

    pub fn project(&self) -> PathBuf {
        self.home.join("rbxsync").join("game_project")
    }

    /// Most recently modified `extract_*` directory, if any.
    pub fn latest_extraction(&self) -> Option<PathBuf> {
        let entries = std::fs::read_dir(self.extractions()).ok()?;
        entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter(|e| e.file_name().to_string_lossy().starts_with("extract_"))
            .filter_map(|e| {
                let modified = e.metadata().and_then(|m| m.modified()).ok()?;
                Some((modified, e.path()))
            })
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
            .map(|(_, path)| path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = SyncConfig::load(&tmp.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.batch_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE);
        std::fs::write(&path, "batch_size: 10\nservices: [Game]\n").unwrap();

        let config = SyncConfig::load(&path).unwrap();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);
        assert!(config.services.contains("Game"));
        assert!(!config.services.contains("Workspace"));
    }

    #[test]
    fn zero_batch_size_is_invalid() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE);
        std::fs::write(&path, "batch_size: 0\n").unwrap();
        let err = SyncConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "batch_size", .. }));
    }

    #[rstest]
    #[case("health_timeout_secs")]
    #[case("batch_timeout_secs")]
    #[case("command_timeout_secs")]
    fn zero_timeout_is_invalid(#[case] key: &'static str) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE);
        std::fs::write(&path, format!("{key}: 0\n")).unwrap();
        let err = SyncConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field, .. } if field == key));
    }

    #[test]
    fn malformed_yaml_reports_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE);
        std::fs::write(&path, "batch_size: [unclosed").unwrap();
        let err = SyncConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains(CONFIG_FILE));
    }

    #[test]
    fn discover_reads_beside_source_root() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE), "server_url: http://host:1\n").unwrap();
        let config = SyncConfig::discover(&src).unwrap();
        assert_eq!(config.server_url, "http://host:1");
    }

    #[test]
    fn latest_extraction_picks_newest_dir() {
        let home = TempDir::new().unwrap();
        let dirs = DefaultDirs::at(home.path());
        assert!(dirs.latest_extraction().is_none());

        let old = dirs.extractions().join("extract_1");
        std::fs::create_dir_all(&old).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let new = dirs.extractions().join("extract_2");
        std::fs::create_dir_all(&new).unwrap();
        std::fs::create_dir_all(dirs.extractions().join("other")).unwrap();

        assert_eq!(dirs.latest_extraction(), Some(new));
    }
}
