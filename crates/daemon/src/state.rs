use std::path::{Path, PathBuf};

use crate::config::{Config, ConfigError};

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const CACHE_DIR_NAME: &str = "cache";
pub const REPORT_DIR_NAME: &str = "reports";
pub const LOG_DIR_NAME: &str = "logs";

/// Resolved work directory layout plus the loaded configuration
#[derive(Debug, Clone)]
pub struct AppState {
    pub work_dir: PathBuf,
    pub config_path: PathBuf,
    /// Local replicas of remote files
    pub cache_dir: PathBuf,
    /// Diagnostic dumps
    pub report_dir: PathBuf,
    pub log_dir: PathBuf,
    pub config: Config,
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("could not determine a data directory for this platform")]
    NoDataDirectory,
    #[error("already initialized at {0}")]
    AlreadyInitialized(PathBuf),
    #[error("not initialized: {0} does not exist (run `bucketfs init`)")]
    NotInitialized(PathBuf),
    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AppState {
    /// `custom`, or the platform data directory
    pub fn work_dir(custom: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(dir) = custom {
            return Ok(dir);
        }
        directories::ProjectDirs::from("", "", "bucketfs")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or(StateError::NoDataDirectory)
    }

    /// Create the work directory layout and write `config`
    pub fn init(custom: Option<PathBuf>, config: Option<Config>) -> Result<Self, StateError> {
        let work_dir = Self::work_dir(custom)?;
        let config_path = work_dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Err(StateError::AlreadyInitialized(work_dir));
        }

        let mut config = config.unwrap_or_default();
        config.clamp();
        let state = Self::layout(work_dir, config);
        state.create_dirs()?;
        state.config.save(&state.config_path)?;
        tracing::info!(work_dir = %state.work_dir.display(), "initialized work directory");
        Ok(state)
    }

    /// Load an initialized work directory
    pub fn load(custom: Option<PathBuf>) -> Result<Self, StateError> {
        let work_dir = Self::work_dir(custom)?;
        let config_path = work_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(StateError::NotInitialized(config_path));
        }
        let config = Config::load(&config_path)?;
        let state = Self::layout(work_dir, config);
        state.create_dirs()?;
        Ok(state)
    }

    fn layout(work_dir: PathBuf, config: Config) -> Self {
        Self {
            config_path: work_dir.join(CONFIG_FILE_NAME),
            cache_dir: work_dir.join(CACHE_DIR_NAME),
            report_dir: work_dir.join(REPORT_DIR_NAME),
            log_dir: work_dir.join(LOG_DIR_NAME),
            work_dir,
            config,
        }
    }

    fn create_dirs(&self) -> Result<(), StateError> {
        for dir in [
            &self.work_dir,
            &self.cache_dir,
            &self.report_dir,
            &self.log_dir,
        ] {
            create_dir(dir)?;
        }
        Ok(())
    }
}

fn create_dir(path: &Path) -> Result<(), StateError> {
    std::fs::create_dir_all(path).map_err(|source| StateError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let work_dir = dir.path().join("work");

        let config = Config {
            readonly: true,
            ..Default::default()
        };
        let state = AppState::init(Some(work_dir.clone()), Some(config)).unwrap();
        assert!(state.cache_dir.is_dir());
        assert!(state.report_dir.is_dir());
        assert!(state.config_path.is_file());

        let loaded = AppState::load(Some(work_dir.clone())).unwrap();
        assert!(loaded.config.readonly);

        assert!(matches!(
            AppState::init(Some(work_dir), None),
            Err(StateError::AlreadyInitialized(_))
        ));
    }

    #[test]
    fn test_load_requires_init() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            AppState::load(Some(dir.path().to_path_buf())),
            Err(StateError::NotInitialized(_))
        ));
    }
}
