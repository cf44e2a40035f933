//! Process configuration and the schedule descriptor file.
//!
//! The binary fills `AppConfig` from flags and environment; everything here
//! is plain data plus validation so it can be built directly in tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::app::UploadPolicy;
use crate::domain::JobDescriptor;
use crate::error::ConfigError;

pub const DEFAULT_SCHEDULE_FILE: &str = "config/schedule.json";
pub const DEFAULT_DB_DIR: &str = "data/things";
pub const DEFAULT_UPLOAD_DIR: &str = "public/uploads";
pub const DEFAULT_PER_PAGE: usize = 5;

/// Logging settings consumed by `observability::init_logging`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset, e.g. `info` or
    /// `depot_core=debug,info`.
    pub level: String,
    /// Directory for the daily-rolling log file. Console only when unset.
    pub dir: Option<PathBuf>,
    pub file_name: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
            file_name: "app.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Base for every relative path below, and for the `path` attribute of
    /// stored records.
    pub root_dir: PathBuf,
    pub workers: usize,
    pub schedule_file: PathBuf,
    pub db_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub upload_limit_bytes: u64,
    pub per_page: usize,
    pub log: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            workers: 1,
            schedule_file: PathBuf::from(DEFAULT_SCHEDULE_FILE),
            db_dir: PathBuf::from(DEFAULT_DB_DIR),
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            upload_limit_bytes: crate::app::uploads::DEFAULT_MAX_BYTES,
            per_page: DEFAULT_PER_PAGE,
            log: LogConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::InvalidWorkerCount(self.workers));
        }
        if self.per_page == 0 {
            return Err(ConfigError::Invalid {
                name: "FETCH_PER_PAGE",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.upload_limit_bytes == 0 {
            return Err(ConfigError::Invalid {
                name: "UPLOAD_LIMIT_BYTES",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.log.file_name.is_empty() {
            return Err(ConfigError::Invalid {
                name: "APP_LOG_FILE_NAME",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Pin `root_dir` to an absolute path against the current directory.
    pub fn absolutize(mut self) -> Result<Self, ConfigError> {
        self.root_dir = std::path::absolute(&self.root_dir).map_err(|e| ConfigError::Invalid {
            name: "APP_ROOT_DIR",
            reason: e.to_string(),
        })?;
        Ok(self)
    }

    /// Absolute paths pass through; relative ones hang off `root_dir`.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root_dir.join(path)
        }
    }

    pub fn schedule_path(&self) -> PathBuf {
        self.resolve(&self.schedule_file)
    }

    pub fn db_path(&self) -> PathBuf {
        self.resolve(&self.db_dir)
    }

    pub fn upload_path(&self) -> PathBuf {
        self.resolve(&self.upload_dir)
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            dir: self.log.dir.as_ref().map(|dir| self.resolve(dir)),
            ..self.log.clone()
        }
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy::default().with_max_bytes(self.upload_limit_bytes)
    }
}

/// Read the `{"<job name>": "<cron expression>"}` schedule file.
///
/// A missing file means no jobs. Unreadable or malformed files are errors;
/// expressions themselves are validated when the jobs are registered.
pub fn load_schedule(path: &Path) -> Result<Vec<JobDescriptor>, ConfigError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "no schedule file, no jobs configured");
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(ConfigError::ScheduleRead {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    parse_schedule(&bytes).map_err(|source| ConfigError::ScheduleParse {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_schedule(bytes: &[u8]) -> Result<Vec<JobDescriptor>, serde_json::Error> {
    let entries: BTreeMap<String, String> = serde_json::from_slice(bytes)?;
    Ok(entries
        .into_iter()
        .map(|(name, schedule)| JobDescriptor::new(name, schedule))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_are_valid() {
        AppConfig::default().validate().unwrap();
    }

    #[rstest]
    #[case::no_workers(AppConfig { workers: 0, ..AppConfig::default() }, "WORKERS")]
    #[case::no_page(AppConfig { per_page: 0, ..AppConfig::default() }, "FETCH_PER_PAGE")]
    #[case::no_limit(AppConfig { upload_limit_bytes: 0, ..AppConfig::default() }, "UPLOAD_LIMIT_BYTES")]
    fn invalid_settings_are_rejected(#[case] config: AppConfig, #[case] setting: &str) {
        let err = config.validate().unwrap_err();
        match err {
            ConfigError::InvalidWorkerCount(0) => assert_eq!(setting, "WORKERS"),
            ConfigError::Invalid { name, .. } => assert_eq!(name, setting),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn relative_paths_resolve_against_root() {
        let config = AppConfig {
            root_dir: PathBuf::from("/srv/depot"),
            log: LogConfig {
                dir: Some(PathBuf::from("logs")),
                ..LogConfig::default()
            },
            ..AppConfig::default()
        };

        assert_eq!(config.db_path(), PathBuf::from("/srv/depot/data/things"));
        assert_eq!(config.schedule_path(), PathBuf::from("/srv/depot/config/schedule.json"));
        assert_eq!(config.resolve("/tmp/x"), PathBuf::from("/tmp/x"));
        assert_eq!(config.log_config().dir, Some(PathBuf::from("/srv/depot/logs")));
    }

    #[test]
    fn default_root_becomes_absolute() {
        let config = AppConfig::default().absolutize().unwrap();
        let cwd = std::env::current_dir().unwrap();

        assert!(config.root_dir.is_absolute());
        assert!(config.upload_path().is_absolute());
        assert_eq!(config.root_dir.components().collect::<PathBuf>(), cwd);

        let pinned = AppConfig {
            root_dir: PathBuf::from("/srv/depot"),
            ..AppConfig::default()
        };
        assert_eq!(pinned.absolutize().unwrap().root_dir, PathBuf::from("/srv/depot"));
    }

    #[test]
    fn schedule_file_maps_names_to_expressions() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("schedule.json");
        std::fs::write(&path, r#"{"clean_up": "30 23 * * *"}"#).unwrap();

        let jobs = load_schedule(&path).unwrap();

        assert_eq!(jobs, vec![JobDescriptor::new("clean_up", "30 23 * * *")]);
    }

    #[test]
    fn missing_schedule_file_means_no_jobs() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(load_schedule(&tmp.path().join("absent.json")).unwrap().is_empty());
    }

    #[rstest]
    #[case::not_json("clean_up: 30 23 * * *")]
    #[case::not_a_map(r#"["clean_up"]"#)]
    #[case::non_string_schedule(r#"{"clean_up": 5}"#)]
    fn malformed_schedule_file_is_an_error(#[case] content: &str) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("schedule.json");
        std::fs::write(&path, content).unwrap();

        let err = load_schedule(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ScheduleParse { .. }));
    }
}
