//! Pipeline configuration: TOML file, then environment, then CLI overrides

use crate::error::{EtlError, Result};
use crate::storage::{LocalMirrorStore, ObjectStore};
use crate::types::{parse_compact_date, ProcessingWindow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// First date processed when the whole history is requested
pub fn history_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2010, 1, 1).expect("valid constant date")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Local directory mirroring the bucket; takes precedence over `endpoint`
    #[serde(default)]
    pub mirror_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_table")]
    pub table: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            table: default_table(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    #[serde(default = "default_map_files_dir")]
    pub map_files_dir: PathBuf,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub process_all: bool,
    #[serde(default)]
    pub deployment_date: Option<NaiveDate>,
}

fn default_output_root() -> PathBuf {
    PathBuf::from("/temp-output-directory/alternative/brain")
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("./output")
}

fn default_map_files_dir() -> PathBuf {
    PathBuf::from("./data/equity/usa/map_files")
}

fn default_table() -> String {
    "security_definitions".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            staging_dir: default_staging_dir(),
            map_files_dir: default_map_files_dir(),
            storage: StorageConfig::default(),
            database: DatabaseConfig::default(),
            process_all: false,
            deployment_date: None,
        }
    }
}

impl PipelineConfig {
    /// `~/.brain-etl/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".brain-etl").join("config.toml"))
    }

    /// Read `path`, or the default location when `None`. A missing default
    /// file yields the defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::from_file(&default),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EtlError::ConfigError(format!("Failed to read {}: {}", path.display(), e)))?;
        Ok(toml::from_str(&contents)?)
    }

    /// File (or defaults) with process environment overrides applied
    pub fn load_with_env(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from `lookup`, keyed by deployment variable name
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("BRAIN_OUTPUT_ROOT") {
            self.output_root = PathBuf::from(v);
        }
        if let Some(v) = get("BRAIN_STAGING_DIR") {
            self.staging_dir = PathBuf::from(v);
        }
        if let Some(v) = get("BRAIN_MAP_FILES_DIR") {
            self.map_files_dir = PathBuf::from(v);
        }
        if let Some(v) = get("BRAIN_S3_BUCKET_NAME") {
            self.storage.bucket = Some(v);
        }
        if let Some(v) = get("BRAIN_S3_ENDPOINT") {
            self.storage.endpoint = Some(v);
        }
        if let Some(v) = get("BRAIN_S3_MIRROR_DIR") {
            self.storage.mirror_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("DB_PATH") {
            self.database.path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("DB_SECDEF_TABLE") {
            self.database.table = v;
        }
        if let Some(v) = get("PROCESS_ALL") {
            self.process_all = match v.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => return Err(EtlError::ConfigError(format!("Invalid PROCESS_ALL value: {}", v))),
            };
        }
        if let Some(v) = get("QC_DATAFLEET_DEPLOYMENT_DATE") {
            let date = parse_compact_date(&v).ok_or_else(|| {
                EtlError::ConfigError(format!("Invalid QC_DATAFLEET_DEPLOYMENT_DATE: {}", v))
            })?;
            self.deployment_date = Some(date);
        }
        Ok(())
    }

    /// Whole history up to `today`, or the deployment date's calendar month
    pub fn window(&self, today: NaiveDate) -> Result<ProcessingWindow> {
        if self.process_all {
            return Ok(ProcessingWindow::new(history_start(), today));
        }
        let date = self.deployment_date.ok_or_else(|| {
            EtlError::ConfigError("QC_DATAFLEET_DEPLOYMENT_DATE is required unless PROCESS_ALL is set".to_string())
        })?;
        Ok(ProcessingWindow::month_of(date))
    }

    /// Store for raw files: the local mirror when configured, else HTTP
    pub fn object_store(&self) -> Result<Box<dyn ObjectStore>> {
        if let Some(mirror) = &self.storage.mirror_dir {
            return Ok(Box::new(LocalMirrorStore::new(mirror)));
        }
        self.remote_store()
    }

    #[cfg(feature = "remote")]
    fn remote_store(&self) -> Result<Box<dyn ObjectStore>> {
        match (&self.storage.endpoint, &self.storage.bucket) {
            (Some(endpoint), Some(bucket)) => Ok(Box::new(crate::storage::HttpObjectStore::new(endpoint, bucket)?)),
            _ => Err(EtlError::ConfigError(
                "Object storage needs BRAIN_S3_MIRROR_DIR or BRAIN_S3_ENDPOINT with BRAIN_S3_BUCKET_NAME".to_string(),
            )),
        }
    }

    #[cfg(not(feature = "remote"))]
    fn remote_store(&self) -> Result<Box<dyn ObjectStore>> {
        Err(EtlError::ConfigError(
            "Object storage needs BRAIN_S3_MIRROR_DIR (built without remote support)".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashbrown::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.database.table, "security_definitions");
        assert!(!config.process_all);
        assert!(config.deployment_date.is_none());
    }

    #[test]
    fn test_toml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "output_root = \"/data/brain\"\nprocess_all = true\n\n[database]\npath = \"/db/secdef.sqlite\"\n\n[storage]\nmirror_dir = \"/mirror\""
        )
        .unwrap();

        let config = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.output_root, PathBuf::from("/data/brain"));
        assert!(config.process_all);
        assert_eq!(config.database.table, "security_definitions");
        assert_eq!(config.storage.mirror_dir, Some(PathBuf::from("/mirror")));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        assert!(PipelineConfig::load(Some(Path::new("/nonexistent/brain.toml"))).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars = env(&[
            ("BRAIN_OUTPUT_ROOT", "/out"),
            ("DB_SECDEF_TABLE", "secdefs"),
            ("PROCESS_ALL", "False"),
            ("QC_DATAFLEET_DEPLOYMENT_DATE", "20210215"),
            ("BRAIN_S3_BUCKET_NAME", "  "),
        ]);
        let mut config = PipelineConfig::default();
        config.apply_env_with(|k| vars.get(k).cloned()).unwrap();

        assert_eq!(config.output_root, PathBuf::from("/out"));
        assert_eq!(config.database.table, "secdefs");
        assert_eq!(config.deployment_date, NaiveDate::from_ymd_opt(2021, 2, 15));
        assert!(config.storage.bucket.is_none());
    }

    #[test]
    fn test_invalid_env_values() {
        let vars = env(&[("QC_DATAFLEET_DEPLOYMENT_DATE", "2021-02-15")]);
        let mut config = PipelineConfig::default();
        assert!(config.apply_env_with(|k| vars.get(k).cloned()).is_err());

        let vars = env(&[("PROCESS_ALL", "maybe")]);
        assert!(config.apply_env_with(|k| vars.get(k).cloned()).is_err());
    }

    #[test]
    fn test_window() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let mut config = PipelineConfig::default();
        assert!(config.window(today).is_err());

        config.deployment_date = NaiveDate::from_ymd_opt(2021, 2, 15);
        let window = config.window(today).unwrap();
        assert_eq!(window.start, NaiveDate::from_ymd_opt(2021, 2, 1).unwrap());
        assert_eq!(window.end, NaiveDate::from_ymd_opt(2021, 2, 28).unwrap());

        config.process_all = true;
        let window = config.window(today).unwrap();
        assert_eq!(window.start, history_start());
        assert_eq!(window.end, today);
    }

    #[test]
    fn test_mirror_store_preferred() {
        let mut config = PipelineConfig::default();
        assert!(config.object_store().is_err());
        config.storage.mirror_dir = Some(PathBuf::from("/mirror"));
        assert!(config.object_store().unwrap().describe().contains("/mirror"));
    }
}
