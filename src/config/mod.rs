mod file_config;

pub use file_config::FileConfig;

use anyhow::{bail, Result};
use std::path::PathBuf;

pub const REVIEW_DB_FILE_NAME: &str = "reviews.db";
pub const DEFAULT_METADATA_TIMEOUT_SEC: u64 = 10;

/// Command line values, each of which a TOML config file may override.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub metadata_url: Option<String>,
    pub metadata_timeout_sec: u64,
    pub strict_metadata: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    /// Base URL of the metadata provider, lookups are disabled when absent.
    pub metadata_url: Option<String>,
    pub metadata_timeout_sec: u64,
    pub strict_metadata: bool,
}

impl AppConfig {
    /// Merges the command line with an optional config file, file values
    /// winning, and checks that the review db directory is usable.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| anyhow::anyhow!("No review db directory given"))?;

        if !db_dir.is_dir() {
            bail!("Review db directory {:?} is missing or not a directory", db_dir);
        }

        let metadata_url = file.metadata_url.or_else(|| cli.metadata_url.clone());
        let metadata_timeout_sec = file
            .metadata_timeout_sec
            .unwrap_or(cli.metadata_timeout_sec);
        if metadata_timeout_sec == 0 {
            bail!("metadata_timeout_sec must be greater than zero");
        }
        let strict_metadata = file.strict_metadata.unwrap_or(cli.strict_metadata);

        Ok(Self {
            db_dir,
            metadata_url,
            metadata_timeout_sec,
            strict_metadata,
        })
    }

    pub fn review_db_path(&self) -> PathBuf {
        self.db_dir.join(REVIEW_DB_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn make_temp_db_dir() -> TempDir {
        TempDir::new().unwrap()
    }

    fn cli_for(dir: &TempDir) -> CliConfig {
        CliConfig {
            db_dir: Some(dir.path().to_path_buf()),
            metadata_url: Some("http://cli.example".to_string()),
            metadata_timeout_sec: DEFAULT_METADATA_TIMEOUT_SEC,
            strict_metadata: false,
        }
    }

    #[test]
    fn test_resolve_cli_only() {
        let temp_dir = make_temp_db_dir();
        let config = AppConfig::resolve(&cli_for(&temp_dir), None).unwrap();

        assert_eq!(config.db_dir, temp_dir.path());
        assert_eq!(config.metadata_url.as_deref(), Some("http://cli.example"));
        assert_eq!(config.metadata_timeout_sec, 10);
        assert!(!config.strict_metadata);
        assert_eq!(config.review_db_path(), temp_dir.path().join("reviews.db"));
    }

    #[test]
    fn test_toml_overrides_cli() {
        let temp_dir = make_temp_db_dir();
        let file = FileConfig {
            db_dir: None,
            metadata_url: Some("http://toml.example".to_string()),
            metadata_timeout_sec: Some(3),
            strict_metadata: Some(true),
        };
        let config = AppConfig::resolve(&cli_for(&temp_dir), Some(file)).unwrap();

        assert_eq!(config.metadata_url.as_deref(), Some("http://toml.example"));
        assert_eq!(config.metadata_timeout_sec, 3);
        assert!(config.strict_metadata);
    }

    #[test]
    fn test_missing_db_dir_fails() {
        let cli = CliConfig {
            metadata_timeout_sec: 5,
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli, None).is_err());
    }

    #[test]
    fn test_db_dir_must_be_a_directory() {
        let temp_dir = make_temp_db_dir();
        let file_path = temp_dir.path().join("not_a_dir");
        std::fs::File::create(&file_path).unwrap();

        let cli = CliConfig {
            db_dir: Some(file_path),
            metadata_timeout_sec: 5,
            ..Default::default()
        };
        let err = AppConfig::resolve(&cli, None).unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let temp_dir = make_temp_db_dir();
        let mut cli = cli_for(&temp_dir);
        cli.metadata_timeout_sec = 0;
        assert!(AppConfig::resolve(&cli, None).is_err());
    }

    #[test]
    fn test_load_file_config() {
        let temp_dir = make_temp_db_dir();
        let config_path = temp_dir.path().join("config.toml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
db_dir = "{}"
metadata_url = "https://api.spotify.com/v1"
strict_metadata = true
"#,
            temp_dir.path().display()
        )
        .unwrap();

        let file_config = FileConfig::load(&config_path).unwrap();
        assert_eq!(
            file_config.metadata_url.as_deref(),
            Some("https://api.spotify.com/v1")
        );
        assert_eq!(file_config.metadata_timeout_sec, None);

        let cli = CliConfig {
            metadata_timeout_sec: 7,
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();
        assert_eq!(config.db_dir, temp_dir.path());
        assert_eq!(config.metadata_timeout_sec, 7);
        assert!(config.strict_metadata);
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        let temp_dir = make_temp_db_dir();
        let config_path = temp_dir.path().join("broken.toml");
        std::fs::write(&config_path, "metadata_timeout_sec = \"soon\"").unwrap();
        assert!(FileConfig::load(&config_path).is_err());
    }
}
