//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.retail-pipeline.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default configuration file name.
pub const CONFIG_FILE: &str = ".retail-pipeline.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Relational store settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Loader settings.
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Logical table name -> source file path.
    #[serde(default = "default_sources")]
    pub sources: BTreeMap<String, PathBuf>,

    /// Chart settings.
    #[serde(default)]
    pub charts: ChartConfig,

    /// Run report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            database: DatabaseConfig::default(),
            loader: LoaderConfig::default(),
            sources: default_sources(),
            charts: ChartConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory charts and the run report are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            verbose: false,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("charts")
}

/// Which database engine backs the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Postgres,
    Sqlite,
}

/// Relational store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: BackendKind,

    /// Full connection URL; overrides every other field when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_user")]
    pub user: String,

    /// Usually supplied through `RETAIL_DB_PASSWORD` instead.
    #[serde(default)]
    pub password: String,

    #[serde(default = "default_db_name")]
    pub name: String,

    /// Database file used by the SQLite backend.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            url: None,
            host: default_host(),
            port: default_port(),
            user: default_user(),
            password: String::new(),
            name: default_db_name(),
            sqlite_path: default_sqlite_path(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_user() -> String {
    "retail_user".to_string()
}

fn default_db_name() -> String {
    "retail_db".to_string()
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("retail.db")
}

fn default_max_connections() -> u32 {
    5
}

/// Loader settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Field delimiter (single ASCII character).
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Rows per INSERT statement.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_delimiter() -> char {
    ','
}

fn default_batch_size() -> usize {
    500
}

fn default_sources() -> BTreeMap<String, PathBuf> {
    [
        ("customers", "data/raw/customers.csv"),
        ("products", "data/raw/products.csv"),
        ("transactions", "data/raw/transactions.csv"),
    ]
    .into_iter()
    .map(|(table, path)| (table.to_string(), PathBuf::from(path)))
    .collect()
}

/// Chart image settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartConfig {
    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
        }
    }
}

fn default_width() -> u32 {
    800
}

fn default_height() -> u32 {
    500
}

/// Output format for the run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl ReportFormat {
    pub fn file_name(&self) -> &'static str {
        match self {
            ReportFormat::Markdown => "run_report.md",
            ReportFormat::Json => "run_report.json",
        }
    }
}

/// Run report settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub format: ReportFormat,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: ReportFormat::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, and only
    /// when they were actually provided.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref dir) = args.output_dir {
            self.general.output_dir = dir.clone();
        }

        if let Some(ref url) = args.database_url {
            self.database.url = Some(url.clone());
        }

        if let Some(ref password) = args.db_password {
            self.database.password = password.clone();
        }

        if let Some(format) = args.format {
            self.report.format = format;
        }

        if args.skip_report {
            self.report.enabled = false;
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Check settings that serde cannot validate on its own.
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            anyhow::bail!("No source files configured under [sources]");
        }
        for table in crate::analysis::SOURCE_TABLES {
            if !self.sources.contains_key(table) {
                anyhow::bail!("No source file configured for '{}' under [sources]", table);
            }
        }
        if !self.loader.delimiter.is_ascii() {
            anyhow::bail!(
                "Delimiter must be a single ASCII character, got '{}'",
                self.loader.delimiter
            );
        }
        if self.loader.batch_size == 0 {
            anyhow::bail!("loader.batch_size must be at least 1");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("database.max_connections must be at least 1");
        }
        if self.charts.width < 100 || self.charts.height < 100 {
            anyhow::bail!("Chart dimensions must be at least 100x100");
        }
        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.database.backend, BackendKind::Postgres);
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.general.output_dir, PathBuf::from("charts"));
        assert_eq!(config.sources.len(), 3);
        assert!(config.sources.contains_key("transactions"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output_dir = "out"
verbose = true

[database]
backend = "sqlite"
sqlite_path = "local.db"

[loader]
delimiter = ";"

[sources]
customers = "in/c.csv"
products = "in/p.csv"
transactions = "in/t.csv"

[report]
format = "json"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output_dir, PathBuf::from("out"));
        assert!(config.general.verbose);
        assert_eq!(config.database.backend, BackendKind::Sqlite);
        assert_eq!(config.database.sqlite_path, PathBuf::from("local.db"));
        assert_eq!(config.loader.delimiter, ';');
        assert_eq!(config.sources["products"], PathBuf::from("in/p.csv"));
        assert_eq!(config.report.format, ReportFormat::Json);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config: Config = toml::from_str("").unwrap();
        config.loader.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config: Config = toml::from_str("").unwrap();
        config.loader.delimiter = 'é';
        assert!(config.validate().is_err());

        let mut config: Config = toml::from_str("").unwrap();
        config.sources.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_every_source_table() {
        let config: Config = toml::from_str("[sources]\ntransactions = \"t.csv\"").unwrap();
        assert_eq!(config.sources.len(), 1);
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("customers"));

        let config: Config = toml::from_str(
            "[sources]\ncustomers = \"c.csv\"\nproducts = \"p.csv\"\ntransactions = \"t.csv\"\nreturns = \"r.csv\"",
        )
        .unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[sources]"));
        assert!(toml_str.contains("customers"));
    }
}
