//! Command-line interface argument parsing.
//!
//! Flags here override the matching settings from the config file.

use crate::config::ReportFormat;
use clap::Parser;
use std::path::PathBuf;

/// retail-pipeline - load retail CSVs, aggregate in SQL, render charts
///
/// Loads customers, products and transactions into PostgreSQL (or SQLite),
/// builds the sales summary tables, and writes PNG charts plus a run report.
///
/// Examples:
///   retail-pipeline
///   retail-pipeline --config prod.toml --output-dir out/charts
///   retail-pipeline --database-url sqlite://retail.db?mode=rwc --format json
///   retail-pipeline --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for .retail-pipeline.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory the charts and run report are written to
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Full database URL, overriding the [database] section
    ///
    /// Supports postgres://... and sqlite://... URLs.
    #[arg(long, value_name = "URL", env = "RETAIL_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Database password
    #[arg(long, value_name = "PASSWORD", env = "RETAIL_DB_PASSWORD", hide_env_values = true)]
    pub db_password: Option<String>,

    /// Run report format (markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<ReportFormat>,

    /// Do not write the run report
    #[arg(long)]
    pub skip_report: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .retail-pipeline.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref url) = self.database_url {
            if !url.starts_with("postgres://")
                && !url.starts_with("postgresql://")
                && !url.starts_with("sqlite:")
            {
                return Err(
                    "Database URL must start with 'postgres://', 'postgresql://' or 'sqlite:'"
                        .to_string(),
                );
            }
        }

        if let Some(ref config) = self.config {
            if !config.is_file() {
                return Err(format!("Config file does not exist: {}", config.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            config: None,
            output_dir: None,
            database_url: None,
            db_password: None,
            format: None,
            skip_report: false,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "retail-pipeline",
            "-o",
            "out",
            "--format",
            "json",
            "--skip-report",
            "--database-url",
            "sqlite://retail.db",
        ])
        .unwrap();

        assert_eq!(args.output_dir, Some(PathBuf::from("out")));
        assert_eq!(args.format, Some(ReportFormat::Json));
        assert!(args.skip_report);
        assert_eq!(args.database_url.as_deref(), Some("sqlite://retail.db"));
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_database_url() {
        let mut args = make_args();
        args.database_url = Some("mysql://localhost/retail".to_string());
        assert!(args.validate().is_err());

        args.database_url = Some("postgres://retail_user@localhost/retail_db".to_string());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_missing_config_file() {
        let mut args = make_args();
        args.config = Some(PathBuf::from("does/not/exist.toml"));
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_init_config_skips_validation() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        args.init_config = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
