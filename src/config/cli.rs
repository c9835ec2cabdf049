use crate::config::{interval_from_secs, ScanConfig, TomlConfig};
use crate::utils::error::Result;
use crate::utils::validation::Validate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "tabscan")]
#[command(about = "Upload tabular files and scan them for missing and repeated values")]
pub struct CliConfig {
    #[arg(long, global = true, help = "TOML configuration file (otherwise read from the environment)")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true)]
    pub upload_dir: Option<PathBuf>,

    #[arg(long, global = true, help = "Maximum upload size in bytes")]
    pub max_file_size: Option<u64>,

    #[arg(long, global = true, help = "Rows per scan chunk")]
    pub chunk_size: Option<usize>,

    #[arg(long, global = true, help = "Minimum seconds between progress events (0.1-5.0)")]
    pub update_interval: Option<f64>,

    #[arg(long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Emit logs as JSON lines")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Store a file, scan it and stream progress events to stdout
    Upload {
        file: PathBuf,

        #[arg(long, help = "Filename to declare instead of the file's own name")]
        name: Option<String>,

        #[arg(long, help = "Frame events as server-sent events instead of JSON lines")]
        sse: bool,
    },
    /// Print the stored analysis report for a file reference
    Report { reference: String },
    /// List stored files in upload order
    List {
        #[arg(long, default_value_t = 1, help = "Page number, starting at 1")]
        page: u32,

        #[arg(long, default_value_t = 10, help = "Files per page (1-100)")]
        limit: u32,

        #[arg(long, help = "Case-insensitive filter on the original filename")]
        search: Option<String>,
    },
    /// Delete a stored file and its metadata record
    Delete { reference: String },
}

impl CliConfig {
    /// Loads the base configuration, applies command-line overrides and
    /// validates the result.
    pub fn scan_config(&self) -> Result<ScanConfig> {
        let mut config = match &self.config {
            Some(path) => TomlConfig::from_file(path)?.into_scan_config()?,
            None => ScanConfig::from_env()?,
        };

        if let Some(dir) = &self.upload_dir {
            config.upload_dir = dir.clone();
        }
        if let Some(size) = self.max_file_size {
            config.max_file_size = size;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }
        if let Some(secs) = self.update_interval {
            config.update_interval = interval_from_secs(secs)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Location of the JSON metadata store inside the upload directory.
    pub fn metadata_path(config: &ScanConfig) -> PathBuf {
        config.upload_dir.join("files.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_parse_upload_command() {
        let cli = CliConfig::parse_from(["tabscan", "upload", "data.csv", "--sse", "--chunk-size", "10"]);
        match &cli.command {
            Command::Upload { file, sse, name } => {
                assert_eq!(file, &PathBuf::from("data.csv"));
                assert!(*sse);
                assert!(name.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.chunk_size, Some(10));
    }

    #[test]
    fn test_parse_list_and_delete_commands() {
        let cli = CliConfig::parse_from(["tabscan", "list", "--search", "sales", "--page", "2"]);
        match &cli.command {
            Command::List {
                page,
                limit,
                search,
            } => {
                assert_eq!(*page, 2);
                assert_eq!(*limit, 10);
                assert_eq!(search.as_deref(), Some("sales"));
            }
            other => panic!("unexpected command {:?}", other),
        }

        let cli = CliConfig::parse_from(["tabscan", "delete", "ref-1"]);
        assert!(matches!(&cli.command, Command::Delete { reference } if reference == "ref-1"));
    }

    #[test]
    fn test_flags_override_file_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[scan]\nchunk_size = 500\nupdate_interval = 1.0\n")
            .unwrap();
        let path = file.path().to_string_lossy().to_string();

        let cli = CliConfig::parse_from([
            "tabscan",
            "--config",
            path.as_str(),
            "--update-interval",
            "0.2",
            "report",
            "abc",
        ]);
        let config = cli.scan_config().unwrap();
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.update_interval, Duration::from_millis(200));
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let cli = CliConfig::parse_from(["tabscan", "--update-interval", "0.01", "report", "abc"]);
        assert!(cli.scan_config().is_err());
    }
}
