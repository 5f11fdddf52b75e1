//! Daemon configuration (flags with environment fallbacks)

use backy_api_http::HttpServerConfig;
use backy_core::application::OrchestratorConfig;
use backy_core::domain::BackupTool;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "backy2-webhook")]
#[command(about = "HTTP control plane for backy2 backups", long_about = None)]
#[command(version)]
pub struct Args {
    /// IP address the HTTP server binds to
    #[arg(long, env = "BACKY_LISTEN_IP", default_value = "0.0.0.0")]
    pub listen_ip: String,

    /// HTTP port
    #[arg(long, env = "BACKY_LISTEN_PORT", default_value_t = 7070)]
    pub listen_port: u16,

    /// debug, info, warning or error (RUST_LOG takes precedence)
    #[arg(long, env = "BACKY_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Source handed to `backy2 backup`
    #[arg(
        long,
        env = "BACKY_SOURCE_PATH",
        default_value = "file:///backup-source/backup-this"
    )]
    pub source_path: String,

    /// Hard limit in seconds for every command of a backup run
    #[arg(long, env = "BACKY_MAX_BACKUP_TIME_RUNNING", default_value_t = 7200)]
    pub max_backup_time_running: u64,

    /// Shell command run before each backup (empty disables it)
    #[arg(long, env = "BACKY_PRE_BACKUP_COMMAND", default_value = "")]
    pub pre_backup_command: String,

    /// Shell command run after each successful backup (empty disables it)
    #[arg(long, env = "BACKY_POST_BACKUP_COMMAND", default_value = "")]
    pub post_backup_command: String,

    /// Directory holding one id-mapping file per backup
    #[arg(long, env = "BACKY_IDS_DIR", default_value = "/var/lib/backy2/ids")]
    pub ids_dir: String,

    /// backy2 executable
    #[arg(long, env = "BACKY_BIN", default_value = "backy2")]
    pub backy2_bin: String,

    /// Shell used to run commands
    #[arg(long, env = "BACKY_SHELL", default_value = "bash")]
    pub shell: String,
}

impl Args {
    pub fn ids_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.ids_dir).into_owned())
    }

    pub fn http_config(&self) -> HttpServerConfig {
        HttpServerConfig {
            host: self.listen_ip.clone(),
            port: self.listen_port,
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig::new(self.source_path.clone())
            .with_max_running_time(Duration::from_secs(self.max_backup_time_running))
            .with_pre_backup_command(self.pre_backup_command.clone())
            .with_post_backup_command(self.post_backup_command.clone())
            .with_tool(BackupTool::new(self.backy2_bin.clone()))
    }

    /// EnvFilter directive for `--log-level`
    pub fn log_directive(&self) -> &'static str {
        match self.log_level.to_ascii_lowercase().as_str() {
            "debug" => "debug",
            "warning" | "warn" => "warn",
            "error" => "error",
            _ => "info",
        }
    }
}
