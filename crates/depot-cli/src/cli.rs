use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use depot_core::config::{
    AppConfig, DEFAULT_DB_DIR, DEFAULT_PER_PAGE, DEFAULT_SCHEDULE_FILE, DEFAULT_UPLOAD_DIR, LogConfig,
};

#[derive(Parser, Debug)]
#[command(name = "depot", version, about = "File upload service: coordinator, workers and jobs")]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the coordinator: scheduler plus worker supervisor.
    Serve,
    /// Run one worker. Started by `serve`; exits when its stdin closes.
    Worker {
        #[arg(long)]
        index: usize,
    },
    /// Run a scheduled job once and exit.
    RunJob { name: String },
}

/// Settings shared by every role. Child processes receive them as flags.
#[derive(Args, Debug, Clone)]
pub struct Settings {
    #[arg(long, env = "APP_ROOT_DIR", default_value = ".")]
    pub root_dir: PathBuf,

    #[arg(long, env = "WORKERS_LIMIT", default_value_t = 1)]
    pub workers: usize,

    #[arg(long, env = "APP_SCHEDULE_FILE", default_value = DEFAULT_SCHEDULE_FILE)]
    pub schedule_file: PathBuf,

    #[arg(long, env = "DB_DIR", default_value = DEFAULT_DB_DIR)]
    pub db_dir: PathBuf,

    #[arg(long, env = "UPLOAD_DIR", default_value = DEFAULT_UPLOAD_DIR)]
    pub upload_dir: PathBuf,

    #[arg(long, env = "UPLOAD_LIMIT_BYTES", default_value_t = 5_242_880)]
    pub upload_limit_bytes: u64,

    #[arg(long, env = "FETCH_PER_PAGE", default_value_t = DEFAULT_PER_PAGE)]
    pub per_page: usize,

    #[arg(long, env = "APP_LOGS_DIR")]
    pub log_dir: Option<PathBuf>,

    #[arg(long, env = "APP_LOG_FILE_NAME", default_value = "app.log")]
    pub log_file_name: String,

    #[arg(long, env = "APP_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Settings {
    pub fn to_config(&self) -> AppConfig {
        AppConfig {
            root_dir: self.root_dir.clone(),
            workers: self.workers,
            schedule_file: self.schedule_file.clone(),
            db_dir: self.db_dir.clone(),
            upload_dir: self.upload_dir.clone(),
            upload_limit_bytes: self.upload_limit_bytes,
            per_page: self.per_page,
            log: LogConfig {
                level: self.log_level.clone(),
                dir: self.log_dir.clone(),
                file_name: self.log_file_name.clone(),
            },
        }
    }

    /// Flags that reproduce these settings in a child process, placed
    /// before the subcommand.
    pub fn forwarded_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        let mut push = |flag: &str, value: OsString| {
            args.push(flag.into());
            args.push(value);
        };
        push("--root-dir", self.root_dir.clone().into());
        push("--workers", self.workers.to_string().into());
        push("--schedule-file", self.schedule_file.clone().into());
        push("--db-dir", self.db_dir.clone().into());
        push("--upload-dir", self.upload_dir.clone().into());
        push("--upload-limit-bytes", self.upload_limit_bytes.to_string().into());
        push("--per-page", self.per_page.to_string().into());
        push("--log-file-name", self.log_file_name.clone().into());
        push("--log-level", self.log_level.clone().into());
        if let Some(dir) = &self.log_dir {
            push("--log-dir", dir.clone().into());
        }
        args
    }
}
