use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::config::{Config, Pagination};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Registry listening host
    #[arg(long, global = true, env = "BERTH_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Registry listening port
    #[arg(short, long, global = true, env = "BERTH_PORT", default_value_t = 15000)]
    pub port: u16,

    /// Registry storage root
    #[arg(long, global = true, env = "BERTH_ROOT", default_value = "./data")]
    pub root: PathBuf,

    /// Seconds before an idle upload session expires
    #[arg(long, global = true, env = "BERTH_UPLOAD_TIMEOUT", default_value_t = 3600)]
    pub upload_timeout: u64,

    /// Seconds between upload reaper sweeps
    #[arg(long, global = true, env = "BERTH_CLEANUP_INTERVAL", default_value_t = 300)]
    pub cleanup_interval: u64,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the registry server (the default)
    Serve,

    /// Collect unreferenced blobs from the storage root
    Gc {
        /// Report what would be reclaimed without deleting anything
        #[arg(long, conflicts_with = "delete")]
        dry_run: bool,

        /// Delete unreferenced blobs
        #[arg(long)]
        delete: bool,

        /// Safety window in seconds; unreferenced blobs younger than this
        /// are kept so in-flight pushes are not collected under the client
        #[arg(long, env = "BERTH_GC_MIN_AGE", default_value_t = 3600)]
        min_age: u64,
    },
}

impl Cli {
    pub fn to_config(&self) -> Config {
        Config {
            host: self.host.clone(),
            port: self.port,
            root_dir: self.root.clone(),
            upload_timeout: Duration::from_secs(self.upload_timeout),
            cleanup_interval: Duration::from_secs(self.cleanup_interval),
            gc_min_age: match self.command {
                Some(Command::Gc { min_age, .. }) => Duration::from_secs(min_age),
                _ => Duration::from_secs(3600),
            },
            pagination: Pagination::default(),
        }
    }
}
