use clap::Parser;
use clap_derive::{Args, Parser, Subcommand};

use crate::{config::DEFAULT_CONFIG_FILE, query::time::TimeArg};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (RON). Defaults to ./tmpo.ron when present
    #[arg(short, long, global = true)]
    pub config: Option<String>,
    #[command(subcommand)]
    pub command: CliCommands,
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as Parser>::parse()
    }

    /// Config path and whether it must exist.
    pub fn config_file(&self) -> (&str, bool) {
        match &self.config {
            Some(path) => (path, true),
            None => (DEFAULT_CONFIG_FILE, false),
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum CliCommands {
    /// Register a sensor with its access token
    Add { sid: String, token: String },
    /// Forget a sensor and its cached blocks
    #[command(alias = "rm")]
    Remove { sid: String },
    /// Drop cached blocks of a sensor, keep it registered
    Reset { sid: String },
    /// List registered sensors
    Sensors,
    /// Pull new blocks from the remote
    Sync {
        /// sensors to sync, all registered when omitted
        sids: Vec<String>,
    },
    /// List cached blocks
    #[command(alias = "ls")]
    List {
        /// sensors to list, all registered when omitted
        sids: Vec<String>,
    },
    /// Print the samples of one sensor
    Series(SeriesArgs),
    /// Print several sensors joined on timestamp
    Frame(FrameArgs),
    /// Print the origin of the earliest block
    First(PointArgs),
    /// Print the newest sample
    Last(PointArgs),
}

#[derive(Args, Debug, Clone)]
pub struct WindowArgs {
    /// inclusive start, epoch seconds or timestamp with offset
    #[arg(long)]
    pub head: Option<TimeArg>,
    /// inclusive end, epoch seconds or timestamp with offset
    #[arg(long)]
    pub tail: Option<TimeArg>,
    /// render timestamps as RFC 3339 instead of epochs
    #[arg(long)]
    pub datetime: bool,
    /// read from the remote instead of the cache
    #[arg(long)]
    pub remote: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SeriesArgs {
    pub sid: String,
    /// recycle id, newest cached when omitted
    #[arg(long)]
    pub rid: Option<i64>,
    #[command(flatten)]
    pub window: WindowArgs,
}

#[derive(Args, Debug, Clone)]
pub struct FrameArgs {
    #[arg(required = true)]
    pub sids: Vec<String>,
    #[command(flatten)]
    pub window: WindowArgs,
}

#[derive(Args, Debug, Clone)]
pub struct PointArgs {
    pub sid: String,
    /// render timestamps as RFC 3339 instead of epochs
    #[arg(long)]
    pub datetime: bool,
    /// read from the remote instead of the cache
    #[arg(long)]
    pub remote: bool,
}
