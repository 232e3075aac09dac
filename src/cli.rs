use clap::Parser;
use std::path::PathBuf;

use crate::application::RunMode;

/// lm83d — daemon for LM83 temperature sensors on Linux i2c buses
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// YAML config file path (default: searched in LM83D_CONFIG, ~/.config, /etc)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Detach from the terminal and log to syslog
    #[arg(short = 'd', long = "daemonize", default_value = "false")]
    pub daemonize: bool,

    /// Report what detection finds on each candidate address, then exit
    #[arg(long = "scan-only", conflicts_with_all = ["once", "daemonize"])]
    pub scan_only: bool,

    /// Print every channel once, then exit
    #[arg(long = "once", conflicts_with = "daemonize")]
    pub once: bool,
}

impl Cli {
    pub fn mode(&self) -> RunMode {
        if self.scan_only {
            RunMode::ScanOnly
        } else if self.once {
            RunMode::Once
        } else {
            RunMode::Daemon
        }
    }
}
