use std::fs::File;

use anyhow::{Result, anyhow};
use clap::Parser;
use daemonize::Daemonize;
use log::{LevelFilter, info};
use syslog::{BasicLogger, Facility, Formatter3164};

use lm83d::{
    application::Application,
    cli::Cli,
    config::{Config, locate_config},
};

fn init_syslog(level: LevelFilter) -> Result<()> {
    syslog::unix(Formatter3164 {
        facility: Facility::LOG_DAEMON,
        hostname: None,
        process: "lm83d".into(),
        pid: 0,
    })
    .map_err(|e| anyhow!("{e}"))
    .and_then(|logger| {
        log::set_boxed_logger(Box::new(BasicLogger::new(logger)))
            .map(|_| log::set_max_level(level))
            .map_err(|e| anyhow!("{e}"))
    })
}

fn init_stderr(level: LevelFilter) -> Result<()> {
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init()
        .map_err(|e| anyhow!("{e}"))
}

fn into_daemon() -> Result<()> {
    File::create("/var/tmp/lm83d.log")
        .and_then(|out| Ok((out.try_clone()?, out)))
        .map_err(|e| anyhow!("{e}"))
        .and_then(|(stderr, stdout)| {
            Daemonize::new()
                .stdout(stdout)
                .stderr(stderr)
                .start()
                .map_err(|e| anyhow!("{e}"))
        })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let path = cli.config.clone().or_else(locate_config);
    let config = Config::load(path.clone())?;
    let level = config.level_filter()?;

    if cli.daemonize {
        init_syslog(level).and(into_daemon())?;
    } else {
        init_stderr(level)?;
    }

    match &path {
        Some(path) => info!("Loaded config from: {}", path.display()),
        None => info!("No configuration file found, using defaults"),
    }

    // The runtime is built after forking so its worker threads live in the daemon.
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(
            Application::builder()
                .with_config(config)
                .with_mode(cli.mode())
                .build()?
                .run(),
        )
}
