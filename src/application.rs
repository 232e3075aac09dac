//! Application entry point and builder pattern implementation.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::{
    runtime::Handle,
    signal::unix::{SignalKind, signal},
};
use zbus::{Connection, connection};

use crate::{
    bus::{BusLayer, ControlSurface},
    config::{Config, DBusCfg, DBusKind},
    drivers::lm83::{AttachedChip, ChannelAccessor, I2cDev, LinuxAdapter, Reading, RegisterIo},
    interface::{DBusSurface, NullSurface},
    monitor::{MonitorService, Watched},
    registry::Registry,
    scanner::{Probe, Scanner, probe},
    task_manager::{ServiceProvider, TaskManager},
};

/// What the process does once configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Attach, export on the control surface and run until signalled.
    #[default]
    Daemon,
    /// Print what detection finds, attach nothing.
    ScanOnly,
    /// Attach, print every channel once, detach.
    Once,
}

/// Main application structure that drives the chips through their lifecycle.
///
/// # Example
///
/// ```no_run
/// use lm83d::application::{Application, RunMode};
/// use lm83d::config::Config;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::load(None)?;
/// Application::builder()
///     .with_config(config)
///     .with_mode(RunMode::Once)
///     .build()?
///     .run()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct Application {
    config: Config,
    mode: RunMode,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    pub async fn run(self) -> Result<()> {
        match self.mode {
            RunMode::Daemon => run_daemon(self.config).await,
            RunMode::ScanOnly => {
                let adapters = self.config.adapters;
                let lines = tokio::task::spawn_blocking(move || {
                    adapters
                        .iter()
                        .flat_map(|cfg| {
                            let adapter = LinuxAdapter::new(cfg.bus);
                            let name = adapter.device_path();
                            probe(&adapter, cfg)
                                .into_iter()
                                .map(move |p| format_probe(&name, &p))
                        })
                        .collect::<Vec<_>>()
                })
                .await
                .context("Scan panicked")?;
                lines.iter().for_each(|line| println!("{line}"));
                Ok(())
            }
            RunMode::Once => {
                let lines = tokio::task::spawn_blocking(move || read_once(&self.config))
                    .await
                    .context("Read panicked")?;
                lines.iter().for_each(|line| println!("{line}"));
                Ok(())
            }
        }
    }
}

/// Builder pattern for creating Application instances.
pub struct ApplicationBuilder {
    config: Option<Config>,
    mode: RunMode,
}

impl ApplicationBuilder {
    fn new() -> Self {
        Self {
            config: None,
            mode: RunMode::default(),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn build(self) -> Result<Application> {
        let config = self
            .config
            .ok_or_else(|| anyhow::anyhow!("Configuration is required"))?;
        config.validate()?;
        Ok(Application {
            config,
            mode: self.mode,
        })
    }
}

async fn run_daemon(config: Config) -> Result<()> {
    let registry = Arc::new(Registry::new());
    let surface = connect_surface(&config.dbus).await;

    let chips = {
        let registry = registry.clone();
        let surface = surface.clone();
        let config = config.clone();
        tokio::task::spawn_blocking(move || scan_all(&config, registry.as_ref(), surface.as_ref()))
            .await
            .context("Scan panicked")?
    };
    if chips.is_empty() {
        warn!("No LM83 chips found on any configured adapter");
    }

    let mut tasks = TaskManager::new();
    if let Some(period) = config.monitor_interval() {
        let watched = chips
            .iter()
            .flat_map(|chip| {
                chip.channels().map(|accessor| Watched {
                    client: chip.id(),
                    accessor,
                })
            })
            .collect();
        MonitorService::new(watched, period)
            .start(&mut tasks)
            .await?;
    }

    let signalled = wait_for_signal().await;

    if let Err(e) = tasks.shutdown_all().await {
        error!("{e:#}");
    }
    let left = tokio::task::spawn_blocking(move || {
        let left = detach_all(chips, registry.as_ref(), surface.as_ref());
        registry.close();
        left
    })
    .await
    .context("Detach panicked")?;
    if !left.is_empty() {
        error!("{} chip(s) could not be detached", left.len());
    }

    signalled
}

async fn connect_surface(cfg: &DBusCfg) -> Arc<dyn ControlSurface> {
    if !cfg.enabled {
        return Arc::new(NullSurface);
    }
    match connect(cfg).await {
        Ok(connection) => {
            info!("Serving channels on D-Bus as {}", cfg.name);
            Arc::new(DBusSurface::new(connection, Handle::current()))
        }
        Err(e) => {
            warn!("D-Bus unavailable, channels will not be exported: {e:#}");
            Arc::new(NullSurface)
        }
    }
}

async fn connect(cfg: &DBusCfg) -> Result<Connection> {
    let builder = match cfg.bus {
        DBusKind::System => connection::Builder::system()?,
        DBusKind::Session => connection::Builder::session()?,
    };
    builder
        .name(cfg.name.as_str())?
        .build()
        .await
        .with_context(|| format!("Failed to acquire bus name {}", cfg.name))
}

async fn wait_for_signal() -> Result<()> {
    let mut term =
        signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = term.recv() => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
    Ok(())
}

fn scan_all(
    config: &Config,
    bus: &dyn BusLayer,
    surface: &dyn ControlSurface,
) -> Vec<AttachedChip<I2cDev>> {
    let scanner = Scanner::new(bus, surface, config.update_interval());
    config
        .adapters
        .iter()
        .flat_map(|cfg| scanner.scan(&LinuxAdapter::new(cfg.bus), cfg))
        .collect()
}

fn read_once(config: &Config) -> Vec<String> {
    let registry = Registry::new();
    let chips = scan_all(config, &registry, &NullSurface);

    let lines = chips
        .iter()
        .flat_map(|chip| {
            chip.channels().map(|accessor| {
                let name = reading_name(chip, &accessor);
                match accessor.read() {
                    Ok(reading) => format_reading(&name, reading),
                    Err(e) => format!("{name}: {e}"),
                }
            })
        })
        .collect();

    detach_all(chips, &registry, &NullSurface);
    registry.close();
    lines
}

/// Detaches chips newest first. Chips whose detach fails are logged and
/// returned, still attached.
pub fn detach_all<Io: RegisterIo>(
    chips: Vec<AttachedChip<Io>>,
    bus: &dyn BusLayer,
    surface: &dyn ControlSurface,
) -> Vec<AttachedChip<Io>> {
    let mut left = Vec::new();
    for chip in chips.into_iter().rev() {
        if let Err(failure) = chip.detach(bus, surface) {
            error!(
                "Failed to detach client {}: {}",
                failure.chip.id(),
                failure.error
            );
            left.push(failure.chip);
        }
    }
    left
}

fn reading_name<Io: RegisterIo>(chip: &AttachedChip<Io>, accessor: &ChannelAccessor) -> String {
    format!(
        "{}-{}-{:02x} {}",
        chip.client().kind().type_name(),
        chip.adapter(),
        chip.client().address(),
        accessor.channel()
    )
}

fn format_reading(name: &str, reading: Reading) -> String {
    format!(
        "{name}: {}°C (high {}°C)",
        reading.temperature, reading.threshold
    )
}

fn format_probe(adapter: &str, probe: &Probe) -> String {
    match &probe.outcome {
        Ok(kind) => format!("{adapter} 0x{:02x}: {}", probe.address, kind.type_name()),
        Err(e) => format!("{adapter} 0x{:02x}: {e}", probe.address),
    }
}
