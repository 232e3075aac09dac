//! Periodic polling of every attached channel.
//!
//! Each tick reads all channels on a blocking thread, logs the values and
//! warns once when a temperature reaches its high limit.

use std::{collections::HashSet, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::{
    drivers::lm83::{Channel, ChannelAccessor, Reading},
    error::BusError,
    registry::ClientId,
    task_manager::{ServiceProvider, TaskManager},
};

/// One channel watched by the monitor.
#[derive(Debug, Clone)]
pub struct Watched {
    pub client: ClientId,
    pub accessor: ChannelAccessor,
}

/// Result of reading one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub client: ClientId,
    pub channel: Channel,
    pub reading: Result<Reading, BusError>,
}

/// Change of alarm state of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Raised,
    Cleared,
}

/// Remembers which channels are at or above their limit.
#[derive(Debug, Default)]
pub struct AlarmTracker {
    active: HashSet<(ClientId, Channel)>,
}

impl AlarmTracker {
    pub fn update(&mut self, client: ClientId, channel: Channel, reading: Reading) -> Option<Transition> {
        let key = (client, channel);
        if reading.temperature >= reading.threshold {
            self.active.insert(key).then_some(Transition::Raised)
        } else {
            self.active.remove(&key).then_some(Transition::Cleared)
        }
    }
}

/// Reads every watched channel once.
pub fn poll(watched: &[Watched]) -> Vec<Sample> {
    watched
        .iter()
        .map(|w| Sample {
            client: w.client,
            channel: w.accessor.channel(),
            reading: w.accessor.read(),
        })
        .collect()
}

fn report(samples: &[Sample], alarms: &mut AlarmTracker) {
    for sample in samples {
        let Sample {
            client, channel, ..
        } = sample;
        match &sample.reading {
            Ok(reading) => {
                debug!(
                    "Client {client} {channel}: {}°C (high {}°C)",
                    reading.temperature, reading.threshold
                );
                match alarms.update(*client, *channel, *reading) {
                    Some(Transition::Raised) => warn!(
                        "Client {client} {channel} at {}°C reached its high limit of {}°C",
                        reading.temperature, reading.threshold
                    ),
                    Some(Transition::Cleared) => {
                        info!("Client {client} {channel} back below its high limit")
                    }
                    None => {}
                }
            }
            Err(e) => error!("Failed to read client {client} {channel}: {e}"),
        }
    }
}

/// Monitor service started through the task manager.
pub struct MonitorService {
    watched: Vec<Watched>,
    period: Duration,
}

impl MonitorService {
    pub fn new(watched: Vec<Watched>, period: Duration) -> Self {
        Self { watched, period }
    }
}

#[async_trait]
impl ServiceProvider for MonitorService {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let watched = self.watched.clone();
        let period = self.period;
        task_manager
            .spawn_task(self.name().to_string(), move |token| {
                run_monitor(watched, period, token)
            })
            .await
    }

    fn name(&self) -> &'static str {
        "monitor"
    }
}

async fn run_monitor(watched: Vec<Watched>, period: Duration, token: CancellationToken) -> Result<()> {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut alarms = AlarmTracker::default();

    loop {
        tokio::select! {
            () = token.cancelled() => {
                info!("Monitor cancelled");
                break;
            }
            _ = ticker.tick() => {
                let snapshot = watched.clone();
                let samples = tokio::task::spawn_blocking(move || poll(&snapshot))
                    .await
                    .context("Monitor poll panicked")?;
                report(&samples, &mut alarms);
            }
        }
    }
    Ok(())
}
