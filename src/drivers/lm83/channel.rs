//! Per-channel access as seen by a control surface.

use std::sync::Arc;

use serde::Serialize;

use super::registers::Channel;
use crate::error::{BusError, ChannelError};

/// Current temperature and high limit of one channel, in degrees Celsius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reading {
    pub temperature: i8,
    pub threshold: i8,
}

/// Static description of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelMetadata {
    pub name: &'static str,
    pub label: &'static str,
    /// Decimal places of the reported values. Always 0: whole degrees.
    pub magnitude: u8,
    pub writable: bool,
}

/// Requests a control surface can issue against a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRequest {
    Info,
    Read,
    /// New high limit. `None` is accepted and ignored.
    Write(Option<i64>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelResponse {
    Info(ChannelMetadata),
    Reading(Reading),
    Written,
}

/// Chip operations the channel accessors need, independent of the bus type.
pub trait SensorChip: Send + Sync {
    fn name(&self) -> &str;

    fn address(&self) -> u16;

    fn read_channel(&self, channel: Channel) -> Result<Reading, BusError>;

    fn set_threshold(&self, channel: Channel, value: i8) -> Result<(), BusError>;
}

/// Handle on one channel of one chip. Cheap to clone.
#[derive(Clone)]
pub struct ChannelAccessor {
    chip: Arc<dyn SensorChip>,
    channel: Channel,
}

impl std::fmt::Debug for ChannelAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelAccessor")
            .field("chip", &self.chip.name())
            .field("address", &self.chip.address())
            .field("channel", &self.channel)
            .finish()
    }
}

impl ChannelAccessor {
    pub fn new(chip: Arc<dyn SensorChip>, channel: Channel) -> Self {
        Self { chip, channel }
    }

    /// The four accessors of a chip, in `temp1`..`temp4` order.
    pub fn for_chip<C: SensorChip + 'static>(chip: Arc<C>) -> [ChannelAccessor; 4] {
        Channel::ALL.map(|channel| Self::new(chip.clone(), channel))
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn chip_name(&self) -> &str {
        self.chip.name()
    }

    pub fn info(&self) -> ChannelMetadata {
        ChannelMetadata {
            name: self.channel.name(),
            label: self.channel.label(),
            magnitude: 0,
            writable: true,
        }
    }

    pub fn read(&self) -> Result<Reading, BusError> {
        self.chip.read_channel(self.channel)
    }

    /// Sets the high limit. Values outside the signed byte range are refused
    /// before anything is stored.
    pub fn write_threshold(&self, value: i64) -> Result<(), ChannelError> {
        let value = i8::try_from(value).map_err(|_| ChannelError::OutOfRange(value))?;
        self.chip.set_threshold(self.channel, value)?;
        Ok(())
    }

    pub fn handle(&self, request: ChannelRequest) -> Result<ChannelResponse, ChannelError> {
        match request {
            ChannelRequest::Info => Ok(ChannelResponse::Info(self.info())),
            ChannelRequest::Read => Ok(ChannelResponse::Reading(self.read()?)),
            ChannelRequest::Write(Some(value)) => {
                self.write_threshold(value)?;
                Ok(ChannelResponse::Written)
            }
            ChannelRequest::Write(None) => Ok(ChannelResponse::Written),
        }
    }
}
