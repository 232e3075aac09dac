//! Error taxonomy for detection, lifecycle and channel access.
//!
//! Every expected hardware condition (chip absent, foreign chip, failed bus
//! transaction) is a typed value. Only the daemon layer collapses these into
//! `anyhow::Error`.

use thiserror::Error;

use crate::registry::ClientId;

/// A single register transaction failed on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("failed to read register 0x{reg:02X} at 0x{addr:02X}: {reason}")]
    Read { addr: u16, reg: u8, reason: String },

    #[error("failed to write 0x{value:02X} to register 0x{reg:02X} at 0x{addr:02X}: {reason}")]
    Write {
        addr: u16,
        reg: u8,
        value: u8,
        reason: String,
    },

    #[error("failed to open {path} for address 0x{addr:02X}: {reason}")]
    Open {
        path: String,
        addr: u16,
        reason: String,
    },
}

/// Outcome of probing one candidate address that did not yield a chip.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetectionError {
    /// Nothing recognisable lives at this address.
    #[error("no LM83 at 0x{0:02X}")]
    NotPresent(u16),

    /// A device answered but its manufacturer id is not ours.
    #[error("unsupported chip at 0x{addr:02X} (manufacturer id 0x{man_id:02X})")]
    Unsupported { addr: u16, man_id: u8 },

    #[error(transparent)]
    BusFailure(#[from] BusError),
}

/// Errors raised by the bus layer registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("address 0x{0:02X} already has an attached client")]
    AddressBusy(u16),

    #[error("client {0} is not registered")]
    UnknownClient(ClientId),

    #[error("registry is closed")]
    Closed,
}

/// Errors raised by a control surface while (un)publishing channels.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfaceError {
    #[error("channel {path} already exported")]
    AlreadyExported { path: String },

    #[error("client {0} has no exported channels")]
    NotExported(ClientId),

    #[error("control surface failure: {0}")]
    Backend(String),
}

/// Attach failed; every resource acquired before the failing step was released.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttachError {
    #[error("failed to initialise threshold registers")]
    Init(#[source] BusError),

    #[error("bus layer refused the client")]
    BusRegistration(#[source] RegistryError),

    #[error("control surface refused the channels")]
    SurfaceRegistration(#[source] SurfaceError),
}

/// Detach failed; the client stays attached and usable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetachError {
    #[error("failed to release control surface registration")]
    SurfaceRelease(#[source] SurfaceError),

    #[error("client deregistration failed, client not detached")]
    BusRelease(#[source] RegistryError),
}

/// Errors surfaced to control-surface callers of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("temperature {0} out of range [-128, 127]")]
    OutOfRange(i64),
}
