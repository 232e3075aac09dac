//! National Semiconductor LM83 driver.
//!
//! The LM83 reports its own temperature plus up to three remote diodes with
//! 1 degree resolution and one programmable high limit per channel.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use lm83d::drivers::lm83::{AttachedChip, Channel, LinuxAdapter, detect};
//! use lm83d::drivers::lm83::device_io::BusAdapter;
//! use lm83d::registry::Registry;
//! use lm83d::interface::NullSurface;
//!
//! # fn example() -> anyhow::Result<()> {
//! let adapter = LinuxAdapter::new(0);
//! let mut io = adapter.open(0x18)?;
//! let kind = detect(&mut io, None)?;
//! let registry = Registry::new();
//! let chip = AttachedChip::attach(
//!     io,
//!     kind,
//!     &adapter.name(),
//!     Duration::from_secs(1),
//!     &registry,
//!     &NullSurface,
//! )?;
//! let local = chip.client().read(Channel::Local)?;
//! println!("{}°C (high {}°C)", local.temperature, local.threshold);
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod client;
pub mod detect;
pub mod device_io;
pub mod registers;

pub use channel::{ChannelAccessor, ChannelMetadata, ChannelRequest, ChannelResponse, Reading};
pub use client::{AttachedChip, ChipClient, DEFAULT_UPDATE_INTERVAL, DetachFailure};
pub use detect::{ChipKind, ForcedKind, detect, is_candidate};
pub use device_io::{I2cDev, LinuxAdapter, RegisterIo};
pub use registers::{Channel, NORMAL_ADDRESSES};
