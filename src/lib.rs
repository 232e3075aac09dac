//! # lm83d
//!
//! A Linux daemon and driver library for the National Semiconductor LM83
//! four-channel temperature sensor on i2c/SMBus.
//!
//! ## Features
//!
//! - **Detection**: probes the nine LM83 candidate addresses and identifies
//!   the chip by its manufacturer id, with per-address overrides
//! - **Cached Readings**: one bus refresh per chip per update window, shared
//!   by every reader
//! - **Thresholds**: per-channel high limits, written through to the chip
//! - **D-Bus Interface**: one object per channel with `Read`/`Write`
//! - **Monitoring**: periodic polling with high-limit warnings
//!
//! ## Architecture
//!
//! - [`drivers::lm83`] - register map, detection, client cache and channels
//! - [`Registry`](registry::Registry) - bus layer bookkeeping of attached clients
//! - [`DBusSurface`](interface::DBusSurface) - control surface exporting channels
//! - [`Scanner`](scanner::Scanner) - adapter walk that attaches detected chips
//!
//! ## Example
//!
//! ```no_run
//! use lm83d::{application::Application, config::Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     Application::builder()
//!         .with_config(config)
//!         .build()?
//!         .run()
//!         .await
//! }
//! ```

pub mod application;
pub mod bus;
pub mod cli;
pub mod config;
pub mod drivers;
pub mod error;
pub mod interface;
pub mod monitor;
pub mod registry;
pub mod scanner;
pub mod task_manager;

#[cfg(test)]
mod test_utils;
