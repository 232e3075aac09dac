//! Adapter scanning: probe the configured candidate addresses, identify LM83s
//! and bring them online.

use std::time::Duration;

use log::{debug, info, warn};

use crate::{
    bus::{BusLayer, ControlSurface},
    config::AdapterCfg,
    drivers::lm83::{
        AttachedChip, ChipKind, ForcedKind, detect, device_io::BusAdapter, is_candidate,
    },
    error::DetectionError,
};

/// Detection result for one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub address: u16,
    pub outcome: Result<ChipKind, DetectionError>,
}

/// Addresses of `cfg` that may be probed. Anything outside the candidate set
/// is dropped here, before a handle is opened.
fn candidates(adapter_name: &str, cfg: &AdapterCfg) -> Vec<u16> {
    cfg.scan_addresses()
        .into_iter()
        .filter(|addr| {
            let ok = is_candidate(*addr);
            if !ok {
                warn!("Skipping 0x{addr:02x} on {adapter_name}: not an LM83 address");
            }
            ok
        })
        .collect()
}

fn identify<A: BusAdapter>(
    adapter: &A,
    address: u16,
    forced: Option<ForcedKind>,
) -> Result<(A::Io, ChipKind), DetectionError> {
    let mut io = adapter.open(address)?;
    let kind = detect(&mut io, forced)?;
    Ok((io, kind))
}

fn log_miss(adapter_name: &str, address: u16, err: &DetectionError) {
    match err {
        DetectionError::Unsupported { .. } => info!("{adapter_name}: {err}"),
        DetectionError::NotPresent(_) | DetectionError::BusFailure(_) => {
            debug!("{adapter_name}: nothing at 0x{address:02x}: {err}")
        }
    }
}

/// Runs detection on every candidate address of one adapter without
/// attaching anything.
pub fn probe<A: BusAdapter>(adapter: &A, cfg: &AdapterCfg) -> Vec<Probe> {
    let name = adapter.name();
    candidates(&name, cfg)
        .into_iter()
        .map(|address| Probe {
            address,
            outcome: identify(adapter, address, cfg.forced_kind(address)).map(|(_, kind)| kind),
        })
        .collect()
}

/// Attaches every chip found on an adapter to the given bus layer and
/// control surface.
pub struct Scanner<'a> {
    bus: &'a dyn BusLayer,
    surface: &'a dyn ControlSurface,
    update_interval: Duration,
}

impl<'a> Scanner<'a> {
    pub fn new(
        bus: &'a dyn BusLayer,
        surface: &'a dyn ControlSurface,
        update_interval: Duration,
    ) -> Self {
        Self {
            bus,
            surface,
            update_interval,
        }
    }

    /// Probes and attaches. Addresses that fail detection or attach are
    /// logged and skipped; the returned chips are in address order.
    pub fn scan<A: BusAdapter>(&self, adapter: &A, cfg: &AdapterCfg) -> Vec<AttachedChip<A::Io>> {
        let name = adapter.name();
        let mut attached = Vec::new();

        for address in candidates(&name, cfg) {
            let (io, kind) = match identify(adapter, address, cfg.forced_kind(address)) {
                Ok(found) => found,
                Err(e) => {
                    log_miss(&name, address, &e);
                    continue;
                }
            };

            match AttachedChip::attach(
                io,
                kind,
                &name,
                self.update_interval,
                self.bus,
                self.surface,
            ) {
                Ok(chip) => attached.push(chip),
                Err(e) => warn!("Failed to attach {} at {name}:0x{address:02x}: {e}", kind.type_name()),
            }
        }

        info!("{name}: {} LM83 chip(s) attached", attached.len());
        attached
    }
}
