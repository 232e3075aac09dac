use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use log::{debug, error, info};

use super::{
    channel::{ChannelAccessor, Reading, SensorChip},
    detect::ChipKind,
    device_io::RegisterIo,
    registers::{Channel, INIT_HIGH, temp_from_reg, temp_to_reg},
};
use crate::{
    bus::{BusLayer, ClientInfo, ControlSurface},
    error::{AttachError, BusError, DetachError},
    registry::ClientId,
};

/// Nominal update interval of the chip. A cached reading is served for up to
/// one and a half intervals.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(1);

/// Cached register values of one chip.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Cache {
    /// False until the first successful refresh.
    valid: bool,
    last_updated: Instant,
    temps: [i8; 4],
    highs: [i8; 4],
}

impl Cache {
    fn new(created: Instant) -> Self {
        Self {
            valid: false,
            last_updated: created,
            temps: [0; 4],
            highs: [INIT_HIGH; 4],
        }
    }

    /// Refresh is due when the cache was never filled, when it is older than
    /// 1.5 update intervals, or when `now` lies before the last update.
    fn is_stale(&self, now: Instant, interval: Duration) -> bool {
        if !self.valid {
            return true;
        }
        match now.checked_duration_since(self.last_updated) {
            Some(elapsed) => elapsed > interval + interval / 2,
            None => true,
        }
    }
}

struct State<Io> {
    io: Io,
    cache: Cache,
}

/// One attached LM83.
///
/// The register handle and the whole cache sit behind a single lock, so at
/// most one bus transaction is in flight per chip and threshold writes are
/// ordered against refreshes.
pub struct ChipClient<Io: RegisterIo> {
    address: u16,
    kind: ChipKind,
    name: String,
    update_interval: Duration,
    state: Mutex<State<Io>>,
}

impl<Io: RegisterIo> std::fmt::Debug for ChipClient<Io> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChipClient")
            .field("address", &self.address)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<Io: RegisterIo> ChipClient<Io> {
    /// Wraps a freshly identified device. Nothing is written to the chip.
    pub fn new(io: Io, kind: ChipKind, update_interval: Duration) -> Self {
        Self {
            address: io.address(),
            kind,
            name: kind.client_name().to_string(),
            update_interval,
            state: Mutex::new(State {
                io,
                cache: Cache::new(Instant::now()),
            }),
        }
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn kind(&self) -> ChipKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    /// Whether the cache holds at least one complete set of readings.
    pub fn is_valid(&self) -> bool {
        self.lock().cache.valid
    }

    /// Programs the default high limit on every channel.
    pub fn init(&self) -> Result<(), BusError> {
        let mut state = self.lock();
        for channel in Channel::ALL {
            state.cache.highs[channel.index()] = INIT_HIGH;
            state
                .io
                .write_register(channel.high_write_reg(), temp_to_reg(INIT_HIGH))?;
        }
        Ok(())
    }

    /// Refreshes the cached temperatures if they are stale.
    ///
    /// The clock is sampled after the lock is taken, so a caller that waited
    /// behind another refresh never sees a timestamp older than the cache.
    pub fn maybe_refresh(&self) -> Result<(), BusError> {
        let mut state = self.lock();
        self.refresh_locked(&mut state, Instant::now())
    }

    pub fn maybe_refresh_at(&self, now: Instant) -> Result<(), BusError> {
        let mut state = self.lock();
        self.refresh_locked(&mut state, now)
    }

    /// Current temperature and high limit of `channel`, refreshing first if needed.
    pub fn read(&self, channel: Channel) -> Result<Reading, BusError> {
        let mut state = self.lock();
        self.read_locked(&mut state, channel, Instant::now())
    }

    /// Like [`ChipClient::read`] with an explicit clock reading.
    pub fn read_at(&self, channel: Channel, now: Instant) -> Result<Reading, BusError> {
        let mut state = self.lock();
        self.read_locked(&mut state, channel, now)
    }

    fn read_locked(
        &self,
        state: &mut State<Io>,
        channel: Channel,
        now: Instant,
    ) -> Result<Reading, BusError> {
        self.refresh_locked(state, now)?;
        Ok(Reading {
            temperature: state.cache.temps[channel.index()],
            threshold: state.cache.highs[channel.index()],
        })
    }

    /// Stores a new high limit and writes it through to the chip.
    ///
    /// The cached limit is updated before the bus write and is kept even when
    /// the write fails.
    pub fn write_threshold(&self, channel: Channel, value: i8) -> Result<(), BusError> {
        let mut state = self.lock();
        state.cache.highs[channel.index()] = value;
        state
            .io
            .write_register(channel.high_write_reg(), temp_to_reg(value))
    }

    pub fn threshold(&self, channel: Channel) -> i8 {
        self.lock().cache.highs[channel.index()]
    }

    fn refresh_locked(&self, state: &mut State<Io>, now: Instant) -> Result<(), BusError> {
        if !state.cache.is_stale(now, self.update_interval) {
            return Ok(());
        }
        debug!("Updating {} data at 0x{:02x}", self.kind.type_name(), self.address);

        let mut temps = [0i8; 4];
        for channel in Channel::ALL {
            temps[channel.index()] = temp_from_reg(state.io.read_register(channel.temp_reg())?);
        }

        state.cache.temps = temps;
        state.cache.last_updated = now;
        state.cache.valid = true;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, State<Io>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<Io: RegisterIo> SensorChip for ChipClient<Io> {
    fn name(&self) -> &str {
        &self.name
    }

    fn address(&self) -> u16 {
        self.address
    }

    fn read_channel(&self, channel: Channel) -> Result<Reading, BusError> {
        self.read(channel)
    }

    fn set_threshold(&self, channel: Channel, value: i8) -> Result<(), BusError> {
        self.write_threshold(channel, value)
    }
}

/// A chip registered with the bus layer and exported on a control surface.
pub struct AttachedChip<Io: RegisterIo> {
    id: ClientId,
    adapter: String,
    client: Arc<ChipClient<Io>>,
}

impl<Io: RegisterIo> std::fmt::Debug for AttachedChip<Io> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachedChip")
            .field("id", &self.id)
            .field("adapter", &self.adapter)
            .field("client", &self.client)
            .finish()
    }
}

/// Detach did not complete; the chip is handed back still attached.
#[derive(Debug)]
pub struct DetachFailure<Io: RegisterIo> {
    pub chip: AttachedChip<Io>,
    pub error: DetachError,
}

impl<Io: RegisterIo> AttachedChip<Io> {
    /// Brings an identified chip online.
    ///
    /// Steps, each rolled back in reverse order when a later one fails:
    /// program default thresholds, register with the bus layer, export the
    /// four channels on the control surface.
    pub fn attach(
        io: Io,
        kind: ChipKind,
        adapter: &str,
        update_interval: Duration,
        bus: &dyn BusLayer,
        surface: &dyn ControlSurface,
    ) -> Result<Self, AttachError> {
        let client = Arc::new(ChipClient::new(io, kind, update_interval));
        client.init().map_err(AttachError::Init)?;

        let id = bus
            .attach_client(ClientInfo {
                name: client.name().to_string(),
                adapter: adapter.to_string(),
                address: client.address(),
                kind,
            })
            .map_err(AttachError::BusRegistration)?;

        let channels = ChannelAccessor::for_chip(client.clone());
        if let Err(e) = surface.register(id, kind.type_name(), &channels) {
            if let Err(rollback) = bus.detach_client(id) {
                error!("Failed to roll back bus registration of client {id}: {rollback}");
            }
            return Err(AttachError::SurfaceRegistration(e));
        }

        info!(
            "Attached {} at {}:0x{:02x} as client {id}",
            client.name(),
            adapter,
            client.address()
        );
        Ok(Self {
            id,
            adapter: adapter.to_string(),
            client,
        })
    }

    /// Withdraws the channels, then the bus registration, then frees the chip.
    ///
    /// If either release fails the chip is returned untouched by the failed
    /// step and remains usable.
    pub fn detach(
        self,
        bus: &dyn BusLayer,
        surface: &dyn ControlSurface,
    ) -> Result<(), DetachFailure<Io>> {
        if let Err(e) = surface.unregister(self.id) {
            return Err(DetachFailure {
                chip: self,
                error: DetachError::SurfaceRelease(e),
            });
        }
        if let Err(e) = bus.detach_client(self.id) {
            error!("Client {} deregistration failed, client not detached", self.id);
            return Err(DetachFailure {
                chip: self,
                error: DetachError::BusRelease(e),
            });
        }
        info!(
            "Detached {} at {}:0x{:02x}",
            self.client.name(),
            self.adapter,
            self.client.address()
        );
        Ok(())
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn adapter(&self) -> &str {
        &self.adapter
    }

    pub fn client(&self) -> &Arc<ChipClient<Io>> {
        &self.client
    }

    /// Fresh accessors for the four channels of this chip.
    pub fn channels(&self) -> [ChannelAccessor; 4] {
        ChannelAccessor::for_chip(self.client.clone())
    }
}
