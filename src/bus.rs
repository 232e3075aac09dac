//! Collaborator seams of the driver: the bus layer that tracks attached
//! clients and the control surface that exposes their channels.

use serde::Serialize;

use crate::{
    drivers::lm83::{channel::ChannelAccessor, detect::ChipKind},
    error::{RegistryError, SurfaceError},
    registry::ClientId,
};

/// What the bus layer learns about a client when it is attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    pub name: String,
    pub adapter: String,
    pub address: u16,
    pub kind: ChipKind,
}

/// Bus-side bookkeeping of attached clients.
pub trait BusLayer: Send + Sync {
    /// Records a new client and hands out its id.
    fn attach_client(&self, info: ClientInfo) -> Result<ClientId, RegistryError>;

    fn detach_client(&self, id: ClientId) -> Result<(), RegistryError>;
}

/// Where channels become visible to callers.
pub trait ControlSurface: Send + Sync {
    /// Publishes the channels of client `id` under a directory named after
    /// `type_name`.
    fn register(
        &self,
        id: ClientId,
        type_name: &str,
        channels: &[ChannelAccessor],
    ) -> Result<(), SurfaceError>;

    fn unregister(&self, id: ClientId) -> Result<(), SurfaceError>;
}
