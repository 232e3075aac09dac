//! Process-wide registry of attached clients.
//!
//! Replaces a driver-global counter: the registry is created explicitly by
//! the application, allocates client ids itself and is closed on teardown.

use std::{
    fmt,
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
};

use dashmap::{DashMap, mapref::entry::Entry};
use log::{info, warn};
use serde::Serialize;

use crate::{
    bus::{BusLayer, ClientInfo},
    error::RegistryError,
};

/// Opaque identifier of an attached client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ClientId(u32);

impl ClientId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    next_id: AtomicU32,
    closed: AtomicBool,
    clients: DashMap<ClientId, ClientInfo>,
    by_address: DashMap<(String, u16), ClientId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ClientId) -> Option<ClientInfo> {
        self.clients.get(&id).map(|entry| entry.value().clone())
    }

    /// Attached clients ordered by id.
    pub fn clients(&self) -> Vec<(ClientId, ClientInfo)> {
        let mut all: Vec<_> = self
            .clients
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Refuses further attaches. Returns the clients still registered.
    pub fn close(&self) -> Vec<ClientId> {
        self.closed.store(true, Ordering::SeqCst);
        let left: Vec<_> = self.clients().into_iter().map(|(id, _)| id).collect();
        if left.is_empty() {
            info!("Client registry closed");
        } else {
            warn!("Client registry closed with {} clients still attached", left.len());
        }
        left
    }

    fn allocate(&self) -> ClientId {
        ClientId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

impl BusLayer for Registry {
    fn attach_client(&self, info: ClientInfo) -> Result<ClientId, RegistryError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RegistryError::Closed);
        }
        match self.by_address.entry((info.adapter.clone(), info.address)) {
            Entry::Occupied(_) => Err(RegistryError::AddressBusy(info.address)),
            Entry::Vacant(slot) => {
                let id = self.allocate();
                slot.insert(id);
                self.clients.insert(id, info);
                Ok(id)
            }
        }
    }

    fn detach_client(&self, id: ClientId) -> Result<(), RegistryError> {
        let (_, info) = self
            .clients
            .remove(&id)
            .ok_or(RegistryError::UnknownClient(id))?;
        self.by_address.remove(&(info.adapter, info.address));
        Ok(())
    }
}
