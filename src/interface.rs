//! Control surfaces: the D-Bus export used by the daemon and a no-op surface
//! for one-shot runs.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use log::{info, warn};
use tokio::runtime::Handle;
use zbus::{Connection, fdo, interface};

use crate::{
    bus::ControlSurface,
    drivers::lm83::{ChannelAccessor, ChannelRequest, ChannelResponse},
    error::{ChannelError, SurfaceError},
    registry::ClientId,
};

/// Root of the exported object tree.
pub const OBJECT_ROOT: &str = "/io/github/lm83d";

/// Object path of one channel: `<root>/<type>_<client id>/<channel>`.
pub fn channel_path(id: ClientId, type_name: &str, channel: &str) -> String {
    format!("{OBJECT_ROOT}/{type_name}_{id}/{channel}")
}

/// D-Bus object backing one channel.
pub struct ChannelObject {
    accessor: ChannelAccessor,
}

impl ChannelObject {
    async fn request(&self, request: ChannelRequest) -> fdo::Result<ChannelResponse> {
        let accessor = self.accessor.clone();
        tokio::task::spawn_blocking(move || accessor.handle(request))
            .await
            .map_err(|e| fdo::Error::Failed(e.to_string()))?
            .map_err(|e| match e {
                ChannelError::OutOfRange(_) => fdo::Error::InvalidArgs(e.to_string()),
                ChannelError::Bus(_) => fdo::Error::IOError(e.to_string()),
            })
    }
}

#[interface(name = "io.github.lm83d.Channel1")]
impl ChannelObject {
    /// Returns `(temperature, high limit)` in whole degrees Celsius.
    async fn read(&self) -> fdo::Result<(i32, i32)> {
        match self.request(ChannelRequest::Read).await? {
            ChannelResponse::Reading(r) => Ok((r.temperature.into(), r.threshold.into())),
            other => Err(fdo::Error::Failed(format!("unexpected response {other:?}"))),
        }
    }

    /// Sets the high limit, in whole degrees Celsius.
    async fn write(&self, threshold: i64) -> fdo::Result<()> {
        self.request(ChannelRequest::Write(Some(threshold)))
            .await
            .map(|_| ())
    }

    #[zbus(property)]
    async fn name(&self) -> String {
        self.accessor.info().name.to_string()
    }

    #[zbus(property)]
    async fn label(&self) -> String {
        self.accessor.info().label.to_string()
    }

    #[zbus(property)]
    async fn chip(&self) -> String {
        self.accessor.chip_name().to_string()
    }

    /// Decimal places of the values; always 0.
    #[zbus(property)]
    async fn magnitude(&self) -> u8 {
        self.accessor.info().magnitude
    }
}

/// Exports every channel as its own object on a D-Bus connection.
///
/// The trait methods block on the runtime, so they must be called from a
/// blocking thread (`spawn_blocking`), never from inside an async task.
pub struct DBusSurface {
    connection: Connection,
    runtime: Handle,
    exported: ExportTable,
}

impl DBusSurface {
    pub fn new(connection: Connection, runtime: Handle) -> Self {
        Self {
            connection,
            runtime,
            exported: ExportTable::default(),
        }
    }

    fn remove_path(&self, path: &str) -> Result<(), SurfaceError> {
        self.runtime
            .block_on(
                self.connection
                    .object_server()
                    .remove::<ChannelObject, _>(path),
            )
            .map(|_| ())
            .map_err(|e| SurfaceError::Backend(format!("{path}: {e}")))
    }
}

/// Object paths currently exported, per client.
#[derive(Debug, Default)]
struct ExportTable {
    paths: Mutex<HashMap<ClientId, Vec<String>>>,
}

impl ExportTable {
    fn insert(&self, id: ClientId, paths: Vec<String>) {
        self.lock().insert(id, paths);
    }

    /// Removes every path of `id` with `remove`. Paths that could not be
    /// removed stay recorded under `id`, so a later call can retry them;
    /// the entry disappears only once all of them are gone.
    fn withdraw<F>(&self, id: ClientId, mut remove: F) -> Result<(), SurfaceError>
    where
        F: FnMut(&str) -> Result<(), SurfaceError>,
    {
        let paths = self
            .lock()
            .get(&id)
            .cloned()
            .ok_or(SurfaceError::NotExported(id))?;

        let mut first_error = None;
        let left: Vec<String> = paths
            .into_iter()
            .filter(|path| match remove(path) {
                Ok(()) => false,
                Err(e) => {
                    first_error.get_or_insert(e);
                    true
                }
            })
            .collect();

        let mut table = self.lock();
        match first_error {
            None => {
                table.remove(&id);
                Ok(())
            }
            Some(e) => {
                table.insert(id, left);
                Err(e)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ClientId, Vec<String>>> {
        self.paths.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ControlSurface for DBusSurface {
    fn register(
        &self,
        id: ClientId,
        type_name: &str,
        channels: &[ChannelAccessor],
    ) -> Result<(), SurfaceError> {
        let server = self.connection.object_server();
        let mut added: Vec<String> = Vec::with_capacity(channels.len());

        for accessor in channels {
            let path = channel_path(id, type_name, accessor.channel().name());
            let object = ChannelObject {
                accessor: accessor.clone(),
            };
            let outcome = match self.runtime.block_on(server.at(path.as_str(), object)) {
                Ok(true) => Ok(()),
                Ok(false) => Err(SurfaceError::AlreadyExported { path: path.clone() }),
                Err(e) => Err(SurfaceError::Backend(format!("{path}: {e}"))),
            };
            if let Err(e) = outcome {
                for path in &added {
                    if let Err(rollback) = self.remove_path(path) {
                        warn!("Failed to withdraw partially exported client {id}: {rollback}");
                    }
                }
                return Err(e);
            }
            added.push(path);
        }

        info!("Exported {} channels of client {id} on D-Bus", added.len());
        self.exported.insert(id, added);
        Ok(())
    }

    fn unregister(&self, id: ClientId) -> Result<(), SurfaceError> {
        self.exported.withdraw(id, |path| self.remove_path(path))
    }
}

/// Surface that publishes nothing. Used by one-shot runs and when D-Bus is
/// disabled or unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSurface;

impl ControlSurface for NullSurface {
    fn register(
        &self,
        _id: ClientId,
        _type_name: &str,
        _channels: &[ChannelAccessor],
    ) -> Result<(), SurfaceError> {
        Ok(())
    }

    fn unregister(&self, _id: ClientId) -> Result<(), SurfaceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_paths_are_per_client() {
        assert_eq!(
            channel_path(ClientId::new(3), "lm83", "temp2"),
            "/io/github/lm83d/lm83_3/temp2"
        );
    }

    #[test]
    fn channel_paths_are_valid_object_paths() {
        let path = channel_path(ClientId::new(12), "lm83", "temp4");
        assert!(zbus::zvariant::ObjectPath::try_from(path.as_str()).is_ok());
    }

    fn paths(id: ClientId) -> Vec<String> {
        ["temp1", "temp2", "temp3"]
            .into_iter()
            .map(|c| channel_path(id, "lm83", c))
            .collect()
    }

    #[test]
    fn withdraw_forgets_client_once_all_paths_are_gone() {
        let table = ExportTable::default();
        let id = ClientId::new(1);
        table.insert(id, paths(id));
        let mut removed = Vec::new();

        table
            .withdraw(id, |p| {
                removed.push(p.to_string());
                Ok(())
            })
            .unwrap();

        assert_eq!(removed, paths(id));
        assert_eq!(
            table.withdraw(id, |_| Ok(())),
            Err(SurfaceError::NotExported(id))
        );
    }

    #[test]
    fn failed_withdraw_keeps_only_the_stuck_paths() {
        let table = ExportTable::default();
        let id = ClientId::new(2);
        table.insert(id, paths(id));
        let stuck = channel_path(id, "lm83", "temp2");
        let mut attempted = 0;

        let err = table
            .withdraw(id, |p| {
                attempted += 1;
                if p == stuck {
                    Err(SurfaceError::Backend("busy".into()))
                } else {
                    Ok(())
                }
            })
            .unwrap_err();

        assert_eq!(err, SurfaceError::Backend("busy".into()));
        assert_eq!(attempted, 3);

        let mut retried = Vec::new();
        table
            .withdraw(id, |p| {
                retried.push(p.to_string());
                Ok(())
            })
            .unwrap();
        assert_eq!(retried, vec![stuck]);
    }

    #[test]
    fn null_surface_accepts_everything() {
        let id = ClientId::new(1);
        assert!(NullSurface.register(id, "lm83", &[]).is_ok());
        assert!(NullSurface.unregister(id).is_ok());
    }
}
