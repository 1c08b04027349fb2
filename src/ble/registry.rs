//! Per-connection state, keyed by connection id.
//!
//! The registry is the only place connection state lives. An entry is
//! created on connect and removed together with the disconnect event, so a
//! response that arrives after the link is gone finds nothing to mutate.

use heapless::FnvIndexMap;

use crate::ble::discovery::DiscoveryState;
use crate::ble::reader::ReadState;
use crate::config::MAX_CONNECTIONS;
use crate::error::Error;
use crate::gatt::ConnectionId;

/// Where a connection is in the discover-then-read walk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    /// No walk in progress.
    #[default]
    Idle,
    /// Paging through the handle space.
    Discovering(DiscoveryState),
    /// Reading discovered attributes in order.
    Reading(ReadState),
}

impl ConnectionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, ConnectionState::Idle)
    }

    pub fn is_discovering(&self) -> bool {
        matches!(self, ConnectionState::Discovering(_))
    }

    pub fn is_reading(&self) -> bool {
        matches!(self, ConnectionState::Reading(_))
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Discovering(_) => "discovering",
            ConnectionState::Reading(_) => "reading",
        }
    }
}

/// Exclusive owner of `ConnectionId -> ConnectionState`.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: FnvIndexMap<ConnectionId, ConnectionState, MAX_CONNECTIONS>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: FnvIndexMap::new(),
        }
    }

    /// Track a new connection as idle.
    ///
    /// An id that is already tracked is reset to idle; the previous state
    /// is returned.
    pub fn open(&mut self, conn: ConnectionId) -> Result<Option<ConnectionState>, Error> {
        self.connections
            .insert(conn, ConnectionState::Idle)
            .map_err(|_| Error::TooManyConnections)
    }

    /// Forget a connection, dropping any walk in progress.
    pub fn close(&mut self, conn: ConnectionId) -> Option<ConnectionState> {
        self.connections.remove(&conn)
    }

    pub fn get(&self, conn: ConnectionId) -> Option<&ConnectionState> {
        self.connections.get(&conn)
    }

    pub fn get_mut(&mut self, conn: ConnectionId) -> Option<&mut ConnectionState> {
        self.connections.get_mut(&conn)
    }

    /// Move the current state out, leaving the connection idle.
    pub fn take(&mut self, conn: ConnectionId) -> Option<ConnectionState> {
        self.get_mut(conn).map(core::mem::take)
    }

    /// Replace the state of a tracked connection.
    pub fn set(&mut self, conn: ConnectionId, state: ConnectionState) -> Result<(), Error> {
        let slot = self.get_mut(conn).ok_or(Error::UnknownConnection(conn))?;
        *slot = state;
        Ok(())
    }

    pub fn contains(&self, conn: ConnectionId) -> bool {
        self.connections.contains_key(&conn)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.connections.len() == MAX_CONNECTIONS
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConnectionId, &ConnectionState)> {
        self.connections.iter().map(|(conn, state)| (*conn, state))
    }
}
