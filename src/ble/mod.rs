//! Bluetooth Low Energy central: GATT table walk and read-out.
//!
//! The radio driver is an external capability. It accepts fire-and-forget
//! requests through [`GattDriver`] and reports everything that happens on
//! the air as batches of [`DriverEvent`]s:
//!
//! 1. **Router** - classifies each event and hands it to exactly one handler.
//! 2. **Discovery** - pages through the handle space collecting descriptors.
//! 3. **Reader** - reads every discovered attribute in order, one at a time.
//! 4. **Registry** - owns the per-connection state the other three mutate.
//!
//! Results leave through the [`EventSink`] implemented by the application.

pub mod discovery;
pub mod pump;
pub mod reader;
pub mod registry;
pub mod router;


use heapless::Vec;

use crate::config::{Config, MAX_ADV_DATA_LEN, MAX_DESCRIPTORS_PER_RESPONSE, MAX_READ_PAYLOAD_LEN};
use crate::error::{BleError, Error};
use crate::gatt::{
    AttributeHandle, ConnectionId, Descriptor, DiscoveredDescriptor, GattStatus, HandleRange,
};

pub use pump::{EventBatch, SessionCommand};
pub use registry::{ConnectionRegistry, ConnectionState};
pub use router::EventRouter;

/// Device address of a peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerAddress {
    /// Random (true) or public (false) address.
    pub random: bool,
    /// Address bytes, little-endian as on the air.
    pub bytes: [u8; 6],
}

/// A received advertising or scan response packet.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdvertisingReport {
    pub peer: PeerAddress,
    /// Received Signal Strength Indicator (dBm).
    pub rssi: i8,
    pub data: Vec<u8, MAX_ADV_DATA_LEN>,
}

/// What ran out of time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimeoutSource {
    Scan,
    Advertising,
    Connection,
    SecurityRequest,
    Other(u8),
}

/// Events emitted by the radio driver.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverEvent {
    AdvertisingReport(AdvertisingReport),
    Timeout {
        source: TimeoutSource,
    },
    DeviceConnected {
        conn: ConnectionId,
        peer: PeerAddress,
    },
    DeviceDisconnected {
        conn: ConnectionId,
        /// HCI disconnect reason.
        reason: u8,
    },
    /// One page of a descriptor discovery. An empty page ends the walk.
    DescriptorDiscoveryResponse {
        conn: ConnectionId,
        status: GattStatus,
        descriptors: Vec<DiscoveredDescriptor, MAX_DESCRIPTORS_PER_RESPONSE>,
    },
    ReadResponse {
        conn: ConnectionId,
        status: GattStatus,
        handle: AttributeHandle,
        offset: u16,
        data: Vec<u8, MAX_READ_PAYLOAD_LEN>,
    },
    /// Anything the router has no handler for.
    Unsupported {
        id: u16,
    },
}

impl DriverEvent {
    /// Connection the event refers to, if any.
    pub fn connection(&self) -> Option<ConnectionId> {
        match self {
            DriverEvent::DeviceConnected { conn, .. }
            | DriverEvent::DeviceDisconnected { conn, .. }
            | DriverEvent::DescriptorDiscoveryResponse { conn, .. }
            | DriverEvent::ReadResponse { conn, .. } => Some(*conn),
            _ => None,
        }
    }

    /// Short name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            DriverEvent::AdvertisingReport(_) => "adv-report",
            DriverEvent::Timeout { .. } => "timeout",
            DriverEvent::DeviceConnected { .. } => "connected",
            DriverEvent::DeviceDisconnected { .. } => "disconnected",
            DriverEvent::DescriptorDiscoveryResponse { .. } => "desc-disc-rsp",
            DriverEvent::ReadResponse { .. } => "read-rsp",
            DriverEvent::Unsupported { .. } => "unsupported",
        }
    }
}

/// Outbound GATT client requests.
///
/// Each call only queues the request; its outcome arrives later as a
/// [`DriverEvent`] for the same connection.
pub trait GattDriver {
    fn discover_descriptors(
        &mut self,
        conn: ConnectionId,
        range: HandleRange,
    ) -> Result<(), BleError>;

    fn read_attribute(
        &mut self,
        conn: ConnectionId,
        handle: AttributeHandle,
        offset: u16,
    ) -> Result<(), BleError>;
}

impl<T: GattDriver + ?Sized> GattDriver for &mut T {
    fn discover_descriptors(
        &mut self,
        conn: ConnectionId,
        range: HandleRange,
    ) -> Result<(), BleError> {
        (**self).discover_descriptors(conn, range)
    }

    fn read_attribute(
        &mut self,
        conn: ConnectionId,
        handle: AttributeHandle,
        offset: u16,
    ) -> Result<(), BleError> {
        (**self).read_attribute(conn, handle, offset)
    }
}

/// Notifications for the rest of the application (scanner, UI, ...).
pub trait EventSink {
    fn advertising_report(&mut self, _report: &AdvertisingReport) {}

    fn scan_timed_out(&mut self) {}

    fn device_connected(&mut self, _conn: ConnectionId, _peer: &PeerAddress) {}

    fn device_disconnected(&mut self, _conn: ConnectionId, _reason: u8) {}

    /// Every discovered attribute now carries its value. Emitted once per
    /// completed walk; an empty slice means the peer has no attributes.
    fn attributes_updated(&mut self, _conn: ConnectionId, _descriptors: &[Descriptor]) {}

    /// A walk gave up after exhausting its attempts; state is back to idle.
    fn sequence_aborted(&mut self, _conn: ConnectionId, _error: Error) {}
}

impl<T: EventSink + ?Sized> EventSink for &mut T {
    fn advertising_report(&mut self, report: &AdvertisingReport) {
        (**self).advertising_report(report)
    }

    fn scan_timed_out(&mut self) {
        (**self).scan_timed_out()
    }

    fn device_connected(&mut self, conn: ConnectionId, peer: &PeerAddress) {
        (**self).device_connected(conn, peer)
    }

    fn device_disconnected(&mut self, conn: ConnectionId, reason: u8) {
        (**self).device_disconnected(conn, reason)
    }

    fn attributes_updated(&mut self, conn: ConnectionId, descriptors: &[Descriptor]) {
        (**self).attributes_updated(conn, descriptors)
    }

    fn sequence_aborted(&mut self, conn: ConnectionId, error: Error) {
        (**self).sequence_aborted(conn, error)
    }
}

/// Run `request` until it is accepted or `attempts` runs out.
pub(crate) fn issue<F>(attempts: u8, mut request: F) -> Result<(), BleError>
where
    F: FnMut() -> Result<(), BleError>,
{
    let mut last = BleError::NotConnected;
    for attempt in 1..=attempts.max(1) {
        match request() {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!("request rejected (attempt {}): {:?}", attempt, e);
                last = e;
            }
        }
    }
    Err(last)
}

/// Borrowed view of the router that the sequencers operate on.
pub(crate) struct Context<'a, D, S> {
    pub(crate) registry: &'a mut ConnectionRegistry,
    pub(crate) driver: &'a mut D,
    pub(crate) sink: &'a mut S,
    pub(crate) config: &'a Config,
}

/// Give up on the walk and return the connection to idle.
pub(crate) fn abort<D: GattDriver, S: EventSink>(
    ctx: &mut Context<'_, D, S>,
    conn: ConnectionId,
    error: Error,
) {
    if matches!(ctx.registry.take(conn), None | Some(ConnectionState::Idle)) {
        return;
    }
    error!("{:?}: attribute walk aborted: {:?}", conn, error);
    ctx.sink.sequence_aborted(conn, error);
}
