//! End-to-end attribute walks through the public API.

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::Channel;

use gatt_walker::ble::{pump, ConnectionState, EventBatch, PeerAddress, SessionCommand};
use gatt_walker::gatt::{DiscoveredDescriptor, GattStatus, Uuid};
use gatt_walker::{
    AttributeHandle, BleError, ConnectionId, Descriptor, DriverEvent, Error, EventRouter,
    EventSink, GattDriver, HandleRange,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Request {
    Discover(ConnectionId, u16),
    Read(ConnectionId, u16),
}

/// Records requests; every one is accepted.
#[derive(Default)]
struct Radio {
    requests: Vec<Request>,
}

impl GattDriver for Radio {
    fn discover_descriptors(
        &mut self,
        conn: ConnectionId,
        range: HandleRange,
    ) -> Result<(), BleError> {
        self.requests.push(Request::Discover(conn, range.start.raw()));
        Ok(())
    }

    fn read_attribute(
        &mut self,
        conn: ConnectionId,
        handle: AttributeHandle,
        _offset: u16,
    ) -> Result<(), BleError> {
        self.requests.push(Request::Read(conn, handle.raw()));
        Ok(())
    }
}

#[derive(Default)]
struct App {
    tables: Vec<(ConnectionId, Vec<Descriptor>)>,
    aborted: Vec<(ConnectionId, Error)>,
}

impl EventSink for App {
    fn attributes_updated(&mut self, conn: ConnectionId, descriptors: &[Descriptor]) {
        self.tables.push((conn, descriptors.to_vec()));
    }

    fn sequence_aborted(&mut self, conn: ConnectionId, error: Error) {
        self.aborted.push((conn, error));
    }
}

const PEER: PeerAddress = PeerAddress {
    random: true,
    bytes: [0xC0, 0xFF, 0xEE, 0x00, 0x11, 0x22],
};

fn h(raw: u16) -> AttributeHandle {
    AttributeHandle::new(raw).unwrap()
}

fn connect(conn: u16) -> DriverEvent {
    DriverEvent::DeviceConnected {
        conn: ConnectionId(conn),
        peer: PEER,
    }
}

fn page(conn: u16, handles: &[u16]) -> DriverEvent {
    DriverEvent::DescriptorDiscoveryResponse {
        conn: ConnectionId(conn),
        status: GattStatus::Success,
        descriptors: handles
            .iter()
            .map(|&raw| DiscoveredDescriptor {
                handle: h(raw),
                uuid: Uuid::Uuid16(0x2A00),
            })
            .collect(),
    }
}

fn value(conn: u16, handle: u16, data: &[u8]) -> DriverEvent {
    DriverEvent::ReadResponse {
        conn: ConnectionId(conn),
        status: GattStatus::Success,
        handle: h(handle),
        offset: 0,
        data: heapless::Vec::from_slice(data).unwrap(),
    }
}

fn new_router() -> EventRouter<Radio, App> {
    EventRouter::new(Radio::default(), App::default())
}

#[test]
fn discover_then_read_whole_table() {
    let mut router = new_router();
    let c7 = ConnectionId(7);

    router.dispatch(&[connect(7)]);
    router.start_discovery(c7).unwrap();
    router.dispatch(&[page(7, &[10, 11, 12])]);
    router.dispatch(&[page(7, &[])]);

    assert!(router.state(c7).unwrap().is_reading());
    router.dispatch(&[value(7, 10, b"alpha")]);
    router.dispatch(&[value(7, 11, b"")]);
    router.dispatch(&[value(7, 12, &[0x01, 0x02])]);

    assert_eq!(
        router.driver().requests,
        [
            Request::Discover(c7, 0x0001),
            Request::Discover(c7, 13),
            Request::Read(c7, 10),
            Request::Read(c7, 11),
            Request::Read(c7, 12),
        ]
    );

    let app = router.sink();
    assert_eq!(app.tables.len(), 1);
    let (conn, table) = &app.tables[0];
    assert_eq!(*conn, c7);
    let values: Vec<_> = table.iter().map(|d| d.data().unwrap()).collect();
    assert_eq!(values, [&b"alpha"[..], &b""[..], &[0x01, 0x02][..]]);
    assert!(router.state(c7).unwrap().is_idle());
}

#[test]
fn empty_table_reports_nothing_found() {
    let mut router = new_router();
    let c1 = ConnectionId(1);

    router.dispatch(&[connect(1)]);
    router.start_discovery(c1).unwrap();
    router.dispatch(&[page(1, &[])]);

    assert_eq!(router.sink().tables, [(c1, Vec::<Descriptor>::new())]);
    assert!(router.state(c1).unwrap().is_idle());
    assert!(!router
        .driver()
        .requests
        .iter()
        .any(|r| matches!(r, Request::Read(..))));
}

#[test]
fn disconnect_mid_walk_drops_late_responses() {
    let mut router = new_router();
    let c3 = ConnectionId(3);

    router.dispatch(&[connect(3)]);
    router.start_discovery(c3).unwrap();
    router.dispatch(&[
        page(3, &[1, 2]),
        DriverEvent::DeviceDisconnected { conn: c3, reason: 0x08 },
        page(3, &[3]),
        value(3, 1, b"late"),
    ]);

    assert!(router.state(c3).is_none());
    assert!(router.sink().tables.is_empty());
    assert!(router.sink().aborted.is_empty());
    assert_eq!(router.event_count(), 5);
}

#[test]
fn two_links_walk_independently() {
    let mut router = new_router();

    router.dispatch(&[connect(1), connect(2)]);
    router.start_discovery(ConnectionId(1)).unwrap();
    router.start_discovery(ConnectionId(2)).unwrap();
    router.dispatch(&[page(2, &[5]), page(1, &[8, 9]), page(1, &[]), page(2, &[])]);
    router.dispatch(&[value(1, 8, b"x"), value(2, 5, b"y"), value(1, 9, b"z")]);

    let tables = &router.sink().tables;
    assert_eq!(tables.len(), 2);
    assert_eq!(tables[0].0, ConnectionId(2));
    assert_eq!(tables[0].1.len(), 1);
    assert_eq!(tables[1].0, ConnectionId(1));
    assert_eq!(tables[1].1.len(), 2);
}

#[test]
fn replayed_read_response_is_ignored() {
    let mut router = new_router();
    let c7 = ConnectionId(7);

    router.dispatch(&[connect(7)]);
    router.start_discovery(c7).unwrap();
    router.dispatch(&[page(7, &[10, 11]), page(7, &[])]);
    router.dispatch(&[value(7, 10, b"first"), value(7, 10, b"again")]);

    let ConnectionState::Reading(read) = router.state(c7).unwrap() else {
        panic!("expected reading");
    };
    assert_eq!(read.cursor(), 1);
    assert_eq!(read.descriptors()[0].data(), Some(&b"first"[..]));
}

#[test]
fn failing_reads_abort_and_allow_a_new_walk() {
    let mut router = new_router();
    let c4 = ConnectionId(4);
    let failure = DriverEvent::ReadResponse {
        conn: c4,
        status: GattStatus::Other(0x0102),
        handle: h(6),
        offset: 0,
        data: heapless::Vec::new(),
    };

    router.dispatch(&[connect(4)]);
    router.start_discovery(c4).unwrap();
    router.dispatch(&[page(4, &[6]), page(4, &[])]);
    router.dispatch(&[failure.clone(), failure.clone(), failure]);

    assert_eq!(
        router.sink().aborted,
        [(c4, Error::Ble(BleError::Gatt(GattStatus::Other(0x0102))))]
    );
    assert!(router.state(c4).unwrap().is_idle());
    assert!(router.start_discovery(c4).is_ok());
}

#[test]
fn pump_feeds_router_from_channels() {
    let events: Channel<NoopRawMutex, EventBatch, 4> = Channel::new();
    let commands: Channel<NoopRawMutex, SessionCommand, 4> = Channel::new();
    let mut router = new_router();
    let c9 = ConnectionId(9);

    let mut batch = EventBatch::new();
    batch.push(connect(9)).unwrap();
    events.try_send(batch).unwrap();
    assert_eq!(pump::drain(&mut router, events.receiver(), commands.receiver()), 1);

    commands.try_send(SessionCommand::Discover(c9)).unwrap();
    let mut batch = EventBatch::new();
    batch.push(page(9, &[2])).unwrap();
    batch.push(page(9, &[])).unwrap();
    batch.push(value(9, 2, b"ok")).unwrap();
    events.try_send(batch).unwrap();

    // The command is picked up after the queued batch, so the batch is dropped.
    assert_eq!(pump::drain(&mut router, events.receiver(), commands.receiver()), 2);
    assert!(router.state(c9).unwrap().is_discovering());

    let mut batch = EventBatch::new();
    batch.push(page(9, &[2])).unwrap();
    batch.push(page(9, &[])).unwrap();
    batch.push(value(9, 2, b"ok")).unwrap();
    events.try_send(batch).unwrap();
    assert_eq!(pump::drain(&mut router, events.receiver(), commands.receiver()), 1);

    let (_, app) = router.into_parts();
    assert_eq!(app.tables.len(), 1);
    assert_eq!(app.tables[0].1[0].data(), Some(&b"ok"[..]));
}
