//! Event router.
//!
//! Takes batches of driver events and hands each one to exactly one
//! handler. Nothing here is fatal: unknown kinds, stale responses and
//! refused requests are logged and the next event is processed.

use crate::ble::pump::SessionCommand;
use crate::ble::registry::{ConnectionRegistry, ConnectionState};
use crate::ble::{discovery, reader, Context, DriverEvent, EventSink, GattDriver, TimeoutSource};
use crate::config::Config;
use crate::error::Error;
use crate::gatt::ConnectionId;

pub struct EventRouter<D, S> {
    registry: ConnectionRegistry,
    driver: D,
    sink: S,
    config: Config,
    /// Events seen so far, for diagnostics only.
    event_count: u32,
}

impl<D: GattDriver, S: EventSink> EventRouter<D, S> {
    pub fn new(driver: D, sink: S) -> Self {
        Self::with_config(driver, sink, Config::default())
    }

    pub fn with_config(driver: D, sink: S, config: Config) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            driver,
            sink,
            config,
            event_count: 0,
        }
    }

    /// Process one batch from the driver, in order. An empty batch is a no-op.
    pub fn dispatch(&mut self, events: &[DriverEvent]) {
        for event in events {
            self.handle(event);
        }
    }

    /// Process a single driver event.
    pub fn handle(&mut self, event: &DriverEvent) {
        self.event_count = self.event_count.wrapping_add(1);
        debug!("event #{}: {}", self.event_count, event.name());

        if let Some(conn) = event.connection() {
            let opens = matches!(event, DriverEvent::DeviceConnected { .. });
            if !opens && !self.registry.contains(conn) {
                warn!("{} for unknown connection {:?} dropped", event.name(), conn);
                return;
            }
        }

        match event {
            DriverEvent::AdvertisingReport(report) => self.sink.advertising_report(report),
            DriverEvent::Timeout {
                source: TimeoutSource::Scan,
            } => {
                info!("Scan timed out");
                self.sink.scan_timed_out();
            }
            DriverEvent::Timeout { source } => info!("Something timed out: {:?}", source),
            DriverEvent::DeviceConnected { conn, peer } => {
                if !self.on_connected(*conn) {
                    return;
                }
                self.sink.device_connected(*conn, peer);
                if self.config.discover_on_connect {
                    let _ = self.start_discovery(*conn);
                }
            }
            DriverEvent::DeviceDisconnected { conn, reason } => {
                if let Some(state) = self.registry.close(*conn) {
                    if !state.is_idle() {
                        info!("{:?}: disconnected while {}, walk dropped", conn, state.name());
                    }
                }
                info!("Device disconnected: {:?} (reason {:#x})", conn, reason);
                self.sink.device_disconnected(*conn, *reason);
            }
            DriverEvent::DescriptorDiscoveryResponse {
                conn,
                status,
                descriptors,
            } => discovery::on_response(&mut self.context(), *conn, *status, descriptors),
            DriverEvent::ReadResponse {
                conn,
                status,
                handle,
                offset,
                data,
            } => reader::on_response(&mut self.context(), *conn, *status, *handle, *offset, data),
            DriverEvent::Unsupported { id } => {
                info!("Unsupported event received from driver: {}", id)
            }
        }
    }

    /// Apply an application command.
    pub fn execute(&mut self, command: SessionCommand) -> Result<(), Error> {
        match command {
            SessionCommand::Discover(conn) => self.start_discovery(conn),
        }
    }

    /// Start walking the attribute table of an idle connection.
    pub fn start_discovery(&mut self, conn: ConnectionId) -> Result<(), Error> {
        discovery::start(&mut self.context(), conn)
    }

    /// Request the next attribute of a connection that is reading.
    ///
    /// The router drives reads on its own; this is for callers that want
    /// to resume a sequence by hand.
    pub fn read_next(&mut self, conn: ConnectionId) -> Result<(), Error> {
        reader::read_next(&mut self.context(), conn)
    }

    pub fn event_count(&self) -> u32 {
        self.event_count
    }

    pub fn state(&self, conn: ConnectionId) -> Option<&ConnectionState> {
        self.registry.get(conn)
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_parts(self) -> (D, S) {
        (self.driver, self.sink)
    }

    /// Track a new link. Returns `false` when the registry has no room.
    fn on_connected(&mut self, conn: ConnectionId) -> bool {
        match self.registry.open(conn) {
            Ok(None) => info!("Device connected: {:?}", conn),
            Ok(Some(previous)) => warn!(
                "{:?} connected again while {}, state reset",
                conn,
                previous.name()
            ),
            Err(e) => {
                error!("{:?} not tracked: {:?}", conn, e);
                return false;
            }
        }
        true
    }

    fn context(&mut self) -> Context<'_, D, S> {
        Context {
            registry: &mut self.registry,
            driver: &mut self.driver,
            sink: &mut self.sink,
            config: &self.config,
        }
    }
}
