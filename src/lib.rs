//! GATT attribute table discovery and bulk read-out for BLE central links.
//!
//! The crate is the event-driven core that sits between a radio driver and
//! the rest of an application. For every connection it walks the remote
//! handle space with paginated descriptor discovery, then reads each
//! discovered attribute in order and reports the filled-in table once.
//!
//! The radio driver plugs in through [`ble::GattDriver`] (outbound requests)
//! and a stream of [`ble::DriverEvent`] batches (inbound responses). The
//! application receives results through [`ble::EventSink`].
//!
//! Everything is `no_std` and allocation-free; capacities are set in
//! [`config`].
//!
//! Diagnostics go through `defmt` (feature `defmt`) or `log` (feature `log`).

#![cfg_attr(not(test), no_std)]

// Must stay first: the logging macros are textually scoped.
mod fmt;

pub mod ble;
pub mod config;
pub mod error;
pub mod gatt;

pub use ble::{DriverEvent, EventRouter, EventSink, GattDriver};
pub use config::Config;
pub use error::{BleError, Error};
pub use gatt::{AttributeHandle, ConnectionId, Descriptor, HandleRange};
