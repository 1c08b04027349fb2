//! Unified error type for gatt-walker.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` (feature `defmt`) for on-target logging.

use core::fmt;

use crate::gatt::{AttributeHandle, ConnectionId, GattStatus};

/// Top-level error type used across the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The driver rejected a request or a response carried an error status.
    Ble(BleError),

    /// No state is tracked for this connection.
    UnknownConnection(ConnectionId),

    /// A discovery or read sequence is already running on this connection.
    Busy(ConnectionId),

    /// The connection is not in the read-out phase.
    NotReading(ConnectionId),

    /// Connection registry is full.
    TooManyConnections,

    /// The peer exposes more attributes than we can hold.
    TooManyAttributes,

    /// The attribute already holds its value.
    ValueAlreadySet(AttributeHandle),

    /// Buffer too small for the requested operation.
    BufferOverflow,
}

/// Subset of driver errors we propagate (keeps the enum `Copy`-friendly).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BleError {
    /// Raw error code from the radio driver.
    Raw(u32),
    /// Descriptor discovery pages stopped advancing.
    DiscoveryFailed,
    /// The driver no longer knows the link.
    NotConnected,
    /// The peer answered with an ATT error.
    Gatt(GattStatus),
}

// Convenience conversions

impl From<BleError> for Error {
    fn from(e: BleError) -> Self {
        Error::Ble(e)
    }
}

impl fmt::Display for BleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BleError::Raw(code) => write!(f, "driver error {:#x}", code),
            BleError::DiscoveryFailed => f.write_str("descriptor discovery failed"),
            BleError::NotConnected => f.write_str("not connected"),
            BleError::Gatt(status) => write!(f, "gatt status {:?}", status),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Ble(e) => write!(f, "ble: {}", e),
            Error::UnknownConnection(conn) => write!(f, "unknown connection {}", conn),
            Error::Busy(conn) => write!(f, "connection {} is busy", conn),
            Error::NotReading(conn) => write!(f, "connection {} is not reading", conn),
            Error::TooManyConnections => f.write_str("too many connections"),
            Error::TooManyAttributes => f.write_str("too many attributes"),
            Error::ValueAlreadySet(handle) => write!(f, "value of {} already set", handle),
            Error::BufferOverflow => f.write_str("buffer overflow"),
        }
    }
}
