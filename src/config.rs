//! Crate-wide constants and runtime configuration.
//!
//! All capacities, handle bounds and retry parameters live here so they
//! can be tuned in one place.

// Capacities

/// Maximum number of simultaneously tracked connections.
/// Must be a power of two (backing store is a `heapless::FnvIndexMap`).
pub const MAX_CONNECTIONS: usize = 4;

/// Maximum number of attributes discovered per connection.
pub const MAX_ATTRIBUTES: usize = 64;

/// Maximum stored length of one attribute value (bytes).
/// Longer read responses are truncated.
pub const MAX_ATTRIBUTE_VALUE_LEN: usize = 64;

/// Largest single read response payload (ATT_MTU 247 minus the opcode byte).
pub const MAX_READ_PAYLOAD_LEN: usize = 246;

/// Maximum number of descriptors the driver reports in one discovery response.
pub const MAX_DESCRIPTORS_PER_RESPONSE: usize = 8;

/// Legacy advertising payload size (bytes).
pub const MAX_ADV_DATA_LEN: usize = 31;

// Event delivery

/// Maximum number of driver events delivered in one batch.
pub const MAX_EVENT_BATCH: usize = 8;

/// Depth of the batch queue between the driver and the router.
pub const EVENT_QUEUE_DEPTH: usize = 4;

/// Depth of the command queue feeding the router.
pub const COMMAND_QUEUE_DEPTH: usize = 4;

// GATT handle space

/// Lowest valid attribute handle.
pub const FIRST_HANDLE: u16 = 0x0001;

/// Highest valid attribute handle.
pub const LAST_HANDLE: u16 = 0xFFFF;

// Request policy

/// Total attempts per discovery/read step before the sequence is aborted.
pub const MAX_REQUEST_ATTEMPTS: u8 = 3;

/// Start attribute discovery as soon as a device connects.
pub const DISCOVER_ON_CONNECT: bool = false;

/// Runtime knobs for the event router.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Attempts per step (driver rejections and error responses both count).
    pub max_request_attempts: u8,
    /// Kick off discovery automatically on `DeviceConnected`.
    pub discover_on_connect: bool,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            max_request_attempts: MAX_REQUEST_ATTEMPTS,
            discover_on_connect: DISCOVER_ON_CONNECT,
        }
    }

    pub const fn with_max_request_attempts(mut self, attempts: u8) -> Self {
        self.max_request_attempts = attempts;
        self
    }

    pub const fn with_discover_on_connect(mut self, enabled: bool) -> Self {
        self.discover_on_connect = enabled;
        self
    }

    /// Effective attempt budget; never less than one.
    pub fn attempts(&self) -> u8 {
        self.max_request_attempts.max(1)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
