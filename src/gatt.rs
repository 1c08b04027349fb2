//! GATT domain types shared by the router and the sequencers.

use core::fmt;

use heapless::Vec;

use crate::config::{FIRST_HANDLE, LAST_HANDLE, MAX_ATTRIBUTE_VALUE_LEN};
use crate::error::Error;

/// Opaque identifier of one BLE link, assigned by the driver on connect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionId(pub u16);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Position of an attribute in the remote table, `0x0001..=0xFFFF`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AttributeHandle(u16);

impl AttributeHandle {
    pub const FIRST: Self = Self(FIRST_HANDLE);
    pub const LAST: Self = Self(LAST_HANDLE);

    /// Handle 0 is reserved and rejected.
    pub const fn new(raw: u16) -> Option<Self> {
        if raw == 0 {
            None
        } else {
            Some(Self(raw))
        }
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    /// The following handle, or `None` past the end of the handle space.
    pub const fn next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }
}

impl fmt::Display for AttributeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Inclusive handle bounds of a discovery request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HandleRange {
    pub start: AttributeHandle,
    pub end: AttributeHandle,
}

impl HandleRange {
    /// The whole table, `0x0001..=0xFFFF`.
    pub const FULL: Self = Self {
        start: AttributeHandle::FIRST,
        end: AttributeHandle::LAST,
    };

    pub fn new(start: AttributeHandle, end: AttributeHandle) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// From `start` to the end of the table.
    pub const fn starting_at(start: AttributeHandle) -> Self {
        Self {
            start,
            end: AttributeHandle::LAST,
        }
    }

    pub fn contains(&self, handle: AttributeHandle) -> bool {
        self.start <= handle && handle <= self.end
    }
}

/// Attribute type as reported by descriptor discovery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Uuid {
    Uuid16(u16),
    Uuid128([u8; 16]),
}

/// ATT status carried by a response event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GattStatus {
    Success,
    /// No (more) attributes in the requested range.
    AttributeNotFound,
    /// Any other ATT error code.
    Other(u16),
}

impl GattStatus {
    pub const ATTRIBUTE_NOT_FOUND: u16 = 0x010A;

    /// Map a raw driver status (`0` = success, `0x01xx` = ATT error).
    pub const fn from_raw(raw: u16) -> Self {
        match raw {
            0 => GattStatus::Success,
            Self::ATTRIBUTE_NOT_FOUND => GattStatus::AttributeNotFound,
            other => GattStatus::Other(other),
        }
    }

    pub const fn is_success(self) -> bool {
        matches!(self, GattStatus::Success)
    }
}

/// Attribute value storage.
pub type Value = Vec<u8, MAX_ATTRIBUTE_VALUE_LEN>;

/// A descriptor as carried by a discovery response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DiscoveredDescriptor {
    pub handle: AttributeHandle,
    pub uuid: Uuid,
}

/// One attribute of the remote table, enriched with its value after read-out.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Descriptor {
    pub handle: AttributeHandle,
    pub uuid: Uuid,
    data: Option<Value>,
}

impl Descriptor {
    /// A freshly discovered descriptor with no value yet.
    pub const fn new(handle: AttributeHandle, uuid: Uuid) -> Self {
        Self {
            handle,
            uuid,
            data: None,
        }
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    pub fn is_read(&self) -> bool {
        self.data.is_some()
    }

    /// Attach the read value. The value can only be set once.
    ///
    /// Bytes beyond `MAX_ATTRIBUTE_VALUE_LEN` are dropped; the returned
    /// flag tells whether that happened.
    pub fn set_data(&mut self, bytes: &[u8]) -> Result<bool, Error> {
        if self.data.is_some() {
            return Err(Error::ValueAlreadySet(self.handle));
        }
        let keep = bytes.len().min(MAX_ATTRIBUTE_VALUE_LEN);
        let value = Value::from_slice(&bytes[..keep]).map_err(|_| Error::BufferOverflow)?;
        self.data = Some(value);
        Ok(keep < bytes.len())
    }
}

impl From<DiscoveredDescriptor> for Descriptor {
    fn from(d: DiscoveredDescriptor) -> Self {
        Descriptor::new(d.handle, d.uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_zero_is_rejected() {
        assert!(AttributeHandle::new(0).is_none());
        assert_eq!(AttributeHandle::new(1), Some(AttributeHandle::FIRST));
    }

    #[test]
    fn handle_next_stops_at_end_of_space() {
        assert_eq!(AttributeHandle::FIRST.next().map(AttributeHandle::raw), Some(2));
        assert!(AttributeHandle::LAST.next().is_none());
    }

    #[test]
    fn handle_range_bounds() {
        let a = AttributeHandle::new(0x10).unwrap();
        let b = AttributeHandle::new(0x20).unwrap();
        assert!(HandleRange::new(b, a).is_none());

        let range = HandleRange::new(a, b).unwrap();
        assert!(range.contains(a));
        assert!(range.contains(b));
        assert!(!range.contains(AttributeHandle::LAST));
        assert_eq!(HandleRange::starting_at(AttributeHandle::FIRST), HandleRange::FULL);
    }

    #[test]
    fn gatt_status_from_raw() {
        assert_eq!(GattStatus::from_raw(0), GattStatus::Success);
        assert_eq!(GattStatus::from_raw(0x010A), GattStatus::AttributeNotFound);
        assert_eq!(GattStatus::from_raw(0x0105), GattStatus::Other(0x0105));
        assert!(GattStatus::Success.is_success());
        assert!(!GattStatus::AttributeNotFound.is_success());
    }

    #[test]
    fn descriptor_value_is_set_once() {
        let handle = AttributeHandle::new(3).unwrap();
        let mut desc = Descriptor::new(handle, Uuid::Uuid16(0x2A00));
        assert!(!desc.is_read());

        assert_eq!(desc.set_data(b"name"), Ok(false));
        assert_eq!(desc.data(), Some(&b"name"[..]));
        assert_eq!(desc.set_data(b"again"), Err(Error::ValueAlreadySet(handle)));
        assert_eq!(desc.data(), Some(&b"name"[..]));
    }

    #[test]
    fn descriptor_empty_value_counts_as_read() {
        let mut desc = Descriptor::from(DiscoveredDescriptor {
            handle: AttributeHandle::new(9).unwrap(),
            uuid: Uuid::Uuid128([0xAB; 16]),
        });
        assert_eq!(desc.set_data(&[]), Ok(false));
        assert!(desc.is_read());
        assert_eq!(desc.data(), Some(&[][..]));
    }

    #[test]
    fn descriptor_long_value_is_truncated() {
        let mut desc = Descriptor::new(AttributeHandle::FIRST, Uuid::Uuid16(0x2A19));
        let long = [7u8; MAX_ATTRIBUTE_VALUE_LEN + 1];
        assert_eq!(desc.set_data(&long), Ok(true));
        assert_eq!(desc.data().map(<[u8]>::len), Some(MAX_ATTRIBUTE_VALUE_LEN));
    }
}
