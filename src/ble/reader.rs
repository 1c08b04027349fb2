//! Read sequencer.
//!
//! Reads every discovered attribute in discovery order, one request in
//! flight at a time. The read response carries the handle it answers, which
//! is matched against the descriptor under the cursor before the value is
//! attached.

use crate::ble::discovery::Attributes;
use crate::ble::registry::ConnectionState;
use crate::ble::{abort, issue, Context, EventSink, GattDriver};
use crate::error::{BleError, Error};
use crate::gatt::{AttributeHandle, ConnectionId, Descriptor, GattStatus};

/// Progress of a read-out.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReadState {
    descriptors: Attributes,
    /// Index of the attribute being read; `len()` once all are read.
    cursor: usize,
    failures: u8,
}

impl ReadState {
    pub fn new(descriptors: Attributes) -> Self {
        Self {
            descriptors,
            cursor: 0,
            failures: 0,
        }
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn failures(&self) -> u8 {
        self.failures
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.descriptors.len()
    }

    /// Handle under the cursor, if any is left to read.
    pub fn current(&self) -> Option<AttributeHandle> {
        self.descriptors.get(self.cursor).map(|d| d.handle)
    }
}

/// Request the attribute under the cursor.
///
/// A completed read-out makes this a no-op.
pub(crate) fn read_next<D: GattDriver, S: EventSink>(
    ctx: &mut Context<'_, D, S>,
    conn: ConnectionId,
) -> Result<(), Error> {
    let handle = match ctx.registry.get(conn) {
        None => return Err(Error::UnknownConnection(conn)),
        Some(ConnectionState::Reading(read)) => match read.current() {
            Some(handle) => handle,
            None => {
                debug!("{:?}: nothing left to read", conn);
                return Ok(());
            }
        },
        Some(state) => {
            warn!("read requested for {:?} while {}", conn, state.name());
            return Err(Error::NotReading(conn));
        }
    };

    let driver = &mut *ctx.driver;
    match issue(ctx.config.attempts(), || driver.read_attribute(conn, handle, 0)) {
        Ok(()) => {
            trace!("{:?}: read {:?}", conn, handle);
            Ok(())
        }
        Err(e) => {
            error!("{:?}: read of {:?} not started: {:?}", conn, handle, e);
            let err = Error::from(e);
            abort(ctx, conn, err);
            Err(err)
        }
    }
}

/// Handle one `ReadResponse`.
pub(crate) fn on_response<D: GattDriver, S: EventSink>(
    ctx: &mut Context<'_, D, S>,
    conn: ConnectionId,
    status: GattStatus,
    handle: AttributeHandle,
    offset: u16,
    data: &[u8],
) {
    let attempts = ctx.config.attempts();
    let Some(state) = ctx.registry.get_mut(conn) else {
        warn!("read response for unknown connection {:?} dropped", conn);
        return;
    };
    let ConnectionState::Reading(read) = state else {
        warn!(
            "read response for {:?} while {} dropped",
            conn,
            state.name()
        );
        return;
    };
    let Some(expected) = read.current() else {
        warn!("{:?}: read response after read-out completed", conn);
        return;
    };
    if handle != expected || offset != 0 {
        warn!(
            "{:?}: read response for {:?}@{} while waiting on {:?}, dropped",
            conn, handle, offset, expected
        );
        return;
    }

    if !status.is_success() {
        read.failures += 1;
        error!(
            "{:?}: read of {:?} failed with {:?} ({}/{})",
            conn, handle, status, read.failures, attempts
        );
        if read.failures >= attempts {
            return abort(ctx, conn, BleError::Gatt(status).into());
        }
        let _ = read_next(ctx, conn);
        return;
    }

    match read.descriptors[read.cursor].set_data(data) {
        Ok(true) => warn!("{:?}: value of {:?} truncated", conn, handle),
        Ok(false) => {}
        Err(e) => {
            warn!("{:?}: {:?}, response dropped", conn, e);
            return;
        }
    }
    read.cursor += 1;
    read.failures = 0;

    if !read.is_complete() {
        let _ = read_next(ctx, conn);
        return;
    }

    let Some(ConnectionState::Reading(done)) = ctx.registry.take(conn) else {
        return;
    };
    info!(
        "{:?}: read {} attributes",
        conn,
        done.descriptors.len()
    );
    ctx.sink.attributes_updated(conn, &done.descriptors);
}
