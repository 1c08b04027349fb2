//! Descriptor discovery sequencer.
//!
//! The driver bounds how many descriptors one response may carry, so the
//! handle space is walked in pages: request `[start, 0xFFFF]`, append what
//! comes back, move `start` past the highest handle seen and ask again
//! until the driver answers with an empty page.

use heapless::Vec;

use crate::ble::reader::{self, ReadState};
use crate::ble::registry::ConnectionState;
use crate::ble::{abort, issue, Context, EventSink, GattDriver};
use crate::config::MAX_ATTRIBUTES;
use crate::error::{BleError, Error};
use crate::gatt::{
    AttributeHandle, ConnectionId, Descriptor, DiscoveredDescriptor, GattStatus, HandleRange,
};

/// Descriptors collected for one connection.
pub type Attributes = Vec<Descriptor, MAX_ATTRIBUTES>;

/// Progress of a discovery walk.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DiscoveryState {
    descriptors: Attributes,
    /// Strictly greater than every handle in `descriptors`.
    next_range_start: AttributeHandle,
    /// Consecutive failed steps.
    failures: u8,
}

impl DiscoveryState {
    pub fn new() -> Self {
        Self {
            descriptors: Vec::new(),
            next_range_start: AttributeHandle::FIRST,
            failures: 0,
        }
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn next_range_start(&self) -> AttributeHandle {
        self.next_range_start
    }

    /// The range the next request covers.
    pub fn pending_range(&self) -> HandleRange {
        HandleRange::starting_at(self.next_range_start)
    }

    pub fn failures(&self) -> u8 {
        self.failures
    }

    /// Append one page. Descriptors below the current start were already
    /// collected by an earlier page and are skipped.
    ///
    /// Returns the new start handle, or `None` once the top of the handle
    /// space has been seen and nothing is left to ask for.
    fn accept(&mut self, page: &[DiscoveredDescriptor]) -> Result<Option<AttributeHandle>, Error> {
        let start = self.next_range_start;
        for found in page.iter().filter(|d| d.handle >= start) {
            self.descriptors
                .push(Descriptor::from(*found))
                .map_err(|_| Error::TooManyAttributes)?;
        }

        let Some(highest) = page.iter().map(|d| d.handle).max() else {
            return Ok(Some(self.next_range_start));
        };
        let Some(after) = highest.next() else {
            return Ok(None);
        };
        if after > self.next_range_start {
            self.next_range_start = after;
        }
        Ok(Some(self.next_range_start))
    }
}

impl Default for DiscoveryState {
    fn default() -> Self {
        Self::new()
    }
}

/// Begin walking the attribute table of an idle connection.
pub(crate) fn start<D: GattDriver, S: EventSink>(
    ctx: &mut Context<'_, D, S>,
    conn: ConnectionId,
) -> Result<(), Error> {
    let Some(state) = ctx.registry.get_mut(conn) else {
        warn!("discovery requested for unknown connection {:?}", conn);
        return Err(Error::UnknownConnection(conn));
    };
    if !state.is_idle() {
        warn!(
            "discovery requested for {:?} while {}",
            conn,
            state.name()
        );
        return Err(Error::Busy(conn));
    }

    *state = ConnectionState::Discovering(DiscoveryState::new());
    info!("{:?}: discovering descriptors", conn);
    request(ctx, conn, HandleRange::FULL)
}

/// Handle one `DescriptorDiscoveryResponse`.
pub(crate) fn on_response<D: GattDriver, S: EventSink>(
    ctx: &mut Context<'_, D, S>,
    conn: ConnectionId,
    status: GattStatus,
    page: &[DiscoveredDescriptor],
) {
    let attempts = ctx.config.attempts();
    let Some(state) = ctx.registry.get_mut(conn) else {
        warn!("discovery response for unknown connection {:?} dropped", conn);
        return;
    };
    let ConnectionState::Discovering(discovery) = state else {
        warn!(
            "discovery response for {:?} while {} dropped",
            conn,
            state.name()
        );
        return;
    };

    match status {
        GattStatus::AttributeNotFound => return finish(ctx, conn),
        GattStatus::Other(code) => {
            discovery.failures += 1;
            error!(
                "{:?}: discovery failed with status {:#x} ({}/{})",
                conn, code, discovery.failures, attempts
            );
            if discovery.failures >= attempts {
                return abort(ctx, conn, BleError::Gatt(status).into());
            }
            let range = discovery.pending_range();
            return retry(ctx, conn, range);
        }
        GattStatus::Success => {}
    }

    if page.is_empty() {
        return finish(ctx, conn);
    }

    let previous = discovery.next_range_start;
    match discovery.accept(page) {
        Err(e) => abort(ctx, conn, e),
        Ok(None) => finish(ctx, conn),
        Ok(Some(next)) if next == previous => {
            // Nothing above the last request start: the peer repeated itself.
            discovery.failures += 1;
            warn!(
                "{:?}: discovery page made no progress past {:?}",
                conn, previous
            );
            if discovery.failures >= attempts {
                return abort(ctx, conn, BleError::DiscoveryFailed.into());
            }
            retry(ctx, conn, HandleRange::starting_at(next));
        }
        Ok(Some(next)) => {
            discovery.failures = 0;
            debug!(
                "{:?}: {} descriptors so far, continuing at {:?}",
                conn,
                discovery.descriptors.len(),
                next
            );
            retry(ctx, conn, HandleRange::starting_at(next));
        }
    }
}

/// Issue the next page request, aborting the walk if the driver refuses.
fn retry<D: GattDriver, S: EventSink>(
    ctx: &mut Context<'_, D, S>,
    conn: ConnectionId,
    range: HandleRange,
) {
    // Failure already reported through `sequence_aborted`.
    let _ = request(ctx, conn, range);
}

fn request<D: GattDriver, S: EventSink>(
    ctx: &mut Context<'_, D, S>,
    conn: ConnectionId,
    range: HandleRange,
) -> Result<(), Error> {
    let driver = &mut *ctx.driver;
    match issue(ctx.config.attempts(), || driver.discover_descriptors(conn, range)) {
        Ok(()) => {
            trace!("{:?}: discover {:?}", conn, range);
            Ok(())
        }
        Err(e) => {
            error!("{:?}: descriptor discovery not started: {:?}", conn, e);
            let err = Error::from(e);
            abort(ctx, conn, err);
            Err(err)
        }
    }
}

/// The walk is exhausted: hand the descriptors to the reader.
fn finish<D: GattDriver, S: EventSink>(ctx: &mut Context<'_, D, S>, conn: ConnectionId) {
    let Some(ConnectionState::Discovering(discovery)) = ctx.registry.take(conn) else {
        return;
    };

    info!(
        "{:?}: discovery complete, {} descriptors",
        conn,
        discovery.descriptors.len()
    );

    if discovery.descriptors.is_empty() {
        ctx.sink.attributes_updated(conn, &[]);
        return;
    }

    if ctx
        .registry
        .set(
            conn,
            ConnectionState::Reading(ReadState::new(discovery.descriptors)),
        )
        .is_ok()
    {
        // Refusals end in `sequence_aborted`.
        let _ = reader::read_next(ctx, conn);
    }
}
