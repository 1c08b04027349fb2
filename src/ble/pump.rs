//! Async event delivery.
//!
//! The driver pushes event batches into a channel from its callback; the
//! router task pulls them out together with application commands and runs
//! every handler on the one execution context that owns the router.

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Receiver;
use heapless::Vec;

use crate::ble::router::EventRouter;
use crate::ble::{DriverEvent, EventSink, GattDriver};
use crate::config::MAX_EVENT_BATCH;
use crate::gatt::ConnectionId;

/// One driver callback worth of events.
pub type EventBatch = Vec<DriverEvent, MAX_EVENT_BATCH>;

/// Requests the application can send to the router task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionCommand {
    /// Discover and read every attribute of the connection.
    Discover(ConnectionId),
}

/// Router task body. Never returns.
pub async fn run<M, D, S, const E: usize, const C: usize>(
    router: &mut EventRouter<D, S>,
    events: Receiver<'_, M, EventBatch, E>,
    commands: Receiver<'_, M, SessionCommand, C>,
) -> !
where
    M: RawMutex,
    D: GattDriver,
    S: EventSink,
{
    info!("event router started");
    loop {
        match select(events.receive(), commands.receive()).await {
            Either::First(batch) => router.dispatch(&batch),
            Either::Second(command) => {
                if let Err(e) = router.execute(command) {
                    warn!("command {:?} refused: {:?}", command, e);
                }
            }
        }
    }
}

/// Handle whatever is already queued without waiting.
///
/// Returns the number of batches and commands processed.
pub fn drain<M, D, S, const E: usize, const C: usize>(
    router: &mut EventRouter<D, S>,
    events: Receiver<'_, M, EventBatch, E>,
    commands: Receiver<'_, M, SessionCommand, C>,
) -> usize
where
    M: RawMutex,
    D: GattDriver,
    S: EventSink,
{
    let mut handled = 0;
    loop {
        if let Ok(batch) = events.try_receive() {
            router.dispatch(&batch);
            handled += 1;
        } else if let Ok(command) = commands.try_receive() {
            if let Err(e) = router.execute(command) {
                warn!("command {:?} refused: {:?}", command, e);
            }
            handled += 1;
        } else {
            return handled;
        }
    }
}
