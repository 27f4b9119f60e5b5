//! Stream plumbing shared by every backend.
//!
//! Native SDKs report through callbacks on threads they choose. Backends hand
//! those callbacks an [`EventSink`], read the matching receiver from inside an
//! `async_stream` generator, and finally pass the generator through
//! [`seal`] which applies the emission policy common to all platforms.

use std::fmt;
use std::future;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use async_channel::{Receiver, Sender, unbounded};
use futures::{Stream, StreamExt};
use log::{debug, warn};

use crate::{DisposeFlag, LocationError, LocationResult, LocationState, LocationStream};

/// Forwards native callback events into an acquisition stream.
///
/// Sends are no-ops once the owning client is disposed or the subscription
/// has been released, so late callbacks can never produce an emission.
pub struct EventSink<T> {
    sender: Sender<T>,
    disposed: DisposeFlag,
}

impl<T> Clone for EventSink<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            disposed: self.disposed.clone(),
        }
    }
}

impl<T> fmt::Debug for EventSink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("closed", &self.sender.is_closed())
            .field("disposed", &self.disposed.is_disposed())
            .finish()
    }
}

impl<T> EventSink<T> {
    /// Deliver a native event.
    pub fn send(&self, event: T) {
        if self.disposed.is_disposed() {
            debug!("dropping location event delivered after dispose");
            return;
        }
        if self.sender.is_closed() {
            debug!("dropping location event for a released subscription");
            return;
        }
        if let Err(err) = self.sender.try_send(event) {
            warn!("dropping location event: {err}");
        }
    }

    /// Whether the subscription behind this sink still accepts events.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.disposed.is_disposed() && !self.sender.is_closed()
    }

    /// Close the channel so pending receivers wake up and finish.
    pub fn close(&self) {
        self.sender.close();
    }
}

/// Create a sink/receiver pair bound to a client's disposal flag.
pub(crate) fn event_channel<T>(disposed: DisposeFlag) -> (EventSink<T>, Receiver<T>) {
    let (sender, receiver) = unbounded();
    (EventSink { sender, disposed }, receiver)
}

type Release = Box<dyn FnOnce() + Send>;

/// A native listener registration that is released exactly once.
struct ListenerSlot {
    release: Mutex<Option<Release>>,
}

impl ListenerSlot {
    fn release(&self) {
        let release = self
            .release
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(release) = release {
            release();
        }
    }
}

/// Releases its listener when dropped, on every exit path of an acquisition.
pub(crate) struct ListenerGuard(Arc<ListenerSlot>);

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Tracks the listeners a client has registered so disposal can stop them
/// synchronously, even while their streams are still alive.
///
/// Once [`ListenerRegistry::release_all`] ran the registry stays closed: a
/// listener registered afterwards is released on the spot.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    slots: Mutex<Slots>,
}

#[derive(Default)]
struct Slots {
    live: Vec<Weak<ListenerSlot>>,
    closed: bool,
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("active", &self.active())
            .finish()
    }
}

impl ListenerRegistry {
    /// Track `release` until the returned guard drops.
    ///
    /// Fails with [`LocationError::Disposed`] after running `release` when
    /// the registry is already closed.
    pub(crate) fn register(
        &self,
        release: impl FnOnce() + Send + 'static,
    ) -> LocationResult<ListenerGuard> {
        let slot = Arc::new(ListenerSlot {
            release: Mutex::new(Some(Box::new(release))),
        });
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.closed {
            drop(slots);
            debug!("releasing listener registered after dispose");
            slot.release();
            return Err(LocationError::Disposed);
        }
        slots.live.retain(|slot| slot.strong_count() > 0);
        slots.live.push(Arc::downgrade(&slot));
        Ok(ListenerGuard(slot))
    }

    pub(crate) fn release_all(&self) {
        let live = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.closed = true;
            std::mem::take(&mut slots.live)
        };
        for slot in live.iter().filter_map(Weak::upgrade) {
            slot.release();
        }
    }

    pub(crate) fn active(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .live
            .iter()
            .filter(|slot| slot.strong_count() > 0)
            .count()
    }
}

/// Apply the common emission policy and box the result.
///
/// Every stream stops at disposal and collapses identical consecutive states.
/// Single requests end right after their first terminal state; continuous
/// streams swallow errors once a reading has been delivered.
pub(crate) fn seal<S>(states: S, single_request: bool, disposed: DisposeFlag) -> LocationStream
where
    S: Stream<Item = LocationState> + Send + 'static,
{
    let gated = until_disposed(states, disposed);
    if single_request {
        Box::pin(distinct_until_changed(until_terminal(gated)))
    } else {
        Box::pin(distinct_until_changed(mask_errors_after_success(gated)))
    }
}

/// Streams created after disposal are left alone so they can report
/// [`crate::LocationError::Disposed`]; everything else goes quiet the moment
/// the flag flips.
fn until_disposed<S>(states: S, disposed: DisposeFlag) -> impl Stream<Item = LocationState>
where
    S: Stream<Item = LocationState>,
{
    let born_disposed = disposed.is_disposed();
    states.take_while(move |_| future::ready(born_disposed || !disposed.is_disposed()))
}

fn until_terminal<S>(states: S) -> impl Stream<Item = LocationState>
where
    S: Stream<Item = LocationState>,
{
    states.scan(false, |finished, state| {
        if *finished {
            return future::ready(None);
        }
        *finished = state.is_terminal();
        future::ready(Some(state))
    })
}

fn mask_errors_after_success<S>(states: S) -> impl Stream<Item = LocationState>
where
    S: Stream<Item = LocationState>,
{
    let mut has_fix = false;
    states.filter(move |state| {
        let keep = match state {
            LocationState::Success(_) => {
                has_fix = true;
                true
            }
            LocationState::Error(message) if has_fix => {
                debug!("suppressing transient location error: {message}");
                false
            }
            _ => true,
        };
        future::ready(keep)
    })
}

fn distinct_until_changed<S>(states: S) -> impl Stream<Item = LocationState>
where
    S: Stream<Item = LocationState>,
{
    let mut last: Option<LocationState> = None;
    states.filter(move |state| {
        let repeated = last.as_ref() == Some(state);
        if !repeated {
            last = Some(state.clone());
        }
        future::ready(!repeated)
    })
}
