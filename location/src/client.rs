use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::Stream;

use crate::{LocationConfig, LocationResult, LocationState, PlatformType};

/// A boxed, lazily started stream of acquisition states.
///
/// Nothing happens until the stream is first polled. Dropping it cancels the
/// acquisition and releases every native listener it registered.
pub type LocationStream = Pin<Box<dyn Stream<Item = LocationState> + Send>>;

/// Shared disposal marker checked by every emission path.
///
/// Native callbacks may fire on arbitrary threads after `on_dispose`; they
/// read this flag before forwarding anything.
#[derive(Debug, Clone, Default)]
pub struct DisposeFlag(Arc<AtomicBool>);

impl DisposeFlag {
    /// Create a flag in the live state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark as disposed. Irreversible.
    pub fn dispose(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether [`DisposeFlag::dispose`] has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// The capability set every platform backend implements.
///
/// Exactly one live client should exist per UI subscription scope. Once
/// [`LocationClient::on_dispose`] returns, no stream obtained from the client
/// emits again; build a new client instead of re-initializing a disposed one.
pub trait LocationClient: Send + Sync + fmt::Debug {
    /// The platform family this client serves.
    fn platform(&self) -> PlatformType;

    /// Bind the client to its native subsystem.
    ///
    /// # Errors
    ///
    /// Returns an error if the native location service cannot be reached.
    fn initialize(&self) -> LocationResult<()>;

    /// Start a new acquisition.
    ///
    /// The first item is always [`LocationState::Loading`]. In single-request
    /// mode exactly one terminal state follows; in continuous mode states keep
    /// arriving until the stream is dropped or the client disposed.
    /// `retry_trigger` identifies the subscription for diagnostics; every call
    /// runs the full acquisition chain from scratch.
    fn get_location(&self, config: &LocationConfig, retry_trigger: u64) -> LocationStream;

    /// Whether location access is currently granted.
    fn has_permission(&self) -> bool;

    /// Ask the platform to prompt for location access.
    fn request_permission(&self);

    /// Stop native updates, release listeners and silence every stream.
    fn on_dispose(&self);
}
