//! Android location via the fused location provider.
//!
//! The state machine here is written against [`FusedLocationApi`], which
//! mirrors the slice of `FusedLocationProviderClient`, `LocationManager` and
//! the runtime permission checks that the acquisition logic needs. The host
//! application supplies the JNI-backed implementation.
//!
//! Single requests run a three-stage fallback under one overall timeout:
//! the "current location" call, then a cached reading younger than five
//! minutes, then a burst of live updates capped at one reading.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_channel::Receiver;
use async_stream::stream;
use futures::future::BoxFuture;
use futures::{Stream, StreamExt};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::stream::{EventSink, ListenerGuard, ListenerRegistry, event_channel, seal};
use crate::timeout::with_timeout;
use crate::{
    DisposeFlag, Location, LocationClient, LocationConfig, LocationError, LocationResult,
    LocationState, LocationStream, PlatformType, SdkError, now_millis,
};

const SERVICES_DISABLED: &str =
    "Location services are disabled. Please enable GPS in settings.";
const NO_FIX: &str = "Unable to get current location. Please try again or ensure you're in an area with good GPS signal.";
const START_FAILED: &str = "Failed to start location updates";
const TEMPORARILY_UNAVAILABLE: &str = "Location temporarily unavailable. Please ensure GPS is enabled and you're in an area with good signal.";

/// Request priority passed to the fused provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    /// GPS-grade accuracy.
    HighAccuracy,
    /// Block-level accuracy at lower power.
    BalancedPowerAccuracy,
}

impl Priority {
    const fn for_config(config: &LocationConfig) -> Self {
        if config.high_accuracy {
            Self::HighAccuracy
        } else {
            Self::BalancedPowerAccuracy
        }
    }
}

/// Which runtime location permission the app holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionLevel {
    /// `ACCESS_FINE_LOCATION` granted.
    Fine,
    /// Only `ACCESS_COARSE_LOCATION` granted.
    Coarse,
    /// Neither permission granted.
    None,
}

/// A system location provider whose enabled state gates acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemProvider {
    /// Satellite positioning.
    Gps,
    /// Wi-Fi and cell positioning.
    Network,
}

/// Parameters of a `requestLocationUpdates` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRequest {
    /// Accuracy/power trade-off.
    pub priority: Priority,
    /// Desired interval between updates.
    pub interval_ms: u64,
    /// Fastest interval updates may arrive at.
    pub min_update_interval_ms: u64,
    /// Longest an update may be batched.
    pub max_update_delay_ms: u64,
    /// Stop after this many updates.
    pub max_updates: Option<u32>,
}

impl LocationRequest {
    /// Fast one-reading burst used as the last single-request fallback.
    #[must_use]
    pub const fn burst(priority: Priority) -> Self {
        Self {
            priority,
            interval_ms: 1_000,
            min_update_interval_ms: 500,
            max_update_delay_ms: 2_000,
            max_updates: Some(1),
        }
    }

    /// Open-ended updates following the caller's intervals.
    #[must_use]
    pub const fn continuous(config: &LocationConfig) -> Self {
        Self {
            priority: Priority::for_config(config),
            interval_ms: config.update_interval_ms,
            min_update_interval_ms: config.min_update_interval_ms,
            max_update_delay_ms: config.max_update_delay_ms,
            max_updates: None,
        }
    }
}

/// Callback traffic of a location-updates registration.
#[derive(Debug, Clone, PartialEq)]
pub enum FusedEvent {
    /// `onLocationResult` with its last location.
    Location(Location),
    /// `onLocationAvailability`.
    Availability(bool),
    /// The registration task failed.
    Failure(SdkError),
}

/// Identifies a live `requestLocationUpdates` registration.
pub type UpdatesHandle = u64;

/// Cancellation token handed to `getCurrentLocation`.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Whether the request that owns this token was abandoned.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Cancels its token when dropped, so a timed-out call is cancelled natively.
#[derive(Debug, Default)]
struct CancellationTokenSource(CancellationToken);

impl CancellationTokenSource {
    fn token(&self) -> CancellationToken {
        self.0.clone()
    }
}

impl Drop for CancellationTokenSource {
    fn drop(&mut self) {
        self.0.0.store(true, Ordering::Release);
    }
}

/// The native surface the Android state machine consumes.
pub trait FusedLocationApi: Send + Sync + std::fmt::Debug + 'static {
    /// Whether Google Play services can serve fused locations.
    fn play_services_available(&self) -> bool;

    /// The strongest location permission currently granted.
    fn permission_level(&self) -> PermissionLevel;

    /// Prompt for both fine and coarse location.
    fn request_permissions(&self);

    /// `LocationManager.isProviderEnabled`.
    fn is_provider_enabled(&self, provider: SystemProvider) -> bool;

    /// `getCurrentLocation(priority, token)`.
    fn current_location(
        &self,
        priority: Priority,
        token: CancellationToken,
    ) -> BoxFuture<'_, Result<Option<Location>, SdkError>>;

    /// `getLastLocation()`.
    fn last_location(&self) -> BoxFuture<'_, Result<Option<Location>, SdkError>>;

    /// `requestLocationUpdates`; events are delivered to `sink` until removed.
    ///
    /// # Errors
    ///
    /// Returns the native failure if the registration is rejected outright.
    fn request_location_updates(
        &self,
        request: &LocationRequest,
        sink: EventSink<FusedEvent>,
    ) -> Result<UpdatesHandle, SdkError>;

    /// `removeLocationUpdates`.
    fn remove_location_updates(&self, handle: UpdatesHandle);
}

/// Android client driving a [`FusedLocationApi`].
#[derive(Debug)]
pub struct FusedLocationClient<A> {
    api: Arc<A>,
    initialized: Arc<AtomicBool>,
    disposed: DisposeFlag,
    listeners: Arc<ListenerRegistry>,
}

impl<A: FusedLocationApi> FusedLocationClient<A> {
    /// Wrap a native binding. Call [`LocationClient::initialize`] before use.
    pub fn new(api: A) -> Self {
        Self {
            api: Arc::new(api),
            initialized: Arc::new(AtomicBool::new(false)),
            disposed: DisposeFlag::new(),
            listeners: Arc::new(ListenerRegistry::default()),
        }
    }

    /// The wrapped binding.
    pub fn api(&self) -> &A {
        &self.api
    }
}

impl<A: FusedLocationApi> LocationClient for FusedLocationClient<A> {
    fn platform(&self) -> PlatformType {
        PlatformType::Android
    }

    fn initialize(&self) -> LocationResult<()> {
        if !self.api.play_services_available() {
            return Err(LocationError::ServiceUnavailable(
                "Google Play Services not available".into(),
            ));
        }
        self.initialized.store(true, Ordering::Release);
        info!("fused location client initialized");
        Ok(())
    }

    fn get_location(&self, config: &LocationConfig, retry_trigger: u64) -> LocationStream {
        debug!("fused location request #{retry_trigger}: {config:?}");
        config.log_warnings();
        let api = self.api.clone();
        let initialized = self.initialized.clone();
        let disposed = self.disposed.clone();
        let listeners = self.listeners.clone();
        let single_request = config.single_request;
        let config = config.clone();

        let states = stream! {
            yield LocationState::Loading;

            if disposed.is_disposed() {
                yield LocationError::Disposed.into_state();
                return;
            }
            if !initialized.load(Ordering::Acquire) {
                yield LocationError::NotInitialized.into_state();
                return;
            }
            if api.permission_level() == PermissionLevel::None {
                yield LocationState::PermissionDenied;
                return;
            }
            if !services_enabled(api.as_ref()) {
                yield LocationError::ServiceUnavailable(SERVICES_DISABLED.into()).into_state();
                return;
            }

            if config.single_request {
                let chain = single_with_fallback(&api, &listeners, &config, &disposed);
                let outcome = with_timeout(config.timeout(), chain)
                    .await
                    .unwrap_or(Err(LocationError::Timeout));
                yield match outcome {
                    Ok(location) => LocationState::Success(location),
                    Err(err) => err.into_state(),
                };
            } else {
                let mut updates = Box::pin(continuous_updates(api, listeners, config, disposed));
                while let Some(state) = updates.next().await {
                    yield state;
                }
            }
        };
        seal(states, single_request, self.disposed.clone())
    }

    fn has_permission(&self) -> bool {
        // Coarse is enough; fine-accuracy requests then degrade rather than fail.
        self.api.permission_level() != PermissionLevel::None
    }

    fn request_permission(&self) {
        self.api.request_permissions();
    }

    fn on_dispose(&self) {
        info!("disposing fused location client");
        self.disposed.dispose();
        self.listeners.release_all();
    }
}

fn services_enabled<A: FusedLocationApi>(api: &A) -> bool {
    api.is_provider_enabled(SystemProvider::Gps) || api.is_provider_enabled(SystemProvider::Network)
}

async fn single_with_fallback<A: FusedLocationApi>(
    api: &Arc<A>,
    listeners: &ListenerRegistry,
    config: &LocationConfig,
    disposed: &DisposeFlag,
) -> LocationResult<Location> {
    let priority = Priority::for_config(config);

    let source = CancellationTokenSource::default();
    let current = api.current_location(priority, source.token()).await;
    if disposed.is_disposed() {
        return Err(LocationError::Disposed);
    }
    match current {
        Ok(Some(location)) => return Ok(location),
        Ok(None) => debug!("no current location, trying last known"),
        Err(SdkError::Security(_)) => return Err(LocationError::PermissionDenied),
        Err(err) => debug!("current location failed ({err}), trying last known"),
    }
    drop(source);

    let last = api.last_location().await;
    if disposed.is_disposed() {
        return Err(LocationError::Disposed);
    }
    match last {
        Ok(Some(location)) if location.is_recent(now_millis()) => return Ok(location),
        Ok(Some(_)) => debug!("last known location is stale, requesting updates"),
        Ok(None) => debug!("no last known location, requesting updates"),
        Err(SdkError::Security(_)) => return Err(LocationError::PermissionDenied),
        Err(err) => debug!("last known location failed ({err}), requesting updates"),
    }

    first_update(api, listeners, priority, disposed).await
}

async fn first_update<A: FusedLocationApi>(
    api: &Arc<A>,
    listeners: &ListenerRegistry,
    priority: Priority,
    disposed: &DisposeFlag,
) -> LocationResult<Location> {
    let (events, _guard) = subscribe(api, listeners, &LocationRequest::burst(priority), disposed)?;

    while let Ok(event) = events.recv().await {
        match event {
            FusedEvent::Location(location) => return Ok(location),
            FusedEvent::Availability(available) => {
                debug!("location availability changed: {available}");
            }
            FusedEvent::Failure(SdkError::Security(_)) => {
                return Err(LocationError::PermissionDenied);
            }
            FusedEvent::Failure(err) => {
                debug!("location update burst failed: {err}");
                break;
            }
        }
    }
    Err(LocationError::AcquisitionFailed(NO_FIX.into()))
}

/// Register for updates; the returned guard removes them on drop.
///
/// Refuses to touch the native layer once the client is disposed.
fn subscribe<A: FusedLocationApi>(
    api: &Arc<A>,
    listeners: &ListenerRegistry,
    request: &LocationRequest,
    disposed: &DisposeFlag,
) -> LocationResult<(Receiver<FusedEvent>, ListenerGuard)> {
    if disposed.is_disposed() {
        return Err(LocationError::Disposed);
    }
    let (sink, events) = event_channel(disposed.clone());
    let handle = api.request_location_updates(request, sink.clone()).map_err(|err| {
        error!("failed to start location updates: {err}");
        err.into_location_error(START_FAILED)
    })?;
    let api = api.clone();
    let guard = listeners.register(move || {
        debug!("removing location updates {handle}");
        api.remove_location_updates(handle);
        sink.close();
    })?;
    Ok((events, guard))
}

fn continuous_updates<A: FusedLocationApi>(
    api: Arc<A>,
    listeners: Arc<ListenerRegistry>,
    config: LocationConfig,
    disposed: DisposeFlag,
) -> impl Stream<Item = LocationState> + Send {
    stream! {
        match api.last_location().await {
            Ok(Some(location)) if location.is_recent(now_millis()) => {
                yield LocationState::Success(location);
            }
            Ok(_) => {}
            Err(err) => debug!("ignoring last known location failure: {err}"),
        }

        let request = LocationRequest::continuous(&config);
        let (events, _guard) = match subscribe(&api, &listeners, &request, &disposed) {
            Ok(subscription) => subscription,
            Err(LocationError::Disposed) => return,
            Err(err) => {
                yield err.into_state();
                return;
            }
        };

        while let Ok(event) = events.recv().await {
            match event {
                FusedEvent::Location(location) => yield LocationState::Success(location),
                FusedEvent::Availability(false) => {
                    yield LocationState::Error(TEMPORARILY_UNAVAILABLE.into());
                }
                FusedEvent::Availability(true) => {}
                FusedEvent::Failure(SdkError::Security(_)) => yield LocationState::PermissionDenied,
                FusedEvent::Failure(SdkError::Failure(message)) => {
                    yield LocationState::Error(format!("Location updates failed: {message}"));
                }
            }
        }
    }
}
