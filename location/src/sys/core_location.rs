//! iOS location via `CoreLocation`.
//!
//! `CLLocationManager` reports through a delegate object. [`CoreLocationApi`]
//! is the slice of the manager the state machine drives; the Swift side
//! forwards every delegate callback to the [`CoreLocationDelegate`] it was
//! handed, which feeds the acquisition stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_channel::Receiver;
use async_stream::stream;
use futures::Stream;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::stream::{EventSink, ListenerGuard, ListenerRegistry, event_channel, seal};
use crate::timeout::with_timeout;
use crate::{
    DisposeFlag, Location, LocationClient, LocationConfig, LocationError, LocationResult,
    LocationState, LocationStream, PlatformType, now_millis,
};

/// Minimum movement in meters before a continuous update is delivered.
pub const DISTANCE_FILTER_M: f64 = 10.0;

const NO_FIX: &str = "Unable to get current location";

/// `CLAuthorizationStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthorizationStatus {
    /// The user has not been asked yet.
    NotDetermined,
    /// Access is blocked by device policy.
    Restricted,
    /// The user declined.
    Denied,
    /// Access granted at all times.
    AuthorizedAlways,
    /// Access granted while the app is in use.
    AuthorizedWhenInUse,
}

impl AuthorizationStatus {
    /// Whether readings may be requested.
    #[must_use]
    pub const fn is_authorized(self) -> bool {
        matches!(self, Self::AuthorizedAlways | Self::AuthorizedWhenInUse)
    }
}

/// `desiredAccuracy` presets used by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DesiredAccuracy {
    /// `kCLLocationAccuracyBest`.
    Best,
    /// `kCLLocationAccuracyHundredMeters`.
    HundredMeters,
}

impl DesiredAccuracy {
    const fn for_config(config: &LocationConfig) -> Self {
        if config.high_accuracy {
            Self::Best
        } else {
            Self::HundredMeters
        }
    }
}

/// A `CLLocation` as reported by the delegate.
///
/// `CoreLocation` marks unknown values with negative numbers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoreLocationReading {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Radius of uncertainty in meters; negative when invalid.
    pub horizontal_accuracy: f64,
    /// Altitude in meters.
    pub altitude: f64,
    /// Altitude uncertainty in meters; negative when the altitude is invalid.
    pub vertical_accuracy: f64,
    /// Speed in meters per second; negative when invalid.
    pub speed: f64,
    /// Course in degrees; negative when invalid.
    pub course: f64,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
}

impl CoreLocationReading {
    /// Normalize into a [`Location`], dropping invalid optional values.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn into_location(self) -> Location {
        Location {
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy: (self.horizontal_accuracy >= 0.0).then_some(self.horizontal_accuracy as f32),
            altitude: (self.vertical_accuracy >= 0.0).then_some(self.altitude),
            speed: (self.speed >= 0.0).then_some(self.speed as f32),
            bearing: (self.course >= 0.0).then_some(self.course as f32),
            timestamp: Some((self.timestamp * 1_000.0).max(0.0) as u64),
            provider: Some("CoreLocation".into()),
        }
    }
}

/// `CLLocationManagerDelegate` callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreLocationEvent {
    /// `locationManager(_:didUpdateLocations:)`, oldest first.
    DidUpdateLocations(Vec<CoreLocationReading>),
    /// `locationManager(_:didFailWithError:)` with the localized description.
    DidFailWithError(String),
    /// `locationManagerDidChangeAuthorization(_:)`.
    DidChangeAuthorization(AuthorizationStatus),
}

/// Receiver of location manager callbacks.
pub trait CoreLocationDelegate: Send + Sync + std::fmt::Debug {
    /// Called for every delegate callback.
    fn on_event(&self, event: CoreLocationEvent);
}

impl CoreLocationDelegate for EventSink<CoreLocationEvent> {
    fn on_event(&self, event: CoreLocationEvent) {
        self.send(event);
    }
}

/// The slice of `CLLocationManager` the state machine drives.
pub trait CoreLocationApi: Send + Sync + std::fmt::Debug + 'static {
    /// `authorizationStatus`.
    fn authorization_status(&self) -> AuthorizationStatus;

    /// `requestWhenInUseAuthorization()`.
    fn request_when_in_use_authorization(&self);

    /// `CLLocationManager.locationServicesEnabled()`.
    fn location_services_enabled(&self) -> bool;

    /// Replace the manager's delegate; `None` clears it.
    fn set_delegate(&self, delegate: Option<Arc<dyn CoreLocationDelegate>>);

    /// `desiredAccuracy`.
    fn set_desired_accuracy(&self, accuracy: DesiredAccuracy);

    /// `distanceFilter` in meters.
    fn set_distance_filter(&self, meters: f64);

    /// The manager's cached `location`, if any.
    fn cached_location(&self) -> Option<CoreLocationReading>;

    /// `requestLocation()`.
    fn request_location(&self);

    /// `startUpdatingLocation()`.
    fn start_updating_location(&self);

    /// `stopUpdatingLocation()`.
    fn stop_updating_location(&self);
}

/// How a one-shot delegate session is started.
#[derive(Debug, Clone, Copy)]
enum Kickoff {
    RequestLocation,
    StartUpdating,
}

/// iOS client driving a [`CoreLocationApi`].
#[derive(Debug)]
pub struct CoreLocationClient<A> {
    api: Arc<A>,
    initialized: Arc<AtomicBool>,
    disposed: DisposeFlag,
    listeners: Arc<ListenerRegistry>,
}

impl<A: CoreLocationApi> CoreLocationClient<A> {
    /// Wrap a location manager binding.
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

impl<A: CoreLocationApi> LocationClient for CoreLocationClient<A> {
    fn platform(&self) -> PlatformType {
        PlatformType::Ios
    }

    fn initialize(&self) -> LocationResult<()> {
        self.initialized.store(true, Ordering::Release);
        info!("CoreLocation client initialized");
        Ok(())
    }

    fn get_location(&self, config: &LocationConfig, retry_trigger: u64) -> LocationStream {
        debug!("CoreLocation request #{retry_trigger}: {config:?}");
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
            if !api.authorization_status().is_authorized() {
                yield LocationState::PermissionDenied;
                return;
            }
            if !api.location_services_enabled() {
                yield LocationError::ServiceUnavailable("Location services are disabled".into())
                    .into_state();
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
                for await state in continuous_updates(api, listeners, config, disposed) {
                    yield state;
                }
            }
        };
        seal(states, single_request, self.disposed.clone())
    }

    fn has_permission(&self) -> bool {
        self.api.authorization_status().is_authorized()
    }

    fn request_permission(&self) {
        self.api.request_when_in_use_authorization();
    }

    fn on_dispose(&self) {
        info!("disposing CoreLocation client");
        self.disposed.dispose();
        self.listeners.release_all();
        self.api.stop_updating_location();
        self.api.set_delegate(None);
    }
}

async fn single_with_fallback<A: CoreLocationApi>(
    api: &Arc<A>,
    listeners: &ListenerRegistry,
    config: &LocationConfig,
    disposed: &DisposeFlag,
) -> LocationResult<Location> {
    let accuracy = DesiredAccuracy::for_config(config);

    match first_fix(api, listeners, accuracy, Kickoff::RequestLocation, disposed).await {
        Ok(location) => return Ok(location),
        Err(err @ (LocationError::PermissionDenied | LocationError::Disposed)) => return Err(err),
        Err(err) => debug!("requestLocation failed ({err}), trying cached location"),
    }

    if let Some(cached) = api.cached_location().map(CoreLocationReading::into_location) {
        if cached.is_recent(now_millis()) {
            return Ok(cached);
        }
        debug!("cached location is stale, starting updates");
    }

    first_fix(api, listeners, accuracy, Kickoff::StartUpdating, disposed).await
}

/// Install a delegate, start the manager and wait for the first reading.
async fn first_fix<A: CoreLocationApi>(
    api: &Arc<A>,
    listeners: &ListenerRegistry,
    accuracy: DesiredAccuracy,
    kickoff: Kickoff,
    disposed: &DisposeFlag,
) -> LocationResult<Location> {
    let (events, _guard) = attach(api, listeners, disposed)?;
    api.set_desired_accuracy(accuracy);
    match kickoff {
        Kickoff::RequestLocation => api.request_location(),
        Kickoff::StartUpdating => api.start_updating_location(),
    }

    while let Ok(event) = events.recv().await {
        match event {
            CoreLocationEvent::DidUpdateLocations(readings) => {
                return readings
                    .last()
                    .map(|reading| reading.into_location())
                    .ok_or_else(|| LocationError::AcquisitionFailed(NO_FIX.into()));
            }
            CoreLocationEvent::DidFailWithError(description) => {
                return Err(LocationError::AcquisitionFailed(format!(
                    "Location error: {description}"
                )));
            }
            CoreLocationEvent::DidChangeAuthorization(
                AuthorizationStatus::Denied | AuthorizationStatus::Restricted,
            ) => return Err(LocationError::PermissionDenied),
            CoreLocationEvent::DidChangeAuthorization(status) if status.is_authorized() => {
                api.request_location();
            }
            CoreLocationEvent::DidChangeAuthorization(_) => {}
        }
    }
    if disposed.is_disposed() {
        return Err(LocationError::Disposed);
    }
    Err(LocationError::AcquisitionFailed(NO_FIX.into()))
}

/// Install a channel delegate; the guard stops updates and clears it.
///
/// Refuses to touch the manager once the client is disposed.
fn attach<A: CoreLocationApi>(
    api: &Arc<A>,
    listeners: &ListenerRegistry,
    disposed: &DisposeFlag,
) -> LocationResult<(Receiver<CoreLocationEvent>, ListenerGuard)> {
    if disposed.is_disposed() {
        return Err(LocationError::Disposed);
    }
    let (sink, events) = event_channel(disposed.clone());
    api.set_delegate(Some(Arc::new(sink.clone())));
    let api = api.clone();
    let guard = listeners.register(move || {
        debug!("detaching CoreLocation delegate");
        api.stop_updating_location();
        api.set_delegate(None);
        sink.close();
    })?;
    Ok((events, guard))
}

fn continuous_updates<A: CoreLocationApi>(
    api: Arc<A>,
    listeners: Arc<ListenerRegistry>,
    config: LocationConfig,
    disposed: DisposeFlag,
) -> impl Stream<Item = LocationState> + Send {
    stream! {
        let Ok((events, _guard)) = attach(&api, &listeners, &disposed) else {
            return;
        };
        api.set_desired_accuracy(DesiredAccuracy::for_config(&config));
        api.set_distance_filter(DISTANCE_FILTER_M);
        api.start_updating_location();

        while let Ok(event) = events.recv().await {
            match event {
                CoreLocationEvent::DidUpdateLocations(readings) => {
                    for reading in readings {
                        yield LocationState::Success(reading.into_location());
                    }
                }
                CoreLocationEvent::DidFailWithError(description) => {
                    yield LocationState::Error(format!("Location error: {description}"));
                }
                CoreLocationEvent::DidChangeAuthorization(
                    AuthorizationStatus::Denied | AuthorizationStatus::Restricted,
                ) => yield LocationState::PermissionDenied,
                CoreLocationEvent::DidChangeAuthorization(AuthorizationStatus::NotDetermined) => {
                    api.request_when_in_use_authorization();
                }
                CoreLocationEvent::DidChangeAuthorization(_) => api.start_updating_location(),
            }
        }
    }
}
