//! Browser location via the Geolocation API.
//!
//! There is no permission query in the core API: the browser prompts on the
//! first `getCurrentPosition`/`watchPosition` call and reports a refusal as
//! error code 1. The client remembers the last outcome it observed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_channel::Receiver;
use async_stream::stream;
use futures::Stream;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::stream::{EventSink, ListenerGuard, ListenerRegistry, event_channel, seal};
use crate::timeout::with_timeout;
use crate::{
    DisposeFlag, Location, LocationClient, LocationConfig, LocationError, LocationResult,
    LocationState, LocationStream, MAX_CACHED_AGE_MS, PlatformType,
};

/// `PositionOptions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionOptions {
    /// `enableHighAccuracy`.
    pub enable_high_accuracy: bool,
    /// `timeout` in milliseconds.
    pub timeout_ms: u64,
    /// `maximumAge` in milliseconds; 0 forces a fresh position.
    pub maximum_age_ms: u64,
}

/// `GeolocationPositionError.code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionErrorCode {
    /// 1: the user or browser refused access.
    PermissionDenied,
    /// 2: no position could be determined.
    PositionUnavailable,
    /// 3: the browser-side timeout elapsed.
    Timeout,
}

impl PositionErrorCode {
    /// Decode the numeric code; unknown codes count as unavailable.
    #[must_use]
    pub const fn from_code(code: u16) -> Self {
        match code {
            1 => Self::PermissionDenied,
            3 => Self::Timeout,
            _ => Self::PositionUnavailable,
        }
    }
}

/// `GeolocationPositionError`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionError {
    /// Failure class.
    pub code: PositionErrorCode,
    /// Browser-provided message.
    pub message: String,
}

/// `GeolocationPosition`, flattened.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeolocationPosition {
    /// `coords.latitude`.
    pub latitude: f64,
    /// `coords.longitude`.
    pub longitude: f64,
    /// `coords.accuracy` in meters.
    pub accuracy: f64,
    /// `coords.altitude`.
    pub altitude: Option<f64>,
    /// `coords.heading` in degrees.
    pub heading: Option<f64>,
    /// `coords.speed` in meters per second.
    pub speed: Option<f64>,
    /// `timestamp` in epoch milliseconds.
    pub timestamp: f64,
}

impl GeolocationPosition {
    /// Normalize into a [`Location`].
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn into_location(self) -> Location {
        Location {
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy: Some(self.accuracy as f32),
            altitude: self.altitude,
            speed: self.speed.map(|speed| speed as f32),
            // Heading is NaN while stationary.
            bearing: self.heading.filter(|h| h.is_finite()).map(|h| h as f32),
            timestamp: Some(self.timestamp.max(0.0) as u64),
            provider: Some("browser".into()),
        }
    }
}

/// Success/error callback traffic.
#[derive(Debug, Clone, PartialEq)]
pub enum GeolocationEvent {
    /// Success callback.
    Position(GeolocationPosition),
    /// Error callback.
    Error(PositionError),
}

/// Handle returned by `watchPosition`.
pub type WatchId = i32;

/// The slice of `navigator.geolocation` the state machine drives.
pub trait GeolocationApi: Send + Sync + std::fmt::Debug + 'static {
    /// Whether `navigator.geolocation` exists.
    fn is_supported(&self) -> bool;

    /// `getCurrentPosition`; exactly one event is sent to `sink`.
    fn get_current_position(&self, options: &PositionOptions, sink: EventSink<GeolocationEvent>);

    /// `watchPosition`; events are sent until the watch is cleared.
    fn watch_position(&self, options: &PositionOptions, sink: EventSink<GeolocationEvent>)
    -> WatchId;

    /// `clearWatch`.
    fn clear_watch(&self, id: WatchId);
}

/// Browser client driving a [`GeolocationApi`].
#[derive(Debug)]
pub struct WebLocationClient<A> {
    api: Arc<A>,
    permission: Arc<PermissionMemory>,
    disposed: DisposeFlag,
    listeners: Arc<ListenerRegistry>,
}

/// The last permission outcome observed from the browser.
#[derive(Debug, Default)]
struct PermissionMemory {
    denied: AtomicBool,
    prompt: Mutex<Option<Receiver<GeolocationEvent>>>,
}

impl PermissionMemory {
    fn observe(&self, event: &GeolocationEvent) {
        match event {
            GeolocationEvent::Position(_) => self.denied.store(false, Ordering::Release),
            GeolocationEvent::Error(error) if error.code == PositionErrorCode::PermissionDenied => {
                self.denied.store(true, Ordering::Release);
            }
            GeolocationEvent::Error(_) => {}
        }
    }

    fn granted(&self) -> bool {
        let mut prompt = self.prompt.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(answer) = prompt.as_ref().and_then(|events| events.try_recv().ok()) {
            self.observe(&answer);
            *prompt = None;
        }
        !self.denied.load(Ordering::Acquire)
    }
}

impl<A: GeolocationApi> WebLocationClient<A> {
    /// Wrap a `navigator.geolocation` binding.
    pub fn new(api: A) -> Self {
        Self {
            api: Arc::new(api),
            permission: Arc::new(PermissionMemory::default()),
            disposed: DisposeFlag::new(),
            listeners: Arc::new(ListenerRegistry::default()),
        }
    }

    /// The wrapped binding.
    pub fn api(&self) -> &A {
        &self.api
    }
}

impl<A: GeolocationApi> LocationClient for WebLocationClient<A> {
    fn platform(&self) -> PlatformType {
        PlatformType::Web
    }

    fn initialize(&self) -> LocationResult<()> {
        info!("browser location client initialized");
        Ok(())
    }

    fn get_location(&self, config: &LocationConfig, retry_trigger: u64) -> LocationStream {
        debug!("browser location request #{retry_trigger}: {config:?}");
        config.log_warnings();
        let api = self.api.clone();
        let permission = self.permission.clone();
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
            if !api.is_supported() {
                yield LocationError::ServiceUnavailable(
                    "Geolocation is not supported by this browser".into(),
                )
                .into_state();
                return;
            }

            if config.single_request {
                let chain = single_with_fallback(&api, &listeners, &permission, &config, &disposed);
                let outcome = with_timeout(config.timeout(), chain)
                    .await
                    .unwrap_or(Err(LocationError::Timeout));
                yield match outcome {
                    Ok(location) => LocationState::Success(location),
                    Err(err) => err.into_state(),
                };
            } else {
                for await state in watch(api, listeners, permission, config, disposed) {
                    yield state;
                }
            }
        };
        seal(states, single_request, self.disposed.clone())
    }

    fn has_permission(&self) -> bool {
        self.permission.granted()
    }

    fn request_permission(&self) {
        let (sink, events) = event_channel(self.disposed.clone());
        *self
            .permission
            .prompt
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(events);
        let options = PositionOptions {
            enable_high_accuracy: false,
            timeout_ms: LocationConfig::default().timeout_ms,
            maximum_age_ms: MAX_CACHED_AGE_MS,
        };
        self.api.get_current_position(&options, sink);
    }

    fn on_dispose(&self) {
        info!("disposing browser location client");
        self.disposed.dispose();
        self.listeners.release_all();
    }
}

/// Fresh fix, then a cached one, then the first reading of a short watch.
///
/// The fresh attempt gets half of the budget and the cached one a quarter, so
/// a browser-side timeout still leaves room for the later stages before the
/// overall deadline.
async fn single_with_fallback<A: GeolocationApi>(
    api: &Arc<A>,
    listeners: &ListenerRegistry,
    permission: &PermissionMemory,
    config: &LocationConfig,
    disposed: &DisposeFlag,
) -> LocationResult<Location> {
    let fresh = PositionOptions {
        enable_high_accuracy: config.high_accuracy,
        timeout_ms: config.timeout_ms / 2,
        maximum_age_ms: 0,
    };
    match current_position(api, listeners, permission, &fresh, disposed).await {
        Ok(location) => return Ok(location),
        Err(err @ (LocationError::PermissionDenied | LocationError::Disposed)) => return Err(err),
        Err(err) => debug!("fresh position failed ({err}), accepting a cached one"),
    }

    let cached = PositionOptions {
        enable_high_accuracy: false,
        timeout_ms: config.timeout_ms / 4,
        maximum_age_ms: MAX_CACHED_AGE_MS,
    };
    match current_position(api, listeners, permission, &cached, disposed).await {
        Ok(location) => return Ok(location),
        Err(err @ (LocationError::PermissionDenied | LocationError::Disposed)) => return Err(err),
        Err(err) => debug!("cached position failed ({err}), watching for one reading"),
    }

    let burst = PositionOptions {
        enable_high_accuracy: config.high_accuracy,
        timeout_ms: config.timeout_ms / 4,
        maximum_age_ms: 0,
    };
    first_watched_position(api, listeners, permission, &burst, disposed).await
}

async fn current_position<A: GeolocationApi>(
    api: &Arc<A>,
    listeners: &ListenerRegistry,
    permission: &PermissionMemory,
    options: &PositionOptions,
    disposed: &DisposeFlag,
) -> LocationResult<Location> {
    let (sink, events) = event_channel(disposed.clone());
    let _guard = {
        let sink = sink.clone();
        listeners.register(move || sink.close())?
    };
    api.get_current_position(options, sink);
    next_position(&events, permission, disposed).await
}

/// Watch until the first callback, then clear the watch.
async fn first_watched_position<A: GeolocationApi>(
    api: &Arc<A>,
    listeners: &ListenerRegistry,
    permission: &PermissionMemory,
    options: &PositionOptions,
    disposed: &DisposeFlag,
) -> LocationResult<Location> {
    let (events, _guard) = start_watch(api, listeners, options, disposed)?;
    next_position(&events, permission, disposed).await
}

async fn next_position(
    events: &Receiver<GeolocationEvent>,
    permission: &PermissionMemory,
    disposed: &DisposeFlag,
) -> LocationResult<Location> {
    match events.recv().await {
        Ok(event) => {
            permission.observe(&event);
            match event {
                GeolocationEvent::Position(position) => Ok(position.into_location()),
                GeolocationEvent::Error(error) => Err(position_error(error)),
            }
        }
        Err(_) if disposed.is_disposed() => Err(LocationError::Disposed),
        Err(_) => Err(LocationError::AcquisitionFailed(
            "Unable to get current location".into(),
        )),
    }
}

/// `watchPosition` behind a guard that clears the watch.
///
/// Refuses to start a watch once the client is disposed.
fn start_watch<A: GeolocationApi>(
    api: &Arc<A>,
    listeners: &ListenerRegistry,
    options: &PositionOptions,
    disposed: &DisposeFlag,
) -> LocationResult<(Receiver<GeolocationEvent>, ListenerGuard)> {
    if disposed.is_disposed() {
        return Err(LocationError::Disposed);
    }
    let (sink, events) = event_channel(disposed.clone());
    let id = api.watch_position(options, sink.clone());
    let api = api.clone();
    let guard = listeners.register(move || {
        debug!("clearing geolocation watch {id}");
        api.clear_watch(id);
        sink.close();
    })?;
    Ok((events, guard))
}

fn position_error(error: PositionError) -> LocationError {
    match error.code {
        PositionErrorCode::PermissionDenied => LocationError::PermissionDenied,
        PositionErrorCode::PositionUnavailable | PositionErrorCode::Timeout => {
            LocationError::AcquisitionFailed(format!(
                "Unable to get current location: {}",
                error.message
            ))
        }
    }
}

fn watch<A: GeolocationApi>(
    api: Arc<A>,
    listeners: Arc<ListenerRegistry>,
    permission: Arc<PermissionMemory>,
    config: LocationConfig,
    disposed: DisposeFlag,
) -> impl Stream<Item = LocationState> + Send {
    stream! {
        let options = PositionOptions {
            enable_high_accuracy: config.high_accuracy,
            timeout_ms: config.timeout_ms,
            maximum_age_ms: config.min_update_interval_ms,
        };
        let Ok((events, _guard)) = start_watch(&api, &listeners, &options, &disposed) else {
            return;
        };

        while let Ok(event) = events.recv().await {
            permission.observe(&event);
            match event {
                GeolocationEvent::Position(position) => {
                    yield LocationState::Success(position.into_location());
                }
                GeolocationEvent::Error(error) => yield position_error(error).into_state(),
            }
        }
    }
}
