//! Scripted stand-ins for the native location APIs.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_channel::{Receiver, Sender};
use futures::future::{self, BoxFuture};
use futures::{FutureExt, StreamExt};
use geokit_location::ip::JsonFetcher;
use geokit_location::sys::core_location::{
    AuthorizationStatus, CoreLocationApi, CoreLocationDelegate, CoreLocationEvent,
    CoreLocationReading, DesiredAccuracy,
};
use geokit_location::sys::fused::{
    CancellationToken, FusedEvent, FusedLocationApi, LocationRequest, PermissionLevel, Priority,
    SystemProvider, UpdatesHandle,
};
use geokit_location::sys::web::{
    GeolocationApi, GeolocationEvent, GeolocationPosition, PositionOptions, WatchId,
};
use geokit_location::{
    EventSink, Location, LocationError, LocationResult, LocationState, LocationStream, SdkError,
};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

pub fn fix(latitude: f64, longitude: f64) -> Location {
    Location::new(latitude, longitude)
        .with_accuracy(5.0)
        .with_timestamp(now_ms())
        .with_provider("fused")
}

pub async fn collect(states: LocationStream) -> Vec<LocationState> {
    states.collect().await
}

/// A reply to a native call that returns a future; `Pending` never resolves,
/// `Gated` resolves with whatever the test sends through the channel.
#[derive(Debug, Clone)]
pub enum Reply<T> {
    Ready(T),
    Pending,
    Gated(Receiver<T>),
}

impl<T: Clone + Send + 'static> Reply<T> {
    pub fn gated() -> (Sender<T>, Self) {
        let (sender, receiver) = async_channel::bounded(1);
        (sender, Self::Gated(receiver))
    }

    fn future<'a>(&self) -> BoxFuture<'a, T> {
        match self {
            Self::Ready(value) => future::ready(value.clone()).boxed(),
            Self::Pending => future::pending().boxed(),
            Self::Gated(receiver) => {
                let receiver = receiver.clone();
                async move {
                    match receiver.recv().await {
                        Ok(value) => value,
                        Err(_) => future::pending().await,
                    }
                }
                .boxed()
            }
        }
    }
}

#[derive(Debug)]
pub struct FusedScript {
    pub play_services: bool,
    pub permission: PermissionLevel,
    pub grant_on_request: bool,
    pub gps_enabled: bool,
    pub network_enabled: bool,
    pub current: Reply<Result<Option<Location>, SdkError>>,
    pub last: Reply<Result<Option<Location>, SdkError>>,
    pub start_failure: Option<SdkError>,
    /// Delivered synchronously by every `request_location_updates` call.
    pub on_register: Vec<FusedEvent>,
}

impl Default for FusedScript {
    fn default() -> Self {
        Self {
            play_services: true,
            permission: PermissionLevel::Fine,
            grant_on_request: false,
            gps_enabled: true,
            network_enabled: true,
            current: Reply::Ready(Ok(None)),
            last: Reply::Ready(Ok(None)),
            start_failure: None,
            on_register: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct FusedLog {
    pub priorities: Vec<Priority>,
    pub tokens: Vec<CancellationToken>,
    pub requests: Vec<LocationRequest>,
    pub sinks: Vec<EventSink<FusedEvent>>,
    pub removed: Vec<UpdatesHandle>,
    pub permission_prompts: usize,
}

#[derive(Debug, Default)]
pub struct FakeFused {
    pub script: Mutex<FusedScript>,
    pub log: Mutex<FusedLog>,
}

impl FakeFused {
    pub fn new(script: FusedScript) -> Self {
        Self {
            script: Mutex::new(script),
            log: Mutex::default(),
        }
    }

    pub fn emit(&self, event: FusedEvent) {
        let sinks = self.log.lock().unwrap().sinks.clone();
        for sink in sinks {
            sink.send(event.clone());
        }
    }
}

impl FusedLocationApi for FakeFused {
    fn play_services_available(&self) -> bool {
        self.script.lock().unwrap().play_services
    }

    fn permission_level(&self) -> PermissionLevel {
        self.script.lock().unwrap().permission
    }

    fn request_permissions(&self) {
        self.log.lock().unwrap().permission_prompts += 1;
        let mut script = self.script.lock().unwrap();
        if script.grant_on_request {
            script.permission = PermissionLevel::Fine;
        }
    }

    fn is_provider_enabled(&self, provider: SystemProvider) -> bool {
        let script = self.script.lock().unwrap();
        match provider {
            SystemProvider::Gps => script.gps_enabled,
            SystemProvider::Network => script.network_enabled,
        }
    }

    fn current_location(
        &self,
        priority: Priority,
        token: CancellationToken,
    ) -> BoxFuture<'_, Result<Option<Location>, SdkError>> {
        let mut log = self.log.lock().unwrap();
        log.priorities.push(priority);
        log.tokens.push(token);
        self.script.lock().unwrap().current.future()
    }

    fn last_location(&self) -> BoxFuture<'_, Result<Option<Location>, SdkError>> {
        self.script.lock().unwrap().last.future()
    }

    fn request_location_updates(
        &self,
        request: &LocationRequest,
        sink: EventSink<FusedEvent>,
    ) -> Result<UpdatesHandle, SdkError> {
        let script = self.script.lock().unwrap();
        if let Some(err) = script.start_failure.clone() {
            return Err(err);
        }
        let mut log = self.log.lock().unwrap();
        log.requests.push(request.clone());
        log.sinks.push(sink.clone());
        let handle = log.requests.len() as UpdatesHandle;
        for event in &script.on_register {
            sink.send(event.clone());
        }
        Ok(handle)
    }

    fn remove_location_updates(&self, handle: UpdatesHandle) {
        self.log.lock().unwrap().removed.push(handle);
    }
}

pub fn reading(latitude: f64, longitude: f64) -> CoreLocationReading {
    CoreLocationReading {
        latitude,
        longitude,
        horizontal_accuracy: 10.0,
        altitude: 30.0,
        vertical_accuracy: 4.0,
        speed: -1.0,
        course: -1.0,
        timestamp: now_ms() as f64 / 1_000.0,
    }
}

#[derive(Debug)]
pub struct CoreScript {
    pub status: AuthorizationStatus,
    pub services_enabled: bool,
    pub cached: Option<CoreLocationReading>,
    /// Delivered to the delegate by each `requestLocation()`.
    pub on_request: Vec<CoreLocationEvent>,
    /// Delivered to the delegate by each `startUpdatingLocation()`.
    pub on_start: Vec<CoreLocationEvent>,
}

impl Default for CoreScript {
    fn default() -> Self {
        Self {
            status: AuthorizationStatus::AuthorizedWhenInUse,
            services_enabled: true,
            cached: None,
            on_request: Vec::new(),
            on_start: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct CoreLog {
    pub delegate: Option<Arc<dyn CoreLocationDelegate>>,
    pub accuracy: Vec<DesiredAccuracy>,
    pub distance_filter: Option<f64>,
    pub requests: usize,
    pub starts: usize,
    pub stops: usize,
    pub authorization_prompts: usize,
}

#[derive(Debug, Default)]
pub struct FakeCoreLocation {
    pub script: Mutex<CoreScript>,
    pub log: Mutex<CoreLog>,
}

impl FakeCoreLocation {
    pub fn new(script: CoreScript) -> Self {
        Self {
            script: Mutex::new(script),
            log: Mutex::default(),
        }
    }

    pub fn emit(&self, event: CoreLocationEvent) {
        let delegate = self.log.lock().unwrap().delegate.clone();
        if let Some(delegate) = delegate {
            delegate.on_event(event);
        }
    }

    fn deliver(&self, events: Vec<CoreLocationEvent>) {
        for event in events {
            self.emit(event);
        }
    }
}

impl CoreLocationApi for FakeCoreLocation {
    fn authorization_status(&self) -> AuthorizationStatus {
        self.script.lock().unwrap().status
    }

    fn request_when_in_use_authorization(&self) {
        self.log.lock().unwrap().authorization_prompts += 1;
    }

    fn location_services_enabled(&self) -> bool {
        self.script.lock().unwrap().services_enabled
    }

    fn set_delegate(&self, delegate: Option<Arc<dyn CoreLocationDelegate>>) {
        self.log.lock().unwrap().delegate = delegate;
    }

    fn set_desired_accuracy(&self, accuracy: DesiredAccuracy) {
        self.log.lock().unwrap().accuracy.push(accuracy);
    }

    fn set_distance_filter(&self, meters: f64) {
        self.log.lock().unwrap().distance_filter = Some(meters);
    }

    fn cached_location(&self) -> Option<CoreLocationReading> {
        self.script.lock().unwrap().cached
    }

    fn request_location(&self) {
        self.log.lock().unwrap().requests += 1;
        let events = self.script.lock().unwrap().on_request.clone();
        self.deliver(events);
    }

    fn start_updating_location(&self) {
        self.log.lock().unwrap().starts += 1;
        let events = self.script.lock().unwrap().on_start.clone();
        self.deliver(events);
    }

    fn stop_updating_location(&self) {
        self.log.lock().unwrap().stops += 1;
    }
}

pub fn position(latitude: f64, longitude: f64) -> GeolocationPosition {
    GeolocationPosition {
        latitude,
        longitude,
        accuracy: 20.0,
        altitude: None,
        heading: Some(f64::NAN),
        speed: None,
        timestamp: now_ms() as f64,
    }
}

#[derive(Debug, Default)]
pub struct WebScript {
    pub unsupported: bool,
    /// One entry per `getCurrentPosition`; `None` never answers.
    pub current: VecDeque<Option<GeolocationEvent>>,
    /// Delivered synchronously by every `watchPosition`.
    pub on_watch: Vec<GeolocationEvent>,
}

#[derive(Debug, Default)]
pub struct WebLog {
    pub options: Vec<PositionOptions>,
    pub pending: Vec<EventSink<GeolocationEvent>>,
    pub watches: Vec<(WatchId, EventSink<GeolocationEvent>)>,
    pub cleared: Vec<WatchId>,
}

#[derive(Debug, Default)]
pub struct FakeGeolocation {
    pub script: Mutex<WebScript>,
    pub log: Mutex<WebLog>,
}

impl FakeGeolocation {
    pub fn new(script: WebScript) -> Self {
        Self {
            script: Mutex::new(script),
            log: Mutex::default(),
        }
    }

    pub fn emit(&self, event: GeolocationEvent) {
        let watches = self.log.lock().unwrap().watches.clone();
        for (_, sink) in watches {
            sink.send(event.clone());
        }
    }
}

impl GeolocationApi for FakeGeolocation {
    fn is_supported(&self) -> bool {
        !self.script.lock().unwrap().unsupported
    }

    fn get_current_position(&self, options: &PositionOptions, sink: EventSink<GeolocationEvent>) {
        self.log.lock().unwrap().options.push(*options);
        let reply = self.script.lock().unwrap().current.pop_front().flatten();
        match reply {
            Some(event) => sink.send(event),
            None => self.log.lock().unwrap().pending.push(sink),
        }
    }

    fn watch_position(
        &self,
        options: &PositionOptions,
        sink: EventSink<GeolocationEvent>,
    ) -> WatchId {
        let mut log = self.log.lock().unwrap();
        log.options.push(*options);
        let id = i32::try_from(log.watches.len()).unwrap() + 1;
        log.watches.push((id, sink.clone()));
        for event in &self.script.lock().unwrap().on_watch {
            sink.send(event.clone());
        }
        id
    }

    fn clear_watch(&self, id: WatchId) {
        self.log.lock().unwrap().cleared.push(id);
    }
}

/// How a fetch for one URL behaves.
#[derive(Debug, Clone)]
pub enum Script {
    Body(String),
    Fail(String),
    Stall,
}

#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    pub scripts: Mutex<HashMap<String, Script>>,
    pub hits: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new<const N: usize>(scripts: [(&str, Script); N]) -> Arc<Self> {
        let fetcher = Self::default();
        for (url, script) in scripts {
            fetcher.set(url, script);
        }
        Arc::new(fetcher)
    }

    pub fn set(&self, url: &str, script: Script) {
        self.scripts.lock().unwrap().insert(url.to_owned(), script);
    }
}

impl JsonFetcher for ScriptedFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, LocationResult<String>> {
        self.hits.lock().unwrap().push(url.to_owned());
        let script = self.scripts.lock().unwrap().get(url).cloned();
        match script {
            Some(Script::Body(body)) => future::ready(Ok(body)).boxed(),
            Some(Script::Fail(message)) => {
                future::ready(Err(LocationError::Http(message))).boxed()
            }
            Some(Script::Stall) => future::pending().boxed(),
            None => future::ready(Err(LocationError::Http(format!("404 for {url}")))).boxed(),
        }
    }
}
