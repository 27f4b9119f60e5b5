//! UI-facing driver on top of a [`LocationClient`].
//!
//! [`LocationProvider`] owns the UI state, the current subscription and a
//! retry counter used as the subscription key: each retry bumps the counter
//! and replaces the previous stream, so two acquisitions never race. Views
//! come from [`Renderers`], one callback per state, which start out as plain
//! text defaults and can be overridden one by one.

use std::fmt;
use std::pin::pin;
use std::sync::Arc;

use async_channel::{Receiver, Sender, unbounded};
use futures::StreamExt;
use futures::future::{Either, select};
use log::{debug, info, warn};

use crate::{Location, LocationClient, LocationConfig, LocationState, LocationStream};

/// What the UI shows.
#[derive(Debug, Clone, PartialEq)]
pub enum UiState {
    /// Nothing requested yet.
    Initial,
    /// A subscription is running.
    Loading,
    /// A reading is available.
    Success(Location),
    /// The last attempt failed.
    Error(String),
    /// Location access is missing.
    PermissionDenied,
}

impl From<LocationState> for UiState {
    fn from(state: LocationState) -> Self {
        match state {
            LocationState::Loading => Self::Loading,
            LocationState::Success(location) => Self::Success(location),
            LocationState::Error(message) => Self::Error(message),
            LocationState::PermissionDenied => Self::PermissionDenied,
        }
    }
}

/// User intents a view can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderAction {
    /// Start acquiring from the initial state.
    RequestLocation,
    /// Start over after an error.
    Retry,
    /// Prompt for location access.
    RequestPermission,
    /// The host observed that access was granted.
    PermissionGranted,
}

/// Cloneable handle views use to trigger [`ProviderAction`]s.
#[derive(Debug, Clone)]
pub struct ProviderHandle {
    actions: Sender<ProviderAction>,
}

impl ProviderHandle {
    fn send(&self, action: ProviderAction) {
        if let Err(err) = self.actions.try_send(action) {
            warn!("dropping provider action: {err}");
        }
    }

    /// Start acquiring.
    pub fn request_location(&self) {
        self.send(ProviderAction::RequestLocation);
    }

    /// Start over after an error.
    pub fn retry(&self) {
        self.send(ProviderAction::Retry);
    }

    /// Prompt for location access.
    pub fn request_permission(&self) {
        self.send(ProviderAction::RequestPermission);
    }

    /// Report that access was granted.
    pub fn permission_granted(&self) {
        self.send(ProviderAction::PermissionGranted);
    }
}

type Render<V> = Box<dyn Fn() -> V>;
type RenderWithHandle<V> = Box<dyn Fn(&ProviderHandle) -> V>;
type RenderError<V> = Box<dyn Fn(&str, &ProviderHandle) -> V>;
type RenderLocation<V> = Box<dyn Fn(&Location) -> V>;

/// Per-state view strategies.
pub struct Renderers<V> {
    initial: RenderWithHandle<V>,
    loading: Render<V>,
    permission_denied: RenderWithHandle<V>,
    error: RenderError<V>,
    success: RenderLocation<V>,
}

impl<V> fmt::Debug for Renderers<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderers").finish_non_exhaustive()
    }
}

impl<V: From<String> + 'static> Default for Renderers<V> {
    fn default() -> Self {
        Self::new(|location| V::from(location.format()))
    }
}

impl<V: From<String> + 'static> Renderers<V> {
    /// Text defaults for every state except success.
    pub fn new(on_location_received: impl Fn(&Location) -> V + 'static) -> Self {
        Self {
            initial: Box::new(|_| V::from("Get My Location".to_owned())),
            loading: Box::new(|| V::from("Loading location...".to_owned())),
            permission_denied: Box::new(|_| {
                V::from("We need location permission to show your position".to_owned())
            }),
            error: Box::new(|message, _| V::from(format!("Error: {message}"))),
            success: Box::new(on_location_received),
        }
    }
}

impl<V> Renderers<V> {
    /// Override the view shown before anything was requested.
    #[must_use]
    pub fn on_initial(mut self, render: impl Fn(&ProviderHandle) -> V + 'static) -> Self {
        self.initial = Box::new(render);
        self
    }

    /// Override the loading view.
    #[must_use]
    pub fn on_loading(mut self, render: impl Fn() -> V + 'static) -> Self {
        self.loading = Box::new(render);
        self
    }

    /// Override the permission view; the handle offers `request_permission`.
    #[must_use]
    pub fn on_permission_denied(mut self, render: impl Fn(&ProviderHandle) -> V + 'static) -> Self {
        self.permission_denied = Box::new(render);
        self
    }

    /// Override the error view; the handle offers `retry`.
    #[must_use]
    pub fn on_error(mut self, render: impl Fn(&str, &ProviderHandle) -> V + 'static) -> Self {
        self.error = Box::new(render);
        self
    }

    /// Override the success view.
    #[must_use]
    pub fn on_location_received(mut self, render: impl Fn(&Location) -> V + 'static) -> Self {
        self.success = Box::new(render);
        self
    }
}

enum Wake {
    State(Option<LocationState>),
    Action(Option<ProviderAction>),
}

/// Drives UI state from a [`LocationClient`].
pub struct LocationProvider<V> {
    client: Arc<dyn LocationClient>,
    config: LocationConfig,
    renderers: Renderers<V>,
    state: UiState,
    retry_counter: u64,
    subscription: Option<LocationStream>,
    handle: ProviderHandle,
    actions: Receiver<ProviderAction>,
    disposed: bool,
}

impl<V> fmt::Debug for LocationProvider<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocationProvider")
            .field("client", &self.client)
            .field("config", &self.config)
            .field("state", &self.state)
            .field("retry_counter", &self.retry_counter)
            .field("subscribed", &self.subscription.is_some())
            .finish_non_exhaustive()
    }
}

impl<V> LocationProvider<V> {
    /// Create a provider; subscribes immediately when `config.auto_request`.
    pub fn new(
        client: Arc<dyn LocationClient>,
        config: LocationConfig,
        renderers: Renderers<V>,
    ) -> Self {
        let (sender, actions) = unbounded();
        let mut provider = Self {
            client,
            config,
            renderers,
            state: UiState::Initial,
            retry_counter: 0,
            subscription: None,
            handle: ProviderHandle { actions: sender },
            actions,
            disposed: false,
        };
        if provider.config.auto_request {
            provider.subscribe();
        }
        provider
    }

    /// Current UI state.
    pub const fn state(&self) -> &UiState {
        &self.state
    }

    /// Number of subscriptions started so far.
    pub const fn retry_counter(&self) -> u64 {
        self.retry_counter
    }

    /// Handle for views to trigger actions.
    pub fn handle(&self) -> ProviderHandle {
        self.handle.clone()
    }

    /// Render the current state with the configured strategies.
    pub fn render(&self) -> V {
        match &self.state {
            UiState::Initial => (self.renderers.initial)(&self.handle),
            UiState::Loading => (self.renderers.loading)(),
            UiState::Success(location) => (self.renderers.success)(location),
            UiState::Error(message) => (self.renderers.error)(message, &self.handle),
            UiState::PermissionDenied => (self.renderers.permission_denied)(&self.handle),
        }
    }

    /// Start acquiring, replacing any running subscription.
    pub fn request_location(&mut self) {
        self.subscribe();
    }

    /// Run the client's acquisition chain again from scratch.
    pub fn retry(&mut self) {
        debug!("retrying location after {:?}", self.state);
        self.subscribe();
    }

    /// Ask the client to prompt for access; re-subscribes if it is granted
    /// synchronously, otherwise waits for [`Self::permission_granted`].
    pub fn request_permission(&mut self) {
        self.client.request_permission();
        if self.client.has_permission() {
            self.subscribe();
        }
    }

    /// Access was granted outside the provider; start over.
    pub fn permission_granted(&mut self) {
        self.subscribe();
    }

    /// Apply a view-triggered action.
    pub fn apply(&mut self, action: ProviderAction) {
        match action {
            ProviderAction::RequestLocation => self.request_location(),
            ProviderAction::Retry => self.retry(),
            ProviderAction::RequestPermission => self.request_permission(),
            ProviderAction::PermissionGranted => self.permission_granted(),
        }
    }

    /// Wait for the next state change caused by the subscription or by an
    /// action, and return the new state. Returns `None` once disposed.
    pub async fn next(&mut self) -> Option<&UiState> {
        loop {
            if self.disposed {
                return None;
            }
            let wake = match self.subscription.as_mut() {
                Some(states) => {
                    let action = pin!(self.actions.recv());
                    match select(states.next(), action).await {
                        Either::Left((state, _)) => Wake::State(state),
                        Either::Right((action, _)) => Wake::Action(action.ok()),
                    }
                }
                None => Wake::Action(self.actions.recv().await.ok()),
            };
            match wake {
                Wake::State(Some(state)) => {
                    self.state = state.into();
                    return Some(&self.state);
                }
                Wake::State(None) => {
                    debug!("location subscription #{} finished", self.retry_counter);
                    self.subscription = None;
                }
                Wake::Action(Some(action)) => {
                    self.apply(action);
                    return Some(&self.state);
                }
                Wake::Action(None) => return None,
            }
        }
    }

    /// Drop the subscription and dispose the client.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        info!("disposing location provider");
        self.subscription = None;
        self.client.on_dispose();
        self.disposed = true;
    }

    fn subscribe(&mut self) {
        if self.disposed {
            warn!("ignoring location request on a disposed provider");
            return;
        }
        self.retry_counter += 1;
        debug!("starting location subscription #{}", self.retry_counter);
        self.subscription = Some(self.client.get_location(&self.config, self.retry_counter));
        self.state = UiState::Loading;
    }
}

impl<V> Drop for LocationProvider<V> {
    fn drop(&mut self) {
        self.dispose();
    }
}
