//! Cross-platform location retrieval.
//!
//! This crate reconciles the divergent native location backends (Android's
//! fused location provider, Apple's `CoreLocation`, browser geolocation and an
//! IP-geolocation fallback for desktops) into one [`LocationClient`] contract:
//! every subscription yields [`LocationState::Loading`] first and then the
//! outcome of a permission-gated acquisition with retries and fallbacks.
//!
//! # Usage
//!
//! ```ignore
//! use futures::StreamExt;
//! use geokit_location::{LocationClient, LocationConfig, LocationState, sys};
//!
//! let client = sys::default_client()?;
//! client.initialize()?;
//!
//! let mut states = client.get_location(&LocationConfig::default(), 0);
//! while let Some(state) = states.next().await {
//!     match state {
//!         LocationState::Success(location) => println!("{}", location.format()),
//!         LocationState::Error(message) => eprintln!("{message}"),
//!         LocationState::PermissionDenied => client.request_permission(),
//!         LocationState::Loading => {}
//!     }
//! }
//! ```

#![warn(missing_docs)]

mod client;
mod config;
mod error;
mod geo;
/// IP-geolocation services used by the desktop backend.
pub mod ip;
pub mod provider;
mod stream;
/// Platform-specific acquisition state machines.
pub mod sys;
mod timeout;

use serde::{Deserialize, Serialize};

pub use client::{DisposeFlag, LocationClient, LocationStream};
pub use config::LocationConfig;
pub use error::{LocationError, LocationResult, SdkError};
pub use geo::{format_distance, haversine_distance};
pub use provider::{LocationProvider, ProviderHandle, Renderers, UiState};
pub use stream::EventSink;

/// Maximum age of a cached reading that may still stand in for a fresh one.
pub const MAX_CACHED_AGE_MS: u64 = 5 * 60 * 1000;

/// A single geographic reading.
///
/// Only the coordinates are guaranteed; every other field depends on what the
/// producing backend can report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees (-90 to 90).
    pub latitude: f64,
    /// Longitude in degrees (-180 to 180).
    pub longitude: f64,
    /// Horizontal accuracy in meters, if available.
    pub accuracy: Option<f32>,
    /// Altitude in meters above sea level, if available.
    pub altitude: Option<f64>,
    /// Ground speed in meters per second, if available.
    pub speed: Option<f32>,
    /// Direction of travel in degrees from true north (0-360), if available.
    pub bearing: Option<f32>,
    /// Timestamp as Unix epoch milliseconds.
    pub timestamp: Option<u64>,
    /// Name of the source that produced the reading.
    pub provider: Option<String>,
}

impl Location {
    /// Create a reading carrying only coordinates.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: None,
            altitude: None,
            speed: None,
            bearing: None,
            timestamp: None,
            provider: None,
        }
    }

    /// Set the horizontal accuracy in meters.
    #[must_use]
    pub const fn with_accuracy(mut self, accuracy: f32) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    /// Set the altitude in meters.
    #[must_use]
    pub const fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    /// Set the speed in meters per second.
    #[must_use]
    pub const fn with_speed(mut self, speed: f32) -> Self {
        self.speed = Some(speed);
        self
    }

    /// Set the bearing in degrees.
    #[must_use]
    pub const fn with_bearing(mut self, bearing: f32) -> Self {
        self.bearing = Some(bearing);
        self
    }

    /// Set the timestamp in Unix epoch milliseconds.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Set the provider tag.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Whether the reading was taken less than [`MAX_CACHED_AGE_MS`] before `now_ms`.
    ///
    /// Readings without a timestamp are never considered recent.
    #[must_use]
    pub fn is_recent(&self, now_ms: u64) -> bool {
        self.timestamp
            .is_some_and(|taken| now_ms.saturating_sub(taken) < MAX_CACHED_AGE_MS)
    }
}

/// Status of an in-flight or completed acquisition.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationState {
    /// Acquisition has started and no outcome is known yet.
    Loading,
    /// A reading was obtained.
    Success(Location),
    /// Acquisition failed; the message is meant for display.
    Error(String),
    /// The user has not granted location access.
    PermissionDenied,
}

impl LocationState {
    /// Whether this state ends a single-request acquisition.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Loading)
    }
}

/// The platform family a client implementation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlatformType {
    /// Android, backed by the fused location provider.
    Android,
    /// iOS, backed by `CoreLocation`.
    Ios,
    /// Desktop operating systems, backed by IP geolocation.
    Desktop,
    /// Browsers, backed by the Geolocation API.
    Web,
}

/// The platform family this build targets.
#[must_use]
pub const fn current_platform() -> PlatformType {
    if cfg!(target_os = "android") {
        PlatformType::Android
    } else if cfg!(target_os = "ios") {
        PlatformType::Ios
    } else if cfg!(target_arch = "wasm32") {
        PlatformType::Web
    } else {
        PlatformType::Desktop
    }
}

pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
