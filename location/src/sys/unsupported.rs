//! Stub client for targets without a location backend.

use async_stream::stream;

use crate::stream::seal;
use crate::{
    DisposeFlag, LocationClient, LocationConfig, LocationError, LocationResult, LocationState,
    LocationStream, PlatformType, current_platform,
};

/// Client that reports every request as unsupported.
#[derive(Debug, Default)]
pub struct UnsupportedLocationClient {
    disposed: DisposeFlag,
}

impl UnsupportedLocationClient {
    /// Create the stub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocationClient for UnsupportedLocationClient {
    fn platform(&self) -> PlatformType {
        current_platform()
    }

    fn initialize(&self) -> LocationResult<()> {
        Ok(())
    }

    fn get_location(&self, _config: &LocationConfig, _retry_trigger: u64) -> LocationStream {
        let disposed = self.disposed.clone();
        let states = stream! {
            yield LocationState::Loading;
            yield if disposed.is_disposed() {
                LocationError::Disposed.into_state()
            } else {
                LocationError::Unsupported.into_state()
            };
        };
        seal(states, true, self.disposed.clone())
    }

    fn has_permission(&self) -> bool {
        false
    }

    fn request_permission(&self) {}

    fn on_dispose(&self) {
        self.disposed.dispose();
    }
}
