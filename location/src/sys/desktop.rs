//! Desktop location via IP geolocation.
//!
//! Desktops rarely have a positioning receiver, so every request, one-shot or
//! continuous, resolves to a single reading from the first IP-geolocation
//! service that answers within the request's timeout budget.

use std::sync::Arc;

use async_stream::stream;
use log::{debug, info};

use crate::ip::{self, IpGeolocationService, JsonFetcher};
use crate::stream::seal;
use crate::timeout::with_timeout;
use crate::{
    DisposeFlag, LocationClient, LocationConfig, LocationError, LocationResult, LocationState,
    LocationStream, PlatformType,
};

/// Location client that geolocates the machine's public IP address.
#[derive(Debug)]
pub struct DesktopLocationClient {
    services: Arc<[Arc<dyn IpGeolocationService>]>,
    fetcher: Arc<dyn JsonFetcher>,
    disposed: DisposeFlag,
}

impl DesktopLocationClient {
    /// Client querying the public services over HTTPS.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn new() -> LocationResult<Self> {
        Ok(Self::with_fetcher(
            Arc::new(ip::ReqwestFetcher::new()?),
            ip::default_services(),
        ))
    }

    /// Client using a custom transport and service order.
    #[must_use]
    pub fn with_fetcher(
        fetcher: Arc<dyn JsonFetcher>,
        services: Vec<Arc<dyn IpGeolocationService>>,
    ) -> Self {
        Self {
            services: services.into(),
            fetcher,
            disposed: DisposeFlag::new(),
        }
    }
}

impl LocationClient for DesktopLocationClient {
    fn platform(&self) -> PlatformType {
        PlatformType::Desktop
    }

    fn initialize(&self) -> LocationResult<()> {
        info!(
            "desktop location client ready with {} IP geolocation services",
            self.services.len()
        );
        Ok(())
    }

    fn get_location(&self, config: &LocationConfig, retry_trigger: u64) -> LocationStream {
        debug!("desktop location request #{retry_trigger}");
        let services = self.services.clone();
        let fetcher = self.fetcher.clone();
        let disposed = self.disposed.clone();
        let config = config.clone();

        let states = stream! {
            yield LocationState::Loading;

            if disposed.is_disposed() {
                yield LocationError::Disposed.into_state();
                return;
            }

            let lookup = ip::resolve(&services, fetcher.as_ref());
            let outcome = with_timeout(config.timeout(), lookup)
                .await
                .unwrap_or(Err(LocationError::Timeout));
            yield match outcome {
                Ok(location) => LocationState::Success(location),
                Err(err) => err.into_state(),
            };
        };
        seal(states, true, self.disposed.clone())
    }

    fn has_permission(&self) -> bool {
        true
    }

    fn request_permission(&self) {}

    fn on_dispose(&self) {
        info!("disposing desktop location client");
        self.disposed.dispose();
    }
}
