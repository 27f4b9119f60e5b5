//! Each service knows its endpoint, how much its readings can be trusted and
//! how to read its own response shape. [`resolve`] walks an ordered list of
//! services and returns the first usable coordinate pair.

mod fetch;
mod services;

use std::sync::Arc;

use log::{debug, warn};

pub use fetch::JsonFetcher;
#[cfg(not(target_arch = "wasm32"))]
pub use fetch::ReqwestFetcher;
pub use services::{FreeGeoIpService, IpApiService, IpInfoService};

use crate::{Location, LocationError, LocationResult};

/// A REST endpoint that geolocates the caller's public IP address.
pub trait IpGeolocationService: Send + Sync + std::fmt::Debug {
    /// Short name used in the provider tag and in logs.
    fn name(&self) -> &str;

    /// URL queried with a plain GET.
    fn endpoint(&self) -> &str;

    /// Accuracy estimate in meters attached to every reading.
    fn accuracy_m(&self) -> f32;

    /// Extract a reading from a response body.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::InvalidResponse`] when the body is not JSON or
    /// lacks a usable coordinate pair.
    fn parse(&self, body: &str) -> LocationResult<Location>;
}

/// The public services in trust order: 5 km, 8 km, then 10 km accuracy.
#[must_use]
pub fn default_services() -> Vec<Arc<dyn IpGeolocationService>> {
    vec![
        Arc::new(IpApiService::default()),
        Arc::new(IpInfoService::default()),
        Arc::new(FreeGeoIpService::default()),
    ]
}

/// Query `services` in order and return the first reading.
///
/// # Errors
///
/// Returns [`LocationError::AcquisitionFailed`] once every service failed.
pub async fn resolve(
    services: &[Arc<dyn IpGeolocationService>],
    fetcher: &dyn JsonFetcher,
) -> LocationResult<Location> {
    for service in services {
        debug!("querying {} for IP geolocation", service.name());
        let outcome = match fetcher.fetch(service.endpoint()).await {
            Ok(body) => service.parse(&body),
            Err(err) => Err(err),
        };
        match outcome {
            Ok(location) => return Ok(location),
            Err(err) => warn!("{} failed: {err}", service.name()),
        }
    }
    Err(LocationError::AcquisitionFailed(
        "Unable to get location from IP geolocation".into(),
    ))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use futures::FutureExt;
    use futures::future::BoxFuture;
    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Debug, Default)]
    struct CannedFetcher(HashMap<String, LocationResult<String>>);

    impl JsonFetcher for CannedFetcher {
        fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, LocationResult<String>> {
            let reply = self
                .0
                .get(url)
                .cloned()
                .unwrap_or_else(|| Err(LocationError::Http(format!("no route to {url}"))));
            async move { reply }.boxed()
        }
    }

    #[tokio::test]
    async fn first_usable_service_wins() {
        let mut fetcher = CannedFetcher::default();
        fetcher.0.insert(
            "https://ipapi.co/json/".into(),
            Err(LocationError::Http("429 Too Many Requests".into())),
        );
        fetcher.0.insert(
            "https://ipinfo.io/json".into(),
            Ok(r#"{"loc": "41.3275,19.8189", "city": "Tirana", "region": "Tirana"}"#.into()),
        );

        let location = resolve(&default_services(), &fetcher)
            .await
            .expect("second service answers");

        assert_eq!(location.accuracy, Some(8_000.0));
        assert_eq!(location.provider.as_deref(), Some("ipinfo.io (Tirana, Tirana)"));
    }

    #[tokio::test]
    async fn malformed_body_moves_on_to_next_service() {
        let mut fetcher = CannedFetcher::default();
        fetcher
            .0
            .insert("https://ipapi.co/json/".into(), Ok("<html>rate limited</html>".into()));
        fetcher.0.insert(
            "https://ipinfo.io/json".into(),
            Ok(r#"{"city": "Nowhere"}"#.into()),
        );
        fetcher.0.insert(
            "https://freegeoip.app/json/".into(),
            Ok(r#"{"latitude": 52.37, "longitude": 4.89}"#.into()),
        );

        let location = resolve(&default_services(), &fetcher)
            .await
            .expect("third service answers");

        assert_eq!(location.accuracy, Some(10_000.0));
        assert_eq!(location.provider.as_deref(), Some("freegeoip.app"));
    }

    #[tokio::test]
    async fn all_failing_is_an_acquisition_failure() {
        let err = resolve(&default_services(), &CannedFetcher::default())
            .await
            .expect_err("nothing answers");

        assert_eq!(
            err,
            LocationError::AcquisitionFailed("Unable to get location from IP geolocation".into())
        );
    }
}
