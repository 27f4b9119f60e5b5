//! HTTP transport for the IP-geolocation services.

use futures::future::BoxFuture;

use crate::LocationResult;

/// Fetches a response body as text.
///
/// The desktop client goes through this seam so that transport failures and
/// slow services can be scripted without a network.
pub trait JsonFetcher: Send + Sync + std::fmt::Debug {
    /// GET `url` and return the response body.
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, LocationResult<String>>;
}

#[cfg(not(target_arch = "wasm32"))]
pub use reqwest_fetcher::ReqwestFetcher;

#[cfg(not(target_arch = "wasm32"))]
mod reqwest_fetcher {
    use std::time::Duration;

    use futures::FutureExt;
    use futures::future::BoxFuture;
    use reqwest::Client;
    use reqwest::header::{self, HeaderMap, HeaderValue};

    use super::JsonFetcher;
    use crate::{LocationError, LocationResult};

    /// Per-request budget for a single geolocation service.
    pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

    const USER_AGENT: &str = concat!("geokit/", env!("CARGO_PKG_VERSION"));

    /// [`JsonFetcher`] backed by a shared `reqwest` client.
    ///
    /// Requires a tokio reactor on the polling thread.
    #[derive(Debug, Clone)]
    pub struct ReqwestFetcher {
        client: Client,
    }

    impl ReqwestFetcher {
        /// Build a fetcher with the default user agent and timeout.
        ///
        /// # Errors
        ///
        /// Returns an error if the TLS backend cannot be initialized.
        pub fn new() -> LocationResult<Self> {
            Self::with_timeout(DEFAULT_HTTP_TIMEOUT)
        }

        /// Build a fetcher with a custom per-request timeout.
        ///
        /// # Errors
        ///
        /// Returns an error if the TLS backend cannot be initialized.
        pub fn with_timeout(timeout: Duration) -> LocationResult<Self> {
            let mut headers = HeaderMap::new();
            headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
            headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

            let client = Client::builder()
                .default_headers(headers)
                .connect_timeout(timeout)
                .timeout(timeout)
                .build()
                .map_err(|e| LocationError::Http(format!("failed to build HTTP client: {e}")))?;
            Ok(Self { client })
        }
    }

    impl JsonFetcher for ReqwestFetcher {
        fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, LocationResult<String>> {
            async move {
                let response = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .and_then(reqwest::Response::error_for_status)
                    .map_err(|e| LocationError::Http(e.to_string()))?;
                response
                    .text()
                    .await
                    .map_err(|e| LocationError::Http(e.to_string()))
            }
            .boxed()
        }
    }
}
