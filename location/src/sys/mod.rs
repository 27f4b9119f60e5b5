//! One acquisition state machine per platform family. Mobile and browser
//! clients are generic over a trait describing the native API they consume;
//! the host application hands in the binding. Desktop builds resolve
//! locations over HTTP and need no binding at all.

pub mod core_location;
pub mod desktop;
pub mod fused;
pub mod unsupported;
pub mod web;

use std::sync::Arc;

pub use core_location::CoreLocationClient;
pub use desktop::DesktopLocationClient;
pub use fused::FusedLocationClient;
pub use unsupported::UnsupportedLocationClient;
pub use web::WebLocationClient;

use crate::{LocationClient, LocationResult};

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "android", target_os = "ios", target_arch = "wasm32"))] {
        /// The client this target can build without a native binding.
        ///
        /// Android, iOS and browser hosts wrap their binding in
        /// [`FusedLocationClient`], [`CoreLocationClient`] or
        /// [`WebLocationClient`]; without one, requests report
        /// [`crate::LocationError::Unsupported`].
        ///
        /// # Errors
        ///
        /// Never fails on this target.
        pub fn default_client() -> LocationResult<Arc<dyn LocationClient>> {
            Ok(Arc::new(UnsupportedLocationClient::new()))
        }
    } else {
        /// The client this target can build without a native binding: IP
        /// geolocation over the public services.
        ///
        /// # Errors
        ///
        /// Returns an error if the HTTP client cannot be built.
        pub fn default_client() -> LocationResult<Arc<dyn LocationClient>> {
            Ok(Arc::new(DesktopLocationClient::new()?))
        }
    }
}
