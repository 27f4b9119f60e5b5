//! # Geokit
//!
//! Cross-platform location retrieval for declarative UIs.
//!
//! Geokit turns the permission checks, fallbacks and timeouts of each
//! platform's location stack into one stream of
//! `Loading → Success | Error | PermissionDenied` states, and ships a
//! provider that maps those states onto views.
//!
//! ## Features
//!
//! - `location`: the location clients, the UI provider and the distance
//!   helpers.
//!
//! Use the `full` feature to enable everything.
//!
//! ## Example
//!
//! ```toml
//! [dependencies]
//! geokit = { version = "0.1", features = ["location"] }
//! ```
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use geokit::location::{LocationConfig, LocationState, sys};
//!
//! async fn print_coords() {
//!     let client = sys::default_client().expect("client");
//!     let mut states = client.get_location(&LocationConfig::default(), 0);
//!     while let Some(state) = states.next().await {
//!         if let LocationState::Success(location) = state {
//!             println!("Latitude: {}, Longitude: {}", location.latitude, location.longitude);
//!         }
//!     }
//! }
//! ```

#[cfg(feature = "location")]
pub use geokit_location as location;
