//! Desktop test binary for geokit-location.
//!
//! Run with: cargo run -p geokit-location-test
//!
//! Set `RUST_LOG=debug` to watch the service fallback.

use futures::StreamExt;
use geokit_location::{LocationConfig, LocationState, format_distance, sys};

// Greenwich observatory, for a distance sanity check.
const GREENWICH: (f64, f64) = (51.4769, -0.0005);

#[tokio::main]
async fn main() {
    env_logger::init();
    println!("=== Geokit Location Test (desktop) ===\n");

    let client = match sys::default_client() {
        Ok(client) => client,
        Err(e) => {
            println!("Failed to create location client: {e}");
            return;
        }
    };
    if let Err(e) = client.initialize() {
        println!("Failed to initialize {:?} client: {e}", client.platform());
        return;
    }

    println!("Getting current location...");
    let mut states = client.get_location(&LocationConfig::default(), 0);
    while let Some(state) = states.next().await {
        match state {
            LocationState::Loading => println!("  ... loading"),
            LocationState::Success(location) => {
                println!("✓ Location retrieved successfully!");
                println!("  Position:  {}", location.format());
                if let Some(acc) = location.accuracy {
                    println!("  Accuracy:  {acc:.0}m");
                }
                if let Some(provider) = &location.provider {
                    println!("  Provider:  {provider}");
                }
                let meters = geokit_location::haversine_distance(
                    (location.latitude, location.longitude),
                    GREENWICH,
                );
                println!("  Greenwich: {}", format_distance(meters));
            }
            LocationState::Error(message) => println!("✗ Failed to get location: {message}"),
            LocationState::PermissionDenied => println!("✗ Location permission denied"),
        }
    }

    client.on_dispose();
}
