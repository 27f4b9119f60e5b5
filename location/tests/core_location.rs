mod common;

use std::time::Duration;

use common::{CoreScript, FakeCoreLocation, collect, init_logger, now_ms, reading};
use futures::StreamExt;
use geokit_location::sys::CoreLocationClient;
use geokit_location::sys::core_location::{
    AuthorizationStatus, CoreLocationEvent, DISTANCE_FILTER_M, DesiredAccuracy,
};
use geokit_location::{LocationClient, LocationConfig, LocationState, PlatformType};
use pretty_assertions::assert_eq;

fn client(script: CoreScript) -> CoreLocationClient<FakeCoreLocation> {
    init_logger();
    let client = CoreLocationClient::new(FakeCoreLocation::new(script));
    client.initialize().unwrap();
    client
}

#[tokio::test]
async fn unauthorized_reports_permission_denied_only() {
    let client = client(CoreScript {
        status: AuthorizationStatus::NotDetermined,
        ..CoreScript::default()
    });

    let states = collect(client.get_location(&LocationConfig::default(), 1)).await;

    assert_eq!(
        states,
        vec![LocationState::Loading, LocationState::PermissionDenied]
    );
    assert!(!client.has_permission());
    assert_eq!(client.platform(), PlatformType::Ios);

    client.request_permission();
    assert_eq!(client.api().log.lock().unwrap().authorization_prompts, 1);
}

#[tokio::test]
async fn uninitialized_client_reports_error() {
    let client = CoreLocationClient::new(FakeCoreLocation::default());

    let states = collect(client.get_location(&LocationConfig::default(), 1)).await;

    assert_eq!(
        states.last(),
        Some(&LocationState::Error("LocationClient not initialized".into()))
    );
}

#[tokio::test]
async fn disabled_services_are_reported() {
    let client = client(CoreScript {
        services_enabled: false,
        ..CoreScript::default()
    });

    let states = collect(client.get_location(&LocationConfig::default(), 1)).await;

    assert_eq!(
        states,
        vec![
            LocationState::Loading,
            LocationState::Error("Location services are disabled".into()),
        ]
    );
}

#[tokio::test]
async fn request_location_delivers_latest_reading() {
    let newest = reading(37.33, -122.03);
    let client = client(CoreScript {
        on_request: vec![CoreLocationEvent::DidUpdateLocations(vec![
            reading(1.0, 1.0),
            newest,
        ])],
        ..CoreScript::default()
    });

    let states = collect(client.get_location(&LocationConfig::default(), 1)).await;

    let location = newest.into_location();
    assert_eq!(location.provider.as_deref(), Some("CoreLocation"));
    assert_eq!(location.speed, None);
    assert_eq!(
        states,
        vec![LocationState::Loading, LocationState::Success(location)]
    );

    let log = client.api().log.lock().unwrap();
    assert_eq!(log.accuracy, vec![DesiredAccuracy::Best]);
    assert!(log.delegate.is_none());
    assert_eq!(log.stops, 1);
}

#[tokio::test]
async fn failed_request_falls_back_to_recent_cache() {
    let cached = reading(51.5, -0.12);
    let client = client(CoreScript {
        cached: Some(cached),
        on_request: vec![CoreLocationEvent::DidFailWithError("kCLErrorLocationUnknown".into())],
        ..CoreScript::default()
    });

    let states = collect(client.get_location(&LocationConfig::default(), 1)).await;

    assert_eq!(
        states,
        vec![
            LocationState::Loading,
            LocationState::Success(cached.into_location())
        ]
    );
    assert_eq!(client.api().log.lock().unwrap().starts, 0);
}

#[tokio::test]
async fn stale_cache_falls_back_to_updates() {
    let mut stale = reading(51.5, -0.12);
    stale.timestamp = (now_ms() as f64 / 1_000.0) - 3_600.0;
    let live = reading(51.6, -0.13);
    let client = client(CoreScript {
        cached: Some(stale),
        on_request: vec![CoreLocationEvent::DidFailWithError("denied fix".into())],
        on_start: vec![CoreLocationEvent::DidUpdateLocations(vec![live])],
        ..CoreScript::default()
    });

    let states = collect(client.get_location(&LocationConfig::default(), 1)).await;

    assert_eq!(
        states,
        vec![
            LocationState::Loading,
            LocationState::Success(live.into_location())
        ]
    );
    let log = client.api().log.lock().unwrap();
    assert_eq!(log.starts, 1);
    assert_eq!(log.stops, 2);
}

#[tokio::test]
async fn every_stage_failing_reports_last_error() {
    let client = client(CoreScript {
        on_request: vec![CoreLocationEvent::DidFailWithError("first".into())],
        on_start: vec![CoreLocationEvent::DidFailWithError("second".into())],
        ..CoreScript::default()
    });

    let states = collect(client.get_location(&LocationConfig::default(), 1)).await;

    assert_eq!(
        states,
        vec![
            LocationState::Loading,
            LocationState::Error("Location error: second".into()),
        ]
    );
}

#[tokio::test]
async fn revoked_authorization_mid_request_reports_permission_denied() {
    let client = client(CoreScript {
        on_request: vec![CoreLocationEvent::DidChangeAuthorization(
            AuthorizationStatus::Denied,
        )],
        ..CoreScript::default()
    });

    let states = collect(client.get_location(&LocationConfig::default(), 1)).await;

    assert_eq!(
        states,
        vec![LocationState::Loading, LocationState::PermissionDenied]
    );
}

#[tokio::test]
async fn silent_manager_times_out_and_detaches() {
    let client = client(CoreScript::default());

    let states = collect(client.get_location(&LocationConfig::default().timeout_ms(50), 1)).await;

    assert_eq!(
        states,
        vec![
            LocationState::Loading,
            LocationState::Error("location request timed out".into()),
        ]
    );
    let log = client.api().log.lock().unwrap();
    assert!(log.delegate.is_none());
    assert_eq!(log.stops, 1);
}

#[tokio::test]
async fn continuous_updates_emit_each_reading_and_mask_later_errors() {
    let first = reading(1.0, 1.0);
    let second = reading(2.0, 2.0);
    let client = client(CoreScript {
        on_start: vec![CoreLocationEvent::DidUpdateLocations(vec![first, second])],
        ..CoreScript::default()
    });

    let config = LocationConfig::continuous().high_accuracy(false);
    let mut states = client.get_location(&config, 1);

    assert_eq!(states.next().await, Some(LocationState::Loading));
    assert_eq!(
        states.next().await,
        Some(LocationState::Success(first.into_location()))
    );
    assert_eq!(
        states.next().await,
        Some(LocationState::Success(second.into_location()))
    );

    let third = reading(3.0, 3.0);
    client
        .api()
        .emit(CoreLocationEvent::DidFailWithError("blip".into()));
    client
        .api()
        .emit(CoreLocationEvent::DidChangeAuthorization(
            AuthorizationStatus::NotDetermined,
        ));
    client
        .api()
        .emit(CoreLocationEvent::DidUpdateLocations(vec![third]));
    assert_eq!(
        states.next().await,
        Some(LocationState::Success(third.into_location()))
    );

    {
        let log = client.api().log.lock().unwrap();
        assert_eq!(log.distance_filter, Some(DISTANCE_FILTER_M));
        assert_eq!(log.accuracy, vec![DesiredAccuracy::HundredMeters]);
        assert_eq!(log.authorization_prompts, 1);
    }

    client.on_dispose();
    assert_eq!(
        tokio::time::timeout(Duration::from_secs(1), states.next()).await,
        Ok(None)
    );
    assert!(client.api().log.lock().unwrap().delegate.is_none());
}

#[tokio::test]
async fn continuous_mode_without_authorization_never_starts() {
    let client = client(CoreScript {
        status: AuthorizationStatus::Denied,
        ..CoreScript::default()
    });

    let states = collect(client.get_location(&LocationConfig::continuous(), 1)).await;

    assert_eq!(
        states,
        vec![LocationState::Loading, LocationState::PermissionDenied]
    );
    let log = client.api().log.lock().unwrap();
    assert_eq!(log.starts, 0);
    assert!(log.delegate.is_none());
}

#[tokio::test]
async fn dispose_during_request_skips_remaining_stages() {
    let client = client(CoreScript::default());
    let mut states = client.get_location(&LocationConfig::default(), 1);
    assert_eq!(states.next().await, Some(LocationState::Loading));
    assert!(
        tokio::time::timeout(Duration::from_millis(20), states.next())
            .await
            .is_err()
    );
    assert_eq!(client.api().log.lock().unwrap().requests, 1);

    client.on_dispose();

    assert_eq!(
        tokio::time::timeout(Duration::from_secs(1), states.next()).await,
        Ok(None)
    );
    let log = client.api().log.lock().unwrap();
    assert_eq!(log.starts, 0);
    assert!(log.delegate.is_none());
}
