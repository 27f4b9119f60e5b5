use serde_json::Value;

use super::IpGeolocationService;
use crate::{Location, LocationError, LocationResult};

/// `https://ipapi.co`, the most trusted service (~5 km).
#[derive(Debug, Clone)]
pub struct IpApiService {
    endpoint: String,
}

impl Default for IpApiService {
    fn default() -> Self {
        Self::with_endpoint("https://ipapi.co/json/")
    }
}

impl IpApiService {
    /// Query a custom endpoint that answers in the ipapi.co format.
    #[must_use]
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

impl IpGeolocationService for IpApiService {
    fn name(&self) -> &str {
        "ipapi.co"
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn accuracy_m(&self) -> f32 {
        5_000.0
    }

    fn parse(&self, body: &str) -> LocationResult<Location> {
        let json = parse_body(body)?;
        let (latitude, longitude) = lat_lon_fields(&json)?;
        Ok(Location::new(latitude, longitude)
            .with_accuracy(self.accuracy_m())
            .with_provider(provider_tag(
                self.name(),
                text_field(&json, "city"),
                text_field(&json, "country_name"),
            )))
    }
}

/// `https://ipinfo.io`, first backup (~8 km).
///
/// Reports coordinates as a single `"lat,lon"` string.
#[derive(Debug, Clone)]
pub struct IpInfoService {
    endpoint: String,
}

impl Default for IpInfoService {
    fn default() -> Self {
        Self::with_endpoint("https://ipinfo.io/json")
    }
}

impl IpInfoService {
    /// Query a custom endpoint that answers in the ipinfo.io format.
    #[must_use]
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

impl IpGeolocationService for IpInfoService {
    fn name(&self) -> &str {
        "ipinfo.io"
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn accuracy_m(&self) -> f32 {
        8_000.0
    }

    fn parse(&self, body: &str) -> LocationResult<Location> {
        let json = parse_body(body)?;
        let loc = text_field(&json, "loc")
            .ok_or_else(|| LocationError::InvalidResponse("missing location".into()))?;
        let (lat, lon) = loc
            .split_once(',')
            .ok_or_else(|| LocationError::InvalidResponse(format!("malformed location {loc:?}")))?;
        let latitude = parse_coordinate(lat, "latitude")?;
        let longitude = parse_coordinate(lon, "longitude")?;

        Ok(Location::new(latitude, longitude)
            .with_accuracy(self.accuracy_m())
            .with_provider(provider_tag(
                self.name(),
                text_field(&json, "city"),
                text_field(&json, "region"),
            )))
    }
}

/// `https://freegeoip.app`, last resort (~10 km).
#[derive(Debug, Clone)]
pub struct FreeGeoIpService {
    endpoint: String,
}

impl Default for FreeGeoIpService {
    fn default() -> Self {
        Self::with_endpoint("https://freegeoip.app/json/")
    }
}

impl FreeGeoIpService {
    /// Query a custom endpoint that answers in the freegeoip format.
    #[must_use]
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

impl IpGeolocationService for FreeGeoIpService {
    fn name(&self) -> &str {
        "freegeoip.app"
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn accuracy_m(&self) -> f32 {
        10_000.0
    }

    fn parse(&self, body: &str) -> LocationResult<Location> {
        let json = parse_body(body)?;
        let (latitude, longitude) = lat_lon_fields(&json)?;
        Ok(Location::new(latitude, longitude)
            .with_accuracy(self.accuracy_m())
            .with_provider(provider_tag(
                self.name(),
                text_field(&json, "city"),
                text_field(&json, "country_name"),
            )))
    }
}

fn parse_body(body: &str) -> LocationResult<Value> {
    serde_json::from_str(body).map_err(|e| LocationError::InvalidResponse(e.to_string()))
}

fn lat_lon_fields(json: &Value) -> LocationResult<(f64, f64)> {
    let latitude = number_field(json, "latitude")
        .ok_or_else(|| LocationError::InvalidResponse("missing latitude".into()))?;
    let longitude = number_field(json, "longitude")
        .ok_or_else(|| LocationError::InvalidResponse("missing longitude".into()))?;
    Ok((latitude, longitude))
}

/// Numbers are sometimes sent quoted; accept both.
fn number_field(json: &Value, key: &str) -> Option<f64> {
    match json.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text_field<'a>(json: &'a Value, key: &str) -> Option<&'a str> {
    json.get(key)?.as_str().filter(|s| !s.is_empty())
}

fn parse_coordinate(raw: &str, what: &str) -> LocationResult<f64> {
    raw.trim()
        .parse()
        .map_err(|_| LocationError::InvalidResponse(format!("invalid {what} {raw:?}")))
}

fn provider_tag(service: &str, city: Option<&str>, area: Option<&str>) -> String {
    match (city, area) {
        (Some(city), Some(area)) => format!("{service} ({city}, {area})"),
        (Some(city), None) => format!("{service} ({city})"),
        _ => service.to_owned(),
    }
}
