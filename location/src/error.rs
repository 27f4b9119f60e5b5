use crate::LocationState;

/// Result alias used throughout the crate.
pub type LocationResult<T> = Result<T, LocationError>;

/// Errors that can occur when acquiring a location.
///
/// Every variant except [`LocationError::PermissionDenied`] surfaces to the UI
/// as [`LocationState::Error`]; a missing permission drives its own state so
/// the caller can offer a grant action instead of a retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    /// Location permission was not granted.
    #[error("location permission denied")]
    PermissionDenied,
    /// Location services (or the provider behind them) are disabled.
    #[error("{0}")]
    ServiceUnavailable(String),
    /// The overall acquisition budget elapsed.
    #[error("location request timed out")]
    Timeout,
    /// Every acquisition stage was exhausted without a reading.
    #[error("{0}")]
    AcquisitionFailed(String),
    /// The client was used after `on_dispose`.
    #[error("LocationClient is disposed")]
    Disposed,
    /// The client was used before `initialize`.
    #[error("LocationClient not initialized")]
    NotInitialized,
    /// Location is not available on this platform.
    #[error("location is not supported on this platform")]
    Unsupported,
    /// A geolocation HTTP request failed.
    #[error("http request failed: {0}")]
    Http(String),
    /// A geolocation service answered with something unusable.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl LocationError {
    /// Convert into the state a subscriber observes.
    #[must_use]
    pub fn into_state(self) -> LocationState {
        match self {
            Self::PermissionDenied => LocationState::PermissionDenied,
            other => LocationState::Error(other.to_string()),
        }
    }
}

/// An error reported by a native location SDK binding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SdkError {
    /// The platform rejected the call for lack of permission.
    #[error("security exception: {0}")]
    Security(String),
    /// Any other native failure.
    #[error("{0}")]
    Failure(String),
}

impl SdkError {
    /// Map to the crate taxonomy, prefixing non-security failures with `context`.
    #[must_use]
    pub fn into_location_error(self, context: &str) -> LocationError {
        match self {
            Self::Security(_) => LocationError::PermissionDenied,
            Self::Failure(message) => {
                LocationError::AcquisitionFailed(format!("{context}: {message}"))
            }
        }
    }
}
