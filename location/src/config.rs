use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Parameters for a single `get_location` subscription.
///
/// The intervals are expected to satisfy
/// `min_update_interval_ms <= update_interval_ms <= max_update_delay_ms`;
/// this is reported by [`LocationConfig::validate`] but never enforced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Resolve one reading and finish instead of streaming updates.
    pub single_request: bool,
    /// Prefer GPS-grade accuracy over power savings.
    pub high_accuracy: bool,
    /// Desired interval between continuous updates.
    pub update_interval_ms: u64,
    /// Fastest interval at which continuous updates may arrive.
    pub min_update_interval_ms: u64,
    /// Longest a continuous update may be batched before delivery.
    pub max_update_delay_ms: u64,
    /// Overall budget for a single-request acquisition.
    pub timeout_ms: u64,
    /// Start acquiring as soon as the provider is created.
    pub auto_request: bool,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            single_request: true,
            high_accuracy: true,
            update_interval_ms: 10_000,
            min_update_interval_ms: 5_000,
            max_update_delay_ms: 15_000,
            timeout_ms: 30_000,
            auto_request: false,
        }
    }
}

impl LocationConfig {
    /// Configuration for a stream of updates rather than a single reading.
    #[must_use]
    pub fn continuous() -> Self {
        Self {
            single_request: false,
            ..Self::default()
        }
    }

    /// Set one-shot versus continuous mode.
    #[must_use]
    pub const fn single_request(mut self, single_request: bool) -> Self {
        self.single_request = single_request;
        self
    }

    /// Set the accuracy preference.
    #[must_use]
    pub const fn high_accuracy(mut self, high_accuracy: bool) -> Self {
        self.high_accuracy = high_accuracy;
        self
    }

    /// Set the desired update interval.
    #[must_use]
    pub const fn update_interval_ms(mut self, interval: u64) -> Self {
        self.update_interval_ms = interval;
        self
    }

    /// Set the fastest accepted update interval.
    #[must_use]
    pub const fn min_update_interval_ms(mut self, interval: u64) -> Self {
        self.min_update_interval_ms = interval;
        self
    }

    /// Set the maximum batching delay.
    #[must_use]
    pub const fn max_update_delay_ms(mut self, delay: u64) -> Self {
        self.max_update_delay_ms = delay;
        self
    }

    /// Set the single-request timeout.
    #[must_use]
    pub const fn timeout_ms(mut self, timeout: u64) -> Self {
        self.timeout_ms = timeout;
        self
    }

    /// Set whether the provider subscribes without user interaction.
    #[must_use]
    pub const fn auto_request(mut self, auto_request: bool) -> Self {
        self.auto_request = auto_request;
        self
    }

    /// The single-request timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Describe every violated interval expectation.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.min_update_interval_ms > self.update_interval_ms {
            warnings.push(format!(
                "min_update_interval_ms ({}) exceeds update_interval_ms ({})",
                self.min_update_interval_ms, self.update_interval_ms
            ));
        }
        if self.update_interval_ms > self.max_update_delay_ms {
            warnings.push(format!(
                "update_interval_ms ({}) exceeds max_update_delay_ms ({})",
                self.update_interval_ms, self.max_update_delay_ms
            ));
        }
        warnings
    }

    pub(crate) fn log_warnings(&self) {
        for warning in self.validate() {
            log::warn!("location config: {warning}");
        }
    }
}
