//! Configuration for backends and job retries.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use storelink_core::{BackendId, RecordId};

/// Seconds subtracted from "import since" watermarks.
///
/// Remote systems stamp records when their transaction starts, so a record
/// committed while a batch runs may carry a date before the batch start.
pub const IMPORT_DELTA_BUFFER_SECS: u64 = 30;

/// Configuration of one remote backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend id.
    pub backend_id: BackendId,
    /// Display name, also used for the root product category.
    pub name: String,
    /// Backend type used for unit lookup (e.g. `shopware`).
    pub backend_type: String,
    /// Backend version used for unit lookup (e.g. `5.2`).
    pub version: String,
    /// Base URL of the shop.
    pub location: String,
    /// API user.
    pub username: String,
    /// API key.
    pub token: String,
    /// Language code used when a shop has none.
    pub default_lang: Option<String>,
    /// Product category assigned when an article has none.
    pub default_category_id: Option<RecordId>,
    /// Product field holding the quantity pushed to the shop.
    pub product_stock_field: String,
    /// Seconds subtracted from watermarks.
    pub import_delta_buffer_secs: u64,
}

impl BackendConfig {
    /// Creates a configuration for a backend.
    pub fn new(backend_id: BackendId, backend_type: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            backend_id,
            backend_type: backend_type.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    /// Sets the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the shop location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Sets the API credentials.
    pub fn with_credentials(mut self, username: impl Into<String>, token: impl Into<String>) -> Self {
        self.username = username.into();
        self.token = token.into();
        self
    }

    /// Sets the default language.
    pub fn with_default_lang(mut self, lang: impl Into<String>) -> Self {
        self.default_lang = Some(lang.into());
        self
    }

    /// Sets the default product category.
    pub fn with_default_category(mut self, category: RecordId) -> Self {
        self.default_category_id = Some(category);
        self
    }

    /// Sets the stock field.
    pub fn with_product_stock_field(mut self, field: impl Into<String>) -> Self {
        self.product_stock_field = field.into();
        self
    }

    /// Returns the REST endpoint root, always ending in `api/`.
    pub fn api_url(&self) -> String {
        let mut url = self.location.clone();
        if !url.ends_with('/') {
            url.push('/');
        }
        url.push_str("api/");
        url
    }

    /// Returns the watermark buffer.
    pub fn import_delta_buffer(&self) -> Duration {
        Duration::from_secs(self.import_delta_buffer_secs)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            backend_id: BackendId::new(1),
            name: String::new(),
            backend_type: "shopware".to_string(),
            version: "5.2".to_string(),
            location: String::new(),
            username: String::new(),
            token: String::new(),
            default_lang: None,
            default_category_id: None,
            product_stock_field: "virtual_available".to_string(),
            import_delta_buffer_secs: IMPORT_DELTA_BUFFER_SECS,
        }
    }
}

/// Configuration for job retries.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Multiplier applied per retry.
    pub backoff_multiplier: f64,
    /// Whether to spread retries with jitter.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a retry configuration allowing `max_attempts` attempts.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(3600),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Creates a configuration retrying immediately, for tests and the CLI.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Disables jitter.
    pub fn without_jitter(mut self) -> Self {
        self.add_jitter = false;
        self
    }

    /// Returns true if a job that failed `attempts` times may run again.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Calculates the delay before retry number `retry` (1-indexed).
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(retry - 1).unwrap_or(i32::MAX);
        let secs = (self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent))
            .min(self.max_delay.as_secs_f64());
        if self.add_jitter {
            // up to 25% on top
            Duration::from_secs_f64(secs + secs * 0.25 * jitter_fraction())
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(5)
    }
}

/// Pseudo-random fraction in [0, 1) taken from the clock.
fn jitter_fraction() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}
