//! Client configuration. Every setting has a default so a client can be
//! created with `ClientConfig::default()` and adjusted with the builder style
//! setters.

use crate::contract::MethodDefaults;
use crate::log::{DEFAULT_BLOCK_PAGE_SIZE, DEFAULT_POLL_INTERVAL};
use crate::transaction::confirm::ConfirmParams;
use std::time::Duration;

/// Default timeout of a single JSON-RPC round trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of retries for transient transport failures.
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Default first delay before retrying a failed request.
#[cfg(not(test))]
const DEFAULT_BACKOFF_MIN: Duration = Duration::from_millis(250);
#[cfg(test)]
const DEFAULT_BACKOFF_MIN: Duration = Duration::from_millis(0);

/// Default maximal delay between request retries.
#[cfg(not(test))]
const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(5);
#[cfg(test)]
const DEFAULT_BACKOFF_MAX: Duration = Duration::from_millis(0);

/// How individual JSON-RPC requests are timed out and retried.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RequestPolicy {
    /// Timeout of a single round trip, `None` to wait for as long as the
    /// transport does.
    pub timeout: Option<Duration>,
    /// How many times a request failing with a transient error is retried.
    /// Broadcasts are never retried.
    pub max_retries: usize,
    /// Delay before the first retry. The delay doubles with each retry.
    pub backoff_min: Duration,
    /// Upper bound for the delay between retries.
    pub backoff_max: Duration,
}

impl RequestPolicy {
    /// Set new value for [`timeout`].
    ///
    /// [`timeout`]: #structfield.timeout
    #[inline]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set new value for [`max_retries`].
    ///
    /// [`max_retries`]: #structfield.max_retries
    #[inline]
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set new values for the retry backoff.
    #[inline]
    pub fn backoff(mut self, min: Duration, max: Duration) -> Self {
        self.backoff_min = min;
        self.backoff_max = max;
        self
    }

    /// The delay to wait before the given retry, starting at 1.
    pub fn backoff_delay(&self, retry: usize) -> Duration {
        let factor = 1u32 << retry.saturating_sub(1).min(16);
        self.backoff_min
            .saturating_mul(factor)
            .min(self.backoff_max)
    }
}

impl Default for RequestPolicy {
    fn default() -> Self {
        RequestPolicy {
            timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_min: DEFAULT_BACKOFF_MIN,
            backoff_max: DEFAULT_BACKOFF_MAX,
        }
    }
}

/// Configuration of a contract client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Timeout and retry policy applied to every JSON-RPC round trip.
    pub request: RequestPolicy,
    /// Confirmation parameters used by `Client::confirm` when none are given.
    pub confirm: ConfirmParams,
    /// Default method parameters merged under per-call options.
    pub defaults: MethodDefaults,
    /// Block range size for a single `eth_getLogs` request.
    pub block_page_size: u64,
    /// Interval between polls of a log subscription.
    pub poll_interval: Duration,
}

impl ClientConfig {
    /// Set new value for [`request`].
    ///
    /// [`request`]: #structfield.request
    pub fn request(mut self, request: RequestPolicy) -> Self {
        self.request = request;
        self
    }

    /// Set new value for [`confirm`].
    ///
    /// [`confirm`]: #structfield.confirm
    pub fn confirm(mut self, confirm: ConfirmParams) -> Self {
        self.confirm = confirm;
        self
    }

    /// Set new value for [`defaults`].
    ///
    /// [`defaults`]: #structfield.defaults
    pub fn defaults(mut self, defaults: MethodDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Set new value for [`block_page_size`].
    ///
    /// # Panics
    ///
    /// Panics if a block page size of 0 is specified.
    ///
    /// [`block_page_size`]: #structfield.block_page_size
    pub fn block_page_size(mut self, block_page_size: u64) -> Self {
        assert!(block_page_size > 0, "block page size cannot be 0");
        self.block_page_size = block_page_size;
        self
    }

    /// Set new value for [`poll_interval`].
    ///
    /// [`poll_interval`]: #structfield.poll_interval
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            request: RequestPolicy::default(),
            confirm: ConfirmParams::default(),
            defaults: MethodDefaults::default(),
            block_page_size: DEFAULT_BLOCK_PAGE_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}
