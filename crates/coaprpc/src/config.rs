//! Per-node configuration shared by the dispatcher and the handler.

use std::time::Duration;

use crate::policy::Policy;

/// How long a dispatched request waits for its response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(1000);

/// Configuration handed to components at construction.
///
/// There is no global state: two nodes in one process can run different policies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub policy: Policy,
    pub request_timeout: Duration,
}

impl Config {
    /// Acks off, errors off, one second timeout.
    pub fn new() -> Self {
        Self {
            policy: Policy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_acks(mut self, enabled: bool) -> Self {
        self.policy.send_acks = enabled;
        self
    }

    pub fn with_errors(mut self, enabled: bool) -> Self {
        self.policy.send_errors = enabled;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
