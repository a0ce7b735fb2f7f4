use std::time::Duration;

use url::Url;

/// Out-of-band alert delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertConfig {
    /// Push gateway receiving alert requests. Alerts are dropped when unset.
    pub endpoint: Option<Url>,
    pub request_timeout: Duration,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            request_timeout: Duration::from_secs(5),
        }
    }
}
