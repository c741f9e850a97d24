use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Rate-limiter and IdP-selection configuration.
///
/// The primary/overflow IdP names and the per-IdP user limits are read from
/// cache keys rather than from this file, so operators can switch IdPs or
/// adjust limits at runtime without a redeploy. This section names those
/// keys and fixes the per-IP admission window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Maximum requests per source IP within the window.
    #[serde(default = "default_ip_max_count")]
    pub ipaddress_max_count: i64,

    /// Per-IP window length in seconds. Doubles as the Retry-After hint.
    #[serde(default = "default_ip_window")]
    pub ipaddress_window_secs: u64,

    /// Granularity of the per-IdP user-counter timeslots, in seconds.
    #[serde(default = "default_timeslot")]
    pub user_limit_timeslot_secs: u64,

    /// Cache key holding the primary IdP name.
    #[serde(default = "default_primary_idp_key")]
    pub primary_idp_key: String,

    /// Cache key holding the overflow IdP name, if any is deployed.
    #[serde(default = "default_overflow_idp_key")]
    pub overflow_idp_key: String,

    /// Cache key holding the primary IdP's per-timeslot user limit.
    /// An absent value in the cache means unlimited.
    #[serde(default = "default_primary_user_limit_key")]
    pub primary_user_limit_key: String,

    /// Cache key holding the overflow IdP's per-timeslot user limit.
    #[serde(default = "default_overflow_user_limit_key")]
    pub overflow_user_limit_key: String,

    /// Cache key for the operator-set outage flag. Empty disables the
    /// outage check entirely.
    #[serde(default)]
    pub outage_key: Option<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            ipaddress_max_count: default_ip_max_count(),
            ipaddress_window_secs: default_ip_window(),
            user_limit_timeslot_secs: default_timeslot(),
            primary_idp_key: default_primary_idp_key(),
            overflow_idp_key: default_overflow_idp_key(),
            primary_user_limit_key: default_primary_user_limit_key(),
            overflow_user_limit_key: default_overflow_user_limit_key(),
            outage_key: None,
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ipaddress_max_count <= 0 {
            return Err(ConfigError::Validation(
                "rate_limit.ipaddress_max_count must be greater than 0".into(),
            ));
        }
        if self.ipaddress_window_secs == 0 || self.user_limit_timeslot_secs == 0 {
            return Err(ConfigError::Validation(
                "rate_limit windows must be greater than 0 seconds".into(),
            ));
        }
        Ok(())
    }
}

fn default_ip_max_count() -> i64 {
    10
}

fn default_ip_window() -> u64 {
    10
}

fn default_timeslot() -> u64 {
    1
}

fn default_primary_idp_key() -> String {
    "config:primary_idp".to_string()
}

fn default_overflow_idp_key() -> String {
    "config:overflow_idp".to_string()
}

fn default_primary_user_limit_key() -> String {
    "config:primary_idp_user_limit".to_string()
}

fn default_overflow_user_limit_key() -> String {
    "config:overflow_idp_user_limit".to_string()
}
