//! Connection rate limiting in front of the upstream identity providers.
//!
//! Two layers run in order on every authorize request. First a per-origin
//! window caps how often a single IP address may start a login. Then a
//! per-provider user limit caps concurrent logins per timeslot; when the
//! primary provider's slot is full the request falls over to the optional
//! overflow provider, and only when that one is saturated too does the
//! request fail.
//!
//! Which provider is primary, which is overflow, and their user limits are
//! runtime settings read from the cache rather than static config, so
//! operators can shift load without a restart.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::cache::{Cache, CacheError, CacheKeys};
use crate::config::RateLimitConfig;

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// Too many login attempts from one address inside the window.
    #[error("too many requests from this address, retry after {retry_after_secs}s")]
    TooManyRequestsFromOrigin { retry_after_secs: u64 },

    /// Every applicable provider is at its user limit for this timeslot.
    #[error("all identity providers are at capacity")]
    TooBusy,

    /// An operator has flagged the upstream provider as down.
    #[error("identity provider outage in progress")]
    ProviderOutage,

    /// A runtime setting the limiter depends on is missing from the cache.
    #[error("expected cache value at '{0}'")]
    ExpectedCacheValue(String),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Outcome of a user-limit probe for a single provider.
enum SlotProbe {
    Admitted,
    Full,
}

pub struct RateLimiter {
    cache: Arc<dyn Cache>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(cache: Arc<dyn Cache>, config: RateLimitConfig) -> Self {
        Self { cache, config }
    }

    /// Run the full admission check for one inbound login and pick the
    /// identity provider that will serve it.
    ///
    /// Order matters: the outage flag is checked before any counter is
    /// touched, and the per-origin window is charged before provider
    /// selection so that rejected origins cannot burn provider capacity.
    pub async fn select_provider_and_validate(
        &self,
        origin: IpAddr,
    ) -> Result<String, RateLimitError> {
        self.validate_outage().await?;
        self.origin_limit_test(origin).await?;

        let primary_key = &self.config.primary_idp_key;
        let primary = self
            .cache
            .get_string(primary_key)
            .await?
            .ok_or_else(|| RateLimitError::ExpectedCacheValue(primary_key.clone()))?;

        match self
            .user_limit_test(&primary, &self.config.primary_user_limit_key)
            .await?
        {
            SlotProbe::Admitted => return Ok(primary),
            SlotProbe::Full => {}
        }

        // Primary is saturated. If no overflow provider is configured at
        // runtime the original verdict stands.
        let Some(overflow) = self
            .cache
            .get_string(&self.config.overflow_idp_key)
            .await?
        else {
            return Err(RateLimitError::TooBusy);
        };

        match self
            .user_limit_test(&overflow, &self.config.overflow_user_limit_key)
            .await?
        {
            SlotProbe::Admitted => Ok(overflow),
            SlotProbe::Full => Err(RateLimitError::TooBusy),
        }
    }

    /// Fail fast when an operator has set the outage flag. Brokers without
    /// an `outage_key` configured skip the check entirely.
    pub async fn validate_outage(&self) -> Result<(), RateLimitError> {
        if let Some(key) = &self.config.outage_key
            && self.cache.get_bool(key).await?
        {
            return Err(RateLimitError::ProviderOutage);
        }
        Ok(())
    }

    /// Fixed-window counter per origin address. The window's TTL is set on
    /// the first hit, so a burst cannot keep its own window alive.
    async fn origin_limit_test(&self, origin: IpAddr) -> Result<(), RateLimitError> {
        let window = Duration::from_secs(self.config.ipaddress_window_secs);
        let count = self
            .cache
            .incr(&CacheKeys::rate_limit_ip(&origin.to_string()), window)
            .await?;

        if count > self.config.ipaddress_max_count {
            return Err(RateLimitError::TooManyRequestsFromOrigin {
                retry_after_secs: self.config.ipaddress_window_secs,
            });
        }
        Ok(())
    }

    /// Probe one provider's user limit for the current timeslot.
    ///
    /// A provider with no limit value in the cache is unlimited. The
    /// timeslot counter lives twice the slot length so a probe near the
    /// boundary still sees the slot it charged.
    async fn user_limit_test(
        &self,
        provider: &str,
        user_limit_key: &str,
    ) -> Result<SlotProbe, RateLimitError> {
        let Some(limit) = self.cache.get_i64(user_limit_key).await? else {
            return Ok(SlotProbe::Admitted);
        };

        let slot_secs = self.config.user_limit_timeslot_secs.max(1);
        let timeslot = unix_now_secs() / slot_secs;
        let count = self
            .cache
            .incr(
                &CacheKeys::rate_limit_idp(provider, timeslot),
                Duration::from_secs(slot_secs * 2),
            )
            .await?;

        if count > limit {
            Ok(SlotProbe::Full)
        } else {
            Ok(SlotProbe::Admitted)
        }
    }
}

fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
