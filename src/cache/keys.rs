/// Namespaced cache key construction.
///
/// Every cross-request key goes through one of these helpers so the key
/// layout is visible in one place. The timeslot key is used for both the
/// increment and the expiry of the per-IdP counter.
pub struct CacheKeys;

impl CacheKeys {
    /// Per-IP admission counter: ratelimit:ip:{ip}
    pub fn rate_limit_ip(ip: &str) -> String {
        format!("ratelimit:ip:{}", ip)
    }

    /// Per-IdP per-timeslot user counter: ratelimit:idp:{name}:{timeslot}
    pub fn rate_limit_idp(idp_name: &str, timeslot: u64) -> String {
        format!("ratelimit:idp:{}:{}", idp_name, timeslot)
    }

    /// Pending authentication context, keyed by relay-state token.
    pub fn authentication_context(relay_state: &str) -> String {
        format!("auth:request:{}", relay_state)
    }

    /// Consumed-assertion context, keyed by authorization code.
    pub fn acs_context(code: &str) -> String {
        format!("auth:acs:{}", code)
    }

    /// Token-bound userinfo, keyed by access token or legacy at_hash.
    pub fn userinfo_context(key: &str) -> String {
        format!("auth:userinfo:{}", key)
    }
}
