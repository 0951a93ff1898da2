//! Expiration arithmetic.
//!
//! Timestamps handed to backends are absolute Unix seconds, with `0` meaning
//! "never". Negative values are never forwarded: they collapse to "unset".

use tracing::debug;

/// Sentinel for a record that never expires
pub const NEVER: i64 = 0;

/// Drops negative values.
pub fn normalize(raw: Option<i64>) -> Option<i64> {
    match raw {
        Some(value) if value < 0 => {
            debug!("Discarding negative expiration value {}", value);
            None
        }
        other => other,
    }
}

/// Parses an expiration from loosely typed input such as an environment
/// variable. Non-numeric and negative input is unset.
pub fn parse_expire(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    let parsed = trimmed.parse::<i64>().ok().or_else(|| {
        trimmed
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| f.trunc() as i64)
    });
    normalize(parsed)
}

/// Absolute expiry for a write: an explicit override wins, otherwise the
/// instance offset is applied to `now`.
pub fn resolve_write_expiry(
    override_at: Option<i64>,
    offset: Option<i64>,
    now: i64,
) -> Option<i64> {
    let candidate = match override_at {
        Some(at) => Some(at),
        None => offset.map(|offset| now.saturating_add(offset)),
    };
    normalize(candidate)
}

/// Lazy-expiry check: a record is live when it never expires or its timestamp
/// is strictly in the future.
pub fn is_live(expire: i64, now: i64) -> bool {
    if expire < 0 {
        return false;
    }
    expire == NEVER || now < expire
}

/// Expiry stored by `set_expire`. `NEVER` and future timestamps are kept;
/// anything else expires the record immediately.
pub fn clamp_new_expiry(requested: Option<i64>, now: i64) -> i64 {
    match normalize(requested) {
        Some(NEVER) => NEVER,
        Some(at) if at > now => at,
        _ => now - 1,
    }
}

/// TTL for stores with relative-expiry semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    Persist,
    Seconds(u64),
}

/// Converts an absolute expiry into a relative TTL.
///
/// A missing expiry uses `default_ttl` (or persists without one). An expiry
/// that is already spent also falls back to a positive `default_ttl`; without
/// one the result is `None` and the write must not happen.
pub fn ttl_from_absolute(
    expire_at: Option<i64>,
    now: i64,
    default_ttl: Option<i64>,
) -> Option<Ttl> {
    let default = match default_ttl {
        Some(seconds) if seconds > 0 => Some(Ttl::Seconds(seconds as u64)),
        _ => None,
    };

    match normalize(expire_at) {
        Some(NEVER) => Some(Ttl::Persist),
        Some(at) if at > now => Some(Ttl::Seconds((at - now) as u64)),
        Some(at) => {
            debug!("Expiry {} is not after {}, using default TTL", at, now);
            default
        }
        None => Some(default.unwrap_or(Ttl::Persist)),
    }
}
