//! Expiry calculation
//!
//! A resource expires once `now` is strictly past `reference + ttl`.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Result of evaluating a TTL against the clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiry {
    pub expired: bool,
    /// Time left until expiry; zero once expired
    pub remaining: Duration,
}

impl Expiry {
    pub const EXPIRED: Expiry = Expiry {
        expired: true,
        remaining: Duration::ZERO,
    };
}

/// Evaluate whether `ttl` measured from `reference` has elapsed at `now`
pub fn evaluate(ttl: Duration, reference: DateTime<Utc>, now: DateTime<Utc>) -> Expiry {
    // A window reaching past the end of representable time never closes.
    let expires_at = chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| reference.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    if now > expires_at {
        return Expiry::EXPIRED;
    }

    Expiry {
        expired: false,
        remaining: (expires_at - now).to_std().unwrap_or(Duration::ZERO),
    }
}
