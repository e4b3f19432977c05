//! TTL policy tiers and the remaining-TTL sentinel.
//!
//! Call sites pick a tier (or pass any positive `Duration`, or none for a
//! persistent entry). The tiers below are the values platform read paths
//! actually use; they bound staleness for namespaces no invalidation target
//! covers.

use std::time::Duration;

/// Liveness probes under `system:*`.
pub const SYSTEM_HEALTH: Duration = Duration::from_secs(60);

/// Paginated listings (`stories:*`, `publications:*`, per-user lists).
pub const LISTING: Duration = Duration::from_secs(300);

/// Single-entity views (`story:<id>`, `user:<id>`, `publication:<id>`).
pub const ENTITY: Duration = Duration::from_secs(600);

/// Aggregated analytics views (`analytics:dashboard:*` and friends).
pub const ANALYTICS: Duration = Duration::from_secs(900);

/// Media metadata is immutable once ingested; cached for a day.
pub const MEDIA_METADATA: Duration = Duration::from_secs(86_400);

/// Remaining lifetime of a key, decoded from the backing store's
/// `-2` / `-1` / seconds convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist.
    Missing,
    /// The key exists and has no expiry.
    Persistent,
    /// The key exists and expires after the contained duration.
    Expires(Duration),
}

impl KeyTtl {
    pub fn from_store_secs(secs: i64) -> Self {
        match secs {
            -2 => Self::Missing,
            -1 => Self::Persistent,
            other => Self::Expires(Duration::from_secs(other.max(0) as u64)),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Remaining duration, if the key exists and expires.
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            Self::Expires(remaining) => Some(*remaining),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_convention_decodes() {
        assert_eq!(KeyTtl::from_store_secs(-2), KeyTtl::Missing);
        assert_eq!(KeyTtl::from_store_secs(-1), KeyTtl::Persistent);
        assert_eq!(
            KeyTtl::from_store_secs(90),
            KeyTtl::Expires(Duration::from_secs(90))
        );
    }

    #[test]
    fn remaining_only_for_expiring_keys() {
        assert_eq!(KeyTtl::Missing.remaining(), None);
        assert_eq!(KeyTtl::Persistent.remaining(), None);
        assert_eq!(
            KeyTtl::Expires(LISTING).remaining(),
            Some(Duration::from_secs(300))
        );
    }

    #[test]
    fn tiers_are_ordered_by_volatility() {
        assert!(SYSTEM_HEALTH < LISTING);
        assert!(LISTING < ENTITY);
        assert!(ENTITY < ANALYTICS);
        assert!(ANALYTICS < MEDIA_METADATA);
    }
}
