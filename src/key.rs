//! Key codec: namespaced cache keys and wildcard eviction patterns.
//!
//! Keys are delimiter-joined strings: `<namespace>:<part>[:<part>...]`.
//! The codec is pure and deterministic — the same `(namespace, parts)` input
//! always yields the same string, which is what makes cached lookups land.
//!
//! Validation happens at encode time: empty namespaces, empty parts, and
//! parts containing the delimiter or wildcard are rejected before any I/O.
//! Namespaces may themselves be compound (`analytics:story`); key parts may
//! not, so distinct logical keys can never silently merge.

use std::fmt;

use crate::error::{CacheError, CacheResult};

/// Segment separator inside encoded keys.
pub const DELIMITER: char = ':';

/// Wildcard token understood by pattern eviction.
pub const WILDCARD: char = '*';

// ============================================================================
// Namespace catalog
// ============================================================================

/// Namespaces exercised by platform call sites.
///
/// Key shapes are wire-stable: `relatedStories` keeps its historical casing
/// and `story_comments` its underscore. Part arity within a namespace is a
/// call-site convention, not enforced here.
pub mod ns {
    pub const STORY: &str = "story";
    pub const STORIES: &str = "stories";
    pub const PUBLICATION: &str = "publication";
    pub const PUBLICATIONS: &str = "publications";
    pub const USER: &str = "user";
    pub const ADMIN: &str = "admin";
    pub const ADMIN_STORIES: &str = "admin:stories";
    pub const ANALYTICS: &str = "analytics";
    pub const ANALYTICS_STORY: &str = "analytics:story";
    pub const ANALYTICS_DASHBOARD: &str = "analytics:dashboard";
    pub const ANALYTICS_PUBLICATION: &str = "analytics:publication";
    pub const ANALYTICS_EARNINGS: &str = "analytics:earnings";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const STORY_COMMENTS: &str = "story_comments";
    pub const RELATED_STORIES: &str = "relatedStories";
    pub const SYSTEM: &str = "system";
    pub const MEDIA: &str = "media";

    pub const ALL: [&str; 17] = [
        STORY,
        STORIES,
        PUBLICATION,
        PUBLICATIONS,
        USER,
        ADMIN,
        ADMIN_STORIES,
        ANALYTICS,
        ANALYTICS_STORY,
        ANALYTICS_DASHBOARD,
        ANALYTICS_PUBLICATION,
        ANALYTICS_EARNINGS,
        NOTIFICATIONS,
        STORY_COMMENTS,
        RELATED_STORIES,
        SYSTEM,
        MEDIA,
    ];
}

// ============================================================================
// Validation
// ============================================================================

fn validate_namespace(namespace: &str) -> CacheResult<()> {
    if namespace.is_empty() {
        return Err(CacheError::misuse("namespace must not be empty"));
    }
    if namespace.contains(WILDCARD) {
        return Err(CacheError::misuse(format!(
            "namespace `{namespace}` must not contain the wildcard `{WILDCARD}`"
        )));
    }
    if namespace.starts_with(DELIMITER) || namespace.ends_with(DELIMITER) {
        return Err(CacheError::misuse(format!(
            "namespace `{namespace}` must not start or end with the delimiter `{DELIMITER}`"
        )));
    }
    Ok(())
}

fn validate_part(part: &str) -> CacheResult<()> {
    if part.is_empty() {
        return Err(CacheError::misuse("key parts must not be empty"));
    }
    if part.contains(DELIMITER) {
        return Err(CacheError::misuse(format!(
            "key part `{part}` contains the delimiter `{DELIMITER}`"
        )));
    }
    if part.contains(WILDCARD) {
        return Err(CacheError::misuse(format!(
            "key part `{part}` contains the wildcard `{WILDCARD}`"
        )));
    }
    Ok(())
}

fn join(namespace: &str, parts: &[&str]) -> String {
    let mut encoded =
        String::with_capacity(namespace.len() + parts.iter().map(|p| p.len() + 1).sum::<usize>());
    encoded.push_str(namespace);
    for part in parts {
        encoded.push(DELIMITER);
        encoded.push_str(part);
    }
    encoded
}

// ============================================================================
// CacheKey
// ============================================================================

/// A fully encoded cache key.
///
/// Construction validates the namespace and every part; a `CacheKey` in hand
/// is always safe to send to the backing store. Keys carry at least one part
/// after the namespace, so exact keys and prefix patterns stay
/// distinguishable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    encoded: String,
}

impl CacheKey {
    pub fn new(namespace: &str, parts: &[&str]) -> CacheResult<Self> {
        validate_namespace(namespace)?;
        if parts.is_empty() {
            return Err(CacheError::misuse("at least one key part is required"));
        }
        for part in parts {
            validate_part(part)?;
        }
        Ok(Self {
            encoded: join(namespace, parts),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    pub fn into_string(self) -> String {
        self.encoded
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

// ============================================================================
// KeyPattern
// ============================================================================

/// A wildcard pattern accepted by bulk eviction.
///
/// Every constructor guarantees the pattern contains a wildcard and at least
/// one literal character, so a bare `*` can never reach the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPattern {
    encoded: String,
}

impl KeyPattern {
    /// Pattern matching every key under `namespace` that starts with the
    /// given prefix parts: `story:1:*`, or `stories:*` when `parts` is empty.
    pub fn prefix(namespace: &str, parts: &[&str]) -> CacheResult<Self> {
        validate_namespace(namespace)?;
        for part in parts {
            validate_part(part)?;
        }
        let mut encoded = join(namespace, parts);
        encoded.push(DELIMITER);
        encoded.push(WILDCARD);
        Ok(Self { encoded })
    }

    /// Validate an already-joined pattern string.
    ///
    /// Only `*` wildcards are supported; `?` and `[` glob forms are rejected
    /// so that every backend matches the same key set.
    pub fn raw(pattern: &str) -> CacheResult<Self> {
        if pattern.is_empty() {
            return Err(CacheError::misuse("pattern must not be empty"));
        }
        if !pattern.contains(WILDCARD) {
            return Err(CacheError::misuse(format!(
                "pattern `{pattern}` has no wildcard; use an exact-key evict instead"
            )));
        }
        if !pattern.chars().any(|c| c != WILDCARD) {
            return Err(CacheError::misuse(
                "pattern must contain at least one literal character",
            ));
        }
        if pattern.contains('?') || pattern.contains('[') {
            return Err(CacheError::misuse(format!(
                "pattern `{pattern}` uses an unsupported glob form; only `{WILDCARD}` is accepted"
            )));
        }
        Ok(Self {
            encoded: pattern.to_string(),
        })
    }

    /// The broadest supported shape, `*:<id>:*`: every namespace, one
    /// identifier segment. Used for full-account deletion.
    pub fn any_namespace(id: &str) -> CacheResult<Self> {
        validate_part(id)?;
        Ok(Self {
            encoded: format!("{WILDCARD}{DELIMITER}{id}{DELIMITER}{WILDCARD}"),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    pub fn matches(&self, key: &str) -> bool {
        key_matches(key, &self.encoded)
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

/// Glob match with `*` wildcards, mirroring the backing store's semantics:
/// `*` matches any run of characters, including the delimiter.
pub fn key_matches(key: &str, pattern: &str) -> bool {
    let key = key.as_bytes();
    let pattern = pattern.as_bytes();
    let (mut k, mut p) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while k < key.len() {
        if p < pattern.len() && pattern[p] == key[k] {
            k += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == WILDCARD as u8 {
            star = Some(p);
            mark = k;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            mark += 1;
            k = mark;
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == WILDCARD as u8 {
        p += 1;
    }
    p == pattern.len()
}
