//! Declarative invalidation fan-out.
//!
//! Write sites used to list eviction patterns inline, and the lists drifted:
//! different handlers evicted different prefixes for the same entity, and one
//! evicted a shape no read path ever set. Here the fan-out is a data
//! structure instead. Each entity kind owns a list of key and pattern
//! templates, every write site goes through [`Invalidator::invalidate`], and
//! the conformance harness checks each template against the shapes read
//! paths actually produce.
//!
//! Evictions run after the store-of-record mutation has committed, never
//! before: evict-then-mutate would let a reader repopulate the cache with
//! pre-mutation data that nothing invalidates afterward.

use std::fmt;

use futures::future::join_all;
use metrics::counter;
use once_cell::sync::Lazy;
use tracing::{debug, error, warn};

use crate::error::{CacheError, CacheResult};
use crate::key::{CacheKey, DELIMITER, KeyPattern, key_matches};
use crate::typed::TypedCache;

const METRIC_INVALIDATION: &str = "scorta_cache_invalidation_total";
const METRIC_INVALIDATION_FAILURE: &str = "scorta_cache_invalidation_failure_total";

/// Placeholder token substituted with the mutated entity's identifier.
pub const ID_PLACEHOLDER: &str = "{id}";

// ============================================================================
// Entities and targets
// ============================================================================

/// Domain entity kinds whose mutations drive cache invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Story,
    Publication,
    User,
    /// The comment thread of a story; the id is the story's.
    Comments,
    Media,
    /// A user's notification feed; the id is the user's.
    Notifications,
    /// Full-account deletion; the id is scrubbed from every namespace.
    AccountPurge,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Story => "story",
            Self::Publication => "publication",
            Self::User => "user",
            Self::Comments => "comments",
            Self::Media => "media",
            Self::Notifications => "notifications",
            Self::AccountPurge => "account_purge",
        }
    }

    pub const ALL: [EntityKind; 7] = [
        Self::Story,
        Self::Publication,
        Self::User,
        Self::Comments,
        Self::Media,
        Self::Notifications,
        Self::AccountPurge,
    ];
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One eviction a mutation owes: an exact key or a wildcard pattern, as a
/// template with the entity id left as [`ID_PLACEHOLDER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Exact-key eviction, e.g. `story:{id}`. Needed alongside the pattern
    /// form: `story:{id}:*` does not match the bare `story:{id}` key.
    Key(&'static str),
    /// Pattern eviction, e.g. `story:{id}:*`.
    Pattern(&'static str),
}

impl Target {
    pub fn template(&self) -> &'static str {
        match self {
            Self::Key(template) | Self::Pattern(template) => template,
        }
    }

    /// Substitute `id` into the template, validating the result.
    pub fn render(&self, id: &str) -> CacheResult<RenderedTarget> {
        if id.is_empty() || id.contains(DELIMITER) || id.contains('*') {
            return Err(CacheError::misuse(format!(
                "entity id `{id}` is not a valid key segment"
            )));
        }
        let rendered = self.template().replace(ID_PLACEHOLDER, id);
        match self {
            Self::Key(_) => {
                let (namespace, parts) = split_key(&rendered)?;
                Ok(RenderedTarget::Key(CacheKey::new(namespace, &parts)?))
            }
            Self::Pattern(_) => Ok(RenderedTarget::Pattern(KeyPattern::raw(&rendered)?)),
        }
    }

    /// Whether a concrete key string would be evicted by this target.
    pub fn covers(&self, id: &str, key: &str) -> bool {
        let rendered = self.template().replace(ID_PLACEHOLDER, id);
        match self {
            Self::Key(_) => rendered == key,
            Self::Pattern(_) => key_matches(key, &rendered),
        }
    }
}

/// A target with the id substituted, ready to evict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedTarget {
    Key(CacheKey),
    Pattern(KeyPattern),
}

// Exact-key templates carry the whole encoded key; split it back into the
// longest known namespace plus parts so CacheKey validation applies.
fn split_key(rendered: &str) -> CacheResult<(&str, Vec<&str>)> {
    use crate::key::ns;

    let namespace = ns::ALL
        .iter()
        .filter(|candidate| {
            rendered
                .strip_prefix(**candidate)
                .is_some_and(|rest| rest.starts_with(DELIMITER))
        })
        .max_by_key(|candidate| candidate.len())
        .copied()
        .ok_or_else(|| {
            CacheError::misuse(format!("key template `{rendered}` has no known namespace"))
        })?;
    let parts: Vec<&str> = rendered[namespace.len() + 1..]
        .split(DELIMITER)
        .collect();
    Ok((namespace, parts))
}

// ============================================================================
// InvalidationMap
// ============================================================================

/// Table from entity kind to the eviction targets it owns.
#[derive(Debug, Clone)]
pub struct InvalidationMap {
    entries: Vec<(EntityKind, &'static [Target])>,
}

impl InvalidationMap {
    pub fn new(entries: Vec<(EntityKind, &'static [Target])>) -> Self {
        Self { entries }
    }

    pub fn targets(&self, entity: EntityKind) -> &[Target] {
        self.entries
            .iter()
            .find(|(kind, _)| *kind == entity)
            .map(|(_, targets)| *targets)
            .unwrap_or(&[])
    }

    pub fn entries(&self) -> impl Iterator<Item = (EntityKind, &[Target])> {
        self.entries
            .iter()
            .map(|(kind, targets)| (*kind, *targets))
    }
}

static STORY_TARGETS: &[Target] = &[
    Target::Key("story:{id}"),
    Target::Pattern("story:{id}:*"),
    Target::Pattern("stories:*"),
    Target::Pattern("admin:stories:*"),
    Target::Key("relatedStories:{id}"),
    Target::Pattern("analytics:story:{id}:*"),
];

static PUBLICATION_TARGETS: &[Target] = &[
    Target::Key("publication:{id}"),
    Target::Pattern("publication:{id}:*"),
    Target::Pattern("publications:*"),
    Target::Pattern("analytics:publication:{id}:*"),
];

static USER_TARGETS: &[Target] = &[
    Target::Key("user:{id}"),
    Target::Pattern("user:{id}:*"),
    Target::Key("analytics:dashboard:{id}"),
    Target::Pattern("analytics:earnings:{id}:*"),
];

static COMMENTS_TARGETS: &[Target] = &[
    // Comment writes also refresh the story's cached stats view.
    Target::Pattern("story_comments:{id}:*"),
    Target::Key("story:{id}:stats"),
];

static MEDIA_TARGETS: &[Target] = &[Target::Pattern("media:{id}:*")];

static NOTIFICATIONS_TARGETS: &[Target] = &[Target::Pattern("notifications:{id}:*")];

static ACCOUNT_PURGE_TARGETS: &[Target] = &[Target::Pattern("*:{id}:*")];

/// The platform's invalidation table: every namespace prefix each entity's
/// write sites owe an eviction for.
pub static PLATFORM_MAP: Lazy<InvalidationMap> = Lazy::new(|| {
    InvalidationMap::new(vec![
        (EntityKind::Story, STORY_TARGETS),
        (EntityKind::Publication, PUBLICATION_TARGETS),
        (EntityKind::User, USER_TARGETS),
        (EntityKind::Comments, COMMENTS_TARGETS),
        (EntityKind::Media, MEDIA_TARGETS),
        (EntityKind::Notifications, NOTIFICATIONS_TARGETS),
        (EntityKind::AccountPurge, ACCOUNT_PURGE_TARGETS),
    ])
});

// ============================================================================
// Invalidator
// ============================================================================

/// Single entry point write sites call after their mutation commits.
///
/// Evictions are best-effort: a failed target is logged and counted, never
/// returned, because the store-of-record write has already succeeded and at
/// worst a stale entry lives until its TTL.
#[derive(Clone)]
pub struct Invalidator {
    cache: TypedCache,
    map: InvalidationMap,
}

impl Invalidator {
    pub fn new(cache: TypedCache, map: InvalidationMap) -> Self {
        Self { cache, map }
    }

    /// Construct over [`PLATFORM_MAP`].
    pub fn platform(cache: TypedCache) -> Self {
        Self::new(cache, PLATFORM_MAP.clone())
    }

    pub fn map(&self) -> &InvalidationMap {
        &self.map
    }

    /// Evict every target the map declares for `entity`, concurrently.
    /// Returns the number of keys removed across all targets.
    pub async fn invalidate(&self, entity: EntityKind, id: &str) -> u64 {
        counter!(METRIC_INVALIDATION, "entity" => entity.as_str()).increment(1);

        let evictions = self.map.targets(entity).iter().map(|target| async move {
            let removed = match target.render(id) {
                Ok(RenderedTarget::Key(key)) => {
                    self.cache.store().delete(key.as_str()).await.map(u64::from)
                }
                Ok(RenderedTarget::Pattern(pattern)) => {
                    self.cache.evict_pattern(&pattern).await
                }
                Err(err) => {
                    error!(%entity, id, template = target.template(), %err,
                        "invalidation target failed to render");
                    counter!(METRIC_INVALIDATION_FAILURE, "entity" => entity.as_str())
                        .increment(1);
                    return 0;
                }
            };
            match removed {
                Ok(removed) => removed,
                Err(err) => {
                    warn!(%entity, id, template = target.template(), %err,
                        "eviction failed; stale entries persist until TTL");
                    counter!(METRIC_INVALIDATION_FAILURE, "entity" => entity.as_str())
                        .increment(1);
                    0
                }
            }
        });

        let removed: u64 = join_all(evictions).await.into_iter().sum();
        debug!(%entity, id, removed, "invalidation fan-out completed");
        removed
    }

    // ========================================================================
    // Per-entity convenience methods, named after the write sites
    // ========================================================================

    pub async fn story_changed(&self, story_id: &str) -> u64 {
        self.invalidate(EntityKind::Story, story_id).await
    }

    pub async fn publication_changed(&self, publication_id: &str) -> u64 {
        self.invalidate(EntityKind::Publication, publication_id).await
    }

    pub async fn user_changed(&self, user_id: &str) -> u64 {
        self.invalidate(EntityKind::User, user_id).await
    }

    pub async fn comments_changed(&self, story_id: &str) -> u64 {
        self.invalidate(EntityKind::Comments, story_id).await
    }

    pub async fn media_changed(&self, media_id: &str) -> u64 {
        self.invalidate(EntityKind::Media, media_id).await
    }

    pub async fn notifications_changed(&self, user_id: &str) -> u64 {
        self.invalidate(EntityKind::Notifications, user_id).await
    }

    /// Scrub one identifier from every namespace. The broadest fan-out the
    /// platform issues; used for full-account deletion.
    pub async fn account_purged(&self, user_id: &str) -> u64 {
        self.invalidate(EntityKind::AccountPurge, user_id).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::backend::MemoryBackend;
    use crate::key::ns;
    use crate::store::CacheStore;

    use super::*;

    fn invalidator() -> Invalidator {
        let cache = TypedCache::new(CacheStore::new(
            Arc::new(MemoryBackend::new()),
            Duration::from_millis(250),
            64,
        ));
        Invalidator::platform(cache)
    }

    #[test]
    fn targets_render_with_the_entity_id() {
        let key = Target::Key("story:{id}").render("s-1").unwrap();
        assert_eq!(
            key,
            RenderedTarget::Key(CacheKey::new(ns::STORY, &["s-1"]).unwrap())
        );

        let pattern = Target::Pattern("story:{id}:*").render("s-1").unwrap();
        assert_eq!(
            pattern,
            RenderedTarget::Pattern(KeyPattern::raw("story:s-1:*").unwrap())
        );
    }

    #[test]
    fn compound_namespace_key_templates_split_correctly() {
        let rendered = Target::Key("analytics:dashboard:{id}").render("u-1").unwrap();
        assert_eq!(
            rendered,
            RenderedTarget::Key(CacheKey::new(ns::ANALYTICS_DASHBOARD, &["u-1"]).unwrap())
        );
    }

    #[test]
    fn hostile_ids_fail_to_render() {
        assert!(Target::Key("story:{id}").render("a:b").is_err());
        assert!(Target::Pattern("story:{id}:*").render("*").is_err());
        assert!(Target::Pattern("story:{id}:*").render("").is_err());
    }

    #[test]
    fn bare_key_is_not_covered_by_its_pattern() {
        // The reason the map carries both forms.
        assert!(!Target::Pattern("story:{id}:*").covers("1", "story:1"));
        assert!(Target::Key("story:{id}").covers("1", "story:1"));
        assert!(Target::Pattern("story:{id}:*").covers("1", "story:1:stats"));
    }

    #[tokio::test]
    async fn story_fan_out_clears_every_declared_view() {
        let invalidator = invalidator();
        let cache = TypedCache::new(invalidator.cache.store().clone());

        cache.set(ns::STORY, &["s-1"], &"body", None).await.unwrap();
        cache
            .set(ns::STORY, &["s-1", "stats"], &"stats", None)
            .await
            .unwrap();
        cache
            .set(ns::STORIES, &["recent", "1"], &"page", None)
            .await
            .unwrap();
        cache
            .set(ns::ADMIN_STORIES, &["pending", "1"], &"queue", None)
            .await
            .unwrap();
        cache
            .set(ns::RELATED_STORIES, &["s-1"], &"related", None)
            .await
            .unwrap();
        // A different story's view survives the fan-out.
        cache.set(ns::STORY, &["s-2"], &"other", None).await.unwrap();

        let removed = invalidator.story_changed("s-1").await;
        assert_eq!(removed, 5);

        let survivor: Option<String> = cache.get(ns::STORY, &["s-2"]).await.unwrap();
        assert_eq!(survivor.as_deref(), Some("other"));
    }

    #[tokio::test]
    async fn account_purge_scrubs_across_namespaces() {
        let invalidator = invalidator();
        let cache = TypedCache::new(invalidator.cache.store().clone());

        cache
            .set(ns::USER, &["u-9", "drafts"], &"drafts", None)
            .await
            .unwrap();
        cache
            .set(ns::NOTIFICATIONS, &["u-9", "unread"], &"feed", None)
            .await
            .unwrap();
        cache
            .set(ns::ANALYTICS_EARNINGS, &["u-9", "2026-08"], &"sum", None)
            .await
            .unwrap();
        cache
            .set(ns::USER, &["u-8", "drafts"], &"other", None)
            .await
            .unwrap();

        let removed = invalidator.account_purged("u-9").await;
        assert_eq!(removed, 3);

        let survivor: Option<String> = cache.get(ns::USER, &["u-8", "drafts"]).await.unwrap();
        assert!(survivor.is_some());
    }

    #[tokio::test]
    async fn fan_out_over_empty_cache_is_harmless() {
        let invalidator = invalidator();
        assert_eq!(invalidator.publication_changed("p-1").await, 0);
        assert_eq!(invalidator.media_changed("m-1").await, 0);
    }
}
