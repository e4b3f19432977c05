//! Conformance checks between the invalidation map and produced key shapes.
//!
//! The failure class this exists for: a write site evicts `story:<id>` while
//! the read path caches under `story:<id>:meta`, and the eviction is a no-op
//! forever. Every shape a read path `set`s is declared in the catalog below;
//! [`verify`] fails any invalidation target that matches none of them, and
//! [`orphan_shapes`] lists shapes no target covers, which must stay limited
//! to namespaces bounded by TTL alone.

use crate::invalidation::{EntityKind, InvalidationMap, Target};

/// Identifier substituted for every `{placeholder}` when probing templates.
/// One token for all placeholders, so a key template and a shape template
/// that differ only in placeholder naming still compare equal.
const PROBE: &str = "cnf0";

/// Key-shape templates produced by the platform's read-path `set` calls,
/// one per distinct `(namespace, arity, qualifier)` combination.
pub const PRODUCED_SHAPES: &[&str] = &[
    "story:{id}",
    "story:{id}:stats",
    "story:{id}:versions",
    "stories:recent:{page}",
    "stories:tag:{tag}:{page}",
    "publication:{id}",
    "publication:{id}:stories:{page}",
    "publications:featured:{page}",
    "user:{id}",
    "user:{id}:drafts",
    "user:{id}:published:{page}",
    "admin:settings",
    "admin:stories:pending:{page}",
    "analytics:story:{id}:daily",
    "analytics:dashboard:{userId}",
    "analytics:publication:{id}:summary",
    "analytics:earnings:{userId}:{month}",
    "notifications:{userId}:unread",
    "story_comments:{storyId}:{page}",
    "relatedStories:{storyId}",
    "system:health",
    "media:{id}:metadata",
];

/// An invalidation target that matches no produced key shape: evicting it is
/// a no-op, so either the target or the missing `set` call site is a bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Violation {
    pub entity: EntityKind,
    pub template: &'static str,
}

/// Replace every `{placeholder}` with the probe token.
fn render_probe(template: &str) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        match rest[open..].find('}') {
            Some(close) => {
                rendered.push_str(PROBE);
                rest = &rest[open + close + 1..];
            }
            None => {
                rendered.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    rendered.push_str(rest);
    rendered
}

fn target_covers_shape(target: &Target, shape: &str) -> bool {
    target.covers(PROBE, &render_probe(shape))
}

/// Check every declared target against `shapes`; returns the targets that
/// match nothing. Empty means the map is conformant.
pub fn verify_against(map: &InvalidationMap, shapes: &[&str]) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (entity, targets) in map.entries() {
        for target in targets {
            if !shapes.iter().any(|shape| target_covers_shape(target, shape)) {
                violations.push(Violation {
                    entity,
                    template: target.template(),
                });
            }
        }
    }
    violations
}

/// [`verify_against`] over the platform's [`PRODUCED_SHAPES`].
pub fn verify(map: &InvalidationMap) -> Vec<Violation> {
    verify_against(map, PRODUCED_SHAPES)
}

/// Shapes no declared target would ever evict. These rely on TTL alone for
/// staleness bounds; anything unexpected in this list is a missing target.
pub fn orphan_shapes_against<'s>(map: &InvalidationMap, shapes: &[&'s str]) -> Vec<&'s str> {
    shapes
        .iter()
        .filter(|shape| {
            !map.entries()
                .any(|(_, targets)| targets.iter().any(|t| target_covers_shape(t, shape)))
        })
        .copied()
        .collect()
}

/// [`orphan_shapes_against`] over [`PRODUCED_SHAPES`].
pub fn orphan_shapes(map: &InvalidationMap) -> Vec<&'static str> {
    orphan_shapes_against(map, PRODUCED_SHAPES)
}
