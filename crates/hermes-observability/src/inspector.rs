//! Pipeline inspection.
//!
//! The inspector turns a pipeline's [`PipelineSnapshot`] into human-readable
//! diagnostics: an ASCII diagram of the chain and a structural diff between
//! two snapshots (additions, removals and order moves).

use hermes_middleware::{DynPipeline, PipelineSnapshot};
use serde::Serialize;

/// Renders and compares pipeline snapshots.
pub struct PipelineInspector;

impl PipelineInspector {
    /// Takes a snapshot of a pipeline's current composition.
    #[must_use]
    pub fn snapshot(pipeline: &dyn DynPipeline) -> PipelineSnapshot {
        pipeline.describe()
    }

    /// Renders the chain as an ASCII diagram:
    ///
    /// ```text
    /// [AddNumbers] → validation → logging → [AddNumbersHandler] → [Result]
    /// ```
    #[must_use]
    pub fn render(snapshot: &PipelineSnapshot) -> String {
        let mut parts = Vec::with_capacity(snapshot.middleware.len() + 3);
        parts.push(format!("[{}]", last_segment(&snapshot.command)));
        for descriptor in &snapshot.middleware {
            parts.push(descriptor.name.clone());
        }
        parts.push(format!("[{}]", last_segment(&snapshot.handler)));
        parts.push("[Result]".to_string());
        parts.join(" → ")
    }

    /// Compares two snapshots and reports composition changes.
    #[must_use]
    pub fn compare(before: &PipelineSnapshot, after: &PipelineSnapshot) -> SnapshotDiff {
        let before_names: Vec<&str> = before.middleware.iter().map(|m| m.name.as_str()).collect();
        let after_names: Vec<&str> = after.middleware.iter().map(|m| m.name.as_str()).collect();

        let added = after_names
            .iter()
            .filter(|name| !before_names.contains(name))
            .map(ToString::to_string)
            .collect();
        let removed = before_names
            .iter()
            .filter(|name| !after_names.contains(name))
            .map(ToString::to_string)
            .collect();

        // Order moves are computed over the common subsequence so that pure
        // insertions and removals do not read as reorderings.
        let common_before: Vec<&str> = before_names
            .iter()
            .filter(|name| after_names.contains(name))
            .copied()
            .collect();
        let common_after: Vec<&str> = after_names
            .iter()
            .filter(|name| before_names.contains(name))
            .copied()
            .collect();

        let moved = common_before
            .iter()
            .enumerate()
            .filter_map(|(from, name)| {
                let to = common_after.iter().position(|n| n == name)?;
                (to != from).then(|| OrderChange {
                    name: (*name).to_string(),
                    from,
                    to,
                })
            })
            .collect();

        SnapshotDiff {
            added,
            removed,
            moved,
        }
    }
}

/// Composition changes between two pipeline snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotDiff {
    /// Middleware present only in the newer snapshot.
    pub added: Vec<String>,
    /// Middleware present only in the older snapshot.
    pub removed: Vec<String>,
    /// Middleware whose relative position changed.
    pub moved: Vec<OrderChange>,
}

impl SnapshotDiff {
    /// Returns `true` when the compositions are identical.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.moved.is_empty()
    }
}

/// One middleware whose position changed between snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderChange {
    /// The middleware's name.
    pub name: String,
    /// Position among the common middleware in the older snapshot.
    pub from: usize,
    /// Position among the common middleware in the newer snapshot.
    pub to: usize,
}

/// Strips the module path off a fully qualified type name.
fn last_segment(type_name: &str) -> &str {
    type_name.rsplit("::").next().unwrap_or(type_name)
}
