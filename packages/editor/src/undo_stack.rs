//! # Undo/Redo Stack
//!
//! Tracks mutation history and enables undo/redo operations.
//!
//! ## Design
//!
//! - Each mutation returns its inverse when applied
//! - Undo applies the inverses; the inverses *they* return become the redo step
//! - Redo works the same way in the other direction, so both stacks hold
//!   batches of the same shape
//! - New mutations clear the redo stack
//! - Supports batched operations (group multiple mutations as one undo step)
//!
//! Replaying a step is best-effort: another edit (or a rebase onto remote
//! changes) may have made part of it impossible. Those mutations are skipped
//! with a warning and the rest still applies.
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut stack = UndoStack::new();
//! stack.apply(&mutation, &mut data, &registry)?;
//! stack.undo(&mut data, &registry);
//! stack.redo(&mut data, &registry);
//! ```

use crate::components::ComponentRegistry;
use crate::errors::MutationResult;
use crate::mutations::Mutation;
use tracing::warn;
use trellis_data::ProjectData;

/// A group of mutations that should be undone/redone together
#[derive(Debug, Clone, PartialEq)]
pub struct MutationBatch {
    /// The mutations that produced the current state (in application order)
    pub mutations: Vec<Mutation>,

    /// Mutations that revert this batch, in the order they are applied
    pub inverses: Vec<Mutation>,

    /// Optional description of this batch
    pub description: Option<String>,
}

impl MutationBatch {
    /// Create a single-mutation batch
    pub fn single(mutation: Mutation, inverses: Vec<Mutation>) -> Self {
        Self {
            mutations: vec![mutation],
            inverses,
            description: None,
        }
    }

    /// Create a batch from multiple mutations
    pub fn from_mutations(mutations: Vec<Mutation>, inverses: Vec<Mutation>) -> Self {
        Self {
            mutations,
            inverses,
            description: None,
        }
    }

    /// Add a description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Record `mutation`, whose `inverses` must run before the earlier ones
    pub fn record(&mut self, mutation: Mutation, mut inverses: Vec<Mutation>) {
        self.mutations.push(mutation);
        inverses.append(&mut self.inverses);
        self.inverses = inverses;
    }
}

/// Apply `mutations` in order, returning what reverts them
fn replay(
    mutations: &[Mutation],
    data: &mut ProjectData,
    registry: &ComponentRegistry,
) -> Vec<Mutation> {
    let mut reverts: Vec<Mutation> = Vec::new();
    for mutation in mutations {
        match mutation.apply(data, registry) {
            Ok(mut inverses) => {
                inverses.append(&mut reverts);
                reverts = inverses;
            }
            Err(err) => {
                warn!(error = %err, mutation = mutation.description(), "Skipping mutation that no longer applies");
            }
        }
    }
    reverts
}

/// Undo/redo stack for project editing
#[derive(Debug)]
pub struct UndoStack {
    /// Stack of applied batches (most recent last)
    undo_stack: Vec<MutationBatch>,

    /// Stack of undone batches (most recent last)
    redo_stack: Vec<MutationBatch>,

    /// Maximum number of undo levels (0 = unlimited)
    max_levels: usize,

    /// Currently building a batch
    current_batch: Option<MutationBatch>,
}

impl UndoStack {
    /// Create a new undo stack with default max levels (100)
    pub fn new() -> Self {
        Self::with_max_levels(100)
    }

    /// Create an undo stack with custom max levels
    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_levels,
            current_batch: None,
        }
    }

    /// Apply a mutation and record it for undo
    pub fn apply(
        &mut self,
        mutation: &Mutation,
        data: &mut ProjectData,
        registry: &ComponentRegistry,
    ) -> MutationResult<()> {
        let inverses = mutation.apply(data, registry)?;

        if let Some(batch) = &mut self.current_batch {
            batch.record(mutation.clone(), inverses);
        } else {
            self.push_batch(MutationBatch::single(mutation.clone(), inverses));
        }

        Ok(())
    }

    /// Start a batch of mutations (will be undone/redone together)
    pub fn begin_batch(&mut self) {
        self.current_batch = Some(MutationBatch::from_mutations(Vec::new(), Vec::new()));
    }

    /// End the current batch and push to undo stack
    pub fn end_batch(&mut self) {
        if let Some(batch) = self.current_batch.take() {
            if !batch.mutations.is_empty() {
                self.push_batch(batch);
            }
        }
    }

    /// Set description for current batch (if batching)
    pub fn set_batch_description(&mut self, description: impl Into<String>) {
        if let Some(batch) = &mut self.current_batch {
            batch.description = Some(description.into());
        }
    }

    /// Push a batch to the undo stack
    pub fn push_batch(&mut self, batch: MutationBatch) {
        self.undo_stack.push(batch);

        if self.max_levels > 0 && self.undo_stack.len() > self.max_levels {
            self.undo_stack.remove(0);
        }

        // New action invalidates the redo history
        self.redo_stack.clear();
    }

    /// Undo the most recent batch; `false` when there is nothing to undo
    pub fn undo(&mut self, data: &mut ProjectData, registry: &ComponentRegistry) -> bool {
        let Some(batch) = self.undo_stack.pop() else {
            return false;
        };

        let reverts = replay(&batch.inverses, data, registry);
        self.redo_stack.push(MutationBatch {
            mutations: batch.inverses,
            inverses: reverts,
            description: batch.description,
        });
        true
    }

    /// Redo the most recently undone batch; `false` when there is nothing to redo
    pub fn redo(&mut self, data: &mut ProjectData, registry: &ComponentRegistry) -> bool {
        let Some(batch) = self.redo_stack.pop() else {
            return false;
        };

        let reverts = replay(&batch.inverses, data, registry);
        self.undo_stack.push(MutationBatch {
            mutations: batch.inverses,
            inverses: reverts,
            description: batch.description,
        });
        true
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Check if redo is available
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_levels(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_levels(&self) -> usize {
        self.redo_stack.len()
    }

    /// Batch the next undo would revert
    pub fn last_done(&self) -> Option<&MutationBatch> {
        self.undo_stack.last()
    }

    /// Batch the next redo would reapply
    pub fn last_undone(&self) -> Option<&MutationBatch> {
        self.redo_stack.last()
    }

    /// Clear all undo/redo history
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.current_batch = None;
    }

    /// Get description of the next undo operation
    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack
            .last()
            .and_then(|batch| batch.description.as_deref())
    }

    /// Get description of the next redo operation
    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack
            .last()
            .and_then(|batch| batch.description.as_deref())
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use trellis_data::{Instance, InstanceChild};

    fn data() -> ProjectData {
        let mut data = ProjectData::new();
        Arc::make_mut(&mut data.instances).insert(
            "body".into(),
            Instance::new("body", "Body").with_children(vec![InstanceChild::id("box")]),
        );
        Arc::make_mut(&mut data.instances).insert("box".into(), Instance::new("box", "Box"));
        data
    }

    fn rename(label: &str) -> Mutation {
        Mutation::SetInstanceLabel {
            instance_id: "box".into(),
            label: Some(label.into()),
        }
    }

    fn label(data: &ProjectData) -> Option<&str> {
        data.instance("box").and_then(|box_| box_.label.as_deref())
    }

    #[test]
    fn test_undo_stack_creation() {
        let stack = UndoStack::new();
        assert_eq!(stack.undo_levels(), 0);
        assert_eq!(stack.redo_levels(), 0);
        assert!(!stack.can_undo());
        assert!(!stack.can_redo());
    }

    #[test]
    fn test_apply_undo_redo() {
        let registry = ComponentRegistry::default();
        let mut data = data();
        let mut stack = UndoStack::new();

        stack.apply(&rename("Hero"), &mut data, &registry).unwrap();
        assert_eq!(label(&data), Some("Hero"));

        assert!(stack.undo(&mut data, &registry));
        assert_eq!(label(&data), None);
        assert_eq!(stack.redo_levels(), 1);

        assert!(stack.redo(&mut data, &registry));
        assert_eq!(label(&data), Some("Hero"));
        assert_eq!(stack.undo_levels(), 1);
        assert_eq!(stack.redo_levels(), 0);

        // Redo produced a fresh inverse, so the step can be undone again
        assert!(stack.undo(&mut data, &registry));
        assert_eq!(label(&data), None);
    }

    #[test]
    fn test_batched_mutations() {
        let registry = ComponentRegistry::default();
        let mut data = data();
        let mut stack = UndoStack::new();

        stack.begin_batch();
        stack.set_batch_description("Rename twice");
        stack.apply(&rename("One"), &mut data, &registry).unwrap();
        stack.apply(&rename("Two"), &mut data, &registry).unwrap();
        stack.end_batch();

        assert_eq!(stack.undo_levels(), 1);
        assert_eq!(stack.undo_description(), Some("Rename twice"));

        stack.undo(&mut data, &registry);
        assert_eq!(label(&data), None);
    }

    #[test]
    fn test_new_mutation_clears_redo() {
        let registry = ComponentRegistry::default();
        let mut data = data();
        let mut stack = UndoStack::new();

        stack.apply(&rename("One"), &mut data, &registry).unwrap();
        stack.undo(&mut data, &registry);
        assert_eq!(stack.redo_levels(), 1);

        stack.apply(&rename("Two"), &mut data, &registry).unwrap();
        assert_eq!(stack.redo_levels(), 0);
    }

    #[test]
    fn test_max_levels_enforced() {
        let registry = ComponentRegistry::default();
        let mut data = data();
        let mut stack = UndoStack::with_max_levels(2);

        for i in 0..3 {
            stack
                .apply(&rename(&format!("Label {}", i)), &mut data, &registry)
                .unwrap();
        }

        assert_eq!(stack.undo_levels(), 2);
    }

    #[test]
    fn test_failed_mutation_is_not_recorded() {
        let registry = ComponentRegistry::default();
        let mut data = data();
        let mut stack = UndoStack::new();

        let mutation = Mutation::DeleteInstance {
            instance_id: "missing".into(),
        };
        assert!(stack.apply(&mutation, &mut data, &registry).is_err());
        assert!(!stack.can_undo());
    }

    #[test]
    fn test_undo_skips_stale_inverses() {
        let registry = ComponentRegistry::default();
        let mut data = data();
        let mut stack = UndoStack::new();

        stack.apply(&rename("Hero"), &mut data, &registry).unwrap();
        // Simulate a remote delete the local history does not know about
        Arc::make_mut(&mut data.instances).remove("box");

        assert!(stack.undo(&mut data, &registry));
        assert_eq!(stack.redo_levels(), 1);
    }
}
