//! # Trellis Editor
//!
//! Editing engine for trellis projects.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ canvas / panels / keyboard                  │
//! │  - drag/drop intents, commands, clipboard   │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ ProjectStores::transaction                  │
//! │  - mutations validate, apply, return        │
//! │    their inverses (undo ledger)             │
//! │  - delete cascades through post-effects     │
//! │  - variables rebound after moves/inserts    │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ commit                                      │
//! │  - one notification per changed store       │
//! │  - ChangeSet queued for persistence         │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Stores are the source of truth**: subscribers only ever see committed data
//! 2. **Transactions are atomic**: an `Err` from the mutator leaves no trace
//! 3. **Every mutation knows its inverse**: undo replays inverses, redo replays theirs
//! 4. **Optimistic clients**: pending change sets can be rebased onto server data
//!
//! ## Usage
//!
//! ```rust,ignore
//! use trellis_editor::{InsertPosition, ProjectStores};
//!
//! let mut stores = ProjectStores::new(data);
//! stores.subscribe(&[StoreKind::Instances], |data| redraw(data));
//!
//! stores.transaction(|tx| {
//!     tx.reparent_instance("card", "sidebar", InsertPosition::End)?;
//!     rebind_tree_variables(tx, "card")?;
//!     Ok::<_, MutationError>(())
//! })?;
//!
//! stores.undo();
//! ```

mod clipboard;
mod clone;
mod components;
mod drag_drop;
mod errors;
mod fragment;
mod integrity;
mod mutations;
mod post_effects;
mod session;
mod stores;
mod tree;
mod undo_stack;
mod variables;

pub use clipboard::{copy_instance, parse_clipboard, paste, serialize_clipboard, CLIPBOARD_VERSION};
pub use clone::{clone_fragment, clone_instance, IdMap};
pub use components::{ComponentMeta, ComponentRegistry};
pub use drag_drop::{
    apply_command, apply_intent, duplicate_instance, resolve_drop_target, DragDropIntent,
    DropTarget, EditorCommand, IntentOutcome,
};
pub use errors::{EditorError, MutationError, MutationResult};
pub use fragment::{extract_fragment, extract_fragment_with_tokens, Fragment};
pub use integrity::{
    find_orphans, remove_orphans, validate_project, validate_snapshot, IntegrityIssue, IssueLevel,
};
pub use mutations::{InsertPosition, Mutation};
pub use post_effects::{
    CascadeDataSources, CascadeProps, CascadeResources, CascadeStyles, PostEffect,
    PostEffectEngine,
};
pub use session::{EditSession, PendingChange};
pub use stores::{id_in_use, Commit, ProjectStores, SubscriptionId, Transaction};
pub use tree::{
    collect_subtree_ids, find_closest_accepting_parent, find_closest_sibling_instance,
    find_instance_by_id, find_parent_instance, find_subtree, is_descendant_or_self, Subtree,
    TreeIndex,
};
pub use undo_stack::{MutationBatch, UndoStack};
pub use variables::{
    compute_variable_values, find_available_variables, find_masked_variables,
    find_shadowed_variables, find_unset_variable_names, rebind_tree_variables, variable_value,
    ScopeChain,
};
