//! # Edit Session Management
//!
//! Tracks one client's editing state: the live stores, the selection and
//! the change sets the server has not acknowledged yet.
//!
//! Local edits are optimistic. Each committed transaction becomes a
//! [`PendingChange`] until the server confirms or rejects it. The session
//! also keeps the last server-acknowledged data (`base`) so that it can
//! rebuild the local view as `base + pending` at any time:
//!
//! ```text
//! confirm(id)  base += change, pending -= change
//! reject(id)   pending -= change, local = base + pending
//! rebase(srv)  base = srv, local = base + pending (dropping what no longer applies)
//! ```

use crate::components::ComponentRegistry;
use crate::errors::EditorError;
use crate::mutations::Mutation;
use crate::stores::{Commit, ProjectStores, Transaction};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, info, warn};
use trellis_data::{ChangeSet, ProjectData};

/// Change set waiting for server acknowledgment
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChange {
    pub change_set_id: String,

    /// Mutations of the transaction, in application order
    pub mutations: Vec<Mutation>,

    pub timestamp: DateTime<Utc>,
}

/// Single edit session (one client of a project)
#[derive(Debug)]
pub struct EditSession {
    /// Unique session identifier
    pub id: String,

    stores: ProjectStores,

    /// Last data acknowledged by the server
    base: ProjectData,

    /// Selected instance ids
    selection: Vec<String>,

    pending: Vec<PendingChange>,
}

/// Apply a whole change to `data`, or nothing of it
fn apply_change(
    data: &ProjectData,
    mutations: &[Mutation],
    registry: &ComponentRegistry,
) -> Result<ProjectData, EditorError> {
    let mut next = data.clone();
    for mutation in mutations {
        mutation.apply(&mut next, registry)?;
    }
    Ok(next)
}

impl EditSession {
    /// Create new edit session
    pub fn new(id: impl Into<String>, data: ProjectData) -> Self {
        let id = id.into();
        let stores = ProjectStores::new(data.clone()).with_client_id(&id);
        Self::with_stores(id, stores)
    }

    /// Session around preconfigured stores; their data is taken as acknowledged
    pub fn with_stores(id: impl Into<String>, stores: ProjectStores) -> Self {
        Self {
            id: id.into(),
            base: stores.data().clone(),
            stores,
            selection: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn stores(&self) -> &ProjectStores {
        &self.stores
    }

    /// Direct access for edits that must not be tracked as pending (tests, tooling)
    pub fn stores_mut(&mut self) -> &mut ProjectStores {
        &mut self.stores
    }

    pub fn data(&self) -> &ProjectData {
        self.stores.data()
    }

    pub fn base(&self) -> &ProjectData {
        &self.base
    }

    fn track(&mut self, commit: Commit) {
        if let Some(change_set_id) = commit.change_set_id {
            debug!(session = %self.id, change_set_id, "Change pending");
            self.pending.push(PendingChange {
                change_set_id,
                mutations: commit.mutations,
                timestamp: Utc::now(),
            });
        }
    }

    /// Run a transaction optimistically; the commit becomes pending
    pub fn transaction<T, E>(
        &mut self,
        mutator: impl FnOnce(&mut Transaction<'_>) -> Result<T, E>,
    ) -> Result<T, E> {
        let (value, commit) = self.stores.run_transaction(mutator)?;
        self.track(commit);
        Ok(value)
    }

    pub fn apply(&mut self, mutation: Mutation) -> Result<(), EditorError> {
        self.transaction(|tx| tx.apply(mutation))?;
        Ok(())
    }

    pub fn undo(&mut self) -> bool {
        match self.stores.undo_commit() {
            Some(commit) => {
                self.track(commit);
                self.prune_selection();
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.stores.redo_commit() {
            Some(commit) => {
                self.track(commit);
                self.prune_selection();
                true
            }
            None => false,
        }
    }

    /// The server accepted a change set
    pub fn confirm(&mut self, change_set_id: &str) -> Result<(), EditorError> {
        let position = self
            .pending
            .iter()
            .position(|change| change.change_set_id == change_set_id)
            .ok_or_else(|| EditorError::UnknownChangeSet(change_set_id.to_string()))?;
        let change = self.pending.remove(position);

        match apply_change(&self.base, &change.mutations, self.stores.registry()) {
            Ok(base) => self.base = base,
            // The server holds the truth; the next rebase resyncs base
            Err(err) => warn!(error = %err, change_set_id, "Confirmed change does not apply to base"),
        }
        Ok(())
    }

    /// The server refused a change set: drop it and rebuild the local view
    pub fn reject(&mut self, change_set_id: &str) -> Result<(), EditorError> {
        let position = self
            .pending
            .iter()
            .position(|change| change.change_set_id == change_set_id)
            .ok_or_else(|| EditorError::UnknownChangeSet(change_set_id.to_string()))?;
        self.pending.remove(position);
        info!(session = %self.id, change_set_id, "Change rejected");
        self.drop_from_outbox(&HashSet::from([change_set_id.to_string()]));
        self.rebuild();
        Ok(())
    }

    /// Adopt the server's data and replay pending changes on top of it
    ///
    /// Returns how many pending changes were dropped because they no
    /// longer apply (e.g. their instance was deleted remotely).
    pub fn rebase(&mut self, server: ProjectData) -> usize {
        self.base = server;
        self.rebuild()
    }

    fn rebuild(&mut self) -> usize {
        let registry = self.stores.registry();
        let mut data = self.base.clone();
        let mut kept = Vec::with_capacity(self.pending.len());
        let mut dropped: HashSet<String> = HashSet::new();

        for change in std::mem::take(&mut self.pending) {
            match apply_change(&data, &change.mutations, registry) {
                Ok(next) => {
                    data = next;
                    kept.push(change);
                }
                Err(err) => {
                    warn!(error = %err, change_set_id = %change.change_set_id, "Dropping pending change");
                    dropped.insert(change.change_set_id);
                }
            }
        }
        self.pending = kept;

        if !dropped.is_empty() {
            self.drop_from_outbox(&dropped);
        }

        self.stores.reset(data);
        self.prune_selection();
        dropped.len()
    }

    fn drop_from_outbox(&mut self, change_set_ids: &HashSet<String>) {
        let outbox: Vec<ChangeSet> = self
            .stores
            .take_outbox()
            .into_iter()
            .filter(|change_set| !change_set_ids.contains(&change_set.id))
            .collect();
        self.stores.requeue(outbox);
    }

    fn prune_selection(&mut self) {
        let instances = &self.stores.data().instances;
        self.selection.retain(|id| instances.contains_key(id));
    }

    /// Update selection; unknown ids are ignored
    pub fn set_selection(&mut self, instance_ids: Vec<String>) {
        self.selection = instance_ids;
        self.prune_selection();
    }

    pub fn selection(&self) -> &[String] {
        &self.selection
    }

    /// Get number of pending changes
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pending(&self) -> &[PendingChange] {
        &self.pending
    }

    /// Change sets to persist, oldest first
    pub fn take_outbox(&mut self) -> Vec<ChangeSet> {
        self.stores.take_outbox()
    }

    pub fn requeue(&mut self, change_sets: Vec<ChangeSet>) {
        self.stores.requeue(change_sets);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutations::InsertPosition;
    use std::sync::Arc;
    use trellis_data::{Instance, InstanceChild};

    fn data() -> ProjectData {
        let mut data = ProjectData::new();
        let instances = Arc::make_mut(&mut data.instances);
        instances.insert(
            "body".into(),
            Instance::new("body", "Body")
                .with_children(vec![InstanceChild::id("box"), InstanceChild::id("text")]),
        );
        instances.insert("box".into(), Instance::new("box", "Box"));
        instances.insert("text".into(), Instance::new("text", "Text"));
        data
    }

    fn label(id: &str, label: &str) -> Mutation {
        Mutation::SetInstanceLabel {
            instance_id: id.into(),
            label: Some(label.into()),
        }
    }

    #[test]
    fn test_session_creation() {
        let session = EditSession::new("client-1", data());
        assert_eq!(session.id, "client-1");
        assert_eq!(session.pending_count(), 0);
        assert!(session.selection().is_empty());
    }

    #[test]
    fn test_optimistic_changes_are_pending() {
        let mut session = EditSession::new("client-1", data());
        session.apply(label("box", "Card")).unwrap();

        assert_eq!(session.pending_count(), 1);
        assert_eq!(session.data().instance("box").unwrap().label.as_deref(), Some("Card"));
        assert!(session.base().instance("box").unwrap().label.is_none());
        assert_eq!(session.take_outbox()[0].id, session.pending()[0].change_set_id);
    }

    #[test]
    fn test_confirm_moves_change_into_base() {
        let mut session = EditSession::new("client-1", data());
        session.apply(label("box", "Card")).unwrap();
        let id = session.pending()[0].change_set_id.clone();

        session.confirm(&id).unwrap();
        assert_eq!(session.pending_count(), 0);
        assert_eq!(session.base().instance("box").unwrap().label.as_deref(), Some("Card"));
        assert!(matches!(session.confirm(&id), Err(EditorError::UnknownChangeSet(_))));
    }

    #[test]
    fn test_reject_rebuilds_from_remaining_changes() {
        let mut session = EditSession::new("client-1", data());
        session.apply(label("box", "Card")).unwrap();
        session.apply(label("text", "Title")).unwrap();
        let first = session.pending()[0].change_set_id.clone();

        session.reject(&first).unwrap();
        assert_eq!(session.pending_count(), 1);
        assert!(session.data().instance("box").unwrap().label.is_none());
        assert_eq!(session.data().instance("text").unwrap().label.as_deref(), Some("Title"));
        // The rejected change set is no longer queued for saving
        let outbox = session.take_outbox();
        assert_eq!(outbox.len(), 1);
        assert_ne!(outbox[0].id, first);
    }

    #[test]
    fn test_rebase_drops_changes_that_no_longer_apply() {
        let mut session = EditSession::new("client-1", data());
        session.set_selection(vec!["box".into()]);
        session.apply(label("box", "Card")).unwrap();
        session
            .transaction(|tx| {
                tx.insert_instance(
                    crate::fragment::Fragment {
                        children: vec![InstanceChild::id("new")],
                        instances: vec![Instance::new("new", "Text")],
                        ..Default::default()
                    },
                    "body",
                    InsertPosition::End,
                );
                Ok::<_, EditorError>(())
            })
            .unwrap();

        // Someone else deleted "box"
        let mut server = data();
        Arc::make_mut(&mut server.instances).remove("box");
        Arc::make_mut(&mut server.instances)
            .get_mut("body")
            .unwrap()
            .children = vec![InstanceChild::id("text")];

        let dropped = session.rebase(server);
        assert_eq!(dropped, 1);
        assert_eq!(session.pending_count(), 1);
        assert!(session.data().instance("new").is_some());
        assert!(session.selection().is_empty());
    }

    #[test]
    fn test_undo_is_tracked_as_a_change() {
        let mut session = EditSession::new("client-1", data());
        session.apply(label("box", "Card")).unwrap();
        assert!(session.undo());
        assert_eq!(session.pending_count(), 2);
        assert!(session.data().instance("box").unwrap().label.is_none());

        // Confirming both leaves base unchanged overall
        let ids: Vec<_> = session.pending().iter().map(|c| c.change_set_id.clone()).collect();
        for id in ids {
            session.confirm(&id).unwrap();
        }
        assert!(session.base().instance("box").unwrap().label.is_none());
    }
}
