//! # Project Stores
//!
//! The single owner of the live project data. Nothing outside this module
//! gets a mutable reference to the stores: every edit runs inside
//! [`ProjectStores::transaction`] against a draft, and the draft replaces the
//! live data in one step when the mutator returns `Ok`.
//!
//! ```text
//! transaction(mutator)
//!   ├── draft = data.clone()            (stores shared until written)
//!   ├── mutator(&mut Transaction)       (mutations validate, apply, record inverses)
//!   └── Ok  → commit
//!         ├── undo batch
//!         ├── ChangeSet → outbox        (store patches for persistence)
//!         ├── data = draft
//!         └── notify subscribers        (once per changed store)
//!       Err → draft dropped, nothing recorded
//! ```
//!
//! `&mut self` serializes transactions: two transactions can never see each
//! other's drafts.

use crate::components::ComponentRegistry;
use crate::errors::MutationResult;
use crate::fragment::Fragment;
use crate::mutations::{InsertPosition, Mutation};
use crate::undo_stack::{MutationBatch, UndoStack};
use tracing::{debug, error, instrument};
use trellis_data::{
    diff_project, ChangeSet, DataSource, IdGenerator, ProjectData, Prop, Resource, StoreKind,
    StyleDecl,
};

/// Callback invoked with the committed data
pub type Subscriber = Box<dyn FnMut(&ProjectData) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    kinds: Vec<StoreKind>,
    callback: Subscriber,
}

/// A committed transaction
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    /// Id of the change set queued for persistence, if any store changed
    pub change_set_id: Option<String>,
    pub mutations: Vec<Mutation>,
}

/// Draft handed to a transaction mutator
///
/// Individual operations that fail leave the draft as it was for that
/// operation; the rest of the transaction still commits. Returning `Err`
/// from the mutator discards everything.
pub struct Transaction<'a> {
    draft: ProjectData,
    registry: &'a ComponentRegistry,
    batch: MutationBatch,
    ids: &'a mut IdGenerator,
}

impl<'a> Transaction<'a> {
    /// Current state of the draft
    pub fn data(&self) -> &ProjectData {
        &self.draft
    }

    pub fn registry(&self) -> &ComponentRegistry {
        self.registry
    }

    /// Generate an id unused by any store of the draft
    pub fn new_id(&mut self) -> String {
        let draft = &self.draft;
        self.ids.new_unique_id(|id| id_in_use(draft, id))
    }

    pub fn ids_mut(&mut self) -> &mut IdGenerator {
        self.ids
    }

    pub fn describe(&mut self, description: impl Into<String>) {
        self.batch.description = Some(description.into());
    }

    /// Apply a mutation to the draft and record its inverse
    pub fn apply(&mut self, mutation: Mutation) -> MutationResult<()> {
        let inverses = mutation.apply(&mut self.draft, self.registry)?;
        debug!(mutation = mutation.description(), "Applied mutation");
        self.batch.record(mutation, inverses);
        Ok(())
    }

    /// Insert a fragment; `false` (draft unchanged) when the parent is missing or rejects it
    pub fn insert_instance(
        &mut self,
        fragment: Fragment,
        parent_id: &str,
        position: InsertPosition,
    ) -> bool {
        let result = self.apply(Mutation::InsertFragment {
            fragment,
            parent_id: parent_id.to_string(),
            position,
        });
        if let Err(err) = &result {
            debug!(error = %err, parent_id, "Insert skipped");
        }
        result.is_ok()
    }

    pub fn delete_instance(&mut self, instance_id: &str) -> MutationResult<()> {
        self.apply(Mutation::DeleteInstance {
            instance_id: instance_id.to_string(),
        })
    }

    pub fn reparent_instance(
        &mut self,
        instance_id: &str,
        parent_id: &str,
        position: InsertPosition,
    ) -> MutationResult<()> {
        self.apply(Mutation::ReparentInstance {
            instance_id: instance_id.to_string(),
            parent_id: parent_id.to_string(),
            position,
        })
    }

    pub fn set_prop(&mut self, prop: Prop) -> MutationResult<()> {
        self.apply(Mutation::SetProp { prop })
    }

    pub fn put_data_source(&mut self, data_source: DataSource) -> MutationResult<()> {
        self.apply(Mutation::PutDataSource { data_source })
    }

    pub fn put_resource(&mut self, resource: Resource) -> MutationResult<()> {
        self.apply(Mutation::PutResource { resource })
    }

    /// Remove a data source together with the resource it loads
    pub fn delete_variable(&mut self, data_source_id: &str) -> MutationResult<()> {
        let resource_id = self
            .draft
            .data_sources
            .get(data_source_id)
            .and_then(|data_source| data_source.resource_id())
            .map(str::to_string);
        self.apply(Mutation::DeleteDataSource {
            data_source_id: data_source_id.to_string(),
        })?;
        if let Some(resource_id) = resource_id {
            if self.draft.resources.contains_key(&resource_id) {
                self.apply(Mutation::DeleteResource { resource_id })?;
            }
        }
        Ok(())
    }

    pub fn set_style_decl(&mut self, decl: StyleDecl) -> MutationResult<()> {
        self.apply(Mutation::SetStyleDecl { decl })
    }
}

/// Whether any store of `data` already uses `id` as a key
pub fn id_in_use(data: &ProjectData, id: &str) -> bool {
    data.instances.contains_key(id)
        || data.props.contains_key(id)
        || data.data_sources.contains_key(id)
        || data.resources.contains_key(id)
        || data.style_sources.contains_key(id)
        || data.breakpoints.contains_key(id)
        || data.pages.contains_key(id)
}

/// Live project data with transactions, undo/redo and change notification
pub struct ProjectStores {
    data: ProjectData,
    registry: ComponentRegistry,
    undo: UndoStack,
    ids: IdGenerator,
    subscriptions: Vec<Subscription>,
    next_subscription: u64,
    outbox: Vec<ChangeSet>,
    version: u64,
}

impl std::fmt::Debug for ProjectStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectStores")
            .field("version", &self.version)
            .field("subscriptions", &self.subscriptions.len())
            .field("outbox", &self.outbox.len())
            .finish()
    }
}

impl ProjectStores {
    pub fn new(data: ProjectData) -> Self {
        Self::with_registry(data, ComponentRegistry::default())
    }

    pub fn with_registry(data: ProjectData, registry: ComponentRegistry) -> Self {
        Self {
            data,
            registry,
            undo: UndoStack::new(),
            ids: IdGenerator::new("local"),
            subscriptions: Vec::new(),
            next_subscription: 0,
            outbox: Vec::new(),
            version: 0,
        }
    }

    /// Seed generated ids with a client id, so two clients never collide
    pub fn with_client_id(mut self, client_id: &str) -> Self {
        self.ids = IdGenerator::new(client_id);
        self
    }

    pub fn with_undo_levels(mut self, levels: usize) -> Self {
        self.undo = UndoStack::with_max_levels(levels);
        self
    }

    /// Read-only view of the committed data
    pub fn data(&self) -> &ProjectData {
        &self.data
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn undo_stack(&self) -> &UndoStack {
        &self.undo
    }

    pub fn ids_mut(&mut self) -> &mut IdGenerator {
        &mut self.ids
    }

    /// Local version, bumped by every commit that changed a store
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Run `mutator` against a draft and commit it if it returns `Ok`
    pub fn transaction<T, E>(
        &mut self,
        mutator: impl FnOnce(&mut Transaction<'_>) -> Result<T, E>,
    ) -> Result<T, E> {
        self.run_transaction(mutator).map(|(value, _)| value)
    }

    /// Like [`transaction`](Self::transaction), also returning what was committed
    #[instrument(skip_all, fields(version = self.version))]
    pub fn run_transaction<T, E>(
        &mut self,
        mutator: impl FnOnce(&mut Transaction<'_>) -> Result<T, E>,
    ) -> Result<(T, Commit), E> {
        let mut tx = Transaction {
            draft: self.data.clone(),
            registry: &self.registry,
            batch: MutationBatch::from_mutations(Vec::new(), Vec::new()),
            ids: &mut self.ids,
        };
        let value = mutator(&mut tx)?;

        let Transaction { draft, batch, .. } = tx;
        let mutations = batch.mutations.clone();
        if !batch.mutations.is_empty() {
            let description = batch
                .description
                .clone()
                .or_else(|| batch.mutations.first().map(|m| m.description().to_string()));
            self.undo.push_batch(MutationBatch {
                description,
                ..batch
            });
        }
        let change_set_id = self.commit(draft);

        Ok((
            value,
            Commit {
                change_set_id,
                mutations,
            },
        ))
    }

    /// Apply a single mutation as its own transaction
    pub fn apply(&mut self, mutation: Mutation) -> MutationResult<()> {
        self.transaction(|tx| tx.apply(mutation))
    }

    /// Undo the latest transaction; `false` when there is nothing to undo
    pub fn undo(&mut self) -> bool {
        self.undo_commit().is_some()
    }

    pub fn redo(&mut self) -> bool {
        self.redo_commit().is_some()
    }

    /// Undo, returning what was committed
    ///
    /// The commit's mutations are the inverses that were replayed.
    pub fn undo_commit(&mut self) -> Option<Commit> {
        let mut draft = self.data.clone();
        if !self.undo.undo(&mut draft, &self.registry) {
            return None;
        }
        let mutations = self
            .undo
            .last_undone()
            .map(|batch| batch.mutations.clone())
            .unwrap_or_default();
        let change_set_id = self.commit(draft);
        Some(Commit {
            change_set_id,
            mutations,
        })
    }

    pub fn redo_commit(&mut self) -> Option<Commit> {
        let mut draft = self.data.clone();
        if !self.undo.redo(&mut draft, &self.registry) {
            return None;
        }
        let mutations = self
            .undo
            .last_done()
            .map(|batch| batch.mutations.clone())
            .unwrap_or_default();
        let change_set_id = self.commit(draft);
        Some(Commit {
            change_set_id,
            mutations,
        })
    }

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    /// Replace the data wholesale (load or rebase)
    ///
    /// Subscribers are notified, but no change set is queued and undo history
    /// is dropped: the new data did not come from local edits.
    pub fn reset(&mut self, data: ProjectData) {
        let changed = data.changed_stores(&self.data);
        self.data = data;
        self.undo.clear();
        self.notify(&changed);
    }

    /// Subscribe to changes of any store in `kinds`
    ///
    /// The callback runs once per commit that changed at least one of them,
    /// after every store of that commit is in place.
    pub fn subscribe(
        &mut self,
        kinds: &[StoreKind],
        callback: impl FnMut(&ProjectData) + Send + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscriptions.push(Subscription {
            id,
            kinds: kinds.to_vec(),
            callback: Box::new(callback),
        });
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|subscription| subscription.id != id);
        self.subscriptions.len() != before
    }

    /// Change sets committed since the last call, oldest first
    pub fn take_outbox(&mut self) -> Vec<ChangeSet> {
        std::mem::take(&mut self.outbox)
    }

    /// Put change sets back at the front of the outbox (failed save)
    pub fn requeue(&mut self, mut change_sets: Vec<ChangeSet>) {
        change_sets.append(&mut self.outbox);
        self.outbox = change_sets;
    }

    pub fn pending_outbox(&self) -> &[ChangeSet] {
        &self.outbox
    }

    fn commit(&mut self, next: ProjectData) -> Option<String> {
        let changed = next.changed_stores(&self.data);
        if changed.is_empty() {
            self.data = next;
            return None;
        }

        self.version += 1;
        let change_set_id = self.ids.new_id();
        match diff_project(&self.data, &next) {
            Ok(patches) => self.outbox.push(ChangeSet {
                id: change_set_id.clone(),
                version: self.version,
                patches,
            }),
            Err(err) => error!(error = %err, "Cannot encode store patches; change is local only"),
        }

        self.data = next;
        self.notify(&changed);
        Some(change_set_id)
    }

    fn notify(&mut self, changed: &[StoreKind]) {
        if changed.is_empty() {
            return;
        }
        debug!(stores = ?changed, "Notifying subscribers");
        let data = &self.data;
        for subscription in &mut self.subscriptions {
            if subscription.kinds.iter().any(|kind| changed.contains(kind)) {
                (subscription.callback)(data);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::MutationError;
    use std::sync::{Arc, Mutex};
    use trellis_data::{Instance, InstanceChild, PropValue};

    fn stores() -> ProjectStores {
        let mut data = ProjectData::new();
        let instances = Arc::make_mut(&mut data.instances);
        instances.insert(
            "body".into(),
            Instance::new("body", "Body").with_children(vec![InstanceChild::id("box")]),
        );
        instances.insert("box".into(), Instance::new("box", "Box"));
        ProjectStores::new(data)
    }

    fn fragment(id: &str) -> Fragment {
        Fragment {
            children: vec![InstanceChild::id(id)],
            instances: vec![Instance::new(id, "Box")],
            ..Fragment::default()
        }
    }

    #[test]
    fn test_commit_notifies_each_store_once() {
        let mut stores = stores();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let seen = calls.clone();
        stores.subscribe(&[StoreKind::Instances], move |data| {
            seen.lock().unwrap().push(("instances", data.instances.len()));
        });
        let seen = calls.clone();
        stores.subscribe(&[StoreKind::Props], move |data| {
            seen.lock().unwrap().push(("props", data.props.len()));
        });

        stores
            .transaction(|tx| -> MutationResult<()> {
                tx.insert_instance(fragment("a"), "box", InsertPosition::End);
                tx.insert_instance(fragment("b"), "box", InsertPosition::End);
                tx.set_prop(Prop::new("p", "a", "title", PropValue::String("x".into())))
            })
            .unwrap();

        // Subscribers see both stores already updated
        assert_eq!(
            *calls.lock().unwrap(),
            vec![("instances", 4), ("props", 1)]
        );
        assert_eq!(stores.version(), 1);
        assert_eq!(stores.take_outbox().len(), 1);
    }

    #[test]
    fn test_failed_insert_does_not_abort_the_batch() {
        let mut stores = stores();
        let inserted = stores
            .transaction(|tx| -> Result<_, MutationError> {
                let missing = tx.insert_instance(fragment("a"), "missing", InsertPosition::End);
                let ok = tx.insert_instance(fragment("b"), "box", InsertPosition::Index(0));
                Ok((missing, ok))
            })
            .unwrap();

        assert_eq!(inserted, (false, true));
        assert!(stores.data().instance("a").is_none());
        assert!(stores.data().instance("b").is_some());
    }

    #[test]
    fn test_mutator_error_rolls_back_everything() {
        let mut stores = stores();
        let before = stores.data().clone();
        let notified = Arc::new(Mutex::new(0));
        let counter = notified.clone();
        stores.subscribe(&StoreKind::ALL, move |_| *counter.lock().unwrap() += 1);

        let result = stores.transaction(|tx| -> MutationResult<()> {
            tx.insert_instance(fragment("a"), "box", InsertPosition::End);
            tx.set_prop(Prop::new("p", "a", "title", PropValue::String("x".into())))?;
            tx.delete_instance("body")
        });

        // body has no parent, so it is a root
        assert_eq!(result, Err(MutationError::CannotDeleteRoot("body".into())));
        assert_eq!(stores.data(), &before);
        assert!(!stores.can_undo());
        assert!(stores.take_outbox().is_empty());
        assert_eq!(*notified.lock().unwrap(), 0);
    }

    #[test]
    fn test_undo_and_redo_go_through_commit() {
        let mut stores = stores();
        stores
            .apply(Mutation::SetInstanceLabel {
                instance_id: "box".into(),
                label: Some("Hero".into()),
            })
            .unwrap();
        assert_eq!(stores.undo_stack().undo_description(), Some("Rename"));

        assert!(stores.undo());
        assert_eq!(stores.data().instance("box").unwrap().label, None);
        assert!(stores.redo());
        assert_eq!(
            stores.data().instance("box").unwrap().label.as_deref(),
            Some("Hero")
        );
        assert_eq!(stores.take_outbox().len(), 3);
        assert!(!stores.redo());
    }

    #[test]
    fn test_unsubscribe() {
        let mut stores = stores();
        let id = stores.subscribe(&[StoreKind::Instances], |_| panic!("should not run"));
        assert!(stores.unsubscribe(id));
        stores
            .apply(Mutation::DeleteInstance {
                instance_id: "box".into(),
            })
            .unwrap();
    }

    #[test]
    fn test_requeue_keeps_order() {
        let mut stores = stores();
        stores.apply(Mutation::DeleteInstance { instance_id: "box".into() }).unwrap();
        let first = stores.take_outbox();
        stores.undo();
        stores.requeue(first.clone());
        let outbox = stores.take_outbox();
        assert_eq!(outbox.len(), 2);
        assert_eq!(outbox[0], first[0]);
    }
}
