//! Tests for complex mutation sequences
//!
//! This tests:
//! - Move + rename + delete chains
//! - Undo/redo sequences
//! - Transaction atomicity
//! - Project integrity after operations

mod common;

use common::{child_ids, nested_boxes};
use std::sync::{Arc, Mutex};
use trellis_data::{Prop, PropValue, StoreKind};
use trellis_editor::{
    validate_project, InsertPosition, Mutation, MutationError, MutationResult, ProjectStores,
};

#[test]
fn test_move_then_delete_sequence() {
    let original = nested_boxes();
    let mut stores = ProjectStores::new(original.clone());

    // Move box4 into box1, then delete box1 (takes box4 with it)
    stores
        .apply(Mutation::ReparentInstance {
            instance_id: "box4".into(),
            parent_id: "box1".into(),
            position: InsertPosition::End,
        })
        .unwrap();
    stores
        .apply(Mutation::DeleteInstance {
            instance_id: "box1".into(),
        })
        .unwrap();
    assert_eq!(child_ids(stores.data(), "root"), vec!["box2"]);
    assert!(stores.data().instance("box4").is_none());
    assert!(!stores.data().props.contains_key("box4-prop"));

    // Undo delete restores both
    stores.undo();
    assert_eq!(child_ids(stores.data(), "box1"), vec!["box4"]);
    assert!(stores.data().props.contains_key("box4-prop"));

    // Undo move
    stores.undo();
    assert_eq!(stores.data(), &original);
    assert!(validate_project(stores.data()).is_empty());
}

#[test]
fn test_rename_move_delete_full_undo_redo() {
    let original = nested_boxes();
    let mut stores = ProjectStores::new(original.clone());

    stores
        .apply(Mutation::SetInstanceLabel {
            instance_id: "child1".into(),
            label: Some("First".into()),
        })
        .unwrap();
    stores
        .apply(Mutation::ReparentInstance {
            instance_id: "child1".into(),
            parent_id: "box4".into(),
            position: InsertPosition::Index(0),
        })
        .unwrap();
    stores
        .apply(Mutation::DeleteInstance {
            instance_id: "box3".into(),
        })
        .unwrap();
    let edited = stores.data().clone();
    assert_eq!(child_ids(&edited, "box4"), vec!["child1"]);
    assert_eq!(edited.instance("child1").unwrap().label.as_deref(), Some("First"));

    while stores.undo() {}
    assert_eq!(stores.data(), &original);

    while stores.redo() {}
    assert_eq!(stores.data(), &edited);
}

#[test]
fn test_new_edit_clears_redo() {
    let mut stores = ProjectStores::new(nested_boxes());
    stores
        .apply(Mutation::DeleteInstance {
            instance_id: "box1".into(),
        })
        .unwrap();
    stores.undo();
    assert!(stores.can_redo());

    stores
        .apply(Mutation::SetInstanceLabel {
            instance_id: "box4".into(),
            label: Some("Footer".into()),
        })
        .unwrap();
    assert!(!stores.can_redo());
}

#[test]
fn test_transaction_is_one_undo_step() {
    let original = nested_boxes();
    let mut stores = ProjectStores::new(original.clone());

    stores
        .transaction(|tx| -> MutationResult<()> {
            tx.describe("Restructure");
            tx.delete_instance("box1")?;
            tx.reparent_instance("box4", "box2", InsertPosition::Index(0))?;
            tx.set_prop(Prop::new("p", "box2", "alt", PropValue::Boolean(true)))?;
            Ok(())
        })
        .unwrap();
    assert_eq!(stores.undo_stack().undo_levels(), 1);
    assert_eq!(stores.undo_stack().undo_description(), Some("Restructure"));
    assert_eq!(stores.pending_outbox().len(), 1);

    stores.undo();
    assert_eq!(stores.data(), &original);
}

#[test]
fn test_failed_transaction_leaves_no_trace() {
    let original = nested_boxes();
    let mut stores = ProjectStores::new(original.clone());
    let notified = Arc::new(Mutex::new(0));
    let counter = notified.clone();
    stores.subscribe(&StoreKind::ALL, move |_| *counter.lock().unwrap() += 1);

    let result = stores.transaction(|tx| -> MutationResult<()> {
        tx.delete_instance("box1")?;
        tx.set_prop(Prop::new("p", "box2", "alt", PropValue::Boolean(true)))?;
        // Fails halfway: the page root cannot be deleted
        tx.delete_instance("root")?;
        tx.delete_instance("box4")?;
        Ok(())
    });

    assert_eq!(result, Err(MutationError::CannotDeleteRoot("root".into())));
    assert_eq!(stores.data(), &original);
    assert!(!stores.can_undo());
    assert!(stores.pending_outbox().is_empty());
    assert_eq!(stores.version(), 0);
    assert_eq!(*notified.lock().unwrap(), 0);
}

#[test]
fn test_subscribers_notified_once_per_transaction() {
    let mut stores = ProjectStores::new(nested_boxes());
    let calls = Arc::new(Mutex::new(Vec::new()));

    let instance_calls = calls.clone();
    stores.subscribe(&[StoreKind::Instances], move |data| {
        instance_calls
            .lock()
            .unwrap()
            .push(("instances", data.instances.len(), data.props.len()));
    });
    let style_calls = calls.clone();
    stores.subscribe(&[StoreKind::Styles, StoreKind::StyleSources], move |data| {
        style_calls
            .lock()
            .unwrap()
            .push(("styles", data.instances.len(), data.props.len()));
    });
    let page_calls = calls.clone();
    stores.subscribe(&[StoreKind::Pages], move |_| {
        page_calls.lock().unwrap().push(("pages", 0, 0));
    });

    // One delete touches instances, props and style stores together
    stores
        .apply(Mutation::DeleteInstance {
            instance_id: "box3".into(),
        })
        .unwrap();

    let calls = calls.lock().unwrap();
    // Every subscriber saw the fully committed data (4 instances, 4 props)
    assert_eq!(*calls, vec![("instances", 4, 4), ("styles", 4, 4)]);
}

#[test]
fn test_reset_drops_history() {
    let mut stores = ProjectStores::new(nested_boxes());
    stores
        .apply(Mutation::SetInstanceLabel {
            instance_id: "box1".into(),
            label: Some("Header".into()),
        })
        .unwrap();

    stores.reset(nested_boxes());
    assert!(!stores.can_undo());
    assert!(stores.data().instance("box1").unwrap().label.is_none());
}
