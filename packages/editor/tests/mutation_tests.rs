//! Mutation behavior against a realistic project tree

mod common;

use common::{child_ids, nested_boxes, ProjectBuilder};
use std::collections::BTreeSet;
use trellis_data::{IdGenerator, InstanceChild, Prop, PropValue, StoreKind};
use trellis_editor::{
    clone_instance, ComponentRegistry, Fragment, InsertPosition, Mutation, MutationError,
    ProjectStores,
};

fn keys<T>(store: &trellis_data::Store<T>) -> BTreeSet<String> {
    store.keys().cloned().collect()
}

fn set(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

#[test]
fn test_delete_cascades_to_subtree_only() {
    let original = nested_boxes();
    let mut stores = ProjectStores::new(original.clone());

    stores
        .apply(Mutation::DeleteInstance {
            instance_id: "box3".into(),
        })
        .unwrap();
    let data = stores.data();

    assert_eq!(child_ids(data, "root"), vec!["box1", "box2", "box4"]);
    assert!(child_ids(data, "box2").is_empty());

    let survivors = ["root", "box1", "box2", "box4"];
    assert_eq!(keys(&data.instances), set(&survivors));
    assert_eq!(
        keys(&data.props),
        set(&["root-prop", "box1-prop", "box2-prop", "box4-prop"])
    );
    assert_eq!(keys(&data.style_source_selections), set(&survivors));
    assert_eq!(
        keys(&data.style_sources),
        set(&["root-style", "box1-style", "box2-style", "box4-style"])
    );
    let styled: BTreeSet<String> = data
        .styles
        .values()
        .map(|decl| decl.style_source_id.clone())
        .collect();
    assert_eq!(styled, keys(&data.style_sources));
}

#[test]
fn test_undo_delete_restores_everything() {
    let original = nested_boxes();
    let mut stores = ProjectStores::new(original.clone());

    stores
        .apply(Mutation::DeleteInstance {
            instance_id: "box3".into(),
        })
        .unwrap();
    assert!(stores.undo());
    assert_eq!(stores.data(), &original);

    assert!(stores.redo());
    assert!(stores.data().instance("descendant").is_none());
}

#[test]
fn test_cannot_delete_page_root() {
    let mut stores = ProjectStores::new(nested_boxes());
    let result = stores.apply(Mutation::DeleteInstance {
        instance_id: "root".into(),
    });
    assert_eq!(result, Err(MutationError::CannotDeleteRoot("root".into())));
    assert!(!stores.can_undo());
}

#[test]
fn test_clone_is_disjoint_and_structurally_equal() {
    let data = nested_boxes();
    let mut generator = IdGenerator::new("test");
    let (clone, ids) = clone_instance(&data, "box2", &mut generator).unwrap();

    // Every source id was renamed to something unused
    for (old, new) in &ids {
        assert_ne!(old, new);
        assert!(!data.instances.contains_key(new));
        assert!(!data.props.contains_key(new));
        assert!(!data.style_sources.contains_key(new));
    }
    let cloned: BTreeSet<&str> = clone.instances.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(cloned.len(), 6);

    // Same shape, new ids
    for instance in &clone.instances {
        let source_id = ids
            .iter()
            .find(|(_, new)| *new == &instance.id)
            .map(|(old, _)| old.clone())
            .unwrap();
        let expected: Vec<InstanceChild> = data.instances[&source_id]
            .children
            .iter()
            .map(|child| match child {
                InstanceChild::Id(id) => InstanceChild::Id(ids[id].clone()),
                other => other.clone(),
            })
            .collect();
        assert_eq!(instance.children, expected);
    }

    for prop in &clone.props {
        assert!(cloned.contains(prop.instance_id.as_str()));
    }
    for selection in &clone.style_source_selections {
        assert!(cloned.contains(selection.instance_id.as_str()));
    }
    let local_sources: BTreeSet<&str> = clone.style_sources.iter().map(|s| s.id()).collect();
    for decl in &clone.styles {
        assert!(local_sources.contains(decl.style_source_id.as_str()));
    }
}

#[test]
fn test_insert_rejects_duplicate_ids() {
    let mut stores = ProjectStores::new(nested_boxes());
    let fragment = Fragment {
        children: vec![InstanceChild::id("box1")],
        instances: vec![trellis_data::Instance::new("box1", "Box")],
        ..Fragment::default()
    };
    let result = stores.apply(Mutation::InsertFragment {
        fragment,
        parent_id: "box4".into(),
        position: InsertPosition::End,
    });
    assert_eq!(result, Err(MutationError::DuplicateId("box1".into())));
}

#[test]
fn test_insert_into_leaf_is_rejected() {
    let data = ProjectBuilder::new()
        .instance("body", "Body", &["text"])
        .instance("text", "Text", &[])
        .build();
    let mut stores = ProjectStores::new(data);
    let fragment = Fragment {
        children: vec![InstanceChild::id("new")],
        instances: vec![trellis_data::Instance::new("new", "Box")],
        ..Fragment::default()
    };

    let result = stores.apply(Mutation::InsertFragment {
        fragment,
        parent_id: "text".into(),
        position: InsertPosition::End,
    });
    assert!(matches!(
        result,
        Err(MutationError::ParentRejectsChildren { .. })
    ));
}

#[test]
fn test_reparent_into_own_descendant_is_a_cycle() {
    let mut stores = ProjectStores::new(nested_boxes());
    let result = stores.apply(Mutation::ReparentInstance {
        instance_id: "box2".into(),
        parent_id: "descendant".into(),
        position: InsertPosition::End,
    });
    assert!(matches!(result, Err(MutationError::CycleDetected { .. })));
    assert_eq!(child_ids(stores.data(), "box2"), vec!["box3"]);
}

#[test]
fn test_reparent_and_undo_restores_position() {
    let mut stores = ProjectStores::new(nested_boxes());
    stores
        .apply(Mutation::ReparentInstance {
            instance_id: "child2".into(),
            parent_id: "box1".into(),
            position: InsertPosition::End,
        })
        .unwrap();
    assert_eq!(child_ids(stores.data(), "box3"), vec!["child1", "child3"]);
    assert_eq!(child_ids(stores.data(), "box1"), vec!["child2"]);

    stores.undo();
    assert_eq!(child_ids(stores.data(), "box3"), vec!["child1", "child2", "child3"]);
    assert!(child_ids(stores.data(), "box1").is_empty());
}

#[test]
fn test_set_prop_upserts_by_instance_and_name() {
    let mut stores = ProjectStores::new(nested_boxes());
    stores
        .apply(Mutation::SetProp {
            prop: Prop::new("other-id", "box1", "title", PropValue::String("New".into())),
        })
        .unwrap();

    let titles: Vec<_> = stores
        .data()
        .props_of("box1")
        .filter(|prop| prop.name == "title")
        .collect();
    assert_eq!(titles.len(), 1);
    assert_eq!(titles[0].value, PropValue::String("New".into()));

    stores.undo();
    let prop = stores.data().find_prop("box1", "title").unwrap();
    assert_eq!(prop.id, "box1-prop");
    assert_eq!(prop.value, PropValue::String("box1".into()));
}

#[test]
fn test_set_instance_children_keeps_instance_children() {
    let mut stores = ProjectStores::new(nested_boxes());
    let result = stores.apply(Mutation::SetInstanceChildren {
        instance_id: "box2".into(),
        children: vec![InstanceChild::text("Hello")],
    });
    assert!(matches!(result, Err(MutationError::InvalidChildren { .. })));

    stores
        .apply(Mutation::SetInstanceChildren {
            instance_id: "box2".into(),
            children: vec![InstanceChild::text("Hello"), InstanceChild::id("box3")],
        })
        .unwrap();
    assert_eq!(
        stores.data().instance("box2").unwrap().children[0],
        InstanceChild::text("Hello")
    );
}

#[test]
fn test_remove_records_of_unsupported_store() {
    let mut data = nested_boxes();
    let result = Mutation::RemoveRecords {
        namespace: StoreKind::Pages,
        ids: vec!["home".into()],
    }
    .apply(&mut data, &ComponentRegistry::default());
    assert_eq!(result, Err(MutationError::UnsupportedStore(StoreKind::Pages)));
}

#[test]
fn test_mutation_wire_format() {
    let mutation = Mutation::DeleteInstance {
        instance_id: "box3".into(),
    };
    let json = serde_json::to_value(&mutation).unwrap();
    assert_eq!(
        json,
        serde_json::json!({ "type": "deleteInstance", "instanceId": "box3" })
    );
    let parsed: Mutation = serde_json::from_value(json).unwrap();
    assert_eq!(parsed, mutation);
}
