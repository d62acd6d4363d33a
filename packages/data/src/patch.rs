//! # Store Patches
//!
//! JSON-patch-like changes per store, exchanged with the persistence layer.
//! A patch only says which records were put or removed; it never describes
//! partial edits inside a record.

use crate::snapshot::{ProjectData, Store, StoreKind};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    Put { id: String, value: serde_json::Value },
    Remove { id: String },
}

/// Ordered operations against a single store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorePatch {
    pub namespace: StoreKind,
    pub ops: Vec<PatchOp>,
}

/// Patches produced by one committed transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    pub id: String,
    /// Local version the patches lead to
    pub version: u64,
    pub patches: Vec<StorePatch>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.patches.iter().all(|patch| patch.ops.is_empty())
    }
}

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("Cannot encode {namespace} record '{id}': {source}")]
    Encode {
        namespace: StoreKind,
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cannot decode {namespace} record '{id}': {source}")]
    Decode {
        namespace: StoreKind,
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

fn diff_store<T: PartialEq + Serialize>(
    namespace: StoreKind,
    old: &Arc<Store<T>>,
    new: &Arc<Store<T>>,
) -> Result<Option<StorePatch>, PatchError> {
    if Arc::ptr_eq(old, new) {
        return Ok(None);
    }

    let mut ops = Vec::new();

    for (id, value) in new.iter() {
        if old.get(id) != Some(value) {
            let value = serde_json::to_value(value).map_err(|source| PatchError::Encode {
                namespace,
                id: id.clone(),
                source,
            })?;
            ops.push(PatchOp::Put {
                id: id.clone(),
                value,
            });
        }
    }

    for id in old.keys() {
        if !new.contains_key(id) {
            ops.push(PatchOp::Remove { id: id.clone() });
        }
    }

    if ops.is_empty() {
        Ok(None)
    } else {
        Ok(Some(StorePatch { namespace, ops }))
    }
}

fn apply_ops<T: DeserializeOwned + Clone>(
    namespace: StoreKind,
    store: &mut Arc<Store<T>>,
    ops: &[PatchOp],
) -> Result<(), PatchError> {
    let store = Arc::make_mut(store);
    for op in ops {
        match op {
            PatchOp::Put { id, value } => {
                let record = serde_json::from_value(value.clone()).map_err(|source| {
                    PatchError::Decode {
                        namespace,
                        id: id.clone(),
                        source,
                    }
                })?;
                store.insert(id.clone(), record);
            }
            PatchOp::Remove { id } => {
                store.remove(id);
            }
        }
    }
    Ok(())
}

/// Per-store patches turning `old` into `new`
pub fn diff_project(old: &ProjectData, new: &ProjectData) -> Result<Vec<StorePatch>, PatchError> {
    let patches = [
        diff_store(StoreKind::Instances, &old.instances, &new.instances)?,
        diff_store(StoreKind::Props, &old.props, &new.props)?,
        diff_store(StoreKind::DataSources, &old.data_sources, &new.data_sources)?,
        diff_store(StoreKind::Resources, &old.resources, &new.resources)?,
        diff_store(StoreKind::StyleSources, &old.style_sources, &new.style_sources)?,
        diff_store(
            StoreKind::StyleSourceSelections,
            &old.style_source_selections,
            &new.style_source_selections,
        )?,
        diff_store(StoreKind::Styles, &old.styles, &new.styles)?,
        diff_store(StoreKind::Breakpoints, &old.breakpoints, &new.breakpoints)?,
        diff_store(StoreKind::Pages, &old.pages, &new.pages)?,
    ];

    Ok(patches.into_iter().flatten().collect())
}

impl ProjectData {
    /// Apply patches in order; stops at the first record that fails to decode
    pub fn apply_patches(&mut self, patches: &[StorePatch]) -> Result<(), PatchError> {
        for patch in patches {
            let ops = &patch.ops;
            match patch.namespace {
                StoreKind::Instances => apply_ops(patch.namespace, &mut self.instances, ops)?,
                StoreKind::Props => apply_ops(patch.namespace, &mut self.props, ops)?,
                StoreKind::DataSources => apply_ops(patch.namespace, &mut self.data_sources, ops)?,
                StoreKind::Resources => apply_ops(patch.namespace, &mut self.resources, ops)?,
                StoreKind::StyleSources => {
                    apply_ops(patch.namespace, &mut self.style_sources, ops)?
                }
                StoreKind::StyleSourceSelections => {
                    apply_ops(patch.namespace, &mut self.style_source_selections, ops)?
                }
                StoreKind::Styles => apply_ops(patch.namespace, &mut self.styles, ops)?,
                StoreKind::Breakpoints => apply_ops(patch.namespace, &mut self.breakpoints, ops)?,
                StoreKind::Pages => apply_ops(patch.namespace, &mut self.pages, ops)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{Instance, InstanceChild};

    #[test]
    fn test_diff_and_apply_reproduce_new_state() {
        let mut old = ProjectData::new();
        {
            let instances = Arc::make_mut(&mut old.instances);
            instances.insert(
                "body".into(),
                Instance::new("body", "Body").with_children(vec![InstanceChild::id("box")]),
            );
            instances.insert("box".into(), Instance::new("box", "Box"));
        }

        let mut new = old.clone();
        {
            let instances = Arc::make_mut(&mut new.instances);
            instances.remove("box");
            instances.get_mut("body").unwrap().children.clear();
            instances.insert("text".into(), Instance::new("text", "Text"));
        }

        let patches = diff_project(&old, &new).unwrap();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].namespace, StoreKind::Instances);
        assert_eq!(patches[0].ops.len(), 3);

        let mut replayed = old.clone();
        replayed.apply_patches(&patches).unwrap();
        assert_eq!(replayed, new);
    }

    #[test]
    fn test_decode_error_names_record() {
        let mut data = ProjectData::new();
        let patch = StorePatch {
            namespace: StoreKind::Instances,
            ops: vec![PatchOp::Put {
                id: "broken".into(),
                value: serde_json::json!({ "id": 1 }),
            }],
        };

        let err = data.apply_patches(&[patch]).unwrap_err();
        assert!(err.to_string().contains("instances record 'broken'"));
    }
}
