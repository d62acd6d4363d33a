use crate::data_source::{DataSource, Resource};
use crate::instance::Instance;
use crate::page::Page;
use crate::prop::Prop;
use crate::style::{Breakpoint, StyleDecl, StyleSource, StyleSourceSelection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Keyed store; ordered so iteration (and therefore derived output) is deterministic
pub type Store<T> = BTreeMap<String, T>;

/// Names of the parallel stores that make up a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StoreKind {
    Instances,
    Props,
    DataSources,
    Resources,
    StyleSources,
    StyleSourceSelections,
    Styles,
    Breakpoints,
    Pages,
}

impl StoreKind {
    pub const ALL: [StoreKind; 9] = [
        StoreKind::Instances,
        StoreKind::Props,
        StoreKind::DataSources,
        StoreKind::Resources,
        StoreKind::StyleSources,
        StoreKind::StyleSourceSelections,
        StoreKind::Styles,
        StoreKind::Breakpoints,
        StoreKind::Pages,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Instances => "instances",
            StoreKind::Props => "props",
            StoreKind::DataSources => "dataSources",
            StoreKind::Resources => "resources",
            StoreKind::StyleSources => "styleSources",
            StoreKind::StyleSourceSelections => "styleSourceSelections",
            StoreKind::Styles => "styles",
            StoreKind::Breakpoints => "breakpoints",
            StoreKind::Pages => "pages",
        }
    }
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted project: `[id, value]` pairs per store, independently serializable
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSnapshot {
    #[serde(default)]
    pub instances: Vec<(String, Instance)>,
    #[serde(default)]
    pub props: Vec<(String, Prop)>,
    #[serde(default)]
    pub data_sources: Vec<(String, DataSource)>,
    #[serde(default)]
    pub resources: Vec<(String, Resource)>,
    #[serde(default)]
    pub style_sources: Vec<(String, StyleSource)>,
    #[serde(default)]
    pub style_source_selections: Vec<(String, StyleSourceSelection)>,
    #[serde(default)]
    pub styles: Vec<(String, StyleDecl)>,
    #[serde(default)]
    pub breakpoints: Vec<(String, Breakpoint)>,
    #[serde(default)]
    pub pages: Vec<(String, Page)>,
}

/// In-memory mirror of a [`ProjectSnapshot`]
///
/// Cloning is cheap: each store is reference counted and only copied when a
/// clone writes to it (`Arc::make_mut`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectData {
    pub instances: Arc<Store<Instance>>,
    pub props: Arc<Store<Prop>>,
    pub data_sources: Arc<Store<DataSource>>,
    pub resources: Arc<Store<Resource>>,
    pub style_sources: Arc<Store<StyleSource>>,
    /// Keyed by instance id
    pub style_source_selections: Arc<Store<StyleSourceSelection>>,
    /// Keyed by [`StyleDecl::key`]
    pub styles: Arc<Store<StyleDecl>>,
    pub breakpoints: Arc<Store<Breakpoint>>,
    pub pages: Arc<Store<Page>>,
}

fn to_store<T>(pairs: Vec<(String, T)>) -> Arc<Store<T>> {
    Arc::new(pairs.into_iter().collect())
}

fn to_pairs<T: Clone>(store: &Store<T>) -> Vec<(String, T)> {
    store
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

impl ProjectData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: ProjectSnapshot) -> Self {
        Self {
            instances: to_store(snapshot.instances),
            props: to_store(snapshot.props),
            data_sources: to_store(snapshot.data_sources),
            resources: to_store(snapshot.resources),
            style_sources: to_store(snapshot.style_sources),
            style_source_selections: to_store(snapshot.style_source_selections),
            styles: to_store(snapshot.styles),
            breakpoints: to_store(snapshot.breakpoints),
            pages: to_store(snapshot.pages),
        }
    }

    pub fn to_snapshot(&self) -> ProjectSnapshot {
        ProjectSnapshot {
            instances: to_pairs(&self.instances),
            props: to_pairs(&self.props),
            data_sources: to_pairs(&self.data_sources),
            resources: to_pairs(&self.resources),
            style_sources: to_pairs(&self.style_sources),
            style_source_selections: to_pairs(&self.style_source_selections),
            styles: to_pairs(&self.styles),
            breakpoints: to_pairs(&self.breakpoints),
            pages: to_pairs(&self.pages),
        }
    }

    /// Stores whose contents differ between `self` and `other`
    ///
    /// Shared stores are skipped without comparing their contents.
    pub fn changed_stores(&self, other: &ProjectData) -> Vec<StoreKind> {
        fn changed<T: PartialEq>(a: &Arc<Store<T>>, b: &Arc<Store<T>>) -> bool {
            !Arc::ptr_eq(a, b) && a != b
        }

        StoreKind::ALL
            .into_iter()
            .filter(|kind| match kind {
                StoreKind::Instances => changed(&self.instances, &other.instances),
                StoreKind::Props => changed(&self.props, &other.props),
                StoreKind::DataSources => changed(&self.data_sources, &other.data_sources),
                StoreKind::Resources => changed(&self.resources, &other.resources),
                StoreKind::StyleSources => changed(&self.style_sources, &other.style_sources),
                StoreKind::StyleSourceSelections => {
                    changed(&self.style_source_selections, &other.style_source_selections)
                }
                StoreKind::Styles => changed(&self.styles, &other.styles),
                StoreKind::Breakpoints => changed(&self.breakpoints, &other.breakpoints),
                StoreKind::Pages => changed(&self.pages, &other.pages),
            })
            .collect()
    }

    pub fn instance(&self, id: &str) -> Option<&Instance> {
        self.instances.get(id)
    }

    /// Props owned by an instance
    pub fn props_of<'a>(&'a self, instance_id: &'a str) -> impl Iterator<Item = &'a Prop> + 'a {
        self.props
            .values()
            .filter(move |prop| prop.instance_id == instance_id)
    }

    pub fn find_prop(&self, instance_id: &str, name: &str) -> Option<&Prop> {
        self.props
            .values()
            .find(|prop| prop.instance_id == instance_id && prop.name == name)
    }

    /// Data sources declared on an instance
    pub fn data_sources_of<'a>(
        &'a self,
        instance_id: &'a str,
    ) -> impl Iterator<Item = &'a DataSource> + 'a {
        self.data_sources
            .values()
            .filter(move |data_source| data_source.is_scoped_to(instance_id))
    }

    pub fn is_page_root(&self, instance_id: &str) -> bool {
        self.pages
            .values()
            .any(|page| page.root_instance_id == instance_id)
    }

    pub fn find_page_by_path(&self, path: &str) -> Option<&Page> {
        self.pages.values().find(|page| page.path == path)
    }
}

impl From<ProjectSnapshot> for ProjectData {
    fn from(snapshot: ProjectSnapshot) -> Self {
        ProjectData::from_snapshot(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prop::PropValue;

    fn sample() -> ProjectData {
        let mut data = ProjectData::new();
        Arc::make_mut(&mut data.instances).insert("body".into(), Instance::new("body", "Body"));
        Arc::make_mut(&mut data.props).insert(
            "p1".into(),
            Prop::new("p1", "body", "id", PropValue::String("main".into())),
        );
        data
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let data = sample();
        let snapshot = data.to_snapshot();
        assert_eq!(snapshot.instances.len(), 1);

        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: ProjectSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(ProjectData::from_snapshot(restored), data);
    }

    #[test]
    fn test_changed_stores_uses_sharing() {
        let data = sample();
        let mut next = data.clone();
        assert!(next.changed_stores(&data).is_empty());

        Arc::make_mut(&mut next.props).clear();
        assert_eq!(next.changed_stores(&data), vec![StoreKind::Props]);
        assert!(Arc::ptr_eq(&next.instances, &data.instances));
    }

    #[test]
    fn test_snapshot_missing_stores_default_to_empty() {
        let snapshot: ProjectSnapshot =
            serde_json::from_str(r#"{ "instances": [["body", { "id": "body", "component": "Body" }]] }"#)
                .unwrap();
        assert_eq!(snapshot.instances.len(), 1);
        assert!(snapshot.props.is_empty());
    }
}
