//! # Trellis Data
//!
//! Project data model shared by every trellis crate.
//!
//! A project is a set of parallel keyed stores:
//!
//! ```text
//! instances ──┬── props                 (instanceId)
//!             ├── dataSources           (scopeInstanceId)
//!             │     └── resources       (resourceId)
//!             ├── styleSourceSelections (instanceId)
//!             │     └── styleSources ── styles
//!             └── pages                 (rootInstanceId)
//! ```
//!
//! [`ProjectSnapshot`] is the persisted form (`[id, value]` pairs per store).
//! [`ProjectData`] is the in-memory mirror, with every store behind an `Arc`
//! so unchanged stores are shared between versions.

pub mod data_source;
pub mod id_generator;
pub mod instance;
pub mod page;
pub mod patch;
pub mod prop;
pub mod snapshot;
pub mod style;
pub mod visitor;

pub use data_source::{
    DataSource, DataSourceKind, Resource, ResourceMethod, ResourceParam, VariableValue,
};
pub use id_generator::{get_seed_id, IdGenerator};
pub use instance::{
    Instance, InstanceChild, BODY_COMPONENT, ELEMENT_COMPONENT, FRAGMENT_COMPONENT,
    ROOT_INSTANCE_ID, SLOT_COMPONENT,
};
pub use page::Page;
pub use patch::{diff_project, ChangeSet, PatchError, PatchOp, StorePatch};
pub use prop::{ActionValue, Prop, PropValue};
pub use snapshot::{ProjectData, ProjectSnapshot, Store, StoreKind};
pub use style::{Breakpoint, StyleDecl, StyleSource, StyleSourceSelection};
pub use visitor::{
    collect_instance_expressions, walk_instance_expressions, walk_instance_expressions_mut,
    walk_resource_expressions, walk_resource_expressions_mut, ExpressionLocation, ExpressionRef,
    ExpressionVisitor, ExpressionVisitorMut,
};
