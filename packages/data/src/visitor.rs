use crate::data_source::{DataSourceKind, Resource};
use crate::instance::InstanceChild;
use crate::prop::{ActionValue, PropValue};
use crate::snapshot::ProjectData;
use std::fmt;
use std::sync::Arc;

/// Where an expression lives inside the project data
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExpressionLocation {
    Child { instance_id: String, index: usize },
    Prop { prop_id: String },
    Action { prop_id: String, index: usize },
    ResourceUrl { resource_id: String },
    ResourceSearchParam { resource_id: String, index: usize },
    ResourceHeader { resource_id: String, index: usize },
    ResourceBody { resource_id: String },
    DataSource { data_source_id: String },
}

/// Borrowed view of one expression
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionRef<'a> {
    pub location: ExpressionLocation,
    pub code: &'a str,
    /// Names declared by the enclosing action; empty for everything else
    pub args: &'a [String],
}

/// Visitor over the expressions owned by instances
///
/// Override `visit_expression`; the `walk_*` functions decide what an
/// instance owns.
pub trait ExpressionVisitor<'a> {
    fn visit_expression(&mut self, expression: ExpressionRef<'a>);
}

impl<'a> ExpressionVisitor<'a> for Vec<ExpressionRef<'a>> {
    fn visit_expression(&mut self, expression: ExpressionRef<'a>) {
        self.push(expression);
    }
}

/// Walk every expression owned by a single instance (not its descendants)
///
/// An instance owns its child expressions, its expression and action props,
/// the resources its resource props point to, and the data sources scoped to
/// it together with their resources.
pub fn walk_instance_expressions<'a, V: ExpressionVisitor<'a>>(
    visitor: &mut V,
    data: &'a ProjectData,
    instance_id: &str,
) {
    if let Some(instance) = data.instances.get(instance_id) {
        for (index, child) in instance.children.iter().enumerate() {
            if let InstanceChild::Expression(code) = child {
                visitor.visit_expression(ExpressionRef {
                    location: ExpressionLocation::Child {
                        instance_id: instance.id.clone(),
                        index,
                    },
                    code,
                    args: &[],
                });
            }
        }
    }

    for prop in data.props.values().filter(|prop| prop.instance_id == instance_id) {
        match &prop.value {
            PropValue::Expression(code) => visitor.visit_expression(ExpressionRef {
                location: ExpressionLocation::Prop {
                    prop_id: prop.id.clone(),
                },
                code,
                args: &[],
            }),
            PropValue::Action(actions) => {
                for (index, action) in actions.iter().enumerate() {
                    let ActionValue::Execute { args, code } = action;
                    visitor.visit_expression(ExpressionRef {
                        location: ExpressionLocation::Action {
                            prop_id: prop.id.clone(),
                            index,
                        },
                        code,
                        args,
                    });
                }
            }
            PropValue::Resource(resource_id) => {
                if let Some(resource) = data.resources.get(resource_id) {
                    walk_resource_expressions(visitor, resource);
                }
            }
            PropValue::String(_)
            | PropValue::Number(_)
            | PropValue::Boolean(_)
            | PropValue::Asset(_) => {}
        }
    }

    for data_source in data
        .data_sources
        .values()
        .filter(|data_source| data_source.is_scoped_to(instance_id))
    {
        match &data_source.kind {
            DataSourceKind::Expression { code } => visitor.visit_expression(ExpressionRef {
                location: ExpressionLocation::DataSource {
                    data_source_id: data_source.id.clone(),
                },
                code,
                args: &[],
            }),
            DataSourceKind::Resource { resource_id } => {
                if let Some(resource) = data.resources.get(resource_id) {
                    walk_resource_expressions(visitor, resource);
                }
            }
            DataSourceKind::Variable { .. } | DataSourceKind::Parameter => {}
        }
    }
}

pub fn walk_resource_expressions<'a, V: ExpressionVisitor<'a>>(
    visitor: &mut V,
    resource: &'a Resource,
) {
    visitor.visit_expression(ExpressionRef {
        location: ExpressionLocation::ResourceUrl {
            resource_id: resource.id.clone(),
        },
        code: &resource.url,
        args: &[],
    });

    for (index, param) in resource.search_params.iter().enumerate() {
        visitor.visit_expression(ExpressionRef {
            location: ExpressionLocation::ResourceSearchParam {
                resource_id: resource.id.clone(),
                index,
            },
            code: &param.value,
            args: &[],
        });
    }

    for (index, header) in resource.headers.iter().enumerate() {
        visitor.visit_expression(ExpressionRef {
            location: ExpressionLocation::ResourceHeader {
                resource_id: resource.id.clone(),
                index,
            },
            code: &header.value,
            args: &[],
        });
    }

    if let Some(body) = &resource.body {
        visitor.visit_expression(ExpressionRef {
            location: ExpressionLocation::ResourceBody {
                resource_id: resource.id.clone(),
            },
            code: body,
            args: &[],
        });
    }
}

/// Visitor that may rewrite expressions in place
pub trait ExpressionVisitorMut {
    fn visit_expression_mut(
        &mut self,
        location: &ExpressionLocation,
        code: &mut String,
        args: &[String],
    );
}

/// Mutable counterpart of [`walk_instance_expressions`]
///
/// Stores are only copied (`Arc::make_mut`) when the instance owns
/// expressions in them.
pub fn walk_instance_expressions_mut<V: ExpressionVisitorMut>(
    visitor: &mut V,
    data: &mut ProjectData,
    instance_id: &str,
) {
    let owns_child_expressions = data.instances.get(instance_id).map_or(false, |instance| {
        instance
            .children
            .iter()
            .any(|child| matches!(child, InstanceChild::Expression(_)))
    });
    if owns_child_expressions {
        if let Some(instance) = Arc::make_mut(&mut data.instances).get_mut(instance_id) {
            for (index, child) in instance.children.iter_mut().enumerate() {
                if let InstanceChild::Expression(code) = child {
                    let location = ExpressionLocation::Child {
                        instance_id: instance_id.to_string(),
                        index,
                    };
                    visitor.visit_expression_mut(&location, code, &[]);
                }
            }
        }
    }

    let mut resource_ids = Vec::new();

    let prop_ids: Vec<String> = data
        .props
        .values()
        .filter(|prop| prop.instance_id == instance_id)
        .map(|prop| prop.id.clone())
        .collect();
    let mut owns_prop_expressions = false;
    for prop_id in &prop_ids {
        match data.props.get(prop_id).map(|prop| &prop.value) {
            Some(PropValue::Resource(resource_id)) => resource_ids.push(resource_id.clone()),
            Some(PropValue::Expression(_) | PropValue::Action(_)) => owns_prop_expressions = true,
            _ => {}
        }
    }
    if owns_prop_expressions {
        let props = Arc::make_mut(&mut data.props);
        for prop_id in &prop_ids {
            let Some(prop) = props.get_mut(prop_id) else {
                continue;
            };
            match &mut prop.value {
                PropValue::Expression(code) => {
                    let location = ExpressionLocation::Prop {
                        prop_id: prop_id.clone(),
                    };
                    visitor.visit_expression_mut(&location, code, &[]);
                }
                PropValue::Action(actions) => {
                    for (index, action) in actions.iter_mut().enumerate() {
                        let ActionValue::Execute { args, code } = action;
                        let location = ExpressionLocation::Action {
                            prop_id: prop_id.clone(),
                            index,
                        };
                        visitor.visit_expression_mut(&location, code, args);
                    }
                }
                _ => {}
            }
        }
    }

    let data_source_ids: Vec<String> = data
        .data_sources
        .values()
        .filter(|data_source| data_source.is_scoped_to(instance_id))
        .map(|data_source| data_source.id.clone())
        .collect();
    let mut owns_computed_sources = false;
    for data_source_id in &data_source_ids {
        match data.data_sources.get(data_source_id).map(|ds| &ds.kind) {
            Some(DataSourceKind::Resource { resource_id }) => resource_ids.push(resource_id.clone()),
            Some(DataSourceKind::Expression { .. }) => owns_computed_sources = true,
            _ => {}
        }
    }
    if owns_computed_sources {
        let data_sources = Arc::make_mut(&mut data.data_sources);
        for data_source_id in &data_source_ids {
            if let Some(DataSourceKind::Expression { code }) = data_sources
                .get_mut(data_source_id)
                .map(|data_source| &mut data_source.kind)
            {
                let location = ExpressionLocation::DataSource {
                    data_source_id: data_source_id.clone(),
                };
                visitor.visit_expression_mut(&location, code, &[]);
            }
        }
    }

    resource_ids.retain(|id| data.resources.contains_key(id));
    if !resource_ids.is_empty() {
        let resources = Arc::make_mut(&mut data.resources);
        for resource_id in &resource_ids {
            if let Some(resource) = resources.get_mut(resource_id) {
                walk_resource_expressions_mut(visitor, resource);
            }
        }
    }
}

pub fn walk_resource_expressions_mut<V: ExpressionVisitorMut>(
    visitor: &mut V,
    resource: &mut Resource,
) {
    let resource_id = resource.id.clone();

    let location = ExpressionLocation::ResourceUrl {
        resource_id: resource_id.clone(),
    };
    visitor.visit_expression_mut(&location, &mut resource.url, &[]);

    for (index, param) in resource.search_params.iter_mut().enumerate() {
        let location = ExpressionLocation::ResourceSearchParam {
            resource_id: resource_id.clone(),
            index,
        };
        visitor.visit_expression_mut(&location, &mut param.value, &[]);
    }

    for (index, header) in resource.headers.iter_mut().enumerate() {
        let location = ExpressionLocation::ResourceHeader {
            resource_id: resource_id.clone(),
            index,
        };
        visitor.visit_expression_mut(&location, &mut header.value, &[]);
    }

    if let Some(body) = &mut resource.body {
        let location = ExpressionLocation::ResourceBody { resource_id };
        visitor.visit_expression_mut(&location, body, &[]);
    }
}

/// Collect the expressions owned by one instance
pub fn collect_instance_expressions<'a>(
    data: &'a ProjectData,
    instance_id: &str,
) -> Vec<ExpressionRef<'a>> {
    let mut expressions = Vec::new();
    walk_instance_expressions(&mut expressions, data, instance_id);
    expressions
}

impl fmt::Display for ExpressionLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpressionLocation::Child { instance_id, index } => {
                write!(f, "instance {} child #{}", instance_id, index)
            }
            ExpressionLocation::Prop { prop_id } => write!(f, "prop {}", prop_id),
            ExpressionLocation::Action { prop_id, index } => {
                write!(f, "prop {} action #{}", prop_id, index)
            }
            ExpressionLocation::ResourceUrl { resource_id } => {
                write!(f, "resource {} url", resource_id)
            }
            ExpressionLocation::ResourceSearchParam { resource_id, index } => {
                write!(f, "resource {} search param #{}", resource_id, index)
            }
            ExpressionLocation::ResourceHeader { resource_id, index } => {
                write!(f, "resource {} header #{}", resource_id, index)
            }
            ExpressionLocation::ResourceBody { resource_id } => {
                write!(f, "resource {} body", resource_id)
            }
            ExpressionLocation::DataSource { data_source_id } => {
                write!(f, "data source {}", data_source_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::DataSource;
    use crate::instance::Instance;
    use crate::prop::Prop;
    use std::sync::Arc;

    #[test]
    fn test_collects_all_owned_expressions() {
        let mut data = ProjectData::new();
        Arc::make_mut(&mut data.instances).insert(
            "box".into(),
            Instance::new("box", "Box").with_children(vec![
                InstanceChild::text("Hello"),
                InstanceChild::expression("name"),
            ]),
        );
        {
            let props = Arc::make_mut(&mut data.props);
            props.insert(
                "p1".into(),
                Prop::new("p1", "box", "title", PropValue::Expression("title".into())),
            );
            props.insert(
                "p2".into(),
                Prop::new(
                    "p2",
                    "box",
                    "onClick",
                    PropValue::Action(vec![ActionValue::Execute {
                        args: vec!["event".into()],
                        code: "count = count + 1".into(),
                    }]),
                ),
            );
            props.insert(
                "p3".into(),
                Prop::new("p3", "other", "title", PropValue::Expression("ignored".into())),
            );
        }
        Arc::make_mut(&mut data.resources).insert(
            "r1".into(),
            Resource::new("r1", "posts", "url")
                .with_header("auth", "token")
                .with_body("payload"),
        );
        Arc::make_mut(&mut data.data_sources).insert(
            "ds1".into(),
            DataSource::resource("ds1", "posts", "box", "r1"),
        );

        let expressions = collect_instance_expressions(&data, "box");
        let codes: Vec<_> = expressions.iter().map(|e| e.code).collect();
        assert_eq!(
            codes,
            vec!["name", "title", "count = count + 1", "url", "token", "payload"]
        );

        let action = &expressions[2];
        assert_eq!(action.args, &["event".to_string()]);
        assert_eq!(action.location.to_string(), "prop p2 action #0");
    }

    struct Uppercase;

    impl ExpressionVisitorMut for Uppercase {
        fn visit_expression_mut(
            &mut self,
            _location: &ExpressionLocation,
            code: &mut String,
            _args: &[String],
        ) {
            *code = code.to_uppercase();
        }
    }

    #[test]
    fn test_mut_walker_only_copies_touched_stores() {
        let mut data = ProjectData::new();
        Arc::make_mut(&mut data.instances).insert(
            "box".into(),
            Instance::new("box", "Box").with_children(vec![InstanceChild::expression("name")]),
        );
        Arc::make_mut(&mut data.resources).insert("r1".into(), Resource::new("r1", "posts", "url"));
        Arc::make_mut(&mut data.props).insert(
            "p1".into(),
            Prop::new("p1", "box", "data", PropValue::Resource("r1".into())),
        );

        let before = data.clone();
        walk_instance_expressions_mut(&mut Uppercase, &mut data, "box");

        assert_eq!(
            data.instances["box"].children,
            vec![InstanceChild::expression("NAME")]
        );
        assert_eq!(data.resources["r1"].url, "URL");
        assert!(Arc::ptr_eq(&data.props, &before.props));
        assert!(Arc::ptr_eq(&data.data_sources, &before.data_sources));
    }
}
