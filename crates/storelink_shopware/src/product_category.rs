//! Product categories.

use crate::models::{local, PRODUCT_CATEGORY};
use serde_json::{json, Value};
use storelink_core::{values, Binding, ExternalId, Values};
use storelink_engine::checkpoint::add_checkpoint;
use storelink_engine::mapper::convert;
use storelink_engine::{
    import_found, BatchImport, BatchMode, BatchReport, ImportHooks, ImportMapper, SearchFilter,
    SyncContext, SyncError, SyncResult,
};
use tracing::info;

/// Priority of the root categories. Each level below adds one, so parents
/// tend to be imported before their children.
pub const BASE_PRIORITY: u32 = 10;

/// Imports product categories.
///
/// The parent category is a dependency. New categories get a review
/// checkpoint.
pub struct ProductCategoryImporter {
    mapper: ImportMapper,
}

impl ProductCategoryImporter {
    /// Creates the importer.
    pub fn new() -> Self {
        let mapper = ImportMapper::new(PRODUCT_CATEGORY)
            .direct("description", "description")
            .direct_with("changed", "changed", convert::datetime)
            .rule("name", |ctx, record| {
                let top_level = matches!(record.get("level"), Some(Value::String(l)) if l == "0")
                    || record.get("level").and_then(Value::as_u64) == Some(0);
                if top_level {
                    // the root category has no name of its own
                    return Ok(values::object(json!({ "name": ctx.backend().name })));
                }
                Ok(match values::get_str(record, "name").filter(|n| !n.is_empty()) {
                    Some(name) => values::object(json!({ "name": name })),
                    None => Values::new(),
                })
            })
            .rule("parent", |ctx, record| {
                let Some(parent) = record.get("parent_id").and_then(ExternalId::from_value) else {
                    return Ok(Values::new());
                };
                let binding = ctx.binder(PRODUCT_CATEGORY)?.binding_for(ctx.session, &parent)?;
                match binding {
                    Some(binding) => Ok(values::object(json!({
                        "parent_id": binding.record_id().map(|id| id.as_u64()),
                        "shopware_parent_id": binding.id.as_u64(),
                    }))),
                    None => Err(SyncError::mapping(format!(
                        "The product category with shopware id {parent} is not imported."
                    ))),
                }
            });
        Self { mapper }
    }
}

impl Default for ProductCategoryImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportHooks for ProductCategoryImporter {
    fn model(&self) -> &str {
        PRODUCT_CATEGORY
    }

    fn mapper(&self) -> &ImportMapper {
        &self.mapper
    }

    fn import_dependencies(&self, ctx: &mut SyncContext<'_>, record: &Values) -> SyncResult<()> {
        // the root category has a 0 parent
        ctx.import_dependency_value(record.get("parent_id"), PRODUCT_CATEGORY, false)
    }

    fn after_create(&self, ctx: &mut SyncContext<'_>, binding: &Binding) -> SyncResult<()> {
        if let Some(record_id) = binding.record_id() {
            add_checkpoint(ctx.session, ctx.env.backend_id(), local::PRODUCT_CATEGORY, record_id)?;
        }
        Ok(())
    }
}

/// A category of the remote tree with its depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    /// Remote id.
    pub id: ExternalId,
    /// Depth, 0 for the roots.
    pub level: u32,
}

/// Flattens the tree returned by the `tree` call, parents first.
///
/// The tree is a node `{"id": .., "children": [..]}` or a list of them.
pub fn flatten_tree(tree: &Value) -> SyncResult<Vec<TreeNode>> {
    fn walk(node: &Value, level: u32, out: &mut Vec<TreeNode>) -> SyncResult<()> {
        match node {
            Value::Array(nodes) => {
                for node in nodes {
                    walk(node, level, out)?;
                }
                Ok(())
            }
            Value::Object(fields) => {
                let id = fields
                    .get("id")
                    .and_then(ExternalId::from_value)
                    .ok_or_else(|| SyncError::Protocol(format!("category tree node without id: {node}")))?;
                out.push(TreeNode { id, level });
                match fields.get("children") {
                    Some(children) => walk(children, level + 1, out),
                    None => Ok(()),
                }
            }
            Value::Null => Ok(()),
            other => Err(SyncError::Protocol(format!("unexpected category tree node: {other}"))),
        }
    }

    let mut out = Vec::new();
    walk(tree, 0, &mut out)?;
    Ok(out)
}

/// Imports the category tree, one deferred job per category.
///
/// With a date window only the categories updated in it are scheduled, but
/// the whole tree is walked so each keeps the priority of its depth.
#[derive(Debug, Default)]
pub struct CategoryTreeBatch;

impl BatchImport for CategoryTreeBatch {
    fn model(&self) -> &str {
        PRODUCT_CATEGORY
    }

    fn mode(&self) -> BatchMode {
        BatchMode::Deferred {
            priority: Some(BASE_PRIORITY),
        }
    }

    fn run(&self, ctx: &mut SyncContext<'_>, filter: &SearchFilter) -> SyncResult<BatchReport> {
        let adapter = ctx.env.adapter(PRODUCT_CATEGORY)?;
        let updated = if filter.is_unbounded() {
            None
        } else {
            Some(adapter.search(filter)?)
        };
        let nodes = flatten_tree(&adapter.call("tree", &json!({}))?)?;
        let selected: Vec<&TreeNode> = nodes
            .iter()
            .filter(|node| updated.as_ref().map_or(true, |ids| ids.contains(&node.id)))
            .collect();
        info!(total = nodes.len(), selected = selected.len(), "category tree read");

        let mut report = BatchReport {
            found: selected.len(),
            ..BatchReport::default()
        };
        for node in selected {
            let mode = BatchMode::Deferred {
                priority: Some(BASE_PRIORITY + node.level),
            };
            import_found(ctx, PRODUCT_CATEGORY, mode, &node.id, &mut report)?;
        }
        Ok(report)
    }
}
