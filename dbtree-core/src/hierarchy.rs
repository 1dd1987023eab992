//! The four-level navigation tree: root, catalogs, tables, columns.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`], so the tree
//! serializes as a flat list and has no ownership cycles. The tree is built
//! once, eagerly, and never changes afterwards.

use crate::error::{DbTreeError, ErrorKind};
use crate::explorer::SchemaExplorer;
use crate::models::ColumnRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Instant;

/// Label of the synthetic root node
pub const ROOT_LABEL: &str = "Databases";

/// Index of a node in its [`Hierarchy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    /// The root is always the first node.
    pub const ROOT: Self = Self(0);

    /// Position in the node arena.
    pub const fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a node stands for. Each level holds exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// The synthetic root
    Root,
    /// A catalog
    Catalog,
    /// A table or view
    Table,
    /// A column, always a leaf
    Column,
}

impl NodeKind {
    /// Distance from the root.
    pub const fn depth(self) -> usize {
        match self {
            Self::Root => 0,
            Self::Catalog => 1,
            Self::Table => 2,
            Self::Column => 3,
        }
    }

    /// Kind of this node's children, `None` for leaves.
    pub const fn child_kind(self) -> Option<Self> {
        match self {
            Self::Root => Some(Self::Catalog),
            Self::Catalog => Some(Self::Table),
            Self::Table => Some(Self::Column),
            Self::Column => None,
        }
    }
}

/// One node of the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyNode {
    /// Position in the arena
    pub id: NodeId,
    /// Name shown for the node
    pub label: String,
    /// Level of the node
    pub kind: NodeKind,
    /// Parent node, `None` only for the root
    pub parent: Option<NodeId>,
    /// Child nodes in discovery order
    pub children: Vec<NodeId>,
}

impl HierarchyNode {
    /// Columns are the only leaves. A table without columns is not a leaf.
    pub fn is_leaf(&self) -> bool {
        self.kind == NodeKind::Column
    }
}

/// Which discovery step failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum DiscoveryScope {
    /// Listing catalogs
    Catalogs,
    /// Listing the tables of a catalog
    Tables { catalog: String },
    /// Listing the columns of a table
    Columns { catalog: String, table: String },
}

impl std::fmt::Display for DiscoveryScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Catalogs => write!(f, "catalog listing"),
            Self::Tables { catalog } => write!(f, "tables of '{}'", catalog),
            Self::Columns { catalog, table } => write!(f, "columns of '{}.{}'", catalog, table),
        }
    }
}

/// A discovery step that failed; its branch is missing from the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryFailure {
    /// Step that failed
    pub scope: DiscoveryScope,
    /// Failure category
    pub kind: ErrorKind,
    /// Sanitized error message
    pub message: String,
}

/// The discovered tree plus what went wrong while building it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hierarchy {
    nodes: Vec<HierarchyNode>,
    /// Discovery steps that failed, in the order they ran
    pub failures: Vec<DiscoveryFailure>,
    /// When discovery started
    pub discovered_at: DateTime<Utc>,
    /// How long discovery took
    pub duration_ms: u64,
}

impl Hierarchy {
    /// A tree holding only the root.
    pub fn new(discovered_at: DateTime<Utc>) -> Self {
        Self {
            nodes: vec![HierarchyNode {
                id: NodeId::ROOT,
                label: ROOT_LABEL.to_string(),
                kind: NodeKind::Root,
                parent: None,
                children: Vec::new(),
            }],
            failures: Vec::new(),
            discovered_at,
            duration_ms: 0,
        }
    }

    /// Appends a child of `parent` one level below it.
    ///
    /// Returns `None` if `parent` is unknown or is a leaf.
    pub fn push_child(&mut self, parent: NodeId, label: impl Into<String>) -> Option<NodeId> {
        let kind = self.node(parent)?.kind.child_kind()?;
        let id = NodeId(self.nodes.len());
        self.nodes.push(HierarchyNode {
            id,
            label: label.into(),
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes.get_mut(parent.0)?.children.push(id);
        Some(id)
    }

    fn record_failure(&mut self, scope: DiscoveryScope, error: &DbTreeError) {
        tracing::warn!("Discovery of {} failed: {}", scope, error);
        self.failures.push(DiscoveryFailure {
            scope,
            kind: error.kind(),
            message: error.to_string(),
        });
    }

    /// The root node.
    pub fn root(&self) -> &HierarchyNode {
        &self.nodes[NodeId::ROOT.0]
    }

    /// Node `id`, if it exists.
    pub fn node(&self, id: NodeId) -> Option<&HierarchyNode> {
        self.nodes.get(id.0)
    }

    /// All nodes in pre-order.
    pub fn nodes(&self) -> &[HierarchyNode] {
        &self.nodes
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when only the root exists.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Children of `id` in discovery order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &HierarchyNode> {
        self.node(id)
            .into_iter()
            .flat_map(|node| node.children.iter())
            .filter_map(|child| self.node(*child))
    }

    /// Parent of `id`, `None` for the root.
    pub fn parent(&self, id: NodeId) -> Option<&HierarchyNode> {
        self.node(id)?.parent.and_then(|parent| self.node(parent))
    }

    /// Number of edges between `id` and the root.
    pub fn depth(&self, id: NodeId) -> Option<usize> {
        let mut depth = 0usize;
        let mut current = self.node(id)?;
        while let Some(parent) = current.parent {
            current = self.node(parent)?;
            depth = depth.saturating_add(1);
        }
        Some(depth)
    }

    /// Catalog nodes in discovery order.
    pub fn catalogs(&self) -> impl Iterator<Item = &HierarchyNode> {
        self.children(NodeId::ROOT)
    }

    /// Catalog node named `name`.
    pub fn find_catalog(&self, name: &str) -> Option<&HierarchyNode> {
        self.catalogs().find(|node| node.label == name)
    }

    /// Table node `table` inside catalog `catalog`.
    pub fn find_table(&self, catalog: &str, table: &str) -> Option<&HierarchyNode> {
        let catalog = self.find_catalog(catalog)?;
        self.children(catalog.id).find(|node| node.label == table)
    }

    /// Column nodes in tree order.
    pub fn leaves(&self) -> impl Iterator<Item = &HierarchyNode> {
        self.nodes.iter().filter(|node| node.is_leaf())
    }

    /// Number of nodes of `kind`.
    pub fn count(&self, kind: NodeKind) -> usize {
        self.nodes.iter().filter(|node| node.kind == kind).count()
    }

    /// Resolves a column leaf to its `(catalog, table, column)` from ancestry.
    pub fn column_ref(&self, id: NodeId) -> Option<ColumnRef> {
        let column = self.node(id).filter(|node| node.is_leaf())?;
        let table = self.parent(column.id)?;
        let catalog = self.parent(table.id)?;
        Some(ColumnRef::new(
            catalog.label.clone(),
            table.label.clone(),
            column.label.clone(),
        ))
    }

    /// True when every discovery step succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Indented outline, two spaces per level, one node per line.
    pub fn render_outline(&self) -> String {
        let mut out = String::new();
        let mut stack = vec![NodeId::ROOT];
        while let Some(id) = stack.pop() {
            let Some(node) = self.node(id) else { continue };
            let indent = node.kind.depth().saturating_mul(2);
            let _ = writeln!(out, "{:indent$}{}", "", node.label, indent = indent);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }
}

/// Assembles a [`Hierarchy`] from [`SchemaExplorer`] results.
///
/// Discovery failures never abort the build: the failed branch is left out,
/// the failure is recorded on the hierarchy and discovery moves on.
#[derive(Debug, Clone, Copy)]
pub struct HierarchyBuilder<'a> {
    explorer: &'a SchemaExplorer,
}

impl<'a> HierarchyBuilder<'a> {
    /// Creates a builder over `explorer`.
    pub const fn new(explorer: &'a SchemaExplorer) -> Self {
        Self { explorer }
    }

    /// Walks catalogs, then each catalog's tables, then each table's columns.
    ///
    /// Calls are issued one after another; each opens its own connection.
    pub async fn build(&self) -> Hierarchy {
        let started = Instant::now();
        let mut hierarchy = Hierarchy::new(Utc::now());

        let catalogs = match self.explorer.list_catalogs().await {
            Ok(catalogs) => catalogs,
            Err(e) => {
                hierarchy.record_failure(DiscoveryScope::Catalogs, &e);
                Vec::new()
            }
        };

        for catalog in catalogs {
            let Some(catalog_id) = hierarchy.push_child(NodeId::ROOT, catalog.name.clone()) else {
                continue;
            };

            let tables = match self.explorer.list_tables(&catalog.name).await {
                Ok(tables) => tables,
                Err(e) => {
                    let scope = DiscoveryScope::Tables {
                        catalog: catalog.name.clone(),
                    };
                    hierarchy.record_failure(scope, &e);
                    continue;
                }
            };

            for table in tables {
                let Some(table_id) = hierarchy.push_child(catalog_id, table.name.clone()) else {
                    continue;
                };

                match self.explorer.list_columns(&catalog.name, &table.name).await {
                    Ok(columns) => {
                        for column in columns {
                            hierarchy.push_child(table_id, column.name);
                        }
                    }
                    Err(e) => {
                        let scope = DiscoveryScope::Columns {
                            catalog: catalog.name.clone(),
                            table: table.name.clone(),
                        };
                        hierarchy.record_failure(scope, &e);
                    }
                }
            }
        }

        hierarchy.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            "Discovered {} catalogs, {} tables and {} columns in {}ms ({} failures)",
            hierarchy.count(NodeKind::Catalog),
            hierarchy.count(NodeKind::Table),
            hierarchy.count(NodeKind::Column),
            hierarchy.duration_ms,
            hierarchy.failures.len()
        );
        hierarchy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Hierarchy {
        let mut tree = Hierarchy::new(Utc::now());
        let pets = tree.push_child(NodeId::ROOT, "pets").unwrap();
        let dogs = tree.push_child(pets, "dogs").unwrap();
        tree.push_child(dogs, "id").unwrap();
        tree.push_child(dogs, "name").unwrap();
        tree.push_child(pets, "cats").unwrap();
        tree.push_child(NodeId::ROOT, "test").unwrap();
        tree
    }

    #[test]
    fn test_push_child_assigns_next_level() {
        let tree = sample();
        assert_eq!(tree.root().label, ROOT_LABEL);
        assert_eq!(tree.len(), 7);

        let dogs = tree.find_table("pets", "dogs").unwrap();
        assert_eq!(dogs.kind, NodeKind::Table);
        assert_eq!(tree.depth(dogs.id), Some(2));
        assert_eq!(tree.parent(dogs.id).unwrap().label, "pets");

        let leaf = tree.children(dogs.id).next().unwrap();
        assert!(leaf.is_leaf());
        let mut tree = tree.clone();
        assert!(tree.push_child(leaf.id, "nested").is_none());
    }

    #[test]
    fn test_table_without_columns_is_not_leaf() {
        let tree = sample();
        let cats = tree.find_table("pets", "cats").unwrap();
        assert!(cats.children.is_empty());
        assert!(!cats.is_leaf());
        assert_eq!(tree.leaves().count(), 2);
    }

    #[test]
    fn test_column_ref_from_ancestry() {
        let tree = sample();
        let leaf = tree.leaves().find(|n| n.label == "name").unwrap();
        assert_eq!(
            tree.column_ref(leaf.id),
            Some(ColumnRef::new("pets", "dogs", "name"))
        );

        let table = tree.find_table("pets", "dogs").unwrap();
        assert_eq!(tree.column_ref(table.id), None);
        assert_eq!(tree.column_ref(NodeId(99)), None);
    }

    #[test]
    fn test_render_outline() {
        let expected = "Databases\n  pets\n    dogs\n      id\n      name\n    cats\n  test\n";
        assert_eq!(sample().render_outline(), expected);
    }

    #[test]
    fn test_serializes_flat() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["nodes"].as_array().unwrap().len(), 7);
        assert_eq!(json["nodes"][1]["kind"], "catalog");
        assert_eq!(json["nodes"][1]["parent"], 0);
    }

    #[test]
    fn test_discovery_scope_serialization() {
        let failure = DiscoveryFailure {
            scope: DiscoveryScope::Columns {
                catalog: "pets".to_string(),
                table: "dogs".to_string(),
            },
            kind: ErrorKind::Query,
            message: "denied".to_string(),
        };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["scope"]["level"], "columns");
        assert_eq!(json["kind"], "query");
        assert_eq!(failure.scope.to_string(), "columns of 'pets.dogs'");
    }
}
