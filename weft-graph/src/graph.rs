//! Module graph: node arena, edge list and the read-only view

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use weft_core::{DependencyKind, InjectionSite, Provider, Scope, Token};

use crate::issues::GraphIssue;
use crate::registry::ModuleRecord;

/// Kind of a graph edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// `imported -> importer`
    Import,
    /// `provider -> declaring module`
    Provider,
    /// `provider -> dependency token`
    Dependency,
}

/// Edge annotations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeMetadata {
    /// Set by cycle detection when the edge lies on a cycle
    pub is_circular: bool,
    /// The dependency target is not visible from the owning module
    pub unreached: bool,
    /// Injection site, dependency edges only
    pub site: Option<InjectionSite>,
    /// Dependency kind, dependency edges only
    pub dependency: Option<DependencyKind>,
    /// Declared lazy reference
    pub lazy: bool,
}

#[derive(Debug, Clone)]
pub struct GraphEdge {
    pub kind: EdgeKind,
    pub source: Token,
    pub target: Token,
    pub metadata: EdgeMetadata,
}

impl GraphEdge {
    pub fn is_circular(&self) -> bool {
        self.metadata.is_circular
    }

    pub fn is_unreached(&self) -> bool {
        self.metadata.unreached
    }
}

#[derive(Debug, Clone)]
pub struct ModuleNode {
    pub id: usize,
    pub label: String,
    pub token: Token,
    pub record: Arc<ModuleRecord>,
    pub is_global: bool,
    pub is_dynamic: bool,
}

#[derive(Debug, Clone)]
pub struct ProviderNode {
    pub id: usize,
    pub label: String,
    pub token: Token,
    pub scope: Scope,
    pub provider: Provider,
    /// Module that declared the provider
    pub module: Token,
}

/// A node of the module graph
#[derive(Debug, Clone)]
pub enum GraphNode {
    Module(ModuleNode),
    Provider(ProviderNode),
}

impl GraphNode {
    pub fn id(&self) -> usize {
        match self {
            GraphNode::Module(node) => node.id,
            GraphNode::Provider(node) => node.id,
        }
    }

    pub fn token(&self) -> &Token {
        match self {
            GraphNode::Module(node) => &node.token,
            GraphNode::Provider(node) => &node.token,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            GraphNode::Module(node) => &node.label,
            GraphNode::Provider(node) => &node.label,
        }
    }

    pub fn as_module(&self) -> Option<&ModuleNode> {
        match self {
            GraphNode::Module(node) => Some(node),
            GraphNode::Provider(_) => None,
        }
    }

    pub fn as_provider(&self) -> Option<&ProviderNode> {
        match self {
            GraphNode::Provider(node) => Some(node),
            GraphNode::Module(_) => None,
        }
    }
}

/// Compilation state of a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    Uncompiled,
    Compiling,
    Compiled,
}

/// What to do when two modules declare the same provider token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Keep the first declaration and record an issue
    #[default]
    FirstWins,
    /// Fail the compile
    Reject,
}

/// Options applied while compiling a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Scope of class and factory providers that declare none
    pub default_scope: Scope,
    pub duplicate_providers: DuplicatePolicy,
}

/// Directed multigraph of module and provider nodes
///
/// Nodes live in an arena indexed by token; edges reference nodes by token,
/// so a dependency edge may point at a token that has no node.
#[derive(Debug)]
pub struct ModuleGraph {
    pub(crate) options: CompileOptions,
    pub(crate) state: GraphState,
    pub(crate) nodes: Vec<GraphNode>,
    pub(crate) index: FxHashMap<Token, usize>,
    pub(crate) edges: Vec<GraphEdge>,
    pub(crate) outgoing: FxHashMap<Token, Vec<usize>>,
    pub(crate) incoming: FxHashMap<Token, Vec<usize>>,
    pub(crate) global_exports: FxHashSet<Token>,
    pub(crate) issues: Vec<GraphIssue>,
}

impl Default for ModuleGraph {
    fn default() -> Self {
        Self::new(CompileOptions::default())
    }
}

impl ModuleGraph {
    pub fn new(options: CompileOptions) -> Self {
        Self {
            options,
            state: GraphState::Uncompiled,
            nodes: Vec::new(),
            index: FxHashMap::default(),
            edges: Vec::new(),
            outgoing: FxHashMap::default(),
            incoming: FxHashMap::default(),
            global_exports: FxHashSet::default(),
            issues: Vec::new(),
        }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn state(&self) -> GraphState {
        self.state
    }

    pub fn is_compiled(&self) -> bool {
        self.state == GraphState::Compiled
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn get_node(&self, token: &Token) -> Option<&GraphNode> {
        self.index.get(token).map(|&id| &self.nodes[id])
    }

    pub fn get_module(&self, token: &Token) -> Option<&ModuleNode> {
        self.get_node(token).and_then(GraphNode::as_module)
    }

    pub fn get_provider(&self, token: &Token) -> Option<&ProviderNode> {
        self.get_node(token).and_then(GraphNode::as_provider)
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleNode> {
        self.nodes.iter().filter_map(GraphNode::as_module)
    }

    pub fn providers(&self) -> impl Iterator<Item = &ProviderNode> {
        self.nodes.iter().filter_map(GraphNode::as_provider)
    }

    /// First edge from `source` to `target`, of any kind
    pub fn get_edge(&self, source: &Token, target: &Token) -> Option<&GraphEdge> {
        self.edges_from(source).find(|edge| &edge.target == target)
    }

    pub fn edges_from<'a>(&'a self, token: &Token) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        self.edge_ids(&self.outgoing, token)
            .iter()
            .map(move |&id| &self.edges[id])
    }

    pub fn edges_to<'a>(&'a self, token: &Token) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        self.edge_ids(&self.incoming, token)
            .iter()
            .map(move |&id| &self.edges[id])
    }

    /// Dependency edges of a provider, in declaration order
    pub fn dependency_edges<'a>(&'a self, token: &Token) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        self.edges_from(token)
            .filter(|edge| edge.kind == EdgeKind::Dependency)
    }

    /// Problems found during compilation that did not fail it
    pub fn issues(&self) -> &[GraphIssue] {
        &self.issues
    }

    fn edge_ids<'a>(&self, map: &'a FxHashMap<Token, Vec<usize>>, token: &Token) -> &'a [usize] {
        map.get(token).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn outgoing_of(&self, token: &Token, kind: EdgeKind) -> Vec<usize> {
        self.edge_ids(&self.outgoing, token)
            .iter()
            .copied()
            .filter(|&id| self.edges[id].kind == kind)
            .collect()
    }

    pub(crate) fn push_node(&mut self, token: Token, node: GraphNode) {
        self.index.insert(token, node.id());
        self.nodes.push(node);
    }

    /// Append an edge; import edges are deduplicated
    pub(crate) fn push_edge(&mut self, edge: GraphEdge) -> usize {
        if edge.kind == EdgeKind::Import {
            if let Some(existing) = self
                .edge_ids(&self.outgoing, &edge.source)
                .iter()
                .copied()
                .find(|&id| {
                    let other = &self.edges[id];
                    other.kind == EdgeKind::Import && other.target == edge.target
                })
            {
                return existing;
            }
        }

        let id = self.edges.len();
        self.outgoing.entry(edge.source.clone()).or_default().push(id);
        self.incoming.entry(edge.target.clone()).or_default().push(id);
        self.edges.push(edge);
        id
    }

    pub(crate) fn reset(&mut self) {
        self.state = GraphState::Uncompiled;
        self.nodes.clear();
        self.index.clear();
        self.edges.clear();
        self.outgoing.clear();
        self.incoming.clear();
        self.global_exports.clear();
        self.issues.clear();
    }
}
