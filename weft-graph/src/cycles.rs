//! Cycle detection over dependency and import edges

use rustc_hash::FxHashSet;
use tracing::warn;
use weft_core::Token;

use crate::graph::{EdgeKind, ModuleGraph};
use crate::issues::GraphIssue;

/// Depth-first search over edges of one kind, collecting cycles as edge ids
struct CycleSearch<'a> {
    graph: &'a ModuleGraph,
    kind: EdgeKind,
    visited: FxHashSet<&'a Token>,
    stack: Vec<&'a Token>,
    /// `path[i]` leads from `stack[i]` to `stack[i + 1]`
    path: Vec<usize>,
    cycles: Vec<Vec<usize>>,
}

impl<'a> CycleSearch<'a> {
    fn new(graph: &'a ModuleGraph, kind: EdgeKind) -> Self {
        Self {
            graph,
            kind,
            visited: FxHashSet::default(),
            stack: Vec::new(),
            path: Vec::new(),
            cycles: Vec::new(),
        }
    }

    /// Search from every start in order, one fresh traversal each
    fn run(mut self, starts: impl Iterator<Item = &'a Token>) -> Vec<Vec<usize>> {
        let mut seen: FxHashSet<Vec<usize>> = FxHashSet::default();
        let mut unique = Vec::new();

        for start in starts {
            self.visited.clear();
            self.visit(start);
            for cycle in self.cycles.drain(..) {
                let mut key = cycle.clone();
                key.sort_unstable();
                if seen.insert(key) {
                    unique.push(cycle);
                }
            }
        }

        unique
    }

    fn visit(&mut self, node: &'a Token) {
        let graph = self.graph;
        self.visited.insert(node);
        self.stack.push(node);

        for edge_id in graph.outgoing_of(node, self.kind) {
            let target = &graph.edges[edge_id].target;
            if let Some(pos) = self.stack.iter().position(|&entry| entry == target) {
                let mut cycle = self.path[pos..].to_vec();
                cycle.push(edge_id);
                self.cycles.push(cycle);
            } else if !self.visited.contains(target) {
                self.path.push(edge_id);
                self.visit(target);
                self.path.pop();
            }
        }

        self.stack.pop();
    }
}

impl ModuleGraph {
    /// Flag dependency edges lying on a cycle and record each cycle once
    pub(crate) fn detect_circular_dependencies(&mut self) {
        let starts = self.providers().map(|node| &node.token);
        let cycles = CycleSearch::new(self, EdgeKind::Dependency).run(starts);

        for cycle in cycles {
            let mut path: Vec<Token> = cycle
                .iter()
                .map(|&id| self.edges[id].source.clone())
                .collect();
            if let Some(first) = path.first().cloned() {
                path.push(first);
            }
            let lazy = cycle.iter().any(|&id| self.edges[id].metadata.lazy);

            for &id in &cycle {
                self.edges[id].metadata.is_circular = true;
            }

            let issue = GraphIssue::CircularProviderDependency { path, lazy };
            warn!("{}", issue);
            self.issues.push(issue);
        }
    }

    /// Flag import edges lying on a cycle and record each cycle once
    pub(crate) fn detect_circular_imports(&mut self) {
        let starts = self.modules().map(|node| &node.token);
        let cycles = CycleSearch::new(self, EdgeKind::Import).run(starts);

        for cycle in cycles {
            // Import edges point from the imported module to the importer;
            // report the path in import order.
            let mut path: Vec<Token> = cycle
                .iter()
                .rev()
                .map(|&id| self.edges[id].target.clone())
                .collect();
            if let Some(first) = path.first().cloned() {
                path.push(first);
            }

            for &id in &cycle {
                self.edges[id].metadata.is_circular = true;
            }

            let issue = GraphIssue::CircularImport { path };
            warn!("{}", issue);
            self.issues.push(issue);
        }
    }
}
