//! Export visibility between modules

use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use weft_core::Token;

use crate::graph::{EdgeKind, GraphNode, ModuleGraph};

impl ModuleGraph {
    /// Whether `token` can be injected into providers of `module`
    ///
    /// A token is visible when a global module exports it, when `module`
    /// declares it, or when a module reachable through imports exports it.
    pub fn is_provider_exported(&self, module: &Token, token: &Token) -> bool {
        if self.global_exports.contains(token) {
            return true;
        }

        let Some(GraphNode::Module(owner)) = self.get_node(module) else {
            return false;
        };
        if owner.record.declares_provider(token) {
            return true;
        }

        let mut visited: FxHashSet<&Token> = FxHashSet::default();
        let mut queue: VecDeque<&Token> = VecDeque::new();
        visited.insert(module);
        queue.push_back(module);

        while let Some(current) = queue.pop_front() {
            for edge in self.edges_to(current) {
                if edge.kind != EdgeKind::Import || !visited.insert(&edge.source) {
                    continue;
                }
                if let Some(imported) = self.get_module(&edge.source) {
                    if imported.record.exports_token(token) {
                        return true;
                    }
                }
                queue.push_back(&edge.source);
            }
        }

        false
    }
}
