//! Execution tree to DOT (Graphviz) conversion.
//!
//! # DOT Format
//!
//! - **Trie nodes** are circles labeled with their statement, grouped by depth
//! - **The root**, which precedes every first statement, is a point at the top (source rank)
//! - **States** resting at a node are boxes labeled with their id, tied to the node by a dashed edge
//!
//! # Examples
//!
//! ```
//! use std::rc::Rc;
//!
//! use symex_rs::expr::ExprManager;
//! use symex_rs::state::SymbolicState;
//! use symex_rs::tree::ExecutionTree;
//! use symex_rs::types::HierarchyTypeSystem;
//!
//! let ctx = Rc::new(ExprManager::new());
//! let types = Rc::new(HierarchyTypeSystem::new("Object"));
//! let state = SymbolicState::new(ctx, types, "main", 1u32);
//!
//! let mut tree = ExecutionTree::new();
//! tree.add(state);
//! let dot = tree.to_dot().unwrap();
//! // Render with: dot -Tpng tree.dot -o tree.png
//! assert!(dot.starts_with("digraph {"));
//! ```

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::state::ExecutionState;
use crate::tree::ExecutionTree;

/// Appearance of the generated graph.
#[derive(Debug, Clone)]
pub struct DotConfig {
    /// Shape of trie nodes (default: "circle")
    pub node_shape: &'static str,
    /// Shape of the trie root (default: "point")
    pub root_shape: &'static str,
    /// Shape of state boxes (default: "box")
    pub state_shape: &'static str,
    /// Style of parent-child edges (default: "solid")
    pub tree_edge_style: &'static str,
    /// Style of the edges from a node to its states (default: "dashed")
    pub state_edge_style: &'static str,
    /// Whether to draw the states at all (default: true)
    pub show_states: bool,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            node_shape: "circle",
            root_shape: "point",
            state_shape: "box",
            tree_edge_style: "solid",
            state_edge_style: "dashed",
            show_states: true,
        }
    }
}

impl<St: ExecutionState> ExecutionTree<St> {
    pub fn to_dot(&self) -> Result<String, std::fmt::Error> {
        self.to_dot_with_config(&DotConfig::default())
    }

    /// Render the whole trie, ranking nodes by depth.
    pub fn to_dot_with_config(&self, config: &DotConfig) -> Result<String, std::fmt::Error> {
        let mut dot = String::new();
        writeln!(dot, "digraph {{")?;
        writeln!(dot, "node [shape={}];", config.node_shape)?;

        let root = self.root();
        writeln!(dot, "{{ rank=source")?;
        writeln!(dot, "{} [shape={}, label=\"\"];", root, config.root_shape)?;
        writeln!(dot, "}}")?;

        let mut levels = BTreeMap::<usize, Vec<_>>::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let children = self.children_of(id);
            stack.extend(children.iter().rev().copied());
            if id != root {
                levels.entry(self.depth_of(id)).or_default().push(id);
            }
        }

        for level in levels.values() {
            writeln!(dot, "{{ rank=same")?;
            for &id in level {
                if let Some(statement) = self.statement_of(id) {
                    let label = format!("{:?}", statement).replace('"', "\\\"");
                    writeln!(dot, "{} [label=\"{}\"];", id, label)?;
                }
            }
            writeln!(dot, "}}")?;
        }

        for id in std::iter::once(root).chain(levels.values().flatten().copied()) {
            for child in self.children_of(id) {
                writeln!(dot, "{} -> {} [style={}];", id, child, config.tree_edge_style)?;
            }
        }

        if config.show_states {
            for id in std::iter::once(root).chain(levels.values().flatten().copied()) {
                for state in self.states_at(id) {
                    writeln!(dot, "{} [shape={}];", state.id(), config.state_shape)?;
                    writeln!(
                        dot,
                        "{} -> {} [style={}, arrowhead=none];",
                        id,
                        state.id(),
                        config.state_edge_style
                    )?;
                }
            }
        }

        writeln!(dot, "}}")?;
        Ok(dot)
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::expr::ExprManager;
    use crate::state::tests::state_at;

    #[test]
    fn test_to_dot_basic() {
        let ctx = Rc::new(ExprManager::new());
        let mut tree = ExecutionTree::new();
        let mut s = state_at(&ctx, 1);
        s.advance(2);
        let mut t = s.fork();
        t.advance(3);
        tree.add(s.clone());
        tree.add(t.clone());

        let dot = tree.to_dot().unwrap();
        assert!(dot.starts_with("digraph {"));
        assert!(dot.ends_with("}\n"));
        assert!(dot.contains("n0 -> n1 [style=solid];"));
        assert!(dot.contains(&format!("{} [shape=box];", t.id())));
        assert!(dot.contains("[label=\"3\"]"));
    }

    #[test]
    fn test_to_dot_without_states() {
        let ctx = Rc::new(ExprManager::new());
        let mut tree = ExecutionTree::new();
        let s = state_at(&ctx, 1);
        tree.add(s.clone());

        let config = DotConfig {
            show_states: false,
            ..DotConfig::default()
        };
        let dot = tree.to_dot_with_config(&config).unwrap();
        assert!(!dot.contains(&s.id().to_string()));
    }

    /// Writes a DOT file for manual inspection.
    #[test]
    #[ignore]
    fn test_write_dot_file() {
        let ctx = Rc::new(ExprManager::new());
        let mut tree = ExecutionTree::new();
        let mut s = state_at(&ctx, 1);
        s.advance(2);
        tree.add(s);

        let dot = tree.to_dot().unwrap();
        std::fs::write("test_output.dot", &dot).unwrap();
        println!("DOT output:\n{}", dot);
    }
}
