// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::dag::registry::TaskDefinition;

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone)]
struct DagNode {
    /// Direct dependencies: tasks that must succeed before this one can run.
    deps: Vec<String>,
    /// Direct dependents: tasks that depend on this one.
    dependents: Vec<String>,
}

/// In-memory DAG representation keyed by task name.
///
/// Acyclicity is validated in `config::validate`; this keeps adjacency
/// information for scheduling, the watcher and dry-run output.
#[derive(Debug, Clone)]
pub struct DagGraph {
    nodes: BTreeMap<String, DagNode>,
}

impl DagGraph {
    /// Build a DAG from validated task definitions.
    ///
    /// Assumes that all `after` references are valid and there are no cycles.
    pub fn from_definitions(defs: &[TaskDefinition]) -> Self {
        let mut nodes: BTreeMap<String, DagNode> = defs
            .iter()
            .map(|def| {
                (
                    def.name.clone(),
                    DagNode {
                        deps: def.after.clone(),
                        dependents: Vec::new(),
                    },
                )
            })
            .collect();

        for def in defs {
            for dep in &def.after {
                if let Some(dep_node) = nodes.get_mut(dep) {
                    dep_node.dependents.push(def.name.clone());
                }
            }
        }

        Self { nodes }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Immediate dependencies of a task (the tasks listed in its `after`).
    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task (tasks that list this one in their `after`).
    pub fn dependents_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// `name` plus every transitive predecessor.
    pub fn upstream_closure(&self, name: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![name.to_string()];

        while let Some(current) = stack.pop() {
            if !self.nodes.contains_key(&current) || !seen.insert(current.clone()) {
                continue;
            }
            stack.extend(self.dependencies_of(&current).iter().cloned());
        }

        seen
    }

    /// Task names in an order where every task follows its dependencies.
    pub fn topological_order(&self) -> Vec<String> {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for name in self.nodes.keys() {
            graph.add_node(name.as_str());
        }
        for (name, node) in &self.nodes {
            for dep in &node.deps {
                graph.add_edge(dep.as_str(), name.as_str(), ());
            }
        }

        match toposort(&graph, None) {
            Ok(order) => order.into_iter().map(str::to_string).collect(),
            // Unreachable for validated configs; fall back to name order.
            Err(_) => self.nodes.keys().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::registry::TaskAction;
    use crate::types::ReloadKind;

    fn def(name: &str, after: &[&str]) -> TaskDefinition {
        TaskDefinition {
            name: name.to_string(),
            action: TaskAction::Command(format!("echo {name}")),
            after: after.iter().map(|s| s.to_string()).collect(),
            watch: Vec::new(),
            reload: ReloadKind::None,
        }
    }

    #[test]
    fn upstream_closure_follows_all_predecessors() {
        let graph = DagGraph::from_definitions(&[
            def("a", &[]),
            def("b", &["a"]),
            def("c", &[]),
            def("d", &["b", "c"]),
            def("e", &["d"]),
        ]);
        let closure: Vec<String> = graph.upstream_closure("d").into_iter().collect();
        assert_eq!(closure, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn topological_order_puts_deps_first() {
        let graph = DagGraph::from_definitions(&[
            def("deploy", &["bundle"]),
            def("bundle", &["lint"]),
            def("lint", &[]),
        ]);
        let order = graph.topological_order();
        let pos = |n: &str| order.iter().position(|x| x == n).unwrap();
        assert!(pos("lint") < pos("bundle"));
        assert!(pos("bundle") < pos("deploy"));
    }
}
