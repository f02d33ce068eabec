//! Dependency graph of stacks.
//!
//! Edges come from output lookups: `A -> B` when a variable of `A` contains
//! `${output B::Key}`. The graph is an index arena; stacks never hold
//! references to each other.

use crate::config::Config;
use crate::core::Stack;
use crate::errors::{
    ConfigStructureError, CycleDetectedError, DuplicateStackError, StackerError,
    UnknownStackReferenceError,
};
use crate::lookup::output_dependencies;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};
use std::fmt::Write as _;

/// Traversal direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Dependencies before dependents (build, diff).
    Forward,
    /// Dependents before dependencies (destroy).
    Reverse,
}

/// A validated, acyclic graph of stacks.
#[derive(Debug, Clone)]
pub struct StackGraph {
    /// The configuration namespace.
    namespace: String,
    /// Stacks in configuration order.
    stacks: Vec<Stack>,
    /// Name to index.
    index: HashMap<String, usize>,
    /// Stacks each stack consumes outputs from.
    dependencies: Vec<Vec<usize>>,
    /// Stacks consuming each stack's outputs.
    dependents: Vec<Vec<usize>>,
    /// Topological order, ties broken by configuration order.
    execution_order: Vec<usize>,
}

impl StackGraph {
    /// Builds the graph from a configuration.
    ///
    /// Checks run in a fixed order: structure, duplicate names, lookup syntax
    /// and unknown references, then cycles.
    pub fn build(config: &Config) -> Result<Self, StackerError> {
        if config.stacks.is_empty() {
            return Err(ConfigStructureError::new("`stacks` must not be empty").into());
        }

        let mut index = HashMap::with_capacity(config.stacks.len());
        for (position, definition) in config.stacks.iter().enumerate() {
            if index.insert(definition.name.clone(), position).is_some() {
                return Err(DuplicateStackError::new(definition.name.as_str()).into());
            }
        }

        let mut dependencies = vec![Vec::new(); config.stacks.len()];
        for (position, definition) in config.stacks.iter().enumerate() {
            for target in output_dependencies(definition)? {
                let Some(&target_index) = index.get(&target) else {
                    return Err(
                        UnknownStackReferenceError::new(definition.name.as_str(), target).into()
                    );
                };
                dependencies[position].push(target_index);
            }
            dependencies[position].sort_unstable();
            dependencies[position].dedup();
        }

        let mut dependents = vec![Vec::new(); config.stacks.len()];
        for (position, deps) in dependencies.iter().enumerate() {
            for &dep in deps {
                dependents[dep].push(position);
            }
        }

        let stacks: Vec<Stack> = config
            .stacks
            .iter()
            .cloned()
            .map(|definition| Stack::new(&config.namespace, definition))
            .collect();

        detect_cycles(&stacks, &dependencies)?;
        let execution_order = topological_sort(&dependencies, &dependents);

        Ok(Self {
            namespace: config.namespace.clone(),
            stacks,
            index,
            dependencies,
            dependents,
            execution_order,
        })
    }

    /// Returns the namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the number of stacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    /// Returns true if the graph has no stacks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    /// Returns the stacks in configuration order.
    #[must_use]
    pub fn stacks(&self) -> &[Stack] {
        &self.stacks
    }

    /// Returns the stack at an index.
    #[must_use]
    pub fn stack(&self, index: usize) -> &Stack {
        &self.stacks[index]
    }

    /// Returns the index of a stack by name.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Returns the stacks whose outputs `index` consumes.
    #[must_use]
    pub fn dependencies(&self, index: usize) -> &[usize] {
        &self.dependencies[index]
    }

    /// Returns the stacks consuming the outputs of `index`.
    #[must_use]
    pub fn dependents(&self, index: usize) -> &[usize] {
        &self.dependents[index]
    }

    /// Returns what must finish before `index` runs in the given direction.
    #[must_use]
    pub fn prerequisites(&self, index: usize, direction: Direction) -> &[usize] {
        match direction {
            Direction::Forward => self.dependencies(index),
            Direction::Reverse => self.dependents(index),
        }
    }

    /// Returns what waits on `index` in the given direction.
    #[must_use]
    pub fn followers(&self, index: usize, direction: Direction) -> &[usize] {
        match direction {
            Direction::Forward => self.dependents(index),
            Direction::Reverse => self.dependencies(index),
        }
    }

    /// Returns every stack that transitively waits on `index`.
    #[must_use]
    pub fn transitive_followers(&self, index: usize, direction: Direction) -> BTreeSet<usize> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![index];
        while let Some(current) = stack.pop() {
            for &next in self.followers(current, direction) {
                if seen.insert(next) {
                    stack.push(next);
                }
            }
        }
        seen
    }

    /// Returns every stack that transitively consumes outputs of `index`.
    #[must_use]
    pub fn transitive_dependents(&self, index: usize) -> BTreeSet<usize> {
        self.transitive_followers(index, Direction::Forward)
    }

    /// Returns the topological order (dependencies first).
    #[must_use]
    pub fn execution_order(&self) -> &[usize] {
        &self.execution_order
    }

    /// Returns the processing order for a direction.
    ///
    /// The reverse order is exactly the forward order backwards.
    #[must_use]
    pub fn order(&self, direction: Direction) -> Vec<usize> {
        match direction {
            Direction::Forward => self.execution_order.clone(),
            Direction::Reverse => self.execution_order.iter().rev().copied().collect(),
        }
    }

    /// Returns the stacks in processing order for a direction.
    #[must_use]
    pub fn ordered_stacks(&self, direction: Direction) -> Vec<&Stack> {
        self.order(direction)
            .into_iter()
            .map(|index| &self.stacks[index])
            .collect()
    }

    /// Renders a human-readable plan outline.
    #[must_use]
    pub fn outline(&self, direction: Direction) -> String {
        let mut out = String::new();
        for (step, index) in self.order(direction).into_iter().enumerate() {
            let stack = &self.stacks[index];
            let _ = write!(out, "{:>3}. {}", step + 1, stack.fqn());
            let waits_on: Vec<&str> = self
                .prerequisites(index, direction)
                .iter()
                .map(|&dep| self.stacks[dep].fqn())
                .collect();
            if !waits_on.is_empty() {
                let _ = write!(out, " (after {})", waits_on.join(", "));
            }
            out.push('\n');
        }
        out
    }
}

/// Detects cycles with a depth-first search tracking the active path.
fn detect_cycles(stacks: &[Stack], dependencies: &[Vec<usize>]) -> Result<(), CycleDetectedError> {
    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    // Configuration order keeps the reported cycle stable across runs.
    for node in 0..stacks.len() {
        if !visited.contains(&node) {
            if let Some(cycle) = dfs_cycle(node, dependencies, &mut visited, &mut rec_stack, &mut path) {
                let names = cycle
                    .into_iter()
                    .map(|i| stacks[i].name().to_string())
                    .collect();
                return Err(CycleDetectedError::new(names));
            }
        }
    }

    Ok(())
}

fn dfs_cycle(
    node: usize,
    dependencies: &[Vec<usize>],
    visited: &mut HashSet<usize>,
    rec_stack: &mut HashSet<usize>,
    path: &mut Vec<usize>,
) -> Option<Vec<usize>> {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    for &dep in &dependencies[node] {
        if !visited.contains(&dep) {
            if let Some(cycle) = dfs_cycle(dep, dependencies, visited, rec_stack, path) {
                return Some(cycle);
            }
        } else if rec_stack.contains(&dep) {
            let cycle_start = path.iter().position(|&n| n == dep).unwrap_or(0);
            let mut cycle = path[cycle_start..].to_vec();
            cycle.push(dep);
            return Some(cycle);
        }
    }

    path.pop();
    rec_stack.remove(&node);
    None
}

/// Kahn's algorithm; among ready stacks the earliest declared goes first.
fn topological_sort(dependencies: &[Vec<usize>], dependents: &[Vec<usize>]) -> Vec<usize> {
    let mut in_degree: Vec<usize> = dependencies.iter().map(Vec::len).collect();
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &degree)| degree == 0)
        .map(|(node, _)| Reverse(node))
        .collect();

    let mut order = Vec::with_capacity(dependencies.len());
    while let Some(Reverse(node)) = ready.pop() {
        order.push(node);
        for &child in &dependents[node] {
            in_degree[child] -= 1;
            if in_degree[child] == 0 {
                ready.push(Reverse(child));
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StackDefinition;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn def(name: &str, refs: &[&str]) -> StackDefinition {
        let mut definition = StackDefinition::new(name, format!("{name}.json"));
        for (i, target) in refs.iter().enumerate() {
            definition =
                definition.with_variable(format!("Ref{i}"), json!(format!("${{output {target}::Id}}")));
        }
        definition
    }

    fn names(graph: &StackGraph, direction: Direction) -> Vec<String> {
        graph
            .ordered_stacks(direction)
            .into_iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    #[test]
    fn test_single_stack() {
        let graph = StackGraph::build(&Config::new("ns", vec![def("vpc", &[])])).unwrap();
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.stack(0).fqn(), "ns-vpc");
        assert_eq!(graph.execution_order(), &[0]);
    }

    #[test]
    fn test_dependency_order() {
        // Declared out of order on purpose.
        let config = Config::new(
            "ns",
            vec![def("app", &["db", "vpc"]), def("db", &["vpc"]), def("vpc", &[])],
        );
        let graph = StackGraph::build(&config).unwrap();

        assert_eq!(names(&graph, Direction::Forward), vec!["vpc", "db", "app"]);
        assert_eq!(names(&graph, Direction::Reverse), vec!["app", "db", "vpc"]);
        assert_eq!(graph.dependencies(0), &[1, 2]);
        assert_eq!(graph.dependents(2), &[0, 1]);
    }

    #[test]
    fn test_ties_follow_configuration_order() {
        let config = Config::new(
            "ns",
            vec![def("c", &[]), def("a", &[]), def("b", &[]), def("d", &["a"])],
        );
        let graph = StackGraph::build(&config).unwrap();

        assert_eq!(names(&graph, Direction::Forward), vec!["c", "a", "b", "d"]);
    }

    #[test]
    fn test_empty_config_rejected() {
        let err = StackGraph::build(&Config::new("ns", vec![])).unwrap_err();
        assert!(matches!(err, StackerError::ConfigStructure(_)));
    }

    #[test]
    fn test_duplicate_checked_before_references() {
        let config = Config::new("ns", vec![def("vpc", &["ghost"]), def("vpc", &[])]);
        let err = StackGraph::build(&config).unwrap_err();

        match err {
            StackerError::DuplicateStack(e) => assert_eq!(e.name, "vpc"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_reference() {
        let config = Config::new("ns", vec![def("app", &["ghost"])]);
        let err = StackGraph::build(&config).unwrap_err();

        match err {
            StackerError::UnknownStackReference(e) => {
                assert_eq!(e.from, "app");
                assert_eq!(e.to, "ghost");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cycle_detection() {
        let config = Config::new(
            "ns",
            vec![def("a", &["b"]), def("b", &["c"]), def("c", &["a"])],
        );
        let err = StackGraph::build(&config).unwrap_err();

        match err {
            StackerError::CyclicDependency(e) => {
                assert_eq!(e.cycle_path, vec!["a", "b", "c", "a"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let config = Config::new("ns", vec![def("a", &["a"])]);
        let err = StackGraph::build(&config).unwrap_err();
        assert!(err.to_string().contains("a -> a"));
    }

    #[test]
    fn test_transitive_followers() {
        let config = Config::new(
            "ns",
            vec![def("vpc", &[]), def("db", &["vpc"]), def("app", &["db"]), def("dns", &[])],
        );
        let graph = StackGraph::build(&config).unwrap();

        let forward = graph.transitive_followers(0, Direction::Forward);
        assert_eq!(forward.into_iter().collect::<Vec<_>>(), vec![1, 2]);

        let reverse = graph.transitive_followers(2, Direction::Reverse);
        assert_eq!(reverse.into_iter().collect::<Vec<_>>(), vec![0, 1]);
        assert!(graph.transitive_followers(3, Direction::Forward).is_empty());
        assert_eq!(graph.transitive_dependents(1), BTreeSet::from([2]));
    }

    #[test]
    fn test_outline() {
        let config = Config::new("ns", vec![def("vpc", &[]), def("app", &["vpc"])]);
        let graph = StackGraph::build(&config).unwrap();

        let outline = graph.outline(Direction::Forward);
        assert_eq!(outline, "  1. ns-vpc\n  2. ns-app (after ns-vpc)\n");
    }
}
