//! Dependency graph for calculated fields
//!
//! One graph per collection. Nodes are calculated fields; an edge
//! `dependency -> dependent` exists when a formula reads another calculated
//! field of the same collection. Plain input fields never become nodes but
//! stay listed in each node's dependencies so that changes to them can seed
//! incremental recomputation.
//!
//! Cycles are not rejected: they are reported through [`Analysis::cycles`]
//! and the fields on them are still scheduled in a best-effort order.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

/// A calculated field and what its formula reads
#[derive(Debug, Clone, PartialEq)]
pub struct FieldNode {
    pub name: String,
    pub formula: String,
    /// Bare field references in first-occurrence order, calculated or not
    pub dependencies: Vec<String>,
}

/// Result of [`DependencyGraph::analyze`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Analysis {
    /// Every calculated field exactly once, dependencies first
    pub order: Vec<String>,

    /// Detected cycles, each as the path slice starting at the revisited field
    pub cycles: Vec<Vec<String>>,

    /// Dependency depth: 0 for fields reading only plain inputs
    pub levels: BTreeMap<String, usize>,
}

impl Analysis {
    pub fn has_cycles(&self) -> bool {
        !self.cycles.is_empty()
    }

    /// Fields lying on at least one cycle; their values are best-effort
    pub fn cyclic_fields(&self) -> BTreeSet<String> {
        self.cycles.iter().flatten().cloned().collect()
    }

    /// Human-readable cycle diagnostics, e.g. `a → b → a`
    pub fn cycle_warnings(&self) -> Vec<String> {
        self.cycles
            .iter()
            .map(|cycle| {
                let mut parts = cycle.clone();
                if let Some(first) = cycle.first() {
                    parts.push(first.clone());
                }
                parts.join(" → ")
            })
            .collect()
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    Visiting,
    Visited,
}

/// A dependency graph over the calculated fields of one collection
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    /// The underlying directed graph
    graph: DiGraph<FieldNode, ()>,

    /// Map from field name to node index
    node_map: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Creates an empty dependency graph
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
        }
    }

    /// Builds a graph from `(field, formula, dependencies)` triples.
    ///
    /// Node order follows the input order, which fixes the tie-breaking of
    /// the topological order.
    pub fn build<I, F, T>(formulas: I) -> Self
    where
        I: IntoIterator<Item = (F, T, Vec<String>)>,
        F: Into<String>,
        T: Into<String>,
    {
        let mut graph = Self::new();

        // First pass: add all nodes
        for (field, formula, dependencies) in formulas {
            graph.add_field(field.into(), formula.into(), dependencies);
        }

        // Second pass: link calculated dependencies
        graph.link();
        graph
    }

    /// Adds a calculated field. Edges are created by [`Self::build`].
    fn add_field(&mut self, name: String, formula: String, dependencies: Vec<String>) {
        if let Some(idx) = self.node_map.get(&name) {
            let node = &mut self.graph[*idx];
            node.formula = formula;
            node.dependencies = dependencies;
            return;
        }

        let idx = self.graph.add_node(FieldNode {
            name: name.clone(),
            formula,
            dependencies,
        });
        self.node_map.insert(name, idx);
    }

    /// Adds an edge `dep -> field` for every dependency that is itself calculated
    fn link(&mut self) {
        let mut edges = Vec::new();
        for idx in self.graph.node_indices() {
            for dep in &self.graph[idx].dependencies {
                if let Some(dep_idx) = self.node_map.get(dep) {
                    edges.push((*dep_idx, idx));
                }
            }
        }

        for (from, to) in edges {
            if self.graph.find_edge(from, to).is_none() {
                self.graph.add_edge(from, to, ());
            }
        }
    }

    /// Returns true if the graph contains the calculated field
    pub fn contains(&self, field: &str) -> bool {
        self.node_map.contains_key(field)
    }

    /// Returns the number of calculated fields
    pub fn len(&self) -> usize {
        self.node_map.len()
    }

    /// Returns true if the graph is empty
    pub fn is_empty(&self) -> bool {
        self.node_map.is_empty()
    }

    /// Calculated fields in insertion order
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.graph.node_indices().map(|idx| self.graph[idx].name.as_str())
    }

    /// Returns the node for a calculated field
    pub fn node(&self, field: &str) -> Option<&FieldNode> {
        self.node_map.get(field).map(|idx| &self.graph[*idx])
    }

    /// Direct dependencies of a field (calculated and plain)
    pub fn dependencies(&self, field: &str) -> &[String] {
        self.node(field)
            .map(|node| node.dependencies.as_slice())
            .unwrap_or(&[])
    }

    /// Calculated fields whose formulas read `field`
    pub fn dependents(&self, field: &str) -> Vec<String> {
        let idx = match self.node_map.get(field) {
            Some(idx) => *idx,
            None => return vec![],
        };

        let mut dependents: Vec<_> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .collect();
        dependents.sort();
        dependents
            .into_iter()
            .map(|idx| self.graph[idx].name.clone())
            .collect()
    }

    /// Depth-first topological sort that survives cycles.
    ///
    /// Returns `(order, cycles)`. Revisiting a field that is still on the
    /// current path records the path slice from that field as a cycle; the
    /// traversal then carries on, so every field still appears in `order`.
    /// Dependencies are visited in formula reference order. The walk keeps
    /// its own stack, so chain length is not bounded by the call stack.
    pub fn topological_sort(&self) -> (Vec<String>, Vec<Vec<String>>) {
        let mut marks = vec![Mark::Unvisited; self.graph.node_count()];
        let mut order = Vec::with_capacity(self.graph.node_count());
        let mut cycles = Vec::new();
        // Current path: each field with the position of its next dependency
        let mut path: Vec<(NodeIndex, usize)> = Vec::new();

        for root in self.graph.node_indices() {
            if marks[root.index()] != Mark::Unvisited {
                continue;
            }
            marks[root.index()] = Mark::Visiting;
            path.push((root, 0));

            while let Some(frame) = path.last_mut() {
                let (idx, position) = *frame;
                let dependencies = &self.graph[idx].dependencies;

                if position == dependencies.len() {
                    path.pop();
                    marks[idx.index()] = Mark::Visited;
                    order.push(self.graph[idx].name.clone());
                    continue;
                }
                frame.1 += 1;

                let Some(&dep) = self.node_map.get(&dependencies[position]) else {
                    continue;
                };
                match marks[dep.index()] {
                    Mark::Visited => {}
                    Mark::Visiting => {
                        if let Some(start) = path.iter().position(|(n, _)| *n == dep) {
                            cycles.push(
                                path[start..]
                                    .iter()
                                    .map(|(n, _)| self.graph[*n].name.clone())
                                    .collect(),
                            );
                        }
                    }
                    Mark::Unvisited => {
                        marks[dep.index()] = Mark::Visiting;
                        path.push((dep, 0));
                    }
                }
            }
        }

        (order, cycles)
    }

    /// Dependency depth of each field along `order`
    pub fn levels(&self, order: &[String]) -> BTreeMap<String, usize> {
        let mut levels = BTreeMap::new();

        for field in order {
            let level = self
                .dependencies(field)
                .iter()
                .filter_map(|dep| levels.get(dep).copied())
                .max()
                .map(|max: usize| max + 1)
                .unwrap_or(0);
            levels.insert(field.clone(), level);
        }

        levels
    }

    /// Sorts, detects cycles and computes levels in one go
    pub fn analyze(&self) -> Analysis {
        let (order, cycles) = self.topological_sort();
        let levels = self.levels(&order);

        Analysis {
            order,
            cycles,
            levels,
        }
    }

    /// Calculated fields reachable forward from `changed`.
    ///
    /// `changed` may name plain inputs; they seed the search but only
    /// calculated fields are returned, in discovery order.
    pub fn affected_fields<S: AsRef<str>>(&self, changed: &[S]) -> Vec<String> {
        let mut affected = Vec::new();
        let mut seen_affected = HashSet::new();
        let mut processed = HashSet::new();
        let mut queue: VecDeque<String> =
            changed.iter().map(|f| f.as_ref().to_string()).collect();

        while let Some(field) = queue.pop_front() {
            if !processed.insert(field.clone()) {
                continue;
            }

            // Scan every node: a plain input is not a node but may still be read
            for idx in self.graph.node_indices() {
                let node = &self.graph[idx];
                if node.dependencies.iter().any(|dep| dep == &field)
                    && seen_affected.insert(node.name.clone())
                {
                    affected.push(node.name.clone());
                    queue.push_back(node.name.clone());
                }
            }
        }

        affected
    }

    /// Narrows `order` to the changed fields plus everything they affect,
    /// keeping the relative sequence of `order`. Empty means nothing to do.
    pub fn optimize_order<S: AsRef<str>>(&self, order: &[String], changed: &[S]) -> Vec<String> {
        let mut wanted: HashSet<String> = self.affected_fields(changed).into_iter().collect();
        wanted.extend(changed.iter().map(|f| f.as_ref().to_string()));

        order
            .iter()
            .filter(|field| wanted.contains(*field))
            .cloned()
            .collect()
    }

    /// Backward closure of `targets`: each calculated target plus the
    /// calculated fields it transitively reads. Targets that are not
    /// calculated are kept as-is to flag them as external inputs.
    pub fn dependency_closure<S: AsRef<str>>(&self, targets: &[S]) -> BTreeSet<String> {
        let mut closure = BTreeSet::new();
        let mut stack: Vec<String> = targets
            .iter()
            .map(|f| f.as_ref().to_string())
            .filter(|f| !f.is_empty())
            .collect();

        while let Some(field) = stack.pop() {
            if closure.contains(&field) {
                continue;
            }

            if let Some(node) = self.node(&field) {
                stack.extend(
                    node.dependencies
                        .iter()
                        .filter(|dep| self.contains(dep))
                        .cloned(),
                );
            }
            closure.insert(field);
        }

        closure
    }

    /// Text rendering of the graph for diagnostics
    pub fn visualize(&self) -> String {
        let mut out = String::from("=== Dependency Graph ===\n");

        for idx in self.graph.node_indices() {
            let node = &self.graph[idx];
            out.push_str(&format!("\n{}:\n", node.name));

            if !node.dependencies.is_empty() {
                out.push_str(&format!("  depends on: {}\n", node.dependencies.join(", ")));
            }

            let dependents = self.dependents(&node.name);
            if !dependents.is_empty() {
                out.push_str(&format!("  triggers: {}\n", dependents.join(", ")));
            }

            out.push_str(&format!("  formula: {}\n", node.formula));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `reads` is a comma-separated dependency list
    fn graph(edges: &[(&str, &str)]) -> DependencyGraph {
        DependencyGraph::build(edges.iter().map(|(field, reads)| {
            let deps = reads
                .split(',')
                .filter(|f| !f.is_empty())
                .map(String::from)
                .collect();
            (*field, format!("formula of {}", field), deps)
        }))
    }

    fn pos(order: &[String], field: &str) -> usize {
        order.iter().position(|f| f == field).unwrap()
    }

    #[test]
    fn empty_graph() {
        let graph = DependencyGraph::new();
        assert!(graph.is_empty());
        assert_eq!(graph.len(), 0);
        assert!(graph.analyze().order.is_empty());
    }

    #[test]
    fn dependents_only_link_calculated_fields() {
        let graph = graph(&[
            ("total_ht", "qty,price"),
            ("tva", "total_ht"),
            ("total_ttc", "total_ht,tva"),
        ]);

        assert_eq!(graph.dependencies("tva"), &["total_ht".to_string()]);
        assert_eq!(graph.dependents("total_ht"), vec!["tva", "total_ttc"]);
        assert_eq!(graph.dependents("tva"), vec!["total_ttc"]);
        assert!(graph.dependents("qty").is_empty());
        assert!(!graph.contains("qty"));
    }

    #[test]
    fn topological_order() {
        // Declared in reverse to make sure order does not follow insertion
        let graph = graph(&[
            ("total_ttc", "total_ht,montant_tva"),
            ("montant_tva", "total_ht"),
            ("total_ht", "qty"),
        ]);

        let analysis = graph.analyze();
        assert!(analysis.cycles.is_empty());
        assert_eq!(analysis.order, vec!["total_ht", "montant_tva", "total_ttc"]);
        assert_eq!(analysis.levels["total_ht"], 0);
        assert_eq!(analysis.levels["montant_tva"], 1);
        assert_eq!(analysis.levels["total_ttc"], 2);
    }

    #[test]
    fn cycle_detection() {
        let graph = graph(&[("a", "b"), ("b", "a")]);

        let analysis = graph.analyze();
        assert!(analysis.has_cycles());
        assert_eq!(analysis.cycles[0], vec!["a", "b"]);
        assert_eq!(analysis.cycle_warnings()[0], "a → b → a");

        // Best-effort: both fields are still scheduled exactly once
        assert_eq!(analysis.order.len(), 2);
    }

    #[test]
    fn cycle_does_not_block_the_rest() {
        let graph = graph(&[
            ("a", "b"),
            ("b", "a"),
            ("x", "input"),
            ("y", "x"),
        ]);

        let analysis = graph.analyze();
        assert_eq!(analysis.order.len(), 4);
        assert!(pos(&analysis.order, "x") < pos(&analysis.order, "y"));
        assert_eq!(
            analysis.cyclic_fields(),
            ["a", "b"].iter().map(|s| s.to_string()).collect::<BTreeSet<_>>()
        );
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let graph = graph(&[("counter", "counter")]);
        let analysis = graph.analyze();
        assert_eq!(analysis.cycles, vec![vec!["counter".to_string()]]);
        assert_eq!(analysis.order, vec!["counter"]);
    }

    #[test]
    fn affected_fields_diamond() {
        let graph = graph(&[("b", "a"), ("c", "a"), ("d", "b,c")]);

        let mut affected = graph.affected_fields(&["a"]);
        affected.sort();
        assert_eq!(affected, vec!["b", "c", "d"]);

        let order = graph.analyze().order;
        let optimized = graph.optimize_order(&order, &["a"]);
        assert_eq!(optimized.len(), 3);
        assert!(pos(&optimized, "b") < pos(&optimized, "d"));
        assert!(pos(&optimized, "c") < pos(&optimized, "d"));
    }

    #[test]
    fn unrelated_change_schedules_nothing() {
        let graph = graph(&[("total", "qty,price")]);
        let order = graph.analyze().order;
        assert!(graph.optimize_order(&order, &["comment"]).is_empty());
    }

    #[test]
    fn changed_calculated_field_is_rescheduled() {
        let graph = graph(&[("b", "a"), ("c", "b")]);
        let order = graph.analyze().order;
        assert_eq!(graph.optimize_order(&order, &["b"]), vec!["b", "c"]);
    }

    #[test]
    fn dependency_closure() {
        let graph = graph(&[
            ("total_ht", "qty,price"),
            ("tva", "total_ht"),
            ("total_ttc", "total_ht,tva"),
            ("label", "name"),
        ]);

        let closure = graph.dependency_closure(&["tva"]);
        assert_eq!(
            closure.into_iter().collect::<Vec<_>>(),
            vec!["total_ht", "tva"]
        );

        // Non-calculated targets are kept verbatim
        let closure = graph.dependency_closure(&["label", "unknown"]);
        assert!(closure.contains("label"));
        assert!(closure.contains("unknown"));
        assert!(!closure.contains("name"));
    }

    #[test]
    fn closure_of_nothing_is_empty() {
        let graph = graph(&[("a", "x")]);
        assert!(graph.dependency_closure::<&str>(&[]).is_empty());
    }

    #[test]
    fn visualize_lists_triggers() {
        let graph = graph(&[("b", "a"), ("c", "b")]);
        let text = graph.visualize();
        assert!(text.contains("b:\n  depends on: a\n  triggers: c"));
    }

    #[test]
    fn long_chain_does_not_exhaust_the_stack() {
        let n = 200_000;
        // Dependents first, so the walk has to go the full depth from the root
        let edges: Vec<(String, String, Vec<String>)> = (0..n)
            .rev()
            .map(|i| {
                let reads = if i == 0 {
                    vec!["input".to_string()]
                } else {
                    vec![format!("f{}", i - 1)]
                };
                (format!("f{}", i), String::new(), reads)
            })
            .collect();
        let graph = DependencyGraph::build(edges);

        let analysis = graph.analyze();
        assert!(!analysis.has_cycles());
        assert_eq!(analysis.order.len(), n);
        assert_eq!(analysis.order.first().map(String::as_str), Some("f0"));
        assert_eq!(analysis.levels[&format!("f{}", n - 1)], n - 1);
    }

    #[test]
    fn performance_500_fields() {
        use std::time::Instant;

        let edges: Vec<(String, String, Vec<String>)> = (0..500)
            .map(|i| {
                let reads = if i == 0 {
                    vec!["input".to_string()]
                } else {
                    vec![format!("f{}", i - 1)]
                };
                (format!("f{}", i), String::new(), reads)
            })
            .collect();
        let graph = DependencyGraph::build(edges);

        let start = Instant::now();
        let analysis = graph.analyze();
        let affected = graph.affected_fields(&["input"]);
        let duration = start.elapsed();

        assert_eq!(analysis.order.first().map(String::as_str), Some("f0"));
        assert_eq!(analysis.order.last().map(String::as_str), Some("f499"));
        assert_eq!(affected.len(), 500);
        assert!(duration.as_millis() < 500, "Analysis took {:?}", duration);
    }
}
