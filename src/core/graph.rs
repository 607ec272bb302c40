//! Dependency graph between cells
//!
//! An edge `A -> B` means "A's value depends on B's value". The graph is a
//! petgraph `StableDiGraph` plus a key to node index map, so removing a node
//! never invalidates the indices of the others. Nodes exist only while they
//! have at least one edge.
//!
//! The walks also have `_with` forms taking a function that supplies extra
//! edges the graph does not store, such as dependencies on whole ranges.

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction::{Incoming, Outgoing};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::Hash;

/// Result of ordering a set of target nodes for evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalPlan<N> {
    /// Targets to evaluate, each after every target it depends on
    pub order: Vec<N>,
    /// Targets inside a cycle (a strongly connected group of more than one
    /// node, or a node that depends on itself), sorted
    pub cycle_members: Vec<N>,
    /// Targets outside any cycle that depend on a cycle member, sorted
    pub cycle_dependents: Vec<N>,
}

impl<N> Default for EvalPlan<N> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            cycle_members: Vec::new(),
            cycle_dependents: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DependencyGraph<N> {
    graph: StableDiGraph<N, ()>,
    nodes: HashMap<N, NodeIndex>,
}

impl<N> Default for DependencyGraph<N> {
    fn default() -> Self {
        Self {
            graph: StableDiGraph::default(),
            nodes: HashMap::new(),
        }
    }
}

/// Per-node bookkeeping for the strongly-connected-component search
struct Mark {
    index: usize,
    lowlink: usize,
    on_stack: bool,
}

/// One node being expanded by the iterative depth-first search
struct DfsFrame<N> {
    node: N,
    neighbours: Vec<N>,
    next_idx: usize,
}

impl<N> DependencyGraph<N>
where
    N: Clone + Eq + Hash + Ord,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, node: &N) -> bool {
        self.nodes.contains_key(node)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    fn ensure_node(&mut self, node: &N) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(node) {
            return idx;
        }
        let idx = self.graph.add_node(node.clone());
        self.nodes.insert(node.clone(), idx);
        idx
    }

    /// Drop `idx` if nothing points to it and it points to nothing
    fn prune(&mut self, idx: NodeIndex) {
        if self.graph.neighbors_undirected(idx).next().is_none() {
            if let Some(node) = self.graph.remove_node(idx) {
                self.nodes.remove(&node);
            }
        }
    }

    /// Replace every outgoing edge of `node` with one edge per distinct
    /// entry of `dependencies`
    pub fn set_edges<I>(&mut self, node: &N, dependencies: I)
    where
        I: IntoIterator<Item = N>,
    {
        let mut stale_targets = Vec::new();
        if let Some(&idx) = self.nodes.get(node) {
            let edges: Vec<_> = self
                .graph
                .edges_directed(idx, Outgoing)
                .map(|e| (e.id(), e.target()))
                .collect();
            for (edge, target) in edges {
                self.graph.remove_edge(edge);
                stale_targets.push(target);
            }
        }

        let mut seen = HashSet::new();
        let mut source = None;
        for dependency in dependencies {
            if !seen.insert(dependency.clone()) {
                continue;
            }
            let from = match source {
                Some(idx) => idx,
                None => {
                    let idx = self.ensure_node(node);
                    source = Some(idx);
                    idx
                }
            };
            let to = self.ensure_node(&dependency);
            self.graph.add_edge(from, to, ());
        }

        for target in stale_targets {
            if self.graph.contains_node(target) {
                self.prune(target);
            }
        }
        if let Some(&idx) = self.nodes.get(node) {
            self.prune(idx);
        }
    }

    /// Remove every outgoing edge of `node`. Incoming edges are kept.
    pub fn clear_edges(&mut self, node: &N) {
        self.set_edges(node, std::iter::empty());
    }

    /// Direct dependencies of `node`, sorted
    pub fn dependencies(&self, node: &N) -> Vec<N> {
        self.neighbours(node, Outgoing)
    }

    /// Nodes that depend directly on `node`, sorted
    pub fn dependents(&self, node: &N) -> Vec<N> {
        self.neighbours(node, Incoming)
    }

    fn neighbours(&self, node: &N, direction: petgraph::Direction) -> Vec<N> {
        let Some(&idx) = self.nodes.get(node) else {
            return Vec::new();
        };
        let set: BTreeSet<N> = self
            .graph
            .neighbors_directed(idx, direction)
            .map(|n| self.graph[n].clone())
            .collect();
        set.into_iter().collect()
    }

    /// Flag `node` and every node that transitively depends on it.
    ///
    /// `dirty` doubles as the visited marker: nodes already in it are not
    /// expanded again, so the walk terminates on cycles and reaches each node
    /// of a diamond once. Returns the nodes this call newly flagged.
    pub fn mark_dirty(&self, node: &N, dirty: &mut BTreeSet<N>) -> Vec<N> {
        self.mark_dirty_with(node, dirty, &|_| Vec::new())
    }

    /// [`mark_dirty`](Self::mark_dirty), also following `extra_dependents`
    pub fn mark_dirty_with(
        &self,
        node: &N,
        dirty: &mut BTreeSet<N>,
        extra_dependents: &dyn Fn(&N) -> Vec<N>,
    ) -> Vec<N> {
        let mut flagged = Vec::new();
        let mut stack = vec![node.clone()];

        while let Some(current) = stack.pop() {
            if !dirty.insert(current.clone()) {
                continue;
            }
            if let Some(&idx) = self.nodes.get(&current) {
                for dependent in self.graph.neighbors_directed(idx, Incoming) {
                    let dependent = &self.graph[dependent];
                    if !dirty.contains(dependent) {
                        stack.push(dependent.clone());
                    }
                }
            }
            for dependent in extra_dependents(&current) {
                if !dirty.contains(&dependent) {
                    stack.push(dependent);
                }
            }
            flagged.push(current);
        }

        flagged
    }

    /// Every node that transitively depends on `node`, sorted, excluding
    /// `node` itself unless it sits on a cycle
    pub fn transitive_dependents(&self, node: &N) -> Vec<N> {
        self.transitive_dependents_with(node, &|_| Vec::new())
    }

    /// [`transitive_dependents`](Self::transitive_dependents), also following
    /// `extra_dependents`
    pub fn transitive_dependents_with(
        &self,
        node: &N,
        extra_dependents: &dyn Fn(&N) -> Vec<N>,
    ) -> Vec<N> {
        let direct = |n: &N| {
            let mut all = self.dependents(n);
            all.extend(extra_dependents(n));
            all
        };
        let mut visited = BTreeSet::new();
        let mut stack = direct(node);

        while let Some(current) = stack.pop() {
            if visited.insert(current.clone()) {
                stack.extend(direct(&current));
            }
        }

        visited.into_iter().collect()
    }

    fn has_self_loop(&self, node: &N) -> bool {
        self.nodes
            .get(node)
            .is_some_and(|&idx| self.graph.find_edge(idx, idx).is_some())
    }

    /// Dependencies of `node` that are also targets, sorted and distinct
    fn target_neighbours(
        &self,
        node: &N,
        targets: &BTreeSet<N>,
        extra: &dyn Fn(&N) -> Vec<N>,
    ) -> Vec<N> {
        let set: BTreeSet<N> = self
            .dependencies(node)
            .into_iter()
            .chain(extra(node))
            .filter(|n| targets.contains(n))
            .collect();
        set.into_iter().collect()
    }

    /// Order `targets` so each follows the targets it depends on.
    ///
    /// Non-target nodes are treated as fixed inputs. The search is Tarjan's
    /// strongly connected components algorithm run with an explicit stack:
    /// a node is unvisited until it gets a [`Mark`], in progress while it is
    /// on the component stack, and done once its component is emitted.
    /// Components come out dependencies first, which is the evaluation order.
    pub fn topological_order(&self, targets: &BTreeSet<N>) -> EvalPlan<N> {
        self.topological_order_with(targets, &|_| Vec::new())
    }

    /// [`topological_order`](Self::topological_order) where `node` also
    /// depends on every target in `extra_dependencies(node)`. A node listed
    /// among its own extra dependencies is a cycle of one.
    pub fn topological_order_with(
        &self,
        targets: &BTreeSet<N>,
        extra_dependencies: &dyn Fn(&N) -> Vec<N>,
    ) -> EvalPlan<N> {
        let extra = extra_dependencies;
        let mut plan = EvalPlan::default();
        let mut marks: HashMap<N, Mark> = HashMap::new();
        let mut component_stack: Vec<N> = Vec::new();
        let mut tainted: HashSet<N> = HashSet::new();
        let mut counter = 0usize;

        for root in targets {
            if marks.contains_key(root) {
                continue;
            }

            marks.insert(
                root.clone(),
                Mark {
                    index: counter,
                    lowlink: counter,
                    on_stack: true,
                },
            );
            counter += 1;
            component_stack.push(root.clone());
            let mut dfs_stack = vec![DfsFrame {
                node: root.clone(),
                neighbours: self.target_neighbours(root, targets, extra),
                next_idx: 0,
            }];

            while let Some(frame) = dfs_stack.last_mut() {
                if frame.next_idx < frame.neighbours.len() {
                    let next = frame.neighbours[frame.next_idx].clone();
                    frame.next_idx += 1;

                    match marks.get(&next) {
                        None => {
                            marks.insert(
                                next.clone(),
                                Mark {
                                    index: counter,
                                    lowlink: counter,
                                    on_stack: true,
                                },
                            );
                            counter += 1;
                            component_stack.push(next.clone());
                            let neighbours = self.target_neighbours(&next, targets, extra);
                            dfs_stack.push(DfsFrame {
                                node: next,
                                neighbours,
                                next_idx: 0,
                            });
                        }
                        // Back edge into the current search path: a cycle
                        Some(mark) if mark.on_stack => {
                            let next_index = mark.index;
                            let current = frame.node.clone();
                            if let Some(current) = marks.get_mut(&current) {
                                current.lowlink = current.lowlink.min(next_index);
                            }
                        }
                        Some(_) => {}
                    }
                    continue;
                }

                let Some(finished) = dfs_stack.pop() else {
                    break;
                };
                let (index, lowlink) = match marks.get(&finished.node) {
                    Some(mark) => (mark.index, mark.lowlink),
                    None => continue,
                };

                if let Some(parent) = dfs_stack.last() {
                    if let Some(parent) = marks.get_mut(&parent.node) {
                        parent.lowlink = parent.lowlink.min(lowlink);
                    }
                }

                if index != lowlink {
                    continue;
                }

                let mut component = Vec::new();
                while let Some(member) = component_stack.pop() {
                    if let Some(mark) = marks.get_mut(&member) {
                        mark.on_stack = false;
                    }
                    let is_root = member == finished.node;
                    component.push(member);
                    if is_root {
                        break;
                    }
                }

                self.classify(component, targets, extra, &mut tainted, &mut plan);
            }
        }

        plan.cycle_members.sort();
        plan.cycle_dependents.sort();
        plan
    }

    /// File a finished strongly connected component into the plan
    fn classify(
        &self,
        component: Vec<N>,
        targets: &BTreeSet<N>,
        extra: &dyn Fn(&N) -> Vec<N>,
        tainted: &mut HashSet<N>,
        plan: &mut EvalPlan<N>,
    ) {
        let cyclic = component.len() > 1
            || component
                .iter()
                .any(|n| self.has_self_loop(n) || extra(n).contains(n));

        if cyclic {
            tainted.extend(component.iter().cloned());
            plan.cycle_members.extend(component);
            return;
        }

        for node in component {
            // Every dependency's component was emitted before this one
            let downstream = self
                .target_neighbours(&node, targets, extra)
                .iter()
                .any(|n| tainted.contains(n));
            if downstream {
                tainted.insert(node.clone());
                plan.cycle_dependents.push(node);
            } else {
                plan.order.push(node);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn graph(edges: &[(&'static str, &[&'static str])]) -> DependencyGraph<&'static str> {
        let mut g = DependencyGraph::new();
        for (node, deps) in edges {
            g.set_edges(node, deps.iter().copied());
        }
        g
    }

    fn targets(nodes: &[&'static str]) -> BTreeSet<&'static str> {
        nodes.iter().copied().collect()
    }

    fn position(order: &[&str], node: &str) -> usize {
        order.iter().position(|n| *n == node).unwrap()
    }

    #[test]
    fn test_empty_graph() {
        let g: DependencyGraph<&str> = DependencyGraph::new();
        assert_eq!(g.node_count(), 0);
        assert_eq!(g.topological_order(&BTreeSet::new()), EvalPlan::default());
    }

    #[test]
    fn test_set_edges_dedupes_and_replaces() {
        let mut g = graph(&[("C1", &["A1", "B1", "A1"])]);
        assert_eq!(g.dependencies(&"C1"), vec!["A1", "B1"]);
        assert_eq!(g.edge_count(), 2);

        g.set_edges(&"C1", ["B1", "D1"]);
        assert_eq!(g.dependencies(&"C1"), vec!["B1", "D1"]);
        assert!(!g.contains(&"A1"), "isolated nodes are dropped");
        assert_eq!(g.dependents(&"B1"), vec!["C1"]);
    }

    #[test]
    fn test_clear_edges_keeps_incoming() {
        let mut g = graph(&[("B1", &["A1"]), ("C1", &["B1"])]);
        g.clear_edges(&"B1");
        assert!(g.dependencies(&"B1").is_empty());
        assert_eq!(g.dependents(&"B1"), vec!["C1"]);
        assert!(!g.contains(&"A1"));
        assert_eq!(g.node_count(), 2);
    }

    #[test]
    fn test_mark_dirty_reaches_transitive_dependents() {
        let g = graph(&[("B1", &["A1"]), ("C1", &["B1"]), ("D1", &["Z9"])]);
        let mut dirty = BTreeSet::new();
        let mut flagged = g.mark_dirty(&"A1", &mut dirty);
        flagged.sort();
        assert_eq!(flagged, vec!["A1", "B1", "C1"]);

        // Already flagged nodes are not reported again
        assert!(g.mark_dirty(&"B1", &mut dirty).is_empty());
    }

    #[test]
    fn test_mark_dirty_diamond_visits_each_once() {
        // D depends on B and C, both depend on A
        let g = graph(&[("B", &["A"]), ("C", &["A"]), ("D", &["B", "C"])]);
        let mut dirty = BTreeSet::new();
        let flagged = g.mark_dirty(&"A", &mut dirty);
        assert_eq!(flagged.len(), 4);
        assert_eq!(flagged.iter().filter(|n| **n == "D").count(), 1);
    }

    #[test]
    fn test_mark_dirty_terminates_on_cycle() {
        let g = graph(&[("A1", &["A2"]), ("A2", &["A1"])]);
        let mut dirty = BTreeSet::new();
        let flagged = g.mark_dirty(&"A1", &mut dirty);
        assert_eq!(flagged.len(), 2);
    }

    #[test]
    fn test_topo_chain() {
        let g = graph(&[("C", &["B"]), ("B", &["A"])]);
        let plan = g.topological_order(&targets(&["A", "B", "C"]));
        assert_eq!(plan.order, vec!["A", "B", "C"]);
        assert!(plan.cycle_members.is_empty());
    }

    #[test]
    fn test_topo_diamond() {
        let g = graph(&[("B", &["A"]), ("C", &["A"]), ("D", &["B", "C"])]);
        let plan = g.topological_order(&targets(&["A", "B", "C", "D"]));
        assert_eq!(plan.order.len(), 4);
        let order = &plan.order;
        assert!(position(order, "A") < position(order, "B"));
        assert!(position(order, "A") < position(order, "C"));
        assert!(position(order, "B") < position(order, "D"));
        assert!(position(order, "C") < position(order, "D"));
    }

    #[test]
    fn test_topo_ignores_non_targets() {
        let g = graph(&[("C", &["B"]), ("B", &["A"])]);
        let plan = g.topological_order(&targets(&["C"]));
        assert_eq!(plan.order, vec!["C"]);
    }

    #[test]
    fn test_topo_two_node_cycle() {
        let g = graph(&[("A1", &["A2"]), ("A2", &["A1"])]);
        let plan = g.topological_order(&targets(&["A1", "A2"]));
        assert!(plan.order.is_empty());
        assert_eq!(plan.cycle_members, vec!["A1", "A2"]);
        assert!(plan.cycle_dependents.is_empty());
    }

    #[test]
    fn test_topo_self_loop() {
        let g = graph(&[("A1", &["A1"]), ("B1", &["C1"])]);
        let plan = g.topological_order(&targets(&["A1", "B1"]));
        assert_eq!(plan.cycle_members, vec!["A1"]);
        assert_eq!(plan.order, vec!["B1"]);
    }

    #[test]
    fn test_topo_cycle_dependents_are_separated() {
        // A <-> B cycle, C depends on B, D depends on C, E is independent
        let g = graph(&[
            ("A", &["B"]),
            ("B", &["A"]),
            ("C", &["B"]),
            ("D", &["C"]),
            ("E", &["X"]),
        ]);
        let plan = g.topological_order(&targets(&["A", "B", "C", "D", "E"]));
        assert_eq!(plan.cycle_members, vec!["A", "B"]);
        assert_eq!(plan.cycle_dependents, vec!["C", "D"]);
        assert_eq!(plan.order, vec!["E"]);
    }

    #[test]
    fn test_topo_cycle_member_feeding_from_acyclic_input() {
        // The cycle reads from an upstream target that is still evaluated
        let g = graph(&[("A", &["B", "U"]), ("B", &["A"]), ("U", &["X"])]);
        let plan = g.topological_order(&targets(&["A", "B", "U"]));
        assert_eq!(plan.cycle_members, vec!["A", "B"]);
        assert_eq!(plan.order, vec!["U"]);
    }

    #[test]
    fn test_topo_three_node_cycle() {
        let g = graph(&[("A", &["C"]), ("B", &["A"]), ("C", &["B"])]);
        let plan = g.topological_order(&targets(&["A", "B", "C"]));
        assert_eq!(plan.cycle_members, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_topo_deep_chain_does_not_recurse() {
        let names: Vec<String> = (0..50_000).map(|i| format!("N{}", i)).collect();
        let mut g = DependencyGraph::new();
        for pair in names.windows(2) {
            g.set_edges(&pair[1], [pair[0].clone()]);
        }
        let all: BTreeSet<String> = names.iter().cloned().collect();
        let plan = g.topological_order(&all);
        assert_eq!(plan.order.len(), names.len());
        let positions: HashMap<&String, usize> =
            plan.order.iter().enumerate().map(|(i, n)| (n, i)).collect();
        for pair in names.windows(2) {
            assert!(positions[&pair[0]] < positions[&pair[1]]);
        }
    }

    #[test]
    fn test_extra_edges_are_followed() {
        // "SUM" watches every node starting with "A" without stored edges
        let g = graph(&[("B", &["A1"]), ("C", &["SUM"])]);
        let watchers = |n: &&'static str| -> Vec<&'static str> {
            if n.starts_with('A') {
                vec!["SUM"]
            } else {
                Vec::new()
            }
        };

        let mut dirty = BTreeSet::new();
        let mut flagged = g.mark_dirty_with(&"A7", &mut dirty, &watchers);
        flagged.sort();
        assert_eq!(flagged, vec!["A7", "C", "SUM"]);
        assert_eq!(g.transitive_dependents_with(&"A1", &watchers), vec!["B", "C", "SUM"]);

        let all = targets(&["A1", "A2", "B", "C", "SUM"]);
        let watched = |n: &&'static str| -> Vec<&'static str> {
            if *n == "SUM" {
                vec!["A1", "A2"]
            } else {
                Vec::new()
            }
        };
        let plan = g.topological_order_with(&all, &watched);
        let order = &plan.order;
        assert!(position(order, "A1") < position(order, "SUM"));
        assert!(position(order, "A2") < position(order, "SUM"));
        assert!(position(order, "SUM") < position(order, "C"));
    }

    #[test]
    fn test_extra_self_dependency_is_a_cycle() {
        let g = graph(&[("C", &["SUM"])]);
        let watched = |n: &&'static str| -> Vec<&'static str> {
            if *n == "SUM" {
                vec!["SUM", "X"]
            } else {
                Vec::new()
            }
        };
        let plan = g.topological_order_with(&targets(&["SUM", "C", "X"]), &watched);
        assert_eq!(plan.cycle_members, vec!["SUM"]);
        assert_eq!(plan.cycle_dependents, vec!["C"]);
        assert_eq!(plan.order, vec!["X"]);
    }

    #[test]
    fn test_transitive_dependents() {
        let g = graph(&[("B", &["A"]), ("C", &["B"]), ("D", &["A"])]);
        assert_eq!(g.transitive_dependents(&"A"), vec!["B", "C", "D"]);
        assert!(g.transitive_dependents(&"C").is_empty());
    }
}
