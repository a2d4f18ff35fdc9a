//! Dominator tree and dominance frontier computation
//!
//! Immediate dominators come from the Lengauer–Tarjan algorithm
//! (semi-dominators plus a path-compressing link-eval forest). Frontiers
//! are derived with the classic DF-local / DF-up walk of the dominator
//! tree, then verified against the set definition before use.

use crate::{DiGraph, DominanceInfo, Vertex};
use hrl_common::{HrlError, HrlResult};
use log::debug;
use std::collections::BTreeSet;

const UNDEFINED: usize = usize::MAX;

/// Lengauer–Tarjan state, all arrays indexed by DFS number.
struct LengauerTarjan<'a> {
    graph: &'a DiGraph,
    /// vertex → DFS number, UNDEFINED when unreachable
    dfn: Vec<usize>,
    /// DFS number → vertex
    vertex: Vec<Vertex>,
    /// DFS-tree parent, by DFS number
    parent: Vec<usize>,
    /// semi-dominator, by DFS number
    semi: Vec<usize>,
    idom: Vec<usize>,
    bucket: Vec<Vec<usize>>,
    ancestor: Vec<usize>,
    label: Vec<usize>,
}

impl<'a> LengauerTarjan<'a> {
    fn new(graph: &'a DiGraph) -> Self {
        Self {
            graph,
            dfn: vec![UNDEFINED; graph.vertex_count()],
            vertex: Vec::new(),
            parent: Vec::new(),
            semi: Vec::new(),
            idom: Vec::new(),
            bucket: Vec::new(),
            ancestor: Vec::new(),
            label: Vec::new(),
        }
    }

    fn dfs(&mut self, v: Vertex, parent_number: usize) {
        if self.dfn[v] != UNDEFINED {
            return;
        }
        let number = self.vertex.len();
        self.dfn[v] = number;
        self.vertex.push(v);
        self.parent.push(parent_number);
        self.semi.push(number);
        self.idom.push(UNDEFINED);
        self.bucket.push(Vec::new());
        self.ancestor.push(UNDEFINED);
        self.label.push(number);

        let graph = self.graph;
        for &succ in graph.successors(v) {
            self.dfs(succ, number);
        }
    }

    fn compress(&mut self, v: usize) {
        let a = self.ancestor[v];
        if self.ancestor[a] == UNDEFINED {
            return;
        }
        self.compress(a);
        if self.semi[self.label[a]] < self.semi[self.label[v]] {
            self.label[v] = self.label[a];
        }
        self.ancestor[v] = self.ancestor[a];
    }

    fn eval(&mut self, v: usize) -> usize {
        if self.ancestor[v] == UNDEFINED {
            v
        } else {
            self.compress(v);
            self.label[v]
        }
    }

    /// Immediate dominators per vertex; `None` for the entry and for
    /// unreachable vertices.
    fn run(mut self, entry: Vertex) -> Vec<Option<Vertex>> {
        self.dfs(entry, UNDEFINED);
        let count = self.vertex.len();
        let graph = self.graph;

        for w in (1..count).rev() {
            // Semi-dominator of w: minimum over eval'd predecessors.
            for &pred_vertex in graph.predecessors(self.vertex[w]) {
                let pred = self.dfn[pred_vertex];
                if pred == UNDEFINED {
                    continue;
                }
                let u = self.eval(pred);
                if self.semi[u] < self.semi[w] {
                    self.semi[w] = self.semi[u];
                }
            }

            let semi_w = self.semi[w];
            self.bucket[semi_w].push(w);
            let parent = self.parent[w];
            self.ancestor[w] = parent;

            // Implicitly compute idom for everything bucketed at parent.
            for v in std::mem::take(&mut self.bucket[parent]) {
                let u = self.eval(v);
                self.idom[v] = if self.semi[u] < self.semi[v] { u } else { parent };
            }
        }

        // Final pass turns relative idoms into absolute ones.
        for w in 1..count {
            if self.idom[w] != self.semi[w] {
                self.idom[w] = self.idom[self.idom[w]];
            }
        }

        let mut result = vec![None; graph.vertex_count()];
        for w in 1..count {
            result[self.vertex[w]] = Some(self.vertex[self.idom[w]]);
        }
        result
    }
}

/// Compute the dominator tree and dominance frontiers for `graph`
/// rooted at `entry`, verifying the frontier properties.
pub fn compute_dominance(graph: &DiGraph, entry: Vertex) -> HrlResult<DominanceInfo> {
    let idom = LengauerTarjan::new(graph).run(entry);

    // Strict dominator-tree children, in vertex order for determinism.
    let mut children = vec![Vec::new(); graph.vertex_count()];
    for vertex in 0..graph.vertex_count() {
        if let Some(dominator) = idom[vertex] {
            children[dominator].push(vertex);
        }
    }

    let mut info = DominanceInfo {
        idom,
        children,
        frontiers: vec![BTreeSet::new(); graph.vertex_count()],
        root: entry,
    };
    compute_frontiers(graph, entry, &mut info);

    for vertex in 0..graph.vertex_count() {
        debug!(
            "[Dominance] vertex {}: idom={:?}, DF={:?}",
            vertex, info.idom[vertex], info.frontiers[vertex]
        );
    }

    verify_dominance_frontiers(graph, &info)?;
    Ok(info)
}

/// DF-local: successors not immediately dominated by `b`.
/// DF-up: frontier entries of dominator-tree children that `b` does not
/// immediately dominate.
fn compute_frontiers(graph: &DiGraph, b: Vertex, info: &mut DominanceInfo) {
    for &s in graph.successors(b) {
        if info.idom[s] != Some(b) {
            info.frontiers[b].insert(s);
        }
    }

    for i in 0..info.children[b].len() {
        let c = info.children[b][i];
        compute_frontiers(graph, c, info);
        for w in info.frontiers[c].clone() {
            if info.idom[w] != Some(b) {
                info.frontiers[b].insert(w);
            }
        }
    }
}

/// Assert the defining properties of dominance frontiers. A failure here
/// is a bug in the dominator computation, never in the input program.
pub fn verify_dominance_frontiers(graph: &DiGraph, info: &DominanceInfo) -> HrlResult<()> {
    for b in 0..graph.vertex_count() {
        for &w in &info.frontiers[b] {
            let dominates_some_predecessor = graph
                .predecessors(w)
                .iter()
                .any(|&pred| info.dominates(b, pred));
            if !dominates_some_predecessor {
                return Err(HrlError::ssa_violation(format!(
                    "vertex {} is in DF({}) but {} dominates no predecessor of it",
                    w, b, b
                )));
            }

            if b != w && info.dominates(b, w) {
                return Err(HrlError::ssa_violation(format!(
                    "vertex {} strictly dominates {} but has it in its frontier",
                    b, w
                )));
            }
        }

        // Self-membership is only legitimate through a back edge from a
        // vertex b dominates (a self-loop being the degenerate case).
        if info.frontiers[b].contains(&b)
            && !graph.predecessors(b).iter().any(|&p| info.dominates(b, p))
        {
            return Err(HrlError::ssa_violation(format!(
                "vertex {} has itself in its frontier without a back edge",
                b
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(Vertex, Vertex)], count: usize) -> DiGraph {
        let mut g = DiGraph::with_vertices(count);
        for &(a, b) in edges {
            g.add_edge(a, b);
        }
        g
    }

    #[test]
    fn diamond_dominators_and_frontiers() {
        // 0 -> {1, 2} -> 3
        let g = graph(&[(0, 1), (0, 2), (1, 3), (2, 3)], 4);
        let info = compute_dominance(&g, 0).unwrap();

        assert_eq!(info.idom[0], None);
        assert_eq!(info.idom[1], Some(0));
        assert_eq!(info.idom[2], Some(0));
        assert_eq!(info.idom[3], Some(0));

        assert!(info.frontiers[0].is_empty());
        assert_eq!(info.frontiers[1], BTreeSet::from([3]));
        assert_eq!(info.frontiers[2], BTreeSet::from([3]));
        assert!(info.frontiers[3].is_empty());
    }

    #[test]
    fn loop_frontier_contains_header() {
        // 0 -> 1 (header) -> 2 (body) -> 1, 1 -> 3 (exit)
        let g = graph(&[(0, 1), (1, 2), (2, 1), (1, 3)], 4);
        let info = compute_dominance(&g, 0).unwrap();

        assert_eq!(info.idom[1], Some(0));
        assert_eq!(info.idom[2], Some(1));
        assert_eq!(info.idom[3], Some(1));
        // The body's frontier is the header; the header's own frontier is
        // the header too, through the back edge.
        assert_eq!(info.frontiers[2], BTreeSet::from([1]));
        assert_eq!(info.frontiers[1], BTreeSet::from([1]));
    }

    #[test]
    fn self_loop_keeps_itself_in_frontier() {
        // 0 -> 1, 1 -> 1, 1 -> 2
        let g = graph(&[(0, 1), (1, 1), (1, 2)], 3);
        let info = compute_dominance(&g, 0).unwrap();
        assert!(info.frontiers[1].contains(&1));
    }

    #[test]
    fn nested_loops() {
        // 0 -> 1 -> 2 -> 3 -> 2, 3 -> 4 -> 1, 4 -> 5
        let g = graph(&[(0, 1), (1, 2), (2, 3), (3, 2), (3, 4), (4, 1), (4, 5)], 6);
        let info = compute_dominance(&g, 0).unwrap();

        assert_eq!(info.idom[2], Some(1));
        assert_eq!(info.idom[3], Some(2));
        assert_eq!(info.idom[4], Some(3));
        assert_eq!(info.idom[5], Some(4));

        assert_eq!(info.frontiers[4], BTreeSet::from([1]));
        assert_eq!(info.frontiers[3], BTreeSet::from([1, 2]));
        assert_eq!(info.frontiers[2], BTreeSet::from([1, 2]));
    }

    #[test]
    fn irreducible_region() {
        // 0 -> 1, 0 -> 2, 1 -> 2, 2 -> 1 (two-entry cycle)
        let g = graph(&[(0, 1), (0, 2), (1, 2), (2, 1)], 3);
        let info = compute_dominance(&g, 0).unwrap();
        // Neither cycle member dominates the other.
        assert_eq!(info.idom[1], Some(0));
        assert_eq!(info.idom[2], Some(0));
        assert_eq!(info.frontiers[1], BTreeSet::from([2]));
        assert_eq!(info.frontiers[2], BTreeSet::from([1]));
    }

    #[test]
    fn unreachable_vertices_have_no_dominator() {
        let g = graph(&[(0, 1)], 3);
        let info = compute_dominance(&g, 0).unwrap();
        assert_eq!(info.idom[2], None);
        assert!(info.children[2].is_empty());
    }
}
