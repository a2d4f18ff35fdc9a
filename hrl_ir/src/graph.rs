//! Arena-style directed graph used for control-flow and dominator trees
//!
//! Vertices are plain indices kept aligned with the owning subroutine's
//! block vector, so block `i` is always vertex `i`. Edges are stored as
//! adjacency lists in both directions.

use serde::{Deserialize, Serialize};

pub type Vertex = usize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiGraph {
    succs: Vec<Vec<Vertex>>,
    preds: Vec<Vec<Vertex>>,
}

impl DiGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vertices(count: usize) -> Self {
        Self {
            succs: vec![Vec::new(); count],
            preds: vec![Vec::new(); count],
        }
    }

    pub fn add_vertex(&mut self) -> Vertex {
        self.succs.push(Vec::new());
        self.preds.push(Vec::new());
        self.succs.len() - 1
    }

    /// Insert an edge; parallel edges collapse into one.
    pub fn add_edge(&mut self, from: Vertex, to: Vertex) {
        if !self.succs[from].contains(&to) {
            self.succs[from].push(to);
            self.preds[to].push(from);
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.succs.len()
    }

    pub fn successors(&self, vertex: Vertex) -> &[Vertex] {
        &self.succs[vertex]
    }

    pub fn predecessors(&self, vertex: Vertex) -> &[Vertex] {
        &self.preds[vertex]
    }

    /// Depth-first reachability colouring from `entry`.
    pub fn reachable_from(&self, entry: Vertex) -> Vec<bool> {
        let mut visited = vec![false; self.vertex_count()];
        let mut stack = vec![entry];
        while let Some(vertex) = stack.pop() {
            if visited[vertex] {
                continue;
            }
            visited[vertex] = true;
            for &succ in self.successors(vertex) {
                if !visited[succ] {
                    stack.push(succ);
                }
            }
        }
        visited
    }

    /// Post-order DFS from `entry`, successors visited in edge order.
    pub fn post_order_from(&self, entry: Vertex) -> Vec<Vertex> {
        let mut visited = vec![false; self.vertex_count()];
        let mut order = Vec::with_capacity(self.vertex_count());
        self.post_order_visit(entry, &mut visited, &mut order);
        order
    }

    fn post_order_visit(&self, vertex: Vertex, visited: &mut [bool], order: &mut Vec<Vertex>) {
        if visited[vertex] {
            return;
        }
        visited[vertex] = true;
        for &succ in self.successors(vertex) {
            self.post_order_visit(succ, visited, order);
        }
        order.push(vertex);
    }

    /// Rebuild the graph keeping only vertices with `keep[v]` set,
    /// renumbering survivors densely in index order. Returns the old→new
    /// vertex mapping.
    pub fn compact(&self, keep: &[bool]) -> (DiGraph, Vec<Option<Vertex>>) {
        assert_eq!(keep.len(), self.vertex_count());

        let mut mapping = vec![None; self.vertex_count()];
        let mut next = 0;
        for (vertex, &kept) in keep.iter().enumerate() {
            if kept {
                mapping[vertex] = Some(next);
                next += 1;
            }
        }

        let mut compacted = DiGraph::with_vertices(next);
        for (vertex, &kept) in keep.iter().enumerate() {
            if !kept {
                continue;
            }
            let from = mapping[vertex].unwrap();
            for &succ in self.successors(vertex) {
                if let Some(to) = mapping[succ] {
                    compacted.add_edge(from, to);
                }
            }
        }

        (compacted, mapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> DiGraph {
        // 0 -> 1, 0 -> 2, 1 -> 3, 2 -> 3
        let mut g = DiGraph::with_vertices(4);
        g.add_edge(0, 1);
        g.add_edge(0, 2);
        g.add_edge(1, 3);
        g.add_edge(2, 3);
        g
    }

    #[test]
    fn parallel_edges_collapse() {
        let mut g = DiGraph::with_vertices(2);
        g.add_edge(0, 1);
        g.add_edge(0, 1);
        assert_eq!(g.successors(0), &[1]);
        assert_eq!(g.predecessors(1), &[0]);
    }

    #[test]
    fn post_order_ends_with_entry() {
        let g = diamond();
        let order = g.post_order_from(0);
        assert_eq!(order.len(), 4);
        assert_eq!(*order.last().unwrap(), 0);
        // 3 is visited before its predecessors finish.
        assert_eq!(order[0], 3);
    }

    #[test]
    fn reachability_ignores_orphans() {
        let mut g = diamond();
        let orphan = g.add_vertex();
        let reachable = g.reachable_from(0);
        assert!(reachable[3]);
        assert!(!reachable[orphan]);
    }

    #[test]
    fn compaction_renumbers_and_drops_edges() {
        let mut g = diamond();
        let orphan = g.add_vertex();
        g.add_edge(1, orphan);

        let mut keep = vec![true; g.vertex_count()];
        keep[orphan] = false;
        let (compacted, mapping) = g.compact(&keep);

        assert_eq!(compacted.vertex_count(), 4);
        assert_eq!(mapping[3], Some(3));
        assert_eq!(mapping[orphan], None);
        assert_eq!(compacted.successors(1), &[3]);
    }
}
