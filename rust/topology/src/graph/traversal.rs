// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Connectivity over graph edges, weighted by edge length.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use super::TopologyGraph;
use crate::keys::{EdgeId, NodeId};

impl TopologyGraph {
    /// `(neighbor, edge)` pairs for every edge end at `node`.
    fn neighbors(&self, node: NodeId) -> impl Iterator<Item = (NodeId, EdgeId)> + '_ {
        self.node(node)
            .into_iter()
            .flat_map(|n| n.ends.iter())
            .filter_map(move |end| {
                let edge = self.edge(end.edge)?;
                let other = if end.outgoing {
                    edge.to_node
                } else {
                    edge.from_node
                };
                Some((other, edge.id))
            })
    }

    /// Connected node sets, each in breadth-first order from its lowest id.
    pub fn connected_components(&self) -> Vec<Vec<NodeId>> {
        let n = self.node_count();
        let mut visited = vec![false; n];
        let mut components = Vec::new();

        for start in 0..n {
            if visited[start] {
                continue;
            }

            let mut component = Vec::new();
            let mut queue = VecDeque::new();
            visited[start] = true;
            queue.push_back(NodeId(start as u32));

            while let Some(node) = queue.pop_front() {
                component.push(node);
                for (neighbor, _) in self.neighbors(node) {
                    if !visited[neighbor.index()] {
                        visited[neighbor.index()] = true;
                        queue.push_back(neighbor);
                    }
                }
            }

            components.push(component);
        }

        components
    }

    /// Dijkstra over edge lengths. Returns `(length, nodes)` from `source` to
    /// `target` inclusive, or `None` if they are not connected.
    pub fn shortest_path(&self, source: NodeId, target: NodeId) -> Option<(f64, Vec<NodeId>)> {
        let n = self.node_count();
        if source.index() >= n || target.index() >= n {
            return None;
        }
        let mut dist = vec![f64::INFINITY; n];
        let mut prev: Vec<Option<NodeId>> = vec![None; n];
        let mut heap = BinaryHeap::new();

        dist[source.index()] = 0.0;
        heap.push(DijkstraState {
            cost: 0.0,
            node: source,
        });

        while let Some(DijkstraState { cost, node }) = heap.pop() {
            if node == target {
                break;
            }
            if cost > dist[node.index()] {
                continue;
            }

            for (neighbor, edge) in self.neighbors(node) {
                let Some(edge) = self.edge(edge) else {
                    continue;
                };
                let next_cost = cost + edge.length();
                if next_cost < dist[neighbor.index()] {
                    dist[neighbor.index()] = next_cost;
                    prev[neighbor.index()] = Some(node);
                    heap.push(DijkstraState {
                        cost: next_cost,
                        node: neighbor,
                    });
                }
            }
        }

        if dist[target.index()].is_infinite() {
            return None;
        }

        let mut path = Vec::new();
        let mut current = target;
        while let Some(p) = prev[current.index()] {
            path.push(current);
            current = p;
        }
        path.push(source);
        path.reverse();

        Some((dist[target.index()], path))
    }
}

/// Min-heap entry for Dijkstra.
#[derive(Debug, Clone, PartialEq)]
struct DijkstraState {
    cost: f64,
    node: NodeId,
}

impl Eq for DijkstraState {}

impl PartialOrd for DijkstraState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DijkstraState {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap; ties pop the lower node first.
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}
