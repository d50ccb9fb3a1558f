//! Hatch connectivity graph over placed modules.
//!
//! Nodes are module instance ids; an undirected edge joins two modules whose
//! centres sit within the configured connection range, or that declare an
//! explicit link. Edge weight is the centre distance in metres.
//!
//! Path queries never fail: an unknown or unreachable target yields an empty
//! path and an infinite length.

use std::collections::{BTreeMap, VecDeque};

use petgraph::algo::{astar, dijkstra};
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::unionfind::UnionFind;
use petgraph::visit::{Bfs, EdgeRef};
use serde::{Deserialize, Serialize};

use crate::config::ConnectivityConfig;
use crate::geometry::Vec3;
use crate::modules::{ModuleId, ModuleType, Placement};

const EIGEN_MAX_ITERATIONS: usize = 200;
const EIGEN_TOLERANCE: f64 = 1e-10;

/// Connection classification, lowest to highest priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    Pressurized,
    Service,
    Emergency,
    External,
}

impl ConnectionType {
    /// Highest-priority type that applies to either end of the pair.
    pub fn for_pair(a: ModuleType, b: ModuleType) -> Self {
        let either = |f: fn(&ModuleType) -> bool| f(&a) || f(&b);
        if a == ModuleType::Airlock || b == ModuleType::Airlock {
            Self::External
        } else if either(ModuleType::is_emergency) {
            Self::Emergency
        } else if either(ModuleType::is_service) {
            Self::Service
        } else {
            Self::Pressurized
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    /// Centre distance, m.
    pub distance: f64,
    pub connection_type: ConnectionType,
    /// Crew that can pass abreast; the smaller port count of the pair.
    pub capacity: u8,
    /// Declared by a placement rather than inferred from distance.
    pub explicit: bool,
}

/// A shortest path and its length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub path: Vec<ModuleId>,
    pub distance: f64,
}

impl Route {
    /// Number of hatches crossed.
    pub fn hops(&self) -> usize {
        self.path.len().saturating_sub(1)
    }
}

/// Centrality scores for one module. All values are normalized to [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeCentrality {
    pub id: ModuleId,
    pub degree: f64,
    pub betweenness: f64,
    pub closeness: f64,
    /// Only computed when the graph is connected.
    pub eigenvector: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CentralityMetrics {
    /// Sorted by module id.
    pub nodes: Vec<NodeCentrality>,
}

impl CentralityMetrics {
    pub fn get(&self, id: ModuleId) -> Option<&NodeCentrality> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn max_betweenness(&self) -> f64 {
        self.nodes.iter().map(|n| n.betweenness).fold(0.0, f64::max)
    }

    pub fn mean_closeness(&self) -> f64 {
        if self.nodes.is_empty() {
            return 0.0;
        }
        self.nodes.iter().map(|n| n.closeness).sum::<f64>() / self.nodes.len() as f64
    }
}

/// A module that a large share of shortest paths run through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bottleneck {
    pub id: ModuleId,
    pub betweenness: f64,
    /// Removing this module splits its component.
    pub articulation: bool,
}

pub struct ConnectivityGraph {
    graph: UnGraph<ModuleId, Connection>,
    nodes: BTreeMap<ModuleId, NodeIndex>,
    positions: BTreeMap<ModuleId, Vec3>,
}

impl std::fmt::Debug for ConnectivityGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityGraph")
            .field("nodes", &self.graph.node_count())
            .field("edges", &self.graph.edge_count())
            .finish()
    }
}

impl ConnectivityGraph {
    pub fn build(placements: &[Placement], config: &ConnectivityConfig) -> Self {
        Self::with_range(
            placements,
            config.min_connection_distance,
            config.max_connection_distance,
        )
    }

    /// Build with an explicit centre-distance range. Duplicate ids keep the
    /// first placement.
    pub fn with_range(placements: &[Placement], min_distance: f64, max_distance: f64) -> Self {
        let mut graph = UnGraph::new_undirected();
        let mut nodes = BTreeMap::new();
        let mut positions = BTreeMap::new();
        let mut kept: Vec<(NodeIndex, &Placement)> = Vec::with_capacity(placements.len());

        for p in placements {
            if nodes.contains_key(&p.id) {
                continue;
            }
            let node = graph.add_node(p.id);
            nodes.insert(p.id, node);
            positions.insert(p.id, p.position);
            kept.push((node, p));
        }

        for (i, (na, a)) in kept.iter().enumerate() {
            for (nb, b) in &kept[i + 1..] {
                let distance = a.distance_to(b);
                let explicit = a.links_to(b.id) || b.links_to(a.id);
                let in_range = distance >= min_distance && distance <= max_distance;
                if !(explicit || in_range) {
                    continue;
                }
                graph.add_edge(
                    *na,
                    *nb,
                    Connection {
                        distance,
                        connection_type: ConnectionType::for_pair(a.kind(), b.kind()),
                        capacity: a.module.port_count.min(b.module.port_count),
                        explicit,
                    },
                );
            }
        }

        Self {
            graph,
            nodes,
            positions,
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, id: ModuleId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// All module ids, sorted.
    pub fn ids(&self) -> Vec<ModuleId> {
        self.nodes.keys().copied().collect()
    }

    pub fn ids_of_kind(&self, kind: ModuleType) -> Vec<ModuleId> {
        self.nodes.keys().filter(|id| id.kind == kind).copied().collect()
    }

    pub fn position(&self, id: ModuleId) -> Option<Vec3> {
        self.positions.get(&id).copied()
    }

    pub fn neighbors(&self, id: ModuleId) -> Vec<ModuleId> {
        let Some(&node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        let mut out: Vec<ModuleId> = self.graph.neighbors(node).map(|n| self.graph[n]).collect();
        out.sort();
        out
    }

    pub fn connection(&self, a: ModuleId, b: ModuleId) -> Option<&Connection> {
        let (&na, &nb) = (self.nodes.get(&a)?, self.nodes.get(&b)?);
        let edge = self.graph.find_edge(na, nb)?;
        self.graph.edge_weight(edge)
    }

    pub fn connections(&self) -> impl Iterator<Item = (ModuleId, ModuleId, &Connection)> {
        self.graph
            .edge_references()
            .map(|e| (self.graph[e.source()], self.graph[e.target()], e.weight()))
    }

    /// True for zero or one module, or when every module is reachable.
    pub fn is_connected(&self) -> bool {
        self.component_count(None) <= 1
    }

    /// Components as sorted id lists, ordered by their smallest id.
    pub fn connected_components(&self) -> Vec<Vec<ModuleId>> {
        let mut seen = vec![false; self.graph.node_count()];
        let mut components = Vec::new();
        for &start in self.nodes.values() {
            if seen[start.index()] {
                continue;
            }
            let mut bfs = Bfs::new(&self.graph, start);
            let mut component = Vec::new();
            while let Some(node) = bfs.next(&self.graph) {
                seen[node.index()] = true;
                component.push(self.graph[node]);
            }
            component.sort();
            components.push(component);
        }
        components
    }

    /// Distance-weighted shortest route, `None` if either end is unknown or
    /// no path exists.
    pub fn shortest_route(&self, from: ModuleId, to: ModuleId) -> Option<Route> {
        let (&start, &goal) = (self.nodes.get(&from)?, self.nodes.get(&to)?);
        if start == goal {
            return Some(Route {
                path: vec![from],
                distance: 0.0,
            });
        }
        let (distance, path) = astar(
            &self.graph,
            start,
            |n| n == goal,
            |e| e.weight().distance,
            |_| 0.0,
        )?;
        Some(Route {
            path: path.into_iter().map(|n| self.graph[n]).collect(),
            distance,
        })
    }

    /// Module ids along the shortest route; empty when unreachable.
    pub fn shortest_path(&self, from: ModuleId, to: ModuleId) -> Vec<ModuleId> {
        self.shortest_route(from, to)
            .map(|r| r.path)
            .unwrap_or_default()
    }

    /// Shortest route length in metres; `f64::INFINITY` when unreachable.
    pub fn shortest_path_length(&self, from: ModuleId, to: ModuleId) -> f64 {
        self.shortest_route(from, to)
            .map_or(f64::INFINITY, |r| r.distance)
    }

    /// Shortest distance from `from` to every module, in id order.
    /// Unreachable modules get `f64::INFINITY`.
    pub fn distances_from(&self, from: ModuleId) -> Vec<(ModuleId, f64)> {
        let Some(&start) = self.nodes.get(&from) else {
            return self.nodes.keys().map(|id| (*id, f64::INFINITY)).collect();
        };
        let reached = dijkstra(&self.graph, start, None, |e| e.weight().distance);
        self.nodes
            .iter()
            .map(|(id, node)| (*id, reached.get(node).copied().unwrap_or(f64::INFINITY)))
            .collect()
    }

    /// Total edge length of a minimum spanning forest, m.
    pub fn spanning_length(&self) -> f64 {
        let mut edges: Vec<(f64, usize, usize)> = self
            .graph
            .edge_references()
            .map(|e| (e.weight().distance, e.source().index(), e.target().index()))
            .collect();
        edges.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut forest = UnionFind::new(self.graph.node_count());
        edges
            .into_iter()
            .filter(|(_, a, b)| forest.union(*a, *b))
            .map(|(d, _, _)| d)
            .sum()
    }

    /// Degree, betweenness and closeness over hop distances. Eigenvector
    /// centrality is only filled in for connected graphs.
    pub fn centrality_metrics(&self) -> CentralityMetrics {
        let n = self.graph.node_count();
        if n == 0 {
            return CentralityMetrics::default();
        }
        let betweenness = self.betweenness();
        let eigenvector = if self.is_connected() {
            Some(self.eigenvector())
        } else {
            None
        };
        let pairs = (n.max(2) - 1) as f64;

        let nodes = self
            .nodes
            .iter()
            .map(|(id, &node)| {
                let i = node.index();
                let degree = if n > 1 {
                    self.graph.neighbors(node).count() as f64 / pairs
                } else {
                    0.0
                };
                let hops = self.hop_distances(node, None);
                let (reached, total) = hops
                    .iter()
                    .flatten()
                    .filter(|d| **d > 0)
                    .fold((0usize, 0usize), |(r, t), d| (r + 1, t + d));
                // Wasserman-Faust: scale by the reachable share
                let closeness = if total > 0 {
                    (reached as f64 / total as f64) * (reached as f64 / pairs)
                } else {
                    0.0
                };
                NodeCentrality {
                    id: *id,
                    degree,
                    betweenness: betweenness[i],
                    closeness,
                    eigenvector: eigenvector.as_ref().map(|e| e[i]),
                }
            })
            .collect();
        CentralityMetrics { nodes }
    }

    /// Modules with normalized betweenness at or above `threshold`, highest
    /// first.
    pub fn detect_bottlenecks(&self, threshold: f64) -> Vec<Bottleneck> {
        let baseline = self.component_count(None);
        let mut found: Vec<Bottleneck> = self
            .centrality_metrics()
            .nodes
            .into_iter()
            .filter(|n| n.betweenness >= threshold)
            .map(|n| {
                let articulation = self
                    .nodes
                    .get(&n.id)
                    .map_or(false, |&node| self.component_count(Some(node)) > baseline);
                Bottleneck {
                    id: n.id,
                    betweenness: n.betweenness,
                    articulation,
                }
            })
            .collect();
        found.sort_by(|a, b| {
            b.betweenness
                .total_cmp(&a.betweenness)
                .then_with(|| a.id.cmp(&b.id))
        });
        found
    }

    fn hop_distances(&self, source: NodeIndex, skip: Option<NodeIndex>) -> Vec<Option<usize>> {
        let mut dist = vec![None; self.graph.node_count()];
        dist[source.index()] = Some(0);
        let mut queue = VecDeque::from([source]);
        while let Some(v) = queue.pop_front() {
            let next = dist[v.index()].map_or(0, |d| d + 1);
            for w in self.graph.neighbors(v) {
                if Some(w) == skip || dist[w.index()].is_some() {
                    continue;
                }
                dist[w.index()] = Some(next);
                queue.push_back(w);
            }
        }
        dist
    }

    fn component_count(&self, skip: Option<NodeIndex>) -> usize {
        let mut seen = vec![false; self.graph.node_count()];
        let mut count = 0;
        for node in self.graph.node_indices() {
            if Some(node) == skip || seen[node.index()] {
                continue;
            }
            count += 1;
            for (i, d) in self.hop_distances(node, skip).iter().enumerate() {
                if d.is_some() {
                    seen[i] = true;
                }
            }
        }
        count
    }

    /// Brandes' algorithm on hop distances, normalized for an undirected
    /// graph so the centre of a three-node line scores 1.
    fn betweenness(&self) -> Vec<f64> {
        let n = self.graph.node_count();
        let mut score = vec![0.0; n];
        for s in self.graph.node_indices() {
            let mut stack = Vec::with_capacity(n);
            let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
            let mut sigma = vec![0.0_f64; n];
            let mut dist: Vec<Option<usize>> = vec![None; n];
            sigma[s.index()] = 1.0;
            dist[s.index()] = Some(0);
            let mut queue = VecDeque::from([s]);

            while let Some(v) = queue.pop_front() {
                let (vi, dv) = (v.index(), dist[v.index()].unwrap_or(0));
                stack.push(vi);
                for w in self.graph.neighbors(v) {
                    let wi = w.index();
                    if dist[wi].is_none() {
                        dist[wi] = Some(dv + 1);
                        queue.push_back(w);
                    }
                    if dist[wi] == Some(dv + 1) {
                        sigma[wi] += sigma[vi];
                        preds[wi].push(vi);
                    }
                }
            }

            let mut delta = vec![0.0; n];
            while let Some(w) = stack.pop() {
                for &v in &preds[w] {
                    delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
                }
                if w != s.index() {
                    score[w] += delta[w];
                }
            }
        }
        // each pair was counted from both ends
        let scale = if n > 2 {
            1.0 / ((n - 1) * (n - 2)) as f64
        } else {
            0.0
        };
        score.into_iter().map(|c| c * scale).collect()
    }

    /// Power iteration on (A + I), L2-normalized.
    fn eigenvector(&self) -> Vec<f64> {
        let n = self.graph.node_count();
        let mut x = vec![1.0 / (n as f64).sqrt(); n];
        for _ in 0..EIGEN_MAX_ITERATIONS {
            let mut next = x.clone();
            for e in self.graph.edge_references() {
                let (s, t) = (e.source().index(), e.target().index());
                next[s] += x[t];
                next[t] += x[s];
            }
            let norm = next.iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm == 0.0 {
                break;
            }
            next.iter_mut().for_each(|v| *v /= norm);
            let change: f64 = next.iter().zip(&x).map(|(a, b)| (a - b).abs()).sum();
            x = next;
            if change < n as f64 * EIGEN_TOLERANCE {
                break;
            }
        }
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn place(kind: ModuleType, n: u16, x: f64, y: f64) -> Placement {
        Placement::new(
            ModuleId::new(kind, n),
            Arc::new(kind.standard_requirement()),
            Vec3::new(x, y, 0.0),
            0.0,
        )
    }

    fn id(kind: ModuleType, n: u16) -> ModuleId {
        ModuleId::new(kind, n)
    }

    fn line(count: u16, spacing: f64) -> Vec<Placement> {
        (1..=count)
            .map(|i| place(ModuleType::Storage, i, (i - 1) as f64 * spacing, 0.0))
            .collect()
    }

    fn graph(placements: &[Placement]) -> ConnectivityGraph {
        ConnectivityGraph::build(placements, &ConnectivityConfig::default())
    }

    #[test]
    fn test_single_node_is_connected() {
        let g = graph(&line(1, 0.0));
        assert!(g.is_connected());
        assert_eq!(g.connected_components().len(), 1);
        assert!(graph(&[]).is_connected());
    }

    #[test]
    fn test_far_pair_disconnected_unless_linked() {
        let a = place(ModuleType::Galley, 1, 0.0, 0.0);
        let b = place(ModuleType::Wardroom, 1, 20.0, 0.0);
        assert!(!graph(&[a.clone(), b.clone()]).is_connected());

        let linked = a.with_link(b.id);
        let g = graph(&[linked, b]);
        assert!(g.is_connected());
        let conn = g
            .connection(id(ModuleType::Galley, 1), id(ModuleType::Wardroom, 1))
            .unwrap();
        assert!(conn.explicit);
        assert!((conn.distance - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_too_close_is_not_an_edge() {
        let g = graph(&line(2, 0.25));
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn test_path_to_self() {
        let g = graph(&line(3, 5.0));
        let a = id(ModuleType::Storage, 2);
        assert_eq!(g.shortest_path(a, a), vec![a]);
        assert_eq!(g.shortest_path_length(a, a), 0.0);
    }

    #[test]
    fn test_path_through_intermediate() {
        // 10 m apart is out of range, so the route goes through the middle
        let g = graph(&line(3, 5.0));
        let (a, b, c) = (
            id(ModuleType::Storage, 1),
            id(ModuleType::Storage, 2),
            id(ModuleType::Storage, 3),
        );
        assert!(g.connection(a, c).is_none());
        let route = g.shortest_route(a, c).unwrap();
        assert_eq!(route.path, vec![a, b, c]);
        assert_eq!(route.hops(), 2);
        assert!((route.distance - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_unreachable_is_infinite() {
        let placements = vec![
            place(ModuleType::Storage, 1, 0.0, 0.0),
            place(ModuleType::Storage, 2, 30.0, 0.0),
        ];
        let g = graph(&placements);
        let (a, b) = (id(ModuleType::Storage, 1), id(ModuleType::Storage, 2));
        assert!(g.shortest_path(a, b).is_empty());
        assert!(g.shortest_path_length(a, b).is_infinite());
        let missing = id(ModuleType::Galley, 9);
        assert!(g.shortest_path_length(a, missing).is_infinite());
        let dists = g.distances_from(a);
        assert_eq!(dists[0], (a, 0.0));
        assert!(dists[1].1.is_infinite());
    }

    #[test]
    fn test_connection_type_priority() {
        use ModuleType as T;
        assert_eq!(
            ConnectionType::for_pair(T::Airlock, T::Medical),
            ConnectionType::External
        );
        assert_eq!(
            ConnectionType::for_pair(T::Storage, T::CommandControl),
            ConnectionType::Emergency
        );
        assert_eq!(
            ConnectionType::for_pair(T::Galley, T::LifeSupport),
            ConnectionType::Service
        );
        assert_eq!(
            ConnectionType::for_pair(T::Galley, T::Wardroom),
            ConnectionType::Pressurized
        );
    }

    #[test]
    fn test_components_ordered() {
        let placements = vec![
            place(ModuleType::Storage, 1, 0.0, 0.0),
            place(ModuleType::Storage, 2, 3.0, 0.0),
            place(ModuleType::Galley, 1, 50.0, 0.0),
        ];
        let comps = graph(&placements).connected_components();
        assert_eq!(comps.len(), 2);
        assert_eq!(comps[0], vec![id(ModuleType::Galley, 1)]);
        assert_eq!(comps[1].len(), 2);
    }

    #[test]
    fn test_line_centrality() {
        let g = graph(&line(3, 5.0));
        let metrics = g.centrality_metrics();
        let middle = metrics.get(id(ModuleType::Storage, 2)).unwrap();
        let end = metrics.get(id(ModuleType::Storage, 1)).unwrap();
        assert!((middle.betweenness - 1.0).abs() < 1e-12);
        assert_eq!(end.betweenness, 0.0);
        assert!((middle.degree - 1.0).abs() < 1e-12);
        assert!((middle.closeness - 1.0).abs() < 1e-12);
        assert!((end.closeness - 2.0 / 3.0).abs() < 1e-12);
        assert!(middle.eigenvector.unwrap() > end.eigenvector.unwrap());
    }

    #[test]
    fn test_eigenvector_skipped_when_disconnected() {
        let placements = vec![
            place(ModuleType::Storage, 1, 0.0, 0.0),
            place(ModuleType::Storage, 2, 40.0, 0.0),
        ];
        let metrics = graph(&placements).centrality_metrics();
        assert!(metrics.nodes.iter().all(|n| n.eigenvector.is_none()));
    }

    #[test]
    fn test_bottleneck_articulation() {
        let g = graph(&line(4, 5.0));
        let found = g.detect_bottlenecks(0.5);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|b| b.articulation));
        assert!(g.detect_bottlenecks(0.99).is_empty());
    }

    #[test]
    fn test_triangle_has_no_articulation() {
        let placements = vec![
            place(ModuleType::Storage, 1, 0.0, 0.0),
            place(ModuleType::Storage, 2, 4.0, 0.0),
            place(ModuleType::Storage, 3, 2.0, 3.0),
        ];
        let g = graph(&placements);
        assert_eq!(g.edge_count(), 3);
        let found = g.detect_bottlenecks(0.0);
        assert_eq!(found.len(), 3);
        assert!(found.iter().all(|b| !b.articulation));
    }

    #[test]
    fn test_spanning_length() {
        let placements = vec![
            place(ModuleType::Storage, 1, 0.0, 0.0),
            place(ModuleType::Storage, 2, 4.0, 0.0),
            place(ModuleType::Storage, 3, 4.0, 3.0),
        ];
        // edges 4, 3, 5: forest keeps 4 + 3
        assert!((graph(&placements).spanning_length() - 7.0).abs() < 1e-12);
    }
}
