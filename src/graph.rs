//! Derived/override and call-graph traversal over a `Db` snapshot.
//!
//! A `petgraph::DiGraph` guarded by an `RwLock` plus a `Usr -> NodeIndex`
//! side table, with BFS-by-level traversal and an incoming-edge "impact
//! radius" walk. Nodes here are `Usr`s; edges are either an override
//! (`base -> derived`, from `Row::derived`) or a call (`caller ->
//! callee`, from `Def::callees`).

use crate::db::Db;
use crate::types::{Kind, Usr};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Overrides,
    Calls,
}

#[derive(Debug)]
pub struct DependencyGraph {
    graph: RwLock<DiGraph<Usr, EdgeKind>>,
    node_map: RwLock<HashMap<Usr, NodeIndex>>,
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        DependencyGraph {
            graph: RwLock::new(DiGraph::new()),
            node_map: RwLock::new(HashMap::new()),
        }
    }

    pub fn add_symbol(&self, usr: Usr) -> NodeIndex {
        let mut graph = self.graph.write().unwrap();
        let mut node_map = self.node_map.write().unwrap();
        if let Some(&idx) = node_map.get(&usr) {
            idx
        } else {
            let idx = graph.add_node(usr);
            node_map.insert(usr, idx);
            idx
        }
    }

    pub fn add_edge(&self, from: Usr, to: Usr, kind: EdgeKind) {
        let from_idx = self.add_symbol(from);
        let to_idx = self.add_symbol(to);
        self.graph.write().unwrap().add_edge(from_idx, to_idx, kind);
    }

    /// Build the graph for one kind from a `Db` snapshot: an `Overrides`
    /// edge `base -> derived` per `Row::derived`, plus (for `Kind::Func`)
    /// a `Calls` edge per callee recorded on the preferred def.
    pub fn from_db(db: &Db, kind: Kind) -> Self {
        let graph = DependencyGraph::new();
        let rows = match kind {
            Kind::Func => &db.funcs,
            Kind::Type => &db.types,
            Kind::Var => &db.vars,
            Kind::Invalid => return graph,
        };
        for row in rows {
            graph.add_symbol(row.usr);
            for &derived in &row.derived {
                graph.add_edge(row.usr, derived, EdgeKind::Overrides);
            }
            if kind == Kind::Func {
                if let Some(def) = row.preferred_def() {
                    for callee in &def.callees {
                        graph.add_edge(row.usr, callee.callee, EdgeKind::Calls);
                    }
                }
            }
        }
        graph
    }

    /// Breadth-first levels reachable from `start` by outgoing edges,
    /// capped at `max_depth` levels (including the start level).
    pub fn traverse_bfs(&self, start: Usr, max_depth: Option<usize>) -> Vec<Vec<Usr>> {
        let graph = self.graph.read().unwrap();
        let node_map = self.node_map.read().unwrap();
        let mut levels = Vec::new();

        let Some(&start_idx) = node_map.get(&start) else {
            return levels;
        };
        let mut current = vec![start_idx];
        let mut visited = HashSet::new();
        visited.insert(start_idx);

        while !current.is_empty() {
            if let Some(max_d) = max_depth {
                if levels.len() >= max_d {
                    break;
                }
            }
            let mut level = Vec::new();
            let mut next = Vec::new();
            for idx in current {
                if let Some(&usr) = graph.node_weight(idx) {
                    level.push(usr);
                    for edge in graph.edges(idx) {
                        let target = edge.target();
                        if visited.insert(target) {
                            next.push(target);
                        }
                    }
                }
            }
            if !level.is_empty() {
                levels.push(level);
            }
            current = next;
        }
        levels
    }

    /// Symbols that transitively depend on `start` via incoming edges
    /// (who would be affected by a change to `start`), up to `max_depth`
    /// hops.
    pub fn get_impact_radius(&self, start: Usr, max_depth: Option<usize>) -> Vec<Usr> {
        let max_depth = max_depth.unwrap_or(5);
        let graph = self.graph.read().unwrap();
        let node_map = self.node_map.read().unwrap();
        let mut impacted = Vec::new();
        let mut visited = HashSet::new();

        let Some(&start_idx) = node_map.get(&start) else {
            return impacted;
        };
        let mut current = vec![start_idx];
        visited.insert(start_idx);
        let mut depth = 0;

        while !current.is_empty() && depth < max_depth {
            let mut next = Vec::new();
            for idx in current {
                for edge in graph.edges_directed(idx, petgraph::Direction::Incoming) {
                    let source = edge.source();
                    if visited.insert(source) {
                        next.push(source);
                        if let Some(&usr) = graph.node_weight(source) {
                            impacted.push(usr);
                        }
                    }
                }
            }
            current = next;
            depth += 1;
        }
        impacted
    }

    pub fn len(&self) -> usize {
        self.node_map.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
