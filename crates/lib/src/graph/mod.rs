//! Build Graph Builder.
//!
//! Expands subprojects, dependency plans and custom build rules into a DAG of
//! [`BuildUnit`]s. Edges run from a predecessor to the node that depends on it.
//!
//! The graph is a read-only view of the project: it references subprojects and
//! rules by name and never mutates them. Node status lives in the scheduler.

mod builder;
mod types;

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::ResolutionError;

pub use builder::{GraphBuilder, link_closure};
pub use types::{Action, BuildUnit, Invocation, NodeId, RebuildPolicy, Scope, UnitKind};

/// A validated, topologically ordered build graph.
#[derive(Debug, Clone)]
pub struct BuildGraph {
  graph: DiGraph<BuildUnit, ()>,
  index: HashMap<NodeId, NodeIndex>,
  order: Vec<NodeIndex>,
}

impl BuildGraph {
  /// Assemble a graph from units and `(predecessor, dependent)` edges.
  ///
  /// Units are numbered in the order given; that order breaks ties in the
  /// topological sort, so callers add units in manifest declaration order.
  ///
  /// # Errors
  ///
  /// [`ResolutionError::Cycle`] with the cycle's node ids if the edges do
  /// not form a DAG.
  pub fn new(units: Vec<BuildUnit>, edges: &[(NodeId, NodeId)]) -> Result<Self, ResolutionError> {
    let mut graph = DiGraph::with_capacity(units.len(), edges.len());
    let mut index = HashMap::with_capacity(units.len());

    for unit in units {
      let id = unit.id.clone();
      let idx = graph.add_node(unit);
      index.insert(id, idx);
    }

    let mut seen = HashSet::new();
    for (pred, dependent) in edges {
      if let (Some(&from), Some(&to)) = (index.get(pred), index.get(dependent))
        && seen.insert((from, to))
      {
        graph.add_edge(from, to, ());
      }
    }

    let mut built = Self {
      graph,
      index,
      order: Vec::new(),
    };
    built.order = built.kahn_order()?;
    Ok(built)
  }

  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }

  pub fn unit(&self, idx: NodeIndex) -> &BuildUnit {
    &self.graph[idx]
  }

  pub fn find(&self, id: &NodeId) -> Option<NodeIndex> {
    self.index.get(id).copied()
  }

  pub fn get(&self, id: &str) -> Option<&BuildUnit> {
    self.find(&NodeId::from(id)).map(|idx| &self.graph[idx])
  }

  /// Nodes in topological order, ties broken by declaration order.
  pub fn topo_order(&self) -> &[NodeIndex] {
    &self.order
  }

  /// Units in topological order.
  pub fn units(&self) -> impl Iterator<Item = &BuildUnit> {
    self.order.iter().map(|&idx| &self.graph[idx])
  }

  /// Direct predecessors, in declaration order.
  pub fn predecessors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
    let mut preds: Vec<_> = self.graph.neighbors_directed(idx, Direction::Incoming).collect();
    preds.sort();
    preds
  }

  /// Direct dependents, in declaration order.
  pub fn dependents(&self, idx: NodeIndex) -> Vec<NodeIndex> {
    let mut deps: Vec<_> = self.graph.neighbors_directed(idx, Direction::Outgoing).collect();
    deps.sort();
    deps
  }

  /// Keep only the nodes matching `keep` and everything they transitively depend on.
  pub fn restrict(&self, keep: impl Fn(&BuildUnit) -> bool) -> BuildGraph {
    let mut selected: HashSet<NodeIndex> = HashSet::new();
    let mut stack: Vec<NodeIndex> = self.graph.node_indices().filter(|&idx| keep(&self.graph[idx])).collect();

    while let Some(idx) = stack.pop() {
      if selected.insert(idx) {
        stack.extend(self.graph.neighbors_directed(idx, Direction::Incoming));
      }
    }

    let graph = self
      .graph
      .filter_map(|idx, unit| selected.contains(&idx).then(|| unit.clone()), |_, _| Some(()));
    let index = graph.node_indices().map(|idx| (graph[idx].id.clone(), idx)).collect();

    let mut restricted = Self {
      graph,
      index,
      order: Vec::new(),
    };
    // A subgraph of a DAG is a DAG.
    restricted.order = restricted.kahn_order().unwrap_or_default();
    restricted
  }

  fn kahn_order(&self) -> Result<Vec<NodeIndex>, ResolutionError> {
    let mut in_degree: Vec<usize> = self
      .graph
      .node_indices()
      .map(|idx| self.graph.neighbors_directed(idx, Direction::Incoming).count())
      .collect();

    let mut ready: BinaryHeap<Reverse<NodeIndex>> = self
      .graph
      .node_indices()
      .filter(|idx| in_degree[idx.index()] == 0)
      .map(Reverse)
      .collect();

    let mut order = Vec::with_capacity(self.graph.node_count());
    while let Some(Reverse(idx)) = ready.pop() {
      order.push(idx);
      for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
        in_degree[next.index()] -= 1;
        if in_degree[next.index()] == 0 {
          ready.push(Reverse(next));
        }
      }
    }

    if order.len() == self.graph.node_count() {
      Ok(order)
    } else {
      Err(ResolutionError::Cycle {
        cycle: self.find_cycle().unwrap_or_default(),
      })
    }
  }

  /// DFS for a back edge; returns the cycle as node ids, closed on its start.
  fn find_cycle(&self) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
      New,
      Active,
      Done,
    }

    fn visit(graph: &DiGraph<BuildUnit, ()>, idx: NodeIndex, marks: &mut [Mark], path: &mut Vec<NodeIndex>) -> Option<Vec<String>> {
      marks[idx.index()] = Mark::Active;
      path.push(idx);

      let mut next: Vec<_> = graph.neighbors_directed(idx, Direction::Outgoing).collect();
      next.sort();
      for n in next {
        match marks[n.index()] {
          Mark::Active => {
            let start = path.iter().position(|&p| p == n).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..].iter().map(|&p| graph[p].id.to_string()).collect();
            cycle.push(graph[n].id.to_string());
            return Some(cycle);
          }
          Mark::New => {
            if let Some(cycle) = visit(graph, n, marks, path) {
              return Some(cycle);
            }
          }
          Mark::Done => {}
        }
      }

      path.pop();
      marks[idx.index()] = Mark::Done;
      None
    }

    let mut marks = vec![Mark::New; self.graph.node_count()];
    for idx in self.graph.node_indices() {
      if marks[idx.index()] == Mark::New
        && let Some(cycle) = visit(&self.graph, idx, &mut marks, &mut Vec::new())
      {
        return Some(cycle);
      }
    }
    None
  }
}
