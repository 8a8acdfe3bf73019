//! Variable-length path traversal and shortest-path search over an
//! in-memory edge snapshot.
//!
//! Both algorithms are iterative frontier expansions over a node arena, so
//! cyclic RELATED_TO graphs terminate without recursion depth limits. The
//! visited budget bounds total expansion work; hitting it flips the
//! `truncated` flag on the result instead of failing.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;

use crate::db::Db;
use crate::error::Result;
use crate::model::{EntityRef, RelKind};

use super::{load_edges, Edge};

/// Which stored edge directions a traversal follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

/// One hop of a path: the relationship taken and the node arrived at.
/// `forward` is false when the stored edge was walked against its direction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathStep {
    pub rel: RelKind,
    pub node: EntityRef,
    pub forward: bool,
}

/// A concrete path rooted at `start`. Zero steps is the trivial path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Path {
    pub start: EntityRef,
    pub steps: Vec<PathStep>,
}

impl Path {
    pub fn hops(&self) -> usize {
        self.steps.len()
    }

    pub fn end(&self) -> &EntityRef {
        self.steps.last().map(|s| &s.node).unwrap_or(&self.start)
    }

    /// All nodes on the path, start first.
    pub fn nodes(&self) -> Vec<&EntityRef> {
        std::iter::once(&self.start)
            .chain(self.steps.iter().map(|s| &s.node))
            .collect()
    }
}

/// Traversal output. `truncated` signals the visited budget was hit and the
/// paths are a partial result, not a failure.
#[derive(Debug, Clone)]
pub struct Traversal {
    pub paths: Vec<Path>,
    pub truncated: bool,
}

/// Node arena plus adjacency, built once per query from the edge snapshot.
struct Snapshot {
    nodes: Vec<EntityRef>,
    index: HashMap<EntityRef, usize>,
    /// Per node: (rel, neighbor index, forward).
    adjacency: Vec<Vec<(RelKind, usize, bool)>>,
}

impl Snapshot {
    fn build(edges: &[Edge], direction: Direction, precedence: &[RelKind]) -> Self {
        let mut snapshot = Snapshot {
            nodes: Vec::new(),
            index: HashMap::new(),
            adjacency: Vec::new(),
        };
        for edge in edges {
            let from = snapshot.intern(&edge.from);
            let to = snapshot.intern(&edge.to);
            if matches!(direction, Direction::Outgoing | Direction::Both) {
                snapshot.adjacency[from].push((edge.rel, to, true));
            }
            if matches!(direction, Direction::Incoming | Direction::Both) {
                snapshot.adjacency[to].push((edge.rel, from, false));
            }
        }
        // Deterministic expansion order: relationship-type precedence as the
        // caller gave it, then neighbor name ascending.
        let rank = |rel: RelKind| {
            precedence
                .iter()
                .position(|r| *r == rel)
                .unwrap_or(precedence.len())
        };
        for neighbors in &mut snapshot.adjacency {
            neighbors.sort_by(|a, b| {
                rank(a.0)
                    .cmp(&rank(b.0))
                    .then_with(|| snapshot.nodes[a.1].name.cmp(&snapshot.nodes[b.1].name))
                    .then_with(|| {
                        snapshot.nodes[a.1]
                            .kind
                            .as_str()
                            .cmp(snapshot.nodes[b.1].kind.as_str())
                    })
            });
        }
        snapshot
    }

    fn intern(&mut self, node: &EntityRef) -> usize {
        if let Some(&idx) = self.index.get(node) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(node.clone());
        self.index.insert(node.clone(), idx);
        self.adjacency.push(Vec::new());
        idx
    }
}

/// Enumerate all simple paths from `start` with a hop count in
/// `min_hops..=max_hops`, following `rel_types` edges (all types when
/// empty) in the given `direction`.
///
/// Each in-flight path carries its own visited set, so a node may appear in
/// many paths but never twice in one. `visited_budget` caps the number of
/// (node, depth) expansions across the whole query.
pub async fn traverse(
    db: &Db,
    start: EntityRef,
    rel_types: Vec<RelKind>,
    min_hops: usize,
    max_hops: usize,
    direction: Direction,
    visited_budget: usize,
) -> Result<Traversal> {
    let edges = db
        .with_connection(move |conn| {
            let filter = if rel_types.is_empty() {
                None
            } else {
                Some(rel_types.as_slice())
            };
            let edges = load_edges(conn, filter)?;
            Ok((edges, rel_types))
        })
        .await?;
    let (edges, rel_types) = edges;
    Ok(traverse_edges(
        &edges,
        &start,
        &rel_types,
        min_hops,
        max_hops,
        direction,
        visited_budget,
    ))
}

fn traverse_edges(
    edges: &[Edge],
    start: &EntityRef,
    rel_types: &[RelKind],
    min_hops: usize,
    max_hops: usize,
    direction: Direction,
    visited_budget: usize,
) -> Traversal {
    let snapshot = Snapshot::build(edges, direction, rel_types);
    let mut paths = Vec::new();
    let mut truncated = false;

    if min_hops == 0 {
        paths.push(Path {
            start: start.clone(),
            steps: Vec::new(),
        });
    }

    let start_idx = match snapshot.index.get(start) {
        Some(&idx) => idx,
        None => {
            // No edge touches the start node; only the trivial path exists.
            return Traversal { paths, truncated };
        }
    };

    // Frontier item: current node, depth, steps so far, nodes on this path.
    let mut queue: VecDeque<(usize, usize, Vec<PathStep>, HashSet<usize>)> = VecDeque::new();
    let mut expansions = 0usize;
    queue.push_back((start_idx, 0, Vec::new(), HashSet::from([start_idx])));

    while let Some((node, depth, steps, visited)) = queue.pop_front() {
        if depth >= max_hops {
            continue;
        }
        expansions += 1;
        if expansions > visited_budget {
            truncated = true;
            break;
        }
        for &(rel, neighbor, forward) in &snapshot.adjacency[node] {
            if visited.contains(&neighbor) {
                continue;
            }
            let mut next_steps = steps.clone();
            next_steps.push(PathStep {
                rel,
                node: snapshot.nodes[neighbor].clone(),
                forward,
            });
            if depth + 1 >= min_hops {
                paths.push(Path {
                    start: start.clone(),
                    steps: next_steps.clone(),
                });
            }
            let mut next_visited = visited.clone();
            next_visited.insert(neighbor);
            queue.push_back((neighbor, depth + 1, next_steps, next_visited));
        }
    }

    Traversal { paths, truncated }
}

/// Breadth-first shortest path between two entities, treating every edge as
/// undirected. `rel_types` doubles as the tie-break precedence: when two
/// equal-length paths exist, the one using earlier-listed relationship
/// types wins.
pub async fn shortest_path(
    db: &Db,
    a: EntityRef,
    b: EntityRef,
    rel_types: Vec<RelKind>,
) -> Result<Option<Path>> {
    let edges = db
        .with_connection(move |conn| {
            let filter = if rel_types.is_empty() {
                None
            } else {
                Some(rel_types.as_slice())
            };
            let edges = load_edges(conn, filter)?;
            Ok((edges, rel_types))
        })
        .await?;
    let (edges, rel_types) = edges;
    Ok(shortest_path_edges(&edges, &a, &b, &rel_types))
}

fn shortest_path_edges(
    edges: &[Edge],
    a: &EntityRef,
    b: &EntityRef,
    rel_types: &[RelKind],
) -> Option<Path> {
    if a == b {
        return Some(Path {
            start: a.clone(),
            steps: Vec::new(),
        });
    }

    let snapshot = Snapshot::build(edges, Direction::Both, rel_types);
    let start_idx = *snapshot.index.get(a)?;
    let target_idx = *snapshot.index.get(b)?;

    // Parent pointers: node -> (previous node, rel, forward). Neighbors are
    // expanded in precedence order, so the first parent recorded for a node
    // is the tie-break winner.
    let mut parent: HashMap<usize, (usize, RelKind, bool)> = HashMap::new();
    let mut visited: HashSet<usize> = HashSet::from([start_idx]);
    let mut queue = VecDeque::from([start_idx]);

    'search: while let Some(node) = queue.pop_front() {
        for &(rel, neighbor, forward) in &snapshot.adjacency[node] {
            if visited.contains(&neighbor) {
                continue;
            }
            visited.insert(neighbor);
            parent.insert(neighbor, (node, rel, forward));
            if neighbor == target_idx {
                break 'search;
            }
            queue.push_back(neighbor);
        }
    }

    if !parent.contains_key(&target_idx) {
        return None;
    }

    let mut steps = Vec::new();
    let mut cursor = target_idx;
    while cursor != start_idx {
        let (prev, rel, forward) = parent[&cursor];
        steps.push(PathStep {
            rel,
            node: snapshot.nodes[cursor].clone(),
            forward,
        });
        cursor = prev;
    }
    steps.reverse();
    Some(Path {
        start: a.clone(),
        steps,
    })
}
