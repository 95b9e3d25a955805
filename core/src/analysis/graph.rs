//! Dependency graph over entities and constraints.
//!
//! Nodes are entities, plus parameters that no entity owns. Cycles are
//! searched in the undirected incidence graph where every driving constraint
//! is a vertex joined to the nodes it touches, so operand order never matters.
//! Depth follows parent to child links and, for each constraint, the link from
//! the first node it touches to the others.

use crate::constraints::ConstraintRegistry;
use crate::entities::EntityRegistry;
use crate::ids::{ConstraintId, EntityId, ParameterId};
use crate::parameters::ParameterRegistry;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeId {
    Entity(EntityId),
    Parameter(ParameterId),
}

/// A closed walk alternating between nodes and the driving constraints joining them.
#[derive(Debug, Clone, PartialEq)]
pub struct Cycle {
    pub nodes: Vec<NodeId>,
    pub constraints: Vec<ConstraintId>,
}

/// Nodes linked by driving constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub nodes: Vec<NodeId>,
    pub constraints: Vec<ConstraintId>,
    pub degrees_of_freedom: usize,
    pub equations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnPath,
    Done,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<NodeId>,
    index: HashMap<NodeId, usize>,
    dof: Vec<usize>,
    /// Directed links used for depth only
    links: Vec<Vec<usize>>,
    /// Undirected adjacency; vertex `nodes.len() + k` is the k-th driving constraint
    incidence: Vec<Vec<usize>>,
    /// Driving constraints with the nodes they touch and their equation count
    constraints: Vec<(ConstraintId, Vec<usize>, usize)>,
}

impl DependencyGraph {
    pub fn build(parameters: &ParameterRegistry, entities: &EntityRegistry, constraints: &ConstraintRegistry) -> Self {
        let mut graph = Self::default();
        let ownership = entities.ownership();

        for entity in entities.iter() {
            graph.add_node(NodeId::Entity(entity.id.clone()), entity.degrees_of_freedom());
        }
        for parameter in parameters.iter() {
            if !ownership.contains_key(&parameter.id) {
                graph.add_node(NodeId::Parameter(parameter.id.clone()), 1);
            }
        }

        for entity in entities.iter() {
            let from = graph.index[&NodeId::Entity(entity.id.clone())];
            for child in &entity.children {
                if let Some(&to) = graph.index.get(&NodeId::Entity(child.clone())) {
                    graph.links[from].push(to);
                }
            }
        }

        for constraint in constraints.driving() {
            let mut touched = Vec::new();
            for parameter in constraint.referenced_parameters() {
                let node = match ownership.get(&parameter) {
                    Some(owner) => NodeId::Entity(owner.clone()),
                    None => NodeId::Parameter(parameter),
                };
                if let Some(&i) = graph.index.get(&node) {
                    if !touched.contains(&i) {
                        touched.push(i);
                    }
                }
            }
            if let Some((&first, rest)) = touched.split_first() {
                graph.links[first].extend_from_slice(rest);
            }

            let vertex = graph.incidence.len();
            for &i in &touched {
                graph.incidence[i].push(vertex);
            }
            graph.incidence.push(touched.clone());
            graph
                .constraints
                .push((constraint.id.clone(), touched, constraint.relation.equation_count()));
        }
        graph
    }

    fn add_node(&mut self, node: NodeId, dof: usize) {
        self.index.insert(node.clone(), self.nodes.len());
        self.nodes.push(node);
        self.dof.push(dof);
        self.links.push(Vec::new());
        self.incidence.push(Vec::new());
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Entities touched by each driving constraint.
    pub fn entities_per_constraint(&self) -> Vec<(ConstraintId, Vec<EntityId>)> {
        self.constraints
            .iter()
            .map(|(id, touched, _)| {
                let entities = touched
                    .iter()
                    .filter_map(|&i| match &self.nodes[i] {
                        NodeId::Entity(e) => Some(e.clone()),
                        NodeId::Parameter(_) => None,
                    })
                    .collect();
                (id.clone(), entities)
            })
            .collect()
    }

    /// One cycle per back edge of the search, each constraint set reported once.
    ///
    /// Every cycle holds at least two constraints: two constraints over the
    /// same pair of nodes already close one.
    pub fn cycles(&self) -> Vec<Cycle> {
        let mut marks = vec![Mark::Unvisited; self.incidence.len()];
        let mut path: Vec<usize> = Vec::new();
        let mut found = Vec::new();
        let mut seen: HashSet<Vec<ConstraintId>> = HashSet::new();

        for start in 0..self.incidence.len() {
            if marks[start] == Mark::Unvisited {
                self.visit(start, &mut marks, &mut path, &mut found, &mut seen);
            }
        }
        found
    }

    fn visit(
        &self,
        vertex: usize,
        marks: &mut [Mark],
        path: &mut Vec<usize>,
        found: &mut Vec<Cycle>,
        seen: &mut HashSet<Vec<ConstraintId>>,
    ) {
        let parent = path.last().copied();
        marks[vertex] = Mark::OnPath;
        path.push(vertex);

        for &next in &self.incidence[vertex] {
            match marks[next] {
                Mark::Unvisited => self.visit(next, marks, path, found, seen),
                // The incidence graph has no parallel edges, so only the
                // parent itself is excluded.
                Mark::OnPath if Some(next) != parent => {
                    let Some(start) = path.iter().position(|&v| v == next) else {
                        continue;
                    };
                    let ring = &path[start..];
                    let constraints: Vec<ConstraintId> = ring
                        .iter()
                        .filter_map(|&v| v.checked_sub(self.nodes.len()))
                        .map(|k| self.constraints[k].0.clone())
                        .collect();
                    let mut key = constraints.clone();
                    key.sort();
                    if seen.insert(key) {
                        found.push(Cycle {
                            nodes: ring
                                .iter()
                                .filter(|&&v| v < self.nodes.len())
                                .map(|&v| self.nodes[v].clone())
                                .collect(),
                            constraints,
                        });
                    }
                }
                _ => {}
            }
        }

        path.pop();
        marks[vertex] = Mark::Done;
    }

    /// Groups of nodes joined by driving constraints.
    pub fn components(&self) -> Vec<Component> {
        let mut parent: Vec<usize> = (0..self.nodes.len()).collect();
        fn find(parent: &mut [usize], mut i: usize) -> usize {
            while parent[i] != i {
                parent[i] = parent[parent[i]];
                i = parent[i];
            }
            i
        }

        for (_, touched, _) in &self.constraints {
            if let Some((&first, rest)) = touched.split_first() {
                for &other in rest {
                    let (a, b) = (find(&mut parent, first), find(&mut parent, other));
                    if a != b {
                        parent[b] = a;
                    }
                }
            }
        }

        let mut by_root: HashMap<usize, usize> = HashMap::new();
        let mut components: Vec<Component> = Vec::new();
        for (id, touched, equations) in &self.constraints {
            let Some(&first) = touched.first() else {
                continue;
            };
            let root = find(&mut parent, first);
            let slot = *by_root.entry(root).or_insert_with(|| {
                components.push(Component {
                    nodes: Vec::new(),
                    constraints: Vec::new(),
                    degrees_of_freedom: 0,
                    equations: 0,
                });
                components.len() - 1
            });
            components[slot].constraints.push(id.clone());
            components[slot].equations += equations;
        }
        for i in 0..self.nodes.len() {
            let root = find(&mut parent, i);
            if let Some(&slot) = by_root.get(&root) {
                components[slot].nodes.push(self.nodes[i].clone());
                components[slot].degrees_of_freedom += self.dof[i];
            }
        }
        components
    }

    /// Longest link path, ignoring links that close a cycle.
    pub fn max_depth(&self) -> usize {
        let mut depth: Vec<Option<usize>> = vec![None; self.nodes.len()];
        let mut on_path = vec![false; self.nodes.len()];
        (0..self.nodes.len())
            .map(|i| self.depth_from(i, &mut depth, &mut on_path))
            .max()
            .unwrap_or(0)
    }

    fn depth_from(&self, node: usize, depth: &mut [Option<usize>], on_path: &mut [bool]) -> usize {
        if let Some(d) = depth[node] {
            return d;
        }
        on_path[node] = true;
        let mut best = 0;
        for &to in &self.links[node] {
            if !on_path[to] {
                best = best.max(1 + self.depth_from(to, depth, on_path));
            }
        }
        on_path[node] = false;
        depth[node] = Some(best);
        best
    }
}
