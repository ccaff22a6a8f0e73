//! Schema dependency graph for FK-safe import order.
//!
//! Provides:
//! - Dependency graph construction from one schema's foreign keys
//! - Cycle prevention by disabling the foreign key that would close a cycle
//! - Topological sorting with document-order tie breaking

use super::{SchemaDocument, TableId};
use crate::error::{NormalizeError, Result};
use ahash::{AHashMap, AHashSet};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use tracing::{debug, warn};

/// Why a foreign key was disabled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisableReason {
    /// Honouring it would make the schema impossible to order
    Cycle,
    /// It references a disposed table
    DisposedTarget,
    /// It references a table in another schema
    CrossSchema,
}

impl std::fmt::Display for DisableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisableReason::Cycle => write!(f, "cycle"),
            DisableReason::DisposedTarget => write!(f, "disposed target"),
            DisableReason::CrossSchema => write!(f, "cross-schema target"),
        }
    }
}

/// A foreign key the grapher decided to disable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisabledConstraint {
    pub table: TableId,
    /// Index into the table's `foreign_keys`
    pub fk_index: usize,
    pub reason: DisableReason,
}

/// Result of topological sort
#[derive(Debug)]
pub struct TopoSortResult {
    /// Node indices in topological order (dependencies first)
    pub order: Vec<usize>,
    /// Nodes left over because they sit on or behind a cycle
    pub cyclic: Vec<usize>,
}

/// Kahn's algorithm over a `node -> dependencies` adjacency list.
///
/// Among nodes that are ready at the same time the lowest index goes first,
/// so the output follows insertion order wherever the dependencies allow.
pub fn topo_sort(parents: &[Vec<usize>]) -> TopoSortResult {
    let n = parents.len();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut in_degree: Vec<usize> = vec![0; n];

    for (child, deps) in parents.iter().enumerate() {
        for &parent in deps {
            children[parent].push(child);
            in_degree[child] += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &deg)| deg == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(n);

    while let Some(Reverse(node)) = ready.pop() {
        order.push(node);

        for &child in &children[node] {
            in_degree[child] -= 1;
            if in_degree[child] == 0 {
                ready.push(Reverse(child));
            }
        }
    }

    let cyclic = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &deg)| deg > 0)
        .map(|(i, _)| i)
        .collect();

    TopoSortResult { order, cyclic }
}

/// Dependency order for one schema
#[derive(Debug, Clone, Default)]
pub struct TableOrder {
    pub schema: String,
    /// Tables in dependency order (referenced tables first)
    pub order: Vec<TableId>,
    /// Foreign keys that must be disabled
    pub disabled: Vec<DisabledConstraint>,
    /// Ordered tables with exactly one enabled self-referencing foreign key
    pub self_referencing: Vec<TableId>,
}

impl TableOrder {
    /// Table names in order
    pub fn names(&self, doc: &SchemaDocument) -> Vec<String> {
        self.order
            .iter()
            .filter_map(|id| doc.table(*id).map(|t| t.name.clone()))
            .collect()
    }

    /// Disable the chosen constraints and record each table's position
    pub fn apply_to(&self, doc: &mut SchemaDocument) {
        for d in &self.disabled {
            if let Some(fk) = doc
                .table_mut(d.table)
                .and_then(|t| t.foreign_keys.get_mut(d.fk_index))
            {
                fk.disable();
            }
        }

        for id in doc.table_ids_in(&self.schema) {
            if let Some(table) = doc.table_mut(id) {
                table.dep_position = None;
            }
        }
        for (pos, id) in self.order.iter().enumerate() {
            if let Some(table) = doc.table_mut(*id) {
                table.dep_position = Some(pos);
            }
        }
    }
}

/// Foreign key edge between two graph nodes
#[derive(Debug)]
struct Edge {
    from: usize,
    to: usize,
    table: TableId,
    fk_indexes: Vec<usize>,
}

/// Dependency graph of one schema.
///
/// An edge `a -> b` means table `a` has a foreign key referencing `b`, so
/// `b` must be created and loaded first.
#[derive(Debug)]
pub struct SchemaGraph {
    schema: String,
    /// Participating tables in document order
    nodes: Vec<TableId>,
    /// For each node, the nodes it references
    parents: Vec<Vec<usize>>,
    edges: Vec<Edge>,
    disabled: Vec<DisabledConstraint>,
    self_referencing: Vec<TableId>,
}

impl SchemaGraph {
    /// Build the graph for `schema`, skipping disposed tables and `excluded`.
    ///
    /// Edges are admitted in document order; an edge whose target already
    /// depends (transitively) on its source is refused and its foreign key
    /// recorded as disabled instead.
    pub fn build(
        doc: &SchemaDocument,
        schema: &str,
        excluded: &AHashSet<TableId>,
    ) -> Result<Self> {
        let ids = doc.table_ids_in(schema);
        let nodes: Vec<TableId> = ids
            .iter()
            .copied()
            .filter(|id| !excluded.contains(id))
            .filter(|id| doc.table(*id).is_some_and(|t| !t.disposed))
            .collect();
        let index: AHashMap<TableId, usize> =
            nodes.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let mut graph = Self {
            schema: schema.to_string(),
            parents: vec![Vec::new(); nodes.len()],
            nodes,
            edges: Vec::new(),
            disabled: Vec::new(),
            self_referencing: Vec::new(),
        };

        for id in ids {
            let Some(table) = doc.table(id) else { continue };
            let owner = index.get(&id).copied();
            let mut self_refs = 0;

            for (fk_index, fk) in table.foreign_keys.iter().enumerate() {
                if fk.is_disabled() {
                    continue;
                }

                let target_schema = fk.target_schema.as_deref().unwrap_or(&table.schema);
                let Some(target_id) = doc.find_table(target_schema, &fk.target_table) else {
                    if owner.is_some() {
                        return Err(NormalizeError::MissingTable {
                            table: table.original().to_string(),
                            constraint: fk.original().to_string(),
                            target: fk.target_table.clone(),
                        });
                    }
                    continue;
                };

                let Some(target) = doc.table(target_id) else { continue };
                if target.disposed {
                    graph.disable(id, fk_index, DisableReason::DisposedTarget);
                    continue;
                }
                if !target.schema.eq_ignore_ascii_case(schema) {
                    graph.disable(id, fk_index, DisableReason::CrossSchema);
                    continue;
                }

                let Some(from) = owner else { continue };
                if target_id == id {
                    self_refs += 1;
                    continue;
                }
                let Some(&to) = index.get(&target_id) else {
                    // Excluded from this run: no edge, constraint untouched
                    continue;
                };

                if let Some(edge) = graph.edges.iter_mut().find(|e| e.from == from && e.to == to)
                {
                    edge.fk_indexes.push(fk_index);
                    continue;
                }

                if graph.reaches(to, from) {
                    warn!(
                        table = table.original(),
                        constraint = fk.original(),
                        target = target.original(),
                        "disabling foreign key that would close a dependency cycle"
                    );
                    graph.disable(id, fk_index, DisableReason::Cycle);
                    continue;
                }

                debug!(from = %table.name, to = %target.name, "dependency edge");
                graph.parents[from].push(to);
                graph.edges.push(Edge {
                    from,
                    to,
                    table: id,
                    fk_indexes: vec![fk_index],
                });
            }

            if owner.is_some() && self_refs == 1 {
                graph.self_referencing.push(id);
            }
        }

        Ok(graph)
    }

    fn disable(&mut self, table: TableId, fk_index: usize, reason: DisableReason) {
        self.disabled.push(DisabledConstraint {
            table,
            fk_index,
            reason,
        });
    }

    /// Number of participating tables
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check whether `target` is reachable from `start` by following references
    fn reaches(&self, start: usize, target: usize) -> bool {
        if start == target {
            return true;
        }

        let mut visited = vec![false; self.len()];
        let mut queue = VecDeque::new();
        queue.push_back(start);
        visited[start] = true;

        while let Some(current) = queue.pop_front() {
            for &parent in &self.parents[current] {
                if parent == target {
                    return true;
                }
                if !visited[parent] {
                    visited[parent] = true;
                    queue.push_back(parent);
                }
            }
        }

        false
    }

    /// Sort to convergence.
    ///
    /// Edge admission already keeps the graph acyclic; if a residual cycle
    /// shows up anyway, one of its edges is disabled and the sort repeats.
    pub fn into_order(mut self) -> TableOrder {
        loop {
            let result = topo_sort(&self.parents);
            if result.cyclic.is_empty() {
                return TableOrder {
                    schema: self.schema,
                    order: result.order.iter().map(|&i| self.nodes[i]).collect(),
                    disabled: self.disabled,
                    self_referencing: self.self_referencing,
                };
            }

            let cyclic: AHashSet<usize> = result.cyclic.iter().copied().collect();
            let Some(pos) = self
                .edges
                .iter()
                .position(|e| cyclic.contains(&e.from) && cyclic.contains(&e.to))
            else {
                // No recorded edge to break; keep leftovers in document order
                let mut order: Vec<TableId> =
                    result.order.iter().map(|&i| self.nodes[i]).collect();
                order.extend(result.cyclic.iter().map(|&i| self.nodes[i]));
                return TableOrder {
                    schema: self.schema,
                    order,
                    disabled: self.disabled,
                    self_referencing: self.self_referencing,
                };
            };

            let edge = self.edges.remove(pos);
            warn!(schema = %self.schema, "breaking residual dependency cycle");
            self.parents[edge.from].retain(|&p| p != edge.to);
            for fk_index in edge.fk_indexes {
                self.disable(edge.table, fk_index, DisableReason::Cycle);
            }
        }
    }
}

/// Order the tables of one schema.
///
/// Disposed tables and `excluded` tables are left out. Cycles are resolved
/// by disabling constraints (see [`TableOrder::disabled`]); a foreign key
/// pointing at a table absent from the document is a `MissingTable` error.
pub fn order_tables(
    doc: &SchemaDocument,
    schema: &str,
    excluded: &AHashSet<TableId>,
) -> Result<TableOrder> {
    Ok(SchemaGraph::build(doc, schema, excluded)?.into_order())
}
