//! Dependency graph of cells and ranges
//!
//! Entities live in an arena indexed by [`EntityId`]; adjacency is held in
//! forward (dependents) and reverse (precedents) edge lists keyed by that
//! id, with an address→id map on the side. An edge A→B means "B's formula
//! consumes A's value". Evaluation requires the graph to be acyclic; the
//! builder runs [`DependencyGraph::find_cycle`] after construction and
//! rejects cyclic graphs.

use crate::compile::CompiledExpr;
use ahash::{AHashMap, AHashSet};
use cellgraph_core::{CellKey, RangeKey, Value};
use std::fmt;
use std::rc::Rc;

/// Arena index of a graph entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId(u32);

impl EntityId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Canonical address of either entity kind, the map key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Cell(CellKey),
    Range(RangeKey),
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Cell(key) => write!(f, "{key}"),
            EntityKey::Range(key) => write!(f, "{key}"),
        }
    }
}

/// One spreadsheet cell in the graph
///
/// The address is immutable once constructed; `value` is the only mutable
/// field (the memoization cache, `None` while dirty). Pure constants carry
/// no compiled expression.
#[derive(Debug, Clone)]
pub struct Cell {
    pub key: CellKey,
    /// Raw formula text including the leading `=`, if any
    pub formula: Option<String>,
    /// Compiled expression, `None` for pure constants
    pub expr: Option<Rc<CompiledExpr>>,
    /// Cached evaluated value, `None` while dirty
    pub value: Option<Value>,
}

/// A rectangular block treated as a single dependency
#[derive(Debug, Clone)]
pub struct RangeEntity {
    pub key: RangeKey,
    /// Member cell entities, row-major
    pub members: Vec<EntityId>,
    pub nrows: u32,
    pub ncols: u16,
    /// Cached aggregate value
    pub value: Option<Value>,
}

/// Shape row-major member values into a range's aggregate: a flat vector
/// for a single row or column, a matrix otherwise
pub fn shape_range_values(flat: Vec<Value>, nrows: u32, ncols: u16) -> Value {
    if nrows == 1 || ncols == 1 {
        return Value::Array(vec![flat]);
    }
    let rows = flat
        .chunks((ncols as usize).max(1))
        .map(|chunk| chunk.to_vec())
        .collect();
    Value::Array(rows)
}

/// A graph node: cell or range
#[derive(Debug, Clone)]
pub enum Entity {
    Cell(Cell),
    Range(RangeEntity),
}

impl Entity {
    pub fn key(&self) -> EntityKey {
        match self {
            Entity::Cell(cell) => EntityKey::Cell(cell.key.clone()),
            Entity::Range(range) => EntityKey::Range(range.key.clone()),
        }
    }

    fn cached_value(&self) -> &Option<Value> {
        match self {
            Entity::Cell(cell) => &cell.value,
            Entity::Range(range) => &range.value,
        }
    }

    fn clear_value(&mut self) {
        match self {
            Entity::Cell(cell) => cell.value = None,
            Entity::Range(range) => range.value = None,
        }
    }
}

/// The dependency graph plus its address→entity map
#[derive(Debug, Default)]
pub struct DependencyGraph {
    entities: Vec<Entity>,
    ids: AHashMap<EntityKey, EntityId>,
    /// Forward edges: consumers of each entity's value
    dependents: Vec<Vec<EntityId>>,
    /// Reverse edges: the entities each formula consumes
    precedents: Vec<Vec<EntityId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Insert a new entity; its address must not already be mapped
    pub fn insert(&mut self, entity: Entity) -> EntityId {
        let id = EntityId(self.entities.len() as u32);
        let previous = self.ids.insert(entity.key(), id);
        debug_assert!(previous.is_none(), "duplicate entity for {}", entity.key());
        self.entities.push(entity);
        self.dependents.push(Vec::new());
        self.precedents.push(Vec::new());
        id
    }

    pub fn cell_id(&self, key: &CellKey) -> Option<EntityId> {
        self.ids.get(&EntityKey::Cell(key.clone())).copied()
    }

    pub fn range_id(&self, key: &RangeKey) -> Option<EntityId> {
        self.ids.get(&EntityKey::Range(key.clone())).copied()
    }

    pub fn entity(&self, id: EntityId) -> &Entity {
        &self.entities[id.index()]
    }

    pub fn entity_mut(&mut self, id: EntityId) -> &mut Entity {
        &mut self.entities[id.index()]
    }

    /// The cell behind `id`, if it is one
    pub fn cell(&self, id: EntityId) -> Option<&Cell> {
        match self.entity(id) {
            Entity::Cell(cell) => Some(cell),
            Entity::Range(_) => None,
        }
    }

    pub fn cell_mut(&mut self, id: EntityId) -> Option<&mut Cell> {
        match self.entity_mut(id) {
            Entity::Cell(cell) => Some(cell),
            Entity::Range(_) => None,
        }
    }

    /// Add edge dependency→dependent, ignoring duplicates
    pub fn add_edge(&mut self, dependency: EntityId, dependent: EntityId) {
        let forward = &mut self.dependents[dependency.index()];
        if !forward.contains(&dependent) {
            forward.push(dependent);
            self.precedents[dependent.index()].push(dependency);
        }
    }

    /// Entities consuming this entity's value
    pub fn dependents(&self, id: EntityId) -> &[EntityId] {
        &self.dependents[id.index()]
    }

    /// Entities this entity's formula consumes
    pub fn precedents(&self, id: EntityId) -> &[EntityId] {
        &self.precedents[id.index()]
    }

    /// Iterate all entities in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.entities
            .iter()
            .enumerate()
            .map(|(i, e)| (EntityId(i as u32), e))
    }

    /// Find a cycle, returning the address of one participating entity
    ///
    /// Iterative DFS over dependent edges with a white/grey/black coloring;
    /// a grey revisit is a cycle.
    pub fn find_cycle(&self) -> Option<EntityKey> {
        const WHITE: u8 = 0;
        const GREY: u8 = 1;
        const BLACK: u8 = 2;
        let mut color = vec![WHITE; self.entities.len()];

        for start in 0..self.entities.len() {
            if color[start] != WHITE {
                continue;
            }
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
            color[start] = GREY;

            while let Some(&mut (node, ref mut next)) = stack.last_mut() {
                let edges = &self.dependents[node];
                if *next < edges.len() {
                    let child = edges[*next].index();
                    *next += 1;
                    match color[child] {
                        GREY => return Some(self.entities[child].key()),
                        WHITE => {
                            color[child] = GREY;
                            stack.push((child, 0));
                        }
                        _ => {}
                    }
                } else {
                    color[node] = BLACK;
                    stack.pop();
                }
            }
        }
        None
    }

    /// Clear the cached value of `start` and every transitive dependent
    ///
    /// Iterative work-list with a visited set. The start entity is always
    /// walked, even while dirty; any other entity that is already clear is
    /// skipped along with its successors (its dependents cannot hold a
    /// fresh cache derived from it).
    pub fn invalidate_from(&mut self, start: EntityId) {
        let mut pending = vec![start];
        let mut visited: AHashSet<EntityId> = AHashSet::new();

        while let Some(id) = pending.pop() {
            if !visited.insert(id) {
                continue;
            }
            if id != start && self.entities[id.index()].cached_value().is_none() {
                continue;
            }
            self.entities[id.index()].clear_value();
            pending.extend_from_slice(&self.dependents[id.index()]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellgraph_core::CellAddress;
    use pretty_assertions::assert_eq;

    fn constant(addr: &str, n: f64) -> Entity {
        Entity::Cell(Cell {
            key: CellKey::new("S", CellAddress::parse(addr).unwrap()),
            formula: None,
            expr: None,
            value: Some(Value::Number(n)),
        })
    }

    #[test]
    fn edges_are_bidirectional_and_deduped() {
        let mut graph = DependencyGraph::new();
        let a = graph.insert(constant("A1", 1.0));
        let b = graph.insert(constant("B1", 2.0));

        graph.add_edge(a, b);
        graph.add_edge(a, b);

        assert_eq!(graph.dependents(a), &[b]);
        assert_eq!(graph.precedents(b), &[a]);
        assert_eq!(graph.dependents(b), &[] as &[EntityId]);
    }

    #[test]
    fn lookup_by_address() {
        let mut graph = DependencyGraph::new();
        let id = graph.insert(constant("A1", 1.0));
        let key = CellKey::new("S", CellAddress::parse("A1").unwrap());
        assert_eq!(graph.cell_id(&key), Some(id));
        assert!(graph
            .cell_id(&CellKey::new("S", CellAddress::parse("A2").unwrap()))
            .is_none());
    }

    #[test]
    fn cycle_detection() {
        let mut graph = DependencyGraph::new();
        let a = graph.insert(constant("A1", 1.0));
        let b = graph.insert(constant("B1", 2.0));
        let c = graph.insert(constant("C1", 3.0));

        graph.add_edge(a, b);
        graph.add_edge(b, c);
        assert!(graph.find_cycle().is_none());

        graph.add_edge(c, a);
        assert!(graph.find_cycle().is_some());
    }

    #[test]
    fn invalidation_clears_transitive_dependents() {
        let mut graph = DependencyGraph::new();
        let a = graph.insert(constant("A1", 1.0));
        let b = graph.insert(constant("B1", 2.0));
        let c = graph.insert(constant("C1", 3.0));
        let d = graph.insert(constant("D1", 4.0));

        graph.add_edge(a, b);
        graph.add_edge(b, c);

        graph.invalidate_from(a);
        assert!(graph.cell(a).unwrap().value.is_none());
        assert!(graph.cell(b).unwrap().value.is_none());
        assert!(graph.cell(c).unwrap().value.is_none());
        // unrelated cell keeps its cache
        assert_eq!(graph.cell(d).unwrap().value, Some(Value::Number(4.0)));
    }

    #[test]
    fn invalidation_from_a_dirty_start_still_reaches_dependents() {
        let mut graph = DependencyGraph::new();
        // a formula cell that was never evaluated: no cache
        let a = graph.insert(Entity::Cell(Cell {
            key: CellKey::new("S", CellAddress::parse("A1").unwrap()),
            formula: Some("=B9*2".into()),
            expr: None,
            value: None,
        }));
        let b = graph.insert(constant("B1", 2.0));
        graph.add_edge(a, b);

        graph.invalidate_from(a);
        assert!(graph.cell(b).unwrap().value.is_none());
    }

    #[test]
    fn invalidation_is_noop_when_already_clear() {
        let mut graph = DependencyGraph::new();
        let a = graph.insert(constant("A1", 1.0));
        let b = graph.insert(constant("B1", 2.0));
        graph.add_edge(a, b);

        graph.invalidate_from(a);
        graph.invalidate_from(a);
        assert!(graph.cell(b).unwrap().value.is_none());
    }
}
