//! Dependency graph construction
//!
//! Starting from a seed cell, the builder compiles that cell's formula,
//! discovers the references it consumes, and keeps compiling newly
//! discovered formula cells until the work-list drains. Every discovered
//! range is materialized as its own entity with member-cell edges. The
//! finished graph is rejected if it contains a cycle; any parse or compile
//! failure aborts the whole build.

use crate::ast::parse_formula;
use crate::compile::{compile_expr, parse_reference, CompileContext, CompiledRef};
use crate::error::{EngineError, EngineResult};
use crate::graph::{shape_range_values, Cell, DependencyGraph, Entity, EntityId, RangeEntity};
use crate::source::DataSource;
use ahash::AHashSet;
use cellgraph_core::{CellKey, Error as CoreError, RangeKey, Value};
use std::rc::Rc;

/// Builds a [`DependencyGraph`] by walking formulas outward from a seed
pub struct GraphBuilder<'a> {
    source: &'a dyn DataSource,
    graph: DependencyGraph,
    /// Formula cells discovered but not yet compiled
    pending: Vec<(EntityId, CellKey, String)>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(source: &'a dyn DataSource) -> Self {
        Self {
            source,
            graph: DependencyGraph::new(),
            pending: Vec::new(),
        }
    }

    /// Build the graph reachable from `seed` (a cell or rectangular range)
    ///
    /// `sheet` overrides the source's active sheet for resolving an
    /// unqualified seed; a seed qualified with a different sheet is a
    /// conflict. Seed cells holding neither a formula nor a numeric
    /// constant are skipped; if none qualify the graph comes back empty.
    pub fn build(mut self, seed: &str, sheet: Option<&str>) -> EngineResult<DependencyGraph> {
        let default_sheet = sheet.unwrap_or_else(|| self.source.active_sheet()).to_string();
        let compiled = parse_reference(seed, &default_sheet, None)?;
        let seed_sheet = match &compiled {
            CompiledRef::Cell(key) => &key.sheet,
            CompiledRef::Range(key) => &key.sheet,
        };
        if let Some(requested) = sheet {
            if seed_sheet != requested {
                return Err(EngineError::Address(CoreError::SheetMismatch {
                    expected: requested.to_string(),
                    found: seed_sheet.clone(),
                }));
            }
        }

        let seed_keys = match compiled {
            CompiledRef::Cell(key) => vec![key],
            CompiledRef::Range(key) => key.member_cells(),
        };
        for key in seed_keys {
            let worth_compiling = match self.source.cell(&key) {
                Some(cell) => cell.formula.is_some() || matches!(cell.value, Value::Number(_)),
                None => false,
            };
            if worth_compiling {
                self.add_cell(&key);
            }
        }

        while let Some((id, key, formula)) = self.pending.pop() {
            self.compile_cell(id, &key, &formula)?;
        }

        if let Some(key) = self.graph.find_cycle() {
            return Err(EngineError::CircularReference(key.to_string()));
        }
        Ok(self.graph)
    }

    /// Entity for `key`, creating it (and queueing its formula) on first sight
    fn add_cell(&mut self, key: &CellKey) -> EntityId {
        if let Some(id) = self.graph.cell_id(key) {
            return id;
        }

        let (formula, value) = match self.source.cell(key) {
            Some(cell) => match cell.formula {
                // value stays dirty until the engine evaluates the formula
                Some(text) => (Some(text), None),
                None => (None, Some(cell.value)),
            },
            // cells absent from the source read as blank
            None => (None, Some(Value::Empty)),
        };

        let id = self.graph.insert(Entity::Cell(Cell {
            key: key.clone(),
            formula: formula.clone(),
            expr: None,
            value,
        }));
        if let Some(text) = formula {
            self.pending.push((id, key.clone(), text));
        }
        id
    }

    /// Entity for `key`, materializing member cells and edges on first sight
    fn add_range(&mut self, key: &RangeKey) -> EntityId {
        if let Some(id) = self.graph.range_id(key) {
            return id;
        }

        let member_keys = key.member_cells();
        let members: Vec<EntityId> = member_keys
            .iter()
            .map(|member| self.add_cell(member))
            .collect();
        // aggregate eagerly only when every member is a plain stored value;
        // a formula member has no value until the engine evaluates it, so
        // such a range starts dirty
        let has_formula_member = member_keys.iter().any(|member| {
            self.source
                .cell(member)
                .is_some_and(|cell| cell.formula.is_some())
        });
        let (nrows, ncols) = (key.range.row_count(), key.range.col_count());
        let value = if has_formula_member {
            None
        } else {
            let flat: Vec<Value> = member_keys
                .iter()
                .map(|member| {
                    self.source
                        .cell(member)
                        .map_or(Value::Empty, |cell| cell.value)
                })
                .collect();
            Some(shape_range_values(flat, nrows, ncols))
        };
        let id = self.graph.insert(Entity::Range(RangeEntity {
            key: key.clone(),
            members: members.clone(),
            nrows,
            ncols,
            value,
        }));
        for member in members {
            self.graph.add_edge(member, id);
        }
        id
    }

    fn compile_cell(&mut self, id: EntityId, key: &CellKey, formula: &str) -> EngineResult<()> {
        let expr = parse_formula(formula)?;
        let compiled = compile_expr(
            &expr,
            &CompileContext {
                current: key,
                source: self.source,
            },
        )?;

        let mut refs = Vec::new();
        compiled.collect_refs(&mut refs);
        if let Some(cell) = self.graph.cell_mut(id) {
            cell.expr = Some(Rc::new(compiled));
        }

        let mut seen: AHashSet<CompiledRef> = AHashSet::new();
        for reference in refs {
            if !seen.insert(reference.clone()) {
                continue;
            }
            let dependency = match reference {
                CompiledRef::Cell(cell_key) => self.add_cell(&cell_key),
                CompiledRef::Range(range_key) => self.add_range(&range_key),
            };
            self.graph.add_edge(dependency, id);
        }
        Ok(())
    }
}
