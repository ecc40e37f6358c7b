//! The symbol table contract the IR builder consumes (spec §3.3).
//!
//! This crate does not perform name resolution or scope analysis — that is
//! the front end's job, out of scope here (spec §1). It only fixes the
//! shape of the table the builder is handed: one map per `(layer,
//! block-index)` scope, each entry describing a symbol's kind, dimensions,
//! initializer, and mangled usage name.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// `layer` 0 is the global scope; deeper layers are nested blocks, each
/// distinguished further by a per-layer `block index` so that two sibling
/// blocks at the same nesting depth don't collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeId {
    pub layer: u32,
    pub block_index: u32,
}

impl ScopeId {
    pub const GLOBAL: ScopeId = ScopeId { layer: 0, block_index: 0 };

    pub fn new(layer: u32, block_index: u32) -> Self {
        Self { layer, block_index }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolKind {
    ConstScalar,
    ConstArray,
    Scalar,
    Array,
    VoidFunction,
    IntFunction,
}

impl SymbolKind {
    pub fn is_const(self) -> bool {
        matches!(self, SymbolKind::ConstScalar | SymbolKind::ConstArray)
    }

    pub fn is_array(self) -> bool {
        matches!(self, SymbolKind::ConstArray | SymbolKind::Array)
    }

    pub fn is_function(self) -> bool {
        matches!(self, SymbolKind::VoidFunction | SymbolKind::IntFunction)
    }
}

/// A tree-shaped initializer as written in source (nested brace lists for
/// multi-dimensional arrays); for constants the front end has already
/// const-folded this into a flat sparse map before handing it to the
/// builder (spec §3.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Initializer {
    Scalar(i32),
    List(Vec<Initializer>),
}

impl Initializer {
    /// Flatten into a sparse `index -> value` map over `total_elements`,
    /// per the const-folded representation constants and globals share
    /// (spec §3.1 "sparse mapping index→value (indices absent are zero)").
    pub fn flatten(&self, total_elements: usize) -> HashMap<usize, i32> {
        let mut out = HashMap::new();
        let mut cursor = 0usize;
        flatten_into(self, total_elements, &mut cursor, &mut out);
        out
    }
}

fn flatten_into(
    init: &Initializer,
    total_elements: usize,
    cursor: &mut usize,
    out: &mut HashMap<usize, i32>,
) {
    match init {
        Initializer::Scalar(v) => {
            if *cursor < total_elements && *v != 0 {
                out.insert(*cursor, *v);
            }
            *cursor += 1;
        }
        Initializer::List(items) => {
            for item in items {
                if *cursor >= total_elements {
                    break;
                }
                flatten_into(item, total_elements, cursor, out);
            }
        }
    }
}

/// One entry of the symbol table, keyed externally by `(ScopeId, source
/// name)`. `usage_name` is the mangled, globally-unique name the builder
/// treats as an opaque string (spec §3.3): `V*<layer>_<index>$<name>` for
/// variables, `F*<layer>_<index>$<name>` for functions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub usage_name: String,
    /// Ordered array dimensions; empty for scalars.
    pub dimensions: Vec<usize>,
    /// Const-folded initializer for constants; present for globals with an
    /// initializer; absent for locals initialized imperatively and for
    /// function symbols.
    pub initializer: Option<Initializer>,
    /// Functions in which this symbol is referenced, by usage name.
    pub referenced_in: HashSet<String>,
}

impl Symbol {
    pub fn new(kind: SymbolKind, usage_name: impl Into<String>) -> Self {
        Self {
            kind,
            usage_name: usage_name.into(),
            dimensions: Vec::new(),
            initializer: None,
            referenced_in: HashSet::new(),
        }
    }

    pub fn with_dimensions(mut self, dimensions: Vec<usize>) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn with_initializer(mut self, init: Initializer) -> Self {
        self.initializer = Some(init);
        self
    }

    pub fn total_elements(&self) -> usize {
        self.dimensions.iter().product::<usize>().max(1)
    }

    /// Mangle a source name into the usage-name convention of §3.3.
    pub fn mangle_variable(layer: u32, block_index: u32, source_name: &str) -> String {
        format!("V*{}_{}${}", layer, block_index, source_name)
    }

    pub fn mangle_function(layer: u32, block_index: u32, source_name: &str) -> String {
        format!("F*{}_{}${}", layer, block_index, source_name)
    }
}

/// The full table: one symbol map per scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolTable {
    pub scopes: HashMap<ScopeId, HashMap<String, Symbol>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, scope: ScopeId, source_name: impl Into<String>, symbol: Symbol) {
        self.scopes.entry(scope).or_default().insert(source_name.into(), symbol);
    }

    pub fn lookup(&self, scope: ScopeId, source_name: &str) -> Option<&Symbol> {
        self.scopes.get(&scope)?.get(source_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_nested_initializer_skipping_zeros() {
        let init = Initializer::List(vec![
            Initializer::Scalar(1),
            Initializer::Scalar(0),
            Initializer::List(vec![Initializer::Scalar(3)]),
        ]);
        let flat = init.flatten(4);
        assert_eq!(flat.get(&0), Some(&1));
        assert_eq!(flat.get(&1), None);
        assert_eq!(flat.get(&2), Some(&3));
        assert_eq!(flat.get(&3), None);
    }

    #[test]
    fn mangles_variable_and_function_names() {
        assert_eq!(Symbol::mangle_variable(1, 2, "x"), "V*1_2$x");
        assert_eq!(Symbol::mangle_function(0, 0, "main"), "F*0_0$main");
    }
}
