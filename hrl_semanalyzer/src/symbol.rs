//! Symbol table for the HRL language

use hrl_common::Span;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Index into the symbol table
pub type SymbolId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolKind {
    /// Top-level `let` declaration, stored in the global slot space
    Global,
    /// Local variable
    Local,
    /// Subroutine parameter
    Parameter,
    /// `function` or `sub` definition
    Subroutine { has_param: bool, has_return: bool },
}

/// A named entity declared somewhere in the compilation unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    pub kind: SymbolKind,
    pub declared_at: Span,
}

impl Symbol {
    pub fn is_global(&self) -> bool {
        self.kind == SymbolKind::Global
    }

    pub fn is_subroutine(&self) -> bool {
        matches!(self.kind, SymbolKind::Subroutine { .. })
    }
}

/// Flat symbol arena. Scoping lives in the analyzer; the table only
/// hands out ids and answers lookups by id or subroutine name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    subroutines: HashMap<String, SymbolId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: impl Into<String>, kind: SymbolKind, declared_at: Span) -> SymbolId {
        let id = self.symbols.len() as SymbolId;
        let name = name.into();
        if matches!(kind, SymbolKind::Subroutine { .. }) {
            self.subroutines.insert(name.clone(), id);
        }
        self.symbols.push(Symbol { id, name, kind, declared_at });
        id
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id as usize]
    }

    pub fn lookup_subroutine(&self, name: &str) -> Option<&Symbol> {
        self.subroutines.get(name).map(|&id| self.get(id))
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
