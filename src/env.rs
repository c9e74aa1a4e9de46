/// Lexical environment for one compilation.
///
/// A stack of scopes (symbols, emitted-code indentation, loop flag, optional
/// function context) plus the compilation-wide state the root owns: the type
/// variable pool, the three diagnostic lists, the source-token registry for
/// runtime error back-mapping, the non-ASCII rename table, the inferred
/// field cache, and the unique-id allocator. Nothing here is process-global,
/// so two compilations can never share or race on counters.
use std::collections::{HashMap, HashSet};

use crate::messages::{EventKind, SourceEvent};
use crate::symbols::{self, FieldAccessor, Package, PackageEntry, Symbol};
use crate::tree::ParseTree;
use crate::types::{Type, TypeVarPool};

/// Statement-abort signal. Recording an error cancels the current top-level
/// statement only; the statement-sequencing loop catches this and moves on.
/// It is deliberately not an error type — internal faults are diagnostics,
/// never control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancel;

#[derive(Debug, Clone)]
pub struct FuncContext {
    pub name: String,
    pub ret: Type,
    pub has_return: bool,
    pub is_sync: bool,
}

#[derive(Debug)]
struct Scope {
    symbols: HashMap<String, Symbol>,
    indent: String,
    is_loop: bool,
    func: Option<FuncContext>,
}

/// Entry in the source-token map: a de-duplicated source position that
/// emitted runtime checks reference by index (`codemap[i]`).
#[derive(Debug, Clone)]
pub struct SourceToken {
    pub pos: usize,
    pub row: usize,
    pub col: usize,
    pub len: usize,
    pub text: String,
}

const INDENT: &str = "  ";

pub struct Env {
    scopes: Vec<Scope>,
    pub pool: TypeVarPool,
    pub errors: Vec<SourceEvent>,
    pub warnings: Vec<SourceEvent>,
    pub notices: Vec<SourceEvent>,
    pub codemap: Vec<SourceToken>,
    renames: HashMap<String, String>,
    field_cache: HashMap<String, FieldAccessor>,
    imports: HashMap<String, String>,
    unsupported: HashSet<String>,
    auto_imported: HashSet<String>,
    next_id: usize,
    last_yield_row: Option<usize>,
}

impl Env {
    pub fn new() -> Self {
        let mut env = Env {
            scopes: vec![Scope {
                symbols: HashMap::new(),
                indent: INDENT.to_string(),
                is_loop: false,
                func: None,
            }],
            pool: TypeVarPool::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            notices: Vec::new(),
            codemap: Vec::new(),
            renames: HashMap::new(),
            field_cache: HashMap::new(),
            imports: HashMap::new(),
            unsupported: HashSet::new(),
            auto_imported: HashSet::new(),
            next_id: 0,
            last_yield_row: None,
        };
        env.install_package(symbols::default_package());
        env
    }

    // -- scopes -------------------------------------------------------------

    pub fn enter_block(&mut self, is_loop: bool) {
        let indent = format!("{}{}", self.indent(), INDENT);
        self.scopes.push(Scope {
            symbols: HashMap::new(),
            indent,
            is_loop,
            func: None,
        });
    }

    pub fn enter_func(&mut self, ctx: FuncContext) {
        let indent = format!("{}{}", self.indent(), INDENT);
        self.scopes.push(Scope {
            symbols: HashMap::new(),
            indent,
            is_loop: false,
            func: Some(ctx),
        });
    }

    /// Pop the innermost scope; returns its function context, if any, so a
    /// function declaration can read back `has_return`/`is_sync`.
    pub fn exit(&mut self) -> Option<FuncContext> {
        self.scopes.pop().and_then(|s| s.func)
    }

    pub fn indent(&self) -> String {
        self.scopes.last().map(|s| s.indent.clone()).unwrap_or_default()
    }

    pub fn in_func(&self) -> bool {
        self.scopes.iter().any(|s| s.func.is_some())
    }

    pub fn func_mut(&mut self) -> Option<&mut FuncContext> {
        self.scopes.iter_mut().rev().find_map(|s| s.func.as_mut())
    }

    /// Inside the nearest function (or at top level, anywhere) is there an
    /// enclosing loop? Loops outside the current function do not count.
    pub fn in_loop(&self) -> bool {
        for s in self.scopes.iter().rev() {
            if s.is_loop {
                return true;
            }
            if s.func.is_some() {
                break;
            }
        }
        false
    }

    // -- symbols ------------------------------------------------------------

    /// Declare a variable in the current scope. Top-level declarations (not
    /// inside a function or loop) index the shared global table; everything
    /// else gets a local binding. Non-ASCII identifiers are transliterated
    /// to a synthetic local name, recorded in the rename table keyed by the
    /// identifier being renamed, with the original kept as a comment.
    pub fn decl_var(&mut self, name: &str, ty: Type) -> Symbol {
        let code = if !self.in_func() && !self.in_loop() {
            format!("vars['{}']", name)
        } else {
            self.local(name)
        };
        let sym = Symbol::new(code, ty).mutable();
        // globals live in the root scope so they survive the block that
        // first assigned them
        let scope = if sym.is_global() {
            self.scopes.first_mut()
        } else {
            self.scopes.last_mut()
        };
        scope
            .expect("scope stack is never empty")
            .symbols
            .insert(name.to_string(), sym.clone());
        sym
    }

    fn local(&mut self, name: &str) -> String {
        if name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return name.to_string();
        }
        if let Some(code) = self.renames.get(name) {
            return code.clone();
        }
        let code = format!("_v{}/*{}*/", self.new_id(), name);
        self.renames.insert(name.to_string(), code.clone());
        code
    }

    pub fn define(&mut self, name: &str, sym: Symbol) {
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .symbols
            .insert(name.to_string(), sym);
    }

    /// Full chain lookup. Absence is `None`, never a diagnostic — the caller
    /// decides which error fits.
    pub fn get_symbol(&self, name: &str) -> Option<Symbol> {
        for s in self.scopes.iter().rev() {
            if let Some(sym) = s.symbols.get(name) {
                return Some(sym.clone());
            }
        }
        None
    }

    /// Lookup that stops at the enclosing function boundary: used for
    /// assignment targets, where Python semantics make an in-function
    /// assignment shadow rather than overwrite an outer binding.
    pub fn get_symbol_scoped(&self, name: &str) -> Option<Symbol> {
        for s in self.scopes.iter().rev() {
            if let Some(sym) = s.symbols.get(name) {
                return Some(sym.clone());
            }
            if s.func.is_some() {
                break;
            }
        }
        None
    }

    /// Post-body refinement: mark a declared function symbol as synchronous.
    pub fn set_sync(&mut self, name: &str) {
        for s in self.scopes.iter_mut().rev() {
            if let Some(sym) = s.symbols.get_mut(name) {
                sym.is_sync = true;
                return;
            }
        }
    }

    /// Refinement after assignment: the variable now holds a physics body.
    pub fn mark_matter(&mut self, name: &str) {
        for s in self.scopes.iter_mut().rev() {
            if let Some(sym) = s.symbols.get_mut(name) {
                sym.is_matter = true;
                return;
            }
        }
    }

    // -- packages -----------------------------------------------------------

    pub fn install_package(&mut self, pkg: Package) {
        let scope = self.scopes.last_mut().expect("scope stack is never empty");
        for (name, entry) in pkg {
            match entry {
                PackageEntry::Sym(sym) => {
                    scope.symbols.insert(name.to_string(), sym);
                }
                PackageEntry::Unsupported(_) => {
                    self.unsupported.insert(name.to_string());
                }
            }
        }
    }

    /// Auto-import a package by name; returns false if already imported.
    pub fn auto_import(&mut self, pkg_name: &str) -> bool {
        if self.auto_imported.contains(pkg_name) {
            return false;
        }
        if let Some(pkg) = symbols::package(pkg_name) {
            self.auto_imported.insert(pkg_name.to_string());
            self.install_package(pkg);
            return true;
        }
        false
    }

    pub fn set_import(&mut self, alias: &str, package: &str) {
        self.imports.insert(alias.to_string(), package.to_string());
    }

    pub fn import_package(&self, alias: &str) -> Option<String> {
        self.imports.get(alias).cloned()
    }

    pub fn is_unsupported(&self, name: &str) -> bool {
        self.unsupported.contains(name)
    }

    // -- field accessors ----------------------------------------------------

    /// Static table first, then the per-compilation cache; an unseen field
    /// synthesizes a generic accessor whose type is inferred from usage.
    pub fn field_accessor(&mut self, name: &str) -> FieldAccessor {
        if let Some(acc) = symbols::static_field(name) {
            return acc;
        }
        if let Some(acc) = self.field_cache.get(name) {
            return acc.clone();
        }
        let acc = FieldAccessor::generic(name, self.pool.new_var());
        self.field_cache.insert(name.to_string(), acc.clone());
        acc
    }

    // -- diagnostics --------------------------------------------------------

    /// Record an error and abort the current statement.
    pub fn perror(&mut self, t: &ParseTree, key: &str, params: Vec<String>) -> Cancel {
        self.errors
            .push(SourceEvent::new(EventKind::Error, key, t, params));
        Cancel
    }

    pub fn pwarn(&mut self, t: &ParseTree, key: &str, params: Vec<String>) {
        self.warnings
            .push(SourceEvent::new(EventKind::Warning, key, t, params));
    }

    pub fn pnotice(&mut self, t: &ParseTree, key: &str, params: Vec<String>) {
        self.notices
            .push(SourceEvent::new(EventKind::Notice, key, t, params));
    }

    pub fn pinfo(&mut self, t: &ParseTree, key: &str, params: Vec<String>) {
        self.notices
            .push(SourceEvent::new(EventKind::Info, key, t, params));
    }

    // -- runtime instrumentation --------------------------------------------

    /// Register a source-position-bearing node; returns its `codemap` index.
    /// Nodes at the same position share one entry.
    pub fn token_id(&mut self, t: &ParseTree) -> usize {
        let (pos, row, col) = t.begin();
        let len = t.length();
        if let Some(i) = self
            .codemap
            .iter()
            .position(|st| st.pos == pos && st.len == len)
        {
            return i;
        }
        self.codemap.push(SourceToken {
            pos,
            row,
            col,
            len,
            text: t.tokenize().to_string(),
        });
        self.codemap.len() - 1
    }

    /// Statement-boundary yield: top level only, at most one per source row.
    /// The encoded hint lets the stepper map a resumption back to its row.
    /// Loop bodies get no per-statement yields, the bounded sync yield
    /// covers them instead.
    pub fn emit_yield(&mut self, row: usize, out: &mut String) {
        if self.in_func() || self.in_loop() {
            return;
        }
        if self.last_yield_row == Some(row) {
            return;
        }
        self.last_yield_row = Some(row);
        out.push_str(&format!("{}yield {};\n", self.indent(), row * 1000 + 200));
    }

    pub fn new_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl Default for Env {
    fn default() -> Self {
        Env::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_vs_local_declaration() {
        let mut env = Env::new();
        let g = env.decl_var("x", Type::Number);
        assert_eq!(g.code, "vars['x']");
        assert!(g.is_global());

        env.enter_func(FuncContext {
            name: "f".to_string(),
            ret: Type::Void,
            has_return: false,
            is_sync: false,
        });
        let l = env.decl_var("x", Type::Number);
        assert_eq!(l.code, "x");
        assert!(!l.is_global());
        env.exit();
    }

    #[test]
    fn test_loop_variable_is_local() {
        let mut env = Env::new();
        env.enter_block(true);
        let sym = env.decl_var("i", Type::Number);
        assert!(!sym.is_global());
        env.exit();
    }

    #[test]
    fn test_scoped_lookup_stops_at_function_boundary() {
        let mut env = Env::new();
        env.decl_var("x", Type::Number);
        env.enter_func(FuncContext {
            name: "f".to_string(),
            ret: Type::Void,
            has_return: false,
            is_sync: false,
        });
        assert!(env.get_symbol("x").is_some());
        assert!(env.get_symbol_scoped("x").is_none());
        env.exit();
        assert!(env.get_symbol_scoped("x").is_some());
    }

    #[test]
    fn test_non_ascii_rename_keyed_by_identifier() {
        let mut env = Env::new();
        env.enter_func(FuncContext {
            name: "f".to_string(),
            ret: Type::Void,
            has_return: false,
            is_sync: false,
        });
        let a = env.decl_var("あ", Type::Number);
        let b = env.decl_var("重さ", Type::Number);
        // distinct identifiers must not collide on one rename slot
        assert_ne!(a.code, b.code);
        assert!(a.code.contains("あ"));
        assert!(b.code.contains("重さ"));
        // re-declaring the same identifier reuses its slot
        let a2 = env.decl_var("あ", Type::Number);
        assert_eq!(a.code, a2.code);
        env.exit();
    }

    #[test]
    fn test_token_map_deduplicates() {
        let mut env = Env::new();
        let t = ParseTree::new(crate::tree::Tag::Name, 5, 1, 6, 3).with_token("abc");
        let i = env.token_id(&t);
        let j = env.token_id(&t);
        assert_eq!(i, j);
        assert_eq!(env.codemap.len(), 1);
    }

    #[test]
    fn test_yield_once_per_row() {
        let mut env = Env::new();
        let mut out = String::new();
        env.emit_yield(3, &mut out);
        env.emit_yield(3, &mut out);
        env.emit_yield(4, &mut out);
        assert_eq!(out.matches("yield 3200;").count(), 1);
        assert_eq!(out.matches("yield 4200;").count(), 1);
    }

    #[test]
    fn test_no_yield_inside_functions() {
        let mut env = Env::new();
        env.enter_func(FuncContext {
            name: "f".to_string(),
            ret: Type::Void,
            has_return: false,
            is_sync: false,
        });
        let mut out = String::new();
        env.emit_yield(3, &mut out);
        assert!(out.is_empty());
        env.exit();
    }

    #[test]
    fn test_no_yield_inside_loops() {
        let mut env = Env::new();
        env.enter_block(true);
        let mut out = String::new();
        env.emit_yield(3, &mut out);
        assert!(out.is_empty());
        env.exit();
    }
}
