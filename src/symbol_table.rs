use crate::error::{CodegenError, CodegenResult};
use crate::types::{align_up, Type, MAX_FRAME_SIZE};
use std::collections::HashMap;
use tracing::{debug, trace};

/// First parameter slot, `[ebp+8]`, just above the saved frame pointer and
/// the return address.
pub const PARAMETER_BIAS: i32 = -8;
pub const PARAMETER_SLOT: i32 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub symbol_type: Type,
    /// Frame-relative offset of the lowest address of the value.
    pub offset: i32,
}

impl Symbol {
    /// NASM memory operand for this symbol, e.g. `[ebp-4]` or `[ebp+8]`.
    pub fn address(&self) -> String {
        format_address(self.offset)
    }
}

pub fn format_address(offset: i32) -> String {
    if offset > 0 {
        format!("[ebp-{}]", offset)
    } else {
        format!("[ebp+{}]", -offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Function,
    Parameter,
    If,
    For,
    While,
    Struct,
}

impl ScopeKind {
    pub fn is_loop(self) -> bool {
        matches!(self, ScopeKind::For | ScopeKind::While)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopLabels {
    pub continue_label: String,
    pub break_label: String,
}

/// One lexical block: its symbols plus an offset cursor.
#[derive(Debug, Clone)]
pub struct Scope {
    pub id: usize,
    pub kind: ScopeKind,
    symbols: Vec<Symbol>,
    start: i32,
    cursor: i32,
    labels: Option<LoopLabels>,
}

impl Scope {
    pub fn new(id: usize, kind: ScopeKind, start: i32) -> Self {
        Scope {
            id,
            kind,
            symbols: Vec::new(),
            start,
            cursor: start,
            labels: None,
        }
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.name == name)
    }

    pub fn cursor(&self) -> i32 {
        self.cursor
    }

    pub fn labels(&self) -> Option<&LoopLabels> {
        self.labels.as_ref()
    }

    /// Places `name` and returns its symbol.
    ///
    /// Parameter scopes hand out one 4-byte slot per entry, growing towards
    /// the caller. Every other kind grows away from the frame base, aligning
    /// primitives to their width and aggregates to 4.
    pub fn allocate(&mut self, name: &str, symbol_type: Type) -> CodegenResult<&Symbol> {
        if self.get(name).is_some() {
            return Err(CodegenError::DuplicateSymbol(name.to_string()));
        }

        let offset = if self.kind == ScopeKind::Parameter {
            let offset = self.cursor;
            self.cursor -= PARAMETER_SLOT;
            offset
        } else {
            let size = symbol_type.aligned_size();
            let align = if symbol_type.is_primitive() { size } else { 4 };
            self.cursor = i32::try_from(size)
                .ok()
                .and_then(|size| align_up(self.cursor, align as i32).checked_add(size))
                .filter(|end| *end <= MAX_FRAME_SIZE as i32)
                .ok_or_else(|| {
                    CodegenError::NotSupported(format!(
                        "placing '{}' beyond the {} byte frame limit",
                        name, MAX_FRAME_SIZE
                    ))
                })?;
            self.cursor
        };

        debug!(
            symbol = name,
            ty = %symbol_type,
            offset,
            scope = ?self.kind,
            "placed symbol"
        );

        self.symbols.push(Symbol {
            name: name.to_string(),
            symbol_type,
            offset,
        });
        Ok(&self.symbols[self.symbols.len() - 1])
    }

    /// Bytes this block reserves below its parent. Always a multiple of 4
    /// once the scope has been completed.
    pub fn local_size(&self) -> u32 {
        if self.kind == ScopeKind::Parameter {
            return 0;
        }
        (self.cursor - self.start).max(0) as u32
    }

    /// Pads the footprint to a whole number of dwords.
    pub fn complete(&mut self) {
        if self.kind != ScopeKind::Parameter && self.cursor > self.start {
            self.cursor = self.start + align_up(self.cursor - self.start, 4);
        }
    }
}

/// The live scopes of the function being generated, innermost last.
#[derive(Debug, Default)]
pub struct ScopeStack {
    scopes: Vec<Scope>,
    next_id: usize,
    closed: HashMap<usize, u32>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.scopes.clear();
        self.closed.clear();
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn push(&mut self, kind: ScopeKind) -> usize {
        let start = match kind {
            ScopeKind::Function | ScopeKind::Struct => 0,
            ScopeKind::Parameter => PARAMETER_BIAS,
            _ => match self.scopes.last() {
                Some(parent) if parent.kind != ScopeKind::Parameter => parent.cursor,
                _ => 0,
            },
        };

        let id = self.next_id;
        self.next_id += 1;
        trace!(id, ?kind, start, "push scope");
        self.scopes.push(Scope::new(id, kind, start));
        id
    }

    pub fn push_loop(&mut self, kind: ScopeKind, labels: LoopLabels) -> usize {
        let id = self.push(kind);
        if let Some(scope) = self.scopes.last_mut() {
            scope.labels = Some(labels);
        }
        id
    }

    /// Closes the innermost scope, which must be of `kind`, and remembers its
    /// final size for later cleanup resolution.
    pub fn pop(&mut self, kind: ScopeKind) -> CodegenResult<Scope> {
        let mut scope = self.scopes.pop().ok_or_else(|| {
            CodegenError::InternalScope(format!("no {:?} scope to close", kind))
        })?;
        if scope.kind != kind {
            let found = scope.kind;
            self.scopes.push(scope);
            return Err(CodegenError::InternalScope(format!(
                "expected to close a {:?} scope, found {:?}",
                kind, found
            )));
        }

        scope.complete();
        trace!(id = scope.id, kind = ?scope.kind, size = scope.local_size(), "pop scope");
        self.closed.insert(scope.id, scope.local_size());
        Ok(scope)
    }

    pub fn declare(&mut self, name: &str, symbol_type: Type) -> CodegenResult<Symbol> {
        let scope = self
            .scopes
            .last_mut()
            .ok_or_else(|| CodegenError::InternalScope(format!("no scope to declare '{}'", name)))?;
        scope.allocate(name, symbol_type).cloned()
    }

    /// Innermost declaration of `name` wins.
    pub fn lookup(&self, name: &str) -> CodegenResult<&Symbol> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .ok_or_else(|| CodegenError::UndefinedSymbol(name.to_string()))
    }

    pub fn loop_labels(&self) -> CodegenResult<&LoopLabels> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.labels())
            .ok_or_else(|| CodegenError::InternalScope("no enclosing loop".to_string()))
    }

    /// Ids of every scope from the innermost one out to the nearest loop,
    /// and that loop's id. The loop itself is the last entry of the list.
    pub fn scopes_to_loop(&self) -> CodegenResult<(usize, Vec<usize>)> {
        let mut crossed = Vec::new();
        for scope in self.scopes.iter().rev() {
            crossed.push(scope.id);
            if scope.kind.is_loop() && scope.labels.is_some() {
                return Ok((scope.id, crossed));
            }
            if scope.kind == ScopeKind::Function {
                break;
            }
        }
        Err(CodegenError::InternalScope("no enclosing loop".to_string()))
    }

    /// Final size of a scope that has already been popped.
    pub fn closed_size(&self, id: usize) -> Option<u32> {
        self.closed.get(&id).copied()
    }
}
