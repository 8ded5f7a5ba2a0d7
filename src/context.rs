use crate::error::{CodegenError, CodegenResult};
use crate::signatures::{FunctionTable, LiteralTable, StructTable};
use crate::symbol_table::{ScopeStack, Symbol};
use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    If,
    While,
    For,
}

/// A loop exit whose stack cleanup depends on the final size of scopes that
/// were still open when the jump was generated.
#[derive(Debug, Clone)]
enum PendingExit {
    Break {
        loop_id: usize,
        marker: String,
        crossed: Vec<usize>,
    },
    Continue {
        loop_id: usize,
        crossed: Vec<usize>,
    },
}

impl PendingExit {
    fn loop_id(&self) -> usize {
        match self {
            PendingExit::Break { loop_id, .. } | PendingExit::Continue { loop_id, .. } => *loop_id,
        }
    }
}

/// State of one compilation: declaration tables filled by the pre-passes,
/// plus the per-function scope stack and label counters.
#[derive(Debug, Default)]
pub struct Context {
    pub functions: FunctionTable,
    pub structs: StructTable,
    pub literals: LiteralTable,
    pub scopes: ScopeStack,
    if_labels: usize,
    while_labels: usize,
    for_labels: usize,
    pending: Vec<PendingExit>,
    markers: usize,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse_type(&self, descriptor: &str) -> CodegenResult<Type> {
        Type::parse(descriptor, &self.structs)
    }

    pub fn lookup(&self, name: &str) -> CodegenResult<&Symbol> {
        self.scopes.lookup(name)
    }

    pub fn next_label(&mut self, kind: LabelKind) -> usize {
        let counter = match kind {
            LabelKind::If => &mut self.if_labels,
            LabelKind::While => &mut self.while_labels,
            LabelKind::For => &mut self.for_labels,
        };
        let n = *counter;
        *counter += 1;
        n
    }

    /// Forgets everything tied to the previous function.
    pub fn begin_function(&mut self) {
        self.scopes.clear();
        self.pending.clear();
    }

    /// Records a `break` out of the innermost loop and returns the marker
    /// line to emit in place of its stack cleanup.
    pub fn break_marker(&mut self) -> CodegenResult<String> {
        let (loop_id, crossed) = self.scopes.scopes_to_loop()?;
        let marker = format!(";@cleanup{}", self.markers);
        self.markers += 1;
        self.pending.push(PendingExit::Break {
            loop_id,
            marker: marker.clone(),
            crossed,
        });
        Ok(marker)
    }

    pub fn record_continue(&mut self) -> CodegenResult<()> {
        let (loop_id, mut crossed) = self.scopes.scopes_to_loop()?;
        crossed.pop();
        self.pending.push(PendingExit::Continue { loop_id, crossed });
        Ok(())
    }

    /// Rewrites the break markers of the loop `loop_id`, which has just been
    /// closed, into `add esp, N` with the final size of every crossed scope.
    pub fn resolve_loop_exits(&mut self, loop_id: usize, body: String) -> CodegenResult<String> {
        let (exits, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|exit| exit.loop_id() == loop_id);
        self.pending = rest;

        let mut body = body;
        for exit in exits {
            match exit {
                PendingExit::Break {
                    marker, crossed, ..
                } => {
                    let size = self.crossed_size(&crossed)?;
                    let cleanup = if size > 0 {
                        format!("    add esp, {}\n", size)
                    } else {
                        String::new()
                    };
                    body = body.replacen(&format!("    {}\n", marker), &cleanup, 1);
                }
                PendingExit::Continue { crossed, .. } => {
                    if self.crossed_size(&crossed)? > 0 {
                        return Err(CodegenError::NotSupported(
                            "continue out of a block that declares locals".to_string(),
                        ));
                    }
                }
            }
        }
        Ok(body)
    }

    fn crossed_size(&self, crossed: &[usize]) -> CodegenResult<u32> {
        crossed.iter().try_fold(0, |total, id| {
            self.scopes
                .closed_size(*id)
                .map(|size| total + size)
                .ok_or_else(|| CodegenError::InternalScope(format!("scope {} is still open", id)))
        })
    }
}
