use crate::ast::*;
use crate::collect;
use crate::context::{Context, LabelKind};
use crate::error::{CodegenError, CodegenResult, Diagnostics};
use crate::expr::{compile_expr, deref_type, generate_call, pop_copy};
use crate::signatures::data_bytes;
use crate::symbol_table::{LoopLabels, ScopeKind, Symbol};
use crate::types::Type;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Name of the hidden parameter through which aggregate results are returned.
pub const RETURN_SLOT: &str = "$return";

const RETURN_LABEL: &str = ".__return";

pub fn emit(out: &mut String, instruction: &str) {
    out.push_str("    ");
    out.push_str(instruction);
    out.push('\n');
}

pub fn emit_label(out: &mut String, label: &str) {
    out.push_str(label);
    out.push_str(":\n");
}

pub struct CodeGenerator {
    output: String,
    ctx: Context,
    return_type: Option<Type>,
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGenerator {
    pub fn new() -> Self {
        CodeGenerator {
            output: String::new(),
            ctx: Context::new(),
            return_type: None,
        }
    }

    /// Compiles a whole program to NASM text. Every failing declaration is
    /// reported; no assembly is returned if there is any.
    pub fn generate(&mut self, program: &Program) -> Result<String, Diagnostics> {
        self.output.clear();
        self.ctx = Context::new();
        let mut diagnostics = Diagnostics::new();

        collect::collect_strings(program, &mut self.ctx.literals);
        collect::collect_structs(program, &mut self.ctx.structs, &mut diagnostics);
        collect::collect_functions(
            program,
            &self.ctx.structs,
            &mut self.ctx.functions,
            &mut diagnostics,
        );

        let mut functions = String::new();
        let mut generated = HashSet::new();
        for item in &program.items {
            let Item::Function(decl) = item else {
                continue;
            };
            if !generated.insert(decl.name.as_str()) {
                warn!(name = %decl.name, "skipping duplicate definition");
                continue;
            }
            // Its signature failed to collect and is already reported.
            if self.ctx.functions.get(&decl.name).is_err() {
                continue;
            }
            match self.generate_function(decl) {
                Ok(text) => {
                    functions.push('\n');
                    functions.push_str(&text);
                }
                Err(error) => diagnostics.push(decl.name.as_str(), error),
            }
        }

        if !diagnostics.is_empty() {
            return Err(diagnostics);
        }

        self.write_header();
        self.output.push_str(&functions);
        Ok(self.output.clone())
    }

    fn write_header(&mut self) {
        self.output.push_str("BITS 32\n");
        self.output.push_str("global main\n");
        self.output.push_str("extern memcpy\n");
        for signature in self.ctx.functions.externs() {
            if signature.name != "memcpy" {
                self.output.push_str(&format!("extern {}\n", signature.name));
            }
        }

        self.output.push_str("section .data\n");
        for (raw, label) in self.ctx.literals.iter() {
            self.output
                .push_str(&format!("{}: db {}\n", label, data_bytes(raw)));
        }

        self.output.push_str("section .text\n");
    }

    fn generate_function(&mut self, decl: &FunctionDecl) -> CodegenResult<String> {
        self.ctx.begin_function();
        let signature = self.ctx.functions.get(&decl.name)?.clone();
        if signature.is_extern {
            return Err(CodegenError::NotSupported(format!(
                "defining '{}', which is declared extern",
                decl.name
            )));
        }
        self.return_type = signature.return_type.clone();

        self.ctx.scopes.push(ScopeKind::Parameter);
        if let Some(return_type) = signature.return_type.as_ref().filter(|t| !t.is_primitive()) {
            self.ctx
                .scopes
                .declare(RETURN_SLOT, Type::pointer_to(return_type.clone()))?;
        }
        for (name, param_type) in &signature.params {
            self.ctx.scopes.declare(name, param_type.clone())?;
        }

        self.ctx.scopes.push(ScopeKind::Function);
        let mut body = String::new();
        for stmt in &decl.body {
            self.generate_stmt(stmt, &mut body)?;
        }
        let frame = self.ctx.scopes.pop(ScopeKind::Function)?.local_size();
        self.ctx.scopes.pop(ScopeKind::Parameter)?;

        let mut out = String::new();
        emit_label(&mut out, &decl.name);
        emit(&mut out, "push ebp");
        emit(&mut out, "mov ebp, esp");
        if frame > 0 {
            emit(&mut out, &format!("sub esp, {}", frame));
        }
        out.push_str(&body);
        emit_label(&mut out, RETURN_LABEL);
        emit(&mut out, "mov esp, ebp");
        emit(&mut out, "pop ebp");
        emit(&mut out, "ret");

        info!(function = %decl.name, frame, "generated function");
        Ok(out)
    }

    fn generate_stmt(&mut self, stmt: &Stmt, out: &mut String) -> CodegenResult<()> {
        match stmt {
            Stmt::VarDecl {
                name,
                var_type,
                init,
            } => {
                let var_type = self.ctx.parse_type(var_type)?;
                match init {
                    Some(init) => {
                        compile_expr(init, &self.ctx, out)?;
                        let symbol = self.ctx.scopes.declare(name, var_type)?;
                        store_symbol(&symbol, out);
                    }
                    None => {
                        self.ctx.scopes.declare(name, var_type)?;
                    }
                }
            }
            Stmt::Assign { name, value } => {
                compile_expr(value, &self.ctx, out)?;
                store_symbol(self.ctx.lookup(name)?, out);
            }
            Stmt::DerefAssign { name, value } => {
                let symbol = self.ctx.lookup(name)?.clone();
                let target = symbol
                    .symbol_type
                    .pointee()
                    .ok_or_else(|| CodegenError::TypeInference(format!("*{}", name)))?
                    .clone();
                let load = if symbol.symbol_type.is_array() {
                    "lea"
                } else {
                    "mov"
                };

                compile_expr(value, &self.ctx, out)?;
                if target.is_primitive() {
                    emit(out, "pop eax");
                    emit(out, &format!("{} edx, {}", load, symbol.address()));
                    emit(
                        out,
                        &format!("mov {} [edx], {}", target.asm_size(), target.register()),
                    );
                } else {
                    emit(out, &format!("{} eax, {}", load, symbol.address()));
                    pop_copy(out, target.aligned_size(), 0);
                }
            }
            Stmt::DerefExprAssign { target, value } => {
                let access = deref_type(target, &self.ctx)?;

                compile_expr(target, &self.ctx, out)?;
                compile_expr(value, &self.ctx, out)?;
                if access.is_primitive() {
                    emit(out, "pop eax");
                    emit(out, "pop edx");
                    emit(
                        out,
                        &format!("mov {} [edx], {}", access.asm_size(), access.register()),
                    );
                } else {
                    let size = access.aligned_size();
                    emit(out, &format!("mov eax, [esp+{}]", size));
                    pop_copy(out, size, 4);
                }
            }
            Stmt::Step { op, name } => {
                let symbol = self.ctx.lookup(name)?;
                if !symbol.symbol_type.is_primitive() {
                    return Err(CodegenError::NotSupported(format!(
                        "incrementing the non-primitive value '{}'",
                        name
                    )));
                }
                let instruction = match op {
                    StepOp::Increment => "inc",
                    StepOp::Decrement => "dec",
                };
                emit(
                    out,
                    &format!(
                        "{} {} {}",
                        instruction,
                        symbol.symbol_type.asm_size(),
                        symbol.address()
                    ),
                );
            }
            Stmt::If {
                condition,
                then_block,
                else_ifs,
                else_block,
            } => self.generate_if(condition, then_block, else_ifs, else_block.as_ref(), out)?,
            Stmt::While { condition, body } => self.generate_while(condition, body, out)?,
            Stmt::For {
                init,
                condition,
                increment,
                body,
            } => self.generate_for(
                init.as_deref(),
                condition.as_ref(),
                increment.as_deref(),
                body,
                out,
            )?,
            Stmt::Break => {
                let marker = self.ctx.break_marker()?;
                let label = self.ctx.scopes.loop_labels()?.break_label.clone();
                emit(out, &marker);
                emit(out, &format!("jmp {}", label));
            }
            Stmt::Continue => {
                self.ctx.record_continue()?;
                let label = self.ctx.scopes.loop_labels()?.continue_label.clone();
                emit(out, &format!("jmp {}", label));
            }
            Stmt::Return(value) => {
                if let Some(value) = value {
                    self.generate_return_value(value, out)?;
                }
                emit(out, &format!("jmp {}", RETURN_LABEL));
            }
            Stmt::Call(expr) => match expr {
                Expr::Call { name, args } => generate_call(&self.ctx, name, args, false, out)?,
                other => {
                    return Err(CodegenError::NotSupported(format!(
                        "the expression statement `{}`",
                        other
                    )))
                }
            },
        }
        Ok(())
    }

    fn generate_return_value(&mut self, value: &Expr, out: &mut String) -> CodegenResult<()> {
        compile_expr(value, &self.ctx, out)?;

        match &self.return_type {
            Some(return_type) if !return_type.is_primitive() => {
                let slot = self.ctx.lookup(RETURN_SLOT)?.address();
                emit(out, &format!("mov eax, {}", slot));
                pop_copy(out, return_type.aligned_size(), 0);
                emit(out, &format!("mov eax, {}", slot));
            }
            _ => emit(out, "pop eax"),
        }
        Ok(())
    }

    /// Generates `body` inside a fresh scope of `kind`, reserving and
    /// releasing its locals around it.
    fn generate_scoped_block(
        &mut self,
        kind: ScopeKind,
        body: &[Stmt],
        out: &mut String,
    ) -> CodegenResult<()> {
        self.ctx.scopes.push(kind);
        let mut inner = String::new();
        for stmt in body {
            self.generate_stmt(stmt, &mut inner)?;
        }
        let size = self.ctx.scopes.pop(kind)?.local_size();

        reserve(out, size);
        out.push_str(&inner);
        release(out, size);
        Ok(())
    }

    fn generate_if(
        &mut self,
        condition: &Expr,
        then_block: &[Stmt],
        else_ifs: &[ElseIf],
        else_block: Option<&Block>,
        out: &mut String,
    ) -> CodegenResult<()> {
        let n = self.ctx.next_label(LabelKind::If);
        let end = format!(".__endif_{}", n);

        let mut arms = vec![(condition, then_block)];
        arms.extend(else_ifs.iter().map(|arm| (&arm.condition, arm.body.as_slice())));

        for (i, (condition, body)) in arms.iter().enumerate() {
            if i > 0 {
                emit_label(out, &format!(".__elseif_{}_{}", n, i - 1));
            }
            let next = if i + 1 < arms.len() {
                format!(".__elseif_{}_{}", n, i)
            } else if else_block.is_some() {
                format!(".__else_{}", n)
            } else {
                end.clone()
            };

            compile_expr(condition, &self.ctx, out)?;
            emit(out, "pop eax");
            emit(out, "test eax, 1");
            emit(out, &format!("jz {}", next));
            self.generate_scoped_block(ScopeKind::If, body, out)?;
            emit(out, &format!("jmp {}", end));
        }

        if let Some(block) = else_block {
            emit_label(out, &format!(".__else_{}", n));
            self.generate_scoped_block(ScopeKind::If, block, out)?;
        }

        emit_label(out, &end);
        Ok(())
    }

    fn generate_while(
        &mut self,
        condition: &Expr,
        body: &[Stmt],
        out: &mut String,
    ) -> CodegenResult<()> {
        let n = self.ctx.next_label(LabelKind::While);
        let head = format!(".__while_{}", n);
        let natural_end = format!(".__whileend_natural_{}", n);
        let end = format!(".__whileend_{}", n);

        let id = self.ctx.scopes.push_loop(
            ScopeKind::While,
            LoopLabels {
                continue_label: head.clone(),
                break_label: end.clone(),
            },
        );

        let mut inner = String::new();
        emit_label(&mut inner, &head);
        compile_expr(condition, &self.ctx, &mut inner)?;
        emit(&mut inner, "pop eax");
        emit(&mut inner, "cmp eax, 0");
        emit(&mut inner, &format!("je {}", natural_end));
        for stmt in body {
            self.generate_stmt(stmt, &mut inner)?;
        }
        emit(&mut inner, &format!("jmp {}", head));

        let size = self.ctx.scopes.pop(ScopeKind::While)?.local_size();
        let inner = self.ctx.resolve_loop_exits(id, inner)?;
        debug!(label = %head, locals = size, "generated while loop");

        reserve(out, size);
        out.push_str(&inner);
        emit_label(out, &natural_end);
        release(out, size);
        emit_label(out, &end);
        Ok(())
    }

    fn generate_for(
        &mut self,
        init: Option<&Stmt>,
        condition: Option<&Expr>,
        increment: Option<&Stmt>,
        body: &[Stmt],
        out: &mut String,
    ) -> CodegenResult<()> {
        let n = self.ctx.next_label(LabelKind::For);
        let head = format!(".__for_{}", n);
        let step = format!(".__forinc_{}", n);
        let natural_end = format!(".__forend_natural_{}", n);
        let end = format!(".__forend_{}", n);

        let id = self.ctx.scopes.push_loop(
            ScopeKind::For,
            LoopLabels {
                continue_label: step.clone(),
                break_label: end.clone(),
            },
        );

        let mut inner = String::new();
        if let Some(init) = init {
            self.generate_stmt(init, &mut inner)?;
        }
        emit_label(&mut inner, &head);
        if let Some(condition) = condition {
            compile_expr(condition, &self.ctx, &mut inner)?;
            emit(&mut inner, "pop eax");
            emit(&mut inner, "cmp eax, 0");
            emit(&mut inner, &format!("je {}", natural_end));
        }
        for stmt in body {
            self.generate_stmt(stmt, &mut inner)?;
        }
        emit_label(&mut inner, &step);
        if let Some(increment) = increment {
            self.generate_stmt(increment, &mut inner)?;
        }
        emit(&mut inner, &format!("jmp {}", head));

        let size = self.ctx.scopes.pop(ScopeKind::For)?.local_size();
        let inner = self.ctx.resolve_loop_exits(id, inner)?;
        debug!(label = %head, locals = size, "generated for loop");

        reserve(out, size);
        out.push_str(&inner);
        emit_label(out, &natural_end);
        release(out, size);
        emit_label(out, &end);
        Ok(())
    }
}

/// Moves the value on top of the stack into `symbol`.
fn store_symbol(symbol: &Symbol, out: &mut String) {
    let ty = &symbol.symbol_type;
    if ty.is_primitive() {
        emit(out, "pop eax");
        emit(
            out,
            &format!("mov {} {}, {}", ty.asm_size(), symbol.address(), ty.register()),
        );
    } else {
        emit(out, &format!("lea eax, {}", symbol.address()));
        pop_copy(out, ty.aligned_size(), 0);
    }
}

fn reserve(out: &mut String, size: u32) {
    if size > 0 {
        emit(out, &format!("sub esp, {}", size));
    }
}

fn release(out: &mut String, size: u32) {
    if size > 0 {
        emit(out, &format!("add esp, {}", size));
    }
}
