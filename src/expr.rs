//! Evaluation and code generation for expression trees.
//!
//! Compiling an expression happens in two steps. `evaluate` flattens the tree
//! into an emission list (mostly post-order), then `generate_code` is run on
//! every node of that list. The machine stack is the operand stack: every
//! node leaves its value on top of it, 4 bytes for primitives and the full
//! aligned size for arrays and structs.

use crate::ast::{BinOp, Expr, StepOp, StepOrder};
use crate::codegen::emit;
use crate::context::Context;
use crate::error::{CodegenError, CodegenResult};
use crate::symbol_table::Symbol;
use crate::types::Type;

/// Compiles `expr` so that its value ends up on top of the stack.
pub fn compile_expr(expr: &Expr, ctx: &Context, out: &mut String) -> CodegenResult<()> {
    for node in expr.emission_list(ctx)? {
        node.generate_code(ctx, out)?;
    }
    Ok(())
}

impl Expr {
    pub fn emission_list<'a>(&'a self, ctx: &Context) -> CodegenResult<Vec<&'a Expr>> {
        let mut order = Vec::new();
        self.evaluate(ctx, &mut order)?;
        Ok(order)
    }

    /// Appends this node and its descendants to `order` in the order their
    /// code must run.
    pub fn evaluate<'a>(&'a self, ctx: &Context, order: &mut Vec<&'a Expr>) -> CodegenResult<()> {
        match self {
            Expr::IntLiteral(_)
            | Expr::StringLiteral(_)
            | Expr::Symbol(_)
            | Expr::AddressOf(_)
            | Expr::Call { .. } => order.push(self),
            Expr::Deref(inner) => {
                if array_symbol(inner, ctx).is_none() {
                    inner.evaluate(ctx, order)?;
                }
                order.push(self);
            }
            Expr::Cast { expr, .. } => expr.evaluate(ctx, order)?,
            Expr::Binary { left, right, .. } => {
                left.evaluate(ctx, order)?;
                right.evaluate(ctx, order)?;
                order.push(self);
            }
            Expr::Negate(inner) => {
                inner.evaluate(ctx, order)?;
                order.push(self);
            }
            Expr::Step {
                order: StepOrder::Prefix,
                operand,
                ..
            } => {
                order.push(self);
                operand.evaluate(ctx, order)?;
            }
            Expr::Step {
                order: StepOrder::Postfix,
                operand,
                ..
            } => {
                operand.evaluate(ctx, order)?;
                order.push(self);
            }
        }
        Ok(())
    }

    /// Emits this node alone. Operands are expected on the stack already.
    pub fn generate_code(&self, ctx: &Context, out: &mut String) -> CodegenResult<()> {
        match self {
            Expr::IntLiteral(value) => emit(out, &format!("push DWORD {}", value)),
            Expr::StringLiteral(raw) => {
                let label = ctx.literals.label(raw)?;
                emit(out, &format!("push {}", label));
            }
            Expr::Symbol(name) => {
                let symbol = ctx.lookup(name)?;
                if symbol.symbol_type.is_primitive() {
                    push_value(out, &symbol.symbol_type, &symbol.address());
                } else {
                    emit(out, &format!("lea eax, {}", symbol.address()));
                    push_copy(out, symbol.symbol_type.aligned_size());
                }
            }
            Expr::AddressOf(name) => {
                let symbol = ctx.lookup(name)?;
                emit(out, &format!("lea eax, {}", symbol.address()));
                emit(out, "push eax");
            }
            Expr::Deref(inner) => {
                match array_symbol(inner, ctx) {
                    Some(symbol) => emit(out, &format!("lea eax, {}", symbol.address())),
                    None => emit(out, "pop eax"),
                }
                let target = deref_type(inner, ctx)?;
                if target.is_primitive() {
                    push_value(out, &target, "[eax]");
                } else {
                    push_copy(out, target.aligned_size());
                }
            }
            Expr::Cast { .. } => {}
            Expr::Binary { op, .. } => generate_binary(*op, out),
            Expr::Negate(_) => {
                return Err(CodegenError::NotSupported("unary negation".to_string()))
            }
            Expr::Step { op, operand, .. } => {
                let symbol = step_target(operand, ctx)?;
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
            Expr::Call { name, args } => generate_call(ctx, name, args, true, out)?,
        }
        Ok(())
    }

    /// Every descendant of this node, direct children first. Call arguments
    /// are compiled separately and are not part of the set.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Binary { left, right, .. } => {
                let mut nodes = vec![left.as_ref(), right.as_ref()];
                nodes.extend(left.children());
                nodes.extend(right.children());
                nodes
            }
            Expr::Deref(inner)
            | Expr::Negate(inner)
            | Expr::Cast { expr: inner, .. }
            | Expr::Step { operand: inner, .. } => {
                let mut nodes = vec![inner.as_ref()];
                nodes.extend(inner.children());
                nodes
            }
            _ => Vec::new(),
        }
    }

    /// Best guess at the type of this expression, looking at the node and all
    /// of its descendants.
    ///
    /// A dereference is always the pointee of its operand. Otherwise rules
    /// are tried in a fixed order over the whole set: a cast, then `&x`, a
    /// dereference, a pointer symbol, an array or struct symbol, a call with
    /// a return type, an integer literal (`i32`), a string literal (`u8*`)
    /// and finally any primitive symbol.
    pub fn infer_type(&self, ctx: &Context) -> CodegenResult<Type> {
        if let Expr::Deref(inner) = self {
            return deref_type(inner, ctx);
        }

        let mut nodes = vec![self];
        nodes.extend(self.children());

        for node in &nodes {
            if let Expr::Cast { target, .. } = node {
                return ctx.parse_type(target);
            }
        }

        for node in &nodes {
            if let Expr::AddressOf(name) = node {
                let symbol = ctx.lookup(name)?;
                return Ok(Type::pointer_to(symbol.symbol_type.clone()));
            }
        }

        for node in &nodes {
            if let Expr::Deref(inner) = node {
                return deref_type(inner, ctx);
            }
        }

        let symbols = nodes
            .iter()
            .filter_map(|node| match node {
                Expr::Symbol(name) => Some(ctx.lookup(name)),
                _ => None,
            })
            .collect::<CodegenResult<Vec<&Symbol>>>()?;

        if let Some(symbol) = symbols.iter().find(|s| s.symbol_type.is_pointer()) {
            return Ok(symbol.symbol_type.clone());
        }

        if let Some(symbol) = symbols.iter().find(|s| !s.symbol_type.is_primitive()) {
            return Ok(symbol.symbol_type.clone());
        }

        for node in &nodes {
            if let Expr::Call { name, .. } = node {
                if let Some(return_type) = &ctx.functions.get(name)?.return_type {
                    return Ok(return_type.clone());
                }
            }
        }

        if nodes.iter().any(|node| matches!(node, Expr::IntLiteral(_))) {
            return Ok(Type::i32());
        }

        if nodes.iter().any(|node| matches!(node, Expr::StringLiteral(_))) {
            return Ok(Type::pointer_to(Type::u8()));
        }

        if let Some(symbol) = symbols.first() {
            return Ok(symbol.symbol_type.clone());
        }

        Err(CodegenError::TypeInference(self.to_string()))
    }

    /// Bytes this expression leaves on the stack once compiled.
    pub fn pushed_size(&self, ctx: &Context) -> CodegenResult<u32> {
        let ty = match self {
            Expr::Symbol(name) => ctx.lookup(name)?.symbol_type.clone(),
            Expr::Call { name, .. } => match &ctx.functions.get(name)?.return_type {
                Some(ty) => ty.clone(),
                None => return Ok(0),
            },
            Expr::Deref(inner) => deref_type(inner, ctx)?,
            Expr::Cast { expr, .. } => return expr.pushed_size(ctx),
            _ => return Ok(4),
        };

        if ty.is_primitive() {
            Ok(4)
        } else {
            Ok(ty.aligned_size())
        }
    }
}

/// Emits a call to `name`. With `keep_result` the result is left on the
/// stack, otherwise it is dropped.
pub fn generate_call(
    ctx: &Context,
    name: &str,
    args: &[Expr],
    keep_result: bool,
    out: &mut String,
) -> CodegenResult<()> {
    let signature = ctx.functions.get(name)?;
    if !signature.is_extern && args.len() != signature.params.len() {
        return Err(CodegenError::ArgumentCount {
            name: name.to_string(),
            expected: signature.params.len(),
            found: args.len(),
        });
    }

    let result_size = match &signature.return_type {
        Some(ty) if !ty.is_primitive() => Some(ty.aligned_size()),
        _ => None,
    };

    if let Some(size) = result_size {
        emit(out, &format!("sub esp, {}", size));
    }

    let mut pushed = 0;
    for arg in args.iter().rev() {
        if let Expr::StringLiteral(raw) = arg {
            emit(out, &format!("push {}", ctx.literals.label(raw)?));
            pushed += 4;
            continue;
        }
        compile_expr(arg, ctx, out)?;
        pushed += arg.pushed_size(ctx)?;
    }

    if result_size.is_some() {
        emit(out, &format!("lea edx, [esp+{}]", pushed));
        emit(out, "push edx");
        pushed += 4;
    }

    emit(out, &format!("call {}", name));
    if pushed > 0 {
        emit(out, &format!("add esp, {}", pushed));
    }

    match (&signature.return_type, keep_result) {
        (Some(ty), true) if ty.is_primitive() => emit(out, "push eax"),
        (Some(ty), false) if !ty.is_primitive() => {
            emit(out, &format!("add esp, {}", ty.aligned_size()))
        }
        (None, true) => {
            return Err(CodegenError::NotSupported(format!(
                "using the result of '{}', which returns nothing",
                name
            )))
        }
        _ => {}
    }
    Ok(())
}

/// Pushes a primitive read from `operand`, zero-extending narrow values.
pub fn push_value(out: &mut String, ty: &Type, operand: &str) {
    if ty.aligned_size() == 4 {
        emit(out, &format!("push DWORD {}", operand));
    } else {
        emit(out, &format!("movzx eax, {} {}", ty.asm_size(), operand));
        emit(out, "push eax");
    }
}

/// Copies `size` bytes starting at the address in `eax` onto the stack.
pub fn push_copy(out: &mut String, size: u32) {
    emit(out, &format!("sub esp, {}", size));
    emit(out, "mov edx, esp");
    emit(out, &format!("push DWORD {}", size));
    emit(out, "push eax");
    emit(out, "push edx");
    emit(out, "call memcpy");
    emit(out, "add esp, 12");
}

/// Copies the `size` byte value on top of the stack to the address in `eax`,
/// then drops it together with `extra` more bytes below it.
pub fn pop_copy(out: &mut String, size: u32, extra: u32) {
    emit(out, "mov edx, esp");
    emit(out, &format!("push DWORD {}", size));
    emit(out, "push edx");
    emit(out, "push eax");
    emit(out, "call memcpy");
    emit(out, "add esp, 12");
    emit(out, &format!("add esp, {}", size + extra));
}

fn generate_binary(op: BinOp, out: &mut String) {
    if op == BinOp::Divide {
        emit(out, "pop ecx");
        emit(out, "pop eax");
        emit(out, "xor edx, edx");
        emit(out, "div ecx");
        emit(out, "push eax");
        return;
    }

    emit(out, "pop edx");
    emit(out, "pop eax");

    let set = match op {
        BinOp::Add => {
            emit(out, "add eax, edx");
            None
        }
        BinOp::Subtract => {
            emit(out, "sub eax, edx");
            None
        }
        BinOp::Multiply => {
            emit(out, "mul edx");
            None
        }
        BinOp::LogicalOr => {
            emit(out, "or eax, edx");
            None
        }
        BinOp::LogicalAnd => {
            emit(out, "test eax, edx");
            Some("setnz")
        }
        BinOp::Less => Some("setl"),
        BinOp::Greater => Some("setg"),
        BinOp::LessEqual => Some("setle"),
        BinOp::GreaterEqual => Some("setge"),
        BinOp::EqualEqual => Some("sete"),
        BinOp::NotEqual => Some("setne"),
        BinOp::Divide => None,
    };

    if let Some(set) = set {
        if op != BinOp::LogicalAnd {
            emit(out, "cmp eax, edx");
        }
        emit(out, &format!("{} al", set));
        emit(out, "movzx eax, al");
    }

    emit(out, "push eax");
}

/// The symbol behind `expr` when it names an array, which is addressed
/// directly instead of through a loaded pointer.
fn array_symbol<'c>(expr: &Expr, ctx: &'c Context) -> Option<&'c Symbol> {
    match expr {
        Expr::Symbol(name) => ctx
            .lookup(name)
            .ok()
            .filter(|symbol| symbol.symbol_type.is_array()),
        _ => None,
    }
}

/// Type read through the address computed by `pointer`. Only an array
/// operand decays to its element; a pointer to an array reads the whole array.
pub fn deref_type(pointer: &Expr, ctx: &Context) -> CodegenResult<Type> {
    let ty = pointer.infer_type(ctx)?;
    ty.pointee()
        .cloned()
        .ok_or_else(|| CodegenError::TypeInference(format!("*({})", pointer)))
}

fn step_target<'c>(operand: &Expr, ctx: &'c Context) -> CodegenResult<&'c Symbol> {
    let name = match operand {
        Expr::Symbol(name) => name,
        other => {
            return Err(CodegenError::NotSupported(format!(
                "incrementing `{}`",
                other
            )))
        }
    };
    let symbol = ctx.lookup(name)?;
    if !symbol.symbol_type.is_primitive() {
        return Err(CodegenError::NotSupported(format!(
            "incrementing the non-primitive value '{}'",
            name
        )));
    }
    Ok(symbol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol_table::ScopeKind;

    fn context_with(locals: &[(&str, &str)]) -> Context {
        let mut ctx = Context::new();
        ctx.scopes.push(ScopeKind::Function);
        for (name, ty) in locals {
            let ty = ctx.parse_type(ty).unwrap();
            ctx.scopes.declare(name, ty).unwrap();
        }
        ctx
    }

    #[test]
    fn test_binary_is_post_order() {
        let ctx = context_with(&[]);
        let expr = Expr::binary(BinOp::Add, Expr::IntLiteral(2), Expr::IntLiteral(3));
        let order = expr.emission_list(&ctx).unwrap();
        assert_eq!(order.len(), 3);
        assert_eq!(order[0], &Expr::IntLiteral(2));
        assert_eq!(order[1], &Expr::IntLiteral(3));
        assert_eq!(order[2], &expr);
    }

    #[test]
    fn test_prefix_step_precedes_its_operand() {
        let ctx = context_with(&[("x", "i32")]);
        let prefix = Expr::Step {
            op: StepOp::Increment,
            order: StepOrder::Prefix,
            operand: Box::new(Expr::symbol("x")),
        };
        let order = prefix.emission_list(&ctx).unwrap();
        assert_eq!(order, vec![&prefix, &Expr::symbol("x")]);

        let postfix = Expr::Step {
            op: StepOp::Increment,
            order: StepOrder::Postfix,
            operand: Box::new(Expr::symbol("x")),
        };
        let order = postfix.emission_list(&ctx).unwrap();
        assert_eq!(order, vec![&Expr::symbol("x"), &postfix]);
    }

    #[test]
    fn test_cast_emits_nothing_itself() {
        let ctx = context_with(&[("p", "u32*")]);
        let expr = Expr::Cast {
            expr: Box::new(Expr::symbol("p")),
            target: "u8*".to_string(),
        };
        assert_eq!(expr.emission_list(&ctx).unwrap(), vec![&Expr::symbol("p")]);
    }

    #[test]
    fn test_deref_of_array_skips_operand() {
        let ctx = context_with(&[("buf", "u8(8)")]);
        let expr = Expr::Deref(Box::new(Expr::symbol("buf")));
        assert_eq!(expr.emission_list(&ctx).unwrap(), vec![&expr]);

        let mut out = String::new();
        compile_expr(&expr, &ctx, &mut out).unwrap();
        assert_eq!(out, "    lea eax, [ebp-8]\n    movzx eax, BYTE [eax]\n    push eax\n");
    }

    #[test]
    fn test_deref_chain_reads_the_final_pointee() {
        let ctx = context_with(&[("c", "u8"), ("p", "u8*"), ("pp", "u8**")]);
        let once = Expr::Deref(Box::new(Expr::symbol("pp")));
        let twice = Expr::Deref(Box::new(once.clone()));

        assert_eq!(once.infer_type(&ctx).unwrap().to_string(), "u8*");
        assert_eq!(twice.infer_type(&ctx).unwrap().to_string(), "u8");

        let sum = Expr::binary(BinOp::Add, twice.clone(), Expr::symbol("p"));
        assert_eq!(sum.infer_type(&ctx).unwrap().to_string(), "u8");

        let mut out = String::new();
        compile_expr(&twice, &ctx, &mut out).unwrap();
        assert_eq!(
            out,
            "    push DWORD [ebp-12]\n    pop eax\n    push DWORD [eax]\n    pop eax\n    movzx eax, BYTE [eax]\n    push eax\n"
        );
    }

    #[test]
    fn test_pointer_to_array_reads_whole_array() {
        let ctx = context_with(&[("p", "u8(8)*")]);
        let expr = Expr::Deref(Box::new(Expr::symbol("p")));

        assert_eq!(expr.infer_type(&ctx).unwrap().to_string(), "u8(8)");
        assert_eq!(expr.pushed_size(&ctx).unwrap(), 8);

        let mut out = String::new();
        compile_expr(&expr, &ctx, &mut out).unwrap();
        assert!(out.starts_with("    push DWORD [ebp-4]\n    pop eax\n    sub esp, 8\n"));
    }

    #[test]
    fn test_call_appends_only_itself() {
        let ctx = context_with(&[("a", "i32")]);
        let expr = Expr::Call {
            name: "f".to_string(),
            args: vec![Expr::symbol("a"), Expr::IntLiteral(1)],
        };
        assert_eq!(expr.emission_list(&ctx).unwrap(), vec![&expr]);
        assert!(expr.children().is_empty());
    }

    #[test]
    fn test_cast_wins_inference() {
        let ctx = context_with(&[("p", "u32*")]);
        let expr = Expr::Cast {
            expr: Box::new(Expr::symbol("p")),
            target: "i8*".to_string(),
        };
        let ty = expr.infer_type(&ctx).unwrap();
        assert_eq!(ty.to_string(), "i8*");
        assert_eq!(ty.pointee().unwrap().aligned_size(), 1);
    }

    #[test]
    fn test_inference_priority() {
        let ctx = context_with(&[("n", "u16"), ("p", "i32*"), ("arr", "u8(3)")]);

        let address = Expr::AddressOf("n".to_string());
        assert_eq!(address.infer_type(&ctx).unwrap().to_string(), "u16*");

        let pointer_math = Expr::binary(BinOp::Add, Expr::symbol("n"), Expr::symbol("p"));
        assert_eq!(pointer_math.infer_type(&ctx).unwrap().to_string(), "i32*");

        let array = Expr::binary(BinOp::Add, Expr::symbol("n"), Expr::symbol("arr"));
        assert_eq!(array.infer_type(&ctx).unwrap().to_string(), "u8(3)");

        let literal = Expr::binary(BinOp::Add, Expr::symbol("n"), Expr::IntLiteral(1));
        assert_eq!(literal.infer_type(&ctx).unwrap(), Type::i32());

        assert_eq!(Expr::symbol("n").infer_type(&ctx).unwrap().to_string(), "u16");
        assert_eq!(
            Expr::StringLiteral("hi".to_string())
                .infer_type(&ctx)
                .unwrap()
                .to_string(),
            "u8*"
        );
    }

    #[test]
    fn test_inference_dead_end() {
        let ctx = context_with(&[]);
        let expr = Expr::Negate(Box::new(Expr::Negate(Box::new(Expr::Call {
            name: "missing".to_string(),
            args: vec![],
        }))));
        assert!(expr.infer_type(&ctx).is_err());
        assert!(matches!(
            Expr::AddressOf("ghost".to_string()).infer_type(&ctx),
            Err(CodegenError::UndefinedSymbol(_))
        ));
    }

    #[test]
    fn test_negate_is_not_supported() {
        let ctx = context_with(&[]);
        let expr = Expr::Negate(Box::new(Expr::IntLiteral(1)));
        let mut out = String::new();
        assert!(matches!(
            compile_expr(&expr, &ctx, &mut out),
            Err(CodegenError::NotSupported(_))
        ));
    }

    #[test]
    fn test_narrow_symbols_are_zero_extended() {
        let ctx = context_with(&[("c", "u8"), ("w", "i16"), ("d", "u32")]);
        let mut out = String::new();
        compile_expr(&Expr::symbol("c"), &ctx, &mut out).unwrap();
        compile_expr(&Expr::symbol("w"), &ctx, &mut out).unwrap();
        compile_expr(&Expr::symbol("d"), &ctx, &mut out).unwrap();
        assert_eq!(
            out,
            "    movzx eax, BYTE [ebp-1]\n    push eax\n    movzx eax, WORD [ebp-4]\n    push eax\n    push DWORD [ebp-8]\n"
        );
    }

    #[test]
    fn test_comparison_yields_zero_or_one() {
        let ctx = context_with(&[]);
        let expr = Expr::binary(BinOp::Less, Expr::IntLiteral(1), Expr::IntLiteral(2));
        let mut out = String::new();
        compile_expr(&expr, &ctx, &mut out).unwrap();
        let listing: Vec<&str> = out.lines().map(str::trim).collect();
        insta::assert_snapshot!(listing.join("\n"), @r"
            push DWORD 1
            push DWORD 2
            pop edx
            pop eax
            cmp eax, edx
            setl al
            movzx eax, al
            push eax
        ");
    }
}
