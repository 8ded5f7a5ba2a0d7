//! Whole-program passes that run before code generation: string literals,
//! struct layouts and function signatures, in that order.

use crate::ast::*;
use crate::error::{CodegenError, CodegenResult, Diagnostics};
use crate::signatures::{
    FunctionSignature, FunctionTable, LiteralTable, StructField, StructSignature, StructTable,
};
use crate::symbol_table::{Scope, ScopeKind};
use crate::types::Type;
use tracing::debug;

pub fn collect_strings(program: &Program, literals: &mut LiteralTable) {
    for item in &program.items {
        if let Item::Function(decl) = item {
            strings_in_block(&decl.body, literals);
        }
    }
}

fn strings_in_block(block: &[Stmt], literals: &mut LiteralTable) {
    for stmt in block {
        strings_in_stmt(stmt, literals);
    }
}

fn strings_in_stmt(stmt: &Stmt, literals: &mut LiteralTable) {
    match stmt {
        Stmt::VarDecl { init, .. } => {
            if let Some(init) = init {
                strings_in_expr(init, literals);
            }
        }
        Stmt::Assign { value, .. } | Stmt::DerefAssign { value, .. } => {
            strings_in_expr(value, literals)
        }
        Stmt::DerefExprAssign { target, value } => {
            strings_in_expr(target, literals);
            strings_in_expr(value, literals);
        }
        Stmt::If {
            condition,
            then_block,
            else_ifs,
            else_block,
        } => {
            strings_in_expr(condition, literals);
            strings_in_block(then_block, literals);
            for arm in else_ifs {
                strings_in_expr(&arm.condition, literals);
                strings_in_block(&arm.body, literals);
            }
            if let Some(block) = else_block {
                strings_in_block(block, literals);
            }
        }
        Stmt::While { condition, body } => {
            strings_in_expr(condition, literals);
            strings_in_block(body, literals);
        }
        Stmt::For {
            init,
            condition,
            increment,
            body,
        } => {
            if let Some(init) = init {
                strings_in_stmt(init, literals);
            }
            if let Some(condition) = condition {
                strings_in_expr(condition, literals);
            }
            if let Some(increment) = increment {
                strings_in_stmt(increment, literals);
            }
            strings_in_block(body, literals);
        }
        Stmt::Return(Some(expr)) | Stmt::Call(expr) => strings_in_expr(expr, literals),
        Stmt::Return(None) | Stmt::Step { .. } | Stmt::Break | Stmt::Continue => {}
    }
}

fn strings_in_expr(expr: &Expr, literals: &mut LiteralTable) {
    match expr {
        Expr::StringLiteral(raw) => {
            let label = literals.intern(raw);
            debug!(literal = %raw, label, "collected string literal");
        }
        Expr::Deref(inner) | Expr::Negate(inner) => strings_in_expr(inner, literals),
        Expr::Cast { expr, .. } => strings_in_expr(expr, literals),
        Expr::Step { operand, .. } => strings_in_expr(operand, literals),
        Expr::Binary { left, right, .. } => {
            strings_in_expr(left, literals);
            strings_in_expr(right, literals);
        }
        Expr::Call { args, .. } => {
            for arg in args {
                strings_in_expr(arg, literals);
            }
        }
        Expr::IntLiteral(_) | Expr::Symbol(_) | Expr::AddressOf(_) => {}
    }
}

/// Lays out every struct. A struct may only use structs declared above it.
pub fn collect_structs(program: &Program, structs: &mut StructTable, diagnostics: &mut Diagnostics) {
    for item in &program.items {
        let Item::Struct(decl) = item else {
            continue;
        };
        if structs.contains(&decl.name) {
            debug!(name = %decl.name, "ignoring duplicate struct");
            continue;
        }
        match struct_signature(decl, structs) {
            Ok(signature) => {
                debug!(name = %signature.name, size = signature.size, "collected struct");
                structs.insert(signature);
            }
            Err(error) => diagnostics.push(decl.name.as_str(), error),
        }
    }
}

fn struct_signature(decl: &StructDecl, structs: &StructTable) -> CodegenResult<StructSignature> {
    let mut scope = Scope::new(0, ScopeKind::Struct, 0);
    let mut fields = Vec::new();

    for field in &decl.fields {
        let field_type = Type::parse(&field.param_type, structs)?;
        let size = field_type.aligned_size() as i32;
        let symbol = scope.allocate(&field.name, field_type)?;
        fields.push(StructField {
            name: field.name.clone(),
            field_type: symbol.symbol_type.clone(),
            offset: (symbol.offset - size) as u32,
        });
    }

    scope.complete();
    Ok(StructSignature {
        name: decl.name.clone(),
        fields,
        size: scope.local_size(),
    })
}

/// Registers every `fn` and `extern fn`. The first declaration of a name wins.
pub fn collect_functions(
    program: &Program,
    structs: &StructTable,
    functions: &mut FunctionTable,
    diagnostics: &mut Diagnostics,
) {
    for item in &program.items {
        let (decl, is_extern) = match item {
            Item::Extern(decl) => (decl, true),
            Item::Function(decl) => (decl, false),
            Item::Struct(_) => continue,
        };
        match function_signature(decl, is_extern, structs) {
            Ok(signature) => {
                if functions.insert(signature) {
                    debug!(name = %decl.name, is_extern, "collected function");
                } else {
                    debug!(name = %decl.name, "ignoring duplicate function");
                }
            }
            Err(error) => diagnostics.push(decl.name.as_str(), error),
        }
    }
}

fn function_signature(
    decl: &FunctionDecl,
    is_extern: bool,
    structs: &StructTable,
) -> CodegenResult<FunctionSignature> {
    let params = decl
        .params
        .iter()
        .map(|p| Ok((p.name.clone(), Type::parse(&p.param_type, structs)?)))
        .collect::<CodegenResult<Vec<_>>>()?;

    // Parameter slots are 4 bytes wide, so only the last argument may be
    // pushed at a larger size without shifting the ones after it.
    if let Some((name, ty)) = params
        .iter()
        .rev()
        .skip(1)
        .find(|(_, ty)| !ty.is_primitive())
    {
        return Err(CodegenError::NotSupported(format!(
            "passing the non-primitive parameter '{}: {}' before other parameters",
            name, ty
        )));
    }

    let return_type = match &decl.return_type {
        Some(descriptor) => Some(Type::parse(descriptor, structs)?),
        None => None,
    };

    Ok(FunctionSignature {
        name: decl.name.clone(),
        params,
        return_type,
        is_extern,
    })
}
