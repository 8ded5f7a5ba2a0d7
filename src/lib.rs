pub mod ast;
pub mod codegen;
pub mod collect;
pub mod context;
pub mod error;
pub mod expr;
pub mod lexer;
pub mod parser;
pub mod signatures;
pub mod symbol_table;
pub mod types;

pub use ast::*;
pub use codegen::*;
pub use context::{Context, LabelKind};
pub use error::*;
pub use expr::compile_expr;
pub use lexer::*;
pub use parser::*;
pub use signatures::*;
pub use symbol_table::*;
pub use types::*;

#[cfg(test)]
mod lexer_test;
#[cfg(test)]
mod types_test;
