use std::fmt;

/// A whole source file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// `extern fn name(params) -> T;`
    Extern(FunctionDecl),
    Struct(StructDecl),
    Function(FunctionDecl),
}

/// A function header plus, for non-extern functions, its body. Types are kept
/// as descriptor text (`i32`, `u8(16)`, `Pair*`) and resolved by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Parameter>,
    pub return_type: Option<String>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<Parameter>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub param_type: String,
}

pub type Block = Vec<Stmt>;

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `var name: T;` (no initializer) or `var name: T = init;`
    VarDecl {
        name: String,
        var_type: String,
        init: Option<Expr>,
    },
    /// `name = value;`
    Assign { name: String, value: Expr },
    /// `*name = value;`, stores through the pointer held in `name`.
    DerefAssign { name: String, value: Expr },
    /// `*(target) = value;`, stores through an arbitrary address expression.
    DerefExprAssign { target: Expr, value: Expr },
    /// `name++;` / `name--;`
    Step { op: StepOp, name: String },
    If {
        condition: Expr,
        then_block: Block,
        else_ifs: Vec<ElseIf>,
        else_block: Option<Block>,
    },
    While {
        condition: Expr,
        body: Block,
    },
    For {
        init: Option<Box<Stmt>>,
        condition: Option<Expr>,
        increment: Option<Box<Stmt>>,
        body: Block,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    /// A call whose result is discarded. Always holds an `Expr::Call`.
    Call(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElseIf {
    pub condition: Expr,
    pub body: Block,
}

/// Expression nodes. Evaluation and code generation live in `crate::expr`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntLiteral(i64),
    /// Raw literal text, escapes untranslated.
    StringLiteral(String),
    Symbol(String),
    /// `&name`
    AddressOf(String),
    /// `*operand`
    Deref(Box<Expr>),
    /// `expr as T`
    Cast { expr: Box<Expr>, target: String },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Negate(Box<Expr>),
    /// `++x`, `--x`, `x++`, `x--`. The operand is always a `Symbol`.
    Step {
        op: StepOp,
        order: StepOrder,
        operand: Box<Expr>,
    },
    Call { name: String, args: Vec<Expr> },
}

impl Expr {
    pub fn symbol(name: &str) -> Expr {
        Expr::Symbol(name.to_string())
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    EqualEqual,
    NotEqual,
    LogicalAnd,
    LogicalOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOp {
    Increment,
    Decrement,
}

/// Whether an increment takes effect before (`Prefix`) or after (`Postfix`)
/// its operand's value is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOrder {
    Prefix,
    Postfix,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Subtract => "-",
            BinOp::Multiply => "*",
            BinOp::Divide => "/",
            BinOp::Less => "<",
            BinOp::Greater => ">",
            BinOp::LessEqual => "<=",
            BinOp::GreaterEqual => ">=",
            BinOp::EqualEqual => "==",
            BinOp::NotEqual => "!=",
            BinOp::LogicalAnd => "&&",
            BinOp::LogicalOr => "||",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::IntLiteral(n) => write!(f, "{}", n),
            Expr::StringLiteral(s) => write!(f, "\"{}\"", s),
            Expr::Symbol(name) => write!(f, "{}", name),
            Expr::AddressOf(name) => write!(f, "&{}", name),
            Expr::Deref(operand) => write!(f, "*({})", operand),
            Expr::Cast { expr, target } => write!(f, "({} as {})", expr, target),
            Expr::Binary { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Expr::Negate(operand) => write!(f, "-({})", operand),
            Expr::Step { op, order, operand } => {
                let sym = match op {
                    StepOp::Increment => "++",
                    StepOp::Decrement => "--",
                };
                match order {
                    StepOrder::Prefix => write!(f, "{}{}", sym, operand),
                    StepOrder::Postfix => write!(f, "{}{}", operand, sym),
                }
            }
            Expr::Call { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Program")?;
        for item in &self.items {
            match item {
                Item::Extern(decl) => writeln!(f, "  Extern({})", decl.name)?,
                Item::Struct(decl) => {
                    writeln!(f, "  Struct({}, {} fields)", decl.name, decl.fields.len())?
                }
                Item::Function(decl) => {
                    writeln!(f, "  Function({})", decl.name)?;
                    for stmt in &decl.body {
                        writeln!(f, "    {}", stmt)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Stmt::VarDecl { name, var_type, .. } => write!(f, "VarDecl({}: {})", name, var_type),
            Stmt::Assign { name, .. } => write!(f, "Assign({})", name),
            Stmt::DerefAssign { name, .. } => write!(f, "DerefAssign({})", name),
            Stmt::DerefExprAssign { target, .. } => write!(f, "DerefExprAssign({})", target),
            Stmt::Step { op, name } => write!(f, "Step({:?} {})", op, name),
            Stmt::If { else_ifs, .. } => write!(f, "If({} else-if arms)", else_ifs.len()),
            Stmt::While { .. } => write!(f, "While"),
            Stmt::For { .. } => write!(f, "For"),
            Stmt::Break => write!(f, "Break"),
            Stmt::Continue => write!(f, "Continue"),
            Stmt::Return(_) => write!(f, "Return"),
            Stmt::Call(call) => write!(f, "Call({})", call),
        }
    }
}
