//! Abstract Syntax Tree definitions for cell scripts

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A parsed cell: the statements of one submitted snippet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

// ============================================================================
// Statements
// ============================================================================

/// Top-level statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// Bare expression, evaluated for its side effects
    Expr(Expr),
    /// `target = value` or an augmented form such as `target += value`
    Assign(Assignment),
    If(IfStatement),
    While(WhileLoop),
    For(ForLoop),
    /// `fn name(params) { body }`
    FnDef(Arc<FunctionDef>),
    Return(Option<Expr>),
    Break,
    Continue,
}

/// Assignment statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub target: Target,
    pub op: AssignOp,
    pub value: Expr,
}

/// Left-hand side of an assignment: a name followed by zero or more indexes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub indexes: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

impl AssignOp {
    /// The binary operator an augmented assignment applies, if any
    pub fn binary(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Set => None,
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Sub => Some(BinaryOp::Sub),
            AssignOp::Mul => Some(BinaryOp::Mul),
            AssignOp::Div => Some(BinaryOp::Div),
        }
    }
}

/// IF statement with optional ELIF branches and ELSE body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfStatement {
    /// `(condition, body)` pairs, tried in order
    pub branches: Vec<(Expr, Vec<Stmt>)>,
    pub else_body: Option<Vec<Stmt>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhileLoop {
    pub condition: Expr,
    pub body: Vec<Stmt>,
}

/// FOR loop over a list, map keys, string characters or a range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForLoop {
    /// The iterator variable name (e.g., "x" in "for x in xs")
    pub iterator_var: String,
    pub iterable: Expr,
    pub body: Vec<Stmt>,
}

/// User function definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Literal),
    Name(String),
    List(Vec<Expr>),
    Map(Vec<(Expr, Expr)>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Attr {
        object: Box<Expr>,
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Rem,
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::In => "in",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Rem => "%",
        };
        write!(f, "{}", symbol)
    }
}

impl Stmt {
    /// One-line description used by `workcell explain`
    pub fn summary(&self) -> String {
        match self {
            Stmt::Expr(Expr::Call { callee, args }) => match callee.as_ref() {
                Expr::Name(name) => format!("call {}({} args)", name, args.len()),
                Expr::Attr { name, .. } => format!("call method .{}({} args)", name, args.len()),
                _ => format!("call ({} args)", args.len()),
            },
            Stmt::Expr(_) => "expression".to_string(),
            Stmt::Assign(a) => {
                let op = match a.op {
                    AssignOp::Set => "=",
                    AssignOp::Add => "+=",
                    AssignOp::Sub => "-=",
                    AssignOp::Mul => "*=",
                    AssignOp::Div => "/=",
                };
                if a.target.indexes.is_empty() {
                    format!("assign {} {}", a.target.name, op)
                } else {
                    format!("assign {}[..] {}", a.target.name, op)
                }
            }
            Stmt::If(i) => format!(
                "if ({} branches{})",
                i.branches.len(),
                if i.else_body.is_some() { ", else" } else { "" }
            ),
            Stmt::While(w) => format!("while ({} statements)", w.body.len()),
            Stmt::For(f) => format!("for {} ({} statements)", f.iterator_var, f.body.len()),
            Stmt::FnDef(def) => format!("fn {}({})", def.name, def.params.join(", ")),
            Stmt::Return(_) => "return".to_string(),
            Stmt::Break => "break".to_string(),
            Stmt::Continue => "continue".to_string(),
        }
    }
}
