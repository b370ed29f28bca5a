//! Abstract syntax tree handed from the parser to the code generator.
//!
//! Every node owns its children outright. Variable references are indices
//! into the enclosing function's variable table, whose offsets are fixed
//! once the whole function has been parsed.

use crate::ty::Type;

/// Binary operators that survive parsing. `>` and `>=` are rewritten into
/// `Lt`/`Le` with swapped operands, so they have no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Eq,
  Ne,
  Lt,
  Le,
}

/// Index of a variable in `Function::variables()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
  Num(i64),
  Var(VarId),
  Binary {
    op: BinaryOp,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
  },
  Call {
    name: String,
    args: Vec<Expr>,
  },
}

impl Expr {
  pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
    Self::Binary {
      op,
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
  /// Evaluated for its side effects; the value is discarded.
  Expr(Expr),
  Assign {
    target: VarId,
    value: Expr,
  },
  Return(Expr),
  Block(Vec<Stmt>),
  If {
    init: Option<Box<Stmt>>,
    cond: Expr,
    then: Vec<Stmt>,
    els: Option<Box<Stmt>>,
  },
  For {
    init: Option<Box<Stmt>>,
    cond: Option<Expr>,
    post: Option<Box<Stmt>>,
    body: Vec<Stmt>,
  },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
  pub name: String,
  pub ty: Type,
  /// Distance below `%rbp`; the slot lives at `-offset(%rbp)`.
  pub offset: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
  pub name: String,
  pub params: Vec<Variable>,
  pub locals: Vec<Variable>,
  pub body: Vec<Stmt>,
  /// Always a multiple of 16.
  pub frame_size: i64,
}

impl Function {
  /// Parameters followed by locals, in the order `VarId`s were handed out.
  pub fn variables(&self) -> impl Iterator<Item = &Variable> {
    self.params.iter().chain(self.locals.iter())
  }

  pub fn variable(&self, id: VarId) -> Option<&Variable> {
    match id.0.checked_sub(self.params.len()) {
      None => self.params.get(id.0),
      Some(local) => self.locals.get(local),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Program {
  pub functions: Vec<Function>,
}
