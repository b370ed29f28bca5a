//! Recursive-descent parser producing one `Function` per declaration.
//!
//! The parser mirrors the classic chibicc structure: a precedence-climbing
//! set of expression helpers under a statement layer. On top of that it
//! resolves every identifier against a stack of lexical scopes and, once a
//! function has been parsed completely, lays out its stack frame.

use std::collections::{HashMap, HashSet};

use log::{debug, trace};

use crate::ast::{BinaryOp, Expr, Function, Program, Stmt, VarId, Variable};
use crate::error::{CompileError, CompileResult, ErrorKind};
use crate::tokenizer::{Token, TokenKind, describe_token};
use crate::ty::{Type, align_to};

/// Arguments travel in registers only, so calls and declarations are capped.
pub const MAX_ARGS: usize = 6;

/// Stack alignment required at call boundaries by the calling convention.
const FRAME_ALIGN: i64 = 16;

/// Parse a whole program: a sequence of `func` declarations.
pub fn parse(tokens: Vec<Token>, source: &str) -> CompileResult<Program> {
  let mut parser = Parser::new(TokenStream::new(tokens, source));
  parser.program()
}

struct Parser<'a> {
  stream: TokenStream<'a>,
  scopes: ScopeStack,
  /// Variables of the function being parsed, parameters first.
  vars: Vec<(String, Type)>,
}

impl<'a> Parser<'a> {
  fn new(stream: TokenStream<'a>) -> Self {
    Self {
      stream,
      scopes: ScopeStack::default(),
      vars: Vec::new(),
    }
  }

  // program = { functionDecl ";" } EOF
  fn program(&mut self) -> CompileResult<Program> {
    if self.stream.is_eof() {
      let token = self.stream.peek().clone();
      return Err(self.error(ErrorKind::Syntax, &token, "program is empty"));
    }

    let mut program = Program::default();
    let mut names = HashSet::new();
    while !self.stream.is_eof() {
      let name_token = self.stream.peek_at(1).clone();
      let function = self.function()?;
      if !names.insert(function.name.clone()) {
        return Err(self.error(
          ErrorKind::Declaration,
          &name_token,
          format!("function {} redeclared", function.name),
        ));
      }
      self.stream.skip(";")?;
      program.functions.push(function);
    }
    Ok(program)
  }

  // functionDecl = "func" ident "(" [ param { "," param } [","] ] ")" ["int"] block
  fn function(&mut self) -> CompileResult<Function> {
    self.stream.skip("func")?;
    let name = self.stream.get_ident()?.text;
    self.stream.skip("(")?;

    self.vars.clear();
    let (param_count, body) = self.scoped(|p| {
      let param_count = p.params()?;
      if !p.stream.is("{") {
        p.type_name()?;
      }
      // Parameters and the top level of the body share one scope.
      let body = p.block_body()?;
      Ok((param_count, body))
    })?;

    let mut offset = 0;
    let mut params: Vec<Variable> = self
      .vars
      .drain(..)
      .map(|(name, ty)| {
        offset += ty.size();
        Variable { name, ty, offset }
      })
      .collect();
    let locals = params.split_off(param_count);
    let frame_size = align_to(offset, FRAME_ALIGN);

    debug!(
      "parsed function {name}: {} params, {} locals, frame {frame_size} bytes",
      params.len(),
      locals.len()
    );
    Ok(Function {
      name,
      params,
      locals,
      body,
      frame_size,
    })
  }

  /// Parses the parameter list after `(` up to and including `)`.
  fn params(&mut self) -> CompileResult<usize> {
    let mut count = 0;
    while !self.stream.equal(")") {
      let token = self.stream.get_ident()?;
      let ty = self.type_name()?;
      count += 1;
      if count > MAX_ARGS {
        return Err(self.error(
          ErrorKind::Declaration,
          &token,
          format!("too many parameters (at most {MAX_ARGS})"),
        ));
      }
      self.declare(&token, ty)?;
      if !self.stream.is(")") {
        self.stream.skip(",")?;
      }
    }
    Ok(count)
  }

  fn type_name(&mut self) -> CompileResult<Type> {
    let token = self.stream.peek().clone();
    if token.kind == TokenKind::Ident
      && let Some(ty) = Type::from_name(&token.text)
    {
      self.stream.advance();
      return Ok(ty);
    }
    Err(self.error(
      ErrorKind::Syntax,
      &token,
      format!("expected a type, but got {}", describe_token(&token)),
    ))
  }

  // block = "{" { statement ";" } "}"
  fn block(&mut self) -> CompileResult<Vec<Stmt>> {
    self.scoped(|p| p.block_body())
  }

  /// Like `block`, but declares into the current scope.
  fn block_body(&mut self) -> CompileResult<Vec<Stmt>> {
    self.stream.skip("{")?;
    let mut stmts = Vec::new();
    loop {
      while self.stream.equal(";") {}
      if self.stream.equal("}") {
        return Ok(stmts);
      }
      stmts.push(self.stmt()?);
      // The terminator may be left out right before the closing brace.
      if !self.stream.is("}") {
        self.stream.skip(";")?;
      }
    }
  }

  // statement = "return" expr | varDecl | ifStmt | forStmt | block | simpleStmt
  fn stmt(&mut self) -> CompileResult<Stmt> {
    if self.stream.equal("return") {
      return Ok(Stmt::Return(self.expr()?));
    }
    if self.stream.equal("var") {
      return self.var_decl();
    }
    if self.stream.equal("if") {
      return self.if_stmt();
    }
    if self.stream.equal("for") {
      return self.for_stmt();
    }
    if self.stream.is("{") {
      return Ok(Stmt::Block(self.block()?));
    }
    self.simple_stmt()
  }

  // varDecl = "var" ident ( "int" [ "=" expr ] | "=" expr )
  fn var_decl(&mut self) -> CompileResult<Stmt> {
    let token = self.stream.get_ident()?;
    let (ty, init) = if self.stream.equal("=") {
      (Type::Int, Some(self.expr()?))
    } else {
      let ty = self.type_name()?;
      let init = if self.stream.equal("=") {
        Some(self.expr()?)
      } else {
        None
      };
      (ty, init)
    };

    // Declared after the initializer so that `var x = x` reads an outer `x`.
    let target = self.declare(&token, ty)?;
    Ok(Stmt::Assign {
      target,
      value: init.unwrap_or(Expr::Num(0)),
    })
  }

  // ifStmt = "if" [ simpleStmt ";" ] expr block [ "else" ( ifStmt | block ) ]
  fn if_stmt(&mut self) -> CompileResult<Stmt> {
    self.scoped(|p| {
      let token = p.stream.peek().clone();
      let first = p.simple_stmt()?;
      let (init, cond) = if p.stream.equal(";") {
        (Some(Box::new(first)), p.expr()?)
      } else {
        (None, p.condition(first, &token)?)
      };

      let then = p.block()?;
      let els = if p.stream.equal("else") {
        if p.stream.equal("if") {
          Some(Box::new(p.if_stmt()?))
        } else {
          Some(Box::new(Stmt::Block(p.block()?)))
        }
      } else {
        None
      };

      Ok(Stmt::If {
        init,
        cond,
        then,
        els,
      })
    })
  }

  // forStmt = "for" [ condition | [simpleStmt] ";" [expr] ";" [simpleStmt] ] block
  fn for_stmt(&mut self) -> CompileResult<Stmt> {
    self.scoped(|p| {
      let mut init = None;
      let mut cond = None;
      let mut post = None;

      if !p.stream.is("{") {
        let mut three_clause = true;
        if !p.stream.is(";") {
          let token = p.stream.peek().clone();
          let first = p.simple_stmt()?;
          if p.stream.is(";") {
            init = Some(Box::new(first));
          } else {
            cond = Some(p.condition(first, &token)?);
            three_clause = false;
          }
        }

        if three_clause {
          p.stream.skip(";")?;
          if !p.stream.is(";") {
            cond = Some(p.expr()?);
          }
          p.stream.skip(";")?;
          if !p.stream.is("{") {
            post = Some(Box::new(p.simple_stmt()?));
          }
        }
      }

      let body = p.block()?;
      Ok(Stmt::For {
        init,
        cond,
        post,
        body,
      })
    })
  }

  /// Accept a parsed simple statement only if it is a bare expression.
  fn condition(&self, stmt: Stmt, token: &Token) -> CompileResult<Expr> {
    match stmt {
      Stmt::Expr(expr) => Ok(expr),
      _ => Err(self.error(
        ErrorKind::Syntax,
        token,
        "expected a condition, but got an assignment",
      )),
    }
  }

  // simpleStmt = expr [ "=" expr ]
  fn simple_stmt(&mut self) -> CompileResult<Stmt> {
    let token = self.stream.peek().clone();
    let lhs = self.expr()?;
    if !self.stream.equal("=") {
      return Ok(Stmt::Expr(lhs));
    }

    let Expr::Var(target) = lhs else {
      return Err(self.error(
        ErrorKind::Syntax,
        &token,
        "left side of assignment is not a variable",
      ));
    };
    let value = self.expr()?;
    Ok(Stmt::Assign { target, value })
  }

  // expr = add { ("==" | "!=" | "<" | "<=" | ">" | ">=") add }
  fn expr(&mut self) -> CompileResult<Expr> {
    let mut node = self.add()?;
    loop {
      if self.stream.equal("==") {
        node = Expr::binary(BinaryOp::Eq, node, self.add()?);
      } else if self.stream.equal("!=") {
        node = Expr::binary(BinaryOp::Ne, node, self.add()?);
      } else if self.stream.equal("<") {
        node = Expr::binary(BinaryOp::Lt, node, self.add()?);
      } else if self.stream.equal("<=") {
        node = Expr::binary(BinaryOp::Le, node, self.add()?);
      } else if self.stream.equal(">") {
        let rhs = self.add()?;
        node = Expr::binary(BinaryOp::Lt, rhs, node);
      } else if self.stream.equal(">=") {
        let rhs = self.add()?;
        node = Expr::binary(BinaryOp::Le, rhs, node);
      } else {
        return Ok(node);
      }
    }
  }

  // add = mul { ("+" | "-") mul }
  fn add(&mut self) -> CompileResult<Expr> {
    let mut node = self.mul()?;
    loop {
      if self.stream.equal("+") {
        node = Expr::binary(BinaryOp::Add, node, self.mul()?);
      } else if self.stream.equal("-") {
        node = Expr::binary(BinaryOp::Sub, node, self.mul()?);
      } else {
        return Ok(node);
      }
    }
  }

  // mul = unary { ("*" | "/") unary }
  fn mul(&mut self) -> CompileResult<Expr> {
    let mut node = self.unary()?;
    loop {
      if self.stream.equal("*") {
        node = Expr::binary(BinaryOp::Mul, node, self.unary()?);
      } else if self.stream.equal("/") {
        node = Expr::binary(BinaryOp::Div, node, self.unary()?);
      } else {
        return Ok(node);
      }
    }
  }

  // unary = ("+" | "-") unary | primary
  fn unary(&mut self) -> CompileResult<Expr> {
    if self.stream.equal("+") {
      return self.unary();
    }
    if self.stream.equal("-") {
      let operand = self.unary()?;
      return Ok(Expr::binary(BinaryOp::Sub, Expr::Num(0), operand));
    }
    self.primary()
  }

  // primary = num | ident | funcCall | "(" expr ")"
  fn primary(&mut self) -> CompileResult<Expr> {
    if self.stream.equal("(") {
      let node = self.expr()?;
      self.stream.skip(")")?;
      return Ok(node);
    }

    let token = self.stream.peek().clone();
    match token.kind {
      TokenKind::Num => Ok(Expr::Num(self.stream.get_number()?)),
      TokenKind::Ident if self.stream.peek_at(1).text == "(" => self.call(),
      TokenKind::Ident => {
        self.stream.advance();
        self.scopes.lookup(&token.text).map(Expr::Var).ok_or_else(|| {
          self.error(
            ErrorKind::Declaration,
            &token,
            format!("undefined variable {}", token.text),
          )
        })
      }
      _ => Err(self.error(
        ErrorKind::Syntax,
        &token,
        format!("expected an expression, but got {}", describe_token(&token)),
      )),
    }
  }

  // funcCall = ident "(" [ expr { "," expr } [","] ] ")"
  fn call(&mut self) -> CompileResult<Expr> {
    let token = self.stream.get_ident()?;
    self.stream.skip("(")?;
    let mut args = Vec::new();
    while !self.stream.equal(")") {
      args.push(self.expr()?);
      if !self.stream.is(")") {
        self.stream.skip(",")?;
      }
    }

    if args.len() > MAX_ARGS {
      return Err(self.error(
        ErrorKind::Declaration,
        &token,
        format!(
          "too many arguments in call to {} ({}, at most {MAX_ARGS})",
          token.text,
          args.len()
        ),
      ));
    }
    Ok(Expr::Call {
      name: token.text,
      args,
    })
  }

  /// Run `f` inside a fresh innermost scope.
  fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> CompileResult<T>) -> CompileResult<T> {
    self.scopes.enter();
    let result = f(self);
    self.scopes.leave();
    result
  }

  fn declare(&mut self, token: &Token, ty: Type) -> CompileResult<VarId> {
    let id = VarId(self.vars.len());
    if !self.scopes.declare(&token.text, id) {
      return Err(self.error(
        ErrorKind::Declaration,
        token,
        format!("{} redeclared in this block", token.text),
      ));
    }
    self.vars.push((token.text.clone(), ty));
    Ok(id)
  }

  fn error(&self, kind: ErrorKind, token: &Token, message: impl Into<String>) -> CompileError {
    CompileError::at(kind, self.stream.source, token.line, token.column, message)
  }
}

/// Lexical scopes of the function being parsed, innermost last.
#[derive(Debug, Default)]
struct ScopeStack {
  scopes: Vec<HashMap<String, VarId>>,
}

impl ScopeStack {
  fn enter(&mut self) {
    self.scopes.push(HashMap::new());
    trace!("entered scope at depth {}", self.scopes.len());
  }

  fn leave(&mut self) {
    trace!("left scope at depth {}", self.scopes.len());
    self.scopes.pop();
  }

  /// Returns `false` if the innermost scope already has `name`.
  fn declare(&mut self, name: &str, id: VarId) -> bool {
    let Some(scope) = self.scopes.last_mut() else {
      return false;
    };
    if scope.contains_key(name) {
      return false;
    }
    scope.insert(name.to_string(), id);
    true
  }

  fn lookup(&self, name: &str) -> Option<VarId> {
    self
      .scopes
      .iter()
      .rev()
      .find_map(|scope| scope.get(name).copied())
  }
}

/// Lightweight cursor over the token vector.
struct TokenStream<'a> {
  tokens: Vec<Token>,
  source: &'a str,
  pos: usize,
  /// Returned for any read past the end of `tokens`.
  eof: Token,
}

impl<'a> TokenStream<'a> {
  fn new(tokens: Vec<Token>, source: &'a str) -> Self {
    let eof = match tokens.last() {
      Some(token) if token.kind == TokenKind::Eof => token.clone(),
      Some(token) => Token::new(TokenKind::Eof, "", token.line + 1, 1),
      None => Token::new(TokenKind::Eof, "", 1, 1),
    };
    Self {
      tokens,
      source,
      pos: 0,
      eof,
    }
  }

  fn peek(&self) -> &Token {
    self.peek_at(0)
  }

  fn peek_at(&self, n: usize) -> &Token {
    self.tokens.get(self.pos + n).unwrap_or(&self.eof)
  }

  fn advance(&mut self) {
    if !self.is_eof() {
      self.pos += 1;
    }
  }

  /// Whether the current token is the reserved word or punctuator `op`.
  fn is(&self, op: &str) -> bool {
    let token = self.peek();
    token.kind == TokenKind::Reserved && token.text == op
  }

  /// Consume the current token if it matches the provided punctuator.
  fn equal(&mut self, op: &str) -> bool {
    if self.is(op) {
      self.pos += 1;
      return true;
    }
    false
  }

  fn skip(&mut self, op: &str) -> CompileResult<()> {
    if self.equal(op) {
      return Ok(());
    }
    let token = self.peek();
    Err(CompileError::syntax(
      self.source,
      token.line,
      token.column,
      format!("expected \"{op}\", but got {}", describe_token(token)),
    ))
  }

  /// Parse the current token as an integer literal.
  fn get_number(&mut self) -> CompileResult<i64> {
    let token = self.peek();
    if token.kind != TokenKind::Num {
      return Err(CompileError::syntax(
        self.source,
        token.line,
        token.column,
        format!("expected a number, but got {}", describe_token(token)),
      ));
    }
    let value = token.text.parse::<i64>().map_err(|_| {
      CompileError::syntax(
        self.source,
        token.line,
        token.column,
        format!("number {} is out of range", token.text),
      )
    })?;
    self.pos += 1;
    Ok(value)
  }

  fn get_ident(&mut self) -> CompileResult<Token> {
    let token = self.peek().clone();
    if token.kind != TokenKind::Ident {
      return Err(CompileError::syntax(
        self.source,
        token.line,
        token.column,
        format!("expected an identifier, but got {}", describe_token(&token)),
      ));
    }
    self.pos += 1;
    Ok(token)
  }

  fn is_eof(&self) -> bool {
    self.peek().kind == TokenKind::Eof
  }
}
