//! Code generation: lower the parsed program into AT&T x86-64 assembly.
//!
//! The emitter uses a simple stack machine: every expression leaves a single
//! value on the stack and every statement leaves the stack as it found it.
//! Locals live in the stack frame and are addressed relative to `%rbp`.
//! The emitter tracks the operand stack depth to keep `%rsp` 16-byte aligned
//! at call sites and to catch unbalanced statements.

use log::{debug, trace};

use crate::ast::{BinaryOp, Expr, Function, Program, Stmt, VarId};
use crate::error::{CompileError, CompileResult};
use crate::parser::MAX_ARGS;

/// Integer argument registers of the System V calling convention, in order.
const ARG_REGS: [&str; MAX_ARGS] = ["%rdi", "%rsi", "%rdx", "%rcx", "%r8", "%r9"];

/// Callee-saved registers preserved by every generated routine.
const CALLEE_SAVED: [&str; 5] = ["%rbx", "%r12", "%r13", "%r14", "%r15"];

/// Emit assembly for every function of the program.
pub fn generate(program: &Program) -> CompileResult<String> {
  let mut emitter = Emitter::default();
  emitter.line(".att_syntax prefix");
  emitter.line(".text");
  for func in &program.functions {
    emitter.function(func)?;
  }
  Ok(emitter.asm)
}

#[derive(Default)]
struct Emitter {
  asm: String,
  /// Shared by every function so labels stay unique across the output.
  next_label: usize,
  /// Values currently on the operand stack.
  depth: usize,
}

impl Emitter {
  fn line(&mut self, text: &str) {
    self.asm.push_str(text);
    self.asm.push('\n');
  }

  fn insn(&mut self, text: impl AsRef<str>) {
    self.asm.push_str(&format!("  {}\n", text.as_ref()));
  }

  fn label(&mut self, name: impl AsRef<str>) {
    self.asm.push_str(&format!("{}:\n", name.as_ref()));
  }

  fn push(&mut self, reg: &str) {
    self.insn(format!("push {reg}"));
    self.depth += 1;
  }

  fn pop(&mut self, reg: &str) -> CompileResult<()> {
    self.depth = self
      .depth
      .checked_sub(1)
      .ok_or_else(|| CompileError::internal(format!("pop into {reg} from an empty operand stack")))?;
    self.insn(format!("pop {reg}"));
    Ok(())
  }

  fn fresh_label(&mut self) -> usize {
    let id = self.next_label;
    self.next_label += 1;
    trace!("allocated label id {id}");
    id
  }

  fn function(&mut self, func: &Function) -> CompileResult<()> {
    debug!("generating {} ({} bytes of frame)", func.name, func.frame_size);
    self.depth = 0;

    self.line(&format!(".globl {}", func.name));
    self.label(&func.name);
    for reg in CALLEE_SAVED {
      self.insn(format!("push {reg}"));
    }
    self.insn("push %rbp");
    self.insn("mov %rsp, %rbp");
    if func.frame_size > 0 {
      self.insn(format!("sub ${}, %rsp", func.frame_size));
    }

    for (param, reg) in func.params.iter().zip(ARG_REGS) {
      self.insn(format!("mov {reg}, -{}(%rbp)", param.offset));
    }

    for stmt in &func.body {
      self.stmt(stmt, func)?;
    }

    // Falling off the end returns 0.
    self.insn("mov $0, %rax");
    self.label(format!(".L.return.{}", func.name));
    self.insn("mov %rbp, %rsp");
    self.insn("pop %rbp");
    for reg in CALLEE_SAVED.iter().rev() {
      self.insn(format!("pop {reg}"));
    }
    self.insn("ret");
    Ok(())
  }

  fn stmt(&mut self, stmt: &Stmt, func: &Function) -> CompileResult<()> {
    let depth = self.depth;
    match stmt {
      Stmt::Expr(expr) => {
        self.expr(expr, func)?;
        self.pop("%rax")?;
      }
      Stmt::Assign { target, value } => {
        self.addr(*target, func)?;
        self.expr(value, func)?;
        self.pop("%rdi")?;
        self.pop("%rax")?;
        self.insn("mov %rdi, (%rax)");
      }
      Stmt::Return(expr) => {
        self.expr(expr, func)?;
        self.pop("%rax")?;
        self.insn(format!("jmp .L.return.{}", func.name));
      }
      Stmt::Block(stmts) => {
        for stmt in stmts {
          self.stmt(stmt, func)?;
        }
      }
      Stmt::If {
        init,
        cond,
        then,
        els,
      } => {
        let id = self.fresh_label();
        if let Some(init) = init {
          self.stmt(init, func)?;
        }
        self.expr(cond, func)?;
        self.pop("%rax")?;
        self.insn("cmp $0, %rax");
        self.insn(format!("je .L.else.{id}"));
        for stmt in then {
          self.stmt(stmt, func)?;
        }
        self.insn(format!("jmp .L.end.{id}"));
        self.label(format!(".L.else.{id}"));
        if let Some(els) = els {
          self.stmt(els, func)?;
        }
        self.label(format!(".L.end.{id}"));
      }
      Stmt::For {
        init,
        cond,
        post,
        body,
      } => {
        let id = self.fresh_label();
        if let Some(init) = init {
          self.stmt(init, func)?;
        }
        self.label(format!(".L.begin.{id}"));
        if let Some(cond) = cond {
          self.expr(cond, func)?;
          self.pop("%rax")?;
          self.insn("cmp $0, %rax");
          self.insn(format!("je .L.end.{id}"));
        }
        for stmt in body {
          self.stmt(stmt, func)?;
        }
        if let Some(post) = post {
          self.stmt(post, func)?;
        }
        self.insn(format!("jmp .L.begin.{id}"));
        self.label(format!(".L.end.{id}"));
      }
    }

    if self.depth != depth {
      return Err(CompileError::internal(format!(
        "statement in {} left the operand stack at depth {} instead of {depth}",
        func.name, self.depth
      )));
    }
    Ok(())
  }

  /// Emit stack-based code for a single expression node.
  fn expr(&mut self, expr: &Expr, func: &Function) -> CompileResult<()> {
    match expr {
      Expr::Num(value) => {
        self.insn(format!("mov ${value}, %rax"));
        self.push("%rax");
      }
      Expr::Var(id) => {
        self.addr(*id, func)?;
        self.pop("%rax")?;
        self.insn("mov (%rax), %rax");
        self.push("%rax");
      }
      Expr::Binary { op, lhs, rhs } => {
        self.expr(lhs, func)?;
        self.expr(rhs, func)?;
        self.pop("%rdi")?;
        self.pop("%rax")?;
        match op {
          BinaryOp::Add => self.insn("add %rdi, %rax"),
          BinaryOp::Sub => self.insn("sub %rdi, %rax"),
          BinaryOp::Mul => self.insn("imul %rdi, %rax"),
          BinaryOp::Div => {
            self.insn("cqo");
            self.insn("idiv %rdi");
          }
          BinaryOp::Eq => self.compare("sete"),
          BinaryOp::Ne => self.compare("setne"),
          BinaryOp::Lt => self.compare("setl"),
          BinaryOp::Le => self.compare("setle"),
        }
        self.push("%rax");
      }
      Expr::Call { name, args } => {
        if args.len() > ARG_REGS.len() {
          return Err(CompileError::internal(format!(
            "call to {name} with {} arguments reached code generation",
            args.len()
          )));
        }
        for arg in args {
          self.expr(arg, func)?;
        }
        for reg in ARG_REGS[..args.len()].iter().rev() {
          self.pop(reg)?;
        }

        // Return address, saved registers, %rbp and the operand stack sit
        // above a 16-byte boundary; the frame itself is a multiple of 16.
        let pad = (1 + CALLEE_SAVED.len() + 1 + self.depth) % 2 == 1;
        if pad {
          self.insn("sub $8, %rsp");
        }
        self.insn("mov $0, %rax");
        self.insn(format!("call {name}"));
        if pad {
          self.insn("add $8, %rsp");
        }
        self.push("%rax");
      }
    }
    Ok(())
  }

  fn compare(&mut self, set: &str) {
    self.insn("cmp %rdi, %rax");
    self.insn(format!("{set} %al"));
    self.insn("movzbl %al, %eax");
  }

  /// Push the address of a variable's frame slot.
  fn addr(&mut self, id: VarId, func: &Function) -> CompileResult<()> {
    let var = func.variable(id).ok_or_else(|| {
      CompileError::internal(format!(
        "variable #{} is not part of the frame of {}",
        id.0, func.name
      ))
    })?;
    self.insn(format!("lea -{}(%rbp), %rax", var.offset));
    self.push("%rax");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ast::Variable;
  use crate::parser::parse;
  use crate::tokenizer::tokenize;
  use crate::ty::Type;
  use pretty_assertions::assert_eq;

  fn compile(source: &str) -> String {
    let result = tokenize(source)
      .and_then(|tokens| parse(tokens, source))
      .and_then(|program| generate(&program));
    match result {
      Ok(asm) => asm,
      Err(err) => panic!("unexpected error:\n{err}"),
    }
  }

  fn count(asm: &str, prefix: &str) -> usize {
    asm.lines().filter(|l| l.trim_start().starts_with(prefix)).count()
  }

  fn function(body: Vec<Stmt>) -> Function {
    Function {
      name: "f".to_string(),
      params: vec![],
      locals: vec![Variable {
        name: "x".to_string(),
        ty: Type::Int,
        offset: 8,
      }],
      body,
      frame_size: 16,
    }
  }

  #[test]
  fn emits_prologue_params_and_epilogue() {
    let asm = compile("func add(a int, b int) int { return a + b; };\n");
    let expected = "\
.att_syntax prefix
.text
.globl add
add:
  push %rbx
  push %r12
  push %r13
  push %r14
  push %r15
  push %rbp
  mov %rsp, %rbp
  sub $16, %rsp
  mov %rdi, -8(%rbp)
  mov %rsi, -16(%rbp)
  lea -8(%rbp), %rax
  push %rax
  pop %rax
  mov (%rax), %rax
  push %rax
  lea -16(%rbp), %rax
  push %rax
  pop %rax
  mov (%rax), %rax
  push %rax
  pop %rdi
  pop %rax
  add %rdi, %rax
  push %rax
  pop %rax
  jmp .L.return.add
  mov $0, %rax
.L.return.add:
  mov %rbp, %rsp
  pop %rbp
  pop %r15
  pop %r14
  pop %r13
  pop %r12
  pop %rbx
  ret
";
    assert_eq!(asm, expected);
  }

  #[test]
  fn pushes_and_pops_balance_in_every_function() {
    let asm = compile(
      "func f(a int) int {\n\
       var i int = 0\n\
       for i = 0; i < a; i = i + 1 {\n\
         if i == 3 { return i } else if i > 4 { g(i, 2) } else { i / 2 }\n\
       }\n\
       return -i\n\
       }\n",
    );
    assert_eq!(count(&asm, "push "), count(&asm, "pop "));
  }

  #[test]
  fn greater_than_compiles_like_swapped_less_than() {
    let gt = compile("func f(a int, b int) int { return a > b; };\n");
    let lt = compile("func f(a int, b int) int { return b < a; };\n");
    assert_eq!(gt, lt);
  }

  #[test]
  fn labels_are_unique_across_functions() {
    let asm = compile(
      "func f() { if 1 { }; };\nfunc g() { for 0 { }; if 1 { }; };\n",
    );
    for label in [".L.else.0:", ".L.end.0:", ".L.begin.1:", ".L.end.1:", ".L.else.2:", ".L.end.2:"] {
      assert_eq!(count(&asm, label), 1, "{label}");
    }
  }

  #[test]
  fn call_pops_arguments_into_registers_in_order() {
    let asm = compile("func main() int { return f(1, 2, 3); };\n");
    let pops: Vec<_> = asm
      .lines()
      .map(str::trim)
      .skip_while(|l| *l != "mov $3, %rax")
      .filter(|l| l.starts_with("pop "))
      .take(3)
      .collect();
    assert_eq!(pops, vec!["pop %rdx", "pop %rsi", "pop %rdi"]);
  }

  #[test]
  fn call_keeps_stack_aligned() {
    // Nothing on the operand stack: seven saved quadwords need one pad.
    let asm = compile("func main() int { return f(); };\n");
    assert!(asm.contains("  sub $8, %rsp\n  mov $0, %rax\n  call f\n  add $8, %rsp\n"));

    // One pending operand (the left side of `+`) restores alignment.
    let asm = compile("func main() int { return 1 + f(); };\n");
    assert!(asm.contains("  mov $0, %rax\n  call f\n  push %rax\n"));
    assert!(!asm.contains("sub $8, %rsp"));
  }

  #[test]
  fn division_and_comparison_idioms() {
    let asm = compile("func f(a int, b int) int { return a / b <= a; };\n");
    assert!(asm.contains("  cqo\n  idiv %rdi\n"));
    assert!(asm.contains("  cmp %rdi, %rax\n  setle %al\n  movzbl %al, %eax\n"));
  }

  #[test]
  fn rejects_variables_outside_the_frame() {
    let func = function(vec![Stmt::Return(Expr::Var(VarId(3)))]);
    let err = generate(&Program {
      functions: vec![func],
    })
    .unwrap_err();
    assert_eq!(err.kind(), None);
    assert!(err.to_string().starts_with("internal error: variable #3"));
  }

  #[test]
  fn rejects_oversized_calls() {
    let call = Expr::Call {
      name: "g".to_string(),
      args: (0..7).map(Expr::Num).collect(),
    };
    let func = function(vec![Stmt::Expr(call)]);
    let err = generate(&Program {
      functions: vec![func],
    })
    .unwrap_err();
    assert_eq!(err.kind(), None);
  }
}
