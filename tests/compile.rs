use std::fs;
use std::process::Command;

use gocmp::{ErrorKind, generate_assembly};
use pretty_assertions::assert_eq;

fn setup_logger() {
  let _ = env_logger::builder().is_test(true).try_init();
}

fn compile(source: &str) -> String {
  match generate_assembly(source) {
    Ok(asm) => asm,
    Err(err) => panic!("unexpected error:\n{err}"),
  }
}

/// Assemble and run `asm`, returning the exit status. `None` when no
/// system C compiler is around to assemble it.
fn run(asm: &str) -> Option<i32> {
  if !cfg!(all(target_os = "linux", target_arch = "x86_64")) {
    return None;
  }
  let dir = tempfile::tempdir().expect("create scratch dir");
  let asm_path = dir.path().join("prog.s");
  let exe_path = dir.path().join("prog");
  fs::write(&asm_path, asm).expect("write assembly");

  let Ok(output) = Command::new("cc")
    .arg("-o")
    .arg(&exe_path)
    .arg(&asm_path)
    .output()
  else {
    return None;
  };
  assert!(
    output.status.success(),
    "cc rejected the assembly:\n{}\n{asm}",
    String::from_utf8_lossy(&output.stderr)
  );

  let status = Command::new(&exe_path).status().expect("run program");
  status.code()
}

fn assert_returns(source: &str, expected: i32) {
  setup_logger();
  let asm = compile(source);
  assert!(asm.contains(".globl main\nmain:\n"));
  if let Some(code) = run(&asm) {
    assert_eq!(code, expected, "{source}");
  }
}

#[test]
fn arithmetic_precedence() {
  assert_returns("func main() int { return 1+2*3; };", 7);
}

#[test]
fn local_variables() {
  assert_returns(
    "func main() int { var x int = 5; var y int = 10; return x+y; };",
    15,
  );
}

#[test]
fn if_else_takes_the_true_branch() {
  assert_returns(
    "func main() int { if 1 < 2 { return 10; } else { return 20; }; };",
    10,
  );
}

#[test]
fn for_loop_accumulates() {
  assert_returns(
    "func main() int { var i int = 0; var s int = 0; for i < 5 { s = s + i; i = i + 1; }; return s; };",
    10,
  );
}

#[test]
fn function_call_with_arguments() {
  assert_returns(
    "func add(a int, b int) int { return a+b; }; func main() int { return add(3,4); };",
    7,
  );
}

#[test]
fn six_arguments_and_recursion() {
  assert_returns(
    "func sum(a int, b int, c int, d int, e int, f int) int {\n\
     return a + b + c + d + e + f\n\
     }\n\
     func fib(n int) int {\n\
     if n <= 1 {\n\
     return n\n\
     }\n\
     return fib(n-1) + fib(n-2)\n\
     }\n\
     func main() int {\n\
     return sum(1, 2, 3, 4, 5, 6) + fib(10) - 60 / 2\n\
     }\n",
    46,
  );
}

#[test]
fn three_clause_for_and_else_if() {
  assert_returns(
    "func classify(n int) int {\n\
     if n < 0 {\n\
     return 0 - 1\n\
     } else if n == 0 {\n\
     return 0\n\
     }\n\
     return 1\n\
     }\n\
     func main() int {\n\
     var total = 0\n\
     var i int\n\
     for i = 0 - 3; i <= 3; i = i + 1 {\n\
     total = total + classify(i) * 10 + 2\n\
     }\n\
     return total\n\
     }\n",
    14,
  );
}

#[test]
fn inner_declaration_shadows_outer_at_runtime() {
  assert_returns(
    "func main() int { var x int = 1; { var x int = 2; x = x + 40; }; return x; };",
    1,
  );
  assert_returns(
    "func main() int { var x int = 1; { x = x + 40; }; return x; };",
    41,
  );
}

#[test]
fn falling_off_the_end_returns_zero() {
  assert_returns("func main() int { var x int = 3; };", 0);
}

#[test]
fn too_many_arguments_is_a_declaration_error() {
  let err = generate_assembly(
    "func f(a int) int { return a; }; func main() int { return f(1,2,3,4,5,6,7); };",
  )
  .unwrap_err();
  assert_eq!(err.kind(), Some(ErrorKind::Declaration));
}

#[test]
fn redeclaration_in_same_block_is_a_declaration_error() {
  let err = generate_assembly("func main() int { var x int; var x int; return 0; };").unwrap_err();
  assert_eq!(err.kind(), Some(ErrorKind::Declaration));
}

#[test]
fn diagnostics_point_at_the_offending_token() {
  let err = generate_assembly("func main() int {\n  return y\n}").unwrap_err();
  assert_eq!(
    err.to_string(),
    "  return y\n         ^ [2:10] undefined variable y"
  );

  let err = generate_assembly("func main() int {\n\treturn 1 ☃ 2\n}\n").unwrap_err();
  assert_eq!(err.kind(), Some(ErrorKind::Lexical));
  assert_eq!(
    err.to_string(),
    "\treturn 1 ☃ 2\n          ^ [2:11] invalid character '☃'"
  );
}

#[test]
fn no_output_is_produced_on_error() {
  // The first function is fine, the second is not: nothing comes back.
  let result = generate_assembly("func ok() int { return 1; };\nfunc bad() int { return (; };\n");
  let err = result.unwrap_err();
  assert_eq!(err.kind(), Some(ErrorKind::Syntax));
  assert_eq!(err.location(), Some((2, 26)));
}

#[test]
fn one_statement_per_line_matches_explicit_semicolons() {
  let implicit = compile(
    "func main() int {\n  var i int = 0\n  for i < 3 {\n    i = i + 1\n  }\n  return i\n}\n",
  );
  let explicit = compile(
    "func main() int { var i int = 0; for i < 3 { i = i + 1; }; return i; };",
  );
  assert_eq!(implicit, explicit);
}

#[test]
fn missing_trailing_newline_still_ends_the_program() {
  let with = compile("func main() int { return 0 }\n");
  let without = compile("func main() int { return 0 }");
  assert_eq!(with, without);
}

#[test]
fn whitespace_does_not_change_the_output() {
  let dense = compile("func main() int{var a int=2;return a*(a+1)>=6;};");
  let loose = compile("func  main ( )\tint {  var a  int = 2 ;  return a * ( a + 1 ) >= 6 ; } ;");
  assert_eq!(dense, loose);
}
