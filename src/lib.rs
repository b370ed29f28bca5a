//! Crate root: wires together the compilation pipeline.
//!
//! The stages are intentionally small and composable so they can be evolved
//! independently:
//! - `tokenizer` performs lexical analysis, inferring `;` at line breaks.
//! - `parser` owns all syntactic knowledge, resolves scopes and lays out frames.
//! - `ast` holds the tree handed from the parser to the code generator.
//! - `codegen` lowers the parsed functions into x86-64 AT&T assembly.
//! - `error` centralises reporting utilities shared by the other modules.

pub mod ast;
pub mod error;
pub mod parser;
pub mod tokenizer;
pub mod ty;

mod codegen;

use std::borrow::Cow;

pub use error::{CompileError, CompileResult, ErrorKind};

/// Compile a source string into AT&T assembly.
pub fn generate_assembly(source: &str) -> CompileResult<String> {
  let source = with_trailing_newline(source);
  let tokens = tokenizer::tokenize(&source)?;
  let program = parser::parse(tokens, &source)?;
  codegen::generate(&program)
}

/// The last line only gets an inferred `;` if it is terminated.
pub fn with_trailing_newline(source: &str) -> Cow<'_, str> {
  if source.ends_with('\n') {
    Cow::Borrowed(source)
  } else {
    Cow::Owned(format!("{source}\n"))
  }
}
