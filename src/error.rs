//! Shared error utilities used across the compilation pipeline.
//!
//! Every user-facing diagnostic points at a line and column of the source
//! and renders the offending line with a caret under the column, followed by
//! `[line:column]` and the message.

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

/// Which stage of the front-end rejected the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Lexical,
  Syntax,
  Declaration,
}

#[derive(Debug, Snafu)]
pub enum CompileError {
  #[snafu(display("{line_text}\n{marker} [{line}:{column}] {message}"))]
  WithLocation {
    kind: ErrorKind,
    line_text: String,
    marker: String,
    line: usize,
    column: usize,
    message: String,
  },

  /// The code generator met a tree the parser should never have produced.
  #[snafu(display("internal error: {message}"))]
  Internal { message: String },
}

impl CompileError {
  /// Construct an error anchored at a 1-based line and column of `source`.
  pub fn at(
    kind: ErrorKind,
    source: &str,
    line: usize,
    column: usize,
    message: impl Into<String>,
  ) -> Self {
    // A location past the final newline (the EOF token) renders an empty line.
    let line_text = source
      .split('\n')
      .nth(line.saturating_sub(1))
      .unwrap_or("")
      .trim_end_matches('\r')
      .to_string();
    let marker = format!("{}^", " ".repeat(column.saturating_sub(1)));
    Self::WithLocation {
      kind,
      line_text,
      marker,
      line,
      column,
      message: message.into(),
    }
  }

  pub fn lexical(source: &str, line: usize, column: usize, message: impl Into<String>) -> Self {
    Self::at(ErrorKind::Lexical, source, line, column, message)
  }

  pub fn syntax(source: &str, line: usize, column: usize, message: impl Into<String>) -> Self {
    Self::at(ErrorKind::Syntax, source, line, column, message)
  }

  pub fn declaration(source: &str, line: usize, column: usize, message: impl Into<String>) -> Self {
    Self::at(ErrorKind::Declaration, source, line, column, message)
  }

  pub fn internal(message: impl Into<String>) -> Self {
    Self::Internal {
      message: message.into(),
    }
  }

  /// `None` for internal errors, which carry no source position.
  pub fn kind(&self) -> Option<ErrorKind> {
    match self {
      Self::WithLocation { kind, .. } => Some(*kind),
      Self::Internal { .. } => None,
    }
  }

  pub fn location(&self) -> Option<(usize, usize)> {
    match self {
      Self::WithLocation { line, column, .. } => Some((*line, *column)),
      Self::Internal { .. } => None,
    }
  }

  pub fn message(&self) -> &str {
    match self {
      Self::WithLocation { message, .. } | Self::Internal { message } => message,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn renders_caret_under_column() {
    let source = "func main() {\n  return @\n}\n";
    let err = CompileError::lexical(source, 2, 10, "invalid character '@'");
    assert_eq!(
      err.to_string(),
      "  return @\n         ^ [2:10] invalid character '@'"
    );
    assert_eq!(err.kind(), Some(ErrorKind::Lexical));
    assert_eq!(err.location(), Some((2, 10)));
  }

  #[test]
  fn location_past_last_line_renders_empty_line() {
    let err = CompileError::syntax("x\n", 2, 1, "unexpected end of input");
    assert_eq!(err.to_string(), "\n^ [2:1] unexpected end of input");
  }

  #[test]
  fn internal_errors_have_no_location() {
    let err = CompileError::internal("unbalanced operand stack");
    assert_eq!(err.kind(), None);
    assert_eq!(err.location(), None);
    assert_eq!(err.to_string(), "internal error: unbalanced operand stack");
  }
}
