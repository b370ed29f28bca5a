//! Lexical analysis: turns the raw input string into a vector of tokens.
//!
//! Besides recognising keywords, identifiers, numbers and punctuators, the
//! tokenizer infers statement boundaries: a line break that follows a token
//! able to end a statement produces a synthetic `;`, so programs may be
//! written one statement per line without explicit terminators.

use log::{debug, trace};

use crate::error::{CompileError, CompileResult};

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  /// Keywords and punctuators.
  Reserved,
  Ident,
  Num,
  Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
  pub kind: TokenKind,
  pub text: String,
  pub line: usize,
  pub column: usize,
}

impl Token {
  pub fn new(kind: TokenKind, text: impl Into<String>, line: usize, column: usize) -> Self {
    Self {
      kind,
      text: text.into(),
      line,
      column,
    }
  }

  /// Whether a line break right after this token terminates the statement.
  fn ends_statement(&self) -> bool {
    match self.kind {
      TokenKind::Num | TokenKind::Ident => true,
      TokenKind::Reserved => matches!(self.text.as_str(), ")" | "]" | "}" | "return"),
      TokenKind::Eof => false,
    }
  }
}

const KEYWORDS: [&str; 6] = ["return", "if", "else", "for", "func", "var"];

const TWO_CHAR_PUNCTUATORS: [&str; 4] = ["==", "!=", "<=", ">="];

fn is_ident_start(c: u8) -> bool {
  c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_body(c: u8) -> bool {
  c.is_ascii_alphanumeric() || c == b'_'
}

/// Lex the input into a flat vector of tokens terminated by an `Eof` marker.
///
/// The input is expected to end with a line break; otherwise the last line
/// gets no inferred `;`.
pub fn tokenize(input: &str) -> CompileResult<Vec<Token>> {
  let mut tokens: Vec<Token> = Vec::new();
  let bytes = input.as_bytes();
  let mut i = 0;
  let mut line = 1;
  let mut column = 1;

  while i < bytes.len() {
    let c = bytes[i];

    if matches!(c, b' ' | b'\t' | b'\r') {
      i += 1;
      column += 1;
      continue;
    }

    if c == b'\n' {
      if let Some(last) = tokens.last()
        && last.line == line
        && last.ends_statement()
      {
        trace!("inserting ';' at {line}:{column} after {:?}", last.text);
        tokens.push(Token::new(TokenKind::Reserved, ";", line, column));
      }
      i += 1;
      line += 1;
      column = 1;
      continue;
    }

    if input[i..].starts_with("//") {
      while i < bytes.len() && bytes[i] != b'\n' {
        i += 1;
        column += 1;
      }
      continue;
    }

    if c.is_ascii_digit() {
      let start = i;
      while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
      }
      tokens.push(Token::new(TokenKind::Num, &input[start..i], line, column));
      column += i - start;
      continue;
    }

    if is_ident_start(c) {
      let start = i;
      while i < bytes.len() && is_ident_body(bytes[i]) {
        i += 1;
      }
      let text = &input[start..i];
      let kind = if KEYWORDS.contains(&text) {
        TokenKind::Reserved
      } else {
        TokenKind::Ident
      };
      tokens.push(Token::new(kind, text, line, column));
      column += i - start;
      continue;
    }

    if let Some(op) = TWO_CHAR_PUNCTUATORS
      .into_iter()
      .find(|op| input[i..].starts_with(op))
    {
      tokens.push(Token::new(TokenKind::Reserved, op, line, column));
      i += op.len();
      column += op.len();
      continue;
    }

    if c.is_ascii_punctuation() {
      tokens.push(Token::new(
        TokenKind::Reserved,
        &input[i..i + 1],
        line,
        column,
      ));
      i += 1;
      column += 1;
      continue;
    }

    let invalid_char = input[i..].chars().next().unwrap_or('\0');
    return Err(CompileError::lexical(
      input,
      line,
      column,
      format!("invalid character {invalid_char:?}"),
    ));
  }

  tokens.push(Token::new(TokenKind::Eof, "", line, column));
  debug!("tokenized {} tokens over {line} lines", tokens.len());
  Ok(tokens)
}

/// Human-friendly description used in diagnostics.
pub fn describe_token(token: &Token) -> String {
  match token.kind {
    TokenKind::Eof => "end of input".to_string(),
    _ => format!("\"{}\"", token.text),
  }
}
