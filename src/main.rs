use std::fs;
use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};
use log::info;

use gocmp::{CompileResult, generate_assembly, parser, tokenizer, with_trailing_newline};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
  Asm,
  Tokens,
  Ast,
}

/// Compile a tiny Go-like language into x86-64 assembly.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
  /// Program text to compile.
  #[arg(required_unless_present = "file", conflicts_with = "file")]
  source: Option<String>,

  /// Read the program from a file instead.
  #[arg(short, long)]
  file: Option<PathBuf>,

  /// Write the output here instead of stdout.
  #[arg(short, long)]
  output: Option<PathBuf>,

  /// What to produce.
  #[arg(long, value_enum, default_value_t = Emit::Asm)]
  emit: Emit,
}

fn render(source: &str, emit: Emit) -> CompileResult<String> {
  match emit {
    Emit::Asm => generate_assembly(source),
    Emit::Tokens => {
      let source = with_trailing_newline(source);
      let tokens = tokenizer::tokenize(&source)?;
      Ok(
        tokens
          .iter()
          .map(|t| format!("{}:{}\t{:?}\t{:?}\n", t.line, t.column, t.kind, t.text))
          .collect(),
      )
    }
    Emit::Ast => {
      let source = with_trailing_newline(source);
      let program = parser::parse(tokenizer::tokenize(&source)?, &source)?;
      Ok(format!("{program:#?}\n"))
    }
  }
}

fn main() {
  env_logger::init();
  let args = Args::parse();

  let source = match &args.file {
    Some(path) => match fs::read_to_string(path) {
      Ok(source) => source,
      Err(err) => {
        eprintln!("error: could not read {}: {err}", path.display());
        process::exit(1);
      }
    },
    None => args.source.clone().unwrap_or_default(),
  };

  let output = match render(&source, args.emit) {
    Ok(output) => output,
    Err(err) => {
      eprintln!("{err}");
      process::exit(1);
    }
  };

  match &args.output {
    Some(path) => {
      if let Err(err) = fs::write(path, &output) {
        eprintln!("error: could not write {}: {err}", path.display());
        process::exit(1);
      }
      info!("wrote {} bytes to {}", output.len(), path.display());
    }
    None => print!("{output}"),
  }
}
