//! ash - a small POSIX-flavoured command interpreter
//!
//! This crate provides:
//! - A lexer and structural parser producing a typed script tree
//! - An async evaluator with pipelines, background jobs, traps and signals
//! - Around thirty builtins plus host-registered builtins for embedding
//! - [`run`], the command-line entry point used by the `ash` binary

pub mod ast;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod run;
pub mod shell;

pub use error::{AshError, AshResult};
pub use eval::{Builtin, BuiltinFn, ExecContext, Input, Output};
pub use parser::parse;
pub use run::{dump_ast, run, run_with};
pub use shell::{CapturedOutput, Shell, ShellBuilder, ShellOptions};
