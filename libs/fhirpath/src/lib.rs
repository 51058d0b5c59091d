//! A small FHIRPath subset: enough to compile and evaluate the expressions that
//! appear in `ElementDefinition.constraint.expression` and slicing discriminator
//! paths.
//!
//! This is deliberately not a complete FHIRPath implementation — no units, no
//! date arithmetic, no `aggregate()`/`repeat()`, no externally-resolvable
//! `resolve()`. It covers path navigation, boolean/comparison operators, and the
//! handful of collection functions (`where`, `exists`, `empty`, `all`, `not`,
//! `count`, `first`, `ofType`, `extension`) that invariants and discriminators
//! actually use in practice.

mod ast;
mod context;
mod engine;
mod error;
mod functions;
mod lexer;
mod parser;
mod value;

pub use context::Context;
pub use engine::{CompileOptions, Engine, EvalOptions, Plan};
pub use error::{Error, Result};
pub use value::Collection;
