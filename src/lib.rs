//! Puppy: a Python-like teaching language compiled to generator-function
//! source text for an embedded physics runtime.
//!
//! The pipeline is `lexer` → `parser` → `transpiler`, driven by
//! [`compiler::compile`], which returns a [`compiler::PuppyCode`] artifact
//! carrying the generated routine together with every diagnostic raised
//! along the way.

pub mod compiler;
pub mod env;
pub mod lexer;
pub mod messages;
pub mod parser;
pub mod symbols;
pub mod transpiler;
pub mod tree;
pub mod types;
