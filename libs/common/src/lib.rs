// Copyright 2024-2026 the Tern authors. MIT license.

//! Shared data model for the Tern bundler.
//!
//! Everything the linker reads was produced by the scan phase: files hold an
//! already-parsed AST, a table of named imports and exports, and a list of
//! import records. The linker never re-parses sources; it only mutates the
//! symbol table and the per-part metadata defined here.

mod ast;
mod bitset;
mod ids;
mod symbols;

pub use ast::*;
pub use bitset::BitSet;
pub use ids::*;
pub use symbols::*;
