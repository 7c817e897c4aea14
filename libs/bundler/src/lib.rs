// Copyright 2024-2026 the Tern authors. MIT license.

//! Linker core for the Tern bundler.
//!
//! Input is a parsed, resolved module graph: one [`tern_common::InputFile`]
//! per module (index 0 must be the runtime module from
//! [`runtime::runtime_file`]), the shared symbol table, the entry points,
//! and the set of reachable files. Output is one file per chunk, with
//! content hashes that respect chunk-to-chunk imports.
//!
//! The pipeline runs serial scan phases first (export classification, wrap
//! propagation, `export *` resolution, import matching, binding), then
//! tree shaking, chunk assignment, and the parallel render/hash phases.
//! User-facing failures accumulate in the [`Log`]; when the scan phases
//! log an error the linker returns an empty output set instead of partial
//! files.

mod bind;
mod chunk;
mod code_splitting;
mod cross_chunk;
mod diagnostics;
mod graph;
mod hash;
mod matching;
mod options;
mod output;
mod paths;
mod printer;
mod rename;
mod render;
mod scan;
mod tree_shaking;

pub mod runtime;

pub use diagnostics::Diagnostic;
pub use diagnostics::Log;
pub use diagnostics::MsgKind;
pub use diagnostics::MsgLocation;
pub use diagnostics::Note;
pub use graph::EntryPoint;
pub use graph::EntryPointKind;
pub use options::BundleMode;
pub use options::BundleOptions;
pub use options::LegalCommentsMode;
pub use options::MangleCache;
pub use options::OutputFormat;
pub use options::Platform;
pub use options::SourceMapMode;
pub use output::OutputFile;

use tern_common::InputFile;
use tern_common::SourceIndex;
use tern_common::SymbolTable;
use tern_node_resolver::NodeResolver;

/// A fresh per-build placeholder prefix. Random so rendered placeholders
/// cannot collide with user code, long enough that a collision with string
/// literals is implausible.
pub fn generate_unique_key_prefix() -> String {
  use rand::Rng;
  const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuv";
  let mut rng = rand::thread_rng();
  (0..8)
    .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
    .collect()
}

/// Links a module graph into output files.
///
/// `unique_key_prefix` is a per-build random string; every placeholder the
/// renderer emits starts with it, which is what lets the path substituter
/// find them again without re-parsing the output.
#[allow(clippy::too_many_arguments)]
pub fn link(
  options: &BundleOptions,
  log: &Log,
  _resolver: Option<&NodeResolver>,
  input_files: Vec<InputFile>,
  symbols: SymbolTable,
  entry_points: Vec<EntryPoint>,
  unique_key_prefix: &str,
  reachable_files: Vec<SourceIndex>,
) -> Vec<OutputFile> {
  let mut graph = graph::LinkerGraph::new(input_files, symbols, entry_points, reachable_files);

  // Dynamic-import targets become entry points before anything looks at
  // the entry list, so they get wrappers, exports, and chunks of their own.
  code_splitting::append_dynamic_import_entry_points(&mut graph, options);

  scan::classify_and_wrap(&mut graph, options);
  scan::resolve_exports(&mut graph, options);
  matching::match_imports_with_exports(&mut graph, log, options);
  if log.has_errors() {
    return Vec::new();
  }

  bind::create_namespace_exports(&mut graph, options);
  bind::bind_imports_to_exports(&mut graph, options);
  rename::mangle_props(&mut graph, options);

  tree_shaking::tree_shake(&mut graph, options);
  code_splitting::assign_entry_bits(&mut graph, options);

  let mut chunks = chunk::compute_chunks(&mut graph, options, unique_key_prefix);
  chunk::assign_symbol_chunk_indices(&mut graph, &chunks);

  // Compress every symbol link once; the parallel phases below only read.
  graph.symbols.follow_all();

  cross_chunk::compute_cross_chunk_dependencies(&mut graph, &mut chunks, options);
  if cross_chunk::has_static_chunk_cycle(&chunks) {
    log.add_error(
      None,
      "Internal error: generated cross-chunk imports contain a static cycle",
    );
    return Vec::new();
  }

  render::render_chunks(&graph, &mut chunks, options, log);
  hash::compute_isolated_hashes(&graph, &mut chunks);
  let final_hashes = hash::compute_final_hashes(&chunks);
  paths::apply_final_paths(&mut chunks, &final_hashes);
  let contents = paths::substitute_final_paths(&chunks, options);

  output::finalize_outputs(&graph, &chunks, contents, options)
}
