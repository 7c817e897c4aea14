// Copyright 2024-2026 the Tern authors. MIT license.

//! Chunk planning: one chunk per distinct entry-bits key, an in-chunk file
//! and part order that keeps wrapped files contiguous and the runtime
//! first, and an output path template per chunk with the `[hash]`
//! placeholder left for the hasher.

use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;
use tern_common::BitSet;
use tern_common::ChunkIndex;
use tern_common::ImportKind;
use tern_common::SourceIndex;
use tern_common::SymbolRef;
use tern_common::RUNTIME_SOURCE_INDEX;

use crate::graph::LinkerGraph;
use crate::graph::WrapKind;
use crate::options::BundleOptions;

/// Consecutive live parts of one file, printed as a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartRange {
  pub source: SourceIndex,
  pub part_begin: u32,
  pub part_end: u32,
}

#[derive(Debug, Clone)]
pub struct CrossChunkImportItem {
  pub export_alias: String,
  pub import_ref: SymbolRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossChunkImport {
  pub chunk_index: ChunkIndex,
  pub import_kind: ImportKind,
}

#[derive(Debug, Clone)]
pub struct ExternalCssImport {
  pub path: String,
  pub conditions: Vec<String>,
}

#[derive(Debug)]
pub enum ChunkRepr {
  Js {
    files_in_chunk_order: Vec<SourceIndex>,
    part_ranges: Vec<PartRange>,
    /// chunk index -> items imported from it, filled by cross-chunk
    /// analysis; keys iterate in ascending chunk order.
    imports_from_other_chunks: Vec<(ChunkIndex, Vec<CrossChunkImportItem>)>,
    exports_to_other_chunks: FxHashMap<SymbolRef, String>,
  },
  Css {
    files_in_chunk_order: Vec<SourceIndex>,
    external_imports: Vec<ExternalCssImport>,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceKind {
  None,
  Asset,
  Chunk,
}

/// A span of rendered output between placeholder references, plus the
/// placeholder that follows it (if any).
#[derive(Debug, Clone)]
pub struct OutputPiece {
  pub data: Vec<u8>,
  pub index: u32,
  pub kind: PieceKind,
}

#[derive(Debug, Default)]
pub enum IntermediateOutput {
  #[default]
  Empty,
  Joined(Vec<u8>),
  Pieces(Vec<OutputPiece>),
}

#[derive(Debug, Default, Clone)]
pub struct SourceMapPieces {
  pub prefix: Vec<u8>,
  pub mappings: Vec<u8>,
  pub suffix: Vec<u8>,
}

#[derive(Debug)]
pub struct Chunk {
  pub unique_key: String,
  pub entry_bits: BitSet,
  pub files_with_parts_in_chunk: FxHashSet<SourceIndex>,
  pub cross_chunk_imports: Vec<CrossChunkImport>,
  pub repr: ChunkRepr,
  /// Path with `[hash]` still unsubstituted.
  pub final_template: String,
  pub final_rel_path: String,
  pub is_entry_point: bool,
  pub source_index: Option<SourceIndex>,
  pub entry_point_bit: Option<u32>,
  pub intermediate_output: IntermediateOutput,
  pub output_source_map: SourceMapPieces,
  pub isolated_hash: u64,
}

pub(crate) fn compute_chunks(
  graph: &mut LinkerGraph,
  options: &BundleOptions,
  unique_key_prefix: &str,
) -> Vec<Chunk> {
  let mut chunks: Vec<Chunk> = Vec::new();
  let mut js_chunk_for_bits: FxHashMap<BitSet, usize> = FxHashMap::default();

  // Entry chunks first, in entry order, so chunk indices are stable.
  for (bit, entry) in graph.entry_points.clone().iter().enumerate() {
    let source = entry.source;
    let is_css_entry = graph.files[source.idx()].loader.is_css();
    let bits = graph.meta[source.idx()].entry_bits.clone();
    let template = entry_template(graph, options, entry, is_css_entry);

    let (repr, files) = if is_css_entry {
      let (order, externals) = find_imported_files_in_css_order(graph, &[source]);
      let files: FxHashSet<SourceIndex> = order.iter().copied().collect();
      (
        ChunkRepr::Css {
          files_in_chunk_order: order,
          external_imports: externals,
        },
        files,
      )
    } else {
      let files = js_files_for_chunk(graph, &bits, bit as u32, options);
      let (order, ranges) = find_imported_parts_in_js_order(graph, &files, &bits);
      (
        ChunkRepr::Js {
          files_in_chunk_order: order,
          part_ranges: ranges,
          imports_from_other_chunks: Vec::new(),
          exports_to_other_chunks: FxHashMap::default(),
        },
        files,
      )
    };

    let index = chunks.len();
    js_chunk_for_bits.insert(bits.clone(), index);
    chunks.push(Chunk {
      unique_key: String::new(),
      entry_bits: bits,
      files_with_parts_in_chunk: files,
      cross_chunk_imports: Vec::new(),
      repr,
      final_template: template,
      final_rel_path: String::new(),
      is_entry_point: true,
      source_index: Some(source),
      entry_point_bit: Some(bit as u32),
      intermediate_output: IntermediateOutput::Empty,
      output_source_map: SourceMapPieces::default(),
      isolated_hash: 0,
    });
  }

  // Shared chunks for every other live bit pattern, only when splitting.
  if options.code_splitting {
    let mut patterns: Vec<(BitSet, SourceIndex)> = Vec::new();
    for i in 0..graph.reachable_files.len() {
      let source = graph.reachable_files[i];
      if !graph.meta[source.idx()].is_live || graph.js_ast(source).is_none() {
        continue;
      }
      let bits = graph.meta[source.idx()].entry_bits.clone();
      if bits.is_empty() || js_chunk_for_bits.contains_key(&bits) {
        continue;
      }
      if !patterns.iter().any(|(b, _)| *b == bits) {
        patterns.push((bits, source));
      }
    }
    for (bits, _) in patterns {
      let files = collect_files_with_bits(graph, &bits);
      let (order, ranges) = find_imported_parts_in_js_order(graph, &files, &bits);
      let template = substitute_template(
        &options.chunk_path_template,
        ".",
        "chunk",
        "js",
      );
      let index = chunks.len();
      js_chunk_for_bits.insert(bits.clone(), index);
      chunks.push(Chunk {
        unique_key: String::new(),
        entry_bits: bits,
        files_with_parts_in_chunk: files,
        cross_chunk_imports: Vec::new(),
        repr: ChunkRepr::Js {
          files_in_chunk_order: order,
          part_ranges: ranges,
          imports_from_other_chunks: Vec::new(),
          exports_to_other_chunks: FxHashMap::default(),
        },
        final_template: template,
        final_rel_path: String::new(),
        is_entry_point: false,
        source_index: None,
        entry_point_bit: None,
        intermediate_output: IntermediateOutput::Empty,
        output_source_map: SourceMapPieces::default(),
        isolated_hash: 0,
      });
    }
  }

  // A JS entry with reachable CSS gets a sibling CSS chunk.
  for (bit, entry) in graph.entry_points.clone().iter().enumerate() {
    let source = entry.source;
    if graph.files[source.idx()].loader.is_css() {
      continue;
    }
    let css_roots = find_imported_css_files_in_js_order(graph, source);
    if css_roots.is_empty() {
      continue;
    }
    let (order, externals) = find_imported_files_in_css_order(graph, &css_roots);
    let files: FxHashSet<SourceIndex> = order.iter().copied().collect();
    let template = entry_template(graph, options, entry, true);
    chunks.push(Chunk {
      unique_key: String::new(),
      entry_bits: graph.meta[source.idx()].entry_bits.clone(),
      files_with_parts_in_chunk: files,
      cross_chunk_imports: Vec::new(),
      repr: ChunkRepr::Css {
        files_in_chunk_order: order,
        external_imports: externals,
      },
      final_template: template,
      final_rel_path: String::new(),
      is_entry_point: true,
      source_index: Some(source),
      entry_point_bit: Some(bit as u32),
      intermediate_output: IntermediateOutput::Empty,
      output_source_map: SourceMapPieces::default(),
      isolated_hash: 0,
    });
  }

  for (index, chunk) in chunks.iter_mut().enumerate() {
    chunk.unique_key = format!("{}C{:08}", unique_key_prefix, index);
  }
  chunks
}

fn collect_files_with_bits(graph: &LinkerGraph, bits: &BitSet) -> FxHashSet<SourceIndex> {
  let mut files = FxHashSet::default();
  for &source in &graph.reachable_files {
    if graph.meta[source.idx()].is_live
      && graph.js_ast(source).is_some()
      && graph.meta[source.idx()].entry_bits == *bits
    {
      files.insert(source);
    }
  }
  files
}

/// Files rendered into the chunk for entry `bit`. With splitting the match
/// is exact bit equality; without it, every live file the entry reaches is
/// duplicated into the entry's own chunk.
fn js_files_for_chunk(
  graph: &LinkerGraph,
  bits: &BitSet,
  bit: u32,
  options: &BundleOptions,
) -> FxHashSet<SourceIndex> {
  let mut files = FxHashSet::default();
  for &source in &graph.reachable_files {
    let meta = &graph.meta[source.idx()];
    if !meta.is_live || graph.js_ast(source).is_none() {
      continue;
    }
    let included = if options.code_splitting {
      meta.entry_bits == *bits
    } else {
      meta.entry_bits.has_bit(bit)
    };
    if included {
      files.insert(source);
    }
  }
  files
}

/// Postorder DFS linearization of a chunk's live parts.
///
/// Wrapped files and the runtime cannot interleave with other files' parts:
/// their ranges accumulate into a prefix list so the helpers and wrapper
/// bodies precede user code.
fn find_imported_parts_in_js_order(
  graph: &LinkerGraph,
  chunk_files: &FxHashSet<SourceIndex>,
  _bits: &BitSet,
) -> (Vec<SourceIndex>, Vec<PartRange>) {
  struct Visitor<'a> {
    graph: &'a LinkerGraph,
    chunk_files: &'a FxHashSet<SourceIndex>,
    visited: FxHashSet<SourceIndex>,
    files_in_order: Vec<SourceIndex>,
    prefix_ranges: Vec<PartRange>,
    ranges: Vec<PartRange>,
  }

  impl Visitor<'_> {
    fn visit(&mut self, source: SourceIndex) {
      if !self.visited.insert(source) {
        return;
      }
      let Some(ast) = self.graph.js_ast(source) else {
        return;
      };
      let in_chunk = self.chunk_files.contains(&source);
      let contiguous = source == RUNTIME_SOURCE_INDEX
        || self.graph.meta[source.idx()].wrap != WrapKind::None;

      if contiguous {
        // Dependencies first, then every live part as one block.
        for part in &ast.parts {
          if !part.is_live {
            continue;
          }
          for ri in &part.import_record_indices {
            let record = &ast.import_records[ri.idx()];
            if record.kind == ImportKind::Stmt || record.kind == ImportKind::Require {
              if let Some(target) = record.source_index {
                self.visit(target);
              }
            }
          }
        }
        if in_chunk {
          self.files_in_order.push(source);
          push_live_ranges(ast, source, &mut self.prefix_ranges);
        }
        return;
      }

      let mut emitted = false;
      for (index, part) in ast.parts.iter().enumerate() {
        for ri in &part.import_record_indices {
          let record = &ast.import_records[ri.idx()];
          let follow = record.kind == ImportKind::Stmt || part.is_live;
          if follow && record.kind != ImportKind::Dynamic {
            if let Some(target) = record.source_index {
              self.visit(target);
            }
          }
        }
        if part.is_live && in_chunk {
          push_range(
            &mut self.ranges,
            PartRange {
              source,
              part_begin: index as u32,
              part_end: index as u32 + 1,
            },
          );
          emitted = true;
        }
      }
      if emitted {
        self.files_in_order.push(source);
      }
    }
  }

  let mut sorted: Vec<SourceIndex> = chunk_files.iter().copied().collect();
  sorted.sort_by_key(|s| (graph.meta[s.idx()].distance_from_entry_point, s.0));

  let mut visitor = Visitor {
    graph,
    chunk_files,
    visited: FxHashSet::default(),
    files_in_order: Vec::new(),
    prefix_ranges: Vec::new(),
    ranges: Vec::new(),
  };
  visitor.visit(RUNTIME_SOURCE_INDEX);
  for source in sorted {
    visitor.visit(source);
  }

  let mut part_ranges = visitor.prefix_ranges;
  part_ranges.append(&mut visitor.ranges);
  (visitor.files_in_order, part_ranges)
}

fn push_live_ranges(ast: &tern_common::JsAst, source: SourceIndex, out: &mut Vec<PartRange>) {
  for (index, part) in ast.parts.iter().enumerate() {
    if part.is_live {
      push_range(
        out,
        PartRange {
          source,
          part_begin: index as u32,
          part_end: index as u32 + 1,
        },
      );
    }
  }
}

fn push_range(ranges: &mut Vec<PartRange>, range: PartRange) {
  if let Some(last) = ranges.last_mut() {
    if last.source == range.source && last.part_end == range.part_begin {
      last.part_end = range.part_end;
      return;
    }
  }
  ranges.push(range);
}

/// CSS files reachable from a JS entry, in the order their importing JS
/// runs: dependencies' CSS first, each file's own CSS after.
pub(crate) fn find_imported_css_files_in_js_order(
  graph: &LinkerGraph,
  entry: SourceIndex,
) -> Vec<SourceIndex> {
  let mut visited = FxHashSet::default();
  let mut css = Vec::new();
  visit_js_for_css(graph, entry, &mut visited, &mut css);
  css
}

fn visit_js_for_css(
  graph: &LinkerGraph,
  source: SourceIndex,
  visited: &mut FxHashSet<SourceIndex>,
  css: &mut Vec<SourceIndex>,
) {
  if !visited.insert(source) {
    return;
  }
  let Some(ast) = graph.js_ast(source) else {
    // A CSS file imported straight from JS.
    if graph.file_repr(source).as_css().is_some() && !css.contains(&source) {
      css.push(source);
    }
    return;
  };
  let mut own_css = Vec::new();
  for record in &ast.import_records {
    let Some(target) = record.source_index else {
      continue;
    };
    if graph.js_ast(target).is_some() {
      visit_js_for_css(graph, target, visited, css);
    } else if graph.file_repr(target).as_css().is_some() {
      own_css.push(target);
    }
  }
  for target in own_css {
    if !css.contains(&target) {
      css.push(target);
    }
  }
}

/// Expands `@import` trees into a flat file order. A file imported twice
/// keeps only its last occurrence, matching how the cascade would apply it;
/// an unconditional external import masks later conditional duplicates.
pub(crate) fn find_imported_files_in_css_order(
  graph: &LinkerGraph,
  roots: &[SourceIndex],
) -> (Vec<SourceIndex>, Vec<ExternalCssImport>) {
  let mut order: Vec<SourceIndex> = Vec::new();
  let mut externals: Vec<ExternalCssImport> = Vec::new();
  let mut path_stack: Vec<SourceIndex> = Vec::new();

  fn visit(
    graph: &LinkerGraph,
    source: SourceIndex,
    path_stack: &mut Vec<SourceIndex>,
    order: &mut Vec<SourceIndex>,
    externals: &mut Vec<ExternalCssImport>,
  ) {
    if path_stack.contains(&source) {
      return;
    }
    path_stack.push(source);
    if let Some(css) = graph.file_repr(source).as_css() {
      for record in &css.import_records {
        match record.source_index {
          Some(target) if graph.file_repr(target).as_css().is_some() => {
            visit(graph, target, path_stack, order, externals);
          }
          Some(_) => {}
          None => {
            let masked = externals.iter().any(|e| {
              e.path == record.path && e.conditions.is_empty()
            });
            if !masked {
              externals.push(ExternalCssImport {
                path: record.path.clone(),
                conditions: record.css_conditions.clone(),
              });
            }
          }
        }
      }
    }
    path_stack.pop();
    order.push(source);
  }

  for &root in roots {
    visit(graph, root, &mut path_stack, &mut order, &mut externals);
  }

  // Keep the last occurrence of each file.
  let mut seen = FxHashSet::default();
  let mut deduped = Vec::with_capacity(order.len());
  for &source in order.iter().rev() {
    if seen.insert(source) {
      deduped.push(source);
    }
  }
  deduped.reverse();
  (deduped, externals)
}

fn entry_template(
  graph: &LinkerGraph,
  options: &BundleOptions,
  entry: &crate::graph::EntryPoint,
  is_css: bool,
) -> String {
  let ext = if is_css { "css" } else { "js" };
  if let Some(explicit) = &entry.output_path {
    let (dir, name) = split_dir_name(explicit);
    // Explicit paths already carry their extension; swap it for CSS
    // siblings of a JS entry.
    if is_css {
      return substitute_template(&options.entry_path_template, &dir, &name, ext);
    }
    return explicit.clone();
  }
  let rel = path_relative_to_outbase(graph, options, entry.source);
  let (dir, name) = split_dir_name(&rel);
  let template = if entry.kind == crate::graph::EntryPointKind::DynamicImport {
    &options.chunk_path_template
  } else {
    &options.entry_path_template
  };
  substitute_template(template, &dir, &name, ext)
}

fn path_relative_to_outbase(
  graph: &LinkerGraph,
  options: &BundleOptions,
  source: SourceIndex,
) -> String {
  let pretty = &graph.files[source.idx()].pretty_path;
  let mut path = pretty.replace('\\', "/");
  if let Some(base) = &options.abs_output_base {
    let base = base.to_string_lossy().replace('\\', "/");
    if let Some(stripped) = path.strip_prefix(&format!("{}/", base.trim_end_matches('/'))) {
      path = stripped.to_string();
    }
  }
  path.trim_start_matches("./").to_string()
}

fn split_dir_name(path: &str) -> (String, String) {
  let normalized = path.replace('\\', "/");
  let (dir, base) = match normalized.rfind('/') {
    Some(index) => (&normalized[..index], &normalized[index + 1..]),
    None => (".", normalized.as_str()),
  };
  let name = match base.rfind('.') {
    Some(index) if index > 0 => &base[..index],
    _ => base,
  };
  (dir.to_string(), name.to_string())
}

pub(crate) fn substitute_template(template: &str, dir: &str, name: &str, ext: &str) -> String {
  let path = template
    .replace("[dir]", dir)
    .replace("[name]", name)
    .replace("[ext]", ext);
  // "[dir]" is "." for files at the output base; keep paths tidy.
  match path.strip_prefix("./") {
    Some(stripped) => stripped.to_string(),
    None => path,
  }
}

/// Record which chunk owns each live top-level symbol; the cross-chunk
/// pass keys everything off this.
pub(crate) fn assign_symbol_chunk_indices(graph: &mut LinkerGraph, chunks: &[Chunk]) {
  for (chunk_index, chunk) in chunks.iter().enumerate() {
    let ChunkRepr::Js { part_ranges, .. } = &chunk.repr else {
      continue;
    };
    let mut to_set: Vec<SymbolRef> = Vec::new();
    for range in part_ranges {
      let Some(ast) = graph.js_ast(range.source) else {
        continue;
      };
      for part in &ast.parts[range.part_begin as usize..range.part_end as usize] {
        for declared in &part.declared_symbols {
          if declared.is_top_level {
            to_set.push(declared.sym);
          }
        }
      }
    }
    for sym in to_set {
      let canonical = graph.symbols.follow(sym);
      graph.symbols.get_mut(canonical).chunk_index =
        Some(ChunkIndex::new(chunk_index as u32));
    }
  }
}
