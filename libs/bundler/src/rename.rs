// Copyright 2024-2026 the Tern authors. MIT license.

//! Symbol renaming, one pass per chunk.
//!
//! The non-minifying renamer keeps original names and numbers collisions
//! (`foo`, `foo2`, `foo3`). The minifying renamer sorts symbols by use
//! count and hands out names from a frequency-ordered sequence. Property
//! mangling is a separate bundle-wide pass that runs before either.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;
use tern_common::SymbolKind;
use tern_common::SymbolRef;

use crate::chunk::Chunk;
use crate::chunk::ChunkRepr;
use crate::graph::LinkerGraph;
use crate::options::BundleOptions;

static JS_KEYWORDS: Lazy<FxHashSet<&'static str>> = Lazy::new(|| {
  [
    "await", "break", "case", "catch", "class", "const", "continue",
    "debugger", "default", "delete", "do", "else", "enum", "export",
    "extends", "false", "finally", "for", "function", "if", "import", "in",
    "instanceof", "let", "new", "null", "return", "super", "switch", "this",
    "throw", "true", "try", "typeof", "var", "void", "while", "with",
    "yield",
  ]
  .into_iter()
  .collect()
});

const DEFAULT_HEAD: &str =
  "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ_$";
const DEFAULT_TAIL: &str =
  "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ_$0123456789";

/// Generates short identifiers in order: `a`, `b`, ..., `aa`, `ab`, ...
/// The alphabets can be reordered by a character-frequency histogram so the
/// most common names use the most common bytes.
#[derive(Debug, Clone)]
pub(crate) struct NameSequence {
  head: Vec<char>,
  tail: Vec<char>,
}

impl Default for NameSequence {
  fn default() -> Self {
    Self {
      head: DEFAULT_HEAD.chars().collect(),
      tail: DEFAULT_TAIL.chars().collect(),
    }
  }
}

impl NameSequence {
  pub fn from_histogram(histogram: &FxHashMap<char, u64>) -> Self {
    let mut sequence = Self::default();
    let sort = |chars: &mut Vec<char>| {
      chars.sort_by(|a, b| {
        let ca = histogram.get(a).copied().unwrap_or(0);
        let cb = histogram.get(b).copied().unwrap_or(0);
        cb.cmp(&ca).then_with(|| a.cmp(b))
      });
    };
    sort(&mut sequence.head);
    sort(&mut sequence.tail);
    sequence
  }

  pub fn name(&self, mut index: u32) -> String {
    let mut name = String::new();
    name.push(self.head[(index as usize) % self.head.len()]);
    index /= self.head.len() as u32;
    while index > 0 {
      index -= 1;
      name.push(self.tail[(index as usize) % self.tail.len()]);
      index /= self.tail.len() as u32;
    }
    name
  }
}

/// Final name assignment for one chunk. Lookups go through the canonical
/// symbol, so merged imports resolve to their export's name.
pub(crate) struct Renamer {
  names: FxHashMap<SymbolRef, String>,
}

impl Renamer {
  pub fn name_of(&self, graph: &LinkerGraph, sym: SymbolRef) -> String {
    let canonical = graph.symbols.follow_read(sym);
    if let Some(name) = self.names.get(&canonical) {
      return name.clone();
    }
    graph.symbols.get(canonical).original_name.clone()
  }
}

/// Names the output must not introduce: keywords, unbound globals the chunk
/// references, symbols pinned by the user, and the host bindings wrapped
/// code relies on.
pub(crate) fn compute_reserved_names(
  graph: &LinkerGraph,
  chunk: &Chunk,
  options: &BundleOptions,
) -> FxHashSet<String> {
  let mut reserved: FxHashSet<String> =
    JS_KEYWORDS.iter().map(|k| k.to_string()).collect();
  reserved.insert("require".to_string());
  reserved.insert("Promise".to_string());
  reserved.insert("exports".to_string());
  reserved.insert("module".to_string());
  let _ = options;

  for &source in &chunk.files_with_parts_in_chunk {
    for symbol in graph.symbols.file_symbols(source) {
      if symbol.kind == SymbolKind::Unbound || symbol.flags.must_not_be_renamed {
        reserved.insert(symbol.original_name.clone());
      }
    }
  }
  reserved
}

/// Symbols that need a name in this chunk: every top-level symbol declared
/// by an included part, plus the refs imported from other chunks.
fn chunk_symbols(graph: &LinkerGraph, chunk: &Chunk) -> Vec<SymbolRef> {
  let mut symbols: Vec<SymbolRef> = Vec::new();
  let mut seen: FxHashSet<SymbolRef> = FxHashSet::default();
  let ChunkRepr::Js {
    part_ranges,
    imports_from_other_chunks,
    ..
  } = &chunk.repr
  else {
    return symbols;
  };

  for (_, items) in imports_from_other_chunks {
    for item in items {
      let canonical = graph.symbols.follow_read(item.import_ref);
      if seen.insert(canonical) {
        symbols.push(canonical);
      }
    }
  }

  for range in part_ranges {
    let Some(ast) = graph.js_ast(range.source) else {
      continue;
    };
    for part in &ast.parts[range.part_begin as usize..range.part_end as usize] {
      for declared in &part.declared_symbols {
        let canonical = graph.symbols.follow_read(declared.sym);
        if seen.insert(canonical) {
          symbols.push(canonical);
        }
      }
    }
    // Namespace refs synthesized for require() interop declare here too.
    for (_, ns) in &graph.meta[range.source.idx()].import_record_namespace_refs {
      let canonical = graph.symbols.follow_read(*ns);
      if seen.insert(canonical) {
        symbols.push(canonical);
      }
    }
  }
  symbols
}

pub(crate) fn number_renamer(
  graph: &LinkerGraph,
  chunk: &Chunk,
  reserved: &FxHashSet<String>,
) -> Renamer {
  let mut names: FxHashMap<SymbolRef, String> = FxHashMap::default();
  let mut taken: FxHashSet<String> = reserved.clone();
  let mut counters: FxHashMap<String, u32> = FxHashMap::default();

  for sym in chunk_symbols(graph, chunk) {
    let symbol = graph.symbols.get(sym);
    if symbol.flags.must_not_be_renamed {
      names.insert(sym, symbol.original_name.clone());
      continue;
    }
    let base = if symbol.original_name.is_empty() {
      "_".to_string()
    } else {
      symbol.original_name.clone()
    };
    let mut candidate = base.clone();
    loop {
      if !taken.contains(&candidate) && !JS_KEYWORDS.contains(candidate.as_str()) {
        break;
      }
      let counter = counters.entry(base.clone()).or_insert(1);
      *counter += 1;
      candidate = format!("{}{}", base, counter);
    }
    taken.insert(candidate.clone());
    names.insert(sym, candidate);
  }

  Renamer { names }
}

pub(crate) fn minify_renamer(
  graph: &LinkerGraph,
  chunk: &Chunk,
  reserved: &FxHashSet<String>,
) -> Renamer {
  // Character histogram over the chunk's sources biases the alphabet.
  let mut histogram: FxHashMap<char, u64> = FxHashMap::default();
  for &source in &chunk.files_with_parts_in_chunk {
    for c in graph.files[source.idx()].source.chars() {
      if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
        *histogram.entry(c).or_insert(0) += 1;
      }
    }
  }
  let sequence = NameSequence::from_histogram(&histogram);

  // Stable frequency order: count desc, then declaration position.
  let mut symbols = chunk_symbols(graph, chunk);
  symbols.sort_by(|a, b| {
    let ca = graph.symbols.get(*a).use_count_estimate;
    let cb = graph.symbols.get(*b).use_count_estimate;
    cb.cmp(&ca).then_with(|| a.cmp(b))
  });

  let mut names: FxHashMap<SymbolRef, String> = FxHashMap::default();
  let mut next = 0u32;
  for sym in symbols {
    let symbol = graph.symbols.get(sym);
    if symbol.flags.must_not_be_renamed {
      names.insert(sym, symbol.original_name.clone());
      continue;
    }
    let name = loop {
      let candidate = sequence.name(next);
      next += 1;
      if !reserved.contains(&candidate)
        && !JS_KEYWORDS.contains(candidate.as_str())
      {
        break candidate;
      }
    };
    names.insert(sym, name);
  }

  Renamer { names }
}

/// Bundle-wide property mangling. Same-name property symbols across all
/// files are merged so every occurrence prints the same short name; the
/// persistent cache pins previous assignments and `false` entries reserve
/// names from the generator.
pub(crate) fn mangle_props(graph: &mut LinkerGraph, options: &BundleOptions) {
  let Some(pattern) = &options.mangle_props else {
    return;
  };

  // Group mangleable symbols by their original name.
  let mut by_name: FxHashMap<String, Vec<SymbolRef>> = FxHashMap::default();
  for source_idx in 0..graph.files.len() {
    let source = tern_common::SourceIndex::new(source_idx as u32);
    for (inner, symbol) in graph.symbols.file_symbols(source).iter().enumerate() {
      if symbol.kind != SymbolKind::MangledProp {
        continue;
      }
      if !pattern.is_match(&symbol.original_name) {
        continue;
      }
      by_name
        .entry(symbol.original_name.clone())
        .or_default()
        .push(SymbolRef::new(
          source,
          tern_common::InnerIndex::new(inner as u32),
        ));
    }
  }
  if by_name.is_empty() {
    return;
  }

  // One representative per name; everything else merges into it.
  let mut name_use_counts: Vec<(String, SymbolRef, u32)> = Vec::new();
  for (name, mut refs) in by_name {
    refs.sort();
    let representative = refs[0];
    let mut total = 0;
    for &sym in &refs {
      total += graph.symbols.get(sym).use_count_estimate;
      if sym != representative {
        graph.symbols.merge(sym, representative);
      }
    }
    name_use_counts.push((name, representative, total));
  }
  name_use_counts.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));

  let assign = |cache: &mut indexmap::IndexMap<String, serde_json::Value>| {
    let mut reserved: FxHashSet<String> = FxHashSet::default();
    for (key, value) in cache.iter() {
      match value {
        serde_json::Value::Bool(false) => {
          reserved.insert(key.clone());
        }
        serde_json::Value::String(mangled) => {
          reserved.insert(mangled.clone());
        }
        _ => {}
      }
    }

    let sequence = NameSequence::default();
    let mut next = 0u32;
    let mut assignments: Vec<(SymbolRef, String)> = Vec::new();
    for (name, representative, _) in &name_use_counts {
      let mangled = match cache.get(name) {
        Some(serde_json::Value::String(mangled)) => mangled.clone(),
        Some(serde_json::Value::Bool(false)) => name.clone(),
        _ => {
          let fresh = loop {
            let candidate = sequence.name(next);
            next += 1;
            if !reserved.contains(&candidate)
              && !JS_KEYWORDS.contains(candidate.as_str())
            {
              break candidate;
            }
          };
          reserved.insert(fresh.clone());
          cache.insert(name.clone(), serde_json::Value::String(fresh.clone()));
          fresh
        }
      };
      assignments.push((*representative, mangled));
    }
    assignments
  };

  let assignments = match &options.mangle_cache {
    Some(cache) => cache.with_exclusive(assign),
    None => {
      let mut scratch = indexmap::IndexMap::new();
      assign(&mut scratch)
    }
  };

  for (sym, mangled) in assignments {
    let symbol = graph.symbols.get_mut(sym);
    symbol.original_name = mangled;
    symbol.flags.must_not_be_renamed = true;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn name_sequence_wraps_into_two_chars() {
    let sequence = NameSequence::default();
    assert_eq!(sequence.name(0), "a");
    assert_eq!(sequence.name(1), "b");
    let head_len = DEFAULT_HEAD.chars().count() as u32;
    assert_eq!(sequence.name(head_len), "aa");
    assert_eq!(sequence.name(head_len + 1), "ba");
  }

  #[test]
  fn histogram_reorders_alphabet() {
    let mut histogram = FxHashMap::default();
    histogram.insert('z', 100u64);
    let sequence = NameSequence::from_histogram(&histogram);
    assert_eq!(sequence.name(0), "z");
  }
}
