// Copyright 2024-2026 the Tern authors. MIT license.

//! Cross-chunk analysis: find every symbol a chunk uses but another chunk
//! declares, turn those into machine-generated imports and exports, and
//! record dynamic-import edges so final hashes depend on the right chunks.

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;
use tern_common::ChunkIndex;
use tern_common::ImportKind;
use tern_common::SourceIndex;
use tern_common::SymbolKind;
use tern_common::SymbolRef;

use crate::chunk::Chunk;
use crate::chunk::ChunkRepr;
use crate::chunk::CrossChunkImport;
use crate::chunk::CrossChunkImportItem;
use crate::graph::LinkerGraph;
use crate::graph::WrapKind;
use crate::options::BundleOptions;
use crate::rename::NameSequence;

struct ChunkImports {
  imported_refs: Vec<SymbolRef>,
  dynamic_chunks: Vec<ChunkIndex>,
}

pub(crate) fn compute_cross_chunk_dependencies(
  graph: &mut LinkerGraph,
  chunks: &mut [Chunk],
  options: &BundleOptions,
) {
  if chunks.len() < 2 {
    return;
  }

  // Map each dynamic-import target file to the chunk it became the entry
  // of, for recording dynamic edges.
  let mut entry_chunk_of_file: FxHashMap<SourceIndex, ChunkIndex> = FxHashMap::default();
  for (index, chunk) in chunks.iter().enumerate() {
    if let (true, Some(source)) = (chunk.is_entry_point, chunk.source_index) {
      if matches!(chunk.repr, ChunkRepr::Js { .. }) {
        entry_chunk_of_file.insert(source, ChunkIndex::new(index as u32));
      }
    }
  }

  // Per-chunk scan is read-only over the graph: links were compressed
  // before this phase, so follow_read is safe in parallel.
  let graph_ref = &*graph;
  let per_chunk: Vec<ChunkImports> = chunks
    .par_iter()
    .enumerate()
    .map(|(chunk_index, chunk)| {
      collect_chunk_imports(graph_ref, chunk, chunk_index, &entry_chunk_of_file)
    })
    .collect();

  // Serial merge. Imported refs mark exports in the declaring chunk.
  let mut imports_by_chunk: Vec<Vec<(ChunkIndex, SymbolRef)>> = Vec::new();
  for per in &per_chunk {
    let mut list = Vec::new();
    for &sym in &per.imported_refs {
      if let Some(owner) = graph.symbols.get(sym).chunk_index {
        list.push((owner, sym));
      }
    }
    imports_by_chunk.push(list);
  }

  // Assign stable export aliases per declaring chunk.
  let minify = options.minify_identifiers;
  let mut alias_state: FxHashMap<usize, AliasGenerator> = FxHashMap::default();
  for (importer, list) in imports_by_chunk.iter().enumerate() {
    for &(owner, sym) in list {
      let owner_idx = owner.idx();
      if owner_idx == importer {
        continue;
      }
      let generator = alias_state
        .entry(owner_idx)
        .or_insert_with(|| AliasGenerator::new(minify));
      let alias = {
        let name = graph.symbols.get(sym).original_name.clone();
        generator.alias_for(sym, &name)
      };
      if let ChunkRepr::Js {
        exports_to_other_chunks,
        ..
      } = &mut chunks[owner_idx].repr
      {
        exports_to_other_chunks.insert(sym, alias);
      }
    }
  }

  // Record the import side, sorted for determinism.
  for (importer, list) in imports_by_chunk.iter().enumerate() {
    let mut by_owner: FxHashMap<usize, Vec<CrossChunkImportItem>> = FxHashMap::default();
    for &(owner, sym) in list {
      if owner.idx() == importer {
        continue;
      }
      let alias = match &chunks[owner.idx()].repr {
        ChunkRepr::Js {
          exports_to_other_chunks,
          ..
        } => exports_to_other_chunks[&sym].clone(),
        ChunkRepr::Css { .. } => continue,
      };
      by_owner.entry(owner.idx()).or_default().push(CrossChunkImportItem {
        export_alias: alias,
        import_ref: sym,
      });
    }

    let mut owners: Vec<usize> = by_owner.keys().copied().collect();
    owners.sort_unstable();
    let mut imports_list = Vec::new();
    let mut cross_imports = Vec::new();
    for owner in owners {
      let mut items = by_owner.remove(&owner).unwrap();
      items.sort_by(|a, b| a.export_alias.cmp(&b.export_alias));
      imports_list.push((ChunkIndex::new(owner as u32), items));
      cross_imports.push(CrossChunkImport {
        chunk_index: ChunkIndex::new(owner as u32),
        import_kind: ImportKind::Stmt,
      });
    }

    // An entry chunk also imports every chunk its entry bit reaches, even
    // with zero referenced symbols, so shared side effects still run.
    if let Some(bit) = chunks[importer].entry_point_bit {
      for (other, chunk) in chunks.iter().enumerate() {
        if other == importer || !matches!(chunk.repr, ChunkRepr::Js { .. }) {
          continue;
        }
        if chunk.entry_bits.has_bit(bit)
          && !cross_imports
            .iter()
            .any(|i| i.chunk_index.idx() == other && i.import_kind == ImportKind::Stmt)
        {
          cross_imports.push(CrossChunkImport {
            chunk_index: ChunkIndex::new(other as u32),
            import_kind: ImportKind::Stmt,
          });
          imports_list.push((ChunkIndex::new(other as u32), Vec::new()));
        }
      }
    }

    for &dynamic in &per_chunk[importer].dynamic_chunks {
      cross_imports.push(CrossChunkImport {
        chunk_index: dynamic,
        import_kind: ImportKind::Dynamic,
      });
    }

    cross_imports.sort_by_key(|i| (i.chunk_index, i.import_kind == ImportKind::Dynamic));
    cross_imports.dedup();
    imports_list.sort_by_key(|(index, _)| *index);

    chunks[importer].cross_chunk_imports = cross_imports;
    if let ChunkRepr::Js {
      imports_from_other_chunks,
      ..
    } = &mut chunks[importer].repr
    {
      *imports_from_other_chunks = imports_list;
    }
  }
}

fn collect_chunk_imports(
  graph: &LinkerGraph,
  chunk: &Chunk,
  chunk_index: usize,
  entry_chunk_of_file: &FxHashMap<SourceIndex, ChunkIndex>,
) -> ChunkImports {
  let ChunkRepr::Js { part_ranges, .. } = &chunk.repr else {
    return ChunkImports {
      imported_refs: Vec::new(),
      dynamic_chunks: Vec::new(),
    };
  };

  let mut imported: Vec<SymbolRef> = Vec::new();
  let mut seen: FxHashSet<SymbolRef> = FxHashSet::default();
  let mut dynamic: Vec<ChunkIndex> = Vec::new();

  for range in part_ranges {
    let Some(ast) = graph.js_ast(range.source) else {
      continue;
    };
    let file_wrap = graph.meta[range.source.idx()].wrap;
    for part in &ast.parts[range.part_begin as usize..range.part_end as usize] {
      let mut uses: Vec<SymbolRef> = part.symbol_uses.keys().copied().collect();
      uses.sort();
      for sym in uses {
        let canonical = graph.symbols.follow_read(sym);
        let symbol = graph.symbols.get(canonical);
        if symbol.kind == SymbolKind::Unbound || symbol.flags.import_item_missing {
          continue;
        }
        // Internals of a CJS-wrapped file stay inside the wrapper closure;
        // only the wrapper itself crosses chunks.
        if file_wrap == WrapKind::Cjs {
          let wrapper = ast.wrapper_ref;
          if canonical.source == range.source && canonical != wrapper {
            continue;
          }
        }
        match symbol.chunk_index {
          Some(owner) if owner.idx() != chunk_index => {
            if seen.insert(canonical) {
              imported.push(canonical);
            }
          }
          _ => {}
        }
      }

      for ri in &part.import_record_indices {
        let record = &ast.import_records[ri.idx()];
        if record.kind != ImportKind::Dynamic {
          continue;
        }
        if let Some(target) = record.source_index {
          if let Some(target_chunk) = entry_chunk_of_file.get(&target) {
            if target_chunk.idx() != chunk_index && !dynamic.contains(target_chunk) {
              dynamic.push(*target_chunk);
            }
          }
        }
      }
    }
  }

  dynamic.sort_unstable();
  ChunkImports {
    imported_refs: imported,
    dynamic_chunks: dynamic,
  }
}

/// Export aliases are minified short names under minification, and the
/// symbol's own name with a numeric suffix otherwise.
struct AliasGenerator {
  minify: bool,
  sequence: NameSequence,
  next: u32,
  taken: FxHashSet<String>,
  assigned: FxHashMap<SymbolRef, String>,
}

impl AliasGenerator {
  fn new(minify: bool) -> Self {
    Self {
      minify,
      sequence: NameSequence::default(),
      next: 0,
      taken: FxHashSet::default(),
      assigned: FxHashMap::default(),
    }
  }

  fn alias_for(&mut self, sym: SymbolRef, original_name: &str) -> String {
    if let Some(existing) = self.assigned.get(&sym) {
      return existing.clone();
    }
    let alias = if self.minify {
      loop {
        let name = self.sequence.name(self.next);
        self.next += 1;
        if !self.taken.contains(&name) {
          break name;
        }
      }
    } else {
      let mut candidate = original_name.to_string();
      let mut counter = 2;
      while self.taken.contains(&candidate) {
        candidate = format!("{}{}", original_name, counter);
        counter += 1;
      }
      candidate
    };
    self.taken.insert(alias.clone());
    self.assigned.insert(sym, alias.clone());
    alias
  }
}

/// Static cross-chunk imports must form a DAG; dynamic edges may cycle.
pub(crate) fn has_static_chunk_cycle(chunks: &[Chunk]) -> bool {
  #[derive(Clone, Copy, PartialEq)]
  enum State {
    Unvisited,
    InProgress,
    Done,
  }
  fn visit(chunks: &[Chunk], states: &mut [State], index: usize) -> bool {
    match states[index] {
      State::Done => return false,
      State::InProgress => return true,
      State::Unvisited => {}
    }
    states[index] = State::InProgress;
    for import in &chunks[index].cross_chunk_imports {
      if import.import_kind == ImportKind::Stmt
        && visit(chunks, states, import.chunk_index.idx())
      {
        return true;
      }
    }
    states[index] = State::Done;
    false
  }

  let mut states = vec![State::Unvisited; chunks.len()];
  (0..chunks.len()).any(|i| visit(chunks, &mut states, i))
}
