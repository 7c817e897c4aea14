// Copyright 2024-2026 the Tern authors. MIT license.

//! Chunk hashing. The isolated hash covers every byte of a chunk's rendered
//! output except the placeholder substitutions; the final hash folds in the
//! isolated hashes of everything the chunk imports, transitively, so a
//! renamed dependency changes the importer's path too.

use rayon::prelude::*;
use std::hash::Hasher;
use twox_hash::XxHash64;

use crate::chunk::Chunk;
use crate::chunk::ChunkRepr;
use crate::chunk::IntermediateOutput;
use crate::graph::LinkerGraph;

fn write_section(hasher: &mut XxHash64, bytes: &[u8]) {
  // Length prefixes keep adjacent sections from sliding into each other.
  hasher.write(&(bytes.len() as u32).to_le_bytes());
  hasher.write(bytes);
}

pub(crate) fn compute_isolated_hashes(graph: &LinkerGraph, chunks: &mut [Chunk]) {
  chunks.par_iter_mut().for_each(|chunk| {
    chunk.isolated_hash = isolated_hash(graph, chunk);
  });
}

fn isolated_hash(graph: &LinkerGraph, chunk: &Chunk) -> u64 {
  let mut hasher = XxHash64::with_seed(0);

  match &chunk.repr {
    ChunkRepr::Js { part_ranges, .. } => {
      for range in part_ranges {
        let file = &graph.files[range.source.idx()];
        write_section(&mut hasher, file.key_path.namespace.as_bytes());
        if file.key_path.namespace == "file" {
          write_section(&mut hasher, file.pretty_path.as_bytes());
        } else {
          write_section(&mut hasher, file.key_path.text.as_bytes());
        }
        hasher.write(&range.part_begin.to_le_bytes());
        hasher.write(&range.part_end.to_le_bytes());
      }
    }
    ChunkRepr::Css {
      files_in_chunk_order,
      ..
    } => {
      for &source in files_in_chunk_order {
        let file = &graph.files[source.idx()];
        write_section(&mut hasher, file.key_path.namespace.as_bytes());
        write_section(&mut hasher, file.pretty_path.as_bytes());
      }
    }
  }

  // The path template's literal text participates; the final paths that
  // replace the placeholders explicitly do not.
  for literal in chunk.final_template.split("[hash]") {
    write_section(&mut hasher, literal.as_bytes());
  }

  match &chunk.intermediate_output {
    IntermediateOutput::Empty => {}
    IntermediateOutput::Joined(bytes) => write_section(&mut hasher, bytes),
    IntermediateOutput::Pieces(pieces) => {
      for piece in pieces {
        write_section(&mut hasher, &piece.data);
      }
    }
  }

  write_section(&mut hasher, &chunk.output_source_map.prefix);
  write_section(&mut hasher, &chunk.output_source_map.mappings);
  write_section(&mut hasher, &chunk.output_source_map.suffix);

  hasher.finish()
}

/// One final hash per chunk: a DFS over the chunk import graph that absorbs
/// the isolated hash of every reachable chunk. The visited set is per root,
/// not global, so each member of an import cycle still absorbs every other
/// member instead of short-circuiting at the first repeat.
pub(crate) fn compute_final_hashes(chunks: &[Chunk]) -> Vec<u64> {
  (0..chunks.len())
    .map(|root| {
      let mut hasher = XxHash64::with_seed(0);
      let mut visited = vec![false; chunks.len()];
      absorb(chunks, root, &mut visited, &mut hasher);
      hasher.finish()
    })
    .collect()
}

fn absorb(chunks: &[Chunk], index: usize, visited: &mut [bool], hasher: &mut XxHash64) {
  if visited[index] {
    return;
  }
  visited[index] = true;
  hasher.write(&chunks[index].isolated_hash.to_le_bytes());
  for import in &chunks[index].cross_chunk_imports {
    absorb(chunks, import.chunk_index.idx(), visited, hasher);
  }
}

const BASE32_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuv";

/// Lowercase base-32, thirteen characters for 64 bits, fit for file names
/// on case-insensitive file systems.
pub(crate) fn hash_to_base32(hash: u64) -> String {
  let mut out = String::with_capacity(13);
  let mut rest = hash;
  for _ in 0..13 {
    out.push(BASE32_ALPHABET[(rest & 31) as usize] as char);
    rest >>= 5;
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn base32_is_stable_and_distinct() {
    assert_eq!(hash_to_base32(0), "0000000000000");
    assert_eq!(hash_to_base32(31), "v000000000000");
    assert_ne!(hash_to_base32(1), hash_to_base32(2));
    assert_eq!(hash_to_base32(u64::MAX).len(), 13);
  }

  #[test]
  fn length_prefixing_separates_sections() {
    let mut a = XxHash64::with_seed(0);
    write_section(&mut a, b"ab");
    write_section(&mut a, b"c");
    let mut b = XxHash64::with_seed(0);
    write_section(&mut b, b"a");
    write_section(&mut b, b"bc");
    assert_ne!(a.finish(), b.finish());
  }
}
