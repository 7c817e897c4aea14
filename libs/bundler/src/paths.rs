// Copyright 2024-2026 the Tern authors. MIT license.

//! Final path computation and placeholder substitution. After hashing, the
//! `[hash]` template placeholder becomes the base-32 final hash, and every
//! unique-key piece in the rendered output becomes a relative path from
//! the referencing chunk to the referenced one.

use crate::chunk::Chunk;
use crate::chunk::IntermediateOutput;
use crate::chunk::PieceKind;
use crate::hash::hash_to_base32;
use crate::options::BundleOptions;

/// Byte offsets before and after a substitution, kept so source-map column
/// mappings after the splice can be translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceMapShift {
  pub before: u32,
  pub after: u32,
}

pub(crate) fn apply_final_paths(chunks: &mut [Chunk], final_hashes: &[u64]) {
  for (chunk, hash) in chunks.iter_mut().zip(final_hashes) {
    chunk.final_rel_path = chunk
      .final_template
      .replace("[hash]", &hash_to_base32(*hash));
  }
}

/// Replaces every `Chunk` piece with the path from this chunk's directory
/// to the target's final path, returning the final bytes per chunk plus the
/// shift table for its source map.
pub(crate) fn substitute_final_paths(
  chunks: &[Chunk],
  options: &BundleOptions,
) -> Vec<(Vec<u8>, Vec<SourceMapShift>)> {
  let final_paths: Vec<String> = chunks.iter().map(|c| c.final_rel_path.clone()).collect();

  chunks
    .iter()
    .map(|chunk| {
      let from_dir = parent_dir(&chunk.final_rel_path);
      match &chunk.intermediate_output {
        IntermediateOutput::Empty => (Vec::new(), Vec::new()),
        IntermediateOutput::Joined(bytes) => (bytes.clone(), Vec::new()),
        IntermediateOutput::Pieces(pieces) => {
          let mut out: Vec<u8> = Vec::new();
          let mut shifts: Vec<SourceMapShift> = Vec::new();
          let mut before = 0u32;
          for piece in pieces {
            out.extend_from_slice(&piece.data);
            before += piece.data.len() as u32;
            match piece.kind {
              PieceKind::None => {}
              PieceKind::Chunk => {
                let target = final_paths
                  .get(piece.index as usize)
                  .map(|p| p.as_str())
                  .unwrap_or("");
                let path = path_between_chunks(from_dir, target, options);
                // The placeholder is key-prefix + marker + eight digits.
                before += placeholder_len(chunk) as u32;
                out.extend_from_slice(path.as_bytes());
                shifts.push(SourceMapShift {
                  before,
                  after: out.len() as u32,
                });
              }
              PieceKind::Asset => {
                // No asset pipeline behind this linker; leave an empty
                // path rather than a stale placeholder.
                before += placeholder_len(chunk) as u32;
                shifts.push(SourceMapShift {
                  before,
                  after: out.len() as u32,
                });
              }
            }
          }
          (out, shifts)
        }
      }
    })
    .collect()
}

fn placeholder_len(chunk: &Chunk) -> usize {
  chunk.unique_key.len()
}

fn parent_dir(path: &str) -> &str {
  match path.rfind('/') {
    Some(index) => &path[..index],
    None => "",
  }
}

/// Forward-slashed path from one output file's directory to another output
/// file. Joined onto `public_path` when one is configured; otherwise
/// relative with an explicit `./` so it stays a valid import specifier.
pub(crate) fn path_between_chunks(
  from_dir: &str,
  to_rel_path: &str,
  options: &BundleOptions,
) -> String {
  if let Some(public_path) = &options.public_path {
    let sep = if public_path.ends_with('/') { "" } else { "/" };
    return format!("{}{}{}", public_path, sep, to_rel_path);
  }

  let relative = relative_path(from_dir, to_rel_path);
  if relative.starts_with("./") || relative.starts_with("../") {
    relative
  } else {
    format!("./{}", relative)
  }
}

fn relative_path(from_dir: &str, to: &str) -> String {
  let from_parts: Vec<&str> = from_dir
    .split('/')
    .filter(|p| !p.is_empty() && *p != ".")
    .collect();
  let to_parts: Vec<&str> = to.split('/').filter(|p| !p.is_empty() && *p != ".").collect();

  let mut common = 0;
  while common < from_parts.len()
    && common + 1 < to_parts.len().max(1)
    && common < to_parts.len()
    && from_parts[common] == to_parts[common]
  {
    common += 1;
  }

  let mut parts: Vec<String> = Vec::new();
  for _ in common..from_parts.len() {
    parts.push("..".to_string());
  }
  for part in &to_parts[common..] {
    parts.push((*part).to_string());
  }
  parts.join("/")
}

#[cfg(test)]
mod tests {
  use super::*;

  fn options() -> BundleOptions {
    BundleOptions::default()
  }

  #[test]
  fn sibling_paths_get_a_dot_slash() {
    assert_eq!(path_between_chunks("", "other.js", &options()), "./other.js");
  }

  #[test]
  fn paths_climb_out_of_subdirectories() {
    assert_eq!(
      path_between_chunks("chunks", "entry.js", &options()),
      "../entry.js"
    );
    assert_eq!(
      path_between_chunks("a/b", "a/c/x.js", &options()),
      "../c/x.js"
    );
  }

  #[test]
  fn public_path_wins_over_relativization() {
    let mut opts = options();
    opts.public_path = Some("https://cdn.example.com/assets".to_string());
    assert_eq!(
      path_between_chunks("chunks", "entry.js", &opts),
      "https://cdn.example.com/assets/entry.js"
    );
  }
}
