// Copyright 2024-2026 the Tern authors. MIT license.

//! Output assembly: final file records, sibling source maps, and the
//! optional metafile JSON chunk.

use std::path::PathBuf;

use serde_json::json;
use serde_json::Value;
use tern_common::SourceIndex;
use tern_common::RUNTIME_SOURCE_INDEX;

use crate::chunk::Chunk;
use crate::chunk::ChunkRepr;
use crate::graph::LinkerGraph;
use crate::options::BundleOptions;
use crate::options::SourceMapMode;
use crate::paths::SourceMapShift;
use crate::render::full_source_map;

#[derive(Debug, Clone)]
pub struct OutputFile {
  pub abs_path: PathBuf,
  pub contents: Vec<u8>,
  pub source_map: Option<Vec<u8>>,
  pub json_metadata_chunk: Option<String>,
  pub is_executable: bool,
}

pub(crate) fn finalize_outputs(
  graph: &LinkerGraph,
  chunks: &[Chunk],
  contents: Vec<(Vec<u8>, Vec<SourceMapShift>)>,
  options: &BundleOptions,
) -> Vec<OutputFile> {
  let out_dir = options
    .abs_output_dir
    .clone()
    .unwrap_or_else(|| PathBuf::from("."));

  let mut outputs = Vec::with_capacity(chunks.len());
  for (chunk, (bytes, _shifts)) in chunks.iter().zip(contents) {
    let abs_path = match (&options.abs_output_file, chunks.len()) {
      (Some(file), 1) => file.clone(),
      _ => out_dir.join(&chunk.final_rel_path),
    };

    let is_executable = chunk
      .source_index
      .and_then(|s| graph.js_ast(s))
      .and_then(|ast| ast.hashbang.as_ref())
      .is_some();

    let source_map = match options.source_map {
      SourceMapMode::Linked
      | SourceMapMode::External
      | SourceMapMode::InlineAndExternal
      | SourceMapMode::ExternalWithoutComment => {
        Some(full_source_map(&chunk.output_source_map).into_bytes())
      }
      SourceMapMode::None | SourceMapMode::Inline => None,
    };

    let json_metadata_chunk = if options.needs_metafile {
      Some(metafile_chunk(graph, chunks, chunk, bytes.len()))
    } else {
      None
    };

    outputs.push(OutputFile {
      abs_path,
      contents: bytes,
      source_map,
      json_metadata_chunk,
      is_executable,
    });
  }
  outputs
}

/// One metafile entry per output file: which inputs contributed, what the
/// chunk imports, and what it exports.
fn metafile_chunk(
  graph: &LinkerGraph,
  chunks: &[Chunk],
  chunk: &Chunk,
  byte_len: usize,
) -> String {
  let mut inputs = serde_json::Map::new();
  let files: Vec<SourceIndex> = match &chunk.repr {
    ChunkRepr::Js {
      files_in_chunk_order,
      ..
    } => files_in_chunk_order.clone(),
    ChunkRepr::Css {
      files_in_chunk_order,
      ..
    } => files_in_chunk_order.clone(),
  };
  for source in &files {
    if *source == RUNTIME_SOURCE_INDEX {
      continue;
    }
    let file = &graph.files[source.idx()];
    inputs.insert(
      file.pretty_path.clone(),
      json!({ "bytesInOutput": file.source.len() }),
    );
  }

  let mut imports: Vec<Value> = Vec::new();
  for import in &chunk.cross_chunk_imports {
    let target = &chunks[import.chunk_index.idx()];
    imports.push(json!({
      "path": target.final_rel_path,
      "kind": import.import_kind.as_metafile_str(),
    }));
  }
  for source in &files {
    for record in graph.files[source.idx()].repr.import_records() {
      if record.source_index.is_none() && !record.is_disabled {
        imports.push(json!({
          "path": record.path,
          "kind": record.kind.as_metafile_str(),
          "external": true,
        }));
      }
    }
  }

  let exports: Vec<String> = chunk
    .source_index
    .map(|s| {
      graph.meta[s.idx()]
        .sorted_and_filtered_export_aliases
        .clone()
    })
    .unwrap_or_default();

  let mut entry = serde_json::Map::new();
  entry.insert("imports".to_string(), Value::Array(imports));
  entry.insert(
    "exports".to_string(),
    Value::Array(exports.into_iter().map(Value::String).collect()),
  );
  if let Some(source) = chunk.source_index {
    entry.insert(
      "entryPoint".to_string(),
      Value::String(graph.files[source.idx()].pretty_path.clone()),
    );
  }
  entry.insert("inputs".to_string(), Value::Object(inputs));
  entry.insert("bytes".to_string(), json!(byte_len));

  serde_json::to_string(&Value::Object(entry)).unwrap_or_else(|_| "{}".to_string())
}
