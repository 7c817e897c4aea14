// Copyright 2024-2026 the Tern authors. MIT license.

//! Entry-point reachability. Every live file gets a bit set over the entry
//! points that can reach it; files with identical bit sets later co-locate
//! in one chunk. The minimum distance from any entry point breaks ties in
//! chunk ordering, so a shorter path found later forces a retraversal.

use tern_common::BitSet;
use tern_common::ImportKind;
use tern_common::SourceIndex;

use crate::graph::EntryPoint;
use crate::graph::EntryPointKind;
use crate::graph::LinkerGraph;
use crate::options::BundleOptions;

/// Dynamic imports become chunk boundaries: their targets are appended as
/// extra entry points before reachability runs.
pub(crate) fn append_dynamic_import_entry_points(
  graph: &mut LinkerGraph,
  options: &BundleOptions,
) {
  if !options.code_splitting {
    return;
  }
  let mut seen: Vec<SourceIndex> = graph.entry_points.iter().map(|e| e.source).collect();
  let mut added = Vec::new();
  for i in 0..graph.reachable_files.len() {
    let source = graph.reachable_files[i];
    let Some(ast) = graph.js_ast(source) else {
      continue;
    };
    for record in &ast.import_records {
      if record.kind != ImportKind::Dynamic {
        continue;
      }
      let Some(target) = record.source_index else {
        continue;
      };
      if !seen.contains(&target) {
        seen.push(target);
        added.push(target);
      }
    }
  }
  for source in added {
    graph.entry_points.push(EntryPoint {
      source,
      output_path: None,
      kind: EntryPointKind::DynamicImport,
    });
  }
}

pub(crate) fn assign_entry_bits(graph: &mut LinkerGraph, options: &BundleOptions) {
  let entry_count = graph.entry_points.len() as u32;
  for meta in &mut graph.meta {
    meta.entry_bits = BitSet::new(entry_count);
  }
  let entries: Vec<_> = graph.entry_points.iter().map(|e| e.source).collect();
  for (bit, source) in entries.into_iter().enumerate() {
    mark_file_reachable(graph, source, bit as u32, 0, options);
  }
}

fn mark_file_reachable(
  graph: &mut LinkerGraph,
  source: SourceIndex,
  entry_bit: u32,
  distance: u32,
  options: &BundleOptions,
) {
  if !graph.meta[source.idx()].is_live {
    return;
  }

  let meta = &mut graph.meta[source.idx()];
  let already_has_bit = meta.entry_bits.has_bit(entry_bit);
  if already_has_bit && distance >= meta.distance_from_entry_point {
    return;
  }
  meta.entry_bits.set_bit(entry_bit);
  if distance < meta.distance_from_entry_point {
    meta.distance_from_entry_point = distance;
  }

  let mut targets: Vec<_> = graph.files[source.idx()]
    .repr
    .import_records()
    .iter()
    // Dynamic imports start their own chunk when splitting; the bit does
    // not cross the boundary.
    .filter(|r| r.kind != ImportKind::Dynamic || !options.code_splitting)
    .filter_map(|r| r.source_index)
    .collect();

  // Part dependencies reach files no import record names: the runtime
  // helpers and wrapper parts of other files.
  if let Some(ast) = graph.js_ast(source) {
    for part in &ast.parts {
      if !part.is_live {
        continue;
      }
      for dep in &part.dependencies {
        if dep.source != source && !targets.contains(&dep.source) {
          targets.push(dep.source);
        }
      }
    }
  }

  for target in targets {
    mark_file_reachable(graph, target, entry_bit, distance + 1, options);
  }
}
