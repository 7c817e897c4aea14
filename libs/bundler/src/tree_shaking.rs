// Copyright 2024-2026 the Tern authors. MIT license.

//! Part-level tree shaking. Entry points mark their files live; a live part
//! drags in every part it depends on, which is what keeps invariant
//! "every dependency of a live part is live" true by construction.

use tern_common::FileRepr;
use tern_common::FileSideEffects;
use tern_common::ImportKind;
use tern_common::PartIndex;
use tern_common::SourceIndex;

use crate::graph::LinkerGraph;
use crate::options::BundleOptions;

pub(crate) fn tree_shake(graph: &mut LinkerGraph, options: &BundleOptions) {
  let entries: Vec<_> = graph.entry_points.iter().map(|e| e.source).collect();
  for source in entries {
    mark_file_live(graph, source, options);
  }

  if log::log_enabled!(log::Level::Debug) {
    let live = graph.meta.iter().filter(|m| m.is_live).count();
    log::debug!("tree shaking: {} of {} files live", live, graph.files.len());
  }
}

fn mark_file_live(graph: &mut LinkerGraph, source: SourceIndex, options: &BundleOptions) {
  if graph.meta[source.idx()].is_live {
    return;
  }
  graph.meta[source.idx()].is_live = true;

  match graph.file_repr(source) {
    FileRepr::Css(css) => {
      // CSS cannot drop rules it cannot see through; every import stays.
      let targets: Vec<_> = css
        .import_records
        .iter()
        .filter(|r| r.kind == ImportKind::At)
        .filter_map(|r| r.source_index)
        .collect();
      for target in targets {
        mark_file_live(graph, target, options);
      }
    }
    FileRepr::Js(_) => {
      let is_entry = graph.is_entry_point(source);
      let part_count = graph.js_ast(source).unwrap().parts.len();
      for index in 0..part_count {
        let part_index = PartIndex::new(index as u32);
        let (can_be_removed, force_tree_shaking) = {
          let part = &graph.js_ast(source).unwrap().parts[index];
          (part.can_be_removed_if_unused, part.force_tree_shaking)
        };

        // An import of a file with side effects pins the importing part:
        // dropping it would skip those side effects.
        let has_side_effect_import = {
          let ast = graph.js_ast(source).unwrap();
          ast.parts[index]
            .import_record_indices
            .iter()
            .map(|ri| &ast.import_records[ri.idx()])
            .filter(|r| r.kind == ImportKind::Stmt)
            .any(|r| match r.source_index {
              None => !r.is_disabled,
              Some(target) => {
                options.ignore_dce_annotations
                  || graph.files[target.idx()].side_effects
                    == FileSideEffects::HasSideEffects
              }
            })
        };

        let keep = has_side_effect_import
          || !can_be_removed
          || (!force_tree_shaking && !options.tree_shaking_enabled() && is_entry);
        if keep {
          mark_part_live(graph, source, part_index, options);
        }
      }
    }
  }
}

pub(crate) fn mark_part_live(
  graph: &mut LinkerGraph,
  source: SourceIndex,
  part_index: PartIndex,
  options: &BundleOptions,
) {
  {
    let Some(ast) = graph.js_ast_mut(source) else {
      return;
    };
    let Some(part) = ast.parts.get_mut(part_index.idx()) else {
      return;
    };
    if part.is_live {
      return;
    }
    part.is_live = true;
  }

  mark_file_live(graph, source, options);

  let (deps, record_targets) = {
    let ast = graph.js_ast(source).unwrap();
    let part = &ast.parts[part_index.idx()];
    let targets: Vec<_> = part
      .import_record_indices
      .iter()
      .map(|ri| &ast.import_records[ri.idx()])
      .filter(|r| r.kind != ImportKind::Dynamic || !options.code_splitting)
      .filter_map(|r| r.source_index)
      .collect();
    (part.dependencies.clone(), targets)
  };

  for dep in deps {
    mark_part_live(graph, dep.source, dep.part, options);
  }
  for target in record_targets {
    mark_file_live(graph, target, options);
  }
}
