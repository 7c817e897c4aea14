// Copyright 2024-2026 the Tern authors. MIT license.

//! Chunk rendering: rewrite each part's statements for the output format,
//! synthesize CommonJS/ESM wrappers, print, and assemble the final byte
//! stream with its placeholder pieces.
//!
//! One task per chunk; the graph and symbol table are read-only here (the
//! links were compressed before this phase), so chunks render in parallel
//! without locks.

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tern_common::ClauseItem;
use tern_common::ExportsKind;
use tern_common::SourceIndex;
use tern_common::Stmt;
use tern_common::SymbolRef;
use tern_common::RUNTIME_SOURCE_INDEX;

use crate::chunk::Chunk;
use crate::chunk::ChunkRepr;
use crate::chunk::IntermediateOutput;
use crate::chunk::OutputPiece;
use crate::chunk::PartRange;
use crate::chunk::PieceKind;
use crate::chunk::SourceMapPieces;
use crate::graph::LinkerGraph;
use crate::graph::WrapKind;
use crate::options::BundleOptions;
use crate::options::LegalCommentsMode;
use crate::options::OutputFormat;
use crate::options::SourceMapMode;
use crate::printer::Printer;
use crate::rename;
use crate::scan::is_valid_identifier;

pub(crate) fn render_chunks(
  graph: &LinkerGraph,
  chunks: &mut [Chunk],
  options: &BundleOptions,
  log: &crate::diagnostics::Log,
) {
  let unique_keys: Vec<String> = chunks.iter().map(|c| c.unique_key.clone()).collect();
  let mut dynamic_chunk_keys: FxHashMap<SourceIndex, String> = FxHashMap::default();
  for chunk in chunks.iter() {
    if let (true, Some(source)) = (chunk.is_entry_point, chunk.source_index) {
      if matches!(chunk.repr, ChunkRepr::Js { .. }) {
        dynamic_chunk_keys.insert(source, chunk.unique_key.clone());
      }
    }
  }

  chunks.par_iter_mut().for_each(|chunk| {
    // A panic in one chunk is an internal error, not a crash: report it
    // and let the join complete so sibling chunks still render.
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
      match &chunk.repr {
        ChunkRepr::Js { .. } => {
          render_js_chunk(graph, options, chunk, &unique_keys, &dynamic_chunk_keys)
        }
        ChunkRepr::Css { .. } => render_css_chunk(graph, options, chunk),
      }
    }));
    if let Err(panic) = result {
      let msg = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
      log.add_error(None, format!("panic: {}", msg));
    }
  });
}

/// Rewritten statements for one file, split by where they land relative to
/// the wrapper closure.
#[derive(Default)]
struct ConvertedStmts {
  /// Hoisted out of the file entirely (kept ESM imports, hoisted vars and
  /// functions of an ESM-wrapped body).
  outside_wrapper_prefix: Vec<String>,
  /// Require bindings and init calls that run before the body.
  inside_wrapper_prefix: Vec<String>,
  inside_wrapper_suffix: Vec<String>,
  /// Names hoisted to an outer `var` statement by the ESM wrap.
  hoisted_names: Vec<SymbolRef>,
}

fn render_js_chunk(
  graph: &LinkerGraph,
  options: &BundleOptions,
  chunk: &mut Chunk,
  unique_keys: &[String],
  dynamic_chunk_keys: &FxHashMap<SourceIndex, String>,
) {
  let reserved = rename::compute_reserved_names(graph, chunk, options);
  let renamer = if options.minify_identifiers {
    rename::minify_renamer(graph, chunk, &reserved)
  } else {
    rename::number_renamer(graph, chunk, &reserved)
  };
  let printer = Printer {
    graph,
    renamer: &renamer,
    options,
    runtime: graph.runtime_symbols(),
    dynamic_chunk_keys,
  };
  let nl = printer.nl();

  let ChunkRepr::Js {
    files_in_chunk_order,
    part_ranges,
    imports_from_other_chunks,
    exports_to_other_chunks,
  } = &chunk.repr
  else {
    unreachable!("render_js_chunk only takes JS chunks");
  };

  let entry_source = chunk.source_index;
  let entry_ast = entry_source.and_then(|s| graph.js_ast(s));
  let mut out = String::new();

  // Hashbang and directive survive on entry chunks only.
  if let Some(ast) = entry_ast {
    if let Some(hashbang) = &ast.hashbang {
      out.push_str(hashbang);
      out.push('\n');
    }
    if let Some(directive) = &ast.directive {
      out.push_str(&format!("{:?};{}", directive, nl));
    }
  }
  if let Some(banner) = &options.banner {
    out.push_str(banner);
    out.push('\n');
  }

  let iife = options.output_format == OutputFormat::Iife;
  if iife {
    match &options.global_name {
      Some(global) => out.push_str(&format!("var {} = (() => {{{}", global, nl)),
      None => out.push_str(&format!("(() => {{{}", nl)),
    }
  }

  if options.output_format == OutputFormat::EsModule {
    for (target, items) in imports_from_other_chunks {
      let path = &unique_keys[target.idx()];
      if items.is_empty() {
        out.push_str(&format!("import {:?};{}", path, nl));
      } else {
        let inner = items
          .iter()
          .map(|item| {
            let local = printer.symbol(item.import_ref);
            if local == item.export_alias {
              local
            } else {
              format!("{} as {}", item.export_alias, local)
            }
          })
          .collect::<Vec<_>>()
          .join(", ");
        out.push_str(&format!("import {{ {} }} from {:?};{}", inner, path, nl));
      }
    }
  }

  // Each file group prints independently; order is fixed by the planner.
  let groups = group_ranges(graph, part_ranges);
  let rendered: Vec<String> = groups
    .par_iter()
    .map(|(source, ranges)| render_file_group(graph, options, &printer, *source, ranges))
    .collect();
  for piece in rendered {
    out.push_str(&piece);
  }

  if let Some(source) = entry_source {
    out.push_str(&entry_tail(graph, options, &printer, source));
  }

  if options.output_format == OutputFormat::EsModule && !exports_to_other_chunks.is_empty()
  {
    let mut pairs: Vec<(&SymbolRef, &String)> = exports_to_other_chunks.iter().collect();
    pairs.sort_by(|a, b| a.1.cmp(b.1));
    let inner = pairs
      .iter()
      .map(|(sym, alias)| {
        let local = printer.symbol(**sym);
        if &local == *alias {
          local
        } else {
          format!("{} as {}", local, alias)
        }
      })
      .collect::<Vec<_>>()
      .join(", ");
    out.push_str(&format!("export {{ {} }};{}", inner, nl));
  }

  if iife {
    out.push_str(&format!("}})();{}", nl));
  }

  // Legal comments from the chunk's files trail the code.
  if options.legal_comments != LegalCommentsMode::None {
    let mut seen = rustc_hash::FxHashSet::default();
    for &source in files_in_chunk_order {
      for comment in &graph.files[source.idx()].legal_comments {
        if seen.insert(comment.clone()) {
          out.push_str(comment);
          out.push('\n');
        }
      }
    }
  }

  // The source-map comment points at the chunk's own final path, which is
  // only known after hashing, so it goes through the placeholder too.
  chunk.output_source_map = source_map_pieces(graph, files_in_chunk_order);
  match options.source_map {
    SourceMapMode::Linked | SourceMapMode::InlineAndExternal => {
      out.push_str(&format!("//# sourceMappingURL={}.map\n", chunk.unique_key));
    }
    SourceMapMode::Inline => {
      let map = full_source_map(&chunk.output_source_map);
      out.push_str(&format!(
        "//# sourceMappingURL=data:application/json;base64,{}\n",
        base64_encode(map.as_bytes())
      ));
    }
    _ => {}
  }

  if let Some(footer) = &options.footer {
    out.push_str(footer);
    out.push('\n');
  }

  chunk.intermediate_output = break_output_into_pieces(out.into_bytes(), &chunk.unique_key);
}

/// Consecutive part ranges of the same file render as one unit so wrapped
/// bodies stay inside a single closure.
fn group_ranges(
  _graph: &LinkerGraph,
  part_ranges: &[PartRange],
) -> Vec<(SourceIndex, Vec<PartRange>)> {
  let mut groups: Vec<(SourceIndex, Vec<PartRange>)> = Vec::new();
  for range in part_ranges {
    match groups.last_mut() {
      Some((source, ranges)) if *source == range.source => ranges.push(*range),
      _ => groups.push((range.source, vec![*range])),
    }
  }
  groups
}

fn render_file_group(
  graph: &LinkerGraph,
  options: &BundleOptions,
  printer: &Printer<'_>,
  source: SourceIndex,
  ranges: &[PartRange],
) -> String {
  let Some(ast) = graph.js_ast(source) else {
    return String::new();
  };
  let meta = &graph.meta[source.idx()];
  let nl = printer.nl();

  let mut converted = ConvertedStmts::default();
  let mut ns_export_prefix = String::new();
  for range in ranges {
    for (offset, part) in ast.parts[range.part_begin as usize..range.part_end as usize]
      .iter()
      .enumerate()
    {
      let part_index = range.part_begin as usize + offset;
      // The namespace object of an ESM-wrapped file must exist before the
      // init closure runs: import sites reference it eagerly.
      if meta.wrap == WrapKind::Esm
        && part_index == tern_common::NS_EXPORT_PART_INDEX.idx()
      {
        for stmt in &part.stmts {
          ns_export_prefix.push_str(&printer.stmt(source, stmt));
        }
        continue;
      }
      if options.minify_syntax {
        for stmt in &merge_adjacent_locals(&part.stmts) {
          convert_stmt_for_chunk(graph, options, printer, source, stmt, &mut converted);
        }
      } else {
        for stmt in &part.stmts {
          convert_stmt_for_chunk(graph, options, printer, source, stmt, &mut converted);
        }
      }
    }
  }

  let mut out = String::new();
  for line in &converted.outside_wrapper_prefix {
    out.push_str(line);
  }
  out.push_str(&ns_export_prefix);

  match meta.wrap {
    WrapKind::None => {
      for line in &converted.inside_wrapper_prefix {
        out.push_str(line);
      }
      for line in &converted.inside_wrapper_suffix {
        out.push_str(line);
      }
    }
    WrapKind::Cjs => {
      let key = if options.profiler_names {
        format!("{:?}", graph.files[source.idx()].pretty_path)
      } else {
        "\"\"".to_string()
      };
      let args = match (ast.uses_exports_ref, ast.uses_module_ref) {
        (false, false) => String::new(),
        (true, false) => printer.symbol(ast.exports_ref),
        (_, true) => format!(
          "{}, {}",
          printer.symbol(ast.exports_ref),
          printer.symbol(ast.module_ref)
        ),
      };
      out.push_str(&format!(
        "var {} = {}({{{}{}({}) {{{}",
        printer.symbol(ast.wrapper_ref),
        printer.symbol(printer.runtime.common_js),
        nl,
        key,
        args,
        nl
      ));
      for line in &converted.inside_wrapper_prefix {
        out.push_str(line);
      }
      for line in &converted.inside_wrapper_suffix {
        out.push_str(line);
      }
      out.push_str(&format!("}}{}}});{}", nl, nl));
    }
    WrapKind::Esm => {
      if !converted.hoisted_names.is_empty() {
        let names = converted
          .hoisted_names
          .iter()
          .map(|sym| printer.symbol(*sym))
          .collect::<Vec<_>>()
          .join(", ");
        out.push_str(&format!("var {};{}", names, nl));
      }
      let key = if options.profiler_names {
        format!("{:?}", graph.files[source.idx()].pretty_path)
      } else {
        "\"\"".to_string()
      };
      let is_async = meta.is_async_or_has_async_dependency;
      out.push_str(&format!(
        "var {} = {}({{{}{}{}() {{{}",
        printer.symbol(ast.wrapper_ref),
        printer.symbol(printer.runtime.esm),
        nl,
        if is_async { "async " } else { "" },
        key,
        nl
      ));
      for line in &converted.inside_wrapper_prefix {
        out.push_str(line);
      }
      for line in &converted.inside_wrapper_suffix {
        out.push_str(line);
      }
      out.push_str(&format!("}}{}}});{}", nl, nl));
    }
  }
  out
}

/// `var a = 1; var b = 2;` becomes `var a = 1, b = 2;` when syntax
/// minification is on.
fn merge_adjacent_locals(stmts: &[Stmt]) -> Vec<Stmt> {
  let mut merged: Vec<Stmt> = Vec::with_capacity(stmts.len());
  for stmt in stmts {
    if let Stmt::Local {
      kind,
      is_export,
      decls,
    } = stmt
    {
      if let Some(Stmt::Local {
        kind: last_kind,
        is_export: last_is_export,
        decls: last_decls,
      }) = merged.last_mut()
      {
        if last_kind == kind && last_is_export == is_export {
          last_decls.extend(decls.iter().cloned());
          continue;
        }
      }
    }
    merged.push(stmt.clone());
  }
  merged
}

fn convert_stmt_for_chunk(
  graph: &LinkerGraph,
  options: &BundleOptions,
  printer: &Printer<'_>,
  source: SourceIndex,
  stmt: &Stmt,
  converted: &mut ConvertedStmts,
) {
  let ast = graph.js_ast(source).unwrap();
  let meta = &graph.meta[source.idx()];
  let nl = printer.nl();
  let keeps_syntax = options.output_format.keeps_import_export_syntax();
  let source_is_wrapped_esm = meta.wrap == WrapKind::Esm;

  match stmt {
    Stmt::Import {
      record,
      default_name,
      star_name,
      items,
    } => {
      let has_bindings =
        default_name.is_some() || star_name.is_some() || !items.is_empty();
      convert_import_like(
        graph,
        options,
        printer,
        source,
        *record,
        *star_name,
        has_bindings,
        converted,
        || printer.stmt(source, stmt),
      );
    }
    Stmt::ExportFrom { record, items, .. } => {
      convert_import_like(
        graph,
        options,
        printer,
        source,
        *record,
        None,
        !items.is_empty(),
        converted,
        || {
          // Swap clause aliases back to original names: the exported alias
          // is handled by the namespace-export machinery.
          let import_items: Vec<ClauseItem> = items.to_vec();
          printer.stmt(
            source,
            &Stmt::Import {
              record: *record,
              default_name: None,
              star_name: None,
              items: import_items,
            },
          )
        },
      );
    }
    Stmt::ExportStar { record, alias } => {
      let record_data = &ast.import_records[record.idx()];
      match alias {
        Some(item) => {
          // `export * as ns` keeps the namespace binding and re-exports it
          // via the namespace-export part.
          convert_import_like(
            graph,
            options,
            printer,
            source,
            *record,
            Some(item.name),
            true,
            converted,
            || {
              printer.stmt(
                source,
                &Stmt::Import {
                  record: *record,
                  default_name: None,
                  star_name: Some(item.name),
                  items: Vec::new(),
                },
              )
            },
          );
        }
        None => {
          if record_data.calls_runtime_re_export_fn {
            let exports_name = printer.symbol(ast.exports_ref);
            let re_export = printer.symbol(printer.runtime.re_export);
            let second_target = if options.output_format == OutputFormat::CommonJs
              && graph.is_entry_point(source)
            {
              ", module.exports".to_string()
            } else {
              String::new()
            };
            match record_data.source_index {
              None => {
                let ns = meta
                  .import_record_namespace_refs
                  .get(record)
                  .copied();
                if keeps_syntax {
                  if let Some(ns) = ns {
                    converted.outside_wrapper_prefix.push(printer.stmt(
                      source,
                      &Stmt::Import {
                        record: *record,
                        default_name: None,
                        star_name: Some(ns),
                        items: Vec::new(),
                      },
                    ));
                    converted.inside_wrapper_prefix.push(format!(
                      "{}({}, {}{});{}",
                      re_export,
                      exports_name,
                      printer.symbol(ns),
                      second_target,
                      nl
                    ));
                  }
                } else {
                  converted.inside_wrapper_prefix.push(format!(
                    "{}({}, {}({:?}){});{}",
                    re_export,
                    exports_name,
                    printer.symbol(printer.runtime.require),
                    record_data.path,
                    second_target,
                    nl
                  ));
                }
              }
              Some(_) => {
                converted.inside_wrapper_prefix.push(format!(
                  "{}({}, {}{});{}",
                  re_export,
                  exports_name,
                  printer.require_expr(source, *record),
                  second_target,
                  nl
                ));
              }
            }
          } else if record_data.source_index.is_none()
            && keeps_syntax
            && graph.is_entry_point(source)
          {
            // A static external star on an entry stays as written.
            converted
              .inside_wrapper_suffix
              .push(printer.stmt(source, stmt));
          }
          // Internal static stars were folded into resolved_exports.
        }
      }
    }
    Stmt::ExportClause { .. } => {}
    Stmt::ExportDefault { .. } => {
      converted
        .inside_wrapper_suffix
        .push(printer.stmt(source, stmt));
    }
    Stmt::Function { code, .. } => {
      let printed = format!("{}{}", printer.code(source, code), nl);
      if source_is_wrapped_esm {
        // Hoisted declarations escape the init closure entirely.
        converted.outside_wrapper_prefix.push(printed);
      } else {
        converted.inside_wrapper_suffix.push(printed);
      }
    }
    Stmt::Class { name, code, .. } => {
      if source_is_wrapped_esm {
        converted.hoisted_names.push(*name);
        converted.inside_wrapper_suffix.push(format!(
          "{} = {};{}",
          printer.symbol(*name),
          printer.code(source, code),
          nl
        ));
      } else {
        converted
          .inside_wrapper_suffix
          .push(format!("{}{}", printer.code(source, code), nl));
      }
    }
    Stmt::Local { kind, decls, .. } => {
      if source_is_wrapped_esm {
        // Bindings hoist to an outer `var`; initializers become plain
        // assignments inside the init closure.
        for decl in decls {
          converted.hoisted_names.push(decl.name);
        }
        let assignments = decls
          .iter()
          .filter_map(|decl| {
            decl.value.as_ref().map(|value| {
              format!(
                "{} = {}",
                printer.symbol(decl.name),
                printer.code(source, value)
              )
            })
          })
          .collect::<Vec<_>>();
        if !assignments.is_empty() {
          converted
            .inside_wrapper_suffix
            .push(format!("{};{}", assignments.join(", "), nl));
        }
      } else {
        converted.inside_wrapper_suffix.push(printer.stmt(
          source,
          &Stmt::Local {
            kind: *kind,
            is_export: false,
            decls: decls.to_vec(),
          },
        ));
      }
    }
    Stmt::Directive(_) => {}
    Stmt::Expr(_) => {
      converted
        .inside_wrapper_suffix
        .push(printer.stmt(source, stmt));
    }
  }
}

/// Shared rewriting for `import` and `export ... from` statements.
#[allow(clippy::too_many_arguments)]
fn convert_import_like(
  graph: &LinkerGraph,
  options: &BundleOptions,
  printer: &Printer<'_>,
  source: SourceIndex,
  record_index: tern_common::ImportRecordIndex,
  star_name: Option<SymbolRef>,
  has_bindings: bool,
  converted: &mut ConvertedStmts,
  print_original: impl Fn() -> String,
) {
  let ast = graph.js_ast(source).unwrap();
  let meta = &graph.meta[source.idx()];
  let record = &ast.import_records[record_index.idx()];
  let nl = printer.nl();
  let keeps_syntax = options.output_format.keeps_import_export_syntax();

  match record.source_index {
    None => {
      if record.is_disabled {
        return;
      }
      if keeps_syntax {
        // Hoisted so wrapped files keep their imports at top level.
        converted.outside_wrapper_prefix.push(print_original());
        return;
      }
      let require_expr = printer.require_expr(source, record_index);
      if has_bindings {
        let ns = star_name
          .or_else(|| meta.import_record_namespace_refs.get(&record_index).copied());
        match ns {
          Some(ns) => converted.inside_wrapper_prefix.push(format!(
            "var {} = {};{}",
            printer.symbol(ns),
            require_expr,
            nl
          )),
          None => converted
            .inside_wrapper_prefix
            .push(format!("{};{}", require_expr, nl)),
        }
      } else {
        converted
          .inside_wrapper_prefix
          .push(format!("{};{}", require_expr, nl));
      }
    }
    Some(target) => {
      let target_meta = &graph.meta[target.idx()];
      match target_meta.wrap {
        WrapKind::None => {
          // Bindings merged during linking; side effects live through part
          // inclusion. Nothing to print.
        }
        WrapKind::Cjs => {
          let call = printer.require_expr(source, record_index);
          let ns = star_name
            .or_else(|| meta.import_record_namespace_refs.get(&record_index).copied());
          match (has_bindings, ns) {
            (true, Some(ns)) => converted.inside_wrapper_prefix.push(format!(
              "var {} = {};{}",
              printer.symbol(ns),
              call,
              nl
            )),
            _ => converted
              .inside_wrapper_prefix
              .push(format!("{};{}", call, nl)),
          }
        }
        WrapKind::Esm => {
          let target_ast = graph.js_ast(target).unwrap();
          let awaited = target_meta.is_async_or_has_async_dependency
            && (meta.is_async_or_has_async_dependency
              || options.output_format == OutputFormat::EsModule
                && meta.wrap == WrapKind::None);
          converted.inside_wrapper_prefix.push(format!(
            "{}{}();{}",
            if awaited { "await " } else { "" },
            printer.symbol(target_ast.wrapper_ref),
            nl
          ));
        }
      }
    }
  }
}

fn entry_tail(
  graph: &LinkerGraph,
  options: &BundleOptions,
  printer: &Printer<'_>,
  source: SourceIndex,
) -> String {
  let Some(ast) = graph.js_ast(source) else {
    return String::new();
  };
  let meta = &graph.meta[source.idx()];
  let nl = printer.nl();
  let aliases = &meta.sorted_and_filtered_export_aliases;
  let mut out = String::new();

  match options.output_format {
    OutputFormat::Preserve => {
      if meta.wrap != WrapKind::None {
        out.push_str(&format!("{}();{}", printer.symbol(ast.wrapper_ref), nl));
      }
    }
    OutputFormat::Iife => {
      match meta.wrap {
        WrapKind::Cjs => {
          if options.global_name.is_some() {
            out.push_str(&format!(
              "return {}();{}",
              printer.symbol(ast.wrapper_ref),
              nl
            ));
          } else {
            out.push_str(&format!("{}();{}", printer.symbol(ast.wrapper_ref), nl));
          }
        }
        WrapKind::Esm => {
          out.push_str(&format!("{}();{}", printer.symbol(ast.wrapper_ref), nl));
          if options.global_name.is_some() && !aliases.is_empty() {
            out.push_str(&format!(
              "return {}({});{}",
              printer.symbol(printer.runtime.to_common_js),
              printer.symbol(ast.exports_ref),
              nl
            ));
          }
        }
        WrapKind::None => {
          if options.global_name.is_some() && !aliases.is_empty() {
            out.push_str(&format!(
              "return {}({});{}",
              printer.symbol(printer.runtime.to_common_js),
              printer.symbol(ast.exports_ref),
              nl
            ));
          }
        }
      }
    }
    OutputFormat::CommonJs => {
      match meta.wrap {
        WrapKind::Cjs => out.push_str(&format!(
          "module.exports = {}();{}",
          printer.symbol(ast.wrapper_ref),
          nl
        )),
        WrapKind::Esm => {
          out.push_str(&format!("{}();{}", printer.symbol(ast.wrapper_ref), nl))
        }
        WrapKind::None => {}
      }
      // Annotation so cjs-module-lexer consumers see the named exports.
      if options.platform == crate::options::Platform::Node && !aliases.is_empty() {
        let inner = aliases
          .iter()
          .map(|alias| {
            if is_valid_identifier(alias) && !is_reserved_word(alias) {
              alias.clone()
            } else if is_valid_identifier(alias) {
              format!("{}: null", alias)
            } else {
              format!("{:?}: null", alias)
            }
          })
          .collect::<Vec<_>>()
          .join(", ");
        out.push_str(&format!("0 && (module.exports = {{{}}});{}", inner, nl));
      }
    }
    OutputFormat::EsModule => {
      match meta.wrap {
        WrapKind::Cjs => out.push_str(&format!(
          "export default {}();{}",
          printer.symbol(ast.wrapper_ref),
          nl
        )),
        WrapKind::Esm => {
          let awaited = if meta.is_async_or_has_async_dependency {
            "await "
          } else {
            ""
          };
          out.push_str(&format!(
            "{}{}();{}",
            awaited,
            printer.symbol(ast.wrapper_ref),
            nl
          ));
        }
        WrapKind::None => {}
      }

      if !aliases.is_empty() && ast.exports_kind != ExportsKind::CommonJs {
        let copies = &meta.cjs_export_copies;
        let mut items: Vec<String> = Vec::new();
        for (index, alias) in aliases.iter().enumerate() {
          let export = &meta.resolved_exports[alias];
          let canonical = graph.symbols.follow_read(export.sym);
          let has_ns_alias =
            graph.symbols.get(canonical).namespace_alias.is_some()
              || graph.symbols.get(export.sym).namespace_alias.is_some();
          if has_ns_alias && !copies.is_empty() {
            // Materialize a live-looking binding for the property access.
            let copy = copies[index];
            out.push_str(&format!(
              "var {} = {};{}",
              printer.symbol(copy),
              printer.import_symbol(export.sym),
              nl
            ));
            items.push(format_export_item(&printer.symbol(copy), alias));
          } else {
            items.push(format_export_item(&printer.symbol(export.sym), alias));
          }
        }
        out.push_str(&format!("export {{ {} }};{}", items.join(", "), nl));
      }
    }
  }
  out
}

fn format_export_item(local: &str, alias: &str) -> String {
  if local == alias {
    local.to_string()
  } else {
    format!("{} as {}", local, alias)
  }
}

fn is_reserved_word(word: &str) -> bool {
  matches!(
    word,
    "if" | "do" | "in" | "for" | "new" | "try" | "var" | "case" | "else"
      | "this" | "void" | "with" | "break" | "catch" | "class" | "const"
      | "super" | "throw" | "while" | "yield" | "delete" | "export" | "import"
      | "return" | "switch" | "typeof" | "default" | "extends" | "finally"
      | "continue" | "debugger" | "function" | "instanceof"
  )
}

fn render_css_chunk(graph: &LinkerGraph, options: &BundleOptions, chunk: &mut Chunk) {
  let ChunkRepr::Css {
    files_in_chunk_order,
    external_imports,
  } = &chunk.repr
  else {
    unreachable!("render_css_chunk only takes CSS chunks");
  };
  let nl = if options.minify_whitespace { "" } else { "\n" };
  let mut out = String::new();

  for external in external_imports {
    if external.conditions.is_empty() {
      out.push_str(&format!("@import {:?};{}", external.path, nl));
    } else {
      out.push_str(&format!(
        "@import {:?} {};{}",
        external.path,
        external.conditions.join(" "),
        nl
      ));
    }
  }

  for &source in files_in_chunk_order {
    let Some(css) = graph.file_repr(source).as_css() else {
      continue;
    };
    if !options.minify_whitespace {
      out.push_str(&format!("/* {} */\n", graph.files[source.idx()].pretty_path));
    }
    out.push_str(css.source_code.trim_end());
    out.push_str(nl);
  }

  chunk.output_source_map = source_map_pieces(graph, files_in_chunk_order);
  chunk.intermediate_output = break_output_into_pieces(out.into_bytes(), &chunk.unique_key);
}

fn source_map_pieces(graph: &LinkerGraph, files: &[SourceIndex]) -> SourceMapPieces {
  let sources = files
    .iter()
    .filter(|s| **s != RUNTIME_SOURCE_INDEX)
    .map(|s| format!("{:?}", graph.files[s.idx()].pretty_path))
    .collect::<Vec<_>>()
    .join(",");
  SourceMapPieces {
    prefix: format!(
      "{{\"version\":3,\"sources\":[{}],\"names\":[],\"mappings\":\"",
      sources
    )
    .into_bytes(),
    mappings: Vec::new(),
    suffix: "\"}".as_bytes().to_vec(),
  }
}

pub(crate) fn full_source_map(pieces: &SourceMapPieces) -> String {
  let mut out = Vec::new();
  out.extend_from_slice(&pieces.prefix);
  out.extend_from_slice(&pieces.mappings);
  out.extend_from_slice(&pieces.suffix);
  String::from_utf8(out).unwrap_or_default()
}

pub(crate) fn base64_encode(bytes: &[u8]) -> String {
  use base64::Engine;
  base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Splits the rendered bytes at every unique-key placeholder (the shared
/// random prefix, an `A` or `C`, then eight digits) so the path substituter
/// can patch in final paths without re-rendering.
pub(crate) fn break_output_into_pieces(
  bytes: Vec<u8>,
  unique_key: &str,
) -> IntermediateOutput {
  // The chunk's own key is `<prefix>C<8 digits>`; every placeholder in the
  // output shares the prefix.
  let Some(prefix) = unique_key.len().checked_sub(9).map(|n| &unique_key[..n]) else {
    return IntermediateOutput::Joined(bytes);
  };
  if prefix.is_empty() {
    return IntermediateOutput::Joined(bytes);
  }
  let prefix_bytes = prefix.as_bytes();

  let mut pieces: Vec<OutputPiece> = Vec::new();
  let mut start = 0usize;
  let mut cursor = 0usize;
  let mut found_any = false;
  while cursor + prefix_bytes.len() + 9 <= bytes.len() {
    if &bytes[cursor..cursor + prefix_bytes.len()] != prefix_bytes {
      cursor += 1;
      continue;
    }
    let marker = bytes[cursor + prefix_bytes.len()];
    let kind = match marker {
      b'A' => PieceKind::Asset,
      b'C' => PieceKind::Chunk,
      _ => {
        cursor += 1;
        continue;
      }
    };
    let digits = &bytes[cursor + prefix_bytes.len() + 1..cursor + prefix_bytes.len() + 9];
    if !digits.iter().all(|b| b.is_ascii_digit()) {
      cursor += 1;
      continue;
    }
    let index: u32 = std::str::from_utf8(digits).unwrap().parse().unwrap();
    pieces.push(OutputPiece {
      data: bytes[start..cursor].to_vec(),
      index,
      kind,
    });
    found_any = true;
    cursor += prefix_bytes.len() + 9;
    start = cursor;
  }

  if !found_any {
    return IntermediateOutput::Joined(bytes);
  }
  pieces.push(OutputPiece {
    data: bytes[start..].to_vec(),
    index: 0,
    kind: PieceKind::None,
  });
  IntermediateOutput::Pieces(pieces)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn pieces_split_on_placeholders() {
    let key = "k3yC00000001";
    let bytes = b"before k3yC00000002 after".to_vec();
    match break_output_into_pieces(bytes, key) {
      IntermediateOutput::Pieces(pieces) => {
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].data, b"before ");
        assert_eq!(pieces[0].kind, PieceKind::Chunk);
        assert_eq!(pieces[0].index, 2);
        assert_eq!(pieces[1].data, b" after");
        assert_eq!(pieces[1].kind, PieceKind::None);
      }
      _ => panic!("expected pieces"),
    }
  }

  #[test]
  fn no_placeholder_keeps_joined_output() {
    let key = "k3yC00000001";
    let bytes = b"plain output".to_vec();
    assert!(matches!(
      break_output_into_pieces(bytes, key),
      IntermediateOutput::Joined(_)
    ));
  }
}
