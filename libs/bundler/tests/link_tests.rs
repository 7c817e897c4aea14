// Copyright 2024-2026 the Tern authors. MIT license.

//! End-to-end linker tests over hand-built module graphs. The builder plays
//! the role of the scan phase: it produces parsed files with parts, named
//! imports/exports, and import records, exactly what `link` consumes.

use pretty_assertions::assert_eq;
use tern_bundler::link;
use tern_bundler::runtime;
use tern_bundler::BundleOptions;
use tern_bundler::EntryPoint;
use tern_bundler::EntryPointKind;
use tern_bundler::Log;
use tern_bundler::MsgKind;
use tern_bundler::OutputFile;
use tern_bundler::OutputFormat;
use tern_bundler::Platform;
use tern_common::ClauseItem;
use tern_common::Code;
use tern_common::DeclaredSymbol;
use tern_common::ExportsKind;
use tern_common::FileRepr;
use tern_common::FileSideEffects;
use tern_common::ImportKind;
use tern_common::ImportRecord;
use tern_common::ImportRecordIndex;
use tern_common::InputFile;
use tern_common::JsAst;
use tern_common::KeyPath;
use tern_common::LoaderKind;
use tern_common::Loc;
use tern_common::LocalDecl;
use tern_common::LocalKind;
use tern_common::NamedExport;
use tern_common::NamedImport;
use tern_common::Part;
use tern_common::Piece;
use tern_common::SourceIndex;
use tern_common::Stmt;
use tern_common::SymbolKind;
use tern_common::SymbolRef;
use tern_common::SymbolTable;

struct GraphBuilder {
  files: Vec<InputFile>,
  symbols: SymbolTable,
}

impl GraphBuilder {
  fn new() -> Self {
    let mut symbols = SymbolTable::default();
    symbols.add_file();
    let runtime = runtime::runtime_file(&mut symbols);
    Self {
      files: vec![runtime],
      symbols,
    }
  }

  fn add_js(&mut self, pretty_path: &str) -> SourceIndex {
    let source = self.symbols.add_file();
    let mut ast = JsAst::default();
    ast.exports_ref = self.symbols.create(source, "exports", SymbolKind::Other);
    ast.module_ref = self.symbols.create(source, "module", SymbolKind::Other);
    ast.wrapper_ref = self.symbols.create(source, "wrapper", SymbolKind::Other);
    ast.parts.push(Part::default());
    ast.parts.push(Part::default());
    self.files.push(InputFile {
      source: String::new(),
      pretty_path: pretty_path.to_string(),
      key_path: KeyPath::file(pretty_path),
      loader: LoaderKind::Js,
      side_effects: FileSideEffects::HasSideEffects,
      legal_comments: Vec::new(),
      repr: FileRepr::Js(ast),
    });
    source
  }

  fn ast_mut(&mut self, source: SourceIndex) -> &mut JsAst {
    self.files[source.idx()].js_ast_mut()
  }

  fn record(
    &mut self,
    source: SourceIndex,
    path: &str,
    kind: ImportKind,
    target: Option<SourceIndex>,
  ) -> ImportRecordIndex {
    let record = match target {
      Some(target) => ImportRecord::resolved(path, kind, target),
      None => ImportRecord::new(path, kind),
    };
    let ast = self.ast_mut(source);
    let index = ImportRecordIndex::new(ast.import_records.len() as u32);
    ast.import_records.push(record);
    index
  }

  fn export_let(&mut self, source: SourceIndex, name: &str, value: &str) -> SymbolRef {
    let sym = self.symbols.create(source, name, SymbolKind::Other);
    let mut part = Part::with_stmts(vec![Stmt::Local {
      kind: LocalKind::Let,
      is_export: true,
      decls: vec![LocalDecl {
        name: sym,
        value: Some(Code::text(value)),
      }],
    }]);
    part.declared_symbols.push(DeclaredSymbol {
      sym,
      is_top_level: true,
    });
    part.can_be_removed_if_unused = true;
    let ast = self.ast_mut(source);
    ast.parts.push(part);
    ast.named_exports.insert(
      name.to_string(),
      NamedExport {
        sym,
        alias_loc: Loc::default(),
      },
    );
    ast.exports_kind = ExportsKind::Esm;
    sym
  }

  fn import_items(
    &mut self,
    source: SourceIndex,
    record: ImportRecordIndex,
    items: &[(&str, &str)],
  ) -> Vec<SymbolRef> {
    let mut clause = Vec::new();
    let mut syms = Vec::new();
    for (alias, local) in items {
      let sym = self.symbols.create(source, *local, SymbolKind::Import);
      self.ast_mut(source).named_imports.insert(
        sym,
        NamedImport {
          alias: (*alias).to_string(),
          alias_loc: Loc::default(),
          import_record_index: record,
          namespace_ref: None,
          is_exported: false,
          is_generated: false,
        },
      );
      clause.push(ClauseItem {
        alias: (*alias).to_string(),
        name: sym,
      });
      syms.push(sym);
    }
    let mut part = Part::with_stmts(vec![Stmt::Import {
      record,
      default_name: None,
      star_name: None,
      items: clause,
    }]);
    part.import_record_indices.push(record);
    part.can_be_removed_if_unused = true;
    self.ast_mut(source).parts.push(part);
    syms
  }

  fn import_star(
    &mut self,
    source: SourceIndex,
    record: ImportRecordIndex,
    local: &str,
  ) -> SymbolRef {
    let sym = self.symbols.create(source, local, SymbolKind::Import);
    {
      let ast = self.ast_mut(source);
      ast.named_imports.insert(
        sym,
        NamedImport {
          alias: "*".to_string(),
          alias_loc: Loc::default(),
          import_record_index: record,
          namespace_ref: None,
          is_exported: false,
          is_generated: false,
        },
      );
      ast.import_records[record.idx()].contains_import_star = true;
    }
    let mut part = Part::with_stmts(vec![Stmt::Import {
      record,
      default_name: None,
      star_name: Some(sym),
      items: Vec::new(),
    }]);
    part.import_record_indices.push(record);
    part.can_be_removed_if_unused = true;
    part.declared_symbols.push(DeclaredSymbol {
      sym,
      is_top_level: true,
    });
    self.ast_mut(source).parts.push(part);
    sym
  }

  fn export_star(&mut self, source: SourceIndex, record: ImportRecordIndex) {
    let mut part = Part::with_stmts(vec![Stmt::ExportStar {
      record,
      alias: None,
    }]);
    part.import_record_indices.push(record);
    part.can_be_removed_if_unused = true;
    let ast = self.ast_mut(source);
    ast.export_star_import_records.push(record);
    ast.parts.push(part);
    if ast.exports_kind == ExportsKind::None {
      ast.exports_kind = ExportsKind::Esm;
    }
  }

  /// A side-effectful top-level statement; never tree-shaken.
  fn statement(
    &mut self,
    source: SourceIndex,
    code: Code,
    uses: &[SymbolRef],
    records: &[ImportRecordIndex],
  ) {
    let mut part = Part::with_stmts(vec![Stmt::Expr(code)]);
    for sym in uses {
      part.symbol_uses.entry(*sym).or_default().count_estimate += 1;
    }
    part.import_record_indices.extend_from_slice(records);
    self.ast_mut(source).parts.push(part);
  }

  /// `module.exports = <value>` in a CommonJS module.
  fn cjs_module_exports(&mut self, source: SourceIndex, value: &str) {
    let module_ref = self.ast_mut(source).module_ref;
    let mut code = Code::default();
    code.push_ref(module_ref);
    code.push_text(format!(".exports = {}", value));
    let mut part = Part::with_stmts(vec![Stmt::Expr(code)]);
    part.symbol_uses.entry(module_ref).or_default().count_estimate += 1;
    let ast = self.ast_mut(source);
    ast.parts.push(part);
    ast.exports_kind = ExportsKind::CommonJs;
    ast.uses_module_ref = true;
  }

  fn link(self, options: &BundleOptions, entries: &[SourceIndex]) -> (Vec<OutputFile>, Log) {
    let log = Log::new();
    let reachable: Vec<SourceIndex> = (0..self.files.len())
      .map(|i| SourceIndex::new(i as u32))
      .collect();
    let entry_points: Vec<EntryPoint> = entries
      .iter()
      .map(|source| EntryPoint {
        source: *source,
        output_path: None,
        kind: EntryPointKind::User,
      })
      .collect();
    let outputs = link(
      options,
      &log,
      None,
      self.files,
      self.symbols,
      entry_points,
      "tk1",
      reachable,
    );
    (outputs, log)
  }
}

fn esm_options() -> BundleOptions {
  BundleOptions {
    output_format: OutputFormat::EsModule,
    ..Default::default()
  }
}

fn text_of(output: &OutputFile) -> String {
  String::from_utf8(output.contents.clone()).unwrap()
}

fn console_log(sym: SymbolRef) -> Code {
  let mut code = Code::default();
  code.push_text("console.log(");
  code.push_import_ref(sym);
  code.push_text(")");
  code
}

#[test]
fn direct_export_shadows_export_star() {
  let mut b = GraphBuilder::new();
  let a = b.add_js("a.js");
  b.export_let(a, "x", "1");
  let bb = b.add_js("b.js");
  b.export_let(bb, "x", "2");
  let c = b.add_js("c.js");
  let ra = b.record(c, "./a", ImportKind::Stmt, Some(a));
  let rb = b.record(c, "./b", ImportKind::Stmt, Some(bb));
  b.export_star(c, ra);
  b.export_star(c, rb);
  b.export_let(c, "x", "3");
  let entry = b.add_js("entry.js");
  let rc = b.record(entry, "./c", ImportKind::Stmt, Some(c));
  let x = b.import_items(entry, rc, &[("x", "x")])[0];
  b.statement(entry, console_log(x), &[x], &[]);

  let (outputs, log) = b.link(&esm_options(), &[entry]);
  assert!(!log.has_errors(), "{:?}", log.msgs());
  assert_eq!(outputs.len(), 1);
  let text = text_of(&outputs[0]);
  assert!(text.contains("let x = 3;"), "{}", text);
  assert!(text.contains("console.log(x)"), "{}", text);
  // The shadowed candidates tree-shake away entirely.
  assert!(!text.contains("= 1"), "{}", text);
  assert!(!text.contains("= 2"), "{}", text);
}

#[test]
fn overlapping_export_stars_are_ambiguous() {
  let mut b = GraphBuilder::new();
  let a = b.add_js("a.js");
  b.export_let(a, "y", "1");
  let bb = b.add_js("b.js");
  b.export_let(bb, "y", "2");
  let c = b.add_js("c.js");
  let ra = b.record(c, "./a", ImportKind::Stmt, Some(a));
  let rb = b.record(c, "./b", ImportKind::Stmt, Some(bb));
  b.export_star(c, ra);
  b.export_star(c, rb);
  let entry = b.add_js("entry.js");
  let rc = b.record(entry, "./c", ImportKind::Stmt, Some(c));
  let y = b.import_items(entry, rc, &[("y", "y")])[0];
  b.statement(entry, console_log(y), &[y], &[]);

  let (outputs, log) = b.link(&esm_options(), &[entry]);
  assert!(outputs.is_empty());
  let errors: Vec<_> = log
    .msgs()
    .into_iter()
    .filter(|m| m.kind == MsgKind::Error)
    .collect();
  assert_eq!(errors.len(), 1);
  assert_eq!(
    errors[0].text,
    "Ambiguous import \"y\" has multiple matching exports"
  );
  assert_eq!(errors[0].notes.len(), 2);
  let files: Vec<_> = errors[0]
    .notes
    .iter()
    .filter_map(|n| n.location.as_ref().map(|l| l.file.clone()))
    .collect();
  assert!(files.contains(&"a.js".to_string()), "{:?}", files);
  assert!(files.contains(&"b.js".to_string()), "{:?}", files);
}

#[test]
fn missing_export_is_an_error() {
  let mut b = GraphBuilder::new();
  let dep = b.add_js("dep.js");
  b.export_let(dep, "x", "1");
  let entry = b.add_js("entry.js");
  let rd = b.record(entry, "./dep", ImportKind::Stmt, Some(dep));
  let missing = b.import_items(entry, rd, &[("missing", "missing")])[0];
  b.statement(entry, console_log(missing), &[missing], &[]);

  let (outputs, log) = b.link(&esm_options(), &[entry]);
  assert!(outputs.is_empty());
  let errors: Vec<_> = log
    .msgs()
    .into_iter()
    .filter(|m| m.kind == MsgKind::Error)
    .collect();
  assert_eq!(errors.len(), 1);
  assert_eq!(
    errors[0].text,
    "No matching export in \"dep.js\" for import \"missing\""
  );
}

#[test]
fn dynamic_import_splits_into_two_chunks() {
  let mut b = GraphBuilder::new();
  let target = b.add_js("feature.js");
  b.export_let(target, "feature", "1");
  let entry = b.add_js("main.js");
  let rd = b.record(entry, "./feature", ImportKind::Dynamic, Some(target));
  let mut code = Code::default();
  code.pieces.push(Piece::DynamicImport(rd));
  b.statement(entry, code, &[], &[rd]);

  let options = BundleOptions {
    output_format: OutputFormat::EsModule,
    code_splitting: true,
    ..Default::default()
  };
  let (outputs, log) = b.link(&options, &[entry]);
  assert!(!log.has_errors(), "{:?}", log.msgs());
  assert_eq!(outputs.len(), 2);

  let main = outputs
    .iter()
    .find(|o| o.abs_path.to_string_lossy().contains("main"))
    .unwrap();
  let feature = outputs
    .iter()
    .find(|o| o.abs_path.to_string_lossy().contains("feature"))
    .unwrap();

  // The dynamic import references the other chunk's final relative path.
  let feature_rel = feature
    .abs_path
    .to_string_lossy()
    .trim_start_matches("./")
    .to_string();
  let main_text = text_of(main);
  assert!(
    main_text.contains(&format!("import(\"./{}\")", feature_rel)),
    "main: {} feature: {}",
    main_text,
    feature_rel
  );
  let feature_text = text_of(feature);
  assert!(feature_text.contains("export { feature }"), "{}", feature_text);
}

#[test]
fn dependency_content_changes_importer_final_hash() {
  let build = |value: &str| {
    let mut b = GraphBuilder::new();
    let target = b.add_js("feature.js");
    b.export_let(target, "feature", value);
    let entry = b.add_js("main.js");
    let rd = b.record(entry, "./feature", ImportKind::Dynamic, Some(target));
    let mut code = Code::default();
    code.pieces.push(Piece::DynamicImport(rd));
    b.statement(entry, code, &[], &[rd]);
    let options = BundleOptions {
      output_format: OutputFormat::EsModule,
      code_splitting: true,
      entry_path_template: "[name]-[hash].[ext]".to_string(),
      ..Default::default()
    };
    b.link(&options, &[entry])
  };

  let (first, _) = build("1");
  let (second, _) = build("2");
  let path_of = |outputs: &[OutputFile], name: &str| {
    outputs
      .iter()
      .find(|o| o.abs_path.to_string_lossy().contains(name))
      .unwrap()
      .abs_path
      .clone()
  };
  // The importing chunk's bytes only change via the embedded path, but its
  // final hash must absorb the dependency's content change.
  assert_ne!(path_of(&first, "main"), path_of(&second, "main"));
  assert_ne!(path_of(&first, "feature"), path_of(&second, "feature"));
}

#[test]
fn deterministic_output_across_runs() {
  let build = || {
    let mut b = GraphBuilder::new();
    let dep = b.add_js("dep.js");
    b.export_let(dep, "value", "42");
    b.export_let(dep, "other", "7");
    let entry = b.add_js("entry.js");
    let rd = b.record(entry, "./dep", ImportKind::Stmt, Some(dep));
    let value = b.import_items(entry, rd, &[("value", "value")])[0];
    b.statement(entry, console_log(value), &[value], &[]);
    b.export_let(entry, "reexported", "true");
    let options = BundleOptions {
      output_format: OutputFormat::EsModule,
      entry_path_template: "[name]-[hash].[ext]".to_string(),
      ..Default::default()
    };
    b.link(&options, &[entry])
  };

  let (first, _) = build();
  let (second, _) = build();
  assert_eq!(first.len(), second.len());
  for (a, b) in first.iter().zip(second.iter()) {
    assert_eq!(a.abs_path, b.abs_path);
    assert_eq!(text_of(a), text_of(b));
  }
}

#[test]
fn require_of_esm_wraps_with_init() {
  let mut b = GraphBuilder::new();
  let demo = b.add_js("demo.js");
  b.export_let(demo, "value", "1");
  b.statement(demo, Code::text("console.log(\"demo side effect\")"), &[], &[]);
  let entry = b.add_js("entry.js");
  let rr = b.record(entry, "./demo", ImportKind::Require, Some(demo));
  let mut code = Code::default();
  code.push_text("const demo = ");
  code.pieces.push(Piece::Require(rr));
  b.statement(entry, code, &[], &[rr]);

  let (outputs, log) = b.link(&esm_options(), &[entry]);
  assert!(!log.has_errors(), "{:?}", log.msgs());
  assert_eq!(outputs.len(), 1);
  let text = text_of(&outputs[0]);
  // The ESM body becomes an init wrapper and the require site becomes an
  // init-then-namespace expression.
  assert!(text.contains("var init_demo = __esm("), "{}", text);
  assert!(text.contains("(init_demo(), __toCommonJS(demo_exports))"), "{}", text);
  // The namespace object is materialized eagerly, outside the closure.
  assert!(text.contains("__export(demo_exports"), "{}", text);
  assert!(text.contains("console.log(\"demo side effect\")"), "{}", text);
}

#[test]
fn import_star_of_commonjs_goes_through_to_esm() {
  let mut b = GraphBuilder::new();
  let cjs = b.add_js("cjs.js");
  b.cjs_module_exports(cjs, "{ x: 1 }");
  let entry = b.add_js("entry.js");
  let rc = b.record(entry, "./cjs", ImportKind::Stmt, Some(cjs));
  let ns = b.import_star(entry, rc, "ns");
  let mut code = Code::default();
  code.push_text("console.log(");
  code.push_ref(ns);
  code.push_text(".x)");
  b.statement(entry, code, &[ns], &[]);

  let (outputs, log) = b.link(&esm_options(), &[entry]);
  assert!(!log.has_errors(), "{:?}", log.msgs());
  let text = text_of(&outputs[0]);
  assert!(text.contains("var require_cjs = __commonJS("), "{}", text);
  assert!(text.contains("module.exports = { x: 1 }"), "{}", text);
  assert!(text.contains("var ns = __toESM(require_cjs())"), "{}", text);
  assert!(text.contains("console.log(ns.x)"), "{}", text);
}

#[test]
fn named_import_of_commonjs_becomes_property_access() {
  let mut b = GraphBuilder::new();
  let cjs = b.add_js("store.js");
  b.cjs_module_exports(cjs, "{ x: 1 }");
  let entry = b.add_js("entry.js");
  let rc = b.record(entry, "./store", ImportKind::Stmt, Some(cjs));
  let x = b.import_items(entry, rc, &[("x", "x")])[0];
  b.statement(entry, console_log(x), &[x], &[]);

  let (outputs, log) = b.link(&esm_options(), &[entry]);
  assert!(!log.has_errors(), "{:?}", log.msgs());
  let text = text_of(&outputs[0]);
  assert!(text.contains("var import_store = require_store()"), "{}", text);
  assert!(text.contains("console.log(import_store.x)"), "{}", text);
}

#[test]
fn esm_entry_exports_survive_round_trip() {
  let mut b = GraphBuilder::new();
  let entry = b.add_js("entry.js");
  b.export_let(entry, "alpha", "1");
  b.export_let(entry, "beta", "2");

  let (outputs, log) = b.link(&esm_options(), &[entry]);
  assert!(!log.has_errors(), "{:?}", log.msgs());
  let text = text_of(&outputs[0]);
  assert!(text.contains("export { alpha, beta }"), "{}", text);
  // Plain ESM output has no need for the runtime namespace machinery.
  assert!(!text.contains("__export("), "{}", text);
}

#[test]
fn unused_exports_tree_shake_away() {
  let mut b = GraphBuilder::new();
  let dep = b.add_js("dep.js");
  b.export_let(dep, "used", "1");
  b.export_let(dep, "unused", "2");
  let entry = b.add_js("entry.js");
  let rd = b.record(entry, "./dep", ImportKind::Stmt, Some(dep));
  let used = b.import_items(entry, rd, &[("used", "used")])[0];
  b.statement(entry, console_log(used), &[used], &[]);

  let (outputs, log) = b.link(&esm_options(), &[entry]);
  assert!(!log.has_errors(), "{:?}", log.msgs());
  let text = text_of(&outputs[0]);
  assert!(text.contains("let used = 1;"), "{}", text);
  assert!(!text.contains("unused"), "{}", text);
}

#[test]
fn iife_output_wraps_everything() {
  let mut b = GraphBuilder::new();
  let entry = b.add_js("entry.js");
  b.statement(entry, Code::text("console.log(\"hi\")"), &[], &[]);

  let options = BundleOptions {
    output_format: OutputFormat::Iife,
    ..Default::default()
  };
  let (outputs, log) = b.link(&options, &[entry]);
  assert!(!log.has_errors(), "{:?}", log.msgs());
  let text = text_of(&outputs[0]);
  assert!(text.starts_with("(() => {"), "{}", text);
  assert!(text.trim_end().ends_with("})();"), "{}", text);
}

#[test]
fn commonjs_entry_gets_node_annotation() {
  let mut b = GraphBuilder::new();
  let entry = b.add_js("entry.js");
  b.export_let(entry, "alpha", "1");
  b.export_let(entry, "if", "2");

  let options = BundleOptions {
    output_format: OutputFormat::CommonJs,
    platform: Platform::Node,
    ..Default::default()
  };
  let (outputs, log) = b.link(&options, &[entry]);
  assert!(!log.has_errors(), "{:?}", log.msgs());
  let text = text_of(&outputs[0]);
  assert!(text.contains("module.exports = __toCommonJS("), "{}", text);
  assert!(
    text.contains("0 && (module.exports = {alpha, if: null});"),
    "{}",
    text
  );
}

#[test]
fn minified_identifiers_use_short_names() {
  let mut b = GraphBuilder::new();
  let dep = b.add_js("dep.js");
  let long = b.export_let(dep, "extremelyLongExportedName", "1");
  let _ = long;
  let entry = b.add_js("entry.js");
  let rd = b.record(entry, "./dep", ImportKind::Stmt, Some(dep));
  let item = b.import_items(entry, rd, &[("extremelyLongExportedName", "extremelyLongExportedName")])[0];
  b.statement(entry, console_log(item), &[item], &[]);

  let options = BundleOptions {
    output_format: OutputFormat::EsModule,
    minify_identifiers: true,
    ..Default::default()
  };
  let (outputs, log) = b.link(&options, &[entry]);
  assert!(!log.has_errors(), "{:?}", log.msgs());
  let text = text_of(&outputs[0]);
  assert!(!text.contains("extremelyLongExportedName"), "{}", text);
}
