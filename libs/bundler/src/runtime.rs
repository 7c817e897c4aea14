// Copyright 2024-2026 the Tern authors. MIT license.

//! The synthetic runtime module.
//!
//! Wrapped output depends on a small set of helpers. They live in a regular
//! file at source index 0 so tree shaking, chunk assignment and renaming
//! treat them like user code; each helper sits in its own part and is only
//! included when something depends on it.

use tern_common::Code;
use tern_common::DeclaredSymbol;
use tern_common::FileRepr;
use tern_common::FileSideEffects;
use tern_common::InputFile;
use tern_common::JsAst;
use tern_common::KeyPath;
use tern_common::LoaderKind;
use tern_common::LocalDecl;
use tern_common::LocalKind;
use tern_common::NamedExport;
use tern_common::Part;
use tern_common::Stmt;
use tern_common::SymbolKind;
use tern_common::SymbolRef;
use tern_common::SymbolTable;
use tern_common::Loc;
use tern_common::RUNTIME_SOURCE_INDEX;

pub const TO_ESM: &str = "__toESM";
pub const TO_COMMON_JS: &str = "__toCommonJS";
pub const REQUIRE: &str = "__require";
pub const RE_EXPORT: &str = "__reExport";
pub const EXPORT: &str = "__export";
pub const COMMON_JS: &str = "__commonJS";
pub const ESM: &str = "__esm";

const HELPERS: &[(&str, &str)] = &[
  (
    REQUIRE,
    " = typeof require !== \"undefined\" ? require : (x) => {\n  throw Error('Dynamic require of \"' + x + '\" is not supported');\n}",
  ),
  (
    COMMON_JS,
    " = (cb, mod) => function () {\n  return mod || (0, cb[Object.keys(cb)[0]])((mod = { exports: {} }).exports, mod), mod.exports;\n}",
  ),
  (
    ESM,
    " = (fn, res) => function () {\n  return fn && (res = (0, fn[Object.keys(fn)[0]])(fn = 0)), res;\n}",
  ),
  (
    EXPORT,
    " = (target, all) => {\n  for (var name in all)\n    Object.defineProperty(target, name, { get: all[name], enumerable: true });\n}",
  ),
  (
    RE_EXPORT,
    " = (target, mod, secondTarget) => {\n  for (var key of Object.keys(mod))\n    if (key !== \"default\" && !Object.prototype.hasOwnProperty.call(target, key))\n      Object.defineProperty(target, key, { get: () => mod[key], enumerable: true });\n  if (secondTarget) __reExport(secondTarget, mod);\n  return target;\n}",
  ),
  (
    TO_ESM,
    " = (mod, isNodeMode) => {\n  var target = {};\n  for (var key in mod) target[key] = mod[key];\n  if (!isNodeMode && (!mod || !mod.__esModule))\n    Object.defineProperty(target, \"default\", { value: mod, enumerable: true });\n  return target;\n}",
  ),
  (
    TO_COMMON_JS,
    " = (mod) => {\n  var target = {};\n  Object.defineProperty(target, \"__esModule\", { value: true });\n  for (var key of Object.keys(mod))\n    Object.defineProperty(target, key, { get: () => mod[key], enumerable: true });\n  return target;\n}",
  ),
];

/// Builds the runtime file. The caller must place it at source index 0 and
/// register its symbols in file 0 of the table.
pub fn runtime_file(symbols: &mut SymbolTable) -> InputFile {
  let mut ast = JsAst {
    exports_kind: tern_common::ExportsKind::Esm,
    ..Default::default()
  };
  ast.exports_ref = symbols.create(RUNTIME_SOURCE_INDEX, "exports", SymbolKind::Other);
  ast.module_ref = symbols.create(RUNTIME_SOURCE_INDEX, "module", SymbolKind::Other);
  ast.wrapper_ref = symbols.create(RUNTIME_SOURCE_INDEX, "require_runtime", SymbolKind::Other);

  // Part 0 (runtime imports) and part 1 (namespace exports) stay empty but
  // reserved, same as every other file.
  ast.parts.push(Part::default());
  ast.parts.push(Part::default());

  for (name, body) in HELPERS {
    let sym = symbols.create(RUNTIME_SOURCE_INDEX, *name, SymbolKind::Hoisted);
    symbols.get_mut(sym).flags.could_potentially_be_mutated = false;

    let mut code = Code::default();
    code.push_text(*body);
    let mut part = Part::with_stmts(vec![Stmt::Local {
      kind: LocalKind::Var,
      is_export: false,
      decls: vec![LocalDecl {
        name: sym,
        value: Some(code),
      }],
    }]);
    part.declared_symbols.push(DeclaredSymbol {
      sym,
      is_top_level: true,
    });
    part.can_be_removed_if_unused = true;
    ast.parts.push(part);

    ast.named_exports.insert(
      (*name).to_string(),
      NamedExport {
        sym,
        alias_loc: Loc::default(),
      },
    );
  }

  InputFile {
    source: String::new(),
    pretty_path: "<runtime>".to_string(),
    key_path: KeyPath {
      namespace: "runtime".to_string(),
      text: "<runtime>".to_string(),
    },
    loader: LoaderKind::Js,
    side_effects: FileSideEffects::NoSideEffects,
    legal_comments: Vec::new(),
    repr: FileRepr::Js(ast),
  }
}

/// Resolved refs of the helpers the linker wires dependencies to.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeSymbols {
  pub to_esm: SymbolRef,
  pub to_common_js: SymbolRef,
  pub require: SymbolRef,
  pub re_export: SymbolRef,
  pub export: SymbolRef,
  pub common_js: SymbolRef,
  pub esm: SymbolRef,
}
