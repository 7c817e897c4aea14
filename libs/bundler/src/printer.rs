// Copyright 2024-2026 the Tern authors. MIT license.

//! Deterministic statement printer. Renders the coarse statement IR with
//! the renamer applied to every symbol occurrence. Not a general-purpose
//! JS printer: it never parses, and whitespace is the only thing
//! minification changes here.

use rustc_hash::FxHashMap;
use tern_common::Code;
use tern_common::ImportRecordIndex;
use tern_common::Piece;
use tern_common::SourceIndex;
use tern_common::Stmt;
use tern_common::SymbolRef;

use crate::graph::LinkerGraph;
use crate::graph::WrapKind;
use crate::options::BundleOptions;
use crate::options::OutputFormat;
use crate::rename::Renamer;
use crate::runtime::RuntimeSymbols;
use crate::scan::is_valid_identifier;

pub(crate) struct Printer<'a> {
  pub graph: &'a LinkerGraph,
  pub renamer: &'a Renamer,
  pub options: &'a BundleOptions,
  pub runtime: RuntimeSymbols,
  /// Entry chunk unique key per dynamically imported file; dynamic imports
  /// print these placeholders so the path substituter can patch them.
  pub dynamic_chunk_keys: &'a FxHashMap<SourceIndex, String>,
}

impl Printer<'_> {
  pub fn nl(&self) -> &'static str {
    if self.options.minify_whitespace {
      ""
    } else {
      "\n"
    }
  }

  pub fn symbol(&self, sym: SymbolRef) -> String {
    self.renamer.name_of(self.graph, sym)
  }

  /// An import-identifier occurrence: may lower to a namespace property
  /// access, or to `void 0` when the import is known missing.
  pub fn import_symbol(&self, sym: SymbolRef) -> String {
    let symbol = self.graph.symbols.get(sym);
    if symbol.flags.import_item_missing {
      return "void 0".to_string();
    }
    if let Some(alias) = &symbol.namespace_alias {
      return self.namespace_access(alias.namespace_ref, &alias.alias);
    }
    let canonical = self.graph.symbols.follow_read(sym);
    let canonical_symbol = self.graph.symbols.get(canonical);
    if canonical_symbol.flags.import_item_missing {
      return "void 0".to_string();
    }
    if let Some(alias) = &canonical_symbol.namespace_alias {
      return self.namespace_access(alias.namespace_ref, &alias.alias);
    }
    self.symbol(sym)
  }

  fn namespace_access(&self, ns: SymbolRef, prop: &str) -> String {
    let ns = self.symbol(ns);
    if is_valid_identifier(prop) {
      format!("{}.{}", ns, prop)
    } else {
      format!("{}[{:?}]", ns, prop)
    }
  }

  /// The expression a `require(...)` call site prints as.
  pub fn require_expr(&self, source: SourceIndex, record_index: ImportRecordIndex) -> String {
    let ast = self.graph.js_ast(source).expect("require in a JS file");
    let record = &ast.import_records[record_index.idx()];
    match record.source_index {
      None => {
        let call = self.external_require_call(&record.path);
        if record.wrap_with_to_esm {
          self.to_esm(call)
        } else {
          call
        }
      }
      Some(target) => {
        let target_meta = &self.graph.meta[target.idx()];
        let target_ast = self.graph.js_ast(target);
        match target_meta.wrap {
          WrapKind::Cjs => {
            let call = format!(
              "{}()",
              self.symbol(target_ast.expect("wrapped target is JS").wrapper_ref)
            );
            if record.wrap_with_to_esm {
              self.to_esm(call)
            } else {
              call
            }
          }
          WrapKind::Esm => {
            let target_ast = target_ast.expect("wrapped target is JS");
            format!(
              "({}(), {}({}))",
              self.symbol(target_ast.wrapper_ref),
              self.symbol(self.runtime.to_common_js),
              self.symbol(target_ast.exports_ref)
            )
          }
          WrapKind::None => "void 0".to_string(),
        }
      }
    }
  }

  /// The expression an `import(...)` call site prints as.
  pub fn dynamic_import_expr(
    &self,
    source: SourceIndex,
    record_index: ImportRecordIndex,
  ) -> String {
    let ast = self.graph.js_ast(source).expect("dynamic import in a JS file");
    let record = &ast.import_records[record_index.idx()];
    match record.source_index {
      None => {
        if self.options.output_format.keeps_import_export_syntax() {
          format!("import({:?})", record.path)
        } else {
          format!(
            "Promise.resolve().then(() => {})",
            self.to_esm(self.external_require_call(&record.path))
          )
        }
      }
      Some(target) => {
        if self.options.code_splitting {
          match self.dynamic_chunk_keys.get(&target) {
            Some(key) => format!("import({:?})", key),
            None => format!("import({:?})", record.path),
          }
        } else {
          // Inlined: resolve to the target's namespace object.
          let inner = match self.graph.meta[target.idx()].wrap {
            WrapKind::Esm => {
              let target_ast = self.graph.js_ast(target).expect("wrapped target is JS");
              format!(
                "({}(), {})",
                self.symbol(target_ast.wrapper_ref),
                self.symbol(target_ast.exports_ref)
              )
            }
            _ => self.require_expr(source, record_index),
          };
          format!("Promise.resolve().then(() => {})", inner)
        }
      }
    }
  }

  fn external_require_call(&self, path: &str) -> String {
    if self.options.output_format == OutputFormat::CommonJs {
      format!("require({:?})", path)
    } else {
      format!("{}({:?})", self.symbol(self.runtime.require), path)
    }
  }

  fn to_esm(&self, inner: String) -> String {
    let node_mode = if self.options.platform == crate::options::Platform::Node {
      ", 1"
    } else {
      ""
    };
    format!("{}({}{})", self.symbol(self.runtime.to_esm), inner, node_mode)
  }

  pub fn code(&self, source: SourceIndex, code: &Code) -> String {
    let mut out = String::new();
    for piece in &code.pieces {
      match piece {
        Piece::Text(text) => out.push_str(text),
        Piece::Ref(sym) => out.push_str(&self.symbol(*sym)),
        Piece::ImportRef(sym) => out.push_str(&self.import_symbol(*sym)),
        Piece::Require(record) => out.push_str(&self.require_expr(source, *record)),
        Piece::DynamicImport(record) => {
          out.push_str(&self.dynamic_import_expr(source, *record))
        }
      }
    }
    out
  }

  /// Raw statement form, used where import/export syntax survives into the
  /// output. The renderer rewrites most statements before printing; this
  /// handles whatever is left over.
  pub fn stmt(&self, source: SourceIndex, stmt: &Stmt) -> String {
    let ast = self.graph.js_ast(source).expect("printing a JS statement");
    match stmt {
      Stmt::Directive(text) => format!("{:?};{}", text, self.nl()),
      Stmt::Import {
        record,
        default_name,
        star_name,
        items,
      } => {
        let path = &ast.import_records[record.idx()].path;
        let mut clauses: Vec<String> = Vec::new();
        if let Some(default_name) = default_name {
          clauses.push(self.symbol(*default_name));
        }
        if let Some(star_name) = star_name {
          clauses.push(format!("* as {}", self.symbol(*star_name)));
        }
        if !items.is_empty() {
          let inner = items
            .iter()
            .map(|item| {
              let local = self.symbol(item.name);
              if local == item.alias {
                local
              } else {
                format!("{} as {}", item.alias, local)
              }
            })
            .collect::<Vec<_>>()
            .join(", ");
          clauses.push(format!("{{ {} }}", inner));
        }
        if clauses.is_empty() {
          format!("import {:?};{}", path, self.nl())
        } else {
          format!("import {} from {:?};{}", clauses.join(", "), path, self.nl())
        }
      }
      Stmt::ExportStar { record, alias } => {
        let path = &ast.import_records[record.idx()].path;
        match alias {
          Some(item) => {
            format!("export * as {} from {:?};{}", item.alias, path, self.nl())
          }
          None => format!("export * from {:?};{}", path, self.nl()),
        }
      }
      Stmt::ExportFrom { record, items, .. } => {
        let path = &ast.import_records[record.idx()].path;
        let inner = items
          .iter()
          .map(|item| item.alias.clone())
          .collect::<Vec<_>>()
          .join(", ");
        format!("export {{ {} }} from {:?};{}", inner, path, self.nl())
      }
      Stmt::ExportClause { items } => {
        let inner = items
          .iter()
          .map(|item| {
            let local = self.symbol(item.name);
            if local == item.alias {
              local
            } else {
              format!("{} as {}", local, item.alias)
            }
          })
          .collect::<Vec<_>>()
          .join(", ");
        format!("export {{ {} }};{}", inner, self.nl())
      }
      Stmt::ExportDefault {
        default_name,
        value,
      } => match value {
        tern_common::DefaultValue::Expr(code) => format!(
          "var {} = {};{}",
          self.symbol(*default_name),
          self.code(source, code),
          self.nl()
        ),
        tern_common::DefaultValue::Decl(code) => {
          format!("{}{}", self.code(source, code), self.nl())
        }
      },
      Stmt::Function { code, .. } | Stmt::Class { code, .. } => {
        format!("{}{}", self.code(source, code), self.nl())
      }
      Stmt::Local { kind, decls, .. } => {
        let inner = decls
          .iter()
          .map(|decl| match &decl.value {
            Some(value) => {
              format!("{} = {}", self.symbol(decl.name), self.code(source, value))
            }
            None => self.symbol(decl.name),
          })
          .collect::<Vec<_>>()
          .join(", ");
        format!("{} {};{}", kind.keyword(), inner, self.nl())
      }
      Stmt::Expr(code) => format!("{};{}", self.code(source, code), self.nl()),
    }
  }
}
