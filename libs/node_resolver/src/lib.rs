// Copyright 2024-2026 the Tern authors. MIT license.

//! Node-style package resolution for the Tern bundler.
//!
//! Implements the `exports`/`imports` conditional maps with pattern keys,
//! legacy `main`-field resolution driven by an ordered field list, and
//! `browser` map overrides. The bundler consults this crate both to build
//! the module graph and to explain resolution failures: every error carries
//! the notes that end up attached to the `Could not resolve "..."`
//! diagnostic.

mod errors;
mod exports;
mod fs;
mod package_json;

pub use errors::ErrorCode;
pub use errors::ResolveError;
pub use fs::InMemoryFs;
pub use fs::RealFs;
pub use fs::ResolverFs;
pub use package_json::get_package_scope_config;
pub use package_json::PackageConfig;

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use path_clean::PathClean;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Platform {
  #[default]
  Browser,
  Node,
  Neutral,
}

/// How the importing file refers to the target. Import and require activate
/// different `exports` conditions; CSS `@import` behaves like `import`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveKind {
  Import,
  Require,
  At,
}

impl ResolveKind {
  fn is_require(self) -> bool {
    matches!(self, ResolveKind::Require)
  }
}

/// Successful resolution outcomes. `Disabled` is the sentinel for modules a
/// `browser` map turned off with `false`; the bundler stubs them out as
/// empty modules without warning even when they end up unused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
  Path(PathBuf),
  External,
  Disabled(PathBuf),
}

#[derive(Debug, Clone)]
pub struct NodeResolverOptions {
  pub platform: Platform,
  /// Extra `exports` conditions beyond the kind- and platform-implied set.
  pub conditions: Vec<String>,
  /// Explicit main-field order. `None` keeps the platform default, which
  /// also keeps the import/require split that avoids the dual-package
  /// hazard surprise.
  pub main_fields: Option<Vec<String>>,
}

impl Default for NodeResolverOptions {
  fn default() -> Self {
    Self {
      platform: Platform::Browser,
      conditions: Vec::new(),
      main_fields: None,
    }
  }
}

const FILE_EXTENSION_GUESSES: &[&str] = &[".js", ".json", ".node"];
const INDEX_GUESSES: &[&str] = &["index.js", "index.json", "index.node"];

pub struct NodeResolver {
  fs: Arc<dyn ResolverFs>,
  options: NodeResolverOptions,
}

impl NodeResolver {
  pub fn new(fs: Arc<dyn ResolverFs>, options: NodeResolverOptions) -> Self {
    Self { fs, options }
  }

  pub fn fs(&self) -> &dyn ResolverFs {
    &*self.fs
  }

  /// Resolves `specifier` as written in the file at `importer`.
  pub fn resolve(
    &self,
    specifier: &str,
    importer: &Path,
    kind: ResolveKind,
  ) -> Result<Resolution, ResolveError> {
    self.resolve_inner(specifier, importer, kind, false)
  }

  /// Like [`NodeResolver::resolve`], but for a path the user named directly
  /// as an entry point. When a package's `exports` map exists and nothing
  /// matches, entry points fall back to the legacy main fields instead of
  /// erroring; ordinary imports do not.
  pub fn resolve_entry(
    &self,
    specifier: &str,
    importer: &Path,
    kind: ResolveKind,
  ) -> Result<Resolution, ResolveError> {
    self.resolve_inner(specifier, importer, kind, true)
  }

  fn resolve_inner(
    &self,
    specifier: &str,
    importer: &Path,
    kind: ResolveKind,
    is_entry: bool,
  ) -> Result<Resolution, ResolveError> {
    validate_specifier_escapes(specifier, importer)?;

    // The importing package's browser map applies before anything else and
    // can disable the module outright.
    if self.options.platform == Platform::Browser {
      if let Some(remapped) = self.apply_browser_map(specifier, importer)? {
        return match remapped {
          BrowserRemap::Disabled(path) => Ok(Resolution::Disabled(path)),
          BrowserRemap::To(new_specifier) => {
            // A remapped specifier is resolved fresh, but a second map hit
            // is not honored to avoid loops.
            self.resolve_no_browser_map(&new_specifier, importer, kind, is_entry)
          }
        };
      }
    }

    self.resolve_no_browser_map(specifier, importer, kind, is_entry)
  }

  fn resolve_no_browser_map(
    &self,
    specifier: &str,
    importer: &Path,
    kind: ResolveKind,
    is_entry: bool,
  ) -> Result<Resolution, ResolveError> {
    if is_relative_or_absolute(specifier) {
      let base_dir = importer.parent().unwrap_or(Path::new("/"));
      let joined = base_dir.join(specifier).clean();
      return self
        .load_as_file_or_directory(&joined, kind)
        .map(Resolution::Path)
        .ok_or_else(|| errors::err_module_not_found(specifier, importer, "module"));
    }

    if specifier.starts_with('#') {
      let conditions = self.active_conditions(kind);
      let path = self.package_imports_resolve(specifier, importer, &conditions)?;
      return Ok(Resolution::Path(path));
    }

    self.package_resolve(specifier, importer, kind, is_entry)
  }

  /// Conditions active for this resolution, in the order they are reported
  /// in diagnostics. Matching itself is by `exports` object key order.
  pub fn active_conditions(&self, kind: ResolveKind) -> Vec<String> {
    let mut conditions = vec!["default".to_string()];
    if kind.is_require() {
      conditions.push("require".to_string());
    } else {
      conditions.push("import".to_string());
    }
    match self.options.platform {
      Platform::Browser => conditions.push("browser".to_string()),
      Platform::Node => conditions.push("node".to_string()),
      Platform::Neutral => {}
    }
    conditions.extend(self.options.conditions.iter().cloned());
    conditions
  }

  fn package_resolve(
    &self,
    specifier: &str,
    importer: &Path,
    kind: ResolveKind,
    is_entry: bool,
  ) -> Result<Resolution, ResolveError> {
    let (package_name, package_subpath) =
      parse_package_name(specifier, importer)?;
    let conditions = self.active_conditions(kind);

    // ResolveSelf: a package importing itself by name.
    let scope_config = get_package_scope_config(self.fs(), importer)?;
    if scope_config.exists
      && scope_config.name.as_deref() == Some(package_name.as_str())
    {
      if let Some(exports) = scope_config.exports.clone() {
        if !exports.is_null() {
          let path = self.package_exports_resolve(
            &scope_config,
            &exports,
            &package_subpath,
            importer,
            &conditions,
          )?;
          return Ok(Resolution::Path(path));
        }
      }
    }

    let mut dir = importer.parent().map(|p| p.to_path_buf());
    while let Some(current) = dir {
      let package_dir = current.join("node_modules").join(&package_name);
      if self.fs.is_dir(&package_dir) {
        let package_json_path = package_dir.join("package.json");
        let package_config = package_json::get_package_config(
          self.fs(),
          package_json_path,
          specifier,
          Some(importer),
        )?;

        if let Some(exports) = package_config.exports.clone() {
          if !exports.is_null() {
            let result = self.package_exports_resolve(
              &package_config,
              &exports,
              &package_subpath,
              importer,
              &conditions,
            );
            match result {
              Ok(path) => return Ok(Resolution::Path(path)),
              Err(err) => {
                // Entry points fall back to the legacy fields when the
                // exports map has no matching entry. Ordinary imports
                // surface the error.
                if is_entry && package_subpath == "." {
                  if let Some(path) =
                    self.legacy_main_resolve(&package_config, kind)
                  {
                    return Ok(Resolution::Path(path));
                  }
                }
                return Err(self.annotate_exports_error(
                  err,
                  &package_config,
                  &package_subpath,
                  &conditions,
                ));
              }
            }
          }
        }

        if package_subpath == "." {
          return self
            .legacy_main_resolve(&package_config, kind)
            .map(Resolution::Path)
            .ok_or_else(|| {
              let mut err =
                errors::err_module_not_found(specifier, importer, "package");
              if package_config.main.is_some() {
                if let Some(fields) = &self.options.main_fields {
                  if !fields.iter().any(|f| f == "main") {
                    err = err.with_note(format!(
                      "The \"main\" field was ignored because the list of main fields to use is currently set to [{}]",
                      fields
                        .iter()
                        .map(|f| format!("\"{}\"", f))
                        .collect::<Vec<_>>()
                        .join(", ")
                    ));
                  }
                }
              }
              err
            });
        }

        let joined = package_dir.join(package_subpath.trim_start_matches("./")).clean();
        return self
          .load_as_file_or_directory(&joined, kind)
          .map(Resolution::Path)
          .ok_or_else(|| {
            errors::err_module_not_found(specifier, importer, "module")
          });
      }
      dir = current.parent().map(|p| p.to_path_buf());
    }

    Err(errors::err_module_not_found(specifier, importer, "package"))
  }

  /// Attaches the "is not exported" hints: the reverse-lookup suggestion
  /// when the requested file exists under another export key.
  fn annotate_exports_error(
    &self,
    err: ResolveError,
    package_config: &PackageConfig,
    package_subpath: &str,
    conditions: &[String],
  ) -> ResolveError {
    if err.code != ErrorCode::PackagePathNotExported {
      return err;
    }
    match self.exports_reverse_lookup(package_config, package_subpath, conditions) {
      Some((suggested_subpath, fs_path)) => {
        let package_name = package_config.name.clone().unwrap_or_default();
        let suggestion = if suggested_subpath == "." {
          package_name
        } else {
          format!("{}/{}", package_name, suggested_subpath.trim_start_matches("./"))
        };
        err.with_note(format!(
          "Import from \"{}\" to get the file \"{}\"",
          suggestion,
          fs_path.display()
        ))
      }
      None => err,
    }
  }

  /// Legacy `main`-field resolution. With the platform default field order
  /// the import/require split applies: `import` prefers `module`, `require`
  /// prefers `main`. An explicit `main_fields` list is honored in order for
  /// both kinds.
  fn legacy_main_resolve(
    &self,
    package_config: &PackageConfig,
    kind: ResolveKind,
  ) -> Option<PathBuf> {
    let fields: Vec<&str> = match &self.options.main_fields {
      Some(fields) => fields.iter().map(|f| f.as_str()).collect(),
      None => match (self.options.platform, kind.is_require()) {
        (Platform::Browser, false) => vec!["browser", "module", "main"],
        (Platform::Browser, true) => vec!["browser", "main", "module"],
        (Platform::Node, false) => vec!["module", "main"],
        (Platform::Node, true) => vec!["main", "module"],
        (Platform::Neutral, _) => vec![],
      },
    };

    for field in fields {
      if let Some(value) = package_config.field(field) {
        let guess = package_config.package_dir().join(value).clean();
        if let Some(found) = self.load_as_file_or_directory(&guess, kind) {
          return Some(found);
        }
      }
    }

    // Index fallback applies even without any main field.
    for index in INDEX_GUESSES {
      let guess = package_config.package_dir().join(index);
      if self.fs.is_file(&guess) {
        return Some(guess);
      }
    }
    None
  }

  fn load_as_file_or_directory(
    &self,
    path: &Path,
    kind: ResolveKind,
  ) -> Option<PathBuf> {
    if self.fs.is_file(path) {
      return Some(path.to_path_buf());
    }

    if let Some(name) = path.to_str() {
      for ext in FILE_EXTENSION_GUESSES {
        let guess = PathBuf::from(format!("{}{}", name, ext));
        if self.fs.is_file(&guess) {
          return Some(guess);
        }
      }
    }

    if self.fs.is_dir(path) {
      let package_json_path = path.join("package.json");
      if self.fs.is_file(&package_json_path) {
        if let Ok(config) = package_json::get_package_config(
          self.fs(),
          package_json_path,
          "",
          None,
        ) {
          // Flat file lookups only; recursing into directories here could
          // loop on a package whose main points back at itself.
          let fields = match kind.is_require() {
            true => ["main", "module"],
            false => ["module", "main"],
          };
          for field in fields {
            if let Some(value) = config.field(field) {
              let guess = path.join(value).clean();
              if self.fs.is_file(&guess) {
                return Some(guess);
              }
              if let Some(name) = guess.to_str() {
                for ext in FILE_EXTENSION_GUESSES {
                  let with_ext = PathBuf::from(format!("{}{}", name, ext));
                  if self.fs.is_file(&with_ext) {
                    return Some(with_ext);
                  }
                }
              }
            }
          }
        }
      }
      for index in INDEX_GUESSES {
        let guess = path.join(index);
        if self.fs.is_file(&guess) {
          return Some(guess);
        }
      }
    }
    None
  }

  fn apply_browser_map(
    &self,
    specifier: &str,
    importer: &Path,
  ) -> Result<Option<BrowserRemap>, ResolveError> {
    let scope_config = get_package_scope_config(self.fs(), importer)?;
    if !scope_config.exists {
      return Ok(None);
    }
    let Some(browser) = scope_config.browser.as_ref().and_then(|b| b.as_object())
    else {
      return Ok(None);
    };

    // Relative keys match both with and without the leading "./".
    let mut candidates = vec![specifier.to_string()];
    if let Some(stripped) = specifier.strip_prefix("./") {
      candidates.push(stripped.to_string());
    } else if is_relative_or_absolute(specifier) {
      candidates.push(format!("./{}", specifier.trim_start_matches("./")));
    }

    for candidate in candidates {
      if let Some(value) = browser.get(&candidate) {
        if value.as_bool() == Some(false) {
          let disabled = scope_config.package_dir().join(
            candidate.trim_start_matches("./"),
          );
          return Ok(Some(BrowserRemap::Disabled(disabled)));
        }
        if let Some(target) = value.as_str() {
          return Ok(Some(BrowserRemap::To(target.to_string())));
        }
      }
    }
    Ok(None)
  }
}

enum BrowserRemap {
  Disabled(PathBuf),
  To(String),
}

fn is_relative_or_absolute(specifier: &str) -> bool {
  if specifier.is_empty() {
    return false;
  }
  specifier.starts_with('/')
    || specifier == "."
    || specifier == ".."
    || specifier.starts_with("./")
    || specifier.starts_with("../")
}

/// Module specifiers must not smuggle path separators through URL escapes.
fn validate_specifier_escapes(
  specifier: &str,
  importer: &Path,
) -> Result<(), ResolveError> {
  let lowered = specifier.to_ascii_lowercase();
  if lowered.contains("%2f") || lowered.contains("%5c") || specifier.contains("%%") {
    return Err(errors::err_invalid_module_specifier(
      specifier,
      "must not include encoded \"/\" or \"\\\" characters",
      Some(importer),
    ));
  }
  Ok(())
}

fn parse_package_name(
  specifier: &str,
  importer: &Path,
) -> Result<(String, String), ResolveError> {
  let mut separator_index = specifier.find('/');
  let mut valid_package_name = true;
  if specifier.is_empty() {
    valid_package_name = false;
  } else if specifier.starts_with('@') {
    match separator_index {
      Some(index) => {
        separator_index =
          specifier[index + 1..].find('/').map(|i| index + 1 + i);
      }
      None => valid_package_name = false,
    }
  }

  let package_name = match separator_index {
    Some(index) => &specifier[..index],
    None => specifier,
  };

  if package_name.starts_with('.')
    || package_name.contains('%')
    || package_name.contains('\\')
  {
    valid_package_name = false;
  }

  if !valid_package_name {
    return Err(errors::err_invalid_module_specifier(
      specifier,
      "is not a valid package name",
      Some(importer),
    ));
  }

  let package_subpath = match separator_index {
    Some(index) => format!(".{}", &specifier[index..]),
    None => ".".to_string(),
  };

  Ok((package_name.to_string(), package_subpath))
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  fn resolver(fs: InMemoryFs, options: NodeResolverOptions) -> NodeResolver {
    NodeResolver::new(Arc::new(fs), options)
  }

  fn node_options() -> NodeResolverOptions {
    NodeResolverOptions {
      platform: Platform::Node,
      ..Default::default()
    }
  }

  #[test]
  fn relative_specifier_with_extension_guess() {
    let mut fs = InMemoryFs::new();
    fs.add("/proj/main.js", "");
    fs.add("/proj/util.js", "");
    let r = resolver(fs, node_options());
    let got = r
      .resolve("./util", Path::new("/proj/main.js"), ResolveKind::Import)
      .unwrap();
    assert_eq!(got, Resolution::Path(PathBuf::from("/proj/util.js")));
  }

  #[test]
  fn bare_specifier_walks_node_modules() {
    let mut fs = InMemoryFs::new();
    fs.add("/proj/src/deep/main.js", "");
    fs.add("/proj/node_modules/foo/package.json", r#"{ "name": "foo" }"#);
    fs.add("/proj/node_modules/foo/index.js", "");
    let r = resolver(fs, node_options());
    let got = r
      .resolve(
        "foo",
        Path::new("/proj/src/deep/main.js"),
        ResolveKind::Import,
      )
      .unwrap();
    assert_eq!(
      got,
      Resolution::Path(PathBuf::from("/proj/node_modules/foo/index.js"))
    );
  }

  #[test]
  fn dual_package_hazard_default_field_order() {
    let mut fs = InMemoryFs::new();
    fs.add("/proj/main.js", "");
    fs.add(
      "/proj/node_modules/dual/package.json",
      r#"{ "name": "dual", "main": "./cjs.js", "module": "./esm.js" }"#,
    );
    fs.add("/proj/node_modules/dual/cjs.js", "");
    fs.add("/proj/node_modules/dual/esm.js", "");
    let r = resolver(fs, node_options());

    let via_import = r
      .resolve("dual", Path::new("/proj/main.js"), ResolveKind::Import)
      .unwrap();
    let via_require = r
      .resolve("dual", Path::new("/proj/main.js"), ResolveKind::Require)
      .unwrap();
    assert_eq!(
      via_import,
      Resolution::Path(PathBuf::from("/proj/node_modules/dual/esm.js"))
    );
    assert_eq!(
      via_require,
      Resolution::Path(PathBuf::from("/proj/node_modules/dual/cjs.js"))
    );
  }

  #[test]
  fn explicit_main_fields_override_the_split() {
    let mut fs = InMemoryFs::new();
    fs.add("/proj/main.js", "");
    fs.add(
      "/proj/node_modules/dual/package.json",
      r#"{ "name": "dual", "main": "./cjs.js", "module": "./esm.js" }"#,
    );
    fs.add("/proj/node_modules/dual/cjs.js", "");
    fs.add("/proj/node_modules/dual/esm.js", "");
    let r = resolver(
      fs,
      NodeResolverOptions {
        platform: Platform::Node,
        main_fields: Some(vec!["main".to_string(), "module".to_string()]),
        ..Default::default()
      },
    );

    let via_import = r
      .resolve("dual", Path::new("/proj/main.js"), ResolveKind::Import)
      .unwrap();
    assert_eq!(
      via_import,
      Resolution::Path(PathBuf::from("/proj/node_modules/dual/cjs.js"))
    );
  }

  #[test]
  fn browser_map_disables_module() {
    let mut fs = InMemoryFs::new();
    fs.add(
      "/proj/package.json",
      r#"{ "name": "proj", "browser": { "fs": false } }"#,
    );
    fs.add("/proj/main.js", "");
    let r = resolver(fs, NodeResolverOptions::default());
    let got = r
      .resolve("fs", Path::new("/proj/main.js"), ResolveKind::Import)
      .unwrap();
    assert!(matches!(got, Resolution::Disabled(_)));
  }

  #[test]
  fn browser_map_remaps_to_another_module() {
    let mut fs = InMemoryFs::new();
    fs.add(
      "/proj/package.json",
      r#"{ "name": "proj", "browser": { "./log.js": "./log-browser.js" } }"#,
    );
    fs.add("/proj/main.js", "");
    fs.add("/proj/log.js", "");
    fs.add("/proj/log-browser.js", "");
    let r = resolver(fs, NodeResolverOptions::default());
    let got = r
      .resolve("./log.js", Path::new("/proj/main.js"), ResolveKind::Import)
      .unwrap();
    assert_eq!(got, Resolution::Path(PathBuf::from("/proj/log-browser.js")));
  }

  #[test]
  fn encoded_separators_are_rejected() {
    let fs = InMemoryFs::new();
    let r = resolver(fs, node_options());
    for bad in ["foo%2fbar", "foo%2Fbar", "foo%5cbar", "foo%5Cbar", "foo%%bar"] {
      let err = r
        .resolve(bad, Path::new("/proj/main.js"), ResolveKind::Import)
        .unwrap_err();
      assert_eq!(err.code, ErrorCode::InvalidModuleSpecifier, "{}", bad);
    }
  }

  #[test]
  fn real_fs_resolves_from_a_temp_tree() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("node_modules/foo")).unwrap();
    std::fs::write(
      root.join("node_modules/foo/package.json"),
      r#"{ "name": "foo", "main": "./lib.js" }"#,
    )
    .unwrap();
    std::fs::write(root.join("node_modules/foo/lib.js"), "").unwrap();
    std::fs::write(root.join("main.js"), "").unwrap();

    let r = NodeResolver::new(Arc::new(RealFs), node_options());
    let got = r
      .resolve("foo", &root.join("main.js"), ResolveKind::Require)
      .unwrap();
    assert_eq!(
      got,
      Resolution::Path(root.join("node_modules/foo/lib.js"))
    );
  }

  #[test]
  fn entry_point_falls_back_to_main_fields_when_exports_miss() {
    let mut fs = InMemoryFs::new();
    fs.add("/proj/main.js", "");
    fs.add(
      "/proj/node_modules/pkg/package.json",
      r#"{
        "name": "pkg",
        "exports": { ".": { "worker": "./worker.js" } },
        "module": "./esm.js",
        "main": "./cjs.js"
      }"#,
    );
    fs.add("/proj/node_modules/pkg/esm.js", "");
    fs.add("/proj/node_modules/pkg/cjs.js", "");
    fs.add("/proj/node_modules/pkg/worker.js", "");
    let r = resolver(fs, node_options());

    // A plain import errors: the exports map exists and nothing matches.
    let err = r
      .resolve("pkg", Path::new("/proj/main.js"), ResolveKind::Import)
      .unwrap_err();
    assert_eq!(err.code, ErrorCode::PackagePathNotExported);

    // The same package named as an entry point falls back.
    let got = r
      .resolve_entry("pkg", Path::new("/proj/main.js"), ResolveKind::Import)
      .unwrap();
    assert_eq!(
      got,
      Resolution::Path(PathBuf::from("/proj/node_modules/pkg/esm.js"))
    );
  }
}
