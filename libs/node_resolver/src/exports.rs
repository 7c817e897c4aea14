// Copyright 2024-2026 the Tern authors. MIT license.

//! The `exports` / `imports` map algorithm.
//!
//! Matching follows the package manifest's own key order: the first
//! condition name that is active wins, and `default` matches only when no
//! earlier key did. Pattern keys (`./foo*`) compete by specificity via
//! [`pattern_key_compare`]; trailing-slash keys are the legacy folder
//! mapping.

use std::path::Path;
use std::path::PathBuf;

use path_clean::PathClean;
use serde_json::Map;
use serde_json::Value;

use crate::errors;
use crate::errors::ResolveError;
use crate::package_json::get_package_scope_config;
use crate::package_json::PackageConfig;
use crate::NodeResolver;
use crate::ResolveKind;

fn is_conditional_exports_main_sugar(
  exports: &Value,
  package_json_path: &Path,
  base: &Path,
) -> Result<bool, ResolveError> {
  if exports.is_string() || exports.is_array() {
    return Ok(true);
  }
  if exports.is_null() || !exports.is_object() {
    return Ok(false);
  }

  let exports_obj = exports.as_object().unwrap();
  let mut is_conditional_sugar = false;
  for (i, key) in exports_obj.keys().enumerate() {
    let cur_is_conditional_sugar = key.is_empty() || !key.starts_with('.');
    if i == 0 {
      is_conditional_sugar = cur_is_conditional_sugar;
    } else if is_conditional_sugar != cur_is_conditional_sugar {
      return Err(errors::err_invalid_package_config(
        package_json_path,
        Some(base),
        Some(
          "\"exports\" cannot contain some keys starting with '.' and some not. \
           The exports object must either be an object of package subpath keys \
           or an object of main entry condition name keys only."
            .to_string(),
        ),
      ));
    }
  }
  Ok(is_conditional_sugar)
}

/// Orders two candidate keys by specificity: longer fixed prefix first, then
/// exact keys over pattern keys, then longer keys overall. Returns 1 when
/// `b` should replace `a` as the best match.
fn pattern_key_compare(a: &str, b: &str) -> i32 {
  let a_pattern_index = a.find('*');
  let b_pattern_index = b.find('*');

  let base_len_a = a_pattern_index.map(|i| i + 1).unwrap_or(a.len());
  let base_len_b = b_pattern_index.map(|i| i + 1).unwrap_or(b.len());

  if base_len_a > base_len_b {
    return -1;
  }
  if base_len_b > base_len_a {
    return 1;
  }
  if a_pattern_index.is_none() {
    return 1;
  }
  if b_pattern_index.is_none() {
    return -1;
  }
  if a.len() > b.len() {
    return -1;
  }
  if b.len() > a.len() {
    return 1;
  }
  0
}

impl NodeResolver {
  pub(crate) fn package_exports_resolve(
    &self,
    package_config: &PackageConfig,
    exports: &Value,
    package_subpath: &str,
    base: &Path,
    conditions: &[String],
  ) -> Result<PathBuf, ResolveError> {
    let package_json_path = package_config.pjsonpath.clone();
    let exports_map: Map<String, Value> = if is_conditional_exports_main_sugar(
      exports,
      &package_json_path,
      base,
    )? {
      let mut map = Map::new();
      map.insert(".".to_string(), exports.to_owned());
      map
    } else {
      exports.as_object().unwrap().to_owned()
    };

    let mut unmatched_conditions = Vec::new();

    if exports_map.contains_key(package_subpath)
      && !package_subpath.contains('*')
      && !package_subpath.ends_with('/')
    {
      let target = exports_map.get(package_subpath).unwrap();
      let resolved = self.resolve_package_target(
        &package_json_path,
        target,
        "",
        package_subpath,
        base,
        false,
        false,
        conditions,
        &mut unmatched_conditions,
      )?;
      return resolved.ok_or_else(|| {
        self.exports_not_found(
          package_config,
          package_subpath,
          base,
          conditions,
          &unmatched_conditions,
        )
      });
    }

    let mut best_match = "";
    let mut best_match_subpath = String::new();
    let mut best_is_pattern = false;
    for key in exports_map.keys() {
      if let Some(pattern_index) = key.find('*') {
        let key_sub = &key[..=pattern_index];
        if package_subpath.starts_with(key_sub) {
          let pattern_trailer = &key[pattern_index + 1..];
          if package_subpath.len() > key.len()
            && package_subpath.ends_with(pattern_trailer)
            && pattern_key_compare(best_match, key) == 1
            && key.rfind('*') == Some(pattern_index)
          {
            best_match = key;
            best_match_subpath = package_subpath
              [pattern_index..package_subpath.len() - pattern_trailer.len()]
              .to_string();
            best_is_pattern = true;
          }
        }
      } else if key.ends_with('/')
        && package_subpath.starts_with(key.as_str())
        && pattern_key_compare(best_match, key) == 1
      {
        // Legacy subpath folder mapping.
        best_match = key;
        best_match_subpath = package_subpath[key.len()..].to_string();
        best_is_pattern = false;
      }
    }

    if !best_match.is_empty() {
      let target = exports_map.get(best_match).unwrap();
      let resolved = self.resolve_package_target(
        &package_json_path,
        target,
        &best_match_subpath,
        best_match,
        base,
        best_is_pattern,
        false,
        conditions,
        &mut unmatched_conditions,
      )?;
      return resolved.ok_or_else(|| {
        self.exports_not_found(
          package_config,
          package_subpath,
          base,
          conditions,
          &unmatched_conditions,
        )
      });
    }

    Err(self.exports_not_found(
      package_config,
      package_subpath,
      base,
      conditions,
      &unmatched_conditions,
    ))
  }

  fn exports_not_found(
    &self,
    package_config: &PackageConfig,
    package_subpath: &str,
    base: &Path,
    conditions: &[String],
    unmatched_conditions: &[String],
  ) -> ResolveError {
    let package_name = package_config
      .name
      .clone()
      .unwrap_or_else(|| package_config.package_dir().display().to_string());
    let mut err = errors::err_package_path_not_exported(
      &package_name,
      package_subpath,
      Some(base),
    );
    if !unmatched_conditions.is_empty() {
      err = err.with_note(format!(
        "None of the conditions provided ({}) match any of the currently active conditions ({})",
        quote_list(unmatched_conditions),
        quote_list(conditions),
      ));
    }
    err
  }

  pub(crate) fn package_imports_resolve(
    &self,
    name: &str,
    base: &Path,
    conditions: &[String],
  ) -> Result<PathBuf, ResolveError> {
    if name == "#" || name.starts_with("#/") || name.ends_with('/') {
      return Err(errors::err_invalid_module_specifier(
        name,
        "is not a valid internal imports specifier name",
        Some(base),
      ));
    }

    let package_config = get_package_scope_config(self.fs(), base)?;
    if package_config.exists {
      let package_json_path = package_config.pjsonpath.clone();
      if let Some(imports) = &package_config.imports {
        let mut unmatched_conditions = Vec::new();
        if imports.contains_key(name) && !name.contains('*') {
          let target = imports.get(name).unwrap();
          let maybe_resolved = self.resolve_package_target(
            &package_json_path,
            target,
            "",
            name,
            base,
            false,
            true,
            conditions,
            &mut unmatched_conditions,
          )?;
          if let Some(resolved) = maybe_resolved {
            return Ok(resolved);
          }
        } else {
          let mut best_match = "";
          let mut best_match_subpath = String::new();
          for key in imports.keys() {
            if let Some(pattern_index) = key.find('*') {
              let key_sub = &key[..=pattern_index];
              if name.starts_with(key_sub) {
                let pattern_trailer = &key[pattern_index + 1..];
                if name.len() > key.len()
                  && name.ends_with(pattern_trailer)
                  && pattern_key_compare(best_match, key) == 1
                  && key.rfind('*') == Some(pattern_index)
                {
                  best_match = key;
                  best_match_subpath =
                    name[pattern_index..name.len() - pattern_trailer.len()]
                      .to_string();
                }
              }
            }
          }

          if !best_match.is_empty() {
            let target = imports.get(best_match).unwrap();
            let maybe_resolved = self.resolve_package_target(
              &package_json_path,
              target,
              &best_match_subpath,
              best_match,
              base,
              true,
              true,
              conditions,
              &mut unmatched_conditions,
            )?;
            if let Some(resolved) = maybe_resolved {
              return Ok(resolved);
            }
          }
        }
      }
      return Err(errors::err_package_import_not_defined(
        name,
        Some(&package_json_path),
        base,
      ));
    }

    Err(errors::err_package_import_not_defined(name, None, base))
  }

  #[allow(clippy::too_many_arguments)]
  fn resolve_package_target(
    &self,
    package_json_path: &Path,
    target: &Value,
    subpath: &str,
    package_subpath: &str,
    base: &Path,
    pattern: bool,
    internal: bool,
    conditions: &[String],
    unmatched_conditions: &mut Vec<String>,
  ) -> Result<Option<PathBuf>, ResolveError> {
    if let Some(target) = target.as_str() {
      return self
        .resolve_package_target_string(
          target,
          subpath,
          package_subpath,
          package_json_path,
          base,
          pattern,
          internal,
          conditions,
        )
        .map(Some);
    }

    if let Some(target_arr) = target.as_array() {
      if target_arr.is_empty() {
        return Ok(None);
      }
      let mut last_error = None;
      for target_item in target_arr {
        let resolved_result = self.resolve_package_target(
          package_json_path,
          target_item,
          subpath,
          package_subpath,
          base,
          pattern,
          internal,
          conditions,
          unmatched_conditions,
        );
        match resolved_result {
          Err(e) if e.code == errors::ErrorCode::InvalidPackageTarget => {
            last_error = Some(e);
            continue;
          }
          Err(e) => return Err(e),
          Ok(None) => {
            last_error = None;
            continue;
          }
          Ok(Some(resolved)) => return Ok(Some(resolved)),
        }
      }
      return match last_error {
        Some(e) => Err(e),
        None => Ok(None),
      };
    }

    if let Some(target_obj) = target.as_object() {
      for (key, condition_target) in target_obj {
        if key == "default" || conditions.iter().any(|c| c == key) {
          let resolved = self.resolve_package_target(
            package_json_path,
            condition_target,
            subpath,
            package_subpath,
            base,
            pattern,
            internal,
            conditions,
            unmatched_conditions,
          )?;
          if resolved.is_none() {
            continue;
          }
          return Ok(resolved);
        }
        unmatched_conditions.push(key.clone());
      }
      // No condition matched; the caller reports "not exported" with the
      // collected keys in a note.
      return Ok(None);
    }

    if target.is_null() {
      return Ok(None);
    }

    Err(errors::err_invalid_package_target(
      package_json_path.parent().unwrap_or(Path::new("/")),
      package_subpath,
      &target.to_string(),
      internal,
      Some(base),
    ))
  }

  #[allow(clippy::too_many_arguments)]
  fn resolve_package_target_string(
    &self,
    target: &str,
    subpath: &str,
    match_: &str,
    package_json_path: &Path,
    base: &Path,
    pattern: bool,
    internal: bool,
    conditions: &[String],
  ) -> Result<PathBuf, ResolveError> {
    let package_path = package_json_path.parent().unwrap_or(Path::new("/"));

    if !subpath.is_empty() && !pattern && !target.ends_with('/') {
      return Err(errors::err_invalid_package_target(
        package_path,
        match_,
        target,
        internal,
        Some(base),
      ));
    }

    let invalid_segment_re =
      regex::Regex::new(r"(^|\\|/)(\.\.?|node_modules)(\\|/|$)")
        .expect("bad regex");

    if !target.starts_with("./") {
      if internal && !target.starts_with("../") && !target.starts_with('/') {
        let is_url = url::Url::parse(target).is_ok();
        if !is_url {
          let export_target = if pattern {
            target.replacen('*', subpath, 1)
          } else {
            format!("{}{}", target, subpath)
          };
          // Internal "imports" may forward to another package; resolve the
          // bare specifier from the package's own directory.
          let kind = if conditions.iter().any(|c| c == "require") {
            ResolveKind::Require
          } else {
            ResolveKind::Import
          };
          return match self.resolve_no_browser_map(
            &export_target,
            package_json_path,
            kind,
            false,
          )? {
            crate::Resolution::Path(path) => Ok(path),
            crate::Resolution::External | crate::Resolution::Disabled(_) => {
              Err(errors::err_module_not_found(&export_target, base, "module"))
            }
          };
        }
      }
      return Err(errors::err_invalid_package_target(
        package_path,
        match_,
        target,
        internal,
        Some(base),
      ));
    }

    if invalid_segment_re.is_match(&target[2..]) {
      return Err(errors::err_invalid_package_target(
        package_path,
        match_,
        target,
        internal,
        Some(base),
      ));
    }

    let resolved = package_path.join(&target[2..]).clean();
    if !resolved.starts_with(package_path) {
      return Err(errors::err_invalid_package_target(
        package_path,
        match_,
        target,
        internal,
        Some(base),
      ));
    }

    if subpath.is_empty() {
      return Ok(resolved);
    }

    if invalid_segment_re.is_match(subpath) {
      let request = if pattern {
        match_.replacen('*', subpath, 1)
      } else {
        format!("{}{}", match_, subpath)
      };
      let ie = if internal { "imports" } else { "exports" };
      return Err(errors::err_invalid_module_specifier(
        &request,
        &format!(
          "request is not a valid subpath for the \"{}\" resolution of {}",
          ie,
          package_json_path.display()
        ),
        Some(base),
      ));
    }

    if pattern {
      let resolved_str = resolved.to_string_lossy().replacen('*', subpath, 1);
      return Ok(PathBuf::from(resolved_str).clean());
    }

    Ok(resolved.join(subpath).clean())
  }

  /// Searches the `exports` map for an entry whose target resolves to a file
  /// that actually exists at the requested subpath, so the "not exported"
  /// error can say which import specifier would work.
  pub(crate) fn exports_reverse_lookup(
    &self,
    package_config: &PackageConfig,
    package_subpath: &str,
    conditions: &[String],
  ) -> Option<(String, PathBuf)> {
    let exports = package_config.exports.as_ref()?;
    let exports_map = exports.as_object()?;
    if exports_map.keys().next().map(|k| !k.starts_with('.'))? {
      return None;
    }

    // The file the user was after, if it exists on disk.
    let wanted = package_config
      .package_dir()
      .join(package_subpath.trim_start_matches("./"))
      .clean();
    let wanted = if self.fs().is_file(&wanted) {
      wanted
    } else {
      let with_ext = crate::FILE_EXTENSION_GUESSES.iter().find_map(|ext| {
        let guess = PathBuf::from(format!("{}{}", wanted.display(), ext));
        self.fs().is_file(&guess).then_some(guess)
      })?;
      with_ext
    };

    for (key, target) in exports_map {
      let mut scratch = Vec::new();
      if let Some(pattern_index) = key.find('*') {
        // Invert the pattern: resolve the target with a placeholder-free
        // prefix/suffix and extract the star segment from the wanted path.
        let resolved = self
          .resolve_package_target(
            &package_config.pjsonpath,
            target,
            "*",
            key,
            &package_config.pjsonpath,
            true,
            false,
            conditions,
            &mut scratch,
          )
          .ok()
          .flatten()?;
        let resolved_str = resolved.to_string_lossy().to_string();
        let star = resolved_str.find('*')?;
        let (prefix, suffix) = (&resolved_str[..star], &resolved_str[star + 1..]);
        let wanted_str = wanted.to_string_lossy().to_string();
        if wanted_str.starts_with(prefix) && wanted_str.ends_with(suffix) {
          let middle = &wanted_str[prefix.len()..wanted_str.len() - suffix.len()];
          let subpath = format!(
            "{}{}{}",
            &key[..pattern_index],
            middle,
            &key[pattern_index + 1..]
          );
          return Some((subpath, wanted));
        }
      } else {
        let resolved = self.resolve_package_target(
          &package_config.pjsonpath,
          target,
          "",
          key,
          &package_config.pjsonpath,
          false,
          false,
          conditions,
          &mut scratch,
        );
        if let Ok(Some(resolved)) = resolved {
          if resolved == wanted {
            return Some((key.clone(), wanted));
          }
        }
      }
    }
    None
  }
}

fn quote_list(items: &[String]) -> String {
  items
    .iter()
    .map(|item| format!("\"{}\"", item))
    .collect::<Vec<_>>()
    .join(", ")
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::InMemoryFs;
  use crate::NodeResolver;
  use crate::NodeResolverOptions;
  use crate::Platform;
  use crate::Resolution;
  use pretty_assertions::assert_eq;
  use std::sync::Arc;

  fn pkg_resolver(exports: &str, extra: &[(&str, &str)]) -> NodeResolver {
    let mut fs = InMemoryFs::new();
    fs.add("/proj/main.js", "");
    fs.add(
      "/proj/node_modules/pkg/package.json",
      format!(r#"{{ "name": "pkg", "exports": {} }}"#, exports),
    );
    for (path, contents) in extra {
      fs.add(format!("/proj/node_modules/pkg/{}", path), *contents);
    }
    NodeResolver::new(
      Arc::new(fs),
      NodeResolverOptions {
        platform: Platform::Node,
        ..Default::default()
      },
    )
  }

  fn importer() -> PathBuf {
    PathBuf::from("/proj/main.js")
  }

  #[test]
  fn conditions_match_in_key_order() {
    let r = pkg_resolver(
      r#"{ ".": { "import": "./i.js", "require": "./r.js", "default": "./d.js" } }"#,
      &[("i.js", ""), ("r.js", ""), ("d.js", "")],
    );
    assert_eq!(
      r.resolve("pkg", &importer(), ResolveKind::Import).unwrap(),
      Resolution::Path(PathBuf::from("/proj/node_modules/pkg/i.js"))
    );
    assert_eq!(
      r.resolve("pkg", &importer(), ResolveKind::Require).unwrap(),
      Resolution::Path(PathBuf::from("/proj/node_modules/pkg/r.js"))
    );
  }

  #[test]
  fn default_first_shadows_later_conditions() {
    let r = pkg_resolver(
      r#"{ ".": { "default": "./d.js", "import": "./i.js", "require": "./r.js" } }"#,
      &[("i.js", ""), ("r.js", ""), ("d.js", "")],
    );
    for kind in [ResolveKind::Import, ResolveKind::Require] {
      assert_eq!(
        r.resolve("pkg", &importer(), kind).unwrap(),
        Resolution::Path(PathBuf::from("/proj/node_modules/pkg/d.js"))
      );
    }
  }

  #[test]
  fn custom_condition_wins_when_listed_earlier() {
    let mut fs = InMemoryFs::new();
    fs.add("/proj/main.js", "");
    fs.add(
      "/proj/node_modules/pkg/package.json",
      r#"{ "name": "pkg", "exports": { ".": { "custom": "./c.js", "import": "./i.js" } } }"#,
    );
    fs.add("/proj/node_modules/pkg/c.js", "");
    fs.add("/proj/node_modules/pkg/i.js", "");
    let r = NodeResolver::new(
      Arc::new(fs),
      NodeResolverOptions {
        platform: Platform::Node,
        conditions: vec!["custom".to_string()],
        ..Default::default()
      },
    );
    assert_eq!(
      r.resolve("pkg", &importer(), ResolveKind::Import).unwrap(),
      Resolution::Path(PathBuf::from("/proj/node_modules/pkg/c.js"))
    );
  }

  #[test]
  fn wildcard_pattern_substitutes_the_star() {
    let r = pkg_resolver(
      r#"{ "./foo*": "./file*.js" }"#,
      &[("file2.js", "")],
    );
    assert_eq!(
      r.resolve("pkg/foo2", &importer(), ResolveKind::Import)
        .unwrap(),
      Resolution::Path(PathBuf::from("/proj/node_modules/pkg/file2.js"))
    );

    let err = r
      .resolve("pkg/foo", &importer(), ResolveKind::Import)
      .unwrap_err();
    assert_eq!(err.code, errors::ErrorCode::PackagePathNotExported);
    assert!(err.text.contains("The path \"./foo\" is not exported"));
  }

  #[test]
  fn subpath_folder_mapping() {
    let r = pkg_resolver(
      r#"{ "./lib/": "./dist/" }"#,
      &[("dist/util.js", "")],
    );
    assert_eq!(
      r.resolve("pkg/lib/util.js", &importer(), ResolveKind::Import)
        .unwrap(),
      Resolution::Path(PathBuf::from("/proj/node_modules/pkg/dist/util.js"))
    );
  }

  #[test]
  fn condition_mismatch_note_lists_both_sides() {
    let r = pkg_resolver(
      r#"{ ".": { "worker": "./w.js", "electron": "./e.js" } }"#,
      &[("w.js", ""), ("e.js", "")],
    );
    let err = r
      .resolve("pkg", &importer(), ResolveKind::Import)
      .unwrap_err();
    assert_eq!(err.code, errors::ErrorCode::PackagePathNotExported);
    let note = err.notes.iter().find(|n| n.starts_with("None of")).unwrap();
    assert!(note.contains("\"worker\", \"electron\""), "{}", note);
    assert!(note.contains("\"default\", \"import\", \"node\""), "{}", note);
  }

  #[test]
  fn reverse_lookup_suggests_the_working_specifier() {
    let r = pkg_resolver(
      r#"{ ".": "./index.js", "./feature": "./lib/feature.js" }"#,
      &[("index.js", ""), ("lib/feature.js", "")],
    );
    // `pkg/lib/feature.js` exists on disk but is exported as `./feature`.
    let err = r
      .resolve("pkg/lib/feature.js", &importer(), ResolveKind::Import)
      .unwrap_err();
    let note = err
      .notes
      .iter()
      .find(|n| n.starts_with("Import from"))
      .unwrap();
    assert_eq!(
      note,
      "Import from \"pkg/feature\" to get the file \"/proj/node_modules/pkg/lib/feature.js\""
    );
  }

  #[test]
  fn array_targets_take_first_resolvable() {
    let r = pkg_resolver(
      r#"{ ".": ["./missing-dir/", "./ok.js"] }"#,
      &[("ok.js", "")],
    );
    // The first target is invalid for a subpath-less match (ends with '/')
    // so resolution falls through to the second.
    assert_eq!(
      r.resolve("pkg", &importer(), ResolveKind::Import).unwrap(),
      Resolution::Path(PathBuf::from("/proj/node_modules/pkg/ok.js"))
    );
  }

  #[test]
  fn sugar_exports_string_is_the_main_entry() {
    let r = pkg_resolver(r#""./entry.js""#, &[("entry.js", "")]);
    assert_eq!(
      r.resolve("pkg", &importer(), ResolveKind::Import).unwrap(),
      Resolution::Path(PathBuf::from("/proj/node_modules/pkg/entry.js"))
    );
  }

  #[test]
  fn imports_map_resolves_hash_specifiers() {
    let mut fs = InMemoryFs::new();
    fs.add(
      "/proj/package.json",
      r##"{ "name": "proj", "imports": { "#dep": { "node": "./polyfill.js" } } }"##,
    );
    fs.add("/proj/main.js", "");
    fs.add("/proj/polyfill.js", "");
    let r = NodeResolver::new(
      Arc::new(fs),
      NodeResolverOptions {
        platform: Platform::Node,
        ..Default::default()
      },
    );
    assert_eq!(
      r.resolve("#dep", &importer(), ResolveKind::Import).unwrap(),
      Resolution::Path(PathBuf::from("/proj/polyfill.js"))
    );
  }

  #[test]
  fn pattern_key_compare_prefers_longer_prefixes() {
    assert_eq!(pattern_key_compare("./foo*", "./foobar*"), 1);
    assert_eq!(pattern_key_compare("./foobar*", "./foo*"), -1);
    // Same fixed prefix: the longer key overall is more specific.
    assert_eq!(pattern_key_compare("./a*", "./a*x"), 1);
  }
}
