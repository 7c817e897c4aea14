// Copyright 2024-2026 the Tern authors. MIT license.

use std::path::Path;
use std::path::PathBuf;

use serde_json::Map;
use serde_json::Value;

use crate::errors;
use crate::errors::ResolveError;
use crate::fs::ResolverFs;

/// The slice of a `package.json` the resolver cares about. Field order in
/// `exports`/`imports` objects is preserved by the JSON parser because
/// condition precedence is key order.
#[derive(Clone, Debug)]
pub struct PackageConfig {
  pub exists: bool,
  pub exports: Option<Value>,
  pub imports: Option<Map<String, Value>>,
  pub main: Option<String>,
  pub module: Option<String>,
  /// The `browser` field: either a string (alternate main) or a map of
  /// string-to-string overrides and string-to-`false` disables.
  pub browser: Option<Value>,
  pub name: Option<String>,
  pub pjsonpath: PathBuf,
  pub typ: String,
}

impl PackageConfig {
  fn missing(path: PathBuf) -> Self {
    Self {
      pjsonpath: path,
      exists: false,
      exports: None,
      imports: None,
      main: None,
      module: None,
      browser: None,
      name: None,
      typ: "none".to_string(),
    }
  }

  /// Directory that contains the `package.json`.
  pub fn package_dir(&self) -> &Path {
    self.pjsonpath.parent().unwrap_or(Path::new("/"))
  }

  /// Ordered legacy main-field lookup, e.g. `["module", "main"]`.
  pub fn field(&self, name: &str) -> Option<&str> {
    match name {
      "main" => self.main.as_deref(),
      "module" => self.module.as_deref(),
      "browser" => self.browser.as_ref().and_then(|b| b.as_str()),
      _ => None,
    }
  }
}

pub fn get_package_config(
  fs: &dyn ResolverFs,
  path: PathBuf,
  specifier: &str,
  maybe_base: Option<&Path>,
) -> Result<PackageConfig, ResolveError> {
  let source = fs.read_to_string(&path).unwrap_or_default();
  if source.is_empty() {
    return Ok(PackageConfig::missing(path));
  }

  let package_json: Value = serde_json::from_str(&source).map_err(|err| {
    let base_msg = maybe_base
      .map(|base| format!("\"{}\" from {}", specifier, base.display()));
    errors::err_invalid_package_config(&path, None, {
      let mut message = err.to_string();
      if let Some(base_msg) = base_msg {
        message = format!("{} while importing {}", message, base_msg);
      }
      Some(message)
    })
  })?;

  let imports = package_json
    .get("imports")
    .and_then(|imp| imp.as_object())
    .map(|imp| imp.to_owned());
  let main = package_json
    .get("main")
    .and_then(|m| m.as_str())
    .map(|m| m.to_string());
  let module = package_json
    .get("module")
    .and_then(|m| m.as_str())
    .map(|m| m.to_string());
  let browser = package_json.get("browser").map(|b| b.to_owned());
  let name = package_json
    .get("name")
    .and_then(|n| n.as_str())
    .map(|n| n.to_string());
  let exports = package_json.get("exports").map(|e| e.to_owned());

  // Ignore unknown types for forwards compatibility.
  let typ = match package_json.get("type").and_then(|t| t.as_str()) {
    Some(t) if t == "module" || t == "commonjs" => t.to_string(),
    _ => "none".to_string(),
  };

  Ok(PackageConfig {
    pjsonpath: path,
    exists: true,
    exports,
    imports,
    main,
    module,
    browser,
    name,
    typ,
  })
}

/// Walks up from `base` to the closest `package.json`, stopping at
/// `node_modules` boundaries the way Node's scope lookup does.
pub fn get_package_scope_config(
  fs: &dyn ResolverFs,
  base: &Path,
) -> Result<PackageConfig, ResolveError> {
  let mut dir = if fs.is_dir(base) {
    Some(base.to_path_buf())
  } else {
    base.parent().map(|p| p.to_path_buf())
  };

  while let Some(current) = dir {
    let package_json_path = current.join("package.json");
    if package_json_path.ends_with("node_modules/package.json") {
      break;
    }

    let package_config =
      get_package_config(fs, package_json_path.clone(), "", None)?;
    if package_config.exists {
      return Ok(package_config);
    }

    dir = current.parent().map(|p| p.to_path_buf());
  }

  Ok(PackageConfig::missing(base.join("package.json")))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fs::InMemoryFs;

  #[test]
  fn scope_config_walks_up() {
    let mut fs = InMemoryFs::new();
    fs.add(
      "/proj/package.json",
      r#"{ "name": "proj", "type": "module" }"#,
    );
    fs.add("/proj/src/deep/mod.js", "");

    let config =
      get_package_scope_config(&fs, Path::new("/proj/src/deep/mod.js"))
        .unwrap();
    assert!(config.exists);
    assert_eq!(config.name.as_deref(), Some("proj"));
    assert_eq!(config.typ, "module");
  }

  #[test]
  fn missing_config_reports_not_exists() {
    let fs = InMemoryFs::new();
    let config =
      get_package_scope_config(&fs, Path::new("/nowhere/mod.js")).unwrap();
    assert!(!config.exists);
    assert_eq!(config.typ, "none");
  }

  #[test]
  fn invalid_json_is_an_error() {
    let mut fs = InMemoryFs::new();
    fs.add("/proj/package.json", "{ not json");
    let err = get_package_config(
      &fs,
      PathBuf::from("/proj/package.json"),
      "proj",
      None,
    )
    .unwrap_err();
    assert_eq!(err.code, crate::errors::ErrorCode::InvalidPackageConfig);
  }
}
