// Copyright 2024-2026 the Tern authors. MIT license.

use std::path::Path;

/// Node-style error codes, stable across messages so callers can branch on
/// them the way Node tooling branches on `[ERR_*]` prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ErrorCode {
  #[error("ERR_INVALID_MODULE_SPECIFIER")]
  InvalidModuleSpecifier,
  #[error("ERR_INVALID_PACKAGE_CONFIG")]
  InvalidPackageConfig,
  #[error("ERR_INVALID_PACKAGE_TARGET")]
  InvalidPackageTarget,
  #[error("ERR_MODULE_NOT_FOUND")]
  ModuleNotFound,
  #[error("ERR_PACKAGE_IMPORT_NOT_DEFINED")]
  PackageImportNotDefined,
  #[error("ERR_PACKAGE_PATH_NOT_EXPORTED")]
  PackagePathNotExported,
}

/// A failed resolution: the top-level message plus the explanatory notes
/// that the bundler attaches to its `Could not resolve "..."` diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveError {
  pub code: ErrorCode,
  pub text: String,
  pub notes: Vec<String>,
}

impl ResolveError {
  pub fn with_note(mut self, note: impl Into<String>) -> Self {
    self.notes.push(note.into());
    self
  }
}

impl std::fmt::Display for ResolveError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "[{}] {}", self.code, self.text)
  }
}

impl std::error::Error for ResolveError {}

pub(crate) fn err_invalid_module_specifier(
  request: &str,
  reason: &str,
  maybe_base: Option<&Path>,
) -> ResolveError {
  let mut text = format!("Invalid module \"{}\" {}", request, reason);
  if let Some(base) = maybe_base {
    text = format!("{} imported from {}", text, base.display());
  }
  ResolveError {
    code: ErrorCode::InvalidModuleSpecifier,
    text,
    notes: Vec::new(),
  }
}

pub(crate) fn err_invalid_package_config(
  path: &Path,
  maybe_base: Option<&Path>,
  maybe_message: Option<String>,
) -> ResolveError {
  let mut text = format!("Invalid package config {}", path.display());
  if let Some(base) = maybe_base {
    text = format!("{} while importing {}", text, base.display());
  }
  if let Some(message) = maybe_message {
    text = format!("{}. {}", text, message);
  }
  ResolveError {
    code: ErrorCode::InvalidPackageConfig,
    text,
    notes: Vec::new(),
  }
}

pub(crate) fn err_module_not_found(
  path: &str,
  base: &Path,
  typ: &str,
) -> ResolveError {
  ResolveError {
    code: ErrorCode::ModuleNotFound,
    text: format!(
      "Cannot find {} '{}' imported from {}",
      typ,
      path,
      base.display()
    ),
    notes: Vec::new(),
  }
}

pub(crate) fn err_package_import_not_defined(
  specifier: &str,
  maybe_package_json: Option<&Path>,
  base: &Path,
) -> ResolveError {
  let mut text = format!("Package import specifier \"{}\" is not defined", specifier);
  if let Some(path) = maybe_package_json {
    text = format!("{} in package {}", text, path.display());
  }
  text = format!("{} imported from {}", text, base.display());
  ResolveError {
    code: ErrorCode::PackageImportNotDefined,
    text,
    notes: Vec::new(),
  }
}

pub(crate) fn err_invalid_package_target(
  package_path: &Path,
  subpath: &str,
  target: &str,
  internal: bool,
  maybe_base: Option<&Path>,
) -> ResolveError {
  let relative_error = !internal && target.starts_with("./");
  let ie = if internal { "imports" } else { "exports" };
  let mut text = if subpath == "." {
    format!(
      "Invalid \"exports\" main target {} defined in the package config {}package.json",
      target,
      package_path.display()
    )
  } else {
    format!(
      "Invalid \"{}\" target {} defined for '{}' in the package config {}package.json",
      ie,
      target,
      subpath,
      package_path.display()
    )
  };
  if let Some(base) = maybe_base {
    text = format!("{} imported from {}", text, base.display());
  }
  if relative_error {
    text = format!("{}; target must start with \"./\"", text);
  }
  ResolveError {
    code: ErrorCode::InvalidPackageTarget,
    text,
    notes: Vec::new(),
  }
}

pub(crate) fn err_package_path_not_exported(
  package_name: &str,
  subpath: &str,
  maybe_base: Option<&Path>,
) -> ResolveError {
  let mut text = format!(
    "The path \"{}\" is not exported by package \"{}\"",
    subpath, package_name
  );
  if let Some(base) = maybe_base {
    text = format!("{} (imported from {})", text, base.display());
  }
  ResolveError {
    code: ErrorCode::PackagePathNotExported,
    text,
    notes: Vec::new(),
  }
}

