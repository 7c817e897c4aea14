// Copyright 2024-2026 the Tern authors. MIT license.

use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;

pub use tern_node_resolver::Platform;

/// What the link is for. PassThrough and ConvertFormat disable tree shaking
/// and cross-module binding; only Bundle wraps CommonJS modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BundleMode {
  PassThrough,
  ConvertFormat,
  #[default]
  Bundle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
  /// Keep whatever syntax the entry uses.
  Preserve,
  /// Wrap everything in an immediately-invoked function.
  Iife,
  CommonJs,
  #[default]
  EsModule,
}

impl OutputFormat {
  pub fn keeps_import_export_syntax(self) -> bool {
    matches!(self, OutputFormat::EsModule | OutputFormat::Preserve)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceMapMode {
  #[default]
  None,
  Linked,
  Inline,
  External,
  InlineAndExternal,
  ExternalWithoutComment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LegalCommentsMode {
  #[default]
  None,
  Inline,
  EndOfFile,
  Linked,
  External,
}

/// The persistent property-mangling cache. A string value pins the mangled
/// name; `false` reserves the original name so the generator never takes
/// it. Updated under an exclusive callback so concurrent links serialize.
#[derive(Debug, Default)]
pub struct MangleCache {
  entries: Mutex<IndexMap<String, Value>>,
}

impl MangleCache {
  pub fn new(entries: IndexMap<String, Value>) -> Self {
    Self {
      entries: Mutex::new(entries),
    }
  }

  /// Runs `f` with exclusive access to the cache contents.
  pub fn with_exclusive<R>(
    &self,
    f: impl FnOnce(&mut IndexMap<String, Value>) -> R,
  ) -> R {
    let mut entries = self.entries.lock();
    f(&mut entries)
  }

  pub fn snapshot(&self) -> IndexMap<String, Value> {
    self.entries.lock().clone()
  }
}

#[derive(Clone)]
pub struct BundleOptions {
  pub mode: BundleMode,
  pub output_format: OutputFormat,
  pub platform: Platform,
  pub main_fields: Option<Vec<String>>,
  pub conditions: Vec<String>,
  pub code_splitting: bool,
  pub source_map: SourceMapMode,
  pub legal_comments: LegalCommentsMode,
  pub minify_whitespace: bool,
  pub minify_syntax: bool,
  pub minify_identifiers: bool,
  pub mangle_props: Option<regex::Regex>,
  pub mangle_cache: Option<Arc<MangleCache>>,
  /// Path templates understand `[dir]`, `[name]`, `[hash]` and `[ext]`.
  pub entry_path_template: String,
  pub chunk_path_template: String,
  pub abs_output_file: Option<PathBuf>,
  pub abs_output_dir: Option<PathBuf>,
  pub abs_output_base: Option<PathBuf>,
  pub public_path: Option<String>,
  /// Keep readable key names in synthetic wrappers so profilers show
  /// `require_foo` frames against the original path.
  pub profiler_names: bool,
  pub tree_shaking: bool,
  pub ignore_dce_annotations: bool,
  pub needs_metafile: bool,
  pub global_name: Option<String>,
  pub banner: Option<String>,
  pub footer: Option<String>,
}

impl Default for BundleOptions {
  fn default() -> Self {
    Self {
      mode: BundleMode::Bundle,
      output_format: OutputFormat::EsModule,
      platform: Platform::Browser,
      main_fields: None,
      conditions: Vec::new(),
      code_splitting: false,
      source_map: SourceMapMode::None,
      legal_comments: LegalCommentsMode::None,
      minify_whitespace: false,
      minify_syntax: false,
      minify_identifiers: false,
      mangle_props: None,
      mangle_cache: None,
      entry_path_template: "[dir]/[name].[ext]".to_string(),
      chunk_path_template: "chunks/[name]-[hash].[ext]".to_string(),
      abs_output_file: None,
      abs_output_dir: None,
      abs_output_base: None,
      public_path: None,
      profiler_names: true,
      tree_shaking: true,
      ignore_dce_annotations: false,
      needs_metafile: false,
      global_name: None,
      banner: None,
      footer: None,
    }
  }
}

impl BundleOptions {
  pub fn tree_shaking_enabled(&self) -> bool {
    self.tree_shaking && self.mode == BundleMode::Bundle
  }

  /// The resolver settings implied by these bundle options; the module
  /// graph builder constructs its resolver from this so conditions and
  /// main-field order stay in sync with the link.
  pub fn resolver_options(&self) -> tern_node_resolver::NodeResolverOptions {
    tern_node_resolver::NodeResolverOptions {
      platform: self.platform,
      conditions: self.conditions.clone(),
      main_fields: self.main_fields.clone(),
    }
  }
}
