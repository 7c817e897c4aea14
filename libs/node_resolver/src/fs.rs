// Copyright 2024-2026 the Tern authors. MIT license.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::path::PathBuf;

/// The resolver's view of the file system. Kept deliberately small so tests
/// can run against an in-memory tree and the bundler can plug in whatever
/// abstraction it already has.
pub trait ResolverFs: Send + Sync {
  fn read_to_string(&self, path: &Path) -> io::Result<String>;
  fn is_file(&self, path: &Path) -> bool;
  fn is_dir(&self, path: &Path) -> bool;
}

/// Passes straight through to `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl ResolverFs for RealFs {
  fn read_to_string(&self, path: &Path) -> io::Result<String> {
    std::fs::read_to_string(path)
  }

  fn is_file(&self, path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
  }

  fn is_dir(&self, path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
  }
}

/// In-memory tree keyed by normalized absolute paths. Directories exist
/// implicitly for every stored file's ancestors.
#[derive(Debug, Default, Clone)]
pub struct InMemoryFs {
  files: BTreeMap<PathBuf, String>,
}

impl InMemoryFs {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add(&mut self, path: impl Into<PathBuf>, contents: impl Into<String>) -> &mut Self {
    self.files.insert(normalize(&path.into()), contents.into());
    self
  }
}

fn normalize(path: &Path) -> PathBuf {
  use path_clean::PathClean;
  path.to_path_buf().clean()
}

impl ResolverFs for InMemoryFs {
  fn read_to_string(&self, path: &Path) -> io::Result<String> {
    self
      .files
      .get(&normalize(path))
      .cloned()
      .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "not found"))
  }

  fn is_file(&self, path: &Path) -> bool {
    self.files.contains_key(&normalize(path))
  }

  fn is_dir(&self, path: &Path) -> bool {
    let dir = normalize(path);
    self
      .files
      .keys()
      .any(|file| file.starts_with(&dir) && file != &dir)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn in_memory_dirs_exist_for_ancestors() {
    let mut fs = InMemoryFs::new();
    fs.add("/proj/node_modules/pkg/index.js", "export {}");
    assert!(fs.is_file(Path::new("/proj/node_modules/pkg/index.js")));
    assert!(fs.is_dir(Path::new("/proj/node_modules/pkg")));
    assert!(fs.is_dir(Path::new("/proj")));
    assert!(!fs.is_file(Path::new("/proj/node_modules/pkg")));
    assert!(!fs.is_dir(Path::new("/other")));
  }

  #[test]
  fn normalization_collapses_dot_segments() {
    let mut fs = InMemoryFs::new();
    fs.add("/a/b/c.js", "");
    assert!(fs.is_file(Path::new("/a/./b/../b/c.js")));
  }
}
