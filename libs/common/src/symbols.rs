// Copyright 2024-2026 the Tern authors. MIT license.

use crate::ids::ChunkIndex;
use crate::ids::InnerIndex;
use crate::ids::SourceIndex;

/// Reference to a symbol in the global table: the file that declared it plus
/// its position within that file's slice. Cross-file references always go
/// through this pair; files never hold pointers into each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolRef {
  pub source: SourceIndex,
  pub inner: InnerIndex,
}

impl SymbolRef {
  pub const fn new(source: SourceIndex, inner: InnerIndex) -> Self {
    Self { source, inner }
  }
}

impl Default for SymbolRef {
  /// A sentinel that points at no file. ASTs built by loaders that have no
  /// use for a distinguished ref (e.g. CSS) leave it at the default.
  fn default() -> Self {
    SymbolRef::new(SourceIndex::new(u32::MAX), InnerIndex::new(u32::MAX))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SymbolKind {
  /// Not declared anywhere in the graph. Unbound symbols print as their
  /// original name and are never renamed.
  Unbound,
  /// Declared by an import clause. Matched to an export during linking.
  Import,
  /// A TypeScript enum binding, which survives erasure.
  TsEnum,
  /// A hoisted `function` declaration.
  Hoisted,
  /// A property name eligible for mangling. One symbol per name per file;
  /// same-name symbols across the bundle are merged so they share a name.
  MangledProp,
  #[default]
  Other,
}

/// Rewrites references to this symbol into a property access on a namespace
/// object, e.g. an import that resolved into a CommonJS module.
#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceAlias {
  pub namespace_ref: SymbolRef,
  pub alias: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SymbolFlags {
  pub must_not_be_renamed: bool,
  pub is_empty_function: bool,
  pub is_identity_function: bool,
  pub could_potentially_be_mutated: bool,
  /// Set when an import failed to match but the file is TypeScript, so the
  /// binding is probably a type and every use should be dropped.
  pub import_item_missing: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Symbol {
  pub original_name: String,
  pub kind: SymbolKind,
  pub use_count_estimate: u32,
  /// Chunk that ended up containing the declaring part. Set by cross-chunk
  /// analysis; `None` before that or for dead symbols.
  pub chunk_index: Option<ChunkIndex>,
  pub namespace_alias: Option<NamespaceAlias>,
  /// Union-find pointer installed by `merge`. Renaming treats the whole
  /// chain as a single symbol.
  pub link: Option<SymbolRef>,
  pub flags: SymbolFlags,
}

impl Symbol {
  pub fn new(name: impl Into<String>, kind: SymbolKind) -> Self {
    Self {
      original_name: name.into(),
      kind,
      ..Default::default()
    }
  }
}

/// Global symbol table indexed by `(source_index, inner_index)`.
///
/// Writers hold exclusive access during the serial linker phases; parallel
/// phases only read, and only after `follow_all` has compressed every link
/// chain so no lazy path compression races a concurrent reader.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
  files: Vec<Vec<Symbol>>,
}

impl SymbolTable {
  pub fn with_file_count(count: usize) -> Self {
    Self {
      files: vec![Vec::new(); count],
    }
  }

  pub fn file_symbols(&self, source: SourceIndex) -> &[Symbol] {
    &self.files[source.idx()]
  }

  /// Per-file slices for phases that run one task per file. The slices are
  /// disjoint, so tasks may mutate their own file's symbols in parallel.
  pub fn files_mut(&mut self) -> &mut [Vec<Symbol>] {
    &mut self.files
  }

  pub fn file_count(&self) -> usize {
    self.files.len()
  }

  /// Appends an empty per-file slice and returns its source index. Graph
  /// builders call this once per file, in file order.
  pub fn add_file(&mut self) -> SourceIndex {
    self.files.push(Vec::new());
    SourceIndex::new(self.files.len() as u32 - 1)
  }

  pub fn create(
    &mut self,
    source: SourceIndex,
    name: impl Into<String>,
    kind: SymbolKind,
  ) -> SymbolRef {
    let slot = &mut self.files[source.idx()];
    let inner = InnerIndex::new(slot.len() as u32);
    slot.push(Symbol::new(name, kind));
    SymbolRef::new(source, inner)
  }

  pub fn get(&self, sym: SymbolRef) -> &Symbol {
    &self.files[sym.source.idx()][sym.inner.idx()]
  }

  pub fn get_mut(&mut self, sym: SymbolRef) -> &mut Symbol {
    &mut self.files[sym.source.idx()][sym.inner.idx()]
  }

  /// Follows the link chain to the canonical symbol, compressing the path so
  /// later lookups are O(1).
  pub fn follow(&mut self, sym: SymbolRef) -> SymbolRef {
    let Some(link) = self.get(sym).link else {
      return sym;
    };
    let root = self.follow(link);
    if root != link {
      self.get_mut(sym).link = Some(root);
    }
    root
  }

  /// Read-only variant of [`SymbolTable::follow`] for parallel phases. The
  /// chain must already be compressed by [`SymbolTable::follow_all`].
  pub fn follow_read(&self, sym: SymbolRef) -> SymbolRef {
    let mut current = sym;
    while let Some(link) = self.get(current).link {
      current = link;
    }
    current
  }

  /// Compresses every link chain in the table. Must run once after the last
  /// merge and before any parallel phase reads the table.
  pub fn follow_all(&mut self) {
    for source in 0..self.files.len() {
      for inner in 0..self.files[source].len() {
        self.follow(SymbolRef::new(
          SourceIndex::new(source as u32),
          InnerIndex::new(inner as u32),
        ));
      }
    }
  }

  /// Makes `sym` an alias of `target` so renaming assigns both the same
  /// name. Use counts fold into the canonical symbol.
  pub fn merge(&mut self, sym: SymbolRef, target: SymbolRef) -> SymbolRef {
    let old_root = self.follow(sym);
    let new_root = self.follow(target);
    if old_root == new_root {
      return new_root;
    }
    let old_count = self.get(old_root).use_count_estimate;
    self.get_mut(old_root).link = Some(new_root);
    self.get_mut(new_root).use_count_estimate += old_count;
    new_root
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn table() -> SymbolTable {
    SymbolTable::with_file_count(2)
  }

  #[test]
  fn merge_folds_use_counts_and_links() {
    let mut t = table();
    let a = t.create(SourceIndex::new(0), "a", SymbolKind::Import);
    let b = t.create(SourceIndex::new(1), "b", SymbolKind::Other);
    t.get_mut(a).use_count_estimate = 3;
    t.get_mut(b).use_count_estimate = 2;

    let root = t.merge(a, b);
    assert_eq!(root, b);
    assert_eq!(t.follow(a), b);
    assert_eq!(t.get(b).use_count_estimate, 5);
  }

  #[test]
  fn follow_compresses_chains() {
    let mut t = table();
    let a = t.create(SourceIndex::new(0), "a", SymbolKind::Import);
    let b = t.create(SourceIndex::new(0), "b", SymbolKind::Import);
    let c = t.create(SourceIndex::new(1), "c", SymbolKind::Other);
    t.merge(a, b);
    t.merge(b, c);

    assert_eq!(t.follow(a), c);
    // After compression the intermediate hop is gone.
    assert_eq!(t.get(a).link, Some(c));
    assert_eq!(t.follow_read(a), c);
  }

  #[test]
  fn merge_is_idempotent() {
    let mut t = table();
    let a = t.create(SourceIndex::new(0), "a", SymbolKind::Import);
    let b = t.create(SourceIndex::new(1), "b", SymbolKind::Other);
    t.get_mut(a).use_count_estimate = 1;
    t.get_mut(b).use_count_estimate = 1;
    t.merge(a, b);
    t.merge(a, b);
    assert_eq!(t.get(b).use_count_estimate, 2);
  }
}
