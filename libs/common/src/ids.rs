// Copyright 2024-2026 the Tern authors. MIT license.

use serde::Serialize;

macro_rules! index_type {
  ($(#[$meta:meta])* $name:ident) => {
    $(#[$meta])*
    #[derive(
      Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
    )]
    pub struct $name(pub u32);

    impl $name {
      pub const fn new(value: u32) -> Self {
        Self(value)
      }

      pub fn idx(self) -> usize {
        self.0 as usize
      }
    }
  };
}

index_type!(
  /// Opaque stable identifier of a file in the module graph.
  SourceIndex
);
index_type!(
  /// Position of a symbol within its file's slice of the symbol table.
  InnerIndex
);
index_type!(
  /// Position of a part within a file's `parts` vector.
  PartIndex
);
index_type!(
  /// Position of an import record within a file's `import_records` vector.
  ImportRecordIndex
);
index_type!(
  /// Position of a chunk in the chunk list built by the chunk planner.
  ChunkIndex
);

/// The runtime file is always the first file in the graph. Its parts declare
/// the `__commonJS`/`__esm`/`__toESM`/`__toCommonJS`/`__reExport`/`__export`
/// helpers that wrapped output depends on.
pub const RUNTIME_SOURCE_INDEX: SourceIndex = SourceIndex(0);

/// Part 0 of every JS file is reserved for hoisted runtime imports.
pub const RUNTIME_IMPORTS_PART_INDEX: PartIndex = PartIndex(0);

/// Part 1 of every JS file is the namespace-export part synthesized by the
/// linker.
pub const NS_EXPORT_PART_INDEX: PartIndex = PartIndex(1);

/// Byte offset into a file's source text, used to point diagnostics at the
/// import or export they are about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Loc(pub u32);
