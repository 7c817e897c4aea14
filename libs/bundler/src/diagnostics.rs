// Copyright 2024-2026 the Tern authors. MIT license.

use parking_lot::Mutex;
use tern_common::Loc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgKind {
  Error,
  Warning,
  Note,
  Debug,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsgLocation {
  pub file: String,
  pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
  pub text: String,
  pub location: Option<MsgLocation>,
}

impl Note {
  pub fn text(text: impl Into<String>) -> Self {
    Self {
      text: text.into(),
      location: None,
    }
  }

  pub fn at(file: impl Into<String>, loc: Loc, text: impl Into<String>) -> Self {
    Self {
      text: text.into(),
      location: Some(MsgLocation {
        file: file.into(),
        loc,
      }),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
  pub kind: MsgKind,
  pub location: Option<MsgLocation>,
  pub text: String,
  pub notes: Vec<Note>,
}

#[derive(Debug, Default)]
struct LogState {
  msgs: Vec<Diagnostic>,
  has_errors: bool,
}

/// Message sink for one link. Internally synchronized so parallel phases
/// can report without holding any other lock; `has_errors` observes only
/// this link's stream, so concurrent links don't cross-contaminate.
#[derive(Debug, Default)]
pub struct Log {
  state: Mutex<LogState>,
}

impl Log {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_msg(&self, msg: Diagnostic) {
    let mut state = self.state.lock();
    if msg.kind == MsgKind::Error {
      state.has_errors = true;
    }
    state.msgs.push(msg);
  }

  pub fn add_error(&self, location: Option<MsgLocation>, text: impl Into<String>) {
    self.add_msg(Diagnostic {
      kind: MsgKind::Error,
      location,
      text: text.into(),
      notes: Vec::new(),
    });
  }

  pub fn add_error_with_notes(
    &self,
    location: Option<MsgLocation>,
    text: impl Into<String>,
    notes: Vec<Note>,
  ) {
    self.add_msg(Diagnostic {
      kind: MsgKind::Error,
      location,
      text: text.into(),
      notes,
    });
  }

  pub fn add_warning(&self, location: Option<MsgLocation>, text: impl Into<String>) {
    self.add_msg(Diagnostic {
      kind: MsgKind::Warning,
      location,
      text: text.into(),
      notes: Vec::new(),
    });
  }

  pub fn add_debug(&self, location: Option<MsgLocation>, text: impl Into<String>) {
    self.add_msg(Diagnostic {
      kind: MsgKind::Debug,
      location,
      text: text.into(),
      notes: Vec::new(),
    });
  }

  pub fn has_errors(&self) -> bool {
    self.state.lock().has_errors
  }

  pub fn msgs(&self) -> Vec<Diagnostic> {
    self.state.lock().msgs.clone()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn errors_flip_the_flag_and_warnings_do_not() {
    let log = Log::new();
    log.add_warning(None, "w");
    assert!(!log.has_errors());
    log.add_error(None, "e");
    assert!(log.has_errors());
    assert_eq!(log.msgs().len(), 2);
  }
}
