//! Error representation shared by every reflow crate.
//!
//! - **`FlowErrorKind`** : the canonical set of engine error codes
//! - **`FlowError`**     : kind + optional message + optional cell name
//!
//! Bind and write operations return these as values; they are never thrown
//! across a propagation pulse. When a future error needs its own payload,
//! add a variant to `FlowErrorKind`; existing code does not break.

use std::fmt;

use thiserror::Error;

/// All recognised engine error codes.
///
/// `RepeatDependency` is informational: a bind that discovers a second path
/// to one of its inputs still succeeds, and the kind only surfaces in logs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Error)]
pub enum FlowErrorKind {
    /// A proposed bind would close a dependency loop (self-edges included).
    #[error("cycle dependency")]
    CycleDependency,

    /// Two distinct paths from one cell to another were discovered.
    #[error("repeat dependency")]
    RepeatDependency,

    /// A produced value's type does not match the cell's declared value type.
    #[error("return type mismatch")]
    ReturnTypeMismatch,

    /// The handle's referent was closed or destroyed, or holds no value yet.
    #[error("null handle access")]
    NullHandleAccess,

    /// A write was attempted on a cell kind the user cannot write.
    #[error("not writable")]
    NotWritable,

    /// Creating the cell would exceed the configured node cap.
    #[error("capacity exceeded")]
    CapacityExceeded,
}

/// The single error value the engine API passes around.
///
/// Build one with `FlowError::new(kind)` and attach context with the
/// `with_*` helpers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowError {
    pub kind: FlowErrorKind,
    pub message: Option<String>,
    /// Debug name of the cell the error refers to, when one was set.
    pub cell: Option<String>,
}

impl From<FlowErrorKind> for FlowError {
    fn from(kind: FlowErrorKind) -> Self {
        Self {
            kind,
            message: None,
            cell: None,
        }
    }
}

impl FlowError {
    /// Basic constructor (no message, no cell name).
    pub fn new(kind: FlowErrorKind) -> Self {
        kind.into()
    }

    /// Attach a human-readable explanation.
    pub fn with_message<S: Into<String>>(mut self, msg: S) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Attach the debug name of the cell involved.
    pub fn with_cell<S: Into<String>>(mut self, cell: S) -> Self {
        self.cell = Some(cell.into());
        self
    }

    pub fn is_cycle(&self) -> bool {
        self.kind == FlowErrorKind::CycleDependency
    }
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;

        if let Some(ref msg) = self.message {
            write!(f, ": {msg}")?;
        }

        if let Some(ref cell) = self.cell {
            write!(f, " (cell `{cell}`)")?;
        }

        Ok(())
    }
}

impl std::error::Error for FlowError {}

impl From<FlowError> for String {
    fn from(error: FlowError) -> Self {
        format!("{error}")
    }
}
