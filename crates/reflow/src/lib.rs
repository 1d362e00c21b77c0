//! Meta crate that re-exports the reflow reactive engine with sensible
//! defaults. Downstream users can depend on this crate alone; the
//! underlying crates stay available when deeper integration is required.

pub use reflow_common as common;
pub use reflow_engine as engine;

pub use reflow_engine::{
    BinOp, CellKind, CellRef, CellValue, DepList, DependencyGraph, EngineConfig, Expr, Field,
    FieldHost, FireGate, FlowError, FlowErrorKind, Handle, HostId, InvalidateStrategy, NodeId,
    Numeric, ObjectId, OnInvalid, TriggerPolicy, action, action_with, calc, calc_with, configure,
    const_var, expr, field, live_cells, var, var_host,
};

pub mod doc_examples;

/// Everything a typical embedder needs in scope.
pub mod prelude {
    pub use crate::{
        CellRef, EngineConfig, Expr, Field, FieldHost, FlowError, FlowErrorKind, Handle, HostId,
        InvalidateStrategy, TriggerPolicy, action, action_with, calc, calc_with, configure,
        const_var, expr, field, var, var_host,
    };
}
