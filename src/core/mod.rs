// This module gathers the infrastructure shared by every stage of the initialization pass: the
// IrAdaptor trait through which the engine queries and mutates the host program, the IrType
// description of static types, the error and warning types, the pass configuration and the
// per-run session holding warnings and statistics. Nothing here knows about annotations or the
// propagation algorithm; those live in the annotation and init modules built on top.

//! Core infrastructure of the initialization pass.
//!
//! - [`adaptor`]: the [`IrAdaptor`] bridge to the host IR
//! - [`ty`]: static types and the shape queries the engine relies on
//! - [`error`]: fatal errors, annotation parse failures and warnings
//! - [`config`] and [`session`]: per-run configuration and state

pub mod adaptor;
pub mod config;
pub mod error;
pub mod session;
pub mod ty;

pub use adaptor::{AnnotationMarker, IrAdaptor, ValueKind, ValueMap};
pub use config::InitConfig;
pub use error::{InitError, InitResult, InitWarning, ParseFailure};
pub use session::{InitReport, InitSession, SessionStats};
pub use ty::IrType;
