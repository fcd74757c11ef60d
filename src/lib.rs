//! taffo-init - Annotation propagation for float to fixed-point conversion.
//!
//! The initialization pass reads the numeric annotations a user attached to a
//! few program variables, propagates them along the data flow to every value
//! reachable from those variables, and specializes functions called with
//! annotated arguments so every call site gets a callee typed for its
//! numeric context. The result is a metadata record on every value that later
//! conversion stages consume.
//!
//! # Primary Usage
//!
//! ```ignore
//! use taffo_init::{InitConfig, TaffoInitializer};
//! use taffo_init::test_ir::{TestIR, TestIRAdaptor};
//!
//! let mut ir = TestIR::parse(text)?;
//! let mut adaptor = TestIRAdaptor::new(&mut ir);
//! let report = TaffoInitializer::new(InitConfig::default()).run(&mut adaptor)?;
//! println!("{}", report.stats);
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Shared infrastructure (adaptor trait, types, errors, session)
//! - [`annotation`] - Annotation parsing and metadata records
//! - [`init`] - Propagation engine, specializer and pass driver
//! - [`test_ir`] - Textual test IR implementing the adaptor

pub mod annotation;
pub mod core;
pub mod init;
pub mod test_ir;

// Re-export common types from organized modules
pub use annotation::{AnnotationMetadata, AnnotationParser, AttachedMetadata, MdInfo};
pub use core::{
    InitConfig, InitError, InitReport, InitResult, InitWarning, IrAdaptor, IrType, ParseFailure,
    ValueKind,
};
pub use init::{
    ConversionQueue, ConversionQueueBuilder, FunctionSpecializer, MetadataWriter, RootCollector,
    RootSet, TaffoInitializer, ValueInfo,
};
