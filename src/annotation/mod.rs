//! Annotation strings and the metadata records derived from them.

pub mod metadata;
pub mod parser;

pub use metadata::{
    AnnotationMetadata, AttachedMetadata, FixedPointType, InputInfo, MdInfo, Range, StructInfo,
};
pub use parser::AnnotationParser;
