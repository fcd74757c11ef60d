// This module holds the metadata records produced and consumed by the initialization pass.
// AnnotationMetadata is the direct result of parsing one annotation string. MdInfo is the
// per-value numeric description propagated through the program: a tagged variant that is
// either a scalar InputInfo (fixed-point layout, range, initial error, enable-conversion flag)
// or a StructInfo describing an aggregate field by field. Shape questions are answered by
// explicit queries: default_for_type builds a fresh record shaped like a type and
// is_compatible_with checks that a record can describe a type. AttachedMetadata is the final record handed to the host attachment sink.
// All records implement Display; the textual forms are what the test IR printer emits.

//! Annotation and per-value metadata records.

use crate::core::IrType;
use std::fmt;

/// Fixed-point layout: total width, fractional bits and signedness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedPointType {
    pub bit_width: u32,
    pub frac_bits: u32,
    pub signed: bool,
}

impl FixedPointType {
    /// Layout with `int_bits + frac_bits` total bits; `None` when the width
    /// does not fit in a `u32`.
    pub fn new(int_bits: u32, frac_bits: u32, signed: bool) -> Option<Self> {
        Some(Self {
            bit_width: int_bits.checked_add(frac_bits)?,
            frac_bits,
            signed,
        })
    }

    pub fn int_bits(&self) -> u32 {
        self.bit_width - self.frac_bits
    }
}

impl fmt::Display for FixedPointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.signed { "s" } else { "u" };
        write!(f, "{}{}_{}fixp", sign, self.int_bits(), self.frac_bits)
    }
}

/// Closed numeric interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "range({}, {})", self.min, self.max)
    }
}

/// Parsed form of one annotation string.
///
/// `initial_error` is only ever set together with `range`, and a missing
/// `numeric_type` always means `is_range_only`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnnotationMetadata {
    pub target: Option<String>,
    pub backtracking_enabled: bool,
    pub backtracking_forced: bool,
    pub numeric_type: Option<FixedPointType>,
    pub range: Option<Range>,
    pub initial_error: Option<f64>,
    pub is_range_only: bool,
}

impl fmt::Display for AnnotationMetadata {
    /// Re-serializes in the annotation grammar.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(target) = &self.target {
            write!(f, "target:{} ", target)?;
        }
        if self.backtracking_forced {
            write!(f, "force_no_float ")?;
        } else if self.backtracking_enabled {
            write!(f, "no_float ")?;
        }
        match &self.numeric_type {
            Some(ty) => {
                let sign = if ty.signed { "signed" } else { "unsigned" };
                write!(f, "{} {} {}", ty.int_bits(), ty.frac_bits, sign)?;
            }
            None => write!(f, "range")?,
        }
        if let Some(range) = &self.range {
            write!(f, " {} {}", range.min, range.max)?;
            if let Some(error) = self.initial_error {
                write!(f, " {}", error)?;
            }
        }
        Ok(())
    }
}

/// Scalar numeric description of one value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InputInfo {
    pub numeric_type: Option<FixedPointType>,
    pub range: Option<Range>,
    pub initial_error: Option<f64>,
    pub enable_conversion: bool,
}

impl InputInfo {
    pub fn from_annotation(ann: &AnnotationMetadata) -> Self {
        Self {
            numeric_type: ann.numeric_type,
            range: ann.range,
            initial_error: ann.initial_error,
            enable_conversion: true,
        }
    }
}

impl fmt::Display for InputInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(ty) = &self.numeric_type {
            parts.push(format!("type({})", ty));
        }
        if let Some(range) = &self.range {
            parts.push(range.to_string());
        }
        if let Some(error) = self.initial_error {
            parts.push(format!("error({})", error));
        }
        parts.push(if self.enable_conversion { "enabled" } else { "disabled" }.to_string());
        write!(f, "scalar({})", parts.join(" "))
    }
}

/// Field-by-field description of an aggregate value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructInfo {
    pub fields: Vec<Option<MdInfo>>,
}

impl StructInfo {
    pub fn field(&self, idx: usize) -> Option<&MdInfo> {
        self.fields.get(idx).and_then(Option::as_ref)
    }
}

impl fmt::Display for StructInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "struct[")?;
        for (idx, field) in self.fields.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            match field {
                Some(md) => write!(f, "{}", md)?,
                None => write!(f, "void")?,
            }
        }
        write!(f, "]")
    }
}

/// Numeric metadata of a value: a scalar record or an aggregate of records.
#[derive(Debug, Clone, PartialEq)]
pub enum MdInfo {
    Scalar(InputInfo),
    Struct(StructInfo),
}

impl MdInfo {
    /// Builds the root record for an annotated value stored as `storage`.
    ///
    /// Scalar annotations on struct storage are copied to every floating
    /// field; fields without floating-point data stay empty.
    pub fn from_annotation(ann: &AnnotationMetadata, storage: &IrType) -> Self {
        let scalar = InputInfo::from_annotation(ann);
        Self::broadcast(&scalar, storage.unwrap_pointers_and_arrays())
    }

    fn broadcast(scalar: &InputInfo, ty: &IrType) -> Self {
        match ty {
            IrType::Struct(fields) => MdInfo::Struct(StructInfo {
                fields: fields
                    .iter()
                    .map(|field| {
                        let field = field.unwrap_pointers_and_arrays();
                        if field.contains_floating_point() {
                            Some(Self::broadcast(scalar, field))
                        } else {
                            None
                        }
                    })
                    .collect(),
            }),
            _ => MdInfo::Scalar(scalar.clone()),
        }
    }

    /// Fresh record with every field unknown, shaped like `ty` once pointer
    /// and array layers are stripped.
    pub fn default_for_type(ty: &IrType) -> Self {
        match ty.unwrap_pointers_and_arrays() {
            IrType::Struct(fields) => MdInfo::Struct(StructInfo {
                fields: fields
                    .iter()
                    .map(|field| {
                        let field = field.unwrap_pointers_and_arrays();
                        if field.is_aggregate() || field.is_floating_point() {
                            Some(Self::default_for_type(field))
                        } else {
                            None
                        }
                    })
                    .collect(),
            }),
            _ => MdInfo::Scalar(InputInfo::default()),
        }
    }

    /// Whether this record can describe a value of type `ty`.
    pub fn is_compatible_with(&self, ty: &IrType) -> bool {
        match (self, ty.unwrap_pointers_and_arrays()) {
            (MdInfo::Struct(info), IrType::Struct(fields)) => {
                info.fields.len() == fields.len()
                    && info.fields.iter().zip(fields).all(|(md, field)| match md {
                        Some(md) => md.is_compatible_with(field),
                        None => true,
                    })
            }
            (MdInfo::Scalar(_), other) => !other.is_aggregate(),
            (MdInfo::Struct(_), _) => false,
        }
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, MdInfo::Struct(_))
    }

    pub fn enable_conversion(&self) -> bool {
        match self {
            MdInfo::Scalar(info) => info.enable_conversion,
            MdInfo::Struct(_) => false,
        }
    }

    /// Sets the enable-conversion flag on a scalar record; returns whether it
    /// changed. Aggregates carry the flag per field and are left alone.
    pub fn set_enable_conversion(&mut self) -> bool {
        match self {
            MdInfo::Scalar(info) if !info.enable_conversion => {
                info.enable_conversion = true;
                true
            }
            _ => false,
        }
    }
}

impl fmt::Display for MdInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MdInfo::Scalar(info) => write!(f, "{}", info),
            MdInfo::Struct(info) => write!(f, "{}", info),
        }
    }
}

/// Final record attached to a program value.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachedMetadata {
    pub info: Option<MdInfo>,
    pub target: Option<String>,
    /// Hop count from the nearest root.
    pub init_weight: u32,
    pub is_root: bool,
    pub backtracking: bool,
}

impl fmt::Display for AttachedMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "!taffo{{weight={}", self.init_weight)?;
        if self.is_root {
            write!(f, " root")?;
        }
        if self.backtracking {
            write!(f, " backtracking")?;
        }
        if let Some(target) = &self.target {
            write!(f, " target={}", target)?;
        }
        if let Some(info) = &self.info {
            write!(f, " info={}", info)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel() -> IrType {
        IrType::Struct(vec![IrType::Float, IrType::Float, IrType::Int(32)])
    }

    #[test]
    fn test_fixed_point_display() {
        assert_eq!(FixedPointType::new(16, 16, true).unwrap().to_string(), "s16_16fixp");
        assert_eq!(FixedPointType::new(3, 5, false).unwrap().to_string(), "u3_5fixp");
    }

    #[test]
    fn test_broadcast_on_struct_storage() {
        let ann = AnnotationMetadata {
            range: Some(Range::new(-1.0, 1.0)),
            is_range_only: true,
            ..Default::default()
        };
        let md = MdInfo::from_annotation(&ann, &IrType::ptr_to(pixel()));
        let MdInfo::Struct(info) = &md else {
            panic!("expected struct metadata, got {md}");
        };
        assert_eq!(info.fields.len(), 3);
        assert!(info.field(0).is_some());
        assert!(info.field(2).is_none());
        assert_eq!(md.to_string(), "struct[scalar(range(-1, 1) enabled), scalar(range(-1, 1) enabled), void]");
    }

    #[test]
    fn test_default_for_type_and_compatibility() {
        let md = MdInfo::default_for_type(&pixel());
        assert!(md.is_struct());
        assert!(md.is_compatible_with(&pixel()));
        assert!(!md.is_compatible_with(&IrType::Float));
        assert!(!MdInfo::Scalar(InputInfo::default()).is_compatible_with(&pixel()));
        assert!(MdInfo::Scalar(InputInfo::default()).is_compatible_with(&IrType::ptr_to(IrType::Float)));
    }

    #[test]
    fn test_enable_conversion_only_set_once() {
        let mut md = MdInfo::Scalar(InputInfo::default());
        assert!(md.set_enable_conversion());
        assert!(!md.set_enable_conversion());
        assert!(md.enable_conversion());
    }
}
