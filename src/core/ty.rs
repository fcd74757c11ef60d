// This module defines IrType, the static type description the propagation engine needs from
// the host program. Only a handful of queries matter to the engine: stripping pointer and array
// layers to reach the element type that is actually stored, telling aggregates (struct-like
// types) apart from scalars, and deciding whether a type belongs to the floating-point family.
// Hosts translate their own type system into IrType on demand through IrAdaptor::static_type.

//! Static types as seen by the propagation engine.

use std::fmt;

/// A host type, reduced to the shapes the engine distinguishes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IrType {
    Void,
    Int(u32),
    Half,
    Float,
    Double,
    Ptr(Box<IrType>),
    Array(u64, Box<IrType>),
    Struct(Vec<IrType>),
    Label,
    Func,
}

impl IrType {
    pub fn ptr_to(ty: IrType) -> Self {
        IrType::Ptr(Box::new(ty))
    }

    /// Strips every pointer and array layer.
    ///
    /// `[4 x {float, i32}]*` becomes `{float, i32}`.
    pub fn unwrap_pointers_and_arrays(&self) -> &IrType {
        let mut ty = self;
        loop {
            match ty {
                IrType::Ptr(inner) | IrType::Array(_, inner) => ty = inner,
                _ => return ty,
            }
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, IrType::Struct(_))
    }

    pub fn is_floating_point(&self) -> bool {
        matches!(self, IrType::Half | IrType::Float | IrType::Double)
    }

    /// True for floating-point types and pointers/arrays of them.
    pub fn is_floating_family(&self) -> bool {
        self.unwrap_pointers_and_arrays().is_floating_point()
    }

    /// True when a floating-point value is stored anywhere inside the type,
    /// including struct fields.
    pub fn contains_floating_point(&self) -> bool {
        match self.unwrap_pointers_and_arrays() {
            IrType::Struct(fields) => fields.iter().any(IrType::contains_floating_point),
            other => other.is_floating_point(),
        }
    }

    pub fn pointee(&self) -> Option<&IrType> {
        match self {
            IrType::Ptr(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, IrType::Void)
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Void => write!(f, "void"),
            IrType::Int(bits) => write!(f, "i{}", bits),
            IrType::Half => write!(f, "half"),
            IrType::Float => write!(f, "float"),
            IrType::Double => write!(f, "double"),
            IrType::Ptr(inner) => write!(f, "{}*", inner),
            IrType::Array(len, elem) => write!(f, "[{} x {}]", len, elem),
            IrType::Struct(fields) => {
                write!(f, "{{ ")?;
                for (idx, field) in fields.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, " }}")
            }
            IrType::Label => write!(f, "label"),
            IrType::Func => write!(f, "fn"),
        }
    }
}
