// This module defines the IrAdaptor trait, the bridge between the initialization pass and the
// host program representation. The pass never touches host data structures directly: it asks
// the adaptor for a value's data-flow successors (users) and operands, its kind and static type,
// the functions of the module and their instructions, the annotation strings attached through
// marker calls or the module annotation table, and it asks the adaptor to perform the few
// mutations the pass needs (cloning a function body, rewriting a call target, erasing an
// instruction, attaching metadata). Successor and operand queries return owned snapshots so the
// engine can keep iterating while the host is mutated by cloning. Implementations must return
// successors in a stable order (creation order for the test IR) so that runs are deterministic.

//! IrAdaptor responsibilities.
//!
//! The adaptor is the glue between the pass and the host's SSA based IR. The
//! framework assumes:
//! - Values have a stable identity (`ValueRef`) that survives unrelated
//!   mutations of the program.
//! - Every instruction belongs to exactly one function; globals, constants
//!   and functions belong to none.
//! - Calls expose their callee separately from their actual arguments and
//!   report `None` when the callee is not statically known.
//! - Annotation marker calls exist only to carry an annotation string and may
//!   be erased once their metadata has been consumed.

use super::error::InitResult;
use super::ty::IrType;
use crate::annotation::AttachedMetadata;
use core::fmt::Debug;
use core::hash::Hash;
use hashbrown::HashMap;

/// Coarse classification of a program value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Instruction,
    GlobalObject,
    Argument,
    Function,
    /// Constants, block labels and anything else without data-flow identity.
    Other,
}

impl ValueKind {
    /// Whether values of this kind carry data that can be converted.
    pub fn is_data_flow(self) -> bool {
        matches!(
            self,
            ValueKind::Instruction | ValueKind::GlobalObject | ValueKind::Argument
        )
    }
}

/// An annotation marker call: the annotated value and the raw annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationMarker<V> {
    pub target: V,
    pub text: String,
}

/// Old-to-new value mapping produced by cloning a function body.
pub type ValueMap<V> = HashMap<V, V>;

/// Bridge between a host SSA IR and the initialization pass.
pub trait IrAdaptor {
    type ValueRef: Copy + Eq + Ord + Hash + Debug;
    type FuncRef: Copy + Eq + Hash + Debug;

    /// Iterator over all functions in the module, in definition order.
    fn funcs(&self) -> Box<dyn Iterator<Item = Self::FuncRef> + '_>;

    /// Linkage name of the function.
    fn func_name(&self, func: Self::FuncRef) -> &str;

    fn func_has_body(&self, func: Self::FuncRef) -> bool;

    /// Builtins and intrinsics can never be analyzed or specialized.
    fn func_is_intrinsic(&self, func: Self::FuncRef) -> bool;

    /// The function as a value (what calls reference).
    fn func_value(&self, func: Self::FuncRef) -> Self::ValueRef;

    /// Formal parameters of the function.
    fn func_args(&self, func: Self::FuncRef) -> Box<dyn Iterator<Item = Self::ValueRef> + '_>;

    /// Instructions of the function body in block order.
    fn func_insts(&self, func: Self::FuncRef) -> Box<dyn Iterator<Item = Self::ValueRef> + '_>;

    /// The function a value denotes, if it is one.
    fn as_function(&self, val: Self::ValueRef) -> Option<Self::FuncRef>;

    /// Module level annotations: (annotated global or function, annotation).
    fn global_annotations(&self) -> Vec<(Self::ValueRef, String)>;

    /// Name of a value for diagnostics and root identity.
    fn value_name(&self, val: Self::ValueRef) -> &str;

    fn kind_of(&self, val: Self::ValueRef) -> ValueKind;

    fn static_type(&self, val: Self::ValueRef) -> IrType;

    /// Forward data-flow edges (users) in a stable order.
    fn successors(&self, val: Self::ValueRef) -> Vec<Self::ValueRef>;

    /// Operands of an instruction, callee included for calls.
    fn operands(&self, val: Self::ValueRef) -> Vec<Self::ValueRef>;

    /// The function owning an instruction or argument.
    fn parent_func(&self, val: Self::ValueRef) -> Option<Self::FuncRef>;

    fn is_call(&self, val: Self::ValueRef) -> bool;

    /// Statically known callee of a call; `None` for indirect calls.
    fn called_function(&self, call: Self::ValueRef) -> Option<Self::FuncRef>;

    /// Actual arguments of a call.
    fn call_args(&self, call: Self::ValueRef) -> Vec<Self::ValueRef>;

    /// Whether the value projects a field out of an aggregate pointer.
    fn is_field_access(&self, val: Self::ValueRef) -> bool;

    /// Indices of a field access, base excluded; `None` marks a
    /// non-constant index.
    fn field_indices(&self, val: Self::ValueRef) -> Vec<Option<u64>>;

    /// Decodes an annotation marker call. Non-marker values yield `None`.
    fn annotation_marker(
        &self,
        val: Self::ValueRef,
    ) -> InitResult<Option<AnnotationMarker<Self::ValueRef>>>;

    /// Local storage a parameter is spilled into on entry, if any.
    fn param_storage_slot(&self, arg: Self::ValueRef) -> Option<Self::ValueRef>;

    /// Keep the function alive through later dead-code removal.
    fn mark_starting_point(&mut self, func: Self::FuncRef);

    /// Clone a function body under a fresh name derived from `name_hint`.
    fn clone_function_body(
        &mut self,
        func: Self::FuncRef,
        name_hint: &str,
    ) -> InitResult<(Self::FuncRef, ValueMap<Self::ValueRef>)>;

    fn set_internal_linkage(&mut self, func: Self::FuncRef);

    /// Record that `clone` was derived from `original`.
    fn link_clone(&mut self, clone: Self::FuncRef, original: Self::FuncRef);

    /// Rewrite a call to target `func`.
    fn set_called_function(&mut self, call: Self::ValueRef, func: Self::FuncRef) -> InitResult<()>;

    fn erase_instruction(&mut self, val: Self::ValueRef);

    fn attach_metadata(&mut self, val: Self::ValueRef, md: AttachedMetadata);

    fn has_attached_metadata(&self, val: Self::ValueRef) -> bool;
}
