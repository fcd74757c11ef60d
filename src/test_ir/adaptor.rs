//! TestIR adaptor implementation for the initialization pass.
//!
//! This adaptor lets the pass query and rewrite a [`TestIR`] module, enabling
//! tests of every pass stage with small hand-written programs.

use super::{Constant, Operation, TestIR, ValueClass, ANNOTATION_MARKER};
use crate::annotation::AttachedMetadata;
use crate::core::{
    AnnotationMarker, InitError, InitResult, IrAdaptor, IrType, ValueKind, ValueMap,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueRef(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncRef(pub u32);

/// Adaptor that implements IrAdaptor for TestIR
pub struct TestIRAdaptor<'ir> {
    ir: &'ir mut TestIR,
}

impl<'ir> TestIRAdaptor<'ir> {
    pub fn new(ir: &'ir mut TestIR) -> Self {
        Self { ir }
    }

    pub fn ir(&self) -> &TestIR {
        &*self.ir
    }

    fn value(&self, val: ValueRef) -> &super::Value {
        &self.ir.values[val.0 as usize]
    }

    fn func_of_value(&self, val: u32) -> Option<FuncRef> {
        self.ir
            .functions
            .iter()
            .position(|f| f.value == val)
            .map(|idx| FuncRef(idx as u32))
    }

    fn owner_name(&self, val: ValueRef) -> String {
        self.value(val)
            .func
            .map(|f| self.ir.functions[f as usize].name.clone())
            .unwrap_or_default()
    }
}

impl<'ir> IrAdaptor for TestIRAdaptor<'ir> {
    type ValueRef = ValueRef;
    type FuncRef = FuncRef;

    fn funcs(&self) -> Box<dyn Iterator<Item = Self::FuncRef> + '_> {
        Box::new((0..self.ir.functions.len() as u32).map(FuncRef))
    }

    fn func_name(&self, func: Self::FuncRef) -> &str {
        &self.ir.functions[func.0 as usize].name
    }

    fn func_has_body(&self, func: Self::FuncRef) -> bool {
        !self.ir.functions[func.0 as usize].declaration
    }

    fn func_is_intrinsic(&self, func: Self::FuncRef) -> bool {
        self.ir.functions[func.0 as usize].name.starts_with("llvm.")
    }

    fn func_value(&self, func: Self::FuncRef) -> Self::ValueRef {
        ValueRef(self.ir.functions[func.0 as usize].value)
    }

    fn func_args(&self, func: Self::FuncRef) -> Box<dyn Iterator<Item = Self::ValueRef> + '_> {
        Box::new(
            self.ir.functions[func.0 as usize]
                .args
                .iter()
                .map(|&arg| ValueRef(arg)),
        )
    }

    fn func_insts(&self, func: Self::FuncRef) -> Box<dyn Iterator<Item = Self::ValueRef> + '_> {
        Box::new(
            self.ir.functions[func.0 as usize]
                .blocks
                .iter()
                .flat_map(|block| block.insts.iter())
                .map(|&inst| ValueRef(inst)),
        )
    }

    fn as_function(&self, val: Self::ValueRef) -> Option<Self::FuncRef> {
        if self.value(val).class != ValueClass::Function {
            return None;
        }
        self.func_of_value(val.0)
    }

    fn global_annotations(&self) -> Vec<(Self::ValueRef, String)> {
        self.ir
            .annotations
            .iter()
            .map(|(val, text)| (ValueRef(*val), text.clone()))
            .collect()
    }

    fn value_name(&self, val: Self::ValueRef) -> &str {
        &self.value(val).name
    }

    fn kind_of(&self, val: Self::ValueRef) -> ValueKind {
        match self.value(val).class {
            ValueClass::Global => ValueKind::GlobalObject,
            ValueClass::Function => ValueKind::Function,
            ValueClass::Argument => ValueKind::Argument,
            ValueClass::Instruction => ValueKind::Instruction,
            ValueClass::Constant => ValueKind::Other,
        }
    }

    fn static_type(&self, val: Self::ValueRef) -> IrType {
        self.value(val).ty.clone()
    }

    fn successors(&self, val: Self::ValueRef) -> Vec<Self::ValueRef> {
        let mut succs = Vec::new();
        let push = |succs: &mut Vec<ValueRef>, v: u32| {
            if !succs.contains(&ValueRef(v)) {
                succs.push(ValueRef(v));
            }
        };

        for &user in &self.value(val).users {
            let inst = &self.ir.values[user as usize];
            if inst.erased {
                continue;
            }
            push(&mut succs, user);
            // A store also makes the stored value flow into the memory it
            // writes.
            if inst.op == Operation::Store && inst.operands.first() == Some(&val.0) {
                if let Some(&ptr) = inst.operands.get(1) {
                    push(&mut succs, ptr);
                }
            }
        }
        succs
    }

    fn operands(&self, val: Self::ValueRef) -> Vec<Self::ValueRef> {
        self.value(val).operands.iter().map(|&op| ValueRef(op)).collect()
    }

    fn parent_func(&self, val: Self::ValueRef) -> Option<Self::FuncRef> {
        let value = self.value(val);
        match value.class {
            ValueClass::Argument | ValueClass::Instruction => value.func.map(FuncRef),
            _ => None,
        }
    }

    fn is_call(&self, val: Self::ValueRef) -> bool {
        self.value(val).op == Operation::Call
    }

    fn called_function(&self, call: Self::ValueRef) -> Option<Self::FuncRef> {
        if !self.is_call(call) {
            return None;
        }
        let callee = *self.value(call).operands.last()?;
        self.as_function(ValueRef(callee))
    }

    fn call_args(&self, call: Self::ValueRef) -> Vec<Self::ValueRef> {
        let operands = &self.value(call).operands;
        match operands.split_last() {
            Some((_, args)) if self.is_call(call) => args.iter().map(|&a| ValueRef(a)).collect(),
            _ => Vec::new(),
        }
    }

    fn is_field_access(&self, val: Self::ValueRef) -> bool {
        self.value(val).op == Operation::Gep
    }

    fn field_indices(&self, val: Self::ValueRef) -> Vec<Option<u64>> {
        self.value(val)
            .operands
            .iter()
            .skip(1)
            .map(|&idx| match self.ir.values[idx as usize].constant {
                Some(Constant::Int(v)) => u64::try_from(v).ok(),
                _ => None,
            })
            .collect()
    }

    fn annotation_marker(
        &self,
        val: Self::ValueRef,
    ) -> InitResult<Option<AnnotationMarker<Self::ValueRef>>> {
        let Some(callee) = self.called_function(val) else {
            return Ok(None);
        };
        if self.func_name(callee) != ANNOTATION_MARKER {
            return Ok(None);
        }

        let args = self.call_args(val);
        let Some(&annotated) = args.first() else {
            return Err(InitError::MalformedMarker {
                function: self.owner_name(val),
                reason: "missing annotated operand".to_string(),
            });
        };
        let text = match args.get(1).and_then(|s| self.value(*s).constant.as_ref()) {
            Some(Constant::Str(text)) => text.clone(),
            _ => {
                return Err(InitError::MalformedMarker {
                    function: self.owner_name(val),
                    reason: "annotation operand is not a string constant".to_string(),
                })
            }
        };

        // Markers usually take a cast of the variable.
        let mut target = annotated;
        while self.value(target).op == Operation::Bitcast {
            match self.value(target).operands.first() {
                Some(&src) => target = ValueRef(src),
                None => break,
            }
        }
        Ok(Some(AnnotationMarker { target, text }))
    }

    fn param_storage_slot(&self, arg: Self::ValueRef) -> Option<Self::ValueRef> {
        self.value(arg).users.iter().find_map(|&user| {
            let inst = &self.ir.values[user as usize];
            if inst.erased || inst.op != Operation::Store || inst.operands.first() != Some(&arg.0) {
                return None;
            }
            let ptr = *inst.operands.get(1)?;
            (self.ir.values[ptr as usize].op == Operation::Alloca).then_some(ValueRef(ptr))
        })
    }

    fn mark_starting_point(&mut self, func: Self::FuncRef) {
        self.ir.functions[func.0 as usize].starting_point = true;
    }

    fn clone_function_body(
        &mut self,
        func: Self::FuncRef,
        name_hint: &str,
    ) -> InitResult<(Self::FuncRef, ValueMap<Self::ValueRef>)> {
        if !self.func_has_body(func) {
            return Err(InitError::NoBody {
                name: self.func_name(func).to_string(),
            });
        }
        let name = self.ir.unique_function_name(name_hint);
        let (clone, map) = self.ir.clone_function(func.0, name);
        let map = map
            .into_iter()
            .map(|(old, new)| (ValueRef(old), ValueRef(new)))
            .collect();
        Ok((FuncRef(clone), map))
    }

    fn set_internal_linkage(&mut self, func: Self::FuncRef) {
        self.ir.functions[func.0 as usize].internal = true;
    }

    fn link_clone(&mut self, clone: Self::FuncRef, original: Self::FuncRef) {
        self.ir.functions[clone.0 as usize].cloned_from = Some(original.0);
    }

    fn set_called_function(&mut self, call: Self::ValueRef, func: Self::FuncRef) -> InitResult<()> {
        if !self.is_call(call) {
            return Err(InitError::InvalidValue {
                reason: format!("{:?} is not a call", call),
            });
        }
        let slot = self.value(call).operands.len() - 1;
        let callee = self.ir.functions[func.0 as usize].value;
        self.ir.set_operand(call.0, slot, callee);
        Ok(())
    }

    fn erase_instruction(&mut self, val: Self::ValueRef) {
        self.ir.erase(val.0);
    }

    fn attach_metadata(&mut self, val: Self::ValueRef, md: AttachedMetadata) {
        self.ir.metadata.insert(val.0, md);
    }

    fn has_attached_metadata(&self, val: Self::ValueRef) -> bool {
        self.ir.metadata.contains_key(&val.0)
    }
}
