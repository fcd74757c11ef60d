//! Test IR (TIR) parser and data structures for testing the initialization pass.
//!
//! This module provides a small typed SSA format for writing pass tests
//! without a real compiler host. The format is designed to be:
//! - Human-readable and writable
//! - Easy to parse
//! - Close enough to LLVM IR to express annotation and specialization patterns
//!
//! # TIR Format
//!
//! ```text
//! ; Comments start with semicolon
//! type %Pixel = { float, float, i32 }
//! @g = global float
//! annotate @g "range -1 1"
//! declare @sqrtf(float %x) -> float
//! define @main() -> i32 {
//! entry:
//!   %a = alloca float
//!   call @llvm.var.annotation(%a, "range -3000 3000")
//!   %c = const float 1.5
//!   store %c, %a
//!   %l = load %a
//!   %s = fadd %l, %c
//!   %i = fptosi %s to i32
//!   br ^exit
//! exit:
//!   ret %i
//! }
//! ```
//!
//! Functions whose name starts with `llvm.` are intrinsics and
//! `llvm.var.annotation` is the annotation marker. Printing a module yields
//! text the parser accepts again, with attached metadata appended as
//! `; !taffo{...}` comments.

use crate::annotation::AttachedMetadata;
use crate::core::IrType;
use std::collections::HashMap;
use std::fmt::Write as _;

pub mod adaptor;
pub mod check;
pub mod parser;

pub use adaptor::{FuncRef, TestIRAdaptor, ValueRef};
pub use check::{run_pipeline, CheckDirective, PipelineOptions, RunDirective, TestRunner, TestSpec};

/// Name of the marker intrinsic carrying local annotations.
pub const ANNOTATION_MARKER: &str = "llvm.var.annotation";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TestIR {
    pub functions: Vec<Function>,
    pub values: Vec<Value>,
    /// Global variables in definition order.
    pub globals: Vec<u32>,
    /// Module annotation table: (global or function value, annotation).
    pub annotations: Vec<(u32, String)>,
    pub metadata: HashMap<u32, AttachedMetadata>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    /// The function as a value.
    pub value: u32,
    pub ret_ty: IrType,
    pub args: Vec<u32>,
    /// Named constants of the body.
    pub constants: Vec<u32>,
    pub blocks: Vec<Block>,
    pub declaration: bool,
    pub internal: bool,
    pub starting_point: bool,
    pub cloned_from: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub name: String,
    pub insts: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueClass {
    Global,
    Function,
    Argument,
    Instruction,
    Constant,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    /// Empty for unnamed instructions and literal constants.
    pub name: String,
    pub ty: IrType,
    pub class: ValueClass,
    pub op: Operation,
    /// Value operands; for calls the arguments followed by the callee.
    pub operands: Vec<u32>,
    /// Block names: phi incoming blocks (parallel to `operands`) or branch
    /// targets.
    pub targets: Vec<String>,
    pub constant: Option<Constant>,
    /// Owning function of arguments, instructions and constants.
    pub func: Option<u32>,
    /// Users in creation order.
    pub users: Vec<u32>,
    pub erased: bool,
}

impl Value {
    pub fn new(name: &str, ty: IrType, class: ValueClass) -> Self {
        Self {
            name: name.to_string(),
            ty,
            class,
            op: Operation::None,
            operands: Vec::new(),
            targets: Vec::new(),
            constant: None,
            func: None,
            users: Vec::new(),
            erased: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    None,
    Alloca,
    Load,
    Store,
    FAdd,
    FSub,
    FMul,
    FDiv,
    Add,
    Sub,
    Mul,
    FCmp,
    ICmp,
    SIToFP,
    FPToSI,
    FPExt,
    FPTrunc,
    Bitcast,
    Gep,
    Phi,
    Call,
    Ret,
    Br,
    CondBr,
}

impl Operation {
    pub const fn info(self) -> OpInfo {
        use Operation::*;
        match self {
            None => OpInfo { name: "<none>", is_terminator: false, is_binary: false, is_cast: false },
            Alloca => OpInfo { name: "alloca", is_terminator: false, is_binary: false, is_cast: false },
            Load => OpInfo { name: "load", is_terminator: false, is_binary: false, is_cast: false },
            Store => OpInfo { name: "store", is_terminator: false, is_binary: false, is_cast: false },
            FAdd => OpInfo { name: "fadd", is_terminator: false, is_binary: true, is_cast: false },
            FSub => OpInfo { name: "fsub", is_terminator: false, is_binary: true, is_cast: false },
            FMul => OpInfo { name: "fmul", is_terminator: false, is_binary: true, is_cast: false },
            FDiv => OpInfo { name: "fdiv", is_terminator: false, is_binary: true, is_cast: false },
            Add => OpInfo { name: "add", is_terminator: false, is_binary: true, is_cast: false },
            Sub => OpInfo { name: "sub", is_terminator: false, is_binary: true, is_cast: false },
            Mul => OpInfo { name: "mul", is_terminator: false, is_binary: true, is_cast: false },
            FCmp => OpInfo { name: "fcmp", is_terminator: false, is_binary: true, is_cast: false },
            ICmp => OpInfo { name: "icmp", is_terminator: false, is_binary: true, is_cast: false },
            SIToFP => OpInfo { name: "sitofp", is_terminator: false, is_binary: false, is_cast: true },
            FPToSI => OpInfo { name: "fptosi", is_terminator: false, is_binary: false, is_cast: true },
            FPExt => OpInfo { name: "fpext", is_terminator: false, is_binary: false, is_cast: true },
            FPTrunc => OpInfo { name: "fptrunc", is_terminator: false, is_binary: false, is_cast: true },
            Bitcast => OpInfo { name: "bitcast", is_terminator: false, is_binary: false, is_cast: true },
            Gep => OpInfo { name: "gep", is_terminator: false, is_binary: false, is_cast: false },
            Phi => OpInfo { name: "phi", is_terminator: false, is_binary: false, is_cast: false },
            Call => OpInfo { name: "call", is_terminator: false, is_binary: false, is_cast: false },
            Ret => OpInfo { name: "ret", is_terminator: true, is_binary: false, is_cast: false },
            Br => OpInfo { name: "br", is_terminator: true, is_binary: false, is_cast: false },
            CondBr => OpInfo { name: "condbr", is_terminator: true, is_binary: false, is_cast: false },
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        use Operation::*;
        let op = match s {
            "alloca" => Alloca,
            "load" => Load,
            "store" => Store,
            "fadd" => FAdd,
            "fsub" => FSub,
            "fmul" => FMul,
            "fdiv" => FDiv,
            "add" => Add,
            "sub" => Sub,
            "mul" => Mul,
            "fcmp" => FCmp,
            "icmp" => ICmp,
            "sitofp" => SIToFP,
            "fptosi" => FPToSI,
            "fpext" => FPExt,
            "fptrunc" => FPTrunc,
            "bitcast" => Bitcast,
            "gep" => Gep,
            "phi" => Phi,
            "call" => Call,
            "ret" => Ret,
            "br" => Br,
            "condbr" => CondBr,
            _ => return Option::None,
        };
        Some(op)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OpInfo {
    pub name: &'static str,
    pub is_terminator: bool,
    pub is_binary: bool,
    pub is_cast: bool,
}

impl TestIR {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self, String> {
        parser::parse_ir(text)
    }

    pub fn push_value(&mut self, value: Value) -> u32 {
        self.values.push(value);
        (self.values.len() - 1) as u32
    }

    pub fn add_user(&mut self, operand: u32, user: u32) {
        let users = &mut self.values[operand as usize].users;
        if !users.contains(&user) {
            users.push(user);
        }
    }

    fn remove_user(&mut self, operand: u32, user: u32) {
        let still_used = self.values[user as usize]
            .operands
            .iter()
            .any(|&op| op == operand);
        if !still_used {
            self.values[operand as usize].users.retain(|&u| u != user);
        }
    }

    pub fn find_function(&self, name: &str) -> Option<u32> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(|idx| idx as u32)
    }

    pub fn find_global(&self, name: &str) -> Option<u32> {
        self.globals
            .iter()
            .copied()
            .find(|&g| self.values[g as usize].name == name)
    }

    /// Named argument, constant or live instruction of `func`.
    pub fn find_value(&self, func: &str, name: &str) -> Option<u32> {
        let func = &self.functions[self.find_function(func)? as usize];
        func.args
            .iter()
            .chain(&func.constants)
            .chain(func.blocks.iter().flat_map(|b| b.insts.iter()))
            .copied()
            .find(|&v| self.values[v as usize].name == name)
    }

    pub fn metadata_of(&self, val: u32) -> Option<&AttachedMetadata> {
        self.metadata.get(&val)
    }

    /// Rewrite operand `slot` of `user` to `operand`, keeping use lists
    /// consistent.
    pub fn set_operand(&mut self, user: u32, slot: usize, operand: u32) {
        let old = self.values[user as usize].operands[slot];
        self.values[user as usize].operands[slot] = operand;
        self.remove_user(old, user);
        self.add_user(operand, user);
    }

    /// Unlink an instruction from its block and its operands' use lists.
    pub fn erase(&mut self, inst: u32) {
        let value = &mut self.values[inst as usize];
        value.erased = true;
        let operands = std::mem::take(&mut value.operands);
        if let Some(func) = value.func {
            for block in &mut self.functions[func as usize].blocks {
                block.insts.retain(|&i| i != inst);
            }
        }
        for op in operands {
            self.values[op as usize].users.retain(|&u| u != inst);
        }
    }

    /// `hint` if no function is called that yet, otherwise the first free
    /// `hint.N`.
    pub fn unique_function_name(&self, hint: &str) -> String {
        if self.find_function(hint).is_none() {
            return hint.to_string();
        }
        (1..)
            .map(|n| format!("{}.{}", hint, n))
            .find(|name| self.find_function(name).is_none())
            .unwrap_or_else(|| hint.to_string())
    }

    /// Copy the body of `func` into a new function called `name`.
    ///
    /// Arguments and instructions are duplicated and remapped; globals,
    /// constants and functions (the original itself included) are shared.
    /// The copy starts without attached metadata. Returns the new function
    /// and the old-to-new value mapping.
    pub fn clone_function(&mut self, func: u32, name: String) -> (u32, HashMap<u32, u32>) {
        let new_func = self.functions.len() as u32;
        let source = self.functions[func as usize].clone();

        let func_value = self.push_value(Value::new(&name, IrType::Func, ValueClass::Function));
        let mut map = HashMap::new();

        let mut duplicate = |ir: &mut TestIR, old: u32| {
            let mut copy = ir.values[old as usize].clone();
            copy.func = Some(new_func);
            copy.users.clear();
            let new = ir.push_value(copy);
            map.insert(old, new);
            new
        };

        let args: Vec<u32> = source.args.iter().map(|&arg| duplicate(self, arg)).collect();
        let mut new_insts = Vec::new();
        let blocks: Vec<Block> = source
            .blocks
            .iter()
            .map(|block| Block {
                name: block.name.clone(),
                insts: block
                    .insts
                    .iter()
                    .map(|&inst| {
                        let new = duplicate(self, inst);
                        new_insts.push(new);
                        new
                    })
                    .collect(),
            })
            .collect();

        for &inst in &new_insts {
            let operands: Vec<u32> = self.values[inst as usize]
                .operands
                .iter()
                .map(|op| *map.get(op).unwrap_or(op))
                .collect();
            for &op in &operands {
                self.add_user(op, inst);
            }
            self.values[inst as usize].operands = operands;
        }

        self.functions.push(Function {
            name,
            value: func_value,
            ret_ty: source.ret_ty.clone(),
            args,
            constants: source.constants.clone(),
            blocks,
            declaration: false,
            internal: source.internal,
            starting_point: false,
            cloned_from: None,
        });
        (new_func, map)
    }

    /// How an operand is spelled: `%local`, `@global` or a literal.
    pub fn operand_text(&self, val: u32) -> String {
        let value = &self.values[val as usize];
        match (&value.class, &value.constant) {
            (ValueClass::Global | ValueClass::Function, _) => format!("@{}", value.name),
            (ValueClass::Constant, Some(constant)) if value.name.is_empty() => match constant {
                Constant::Int(v) => v.to_string(),
                Constant::Float(v) => format!("{:?}", v),
                Constant::Str(s) => format!("\"{}\"", s),
            },
            _ => format!("%{}", value.name),
        }
    }

    /// Module-unique spelling used in queue dumps: `@g`, `func/%x`.
    pub fn qualified_name(&self, val: u32) -> String {
        let value = &self.values[val as usize];
        match (value.class, value.func) {
            (ValueClass::Argument | ValueClass::Instruction, Some(func)) => {
                let func = &self.functions[func as usize].name;
                if value.name.is_empty() {
                    format!("{}/<{}#{}>", func, value.op.info().name, val)
                } else {
                    format!("{}/%{}", func, value.name)
                }
            }
            _ => self.operand_text(val),
        }
    }

    fn metadata_suffix(&self, val: u32) -> String {
        self.metadata
            .get(&val)
            .map(|md| format!(" ; {}", md))
            .unwrap_or_default()
    }

    fn format_inst(&self, inst: u32) -> String {
        let value = &self.values[inst as usize];
        let ops: Vec<String> = value.operands.iter().map(|&op| self.operand_text(op)).collect();
        let mut text = String::new();
        if !value.name.is_empty() {
            let _ = write!(text, "%{} = ", value.name);
        }
        let info = value.op.info();
        text.push_str(info.name);

        match value.op {
            Operation::Alloca => {
                let allocated = value.ty.pointee().cloned().unwrap_or(IrType::Void);
                let _ = write!(text, " {}", allocated);
            }
            Operation::Phi => {
                let incoming: Vec<String> = ops
                    .iter()
                    .zip(&value.targets)
                    .map(|(op, block)| format!("[^{}, {}]", block, op))
                    .collect();
                let _ = write!(text, " {} {}", value.ty, incoming.join(", "));
            }
            Operation::Call => {
                let (callee, args) = ops.split_last().map_or(("?", &[][..]), |(c, a)| (c.as_str(), a));
                let _ = write!(text, " {}({})", callee, args.join(", "));
                let direct = value
                    .operands
                    .last()
                    .is_some_and(|&c| self.values[c as usize].class == ValueClass::Function);
                if !direct {
                    let _ = write!(text, " -> {}", value.ty);
                }
            }
            Operation::Br => {
                let _ = write!(text, " ^{}", value.targets.first().map_or("?", String::as_str));
            }
            Operation::CondBr => {
                let targets: Vec<String> = value.targets.iter().map(|t| format!("^{}", t)).collect();
                let _ = write!(text, " {}, {}", ops.join(", "), targets.join(", "));
            }
            _ if info.is_cast => {
                let _ = write!(text, " {} to {}", ops.join(", "), value.ty);
            }
            _ => {
                if !ops.is_empty() {
                    let _ = write!(text, " {}", ops.join(", "));
                }
            }
        }
        text
    }

    fn format_constant(&self, val: u32) -> String {
        let value = &self.values[val as usize];
        let literal = match &value.constant {
            Some(Constant::Int(v)) => v.to_string(),
            Some(Constant::Float(v)) => format!("{:?}", v),
            Some(Constant::Str(s)) => format!("\"{}\"", s),
            None => "undef".to_string(),
        };
        format!("%{} = const {} {}", value.name, value.ty, literal)
    }

    fn format_signature(&self, func: &Function) -> String {
        let args: Vec<String> = func
            .args
            .iter()
            .map(|&arg| {
                let arg = &self.values[arg as usize];
                if arg.name.is_empty() {
                    arg.ty.to_string()
                } else {
                    format!("{} %{}", arg.ty, arg.name)
                }
            })
            .collect();
        format!("@{}({}) -> {}", func.name, args.join(", "), func.ret_ty)
    }

    pub fn print(&self) -> String {
        let mut output = String::new();

        for &global in &self.globals {
            let value = &self.values[global as usize];
            let stored = value.ty.pointee().cloned().unwrap_or(IrType::Void);
            let _ = writeln!(
                output,
                "@{} = global {}{}",
                value.name,
                stored,
                self.metadata_suffix(global)
            );
        }
        for (val, text) in &self.annotations {
            let _ = writeln!(output, "annotate {} \"{}\"", self.operand_text(*val), text);
        }

        for func in &self.functions {
            if !output.is_empty() {
                output.push('\n');
            }
            if func.declaration {
                let _ = writeln!(output, "declare {}", self.format_signature(func));
                continue;
            }

            let linkage = if func.internal { "internal " } else { "" };
            let start = if func.starting_point { " starting_point" } else { "" };
            let _ = write!(output, "define {}{}{} {{", linkage, self.format_signature(func), start);
            if let Some(original) = func.cloned_from {
                let _ = write!(output, " ; cloned from @{}", self.functions[original as usize].name);
            }
            output.push('\n');

            for &arg in &func.args {
                if let Some(md) = self.metadata.get(&arg) {
                    let _ = writeln!(output, "  ; arg %{} {}", self.values[arg as usize].name, md);
                }
            }

            for (idx, block) in func.blocks.iter().enumerate() {
                let _ = writeln!(output, "{}:", block.name);
                if idx == 0 {
                    for &constant in &func.constants {
                        let _ = writeln!(output, "  {}", self.format_constant(constant));
                    }
                }
                for &inst in &block.insts {
                    let _ = writeln!(
                        output,
                        "  {}{}",
                        self.format_inst(inst),
                        self.metadata_suffix(inst)
                    );
                }
            }
            output.push_str("}\n");
        }
        output
    }
}

impl std::fmt::Display for TestIR {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.print())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = r#"
@g = global float
annotate @g "range -1 1"

define @scale(float %x) -> float {
entry:
  %c = const float 0.5
  %m = fmul %x, %c
  ret %m
}
"#;

    #[test]
    fn test_print_reparses() {
        let ir = TestIR::parse(SIMPLE).unwrap();
        let printed = ir.print();
        assert!(printed.contains("@g = global float"));
        assert!(printed.contains("annotate @g \"range -1 1\""));
        assert!(printed.contains("%m = fmul %x, %c"));

        let reparsed = TestIR::parse(&printed).unwrap();
        assert_eq!(reparsed.print(), printed);
    }

    #[test]
    fn test_clone_function_remaps_body() {
        let mut ir = TestIR::parse(SIMPLE).unwrap();
        let scale = ir.find_function("scale").unwrap();
        let name = ir.unique_function_name("scale");
        assert_eq!(name, "scale.1");

        let (clone, map) = ir.clone_function(scale, "scale_fixp".to_string());
        let old_m = ir.find_value("scale", "m").unwrap();
        let new_m = ir.find_value("scale_fixp", "m").unwrap();
        assert_eq!(map[&old_m], new_m);
        assert_ne!(old_m, new_m);

        let new_x = ir.functions[clone as usize].args[0];
        assert_eq!(ir.values[new_m as usize].operands[0], new_x);
        assert_eq!(ir.values[new_m as usize].func, Some(clone));

        // The constant is shared between both bodies.
        let c = ir.find_value("scale", "c").unwrap();
        assert_eq!(ir.values[new_m as usize].operands[1], c);
        assert_eq!(ir.values[c as usize].users.len(), 2);
    }

    #[test]
    fn test_erase_unlinks_uses() {
        let mut ir = TestIR::parse(SIMPLE).unwrap();
        let m = ir.find_value("scale", "m").unwrap();
        let x = ir.find_value("scale", "x").unwrap();
        let ret = ir.functions[ir.find_function("scale").unwrap() as usize].blocks[0].insts[1];
        ir.erase(ret);
        assert!(ir.values[m as usize].users.is_empty());
        assert_eq!(ir.values[x as usize].users, vec![m]);
        assert!(ir.find_value("scale", "m").is_some());
    }
}
