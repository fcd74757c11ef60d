//! TIR (Test IR) parser implementation.
//!
//! Parsing runs in two phases. The first reads type definitions, globals,
//! annotations and function headers and skips over bodies, so a body may call
//! any function of the module. The second phase parses each body. Within a
//! body values must be defined before use, except phi incoming values which
//! are resolved once the whole body is read.

use super::*;
use std::collections::HashMap;

pub fn parse_ir(text: &str) -> Result<TestIR, String> {
    let parser = Parser::new(text);
    parser.parse()
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
    ir: TestIR,

    // Global maps
    types: HashMap<&'a str, IrType>,
    funcs: HashMap<&'a str, u32>,
    globals: HashMap<&'a str, u32>,
    bodies: Vec<(u32, usize)>,
    annotations: Vec<(&'a str, String)>,
    arg_names: HashMap<u32, &'a str>,

    // Per-function maps
    values: HashMap<&'a str, u32>,
    phi_resolves: Vec<Resolve<'a>>,
}

#[derive(Debug)]
struct Resolve<'a> {
    name: &'a str,
    value: u32,
    slot: usize,
}

const UNRESOLVED: u32 = !0;

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            ir: TestIR::new(),
            types: HashMap::new(),
            funcs: HashMap::new(),
            globals: HashMap::new(),
            bodies: Vec::new(),
            annotations: Vec::new(),
            arg_names: HashMap::new(),
            values: HashMap::new(),
            phi_resolves: Vec::new(),
        }
    }

    fn parse(mut self) -> Result<TestIR, String> {
        self.skip_whitespace(true);
        while !self.is_eof() {
            if let Err(e) = self.parse_top_level() {
                return Err(self.located(e));
            }
            self.skip_whitespace(true);
        }

        self.resolve_annotations()?;

        for (func, pos) in std::mem::take(&mut self.bodies) {
            self.pos = pos;
            if let Err(e) = self.parse_body(func) {
                return Err(self.located(e));
            }
        }

        Ok(self.ir)
    }

    /// Prefix an error with the current line and column.
    fn located(&self, msg: String) -> String {
        let consumed = &self.text[..self.pos.min(self.text.len())];
        let line = consumed.matches('\n').count() + 1;
        let column = consumed.len() - consumed.rfind('\n').map_or(0, |idx| idx + 1) + 1;
        format!("line {}, column {}: {}", line, column, msg)
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn current_char(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.pos += ch.len_utf8();
        }
    }

    fn skip_whitespace(&mut self, skip_newlines: bool) {
        while let Some(ch) = self.current_char() {
            if ch == ';' {
                // Skip comment line
                while let Some(ch) = self.current_char() {
                    if ch == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else if ch.is_whitespace() {
                if ch == '\n' && !skip_newlines {
                    break;
                }
                self.advance();
            } else {
                break;
            }
        }
    }

    fn try_read(&mut self, ch: char) -> bool {
        self.skip_whitespace(true);
        if self.current_char() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> Result<(), String> {
        if !self.try_read(ch) {
            return Err(format!(
                "Expected '{}' but found {:?}",
                ch,
                self.current_char()
            ));
        }
        Ok(())
    }

    fn try_read_arrow(&mut self) -> bool {
        self.skip_whitespace(true);
        if self.text[self.pos..].starts_with("->") {
            self.pos += 2;
            true
        } else {
            false
        }
    }

    fn read_identifier(&mut self) -> Result<&'a str, String> {
        self.skip_whitespace(true);
        let start = self.pos;

        match self.current_char() {
            Some(ch) if ch.is_alphabetic() => {}
            Some(ch) => return Err(format!("Expected identifier but found '{}'", ch)),
            None => return Err("Expected identifier but found EOF".to_string()),
        }

        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' || ch == '.' {
                self.advance();
            } else {
                break;
            }
        }
        Ok(&self.text[start..self.pos])
    }

    /// A name following a `%`, `@` or `^` sigil.
    fn read_name(&mut self) -> Result<&'a str, String> {
        let start = self.pos;
        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' || ch == '.' {
                self.advance();
            } else {
                break;
            }
        }
        if start == self.pos {
            return Err(format!("Expected name but found {:?}", self.current_char()));
        }
        Ok(&self.text[start..self.pos])
    }

    fn read_sigil_name(&mut self, sigil: char) -> Result<&'a str, String> {
        self.expect(sigil)?;
        self.read_name()
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), String> {
        let found = self.read_identifier()?;
        if found != keyword {
            return Err(format!("Expected '{}' but found '{}'", keyword, found));
        }
        Ok(())
    }

    fn try_keyword(&mut self, keyword: &str) -> bool {
        let saved = self.pos;
        match self.read_identifier() {
            Ok(found) if found == keyword => true,
            _ => {
                self.pos = saved;
                false
            }
        }
    }

    fn read_number(&mut self) -> Result<u64, String> {
        self.skip_whitespace(true);
        let start = self.pos;
        while self.current_char().is_some_and(|ch| ch.is_ascii_digit()) {
            self.advance();
        }
        if start == self.pos {
            return Err("Expected number".to_string());
        }
        self.text[start..self.pos]
            .parse()
            .map_err(|e| format!("Failed to parse number: {}", e))
    }

    /// Raw text of a numeric literal.
    fn read_literal(&mut self) -> Result<&'a str, String> {
        self.skip_whitespace(true);
        let start = self.pos;
        while let Some(ch) = self.current_char() {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '+') {
                self.advance();
            } else {
                break;
            }
        }
        if start == self.pos {
            return Err(format!("Expected literal but found {:?}", self.current_char()));
        }
        Ok(&self.text[start..self.pos])
    }

    fn read_string(&mut self) -> Result<String, String> {
        self.expect('"')?;
        let start = self.pos;
        while let Some(ch) = self.current_char() {
            if ch == '"' {
                let text = self.text[start..self.pos].to_string();
                self.advance();
                return Ok(text);
            }
            self.advance();
        }
        Err("Unterminated string literal".to_string())
    }

    fn parse_type(&mut self) -> Result<IrType, String> {
        self.skip_whitespace(true);
        let mut ty = match self.current_char() {
            Some('{') => {
                self.advance();
                let mut fields = Vec::new();
                if !self.try_read('}') {
                    loop {
                        fields.push(self.parse_type()?);
                        if !self.try_read(',') {
                            self.expect('}')?;
                            break;
                        }
                    }
                }
                IrType::Struct(fields)
            }
            Some('[') => {
                self.advance();
                let len = self.read_number()?;
                self.expect_keyword("x")?;
                let elem = self.parse_type()?;
                self.expect(']')?;
                IrType::Array(len, Box::new(elem))
            }
            Some('%') => {
                let name = self.read_sigil_name('%')?;
                self.types
                    .get(name)
                    .cloned()
                    .ok_or_else(|| format!("Unknown type '%{}'", name))?
            }
            _ => {
                let name = self.read_identifier()?;
                match name {
                    "void" => IrType::Void,
                    "half" => IrType::Half,
                    "float" => IrType::Float,
                    "double" => IrType::Double,
                    "label" => IrType::Label,
                    _ => match name.strip_prefix('i').and_then(|bits| bits.parse().ok()) {
                        Some(bits) => IrType::Int(bits),
                        None => return Err(format!("Unknown type '{}'", name)),
                    },
                }
            }
        };

        loop {
            self.skip_whitespace(false);
            if self.current_char() != Some('*') {
                break;
            }
            self.advance();
            ty = IrType::ptr_to(ty);
        }
        Ok(ty)
    }

    fn parse_top_level(&mut self) -> Result<(), String> {
        if self.current_char() == Some('@') {
            let name = self.read_sigil_name('@')?;
            self.expect('=')?;
            self.expect_keyword("global")?;
            let stored = self.parse_type()?;
            if self.globals.contains_key(name) {
                return Err(format!("Duplicate global '@{}'", name));
            }
            let idx = self
                .ir
                .push_value(Value::new(name, IrType::ptr_to(stored), ValueClass::Global));
            self.globals.insert(name, idx);
            self.ir.globals.push(idx);
            return Ok(());
        }

        match self.read_identifier()? {
            "type" => {
                let name = self.read_sigil_name('%')?;
                self.expect('=')?;
                let ty = self.parse_type()?;
                self.types.insert(name, ty);
                Ok(())
            }
            "annotate" => {
                let name = self.read_sigil_name('@')?;
                let text = self.read_string()?;
                self.annotations.push((name, text));
                Ok(())
            }
            "declare" => self.parse_function_header(true),
            "define" => self.parse_function_header(false),
            other => Err(format!("Unexpected top-level item '{}'", other)),
        }
    }

    fn parse_function_header(&mut self, declaration: bool) -> Result<(), String> {
        let internal = !declaration && self.try_keyword("internal");
        let name = self.read_sigil_name('@')?;
        if self.funcs.contains_key(name) {
            return Err(format!("Duplicate function definition: '{}'", name));
        }

        let func_idx = self.ir.functions.len() as u32;
        let value = self
            .ir
            .push_value(Value::new(name, IrType::Func, ValueClass::Function));

        self.expect('(')?;
        let mut args = Vec::new();
        if !self.try_read(')') {
            loop {
                let ty = self.parse_type()?;
                self.skip_whitespace(true);
                let arg_name = if self.current_char() == Some('%') {
                    self.read_sigil_name('%')?
                } else {
                    ""
                };
                let mut arg = Value::new(arg_name, ty, ValueClass::Argument);
                arg.func = Some(func_idx);
                let arg = self.ir.push_value(arg);
                if !arg_name.is_empty() {
                    self.arg_names.insert(arg, arg_name);
                }
                args.push(arg);

                if !self.try_read(',') {
                    self.expect(')')?;
                    break;
                }
            }
        }

        let ret_ty = if self.try_read_arrow() {
            self.parse_type()?
        } else {
            IrType::Void
        };
        let starting_point = !declaration && self.try_keyword("starting_point");

        if !declaration {
            self.expect('{')?;
            self.bodies.push((func_idx, self.pos));
            self.skip_body()?;
        }

        self.funcs.insert(name, func_idx);
        self.ir.functions.push(Function {
            name: name.to_string(),
            value,
            ret_ty,
            args,
            constants: Vec::new(),
            blocks: Vec::new(),
            declaration,
            internal,
            starting_point,
            cloned_from: None,
        });
        Ok(())
    }

    /// Move past the closing brace of a body; the opening one is consumed.
    fn skip_body(&mut self) -> Result<(), String> {
        let mut depth = 1;
        while let Some(ch) = self.current_char() {
            match ch {
                ';' => {
                    self.skip_whitespace(false);
                    continue;
                }
                '"' => {
                    self.read_string()?;
                    continue;
                }
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        self.advance();
                        return Ok(());
                    }
                }
                _ => {}
            }
            self.advance();
        }
        Err("Unterminated function body".to_string())
    }

    fn resolve_annotations(&mut self) -> Result<(), String> {
        for (name, text) in std::mem::take(&mut self.annotations) {
            let target = match (self.globals.get(name), self.funcs.get(name)) {
                (Some(&global), _) => global,
                (None, Some(&func)) => self.ir.functions[func as usize].value,
                (None, None) => return Err(format!("Annotation on unknown symbol '@{}'", name)),
            };
            self.ir.annotations.push((target, text));
        }
        Ok(())
    }

    fn parse_body(&mut self, func: u32) -> Result<(), String> {
        self.values.clear();
        self.phi_resolves.clear();
        for &arg in &self.ir.functions[func as usize].args {
            if let Some(&name) = self.arg_names.get(&arg) {
                self.values.insert(name, arg);
            }
        }

        loop {
            self.skip_whitespace(true);
            if self.try_read('}') {
                break;
            }
            if self.is_eof() {
                return Err("Unterminated function body".to_string());
            }

            let block_name = self.read_name()?;
            self.expect(':')?;
            self.ir.functions[func as usize].blocks.push(Block {
                name: block_name.to_string(),
                insts: Vec::new(),
            });

            while !self.is_at_block_end() {
                self.parse_instruction(func)?;
            }
        }

        self.resolve_phis()
    }

    fn is_at_block_end(&mut self) -> bool {
        self.skip_whitespace(true);
        if self.is_eof() || self.current_char() == Some('}') {
            return true;
        }

        // A label is a name directly followed by ':'.
        let saved = self.pos;
        let is_label = self.read_name().is_ok() && self.current_char() == Some(':');
        self.pos = saved;
        is_label
    }

    fn lookup_local(&self, name: &str) -> Result<u32, String> {
        self.values
            .get(name)
            .copied()
            .ok_or_else(|| format!("Undefined value '%{}'", name))
    }

    fn push_constant(&mut self, func: u32, name: &str, ty: IrType, constant: Constant) -> u32 {
        let mut value = Value::new(name, ty, ValueClass::Constant);
        value.constant = Some(constant);
        value.func = Some(func);
        self.ir.push_value(value)
    }

    fn parse_operand(&mut self, func: u32) -> Result<u32, String> {
        self.skip_whitespace(true);
        match self.current_char() {
            Some('%') => {
                let name = self.read_sigil_name('%')?;
                self.lookup_local(name)
            }
            Some('@') => {
                let name = self.read_sigil_name('@')?;
                if let Some(&global) = self.globals.get(name) {
                    return Ok(global);
                }
                self.funcs
                    .get(name)
                    .map(|&f| self.ir.functions[f as usize].value)
                    .ok_or_else(|| format!("Undefined symbol '@{}'", name))
            }
            Some('"') => {
                let text = self.read_string()?;
                Ok(self.push_constant(
                    func,
                    "",
                    IrType::ptr_to(IrType::Int(8)),
                    Constant::Str(text),
                ))
            }
            Some(ch) if ch.is_ascii_digit() || ch == '-' => {
                let literal = self.read_literal()?;
                if let Ok(v) = literal.parse::<i64>() {
                    return Ok(self.push_constant(func, "", IrType::Int(32), Constant::Int(v)));
                }
                let v = literal
                    .parse::<f64>()
                    .map_err(|_| format!("Invalid literal '{}'", literal))?;
                Ok(self.push_constant(func, "", IrType::Double, Constant::Float(v)))
            }
            other => Err(format!("Expected operand but found {:?}", other)),
        }
    }

    fn operand_type(&self, val: u32) -> IrType {
        self.ir.values[val as usize].ty.clone()
    }

    fn parse_instruction(&mut self, func: u32) -> Result<(), String> {
        self.skip_whitespace(true);
        let name = if self.current_char() == Some('%') {
            let name = self.read_sigil_name('%')?;
            self.expect('=')?;
            Some(name)
        } else {
            None
        };

        let op_name = self.read_identifier()?;
        if op_name == "const" {
            let name = name.ok_or("Constants must be named")?;
            let ty = self.parse_type()?;
            let literal = self.read_literal()?;
            let constant = if ty.is_floating_point() {
                Constant::Float(
                    literal
                        .parse()
                        .map_err(|_| format!("Invalid float literal '{}'", literal))?,
                )
            } else {
                Constant::Int(
                    literal
                        .parse()
                        .map_err(|_| format!("Invalid integer literal '{}'", literal))?,
                )
            };
            let idx = self.push_constant(func, name, ty, constant);
            self.ir.functions[func as usize].constants.push(idx);
            return self.define(name, idx);
        }

        let op = Operation::from_str(op_name)
            .ok_or_else(|| format!("Unknown instruction '{}'", op_name))?;
        let mut targets = Vec::new();
        let mut pending_phis = Vec::new();

        let (ty, operands) = match op {
            Operation::Alloca => (IrType::ptr_to(self.parse_type()?), Vec::new()),
            Operation::Load => {
                let ptr = self.parse_operand(func)?;
                let ty = self
                    .operand_type(ptr)
                    .pointee()
                    .cloned()
                    .ok_or("load from a non-pointer value")?;
                (ty, vec![ptr])
            }
            Operation::Store => {
                let val = self.parse_operand(func)?;
                self.expect(',')?;
                let ptr = self.parse_operand(func)?;
                (IrType::Void, vec![val, ptr])
            }
            Operation::FCmp | Operation::ICmp => {
                let lhs = self.parse_operand(func)?;
                self.expect(',')?;
                let rhs = self.parse_operand(func)?;
                (IrType::Int(1), vec![lhs, rhs])
            }
            _ if op.info().is_binary => {
                let lhs = self.parse_operand(func)?;
                self.expect(',')?;
                let rhs = self.parse_operand(func)?;
                (self.operand_type(lhs), vec![lhs, rhs])
            }
            _ if op.info().is_cast => {
                let src = self.parse_operand(func)?;
                self.expect_keyword("to")?;
                (self.parse_type()?, vec![src])
            }
            Operation::Gep => {
                let mut operands = vec![self.parse_operand(func)?];
                while self.try_read(',') {
                    operands.push(self.parse_operand(func)?);
                }
                (self.gep_result_type(&operands)?, operands)
            }
            Operation::Phi => {
                let ty = self.parse_type()?;
                let mut operands = Vec::new();
                loop {
                    self.expect('[')?;
                    let block = self.read_sigil_name('^')?;
                    self.expect(',')?;
                    self.skip_whitespace(true);
                    if self.current_char() == Some('%') {
                        let incoming = self.read_sigil_name('%')?;
                        pending_phis.push((incoming, operands.len()));
                        operands.push(UNRESOLVED);
                    } else {
                        operands.push(self.parse_operand(func)?);
                    }
                    self.expect(']')?;
                    targets.push(block.to_string());
                    if !self.try_read(',') {
                        break;
                    }
                }
                (ty, operands)
            }
            Operation::Call => {
                let callee = self.parse_operand(func)?;
                let mut operands = Vec::new();
                self.expect('(')?;
                if !self.try_read(')') {
                    loop {
                        operands.push(self.parse_operand(func)?);
                        if !self.try_read(',') {
                            self.expect(')')?;
                            break;
                        }
                    }
                }

                let callee_fn = self.ir.functions.iter().find(|f| f.value == callee);
                let ty = match callee_fn {
                    Some(f) => f.ret_ty.clone(),
                    None => {
                        if !self.try_read_arrow() {
                            return Err("Indirect call needs a '-> type' result".to_string());
                        }
                        self.parse_type()?
                    }
                };
                operands.push(callee);
                (ty, operands)
            }
            Operation::Ret => {
                self.skip_whitespace(false);
                let has_value = matches!(self.current_char(), Some(ch) if ch == '%' || ch == '@' || ch == '-' || ch.is_ascii_digit());
                let operands = if has_value {
                    vec![self.parse_operand(func)?]
                } else {
                    Vec::new()
                };
                (IrType::Void, operands)
            }
            Operation::Br => {
                targets.push(self.read_sigil_name('^')?.to_string());
                (IrType::Void, Vec::new())
            }
            Operation::CondBr => {
                let cond = self.parse_operand(func)?;
                self.expect(',')?;
                targets.push(self.read_sigil_name('^')?.to_string());
                self.expect(',')?;
                targets.push(self.read_sigil_name('^')?.to_string());
                (IrType::Void, vec![cond])
            }
            _ => return Err(format!("Unsupported instruction '{}'", op_name)),
        };

        let mut value = Value::new(name.unwrap_or(""), ty, ValueClass::Instruction);
        value.op = op;
        value.operands = operands.clone();
        value.targets = targets;
        value.func = Some(func);
        let idx = self.ir.push_value(value);
        for (name, slot) in pending_phis {
            self.phi_resolves.push(Resolve {
                name,
                value: idx,
                slot,
            });
        }

        for op in operands.into_iter().filter(|&op| op != UNRESOLVED) {
            self.ir.add_user(op, idx);
        }
        if let Some(block) = self.ir.functions[func as usize].blocks.last_mut() {
            block.insts.push(idx);
        }

        match name {
            Some(name) => self.define(name, idx),
            None => Ok(()),
        }
    }

    fn define(&mut self, name: &'a str, idx: u32) -> Result<(), String> {
        if self.values.insert(name, idx).is_some() {
            return Err(format!("Redefinition of '%{}'", name));
        }
        Ok(())
    }

    fn gep_result_type(&self, operands: &[u32]) -> Result<IrType, String> {
        let base = self.operand_type(operands[0]);
        let mut ty = base
            .pointee()
            .cloned()
            .ok_or_else(|| format!("gep base must be a pointer, found {}", base))?;

        for &idx in operands.iter().skip(2) {
            ty = match ty {
                IrType::Struct(fields) => {
                    let field = match self.ir.values[idx as usize].constant {
                        Some(Constant::Int(v)) => v as usize,
                        _ => return Err("struct field index must be an integer literal".to_string()),
                    };
                    fields
                        .into_iter()
                        .nth(field)
                        .ok_or_else(|| format!("struct field index {} out of range", field))?
                }
                IrType::Array(_, elem) => *elem,
                other => return Err(format!("cannot index into {}", other)),
            };
        }
        Ok(IrType::ptr_to(ty))
    }

    fn resolve_phis(&mut self) -> Result<(), String> {
        for resolve in std::mem::take(&mut self.phi_resolves) {
            let incoming = self.lookup_local(resolve.name)?;
            self.ir.values[resolve.value as usize].operands[resolve.slot] = incoming;
            self.ir.add_user(incoming, resolve.value);
        }
        Ok(())
    }
}
