//! The code generator: lowers the [`crate::ast::Node`] contract to a linked
//! [`Program`].
//!
//! Every expression leaves its value in `ACC`. Control flow is emitted with
//! symbolic labels first and resolved to PC-relative displacements in a
//! single final linking pass (see [`CodeGen::link`]) — the generator never
//! back-patches an instruction it has already pushed.

use std::collections::{HashMap, HashSet};

use crate::ast::{BinOp, Node};
use crate::binary::{encode_instruction, Program};
use crate::error::{Error, Result};
use crate::isa::Mnemonic;

/// Words reserved for a `read_line` target's character buffer, not counting
/// its two-word header (self-pointer, length).
const READ_LINE_CAP: u32 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VarKind {
    Number,
    /// A string variable's block base address (the address its own slot's
    /// value — the "handle" — holds).
    Str(u32),
    /// An array variable's element count. The variable's own address *is*
    /// the array's base; there is no separate handle indirection, unlike
    /// strings.
    Array(u32),
}

#[derive(Debug, Clone, Copy)]
struct VarInfo {
    addr: u32,
    kind: VarKind,
}

#[derive(Debug, Clone)]
struct FuncInfo {
    entry_label: String,
    param_addrs: Vec<u32>,
}

#[derive(Debug, Clone)]
enum Operand {
    None,
    /// An absolute data address or an immediate, known at emit time.
    Value(i32),
    /// A branch target or block label, resolved by [`CodeGen::link`].
    Label(String),
}

#[derive(Debug, Clone)]
enum Emitted {
    Instr(Mnemonic, Operand),
    Label(String),
}

/// Lowers a parsed program into a fully linked [`Program`].
///
/// # Errors
/// Returns [`Error::UndefinedVar`] for a reference to an undeclared name,
/// [`Error::ArityMismatch`] for a `funcall` whose argument count disagrees
/// with its `defunc`, or [`Error::OverflowAddr`] if a computed displacement
/// or data address overflows the 27-bit signed argument field.
pub fn compile(nodes: &[Node]) -> Result<Program> {
    let mut cg = CodeGen::new();
    cg.collect_functions(nodes)?;

    cg.emit(Mnemonic::Jmp, Operand::Label("main".into()));

    for node in nodes {
        if let Node::Defunc { name, params, body } = node {
            cg.compile_function(name, params, body)?;
        }
    }

    cg.emit_label("main");
    let main_stmts: Vec<&Node> =
        nodes.iter().filter(|n| !matches!(n, Node::Defunc { .. })).collect();
    cg.current_read_line_targets = collect_read_line_targets(main_stmts.iter().copied());
    for stmt in main_stmts {
        cg.compile_stmt(stmt)?;
    }
    cg.emit(Mnemonic::Halt, Operand::None);

    let instructions = cg.link()?;
    Ok(Program { instructions, data: cg.data_writes })
}

fn collect_read_line_targets<'a, I>(stmts: I) -> HashSet<String>
where
    I: IntoIterator<Item = &'a Node>,
{
    let mut out = HashSet::new();
    for stmt in stmts {
        collect_read_line_targets_into(stmt, &mut out);
    }
    out
}

fn collect_read_line_targets_into(node: &Node, out: &mut HashSet<String>) {
    match node {
        Node::ReadLine(name) => {
            out.insert(name.clone());
        }
        Node::If { then, r#else, .. } => {
            then.iter().for_each(|s| collect_read_line_targets_into(s, out));
            if let Some(else_body) = r#else {
                else_body.iter().for_each(|s| collect_read_line_targets_into(s, out));
            }
        }
        Node::While { body, .. } => {
            body.iter().for_each(|s| collect_read_line_targets_into(s, out));
        }
        _ => {}
    }
}

fn try_fold(node: &Node) -> Option<i64> {
    match node {
        Node::Number(n) => Some(*n),
        Node::BinOp { op, left, right } => {
            let l = try_fold(left)?;
            let r = try_fold(right)?;
            Some(match op {
                BinOp::Add => l.wrapping_add(r),
                BinOp::Sub => l.wrapping_sub(r),
                BinOp::Mul => l.wrapping_mul(r),
                BinOp::Div => if r == 0 { 0 } else { l / r },
                BinOp::Eq | BinOp::Lt | BinOp::Gt | BinOp::Ne => return None,
            })
        }
        _ => None,
    }
}

struct CodeGen {
    next_addr: u32,
    scopes: Vec<HashMap<String, VarInfo>>,
    const_map: HashMap<i64, u32>,
    funcs: HashMap<String, FuncInfo>,
    current_read_line_targets: HashSet<String>,
    data_writes: Vec<(u32, i32)>,
    code: Vec<Emitted>,
    label_cnt: u32,
}

impl CodeGen {
    fn new() -> Self {
        Self {
            next_addr: 0,
            scopes: vec![HashMap::new()],
            const_map: HashMap::new(),
            funcs: HashMap::new(),
            current_read_line_targets: HashSet::new(),
            data_writes: Vec::new(),
            code: Vec::new(),
            label_cnt: 0,
        }
    }

    fn alloc(&mut self, words: u32) -> u32 {
        let addr = self.next_addr;
        self.next_addr += words;
        addr
    }

    fn fresh_temp(&mut self) -> u32 {
        self.alloc(1)
    }

    fn const_addr(&mut self, value: i64) -> u32 {
        if let Some(&addr) = self.const_map.get(&value) {
            return addr;
        }
        let addr = self.alloc(1);
        self.const_map.insert(value, addr);
        self.data_writes.push((addr, value as i32));
        addr
    }

    fn label(&mut self, prefix: &str) -> String {
        self.label_cnt += 1;
        format!("{prefix}{}", self.label_cnt)
    }

    fn emit(&mut self, mnemonic: Mnemonic, operand: Operand) {
        self.code.push(Emitted::Instr(mnemonic, operand));
    }

    fn emit_label(&mut self, name: &str) {
        self.code.push(Emitted::Label(name.to_string()));
    }

    fn declare(&mut self, name: &str, addr: u32, kind: VarKind) {
        self.scopes.last_mut().expect("global scope always present").insert(name.to_string(), VarInfo { addr, kind });
    }

    fn lookup(&self, name: &str) -> Result<VarInfo> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
            .ok_or_else(|| Error::UndefinedVar(name.to_string()))
    }

    fn collect_functions(&mut self, nodes: &[Node]) -> Result<()> {
        for node in nodes {
            if let Node::Defunc { name, params, .. } = node {
                let param_addrs: Vec<u32> = params.iter().map(|_| self.alloc(1)).collect();
                self.funcs.insert(
                    name.clone(),
                    FuncInfo { entry_label: format!("fn_{name}"), param_addrs },
                );
            }
        }
        Ok(())
    }

    fn compile_function(&mut self, name: &str, params: &[String], body: &[Node]) -> Result<()> {
        let info = self.funcs.get(name).cloned().expect("registered by collect_functions");
        self.emit_label(&info.entry_label);
        self.scopes.push(HashMap::new());
        for (param, &addr) in params.iter().zip(&info.param_addrs) {
            self.declare(param, addr, VarKind::Number);
        }
        self.current_read_line_targets = collect_read_line_targets(body);
        for stmt in body {
            self.compile_stmt(stmt)?;
        }
        self.emit(Mnemonic::Ret, Operand::None);
        self.scopes.pop();
        Ok(())
    }

    fn compile_stmt(&mut self, node: &Node) -> Result<()> {
        match node {
            Node::Var { name, expr, size } => self.compile_var_decl(name, expr.as_deref(), *size),
            Node::Set { name, expr } => {
                self.compile_expr(expr)?;
                let info = self.lookup(name)?;
                self.emit(Mnemonic::Store, Operand::Value(info.addr as i32));
                Ok(())
            }
            Node::SetGet { array, index, expr } => self.compile_set_get(array, index, expr),
            Node::If { cond, then, r#else } => self.compile_if(cond, then, r#else.as_deref()),
            Node::While { cond, body } => self.compile_while(cond, body),
            Node::Funcall { name, args } => self.compile_funcall(name, args),
            Node::PrintString(inner) => self.compile_print_string(inner),
            Node::ReadLine(name) => self.compile_read_line(name),
            Node::Defunc { .. } => Ok(()),
            other => self.compile_expr(other),
        }
    }

    fn compile_var_decl(&mut self, name: &str, expr: Option<&Node>, size: Option<usize>) -> Result<()> {
        if let Some(size) = size {
            let count = size as u32;
            let base = self.alloc(count + 1);
            self.data_writes.push((base + count, size as i32));
            self.declare(name, base, VarKind::Array(count));
            return Ok(());
        }

        if self.current_read_line_targets.contains(name) {
            let block_base = self.alloc(2 + READ_LINE_CAP);
            let chars_base = block_base + 2;
            self.data_writes.push((block_base, chars_base as i32));
            let addr = self.alloc(1);
            self.data_writes.push((addr, block_base as i32));
            self.declare(name, addr, VarKind::Str(block_base));
            return Ok(());
        }

        match expr {
            None => {
                let addr = self.alloc(1);
                self.declare(name, addr, VarKind::Number);
            }
            Some(Node::Str(s)) => {
                let block_base = self.intern_string(s);
                let addr = self.alloc(1);
                self.data_writes.push((addr, block_base as i32));
                self.declare(name, addr, VarKind::Str(block_base));
            }
            Some(e) => {
                let addr = self.alloc(1);
                self.declare(name, addr, VarKind::Number);
                if let Some(folded) = try_fold(e) {
                    if folded != 0 {
                        self.data_writes.push((addr, folded as i32));
                    }
                } else {
                    self.compile_expr(e)?;
                    self.emit(Mnemonic::Store, Operand::Value(addr as i32));
                }
            }
        }
        Ok(())
    }

    fn intern_string(&mut self, s: &str) -> u32 {
        let len = s.chars().count() as u32;
        let block_base = self.alloc(2 + len);
        let chars_base = block_base + 2;
        self.data_writes.push((block_base, chars_base as i32));
        self.data_writes.push((block_base + 1, len as i32));
        for (i, ch) in s.chars().enumerate() {
            self.data_writes.push((chars_base + i as u32, ch as i32));
        }
        block_base
    }

    fn compile_expr(&mut self, node: &Node) -> Result<()> {
        match node {
            Node::Number(n) => {
                let addr = self.const_addr(*n);
                self.emit(Mnemonic::Load, Operand::Value(addr as i32));
                Ok(())
            }
            Node::Var { name, expr: None, size: None } => {
                let info = self.lookup(name)?;
                self.emit(Mnemonic::Load, Operand::Value(info.addr as i32));
                Ok(())
            }
            Node::BinOp { op, left, right } => self.compile_binop(*op, left, right),
            Node::Get { array, index } => self.compile_get(array, index),
            other => Err(Error::UnknownNode(format!("{other:?} cannot be used as an expression"))),
        }
    }

    fn compile_binop(&mut self, op: BinOp, left: &Node, right: &Node) -> Result<()> {
        self.compile_expr(left)?;
        let tmp_a = self.fresh_temp();
        self.emit(Mnemonic::Store, Operand::Value(tmp_a as i32));
        self.compile_expr(right)?;
        let tmp_b = self.fresh_temp();
        self.emit(Mnemonic::Store, Operand::Value(tmp_b as i32));
        self.emit(Mnemonic::Load, Operand::Value(tmp_a as i32));

        match op {
            BinOp::Add => self.emit(Mnemonic::Add, Operand::Value(tmp_b as i32)),
            BinOp::Sub => self.emit(Mnemonic::Sub, Operand::Value(tmp_b as i32)),
            BinOp::Mul => self.emit(Mnemonic::Mul, Operand::Value(tmp_b as i32)),
            BinOp::Div => self.emit(Mnemonic::Div, Operand::Value(tmp_b as i32)),
            BinOp::Eq | BinOp::Lt | BinOp::Gt | BinOp::Ne => {
                self.emit(Mnemonic::Sub, Operand::Value(tmp_b as i32));
                let jump_mnemonic = match op {
                    BinOp::Eq => Mnemonic::Jz,
                    BinOp::Ne => Mnemonic::Jnz,
                    BinOp::Lt => Mnemonic::Jlt,
                    BinOp::Gt => Mnemonic::Jgt,
                    BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => unreachable!(),
                };
                let l_true = self.label("T");
                let l_end = self.label("E");
                self.emit(jump_mnemonic, Operand::Label(l_true.clone()));
                let zero = self.const_addr(0);
                self.emit(Mnemonic::Load, Operand::Value(zero as i32));
                self.emit(Mnemonic::Jmp, Operand::Label(l_end.clone()));
                self.emit_label(&l_true);
                let one = self.const_addr(1);
                self.emit(Mnemonic::Load, Operand::Value(one as i32));
                self.emit_label(&l_end);
            }
        }
        Ok(())
    }

    fn compile_if(&mut self, cond: &Node, then: &[Node], r#else: Option<&[Node]>) -> Result<()> {
        self.compile_expr(cond)?;
        let l_else = self.label("ELSE");
        let l_end = self.label("END");
        self.emit(Mnemonic::Jz, Operand::Label(l_else.clone()));
        for stmt in then {
            self.compile_stmt(stmt)?;
        }
        self.emit(Mnemonic::Jmp, Operand::Label(l_end.clone()));
        self.emit_label(&l_else);
        if let Some(body) = r#else {
            for stmt in body {
                self.compile_stmt(stmt)?;
            }
        }
        self.emit_label(&l_end);
        Ok(())
    }

    fn compile_while(&mut self, cond: &Node, body: &[Node]) -> Result<()> {
        let l_start = self.label("W0");
        let l_end = self.label("W1");
        self.emit_label(&l_start);
        self.compile_expr(cond)?;
        self.emit(Mnemonic::Jz, Operand::Label(l_end.clone()));
        for stmt in body {
            self.compile_stmt(stmt)?;
        }
        self.emit(Mnemonic::Jmp, Operand::Label(l_start.clone()));
        self.emit_label(&l_end);
        Ok(())
    }

    fn compile_get(&mut self, array: &str, index: &Node) -> Result<()> {
        let info = self.lookup(array)?;
        let VarKind::Array(_) = info.kind else {
            return Err(Error::UndefinedVar(format!("{array} is not an array")));
        };
        self.compile_expr(index)?;
        let base_const = self.const_addr(i64::from(info.addr));
        self.emit(Mnemonic::Add, Operand::Value(base_const as i32));
        let addr_tmp = self.fresh_temp();
        self.emit(Mnemonic::Store, Operand::Value(addr_tmp as i32));
        self.emit(Mnemonic::LoadAddr, Operand::Value(addr_tmp as i32));
        Ok(())
    }

    fn compile_set_get(&mut self, array: &str, index: &Node, expr: &Node) -> Result<()> {
        let info = self.lookup(array)?;
        let VarKind::Array(_) = info.kind else {
            return Err(Error::UndefinedVar(format!("{array} is not an array")));
        };
        self.compile_expr(expr)?;
        let val_tmp = self.fresh_temp();
        self.emit(Mnemonic::Store, Operand::Value(val_tmp as i32));
        self.compile_expr(index)?;
        let base_const = self.const_addr(i64::from(info.addr));
        self.emit(Mnemonic::Add, Operand::Value(base_const as i32));
        let addr_tmp = self.fresh_temp();
        self.emit(Mnemonic::Store, Operand::Value(addr_tmp as i32));
        self.emit(Mnemonic::Load, Operand::Value(val_tmp as i32));
        self.emit(Mnemonic::StoreAddr, Operand::Value(addr_tmp as i32));
        Ok(())
    }

    fn compile_funcall(&mut self, name: &str, args: &[Node]) -> Result<()> {
        let info = self
            .funcs
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UndefinedVar(name.to_string()))?;
        if args.len() != info.param_addrs.len() {
            return Err(Error::ArityMismatch {
                name: name.to_string(),
                expected: info.param_addrs.len(),
                got: args.len(),
            });
        }
        for (arg, &addr) in args.iter().zip(&info.param_addrs) {
            self.compile_expr(arg)?;
            self.emit(Mnemonic::Store, Operand::Value(addr as i32));
        }
        self.emit(Mnemonic::Call, Operand::Label(info.entry_label));
        Ok(())
    }

    fn compile_read_line(&mut self, name: &str) -> Result<()> {
        let info = self.lookup(name)?;
        let VarKind::Str(block_base) = info.kind else {
            return Err(Error::UndefinedVar(format!("{name} was not reserved for read_line")));
        };
        let chars_base = block_base + 2;
        let ptr_addr = self.alloc(1);
        self.data_writes.push((ptr_addr, chars_base as i32));
        let count_addr = self.alloc(1);
        let char_addr = self.alloc(1);

        let start = self.label("RL");
        let end = self.label("RLE");
        let one = self.const_addr(1);
        let newline = self.const_addr(i64::from(b'\n'));

        self.emit_label(&start);
        self.emit(Mnemonic::In, Operand::None);
        self.emit(Mnemonic::Store, Operand::Value(char_addr as i32));
        self.emit(Mnemonic::Load, Operand::Value(char_addr as i32));
        self.emit(Mnemonic::Sub, Operand::Value(newline as i32));
        self.emit(Mnemonic::Jz, Operand::Label(end.clone()));

        self.emit(Mnemonic::Load, Operand::Value(char_addr as i32));
        self.emit(Mnemonic::StoreAddr, Operand::Value(ptr_addr as i32));
        self.emit(Mnemonic::Load, Operand::Value(ptr_addr as i32));
        self.emit(Mnemonic::Add, Operand::Value(one as i32));
        self.emit(Mnemonic::Store, Operand::Value(ptr_addr as i32));
        self.emit(Mnemonic::Load, Operand::Value(count_addr as i32));
        self.emit(Mnemonic::Add, Operand::Value(one as i32));
        self.emit(Mnemonic::Store, Operand::Value(count_addr as i32));
        self.emit(Mnemonic::Jmp, Operand::Label(start));

        self.emit_label(&end);
        self.emit(Mnemonic::Load, Operand::Value(count_addr as i32));
        self.emit(Mnemonic::Store, Operand::Value((block_base + 1) as i32));
        Ok(())
    }

    fn compile_print_string(&mut self, inner: &Node) -> Result<()> {
        match inner {
            Node::Str(s) => {
                for ch in s.chars() {
                    let addr = self.const_addr(i64::from(u32::from(ch)));
                    self.emit(Mnemonic::Load, Operand::Value(addr as i32));
                    self.emit(Mnemonic::Out, Operand::None);
                }
                Ok(())
            }
            Node::Var { name, expr: None, size: None } => {
                let info = self.lookup(name)?;
                match info.kind {
                    VarKind::Str(block_base) => self.emit_print_str_loop(block_base),
                    VarKind::Number | VarKind::Array(_) => {
                        self.emit(Mnemonic::Load, Operand::Value(info.addr as i32));
                        self.emit(Mnemonic::Out, Operand::None);
                        Ok(())
                    }
                }
            }
            other => {
                self.compile_expr(other)?;
                self.emit(Mnemonic::Out, Operand::None);
                Ok(())
            }
        }
    }

    fn emit_print_str_loop(&mut self, block_base: u32) -> Result<()> {
        let chars_base = block_base + 2;
        let len_addr = self.fresh_temp();
        let end_addr = self.fresh_temp();
        let ptr_addr = self.fresh_temp();
        self.data_writes.push((ptr_addr, chars_base as i32));

        self.emit(Mnemonic::Load, Operand::Value((block_base + 1) as i32));
        self.emit(Mnemonic::Store, Operand::Value(len_addr as i32));

        let chars_base_const = self.const_addr(i64::from(chars_base));
        self.emit(Mnemonic::Load, Operand::Value(chars_base_const as i32));
        self.emit(Mnemonic::Add, Operand::Value(len_addr as i32));
        self.emit(Mnemonic::Store, Operand::Value(end_addr as i32));

        let start = self.label("PS");
        let end = self.label("PSE");
        self.emit_label(&start);
        self.emit(Mnemonic::Load, Operand::Value(ptr_addr as i32));
        self.emit(Mnemonic::Sub, Operand::Value(end_addr as i32));
        self.emit(Mnemonic::Jz, Operand::Label(end.clone()));
        self.emit(Mnemonic::LoadAddr, Operand::Value(ptr_addr as i32));
        self.emit(Mnemonic::Out, Operand::None);
        let one = self.const_addr(1);
        self.emit(Mnemonic::Load, Operand::Value(ptr_addr as i32));
        self.emit(Mnemonic::Add, Operand::Value(one as i32));
        self.emit(Mnemonic::Store, Operand::Value(ptr_addr as i32));
        self.emit(Mnemonic::Jmp, Operand::Label(start));
        self.emit_label(&end);
        Ok(())
    }

    /// Resolve every symbolic label to a PC-relative displacement (branch
    /// mnemonics) and emit the final instruction stream.
    ///
    /// The branch-base microprogram (uaddr 42, shared by JMP/CALL and every
    /// conditional jump once its condition is true) computes
    /// `IP := (pc_of_branch_instruction + 1) + ARG`, so the displacement
    /// stored here is `target - (pc + 1)`.
    fn link(&self) -> Result<Vec<u32>> {
        let mut label_pc: HashMap<&str, u32> = HashMap::new();
        let mut pc = 0u32;
        for item in &self.code {
            match item {
                Emitted::Label(name) => {
                    label_pc.insert(name.as_str(), pc);
                }
                Emitted::Instr(..) => pc += 1,
            }
        }

        let mut out = Vec::with_capacity(label_pc.len());
        let mut pc = 0u32;
        for item in &self.code {
            let Emitted::Instr(mnemonic, operand) = item else { continue };
            let arg: i64 = match operand {
                Operand::None => 0,
                Operand::Value(v) => i64::from(*v),
                Operand::Label(name) => {
                    let target = *label_pc
                        .get(name.as_str())
                        .ok_or_else(|| Error::UndefinedVar(format!("unresolved label {name}")))?;
                    i64::from(target) - (i64::from(pc) + 1)
                }
            };
            let arg = i32::try_from(arg).map_err(|_| Error::OverflowAddr(arg))?;
            out.push(encode_instruction(mnemonic.opcode(), arg)?);
            pc += 1;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::decode_instruction;
    use crate::machine::Machine;
    use crate::cpu::Cpu;
    use crate::parser::parse_program;

    fn run_source(source: &str, input: &str) -> Machine {
        let nodes = parse_program(source).unwrap();
        let program = compile(&nodes).unwrap();
        let mut machine = Machine::new();
        machine.instructions = program.instructions;
        for (addr, value) in program.data {
            machine.data.write(addr, value as u32);
        }
        machine.io.load_input(input);
        Cpu::new().run(&mut machine, None::<&mut crate::trace::TraceSink<Vec<u8>>>).unwrap();
        machine
    }

    #[test]
    fn hello_world_prints_its_literal() {
        let m = run_source(r#"(print_string "Hi")"#, "");
        assert_eq!(m.io.output(), b"Hi");
    }

    #[test]
    fn echo_char_round_trips_one_line_of_input() {
        let m = run_source("(var x 0)(read_line x)(print_string x)", "ab\n");
        assert_eq!(m.io.output(), b"ab");
    }

    #[test]
    fn add_const_fold_prints_the_folded_sum_as_a_single_char() {
        let m = run_source(r#"(var a (+ 2 3))(print_string a)"#, "");
        assert_eq!(m.io.output(), [5u8]);
    }

    #[test]
    fn while_loop_counts_up_to_three() {
        let nodes = parse_program("(var i 0)(while (< i 3) ((set i (+ i 1))))").unwrap();
        let program = compile(&nodes).unwrap();
        let mut machine = Machine::new();
        machine.instructions = program.instructions;
        for (addr, value) in &program.data {
            machine.data.write(*addr, *value as u32);
        }
        Cpu::new().run(&mut machine, None::<&mut crate::trace::TraceSink<Vec<u8>>>).unwrap();
        // `i`'s slot is the only named variable declared, so it is the first
        // allocated address (0).
        assert_eq!(machine.data.read(0), 3);
    }

    #[test]
    fn function_call_mutates_its_parameter_slot() {
        let m = run_source("(defunc f (x) ((set x (+ x 1)))) (funcall f (41))", "");
        // The parameter slot for `x` is the very first address allocated
        // (functions are scanned before any other code), so it sits at 0.
        assert_eq!(m.data.read(0), 42);
    }

    #[test]
    fn funcall_with_wrong_arity_is_an_error() {
        let nodes = parse_program("(defunc f (x) ((set x (+ x 1)))) (funcall f (1 2))").unwrap();
        assert!(matches!(compile(&nodes), Err(Error::ArityMismatch { .. })));
    }

    #[test]
    fn reference_to_an_undeclared_variable_is_an_error() {
        let nodes = parse_program("(set missing 1)").unwrap();
        assert!(matches!(compile(&nodes), Err(Error::UndefinedVar(_))));
    }

    #[test]
    fn array_get_and_set_get_round_trip_through_an_element() {
        let m = run_source("(var a [4])(set (get a 2) 7)(var b (get a 2))(print_string b)", "");
        assert_eq!(m.io.output(), [7u8]);
    }

    #[test]
    fn every_emitted_instruction_decodes_to_a_known_mnemonic() {
        let nodes = parse_program(
            "(defunc f (x) ((set x (+ x 1)))) (var i 0)(while (< i 3) ((set i (+ i 1)))) (funcall f (1))",
        )
        .unwrap();
        let program = compile(&nodes).unwrap();
        for word in program.instructions {
            let (opcode, _) = decode_instruction(word);
            assert!(Mnemonic::from_opcode(opcode).is_some());
        }
    }
}
