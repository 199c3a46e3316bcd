//! The code generator: module ASTs down to assembly statements.
//!
//! Output is built in two streams. `text` holds code, together with the
//! per-function cells the calling convention needs (argument cells and the
//! output-address and return-address cells sit immediately before each
//! function's entry point). `data` holds static storage: global variables,
//! interned strings, and the spill frames that back function locals. The
//! streams are concatenated at the end, followed by the synthetic
//! `heapstart` label marking the first unused cell.
//!
//! Expression lowering threads values through labelled operand cells: an
//! instruction that produces a value writes it directly into the operand
//! cell of the instruction that consumes it, via a label attached to that
//! cell. Every expression value therefore has exactly one consumer.
//!
//! Calls use static frames. A call stores the arguments, the output
//! address and the return address into the cells before the callee's entry
//! point (addressed off the relative base, which is temporarily moved
//! there), then jumps. Frames are per-function, not per-activation, so a
//! function that re-enters itself overwrites its caller's frame.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, trace};
use maplit::btreemap;

use super::ast::*;
use super::Error;
use crate::asm::ast as asm;

/// The symbols a module makes visible to its importers.
struct ModuleExports {
    variables: BTreeSet<String>,
    constants: BTreeMap<String, asm::Immediate>,
}

/// State shared across the whole compilation: the label factory, the
/// output streams, and the exports of every module generated so far.
struct Context {
    labels: BTreeMap<String, u32>,
    modules: BTreeMap<String, ModuleExports>,
    text: Vec<asm::Statement>,
    rodata: Vec<asm::Statement>,
    data: Vec<asm::Statement>,
}

impl Context {
    fn new() -> Result<Self, Error> {
        let mut context = Context {
            labels: BTreeMap::new(),
            modules: BTreeMap::new(),
            text: Vec::new(),
            rodata: Vec::new(),
            data: Vec::new(),
        };
        // The synthetic entry point: call main, then halt.
        let root = ModuleScope::default();
        let mut start = FunctionGen::new(&mut context, &root, "_start");
        start
            .frame_mut()
            .constants
            .insert("main".to_string(), asm::Immediate::name("func_main"));
        start.gen_statement(&Statement::Call(Call {
            function: Box::new(Expression::Name("main".to_string())),
            arguments: Vec::new(),
        }))?;
        context.text.push(asm::Instruction::Halt.into());
        Ok(context)
    }

    /// Yield a unique label with the given prefix.
    fn label(&mut self, name: &str) -> String {
        let id = self.labels.entry(name.to_string()).or_insert(0);
        let label = format!("{}{}", name, id);
        *id += 1;
        label
    }

    /// Intern a string literal; its value is the address of the first
    /// character.
    fn make_string(&mut self, value: String) -> asm::Immediate {
        let address = self.label("string");
        self.rodata.push(asm::Statement::Label(address.clone()));
        self.rodata.push(asm::Directive::Ascii(value).into());
        asm::Immediate::Name(address)
    }

    fn gen_module(&mut self, module: &Module) -> Result<(), Error> {
        trace!("generating module {}", module.name);
        let mut scope = ModuleScope::default();
        let directory = module.context();
        for import in &module.imports {
            let path = import.resolve(&directory);
            let dependency = self.modules.get(&path).ok_or_else(|| Error::MissingImport {
                path: path.clone(),
                importer: module.name.clone(),
            })?;
            scope
                .imported_variables
                .extend(dependency.variables.iter().cloned());
            scope.imported_constants.extend(
                dependency
                    .constants
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone())),
            );
        }
        let mut gen = ModuleGen {
            ctx: &mut *self,
            scope,
        };
        for declaration in &module.body {
            gen.gen_declaration(declaration)?;
        }
        let ModuleGen { scope, .. } = gen;
        self.modules.insert(
            module.name.clone(),
            ModuleExports {
                variables: scope.variables,
                constants: scope.constants,
            },
        );
        Ok(())
    }

    fn finish(self) -> Vec<asm::Statement> {
        let mut output = self.text;
        output.extend(self.rodata);
        output.extend(self.data);
        output.push(asm::Statement::Label("heapstart".to_string()));
        output
    }
}

/// The symbol tables of the module being generated.
struct ModuleScope {
    imported_variables: BTreeSet<String>,
    imported_constants: BTreeMap<String, asm::Immediate>,
    variables: BTreeSet<String>,
    constants: BTreeMap<String, asm::Immediate>,
}

impl Default for ModuleScope {
    fn default() -> Self {
        ModuleScope {
            imported_variables: BTreeSet::new(),
            imported_constants: btreemap! {
                "heapstart".to_string() => asm::Immediate::name("heapstart"),
            },
            variables: BTreeSet::new(),
            constants: BTreeMap::new(),
        }
    }
}

impl ModuleScope {
    fn has_global(&self, name: &str) -> bool {
        self.imported_variables.contains(name)
            || self.imported_constants.contains_key(name)
            || self.variables.contains(name)
            || self.constants.contains_key(name)
    }

    fn constant(&self, name: &str) -> Option<&asm::Immediate> {
        self.constants
            .get(name)
            .or_else(|| self.imported_constants.get(name))
    }
}

struct ModuleGen<'a> {
    ctx: &'a mut Context,
    scope: ModuleScope,
}

impl ModuleGen<'_> {
    fn gen_declaration(&mut self, declaration: &Declaration) -> Result<(), Error> {
        match declaration {
            Declaration::Constant { name, value } => {
                if self.scope.has_global(name) {
                    return Err(Error::DuplicateGlobal { name: name.clone() });
                }
                let value = self.eval_expr(value)?;
                self.scope.constants.insert(name.clone(), value);
            }
            Declaration::DeclareScalar { name } => {
                if self.scope.has_global(name) {
                    return Err(Error::DuplicateGlobal { name: name.clone() });
                }
                self.ctx
                    .data
                    .push(asm::Statement::Label(format!("gv_{}", name)));
                self.ctx
                    .data
                    .push(asm::Directive::Integer(asm::Immediate::Literal(0)).into());
                self.scope.variables.insert(name.clone());
            }
            Declaration::DeclareArray { name, size } => {
                if self.scope.has_global(name) {
                    return Err(Error::DuplicateGlobal { name: name.clone() });
                }
                let size = match self.eval_expr(size)? {
                    asm::Immediate::Literal(size) => size,
                    asm::Immediate::Name(_) => {
                        return Err(Error::ArraySizeNotConstant { name: name.clone() })
                    }
                };
                self.ctx
                    .data
                    .push(asm::Statement::Label(format!("gv_{}", name)));
                for _ in 0..size {
                    self.ctx
                        .data
                        .push(asm::Directive::Integer(asm::Immediate::Literal(0)).into());
                }
                self.scope
                    .constants
                    .insert(name.clone(), asm::Immediate::name(format!("gv_{}", name)));
            }
            Declaration::Function(function) => self.gen_function(function)?,
        }
        Ok(())
    }

    fn gen_function(&mut self, function: &FunctionDefinition) -> Result<(), Error> {
        trace!("generating function {}", function.name);
        if self.scope.has_global(&function.name) {
            return Err(Error::DuplicateGlobal {
                name: function.name.clone(),
            });
        }
        // Bound before the body is generated, so calls to the function
        // from its own body link against the static frame.
        self.scope.constants.insert(
            function.name.clone(),
            asm::Immediate::name(format!("func_{}", function.name)),
        );
        for parameter in &function.parameters {
            self.ctx.text.push(asm::Statement::Label(format!(
                "arg_{}_{}",
                function.name, parameter
            )));
            self.ctx
                .text
                .push(asm::Directive::Integer(asm::Immediate::Literal(0)).into());
        }
        self.ctx
            .text
            .push(asm::Statement::Label(format!("func_{}_output", function.name)));
        self.ctx
            .text
            .push(asm::Directive::Integer(asm::Immediate::Literal(0)).into());
        self.ctx
            .text
            .push(asm::Statement::Label(format!("func_{}_return", function.name)));
        self.ctx
            .text
            .push(asm::Directive::Integer(asm::Immediate::Literal(0)).into());
        self.ctx
            .text
            .push(asm::Statement::Label(format!("func_{}", function.name)));
        let mut gen = FunctionGen::new(self.ctx, &self.scope, &function.name);
        gen.arguments
            .extend(function.parameters.iter().cloned());
        gen.gen_statements(&function.body)?;
        gen.gen_statement(&Statement::Return(Expression::integer(0)))?;
        let max_size = gen.max_size;
        for slot in 0..max_size {
            self.ctx
                .data
                .push(asm::Statement::Label(format!("lv_{}_{}", function.name, slot)));
            self.ctx
                .data
                .push(asm::Directive::Integer(asm::Immediate::Literal(0)).into());
        }
        Ok(())
    }

    fn eval_expr(&mut self, e: &Expression) -> Result<asm::Immediate, Error> {
        match e {
            Expression::Literal(Literal::Integer(x)) => Ok(asm::Immediate::Literal(*x)),
            Expression::Literal(Literal::Text(x)) => Ok(self.ctx.make_string(x.clone())),
            Expression::Name(n) => self
                .scope
                .constant(n)
                .cloned()
                .ok_or_else(|| Error::UndefinedConstant { name: n.clone() }),
            Expression::Add(c) => {
                let left = self.eval_expr(&c.left)?;
                let right = self.eval_expr(&c.right)?;
                fold(left, right, e, i64::wrapping_add)
            }
            Expression::Sub(c) => {
                let left = self.eval_expr(&c.left)?;
                let right = self.eval_expr(&c.right)?;
                fold(left, right, e, i64::wrapping_sub)
            }
            Expression::Mul(c) => {
                let left = self.eval_expr(&c.left)?;
                let right = self.eval_expr(&c.right)?;
                fold(left, right, e, i64::wrapping_mul)
            }
            _ => Err(Error::NotConstant {
                expression: e.to_string(),
            }),
        }
    }
}

/// Fold a binary operator over two constant values; anything short of two
/// literals is not a constant expression.
fn fold(
    left: asm::Immediate,
    right: asm::Immediate,
    expression: &Expression,
    op: fn(i64, i64) -> i64,
) -> Result<asm::Immediate, Error> {
    match (left, right) {
        (asm::Immediate::Literal(x), asm::Immediate::Literal(y)) => {
            Ok(asm::Immediate::Literal(op(x, y)))
        }
        _ => Err(Error::NotConstant {
            expression: expression.to_string(),
        }),
    }
}

/// Where a name resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Binding {
    NotFound,
    GlobalConstant,
    GlobalVariable,
    LocalConstant,
    LocalVariable,
    Argument,
}

/// One lexical scope: the slot map for its variables, its constants, and
/// the loop labels visible to `break` and `continue`.
#[derive(Default)]
struct Frame {
    size: i64,
    variables: BTreeMap<String, i64>,
    constants: BTreeMap<String, asm::Immediate>,
    break_label: Option<String>,
    continue_label: Option<String>,
}

struct FunctionGen<'a> {
    ctx: &'a mut Context,
    module: &'a ModuleScope,
    name: String,
    arguments: BTreeSet<String>,
    scope: Vec<Frame>,
    max_size: i64,
}

impl<'a> FunctionGen<'a> {
    fn new(ctx: &'a mut Context, module: &'a ModuleScope, name: &str) -> Self {
        FunctionGen {
            ctx,
            module,
            name: name.to_string(),
            arguments: BTreeSet::new(),
            scope: vec![Frame::default()],
            max_size: 0,
        }
    }

    fn frame(&self) -> &Frame {
        self.scope.last().expect("scope stack is never empty")
    }

    fn frame_mut(&mut self) -> &mut Frame {
        self.scope.last_mut().expect("scope stack is never empty")
    }

    fn emit(&mut self, instruction: asm::Instruction) {
        self.ctx.text.push(instruction.into());
    }

    fn emit_label(&mut self, label: String) {
        self.ctx.text.push(asm::Statement::Label(label));
    }

    fn lookup(&self, name: &str) -> Binding {
        if self.arguments.contains(name) {
            return Binding::Argument;
        }
        for frame in self.scope.iter().rev() {
            if frame.variables.contains_key(name) {
                return Binding::LocalVariable;
            }
            if frame.constants.contains_key(name) {
                return Binding::LocalConstant;
            }
        }
        if self.module.variables.contains(name) || self.module.imported_variables.contains(name) {
            return Binding::GlobalVariable;
        }
        if self.module.constants.contains_key(name)
            || self.module.imported_constants.contains_key(name)
        {
            return Binding::GlobalConstant;
        }
        Binding::NotFound
    }

    /// Duplicates are checked against the innermost scope only; shadowing
    /// a binding from an enclosing scope is allowed.
    fn defined_in_current_scope(&self, name: &str) -> bool {
        let frame = self.frame();
        frame.variables.contains_key(name) || frame.constants.contains_key(name)
    }

    fn get_local(&self, name: &str) -> Option<asm::OutputParam> {
        if self.arguments.contains(name) {
            return Some(asm::OutputParam::address(asm::Immediate::name(format!(
                "arg_{}_{}",
                self.name, name
            ))));
        }
        for frame in self.scope.iter().rev() {
            if let Some(slot) = frame.variables.get(name) {
                return Some(asm::OutputParam::address(asm::Immediate::name(format!(
                    "lv_{}_{}",
                    self.name, slot
                ))));
            }
        }
        None
    }

    fn get_constant(&self, name: &str) -> Option<asm::Immediate> {
        for frame in self.scope.iter().rev() {
            if let Some(value) = frame.constants.get(name) {
                return Some(value.clone());
            }
        }
        self.module.constant(name).cloned()
    }

    fn undefined(&self, name: &str) -> Error {
        Error::Undefined {
            name: name.to_string(),
            function: self.name.clone(),
        }
    }

    fn define_scalar(&mut self, name: &str) {
        let frame = self.frame_mut();
        frame.variables.insert(name.to_string(), frame.size);
        frame.size += 1;
        let size = frame.size;
        self.max_size = self.max_size.max(size);
    }

    fn define_array(&mut self, name: &str, size: i64) {
        let label = format!("lv_{}_{}", self.name, self.frame().size);
        let frame = self.frame_mut();
        frame
            .constants
            .insert(name.to_string(), asm::Immediate::Name(label));
        frame.size += size;
        let total = frame.size;
        self.max_size = self.max_size.max(total);
    }

    fn push_scope(&mut self) {
        let current = self.frame();
        let frame = Frame {
            size: current.size,
            variables: BTreeMap::new(),
            constants: BTreeMap::new(),
            break_label: current.break_label.clone(),
            continue_label: current.continue_label.clone(),
        };
        self.scope.push(frame);
    }

    fn pop_scope(&mut self) {
        self.scope.pop();
    }

    /// The writable location designated by an lvalue expression.
    fn gen_addr(&mut self, e: &Expression) -> Result<asm::OutputParam, Error> {
        match e {
            Expression::Name(n) => self.gen_addr_name(n),
            Expression::Read(address) => self.gen_addr_read(address),
            other => Err(Error::InvalidLvalue {
                expression: other.to_string(),
                function: self.name.clone(),
            }),
        }
    }

    fn gen_addr_name(&self, n: &str) -> Result<asm::OutputParam, Error> {
        match self.lookup(n) {
            Binding::NotFound => Err(self.undefined(n)),
            Binding::GlobalConstant | Binding::LocalConstant => Err(Error::ConstantAsLvalue {
                name: n.to_string(),
                function: self.name.clone(),
            }),
            Binding::GlobalVariable => Ok(asm::OutputParam::address(asm::Immediate::name(
                format!("gv_{}", n),
            ))),
            Binding::Argument | Binding::LocalVariable => {
                self.get_local(n).ok_or_else(|| self.undefined(n))
            }
        }
    }

    /// Lower `*address`: the computed address is patched into the operand
    /// cell of whatever instruction consumes the result.
    fn gen_addr_read(&mut self, address: &Expression) -> Result<asm::OutputParam, Error> {
        let value = self.gen_expr(address)?;
        let label = self.ctx.label("read");
        self.emit(asm::Instruction::Add(asm::Calculation {
            a: asm::InputParam::literal(0),
            b: value,
            out: asm::OutputParam::address(asm::Immediate::Name(label.clone())),
        }));
        Ok(asm::OutputParam::address(asm::Immediate::Literal(0)).tagged(label))
    }

    fn gen_expr(&mut self, e: &Expression) -> Result<asm::InputParam, Error> {
        match e {
            Expression::Literal(Literal::Integer(x)) => Ok(asm::InputParam::literal(*x)),
            Expression::Literal(Literal::Text(x)) => {
                Ok(asm::InputParam::immediate(self.ctx.make_string(x.clone())))
            }
            Expression::Name(n) => self.gen_expr_name(n),
            Expression::Call(c) => self.gen_call(c),
            Expression::Add(c) => self.gen_calculation(c, "add", asm::Instruction::Add),
            Expression::Mul(c) => self.gen_calculation(c, "mul", asm::Instruction::Mul),
            Expression::Sub(c) => {
                let negated = Expression::Mul(Calculation::new(
                    (*c.right).clone(),
                    Expression::integer(-1),
                ));
                let sum = Expression::Add(Calculation::new((*c.left).clone(), negated));
                self.gen_expr(&sum)
            }
            Expression::LessThan(c) => self.gen_calculation(c, "lt", asm::Instruction::LessThan),
            Expression::Equals(c) => self.gen_calculation(c, "eq", asm::Instruction::Equals),
            Expression::LogicalAnd(c) => self.gen_logical_and(c),
            Expression::LogicalOr(c) => self.gen_logical_or(c),
            Expression::Input => {
                let result = self.ctx.label("input");
                self.emit(asm::Instruction::Input(asm::OutputParam::address(
                    asm::Immediate::Name(result.clone()),
                )));
                Ok(asm::InputParam::literal(0).tagged(result))
            }
            Expression::Read(_) => Ok(self.gen_addr(e)?.into()),
        }
    }

    fn gen_expr_name(&mut self, n: &str) -> Result<asm::InputParam, Error> {
        match self.lookup(n) {
            Binding::NotFound => Err(self.undefined(n)),
            Binding::GlobalConstant | Binding::LocalConstant => {
                let value = self.get_constant(n).ok_or_else(|| self.undefined(n))?;
                Ok(asm::InputParam::immediate(value))
            }
            Binding::GlobalVariable => Ok(asm::InputParam::address(asm::Immediate::name(
                format!("gv_{}", n),
            ))),
            Binding::Argument | Binding::LocalVariable => Ok(self
                .get_local(n)
                .ok_or_else(|| self.undefined(n))?
                .into()),
        }
    }

    fn gen_calculation(
        &mut self,
        c: &Calculation,
        prefix: &str,
        build: impl Fn(asm::Calculation) -> asm::Instruction,
    ) -> Result<asm::InputParam, Error> {
        let left = self.gen_expr(&c.left)?;
        let right = self.gen_expr(&c.right)?;
        let result = self.ctx.label(prefix);
        self.emit(build(asm::Calculation {
            a: left,
            b: right,
            out: asm::OutputParam::address(asm::Immediate::Name(result.clone())),
        }));
        Ok(asm::InputParam::literal(0).tagged(result))
    }

    fn gen_call(&mut self, c: &Call) -> Result<asm::InputParam, Error> {
        let zero = asm::InputParam::literal(0);
        let n = c.arguments.len() as i64;
        // The callee address must live in a labelled cell so it can be
        // both read (to locate the frame) and jumped through.
        let callee = self.gen_expr(&c.function)?;
        let (callee, callee_cell) = match callee.label.clone() {
            Some(label) => (callee, label),
            None => {
                let spill = self.ctx.label("callee");
                self.emit(asm::Instruction::Add(asm::Calculation {
                    a: zero.clone(),
                    b: callee,
                    out: asm::OutputParam::address(asm::Immediate::Name(spill.clone())),
                }));
                (asm::InputParam::literal(0).tagged(spill.clone()), spill)
            }
        };
        // Point the relative base at the callee's argument cells.
        let args = self.ctx.label("args");
        self.emit(asm::Instruction::Add(asm::Calculation {
            a: asm::InputParam::address(asm::Immediate::Name(callee_cell)),
            b: asm::InputParam::literal(-(n + 2)),
            out: asm::OutputParam::address(asm::Immediate::Name(args.clone())),
        }));
        self.emit(asm::Instruction::AdjustRelativeBase(
            asm::InputParam::literal(0).tagged(args.clone()),
        ));
        for (i, argument) in c.arguments.iter().enumerate() {
            let value = self.gen_expr(argument)?;
            self.emit(asm::Instruction::Add(asm::Calculation {
                a: zero.clone(),
                b: value,
                out: asm::OutputParam::relative(asm::Immediate::Literal(i as i64)),
            }));
        }
        // The cell the callee writes its result through.
        let output_label = self.ctx.label("return");
        self.emit(asm::Instruction::Add(asm::Calculation {
            a: zero.clone(),
            b: asm::InputParam::immediate(asm::Immediate::Name(output_label.clone())),
            out: asm::OutputParam::relative(asm::Immediate::Literal(n)),
        }));
        // The address the callee jumps back to.
        let return_label = self.ctx.label("call");
        self.emit(asm::Instruction::Add(asm::Calculation {
            a: zero.clone(),
            b: asm::InputParam::immediate(asm::Immediate::Name(return_label.clone())),
            out: asm::OutputParam::relative(asm::Immediate::Literal(n + 1)),
        }));
        // Put the relative base back before entering the callee.
        let args2 = self.ctx.label("revertargs");
        self.emit(asm::Instruction::Mul(asm::Calculation {
            a: asm::InputParam::address(asm::Immediate::Name(args)),
            b: asm::InputParam::literal(-1),
            out: asm::OutputParam::address(asm::Immediate::Name(args2.clone())),
        }));
        self.emit(asm::Instruction::AdjustRelativeBase(
            asm::InputParam::literal(0).tagged(args2),
        ));
        self.emit(asm::Instruction::JumpIfFalse(asm::Jump {
            condition: zero,
            target: callee,
        }));
        self.emit_label(return_label);
        Ok(asm::InputParam::literal(0).tagged(output_label))
    }

    fn gen_logical_and(&mut self, c: &Calculation) -> Result<asm::InputParam, Error> {
        let result = self.ctx.label("and");
        let short_circuit = self.ctx.label("andfalse");
        let end = self.ctx.label("andend");
        let zero = asm::InputParam::literal(0);
        let one = asm::InputParam::literal(1);
        self.emit(asm::Instruction::Add(asm::Calculation {
            a: zero.clone(),
            b: one,
            out: asm::OutputParam::address(asm::Immediate::Name(result.clone())),
        }));
        let left = self.gen_expr(&c.left)?;
        self.emit(asm::Instruction::JumpIfFalse(asm::Jump {
            condition: left,
            target: asm::InputParam::immediate(asm::Immediate::Name(short_circuit.clone())),
        }));
        let right = self.gen_expr(&c.right)?;
        self.emit(asm::Instruction::JumpIfTrue(asm::Jump {
            condition: right,
            target: asm::InputParam::immediate(asm::Immediate::Name(end.clone())),
        }));
        self.emit_label(short_circuit);
        self.emit(asm::Instruction::Add(asm::Calculation {
            a: zero.clone(),
            b: zero,
            out: asm::OutputParam::address(asm::Immediate::Name(result.clone())),
        }));
        self.emit_label(end);
        Ok(asm::InputParam::literal(0).tagged(result))
    }

    fn gen_logical_or(&mut self, c: &Calculation) -> Result<asm::InputParam, Error> {
        let result = self.ctx.label("or");
        let short_circuit = self.ctx.label("ortrue");
        let end = self.ctx.label("orend");
        let zero = asm::InputParam::literal(0);
        let one = asm::InputParam::literal(1);
        self.emit(asm::Instruction::Add(asm::Calculation {
            a: zero.clone(),
            b: zero.clone(),
            out: asm::OutputParam::address(asm::Immediate::Name(result.clone())),
        }));
        let left = self.gen_expr(&c.left)?;
        self.emit(asm::Instruction::JumpIfTrue(asm::Jump {
            condition: left,
            target: asm::InputParam::immediate(asm::Immediate::Name(short_circuit.clone())),
        }));
        let right = self.gen_expr(&c.right)?;
        self.emit(asm::Instruction::JumpIfFalse(asm::Jump {
            condition: right,
            target: asm::InputParam::immediate(asm::Immediate::Name(end.clone())),
        }));
        self.emit_label(short_circuit);
        self.emit(asm::Instruction::Add(asm::Calculation {
            a: zero,
            b: one,
            out: asm::OutputParam::address(asm::Immediate::Name(result.clone())),
        }));
        self.emit_label(end);
        Ok(asm::InputParam::literal(0).tagged(result))
    }

    fn eval_expr(&mut self, e: &Expression) -> Result<asm::Immediate, Error> {
        match e {
            Expression::Literal(Literal::Integer(x)) => Ok(asm::Immediate::Literal(*x)),
            Expression::Literal(Literal::Text(x)) => Ok(self.ctx.make_string(x.clone())),
            Expression::Name(n) => match self.lookup(n) {
                Binding::NotFound => Err(self.undefined(n)),
                Binding::GlobalConstant | Binding::LocalConstant => {
                    self.get_constant(n).ok_or_else(|| self.undefined(n))
                }
                _ => Err(Error::NotConstant {
                    expression: e.to_string(),
                }),
            },
            Expression::Add(c) => {
                let left = self.eval_expr(&c.left)?;
                let right = self.eval_expr(&c.right)?;
                fold(left, right, e, i64::wrapping_add)
            }
            Expression::Sub(c) => {
                let left = self.eval_expr(&c.left)?;
                let right = self.eval_expr(&c.right)?;
                fold(left, right, e, i64::wrapping_sub)
            }
            Expression::Mul(c) => {
                let left = self.eval_expr(&c.left)?;
                let right = self.eval_expr(&c.right)?;
                fold(left, right, e, i64::wrapping_mul)
            }
            _ => Err(Error::NotConstant {
                expression: e.to_string(),
            }),
        }
    }

    fn gen_statement(&mut self, statement: &Statement) -> Result<(), Error> {
        match statement {
            Statement::Constant { name, value } => {
                if self.defined_in_current_scope(name) {
                    return Err(Error::DuplicateLocal {
                        name: name.clone(),
                        function: self.name.clone(),
                    });
                }
                let value = self.eval_expr(value)?;
                self.frame_mut().constants.insert(name.clone(), value);
            }
            Statement::Call(c) => {
                // Sink the unused result into its own operand cell.
                let value = self.gen_call(c)?;
                let ignore = self.ctx.label("ignore");
                self.emit(asm::Instruction::Add(asm::Calculation {
                    a: value,
                    b: asm::InputParam::literal(0).tagged(ignore.clone()),
                    out: asm::OutputParam::address(asm::Immediate::Name(ignore)),
                }));
            }
            Statement::DeclareScalar { name } => {
                if self.defined_in_current_scope(name) {
                    return Err(Error::DuplicateLocal {
                        name: name.clone(),
                        function: self.name.clone(),
                    });
                }
                self.define_scalar(name);
            }
            Statement::DeclareArray { name, size } => {
                if self.defined_in_current_scope(name) {
                    return Err(Error::DuplicateLocal {
                        name: name.clone(),
                        function: self.name.clone(),
                    });
                }
                match self.eval_expr(size)? {
                    asm::Immediate::Literal(size) => self.define_array(name, size),
                    asm::Immediate::Name(_) => {
                        return Err(Error::ArraySizeNotConstant { name: name.clone() })
                    }
                }
            }
            Statement::Assign { left, right } => {
                let value = self.gen_expr(right)?;
                let address = self.gen_addr(left)?;
                self.emit(asm::Instruction::Add(asm::Calculation {
                    a: asm::InputParam::literal(0),
                    b: value,
                    out: address,
                }));
            }
            Statement::AddAssign { left, right } => self.gen_add_assign(left, right)?,
            Statement::If(i) => {
                let condition = self.gen_expr(&i.condition)?;
                let end_if = self.ctx.label("endif");
                let else_label = if i.else_branch.is_empty() {
                    end_if.clone()
                } else {
                    self.ctx.label("else")
                };
                self.emit(asm::Instruction::JumpIfFalse(asm::Jump {
                    condition,
                    target: asm::InputParam::immediate(asm::Immediate::Name(else_label.clone())),
                }));
                self.gen_statements(&i.then_branch)?;
                if !i.else_branch.is_empty() {
                    self.emit(asm::Instruction::JumpIfFalse(asm::Jump {
                        condition: asm::InputParam::literal(0),
                        target: asm::InputParam::immediate(asm::Immediate::Name(end_if.clone())),
                    }));
                    self.emit_label(else_label);
                    self.gen_statements(&i.else_branch)?;
                }
                self.emit_label(end_if);
            }
            Statement::While(w) => {
                self.push_scope();
                let start = self.ctx.label("whilestart");
                let condition_label = self.ctx.label("whilecond");
                let end = self.ctx.label("whileend");
                let frame = self.frame_mut();
                frame.break_label = Some(end.clone());
                frame.continue_label = Some(condition_label.clone());
                self.emit(asm::Instruction::JumpIfFalse(asm::Jump {
                    condition: asm::InputParam::literal(0),
                    target: asm::InputParam::immediate(asm::Immediate::Name(
                        condition_label.clone(),
                    )),
                }));
                self.emit_label(start.clone());
                self.gen_statements(&w.body)?;
                self.emit_label(condition_label);
                let condition = self.gen_expr(&w.condition)?;
                self.emit(asm::Instruction::JumpIfTrue(asm::Jump {
                    condition,
                    target: asm::InputParam::immediate(asm::Immediate::Name(start)),
                }));
                self.emit_label(end);
                self.pop_scope();
            }
            Statement::Output(value) => {
                let value = self.gen_expr(value)?;
                self.emit(asm::Instruction::Output(value));
            }
            Statement::Return(value) => {
                // Copy the caller-supplied output address into the operand
                // cell of the store below, then write the value through it
                // and jump through the return cell.
                let output_label = self.ctx.label("output");
                let zero = asm::InputParam::literal(0);
                self.emit(asm::Instruction::Add(asm::Calculation {
                    a: zero.clone(),
                    b: asm::InputParam::address(asm::Immediate::name(format!(
                        "func_{}_output",
                        self.name
                    ))),
                    out: asm::OutputParam::address(asm::Immediate::Name(output_label.clone())),
                }));
                let value = self.gen_expr(value)?;
                self.emit(asm::Instruction::Add(asm::Calculation {
                    a: zero.clone(),
                    b: value,
                    out: asm::OutputParam::address(asm::Immediate::Literal(0)).tagged(output_label),
                }));
                self.emit(asm::Instruction::JumpIfFalse(asm::Jump {
                    condition: zero,
                    target: asm::InputParam::address(asm::Immediate::name(format!(
                        "func_{}_return",
                        self.name
                    ))),
                }));
            }
            Statement::Break => {
                let target = self
                    .frame()
                    .break_label
                    .clone()
                    .ok_or_else(|| Error::IllegalBreak {
                        function: self.name.clone(),
                    })?;
                self.emit(asm::Instruction::JumpIfFalse(asm::Jump {
                    condition: asm::InputParam::literal(0),
                    target: asm::InputParam::immediate(asm::Immediate::Name(target)),
                }));
            }
            Statement::Continue => {
                let target =
                    self.frame()
                        .continue_label
                        .clone()
                        .ok_or_else(|| Error::IllegalContinue {
                            function: self.name.clone(),
                        })?;
                self.emit(asm::Instruction::JumpIfFalse(asm::Jump {
                    condition: asm::InputParam::literal(0),
                    target: asm::InputParam::immediate(asm::Immediate::Name(target)),
                }));
            }
            Statement::Halt => self.emit(asm::Instruction::Halt),
        }
        Ok(())
    }

    fn gen_add_assign(&mut self, left: &Expression, right: &Expression) -> Result<(), Error> {
        let value = self.gen_expr(right)?;
        match left {
            Expression::Read(address) => {
                // The target address must land in two operand cells of the
                // final add: the read side and the write side.
                let address = self.gen_expr(address)?;
                let read_cell = self.ctx.label("read");
                let write_cell = self.ctx.label("read");
                let zero = asm::InputParam::literal(0);
                self.emit(asm::Instruction::Add(asm::Calculation {
                    a: zero.clone(),
                    b: address,
                    out: asm::OutputParam::address(asm::Immediate::Name(read_cell.clone())),
                }));
                self.emit(asm::Instruction::Add(asm::Calculation {
                    a: zero,
                    b: asm::InputParam::address(asm::Immediate::Name(read_cell.clone())),
                    out: asm::OutputParam::address(asm::Immediate::Name(write_cell.clone())),
                }));
                self.emit(asm::Instruction::Add(asm::Calculation {
                    a: asm::InputParam::address(asm::Immediate::Literal(0)).tagged(read_cell),
                    b: value,
                    out: asm::OutputParam::address(asm::Immediate::Literal(0)).tagged(write_cell),
                }));
            }
            _ => {
                let address = self.gen_addr(left)?;
                self.emit(asm::Instruction::Add(asm::Calculation {
                    a: address.clone().into(),
                    b: value,
                    out: address,
                }));
            }
        }
        Ok(())
    }

    fn gen_statements(&mut self, statements: &[Statement]) -> Result<(), Error> {
        self.push_scope();
        for statement in statements {
            self.gen_statement(statement)?;
        }
        self.pop_scope();
        Ok(())
    }
}

/// Order modules so that every module follows everything it imports. A
/// round that makes no progress means the remaining modules import each
/// other.
fn dependency_order(modules: &BTreeMap<String, Module>) -> Result<Vec<String>, Error> {
    let mut output = Vec::new();
    let mut outstanding: BTreeSet<String> = modules.keys().cloned().collect();
    while !outstanding.is_empty() {
        let ready: Vec<String> = outstanding
            .iter()
            .filter(|name| match modules.get(name.as_str()) {
                Some(module) => {
                    let directory = module.context();
                    module
                        .imports
                        .iter()
                        .all(|import| !outstanding.contains(&import.resolve(&directory)))
                }
                None => false,
            })
            .cloned()
            .collect();
        if ready.is_empty() {
            return Err(Error::ImportCycle(outstanding.into_iter().collect()));
        }
        for name in ready {
            outstanding.remove(&name);
            output.push(name);
        }
    }
    Ok(output)
}

/// Generate assembly for a set of parsed modules, linked in dependency
/// order behind a synthetic entry point that calls `main` and halts.
pub fn generate(modules: &BTreeMap<String, Module>) -> Result<Vec<asm::Statement>, Error> {
    let order = dependency_order(modules)?;
    debug!("module order: {:?}", order);
    let mut context = Context::new()?;
    for name in &order {
        if let Some(module) = modules.get(name) {
            context.gen_module(module)?;
        }
    }
    Ok(context.finish())
}
