//! The assembly encoder: statements to the numeric memory image.
//!
//! Pass one walks the statements to build the environment: every label
//! (statement labels and `@`-tagged operand cells) is bound to its cell
//! offset, and every `.define` is bound as a substitution macro. Pass two
//! resolves the names in each statement against the environment and emits
//! the cells.

use std::collections::BTreeMap;

use log::{debug, trace};

use super::ast::*;
use super::Error;

impl Instruction {
    /// The number of cells this instruction occupies in the encoded image.
    pub fn size(&self) -> i64 {
        match self {
            Instruction::Literal(_) => 1,
            Instruction::Add(_)
            | Instruction::Mul(_)
            | Instruction::LessThan(_)
            | Instruction::Equals(_) => 4,
            Instruction::JumpIfTrue(_) | Instruction::JumpIfFalse(_) => 3,
            Instruction::Input(_)
            | Instruction::Output(_)
            | Instruction::AdjustRelativeBase(_) => 2,
            Instruction::Halt => 1,
        }
    }
}

fn input_mode(i: &InputParam) -> i64 {
    match i.value {
        InputValue::Address(_) => 0,
        InputValue::Immediate(_) => 1,
        InputValue::Relative(_) => 2,
    }
}

fn output_mode(o: &OutputParam) -> i64 {
    match o.value {
        OutputValue::Address(_) => 0,
        OutputValue::Relative(_) => 2,
    }
}

/// The mode digits of an instruction, in operand order, as a base-10 number.
fn modes(i: &Instruction) -> i64 {
    match i {
        Instruction::Literal(_) | Instruction::Halt => 0,
        Instruction::Add(c)
        | Instruction::Mul(c)
        | Instruction::LessThan(c)
        | Instruction::Equals(c) => input_mode(&c.a) + 10 * input_mode(&c.b) + 100 * output_mode(&c.out),
        Instruction::JumpIfTrue(j) | Instruction::JumpIfFalse(j) => {
            input_mode(&j.condition) + 10 * input_mode(&j.target)
        }
        Instruction::Input(o) => output_mode(o),
        Instruction::Output(x) => input_mode(x),
        Instruction::AdjustRelativeBase(a) => input_mode(a),
    }
}

/// The head cell of an instruction: `opcode + 100 * modes`.
fn opcode(i: &Instruction) -> i64 {
    let code = match i {
        Instruction::Literal(x) => return *x,
        Instruction::Add(_) => 1,
        Instruction::Mul(_) => 2,
        Instruction::Input(_) => 3,
        Instruction::Output(_) => 4,
        Instruction::JumpIfTrue(_) => 5,
        Instruction::JumpIfFalse(_) => 6,
        Instruction::LessThan(_) => 7,
        Instruction::Equals(_) => 8,
        Instruction::AdjustRelativeBase(_) => 9,
        Instruction::Halt => 99,
    };
    100 * modes(i) + code
}

fn immediate_value(i: &Immediate) -> Result<i64, Error> {
    match i {
        Immediate::Literal(x) => Ok(*x),
        Immediate::Name(n) => Err(Error::UnresolvedName(n.clone())),
    }
}

fn input_value(i: &InputParam) -> Result<i64, Error> {
    match &i.value {
        InputValue::Address(x) | InputValue::Immediate(x) | InputValue::Relative(x) => {
            immediate_value(x)
        }
    }
}

fn output_value(o: &OutputParam) -> Result<i64, Error> {
    match &o.value {
        OutputValue::Address(x) | OutputValue::Relative(x) => immediate_value(x),
    }
}

fn emit(buffer: &mut Vec<i64>, i: &Instruction) -> Result<(), Error> {
    buffer.push(opcode(i));
    match i {
        Instruction::Literal(_) | Instruction::Halt => {}
        Instruction::Add(c)
        | Instruction::Mul(c)
        | Instruction::LessThan(c)
        | Instruction::Equals(c) => {
            buffer.push(input_value(&c.a)?);
            buffer.push(input_value(&c.b)?);
            buffer.push(output_value(&c.out)?);
        }
        Instruction::JumpIfTrue(j) | Instruction::JumpIfFalse(j) => {
            buffer.push(input_value(&j.condition)?);
            buffer.push(input_value(&j.target)?);
        }
        Instruction::Input(o) => buffer.push(output_value(o)?),
        Instruction::Output(x) => buffer.push(input_value(x)?),
        Instruction::AdjustRelativeBase(a) => buffer.push(input_value(a)?),
    }
    Ok(())
}

/// Call `visit(label, operand_index)` for every labelled operand of an
/// instruction, with operand indices starting at 1.
fn visit_operand_labels(i: &Instruction, mut visit: impl FnMut(&str, i64)) {
    let mut param = |label: &Option<String>, index: i64| {
        if let Some(label) = label {
            visit(label, index);
        }
    };
    match i {
        Instruction::Literal(_) | Instruction::Halt => {}
        Instruction::Add(c)
        | Instruction::Mul(c)
        | Instruction::LessThan(c)
        | Instruction::Equals(c) => {
            param(&c.a.label, 1);
            param(&c.b.label, 2);
            param(&c.out.label, 3);
        }
        Instruction::JumpIfTrue(j) | Instruction::JumpIfFalse(j) => {
            param(&j.condition.label, 1);
            param(&j.target.label, 2);
        }
        Instruction::Input(o) => param(&o.label, 1),
        Instruction::Output(x) => param(&x.label, 1),
        Instruction::AdjustRelativeBase(a) => param(&a.label, 1),
    }
}

/// The name bindings collected by pass one.
#[derive(Default)]
struct Environment {
    constants: BTreeMap<String, i64>,
    macros: BTreeMap<String, InputParam>,
}

fn bind<V>(map: &mut BTreeMap<String, V>, name: &str, value: V) -> Result<(), Error> {
    if map.insert(name.to_string(), value).is_some() {
        return Err(Error::DuplicateDefinition(name.to_string()));
    }
    Ok(())
}

impl Environment {
    fn new(input: &[Statement]) -> Result<Self, Error> {
        let mut environment = Environment::default();
        let mut offset: i64 = 0;
        let mut error = None;
        for statement in input {
            match statement {
                Statement::Label(name) => {
                    trace!("label {} -> {}", name, offset);
                    bind(&mut environment.constants, name, offset)?;
                }
                Statement::Instruction(i) => {
                    visit_operand_labels(i, |label, index| {
                        trace!("operand label {} -> {}", label, offset + index);
                        if let Err(e) = bind(&mut environment.constants, label, offset + index) {
                            error.get_or_insert(e);
                        }
                    });
                    offset += i.size();
                }
                Statement::Directive(Directive::Define { name, value }) => {
                    bind(&mut environment.macros, name, value.clone())?;
                }
                Statement::Directive(Directive::Integer(_)) => offset += 1,
                Statement::Directive(Directive::Ascii(value)) => {
                    offset += value.len() as i64 + 1;
                }
            }
            if let Some(e) = error.take() {
                return Err(e);
            }
        }
        Ok(environment)
    }

    fn resolve_immediate(&self, x: &mut Immediate) -> Result<(), Error> {
        if let Immediate::Name(n) = x {
            match self.constants.get(n.as_str()) {
                Some(value) => *x = Immediate::Literal(*value),
                None => return Err(Error::UnresolvedName(n.clone())),
            }
        }
        Ok(())
    }

    /// Resolve an input operand. A bare name that is not a label may be a
    /// macro, in which case the define's entire operand is substituted.
    fn resolve_input(&self, i: &mut InputParam) -> Result<(), Error> {
        if let InputValue::Immediate(Immediate::Name(n)) = &i.value {
            if !self.constants.contains_key(n.as_str()) {
                if let Some(substitute) = self.macros.get(n.as_str()) {
                    i.value = substitute.value.clone();
                }
            }
        }
        match &mut i.value {
            InputValue::Address(x) | InputValue::Immediate(x) | InputValue::Relative(x) => {
                self.resolve_immediate(x)
            }
        }
    }

    fn resolve_output(&self, o: &mut OutputParam) -> Result<(), Error> {
        match &mut o.value {
            OutputValue::Address(x) | OutputValue::Relative(x) => self.resolve_immediate(x),
        }
    }

    fn resolve_instruction(&self, i: &mut Instruction) -> Result<(), Error> {
        match i {
            Instruction::Literal(_) | Instruction::Halt => Ok(()),
            Instruction::Add(c)
            | Instruction::Mul(c)
            | Instruction::LessThan(c)
            | Instruction::Equals(c) => {
                self.resolve_input(&mut c.a)?;
                self.resolve_input(&mut c.b)?;
                self.resolve_output(&mut c.out)
            }
            Instruction::JumpIfTrue(j) | Instruction::JumpIfFalse(j) => {
                self.resolve_input(&mut j.condition)?;
                self.resolve_input(&mut j.target)
            }
            Instruction::Input(o) => self.resolve_output(o),
            Instruction::Output(x) => self.resolve_input(x),
            Instruction::AdjustRelativeBase(a) => self.resolve_input(a),
        }
    }
}

/// Flatten a statement list into the numeric memory image.
pub fn encode(input: &[Statement]) -> Result<Vec<i64>, Error> {
    let environment = Environment::new(input)?;
    let mut output = Vec::new();
    for statement in input {
        match statement {
            Statement::Label(_) => {}
            Statement::Instruction(i) => {
                let mut resolved = i.clone();
                environment.resolve_instruction(&mut resolved)?;
                emit(&mut output, &resolved)?;
            }
            Statement::Directive(Directive::Define { .. }) => {}
            Statement::Directive(Directive::Integer(x)) => {
                let mut resolved = x.clone();
                environment.resolve_immediate(&mut resolved)?;
                output.push(immediate_value(&resolved)?);
            }
            Statement::Directive(Directive::Ascii(value)) => {
                output.extend(value.bytes().map(i64::from));
                output.push(0);
            }
        }
    }
    debug!("encoded {} statements into {} cells", input.len(), output.len());
    Ok(output)
}
