//! # Virtual Machine Module
//!
//! This module contains the interpreter for the numeric machine encoding.
//!
//! ### What is this machine?
//!
//! The machine has no registers. Memory is an unbounded vector of signed
//! 64-bit cells, and every instruction operates on cells named by its
//! operands: directly (position mode), by value (immediate mode), or
//! indexed off the relative base (relative mode). Reads from cells that
//! were never written yield zero.
//!
//! ### How does it interact with the world?
//!
//! The machine is a coroutine. [`Program::resume`] runs until the program
//! halts, requests an input value, or produces an output value, then
//! returns the matching [`State`]. The caller answers an input request
//! with [`Program::provide_input`] and collects an output with
//! [`Program::get_output`]; either call completes the suspended
//! instruction. [`Program::run`] wraps the protocol around a [`Device`]
//! for callers that just want the program driven to completion.

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;
use log::debug;

use crate::asm::ast as asm;

mod device;
pub use device::{Device, StandardDevice, TestingDevice};

pub type Value = i64;

/// An error generated while loading or running a program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The cell at `pc` does not hold a valid instruction head.
    IllegalInstruction { value: Value, pc: Value },
    /// An operand produced a negative effective address.
    AddressOutOfRange { address: Value, pc: Value },
    /// The program text was not a comma-separated list of integers.
    MalformedIntcode(String),
    /// The I/O device refused an input or output request.
    Device(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::IllegalInstruction { value, pc } => {
                write!(f, "illegal instruction {} at pc={}", value, pc)
            }
            Error::AddressOutOfRange { address, pc } => {
                write!(f, "address {} out of range at pc={}", address, pc)
            }
            Error::MalformedIntcode(message) => write!(f, "malformed intcode: {}", message),
            Error::Device(message) => write!(f, "device error: {}", message),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Position,
    Immediate,
    Relative,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Opcode {
    Illegal,
    Add,
    Mul,
    Input,
    Output,
    JumpIfTrue,
    JumpIfFalse,
    LessThan,
    Equals,
    AdjustRelativeBase,
    Halt,
}

/// A decoded instruction head: the opcode and one mode per operand slot.
#[derive(Clone, Copy, Debug)]
struct Op {
    code: Opcode,
    modes: [Mode; 3],
}

const ILLEGAL: Op = Op {
    code: Opcode::Illegal,
    modes: [Mode::Position; 3],
};

/// Decode and validate one head value. Unknown opcodes, out-of-range mode
/// digits, excess mode digits, and immediate-mode destinations all come
/// back `Illegal`.
fn parse_op(head: i64) -> Op {
    let code = match head % 100 {
        1 => Opcode::Add,
        2 => Opcode::Mul,
        3 => Opcode::Input,
        4 => Opcode::Output,
        5 => Opcode::JumpIfTrue,
        6 => Opcode::JumpIfFalse,
        7 => Opcode::LessThan,
        8 => Opcode::Equals,
        9 => Opcode::AdjustRelativeBase,
        99 => Opcode::Halt,
        _ => return ILLEGAL,
    };
    let mut modes = [Mode::Position; 3];
    let mut digits = head / 100;
    for slot in &mut modes {
        *slot = match digits % 10 {
            0 => Mode::Position,
            1 => Mode::Immediate,
            2 => Mode::Relative,
            _ => return ILLEGAL,
        };
        digits /= 10;
    }
    if digits != 0 {
        return ILLEGAL;
    }
    let destination = match code {
        Opcode::Add | Opcode::Mul | Opcode::LessThan | Opcode::Equals => Some(modes[2]),
        Opcode::Input => Some(modes[0]),
        _ => None,
    };
    if destination == Some(Mode::Immediate) {
        return ILLEGAL;
    }
    Op { code, modes }
}

lazy_static! {
    /// Every head value a four-digit mode prefix can produce, pre-validated.
    static ref OPS: Vec<Op> = (0..29999i64).map(parse_op).collect();
}

fn decode_op(head: Value) -> Option<Op> {
    if !(0..OPS.len() as Value).contains(&head) {
        return None;
    }
    let op = OPS[head as usize];
    if op.code == Opcode::Illegal {
        None
    } else {
        Some(op)
    }
}

const CHUNK_SIZE: Value = 1024;

/// The sparse memory of a program: fixed-size blocks of cells, indexed by
/// block number. Unwritten cells read as zero.
#[derive(Default)]
struct Memory {
    chunks: HashMap<Value, Box<[Value; CHUNK_SIZE as usize]>>,
}

impl Memory {
    fn get(&self, index: Value) -> Value {
        match self.chunks.get(&index.div_euclid(CHUNK_SIZE)) {
            Some(chunk) => chunk[index.rem_euclid(CHUNK_SIZE) as usize],
            None => 0,
        }
    }

    fn set(&mut self, index: Value, value: Value) {
        let chunk = self
            .chunks
            .entry(index.div_euclid(CHUNK_SIZE))
            .or_insert_with(|| Box::new([0; CHUNK_SIZE as usize]));
        chunk[index.rem_euclid(CHUNK_SIZE) as usize] = value;
    }
}

/// The outcome of [`Program::resume`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// The program can be resumed.
    Ready,
    /// The program is suspended on an input instruction; call
    /// [`Program::provide_input`] before resuming.
    WaitingForInput,
    /// The program is suspended on an output instruction; call
    /// [`Program::get_output`] before resuming.
    Output,
    /// The program has finished.
    Halt,
}

/// A loaded program, plus all of its runtime state.
pub struct Program {
    trace: bool,
    state: State,
    pc: Value,
    input_address: Value,
    output: Value,
    relative_base: Value,
    memory: Memory,
}

impl Program {
    pub fn new(image: &[Value]) -> Self {
        let mut memory = Memory::default();
        for (i, value) in image.iter().enumerate() {
            memory.set(i as Value, *value);
        }
        debug!("loaded program with {} cells", image.len());
        Program {
            trace: false,
            state: State::Ready,
            pc: 0,
            input_address: 0,
            output: 0,
            relative_base: 0,
            memory,
        }
    }

    /// Print each instruction to stderr before executing it.
    pub fn with_trace(mut self) -> Self {
        self.trace = true;
        self
    }

    pub fn done(&self) -> bool {
        self.state == State::Halt
    }

    /// Read one cell, rejecting negative addresses.
    fn read(&self, address: Value) -> Result<Value, Error> {
        if address < 0 {
            return Err(Error::AddressOutOfRange {
                address,
                pc: self.pc,
            });
        }
        Ok(self.memory.get(address))
    }

    fn write(&mut self, address: Value, value: Value) -> Result<(), Error> {
        if address < 0 {
            return Err(Error::AddressOutOfRange {
                address,
                pc: self.pc,
            });
        }
        self.memory.set(address, value);
        Ok(())
    }

    /// Fetch operand `index` of the current instruction.
    fn get(&self, op: &Op, index: usize) -> Result<Value, Error> {
        let x = self.read(self.pc + index as Value + 1)?;
        match op.modes[index] {
            Mode::Position => self.read(x),
            Mode::Immediate => Ok(x),
            Mode::Relative => self.read(self.relative_base + x),
        }
    }

    /// Store into operand `index` of the current instruction.
    fn put(&mut self, op: &Op, index: usize, value: Value) -> Result<(), Error> {
        let x = self.read(self.pc + index as Value + 1)?;
        match op.modes[index] {
            Mode::Position => self.write(x, value),
            // Rejected when the head was decoded.
            Mode::Immediate => unreachable!("immediate-mode destination"),
            Mode::Relative => self.write(self.relative_base + x, value),
        }
    }

    /// Answer a pending input request. Panics unless the program is
    /// suspended waiting for input.
    pub fn provide_input(&mut self, x: Value) {
        assert!(
            self.state == State::WaitingForInput,
            "provide_input() called in state {:?}",
            self.state
        );
        self.state = State::Ready;
        self.memory.set(self.input_address, x);
        self.pc += 2;
    }

    /// Collect a pending output value. Panics unless the program is
    /// suspended on an output instruction.
    pub fn get_output(&mut self) -> Value {
        assert!(
            self.state == State::Output,
            "get_output() called in state {:?}",
            self.state
        );
        self.state = State::Ready;
        self.pc += 2;
        self.output
    }

    /// Run until the program halts or suspends for I/O. Panics if called
    /// while a previous suspension has not been answered.
    pub fn resume(&mut self) -> Result<State, Error> {
        assert!(
            self.state == State::Ready,
            "resume() called in state {:?}",
            self.state
        );
        loop {
            let head = self.read(self.pc)?;
            let op = decode_op(head).ok_or(Error::IllegalInstruction {
                value: head,
                pc: self.pc,
            })?;
            if self.trace {
                eprintln!("{}", self.decode(self.pc));
            }
            match op.code {
                Opcode::Illegal => unreachable!("decode_op returned an illegal op"),
                Opcode::Add => {
                    self.put(&op, 2, self.get(&op, 0)? + self.get(&op, 1)?)?;
                    self.pc += 4;
                }
                Opcode::Mul => {
                    self.put(&op, 2, self.get(&op, 0)? * self.get(&op, 1)?)?;
                    self.pc += 4;
                }
                Opcode::Input => {
                    let address = match op.modes[0] {
                        Mode::Position => self.read(self.pc + 1)?,
                        Mode::Immediate => unreachable!("immediate-mode destination"),
                        Mode::Relative => self.relative_base + self.read(self.pc + 1)?,
                    };
                    if address < 0 {
                        return Err(Error::AddressOutOfRange {
                            address,
                            pc: self.pc,
                        });
                    }
                    self.input_address = address;
                    self.state = State::WaitingForInput;
                    return Ok(self.state);
                }
                Opcode::Output => {
                    self.output = self.get(&op, 0)?;
                    self.state = State::Output;
                    return Ok(self.state);
                }
                Opcode::JumpIfTrue => {
                    self.pc = if self.get(&op, 0)? != 0 {
                        self.get(&op, 1)?
                    } else {
                        self.pc + 3
                    };
                }
                Opcode::JumpIfFalse => {
                    self.pc = if self.get(&op, 0)? != 0 {
                        self.pc + 3
                    } else {
                        self.get(&op, 1)?
                    };
                }
                Opcode::LessThan => {
                    self.put(&op, 2, (self.get(&op, 0)? < self.get(&op, 1)?) as Value)?;
                    self.pc += 4;
                }
                Opcode::Equals => {
                    self.put(&op, 2, (self.get(&op, 0)? == self.get(&op, 1)?) as Value)?;
                    self.pc += 4;
                }
                Opcode::AdjustRelativeBase => {
                    self.relative_base += self.get(&op, 0)?;
                    self.pc += 2;
                }
                Opcode::Halt => {
                    self.state = State::Halt;
                    return Ok(self.state);
                }
            }
        }
    }

    /// Drive the program to completion against a device.
    pub fn run<D: Device>(&mut self, device: &mut D) -> Result<(), Error> {
        while !self.done() {
            match self.resume()? {
                State::Ready => unreachable!("resume() returned Ready"),
                State::WaitingForInput => {
                    let x = device.get().map_err(Error::Device)?;
                    self.provide_input(x);
                }
                State::Output => {
                    let value = self.get_output();
                    device.put(value).map_err(Error::Device)?;
                }
                State::Halt => break,
            }
        }
        Ok(())
    }

    fn decode_input(&self, mode: Mode, argument: Value) -> asm::InputParam {
        match mode {
            Mode::Position => asm::InputParam::address(asm::Immediate::Literal(argument)),
            Mode::Immediate => asm::InputParam::literal(argument),
            Mode::Relative => asm::InputParam::relative(asm::Immediate::Literal(argument)),
        }
    }

    fn decode_output(&self, mode: Mode, argument: Value) -> asm::OutputParam {
        match mode {
            Mode::Position | Mode::Immediate => {
                asm::OutputParam::address(asm::Immediate::Literal(argument))
            }
            Mode::Relative => asm::OutputParam::relative(asm::Immediate::Literal(argument)),
        }
    }

    fn decode_calculation(&self, pc: Value, modes: [Mode; 3]) -> asm::Calculation {
        asm::Calculation {
            a: self.decode_input(modes[0], self.memory.get(pc + 1)),
            b: self.decode_input(modes[1], self.memory.get(pc + 2)),
            out: self.decode_output(modes[2], self.memory.get(pc + 3)),
        }
    }

    fn decode_jump(&self, pc: Value, modes: [Mode; 3]) -> asm::Jump {
        asm::Jump {
            condition: self.decode_input(modes[0], self.memory.get(pc + 1)),
            target: self.decode_input(modes[1], self.memory.get(pc + 2)),
        }
    }

    /// Decode the cell at `pc` back into symbolic assembly. Cells that do
    /// not hold a valid instruction decode as raw literals.
    pub fn decode(&self, pc: Value) -> asm::Instruction {
        let head = self.memory.get(pc);
        let op = match decode_op(head) {
            Some(op) => op,
            None => return asm::Instruction::Literal(head),
        };
        match op.code {
            Opcode::Illegal => asm::Instruction::Literal(head),
            Opcode::Add => asm::Instruction::Add(self.decode_calculation(pc, op.modes)),
            Opcode::Mul => asm::Instruction::Mul(self.decode_calculation(pc, op.modes)),
            Opcode::Input => {
                asm::Instruction::Input(self.decode_output(op.modes[0], self.memory.get(pc + 1)))
            }
            Opcode::Output => {
                asm::Instruction::Output(self.decode_input(op.modes[0], self.memory.get(pc + 1)))
            }
            Opcode::JumpIfTrue => asm::Instruction::JumpIfTrue(self.decode_jump(pc, op.modes)),
            Opcode::JumpIfFalse => asm::Instruction::JumpIfFalse(self.decode_jump(pc, op.modes)),
            Opcode::LessThan => asm::Instruction::LessThan(self.decode_calculation(pc, op.modes)),
            Opcode::Equals => asm::Instruction::Equals(self.decode_calculation(pc, op.modes)),
            Opcode::AdjustRelativeBase => asm::Instruction::AdjustRelativeBase(
                self.decode_input(op.modes[0], self.memory.get(pc + 1)),
            ),
            Opcode::Halt => asm::Instruction::Halt,
        }
    }
}

/// Parse the textual program format: one line of comma-separated integers.
pub fn parse_image(source: &str) -> Result<Vec<Value>, Error> {
    source
        .trim()
        .split(',')
        .map(|field| {
            let field = field.trim();
            field
                .parse()
                .map_err(|_| Error::MalformedIntcode(format!("invalid value {:?}", field)))
        })
        .collect()
}
