//! The assembly parser: line-oriented, tokenless, case-sensitive.
//!
//! A line is a `label:`, an instruction `mnemonic operand, operand, ...`, or
//! a directive starting with `.`. Comments run from `#` to the end of the
//! line. Any operand may carry an `@ name` suffix, which labels the cell
//! that will hold the operand in the encoded image.

use super::ast::*;
use crate::scan::{Scanner, SyntaxError};

struct Parser<'a> {
    scan: Scanner<'a>,
}

impl<'a> Parser<'a> {
    fn parse_literal(&mut self) -> Result<Immediate, SyntaxError> {
        self.scan.skip_spaces();
        Ok(Immediate::Literal(self.scan.parse_i64()?))
    }

    fn parse_immediate(&mut self) -> Result<Immediate, SyntaxError> {
        self.scan.skip_spaces();
        match self.scan.peek() {
            None => Err(self.scan.error("Unexpected end of input.")),
            Some(c) if c.is_ascii_alphabetic() => Ok(Immediate::Name(self.scan.parse_name()?)),
            Some(_) => self.parse_literal(),
        }
    }

    fn parse_address(&mut self) -> Result<Immediate, SyntaxError> {
        self.scan.eat("*")?;
        self.parse_immediate()
    }

    fn parse_relative(&mut self) -> Result<Immediate, SyntaxError> {
        self.scan.eat("base[")?;
        let value = self.parse_immediate()?;
        self.scan.eat("]")?;
        Ok(value)
    }

    /// An optional `@ name` suffix after an operand.
    fn parse_cell_label(&mut self) -> Result<Option<String>, SyntaxError> {
        self.scan.skip_spaces();
        if self.scan.peek() == Some('@') {
            self.scan.eat("@")?;
            Ok(Some(self.scan.parse_name()?))
        } else {
            Ok(None)
        }
    }

    fn parse_input_param(&mut self) -> Result<InputParam, SyntaxError> {
        self.scan.skip_spaces();
        let value = match self.scan.peek() {
            None => return Err(self.scan.error("Unexpected end of input.")),
            Some('*') => InputValue::Address(self.parse_address()?),
            _ if self.scan.starts_with("base[") => InputValue::Relative(self.parse_relative()?),
            Some(_) => InputValue::Immediate(self.parse_immediate()?),
        };
        Ok(InputParam {
            label: self.parse_cell_label()?,
            value,
        })
    }

    fn parse_output_param(&mut self) -> Result<OutputParam, SyntaxError> {
        self.scan.skip_spaces();
        let value = match self.scan.peek() {
            None => return Err(self.scan.error("Unexpected end of input.")),
            Some('*') => OutputValue::Address(self.parse_address()?),
            _ if self.scan.starts_with("base[") => OutputValue::Relative(self.parse_relative()?),
            Some(_) => return Err(self.scan.error("Expected *x or base[x].")),
        };
        Ok(OutputParam {
            label: self.parse_cell_label()?,
            value,
        })
    }

    fn parse_calculation(&mut self) -> Result<Calculation, SyntaxError> {
        let a = self.parse_input_param()?;
        self.scan.eat(",")?;
        let b = self.parse_input_param()?;
        self.scan.eat(",")?;
        let out = self.parse_output_param()?;
        Ok(Calculation { a, b, out })
    }

    fn parse_jump(&mut self) -> Result<Jump, SyntaxError> {
        let condition = self.parse_input_param()?;
        self.scan.eat(",")?;
        let target = self.parse_input_param()?;
        Ok(Jump { condition, target })
    }

    fn parse_instruction(&mut self, mnemonic: &str) -> Result<Instruction, SyntaxError> {
        match mnemonic {
            "add" => Ok(Instruction::Add(self.parse_calculation()?)),
            "mul" => Ok(Instruction::Mul(self.parse_calculation()?)),
            "lt" => Ok(Instruction::LessThan(self.parse_calculation()?)),
            "eq" => Ok(Instruction::Equals(self.parse_calculation()?)),
            "in" => Ok(Instruction::Input(self.parse_output_param()?)),
            "out" => Ok(Instruction::Output(self.parse_input_param()?)),
            "jnz" => Ok(Instruction::JumpIfTrue(self.parse_jump()?)),
            "jz" => Ok(Instruction::JumpIfFalse(self.parse_jump()?)),
            "arb" => Ok(Instruction::AdjustRelativeBase(self.parse_input_param()?)),
            "halt" => Ok(Instruction::Halt),
            _ => Err(self.scan.error(format!("Unknown op {:?}.", mnemonic))),
        }
    }

    fn parse_directive(&mut self) -> Result<Directive, SyntaxError> {
        self.scan.eat(".")?;
        let id = self.scan.parse_name()?;
        match id.as_str() {
            "define" => {
                let name = self.scan.parse_name()?;
                let value = self.parse_input_param()?;
                Ok(Directive::Define { name, value })
            }
            "int" => Ok(Directive::Integer(self.parse_immediate()?)),
            "ascii" => {
                self.scan.skip_spaces();
                Ok(Directive::Ascii(self.scan.parse_string_literal()?))
            }
            _ => Err(self.scan.error("Invalid directive.")),
        }
    }

    fn parse_statement(&mut self) -> Result<Statement, SyntaxError> {
        self.scan.skip_spaces();
        match self.scan.peek() {
            Some('.') => Ok(Statement::Directive(self.parse_directive()?)),
            Some(c) if c.is_ascii_alphanumeric() => {
                let id = self.scan.parse_name()?;
                self.scan.skip_spaces();
                if self.scan.peek() == Some(':') {
                    self.scan.eat(":")?;
                    Ok(Statement::Label(id))
                } else {
                    Ok(Statement::Instruction(self.parse_instruction(&id)?))
                }
            }
            _ => Err(self.scan.error("Expected label or instruction.")),
        }
    }

    fn parse_program(&mut self) -> Result<Vec<Statement>, SyntaxError> {
        self.scan.skip_spaces();
        let mut output = Vec::new();
        while !self.scan.is_empty() {
            if self.scan.peek() != Some('\n') {
                output.push(self.parse_statement()?);
            }
            self.scan.expect_newline()?;
            self.scan.skip_spaces();
        }
        Ok(output)
    }
}

/// Parse one assembly source file into its statement list.
pub fn parse(file: &str, source: &str) -> Result<Vec<Statement>, SyntaxError> {
    Parser {
        scan: Scanner::new(file, source),
    }
    .parse_program()
}
