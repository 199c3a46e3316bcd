//! # Compiler Module
//!
//! This module contains the source-language frontend: a small imperative
//! language with modules, functions, scalar and array variables, and a
//! single input and output channel. Compilation is a pure pipeline:
//!
//! 1. [Parser](./parse) — text to a module AST, plus the loader that
//!    recursively parses imported modules.
//! 2. [Code generator](./codegen) — module ASTs, in dependency order, down
//!    to assembly statements ready for the [assembler](crate::asm).
//!
//! The language has no type system. Every value is one machine cell;
//! arrays and strings are naming conventions over cell ranges.

use std::fmt;

use crate::scan::SyntaxError;

pub mod ast;
pub mod codegen;
pub mod parse;

pub use ast::{Declaration, Expression, Module, Statement};
pub use codegen::generate;
pub use parse::{load, load_source, parse};

/// An error generated while parsing, loading, or compiling source code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The text was not a well-formed source module.
    Syntax(SyntaxError),
    /// A source file could not be read.
    Io { path: String, message: String },
    /// An import did not name a file on disk.
    MissingImport { path: String, importer: String },
    /// The imports could not be ordered; the named modules depend on each
    /// other.
    ImportCycle(Vec<String>),
    /// A name was used that has no binding in scope.
    Undefined { name: String, function: String },
    /// A module-level constant referred to a name with no constant binding.
    UndefinedConstant { name: String },
    /// Two module-level definitions share a name.
    DuplicateGlobal { name: String },
    /// Two definitions in the same innermost scope share a name.
    DuplicateLocal { name: String, function: String },
    /// A constant position held an expression that does not fold.
    NotConstant { expression: String },
    /// An array was declared with a size that does not fold to a literal.
    ArraySizeNotConstant { name: String },
    /// A constant was used as an assignment target.
    ConstantAsLvalue { name: String, function: String },
    /// An expression with no storage was used as an assignment target.
    InvalidLvalue { expression: String, function: String },
    /// A break statement outside any loop.
    IllegalBreak { function: String },
    /// A continue statement outside any loop.
    IllegalContinue { function: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Syntax(e) => e.fmt(f),
            Error::Io { path, message } => write!(f, "Cannot read {:?}: {}", path, message),
            Error::MissingImport { path, importer } => {
                write!(
                    f,
                    "Cannot find dependency {:?} required by {:?}.",
                    path, importer
                )
            }
            Error::ImportCycle(names) => {
                write!(f, "Import cycle involving {{")?;
                for (i, name) in names.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}", name)?;
                }
                write!(f, "}}.")
            }
            Error::Undefined { name, function } => {
                write!(f, "{:?} not found in function {:?}.", name, function)
            }
            Error::UndefinedConstant { name } => {
                write!(f, "Undefined constant {:?} at module scope.", name)
            }
            Error::DuplicateGlobal { name } => {
                write!(f, "Multiple definitions for {:?} at global scope.", name)
            }
            Error::DuplicateLocal { name, function } => {
                write!(
                    f,
                    "Multiple definitions for {:?} in function {:?}.",
                    name, function
                )
            }
            Error::NotConstant { expression } => {
                write!(f, "Expression {} is not a constant expression.", expression)
            }
            Error::ArraySizeNotConstant { name } => {
                write!(
                    f,
                    "Array size for {:?} is not a compile-time constant.",
                    name
                )
            }
            Error::ConstantAsLvalue { name, function } => {
                write!(
                    f,
                    "Cannot use constant {:?} as an lvalue in function {:?}.",
                    name, function
                )
            }
            Error::InvalidLvalue {
                expression,
                function,
            } => {
                write!(
                    f,
                    "Cannot use expression {} as an lvalue in function {:?}.",
                    expression, function
                )
            }
            Error::IllegalBreak { function } => {
                write!(f, "Illegal break statement in function {:?}.", function)
            }
            Error::IllegalContinue { function } => {
                write!(f, "Illegal continue statement in function {:?}.", function)
            }
        }
    }
}

impl From<SyntaxError> for Error {
    fn from(e: SyntaxError) -> Self {
        Error::Syntax(e)
    }
}
