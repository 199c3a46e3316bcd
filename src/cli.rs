//! Shared command-line plumbing for the `compile`, `as` and `run`
//! binaries: flag filtering, `-` stream handling, and the output formats.

use std::fmt;
use std::fs;
use std::io::{self, Read, Write};

use crate::{asm, compiler, vm};

/// Everything that can go wrong across the pipeline. The binaries print
/// one of these and exit 1.
#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Asm(asm::Error),
    Compiler(compiler::Error),
    Vm(vm::Error),
    Usage(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "error: {}", e),
            Error::Asm(e) => e.fmt(f),
            Error::Compiler(e) => e.fmt(f),
            Error::Vm(e) => write!(f, "error: {}", e),
            Error::Usage(message) => f.write_str(message),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<asm::Error> for Error {
    fn from(e: asm::Error) -> Self {
        Error::Asm(e)
    }
}

impl From<compiler::Error> for Error {
    fn from(e: compiler::Error) -> Self {
        Error::Compiler(e)
    }
}

impl From<vm::Error> for Error {
    fn from(e: vm::Error) -> Self {
        Error::Vm(e)
    }
}

/// Drop unknown `--flags` from the command line, with a warning on stderr,
/// before clap sees it. Everything after a bare `--` passes through
/// untouched.
pub fn known_args(known: &[&str]) -> Vec<String> {
    let mut args = std::env::args();
    let mut output: Vec<String> = args.next().into_iter().collect();
    let mut positional_only = false;
    for argument in args {
        if !positional_only && argument == "--" {
            positional_only = true;
        } else if !positional_only && argument.starts_with("--") {
            let name = argument[2..].split('=').next().unwrap_or("");
            if !known.contains(&name) {
                eprintln!("warning: ignoring unknown flag --{}", name);
                continue;
            }
        }
        output.push(argument);
    }
    output
}

/// Parse the command line, exiting 0 for `--help` and 1 for bad usage.
pub fn parse_args<T: clap::Parser>(known: &[&str]) -> T {
    match T::try_parse_from(known_args(known)) {
        Ok(args) => args,
        Err(e) => {
            use clap::error::ErrorKind;
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    }
}

/// Read a source file, or standard input when the path is `-`. Returns
/// the name to use in diagnostics alongside the contents.
pub fn read_input(path: &str) -> Result<(String, String), Error> {
    if path == "-" {
        let mut source = String::new();
        io::stdin().read_to_string(&mut source)?;
        Ok(("stdin".to_string(), source))
    } else {
        Ok((path.to_string(), fs::read_to_string(path)?))
    }
}

/// Write to a file, or standard output when the path is `-`.
pub fn write_output(path: &str, contents: &str) -> Result<(), Error> {
    if path == "-" {
        io::stdout().write_all(contents.as_bytes())?;
        Ok(())
    } else {
        Ok(fs::write(path, contents)?)
    }
}

/// The textual program format: comma-separated cells, one line.
pub fn render_intcode(image: &[i64]) -> String {
    let mut output = image
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(",");
    output.push('\n');
    output
}

/// An assembly listing, one statement per line.
pub fn render_assembly(statements: &[asm::Statement]) -> String {
    let mut output = String::new();
    for statement in statements {
        output.push_str(&statement.to_string());
        output.push('\n');
    }
    output
}
