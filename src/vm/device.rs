//! I/O devices for the virtual machine.

use std::io::{stdin, stdout, Read, Write};

use super::Value;

/// An input / output device for the interpreter to operate on. The method
/// `get` retrieves the device's next input value, and `put` writes one
/// value to the device's output.
pub trait Device {
    fn get(&mut self) -> Result<Value, String>;
    fn put(&mut self, val: Value) -> Result<(), String>;
}

/// A device used for testing the toolchain. This simply keeps a buffer of
/// sample input to supply to the program, and records the program's output.
///
/// The tests run a program against the device, then check the device's
/// output against the expected output.
#[derive(Default)]
pub struct TestingDevice {
    pub input: Vec<Value>,
    pub output: Vec<Value>,
}

impl TestingDevice {
    /// Create a new testing device whose input is the values of a string's
    /// characters.
    pub fn new(sample_input: impl ToString) -> Self {
        Self {
            input: sample_input
                .to_string()
                .chars()
                .map(|ch| ch as Value)
                .collect(),
            output: vec![],
        }
    }

    /// Create a new testing device with raw numeric input.
    pub fn new_raw(input: Vec<Value>) -> Self {
        Self {
            input,
            output: vec![],
        }
    }

    /// Get the output of the testing device as a string (ascii).
    pub fn output_str(&self) -> String {
        self.output.iter().map(|&ch| ch as u8 as char).collect()
    }
}

impl Device for TestingDevice {
    fn get(&mut self) -> Result<Value, String> {
        if self.input.is_empty() {
            Err(String::from("ran out of input"))
        } else {
            Ok(self.input.remove(0))
        }
    }

    fn put(&mut self, val: Value) -> Result<(), String> {
        self.output.push(val);
        Ok(())
    }
}

/// A device wired to the standard streams. Each value is one byte: `get`
/// reads a byte from stdin (yielding -1 at end of input), and `put` writes
/// a byte to stdout.
pub struct StandardDevice;

impl Device for StandardDevice {
    fn get(&mut self) -> Result<Value, String> {
        // Flush any pending output before blocking on a read.
        if stdout().flush().is_err() {
            return Err(String::from("could not flush output"));
        }
        let mut byte = [0];
        match stdin().read(&mut byte) {
            Ok(0) => Ok(-1),
            Ok(_) => Ok(Value::from(byte[0])),
            Err(_) => Err(String::from("could not read input")),
        }
    }

    fn put(&mut self, val: Value) -> Result<(), String> {
        let byte = [val as u8];
        stdout()
            .write_all(&byte)
            .map_err(|_| String::from("could not write output"))
    }
}
