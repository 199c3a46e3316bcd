//! The source-language parser and module loader.
//!
//! Single-pass recursive descent over the raw text; there is no token
//! stream. Whitespace is the space character only: newlines terminate
//! statements and participate in the grammar. Comments run from `#` to the
//! end of the line.
//!
//! The prefix `*x` reads the cell addressed by `x`; the infix `a * b`
//! multiplies. The two are distinguished purely by position. `a[b]` is
//! sugar for `*(a + b)`, unary `-x` for `0 - x`, and the comparisons
//! other than `<` and `==` for operand swaps and logical complements.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::debug;

use super::ast::*;
use super::Error;
use crate::scan::Scanner;

struct Parser<'a> {
    scan: Scanner<'a>,
}

impl<'a> Parser<'a> {
    fn parse_literal(&mut self) -> Result<Literal, Error> {
        self.scan.skip_spaces();
        match self.scan.peek() {
            None => Err(self.scan.error("Unexpected end of input.").into()),
            Some('"') => Ok(Literal::Text(self.scan.parse_string_literal()?)),
            Some(c) if c.is_ascii_digit() => Ok(Literal::Integer(self.scan.parse_i64()?)),
            Some(_) => Err(self.scan.error("Expected a literal value.").into()),
        }
    }

    fn parse_term(&mut self) -> Result<Expression, Error> {
        self.scan.skip_spaces();
        match self.scan.peek() {
            None => Err(self.scan.error("Unexpected end of input.").into()),
            Some(c) if c == '"' || c.is_ascii_digit() => {
                Ok(Expression::Literal(self.parse_literal()?))
            }
            Some('(') => {
                self.scan.eat("(")?;
                let result = self.parse_condition()?;
                self.scan.eat(")")?;
                Ok(result)
            }
            Some(_) => {
                let name = self.scan.parse_name()?;
                if name == "input" {
                    Ok(Expression::Input)
                } else {
                    Ok(Expression::Name(name))
                }
            }
        }
    }

    /// Call and index suffixes: `f(a, b)` and `a[i]`.
    fn parse_suffix(&mut self) -> Result<Expression, Error> {
        let mut result = self.parse_term()?;
        loop {
            self.scan.skip_spaces();
            match self.scan.peek() {
                Some('[') => {
                    self.scan.eat("[")?;
                    let address = self.parse_expression()?;
                    self.scan.eat("]")?;
                    result = Expression::Read(Box::new(Expression::Add(Calculation::new(
                        result, address,
                    ))));
                }
                Some('(') => {
                    self.scan.eat("(")?;
                    self.scan.skip_spaces();
                    let mut arguments = Vec::new();
                    if self.scan.peek() != Some(')') {
                        arguments.push(self.parse_expression()?);
                        while self.scan.peek() != Some(')') {
                            self.scan.eat(",")?;
                            arguments.push(self.parse_expression()?);
                        }
                    }
                    self.scan.eat(")")?;
                    result = Expression::Call(Call {
                        function: Box::new(result),
                        arguments,
                    });
                }
                _ => break,
            }
        }
        Ok(result)
    }

    fn parse_prefix(&mut self) -> Result<Expression, Error> {
        self.scan.skip_spaces();
        match self.scan.peek() {
            None => Err(self.scan.error("Unexpected end of input.").into()),
            Some('*') => {
                self.scan.eat("*")?;
                Ok(Expression::Read(Box::new(self.parse_prefix()?)))
            }
            Some('-') => {
                self.scan.eat("-")?;
                Ok(Expression::Sub(Calculation::new(
                    Expression::integer(0),
                    self.parse_prefix()?,
                )))
            }
            _ => self.parse_suffix(),
        }
    }

    fn parse_product(&mut self) -> Result<Expression, Error> {
        let mut result = self.parse_prefix()?;
        while self.scan.peek() == Some('*') {
            self.scan.eat("*")?;
            result = Expression::Mul(Calculation::new(result, self.parse_prefix()?));
        }
        Ok(result)
    }

    fn parse_sum(&mut self) -> Result<Expression, Error> {
        let mut result = self.parse_product()?;
        loop {
            match self.scan.peek() {
                Some('+') if !self.scan.starts_with("+=") => {
                    self.scan.eat("+")?;
                    result = Expression::Add(Calculation::new(result, self.parse_product()?));
                }
                Some('-') => {
                    self.scan.eat("-")?;
                    result = Expression::Sub(Calculation::new(result, self.parse_product()?));
                }
                _ => break,
            }
        }
        Ok(result)
    }

    fn parse_expression(&mut self) -> Result<Expression, Error> {
        self.parse_sum()
    }

    /// At most one comparison; chains like `a < b < c` do not parse.
    fn parse_comparison(&mut self) -> Result<Expression, Error> {
        let left = self.parse_sum()?;
        self.scan.skip_spaces();
        if self.scan.consume_symbol("<") {
            Ok(Expression::LessThan(Calculation::new(
                left,
                self.parse_expression()?,
            )))
        } else if self.scan.consume_symbol("==") {
            Ok(Expression::Equals(Calculation::new(
                left,
                self.parse_expression()?,
            )))
        } else if self.scan.consume_symbol(">") {
            Ok(greater_than(left, self.parse_expression()?))
        } else if self.scan.consume_symbol("<=") {
            Ok(less_or_equal(left, self.parse_expression()?))
        } else if self.scan.consume_symbol(">=") {
            Ok(greater_or_equal(left, self.parse_expression()?))
        } else if self.scan.consume_symbol("!=") {
            Ok(not_equals(left, self.parse_expression()?))
        } else {
            Ok(left)
        }
    }

    fn parse_conjunction(&mut self) -> Result<Expression, Error> {
        let mut left = self.parse_comparison()?;
        while self.scan.consume_symbol("&&") {
            left = Expression::LogicalAnd(Calculation::new(left, self.parse_comparison()?));
        }
        Ok(left)
    }

    fn parse_disjunction(&mut self) -> Result<Expression, Error> {
        let mut left = self.parse_conjunction()?;
        while self.scan.consume_symbol("||") {
            left = Expression::LogicalOr(Calculation::new(left, self.parse_conjunction()?));
        }
        Ok(left)
    }

    fn parse_condition(&mut self) -> Result<Expression, Error> {
        self.parse_disjunction()
    }

    /// One item of a `var` list: a scalar name, or a name with an array
    /// size.
    fn parse_var_item(&mut self) -> Result<(String, Option<Expression>), Error> {
        let name = self.scan.parse_name()?;
        self.scan.skip_spaces();
        if self.scan.peek() == Some('[') {
            self.scan.eat("[")?;
            let size = self.parse_expression()?;
            self.scan.eat("]")?;
            Ok((name, Some(size)))
        } else {
            Ok((name, None))
        }
    }

    /// A statement-scope `var` list, where items may carry initialisers:
    /// `var a, b = 1, c;` declares then assigns.
    fn parse_var_statements(&mut self) -> Result<Vec<Statement>, Error> {
        self.scan.eat_name("var")?;
        let mut output = Vec::new();
        loop {
            let (name, size) = self.parse_var_item()?;
            output.push(match size {
                Some(size) => Statement::DeclareArray {
                    name: name.clone(),
                    size,
                },
                None => Statement::DeclareScalar { name: name.clone() },
            });
            self.scan.skip_spaces();
            if self.scan.peek() == Some('=') {
                self.scan.eat("=")?;
                output.push(Statement::Assign {
                    left: Expression::Name(name),
                    right: self.parse_expression()?,
                });
                self.scan.skip_spaces();
            }
            if self.scan.peek() != Some(',') {
                break;
            }
            self.scan.eat(",")?;
        }
        self.scan.eat(";")?;
        Ok(output)
    }

    /// A module-scope `var` list; no initialisers.
    fn parse_var_declarations(&mut self) -> Result<Vec<Declaration>, Error> {
        self.scan.eat_name("var")?;
        let mut output = Vec::new();
        loop {
            let (name, size) = self.parse_var_item()?;
            output.push(match size {
                Some(size) => Declaration::DeclareArray { name, size },
                None => Declaration::DeclareScalar { name },
            });
            self.scan.skip_spaces();
            if self.scan.peek() != Some(',') {
                break;
            }
            self.scan.eat(",")?;
        }
        self.scan.eat(";")?;
        Ok(output)
    }

    fn parse_constant_items(&mut self) -> Result<Vec<(String, Expression)>, Error> {
        self.scan.eat_name("const")?;
        let mut output = Vec::new();
        loop {
            let name = self.scan.parse_name()?;
            self.scan.eat("=")?;
            output.push((name, self.parse_expression()?));
            self.scan.skip_spaces();
            if self.scan.peek() != Some(',') {
                break;
            }
            self.scan.eat(",")?;
        }
        self.scan.eat(";")?;
        Ok(output)
    }

    fn parse_if(&mut self) -> Result<Statement, Error> {
        self.scan.eat_name("if")?;
        let condition = self.parse_condition()?;
        self.scan.eat("{")?;
        self.scan.expect_newline()?;
        let then_branch = self.parse_statements()?;
        self.scan.eat("}")?;
        self.scan.skip_spaces();
        let mut else_branch = Vec::new();
        if self.scan.consume_name("else") {
            if self.scan.peek_name() == "if" {
                else_branch.push(self.parse_if()?);
            } else {
                self.scan.eat("{")?;
                self.scan.expect_newline()?;
                else_branch = self.parse_statements()?;
                self.scan.eat("}")?;
            }
        }
        Ok(Statement::If(If {
            condition,
            then_branch,
            else_branch,
        }))
    }

    fn parse_while(&mut self) -> Result<Statement, Error> {
        self.scan.eat_name("while")?;
        let condition = self.parse_condition()?;
        self.scan.eat("{")?;
        self.scan.expect_newline()?;
        let body = self.parse_statements()?;
        self.scan.eat("}")?;
        Ok(Statement::While(While { condition, body }))
    }

    fn parse_line(&mut self, output: &mut Vec<Statement>) -> Result<(), Error> {
        if self.scan.is_empty() {
            return Err(self.scan.error("Unexpected end of input.").into());
        }
        match self.scan.peek_name() {
            "const" => {
                for (name, value) in self.parse_constant_items()? {
                    output.push(Statement::Constant { name, value });
                }
                return Ok(());
            }
            "var" => {
                output.extend(self.parse_var_statements()?);
                return Ok(());
            }
            "if" => {
                output.push(self.parse_if()?);
                return Ok(());
            }
            "while" => {
                output.push(self.parse_while()?);
                return Ok(());
            }
            "output" => {
                self.scan.eat_name("output")?;
                let value = self.parse_expression()?;
                self.scan.eat(";")?;
                output.push(Statement::Output(value));
                return Ok(());
            }
            "return" => {
                self.scan.eat_name("return")?;
                let value = self.parse_expression()?;
                self.scan.eat(";")?;
                output.push(Statement::Return(value));
                return Ok(());
            }
            "break" => {
                self.scan.eat_name("break")?;
                self.scan.eat(";")?;
                output.push(Statement::Break);
                return Ok(());
            }
            "continue" => {
                self.scan.eat_name("continue")?;
                self.scan.eat(";")?;
                output.push(Statement::Continue);
                return Ok(());
            }
            "halt" => {
                self.scan.eat_name("halt")?;
                self.scan.eat(";")?;
                output.push(Statement::Halt);
                return Ok(());
            }
            _ => {}
        }
        let expression = self.parse_expression()?;
        self.scan.skip_spaces();
        if self.scan.starts_with("+=") {
            if !expression.is_lvalue() {
                return Err(self
                    .scan
                    .error(format!("{} is not an lvalue.", expression))
                    .into());
            }
            self.scan.eat("+=")?;
            let value = self.parse_expression()?;
            self.scan.eat(";")?;
            output.push(Statement::AddAssign {
                left: expression,
                right: value,
            });
        } else if self.scan.peek() == Some('=') && !self.scan.starts_with("==") {
            if !expression.is_lvalue() {
                return Err(self
                    .scan
                    .error(format!("{} is not an lvalue.", expression))
                    .into());
            }
            self.scan.eat("=")?;
            let value = self.parse_expression()?;
            self.scan.eat(";")?;
            output.push(Statement::Assign {
                left: expression,
                right: value,
            });
        } else if let Expression::Call(call) = expression {
            self.scan.eat(";")?;
            output.push(Statement::Call(call));
        } else {
            return Err(self
                .scan
                .error("Only call expressions can be performed as statements.")
                .into());
        }
        Ok(())
    }

    fn parse_statements(&mut self) -> Result<Vec<Statement>, Error> {
        self.scan.skip_spaces();
        let mut output = Vec::new();
        while !self.scan.is_empty() && self.scan.peek() != Some('}') {
            self.parse_line(&mut output)?;
            self.scan.eat("\n")?;
            self.scan.skip_spaces();
        }
        Ok(output)
    }

    fn parse_function_definition(&mut self) -> Result<FunctionDefinition, Error> {
        self.scan.eat_name("function")?;
        let name = self.scan.parse_name()?;
        self.scan.eat("(")?;
        let mut parameters = Vec::new();
        loop {
            self.scan.skip_spaces();
            if self.scan.peek() == Some(')') {
                break;
            }
            parameters.push(self.scan.parse_name()?);
            self.scan.skip_spaces();
            if self.scan.peek() != Some(',') {
                break;
            }
            self.scan.eat(",")?;
        }
        self.scan.eat(")")?;
        self.scan.eat("{")?;
        self.scan.expect_newline()?;
        let body = self.parse_statements()?;
        self.scan.eat("}")?;
        Ok(FunctionDefinition {
            name,
            parameters,
            body,
        })
    }

    fn parse_import(&mut self) -> Result<Import, Error> {
        self.scan.eat_name("import")?;
        let mut parts = vec![self.scan.parse_name()?];
        while self.scan.peek_symbol() == "." {
            self.scan.eat_symbol(".")?;
            parts.push(self.scan.parse_name()?);
        }
        self.scan.eat(";")?;
        Ok(Import { parts })
    }

    fn parse_module(&mut self, file: &str) -> Result<Module, Error> {
        let mut module = Module {
            name: file.to_string(),
            imports: Vec::new(),
            body: Vec::new(),
        };
        while self.scan.peek_name() == "import" {
            module.imports.push(self.parse_import()?);
            self.scan.expect_newline()?;
        }
        loop {
            self.scan.skip_spaces();
            if self.scan.is_empty() {
                break;
            }
            if self.scan.peek() == Some('\n') {
                self.scan.expect_newline()?;
                continue;
            }
            match self.scan.peek_name() {
                "const" => {
                    for (name, value) in self.parse_constant_items()? {
                        module.body.push(Declaration::Constant { name, value });
                    }
                }
                "var" => module.body.extend(self.parse_var_declarations()?),
                "function" => module
                    .body
                    .push(Declaration::Function(self.parse_function_definition()?)),
                _ => return Err(self.scan.error("Expected declaration.").into()),
            }
            self.scan.expect_newline()?;
        }
        Ok(module)
    }
}

/// Parse one source file into its module AST.
pub fn parse(file: &str, source: &str) -> Result<Module, Error> {
    Parser {
        scan: Scanner::new(file, source),
    }
    .parse_module(file)
}

fn load_module(
    output: &mut BTreeMap<String, Module>,
    filename: &str,
    source: &str,
) -> Result<(), Error> {
    let module = parse(filename, source)?;
    let context = module.context();
    let imports: Vec<String> = module
        .imports
        .iter()
        .map(|import| import.resolve(&context))
        .collect();
    output.insert(filename.to_string(), module);
    for path in imports {
        if !Path::new(&path).exists() {
            return Err(Error::MissingImport {
                path,
                importer: filename.to_string(),
            });
        }
        load_recursive(output, &path)?;
    }
    Ok(())
}

fn load_recursive(output: &mut BTreeMap<String, Module>, filename: &str) -> Result<(), Error> {
    if output.contains_key(filename) {
        return Ok(());
    }
    let source = fs::read_to_string(filename).map_err(|e| Error::Io {
        path: filename.to_string(),
        message: e.to_string(),
    })?;
    debug!("loaded module {}", filename);
    load_module(output, filename, &source)
}

/// Load a module file and, recursively, every module it imports. The
/// result maps filesystem paths to parsed modules.
pub fn load(filename: &str) -> Result<BTreeMap<String, Module>, Error> {
    let mut modules = BTreeMap::new();
    load_recursive(&mut modules, filename)?;
    Ok(modules)
}

/// Load a root module from already-read text (e.g. the standard input),
/// then recursively load everything it imports from disk.
pub fn load_source(name: &str, source: &str) -> Result<BTreeMap<String, Module>, Error> {
    let mut modules = BTreeMap::new();
    load_module(&mut modules, name, source)?;
    Ok(modules)
}
