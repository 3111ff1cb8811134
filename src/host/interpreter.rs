//! Tree-walking interpreter for generated code
//!
//! Generated code is literal text interleaved with `<?php ... ?>` and
//! `<?= ... ?>` tags. Block statements may open in one tag and close in
//! another, so execution happens in three steps: split the code into text
//! and tag bodies, parse each body into statements, then fold the flat
//! statement list into a tree of blocks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, trace};
use serde_json::Value;

use super::ast::{BinaryOp, Expr, Spanned, Stmt, UnaryOp};
use super::value::{self, display, to_number, truthy};
use super::{grammar, Frame, Host, HostError, Variables};
use crate::compiler::CompilerOptions;

/// Parsed, structured generated code
#[derive(Debug, Clone, PartialEq)]
enum Instr {
    Text(String),
    Stmt(Stmt),
    If {
        branches: Vec<(Expr, Vec<Instr>)>,
        otherwise: Option<Vec<Instr>>,
    },
    Foreach {
        subject: Expr,
        key: Option<String>,
        value: String,
        body: Vec<Instr>,
    },
    For {
        init: Option<Stmt>,
        condition: Option<Expr>,
        step: Option<Stmt>,
        body: Vec<Instr>,
    },
    While {
        condition: Expr,
        body: Vec<Instr>,
    },
}

type Program = Arc<Vec<Instr>>;

/// Control flow out of a statement list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Normal,
    Break,
    Continue,
}

/// Reference host for the code emitted by the built-in directives
#[derive(Debug)]
pub struct ScriptHost {
    escape_function: String,
    serialize_function: String,
    programs: Mutex<HashMap<String, Program>>,
}

impl Default for ScriptHost {
    fn default() -> Self {
        Self::new(&CompilerOptions::default())
    }
}

impl ScriptHost {
    /// Bind the escape and serialize names the compiler emits
    pub fn new(options: &CompilerOptions) -> Self {
        Self {
            escape_function: options.escape_function.clone(),
            serialize_function: options.serialize_function.clone(),
            programs: Mutex::new(HashMap::new()),
        }
    }

    fn programs(&self) -> MutexGuard<'_, HashMap<String, Program>> {
        match self.programs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn program(&self, code: &str) -> Result<Program, HostError> {
        if let Some(program) = self.programs().get(code) {
            return Ok(Arc::clone(program));
        }
        let program: Program = Arc::new(build(code)?);
        self.programs()
            .insert(code.to_string(), Arc::clone(&program));
        Ok(program)
    }
}

impl Host for ScriptHost {
    fn execute(&self, code: &str, frame: &mut Frame<'_>) -> Result<(), HostError> {
        let program = self.program(code)?;
        Interpreter { host: self, frame }.run(&program)?;
        Ok(())
    }

    fn invalidate(&self, artifact: &std::path::Path) {
        debug!("dropping parsed programs after {} changed", artifact.display());
        self.programs().clear();
    }
}

/// One piece of generated code
#[derive(Debug, Clone, PartialEq)]
enum Segment<'a> {
    Text(&'a str),
    /// Body of a tag with its byte offset in the generated code
    Code { body: &'a str, offset: usize, echo: bool },
}

/// Split generated code into text and tag bodies
///
/// A tag left open runs to the end of the code.
fn segments(code: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut rest = 0;

    while rest < code.len() {
        let Some(found) = code[rest..].find("<?") else {
            out.push(Segment::Text(&code[rest..]));
            break;
        };
        let start = rest + found;
        let after = &code[start + 2..];

        let (echo, skip) = if after.starts_with('=') {
            (true, 3)
        } else if after.starts_with("php")
            && after[3..].chars().next().map_or(true, char::is_whitespace)
        {
            (false, 5)
        } else {
            // Not a tag; keep the `<?` as text
            out.push(Segment::Text(&code[rest..start + 2]));
            rest = start + 2;
            continue;
        };

        if start > rest {
            out.push(Segment::Text(&code[rest..start]));
        }

        let body_start = start + skip;
        let (body_end, next) = match closing_tag(&code[body_start..]) {
            Some(i) => (body_start + i, body_start + i + 2),
            None => (code.len(), code.len()),
        };
        out.push(Segment::Code {
            body: &code[body_start..body_end],
            offset: body_start,
            echo,
        });
        rest = next;
    }

    out
}

/// Offset of the `?>` that closes a code block, skipping quoted strings
fn closing_tag(body: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut quote = None;
    let mut i = 0;
    while i < bytes.len() {
        match (quote, bytes[i]) {
            (Some(_), b'\\') => i += 1,
            (Some(q), b) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b @ (b'\'' | b'"')) => quote = Some(b),
            (None, b'?') if bytes.get(i + 1) == Some(&b'>') => return Some(i),
            (None, _) => {}
        }
        i += 1;
    }
    None
}

/// Flat entries before block structure is recovered
enum Item {
    Text(String),
    Stmt(Spanned<Stmt>),
}

fn build(code: &str) -> Result<Vec<Instr>, HostError> {
    let mut items = Vec::new();
    let mut errors = Vec::new();

    for segment in segments(code) {
        match segment {
            Segment::Text(text) => items.push(Item::Text(text.to_string())),
            Segment::Code { body, offset, echo } => {
                let parsed = if echo {
                    grammar::parse_echo(body)
                } else {
                    grammar::parse(body)
                };
                match parsed {
                    Ok(stmts) => items.extend(stmts.into_iter().map(Item::Stmt)),
                    Err(errs) => errors.extend(errs.into_iter().map(|e| e.offset(offset))),
                }
            }
        }
    }

    if !errors.is_empty() {
        return Err(HostError::Parse {
            errors,
            code: code.to_string(),
        });
    }

    let mut items = items.into_iter();
    let (body, closer) = block(&mut items)?;
    match closer {
        None => Ok(body),
        Some(stmt) => Err(HostError::Structure(format!(
            "{} without a matching opener",
            keyword(&stmt)
        ))),
    }
}

fn keyword(stmt: &Stmt) -> &'static str {
    match stmt {
        Stmt::ElseIf(_) => "elseif",
        Stmt::Else => "else",
        Stmt::EndIf => "endif",
        Stmt::EndForeach => "endforeach",
        Stmt::EndFor => "endfor",
        Stmt::EndWhile => "endwhile",
        Stmt::If(_) => "if",
        Stmt::Foreach { .. } => "foreach",
        Stmt::For { .. } => "for",
        Stmt::While(_) => "while",
        _ => "statement",
    }
}

/// Collect instructions until a statement that continues or ends a block
fn block<I>(items: &mut I) -> Result<(Vec<Instr>, Option<Stmt>), HostError>
where
    I: Iterator<Item = Item>,
{
    let mut body = Vec::new();

    while let Some(item) = items.next() {
        let stmt = match item {
            Item::Text(text) => {
                body.push(Instr::Text(text));
                continue;
            }
            Item::Stmt(stmt) => stmt.node,
        };

        match stmt {
            Stmt::ElseIf(_)
            | Stmt::Else
            | Stmt::EndIf
            | Stmt::EndForeach
            | Stmt::EndFor
            | Stmt::EndWhile => {
                return Ok((body, Some(stmt)));
            }
            Stmt::If(condition) => body.push(if_block(condition, items)?),
            Stmt::Foreach {
                subject,
                key,
                value,
            } => {
                let inner = closed_by(items, "foreach", |s| matches!(s, Stmt::EndForeach))?;
                body.push(Instr::Foreach {
                    subject,
                    key,
                    value,
                    body: inner,
                });
            }
            Stmt::For {
                init,
                condition,
                step,
            } => {
                let inner = closed_by(items, "for", |s| matches!(s, Stmt::EndFor))?;
                body.push(Instr::For {
                    init: init.map(|s| *s),
                    condition,
                    step: step.map(|s| *s),
                    body: inner,
                });
            }
            Stmt::While(condition) => {
                let inner = closed_by(items, "while", |s| matches!(s, Stmt::EndWhile))?;
                body.push(Instr::While {
                    condition,
                    body: inner,
                });
            }
            other => body.push(Instr::Stmt(other)),
        }
    }

    Ok((body, None))
}

fn closed_by<I, F>(items: &mut I, opener: &str, is_closer: F) -> Result<Vec<Instr>, HostError>
where
    I: Iterator<Item = Item>,
    F: Fn(&Stmt) -> bool,
{
    match block(items)? {
        (body, Some(stmt)) if is_closer(&stmt) => Ok(body),
        (_, Some(stmt)) => Err(HostError::Structure(format!(
            "unexpected {} inside {}",
            keyword(&stmt),
            opener
        ))),
        (_, None) => Err(HostError::Structure(format!("unclosed {}", opener))),
    }
}

fn if_block<I>(condition: Expr, items: &mut I) -> Result<Instr, HostError>
where
    I: Iterator<Item = Item>,
{
    let mut branches = Vec::new();
    let mut condition = condition;

    loop {
        let (body, closer) = block(items)?;
        branches.push((condition, body));
        match closer {
            Some(Stmt::ElseIf(next)) => condition = next,
            Some(Stmt::Else) => {
                let otherwise = closed_by(items, "else", |s| matches!(s, Stmt::EndIf))?;
                return Ok(Instr::If {
                    branches,
                    otherwise: Some(otherwise),
                });
            }
            Some(Stmt::EndIf) => {
                return Ok(Instr::If {
                    branches,
                    otherwise: None,
                })
            }
            Some(other) => {
                return Err(HostError::Structure(format!(
                    "unexpected {} inside if",
                    keyword(&other)
                )))
            }
            None => return Err(HostError::Structure("unclosed if".to_string())),
        }
    }
}

struct Interpreter<'h, 'f, 'r> {
    host: &'h ScriptHost,
    frame: &'f mut Frame<'r>,
}

impl Interpreter<'_, '_, '_> {
    fn run(&mut self, instrs: &[Instr]) -> Result<Flow, HostError> {
        for instr in instrs {
            let flow = match instr {
                Instr::Text(text) => {
                    self.frame.write(text);
                    Flow::Normal
                }
                Instr::Stmt(stmt) => self.statement(stmt)?,
                Instr::If {
                    branches,
                    otherwise,
                } => {
                    let mut taken = None;
                    for (condition, body) in branches {
                        if truthy(&self.eval(condition)?) {
                            taken = Some(body);
                            break;
                        }
                    }
                    match taken.or(otherwise.as_ref()) {
                        Some(body) => self.run(body)?,
                        None => Flow::Normal,
                    }
                }
                Instr::Foreach {
                    subject,
                    key,
                    value,
                    body,
                } => {
                    let subject = self.eval(subject)?;
                    for (k, v) in value::entries(&subject) {
                        if let Some(key) = key {
                            self.frame.variables.insert(key.clone(), k);
                        }
                        self.frame.variables.insert(value.clone(), v);
                        if self.run(body)? == Flow::Break {
                            break;
                        }
                    }
                    Flow::Normal
                }
                Instr::For {
                    init,
                    condition,
                    step,
                    body,
                } => {
                    if let Some(init) = init {
                        self.statement(init)?;
                    }
                    loop {
                        if let Some(condition) = condition {
                            if !truthy(&self.eval(condition)?) {
                                break;
                            }
                        }
                        if self.run(body)? == Flow::Break {
                            break;
                        }
                        if let Some(step) = step {
                            self.statement(step)?;
                        }
                    }
                    Flow::Normal
                }
                Instr::While { condition, body } => {
                    while truthy(&self.eval(condition)?) {
                        if self.run(body)? == Flow::Break {
                            break;
                        }
                    }
                    Flow::Normal
                }
            };

            if flow != Flow::Normal {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn statement(&mut self, stmt: &Stmt) -> Result<Flow, HostError> {
        match stmt {
            Stmt::Echo(exprs) => {
                for expr in exprs {
                    let text = display(&self.eval(expr)?);
                    self.frame.write(&text);
                }
            }
            Stmt::Assign(name, expr) => {
                let value = self.eval(expr)?;
                self.frame.variables.insert(name.clone(), value);
            }
            Stmt::Expr(expr) => {
                self.eval(expr)?;
            }
            Stmt::Continue => return Ok(Flow::Continue),
            Stmt::Break => return Ok(Flow::Break),
            other => {
                return Err(HostError::Structure(format!(
                    "unexpected {}",
                    keyword(other)
                )))
            }
        }
        Ok(Flow::Normal)
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, HostError> {
        Ok(match expr {
            Expr::Null => Value::Null,
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Number(n) => value::number_value(*n),
            Expr::String(s) => Value::String(s.clone()),
            Expr::Array(entries) => {
                let mut values = Vec::with_capacity(entries.len());
                for (key, item) in entries {
                    let key = match key {
                        Some(key) => Some(self.eval(key)?),
                        None => None,
                    };
                    values.push((key, self.eval(item)?));
                }
                value::array(values)
            }
            Expr::Variable(name) => self
                .frame
                .variables
                .get(name)
                .cloned()
                .unwrap_or(Value::Null),
            Expr::This => return Err(HostError::Eval("$this cannot be used as a value".to_string())),
            Expr::Constant(name) => {
                value::constant(name).ok_or_else(|| HostError::UndefinedConstant(name.clone()))?
            }
            Expr::Call { name, args } => {
                let args = self.eval_all(args)?;
                self.call(name, args)?
            }
            Expr::Index(target, index) => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                value::index(&target, &index)
            }
            Expr::Property(target, name) => {
                let target = self.eval(target)?;
                value::index(&target, &Value::String(name.clone()))
            }
            Expr::MethodCall {
                target,
                method,
                args,
            } => {
                if **target != Expr::This {
                    return Err(HostError::UndefinedMethod(method.clone()));
                }
                let args = self.eval_all(args)?;
                self.method(method, args)?
            }
            Expr::Unary(UnaryOp::Not, operand) => Value::Bool(!truthy(&self.eval(operand)?)),
            Expr::Unary(UnaryOp::Neg, operand) => {
                value::number_value(-to_number(&self.eval(operand)?))
            }
            Expr::Binary(BinaryOp::And, lhs, rhs) => {
                Value::Bool(truthy(&self.eval(lhs)?) && truthy(&self.eval(rhs)?))
            }
            Expr::Binary(BinaryOp::Or, lhs, rhs) => {
                Value::Bool(truthy(&self.eval(lhs)?) || truthy(&self.eval(rhs)?))
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                binary(*op, &lhs, &rhs)?
            }
            Expr::Ternary(condition, then, otherwise) => {
                if truthy(&self.eval(condition)?) {
                    self.eval(then)?
                } else {
                    self.eval(otherwise)?
                }
            }
        })
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> Result<Vec<Value>, HostError> {
        exprs.iter().map(|expr| self.eval(expr)).collect()
    }

    fn call(&mut self, name: &str, args: Vec<Value>) -> Result<Value, HostError> {
        let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Null);

        if name == self.host.escape_function
            || name == "htmlentities"
            || name == "htmlspecialchars"
        {
            return Ok(Value::String(value::htmlentities(&display(&arg(0)))));
        }
        if name == self.host.serialize_function || name == "json_encode" {
            let flags = to_number(&arg(1)) as i64;
            let depth = match args.get(2) {
                Some(depth) => to_number(depth).max(0.0) as usize,
                None => 512,
            };
            return Ok(value::json_encode(&arg(0), flags, depth)
                .map_or(Value::Bool(false), Value::String));
        }

        Ok(match name {
            "isset" => Value::Bool(!args.is_empty() && args.iter().all(|v| !v.is_null())),
            "empty" => Value::Bool(!truthy(&arg(0))),
            "count" => Value::from(value::count(&arg(0))),
            "trim" => Value::String(display(&arg(0)).trim().to_string()),
            "strtoupper" => Value::String(display(&arg(0)).to_uppercase()),
            "strtolower" => Value::String(display(&arg(0)).to_lowercase()),
            "implode" => {
                let glue = display(&arg(0));
                let parts: Vec<String> = value::entries(&arg(1))
                    .iter()
                    .map(|(_, v)| display(v))
                    .collect();
                Value::String(parts.join(&glue))
            }
            "in_array" => {
                let needle = arg(0);
                Value::Bool(
                    value::entries(&arg(1))
                        .iter()
                        .any(|(_, v)| value::loose_eq(v, &needle)),
                )
            }
            _ => return Err(HostError::UndefinedFunction(name.to_string())),
        })
    }

    /// Dispatch `$this->method(...)` to the render frame
    fn method(&mut self, method: &str, args: Vec<Value>) -> Result<Value, HostError> {
        let name = args.first().map(display).unwrap_or_default();
        let optional = args
            .get(1)
            .filter(|value| !value.is_null())
            .map(display);
        trace!("$this->{}({})", method, name);

        let runtime = &mut *self.frame.runtime;
        match method {
            "section" => runtime.open_slot(&name, optional.as_deref()),
            "endSection" => runtime.close_slot(args.first().is_some_and(truthy))?,
            "yieldSection" => runtime.yield_slot(&name, optional.as_deref()),
            "parent" => runtime.parent(),
            "sectionExists" => return Ok(Value::Bool(runtime.slot_exists(&name))),
            "sectionMissing" => return Ok(Value::Bool(runtime.slot_missing(&name))),
            "push" => runtime.push(&name, optional.as_deref()),
            "prepend" => runtime.prepend(&name, optional.as_deref()),
            "endPush" => runtime.end_push()?,
            "endPrepend" => runtime.end_prepend()?,
            "stack" => runtime.stack(&name),
            "once" => return Ok(Value::Bool(runtime.once(&name))),
            "startTrim" => runtime.start_trim(),
            "endTrim" => runtime.end_trim()?,
            "extends" => runtime.extends(&name),
            "include" => {
                let variables = match args.get(1) {
                    Some(Value::Object(map)) => map.clone(),
                    _ => Variables::new(),
                };
                self.frame.include(&name, variables)?;
            }
            _ => return Err(HostError::UndefinedMethod(method.to_string())),
        }
        Ok(Value::Null)
    }
}

fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, HostError> {
    let (a, b) = (to_number(lhs), to_number(rhs));
    Ok(match op {
        BinaryOp::Add => value::number_value(a + b),
        BinaryOp::Sub => value::number_value(a - b),
        BinaryOp::Mul => value::number_value(a * b),
        BinaryOp::Div if b == 0.0 => return Err(HostError::Eval("Division by zero".to_string())),
        BinaryOp::Div => value::number_value(a / b),
        BinaryOp::Rem => {
            let (a, b) = (integer(a)?, integer(b)?);
            if b == 0 {
                return Err(HostError::Eval("Modulo by zero".to_string()));
            }
            let rem = a
                .checked_rem(b)
                .ok_or_else(|| HostError::Eval(format!("{} % {} overflows", a, b)))?;
            Value::from(rem)
        }
        BinaryOp::BitOr => Value::from(integer(a)? | integer(b)?),
        BinaryOp::Concat => Value::String(format!("{}{}", display(lhs), display(rhs))),
        BinaryOp::Eq => Value::Bool(value::loose_eq(lhs, rhs)),
        BinaryOp::NotEq => Value::Bool(!value::loose_eq(lhs, rhs)),
        BinaryOp::Less => Value::Bool(value::compare(lhs, rhs).is_lt()),
        BinaryOp::LessOrEqual => Value::Bool(value::compare(lhs, rhs).is_le()),
        BinaryOp::Greater => Value::Bool(value::compare(lhs, rhs).is_gt()),
        BinaryOp::GreaterOrEqual => Value::Bool(value::compare(lhs, rhs).is_ge()),
        BinaryOp::And => Value::Bool(truthy(lhs) && truthy(rhs)),
        BinaryOp::Or => Value::Bool(truthy(lhs) || truthy(rhs)),
    })
}

/// Truncate an operand for integer-only operators
fn integer(n: f64) -> Result<i64, HostError> {
    // i64::MAX rounds up to 2^63 as a float, so the upper bound is exclusive.
    if n.is_finite() && n >= i64::MIN as f64 && n < i64::MAX as f64 {
        Ok(n.trunc() as i64)
    } else {
        Err(HostError::Eval(format!("{} is out of integer range", n)))
    }
}
