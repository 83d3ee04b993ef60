//! The runtime: scope arena + operator tables + cooperative signals, the
//! per-invocation call frame, and statement execution.
//!
//! Execution is single-threaded, synchronous, and depth-first recursive.
//! The only cancellation mechanism is the cooperative signal pair:
//! `break_request` (set by EXIT/BREAK/`return`, cleared by the nearest loop
//! or call that honors it) and `exit_request` (propagates to the host,
//! never auto-cleared).  Concurrent script execution requires entirely
//! separate [`Runtime`]s — nothing here is safe to share across threads.

use std::rc::Rc;

use log::{debug, info};

use crate::block::{AssignTarget, Node};
use crate::error::{BasicError, Result};
use crate::evaluator::{eval_indices, Evaluator};
use crate::ops::{canon, Operators};
use crate::scope::{Arity, FunctionDef, NativeCommand, ScopeId, Scopes};
use crate::value::Value;

/// The per-invocation bundle passed to native commands: positional
/// arguments, a mutable status code, and a return-value slot.
pub struct StackFrame {
    pub name: String,
    pub args: Vec<Value>,
    pub status: u16,
    pub return_value: Value,
}

impl StackFrame {
    pub fn new(name: &str, args: Vec<Value>, status: u16) -> Self {
        Self {
            name: name.to_string(),
            args,
            status,
            return_value: Value::Null,
        }
    }

    /// Positional argument, `Null` when absent.
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or(Value::Null)
    }

    /// Coercing numeric accessor.
    pub fn number_arg(&self, index: usize) -> Result<f64> {
        self.args
            .get(index)
            .and_then(Value::as_number)
            .ok_or_else(|| BasicError::ArgumentType {
                name: self.name.clone(),
                index,
                expected: "a number".to_string(),
            })
    }

    /// Rendered string accessor (never fails; uses the display form).
    pub fn string_arg(&self, index: usize) -> String {
        self.arg(index).to_string()
    }
}

/// One script run's mutable world.
pub struct Runtime {
    pub scopes: Scopes,
    pub ops: Operators,

    /// Unwinds the nearest enclosing loop or call frame.
    pub break_request: bool,

    /// Propagates all the way out to the host loop.
    pub exit_request: bool,

    /// Secondary, non-fatal status channel (HTTP-like ranges); read back
    /// through the `@error` macro.
    pub status: u16,

    return_slot: Option<Value>,
}

impl Runtime {
    /// Build a runtime with the standard operators loaded and the builtin
    /// commands registered at root scope.
    pub fn new() -> Self {
        info!("Initializing runtime");

        let mut rt = Self {
            scopes: Scopes::new(),
            ops: Operators::load_standard(),
            break_request: false,
            exit_request: false,
            status: 200,
            return_slot: None,
        };

        rt.register_builtins();
        rt
    }

    pub fn root(&self) -> ScopeId {
        self.scopes.root()
    }

    /// Whether a `return` is in flight.  Distinguishes a RETURN unwinding
    /// through a loop (which must keep unwinding to the call frame) from a
    /// plain BREAK (which the loop absorbs).
    pub fn returning(&self) -> bool {
        self.return_slot.is_some()
    }

    fn register_builtins(&mut self) {
        let root = self.scopes.root();

        let builtins = [
            (
                "print",
                NativeCommand {
                    arity: Arity::Unbounded,
                    pre_eval: true,
                    native: native_print,
                },
            ),
            (
                "len",
                NativeCommand {
                    arity: Arity::Exact(1),
                    pre_eval: true,
                    native: native_len,
                },
            ),
            (
                "abs",
                NativeCommand {
                    arity: Arity::Exact(1),
                    pre_eval: true,
                    native: native_abs,
                },
            ),
            (
                "str",
                NativeCommand {
                    arity: Arity::Exact(1),
                    pre_eval: true,
                    native: native_str,
                },
            ),
            (
                "val",
                NativeCommand {
                    arity: Arity::Exact(1),
                    pre_eval: true,
                    native: native_val,
                },
            ),
            (
                "array",
                NativeCommand {
                    arity: Arity::Unbounded,
                    pre_eval: true,
                    native: native_array,
                },
            ),
        ];

        for (name, command) in builtins {
            self.scopes
                .define_command(root, name, command)
                .expect("root scope is never collected");
        }
    }

    /// Evaluate one expression in the given scope.
    pub fn eval_expr(&mut self, scope: ScopeId, text: &str, line: usize) -> Result<Value> {
        Evaluator::new(text, line).evaluate(self, scope)
    }

    // ─────────────────────────── statement flow ─────────────────────────

    /// Execute a statement list, honoring the cooperative signals between
    /// statements.
    pub fn execute(&mut self, scope: ScopeId, nodes: &[Node]) -> Result<()> {
        for node in nodes {
            if self.break_request || self.exit_request {
                break;
            }
            self.execute_node(scope, node)?;
        }
        Ok(())
    }

    fn execute_node(&mut self, scope: ScopeId, node: &Node) -> Result<()> {
        match node {
            Node::Assign { target, expr, line } => {
                let value = self.eval_expr(scope, expr, *line)?;
                self.assign(scope, target, value, *line)
            }

            Node::Const { name, expr, line } => {
                let value = self.eval_expr(scope, expr, *line)?;
                self.scopes.set_constant(scope, name, value)
            }

            Node::Expr { expr, line } => {
                let value = self.eval_expr(scope, expr, *line)?;
                debug!("Expression statement evaluated to {}", value);
                Ok(())
            }

            Node::Print { args, line } => {
                let mut rendered = Vec::with_capacity(args.len());
                for arg in args {
                    rendered.push(self.eval_expr(scope, arg, *line)?.to_string());
                }
                println!("{}", rendered.join(" "));
                Ok(())
            }

            Node::If(block) => block.execute(self, scope),
            Node::While(block) => block.execute(self, scope),
            Node::Do(block) => block.execute(self, scope),
            Node::Select(block) => block.execute(self, scope),

            Node::FunctionDef(def) => self.scopes.define_function(scope, def.clone()),
            Node::ClassDef(def) => self.scopes.define_class(scope, def.clone()),

            Node::Break { .. } => {
                self.break_request = true;
                Ok(())
            }

            Node::Exit { .. } => {
                self.exit_request = true;
                Ok(())
            }

            // RETURN/RAISE route through the commands injected into the
            // current call frame's scope; outside a function they do not
            // exist.
            Node::Return { expr, line } => {
                let Some(command) = self.scopes.lookup_command(scope, "return")? else {
                    return Err(BasicError::OutsideFunction {
                        keyword: "RETURN".to_string(),
                        line: *line,
                    });
                };
                let value = match expr {
                    Some(text) => self.eval_expr(scope, text, *line)?,
                    None => Value::Null,
                };
                self.run_native(&command, "return", vec![value])?;
                Ok(())
            }

            Node::Raise { expr, line } => {
                let Some(command) = self.scopes.lookup_command(scope, "raise")? else {
                    return Err(BasicError::OutsideFunction {
                        keyword: "RAISE".to_string(),
                        line: *line,
                    });
                };
                let value = self.eval_expr(scope, expr, *line)?;
                self.run_native(&command, "raise", vec![value])?;
                Ok(())
            }
        }
    }

    fn assign(
        &mut self,
        scope: ScopeId,
        target: &AssignTarget,
        value: Value,
        line: usize,
    ) -> Result<()> {
        match target {
            AssignTarget::Variable { name } => self.scopes.set_variable(scope, name, value),

            AssignTarget::Element { name, indices } => {
                let mut evals: Vec<Evaluator> = indices
                    .iter()
                    .map(|text| Evaluator::new(text.clone(), line))
                    .collect();
                let resolved = eval_indices(self, scope, &mut evals)?;
                self.scopes.set_array_at(scope, name, &resolved, value)
            }

            AssignTarget::Member { object, field } => {
                match self.scopes.get_variable(scope, object)? {
                    Value::Instance(instance) => self.scopes.set_variable(instance, field, value),
                    other => Err(BasicError::OperatorNotApplicable {
                        op: ".".to_string(),
                        lhs: other.type_name().to_string(),
                        rhs: "member".to_string(),
                        line,
                    }),
                }
            }
        }
    }

    // ───────────────────────────── call paths ───────────────────────────

    /// Dispatch a call by name: native commands first, then user functions,
    /// both looked up local → global from `scope`.
    pub fn call_by_name(
        &mut self,
        scope: ScopeId,
        name: &str,
        args: &mut [Evaluator],
        line: usize,
    ) -> Result<Value> {
        self.call_with(scope, scope, name, args, line)
    }

    /// Method dispatch: the function is looked up (and its frame parented)
    /// in the instance scope, while argument expressions evaluate in the
    /// caller's scope.
    pub fn call_method(
        &mut self,
        instance: ScopeId,
        caller: ScopeId,
        name: &str,
        args: &mut [Evaluator],
        line: usize,
    ) -> Result<Value> {
        self.call_with(instance, caller, name, args, line)
    }

    fn call_with(
        &mut self,
        lookup: ScopeId,
        arg_scope: ScopeId,
        name: &str,
        args: &mut [Evaluator],
        line: usize,
    ) -> Result<Value> {
        debug!("Dispatching call '{}' (line {})", name, line);

        if let Some(command) = self.scopes.lookup_command(lookup, name)? {
            // Arity is asserted before any argument evaluates, so a bad
            // call performs no partial side effects.
            if let Arity::Exact(expected) = command.arity {
                if args.len() != expected {
                    return Err(BasicError::ArgumentCount {
                        name: name.to_string(),
                        expected,
                        got: args.len(),
                    });
                }
            }

            let mut values = Vec::with_capacity(args.len());
            for arg in args.iter_mut() {
                values.push(if command.pre_eval {
                    arg.evaluate(self, arg_scope)?
                } else {
                    Value::Str(arg.source().to_string())
                });
            }

            return self.run_native(&command, name, values);
        }

        let Some(def) = self.scopes.lookup_function(lookup, name)? else {
            return Err(BasicError::UndefinedObject(format!("function '{}'", name)));
        };

        if def.params.len() != args.len() {
            return Err(BasicError::ArgumentCount {
                name: name.to_string(),
                expected: def.params.len(),
                got: args.len(),
            });
        }

        let mut values = Vec::with_capacity(args.len());
        for arg in args.iter_mut() {
            values.push(arg.evaluate(self, arg_scope)?);
        }

        self.call_user(lookup, &def, values)
    }

    fn run_native(&mut self, command: &NativeCommand, name: &str, values: Vec<Value>) -> Result<Value> {
        debug!("Calling native command '{}'", name);

        let mut frame = StackFrame::new(name, values, self.status);
        (command.native)(self, &mut frame)?;
        self.status = frame.status;

        Ok(frame.return_value)
    }

    /// Invoke a user-defined function: fresh child scope, bound parameters,
    /// injected `return`/`raise`, body execution, teardown.
    fn call_user(&mut self, parent: ScopeId, def: &FunctionDef, values: Vec<Value>) -> Result<Value> {
        debug!("Calling function '{}'", def.name);

        let frame_scope = self.scopes.create_sub_context(parent)?;

        for (param, value) in def.params.iter().zip(values) {
            self.scopes.set_variable(frame_scope, param, value)?;
        }
        self.scopes.define_command(frame_scope, "return", RETURN_COMMAND)?;
        self.scopes.define_command(frame_scope, "raise", RAISE_COMMAND)?;

        self.return_slot = None;

        let body = Rc::clone(&def.body);
        let outcome = self.execute(frame_scope, &body);

        // Teardown happens on both paths.
        self.scopes.collect(frame_scope)?;
        outcome?;

        // The call frame honors (and clears) a pending break request.
        if self.break_request {
            self.break_request = false;
        }

        let value = self.return_slot.take().unwrap_or(Value::Null);
        info!("Function '{}' returned {}", def.name, value);

        Ok(value)
    }

    /// Instantiate a class: clone the whole chain, ancestors first, into a
    /// fresh scope parented to the global scope (never the prototype).
    pub fn instantiate(&mut self, scope: ScopeId, class_name: &str) -> Result<Value> {
        debug!("Instantiating class '{}'", class_name);

        let mut chain = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut current = Some(class_name.to_string());

        while let Some(name) = current {
            if !seen.insert(canon(&name)) {
                return Err(BasicError::UndefinedObject(format!(
                    "class '{}' (inheritance cycle)",
                    name
                )));
            }
            let def = self
                .scopes
                .lookup_class(scope, &name)?
                .ok_or_else(|| BasicError::UndefinedObject(format!("class '{}'", name)))?;
            current = def.parent.clone();
            chain.push(def);
        }
        chain.reverse();

        let instance = self.scopes.create_sub_context(self.scopes.root())?;

        for def in &chain {
            for method in &def.methods {
                self.scopes.define_function(instance, method.clone())?;
            }
        }
        for def in &chain {
            let initializers = Rc::clone(&def.initializers);
            self.execute(instance, &initializers)?;
        }

        Ok(Value::Instance(instance))
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────── injected call-frame commands ──────────────────

const RETURN_COMMAND: NativeCommand = NativeCommand {
    arity: Arity::Exact(1),
    pre_eval: true,
    native: native_return,
};

const RAISE_COMMAND: NativeCommand = NativeCommand {
    arity: Arity::Exact(1),
    pre_eval: true,
    native: native_raise,
};

/// `return` — records the value and requests a one-frame unwind.
fn native_return(rt: &mut Runtime, frame: &mut StackFrame) -> Result<()> {
    rt.return_slot = Some(frame.arg(0));
    rt.break_request = true;
    Ok(())
}

/// `raise` — sets the status code without altering control flow.
fn native_raise(_rt: &mut Runtime, frame: &mut StackFrame) -> Result<()> {
    let code = frame.number_arg(0)?;
    if code.fract() != 0.0 || !(0.0..=f64::from(u16::MAX)).contains(&code) {
        return Err(BasicError::ArgumentType {
            name: frame.name.clone(),
            index: 0,
            expected: "a status code between 0 and 65535".to_string(),
        });
    }
    frame.status = code as u16;
    Ok(())
}

// ─────────────────────────────── builtins ────────────────────────────────

fn native_print(_rt: &mut Runtime, frame: &mut StackFrame) -> Result<()> {
    let rendered: Vec<String> = frame.args.iter().map(Value::to_string).collect();
    println!("{}", rendered.join(" "));
    Ok(())
}

fn native_len(_rt: &mut Runtime, frame: &mut StackFrame) -> Result<()> {
    frame.return_value = match frame.arg(0) {
        Value::Str(s) => Value::Number(s.chars().count() as f64),
        Value::Array(items) => Value::Number(items.len() as f64),
        _ => {
            return Err(BasicError::ArgumentType {
                name: frame.name.clone(),
                index: 0,
                expected: "a string or array".to_string(),
            })
        }
    };
    Ok(())
}

fn native_abs(_rt: &mut Runtime, frame: &mut StackFrame) -> Result<()> {
    frame.return_value = Value::Number(frame.number_arg(0)?.abs());
    Ok(())
}

fn native_str(_rt: &mut Runtime, frame: &mut StackFrame) -> Result<()> {
    frame.return_value = Value::Str(frame.string_arg(0));
    Ok(())
}

fn native_val(_rt: &mut Runtime, frame: &mut StackFrame) -> Result<()> {
    frame.return_value = Value::Number(frame.number_arg(0)?);
    Ok(())
}

/// `array(d1, d2, ...)` — allocate a null-filled (possibly nested) array.
/// Arrays never grow implicitly; this is the explicit allocation entry.
fn native_array(_rt: &mut Runtime, frame: &mut StackFrame) -> Result<()> {
    if frame.args.is_empty() {
        return Err(BasicError::ArgumentCount {
            name: frame.name.clone(),
            expected: 1,
            got: 0,
        });
    }

    let mut dims = Vec::with_capacity(frame.args.len());
    for index in 0..frame.args.len() {
        let n = frame.number_arg(index)?;
        if n.fract() != 0.0 || n < 0.0 {
            return Err(BasicError::ArgumentType {
                name: frame.name.clone(),
                index,
                expected: "a non-negative integer".to_string(),
            });
        }
        dims.push(n as usize);
    }

    fn build(dims: &[usize]) -> Value {
        match dims {
            [] => Value::Null,
            [first, rest @ ..] => Value::Array(vec![build(rest); *first]),
        }
    }

    frame.return_value = build(&dims);
    Ok(())
}
