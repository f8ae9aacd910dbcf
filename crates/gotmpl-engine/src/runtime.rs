// SPDX-License-Identifier: Apache-2.0 OR MIT
//! The evaluator: pipeline/expression evaluation, the variable stack, and
//! the function registry pipelines resolve their leading command against.
//!
//! Block-level control flow (`If`/`Range`/`With`/`TemplateCall` execution,
//! and the `Signal` that lets `break`/`continue` unwind to the nearest
//! enclosing `range`) lives in `lib.rs`, which owns the common table that
//! `TemplateCall` needs. This module only knows how to turn a `Pipeline`/
//! `Expression` into a `Value` against the current `.`/`$`/variable stack.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{BindingKind, Command, Expression, Pipeline};
use crate::error::Error;
use crate::value::{parse_number_literal, Arity, CharValue, NativeFn, Value};

/// Registry mapping helper names to callables, shared read-only by every
/// evaluation context spawned from the same `Template`.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    map: Rc<HashMap<String, NativeFn>>,
}

impl FunctionRegistry {
    /// Creates an empty registry.
    pub fn empty() -> Self {
        Self {
            map: Rc::new(HashMap::new()),
        }
    }

    /// Returns a new builder for constructing registries.
    pub fn builder() -> FunctionRegistryBuilder {
        FunctionRegistryBuilder::new()
    }

    /// Builds a registry from a previously configured builder.
    pub fn from_builder(builder: FunctionRegistryBuilder) -> Self {
        builder.build()
    }

    /// Fetches a helper function by name.
    pub fn get(&self, name: &str) -> Option<NativeFn> {
        self.map.get(name).cloned()
    }

    /// Reports whether the registry contains no helper functions.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns a sorted list of the registered function names.
    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.map.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Helper for constructing registries before freezing them into an
/// immutable map (mirrors the `RecordBuilder` idiom in `value.rs`).
#[derive(Default)]
pub struct FunctionRegistryBuilder {
    map: HashMap<String, NativeFn>,
}

impl FunctionRegistryBuilder {
    /// Creates a new, empty builder.
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Registers a helper function under the provided name and arity.
    pub fn register<F>(&mut self, name: impl Into<String>, arity: Arity, func: F) -> &mut Self
    where
        F: Fn(&[Value]) -> Result<Value, Error> + 'static,
    {
        let name = name.into();
        self.map.insert(name.clone(), NativeFn::new(name, arity, func));
        self
    }

    /// Extends the builder with all helpers from another registry.
    pub fn extend(&mut self, other: &FunctionRegistry) -> &mut Self {
        for (key, value) in other.map.iter() {
            self.map.insert(key.clone(), value.clone());
        }
        self
    }

    /// Finalises the builder into an immutable registry.
    pub fn build(self) -> FunctionRegistry {
        FunctionRegistry {
            map: Rc::new(self.map),
        }
    }
}

/// Evaluation context threaded through a single `execute` call. Not
/// `Send`/`Sync`: concurrent reuse of one context is explicitly out of
/// scope (each concurrent render gets its own `EvalContext`).
pub struct EvalContext {
    dot: Value,
    root: Value,
    /// Flat LIFO `(name, value)` stack. `mark`/`pop_to` bound the lifetime
    /// of bindings introduced inside an `If`/`With`/`Range` body; `$` and
    /// `.` are tracked separately and never pushed here, so the stack is
    /// empty again once `execute` returns.
    stack: Vec<(String, Value)>,
    functions: FunctionRegistry,
}

impl EvalContext {
    /// Creates a new evaluation context with `.` and `$` both seeded from
    /// `data`, and an empty variable stack.
    pub fn new(data: Value, functions: FunctionRegistry) -> Self {
        Self {
            dot: data.clone(),
            root: data,
            stack: Vec::new(),
            functions,
        }
    }

    /// The current `.`.
    pub fn dot(&self) -> Value {
        self.dot.clone()
    }

    /// Sets `.` to `value`, returning the previous value so callers can
    /// restore it once their scoped body finishes.
    pub fn set_dot(&mut self, value: Value) -> Value {
        std::mem::replace(&mut self.dot, value)
    }

    /// Current stack depth, to be handed back to `pop_to` later.
    pub fn mark(&self) -> usize {
        self.stack.len()
    }

    /// Truncates the variable stack back to `mark`.
    pub fn pop_to(&mut self, mark: usize) {
        self.stack.truncate(mark);
    }

    /// Looks up a helper function by name.
    pub fn function(&self, name: &str) -> Option<NativeFn> {
        self.functions.get(name)
    }

    /// Evaluates a pipeline and returns the resulting value. Declarations
    /// are not applied here — callers bind the result with `apply_bindings`
    /// (plain pipelines) or `assign_range_bindings` (`range`'s key/value
    /// form) once they know which rule applies.
    pub fn eval_pipeline(&mut self, pipeline: &Pipeline) -> Result<Value, Error> {
        let mut iter = pipeline.commands.iter();
        let first = iter
            .next()
            .ok_or_else(|| Error::render("empty pipeline", None))?;
        let mut value = self.eval_command(first, None)?;

        for command in iter {
            value = self.eval_command(command, Some(value))?;
        }

        Ok(value)
    }

    fn eval_command(&mut self, command: &Command, input: Option<Value>) -> Result<Value, Error> {
        if let Expression::Identifier(name) = &command.target {
            if name == "and" || name == "or" {
                return self.eval_and_or(name == "and", &command.args, input);
            }
        }

        match self.resolve_command_target(command)? {
            CommandResolution::Function(func) => {
                let mut args =
                    Vec::with_capacity(command.args.len() + usize::from(input.is_some()));
                for expr in &command.args {
                    args.push(self.eval_expression(expr)?);
                }
                if let Some(prev) = input {
                    args.push(prev);
                }
                func.invoke(&args)
            }
            CommandResolution::Value(target) => {
                if target.is_callable() {
                    let mut args =
                        Vec::with_capacity(command.args.len() + usize::from(input.is_some()));
                    for expr in &command.args {
                        args.push(self.eval_expression(expr)?);
                    }
                    if let Some(prev) = input {
                        args.push(prev);
                    }
                    target.invoke(&args)
                } else {
                    if !command.args.is_empty() {
                        return Err(Error::render(
                            "arguments supplied to non-function expression",
                            None,
                        ));
                    }
                    if input.is_some() {
                        return Err(Error::render(
                            "cannot pipe value into non-function expression",
                            None,
                        ));
                    }
                    Ok(target)
                }
            }
        }
    }

    /// `and`/`or` short-circuit their arguments left to right instead of
    /// evaluating every argument eagerly like an ordinary function call.
    fn eval_and_or(
        &mut self,
        is_and: bool,
        args: &[Expression],
        input: Option<Value>,
    ) -> Result<Value, Error> {
        if args.is_empty() && input.is_none() {
            let name = if is_and { "and" } else { "or" };
            return Err(Error::render(
                format!("{name} requires at least one argument"),
                None,
            ));
        }

        let mut last = Value::Absent;
        for expr in args {
            let value = self.eval_expression(expr)?;
            if value.truthy() == is_and {
                last = value;
            } else {
                return Ok(value);
            }
        }
        if let Some(value) = input {
            if value.truthy() != is_and {
                return Ok(value);
            }
            last = value;
        }
        Ok(last)
    }

    /// A command's callee resolves through the function registry only when
    /// it is a bare identifier that the registry recognises; every other
    /// target (a record method, a `$var` holding a callable, a parenthesized
    /// pipeline result, ...) is evaluated to a plain `Value` and the caller
    /// decides whether to invoke it based on `Value::is_callable`.
    fn resolve_command_target(&mut self, command: &Command) -> Result<CommandResolution, Error> {
        if let Expression::Identifier(name) = &command.target {
            if let Some(func) = self.functions.get(name) {
                return Ok(CommandResolution::Function(func));
            }
        }
        self.eval_expression(&command.target).map(CommandResolution::Value)
    }

    fn eval_expression(&mut self, expr: &Expression) -> Result<Value, Error> {
        match expr {
            Expression::Identifier(name) => match self.functions.get(name) {
                Some(func) => func.invoke(&[]),
                None => Ok(Value::Absent),
            },
            Expression::Field(parts) => {
                let root = self.dot.clone();
                self.resolve_field_chain(root, parts)
            }
            Expression::Variable(name) => self.get_var(name)?.resolve_delegate(),
            Expression::VariableField(name, parts) => {
                let root = self.get_var(name)?;
                self.resolve_field_chain(root, parts)
            }
            Expression::PipelineExpr(pipeline) => {
                if pipeline.declarations.is_some() {
                    return Err(Error::render(
                        "pipeline declarations not allowed in expression",
                        None,
                    ));
                }
                self.eval_pipeline(pipeline)
            }
            Expression::PipelineField(pipeline, parts) => {
                if pipeline.declarations.is_some() {
                    return Err(Error::render(
                        "pipeline declarations not allowed in expression",
                        None,
                    ));
                }
                let root = self.eval_pipeline(pipeline)?;
                self.resolve_field_chain(root, parts)
            }
            Expression::StringLiteral(value) => Ok(Value::str(value.clone())),
            Expression::CharLiteral(ch) => Ok(Value::Char(CharValue::from_char(*ch))),
            Expression::NumberLiteral(text) => parse_number_literal(text)
                .map(Value::Num)
                .ok_or_else(|| Error::render(format!("invalid number literal {text}"), None)),
            Expression::BoolLiteral(flag) => Ok(Value::Bool(*flag)),
            Expression::Nil => Ok(Value::Absent),
        }
    }

    /// Walks a dotted field chain from `root`, auto-invoking zero-argument
    /// callables (record methods and bare callable values alike) at every
    /// hop, including the chain's starting point.
    fn resolve_field_chain(&self, root: Value, parts: &[String]) -> Result<Value, Error> {
        let mut current = root.resolve_delegate()?;
        for part in parts {
            current = current.member(part)?.resolve_delegate()?;
        }
        Ok(current)
    }

    /// Variable lookup: `""` (the stripped form of `$`) is special-cased to
    /// the root value; everything else scans the stack from the top.
    fn get_var(&self, name: &str) -> Result<Value, Error> {
        let key = name.trim_start_matches('$');
        if key.is_empty() {
            return Ok(self.root.clone());
        }
        self.stack
            .iter()
            .rev()
            .find(|(n, _)| n == key)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| Error::render(format!("undefined variable \"${key}\""), None))
    }

    fn declare_var(&mut self, name: &str, value: Value) {
        let key = name.trim_start_matches('$').to_string();
        self.stack.push((key, value));
    }

    fn set_var(&mut self, name: &str, value: Value) -> Result<(), Error> {
        let key = name.trim_start_matches('$');
        if key.is_empty() {
            return Err(Error::render("cannot assign to $", None));
        }
        for (n, v) in self.stack.iter_mut().rev() {
            if n == key {
                *v = value;
                return Ok(());
            }
        }
        Err(Error::render(format!("undefined variable \"${key}\""), None))
    }

    fn bind(&mut self, kind: BindingKind, name: &str, value: Value) -> Result<(), Error> {
        match kind {
            BindingKind::Declare => {
                self.declare_var(name, value);
                Ok(())
            }
            BindingKind::Assign => self.set_var(name, value),
        }
    }

    /// Applies a plain pipeline's declarations (`{{$x := pipeline}}`,
    /// `{{if $x := pipeline}}`, ...): the whole result is bound to each
    /// declared name, or distributed across a sequence if several names are
    /// declared from a sequence result.
    pub fn apply_bindings(&mut self, pipeline: &Pipeline, value: &Value) -> Result<(), Error> {
        let Some(decls) = &pipeline.declarations else {
            return Ok(());
        };
        if decls.variables.is_empty() {
            return Ok(());
        }

        if decls.variables.len() == 1 {
            return self.bind(decls.kind, &decls.variables[0], value.clone());
        }

        if let Value::Seq(items) = value {
            for (idx, name) in decls.variables.iter().enumerate() {
                let assigned = items.get(idx).cloned().unwrap_or(Value::Absent);
                self.bind(decls.kind, name, assigned)?;
            }
        } else {
            for name in &decls.variables {
                self.bind(decls.kind, name, value.clone())?;
            }
        }
        Ok(())
    }

    /// `range`'s key/value binding rule: two declared names bind to
    /// `(key, value)`, one binds to `value` alone, zero is a no-op.
    pub fn assign_range_bindings(
        &mut self,
        pipeline: &Pipeline,
        key: Option<Value>,
        value: Value,
    ) -> Result<(), Error> {
        let Some(decls) = &pipeline.declarations else {
            return Ok(());
        };

        match decls.variables.len() {
            0 => {}
            1 => self.bind(decls.kind, &decls.variables[0], value)?,
            _ => {
                self.bind(decls.kind, &decls.variables[0], key.unwrap_or(Value::Absent))?;
                if let Some(second) = decls.variables.get(1) {
                    self.bind(decls.kind, second, value)?;
                }
            }
        }
        Ok(())
    }
}

enum CommandResolution {
    Function(NativeFn),
    Value(Value),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expression, PipelineDeclarations};
    use crate::value::Number;

    fn registry_with_echo() -> FunctionRegistry {
        let mut builder = FunctionRegistry::builder();
        builder.register("echo", Arity::Variadic(0), |args| {
            Ok(args.last().cloned().unwrap_or(Value::Absent))
        });
        FunctionRegistry::from_builder(builder)
    }

    #[test]
    fn eval_pipeline_threads_piped_value_through_functions() {
        let registry = registry_with_echo();
        let mut ctx = EvalContext::new(Value::Absent, registry);
        let pipeline = Pipeline::new(
            None,
            vec![
                Command::new(Expression::StringLiteral("hi".into()), vec![]),
                Command::new(Expression::Identifier("echo".into()), vec![]),
            ],
        );
        let value = ctx.eval_pipeline(&pipeline).unwrap();
        assert_eq!(value.stringify(), "hi");
    }

    #[test]
    fn unknown_bare_identifier_evaluates_to_absent() {
        let mut ctx = EvalContext::new(Value::Absent, FunctionRegistry::empty());
        let pipeline = Pipeline::new(
            None,
            vec![Command::new(Expression::Identifier("nope".into()), vec![])],
        );
        let value = ctx.eval_pipeline(&pipeline).unwrap();
        assert!(value.is_absent());
    }

    #[test]
    fn unknown_identifier_with_arguments_still_errors() {
        let mut ctx = EvalContext::new(Value::Absent, FunctionRegistry::empty());
        let pipeline = Pipeline::new(
            None,
            vec![Command::new(
                Expression::Identifier("nope".into()),
                vec![Expression::BoolLiteral(true)],
            )],
        );
        let err = ctx.eval_pipeline(&pipeline).unwrap_err();
        assert!(err.to_string().contains("non-function expression"));
    }

    #[test]
    fn command_target_that_is_a_callable_value_is_invoked() {
        let mut ctx = EvalContext::new(Value::Absent, FunctionRegistry::empty());
        let mark = ctx.mark();
        let mut builder = FunctionRegistry::builder();
        builder.register("double", Arity::Fixed(1), |args| match &args[0] {
            Value::Num(Number::I32(v)) => Ok(Value::Num(Number::I32(v * 2))),
            _ => Err(Error::render("double expects an int", None)),
        });
        let double = FunctionRegistry::from_builder(builder).get("double").unwrap();
        ctx.declare_var("$fn", Value::Callable(double));
        let pipeline = Pipeline::new(
            None,
            vec![Command::new(
                Expression::Variable("$fn".into()),
                vec![Expression::NumberLiteral("21".into())],
            )],
        );
        let value = ctx.eval_pipeline(&pipeline).unwrap();
        assert_eq!(value.stringify(), "42");
        ctx.pop_to(mark);
    }

    #[test]
    fn and_short_circuits_without_evaluating_later_args() {
        let mut ctx = EvalContext::new(Value::Absent, FunctionRegistry::empty());
        let pipeline = Pipeline::new(
            None,
            vec![Command::new(
                Expression::Identifier("and".into()),
                vec![
                    Expression::BoolLiteral(false),
                    Expression::Identifier("boom".into()),
                ],
            )],
        );
        let value = ctx.eval_pipeline(&pipeline).unwrap();
        assert!(!value.truthy());
    }

    #[test]
    fn or_returns_first_truthy_argument() {
        let mut ctx = EvalContext::new(Value::Absent, FunctionRegistry::empty());
        let pipeline = Pipeline::new(
            None,
            vec![Command::new(
                Expression::Identifier("or".into()),
                vec![
                    Expression::Nil,
                    Expression::StringLiteral("first".into()),
                    Expression::StringLiteral("second".into()),
                ],
            )],
        );
        let value = ctx.eval_pipeline(&pipeline).unwrap();
        assert_eq!(value.stringify(), "first");
    }

    #[test]
    fn field_chain_resolves_against_dot() {
        let data = Value::map(vec![(Value::str("name"), Value::str("lithos"))]);
        let mut ctx = EvalContext::new(data, FunctionRegistry::empty());
        let value = ctx
            .eval_expression(&Expression::Field(vec!["name".to_string()]))
            .unwrap();
        assert_eq!(value.stringify(), "lithos");
    }

    #[test]
    fn declare_then_lookup_variable() {
        let mut ctx = EvalContext::new(Value::Absent, FunctionRegistry::empty());
        let mark = ctx.mark();
        ctx.declare_var("$x", Value::Num(Number::I32(7)));
        assert_eq!(ctx.get_var("$x").unwrap().stringify(), "7");
        ctx.pop_to(mark);
        assert!(ctx.get_var("$x").is_err());
    }

    #[test]
    fn assign_requires_existing_variable() {
        let mut ctx = EvalContext::new(Value::Absent, FunctionRegistry::empty());
        let err = ctx.set_var("$missing", Value::Absent).unwrap_err();
        assert!(err.to_string().contains("undefined variable"));
    }

    #[test]
    fn dollar_always_resolves_to_root_even_inside_scopes() {
        let root = Value::str("root-value");
        let mut ctx = EvalContext::new(root, FunctionRegistry::empty());
        ctx.set_dot(Value::str("shadowed"));
        assert_eq!(ctx.get_var("$").unwrap().stringify(), "root-value");
    }

    #[test]
    fn apply_bindings_distributes_sequence_across_multiple_names() {
        let mut ctx = EvalContext::new(Value::Absent, FunctionRegistry::empty());
        let pipeline = Pipeline::new(
            Some(PipelineDeclarations::new(
                BindingKind::Declare,
                vec!["$a".to_string(), "$b".to_string()],
            )),
            vec![Command::new(Expression::Nil, vec![])],
        );
        let seq = Value::seq(vec![Value::Num(Number::I32(1)), Value::Num(Number::I32(2))]);
        ctx.apply_bindings(&pipeline, &seq).unwrap();
        assert_eq!(ctx.get_var("$a").unwrap().stringify(), "1");
        assert_eq!(ctx.get_var("$b").unwrap().stringify(), "2");
    }
}
