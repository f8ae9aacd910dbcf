// SPDX-License-Identifier: Apache-2.0 OR MIT
//! The default global function set: the handful of functions Go's
//! `text/template` itself registers (`text/template/funcs.go`'s
//! `builtinFuncs`), minus the ones out of scope here — no `printf`/`print`
//! family beyond plain `print`/`println`, no `slice`, and none of the
//! HTML/URL/JS escaping helpers `html/template` layers on top.

use std::cmp::Ordering;

use crate::error::Error;
use crate::runtime::{FunctionRegistry, FunctionRegistryBuilder};
use crate::value::{Arity, Value};

/// Builds the default registry: `and`, `or` are handled specially by the
/// evaluator for lazy short-circuiting and are not registered here, so a
/// lookup of either name without this registry's evaluator-level
/// interception would not resolve.
pub fn default_functions() -> FunctionRegistry {
    let mut builder = FunctionRegistry::builder();
    register_all(&mut builder);
    builder.build()
}

/// Registers the builtin set onto an existing builder, so callers can layer
/// their own helpers on top without losing the defaults.
pub fn register_all(builder: &mut FunctionRegistryBuilder) {
    builder
        .register("not", Arity::Fixed(1), |args| Ok(Value::Bool(!args[0].truthy())))
        .register("len", Arity::Fixed(1), |args| {
            args[0].length().map(|n| Value::Num(crate::value::Number::I64(n as i64)))
        })
        .register("index", Arity::Variadic(1), index)
        .register("call", Arity::Variadic(1), call)
        .register("print", Arity::Variadic(0), |args| Ok(Value::str(sprint(args))))
        .register("println", Arity::Variadic(0), |args| {
            Ok(Value::str(format!("{}\n", sprintln_join(args))))
        })
        .register("eq", Arity::Variadic(1), eq_chain)
        .register("ne", Arity::Fixed(2), |args| Ok(Value::Bool(!args[0].equals(&args[1]))))
        .register("lt", Arity::Fixed(2), |args| order(args, |o| o == Ordering::Less))
        .register("le", Arity::Fixed(2), |args| {
            order(args, |o| o != Ordering::Greater)
        })
        .register("gt", Arity::Fixed(2), |args| order(args, |o| o == Ordering::Greater))
        .register("ge", Arity::Fixed(2), |args| order(args, |o| o != Ordering::Less));
}

/// `index v k1 k2 ...`: successive single-step indexing, Go's variadic
/// generalisation of `v[k1][k2]...`.
fn index(args: &[Value]) -> Result<Value, Error> {
    let mut current = args[0].clone();
    for key in &args[1..] {
        current = current.index(key)?;
    }
    Ok(current)
}

/// `call fn arg1 arg2 ...`: invokes a first-class callable value with the
/// remaining arguments.
fn call(args: &[Value]) -> Result<Value, Error> {
    args[0].invoke(&args[1..])
}

/// `fmt.Sprint`'s operand-joining rule: a space is inserted between two
/// consecutive operands only when neither is a string, so `print 1 2`
/// renders `"1 2"` but `print 1 "a"` renders `"1a"`.
fn sprint(args: &[Value]) -> String {
    let mut out = String::new();
    for (idx, arg) in args.iter().enumerate() {
        if idx > 0 && !matches!(args[idx - 1], Value::Str(_)) && !matches!(arg, Value::Str(_)) {
            out.push(' ');
        }
        out.push_str(&arg.stringify());
    }
    out
}

/// `fmt.Sprintln`'s rule: always a space between operands.
fn sprintln_join(args: &[Value]) -> String {
    let rendered: Vec<String> = args.iter().map(Value::stringify).collect();
    rendered.join(" ")
}

/// `eq arg1 arg2 arg3 ...`: `arg1 == arg2 || arg1 == arg3 || ...`, matching
/// Go's variadic `eq` (the first operand is compared against every other).
fn eq_chain(args: &[Value]) -> Result<Value, Error> {
    if args.len() < 2 {
        return Err(Error::render("eq requires at least two arguments", None));
    }
    let first = &args[0];
    Ok(Value::Bool(args[1..].iter().any(|other| first.equals(other))))
}

fn order(args: &[Value], predicate: impl Fn(Ordering) -> bool) -> Result<Value, Error> {
    let ordering = args[0].compare(&args[1])?;
    Ok(Value::Bool(predicate(ordering)))
}
