// SPDX-License-Identifier: Apache-2.0 OR MIT
use gotmpl_core::{builtins::register_all, to_engine_value, Arity, FunctionRegistry, Template, Value};
use serde_json::json;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Start from the stock builtin set.
    let mut builder = FunctionRegistry::builder();
    register_all(&mut builder);

    // Register a simple custom helper.
    builder.register("shout", Arity::Fixed(1), |args| {
        Ok(Value::str(format!("{}!", args[0].stringify().to_uppercase())))
    });

    let registry = builder.build();
    let template = Template::parse_with_functions("custom", "{{shout .phrase}}", registry)?;
    let output = template.render(to_engine_value(&json!({"phrase": "hello core"})))?;

    println!("{}", output);
    assert_eq!(output, "HELLO CORE!");
    Ok(())
}
