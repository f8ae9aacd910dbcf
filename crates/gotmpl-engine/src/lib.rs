#![forbid(unsafe_code)]
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! A Go-`text/template`-compatible text template engine: lexer, parser, AST,
//! and a tree-walking evaluator over a dynamically typed `Value`.
//!
//! A `Template` owns a "common table" of every template its source declared
//! via `define`/`block`, so `{{template "name"}}` can call across them.
//! Rendering is a synchronous, single-threaded depth-first walk; there is
//! no suspension, cancellation, or streaming output — see `EvalContext` in
//! `runtime` for the single-evaluation-per-context rule this implies.

pub mod ast;
pub mod builtins;
mod error;
pub mod lexer;
mod parser;
mod runtime;
pub mod value;

pub use ast::{
    ActionNode, Ast, BindingKind, Block, Command, CommentNode, ElseIfBranch, Expression, IfNode,
    Node, Pipeline, PipelineDeclarations, RangeNode, Span, TemplateCallNode, TextNode, WithNode,
};
pub use error::Error;
pub use lexer::{Keyword, Operator, Token, TokenKind};
pub use parser::ParsedTemplates;
pub use runtime::{EvalContext, FunctionRegistry, FunctionRegistryBuilder};
pub use value::{Arity, CharValue, CharWidth, NativeFn, Number, Record, RecordBuilder, Value};

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Whether a block finished normally or is unwinding a `break`/`continue`
/// toward the nearest enclosing `range`. `If`/`With` pass a non-normal
/// signal straight through; only `Range` consumes one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Normal,
    Break,
    Continue,
}

/// A parsed template and the common table of named templates (`define`/
/// `block`) it and any source merged into it via `parse_associated`
/// declared. Immutable after parse; cheap to clone (the AST table and
/// function registry are reference-counted).
#[derive(Clone)]
pub struct Template {
    name: String,
    source: String,
    ast: Ast,
    functions: FunctionRegistry,
    templates: Rc<HashMap<String, Ast>>,
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("associated", &self.templates.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Template {
    /// Parses template source into a `Template` with Go's builtin function
    /// set (`and`/`or`/`not`/`eq`/... — see `builtins`) already registered,
    /// matching `text/template.New(name).Parse(source)`.
    pub fn parse_str(name: &str, source: &str) -> Result<Self, Error> {
        Self::parse_with_functions(name, source, crate::builtins::default_functions())
    }

    /// Parses template source and associates it with a registry of helper
    /// functions.
    pub fn parse_with_functions(
        name: &str,
        source: &str,
        functions: FunctionRegistry,
    ) -> Result<Self, Error> {
        Self::parse_with_delims(name, source, "{{", "}}", functions)
    }

    /// Parses template source using caller-chosen action delimiters instead
    /// of the default `{{`/`}}` (Go's `Template.Delims`).
    pub fn parse_with_delims(
        name: &str,
        source: &str,
        left: &str,
        right: &str,
        functions: FunctionRegistry,
    ) -> Result<Self, Error> {
        let parsed = parser::parse_template_with_delims(name, source, left, right)?;
        let mut templates = HashMap::new();
        for defined in parsed.defined {
            templates.insert(defined.name.clone(), defined);
        }
        templates.insert(parsed.root.name.clone(), parsed.root.clone());

        Ok(Self {
            name: name.to_string(),
            source: source.to_string(),
            ast: parsed.root,
            functions,
            templates: Rc::new(templates),
        })
    }

    /// Parses `source` under `name` and merges the templates it declares
    /// (itself included) into this `Template`'s common table, the way a
    /// second call to Go's `template.ParseFiles`/`New(...).Parse` extends an
    /// existing `*Template`. Does not change which template `render`
    /// executes; use `get_sub` to fetch and render the newly added one.
    pub fn parse_associated(&mut self, name: &str, source: &str) -> Result<(), Error> {
        let parsed = parser::parse_template(name, source)?;
        let mut templates = (*self.templates).clone();
        for defined in parsed.defined {
            templates.insert(defined.name.clone(), defined);
        }
        templates.insert(parsed.root.name.clone(), parsed.root);
        self.templates = Rc::new(templates);
        Ok(())
    }

    /// Returns a clone of the function registry in use.
    pub fn functions(&self) -> FunctionRegistry {
        self.functions.clone()
    }

    /// Replaces the function registry associated with this template.
    pub fn set_functions(&mut self, functions: FunctionRegistry) {
        self.functions = functions;
    }

    /// Consumes the template and returns a new instance with the provided
    /// function registry.
    pub fn with_functions(mut self, functions: FunctionRegistry) -> Self {
        self.functions = functions;
        self
    }

    /// Returns the original template name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the original template source, when this `Template` is the
    /// one `parse_with_functions` produced directly (sub-templates fetched
    /// with `get_sub` don't retain a separate source slice).
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns a reference to the parsed AST this template executes.
    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    /// Names of every template registered in the common table, including
    /// this one.
    pub fn associated_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.templates.keys().cloned().collect();
        names.sort();
        names
    }

    /// Looks up a named template from the common table, returning a
    /// `Template` that shares this one's function registry and table but
    /// executes the named definition when rendered.
    pub fn get_sub(&self, name: &str) -> Option<Template> {
        let ast = self.templates.get(name)?;
        Some(Template {
            name: ast.name.clone(),
            source: String::new(),
            ast: ast.clone(),
            functions: self.functions.clone(),
            templates: self.templates.clone(),
        })
    }

    /// Returns a canonical string representation of the parsed template,
    /// similar to Go's `parse.Tree.Root.String()`.
    pub fn to_template_string(&self) -> String {
        let mut out = String::new();
        Self::write_block(&mut out, &self.ast.root);
        out
    }

    fn write_block(out: &mut String, block: &Block) {
        for node in &block.nodes {
            match node {
                Node::Text(text) => out.push_str(&text.text),
                Node::Comment(comment) => out.push_str(&comment.to_template_fragment()),
                Node::Action(action) => out.push_str(&action.to_template_fragment()),
                Node::Break(_) => out.push_str("{{break}}"),
                Node::Continue(_) => out.push_str("{{continue}}"),
                Node::TemplateCall(call) => {
                    out.push_str("{{template ");
                    out.push('"');
                    out.push_str(&call.name);
                    out.push('"');
                    if let Some(pipeline) = &call.pipeline {
                        out.push(' ');
                        out.push_str(&pipeline_to_string(pipeline));
                    }
                    out.push_str("}}");
                }
                Node::If(if_node) => {
                    out.push_str("{{if ");
                    out.push_str(&pipeline_to_string(&if_node.pipeline));
                    out.push_str("}}");
                    Self::write_block(out, &if_node.then_block);
                    for branch in &if_node.else_if_branches {
                        out.push_str("{{else if ");
                        out.push_str(&pipeline_to_string(&branch.pipeline));
                        out.push_str("}}");
                        Self::write_block(out, &branch.block);
                    }
                    if let Some(else_block) = &if_node.else_block {
                        out.push_str("{{else}}");
                        Self::write_block(out, else_block);
                    }
                    out.push_str("{{end}}");
                }
                Node::Range(range_node) => {
                    out.push_str("{{range ");
                    out.push_str(&pipeline_to_string(&range_node.pipeline));
                    out.push_str("}}");
                    Self::write_block(out, &range_node.then_block);
                    if let Some(else_block) = &range_node.else_block {
                        out.push_str("{{else}}");
                        Self::write_block(out, else_block);
                    }
                    out.push_str("{{end}}");
                }
                Node::With(with_node) => {
                    out.push_str("{{with ");
                    out.push_str(&pipeline_to_string(&with_node.pipeline));
                    out.push_str("}}");
                    Self::write_block(out, &with_node.then_block);
                    if let Some(else_block) = &with_node.else_block {
                        out.push_str("{{else}}");
                        Self::write_block(out, else_block);
                    }
                    out.push_str("{{end}}");
                }
            }
        }
    }

    /// Renders the template against `data`, returning the accumulated
    /// output text.
    pub fn render(&self, data: Value) -> Result<String, Error> {
        let mut ctx = EvalContext::new(data, self.functions.clone());
        let mut output = String::new();
        self.render_block(&mut ctx, &self.ast.root, &mut output)?;
        Ok(output)
    }

    fn render_block(
        &self,
        ctx: &mut EvalContext,
        block: &Block,
        out: &mut String,
    ) -> Result<Signal, Error> {
        for node in &block.nodes {
            let signal = match node {
                Node::Text(text) => {
                    out.push_str(&text.text);
                    Signal::Normal
                }
                Node::Comment(_) => Signal::Normal,
                Node::Action(action) => self.render_action(ctx, action, out)?,
                Node::If(if_node) => self.render_if(ctx, if_node, out)?,
                Node::Range(range_node) => self.render_range(ctx, range_node, out)?,
                Node::With(with_node) => self.render_with(ctx, with_node, out)?,
                Node::TemplateCall(call) => self.render_template_call(ctx, call, out)?,
                Node::Break(_) => Signal::Break,
                Node::Continue(_) => Signal::Continue,
            };
            if signal != Signal::Normal {
                return Ok(signal);
            }
        }
        Ok(Signal::Normal)
    }

    fn render_action(
        &self,
        ctx: &mut EvalContext,
        action: &ActionNode,
        out: &mut String,
    ) -> Result<Signal, Error> {
        let value = ctx.eval_pipeline(&action.pipeline)?;
        ctx.apply_bindings(&action.pipeline, &value)?;
        if action.pipeline.declarations.is_none() {
            out.push_str(&value.stringify());
        }
        Ok(Signal::Normal)
    }

    fn render_if(&self, ctx: &mut EvalContext, node: &IfNode, out: &mut String) -> Result<Signal, Error> {
        let mark = ctx.mark();
        let value = ctx.eval_pipeline(&node.pipeline)?;
        ctx.apply_bindings(&node.pipeline, &value)?;

        let signal = if value.truthy() {
            self.render_block(ctx, &node.then_block, out)?
        } else {
            let mut matched = None;
            for branch in &node.else_if_branches {
                let branch_value = ctx.eval_pipeline(&branch.pipeline)?;
                ctx.apply_bindings(&branch.pipeline, &branch_value)?;
                if branch_value.truthy() {
                    matched = Some(self.render_block(ctx, &branch.block, out)?);
                    break;
                }
            }
            match matched {
                Some(signal) => signal,
                None => match &node.else_block {
                    Some(else_block) => self.render_block(ctx, else_block, out)?,
                    None => Signal::Normal,
                },
            }
        };

        ctx.pop_to(mark);
        Ok(signal)
    }

    fn render_range(
        &self,
        ctx: &mut EvalContext,
        node: &RangeNode,
        out: &mut String,
    ) -> Result<Signal, Error> {
        let mark = ctx.mark();
        let value = ctx.eval_pipeline(&node.pipeline)?;
        let saved_dot = ctx.dot();

        let mut signal = Signal::Normal;
        if value.truthy() {
            for (key, item) in value.iterate()? {
                let iter_mark = ctx.mark();
                ctx.assign_range_bindings(&node.pipeline, Some(key), item.clone())?;
                ctx.set_dot(item);
                let body_signal = self.render_block(ctx, &node.then_block, out)?;
                ctx.pop_to(iter_mark);
                if body_signal == Signal::Break {
                    break;
                }
            }
        } else if let Some(else_block) = &node.else_block {
            signal = self.render_block(ctx, else_block, out)?;
        }

        ctx.set_dot(saved_dot);
        ctx.pop_to(mark);
        Ok(signal)
    }

    fn render_with(
        &self,
        ctx: &mut EvalContext,
        node: &WithNode,
        out: &mut String,
    ) -> Result<Signal, Error> {
        let mark = ctx.mark();
        let value = ctx.eval_pipeline(&node.pipeline)?;
        ctx.apply_bindings(&node.pipeline, &value)?;

        let signal = if value.truthy() {
            let saved_dot = ctx.set_dot(value);
            let signal = self.render_block(ctx, &node.then_block, out)?;
            ctx.set_dot(saved_dot);
            signal
        } else if let Some(else_block) = &node.else_block {
            self.render_block(ctx, else_block, out)?
        } else {
            Signal::Normal
        };

        ctx.pop_to(mark);
        Ok(signal)
    }

    fn render_template_call(
        &self,
        ctx: &mut EvalContext,
        call: &TemplateCallNode,
        out: &mut String,
    ) -> Result<Signal, Error> {
        let target = self.templates.get(&call.name).ok_or_else(|| {
            Error::render_with_span(format!("template {:?} is not defined", call.name), call.span)
        })?;

        let dot = match &call.pipeline {
            Some(pipeline) => ctx.eval_pipeline(pipeline)?,
            None => Value::Absent,
        };

        let mut callee_ctx = EvalContext::new(dot, self.functions.clone());
        self.render_block(&mut callee_ctx, &target.root, out)?;
        Ok(Signal::Normal)
    }
}

fn pipeline_to_string(pipeline: &Pipeline) -> String {
    let mut out = String::new();
    if let Some(decls) = &pipeline.declarations {
        out.push_str(&decls.variables.join(", "));
        out.push(' ');
        out.push_str(match decls.kind {
            BindingKind::Declare => ":=",
            BindingKind::Assign => "=",
        });
        out.push(' ');
    }

    for (idx, command) in pipeline.commands.iter().enumerate() {
        if idx > 0 {
            out.push_str(" | ");
        }
        out.push_str(&expression_to_string(&command.target));
        for arg in &command.args {
            out.push(' ');
            out.push_str(&expression_to_string(arg));
        }
    }

    out
}

fn expression_to_string(expr: &Expression) -> String {
    match expr {
        Expression::Identifier(name) => name.clone(),
        Expression::Field(parts) => {
            if parts.is_empty() {
                ".".to_string()
            } else {
                format!(".{}", parts.join("."))
            }
        }
        Expression::Variable(name) => name.clone(),
        Expression::VariableField(name, parts) => format!("{name}.{}", parts.join(".")),
        Expression::PipelineExpr(pipeline) => format!("({})", pipeline_to_string(pipeline)),
        Expression::PipelineField(pipeline, parts) => {
            format!("({}).{}", pipeline_to_string(pipeline), parts.join("."))
        }
        Expression::StringLiteral(value) => format!("{value:?}"),
        Expression::CharLiteral(ch) => format!("'{ch}'"),
        Expression::NumberLiteral(value) => value.clone(),
        Expression::BoolLiteral(flag) => flag.to_string(),
        Expression::Nil => "nil".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_with_custom_registry() {
        let mut builder = FunctionRegistry::builder();
        builder.register("greet", Arity::Variadic(0), |args| {
            let name = args
                .first()
                .cloned()
                .unwrap_or_else(|| Value::str("friend"));
            Ok(Value::str(format!("Hello, {}!", name.stringify())))
        });
        let registry = builder.build();

        let tmpl = Template::parse_with_functions("test", "{{greet .name}}", registry).unwrap();
        let data = Value::map(vec![(Value::str("name"), Value::str("Hans"))]);
        let rendered = tmpl.render(data).unwrap();
        assert_eq!(rendered, "Hello, Hans!");
    }

    #[test]
    fn unresolved_identifier_with_arguments_is_error() {
        let tmpl = Template::parse_str("missing", "{{unknown .}} ").unwrap();
        let err = tmpl.render(Value::Num(Number::I32(1))).unwrap_err();
        assert!(err.to_string().contains("non-function expression"));
    }

    #[test]
    fn unresolved_bare_identifier_is_absent_not_error() {
        let tmpl = Template::parse_str("missing", "{{if unknown}}yes{{else}}no{{end}}").unwrap();
        let rendered = tmpl.render(Value::Num(Number::I32(1))).unwrap();
        assert_eq!(rendered, "no");
    }

    #[test]
    fn parse_error_on_unclosed_action() {
        let err = Template::parse_str("bad", "{{ \"d\" }").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert!(err.to_string().contains("unclosed action"));
    }

    #[test]
    fn raw_string_literal_roundtrip() {
        let tmpl = Template::parse_str("raw", "{{ `{{ \"d\" }` }}").unwrap();
        let output = tmpl.render(Value::Absent).unwrap();
        assert_eq!(output, "{{ \"d\" }");
    }

    #[test]
    fn renders_if_else_branches() {
        let tmpl = Template::parse_str("if", "{{if .flag}}yes{{else}}no{{end}}").unwrap();
        let truthy = Value::map(vec![(Value::str("flag"), Value::Bool(true))]);
        let falsy = Value::map(vec![(Value::str("flag"), Value::Bool(false))]);
        assert_eq!(tmpl.render(truthy).unwrap(), "yes");
        assert_eq!(tmpl.render(falsy).unwrap(), "no");
    }

    #[test]
    fn renders_else_if_chain() {
        let tmpl = Template::parse_str(
            "elseif",
            "{{if eq .n 1}}one{{else if eq .n 2}}two{{else}}many{{end}}",
        )
        .unwrap();
        let mut builder = FunctionRegistry::builder();
        builder.register("eq", Arity::Fixed(2), |args| {
            Ok(Value::Bool(args[0].equals(&args[1])))
        });
        let tmpl = tmpl.with_functions(builder.build());

        let one = Value::map(vec![(Value::str("n"), Value::Num(Number::I32(1)))]);
        let two = Value::map(vec![(Value::str("n"), Value::Num(Number::I32(2)))]);
        let three = Value::map(vec![(Value::str("n"), Value::Num(Number::I32(3)))]);
        assert_eq!(tmpl.render(one).unwrap(), "one");
        assert_eq!(tmpl.render(two).unwrap(), "two");
        assert_eq!(tmpl.render(three).unwrap(), "many");
    }

    #[test]
    fn parenthesized_pipeline_method_call_chains_a_trailing_field() {
        let tmpl = Template::parse_str("method-chain", "{{ (.getOther 12).i }}").unwrap();
        let record = Record::builder()
            .method("getOther", Arity::Fixed(1), |args| {
                Ok(Value::Record(Record::builder().field("i", args[0].clone()).build()))
            })
            .build();
        let rendered = tmpl.render(Value::Record(record)).unwrap();
        assert_eq!(rendered, "12");
    }

    #[test]
    fn renders_range_over_sequences() {
        let tmpl =
            Template::parse_str("range", "{{range .items}}{{.}},{{else}}empty{{end}}").unwrap();
        let items = Value::map(vec![(
            Value::str("items"),
            Value::seq(vec![Value::str("a"), Value::str("b")]),
        )]);
        assert_eq!(tmpl.render(items).unwrap(), "a,b,");

        let empty = Value::map(vec![(Value::str("items"), Value::seq(vec![]))]);
        assert_eq!(tmpl.render(empty).unwrap(), "empty");
    }

    #[test]
    fn range_break_stops_the_loop() {
        let tmpl = Template::parse_str(
            "range-break",
            "{{range .items}}{{if eq . \"b\"}}{{break}}{{end}}{{.}}{{end}}",
        )
        .unwrap();
        let mut builder = FunctionRegistry::builder();
        builder.register("eq", Arity::Fixed(2), |args| {
            Ok(Value::Bool(args[0].equals(&args[1])))
        });
        let tmpl = tmpl.with_functions(builder.build());
        let items = Value::map(vec![(
            Value::str("items"),
            Value::seq(vec![Value::str("a"), Value::str("b"), Value::str("c")]),
        )]);
        assert_eq!(tmpl.render(items).unwrap(), "a");
    }

    #[test]
    fn range_continue_skips_remainder_of_iteration() {
        let tmpl = Template::parse_str(
            "range-continue",
            "{{range .items}}{{if eq . \"b\"}}{{continue}}{{end}}{{.}}{{end}}",
        )
        .unwrap();
        let mut builder = FunctionRegistry::builder();
        builder.register("eq", Arity::Fixed(2), |args| {
            Ok(Value::Bool(args[0].equals(&args[1])))
        });
        let tmpl = tmpl.with_functions(builder.build());
        let items = Value::map(vec![(
            Value::str("items"),
            Value::seq(vec![Value::str("a"), Value::str("b"), Value::str("c")]),
        )]);
        assert_eq!(tmpl.render(items).unwrap(), "ac");
    }

    #[test]
    fn renders_with_changes_context() {
        let tmpl =
            Template::parse_str("with", "{{with .user}}{{.name}}{{else}}missing{{end}}").unwrap();
        let present = Value::map(vec![(
            Value::str("user"),
            Value::map(vec![(Value::str("name"), Value::str("Lithos"))]),
        )]);
        assert_eq!(tmpl.render(present).unwrap(), "Lithos");

        let missing = Value::map(vec![(Value::str("user"), Value::Absent)]);
        assert_eq!(tmpl.render(missing).unwrap(), "missing");
    }

    #[test]
    fn trims_whitespace_around_actions() {
        let tmpl = Template::parse_str("trim", "Line1\n{{- \"Line2\" -}}\nLine3").unwrap();
        let output = tmpl.render(Value::Absent).unwrap();
        assert_eq!(output, "Line1Line2Line3");
    }

    #[test]
    fn variable_binding_inside_if() {
        let tmpl = Template::parse_str("if-var", "{{if $val := .value}}{{$val}}{{end}}").unwrap();
        let data = Value::map(vec![(Value::str("value"), Value::str("ok"))]);
        assert_eq!(tmpl.render(data).unwrap(), "ok");
    }

    #[test]
    fn range_assigns_iteration_variables() {
        let tmpl = Template::parse_str(
            "range-vars",
            "{{range $i, $v := .items}}{{$i}}:{{$v}};{{end}}",
        )
        .unwrap();
        let data = Value::map(vec![(
            Value::str("items"),
            Value::seq(vec![Value::str("zero"), Value::str("one")]),
        )]);
        assert_eq!(tmpl.render(data).unwrap(), "0:zero;1:one;");
    }

    #[test]
    fn comment_trimming_matches_go() {
        let left = Template::parse_str("comment-left", "x \r\n\t{{- /* hi */}}").unwrap();
        assert_eq!(left.render(Value::Absent).unwrap(), "x");
        assert_eq!(left.to_template_string(), "x{{-/*hi*/}}");

        let right = Template::parse_str("comment-right", "{{/* hi */ -}}\n\n\ty").unwrap();
        assert_eq!(right.render(Value::Absent).unwrap(), "y");
        assert_eq!(right.to_template_string(), "{{/*hi*/-}}y");

        let both =
            Template::parse_str("comment-both", "left \n{{- /* trim */ -}}\n right").unwrap();
        assert_eq!(both.render(Value::Absent).unwrap(), "leftright");
        assert_eq!(both.to_template_string(), "left{{-/*trim*/-}}right");
    }

    #[test]
    fn comment_only_renders_empty_string() {
        let tmpl = Template::parse_str("comment-only", "{{/* comment */}}").unwrap();
        assert_eq!(tmpl.render(Value::Absent).unwrap(), "");
    }

    #[test]
    fn root_variable_resolves_to_input() {
        let tmpl = Template::parse_str("root", "{{ $.name }}").unwrap();
        let data = Value::map(vec![(Value::str("name"), Value::str("Lithos"))]);
        assert_eq!(tmpl.render(data).unwrap().trim(), "Lithos");
    }

    #[test]
    fn nested_scope_shadowing_preserves_outer() {
        let tmpl = Template::parse_str(
            "shadow",
            "{{ $x := \"outer\" }}{{ with .inner }}{{ $x := \"inner\" }}{{ $x }}{{ end }}{{ $x }}",
        )
        .unwrap();
        let data = Value::map(vec![(
            Value::str("inner"),
            Value::map(vec![(Value::str("value"), Value::Num(Number::I32(1)))]),
        )]);
        let rendered: String = tmpl
            .render(data)
            .unwrap()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        assert_eq!(rendered, "innerouter");
    }

    #[test]
    fn assignment_updates_existing_variable() {
        let tmpl = Template::parse_str(
            "assign",
            "{{ $v := \"first\" }}{{ $v = \"second\" }}{{ $v }}",
        )
        .unwrap();
        let rendered = tmpl.render(Value::Absent).unwrap();
        assert_eq!(rendered, "second");
    }

    #[test]
    fn assignment_to_unknown_variable_fails() {
        let tmpl = Template::parse_str("assign", "{{ $v = .value }}")
            .expect("assignment pipeline should parse");
        let data = Value::map(vec![(Value::str("value"), Value::Num(Number::I32(1)))]);
        let err = tmpl.render(data).unwrap_err();
        assert!(err.to_string().contains("undefined variable"));
    }

    #[test]
    fn define_and_template_call_share_the_common_table() {
        let tmpl = Template::parse_str(
            "root",
            r#"{{define "greeting"}}Hi, {{.}}!{{end}}{{template "greeting" .name}}"#,
        )
        .unwrap();
        let data = Value::map(vec![(Value::str("name"), Value::str("Lithos"))]);
        assert_eq!(tmpl.render(data).unwrap(), "Hi, Lithos!");
    }

    #[test]
    fn block_defines_and_calls_inline_but_can_be_overridden_via_get_sub() {
        let tmpl =
            Template::parse_str("root", r#"before {{block "section" .}}default{{end}} after"#)
                .unwrap();
        assert_eq!(tmpl.render(Value::Absent).unwrap(), "before default after");

        let section = tmpl.get_sub("section").expect("block should register");
        assert_eq!(section.render(Value::Absent).unwrap(), "default");
    }

    #[test]
    fn parse_associated_merges_into_the_common_table() {
        let mut tmpl = Template::parse_str("root", r#"{{template "partial" .}}"#).unwrap();
        tmpl.parse_associated("partial", "partial body").unwrap();
        assert_eq!(tmpl.render(Value::Absent).unwrap(), "partial body");
    }

    #[test]
    fn calling_an_undefined_template_is_an_error() {
        let tmpl = Template::parse_str("root", r#"{{template "missing"}}"#).unwrap();
        let err = tmpl.render(Value::Absent).unwrap_err();
        assert!(err.to_string().contains("not defined"));
    }

    #[test]
    fn custom_delimiters_render_like_default_ones() {
        let tmpl =
            Template::parse_with_delims("custom", "<< .name >>", "<<", ">>", FunctionRegistry::empty())
                .unwrap();
        let data = Value::map(vec![(Value::str("name"), Value::str("Lithos"))]);
        assert_eq!(tmpl.render(data).unwrap().trim(), "Lithos");
    }

    #[test]
    fn pipeline_expression_inside_if() {
        let mut builder = FunctionRegistry::builder();
        builder
            .register("default", Arity::Fixed(2), |args| {
                let fallback = args[0].clone();
                let value = args[1].clone();
                if value.truthy() {
                    Ok(value)
                } else {
                    Ok(fallback)
                }
            })
            .register("ge", Arity::Fixed(2), |args| {
                Ok(Value::Bool(args[0].compare(&args[1])?.is_ge()))
            });
        let registry = builder.build();

        let tmpl = Template::parse_with_functions(
            "pipeline-if",
            "# {{ if ge (.x | default 1) 1 }}\nyes \n# {{ end }}",
            registry,
        )
        .unwrap();

        let rendered = tmpl.render(Value::Absent).unwrap();
        assert_eq!(rendered, "# \nyes \n# ");
        assert!(tmpl
            .to_template_string()
            .contains("{{if ge (.x | default 1) 1}}"));
    }
}
