// SPDX-License-Identifier: Apache-2.0 OR MIT
use crate::ast::{
    ActionNode, Ast, BindingKind, Block, Command, CommentNode, ElseIfBranch, Expression, IfNode,
    Node, Pipeline, PipelineDeclarations, RangeNode, Span, TemplateCallNode, TextNode, WithNode,
};
use crate::error::Error;
use crate::lexer;
use crate::lexer::{Keyword, Operator, Token, TokenKind};

/// Everything a single source parse produces: the root (unnamed, or
/// caller-named) template plus any templates it declared via `define` or
/// `block`. Together these form the "common table" a `Template` owns.
#[derive(Debug, Clone)]
pub struct ParsedTemplates {
    pub root: Ast,
    pub defined: Vec<Ast>,
}

/// Parses `source` using the default `{{`/`}}` delimiters.
pub fn parse_template(name: &str, source: &str) -> Result<ParsedTemplates, Error> {
    parse_template_with_delims(name, source, "{{", "}}")
}

/// Parses `source` using caller-chosen action delimiters (spec.md's
/// "Lexer surface" configuration knob).
///
/// The parser walks the input once, splitting it into literal text and
/// action blocks. Two stacks drive the structure:
///
/// - `control_stack` stores the open `if`/`range`/`with`/`define`/`block`
///   frames so their bodies can be populated until a matching `{{end}}`.
/// - `target_stack` tracks where the next node should be appended (root
///   block, current `then`/`else if`/`else` block, or a `define`/`block`
///   body).
pub fn parse_template_with_delims(
    name: &str,
    source: &str,
    left: &str,
    right: &str,
) -> Result<ParsedTemplates, Error> {
    let mut root = Block::default();
    let mut defined: Vec<Ast> = Vec::new();
    let mut cursor = 0usize;
    let bytes = source.as_bytes();
    let left = left.as_bytes();
    let right = right.as_bytes();
    let mut control_stack: Vec<ControlFrame> = Vec::new();
    let mut target_stack: Vec<AppendTarget> = vec![AppendTarget::Root];

    while cursor < bytes.len() {
        let Some(open) = find_action_start(bytes, cursor, left) else {
            let text = &source[cursor..];
            if !text.is_empty() {
                push_node(
                    &mut root,
                    &mut control_stack,
                    &target_stack,
                    Node::Text(TextNode::new(
                        Span::new(cursor, source.len()),
                        text.to_string(),
                    )),
                );
            }
            break;
        };

        if open > cursor {
            let text = &source[cursor..open];
            if !text.is_empty() {
                push_node(
                    &mut root,
                    &mut control_stack,
                    &target_stack,
                    Node::Text(TextNode::new(Span::new(cursor, open), text.to_string())),
                );
            }
        }

        match find_action_end(bytes, open + left.len(), right) {
            Some(close) => {
                let window = trim_action_delimiters(source, bytes, open, close, left, right);

                if window.trim_left {
                    let block = current_block_mut(&mut root, &mut control_stack, &target_stack);
                    trim_trailing_whitespace(block);
                }

                if is_potential_comment(window.body) && !window.body.ends_with("*/") {
                    return Err(Error::parse_with_span("unclosed comment", window.span));
                }

                if is_comment(window.body) {
                    push_node(
                        &mut root,
                        &mut control_stack,
                        &target_stack,
                        Node::Comment(CommentNode::new(
                            window.span,
                            strip_comment(window.body),
                            window.trim_left,
                            window.trim_right,
                        )),
                    );
                } else {
                    let tokens = lexer::lex_action(window.body, window.body_start)?;

                    if tokens.is_empty() {
                        return Err(Error::parse_with_span("empty action", window.span));
                    }

                    match classify_action(&tokens)? {
                        ActionKind::If => {
                            let condition_tokens: Vec<_> = tokens[1..].to_vec();
                            let condition_pipeline = parse_action_pipeline(&condition_tokens)?;
                            let frame = ControlFrame::new_control(
                                ControlKind::If,
                                window.span,
                                condition_tokens,
                                condition_pipeline,
                            );
                            push_control_frame(&mut control_stack, &mut target_stack, frame);
                        }
                        ActionKind::Range => {
                            let condition_tokens: Vec<_> = tokens[1..].to_vec();
                            let condition_pipeline = parse_action_pipeline(&condition_tokens)?;
                            let frame = ControlFrame::new_control(
                                ControlKind::Range,
                                window.span,
                                condition_tokens,
                                condition_pipeline,
                            );
                            push_control_frame(&mut control_stack, &mut target_stack, frame);
                        }
                        ActionKind::With => {
                            let condition_tokens: Vec<_> = tokens[1..].to_vec();
                            let condition_pipeline = parse_action_pipeline(&condition_tokens)?;
                            let frame = ControlFrame::new_control(
                                ControlKind::With,
                                window.span,
                                condition_tokens,
                                condition_pipeline,
                            );
                            push_control_frame(&mut control_stack, &mut target_stack, frame);
                        }
                        ActionKind::Else => {
                            handle_else(&mut control_stack, &mut target_stack, window.span)?;
                        }
                        ActionKind::ElseIf => {
                            let condition_tokens: Vec<_> = tokens[2..].to_vec();
                            let condition_pipeline = parse_action_pipeline(&condition_tokens)?;
                            handle_else_if(
                                &mut control_stack,
                                &mut target_stack,
                                window.span,
                                condition_tokens,
                                condition_pipeline,
                            )?;
                        }
                        ActionKind::End => {
                            close_control_frame(
                                &mut root,
                                &mut control_stack,
                                &mut target_stack,
                                &mut defined,
                                window.span,
                            )?;
                        }
                        ActionKind::Break => {
                            if !control_stack.iter().any(|f| matches!(f.kind, ControlKind::Range)) {
                                return Err(Error::parse_with_span(
                                    "break outside a range",
                                    window.span,
                                ));
                            }
                            push_node(
                                &mut root,
                                &mut control_stack,
                                &target_stack,
                                Node::Break(window.span),
                            );
                        }
                        ActionKind::Continue => {
                            if !control_stack.iter().any(|f| matches!(f.kind, ControlKind::Range)) {
                                return Err(Error::parse_with_span(
                                    "continue outside a range",
                                    window.span,
                                ));
                            }
                            push_node(
                                &mut root,
                                &mut control_stack,
                                &target_stack,
                                Node::Continue(window.span),
                            );
                        }
                        ActionKind::Define => {
                            let define_name = expect_string_literal(&tokens, 1, "define")?;
                            let frame = ControlFrame::new_define(window.span, define_name);
                            push_control_frame(&mut control_stack, &mut target_stack, frame);
                        }
                        ActionKind::Block => {
                            let block_name = expect_string_literal(&tokens, 1, "block")?;
                            let pipeline_tokens: Vec<_> = tokens[2..].to_vec();
                            if pipeline_tokens.is_empty() {
                                return Err(Error::parse_with_span(
                                    "block requires a pipeline",
                                    window.span,
                                ));
                            }
                            let pipeline = parse_action_pipeline(&pipeline_tokens)?;
                            push_node(
                                &mut root,
                                &mut control_stack,
                                &target_stack,
                                Node::TemplateCall(TemplateCallNode::new(
                                    window.span,
                                    block_name.clone(),
                                    Some(pipeline),
                                )),
                            );
                            let frame = ControlFrame::new_define(window.span, block_name);
                            push_control_frame(&mut control_stack, &mut target_stack, frame);
                        }
                        ActionKind::Template => {
                            let call_name = expect_string_literal(&tokens, 1, "template")?;
                            let pipeline_tokens: Vec<_> = tokens[2..].to_vec();
                            let pipeline = if pipeline_tokens.is_empty() {
                                None
                            } else {
                                Some(parse_action_pipeline(&pipeline_tokens)?)
                            };
                            push_node(
                                &mut root,
                                &mut control_stack,
                                &target_stack,
                                Node::TemplateCall(TemplateCallNode::new(
                                    window.span,
                                    call_name,
                                    pipeline,
                                )),
                            );
                        }
                        ActionKind::Regular => {
                            let pipeline = parse_action_pipeline(&tokens)?;
                            let node = build_action_node(
                                window.span,
                                window.body,
                                tokens,
                                pipeline,
                                window.trim_left,
                                window.trim_right,
                            );
                            push_node(&mut root, &mut control_stack, &target_stack, node);
                        }
                    }
                }

                cursor = close + right.len();
                if window.trim_right {
                    cursor = skip_leading_whitespace(bytes, cursor);
                }
            }
            None => {
                let mut remainder = &source[open + left.len()..];
                remainder = remainder.trim_start();
                if let Some(rest) = remainder.strip_prefix('-') {
                    remainder = rest.trim_start();
                }

                let span = Span::new(open, source.len());
                if remainder.starts_with("/*") {
                    return Err(Error::parse_with_span("unclosed comment", span));
                }

                return Err(Error::parse_with_span("unclosed action", span));
            }
        }
    }

    if bytes.is_empty() {
        push_node(
            &mut root,
            &mut control_stack,
            &target_stack,
            Node::Text(TextNode::new(Span::new(0, 0), String::new())),
        );
    }

    if let Some(frame) = control_stack.last() {
        return Err(Error::parse(
            "unterminated control structure",
            Some(frame.start_span),
        ));
    }

    Ok(ParsedTemplates {
        root: Ast::new(name, root),
        defined,
    })
}

fn expect_string_literal(tokens: &[Token], index: usize, action: &str) -> Result<String, Error> {
    match tokens.get(index).map(|t| &t.kind) {
        Some(TokenKind::StringLiteral(name)) => Ok(name.clone()),
        Some(_) | None => Err(Error::parse(
            format!("{action} requires a quoted template name"),
            tokens.get(index).or(tokens.first()).map(|t| t.span),
        )),
    }
}

#[derive(Debug, Clone, Copy)]
struct ActionWindow<'a> {
    span: Span,
    body_start: usize,
    body: &'a str,
    trim_left: bool,
    trim_right: bool,
}

fn trim_action_delimiters<'a>(
    source: &'a str,
    bytes: &[u8],
    open: usize,
    close: usize,
    left: &[u8],
    right: &[u8],
) -> ActionWindow<'a> {
    let mut body_start = open + left.len();
    let mut body_end = close;
    let mut trim_left = false;
    let mut trim_right = false;

    if body_start < close && bytes[body_start] == b'-' {
        trim_left = true;
        body_start += 1;
    }
    if body_start < body_end && bytes[body_end - 1] == b'-' {
        trim_right = true;
        body_end -= 1;
    }

    let span = Span::new(open, close + right.len());
    let raw = &source[body_start..body_end];
    let trimmed_start = raw.trim_start();
    let prefix_len = raw.len() - trimmed_start.len();
    let body = trimmed_start.trim_end();
    body_start += prefix_len;

    ActionWindow {
        span,
        body_start,
        body,
        trim_left,
        trim_right,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActionKind {
    If,
    Range,
    With,
    Else,
    ElseIf,
    End,
    Break,
    Continue,
    Define,
    Block,
    Template,
    Regular,
}

fn classify_action(tokens: &[Token]) -> Result<ActionKind, Error> {
    let first = tokens
        .first()
        .ok_or_else(|| Error::parse("empty action", None))?;
    match &first.kind {
        TokenKind::Keyword(Keyword::If) => {
            if tokens.len() < 2 {
                return Err(Error::parse_with_span("if requires a pipeline", first.span));
            }
            Ok(ActionKind::If)
        }
        TokenKind::Keyword(Keyword::Range) => {
            if tokens.len() < 2 {
                return Err(Error::parse_with_span(
                    "range requires a pipeline",
                    first.span,
                ));
            }
            Ok(ActionKind::Range)
        }
        TokenKind::Keyword(Keyword::With) => {
            if tokens.len() < 2 {
                return Err(Error::parse_with_span(
                    "with requires a pipeline",
                    first.span,
                ));
            }
            Ok(ActionKind::With)
        }
        TokenKind::Keyword(Keyword::Else) => {
            if tokens.len() > 1 {
                if matches!(tokens[1].kind, TokenKind::Keyword(Keyword::If)) {
                    return Ok(ActionKind::ElseIf);
                }
                return Err(Error::parse(
                    "unexpected tokens after else",
                    Some(tokens[1].span),
                ));
            }
            Ok(ActionKind::Else)
        }
        TokenKind::Keyword(Keyword::End) => {
            if tokens.len() > 1 {
                return Err(Error::parse(
                    "unexpected tokens after end",
                    Some(tokens[1].span),
                ));
            }
            Ok(ActionKind::End)
        }
        TokenKind::Keyword(Keyword::Break) => {
            if tokens.len() > 1 {
                return Err(Error::parse(
                    "unexpected tokens after break",
                    Some(tokens[1].span),
                ));
            }
            Ok(ActionKind::Break)
        }
        TokenKind::Keyword(Keyword::Continue) => {
            if tokens.len() > 1 {
                return Err(Error::parse(
                    "unexpected tokens after continue",
                    Some(tokens[1].span),
                ));
            }
            Ok(ActionKind::Continue)
        }
        TokenKind::Keyword(Keyword::Define) => Ok(ActionKind::Define),
        TokenKind::Keyword(Keyword::Block) => Ok(ActionKind::Block),
        TokenKind::Keyword(Keyword::Template) => Ok(ActionKind::Template),
        _ => Ok(ActionKind::Regular),
    }
}

#[derive(Debug, Clone, Copy)]
enum AppendTarget {
    Root,
    Then(usize),
    ElseIf(usize, usize),
    Else(usize),
}

#[derive(Debug)]
struct PendingElseIf {
    span: Span,
    tokens: Vec<Token>,
    pipeline: Pipeline,
    block: Block,
}

#[derive(Debug)]
struct ControlFrame {
    kind: ControlKind,
    start_span: Span,
    tokens: Vec<Token>,
    pipeline: Option<Pipeline>,
    then_block: Block,
    else_if_branches: Vec<PendingElseIf>,
    else_block: Option<Block>,
}

impl ControlFrame {
    fn new_control(kind: ControlKind, span: Span, tokens: Vec<Token>, pipeline: Pipeline) -> Self {
        Self {
            kind,
            start_span: span,
            tokens,
            pipeline: Some(pipeline),
            then_block: Block::default(),
            else_if_branches: Vec::new(),
            else_block: None,
        }
    }

    fn new_define(span: Span, name: String) -> Self {
        Self {
            kind: ControlKind::Define(name),
            start_span: span,
            tokens: Vec::new(),
            pipeline: None,
            then_block: Block::default(),
            else_if_branches: Vec::new(),
            else_block: None,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ControlKind {
    If,
    Range,
    With,
    Define(String),
}

fn current_block_mut<'a>(
    root: &'a mut Block,
    controls: &'a mut [ControlFrame],
    targets: &[AppendTarget],
) -> &'a mut Block {
    match targets.last().copied().unwrap_or(AppendTarget::Root) {
        AppendTarget::Root => root,
        AppendTarget::Then(idx) => &mut controls[idx].then_block,
        AppendTarget::ElseIf(idx, branch) => &mut controls[idx].else_if_branches[branch].block,
        AppendTarget::Else(idx) => controls[idx]
            .else_block
            .as_mut()
            .expect("else block should be initialised"),
    }
}

fn trim_trailing_whitespace(block: &mut Block) {
    if let Some(Node::Text(text)) = block.nodes.last_mut() {
        while text
            .text
            .chars()
            .last()
            .map(|ch| matches!(ch, ' ' | '\t' | '\n' | '\r'))
            .unwrap_or(false)
        {
            text.text.pop();
        }
    }
}

fn skip_leading_whitespace(bytes: &[u8], mut index: usize) -> usize {
    while index < bytes.len() && matches!(bytes[index], b' ' | b'\t' | b'\n' | b'\r') {
        index += 1;
    }
    index
}

fn push_node(
    root: &mut Block,
    controls: &mut [ControlFrame],
    targets: &[AppendTarget],
    node: Node,
) {
    let block = current_block_mut(root, controls, targets);
    block.push(node);
}

fn build_action_node(
    span: Span,
    body: &str,
    tokens: Vec<Token>,
    pipeline: Pipeline,
    trim_left: bool,
    trim_right: bool,
) -> Node {
    Node::Action(ActionNode::new(
        span,
        body.to_string(),
        tokens,
        pipeline,
        trim_left,
        trim_right,
    ))
}

fn push_control_frame(
    controls: &mut Vec<ControlFrame>,
    targets: &mut Vec<AppendTarget>,
    frame: ControlFrame,
) {
    controls.push(frame);
    let idx = controls.len() - 1;
    targets.push(AppendTarget::Then(idx));
}

fn handle_else(
    controls: &mut [ControlFrame],
    targets: &mut [AppendTarget],
    span: Span,
) -> Result<(), Error> {
    if targets.len() <= 1 {
        return Err(Error::parse_with_span("unexpected else", span));
    }

    let current = targets
        .last_mut()
        .ok_or_else(|| Error::parse_with_span("unexpected else", span))?;

    let idx = match *current {
        AppendTarget::Then(idx) => idx,
        AppendTarget::ElseIf(idx, _) => idx,
        AppendTarget::Else(_) => {
            return Err(Error::parse_with_span("duplicate else block", span));
        }
        AppendTarget::Root => return Err(Error::parse_with_span("unexpected else", span)),
    };

    let frame = controls
        .get_mut(idx)
        .ok_or_else(|| Error::parse_with_span("mismatched else", span))?;

    if frame.else_block.is_some() {
        return Err(Error::parse_with_span("multiple else blocks", span));
    }

    frame.else_block = Some(Block::default());
    *current = AppendTarget::Else(idx);
    Ok(())
}

fn handle_else_if(
    controls: &mut [ControlFrame],
    targets: &mut [AppendTarget],
    span: Span,
    tokens: Vec<Token>,
    pipeline: Pipeline,
) -> Result<(), Error> {
    if targets.len() <= 1 {
        return Err(Error::parse_with_span("unexpected else if", span));
    }

    let current = targets
        .last_mut()
        .ok_or_else(|| Error::parse_with_span("unexpected else if", span))?;

    let idx = match *current {
        AppendTarget::Then(idx) => idx,
        AppendTarget::ElseIf(idx, _) => idx,
        AppendTarget::Else(_) => {
            return Err(Error::parse_with_span("else if after else", span));
        }
        AppendTarget::Root => return Err(Error::parse_with_span("unexpected else if", span)),
    };

    let frame = controls
        .get_mut(idx)
        .ok_or_else(|| Error::parse_with_span("mismatched else if", span))?;

    if !matches!(frame.kind, ControlKind::If) {
        return Err(Error::parse_with_span(
            "else if is only valid inside if",
            span,
        ));
    }
    if frame.else_block.is_some() {
        return Err(Error::parse_with_span("else if after else", span));
    }

    frame.else_if_branches.push(PendingElseIf {
        span,
        tokens,
        pipeline,
        block: Block::default(),
    });
    let branch = frame.else_if_branches.len() - 1;
    *current = AppendTarget::ElseIf(idx, branch);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn close_control_frame(
    root: &mut Block,
    controls: &mut Vec<ControlFrame>,
    targets: &mut Vec<AppendTarget>,
    defined: &mut Vec<Ast>,
    span: Span,
) -> Result<(), Error> {
    let top = targets
        .pop()
        .ok_or_else(|| Error::parse_with_span("unexpected end", span))?;

    let idx = match top {
        AppendTarget::Then(idx) | AppendTarget::Else(idx) | AppendTarget::ElseIf(idx, _) => idx,
        AppendTarget::Root => return Err(Error::parse_with_span("unexpected end", span)),
    };

    if controls.len() <= idx {
        return Err(Error::parse_with_span("mismatched end", span));
    }

    if controls.len() - 1 != idx {
        return Err(Error::parse_with_span(
            "nested block closed out of order",
            span,
        ));
    }

    let frame = controls
        .pop()
        .ok_or_else(|| Error::parse_with_span("unexpected end", span))?;
    let full_span = Span::new(frame.start_span.start, span.end);
    let ControlFrame {
        kind,
        tokens,
        pipeline,
        then_block,
        else_if_branches,
        else_block,
        ..
    } = frame;

    match kind {
        ControlKind::If => {
            let else_if_branches = else_if_branches
                .into_iter()
                .map(|pending| {
                    ElseIfBranch::new(pending.span, pending.tokens, pending.pipeline, pending.block)
                })
                .collect();
            let node = Node::If(IfNode::new(
                full_span,
                tokens,
                pipeline.expect("if frame always carries a pipeline"),
                then_block,
                else_if_branches,
                else_block,
            ));
            push_node(root, controls, targets.as_slice(), node);
        }
        ControlKind::Range => {
            let node = Node::Range(RangeNode::new(
                full_span,
                tokens,
                pipeline.expect("range frame always carries a pipeline"),
                then_block,
                else_block,
            ));
            push_node(root, controls, targets.as_slice(), node);
        }
        ControlKind::With => {
            let node = Node::With(WithNode::new(
                full_span,
                tokens,
                pipeline.expect("with frame always carries a pipeline"),
                then_block,
                else_block,
            ));
            push_node(root, controls, targets.as_slice(), node);
        }
        ControlKind::Define(name) => {
            defined.push(Ast::new(name, then_block));
        }
    }

    Ok(())
}

fn is_comment(body: &str) -> bool {
    let trimmed = body.trim();
    trimmed.starts_with("/*") && trimmed.ends_with("*/")
}

fn strip_comment(body: &str) -> String {
    let trimmed = body.trim();
    trimmed
        .strip_prefix("/*")
        .and_then(|b| b.strip_suffix("*/"))
        .map(|inner| inner.trim().to_string())
        .unwrap_or_else(|| body.to_string())
}

fn is_potential_comment(body: &str) -> bool {
    let trimmed = body.trim();
    trimmed.starts_with("/*")
}

fn parse_action_pipeline(tokens: &[crate::lexer::Token]) -> Result<Pipeline, Error> {
    let mut parser = ActionParser::new(tokens);
    parser.parse_pipeline()
}

struct ActionParser<'a> {
    tokens: &'a [crate::lexer::Token],
    index: usize,
}

impl<'a> ActionParser<'a> {
    fn new(tokens: &'a [crate::lexer::Token]) -> Self {
        Self { tokens, index: 0 }
    }

    fn parse_pipeline(&mut self) -> Result<Pipeline, Error> {
        let declarations = self.parse_declarations()?;
        let mut commands = Vec::new();
        if self.is_eof() {
            return Err(Error::parse("empty action", None));
        }

        commands.push(self.parse_command()?);

        while self.consume_pipe()? {
            commands.push(self.parse_command()?);
        }

        if !self.is_eof() {
            let token = &self.tokens[self.index];
            return Err(Error::parse(
                format!("unexpected token {:?}", token.kind),
                Some(token.span),
            ));
        }

        Ok(Pipeline::new(declarations, commands))
    }

    fn parse_declarations(&mut self) -> Result<Option<PipelineDeclarations>, Error> {
        let save = self.index;
        let mut names = Vec::new();

        loop {
            let Some(token) = self.peek_token() else {
                break;
            };
            match &token.kind {
                TokenKind::Identifier(name) if name.starts_with('$') => {
                    names.push(name.clone());
                    self.index += 1;
                }
                _ => break,
            }

            if let Some(next) = self.peek_token() {
                if matches!(next.kind, TokenKind::Comma) {
                    self.index += 1;
                    continue;
                }
            }
            break;
        }

        if names.is_empty() {
            self.index = save;
            return Ok(None);
        }

        let kind = match self.peek_token() {
            Some(token) => match token.kind {
                TokenKind::Declare => BindingKind::Declare,
                TokenKind::Assign => BindingKind::Assign,
                _ => {
                    self.index = save;
                    return Ok(None);
                }
            },
            None => {
                self.index = save;
                return Ok(None);
            }
        };

        self.index += 1; // consume := or =

        Ok(Some(PipelineDeclarations::new(kind, names)))
    }

    fn parse_command(&mut self) -> Result<Command, Error> {
        let first_expr = self.parse_expression()?;

        if let Some(operator) = self.consume_operator()? {
            let rhs = self.parse_expression()?;
            let op_name = match operator {
                Operator::Equal => "eq",
                Operator::NotEqual => "ne",
                Operator::Less => "lt",
                Operator::LessOrEqual => "le",
                Operator::Greater => "gt",
                Operator::GreaterOrEqual => "ge",
            };
            return Ok(Command::new(
                Expression::Identifier(op_name.to_string()),
                vec![first_expr, rhs],
            ));
        }

        let mut args = Vec::new();

        loop {
            self.skip_commas();
            if self.peek_pipe() || self.is_eof() {
                break;
            }
            args.push(self.parse_expression()?);
        }

        Ok(Command::new(first_expr, args))
    }

    fn parse_expression(&mut self) -> Result<Expression, Error> {
        let token = self
            .next_token()
            .ok_or_else(|| Error::parse("unexpected end of action", None))?;
        let expr = match &token.kind {
            TokenKind::Identifier(name) => {
                if let Some(var_name) = name.strip_prefix('$').map(|_| name.clone()) {
                    let mut parts = Vec::new();
                    self.extend_field_segments(&mut parts, token.span);
                    if parts.is_empty() {
                        Expression::Variable(var_name)
                    } else {
                        Expression::VariableField(var_name, parts)
                    }
                } else {
                    Expression::Identifier(name.clone())
                }
            }
            TokenKind::Dot => self.parse_field(token.span)?,
            TokenKind::StringLiteral(value) => Expression::StringLiteral(value.clone()),
            TokenKind::CharLiteral(value) => Expression::CharLiteral(*value),
            TokenKind::NumberLiteral(value) => Expression::NumberLiteral(value.clone()),
            TokenKind::Keyword(Keyword::Nil) => Expression::Nil,
            TokenKind::Keyword(Keyword::True) => Expression::BoolLiteral(true),
            TokenKind::Keyword(Keyword::False) => Expression::BoolLiteral(false),
            TokenKind::Keyword(keyword) => Expression::Identifier(keyword.as_str().to_string()),
            TokenKind::LeftParen => self.parse_parenthesized_pipeline()?,
            other => {
                return Err(Error::parse(
                    format!("unexpected token in expression: {:?}", other),
                    Some(token.span),
                ));
            }
        };
        Ok(expr)
    }

    fn parse_field(&mut self, dot_span: Span) -> Result<Expression, Error> {
        let Some(token) = self.peek_token() else {
            return Ok(Expression::Field(Vec::new()));
        };

        if token.span.start != dot_span.end {
            return Ok(Expression::Field(Vec::new()));
        }

        let mut parts = Vec::new();
        let span = token.span;
        match &token.kind {
            TokenKind::Identifier(name) => {
                parts.push(name.clone());
                self.index += 1;
            }
            TokenKind::NumberLiteral(num) => {
                parts.push(num.clone());
                self.index += 1;
            }
            _ => {}
        }

        if parts.is_empty() {
            return Ok(Expression::Field(Vec::new()));
        }

        self.extend_field_segments(&mut parts, span);
        Ok(Expression::Field(parts))
    }

    fn skip_commas(&mut self) {
        while let Some(token) = self.peek_token() {
            if matches!(token.kind, TokenKind::Comma) {
                self.index += 1;
            } else {
                break;
            }
        }
    }

    fn consume_pipe(&mut self) -> Result<bool, Error> {
        if let Some(token) = self.peek_token() {
            if matches!(token.kind, TokenKind::Pipe) {
                self.index += 1;
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn peek_pipe(&self) -> bool {
        self.peek_token()
            .map(|token| matches!(token.kind, TokenKind::Pipe))
            .unwrap_or(false)
    }

    fn next_token(&mut self) -> Option<&'a crate::lexer::Token> {
        if self.index >= self.tokens.len() {
            None
        } else {
            let token = &self.tokens[self.index];
            self.index += 1;
            Some(token)
        }
    }

    fn peek_token(&self) -> Option<&'a crate::lexer::Token> {
        self.tokens.get(self.index)
    }

    fn is_eof(&self) -> bool {
        self.index >= self.tokens.len()
    }

    fn consume_operator(&mut self) -> Result<Option<Operator>, Error> {
        if let Some(token) = self.peek_token() {
            if let TokenKind::Operator(op) = &token.kind {
                self.index += 1;
                return Ok(Some(op.clone()));
            }
        }
        Ok(None)
    }

    fn parse_parenthesized_pipeline(&mut self) -> Result<Expression, Error> {
        let mut depth = 1usize;
        let mut end = self.index;
        while end < self.tokens.len() {
            match self.tokens[end].kind {
                TokenKind::LeftParen => depth += 1,
                TokenKind::RightParen => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            end += 1;
        }

        if depth != 0 {
            return Err(Error::parse("expected ')'", None));
        }

        let sub_tokens = &self.tokens[self.index..end];
        if sub_tokens.is_empty() {
            return Err(Error::parse(
                "empty pipeline",
                Some(self.tokens[self.index - 1].span),
            ));
        }

        let mut sub_parser = ActionParser::new(sub_tokens);
        let pipeline = sub_parser.parse_pipeline()?;
        if sub_parser.index != sub_tokens.len() {
            let token = &sub_tokens[sub_parser.index];
            return Err(Error::parse(
                format!("unexpected token {:?}", token.kind),
                Some(token.span),
            ));
        }
        if pipeline.declarations.is_some() {
            return Err(Error::parse(
                "pipeline declarations not allowed in expression",
                Some(self.tokens[self.index - 1].span),
            ));
        }

        let paren_span = self.tokens[end].span;
        self.index = end + 1; // skip the closing ')'

        let mut parts = Vec::new();
        self.extend_field_segments(&mut parts, paren_span);
        if parts.is_empty() {
            Ok(Expression::PipelineExpr(pipeline))
        } else {
            Ok(Expression::PipelineField(pipeline, parts))
        }
    }

    fn extend_field_segments(&mut self, parts: &mut Vec<String>, mut last_span: Span) {
        loop {
            let Some(dot_token) = self.tokens.get(self.index) else {
                break;
            };

            if !matches!(dot_token.kind, TokenKind::Dot) || dot_token.span.start != last_span.end {
                break;
            }

            let Some(segment) = self.tokens.get(self.index + 1) else {
                break;
            };

            match &segment.kind {
                TokenKind::Identifier(name) => {
                    self.index += 2;
                    parts.push(name.clone());
                    last_span = segment.span;
                }
                TokenKind::NumberLiteral(num) => {
                    self.index += 2;
                    parts.push(num.clone());
                    last_span = segment.span;
                }
                _ => break,
            }
        }
    }
}

fn find_action_start(bytes: &[u8], from: usize, left: &[u8]) -> Option<usize> {
    if left.is_empty() || from + left.len() > bytes.len() {
        return None;
    }
    let mut i = from;
    while i + left.len() <= bytes.len() {
        if &bytes[i..i + left.len()] == left {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn find_action_end(bytes: &[u8], from: usize, right: &[u8]) -> Option<usize> {
    if right.is_empty() {
        return None;
    }
    let mut i = from;
    let mut in_raw = false;
    let mut in_string = false;
    let mut in_comment = false;
    while i < bytes.len() {
        let current = bytes[i];

        if in_comment {
            if current == b'*' && bytes.get(i + 1) == Some(&b'/') {
                in_comment = false;
                i += 2;
            } else {
                i += 1;
            }
            continue;
        }

        if in_raw {
            if current == b'`' {
                in_raw = false;
            }
            i += 1;
            continue;
        }

        if in_string {
            if current == b'\\' {
                i += 2;
                continue;
            }
            if current == b'"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        if current == b'/' && bytes.get(i + 1) == Some(&b'*') {
            in_comment = true;
            i += 2;
            continue;
        }

        match current {
            b'`' => {
                in_raw = true;
                i += 1;
                continue;
            }
            b'"' => {
                in_string = true;
                i += 1;
                continue;
            }
            _ => {}
        }

        if i + right.len() <= bytes.len() && &bytes[i..i + right.len()] == right {
            return Some(i);
        }
        i += 1;
    }
    None
}
