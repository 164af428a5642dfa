//! Parser and evaluator for `{{ ... }}` actions.
//!
//! Supported syntax is a small subset of Go's `text/template`: variable
//! lookups (`.Name`, `.A.B`), string and boolean literals, function calls
//! with space-separated arguments, parenthesized sub-expressions, and
//! `if` / `else` / `end` blocks. `{{-` and `-}}` trim adjacent whitespace.
use std::fmt::Write as _;

use super::{Environment, TemplateError};
use crate::config::Node;

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Var(Vec<String>),
    Str(String),
    Bool(bool),
    Call(String, Vec<Self>),
}

#[derive(Debug)]
enum Segment {
    Text(String),
    Action(Expr),
    If {
        cond: Expr,
        then: Vec<Self>,
        otherwise: Vec<Self>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Str(String),
    Bool(bool),
    Null,
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Self::Str(s) => !s.is_empty(),
            Self::Bool(b) => *b,
            Self::Null => false,
        }
    }

    fn text(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::Bool(b) => b.to_string(),
            Self::Null => String::new(),
        }
    }

    fn from_node(node: &Node) -> Self {
        match node {
            Node::Null => Self::Null,
            Node::Bool(b) => Self::Bool(*b),
            Node::String(s) => Self::Str(s.clone()),
            Node::Number(n) => Self::Str(n.to_string()),
            other => Self::Str(
                serde_yaml::to_string(other)
                    .map(|s| s.trim_end().to_string())
                    .unwrap_or_default(),
            ),
        }
    }
}

/// Render `src`, evaluating every action against `env`.
///
/// # Errors
///
/// Returns a [`TemplateError`] for malformed actions, unknown functions, or
/// wrong argument counts.
pub fn render(env: &dyn Environment, src: &str) -> Result<String, TemplateError> {
    let pieces = split(src)?;
    let mut iter = pieces.into_iter();
    let (segments, terminator) = parse_block(&mut iter)?;
    if let Some(word) = terminator {
        return Err(TemplateError::Unexpected(word));
    }
    let mut out = String::new();
    emit(env, &segments, &mut out)?;
    Ok(out)
}

enum Piece {
    Text(String),
    Action(String),
}

/// Split `src` into literal text and raw action bodies, applying trim markers.
fn split(src: &str) -> Result<Vec<Piece>, TemplateError> {
    let mut pieces = Vec::new();
    let mut rest = src;
    let mut trim_next = false;
    while let Some(open) = rest.find("{{") {
        let (text, after) = rest.split_at(open);
        let after = after.strip_prefix("{{").unwrap_or(after);
        let Some((mut body, remainder)) = after.split_once("}}") else {
            return Err(TemplateError::Unclosed(src.to_string()));
        };
        let mut text = if trim_next { text.trim_start() } else { text };
        if let Some(stripped) = body.strip_prefix('-') {
            body = stripped;
            text = text.trim_end();
        }
        trim_next = false;
        if let Some(stripped) = body.strip_suffix('-') {
            body = stripped;
            trim_next = true;
        }
        if !text.is_empty() {
            pieces.push(Piece::Text(text.to_string()));
        }
        pieces.push(Piece::Action(body.trim().to_string()));
        rest = remainder;
    }
    let tail = if trim_next { rest.trim_start() } else { rest };
    if !tail.is_empty() {
        pieces.push(Piece::Text(tail.to_string()));
    }
    Ok(pieces)
}

/// Parse segments until `else`, `end`, or the end of input. Returns the
/// terminating keyword, if any.
fn parse_block(
    iter: &mut impl Iterator<Item = Piece>,
) -> Result<(Vec<Segment>, Option<String>), TemplateError> {
    let mut segments = Vec::new();
    while let Some(piece) = iter.next() {
        match piece {
            Piece::Text(text) => segments.push(Segment::Text(text)),
            Piece::Action(body) if body == "end" || body == "else" => {
                return Ok((segments, Some(body)));
            }
            Piece::Action(body) => {
                if let Some(cond) = body.strip_prefix("if ") {
                    let cond = parse_expr(cond)?;
                    let (then, term) = parse_block(iter)?;
                    let otherwise = match term.as_deref() {
                        Some("end") => Vec::new(),
                        Some("else") => match parse_block(iter)? {
                            (otherwise, Some(end)) if end == "end" => otherwise,
                            _ => return Err(TemplateError::Unclosed(format!("if {cond:?}"))),
                        },
                        _ => return Err(TemplateError::Unclosed(format!("if {cond:?}"))),
                    };
                    segments.push(Segment::If {
                        cond,
                        then,
                        otherwise,
                    });
                } else if !body.starts_with("/*") {
                    segments.push(Segment::Action(parse_expr(&body)?));
                }
            }
        }
    }
    Ok((segments, None))
}

fn emit(env: &dyn Environment, segments: &[Segment], out: &mut String) -> Result<(), TemplateError> {
    for segment in segments {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Action(expr) => {
                let value = eval(env, expr)?;
                let _ = write!(out, "{}", value.text());
            }
            Segment::If {
                cond,
                then,
                otherwise,
            } => {
                if eval(env, cond)?.truthy() {
                    emit(env, then, out)?;
                } else {
                    emit(env, otherwise, out)?;
                }
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Field(Vec<String>),
    Str(String),
    Ident(String),
    Open,
    Close,
}

fn tokenize(action: &str) -> Result<Vec<Token>, TemplateError> {
    let syntax = |message: &str| TemplateError::Syntax {
        action: action.to_string(),
        message: message.to_string(),
    };
    let mut tokens = Vec::new();
    let mut chars = action.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '"' | '`' => {
                chars.next();
                let mut s = String::new();
                let mut closed = false;
                while let Some(ch) = chars.next() {
                    if ch == c {
                        closed = true;
                        break;
                    }
                    if ch == '\\' && c == '"' {
                        match chars.next() {
                            Some('n') => s.push('\n'),
                            Some('t') => s.push('\t'),
                            Some(other) => s.push(other),
                            None => break,
                        }
                    } else {
                        s.push(ch);
                    }
                }
                if !closed {
                    return Err(syntax("unterminated string"));
                }
                tokens.push(Token::Str(s));
            }
            _ => {
                let mut word = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() || ch == '(' || ch == ')' {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                if let Some(path) = word.strip_prefix('.') {
                    let parts = if path.is_empty() {
                        Vec::new()
                    } else {
                        path.split('.').map(String::from).collect()
                    };
                    tokens.push(Token::Field(parts));
                } else {
                    tokens.push(Token::Ident(word));
                }
            }
        }
    }
    Ok(tokens)
}

fn parse_expr(action: &str) -> Result<Expr, TemplateError> {
    let tokens = tokenize(action)?;
    let mut pos = 0;
    let expr = parse_pipeline(action, &tokens, &mut pos)?;
    if pos < tokens.len() {
        return Err(TemplateError::Syntax {
            action: action.to_string(),
            message: "unexpected ')'".to_string(),
        });
    }
    Ok(expr)
}

/// `command := term | ident term*`
fn parse_pipeline(action: &str, tokens: &[Token], pos: &mut usize) -> Result<Expr, TemplateError> {
    match tokens.get(*pos) {
        Some(Token::Ident(name)) if name != "true" && name != "false" => {
            *pos += 1;
            let mut args = Vec::new();
            while let Some(token) = tokens.get(*pos) {
                if *token == Token::Close {
                    break;
                }
                args.push(parse_term(action, tokens, pos)?);
            }
            Ok(Expr::Call(name.clone(), args))
        }
        Some(_) => {
            let term = parse_term(action, tokens, pos)?;
            match tokens.get(*pos) {
                None | Some(Token::Close) => Ok(term),
                Some(_) => Err(TemplateError::Syntax {
                    action: action.to_string(),
                    message: "can't give argument to non-function".to_string(),
                }),
            }
        }
        None => Err(TemplateError::Syntax {
            action: action.to_string(),
            message: "missing value".to_string(),
        }),
    }
}

fn parse_term(action: &str, tokens: &[Token], pos: &mut usize) -> Result<Expr, TemplateError> {
    let syntax = |message: &str| TemplateError::Syntax {
        action: action.to_string(),
        message: message.to_string(),
    };
    let token = tokens.get(*pos).ok_or_else(|| syntax("missing value"))?;
    *pos += 1;
    match token {
        Token::Field(parts) => Ok(Expr::Var(parts.clone())),
        Token::Str(s) => Ok(Expr::Str(s.clone())),
        Token::Ident(word) if word == "true" => Ok(Expr::Bool(true)),
        Token::Ident(word) if word == "false" => Ok(Expr::Bool(false)),
        Token::Ident(word) if word.starts_with(|c: char| c.is_ascii_digit() || c == '-') => {
            Ok(Expr::Str(word.clone()))
        }
        Token::Ident(name) => Ok(Expr::Call(name.clone(), Vec::new())),
        Token::Open => {
            let inner = parse_pipeline(action, tokens, pos)?;
            match tokens.get(*pos) {
                Some(Token::Close) => {
                    *pos += 1;
                    Ok(inner)
                }
                _ => Err(syntax("unclosed '('")),
            }
        }
        Token::Close => Err(syntax("unexpected ')'")),
    }
}

fn lookup(env: &dyn Environment, parts: &[String]) -> Value {
    let Some((first, rest)) = parts.split_first() else {
        return Value::Null;
    };
    let Some(mut node) = env.lookup(first) else {
        return Value::Null;
    };
    for part in rest {
        match node.get(part.as_str()) {
            Some(next) => node = next.clone(),
            None => return Value::Null,
        }
    }
    Value::from_node(&node)
}

fn arity(name: &str, args: &[Expr], expected: usize) -> Result<(), TemplateError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(TemplateError::Arity {
            name: name.to_string(),
            expected,
            got: args.len(),
        })
    }
}

fn eval(env: &dyn Environment, expr: &Expr) -> Result<Value, TemplateError> {
    match expr {
        Expr::Var(parts) => Ok(lookup(env, parts)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Call(name, args) => call(env, name, args),
    }
}

fn eval_text(env: &dyn Environment, expr: &Expr) -> Result<String, TemplateError> {
    eval(env, expr).map(|v| v.text())
}

fn call(env: &dyn Environment, name: &str, args: &[Expr]) -> Result<Value, TemplateError> {
    let platform = env.platform();
    let nullary = |value: Value| arity(name, args, 0).map(|()| value);
    match name {
        "OS" => nullary(Value::Str(platform.os.clone())),
        "ARCH" => nullary(Value::Str(platform.arch.clone())),
        "Distro" => nullary(Value::Str(platform.distro.clone())),
        "LIBC" => nullary(Value::Str(platform.libc.clone())),
        "IsMusl" => nullary(Value::Bool(platform.libc == "musl")),
        "IsWSL" => nullary(Value::Bool(platform.is_wsl)),
        "IsRoot" => nullary(Value::Bool(platform.is_root)),
        "CanSudo" => {
            arity(name, args, 0)?;
            Ok(Value::Bool(env.can_sudo()))
        }
        "DefaultShell" => nullary(Value::Str(platform.default_shell())),
        "env" => {
            arity(name, args, 1)?;
            let key = args.first().map(|a| eval_text(env, a)).transpose()?;
            Ok(Value::Str(
                key.and_then(|k| std::env::var(k).ok()).unwrap_or_default(),
            ))
        }
        "MatchDistro" => {
            arity(name, args, 1)?;
            let wanted = args.first().map(|a| eval_text(env, a)).transpose()?;
            Ok(Value::Bool(wanted.is_some_and(|w| platform.match_distro(&w))))
        }
        "OnPath" | "Which" => {
            arity(name, args, 1)?;
            let program = args.first().map(|a| eval_text(env, a)).transpose()?;
            let found = program.and_then(|p| which::which(p).ok());
            Ok(if name == "OnPath" {
                Value::Bool(found.is_some())
            } else {
                Value::Str(found.map(|p| p.display().to_string()).unwrap_or_default())
            })
        }
        "eq" | "ne" => {
            arity(name, args, 2)?;
            let values = args
                .iter()
                .map(|a| eval(env, a))
                .collect::<Result<Vec<_>, _>>()?;
            let equal = values.first().map(Value::text) == values.get(1).map(Value::text);
            Ok(Value::Bool(if name == "eq" { equal } else { !equal }))
        }
        "not" => {
            arity(name, args, 1)?;
            let value = args.first().map(|a| eval(env, a)).transpose()?;
            Ok(Value::Bool(!value.is_some_and(|v| v.truthy())))
        }
        "and" | "or" => {
            if args.is_empty() {
                return Err(TemplateError::Arity {
                    name: name.to_string(),
                    expected: 1,
                    got: 0,
                });
            }
            let mut last = Value::Null;
            for arg in args {
                last = eval(env, arg)?;
                let stop = if name == "and" {
                    !last.truthy()
                } else {
                    last.truthy()
                };
                if stop {
                    break;
                }
            }
            Ok(last)
        }
        other => Err(TemplateError::UnknownFunction(other.to_string())),
    }
}
