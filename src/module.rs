//! Static evaluation of CommonJS config modules.
//!
//! Used when no JS runtime is available (see [`crate::engine`]). Config
//! modules are parsed and evaluated here instead of being executed, which
//! covers what they typically contain:
//!
//! - `const`/`let`/`var` declarations, assignments to `module.exports`,
//!   `exports.x` and local bindings, and `export default`
//! - `require` of relative `.js`/`.json` files, `process.env`,
//!   `__dirname` and `__filename`
//! - object, array, string, template and number literals, spread,
//!   computed keys and shorthand properties
//! - member access (also `?.`), unary, arithmetic, comparison and logical
//!   operators, and `?:`
//!
//! Functions, classes, loops and calls other than `require` are rejected
//! with the position of the offending token. Values are copied on
//! assignment, so mutating an object after it was exported does not change
//! the export.

use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::value::{is_array_index, js_number_to_string, number_value, order_keys, GenericValue};

/// Deepest expression nesting a module may use
pub const MAX_NESTING: usize = 128;

/// Longest chain of modules requiring each other
const MAX_REQUIRE_DEPTH: usize = 32;

/// Why a module could not be evaluated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for ModuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at line {}, column {}", self.message, self.line, self.column)
    }
}

impl std::error::Error for ModuleError {}

/// Evaluate module source that has no file behind it.
///
/// `require` is unavailable since there is no directory to resolve from.
pub fn evaluate_module(source: &str) -> Result<GenericValue, ModuleError> {
    Loader::default().load_source(source, None).map(Js::into_json)
}

/// Evaluate the module at `path` whose content is `source`.
///
/// Relative `require` calls resolve against the module's directory.
pub fn evaluate_module_at(path: &Path, source: &str) -> Result<GenericValue, ModuleError> {
    let mut loader = Loader::default();
    if let Ok(canonical) = path.canonicalize() {
        loader.stack.push(canonical);
    }
    loader.load_source(source, Some(path)).map(Js::into_json)
}

// ===========================================
// Values
// ===========================================

#[derive(Debug, Clone, PartialEq)]
enum Js {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Js>),
    /// Properties in insertion order
    Object(Vec<(String, Js)>),
}

impl Js {
    /// JSON form: `undefined` properties are dropped, `undefined` items become `null`
    fn into_json(self) -> Value {
        match self {
            Js::Undefined | Js::Null => Value::Null,
            Js::Bool(b) => Value::Bool(b),
            Js::Number(n) => number_value(n),
            Js::String(s) => Value::String(s),
            Js::Array(items) => Value::Array(items.into_iter().map(Js::into_json).collect()),
            Js::Object(props) => Value::Object(order_keys(
                props
                    .into_iter()
                    .filter(|(_, v)| !matches!(v, Js::Undefined))
                    .map(|(k, v)| (k, v.into_json()))
                    .collect::<Map<_, _>>(),
            )),
        }
    }

    fn from_json(value: Value) -> Js {
        match value {
            Value::Null => Js::Null,
            Value::Bool(b) => Js::Bool(b),
            Value::Number(n) => Js::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => Js::String(s),
            Value::Array(items) => Js::Array(items.into_iter().map(Js::from_json).collect()),
            Value::Object(map) => {
                Js::Object(map.into_iter().map(|(k, v)| (k, Js::from_json(v))).collect())
            }
        }
    }

    /// Whether arrays and objects nest more than `limit` levels
    fn exceeds_depth(&self, limit: usize) -> bool {
        match self {
            Js::Array(items) => limit == 0 || items.iter().any(|v| v.exceeds_depth(limit - 1)),
            Js::Object(props) => {
                limit == 0 || props.iter().any(|(_, v)| v.exceeds_depth(limit - 1))
            }
            _ => false,
        }
    }

    fn is_nullish(&self) -> bool {
        matches!(self, Js::Undefined | Js::Null)
    }

    fn truthy(&self) -> bool {
        match self {
            Js::Undefined | Js::Null => false,
            Js::Bool(b) => *b,
            Js::Number(n) => *n != 0.0 && !n.is_nan(),
            Js::String(s) => !s.is_empty(),
            Js::Array(_) | Js::Object(_) => true,
        }
    }

    fn type_of(&self) -> &'static str {
        match self {
            Js::Undefined => "undefined",
            Js::Bool(_) => "boolean",
            Js::Number(_) => "number",
            Js::String(_) => "string",
            Js::Null | Js::Array(_) | Js::Object(_) => "object",
        }
    }

    fn to_number(&self) -> f64 {
        match self {
            Js::Undefined => f64::NAN,
            Js::Null => 0.0,
            Js::Bool(b) => f64::from(u8::from(*b)),
            Js::Number(n) => *n,
            Js::String(s) => string_to_number(s),
            Js::Array(_) | Js::Object(_) => string_to_number(&self.to_js_string()),
        }
    }

    fn to_js_string(&self) -> String {
        match self {
            Js::Undefined => "undefined".to_string(),
            Js::Null => "null".to_string(),
            Js::Bool(b) => b.to_string(),
            Js::Number(n) => js_number_to_string(*n),
            Js::String(s) => s.clone(),
            Js::Array(items) => items
                .iter()
                .map(|item| match item {
                    Js::Undefined | Js::Null => String::new(),
                    other => other.to_js_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
            Js::Object(_) => "[object Object]".to_string(),
        }
    }

    fn to_primitive(self) -> Js {
        if matches!(self, Js::Array(_) | Js::Object(_)) {
            Js::String(self.to_js_string())
        } else {
            self
        }
    }

    fn property(&self, key: &str) -> Js {
        match self {
            Js::Object(props) => props
                .iter()
                .find(|(k, _)| k == key)
                .map_or(Js::Undefined, |(_, v)| v.clone()),
            Js::Array(items) if key == "length" => Js::Number(items.len() as f64),
            Js::Array(items) => array_index(key)
                .and_then(|i| items.get(i))
                .cloned()
                .unwrap_or(Js::Undefined),
            Js::String(s) if key == "length" => Js::Number(s.encode_utf16().count() as f64),
            Js::String(s) => array_index(key)
                .and_then(|i| s.encode_utf16().nth(i))
                .map_or(Js::Undefined, |unit| Js::String(String::from_utf16_lossy(&[unit]))),
            _ => Js::Undefined,
        }
    }
}

fn array_index(key: &str) -> Option<usize> {
    if is_array_index(key) {
        key.parse().ok()
    } else {
        None
    }
}

/// Insert or replace a property; a replaced property keeps its position
fn set_property(props: &mut Vec<(String, Js)>, key: String, value: Js) {
    match props.iter_mut().find(|(k, _)| *k == key) {
        Some((_, slot)) => *slot = value,
        None => props.push((key, value)),
    }
}

/// Assign `value` at the end of `keys`, starting from `target`
fn set_path(target: &mut Js, keys: &[String], value: Js) -> Result<(), String> {
    let Some((last, parents)) = keys.split_last() else {
        *target = value;
        return Ok(());
    };

    let mut current = target;
    for key in parents {
        let next = match current {
            Js::Object(props) => props.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v),
            Js::Array(items) => array_index(key).and_then(|i| items.get_mut(i)),
            _ => None,
        };
        current = next.ok_or_else(|| format!("cannot set properties of undefined (setting '{last}')"))?;
    }

    match current {
        Js::Object(props) => set_property(props, last.clone(), value),
        Js::Array(items) => {
            if let Some(i) = array_index(last) {
                if i > items.len() + 4096 {
                    return Err(format!("array index {i} is too large"));
                }
                if i >= items.len() {
                    items.resize(i + 1, Js::Undefined);
                }
                items[i] = value;
            }
        }
        Js::Undefined => return Err(format!("cannot set properties of undefined (setting '{last}')")),
        Js::Null => return Err(format!("cannot set properties of null (setting '{last}')")),
        // Primitives ignore property writes
        _ => {}
    }
    Ok(())
}

fn string_to_number(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }
    let radix = match s.get(..2) {
        Some("0x" | "0X") => Some(16),
        Some("0o" | "0O") => Some(8),
        Some("0b" | "0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        let digits = &s[2..];
        if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
            return f64::NAN;
        }
        return digits
            .chars()
            .filter_map(|c| c.to_digit(radix))
            .fold(0.0, |acc, d| acc * f64::from(radix) + f64::from(d));
    }
    match s {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    // Rust also accepts spellings like `inf` and `nan`, JS does not
    if !s.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')) {
        return f64::NAN;
    }
    s.parse().unwrap_or(f64::NAN)
}

fn add(left: Js, right: Js) -> Js {
    let (left, right) = (left.to_primitive(), right.to_primitive());
    if matches!(left, Js::String(_)) || matches!(right, Js::String(_)) {
        Js::String(left.to_js_string() + &right.to_js_string())
    } else {
        Js::Number(left.to_number() + right.to_number())
    }
}

fn strict_equals(left: &Js, right: &Js) -> bool {
    match (left, right) {
        (Js::Undefined, Js::Undefined) | (Js::Null, Js::Null) => true,
        (Js::Bool(a), Js::Bool(b)) => a == b,
        (Js::Number(a), Js::Number(b)) => a == b,
        (Js::String(a), Js::String(b)) => a == b,
        _ => false,
    }
}

fn loose_equals(left: &Js, right: &Js) -> bool {
    match (left, right) {
        (Js::Undefined | Js::Null, Js::Undefined | Js::Null) => true,
        (Js::Undefined | Js::Null, _) | (_, Js::Undefined | Js::Null) => false,
        (Js::Array(_) | Js::Object(_), Js::Array(_) | Js::Object(_)) => false,
        (Js::String(a), Js::String(b)) => a == b,
        _ => left.to_number() == right.to_number(),
    }
}

fn compare(left: Js, right: Js) -> Option<Ordering> {
    match (left.to_primitive(), right.to_primitive()) {
        (Js::String(a), Js::String(b)) => Some(a.cmp(&b)),
        (a, b) => a.to_number().partial_cmp(&b.to_number()),
    }
}

// ===========================================
// Syntax tree
// ===========================================

struct Node {
    /// Char offset of the first token
    at: usize,
    expr: Expr,
}

enum Expr {
    Value(Js),
    Template { strings: Vec<String>, values: Vec<Node> },
    Array(Vec<Element>),
    Object(Vec<Property>),
    Ident(String),
    Member { object: Box<Node>, key: Key, optional: bool },
    Call { callee: Box<Node>, args: Vec<Node> },
    Unary(UnaryOp, Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Conditional(Box<Node>, Box<Node>, Box<Node>),
}

enum Key {
    Named(String),
    Computed(Box<Node>),
}

enum Element {
    Hole,
    Item(Node),
    Spread(Node),
}

enum Property {
    Entry(Key, Node),
    Spread(Node),
}

#[derive(Clone, Copy)]
enum UnaryOp {
    Neg,
    Plus,
    Not,
    TypeOf,
}

#[derive(Clone, Copy)]
enum BinaryOp {
    Nullish,
    Or,
    And,
    StrictEq,
    StrictNe,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Longest spellings first so `===` is not read as `==`
const BINARY_OPERATORS: &[(&str, BinaryOp, u8)] = &[
    ("??", BinaryOp::Nullish, 1),
    ("||", BinaryOp::Or, 1),
    ("&&", BinaryOp::And, 2),
    ("===", BinaryOp::StrictEq, 3),
    ("!==", BinaryOp::StrictNe, 3),
    ("==", BinaryOp::Eq, 3),
    ("!=", BinaryOp::Ne, 3),
    ("<=", BinaryOp::Le, 4),
    (">=", BinaryOp::Ge, 4),
    ("<", BinaryOp::Lt, 4),
    (">", BinaryOp::Gt, 4),
    ("+", BinaryOp::Add, 5),
    ("-", BinaryOp::Sub, 5),
    ("*", BinaryOp::Mul, 6),
    ("/", BinaryOp::Div, 6),
    ("%", BinaryOp::Rem, 6),
];

enum Stmt {
    Declare {
        constant: bool,
        name: String,
        init: Option<Node>,
        at: usize,
    },
    Assign {
        target: Node,
        value: Node,
    },
    ExportDefault(Node),
    Expr(Node),
}

// ===========================================
// Parser
// ===========================================

struct Parser<'a> {
    chars: &'a [char],
    pos: usize,
    depth: usize,
    /// End of the last trivia run that contained a line break
    line_break_at: Option<usize>,
}

impl<'a> Parser<'a> {
    fn new(chars: &'a [char]) -> Self {
        Self {
            chars,
            pos: 0,
            depth: 0,
            line_break_at: None,
        }
    }

    fn program(&mut self) -> Result<Vec<Stmt>, ModuleError> {
        // Hashbang line
        if self.starts_with("#!") {
            self.skip_line();
        }

        let mut body = Vec::new();
        loop {
            self.skip_trivia()?;
            if self.peek().is_none() {
                return Ok(body);
            }
            if self.eat(';') {
                continue;
            }
            self.statement(&mut body)?;
            self.end_of_statement()?;
        }
    }

    fn statement(&mut self, body: &mut Vec<Stmt>) -> Result<(), ModuleError> {
        let start = self.pos;
        let word = self.identifier();
        match word.as_str() {
            "const" | "let" | "var" => return self.declarations(word == "const", body),
            "export" => {
                self.skip_trivia()?;
                let default_pos = self.pos;
                if self.identifier() != "default" {
                    self.pos = default_pos;
                    return Err(self.error("only `export default` is supported"));
                }
                self.skip_trivia()?;
                body.push(Stmt::ExportDefault(self.expression()?));
                return Ok(());
            }
            "function" | "class" | "if" | "for" | "while" | "do" | "switch" | "try"
            | "throw" | "return" | "import" => {
                self.pos = start;
                return Err(self.error(format!("`{word}` statements are not supported")));
            }
            _ => self.pos = start,
        }

        let target = self.expression()?;
        self.skip_trivia()?;
        if self.at_assignment() {
            if !is_assignable(&target) {
                return Err(self.error_at(target.at, "invalid assignment target"));
            }
            self.pos += 1;
            self.skip_trivia()?;
            let value = self.expression()?;
            body.push(Stmt::Assign { target, value });
        } else {
            body.push(Stmt::Expr(target));
        }
        Ok(())
    }

    fn declarations(&mut self, constant: bool, body: &mut Vec<Stmt>) -> Result<(), ModuleError> {
        loop {
            self.skip_trivia()?;
            let at = self.pos;
            if matches!(self.peek(), Some('{' | '[')) {
                return Err(self.error("destructuring declarations are not supported"));
            }
            let name = self.identifier();
            if name.is_empty() {
                return Err(self.error("expected variable name"));
            }
            self.skip_trivia()?;
            let init = if self.at_assignment() {
                self.pos += 1;
                self.skip_trivia()?;
                Some(self.expression()?)
            } else {
                None
            };
            body.push(Stmt::Declare {
                constant,
                name,
                init,
                at,
            });

            self.skip_trivia()?;
            if !self.eat(',') {
                return Ok(());
            }
        }
    }

    /// `;`, a line break, or the end of the module
    fn end_of_statement(&mut self) -> Result<(), ModuleError> {
        self.skip_trivia()?;
        match self.peek() {
            None => Ok(()),
            Some(';') => {
                self.pos += 1;
                Ok(())
            }
            Some(_) if self.line_break_at == Some(self.pos) => Ok(()),
            Some(c) => Err(self.error(format!("unexpected `{c}` after statement"))),
        }
    }

    fn at_assignment(&self) -> bool {
        self.peek() == Some('=') && !self.starts_with("==") && !self.starts_with("=>")
    }

    /// Run `f` one nesting level deeper
    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ModuleError>,
    ) -> Result<T, ModuleError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(format!("nesting exceeds {MAX_NESTING} levels")));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn expression(&mut self) -> Result<Node, ModuleError> {
        self.nested(Self::conditional)
    }

    fn conditional(&mut self) -> Result<Node, ModuleError> {
        let test = self.binary(0)?;
        self.skip_trivia()?;
        if self.peek() != Some('?') || self.starts_with("??") || self.starts_with("?.") {
            return Ok(test);
        }

        self.pos += 1;
        self.skip_trivia()?;
        let then = self.expression()?;
        self.skip_trivia()?;
        self.expect(':')?;
        self.skip_trivia()?;
        let otherwise = self.expression()?;
        Ok(Node {
            at: test.at,
            expr: Expr::Conditional(Box::new(test), Box::new(then), Box::new(otherwise)),
        })
    }

    /// Precedence climbing over [`BINARY_OPERATORS`]
    fn binary(&mut self, min_precedence: u8) -> Result<Node, ModuleError> {
        let mut left = self.unary()?;
        loop {
            self.skip_trivia()?;
            let Some(&(spelling, op, precedence)) = BINARY_OPERATORS
                .iter()
                .find(|(spelling, _, _)| self.starts_with(spelling))
            else {
                return Ok(left);
            };
            if precedence < min_precedence {
                return Ok(left);
            }

            self.pos += spelling.chars().count();
            self.skip_trivia()?;
            let right = self.binary(precedence + 1)?;
            left = Node {
                at: left.at,
                expr: Expr::Binary(op, Box::new(left), Box::new(right)),
            };
        }
    }

    fn unary(&mut self) -> Result<Node, ModuleError> {
        let at = self.pos;
        let op = match self.peek() {
            Some('!') => Some((UnaryOp::Not, 1)),
            Some('-') if !self.starts_with("--") => Some((UnaryOp::Neg, 1)),
            Some('+') if !self.starts_with("++") => Some((UnaryOp::Plus, 1)),
            Some('t') if self.at_word("typeof") => Some((UnaryOp::TypeOf, 6)),
            _ => None,
        };
        let Some((op, len)) = op else {
            return self.postfix();
        };

        self.pos += len;
        self.skip_trivia()?;
        let operand = self.nested(Self::unary)?;
        Ok(Node {
            at,
            expr: Expr::Unary(op, Box::new(operand)),
        })
    }

    fn postfix(&mut self) -> Result<Node, ModuleError> {
        let mut node = self.primary()?;
        loop {
            self.skip_trivia()?;
            let optional = self.starts_with("?.")
                && !self.chars.get(self.pos + 2).is_some_and(|c| c.is_ascii_digit());

            let key = if optional {
                self.pos += 2;
                self.skip_trivia()?;
                match self.peek() {
                    Some('[') => self.computed_key()?,
                    Some('(') => return Err(self.error("optional calls are not supported")),
                    _ => Key::Named(self.member_name()?),
                }
            } else if self.eat('.') {
                self.skip_trivia()?;
                Key::Named(self.member_name()?)
            } else if self.peek() == Some('[') {
                self.computed_key()?
            } else if self.peek() == Some('(') {
                let args = self.arguments()?;
                node = Node {
                    at: node.at,
                    expr: Expr::Call {
                        callee: Box::new(node),
                        args,
                    },
                };
                continue;
            } else if self.peek() == Some('`') {
                return Err(self.error("tagged templates are not supported"));
            } else {
                return Ok(node);
            };

            node = Node {
                at: node.at,
                expr: Expr::Member {
                    object: Box::new(node),
                    key,
                    optional,
                },
            };
        }
    }

    fn primary(&mut self) -> Result<Node, ModuleError> {
        let at = self.pos;
        let expr = match self.peek() {
            None => return Err(self.error("unexpected end of module")),
            Some('{') => Expr::Object(self.object()?),
            Some('[') => Expr::Array(self.array()?),
            Some('"' | '\'') => Expr::Value(Js::String(self.string_literal()?)),
            Some('`') => self.template_literal()?,
            Some('(') => {
                self.pos += 1;
                self.skip_trivia()?;
                if self.eat(')') {
                    self.reject_arrow()?;
                    self.pos -= 1;
                    return Err(self.error("unexpected `)`"));
                }
                let inner = self.expression()?;
                self.skip_trivia()?;
                self.expect(')')?;
                self.reject_arrow()?;
                return Ok(inner);
            }
            Some(c) if c.is_ascii_digit() || (c == '.' && self.next_is_digit()) => {
                Expr::Value(Js::Number(self.number()?))
            }
            Some(c) if is_ident_start(c) => {
                let word = self.identifier();
                match word.as_str() {
                    "true" => Expr::Value(Js::Bool(true)),
                    "false" => Expr::Value(Js::Bool(false)),
                    "null" => Expr::Value(Js::Null),
                    "function" | "class" | "new" | "async" | "await" | "yield" | "this"
                    | "import" | "delete" | "void" => {
                        self.pos = at;
                        return Err(self.error(format!("`{word}` is not supported")));
                    }
                    _ => {
                        self.reject_arrow()?;
                        Expr::Ident(word)
                    }
                }
            }
            Some(c) => return Err(self.error(format!("unexpected `{c}`"))),
        };
        Ok(Node { at, expr })
    }

    fn reject_arrow(&mut self) -> Result<(), ModuleError> {
        let save = self.pos;
        self.skip_trivia()?;
        if self.starts_with("=>") {
            return Err(self.error("functions are not supported"));
        }
        self.pos = save;
        Ok(())
    }

    fn object(&mut self) -> Result<Vec<Property>, ModuleError> {
        self.expect('{')?;
        let mut props = Vec::new();

        loop {
            self.skip_trivia()?;
            if self.eat('}') {
                break;
            }

            if self.starts_with("...") {
                self.pos += 3;
                self.skip_trivia()?;
                props.push(Property::Spread(self.expression()?));
            } else {
                let key_at = self.pos;
                let (key, shorthand) = self.property_key()?;
                self.skip_trivia()?;
                if self.eat(':') {
                    self.skip_trivia()?;
                    props.push(Property::Entry(key, self.expression()?));
                } else if let (Some(name), Some(',' | '}')) = (shorthand, self.peek()) {
                    props.push(Property::Entry(
                        Key::Named(name.clone()),
                        Node {
                            at: key_at,
                            expr: Expr::Ident(name),
                        },
                    ));
                } else if self.peek() == Some('(') {
                    return Err(self.error("methods are not supported"));
                } else {
                    return Err(self.error("expected `:` after property name"));
                }
            }

            self.skip_trivia()?;
            if self.eat(',') {
                continue;
            }
            self.expect('}')?;
            break;
        }

        Ok(props)
    }

    /// The key, plus its name when it could be a shorthand property
    fn property_key(&mut self) -> Result<(Key, Option<String>), ModuleError> {
        match self.peek() {
            Some('"' | '\'') => Ok((Key::Named(self.string_literal()?), None)),
            Some(c) if c.is_ascii_digit() || c == '.' => {
                Ok((Key::Named(js_number_to_string(self.number()?)), None))
            }
            Some('[') => Ok((self.computed_key()?, None)),
            Some(c) if is_ident_start(c) => {
                let name = self.identifier();
                Ok((Key::Named(name.clone()), Some(name)))
            }
            Some(c) => Err(self.error(format!("unexpected `{c}` in object"))),
            None => Err(self.error("unterminated object")),
        }
    }

    fn computed_key(&mut self) -> Result<Key, ModuleError> {
        self.expect('[')?;
        self.skip_trivia()?;
        let key = self.expression()?;
        self.skip_trivia()?;
        self.expect(']')?;
        Ok(Key::Computed(Box::new(key)))
    }

    fn member_name(&mut self) -> Result<String, ModuleError> {
        let name = self.identifier();
        if name.is_empty() {
            return Err(self.error("expected property name"));
        }
        Ok(name)
    }

    fn arguments(&mut self) -> Result<Vec<Node>, ModuleError> {
        self.expect('(')?;
        let mut args = Vec::new();
        loop {
            self.skip_trivia()?;
            if self.eat(')') {
                return Ok(args);
            }
            args.push(self.expression()?);
            self.skip_trivia()?;
            if self.eat(',') {
                continue;
            }
            self.expect(')')?;
            return Ok(args);
        }
    }

    fn array(&mut self) -> Result<Vec<Element>, ModuleError> {
        self.expect('[')?;
        let mut items = Vec::new();

        loop {
            self.skip_trivia()?;
            if self.eat(']') {
                break;
            }
            // Elision: `[1,,2]`
            if self.eat(',') {
                items.push(Element::Hole);
                continue;
            }

            if self.starts_with("...") {
                self.pos += 3;
                self.skip_trivia()?;
                items.push(Element::Spread(self.expression()?));
            } else {
                items.push(Element::Item(self.expression()?));
            }

            self.skip_trivia()?;
            if self.eat(',') {
                continue;
            }
            self.expect(']')?;
            break;
        }

        Ok(items)
    }

    fn string_literal(&mut self) -> Result<String, ModuleError> {
        let quote = match self.peek() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.error("expected string")),
        };
        self.pos += 1;
        let mut out = String::new();

        loop {
            match self.next() {
                None | Some('\n') | Some('\r') => return Err(self.error("unterminated string")),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => self.escape(&mut out)?,
                Some(c) => out.push(c),
            }
        }
    }

    fn template_literal(&mut self) -> Result<Expr, ModuleError> {
        self.expect('`')?;
        let mut strings = Vec::new();
        let mut values = Vec::new();
        let mut current = String::new();

        loop {
            match self.next() {
                None => return Err(self.error("unterminated template string")),
                Some('`') => {
                    strings.push(current);
                    return Ok(Expr::Template { strings, values });
                }
                Some('$') if self.peek() == Some('{') => {
                    self.pos += 1;
                    strings.push(std::mem::take(&mut current));
                    self.skip_trivia()?;
                    values.push(self.expression()?);
                    self.skip_trivia()?;
                    self.expect('}')?;
                }
                Some('\\') => self.escape(&mut current)?,
                // Template strings normalize CRLF to LF
                Some('\r') => {
                    self.eat('\n');
                    current.push('\n');
                }
                Some(c) => current.push(c),
            }
        }
    }

    fn escape(&mut self, out: &mut String) -> Result<(), ModuleError> {
        let Some(c) = self.next() else {
            return Err(self.error("unterminated escape sequence"));
        };
        match c {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' if !self.peek().is_some_and(|d| d.is_ascii_digit()) => out.push('\0'),
            'x' => {
                let code = self.hex_digits(2)?;
                out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            'u' => {
                let code = self.unicode_escape()?;
                // Surrogate pair written as two \u escapes
                if (0xD800..0xDC00).contains(&code) && self.starts_with("\\u") {
                    let save = self.pos;
                    self.pos += 2;
                    let low = self.unicode_escape()?;
                    if (0xDC00..0xE000).contains(&low) {
                        let combined = 0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00);
                        out.push(char::from_u32(combined).unwrap_or(char::REPLACEMENT_CHARACTER));
                        return Ok(());
                    }
                    self.pos = save;
                }
                out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            // Line continuation
            '\n' | '\u{2028}' | '\u{2029}' => {}
            '\r' => {
                self.eat('\n');
            }
            c if c.is_ascii_digit() => {
                return Err(self.error("octal escape sequences are not allowed in strict mode"))
            }
            other => out.push(other),
        }
        Ok(())
    }

    fn unicode_escape(&mut self) -> Result<u32, ModuleError> {
        if self.eat('{') {
            let start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            let digits: String = self.chars[start..self.pos].iter().collect();
            self.expect('}')?;
            return u32::from_str_radix(&digits, 16)
                .ok()
                .filter(|code| *code <= 0x10FFFF)
                .ok_or_else(|| self.error("invalid unicode escape"));
        }
        self.hex_digits(4)
    }

    fn hex_digits(&mut self, count: usize) -> Result<u32, ModuleError> {
        let mut code = 0;
        for _ in 0..count {
            let digit = self
                .peek()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.error("invalid hexadecimal escape"))?;
            code = code * 16 + digit;
            self.pos += 1;
        }
        Ok(code)
    }

    fn number(&mut self) -> Result<f64, ModuleError> {
        let start = self.pos;

        if self.peek() == Some('0') {
            let radix = match self.chars.get(self.pos + 1) {
                Some('x' | 'X') => Some(16),
                Some('o' | 'O') => Some(8),
                Some('b' | 'B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.pos += 2;
                let digits = self.digits(|c| c.is_digit(radix));
                if digits.is_empty() {
                    return Err(self.error("missing digits in number literal"));
                }
                self.reject_identifier_after_number()?;
                // Accumulate as a double so literals past 2^64 round instead of failing
                return Ok(digits
                    .chars()
                    .filter_map(|c| c.to_digit(radix))
                    .fold(0.0, |acc, d| acc * f64::from(radix) + f64::from(d)));
            }
        }

        let mut text = self.digits(|c| c.is_ascii_digit());
        if self.eat('.') {
            text.push('.');
            text.push_str(&self.digits(|c| c.is_ascii_digit()));
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            text.push('e');
            self.pos += 1;
            if let Some(sign @ ('+' | '-')) = self.peek() {
                text.push(sign);
                self.pos += 1;
            }
            let exponent = self.digits(|c| c.is_ascii_digit());
            if exponent.is_empty() {
                return Err(self.error("missing exponent in number literal"));
            }
            text.push_str(&exponent);
        }
        self.reject_identifier_after_number()?;

        if text == "." || text.is_empty() {
            self.pos = start;
            return Err(self.error("invalid number literal"));
        }
        text.parse()
            .map_err(|_| self.error("invalid number literal"))
    }

    /// Digits with `_` separators removed
    fn digits(&mut self, is_digit: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if is_digit(c) {
                out.push(c);
            } else if c != '_' {
                break;
            }
            self.pos += 1;
        }
        out
    }

    fn reject_identifier_after_number(&self) -> Result<(), ModuleError> {
        match self.peek() {
            Some('n') => Err(self.error("BigInt literals are not supported")),
            Some(c) if is_ident_start(c) || c.is_ascii_digit() => {
                Err(self.error("identifier directly after number literal"))
            }
            _ => Ok(()),
        }
    }

    fn identifier(&mut self) -> String {
        let start = self.pos;
        if self.peek().is_some_and(is_ident_start) {
            self.pos += 1;
            while self.peek().is_some_and(is_ident_part) {
                self.pos += 1;
            }
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn at_word(&self, word: &str) -> bool {
        self.starts_with(word)
            && !self
                .chars
                .get(self.pos + word.chars().count())
                .is_some_and(|c| is_ident_part(*c))
    }

    fn next_is_digit(&self) -> bool {
        self.chars.get(self.pos + 1).is_some_and(|c| c.is_ascii_digit())
    }

    /// Skip whitespace and comments
    fn skip_trivia(&mut self) -> Result<(), ModuleError> {
        let start = self.pos;
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() || c == '\u{feff}' => self.pos += 1,
                Some('/') if self.starts_with("//") => self.skip_line(),
                Some('/') if self.starts_with("/*") => {
                    let comment_start = self.pos;
                    self.pos += 2;
                    loop {
                        if self.starts_with("*/") {
                            self.pos += 2;
                            break;
                        }
                        if self.next().is_none() {
                            self.pos = comment_start;
                            return Err(self.error("unterminated block comment"));
                        }
                    }
                }
                _ => break,
            }
        }
        if self.chars[start..self.pos].iter().any(|c| is_line_terminator(*c)) {
            self.line_break_at = Some(self.pos);
        }
        Ok(())
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.peek() {
            if is_line_terminator(c) {
                break;
            }
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), ModuleError> {
        if self.eat(expected) {
            return Ok(());
        }
        match self.peek() {
            Some(c) => Err(self.error(format!("expected `{expected}`, found `{c}`"))),
            None => Err(self.error(format!("expected `{expected}`, found end of module"))),
        }
    }

    fn starts_with(&self, text: &str) -> bool {
        let mut i = self.pos;
        for c in text.chars() {
            if self.chars.get(i) != Some(&c) {
                return false;
            }
            i += 1;
        }
        true
    }

    fn error(&self, message: impl Into<String>) -> ModuleError {
        self.error_at(self.pos, message)
    }

    fn error_at(&self, at: usize, message: impl Into<String>) -> ModuleError {
        locate(self.chars, at, message)
    }
}

fn locate(chars: &[char], at: usize, message: impl Into<String>) -> ModuleError {
    let consumed = &chars[..at.min(chars.len())];
    let line = consumed.iter().filter(|c| **c == '\n').count() + 1;
    let column = consumed.iter().rev().take_while(|c| **c != '\n').count() + 1;
    ModuleError {
        message: message.into(),
        line,
        column,
    }
}

fn is_assignable(node: &Node) -> bool {
    match &node.expr {
        Expr::Ident(_) => true,
        Expr::Member {
            object,
            optional: false,
            ..
        } => is_assignable(object),
        _ => false,
    }
}

fn is_ident_start(c: char) -> bool {
    c == '$' || c == '_' || c.is_alphabetic()
}

fn is_ident_part(c: char) -> bool {
    is_ident_start(c) || c.is_alphanumeric() || c == '\u{200c}' || c == '\u{200d}'
}

fn is_line_terminator(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

// ===========================================
// Evaluation
// ===========================================

#[derive(Default)]
struct Loader {
    /// Exports of required files by canonical path
    cache: HashMap<PathBuf, Js>,
    /// Modules being evaluated, outermost first
    stack: Vec<PathBuf>,
}

impl Loader {
    fn load_source(&mut self, source: &str, path: Option<&Path>) -> Result<Js, ModuleError> {
        let chars: Vec<char> = source.chars().collect();
        let program = Parser::new(&chars).program()?;

        let mut scope = Scope {
            loader: self,
            chars: &chars,
            path,
            bindings: HashMap::new(),
            exports: Js::Object(Vec::new()),
            detached: false,
        };
        for stmt in &program {
            scope.execute(stmt)?;
        }
        Ok(scope.exports)
    }

    fn require(&mut self, path: &Path) -> Result<Js, String> {
        let canonical = path
            .canonicalize()
            .map_err(|e| format!("cannot read \"{}\": {e}", path.display()))?;
        if let Some(value) = self.cache.get(&canonical) {
            return Ok(value.clone());
        }
        if self.stack.contains(&canonical) {
            return Err(format!("circular require of \"{}\"", path.display()));
        }
        if self.stack.len() >= MAX_REQUIRE_DEPTH {
            return Err(format!("more than {MAX_REQUIRE_DEPTH} nested requires"));
        }

        let content = fs::read_to_string(&canonical)
            .map_err(|e| format!("cannot read \"{}\": {e}", path.display()))?;

        let value = if canonical.extension().is_some_and(|ext| ext == "json") {
            let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
            serde_json::from_str(content)
                .map(Js::from_json)
                .map_err(|e| format!("could not parse JSON in \"{}\": {e}", path.display()))?
        } else {
            self.stack.push(canonical.clone());
            let result = self.load_source(&content, Some(&canonical));
            self.stack.pop();
            result.map_err(|e| format!("in \"{}\": {e}", path.display()))?
        };

        self.cache.insert(canonical, value.clone());
        Ok(value)
    }
}

struct Binding {
    value: Js,
    constant: bool,
}

/// Top-level scope of one module
struct Scope<'a> {
    loader: &'a mut Loader,
    chars: &'a [char],
    path: Option<&'a Path>,
    bindings: HashMap<String, Binding>,
    exports: Js,
    /// `module.exports` was replaced, so `exports` no longer aliases it
    detached: bool,
}

impl Scope<'_> {
    fn execute(&mut self, stmt: &Stmt) -> Result<(), ModuleError> {
        match stmt {
            Stmt::Declare {
                constant,
                name,
                init,
                at,
            } => {
                if self.bindings.get(name).is_some_and(|b| b.constant) {
                    return Err(self.fail(*at, format!("`{name}` has already been declared")));
                }
                let value = match init {
                    Some(node) => self.eval(node)?,
                    None => Js::Undefined,
                };
                self.check_depth(*at, &value)?;
                self.bindings.insert(
                    name.clone(),
                    Binding {
                        value,
                        constant: *constant,
                    },
                );
            }
            Stmt::Assign { target, value } => {
                let value = self.eval(value)?;
                self.assign(target, value)?;
            }
            Stmt::ExportDefault(node) => {
                let value = self.eval(node)?;
                self.check_depth(node.at, &value)?;
                self.exports = value;
                self.detached = true;
            }
            Stmt::Expr(node) => {
                self.eval(node)?;
            }
        }
        Ok(())
    }

    fn assign(&mut self, target: &Node, value: Js) -> Result<(), ModuleError> {
        let mut keys = Vec::new();
        let base = self.target_path(target, &mut keys)?;
        let at = target.at;

        let result = if let Some(binding) = self.bindings.get_mut(base) {
            if keys.is_empty() && binding.constant {
                return Err(self.fail(at, format!("assignment to constant `{base}`")));
            }
            set_path(&mut binding.value, &keys, value)
        } else {
            match (base, keys.split_first()) {
                ("module", Some((first, rest))) if first == "exports" => {
                    if rest.is_empty() {
                        self.detached = true;
                    }
                    set_path(&mut self.exports, rest, value)
                }
                ("exports", None) => {
                    // Rebinding the alias leaves module.exports alone
                    self.bindings.insert(
                        "exports".to_string(),
                        Binding {
                            value,
                            constant: false,
                        },
                    );
                    Ok(())
                }
                ("exports", Some(_)) if self.detached => Ok(()),
                ("exports", Some(_)) => set_path(&mut self.exports, &keys, value),
                ("module", _) => Err("only `module.exports` can be assigned".to_string()),
                _ => return Err(self.fail(at, format!("`{base}` is not defined"))),
            }
        };
        result.map_err(|message| self.fail(at, message))?;

        let root = self.bindings.get(base).map_or(&self.exports, |b| &b.value);
        self.check_depth(at, root)
    }

    /// Values built up over several statements are held to the same limit
    /// as literals
    fn check_depth(&self, at: usize, value: &Js) -> Result<(), ModuleError> {
        if value.exceeds_depth(MAX_NESTING) {
            return Err(self.fail(at, format!("nesting exceeds {MAX_NESTING} levels")));
        }
        Ok(())
    }

    /// Base identifier of an assignment target, with its keys in `keys`
    fn target_path<'n>(
        &mut self,
        node: &'n Node,
        keys: &mut Vec<String>,
    ) -> Result<&'n str, ModuleError> {
        match &node.expr {
            Expr::Ident(name) => Ok(name.as_str()),
            Expr::Member {
                object,
                key,
                optional: false,
            } => {
                let base = self.target_path(object, keys)?;
                let key = self.key(key)?;
                keys.push(key);
                Ok(base)
            }
            _ => Err(self.fail(node.at, "invalid assignment target")),
        }
    }

    fn eval(&mut self, node: &Node) -> Result<Js, ModuleError> {
        Ok(self.eval_chain(node)?.unwrap_or(Js::Undefined))
    }

    /// `None` when an optional chain short-circuited
    fn eval_chain(&mut self, node: &Node) -> Result<Option<Js>, ModuleError> {
        let value = match &node.expr {
            Expr::Member {
                object,
                key,
                optional,
            } => {
                let Some(base) = self.eval_chain(object)? else {
                    return Ok(None);
                };
                if *optional && base.is_nullish() {
                    return Ok(None);
                }
                let key = self.key(key)?;
                if base.is_nullish() {
                    return Err(self.fail(
                        node.at,
                        format!(
                            "cannot read properties of {} (reading '{key}')",
                            base.to_js_string()
                        ),
                    ));
                }
                base.property(&key)
            }
            Expr::Call { callee, args } => self.call(node.at, callee, args)?,
            Expr::Value(value) => value.clone(),
            Expr::Template { strings, values } => {
                let mut out = String::new();
                for (i, text) in strings.iter().enumerate() {
                    out.push_str(text);
                    if let Some(value) = values.get(i) {
                        out.push_str(&self.eval(value)?.to_js_string());
                    }
                }
                Js::String(out)
            }
            Expr::Array(elements) => self.array(elements)?,
            Expr::Object(props) => self.object(props)?,
            Expr::Ident(name) => self
                .lookup(name)
                .ok_or_else(|| self.fail(node.at, format!("`{name}` is not defined")))?,
            Expr::Unary(UnaryOp::TypeOf, operand)
                if matches!(&operand.expr, Expr::Ident(name) if self.lookup(name).is_none()) =>
            {
                Js::String("undefined".to_string())
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                match op {
                    UnaryOp::Neg => Js::Number(-value.to_number()),
                    UnaryOp::Plus => Js::Number(value.to_number()),
                    UnaryOp::Not => Js::Bool(!value.truthy()),
                    UnaryOp::TypeOf => Js::String(value.type_of().to_string()),
                }
            }
            Expr::Binary(op, left, right) => self.binary(*op, left, right)?,
            Expr::Conditional(test, then, otherwise) => {
                if self.eval(test)?.truthy() {
                    self.eval(then)?
                } else {
                    self.eval(otherwise)?
                }
            }
        };
        Ok(Some(value))
    }

    fn array(&mut self, elements: &[Element]) -> Result<Js, ModuleError> {
        let mut items = Vec::with_capacity(elements.len());
        for element in elements {
            match element {
                Element::Hole => items.push(Js::Undefined),
                Element::Item(node) => items.push(self.eval(node)?),
                Element::Spread(node) => match self.eval(node)? {
                    Js::Array(more) => items.extend(more),
                    Js::String(s) => items.extend(s.chars().map(|c| Js::String(c.to_string()))),
                    other => {
                        return Err(self.fail(
                            node.at,
                            format!("{} is not iterable", other.to_js_string()),
                        ))
                    }
                },
            }
        }
        Ok(Js::Array(items))
    }

    fn object(&mut self, props: &[Property]) -> Result<Js, ModuleError> {
        let mut out = Vec::with_capacity(props.len());
        for prop in props {
            match prop {
                Property::Entry(key, node) => {
                    let key = self.key(key)?;
                    let value = self.eval(node)?;
                    set_property(&mut out, key, value);
                }
                Property::Spread(node) => match self.eval(node)? {
                    Js::Object(more) => {
                        for (key, value) in more {
                            set_property(&mut out, key, value);
                        }
                    }
                    Js::Array(items) => {
                        for (i, value) in items.into_iter().enumerate() {
                            set_property(&mut out, i.to_string(), value);
                        }
                    }
                    Js::String(s) => {
                        for (i, c) in s.chars().enumerate() {
                            set_property(&mut out, i.to_string(), Js::String(c.to_string()));
                        }
                    }
                    // Spreading primitives adds nothing
                    _ => {}
                },
            }
        }
        Ok(Js::Object(out))
    }

    fn key(&mut self, key: &Key) -> Result<String, ModuleError> {
        match key {
            Key::Named(name) => Ok(name.clone()),
            Key::Computed(node) => Ok(self.eval(node)?.to_js_string()),
        }
    }

    fn binary(&mut self, op: BinaryOp, left: &Node, right: &Node) -> Result<Js, ModuleError> {
        let left = self.eval(left)?;
        match op {
            BinaryOp::And if left.truthy() => return self.eval(right),
            BinaryOp::Or if !left.truthy() => return self.eval(right),
            BinaryOp::Nullish if left.is_nullish() => return self.eval(right),
            BinaryOp::And | BinaryOp::Or | BinaryOp::Nullish => return Ok(left),
            _ => {}
        }

        let right = self.eval(right)?;
        Ok(match op {
            BinaryOp::Add => add(left, right),
            BinaryOp::Sub => Js::Number(left.to_number() - right.to_number()),
            BinaryOp::Mul => Js::Number(left.to_number() * right.to_number()),
            BinaryOp::Div => Js::Number(left.to_number() / right.to_number()),
            BinaryOp::Rem => Js::Number(left.to_number() % right.to_number()),
            BinaryOp::StrictEq => Js::Bool(strict_equals(&left, &right)),
            BinaryOp::StrictNe => Js::Bool(!strict_equals(&left, &right)),
            BinaryOp::Eq => Js::Bool(loose_equals(&left, &right)),
            BinaryOp::Ne => Js::Bool(!loose_equals(&left, &right)),
            BinaryOp::Lt => Js::Bool(compare(left, right) == Some(Ordering::Less)),
            BinaryOp::Gt => Js::Bool(compare(left, right) == Some(Ordering::Greater)),
            BinaryOp::Le => Js::Bool(matches!(
                compare(left, right),
                Some(Ordering::Less | Ordering::Equal)
            )),
            BinaryOp::Ge => Js::Bool(matches!(
                compare(left, right),
                Some(Ordering::Greater | Ordering::Equal)
            )),
            BinaryOp::And | BinaryOp::Or | BinaryOp::Nullish => left,
        })
    }

    fn call(&mut self, at: usize, callee: &Node, args: &[Node]) -> Result<Js, ModuleError> {
        let is_require = matches!(&callee.expr, Expr::Ident(name) if name == "require")
            && !self.bindings.contains_key("require");
        if !is_require {
            let name = callee_name(callee).unwrap_or_else(|| "functions".to_string());
            return Err(self.fail(
                at,
                format!("calling `{name}` is not supported without a JS runtime"),
            ));
        }

        let specifier = match args.first() {
            Some(arg) => self.eval(arg)?,
            None => Js::Undefined,
        };
        let Js::String(specifier) = specifier else {
            return Err(self.fail(at, "`require` expects a string"));
        };
        let Some(dir) = self.path.and_then(Path::parent) else {
            return Err(self.fail(
                at,
                format!("cannot `require('{specifier}')` outside of a module file"),
            ));
        };

        let resolved = resolve_require(dir, &specifier).map_err(|e| self.fail(at, e))?;
        self.loader.require(&resolved).map_err(|e| self.fail(at, e))
    }

    fn lookup(&self, name: &str) -> Option<Js> {
        if let Some(binding) = self.bindings.get(name) {
            return Some(binding.value.clone());
        }
        match name {
            "undefined" => Some(Js::Undefined),
            "NaN" => Some(Js::Number(f64::NAN)),
            "Infinity" => Some(Js::Number(f64::INFINITY)),
            "module" => Some(Js::Object(vec![("exports".to_string(), self.exports.clone())])),
            "exports" if self.detached => Some(Js::Object(Vec::new())),
            "exports" => Some(self.exports.clone()),
            "process" => Some(process_object()),
            "__filename" => self.path.map(|p| Js::String(absolute(p).display().to_string())),
            "__dirname" => self
                .path
                .map(absolute)
                .and_then(|p| p.parent().map(|d| Js::String(d.display().to_string()))),
            _ => None,
        }
    }

    fn fail(&self, at: usize, message: impl Into<String>) -> ModuleError {
        locate(self.chars, at, message)
    }
}

/// Dotted name of a called identifier or member, like `console.log`
fn callee_name(node: &Node) -> Option<String> {
    match &node.expr {
        Expr::Ident(name) => Some(name.clone()),
        Expr::Member {
            object,
            key: Key::Named(key),
            ..
        } => callee_name(object).map(|base| format!("{base}.{key}")),
        _ => None,
    }
}

fn absolute(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// `process` with `env` and `platform`
fn process_object() -> Js {
    let env = std::env::vars_os()
        .map(|(k, v)| {
            (
                k.to_string_lossy().into_owned(),
                Js::String(v.to_string_lossy().into_owned()),
            )
        })
        .collect();
    let platform = match std::env::consts::OS {
        "macos" => "darwin",
        "windows" => "win32",
        other => other,
    };
    Js::Object(vec![
        ("env".to_string(), Js::Object(env)),
        ("platform".to_string(), Js::String(platform.to_string())),
    ])
}

/// Resolve a relative `require` specifier the way Node looks up files
fn resolve_require(dir: &Path, specifier: &str) -> Result<PathBuf, String> {
    let relative = specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier.starts_with('/')
        || specifier == "."
        || specifier == "..";
    if !relative {
        return Err(format!(
            "cannot resolve package `{specifier}` without a JS runtime"
        ));
    }

    let target = dir.join(specifier);
    [
        target.clone(),
        with_suffix(&target, ".js"),
        with_suffix(&target, ".json"),
        target.join("index.js"),
        target.join("index.json"),
    ]
    .into_iter()
    .find(|candidate| candidate.is_file())
    .ok_or_else(|| format!("cannot find module '{specifier}'"))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn eval(source: &str) -> Value {
        evaluate_module(source).unwrap()
    }

    fn eval_err(source: &str) -> ModuleError {
        evaluate_module(source).unwrap_err()
    }

    fn eval_file(dir: &TempDir, name: &str) -> Result<Value, ModuleError> {
        let path = dir.path().join(name);
        let source = fs::read_to_string(&path).unwrap();
        evaluate_module_at(&path, &source)
    }

    // ===========================================
    // Export forms
    // ===========================================

    #[test]
    fn test_module_exports_object() {
        let value = eval("\"use strict\";\n\nmodule.exports =\n{\n  \"a\": 1,\n  \"b\": [1, 2]\n};");
        assert_eq!(value, json!({"a": 1, "b": [1, 2]}));
    }

    #[test]
    fn test_export_default() {
        assert_eq!(eval("export default { name: 'x' }"), json!({"name": "x"}));
    }

    #[test]
    fn test_without_directive_or_semicolon() {
        assert_eq!(eval("module.exports = [true, false, null]"), json!([true, false, null]));
    }

    #[test]
    fn test_single_quoted_directive_and_comments() {
        let source = r#"#!/usr/bin/env node
'use strict'
// leading comment
/* block
   comment */
module.exports = {
  // inline comment
  region: 'us-east-1', /* trailing */
};
"#;
        assert_eq!(eval(source), json!({"region": "us-east-1"}));
    }

    #[test]
    fn test_parenthesized_value() {
        assert_eq!(eval("module.exports = ({ a: (1) });"), json!({"a": 1}));
    }

    #[test]
    fn test_module_without_export_is_empty_object() {
        assert_eq!(eval("'use strict';\n"), json!({}));
        assert_eq!(eval(""), json!({}));
    }

    #[test]
    fn test_exports_properties() {
        let value = eval("exports.a = 1;\nmodule.exports.b = 2;\nexports['c'] = 3;");
        assert_eq!(value, json!({"a": 1, "b": 2, "c": 3}));
    }

    #[test]
    fn test_exports_alias_detached_after_reassignment() {
        let value = eval("module.exports = { a: 1 };\nexports.b = 2;");
        assert_eq!(value, json!({"a": 1}));
    }

    // ===========================================
    // Bindings and expressions
    // ===========================================

    #[test]
    fn test_declarations_and_references() {
        let source = "
const stage = 'dev'
let memory = 512, timeout
timeout = 6
var tags = ['a']
tags[1] = 'b'
module.exports = { stage, memory: memory * 2, timeout, tags }
";
        assert_eq!(
            eval(source),
            json!({"stage": "dev", "memory": 1024, "timeout": 6, "tags": ["a", "b"]})
        );
    }

    #[test]
    fn test_nested_binding_mutation() {
        let source = "const config = { provider: {} };\nconfig.provider.name = 'aws';\nmodule.exports = config;";
        assert_eq!(eval(source), json!({"provider": {"name": "aws"}}));
    }

    #[test]
    fn test_constant_reassignment_rejected() {
        let err = eval_err("const a = 1;\na = 2;");
        assert!(err.message.contains("constant"));
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_spread_and_computed_keys() {
        let source = "
const base = { a: 1, b: 2 };
const key = 'dyn';
module.exports = { ...base, b: 3, [key + 'amic']: true, list: [0, ...[1, 2]] };
";
        assert_eq!(
            eval(source),
            json!({"a": 1, "b": 3, "dynamic": true, "list": [0, 1, 2]})
        );
    }

    #[test]
    fn test_template_substitution() {
        let source = "const stage = 'prod';\nmodule.exports = `svc-${stage}-${1 + 1}`;";
        assert_eq!(eval(source), json!("svc-prod-2"));
    }

    #[test]
    fn test_operators() {
        let source = "module.exports = [
  1 + 2 * 3, (1 + 2) * 3, 7 % 4, '1' + 1, '3' * '4', 1 / 0,
  null ?? 'x', 0 || 'y', 0 ?? 'z', 1 && 2,
  1 === 1, '1' == 1, null == undefined, 'a' < 'b', 2 >= 3,
  !0, -'5', typeof 'a', typeof missing, true ? 'yes' : 'no'
];";
        assert_eq!(
            eval(source),
            json!([
                7, 9, 3, "11", 12, null,
                "x", "y", 0, 2,
                true, true, true, true, false,
                true, -5, "string", "undefined", "yes"
            ])
        );
    }

    #[test]
    fn test_logical_operators_short_circuit() {
        let source = "const cfg = undefined;\nmodule.exports = { a: cfg && cfg.x, b: cfg ? cfg.x : 'none', c: cfg?.x.y };";
        assert_eq!(eval(source), json!({"b": "none"}));
    }

    #[test]
    fn test_member_access() {
        let source = "const o = { list: [10, 20], name: 'abc' };\nmodule.exports = [o.list[1], o.list.length, o.name.length, o['name'][0], o.missing];";
        assert_eq!(eval(source), json!([20, 2, 3, "a", null]));
    }

    #[test]
    fn test_property_of_undefined_rejected() {
        let err = eval_err("const o = {};\nmodule.exports = o.a.b;");
        assert!(err.message.contains("reading 'b'"));
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_process_env() {
        let source = "module.exports = { path: typeof process.env.PATH, stage: process.env.JSCONFIG_UNSET_VARIABLE || 'dev' };";
        assert_eq!(eval(source), json!({"path": "string", "stage": "dev"}));
    }

    // ===========================================
    // require
    // ===========================================

    #[test]
    fn test_require_sibling_module() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("base.js"), "module.exports = {region:'us-east-1'}").unwrap();
        fs::write(
            dir.path().join("s-function.js"),
            "const base = require('./base'); module.exports = {name:'f', region: base.region};",
        )
        .unwrap();

        assert_eq!(
            eval_file(&dir, "s-function.js").unwrap(),
            json!({"name": "f", "region": "us-east-1"})
        );
    }

    #[test]
    fn test_require_json_and_index() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("shared")).unwrap();
        fs::write(dir.path().join("shared/index.js"), "exports.tags = require('../tags.json');").unwrap();
        fs::write(dir.path().join("tags.json"), r#"["a", "b"]"#).unwrap();
        fs::write(dir.path().join("s-x.js"), "module.exports = require('./shared');").unwrap();

        assert_eq!(eval_file(&dir, "s-x.js").unwrap(), json!({"tags": ["a", "b"]}));
    }

    #[test]
    fn test_require_cycle_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.js"), "module.exports = require('./b');").unwrap();
        fs::write(dir.path().join("b.js"), "module.exports = require('./a');").unwrap();

        assert!(eval_file(&dir, "a.js").unwrap_err().message.contains("circular"));
    }

    #[test]
    fn test_require_missing_or_package_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("s-x.js"), "module.exports = require('./nope');").unwrap();
        fs::write(dir.path().join("s-y.js"), "module.exports = require('lodash');").unwrap();

        assert!(eval_file(&dir, "s-x.js").unwrap_err().message.contains("cannot find module"));
        assert!(eval_file(&dir, "s-y.js").unwrap_err().message.contains("lodash"));
    }

    #[test]
    fn test_require_error_names_required_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("base.js"), "module.exports = {\n  a: broken\n};").unwrap();
        fs::write(dir.path().join("s-x.js"), "module.exports = require('./base');").unwrap();

        let err = eval_file(&dir, "s-x.js").unwrap_err();
        assert!(err.message.contains("base.js"));
        assert!(err.message.contains("`broken` is not defined at line 2"));
    }

    // ===========================================
    // Literals
    // ===========================================

    #[test]
    fn test_key_order_follows_js_objects() {
        let value = eval("module.exports = { zeta: 1, alpha: 2, 'mid key': 3, 10: 4, 2: 5 };");
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["2", "10", "zeta", "alpha", "mid key"]);
    }

    #[test]
    fn test_numeric_keys_use_js_number_strings() {
        let value = eval("module.exports = { 1e21: 'a', 0x10: 'b', 1.50: 'c', .5: 'd' };");
        assert_eq!(value, json!({"16": "b", "1e+21": "a", "1.5": "c", "0.5": "d"}));
    }

    #[test]
    fn test_duplicate_key_keeps_first_position_last_value() {
        let value = eval("module.exports = { a: 1, b: 2, a: 3 };");
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"{"a":3,"b":2}"#);
    }

    #[test]
    fn test_trailing_commas() {
        assert_eq!(eval("module.exports = { a: [1, 2,], };"), json!({"a": [1, 2]}));
    }

    #[test]
    fn test_undefined_dropped_from_objects_and_nulled_in_arrays() {
        let value = eval("module.exports = { a: undefined, b: [undefined, 1], c: 2 };");
        assert_eq!(value, json!({"b": [null, 1], "c": 2}));
    }

    #[test]
    fn test_undefined_override_keeps_sibling_order() {
        let value = eval("module.exports = { a: 1, b: 2, c: 3, a: undefined };");
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"{"b":2,"c":3}"#);
    }

    #[test]
    fn test_array_holes() {
        assert_eq!(eval("module.exports = [1,,2];"), json!([1, null, 2]));
    }

    #[test]
    fn test_numbers() {
        let value = eval(
            "module.exports = [0, -1, +2, 1.5, .5, 1e3, 2.0, 0x1F, 0o17, 0b101, 1_000, -0, 1E-2, 0xFFFFFFFFFFFFFFFFFF];",
        );
        assert_eq!(
            value,
            json!([0, -1, 2, 1.5, 0.5, 1000, 2, 31, 15, 5, 1000, 0, 0.01, 4.722366482869645e21])
        );
    }

    #[test]
    fn test_non_finite_numbers_become_null() {
        assert_eq!(eval("module.exports = [NaN, Infinity, -Infinity];"), json!([null, null, null]));
    }

    #[test]
    fn test_string_escapes() {
        let value = eval(r#"module.exports = ["a\nb", 'it\'s', "\x41B\u{43}", "😀", "tab\there"];"#);
        assert_eq!(value, json!(["a\nb", "it's", "ABC", "\u{1F600}", "tab\there"]));
    }

    #[test]
    fn test_line_continuation_in_string() {
        assert_eq!(eval("module.exports = 'ab\\\ncd';"), json!("abcd"));
    }

    #[test]
    fn test_template_string_without_substitution() {
        assert_eq!(eval("module.exports = `multi\nline`;"), json!("multi\nline"));
    }

    #[test]
    fn test_unicode_identifier_keys() {
        assert_eq!(eval("module.exports = { $ref: 1, _x: 2, héllo: 3 };"), json!({"$ref": 1, "_x": 2, "héllo": 3}));
    }

    #[test]
    fn test_reserved_words_as_keys() {
        assert_eq!(eval("module.exports = { default: true, null: 1 };"), json!({"default": true, "null": 1}));
    }

    // ===========================================
    // Rejections
    // ===========================================

    #[test]
    fn test_require_without_file_rejected() {
        let err = eval_err("module.exports = { a: require('./other') };");
        assert!(err.message.contains("require"));
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 23);
    }

    #[test]
    fn test_undefined_identifier_rejected() {
        let err = eval_err("const x = 1;\nmodule.exports = y;");
        assert!(err.message.contains("`y` is not defined"));
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 18);
    }

    #[test]
    fn test_function_call_rejected() {
        let err = eval_err("module.exports = {};\nconsole.log('x');");
        assert!(err.message.contains("not supported"));
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_functions_rejected() {
        assert!(eval_err("module.exports = () => 1;").message.contains("functions"));
        assert!(eval_err("module.exports = function () {};").message.contains("`function`"));
        assert!(eval_err("if (a) {}").message.contains("`if`"));
    }

    #[test]
    fn test_statements_need_separator() {
        let err = eval_err("module.exports = 1 module.exports = 2");
        assert!(err.message.contains("after statement"));
    }

    #[test]
    fn test_unterminated_object() {
        let err = eval_err("module.exports = { a: 1");
        assert!(err.message.contains("end of module"));
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let source = format!("module.exports = {}1{};", "[".repeat(50_000), "]".repeat(50_000));
        let err = eval_err(&source);
        assert!(err.message.contains("nesting exceeds 128 levels"));

        let err = eval_err(&format!("module.exports = {}1;", "!".repeat(50_000)));
        assert!(err.message.contains("nesting"));
    }

    #[test]
    fn test_deep_value_built_by_statements_rejected() {
        let source = format!("let a = 1;\n{}module.exports = a;", "a = [a];\n".repeat(50_000));
        let err = eval_err(&source);
        assert!(err.message.contains("nesting exceeds 128 levels"));
        assert_eq!(err.line, 130);
    }

    #[test]
    fn test_nesting_within_limit() {
        let source = format!("module.exports = {}1{};", "[".repeat(100), "]".repeat(100));
        let mut value = eval(&source);
        for _ in 0..100 {
            value = value.as_array().unwrap()[0].clone();
        }
        assert_eq!(value, json!(1));
    }

    #[test]
    fn test_bigint_rejected() {
        assert!(eval_err("module.exports = 10n;").message.contains("BigInt"));
    }

    #[test]
    fn test_error_display_includes_position() {
        let err = eval_err("module.exports = @;");
        assert_eq!(err.to_string(), "unexpected `@` at line 1, column 18");
    }
}
