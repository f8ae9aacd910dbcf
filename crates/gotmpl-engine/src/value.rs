// SPDX-License-Identifier: Apache-2.0 OR MIT
//! The dynamically typed value every template pipeline operates on.
//!
//! `Value` is a tagged union over the primitive and container kinds the
//! evaluator needs: absence, booleans, a family of integer/float widths
//! folded under one `Number` tag, characters (tracked by code point width),
//! strings, sequences, ordered maps, records (named fields plus optional
//! methods), and callables. Collections are reference-counted so cloning a
//! `Value` is cheap and observers of a cloned sequence/map see the same
//! backing data, matching the "shared by reference" rule callers rely on.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::error::Error;

/// The numeric family: every integer width spec.md calls for, folded under
/// one tag so arithmetic-adjacent builtins (`eq`, `lt`, ...) don't need to
/// match ten variants apart from everything else.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// Signed 8-bit integer.
    I8(i8),
    /// Signed 16-bit integer.
    I16(i16),
    /// Signed 32-bit integer.
    I32(i32),
    /// Signed 64-bit integer.
    I64(i64),
    /// Unsigned 8-bit integer.
    U8(u8),
    /// Unsigned 16-bit integer.
    U16(u16),
    /// Unsigned 32-bit integer.
    U32(u32),
    /// Unsigned 64-bit integer.
    U64(u64),
    /// 32-bit float.
    F32(f32),
    /// 64-bit float.
    F64(f64),
}

impl Number {
    /// True if this number is one of the integer variants.
    pub fn is_integer(self) -> bool {
        !matches!(self, Number::F32(_) | Number::F64(_))
    }

    /// Lossy widening to `f64`, used for truthiness, cross-kind comparison
    /// against a float, and the `coerce_number`-style builtin helpers.
    pub fn as_f64(self) -> f64 {
        match self {
            Number::I8(v) => v as f64,
            Number::I16(v) => v as f64,
            Number::I32(v) => v as f64,
            Number::I64(v) => v as f64,
            Number::U8(v) => v as f64,
            Number::U16(v) => v as f64,
            Number::U32(v) => v as f64,
            Number::U64(v) => v as f64,
            Number::F32(v) => v as f64,
            Number::F64(v) => v,
        }
    }

    /// Exact widening to `i128`, used to compare two integers without the
    /// precision loss `as_f64` would introduce near the 64-bit boundary.
    /// `None` for float variants.
    pub fn as_i128(self) -> Option<i128> {
        match self {
            Number::I8(v) => Some(v as i128),
            Number::I16(v) => Some(v as i128),
            Number::I32(v) => Some(v as i128),
            Number::I64(v) => Some(v as i128),
            Number::U8(v) => Some(v as i128),
            Number::U16(v) => Some(v as i128),
            Number::U32(v) => Some(v as i128),
            Number::U64(v) => Some(v as i128),
            Number::F32(_) | Number::F64(_) => None,
        }
    }

    /// `true` iff the numeric value is exactly zero.
    pub fn is_zero(self) -> bool {
        match self {
            Number::F32(v) => v == 0.0,
            Number::F64(v) => v == 0.0,
            other => other.as_i128() == Some(0),
        }
    }

    fn equals(self, other: Number) -> bool {
        match (self.as_i128(), other.as_i128()) {
            (Some(a), Some(b)) => a == b,
            _ => self.as_f64() == other.as_f64(),
        }
    }

    fn compare(self, other: Number) -> Ordering {
        match (self.as_i128(), other.as_i128()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => self
                .as_f64()
                .partial_cmp(&other.as_f64())
                .unwrap_or(Ordering::Equal),
        }
    }

    /// Narrowest integer literal fit for a non-negative magnitude, preferring
    /// signed widths unless the value needs the unsigned range (used by the
    /// parser's number-literal classifier).
    pub fn from_integer_literal(magnitude: u64, negative: bool) -> Number {
        if negative {
            if let Ok(v) = i8::try_from(-(magnitude as i128)) {
                return Number::I8(v);
            }
            if let Ok(v) = i16::try_from(-(magnitude as i128)) {
                return Number::I16(v);
            }
            if let Ok(v) = i32::try_from(-(magnitude as i128)) {
                return Number::I32(v);
            }
            return Number::I64(-(magnitude as i64));
        }
        if let Ok(v) = u8::try_from(magnitude) {
            return Number::U8(v);
        }
        if let Ok(v) = u16::try_from(magnitude) {
            return Number::U16(v);
        }
        if let Ok(v) = u32::try_from(magnitude) {
            return Number::U32(v);
        }
        Number::U64(magnitude)
    }

    /// Narrowest float fit (`f32` preferred, `f64` fallback) for a parsed
    /// floating-point literal.
    pub fn from_float_literal(value: f64) -> Number {
        let as_f32 = value as f32;
        if f64::from(as_f32) == value {
            Number::F32(as_f32)
        } else {
            Number::F64(value)
        }
    }
}

/// Parses a lexed number literal (optional leading `-`, optional
/// `0x`/`0o`/`0b` base prefix, `_` digit separators, fraction, exponent)
/// into the narrowest `Number` that represents it.
pub fn parse_number_literal(raw: &str) -> Option<Number> {
    let cleaned: String = raw.chars().filter(|&c| c != '_').collect();
    let (negative, rest) = match cleaned.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, cleaned.as_str()),
    };
    if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        return Some(Number::from_integer_literal(
            u64::from_str_radix(hex, 16).ok()?,
            negative,
        ));
    }
    if let Some(oct) = rest.strip_prefix("0o").or_else(|| rest.strip_prefix("0O")) {
        return Some(Number::from_integer_literal(
            u64::from_str_radix(oct, 8).ok()?,
            negative,
        ));
    }
    if let Some(bin) = rest.strip_prefix("0b").or_else(|| rest.strip_prefix("0B")) {
        return Some(Number::from_integer_literal(
            u64::from_str_radix(bin, 2).ok()?,
            negative,
        ));
    }
    if rest.contains('.') || rest.contains('e') || rest.contains('E') {
        return Some(Number::from_float_literal(cleaned.parse().ok()?));
    }
    Some(Number::from_integer_literal(rest.parse().ok()?, negative))
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::I8(v) => write!(f, "{v}"),
            Number::I16(v) => write!(f, "{v}"),
            Number::I32(v) => write!(f, "{v}"),
            Number::I64(v) => write!(f, "{v}"),
            Number::U8(v) => write!(f, "{v}"),
            Number::U16(v) => write!(f, "{v}"),
            Number::U32(v) => write!(f, "{v}"),
            Number::U64(v) => write!(f, "{v}"),
            Number::F32(v) => write!(f, "{v}"),
            Number::F64(v) => write!(f, "{v}"),
        }
    }
}

/// Code point width a character literal was lexed at (1/2/4 bytes), carried
/// alongside the code point itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharWidth {
    /// Fits in a byte (ASCII/Latin-1 range literal).
    W8,
    /// Fits in 16 bits (UTF-16 code unit range).
    W16,
    /// Full `char` range.
    W32,
}

/// A character value together with the width its literal determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharValue {
    /// 1, 2, or 4-byte width the originating literal selected.
    pub width: CharWidth,
    /// The Unicode scalar value.
    pub codepoint: u32,
}

impl CharValue {
    /// Builds a `CharValue` from a Rust `char`, choosing the narrowest width
    /// that holds it.
    pub fn from_char(ch: char) -> Self {
        let codepoint = ch as u32;
        let width = if codepoint <= 0xFF {
            CharWidth::W8
        } else if codepoint <= 0xFFFF {
            CharWidth::W16
        } else {
            CharWidth::W32
        };
        Self { width, codepoint }
    }

    /// Renders the character as a one-`char` string, for stringification.
    pub fn to_rust_char(self) -> char {
        char::from_u32(self.codepoint).unwrap_or('\u{FFFD}')
    }
}

/// How many arguments a `Callable` accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly `n` arguments, no more, no fewer.
    Fixed(usize),
    /// At least `min` arguments; any surplus is packed in as-is.
    Variadic(usize),
}

impl Arity {
    /// `true` when this arity accepts zero arguments (the "delegate"/
    /// zero-arg-method case field traversal auto-invokes).
    pub fn accepts_zero(self) -> bool {
        matches!(self, Arity::Fixed(0) | Arity::Variadic(0))
    }

    fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Fixed(n) => count == n,
            Arity::Variadic(min) => count >= min,
        }
    }
}

type BoxedFn = Rc<dyn Fn(&[Value]) -> Result<Value, Error>>;

/// A callable value: a global helper function, a record method, or a
/// closure captured by a pipeline variable.
#[derive(Clone)]
pub struct NativeFn {
    name: Rc<str>,
    arity: Arity,
    func: BoxedFn,
}

impl NativeFn {
    /// Wraps `func` as a callable named `name` with the given `arity`.
    pub fn new(
        name: impl Into<String>,
        arity: Arity,
        func: impl Fn(&[Value]) -> Result<Value, Error> + 'static,
    ) -> Self {
        Self {
            name: Rc::from(name.into().into_boxed_str()),
            arity,
            func: Rc::new(func),
        }
    }

    /// The name this callable was registered or declared under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared arity.
    pub fn arity(&self) -> Arity {
        self.arity
    }

    /// Calls the underlying function after checking arity.
    pub fn invoke(&self, args: &[Value]) -> Result<Value, Error> {
        if !self.arity.accepts(args.len()) {
            return Err(Error::render(
                format!(
                    "wrong number of arguments for {}: got {}, want {:?}",
                    self.name,
                    args.len(),
                    self.arity
                ),
                None,
            ));
        }
        (self.func)(args)
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFn")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// A record: named fields plus optionally named methods, the Value-level
/// stand-in for "structs/objects with behaviour" in spec.md's data model.
#[derive(Debug, Clone, Default)]
pub struct Record {
    fields: Rc<Vec<(String, Value)>>,
    methods: Rc<Vec<(String, NativeFn)>>,
}

impl Record {
    /// Starts building a record.
    pub fn builder() -> RecordBuilder {
        RecordBuilder::default()
    }

    /// Looks up a data field by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Looks up a method by name.
    pub fn method(&self, name: &str) -> Option<&NativeFn> {
        self.methods.iter().find(|(n, _)| n == name).map(|(_, m)| m)
    }

    /// Number of data fields (methods are not counted, matching spec.md's
    /// "record-field-count" `length` rule).
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Iterates fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &(String, Value)> {
        self.fields.iter()
    }
}

/// Builder for `Record`, mirroring the `FunctionRegistryBuilder` idiom used
/// for the global function table.
#[derive(Default)]
pub struct RecordBuilder {
    fields: Vec<(String, Value)>,
    methods: Vec<(String, NativeFn)>,
}

impl RecordBuilder {
    /// Adds a data field.
    pub fn field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.push((name.into(), value));
        self
    }

    /// Adds a method with an explicit arity and implementation.
    pub fn method(
        mut self,
        name: impl Into<String>,
        arity: Arity,
        func: impl Fn(&[Value]) -> Result<Value, Error> + 'static,
    ) -> Self {
        let name = name.into();
        self.methods
            .push((name.clone(), NativeFn::new(name, arity, func)));
        self
    }

    /// Finalizes the record.
    pub fn build(self) -> Record {
        Record {
            fields: Rc::new(self.fields),
            methods: Rc::new(self.methods),
        }
    }
}

/// The dynamic value every pipeline produces and consumes.
#[derive(Clone)]
pub enum Value {
    /// Absence of a value ("nil"/unit). Falls out of missing lookups.
    Absent,
    /// Boolean.
    Bool(bool),
    /// Any of the integer/float widths, see `Number`.
    Num(Number),
    /// A character, with the width its literal selected.
    Char(CharValue),
    /// A UTF-8 string.
    Str(Rc<str>),
    /// An ordered sequence of values.
    Seq(Rc<Vec<Value>>),
    /// An ordered association list acting as a map; order is insertion
    /// order (see DESIGN.md for why this beats a hash map here).
    Map(Rc<Vec<(Value, Value)>>),
    /// A record: named fields plus optional methods.
    Record(Record),
    /// A callable value.
    Callable(NativeFn),
}

impl Value {
    /// Shorthand for building a string value.
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(Rc::from(s.into().into_boxed_str()))
    }

    /// Shorthand for building a sequence value.
    pub fn seq(items: Vec<Value>) -> Self {
        Value::Seq(Rc::new(items))
    }

    /// Shorthand for building a map value from pairs, preserving order.
    pub fn map(pairs: Vec<(Value, Value)>) -> Self {
        Value::Map(Rc::new(pairs))
    }

    /// `false` iff absent, boolean false, numeric zero, empty string, empty
    /// sequence/map, or a zero code point character.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Absent => false,
            Value::Bool(b) => *b,
            Value::Num(n) => !n.is_zero(),
            Value::Char(c) => c.codepoint != 0,
            Value::Str(s) => !s.is_empty(),
            Value::Seq(items) => !items.is_empty(),
            Value::Map(pairs) => !pairs.is_empty(),
            Value::Record(_) | Value::Callable(_) => true,
        }
    }

    /// `true` iff this is the absent value.
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    /// Defined on string/sequence/map/record (field count); an error on any
    /// other kind.
    pub fn length(&self) -> Result<usize, Error> {
        match self {
            Value::Str(s) => Ok(s.chars().count()),
            Value::Seq(items) => Ok(items.len()),
            Value::Map(pairs) => Ok(pairs.len()),
            Value::Record(r) => Ok(r.field_count()),
            other => Err(Error::render(
                format!("len of untyped nil or {}", other.kind_name()),
                None,
            )),
        }
    }

    /// Single-step index: sequence by integer, map by any comparable key,
    /// record by string key (field lookup). A missing map/record key
    /// resolves to `Absent`; an out-of-range sequence index is an error.
    pub fn index(&self, key: &Value) -> Result<Value, Error> {
        match self {
            Value::Seq(items) => {
                let idx = key_as_index(key)?;
                items.get(idx).cloned().ok_or_else(|| {
                    Error::render(format!("index out of range: {idx}"), None)
                })
            }
            Value::Map(pairs) => Ok(pairs
                .iter()
                .find(|(k, _)| k.equals(key))
                .map(|(_, v)| v.clone())
                .unwrap_or(Value::Absent)),
            Value::Record(r) => match key {
                Value::Str(s) => Ok(r.field(s).cloned().unwrap_or(Value::Absent)),
                _ => Err(Error::render("record index key must be a string", None)),
            },
            Value::Str(s) => {
                let idx = key_as_index(key)?;
                s.chars()
                    .nth(idx)
                    .map(|c| Value::Char(CharValue::from_char(c)))
                    .ok_or_else(|| Error::render(format!("index out of range: {idx}"), None))
            }
            other => Err(Error::render(
                format!("cannot index into {}", other.kind_name()),
                None,
            )),
        }
    }

    /// Dotted-field-chain member lookup: record field/method, map
    /// string-keyed lookup, or sequence numeric lookup. Missing record
    /// fields and map keys resolve to `Absent`.
    pub fn member(&self, name: &str) -> Result<Value, Error> {
        match self {
            Value::Absent => Ok(Value::Absent),
            Value::Record(r) => {
                if let Some(field) = r.field(name) {
                    return Ok(field.clone());
                }
                if let Some(method) = r.method(name) {
                    return if method.arity().accepts_zero() {
                        method.invoke(&[])
                    } else {
                        Ok(Value::Callable(method.clone()))
                    };
                }
                Ok(Value::Absent)
            }
            Value::Map(pairs) => Ok(pairs
                .iter()
                .find(|(k, _)| matches!(k, Value::Str(s) if s.as_ref() == name))
                .map(|(_, v)| v.clone())
                .unwrap_or(Value::Absent)),
            Value::Seq(items) => {
                let idx: usize = name.parse().map_err(|_| {
                    Error::render(format!("array index must be integer, got {name}"), None)
                })?;
                items
                    .get(idx)
                    .cloned()
                    .ok_or_else(|| Error::render(format!("index out of range: {idx}"), None))
            }
            other => Err(Error::render(
                format!("can't access field {name} on {}", other.kind_name()),
                None,
            )),
        }
    }

    /// If this value is itself a zero-argument callable, invokes it and
    /// repeats until the result is no longer one. Used before each field
    /// traversal step (spec.md §4.1's "delegate" rule).
    pub fn resolve_delegate(self) -> Result<Value, Error> {
        let mut current = self;
        loop {
            match &current {
                Value::Callable(f) if f.arity().accepts_zero() => {
                    current = f.invoke(&[])?;
                }
                _ => return Ok(current),
            }
        }
    }

    /// `true` if this value can be invoked.
    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Callable(_))
    }

    /// Invokes this value as a callable.
    pub fn invoke(&self, args: &[Value]) -> Result<Value, Error> {
        match self {
            Value::Callable(f) => f.invoke(args),
            other => Err(Error::render(
                format!("cannot call {} as a function", other.kind_name()),
                None,
            )),
        }
    }

    /// Produces the `(key, value)` pairs `range` iterates: sequence
    /// (position, element), map (insertion order), integer `n` (0..n twice
    /// over), string (byte offset, character).
    pub fn iterate(&self) -> Result<Vec<(Value, Value)>, Error> {
        match self {
            Value::Seq(items) => Ok(items
                .iter()
                .enumerate()
                .map(|(i, v)| (Value::Num(Number::I64(i as i64)), v.clone()))
                .collect()),
            Value::Map(pairs) => Ok(pairs.iter().cloned().collect()),
            Value::Num(n) if n.is_integer() => {
                let count = n.as_i128().unwrap_or(0);
                if count < 0 {
                    return Err(Error::render("range over negative integer", None));
                }
                Ok((0..count)
                    .map(|i| {
                        let v = Value::Num(Number::I64(i as i64));
                        (v.clone(), v)
                    })
                    .collect())
            }
            Value::Str(s) => Ok(s
                .char_indices()
                .map(|(i, c)| {
                    (
                        Value::Num(Number::I64(i as i64)),
                        Value::Char(CharValue::from_char(c)),
                    )
                })
                .collect()),
            other => Err(Error::render(
                format!("range over {} is not supported", other.kind_name()),
                None,
            )),
        }
    }

    /// Same-kind value equality, with cross-kind numeric comparison by
    /// mathematical value. Strings and characters never compare equal to
    /// each other or to numbers.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Absent, Value::Absent) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a.equals(*b),
            (Value::Char(a), Value::Char(b)) => a.codepoint == b.codepoint,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Seq(a), Value::Seq(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| {
                        b.iter().any(|(k2, v2)| k.equals(k2) && v.equals(v2))
                    })
            }
            (Value::Record(a), Value::Record(b)) => {
                a.fields.len() == b.fields.len()
                    && a.fields
                        .iter()
                        .zip(b.fields.iter())
                        .all(|((n1, v1), (n2, v2))| n1 == n2 && v1.equals(v2))
            }
            (Value::Callable(a), Value::Callable(b)) => std::ptr::eq(
                std::rc::Rc::as_ptr(&a.func_ptr()) as *const (),
                std::rc::Rc::as_ptr(&b.func_ptr()) as *const (),
            ),
            _ => false,
        }
    }

    /// Defined on same-kind numerics (any width combination) and on strings
    /// (lexicographic, by byte); everything else is an ordering error.
    pub fn compare(&self, other: &Value) -> Result<Ordering, Error> {
        match (self, other) {
            (Value::Num(a), Value::Num(b)) => Ok(a.compare(*b)),
            (Value::Str(a), Value::Str(b)) => Ok(a.as_bytes().cmp(b.as_bytes())),
            _ => Err(Error::render(
                format!(
                    "incomparable types {} and {}",
                    self.kind_name(),
                    other.kind_name()
                ),
                None,
            )),
        }
    }

    /// Renders this value the way a `PipelineAction` stringifies its
    /// result: booleans as `true`/`false`, numbers in shortest decimal
    /// form, characters as their single-character text, strings verbatim,
    /// `Absent` as the empty string, and sequences/maps/records in a
    /// Go-`%v`-flavored diagnostic form (see DESIGN.md, open question 3).
    pub fn stringify(&self) -> String {
        match self {
            Value::Absent => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Num(n) => n.to_string(),
            Value::Char(c) => c.to_rust_char().to_string(),
            Value::Str(s) => s.to_string(),
            Value::Seq(items) => {
                let rendered: Vec<String> = items.iter().map(Value::stringify).collect();
                format!("[{}]", rendered.join(" "))
            }
            Value::Map(pairs) => {
                let mut rendered: Vec<(String, String)> = pairs
                    .iter()
                    .map(|(k, v)| (k.stringify(), v.stringify()))
                    .collect();
                rendered.sort_by(|a, b| a.0.cmp(&b.0));
                let joined: Vec<String> =
                    rendered.into_iter().map(|(k, v)| format!("{k}:{v}")).collect();
                format!("map[{}]", joined.join(" "))
            }
            Value::Record(r) => {
                let joined: Vec<String> = r
                    .fields()
                    .map(|(name, v)| format!("{name}:{}", v.stringify()))
                    .collect();
                format!("{{{}}}", joined.join(" "))
            }
            Value::Callable(f) => format!("<function {}>", f.name()),
        }
    }

    /// Short, lowercase kind name for error messages (`"string"`,
    /// `"sequence"`, ...).
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Absent => "nil",
            Value::Bool(_) => "bool",
            Value::Num(_) => "number",
            Value::Char(_) => "char",
            Value::Str(_) => "string",
            Value::Seq(_) => "sequence",
            Value::Map(_) => "map",
            Value::Record(_) => "record",
            Value::Callable(_) => "function",
        }
    }
}

impl NativeFn {
    fn func_ptr(&self) -> BoxedFn {
        self.func.clone()
    }
}

fn key_as_index(key: &Value) -> Result<usize, Error> {
    match key {
        Value::Num(n) => {
            let i = n
                .as_i128()
                .ok_or_else(|| Error::render("index must be an integer", None))?;
            usize::try_from(i).map_err(|_| Error::render("index out of range", None))
        }
        _ => Err(Error::render("index must be an integer", None)),
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Absent => write!(f, "Absent"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Num(n) => write!(f, "Num({n:?})"),
            Value::Char(c) => write!(f, "Char({c:?})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Seq(items) => write!(f, "Seq({items:?})"),
            Value::Map(pairs) => write!(f, "Map({pairs:?})"),
            Value::Record(r) => write!(f, "Record({r:?})"),
            Value::Callable(c) => write!(f, "Callable({c:?})"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}
