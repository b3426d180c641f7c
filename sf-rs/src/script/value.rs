//! Runtime value type for the sf scripting language.
//!
//! A [`Value`] is a tagged union over integers, floats, strings, binary and
//! custom blobs, plus a non-owning reference to another value.  Arithmetic
//! dispatches on the receiver: the left operand's type decides how the right
//! operand is coerced, and compound assignment keeps the receiver's type.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::ops::{AddAssign, DivAssign, MulAssign, RemAssign, SubAssign};
use std::rc::{Rc, Weak};
use std::str::FromStr;

/// Maximum size of a string payload in bytes.
pub const MAX_STRING: usize = 0xFFFF;
/// Maximum size of a binary payload in bytes.
pub const MAX_BINARY: usize = 0xFFFF;
/// Maximum size of a custom payload in bytes.
pub const MAX_CUSTOM: usize = 0xFFFF;

/// Significant digits used when a float is turned into text.
pub const FLOAT_DIGITS: usize = 15;

const INVALID_TEXT: &str = "n/a";

// ── ValueType ─────────────────────────────────────────────────────────────────

/// The type tag of a [`Value`].  References report the type of their target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Invalid,
    Undefined,
    Integer,
    Float,
    String,
    Binary,
    Custom,
}

impl ValueType {
    pub const ALL: &'static [ValueType] = &[
        ValueType::Invalid,
        ValueType::Undefined,
        ValueType::Integer,
        ValueType::Float,
        ValueType::String,
        ValueType::Binary,
        ValueType::Custom,
    ];

    /// Name used in the `(TYPE,"content")` stream form.
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Invalid => "INVALID",
            ValueType::Undefined => "UNDEF",
            ValueType::Integer => "INTEGER",
            ValueType::Float => "FLOAT",
            ValueType::String => "STRING",
            ValueType::Binary => "BINARY",
            ValueType::Custom => "SPECIAL",
        }
    }

    /// Look a type up by name; unknown names map to `Invalid`.
    pub fn from_name(name: &str) -> ValueType {
        name.parse().unwrap_or(ValueType::Invalid)
    }
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        ValueType::ALL
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| format!("unknown value type {s:?}"))
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Value ─────────────────────────────────────────────────────────────────────

/// Shared storage a [`Value::Ref`] can point at.
pub type SharedValue = Rc<RefCell<Value>>;

/// A script runtime value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    Invalid,
    #[default]
    Undefined,
    Int(i64),
    Float(f64),
    Str(String),
    Binary(Vec<u8>),
    Custom(Vec<u8>),
    /// Non-owning reference; every operation is forwarded to the target.
    /// A dangling reference behaves like `Invalid`.
    Ref(Weak<RefCell<Value>>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.get_string())
    }
}

impl Value {
    /// Wrap a value in shared storage so references can be taken to it.
    pub fn shared(v: impl Into<Value>) -> SharedValue {
        Rc::new(RefCell::new(v.into()))
    }

    /// A reference to `target`.  The reference never keeps it alive.
    pub fn reference(target: &SharedValue) -> Value {
        Value::Ref(Rc::downgrade(target))
    }

    /// A binary blob, truncated to [`MAX_BINARY`].
    pub fn binary(bytes: &[u8]) -> Value {
        Value::Binary(bytes[..bytes.len().min(MAX_BINARY)].to_vec())
    }

    /// A custom blob, truncated to [`MAX_CUSTOM`].
    pub fn custom(bytes: &[u8]) -> Value {
        Value::Custom(bytes[..bytes.len().min(MAX_CUSTOM)].to_vec())
    }

    /// The zero value of a type.
    pub fn of_type(ty: ValueType) -> Value {
        match ty {
            ValueType::Invalid => Value::Invalid,
            ValueType::Undefined => Value::Undefined,
            ValueType::Integer => Value::Int(0),
            ValueType::Float => Value::Float(0.0),
            ValueType::String => Value::Str(String::new()),
            ValueType::Binary => Value::Binary(Vec::new()),
            ValueType::Custom => Value::Custom(Vec::new()),
        }
    }

    /// Run `f` on the value this one resolves to.
    fn resolved<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        match self {
            Value::Ref(weak) => match weak.upgrade() {
                Some(rc) => {
                    let inner = rc.borrow();
                    f(&inner)
                }
                None => f(&Value::Invalid),
            },
            other => f(other),
        }
    }

    /// A plain copy of the value, with references resolved.
    pub fn deref_value(&self) -> Value {
        self.resolved(Value::clone)
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Invalid => ValueType::Invalid,
            Value::Undefined => ValueType::Undefined,
            Value::Int(_) => ValueType::Integer,
            Value::Float(_) => ValueType::Float,
            Value::Str(_) => ValueType::String,
            Value::Binary(_) => ValueType::Binary,
            Value::Custom(_) => ValueType::Custom,
            Value::Ref(_) => self.resolved(Value::value_type),
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Value::Ref(_))
    }

    pub fn is_undefined(&self) -> bool {
        self.value_type() == ValueType::Undefined
    }

    pub fn is_number(&self) -> bool {
        matches!(self.value_type(), ValueType::Integer | ValueType::Float)
    }

    /// Zero-ness used by `!`, `&&`, `||` and conditional jumps.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Int(n) => *n == 0,
            Value::Float(x) => x.abs() <= f64::from_bits(1),
            Value::Str(s) => s.is_empty(),
            Value::Binary(b) | Value::Custom(b) => b.is_empty(),
            Value::Invalid | Value::Undefined => true,
            Value::Ref(_) => self.resolved(Value::is_zero),
        }
    }

    // ── Assignment ────────────────────────────────────────────────────────────

    /// Replace type and payload.
    pub fn set(&mut self, v: impl Into<Value>) {
        *self = v.into();
    }

    /// Assign keeping the current type, unless the receiver is `Undefined`
    /// or `Invalid`.  Assigning through a reference writes the target.
    pub fn assign(&mut self, v: &Value) {
        let incoming = v.deref_value();
        if let Value::Ref(weak) = self {
            if let Some(rc) = weak.upgrade() {
                rc.borrow_mut().assign(&incoming);
            }
            return;
        }
        let ty = self.value_type();
        *self = incoming;
        if ty != ValueType::Undefined && ty != ValueType::Invalid {
            self.set_type(ty);
        }
    }

    /// Convert in place.  Returns `false` when the conversion lost
    /// information (bad number text, bad hex) or the value is `Invalid`.
    pub fn set_type(&mut self, ty: ValueType) -> bool {
        if let Value::Ref(weak) = self {
            return match weak.upgrade() {
                Some(rc) => rc.borrow_mut().set_type(ty),
                None => false,
            };
        }
        let current = self.value_type();
        if current == ty {
            return true;
        }
        if current == ValueType::Invalid {
            return false;
        }
        let mut errors = 0u32;
        let converted = match ty {
            ValueType::Invalid => Value::Invalid,
            ValueType::Undefined => Value::Undefined,
            ValueType::Integer => Value::Int(self.get_integer_counting(&mut errors)),
            ValueType::Float => Value::Float(self.get_float_counting(&mut errors)),
            ValueType::String => Value::from(self.get_string()),
            ValueType::Binary | ValueType::Custom => {
                let bytes = match std::mem::take(self) {
                    Value::Binary(b) | Value::Custom(b) => b,
                    other => {
                        let text = other.get_string();
                        from_hex(&text).unwrap_or_else(|| {
                            errors += 1;
                            vec![0; text.len() / 2]
                        })
                    }
                };
                if ty == ValueType::Binary {
                    Value::binary(&bytes)
                } else {
                    Value::custom(&bytes)
                }
            }
        };
        *self = converted;
        errors == 0
    }

    // ── Coercion ──────────────────────────────────────────────────────────────

    pub fn get_integer(&self) -> i64 {
        let mut errors = 0;
        self.get_integer_counting(&mut errors)
    }

    /// Integer coercion; text that is not fully numeric bumps `errors`.
    pub fn get_integer_counting(&self, errors: &mut u32) -> i64 {
        match self {
            Value::Int(n) => *n,
            Value::Float(x) => x.round() as i64,
            Value::Str(s) => {
                let (n, end) = parse_c_long(s);
                if end < s.len() {
                    *errors += 1;
                }
                n
            }
            Value::Ref(_) => self.resolved(|v| v.get_integer_counting(errors)),
            Value::Binary(_) | Value::Custom(_) | Value::Invalid | Value::Undefined => 0,
        }
    }

    pub fn get_float(&self) -> f64 {
        let mut errors = 0;
        self.get_float_counting(&mut errors)
    }

    /// Float coercion; text that is not fully numeric bumps `errors`.
    pub fn get_float_counting(&self, errors: &mut u32) -> f64 {
        match self {
            Value::Int(n) => *n as f64,
            Value::Float(x) => *x,
            Value::Str(s) if s.is_empty() => 0.0,
            Value::Str(s) => {
                let (x, end) = parse_c_double(s);
                if end < s.len() {
                    *errors += 1;
                }
                x
            }
            Value::Ref(_) => self.resolved(|v| v.get_float_counting(errors)),
            Value::Binary(_) | Value::Custom(_) | Value::Invalid | Value::Undefined => 0.0,
        }
    }

    pub fn get_string(&self) -> String {
        match self {
            Value::Invalid => INVALID_TEXT.to_owned(),
            Value::Undefined => String::new(),
            Value::Int(n) => n.to_string(),
            Value::Float(x) => format_float(*x),
            Value::Str(s) => s.clone(),
            Value::Binary(b) | Value::Custom(b) => to_hex(b),
            Value::Ref(_) => self.resolved(Value::get_string),
        }
    }

    /// Raw bytes of a blob value, `None` for every other type.
    pub fn blob(&self) -> Option<Vec<u8>> {
        match self {
            Value::Binary(b) | Value::Custom(b) => Some(b.clone()),
            Value::Ref(_) => self.resolved(Value::blob),
            _ => None,
        }
    }

    // ── Arithmetic ────────────────────────────────────────────────────────────

    pub fn mul(&self, v: &Value) -> Value {
        match self {
            Value::Int(n) => Value::Int(n.wrapping_mul(v.get_integer())),
            Value::Float(x) => Value::Float(x * v.get_float()),
            Value::Ref(_) => self.resolved(|t| t.mul(v)),
            _ => self.clone(),
        }
    }

    /// Division; a zero divisor is replaced by one.
    pub fn div(&self, v: &Value) -> Value {
        match self {
            Value::Int(n) => {
                let d = match v.get_integer() {
                    0 => 1,
                    d => d,
                };
                Value::Int(n.wrapping_div(d))
            }
            Value::Float(x) => {
                let d = v.get_float();
                Value::Float(x / if d == 0.0 { 1.0 } else { d })
            }
            Value::Ref(_) => self.resolved(|t| t.div(v)),
            _ => self.clone(),
        }
    }

    pub fn add(&self, v: &Value) -> Value {
        match self {
            Value::Invalid | Value::Undefined => v.deref_value(),
            Value::Int(n) => Value::Int(n.wrapping_add(v.get_integer())),
            Value::Float(x) => Value::Float(x + v.get_float()),
            Value::Str(s) => Value::from(format!("{s}{}", v.get_string())),
            Value::Ref(_) => self.resolved(|t| t.add(v)),
            Value::Binary(_) | Value::Custom(_) => self.clone(),
        }
    }

    pub fn sub(&self, v: &Value) -> Value {
        match self {
            Value::Int(n) => Value::Int(n.wrapping_sub(v.get_integer())),
            Value::Float(x) => Value::Float(x - v.get_float()),
            Value::Ref(_) => self.resolved(|t| t.sub(v)),
            _ => self.clone(),
        }
    }

    /// Modulo with the sign of the divisor; a zero divisor is replaced by one.
    pub fn modulo(&self, v: &Value) -> Value {
        match self {
            Value::Int(k) => {
                let n = match v.get_integer() {
                    0 => 1,
                    n => n,
                };
                let r = k.wrapping_rem(n);
                Value::Int(if (n > 0 && r < 0) || (n < 0 && r > 0) { r + n } else { r })
            }
            Value::Float(k) => {
                let n = match v.get_float() {
                    d if d == 0.0 => 1.0,
                    d => d,
                };
                let r = k % n;
                Value::Float(if (n > 0.0 && r < 0.0) || (n < 0.0 && r > 0.0) { r + n } else { r })
            }
            Value::Ref(_) => self.resolved(|t| t.modulo(v)),
            _ => self.clone(),
        }
    }

    /// Three-way comparison driven by the receiver's type: -1, 0 or 1.
    pub fn compare(&self, v: &Value) -> i32 {
        match self {
            Value::Int(n) => {
                let l = v.get_integer();
                match n.cmp(&l) {
                    Ordering::Equal => 0,
                    Ordering::Less => -1,
                    Ordering::Greater => 1,
                }
            }
            Value::Float(b) => {
                let a = v.get_float();
                let mut rv = if a == *b { 0 } else { 1 };
                if rv != 0 {
                    let ratio = (a / (a - b)).abs();
                    rv = if ratio.is_nan() || ratio < 1e10 { 1 } else { 0 };
                }
                if a > *b {
                    -rv
                } else {
                    rv
                }
            }
            Value::Str(s) => match s.as_str().cmp(v.get_string().as_str()) {
                Ordering::Less => -1,
                Ordering::Equal => 0,
                Ordering::Greater => 1,
            },
            Value::Binary(b) | Value::Custom(b) => match v.blob() {
                Some(other) if other.len() != b.len() => {
                    if b.len() < other.len() {
                        -1
                    } else {
                        1
                    }
                }
                Some(other) => match b.as_slice().cmp(other.as_slice()) {
                    Ordering::Less => -1,
                    Ordering::Equal => 0,
                    Ordering::Greater => 1,
                },
                None => 1,
            },
            Value::Invalid | Value::Undefined => 1,
            Value::Ref(_) => self.resolved(|t| t.compare(v)),
        }
    }

    /// Round to the nearest multiple of `step`; a zero step is a no-op.
    pub fn round(&mut self, step: &Value) {
        if step.is_zero() {
            return;
        }
        match self {
            Value::Int(n) => {
                let s = step.get_integer();
                if s != 0 {
                    *n = n.wrapping_add(s / 2).wrapping_div(s).wrapping_mul(s);
                }
            }
            Value::Float(x) => {
                let s = step.get_float();
                *x = (*x / s + 0.5).floor() * s;
            }
            Value::Ref(weak) => {
                if let Some(rc) = weak.upgrade() {
                    rc.borrow_mut().round(step);
                }
            }
            _ => {}
        }
    }

    // ── Stream form ───────────────────────────────────────────────────────────

    /// `(TYPE,"content")`; string content is escaped with `"` as delimiter.
    pub fn to_stream(&self) -> String {
        let ty = self.value_type();
        let content = if ty == ValueType::String {
            escape(&self.get_string(), Some('"'))
        } else {
            self.get_string()
        };
        format!("({},\"{}\")", ty.name(), content)
    }

    /// Parse the form produced by [`Value::to_stream`].
    pub fn from_stream(s: &str) -> Option<Value> {
        let inner = s.trim().strip_prefix('(')?.strip_suffix(')')?;
        let (type_name, rest) = inner.split_once(',')?;
        let content = rest.strip_prefix('"')?.strip_suffix('"')?;
        let ty = ValueType::from_name(type_name.trim());
        match ty {
            ValueType::Invalid => Some(Value::Invalid),
            ValueType::String => Some(Value::from(unescape(content))),
            _ => {
                let mut v = Value::from(content);
                v.set_type(ty);
                Some(v)
            }
        }
    }
}

// ── Comparison operators ──────────────────────────────────────────────────────

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        self.compare(other) == 0
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Value) -> Option<Ordering> {
        Some(self.compare(other).cmp(&0))
    }
}

// ── Compound assignment ───────────────────────────────────────────────────────

impl AddAssign<&Value> for Value {
    fn add_assign(&mut self, rhs: &Value) {
        let v = self.add(rhs);
        self.assign(&v);
    }
}

impl SubAssign<&Value> for Value {
    fn sub_assign(&mut self, rhs: &Value) {
        let v = self.sub(rhs);
        self.assign(&v);
    }
}

impl MulAssign<&Value> for Value {
    fn mul_assign(&mut self, rhs: &Value) {
        let v = self.mul(rhs);
        self.assign(&v);
    }
}

impl DivAssign<&Value> for Value {
    fn div_assign(&mut self, rhs: &Value) {
        let v = self.div(rhs);
        self.assign(&v);
    }
}

impl RemAssign<&Value> for Value {
    fn rem_assign(&mut self, rhs: &Value) {
        let v = self.modulo(rhs);
        self.assign(&v);
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Int(if b { 1 } else { 0 })
    }
}

impl From<String> for Value {
    fn from(mut s: String) -> Self {
        if s.len() > MAX_STRING {
            let mut cut = MAX_STRING;
            while !s.is_char_boundary(cut) {
                cut -= 1;
            }
            s.truncate(cut);
        }
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::from(s.to_owned())
    }
}

// ── Text helpers ──────────────────────────────────────────────────────────────

/// C-style `strtol` with base auto-detection (`0x` hex, leading `0` octal).
/// Returns the value and the byte index where parsing stopped; 0 when no
/// digits were found.
pub fn parse_c_long(s: &str) -> (i64, usize) {
    let b = s.as_bytes();
    let mut i = 0;
    while i < b.len() && b[i].is_ascii_whitespace() {
        i += 1;
    }
    let negative = match b.get(i) {
        Some(b'-') => {
            i += 1;
            true
        }
        Some(b'+') => {
            i += 1;
            false
        }
        _ => false,
    };
    let (radix, start) = if b.get(i) == Some(&b'0')
        && matches!(b.get(i + 1), Some(b'x') | Some(b'X'))
        && b.get(i + 2).is_some_and(|c| c.is_ascii_hexdigit())
    {
        (16, i + 2)
    } else if b.get(i) == Some(&b'0') {
        (8, i)
    } else {
        (10, i)
    };
    let mut end = start;
    let mut acc: i64 = 0;
    while let Some(d) = b.get(end).and_then(|c| (*c as char).to_digit(radix)) {
        acc = acc.saturating_mul(radix as i64).saturating_add(d as i64);
        end += 1;
    }
    if end == start {
        return (0, 0);
    }
    (if negative { acc.saturating_neg() } else { acc }, end)
}

/// C-style `strtod` for decimal text, `inf` and `nan`.  Returns the value and
/// the byte index where parsing stopped; 0 when nothing was converted.
pub fn parse_c_double(s: &str) -> (f64, usize) {
    let b = s.as_bytes();
    let mut i = 0;
    while i < b.len() && b[i].is_ascii_whitespace() {
        i += 1;
    }
    let sign_start = i;
    if matches!(b.get(i), Some(b'-') | Some(b'+')) {
        i += 1;
    }
    for word in ["infinity", "inf", "nan"] {
        if b.get(i..i + word.len()).is_some_and(|w| w.eq_ignore_ascii_case(word.as_bytes())) {
            let negative = b.get(sign_start) == Some(&b'-');
            let x = if word == "nan" { f64::NAN } else { f64::INFINITY };
            return (if negative { -x } else { x }, i + word.len());
        }
    }
    let mut digits = 0;
    while b.get(i).is_some_and(u8::is_ascii_digit) {
        i += 1;
        digits += 1;
    }
    if b.get(i) == Some(&b'.') {
        i += 1;
        while b.get(i).is_some_and(u8::is_ascii_digit) {
            i += 1;
            digits += 1;
        }
    }
    if digits == 0 {
        return (0.0, 0);
    }
    if matches!(b.get(i), Some(b'e') | Some(b'E')) {
        let mut j = i + 1;
        if matches!(b.get(j), Some(b'-') | Some(b'+')) {
            j += 1;
        }
        if b.get(j).is_some_and(u8::is_ascii_digit) {
            while b.get(j).is_some_and(u8::is_ascii_digit) {
                j += 1;
            }
            i = j;
        }
    }
    (s[sign_start..i].parse().unwrap_or(0.0), i)
}

/// Format like C's `%g` with [`FLOAT_DIGITS`] significant digits.
pub fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_owned();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_owned();
    }
    if x == 0.0 {
        return if x.is_sign_negative() { "-0" } else { "0" }.to_owned();
    }
    let sci = format!("{:.*e}", FLOAT_DIGITS - 1, x);
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let exp: i32 = exp.parse().unwrap_or(0);
    if exp < -4 || exp >= FLOAT_DIGITS as i32 {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_fraction(mantissa), exp.abs())
    } else {
        let decimals = (FLOAT_DIGITS as i32 - 1 - exp) as usize;
        trim_fraction(&format!("{x:.decimals$}")).to_owned()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Lower-case hex text of a byte slice.
pub fn to_hex(bytes: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(DIGITS[(b >> 4) as usize] as char);
        out.push(DIGITS[(b & 0x0F) as usize] as char);
    }
    out
}

/// Parse hex text into bytes.  A trailing odd digit is ignored; any non-hex
/// character fails the conversion.
pub fn from_hex(text: &str) -> Option<Vec<u8>> {
    let b = text.as_bytes();
    let even = b.len() - b.len() % 2;
    b[..even]
        .chunks(2)
        .map(|pair| {
            let hi = (pair[0] as char).to_digit(16)?;
            let lo = (pair[1] as char).to_digit(16)?;
            Some((hi * 16 + lo) as u8)
        })
        .collect()
}

const ESCAPES: &[(char, char)] = &[
    ('\'', '\''),
    ('"', '"'),
    ('\x07', 'a'),
    ('\x08', 'b'),
    ('\x0C', 'f'),
    ('\n', 'n'),
    ('\r', 'r'),
    ('\t', 't'),
    ('\x0B', 'v'),
    ('\\', '\\'),
];

/// Escape with the C escape table.  The delimiter and control characters
/// without a mnemonic are written as `\xHH`.
pub fn escape(s: &str, delimiter: Option<char>) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if Some(ch) == delimiter {
            out.push_str(&format!("\\x{:02x}", ch as u32));
        } else if let Some(&(_, code)) = ESCAPES.iter().find(|(c, _)| *c == ch) {
            out.push('\\');
            out.push(code);
        } else if (ch as u32) < 0x20 {
            out.push_str(&format!("\\x{:02x}", ch as u32));
        } else {
            out.push(ch);
        }
    }
    out
}

/// Reverse of [`escape`].  Unknown escapes yield the escaped character.
pub fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let Some(code) = chars.next() else { break };
        if let Some(&(plain, _)) = ESCAPES.iter().find(|(_, c)| *c == code) {
            out.push(plain);
        } else if code == 'x' || code == 'X' {
            let mut hex = String::new();
            while hex.len() < 2 && chars.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                hex.extend(chars.next());
            }
            if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                out.push(byte as char);
            }
        } else {
            out.push(code);
        }
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
