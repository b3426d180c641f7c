//! The expression engine.
//!
//! [`ScriptEngine::calculate`] walks the raw script bytes with a cursor; there
//! is no separate tokenizer.  Grammar, informally:
//!
//! ```text
//! calculate := partial { ('+'|'-'|op-char) partial }
//! partial   := arith { operator }
//! operator  := op1 [op2] rhs          op1 ∈ < > = & | ^ / * ! %   op2 ∈ > = | ^ &
//! rhs       := partial { ('+'|'-') partial }
//! arith     := '(' { partial } ')' | '!' arith | ('+'|'-') arith
//!            | number [operator] | ident { '.' ident } | call | string { string }
//! ```
//!
//! There is no operator precedence: the right operand of every binary
//! operator swallows the rest of the expression, so `2*3+4` is `2*(3+4)`.
//! Parentheses are the only way to group.
//!
//! Names are looked up in the caller's [`Scope`] first, then in the engine
//! builtins, then in the [`FunctionRegistry`].

use std::rc::Rc;

use tracing::{trace, warn};

use super::builtins;
use super::error::{ErrorKind, ErrorState, ScriptError};
use super::object::{IdInfo, IdKind, ObjectHandle, Owner, ScriptObject};
use super::registry::FunctionRegistry;
use super::value::{parse_c_double, parse_c_long, unescape, Value, ValueType};

/// Longest identifier accepted.
pub const MAX_IDENT_LENGTH: usize = 64;
/// Longest string literal accepted.
pub const MAX_STRING_LENGTH: usize = 4096;

const OPERATOR_FIRST: &[u8] = b"<>=&|^/*!%";
const OPERATOR_SECOND: &[u8] = b">=|^&";
const DELIMITERS: &[u8] = b"+-/*&|^=<>!%";
const TERMINATORS: &[u8] = b"<>^&|= +-/*)!,%;";
const WHITE: &[u8] = b"\r\n\t ";

type Eval<T = ()> = Result<T, ScriptError>;

pub(crate) fn is_alpha(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

pub(crate) fn is_white(c: u8) -> bool {
    WHITE.contains(&c)
}

// ── Scope ─────────────────────────────────────────────────────────────────────

/// Identifiers an engine caller brings into an evaluation.
///
/// The interpreter implements this for its variables, labels and functions;
/// objects it hands out as handles are reached through [`Scope::object`].
pub trait Scope {
    fn get_info(&self, _name: &str) -> IdInfo {
        IdInfo::unknown()
    }

    /// Read, write or call an identifier this scope resolved.  `engine` is
    /// the calling engine so a function may evaluate nested scripts.
    fn get_set_value(
        &mut self,
        _engine: &mut ScriptEngine,
        _info: &IdInfo,
        _value: &mut Value,
        _params: &[Value],
        _set: bool,
    ) -> Result<bool, ErrorKind> {
        Ok(false)
    }

    fn object(&mut self, _handle: ObjectHandle) -> Option<&mut (dyn ScriptObject + 'static)> {
        None
    }

    /// Called after member access through a temporary object handle.
    fn release_object(&mut self, _handle: ObjectHandle) {}

    fn info_names(&self) -> Vec<String> {
        Vec::new()
    }
}

/// A scope without identifiers of its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoScope;

impl Scope for NoScope {}

// ── ScriptEngine ──────────────────────────────────────────────────────────────

pub struct ScriptEngine {
    registry: Rc<FunctionRegistry>,
    cmd: Vec<u8>,
    pos: usize,
    error: ErrorState,
}

impl Default for ScriptEngine {
    fn default() -> Self {
        ScriptEngine::new(Rc::new(FunctionRegistry::new()))
    }
}

impl std::fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("pos", &self.pos)
            .field("error", &self.error)
            .finish()
    }
}

impl ScriptEngine {
    pub fn new(registry: Rc<FunctionRegistry>) -> Self {
        ScriptEngine {
            registry,
            cmd: Vec::new(),
            pos: 0,
            error: ErrorState::default(),
        }
    }

    pub fn registry(&self) -> &Rc<FunctionRegistry> {
        &self.registry
    }

    // ── Errors ────────────────────────────────────────────────────────────────

    /// Record an error; see [`ErrorState::set`].  Returns `kind == Success`.
    pub fn set_error(&mut self, kind: ErrorKind, reason: &str) -> bool {
        self.error.set(kind, reason)
    }

    pub fn clear_error(&mut self) {
        self.error.clear();
    }

    pub fn error(&self) -> ErrorKind {
        self.error.kind()
    }

    pub fn error_reason(&self) -> &str {
        self.error.reason()
    }

    pub fn error_text(&self) -> String {
        self.error.kind().to_string()
    }

    pub fn last_error(&self) -> Option<ScriptError> {
        self.error.to_error()
    }

    // ── Entry points ──────────────────────────────────────────────────────────

    /// Evaluate `script` against `scope`.  On success `result` receives the
    /// value; on failure it is left untouched and the error is queryable.
    /// The cursor of an enclosing evaluation is restored, so functions may
    /// call back into the same engine.
    pub fn calculate(&mut self, script: &str, scope: &mut dyn Scope, result: &mut Value) -> bool {
        let prev_cmd = std::mem::replace(&mut self.cmd, script.as_bytes().to_vec());
        let prev_pos = std::mem::replace(&mut self.pos, 0);
        self.error.clear();
        let mut acc = Value::Undefined;
        let outcome = self.run(scope, &mut acc);
        self.cmd = prev_cmd;
        self.pos = prev_pos;
        match outcome {
            Ok(()) => {
                *result = acc;
                true
            }
            Err(e) => self.error.record(&e),
        }
    }

    /// Evaluate without a scope of its own.
    pub fn eval(&mut self, script: &str) -> Result<Value, ScriptError> {
        let mut v = Value::Undefined;
        if self.calculate(script, &mut NoScope, &mut v) {
            Ok(v)
        } else {
            Err(self.last_error().unwrap_or_else(|| ErrorKind::CompilerImplementationError.into()))
        }
    }

    /// Resolve a name: scope first, then builtins, then the registry.
    pub fn get_info(&self, scope: &dyn Scope, name: &str) -> IdInfo {
        let info = scope.get_info(name);
        if info.is_known() {
            return info;
        }
        let info = builtins::get_info(name);
        if info.is_known() {
            return info;
        }
        self.registry.get_info(name)
    }

    /// Route a read, write or call to whichever layer resolved `info`.
    pub fn get_set_value(
        &mut self,
        scope: &mut dyn Scope,
        info: &IdInfo,
        value: &mut Value,
        params: &[Value],
        set: bool,
    ) -> Result<(), ScriptError> {
        let handled = match info.owner {
            Owner::Engine => builtins::get_set_value(info, value, params, set).map(|()| true),
            Owner::Registry if info.kind == IdKind::Function => {
                let registry = Rc::clone(&self.registry);
                registry.call(info.key, params).map(|v| {
                    value.set(v);
                    true
                })
            }
            Owner::Registry => Ok(false),
            Owner::Scope | Owner::Extension => scope.get_set_value(self, info, value, params, set),
            Owner::Object(handle) => match scope.object(handle) {
                Some(obj) => obj.get_set_value(info, value, params, set),
                None => Err(ErrorKind::NotObject),
            },
        };
        match handled {
            Ok(true) => Ok(()),
            Ok(false) => Err(ScriptError::new(ErrorKind::CompilerImplementationError, &info.name)),
            Err(_) if info.kind == IdKind::Function => {
                warn!(function = %info.name, "error in function");
                Err(ScriptError::new(ErrorKind::FunctionError, &info.name))
            }
            Err(kind) => Err(ScriptError::new(kind, &info.name)),
        }
    }

    /// Names the engine resolves: the scope's, the builtins and the registry.
    pub fn info_names(&self, scope: &dyn Scope) -> Vec<String> {
        let mut names = scope.info_names();
        names.extend(builtins::info_names());
        names.extend(self.registry.info_names());
        names
    }

    // ── Cursor ────────────────────────────────────────────────────────────────

    fn peek(&self) -> u8 {
        self.cmd.get(self.pos).copied().unwrap_or(0)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.cmd.len()
    }

    fn eat_white(&mut self) {
        while is_white(self.peek()) {
            self.pos += 1;
        }
    }

    /// Up to 20 characters from the cursor, for error reasons.
    fn location(&self) -> String {
        let start = self.pos.min(self.cmd.len());
        let end = (start + 20).min(self.cmd.len());
        String::from_utf8_lossy(&self.cmd[start..end]).into_owned()
    }

    fn name(&mut self) -> Eval<String> {
        let start = self.pos;
        while is_alpha(self.peek()) || self.peek().is_ascii_digit() {
            self.pos += 1;
            if self.pos - start > MAX_IDENT_LENGTH {
                let ident = String::from_utf8_lossy(&self.cmd[start..self.pos]).into_owned();
                return Err(ScriptError::new(ErrorKind::MaxIdentifierLength, ident));
            }
        }
        if self.pos == start {
            return Err(ScriptError::new(ErrorKind::ExpectedIdentifier, self.location()));
        }
        let name = String::from_utf8_lossy(&self.cmd[start..self.pos]).into_owned();
        self.eat_white();
        Ok(name)
    }

    /// Integer or float literal, whichever parse consumes more text.
    fn number(&mut self) -> Value {
        let rest = std::str::from_utf8(&self.cmd[self.pos..]).unwrap_or_default();
        let (l, l_end) = parse_c_long(rest);
        let (d, d_end) = parse_c_double(rest);
        if d_end > l_end {
            self.pos += d_end;
            Value::Float(d)
        } else {
            self.pos += l_end.max(1);
            Value::Int(l)
        }
    }

    // ── Grammar ───────────────────────────────────────────────────────────────

    fn run(&mut self, scope: &mut dyn Scope, acc: &mut Value) -> Eval {
        loop {
            self.eat_white();
            if self.at_end() {
                return Ok(());
            }
            self.partial(scope, acc)?;
            if !self.at_end() && !DELIMITERS.contains(&self.peek()) {
                return Err(ScriptError::new(ErrorKind::ExpectedDelimiter, self.location()));
            }
        }
    }

    fn partial(&mut self, scope: &mut dyn Scope, result: &mut Value) -> Eval {
        let mut local = Value::Undefined;
        let mut left = None;
        self.arith(scope, &mut local, &mut left)?;
        while self.operator(scope, &mut local, &mut left)? {}
        *result += &local;
        Ok(())
    }

    fn operator(
        &mut self,
        scope: &mut dyn Scope,
        result: &mut Value,
        left: &mut Option<IdInfo>,
    ) -> Eval<bool> {
        let oper1 = self.peek();
        if oper1 == 0 || !OPERATOR_FIRST.contains(&oper1) {
            return Ok(false);
        }
        self.pos += 1;
        let oper2 = match self.peek() {
            c if c != 0 && OPERATOR_SECOND.contains(&c) => {
                self.pos += 1;
                c
            }
            _ => 0,
        };
        let mut rhs = Value::Undefined;
        loop {
            self.partial(scope, &mut rhs)?;
            if !matches!(self.peek(), b'+' | b'-') {
                break;
            }
        }
        if (oper2 == 0 || b"<>=".contains(&oper2))
            && (result.value_type() == ValueType::Float || rhs.value_type() == ValueType::Float)
        {
            result.set_type(ValueType::Float);
            rhs.set_type(ValueType::Float);
        }
        match (oper1, oper2) {
            (b'>', b'=') => result.set(result.compare(&rhs) >= 0),
            (b'>', _) => result.set(result.compare(&rhs) > 0),
            (b'<', b'=') => result.set(result.compare(&rhs) <= 0),
            (b'<', b'>') => result.set(result.compare(&rhs) != 0),
            (b'<', _) => result.set(result.compare(&rhs) < 0),
            (b'!', b'=') => result.set(result.compare(&rhs) != 0),
            (b'!', _) => {
                return Err(ScriptError::new(ErrorKind::UnexpectedCharacter, "!"));
            }
            (b'=', b'=') => result.set(result.compare(&rhs) == 0),
            (b'=', 0) => {
                let Some(target) = left.take() else {
                    return Err(ScriptError::new(ErrorKind::NotLValue, self.location()));
                };
                let mut assigned = rhs.clone();
                self.get_set_value(scope, &target, &mut assigned, &[], true)?;
                result.assign(&rhs);
            }
            (b'=', c) => {
                return Err(ScriptError::new(ErrorKind::UnexpectedCharacter, (c as char).to_string()));
            }
            (b'&', b'&') => result.set(!result.is_zero() && !rhs.is_zero()),
            (b'&', _) => result.set(result.get_integer() & rhs.get_integer()),
            (b'|', b'|') => result.set(!result.is_zero() || !rhs.is_zero()),
            (b'|', _) => result.set(result.get_integer() | rhs.get_integer()),
            (b'^', b'^') => result.set(!result.is_zero() ^ !rhs.is_zero()),
            (b'^', _) => result.set(result.get_integer() ^ rhs.get_integer()),
            (b'*', _) => *result *= &rhs,
            (b'/', _) | (b'%', _) => {
                if rhs.compare(&Value::Float(0.0)) == 0 {
                    return Err(ScriptError::new(ErrorKind::DivisionByZero, self.location()));
                }
                if oper1 == b'/' {
                    *result /= &rhs;
                } else {
                    *result %= &rhs;
                }
            }
            _ => {}
        }
        *left = None;
        Ok(true)
    }

    fn arith(&mut self, scope: &mut dyn Scope, result: &mut Value, left: &mut Option<IdInfo>) -> Eval {
        self.eat_white();
        match self.peek() {
            0 if self.at_end() => Err(ScriptError::new(ErrorKind::UnexpectedEnd, "end-of-script")),
            b'(' => {
                self.pos += 1;
                while self.peek() != b')' {
                    if let Err(e) = self.partial(scope, result) {
                        return Err(match e.kind {
                            ErrorKind::UnexpectedEnd => {
                                ScriptError::new(ErrorKind::ExpectedRightParenthesis, e.reason)
                            }
                            _ => e,
                        });
                    }
                }
                self.pos += 1;
                self.eat_white();
                Ok(())
            }
            b'!' => {
                self.pos += 1;
                let mut inner = Value::Undefined;
                self.arith(scope, &mut inner, &mut None)?;
                *result += &Value::from(inner.is_zero());
                Ok(())
            }
            sign @ (b'+' | b'-') => {
                self.pos += 1;
                let mut inner = Value::Undefined;
                self.arith(scope, &mut inner, &mut None)?;
                let factor = Value::Float(if sign == b'+' { 1.0 } else { -1.0 });
                *result += &inner.mul(&factor);
                Ok(())
            }
            c if c.is_ascii_digit() => {
                let mut local = self.number();
                self.eat_white();
                self.operator(scope, &mut local, left)?;
                *result += &local;
                Ok(())
            }
            c if is_alpha(c) => self.identifier(scope, result, left),
            b'"' => self.string_literal(result),
            c => Err(ScriptError::new(
                ErrorKind::UnexpectedCharacter,
                (c as char).to_string(),
            )),
        }
    }

    fn identifier(
        &mut self,
        scope: &mut dyn Scope,
        result: &mut Value,
        left: &mut Option<IdInfo>,
    ) -> Eval {
        let mut name = self.name()?;
        let mut info = self.get_info(scope, &name);
        let mut temporary: Option<ObjectHandle> = None;
        let outcome = loop {
            let mut again = false;
            match info.kind {
                IdKind::Unknown => break Err(ScriptError::new(ErrorKind::UnknownSymbol, &name)),
                IdKind::Constant | IdKind::Variable => {
                    let next = self.peek();
                    if next == 0 || TERMINATORS.contains(&next) {
                        if let Err(e) = self.get_set_value(scope, &info, result, &[], false) {
                            break Err(e);
                        }
                        *left = Some(info.clone());
                    } else if next == b'.' {
                        self.pos += 1;
                        self.eat_white();
                        let mut handle_value = Value::Undefined;
                        if let Err(e) = self.get_set_value(scope, &info, &mut handle_value, &[], false) {
                            break Err(e);
                        }
                        match self.member(scope, &handle_value, &name) {
                            Ok((member_name, member)) => {
                                name = member_name;
                                info = member;
                                again = true;
                            }
                            Err(e) => break Err(e),
                        }
                    } else {
                        break Err(ScriptError::new(
                            ErrorKind::UnexpectedCharacter,
                            (next as char).to_string(),
                        ));
                    }
                }
                IdKind::Function => {
                    if self.peek() != b'(' {
                        break Err(ScriptError::new(ErrorKind::ExpectedFunction, &info.name));
                    }
                    let params = match self.parameters(scope) {
                        Ok(p) => p,
                        Err(e) => break Err(e),
                    };
                    if let Err(kind) = info.check_params(params.len()) {
                        break Err(ScriptError::new(kind, &info.name));
                    }
                    trace!(function = %info.name, params = params.len(), "call");
                    if let Err(e) = self.get_set_value(scope, &info, result, &params, false) {
                        break Err(e);
                    }
                    if self.peek() == b'.' {
                        self.pos += 1;
                        self.eat_white();
                        if let Some(h) = ObjectHandle::from_value(result) {
                            temporary = Some(h);
                        }
                        match self.member(scope, result, &name) {
                            Ok((member_name, member)) => {
                                name = member_name;
                                info = member;
                                result.set(Value::Undefined);
                                again = true;
                            }
                            Err(e) => break Err(e),
                        }
                    }
                }
                _ => break Err(ScriptError::new(ErrorKind::UnexpectedIdentifier, &name)),
            }
            self.eat_white();
            if !again {
                break Ok(());
            }
        };
        if let Some(h) = temporary {
            scope.release_object(h);
        }
        outcome
    }

    /// Treat `value` as an object handle and resolve the member name at the
    /// cursor on it.
    fn member(&mut self, scope: &mut dyn Scope, value: &Value, owner_name: &str) -> Eval<(String, IdInfo)> {
        let not_object = || ScriptError::new(ErrorKind::NotObject, owner_name);
        let handle = ObjectHandle::from_value(value).ok_or_else(not_object)?;
        if scope.object(handle).is_none() {
            return Err(not_object());
        }
        let member_name = self.name()?;
        let info = scope
            .object(handle)
            .map(|obj| obj.get_info(&member_name))
            .unwrap_or_else(IdInfo::unknown);
        if !info.is_known() {
            return Err(ScriptError::new(ErrorKind::UnknownObjectMember, member_name));
        }
        Ok((member_name, info.with_owner(Owner::Object(handle))))
    }

    /// `( expr, expr, ... )` with the cursor on `(`; leaves it after `)`.
    fn parameters(&mut self, scope: &mut dyn Scope) -> Eval<Vec<Value>> {
        self.pos += 1;
        self.eat_white();
        let mut params = Vec::new();
        if self.peek() == b')' {
            self.pos += 1;
            return Ok(params);
        }
        loop {
            let mut value = Value::Undefined;
            loop {
                self.partial(scope, &mut value)?;
                match self.peek() {
                    b')' | b',' => break,
                    _ if self.at_end() => {
                        return Err(ScriptError::new(ErrorKind::UnexpectedEnd, "end-of-script"));
                    }
                    _ => {}
                }
            }
            params.push(value);
            let closing = self.peek() == b')';
            self.pos += 1;
            if closing {
                return Ok(params);
            }
        }
    }

    /// One or more adjacent `"..."` segments, concatenated.
    fn string_literal(&mut self, result: &mut Value) -> Eval {
        let mut text: Vec<u8> = Vec::new();
        let mut escaped = false;
        while self.peek() == b'"' {
            self.pos += 1;
            let start = self.pos;
            while !self.at_end() && self.peek() != b'"' {
                if self.peek() == b'\\' {
                    escaped = true;
                    self.pos += 1;
                }
                self.pos += 1;
            }
            if self.at_end() {
                return Err(ScriptError::new(ErrorKind::UnexpectedEnd, "end-of-string"));
            }
            text.extend_from_slice(&self.cmd[start..self.pos]);
            self.pos += 1;
            self.eat_white();
        }
        let text = String::from_utf8_lossy(&text).into_owned();
        if text.len() > MAX_STRING_LENGTH {
            let mut cut = MAX_STRING_LENGTH;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            return Err(ScriptError::new(ErrorKind::StringTooLong, &text[..cut]));
        }
        result.set(if escaped { unescape(&text) } else { text });
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::object::{lookup, table_names, IdEntry, ObjectArena};

    fn calc(src: &str) -> Result<Value, ScriptError> {
        ScriptEngine::default().eval(src)
    }

    fn int(src: &str) -> i64 {
        match calc(src) {
            Ok(v) => v.get_integer(),
            Err(e) => panic!("{src}: {e}"),
        }
    }

    fn err(src: &str) -> ErrorKind {
        match calc(src) {
            Ok(v) => panic!("{src}: expected an error, got {v}"),
            Err(e) => e.kind,
        }
    }

    // A scope with one variable `a`, one constant `k`, a re-entrant `eval`
    // function and an object `obj` with members `b` (object) and `c`.
    struct TestScope {
        a: Value,
        arena: ObjectArena,
        root: Value,
    }

    const SCOPE_INFO: &[IdEntry] = &[
        IdEntry::new(1, IdKind::Variable, "a", 0),
        IdEntry::new(2, IdKind::Constant, "k", 0),
        IdEntry::new(3, IdKind::Function, "eval", 1),
        IdEntry::new(4, IdKind::Variable, "obj", 0),
        IdEntry::new(5, IdKind::Function, "make", 0),
    ];

    struct Node {
        child: Option<Value>,
        c: i64,
        alive: std::rc::Rc<std::cell::Cell<bool>>,
    }

    const NODE_INFO: &[IdEntry] = &[
        IdEntry::new(1, IdKind::Variable, "b", 0),
        IdEntry::new(2, IdKind::Variable, "c", 0),
    ];

    impl ScriptObject for Node {
        fn type_name(&self) -> &str {
            "Node"
        }
        fn get_info(&self, name: &str) -> IdInfo {
            lookup(NODE_INFO, name, Owner::Scope)
        }
        fn get_set_value(
            &mut self,
            info: &IdInfo,
            value: &mut Value,
            _params: &[Value],
            set: bool,
        ) -> Result<bool, ErrorKind> {
            match (info.key, set) {
                (1, false) => value.set(self.child.clone().unwrap_or(Value::Int(0))),
                (2, false) => value.set(self.c),
                (2, true) => self.c = value.get_integer(),
                _ => return Ok(false),
            }
            Ok(true)
        }
        fn destroy_object(&mut self) -> bool {
            self.alive.set(false);
            true
        }
        fn info_names(&self) -> Vec<String> {
            table_names(NODE_INFO)
        }
    }

    impl TestScope {
        fn new() -> (Self, std::rc::Rc<std::cell::Cell<bool>>) {
            let alive = std::rc::Rc::new(std::cell::Cell::new(true));
            let mut arena = ObjectArena::new();
            let leaf = arena.insert(Box::new(Node {
                child: None,
                c: 7,
                alive: std::rc::Rc::new(std::cell::Cell::new(true)),
            }));
            arena.retain(leaf);
            let root = arena.insert(Box::new(Node {
                child: Some(leaf.to_value()),
                c: 1,
                alive: std::rc::Rc::new(std::cell::Cell::new(true)),
            }));
            arena.retain(root);
            let scope = TestScope {
                a: Value::Int(0),
                arena,
                root: root.to_value(),
            };
            (scope, alive)
        }
    }

    impl Scope for TestScope {
        fn get_info(&self, name: &str) -> IdInfo {
            lookup(SCOPE_INFO, name, Owner::Scope)
        }
        fn get_set_value(
            &mut self,
            engine: &mut ScriptEngine,
            info: &IdInfo,
            value: &mut Value,
            params: &[Value],
            set: bool,
        ) -> Result<bool, ErrorKind> {
            match (info.key, set) {
                (1, false) => value.set(self.a.clone()),
                (1, true) => self.a.assign(value),
                (2, false) => value.set(10i64),
                (2, true) => return Err(ErrorKind::AssignConstant),
                (3, _) => {
                    let src = params[0].get_string();
                    let mut inner = Value::Undefined;
                    if !engine.calculate(&src, self, &mut inner) {
                        return Err(engine.error());
                    }
                    value.set(inner);
                }
                (4, false) => value.set(self.root.clone()),
                (5, _) => {
                    let alive = std::rc::Rc::new(std::cell::Cell::new(true));
                    let h = self.arena.insert(Box::new(Node { child: None, c: 99, alive }));
                    value.set(h.to_value());
                }
                _ => return Ok(false),
            }
            Ok(true)
        }
        fn object(&mut self, handle: ObjectHandle) -> Option<&mut (dyn ScriptObject + 'static)> {
            self.arena.get_mut(handle)
        }
        fn release_object(&mut self, handle: ObjectHandle) {
            self.arena.collect(handle);
        }
    }

    fn scoped(scope: &mut TestScope, src: &str) -> Result<Value, ScriptError> {
        let mut engine = ScriptEngine::default();
        let mut v = Value::Undefined;
        if engine.calculate(src, scope, &mut v) {
            Ok(v)
        } else {
            Err(engine.last_error().unwrap_or_else(|| ErrorKind::Success.into()))
        }
    }

    #[test]
    fn non_ascii_text_after_numbers() {
        assert_eq!(int("1+\"日本\""), 1);
        assert_eq!(calc("\"日本\" \"語\"").map(|v| v.get_string()).ok().as_deref(), Some("日本語"));
        assert!(calc("1日").is_err());
    }

    #[test]
    fn no_precedence() {
        assert_eq!(int("2*3+4"), 14);
        assert_eq!(int("2+3*4"), 14);
        assert_eq!(int("(2*3)+4"), 10);
        assert_eq!(int("1-2-3"), -4);
        assert_eq!(int("10/2"), 5);
    }

    #[test]
    fn literals() {
        assert_eq!(int("0x1A"), 26);
        assert!(matches!(calc("1.5e3"), Ok(Value::Float(x)) if x == 1500.0));
        assert_eq!(calc(r#""he said \"hi\"""#).map(|v| v.get_string()), Ok("he said \"hi\"".to_owned()));
        assert_eq!(calc(r#""foo" "bar""#).map(|v| v.get_string()), Ok("foobar".to_owned()));
        assert_eq!(calc(r#""""#).map(|v| v.get_string()), Ok(String::new()));
    }

    #[test]
    fn float_promotion_on_single_char_operators() {
        assert!(matches!(calc("7/2"), Ok(Value::Int(3))));
        assert!(matches!(calc("7/2.0"), Ok(Value::Float(x)) if x == 3.5));
        assert_eq!(int("1.5 > 1"), 1);
    }

    #[test]
    fn comparisons_and_logic() {
        assert_eq!(int("3 >= 3"), 1);
        assert_eq!(int("3 <> 3"), 0);
        assert_eq!(int("3 != 4"), 1);
        assert_eq!(int("3 == 3"), 1);
        assert_eq!(int("1 && 0"), 0);
        assert_eq!(int("1 || 0"), 1);
        assert_eq!(int("1 ^^ 1"), 0);
        assert_eq!(int("6 & 3"), 2);
        assert_eq!(int("6 | 3"), 7);
        assert_eq!(int("6 ^ 3"), 5);
        assert_eq!(int("!0"), 1);
        assert_eq!(int("-4"), -4);
        assert_eq!(int("7 % 3"), 1);
    }

    #[test]
    fn parenthesised_sequence_sums() {
        assert_eq!(int("(1 2 3)"), 6);
    }

    #[test]
    fn division_by_zero_keeps_output() {
        let mut engine = ScriptEngine::default();
        let mut out = Value::Int(77);
        assert!(!engine.calculate("5/0", &mut NoScope, &mut out));
        assert_eq!(engine.error(), ErrorKind::DivisionByZero);
        assert!(matches!(out, Value::Int(77)));
        assert!(!engine.calculate("5.0 % 0.0", &mut NoScope, &mut out));
        assert_eq!(engine.error(), ErrorKind::DivisionByZero);
    }

    #[test]
    fn syntax_errors() {
        assert_eq!(err("(1+2"), ErrorKind::ExpectedRightParenthesis);
        assert_eq!(err("1;2"), ErrorKind::ExpectedDelimiter);
        assert_eq!(err("nosuch"), ErrorKind::UnknownSymbol);
        assert_eq!(err("sin"), ErrorKind::ExpectedFunction);
        assert_eq!(err("int"), ErrorKind::UnexpectedIdentifier);
        assert_eq!(err("1 ! 2"), ErrorKind::UnexpectedCharacter);
        assert_eq!(err("#"), ErrorKind::UnexpectedCharacter);
        assert_eq!(err(&"x".repeat(MAX_IDENT_LENGTH + 1)), ErrorKind::MaxIdentifierLength);
        let long = format!("\"{}\"", "s".repeat(MAX_STRING_LENGTH + 1));
        assert_eq!(err(&long), ErrorKind::StringTooLong);
    }

    #[test]
    fn builtin_calls_and_param_counts() {
        assert_eq!(int("abs(-3)"), 3);
        assert_eq!(int("strlen(\"abc\") + 1"), 4);
        assert_eq!(err("atan2(1)"), ErrorKind::TooFewParameters);
        assert_eq!(err("sin(1, 2)"), ErrorKind::TooManyParameters);
        assert_eq!(err("PI = 3"), ErrorKind::AssignConstant);
    }

    #[test]
    fn registry_functions_are_checked_before_calling() {
        let calls = std::rc::Rc::new(std::cell::Cell::new(0));
        let seen = std::rc::Rc::clone(&calls);
        let mut reg = FunctionRegistry::new();
        reg.register("atleast2", "", -2, move |a| {
            seen.set(seen.get() + 1);
            Ok(Value::Int(a.len() as i64))
        });
        reg.register("fails", "", 0, |_| Err(ErrorKind::UnknownVariable));
        let mut engine = ScriptEngine::new(std::rc::Rc::new(reg));
        assert_eq!(engine.eval("atleast2(1)").map_err(|e| e.kind).err(), Some(ErrorKind::TooFewParameters));
        assert_eq!(calls.get(), 0);
        assert_eq!(engine.eval("atleast2(1,2,3)").map(|v| v.get_integer()), Ok(3));
        assert_eq!(calls.get(), 1);
        let e = engine.eval("fails()").err();
        assert_eq!(e.map(|e| (e.kind, e.reason)), Some((ErrorKind::FunctionError, "fails".to_owned())));
    }

    #[test]
    fn assignment_needs_lvalue() {
        let (mut scope, _) = TestScope::new();
        assert_eq!(scoped(&mut scope, "a = 1 + 2").map(|v| v.get_integer()), Ok(3));
        assert!(matches!(scope.a, Value::Int(3)));
        assert_eq!(scoped(&mut scope, "k = 1").err().map(|e| e.kind), Some(ErrorKind::AssignConstant));
        assert_eq!(scoped(&mut scope, "3 = 1").err().map(|e| e.kind), Some(ErrorKind::NotLValue));
    }

    #[test]
    fn member_chains() {
        let (mut scope, _) = TestScope::new();
        assert_eq!(scoped(&mut scope, "obj.c").map(|v| v.get_integer()), Ok(1));
        assert_eq!(scoped(&mut scope, "obj.b.c").map(|v| v.get_integer()), Ok(7));
        assert_eq!(scoped(&mut scope, "obj.b.c = 8").map(|v| v.get_integer()), Ok(8));
        assert_eq!(scoped(&mut scope, "obj.b.c").map(|v| v.get_integer()), Ok(8));
        assert_eq!(scoped(&mut scope, "a.c").err().map(|e| e.kind), Some(ErrorKind::NotObject));
        assert_eq!(scoped(&mut scope, "obj.zz").err().map(|e| e.kind), Some(ErrorKind::UnknownObjectMember));
    }

    #[test]
    fn temporaries_are_released_after_chaining() {
        let (mut scope, _) = TestScope::new();
        let before = scope.arena.len();
        assert_eq!(scoped(&mut scope, "make().c").map(|v| v.get_integer()), Ok(99));
        assert_eq!(scope.arena.len(), before);
    }

    #[test]
    fn reentrant_calculate_restores_cursor() {
        let (mut scope, _) = TestScope::new();
        assert_eq!(scoped(&mut scope, "1 + eval(\"2*3\") + 4").map(|v| v.get_integer()), Ok(11));
        assert_eq!(scoped(&mut scope, "eval(\"a = 5\") + a").map(|v| v.get_integer()), Ok(10));
    }
}
