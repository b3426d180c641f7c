//! Statement compiler.
//!
//! A script is a sequence of statements compiled into a flat instruction
//! list.  Expressions are not parsed here: each expression statement and each
//! `if`/`while` condition is stored as source text in a `CALC` or `ZJMP`
//! instruction and handed to the engine at run time.
//!
//! ```text
//! statement := ';' | '{' { statement } '}' | ':' label ';'
//!            | typedef name [ '=' expr ] ';'
//!            | 'if' '(' expr ')' statement [ 'else' statement ]
//!            | 'while' '(' expr ')' statement
//!            | ('goto' | 'gosub') label ';' | 'return' ';'
//!            | 'break' ';' | 'continue' ';'
//!            | external-keyword source ';'
//!            | expr ';'
//! ```
//!
//! `//` and `/* */` comments count as white space.

use super::builtins;
use super::engine::{is_alpha, is_white};
use super::error::{ErrorKind, ScriptError};
use super::object::{IdInfo, IdKind};
use super::value::ValueType;

// ── Instructions ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instr {
    None,
    /// Evaluate the script into the accumulator.
    Calc,
    /// Evaluate, then jump when the accumulator is zero.
    Zjmp,
    Jmp,
    /// Push the next instruction and jump to a label.
    Call,
    /// Pop the instruction stack.
    Retf,
    // Compile-time only; turned into `Jmp` before the program runs.
    Goto,
    Break,
    Continue,
}

impl Instr {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Instr::None => "NONE",
            Instr::Calc => "CALC",
            Instr::Zjmp => "ZJMP",
            Instr::Jmp | Instr::Goto | Instr::Break | Instr::Continue => "JMP ",
            Instr::Call => "CALL",
            Instr::Retf => "RETF",
        }
    }

    pub fn is_pseudo(self) -> bool {
        matches!(self, Instr::Goto | Instr::Break | Instr::Continue)
    }
}

/// Line (zero based) and byte offset of a statement in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodePos {
    pub line: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub instr: Instr,
    /// Jump target; unused by `Calc` and `Retf`.
    pub target: isize,
    /// Expression source, or the label name for `Call` and `Goto`.
    pub script: String,
    pub pos: CodePos,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub name: String,
    pub ip: isize,
}

// ── Keywords ──────────────────────────────────────────────────────────────────

/// Statement keywords.  A keyword's [`IdInfo::params`] carries its code, so
/// extensions can declare their own keywords as [`Keyword::External`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    If,
    Else,
    While,
    Break,
    Continue,
    Goto,
    Gosub,
    Return,
    External,
}

impl Keyword {
    pub const ALL: &'static [Keyword] = &[
        Keyword::If,
        Keyword::Else,
        Keyword::While,
        Keyword::Break,
        Keyword::Continue,
        Keyword::Goto,
        Keyword::Gosub,
        Keyword::Return,
        Keyword::External,
    ];

    pub const fn code(self) -> i32 {
        self as i32 + 1
    }

    pub fn from_code(code: i32) -> Option<Keyword> {
        usize::try_from(code - 1)
            .ok()
            .and_then(|i| Keyword::ALL.get(i))
            .copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Keyword::If => "if",
            Keyword::Else => "else",
            Keyword::While => "while",
            Keyword::Break => "break",
            Keyword::Continue => "continue",
            Keyword::Goto => "goto",
            Keyword::Gosub => "gosub",
            Keyword::Return => "return",
            Keyword::External => "extern",
        }
    }
}

// ── Program ───────────────────────────────────────────────────────────────────

/// A compiled and linked script.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub instructions: Vec<Instruction>,
    pub labels: Vec<Label>,
}

impl Program {
    pub fn label_ip(&self, name: &str) -> Option<isize> {
        self.labels.iter().find(|l| l.name == name).map(|l| l.ip)
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// One listing line, e.g. `  3: ZJMP  7: a < 10`.
    pub fn instruction_text(&self, ip: isize) -> Option<String> {
        let i = self.instructions.get(usize::try_from(ip).ok()?)?;
        Some(format!("{ip:3}: {} {:2}: {}", i.instr.mnemonic(), i.target, i.script))
    }

    /// Resolve `Call` and `Goto` targets.  Run after compilation.
    pub fn link(&mut self) -> Result<(), ScriptError> {
        for ip in 0..self.instructions.len() {
            let instr = self.instructions[ip].instr;
            match instr {
                Instr::Call | Instr::Goto => {
                    let name = &self.instructions[ip].script;
                    let target = self
                        .label_ip(name)
                        .ok_or_else(|| ScriptError::new(ErrorKind::LabelNotFound, name.clone()))?;
                    let i = &mut self.instructions[ip];
                    i.target = target;
                    if instr == Instr::Goto {
                        i.instr = Instr::Jmp;
                    }
                }
                Instr::Break => return Err(ScriptError::new(ErrorKind::UnexpectedKeyword, "break")),
                Instr::Continue => return Err(ScriptError::new(ErrorKind::UnexpectedKeyword, "continue")),
                _ => {}
            }
        }
        Ok(())
    }
}

// ── Compiler ──────────────────────────────────────────────────────────────────

/// What the compiler needs from the interpreter it compiles for.
pub trait Declarations {
    /// Resolve a name the way an expression would see it.
    fn resolve(&self, name: &str) -> IdInfo;

    /// Declare a script variable of the given type.
    fn declare(&mut self, name: &str, value_type: ValueType);

    /// Handle an external keyword with the source that followed it.
    /// `false` rejects the statement.
    fn additional_statement(&mut self, keyword: &IdInfo, source: &str) -> bool {
        let _ = (keyword, source);
        true
    }
}

/// A compile error with the place it was found.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{error} at line {}", .pos.line + 1)]
pub struct CompileError {
    pub error: ScriptError,
    pub pos: CodePos,
}

type Compile<T = ()> = Result<T, ScriptError>;

/// Compile `src` into an unlinked program.
pub fn compile(src: &str, decl: &mut dyn Declarations) -> Result<Program, CompileError> {
    let mut c = Compiler {
        src: src.as_bytes(),
        pos: 0,
        line: 0,
        program: Program::default(),
        decl,
    };
    loop {
        if let Err(error) = c.statement() {
            return Err(CompileError {
                error,
                pos: CodePos {
                    line: c.line,
                    offset: c.pos,
                },
            });
        }
        c.skip_white();
        if c.at_end() {
            return Ok(c.program);
        }
    }
}

struct Compiler<'a> {
    src: &'a [u8],
    pos: usize,
    line: usize,
    program: Program,
    decl: &'a mut dyn Declarations,
}

impl Compiler<'_> {
    fn peek(&self) -> u8 {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> u8 {
        self.src.get(self.pos + ahead).copied().unwrap_or(0)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn advance(&mut self) {
        if self.peek() == b'\n' {
            self.line += 1;
        }
        self.pos += 1;
    }

    fn skip_white(&mut self) {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (c, _) if is_white(c) => self.advance(),
                (b'/', b'/') => {
                    while !self.at_end() && self.peek() != b'\n' {
                        self.advance();
                    }
                }
                (b'/', b'*') => {
                    self.pos += 2;
                    while !self.at_end() && !(self.peek() == b'*' && self.peek_at(1) == b'/') {
                        self.advance();
                    }
                    self.pos = (self.pos + 2).min(self.src.len());
                }
                _ => return,
            }
        }
    }

    fn text(&self, start: usize, end: usize) -> String {
        String::from_utf8_lossy(&self.src[start..end]).into_owned()
    }

    fn name(&mut self) -> Compile<String> {
        self.skip_white();
        let start = self.pos;
        while is_alpha(self.peek()) || self.peek().is_ascii_digit() {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(ScriptError::new(ErrorKind::ExpectedIdentifier, self.text(start, (start + 20).min(self.src.len()))));
        }
        Ok(self.text(start, self.pos))
    }

    fn expect(&mut self, c: u8, kind: ErrorKind) -> Compile {
        self.skip_white();
        if self.peek() != c {
            return Err(ScriptError::new(kind, (c as char).to_string()));
        }
        self.pos += 1;
        Ok(())
    }

    fn add(&mut self, instr: Instr, target: Option<isize>, script: String, pos: CodePos) -> usize {
        let ip = self.program.instructions.len();
        self.program.instructions.push(Instruction {
            instr,
            target: target.unwrap_or(ip as isize + 1),
            script,
            pos,
        });
        ip
    }

    fn here(&self) -> CodePos {
        CodePos {
            line: self.line,
            offset: self.pos,
        }
    }

    fn next_ip(&self) -> isize {
        self.program.instructions.len() as isize
    }

    /// Source up to the `ending` character at parenthesis depth zero,
    /// skipping quoted text.  Leaves the cursor on `ending`.
    fn script(&mut self, ending: u8) -> Compile<String> {
        self.skip_white();
        let start = self.pos;
        let mut depth = 0usize;
        let mut quoted = false;
        loop {
            if self.at_end() {
                return Err(ScriptError::new(ErrorKind::UnexpectedEnd, "end-of-script"));
            }
            let c = self.peek();
            if quoted {
                if c == b'\\' && self.peek_at(1) != 0 {
                    self.pos += 1;
                } else if c == b'"' {
                    quoted = false;
                }
            } else {
                match c {
                    b'"' => quoted = true,
                    b'(' => depth += 1,
                    b')' if depth == 0 => {
                        if ending == b')' {
                            break;
                        }
                        return Err(ScriptError::new(ErrorKind::UnexpectedCharacter, ")"));
                    }
                    b')' => depth -= 1,
                    b';' if depth == 0 && ending == b';' => break,
                    _ => {}
                }
            }
            self.advance();
        }
        Ok(self.text(start, self.pos).trim_end().to_owned())
    }

    /// Source of an external keyword statement.  Text starting with an
    /// alphanumeric runs to `;`; otherwise the first character delimits a
    /// segment, and segments repeat until `;`.  Consumes the `;`.
    fn external_source(&mut self) -> Compile<String> {
        self.skip_white();
        let mut source = String::new();
        loop {
            let mut delim = self.peek();
            if delim.is_ascii_alphanumeric() || delim == b';' {
                delim = b';';
            } else {
                self.advance();
            }
            let start = self.pos;
            while !self.at_end() && self.peek() != delim {
                self.advance();
            }
            source.push_str(&self.text(start, self.pos));
            if delim != b';' && self.peek() == delim {
                self.pos += 1;
            }
            self.skip_white();
            if self.at_end() || self.peek() == b';' {
                break;
            }
        }
        if self.at_end() {
            return Err(ScriptError::new(ErrorKind::UnexpectedEnd, "end-of-script"));
        }
        self.pos += 1;
        Ok(source.trim_end().to_owned())
    }

    /// An expression statement from the cursor to `;`.
    fn calc(&mut self, pos: CodePos) -> Compile {
        let script = self.script(b';')?;
        self.expect(b';', ErrorKind::ExpectedDelimiter)?;
        self.add(Instr::Calc, None, script, pos);
        Ok(())
    }

    fn is_declared(&self, name: &str) -> bool {
        self.program.label_ip(name).is_some() || self.decl.resolve(name).is_known()
    }

    fn statement(&mut self) -> Compile {
        self.skip_white();
        if self.at_end() {
            return Ok(());
        }
        let pos = self.here();
        match self.peek() {
            b';' => {
                self.pos += 1;
                Ok(())
            }
            b'{' => {
                self.pos += 1;
                loop {
                    self.skip_white();
                    if self.at_end() {
                        return Err(ScriptError::new(ErrorKind::UnexpectedEnd, "end-of-script"));
                    }
                    if self.peek() == b'}' {
                        self.pos += 1;
                        return Ok(());
                    }
                    self.statement()?;
                }
            }
            b':' => {
                self.pos += 1;
                let name = self.name()?;
                if self.is_declared(&name) {
                    return Err(ScriptError::new(ErrorKind::MultipleDeclaration, name));
                }
                self.expect(b';', ErrorKind::ExpectedDelimiter)?;
                let ip = self.next_ip();
                self.program.labels.push(Label { name, ip });
                Ok(())
            }
            c if is_alpha(c) => {
                let start = self.pos;
                let name = self.name()?;
                let info = self.decl.resolve(&name);
                match info.kind {
                    IdKind::Unknown => Err(ScriptError::new(ErrorKind::UnknownIdentifier, name)),
                    IdKind::Keyword => match Keyword::from_code(info.params) {
                        Some(kw) => self.keyword(kw, &info, pos),
                        None => Err(ScriptError::new(ErrorKind::UnexpectedKeyword, name)),
                    },
                    IdKind::Typedef => self.declaration(&info),
                    IdKind::Function | IdKind::Variable | IdKind::Constant => {
                        self.pos = start;
                        self.calc(pos)
                    }
                }
            }
            c => Err(ScriptError::new(ErrorKind::UnexpectedCharacter, (c as char).to_string())),
        }
    }

    /// `int x;` or `float x = expr;`
    fn declaration(&mut self, typedef: &IdInfo) -> Compile {
        let value_type = builtins::typedef_type(typedef).unwrap_or(ValueType::Undefined);
        self.skip_white();
        let pos = self.here();
        let name = self.name()?;
        if self.is_declared(&name) {
            return Err(ScriptError::new(ErrorKind::MultipleDeclaration, name));
        }
        self.decl.declare(&name, value_type);
        self.skip_white();
        if self.peek() == b'=' {
            self.pos = pos.offset;
            return self.calc(pos);
        }
        self.expect(b';', ErrorKind::ExpectedDelimiter)
    }

    fn keyword(&mut self, kw: Keyword, info: &IdInfo, pos: CodePos) -> Compile {
        match kw {
            Keyword::Break | Keyword::Continue => {
                self.expect(b';', ErrorKind::ExpectedDelimiter)?;
                let instr = if kw == Keyword::Break { Instr::Break } else { Instr::Continue };
                self.add(instr, Some(-1), String::new(), pos);
            }
            Keyword::Goto | Keyword::Gosub => {
                let label = self.name()?;
                self.expect(b';', ErrorKind::ExpectedDelimiter)?;
                let instr = if kw == Keyword::Goto { Instr::Goto } else { Instr::Call };
                self.add(instr, Some(-1), label, pos);
            }
            Keyword::Return => {
                self.expect(b';', ErrorKind::ExpectedDelimiter)?;
                self.add(Instr::Retf, None, String::new(), pos);
            }
            Keyword::If => {
                self.expect(b'(', ErrorKind::ExpectedLeftParenthesis)?;
                let cond = self.script(b')')?;
                self.pos += 1;
                let test = self.add(Instr::Zjmp, None, cond, pos);
                self.statement()?;
                self.program.instructions[test].target = self.next_ip();
                let skip = self.add(Instr::Jmp, None, String::new(), self.here());
                if self.else_follows() {
                    self.statement()?;
                    self.program.instructions[test].target = skip as isize + 1;
                    self.program.instructions[skip].target = self.next_ip();
                }
            }
            Keyword::While => {
                self.expect(b'(', ErrorKind::ExpectedLeftParenthesis)?;
                let cond = self.script(b')')?;
                self.pos += 1;
                let test = self.add(Instr::Zjmp, None, cond, pos);
                self.statement()?;
                self.add(Instr::Jmp, Some(test as isize), String::new(), self.here());
                let end = self.next_ip();
                self.program.instructions[test].target = end;
                for i in &mut self.program.instructions[test + 1..] {
                    match i.instr {
                        Instr::Break => {
                            i.instr = Instr::Jmp;
                            i.target = end;
                        }
                        Instr::Continue => {
                            i.instr = Instr::Jmp;
                            i.target = test as isize;
                        }
                        _ => {}
                    }
                }
            }
            Keyword::Else => {
                return Err(ScriptError::new(ErrorKind::UnexpectedKeyword, kw.name()));
            }
            Keyword::External => {
                let source = self.external_source()?;
                if !self.decl.additional_statement(info, &source) {
                    return Err(ScriptError::new(ErrorKind::ExternalKeyword, source));
                }
            }
        }
        Ok(())
    }

    /// Consume an `else` keyword if one is next.
    fn else_follows(&mut self) -> bool {
        self.skip_white();
        let (pos, line) = (self.pos, self.line);
        if let Ok(name) = self.name() {
            let info = self.decl.resolve(&name);
            if info.kind == IdKind::Keyword && Keyword::from_code(info.params) == Some(Keyword::Else) {
                return true;
            }
        }
        self.pos = pos;
        self.line = line;
        false
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::object::Owner;

    #[derive(Default)]
    struct Decls {
        vars: Vec<(String, ValueType)>,
        external: Vec<String>,
    }

    impl Declarations for Decls {
        fn resolve(&self, name: &str) -> IdInfo {
            if let Some(kw) = Keyword::ALL.iter().find(|k| k.name() == name) {
                return IdInfo::new(0, IdKind::Keyword, name, kw.code(), Owner::Scope);
            }
            if name == "import" {
                return IdInfo::new(0, IdKind::Keyword, name, Keyword::External.code(), Owner::Scope);
            }
            if self.vars.iter().any(|(n, _)| n == name) {
                return IdInfo::new(0, IdKind::Variable, name, 0, Owner::Scope);
            }
            builtins::get_info(name)
        }

        fn declare(&mut self, name: &str, value_type: ValueType) {
            self.vars.push((name.to_owned(), value_type));
        }

        fn additional_statement(&mut self, _keyword: &IdInfo, source: &str) -> bool {
            self.external.push(source.to_owned());
            !source.is_empty()
        }
    }

    fn build(src: &str) -> (Program, Decls) {
        let mut d = Decls::default();
        match compile(src, &mut d) {
            Ok(mut p) => {
                if let Err(e) = p.link() {
                    panic!("{src}: {e}");
                }
                (p, d)
            }
            Err(e) => panic!("{src}: {e}"),
        }
    }

    fn failure(src: &str) -> ErrorKind {
        let mut d = Decls::default();
        match compile(src, &mut d) {
            Ok(mut p) => match p.link() {
                Ok(()) => panic!("{src}: expected an error"),
                Err(e) => e.kind,
            },
            Err(e) => e.error.kind,
        }
    }

    fn ops(p: &Program) -> Vec<(Instr, isize)> {
        p.instructions.iter().map(|i| (i.instr, i.target)).collect()
    }

    #[test]
    fn declarations_and_expressions() {
        let (p, d) = build("int a; float b = 1.5; a = 2 * b;");
        assert_eq!(d.vars, vec![("a".to_owned(), ValueType::Integer), ("b".to_owned(), ValueType::Float)]);
        let scripts: Vec<&str> = p.instructions.iter().map(|i| i.script.as_str()).collect();
        assert_eq!(scripts, vec!["b = 1.5", "a = 2 * b"]);
    }

    #[test]
    fn if_else_layout() {
        let (p, _) = build("int a; if (a) a = 1; else a = 2;");
        assert_eq!(
            ops(&p),
            vec![(Instr::Zjmp, 3), (Instr::Calc, 2), (Instr::Jmp, 4), (Instr::Calc, 4)]
        );
        let (p, _) = build("int a; if (a) a = 1;");
        assert_eq!(ops(&p), vec![(Instr::Zjmp, 2), (Instr::Calc, 2), (Instr::Jmp, 3)]);
    }

    #[test]
    fn while_with_break_and_continue() {
        let (p, _) = build("int a; while (a < 3) { a = a + 1; if (a == 2) continue; break; }");
        assert_eq!(
            ops(&p),
            vec![
                (Instr::Zjmp, 7),
                (Instr::Calc, 2),
                (Instr::Zjmp, 4),
                (Instr::Jmp, 0),
                (Instr::Jmp, 5),
                (Instr::Jmp, 7),
                (Instr::Jmp, 0),
            ]
        );
    }

    #[test]
    fn labels_and_jumps() {
        let (p, _) = build(":main; gosub sub; return; :sub; return;");
        assert_eq!(p.label_ip("main"), Some(0));
        assert_eq!(p.label_ip("sub"), Some(2));
        assert_eq!(ops(&p)[0], (Instr::Call, 2));
        let (p, _) = build(":top; goto top;");
        assert_eq!(ops(&p), vec![(Instr::Jmp, 0)]);
    }

    #[test]
    fn comments_and_lines() {
        let (p, _) = build("// first\nint a; /* two\nlines */\na = 1;");
        assert_eq!(p.instructions[0].pos.line, 3);
        let mut d = Decls::default();
        let e = compile("int a;\n\na = (1;", &mut d).err();
        assert_eq!(e.map(|e| (e.error.kind, e.pos.line)), Some((ErrorKind::UnexpectedEnd, 2)));
    }

    #[test]
    fn external_keyword_source() {
        let (_, d) = build("import  X,42 ;");
        assert_eq!(d.external, vec!["X,42"]);
        let (_, d) = build("import 'a b' \"c\";");
        assert_eq!(d.external, vec!["a bc"]);
        assert_eq!(failure("import ;"), ErrorKind::ExternalKeyword);
    }

    #[test]
    fn compile_errors() {
        assert_eq!(failure("nosuch = 1;"), ErrorKind::UnknownIdentifier);
        assert_eq!(failure("int a; int a;"), ErrorKind::MultipleDeclaration);
        assert_eq!(failure(":x; :x;"), ErrorKind::MultipleDeclaration);
        assert_eq!(failure(":x"), ErrorKind::ExpectedDelimiter);
        assert_eq!(failure("if 1;"), ErrorKind::ExpectedLeftParenthesis);
        assert_eq!(failure("goto nowhere;"), ErrorKind::LabelNotFound);
        assert_eq!(failure("break;"), ErrorKind::UnexpectedKeyword);
        assert_eq!(failure("else;"), ErrorKind::UnexpectedKeyword);
        assert_eq!(failure("int a; a = 1) ;"), ErrorKind::UnexpectedCharacter);
        assert_eq!(failure("{ int a;"), ErrorKind::UnexpectedEnd);
        assert_eq!(failure("#"), ErrorKind::UnexpectedCharacter);
    }

    #[test]
    fn semicolons_inside_strings_and_parens() {
        let (p, _) = build("int a; a = strlen(\";\") + strlen(\"\\\";\");");
        assert_eq!(p.instructions[0].script, "a = strlen(\";\") + strlen(\"\\\";\")");
    }

    #[test]
    fn listing_text() {
        let (p, _) = build("int a; a = 1;");
        assert_eq!(p.instruction_text(0).as_deref(), Some("  0: CALC  1: a = 1"));
        assert_eq!(p.instruction_text(5), None);
    }
}
