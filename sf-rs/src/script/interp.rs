//! Base script interpreter.
//!
//! The [`Interpreter`] compiles a script with [`stmt::compile`], then runs the
//! instruction list with an IP stack.  Expression instructions are handed to
//! its [`ScriptEngine`] with the interpreter's [`Runtime`] as the scope, so
//! scripts see their own variables, labels and the interpreter functions
//! (`print`, `exit`, ...) next to the engine builtins.
//!
//! Applications add identifiers and statement keywords through an
//! [`Extension`]; the binding layer is one.

use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use super::builtins;
use super::engine::{Scope, ScriptEngine};
use super::error::{ErrorKind, ScriptError};
use super::object::{lookup, table_names, IdEntry, IdInfo, IdKind, ObjectArena, ObjectHandle, Owner, ScriptObject, UNLIMITED};
use super::registry::FunctionRegistry;
use super::stmt::{self, CodePos, Declarations, Instr, Keyword, Program};
use super::value::{Value, ValueType};

// ── State ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    Error,
    #[default]
    Empty,
    Compiled,
    Running,
    Ready,
}

impl State {
    pub fn name(self) -> &'static str {
        match self {
            State::Error => "Error",
            State::Empty => "Empty",
            State::Compiled => "Compiled",
            State::Running => "Running",
            State::Ready => "Ready",
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// Run the code before `main` once.  Requires `Compiled`.
    Init,
    /// Run `main` (or the whole script) to completion.  Requires `Ready`.
    Run,
    /// Prepare to run `main` one instruction at a time.
    Start,
    /// Execute one instruction after `Start`.
    Step,
    /// Stop a running script.
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExitCode {
    #[default]
    Normal,
    Error,
    /// The script called `exit`.
    Script,
    /// The application aborted the script.
    Application,
}

impl ExitCode {
    pub fn name(self) -> &'static str {
        match self {
            ExitCode::Normal => "Normal",
            ExitCode::Error => "Error",
            ExitCode::Script => "Script",
            ExitCode::Application => "Application",
        }
    }
}

// ── Identifier table ──────────────────────────────────────────────────────────

const BASE: i32 = -10000;
const EXIT: i32 = BASE - 2;
const PRINT: i32 = BASE - 3;
const WRITELOG: i32 = BASE - 4;
const CLOCK: i32 = BASE - 6;
const SETTIMEOUT: i32 = BASE - 8;
const GETENV: i32 = BASE - 14;
const SLEEP: i32 = BASE - 17;
const TRACE: i32 = BASE - 20;
const CREATE: i32 = BASE - 22;
const TIME: i32 = BASE - 23;
const DATE: i32 = BASE - 24;
const KEYWORD: i32 = BASE - 100;

const INTERP_INFO: &[IdEntry] = &[
    IdEntry::new(EXIT, IdKind::Function, "exit", 1),
    IdEntry::new(PRINT, IdKind::Function, "print", UNLIMITED),
    IdEntry::new(WRITELOG, IdKind::Function, "writelog", UNLIMITED),
    IdEntry::new(CLOCK, IdKind::Function, "clock", 1),
    IdEntry::new(SLEEP, IdKind::Function, "sleep", 1),
    IdEntry::new(SETTIMEOUT, IdKind::Function, "settimeout", 1),
    IdEntry::new(GETENV, IdKind::Function, "getenv", 1),
    IdEntry::new(TRACE, IdKind::Function, "trace", 1),
    IdEntry::new(CREATE, IdKind::Function, "Create", -1),
    IdEntry::new(TIME, IdKind::Function, "Time", 0),
    IdEntry::new(DATE, IdKind::Function, "Date", 0),
    IdEntry::new(KEYWORD, IdKind::Keyword, "if", Keyword::If.code()),
    IdEntry::new(KEYWORD, IdKind::Keyword, "else", Keyword::Else.code()),
    IdEntry::new(KEYWORD, IdKind::Keyword, "while", Keyword::While.code()),
    IdEntry::new(KEYWORD, IdKind::Keyword, "break", Keyword::Break.code()),
    IdEntry::new(KEYWORD, IdKind::Keyword, "continue", Keyword::Continue.code()),
    IdEntry::new(KEYWORD, IdKind::Keyword, "goto", Keyword::Goto.code()),
    IdEntry::new(KEYWORD, IdKind::Keyword, "gosub", Keyword::Gosub.code()),
    IdEntry::new(KEYWORD, IdKind::Keyword, "return", Keyword::Return.code()),
    IdEntry::new(KEYWORD, IdKind::Keyword, "extern", Keyword::External.code()),
];

/// Local wall-clock time, `HH:MM:SS`.
pub fn time_text() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

/// Local date, `YYYY-MM-DD`.
pub fn date_text() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

// ── Extension ─────────────────────────────────────────────────────────────────

/// Identifiers and statements an application adds to the interpreter.
///
/// Extension lookups come before the interpreter's own.  Infos returned by
/// [`Extension::get_info`] must carry [`Owner::Extension`] so requests are
/// routed back here.
pub trait Extension {
    fn get_info(&self, _name: &str) -> IdInfo {
        IdInfo::unknown()
    }

    fn get_set_value(
        &mut self,
        _core: &mut Core,
        _engine: &mut ScriptEngine,
        _info: &IdInfo,
        _value: &mut Value,
        _params: &[Value],
        _set: bool,
    ) -> Result<bool, ErrorKind> {
        Ok(false)
    }

    /// Compile-time handling of an external keyword.  `false` rejects it.
    fn additional_statement(&mut self, _core: &mut Core, _keyword: &IdInfo, _source: &str) -> bool {
        true
    }

    /// Resolve label references.  Runs after compilation, before the
    /// program's own jumps are linked.
    fn link(&mut self, _core: &mut Core) -> Result<(), ScriptError> {
        Ok(())
    }

    /// Drop everything the extension created for the current script.
    fn clear(&mut self, _core: &mut Core) {}

    fn info_names(&self) -> Vec<String> {
        Vec::new()
    }
}

impl Extension for () {}

// ── Core ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct ScriptVar {
    name: String,
    value: Value,
}

/// Interpreter state shared with extensions: program, variables, objects,
/// the IP stack and the output buffer.
pub struct Core {
    registry: Rc<FunctionRegistry>,
    program: Program,
    variables: Vec<ScriptVar>,
    arena: ObjectArena,
    stack: Vec<isize>,
    ip: isize,
    error_ip: isize,
    main: isize,
    state: State,
    step_mode: bool,
    trace: bool,
    listing: bool,
    script_name: String,
    max_loop_time: Option<Duration>,
    sleep_until: Option<Instant>,
    exit_code: ExitCode,
    compile_pos: CodePos,
    output: Vec<String>,
}

impl Core {
    fn new(registry: Rc<FunctionRegistry>) -> Self {
        Core {
            registry,
            program: Program::default(),
            variables: Vec::new(),
            arena: ObjectArena::new(),
            stack: Vec::new(),
            ip: -1,
            error_ip: -1,
            main: -1,
            state: State::Empty,
            step_mode: false,
            trace: false,
            listing: false,
            script_name: String::new(),
            max_loop_time: None,
            sleep_until: None,
            exit_code: ExitCode::Normal,
            compile_pos: CodePos::default(),
            output: Vec::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn label_ip(&self, name: &str) -> Option<isize> {
        self.program.label_ip(name)
    }

    pub fn arena(&self) -> &ObjectArena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut ObjectArena {
        &mut self.arena
    }

    pub fn registry(&self) -> &Rc<FunctionRegistry> {
        &self.registry
    }

    pub fn script_name(&self) -> &str {
        &self.script_name
    }

    /// Append a line to the script output.
    pub fn print(&mut self, line: impl Into<String>) {
        self.output.push(line.into());
    }

    fn set_state(&mut self, state: State) {
        let prev = self.state;
        self.state = state;
        if state == State::Error && prev != State::Error {
            self.error_ip = self.ip;
        }
        if state != State::Error {
            self.error_ip = -1;
        }
    }

    fn exit_function(&mut self, code: ExitCode) {
        self.exit_code = code;
        debug!(script = %self.script_name, code = code.name(), "exit");
    }

    fn get_info(&self, name: &str) -> IdInfo {
        let info = lookup(INTERP_INFO, name, Owner::Scope);
        if info.is_known() {
            return info;
        }
        if let Some(i) = self.variables.iter().position(|v| v.name == name) {
            return IdInfo::new(i as i32, IdKind::Variable, name, 0, Owner::Scope);
        }
        if let Some(i) = self.program.labels.iter().position(|l| l.name == name) {
            return IdInfo::new(i as i32, IdKind::Constant, name, 0, Owner::Scope);
        }
        IdInfo::unknown()
    }

    fn info_names(&self) -> Vec<String> {
        let mut names = table_names(INTERP_INFO);
        names.extend(self.variables.iter().map(|v| v.name.clone()));
        names.extend(self.program.labels.iter().map(|l| l.name.clone()));
        names
    }

    fn get_set_value(&mut self, info: &IdInfo, value: &mut Value, params: &[Value], set: bool) -> Result<bool, ErrorKind> {
        match info.kind {
            IdKind::Variable if info.key >= 0 => {
                let Core { variables, arena, .. } = self;
                let var = variables.get_mut(info.key as usize).ok_or(ErrorKind::UnknownVariable)?;
                if set {
                    let current = ObjectHandle::from_value(&var.value).filter(|h| arena.contains(*h));
                    let incoming = ObjectHandle::from_value(value).filter(|h| arena.contains(*h));
                    if current != incoming {
                        if let Some(h) = current {
                            arena.release(h);
                        }
                        if let Some(h) = incoming {
                            arena.retain(h);
                        }
                    }
                    var.value.assign(value);
                } else {
                    value.set(var.value.clone());
                }
                Ok(true)
            }
            IdKind::Constant if info.key >= 0 => {
                if set {
                    return Err(ErrorKind::AssignConstant);
                }
                let label = self.program.labels.get(info.key as usize).ok_or(ErrorKind::UnknownConstant)?;
                value.set(label.ip as i64);
                Ok(true)
            }
            IdKind::Function => self.call(info.key, value, params),
            _ => Ok(false),
        }
    }

    fn call(&mut self, key: i32, value: &mut Value, params: &[Value]) -> Result<bool, ErrorKind> {
        match key {
            EXIT => {
                self.exit_function(ExitCode::Script);
                self.set_state(State::Ready);
                self.ip = -1;
                value.set(0i64);
            }
            PRINT => {
                let text = self.join(params, true);
                self.output.push(text);
            }
            WRITELOG => {
                let text = self.join(params, false);
                debug!(script = %self.script_name, "{text}");
                self.output.push(format!("{}: {text}", self.script_name));
                value.set(0i64);
            }
            CLOCK => {
                let now = chrono::Utc::now().timestamp_micros() as f64 / 1e6;
                let since = params[0].get_float();
                value.set(if params[0].is_zero() { now } else { now - since });
            }
            SLEEP => {
                let seconds = params[0].get_float().max(0.0);
                if self.step_mode {
                    self.sleep_until = Some(Instant::now() + Duration::from_secs_f64(seconds));
                } else {
                    std::thread::sleep(Duration::from_secs_f64(seconds));
                }
                value.set(0i64);
            }
            SETTIMEOUT => {
                let usec = params[0].get_integer();
                self.max_loop_time = (usec > 0).then(|| Duration::from_micros(usec as u64));
                value.set(0i64);
            }
            GETENV => value.set(std::env::var(params[0].get_string()).unwrap_or_default()),
            TRACE => {
                let n = params[0].get_integer();
                self.trace = n != 0;
                value.set(n);
            }
            CREATE => {
                let type_name = params[0].get_string();
                let object = self.registry.create(&type_name, &params[1..]).map_err(|e| {
                    warn!(type_name = %type_name, "script object type does not exist");
                    e
                })?;
                let handle = self.arena.insert(object);
                value.set(handle.to_value());
            }
            TIME => value.set(time_text()),
            DATE => value.set(date_text()),
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Space separated parameter text.  Objects show as `Type(:handle)`.
    fn join(&self, params: &[Value], objects: bool) -> String {
        params
            .iter()
            .map(|p| {
                ObjectHandle::from_value(p)
                    .filter(|_| objects)
                    .and_then(|h| self.arena.get(h).map(|o| format!("{}(:{h})", o.type_name())))
                    .unwrap_or_else(|| p.get_string())
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn write_listing(&mut self) {
        let mut lines: Vec<String> = self
            .variables
            .iter()
            .map(|v| format!("VARIABLES: {} {}", v.name, v.value.to_stream()))
            .collect();
        lines.extend(self.program.labels.iter().map(|l| format!("LABELS: {} {}", l.name, l.ip)));
        lines.extend((0..self.program.len() as isize).filter_map(|ip| self.program.instruction_text(ip)));
        self.output.extend(lines);
    }
}

// ── Runtime ───────────────────────────────────────────────────────────────────

/// The scope scripts evaluate in: extension first, then the interpreter.
pub struct Runtime<E> {
    ext: E,
    core: Core,
}

impl<E: Extension> Scope for Runtime<E> {
    fn get_info(&self, name: &str) -> IdInfo {
        let info = self.ext.get_info(name);
        if info.is_known() {
            return info;
        }
        self.core.get_info(name)
    }

    fn get_set_value(
        &mut self,
        engine: &mut ScriptEngine,
        info: &IdInfo,
        value: &mut Value,
        params: &[Value],
        set: bool,
    ) -> Result<bool, ErrorKind> {
        if info.owner == Owner::Extension {
            return self.ext.get_set_value(&mut self.core, engine, info, value, params, set);
        }
        self.core.get_set_value(info, value, params, set)
    }

    fn object(&mut self, handle: ObjectHandle) -> Option<&mut (dyn ScriptObject + 'static)> {
        self.core.arena.get_mut(handle)
    }

    fn release_object(&mut self, handle: ObjectHandle) {
        self.core.arena.collect(handle);
    }

    fn info_names(&self) -> Vec<String> {
        let mut names = self.core.info_names();
        names.extend(self.ext.info_names());
        names
    }
}

impl<E: Extension> Declarations for Runtime<E> {
    fn resolve(&self, name: &str) -> IdInfo {
        let info = Scope::get_info(self, name);
        if info.is_known() {
            return info;
        }
        let info = builtins::get_info(name);
        if info.is_known() {
            return info;
        }
        self.core.registry.get_info(name)
    }

    fn declare(&mut self, name: &str, value_type: ValueType) {
        self.core.variables.push(ScriptVar {
            name: name.to_owned(),
            value: Value::of_type(value_type),
        });
    }

    fn additional_statement(&mut self, keyword: &IdInfo, source: &str) -> bool {
        self.ext.additional_statement(&mut self.core, keyword, source)
    }
}

// ── Interpreter ───────────────────────────────────────────────────────────────

pub struct Interpreter<E: Extension = ()> {
    engine: ScriptEngine,
    rt: Runtime<E>,
    accumulator: Value,
    sentry: bool,
}

impl<E: Extension + Default> Default for Interpreter<E> {
    fn default() -> Self {
        Interpreter::new(Rc::new(FunctionRegistry::new()), E::default())
    }
}

impl<E: Extension> Interpreter<E> {
    pub fn new(registry: Rc<FunctionRegistry>, ext: E) -> Self {
        Interpreter {
            engine: ScriptEngine::new(Rc::clone(&registry)),
            rt: Runtime {
                ext,
                core: Core::new(registry),
            },
            accumulator: Value::Undefined,
            sentry: false,
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn extension(&self) -> &E {
        &self.rt.ext
    }

    pub fn extension_mut(&mut self) -> &mut E {
        &mut self.rt.ext
    }

    pub fn core(&self) -> &Core {
        &self.rt.core
    }

    /// Extension and core borrowed together.
    pub fn parts_mut(&mut self) -> (&mut E, &mut Core) {
        (&mut self.rt.ext, &mut self.rt.core)
    }

    pub fn engine(&self) -> &ScriptEngine {
        &self.engine
    }

    pub fn state(&self) -> State {
        self.rt.core.state
    }

    pub fn instruction_ptr(&self) -> isize {
        self.rt.core.ip
    }

    pub fn error_instruction_ptr(&self) -> isize {
        self.rt.core.error_ip
    }

    pub fn error(&self) -> ErrorKind {
        self.engine.error()
    }

    pub fn last_error(&self) -> Option<ScriptError> {
        self.engine.last_error()
    }

    pub fn exit_code(&self) -> ExitCode {
        self.rt.core.exit_code
    }

    pub fn is_step_mode(&self) -> bool {
        self.rt.core.step_mode
    }

    pub fn accumulator(&self) -> &Value {
        &self.accumulator
    }

    pub fn script_name(&self) -> &str {
        &self.rt.core.script_name
    }

    pub fn set_script_name(&mut self, name: &str) {
        self.rt.core.script_name = name.to_owned();
    }

    /// Loop timer for [`Interpreter::call_function`]; `None` disables it.
    pub fn set_max_loop_time(&mut self, limit: Option<Duration>) {
        self.rt.core.max_loop_time = limit;
    }

    pub fn set_trace(&mut self, on: bool) {
        self.rt.core.trace = on;
    }

    pub fn set_listing(&mut self, on: bool) {
        self.rt.core.listing = on;
    }

    pub fn label_ip(&self, name: &str) -> Option<isize> {
        self.rt.core.label_ip(name)
    }

    /// Current value of a script variable.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.rt.core.variables.iter().find(|v| v.name == name).map(|v| &v.value)
    }

    pub fn output(&self) -> &[String] {
        &self.rt.core.output
    }

    /// Drain the output buffer.
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.rt.core.output)
    }

    // ── Compilation ───────────────────────────────────────────────────────────

    /// Compile and link `src`.  On success the state is `Compiled`; on
    /// failure it stays `Empty` and the error is queryable.
    pub fn compile(&mut self, src: &str) -> bool {
        if self.rt.core.state == State::Running {
            return false;
        }
        self.clear();
        let program = match stmt::compile(src, &mut self.rt) {
            Ok(p) => p,
            Err(e) => {
                self.rt.core.compile_pos = e.pos;
                return self.engine.set_error(e.error.kind, &e.error.reason);
            }
        };
        self.rt.core.program = program;
        let linked = match self.rt.ext.link(&mut self.rt.core) {
            Ok(()) => self.rt.core.program.link(),
            Err(e) => Err(e),
        };
        if let Err(e) = linked {
            return self.engine.set_error(e.kind, &e.reason);
        }
        let core = &mut self.rt.core;
        core.main = core.program.label_ip("main").unwrap_or(-1);
        if core.listing {
            core.write_listing();
        }
        core.set_state(State::Compiled);
        core.ip = -1;
        debug!(script = %core.script_name, instructions = core.program.len(), "compiled");
        true
    }

    /// Drop the program, variables, objects and error.
    pub fn clear(&mut self) {
        let core = &mut self.rt.core;
        core.set_state(State::Empty);
        for var in std::mem::take(&mut core.variables) {
            if let Some(h) = ObjectHandle::from_value(&var.value) {
                core.arena.release(h);
            }
        }
        core.program = Program::default();
        core.stack.clear();
        core.ip = -1;
        core.main = -1;
        core.sleep_until = None;
        core.compile_pos = CodePos::default();
        self.rt.ext.clear(&mut self.rt.core);
        self.rt.core.arena.clear();
        self.engine.clear_error();
    }

    // ── Evaluation ────────────────────────────────────────────────────────────

    /// Evaluate an expression in the script's scope.
    pub fn calculate(&mut self, script: &str, result: &mut Value) -> bool {
        self.engine.calculate(script, &mut self.rt, result)
    }

    /// All names a script can use, one per entry.
    pub fn info_names(&self) -> Vec<String> {
        self.engine.info_names(&self.rt)
    }

    // ── Execution ─────────────────────────────────────────────────────────────

    /// Call the code at `ip` as a subroutine.  In step mode the call is only
    /// set up; otherwise it runs until it returns, the script ends, an error
    /// occurs or the loop timer expires.
    pub fn call_function(&mut self, ip: isize, step_mode: bool) {
        let core = &mut self.rt.core;
        if matches!(core.state, State::Empty | State::Error) || ip < 0 {
            return;
        }
        core.stack.push(core.ip);
        core.ip = ip;
        if step_mode {
            if core.state == State::Ready {
                core.set_state(State::Running);
            }
            return;
        }
        if !matches!(core.state, State::Ready | State::Running | State::Compiled) {
            return;
        }
        let prev = core.state;
        core.set_state(State::Running);
        let entry = core.stack.len() - 1;
        let started = Instant::now();
        loop {
            let state = self.rt.core.state;
            if state == State::Error || state == State::Ready {
                self.rt.core.stack.truncate(entry);
                break;
            }
            self.do_step();
            let core = &mut self.rt.core;
            if core.stack.len() <= entry {
                core.set_state(prev);
                break;
            }
            if let Some(limit) = core.max_loop_time {
                let elapsed = started.elapsed();
                if elapsed > limit {
                    core.set_state(State::Error);
                    self.engine.set_error(ErrorKind::ScriptTimeout, &format!("{:.3} s", elapsed.as_secs_f64()));
                    warn!(script = %self.rt.core.script_name, "script function timed out");
                    break;
                }
            }
        }
    }

    /// Call a label by name.  Returns `false` if there is no such label.
    pub fn call_label(&mut self, name: &str, step_mode: bool) -> bool {
        match self.label_ip(name) {
            Some(ip) => {
                self.call_function(ip, step_mode);
                true
            }
            None => {
                debug!(label = name, "function or label not present in script");
                false
            }
        }
    }

    pub fn execute(&mut self, mode: ExecMode) -> State {
        if self.sentry && mode != ExecMode::Abort {
            return self.rt.core.state;
        }
        self.sentry = true;
        match mode {
            ExecMode::Start => {
                let core = &mut self.rt.core;
                if core.state == State::Ready {
                    if core.main >= 0 {
                        core.stack.push(-1);
                        core.ip = core.main;
                    } else {
                        core.ip = 0;
                    }
                    core.set_state(State::Running);
                    core.step_mode = true;
                } else {
                    debug!("can only start when in state Ready");
                }
            }
            ExecMode::Step => {
                let core = &self.rt.core;
                if core.state == State::Running && core.step_mode {
                    let sleep_until = core.sleep_until;
                    match sleep_until {
                        Some(until) if Instant::now() < until => {}
                        Some(_) => self.rt.core.sleep_until = None,
                        None => self.do_step(),
                    }
                } else {
                    debug!("can only step when Running after Start");
                }
            }
            ExecMode::Init => {
                if self.rt.core.state == State::Compiled {
                    if self.rt.core.main >= 0 {
                        self.call_function(0, false);
                    }
                    if self.rt.core.state != State::Error {
                        self.rt.core.set_state(State::Ready);
                    }
                } else {
                    debug!("can only initialize when in state Compiled");
                }
            }
            ExecMode::Run => {
                if self.rt.core.state == State::Ready {
                    let core = &mut self.rt.core;
                    core.ip = -1;
                    core.step_mode = false;
                    let start = core.main.max(0);
                    self.call_function(start, false);
                    let core = &mut self.rt.core;
                    match core.state {
                        State::Running => {
                            core.exit_function(ExitCode::Normal);
                            core.set_state(State::Ready);
                            core.ip = -1;
                        }
                        State::Error => core.exit_function(ExitCode::Error),
                        _ => {}
                    }
                } else {
                    debug!("can only run when in state Ready");
                }
            }
            ExecMode::Abort => {
                let core = &mut self.rt.core;
                if core.state == State::Running {
                    core.exit_function(ExitCode::Application);
                    core.set_state(State::Ready);
                    core.ip = -1;
                    core.stack.clear();
                }
            }
        }
        if self.engine.error() != ErrorKind::Success {
            self.rt.core.set_state(State::Error);
        }
        self.sentry = false;
        self.rt.core.state
    }

    fn do_step(&mut self) {
        let core = &mut self.rt.core;
        if core.state != State::Running {
            return;
        }
        if core.ip >= 0 && (core.ip as usize) < core.program.len() {
            self.do_execute();
            if self.rt.core.state == State::Error {
                self.rt.core.exit_function(ExitCode::Error);
            }
        } else {
            core.exit_function(ExitCode::Normal);
            core.set_state(State::Ready);
            core.ip = -1;
        }
    }

    fn do_execute(&mut self) {
        let core = &mut self.rt.core;
        if core.state == State::Error || core.ip < 0 {
            return;
        }
        if core.trace {
            let text = core.program.instruction_text(core.ip).unwrap_or_default();
            trace!(script = %core.script_name, "{text}");
            core.output.push(format!("Script '{}': {text}", core.script_name));
        }
        let Some(instr) = core.program.instructions.get(core.ip as usize).cloned() else {
            core.set_state(State::Error);
            return;
        };
        match instr.instr {
            Instr::None => core.ip += 1,
            Instr::Calc | Instr::Zjmp => {
                let depth = core.stack.len();
                let mut acc = std::mem::take(&mut self.accumulator);
                let ok = self.engine.calculate(&instr.script, &mut self.rt, &mut acc);
                self.accumulator = acc;
                let core = &mut self.rt.core;
                if depth > core.stack.len() {
                    return;
                }
                if !ok {
                    core.set_state(State::Error);
                    return;
                }
                // `exit` leaves the instruction pointer alone.
                if core.state != State::Running {
                    return;
                }
                if instr.instr == Instr::Zjmp && self.accumulator.is_zero() {
                    core.ip = instr.target;
                } else {
                    core.ip += 1;
                }
            }
            Instr::Jmp => core.ip = instr.target,
            Instr::Call => {
                core.stack.push(core.ip + 1);
                core.ip = instr.target;
            }
            Instr::Retf => match core.stack.pop() {
                Some(ip) => core.ip = ip,
                None => {
                    self.engine.set_error(ErrorKind::IpStack, "Unexpected end of stack.");
                    core.set_state(State::Error);
                }
            },
            Instr::Goto | Instr::Break | Instr::Continue => {
                self.engine.set_error(ErrorKind::CompilerImplementationError, instr.instr.mnemonic());
                core.set_state(State::Error);
            }
        }
    }

    // ── Diagnostics ───────────────────────────────────────────────────────────

    /// One listing line for `ip`, or blanks when out of range.
    pub fn instruction_text(&self, ip: isize) -> String {
        self.rt
            .core
            .program
            .instruction_text(ip)
            .unwrap_or_else(|| " ".repeat(70))
    }

    /// Script name, state, error and where it happened.
    pub fn debug_text(&self) -> String {
        let core = &self.rt.core;
        let mut text = format!(
            "Script: {}\nState: {}\nError: '{}' {}",
            core.script_name,
            core.state,
            self.engine.error_reason(),
            self.engine.error_text()
        );
        if core.state == State::Empty {
            text.push_str(&format!(
                "\nLocation: Line {}, Pos {}",
                core.compile_pos.line + 1,
                core.compile_pos.offset
            ));
        } else if let Some(instr) = usize::try_from(core.error_ip)
            .ok()
            .and_then(|i| core.program.instructions.get(i))
        {
            text.push_str(&format!(
                "\nLocation: Instr {} {} at Line {} at Pos {}",
                core.error_ip,
                instr.script,
                instr.pos.line + 1,
                instr.pos.offset
            ));
        }
        text
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
