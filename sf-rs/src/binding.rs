//! Information script: the interpreter bound to a [`Host`].
//!
//! Scripts reach host entities three ways:
//!
//! - `import Name,id;` and `export Name,definition;` bind a script name to a
//!   host variable.  Reading the name gives the current value, assigning it
//!   writes the current value.
//! - `Variable(id)`, `Variable("definition")` and `ResultData(id)` return
//!   proxy objects with members (`v.Cur`, `v.OnValue = Label`, `r.Data(0)`).
//! - Parameters registered with [`InformationScript::add_param`] appear as
//!   named `VarParam` objects.
//!
//! `on_change Name Label;` calls `Label` whenever the bound variable changes.
//! Host changes are queued as events; [`Interpreter::dispatch_events`]
//! delivers them to the hooks.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::hook::{Hook, HookSlots};
use crate::host::{HostEvent, LinkId, ResultData, SharedHost, Target, Variable, VariableFlags};
use crate::script::error::{ErrorKind, ScriptError};
use crate::script::interp::{date_text, time_text, Core, Extension, Interpreter, State};
use crate::script::object::{lookup, table_names, IdEntry, IdInfo, IdKind, ObjectHandle, Owner, ScriptObject};
use crate::script::registry::FunctionRegistry;
use crate::script::stmt::Keyword;
use crate::script::value::{parse_c_long, Value};
use crate::script::ScriptEngine;

// ── Identifier tables ─────────────────────────────────────────────────────────

const TIME: i32 = 1;
const DATE: i32 = 2;
const SET_FLAGS: i32 = 3;
const SET_FLAG: i32 = 4;
const UNSET_FLAG: i32 = 5;
const CREATE_VAR: i32 = 6;
const VARIABLE: i32 = 7;
const RESULT_DATA: i32 = 8;
const ON_CHANGE: i32 = 20;
const IMPORT: i32 = 21;
const EXPORT: i32 = 22;
/// Keys of bound names start here.
const BOUND_BASE: i32 = 1000;
/// Keys of parameters start here.
const PARAM_BASE: i32 = 2000;

const SCRIPT_INFO: &[IdEntry] = &[
    IdEntry::new(TIME, IdKind::Function, "Time", 0),
    IdEntry::new(DATE, IdKind::Function, "Date", 0),
    IdEntry::new(SET_FLAGS, IdKind::Function, "SetFlags", 2),
    IdEntry::new(SET_FLAG, IdKind::Function, "SetFlag", 2),
    IdEntry::new(UNSET_FLAG, IdKind::Function, "UnsetFlag", 2),
    IdEntry::new(CREATE_VAR, IdKind::Function, "CreateVar", 2),
    IdEntry::new(VARIABLE, IdKind::Function, "Variable", 1),
    IdEntry::new(RESULT_DATA, IdKind::Function, "ResultData", 1),
    IdEntry::new(ON_CHANGE, IdKind::Keyword, "on_change", Keyword::External.code()),
    IdEntry::new(IMPORT, IdKind::Keyword, "import", Keyword::External.code()),
    IdEntry::new(EXPORT, IdKind::Keyword, "export", Keyword::External.code()),
];

const V_SETUP: i32 = 1;
const V_ID: i32 = 2;
const V_NAME: i32 = 3;
const V_UNIT: i32 = 4;
const V_CUR: i32 = 5;
const V_DEF: i32 = 6;
const V_RND: i32 = 7;
const V_MIN: i32 = 8;
const V_MAX: i32 = 9;
const V_FLAGS: i32 = 10;
const V_IS_FLAGS: i32 = 11;
const V_SET_FLAGS: i32 = 12;
const V_UNSET_FLAGS: i32 = 13;
const V_CUR_STR: i32 = 14;
const V_ON_VALUE: i32 = 50;
const V_ON_FLAGS: i32 = 51;
const V_ON_ID: i32 = 52;
const V_SKIP_EVENT: i32 = 53;

const VAR_PARAM_INFO: &[IdEntry] = &[
    IdEntry::new(V_SETUP, IdKind::Function, "Setup", 1),
    IdEntry::new(V_ID, IdKind::Constant, "Id", 0),
    IdEntry::new(V_NAME, IdKind::Function, "Name", 1),
    IdEntry::new(V_UNIT, IdKind::Constant, "Unit", 0),
    IdEntry::new(V_CUR, IdKind::Variable, "Cur", 0),
    IdEntry::new(V_CUR_STR, IdKind::Constant, "CurStr", 0),
    IdEntry::new(V_RND, IdKind::Constant, "Rnd", 0),
    IdEntry::new(V_DEF, IdKind::Constant, "Def", 0),
    IdEntry::new(V_MIN, IdKind::Constant, "Min", 0),
    IdEntry::new(V_MAX, IdKind::Constant, "Max", 0),
    IdEntry::new(V_FLAGS, IdKind::Variable, "Flags", 0),
    IdEntry::new(V_IS_FLAGS, IdKind::Function, "IsFlags", 1),
    IdEntry::new(V_SET_FLAGS, IdKind::Function, "SetFlags", 1),
    IdEntry::new(V_UNSET_FLAGS, IdKind::Function, "UnsetFlags", 1),
];

const VARIABLE_INFO: &[IdEntry] = &[
    IdEntry::new(V_ON_VALUE, IdKind::Variable, "OnValue", 0),
    IdEntry::new(V_ON_FLAGS, IdKind::Variable, "OnFlags", 0),
    IdEntry::new(V_ON_ID, IdKind::Variable, "OnId", 0),
    IdEntry::new(V_SKIP_EVENT, IdKind::Variable, "SkipEvent", 0),
];

const R_ID: i32 = 1;
const R_NAME: i32 = 2;
const R_FLAGS: i32 = 3;
const R_OFFSET: i32 = 4;
const R_RANGE: i32 = 5;
const R_DATA: i32 = 6;
const R_BLOCK_COUNT: i32 = 7;
const R_REQUEST: i32 = 8;
const R_ON_ID: i32 = 50;
const R_ON_ACCESS: i32 = 51;
const R_ON_CLEAR: i32 = 52;
const R_ON_GOT_RANGE: i32 = 53;

const RESULT_INFO: &[IdEntry] = &[
    IdEntry::new(R_ID, IdKind::Constant, "Id", 0),
    IdEntry::new(R_NAME, IdKind::Function, "Name", 1),
    IdEntry::new(R_FLAGS, IdKind::Constant, "Flags", 0),
    IdEntry::new(R_OFFSET, IdKind::Constant, "Offset", 0),
    IdEntry::new(R_RANGE, IdKind::Constant, "Range", 0),
    IdEntry::new(R_DATA, IdKind::Function, "Data", 1),
    IdEntry::new(R_BLOCK_COUNT, IdKind::Variable, "BlockCount", 0),
    IdEntry::new(R_REQUEST, IdKind::Function, "Request", 2),
    IdEntry::new(R_ON_ID, IdKind::Variable, "OnId", 0),
    IdEntry::new(R_ON_ACCESS, IdKind::Variable, "OnAccess", 0),
    IdEntry::new(R_ON_CLEAR, IdKind::Variable, "OnClear", 0),
    IdEntry::new(R_ON_GOT_RANGE, IdKind::Variable, "OnGotRange", 0),
];

fn variable_member_hook(key: i32) -> Option<Hook> {
    match key {
        V_ON_VALUE => Some(Hook::Value),
        V_ON_FLAGS => Some(Hook::Flags),
        V_ON_ID => Some(Hook::Id),
        _ => None,
    }
}

fn result_member_hook(key: i32) -> Option<Hook> {
    match key {
        R_ON_ID => Some(Hook::Id),
        R_ON_ACCESS => Some(Hook::Access),
        R_ON_CLEAR => Some(Hook::Clear),
        R_ON_GOT_RANGE => Some(Hook::GotRange),
        _ => None,
    }
}

fn param(params: &[Value], i: usize) -> Result<&Value, ErrorKind> {
    params.get(i).ok_or(ErrorKind::TooFewParameters)
}

fn levels(params: &[Value]) -> Result<i32, ErrorKind> {
    let n = param(params, 0)?.get_integer();
    Ok(n.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
}

// ── Proxy state ───────────────────────────────────────────────────────────────

/// Hook slots and event options a proxy shares with the binding list.
#[derive(Debug)]
struct ProxyState {
    hooks: Cell<HookSlots>,
    skip_event: Cell<bool>,
}

impl ProxyState {
    fn new(skip_event: bool) -> Rc<Self> {
        Rc::new(ProxyState {
            hooks: Cell::new(HookSlots::default()),
            skip_event: Cell::new(skip_event),
        })
    }

    fn hook(&self, hook: Hook) -> isize {
        self.hooks.get().get(hook)
    }

    fn set_hook(&self, hook: Hook, ip: isize) {
        let mut slots = self.hooks.get();
        slots.set(hook, ip);
        self.hooks.set(slots);
    }

    fn armed(&self, hook: Hook) -> Option<isize> {
        self.hooks.get().armed(hook)
    }
}

// ── VariableProxy ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VarKind {
    /// Application parameter: no hooks.
    Param,
    Variable,
}

/// Script object in front of a host variable link.
struct VariableProxy {
    host: SharedHost,
    link: LinkId,
    kind: VarKind,
    state: Rc<ProxyState>,
}

impl VariableProxy {
    fn linked<R>(&self, f: impl FnOnce(&Variable) -> R) -> Option<R> {
        self.host.borrow().linked_variable(self.link).map(f)
    }

    fn write_cur(&self, value: &Value) {
        let skip = self.state.skip_event.get();
        if self.host.borrow_mut().set_variable(self.link, value, skip).is_none() {
            let name = self.linked(|v| v.name(0)).unwrap_or_default();
            warn!(variable = %name, "current value of '{}' could not be set", name);
        }
    }

    fn change_flags(&self, f: impl FnOnce(VariableFlags) -> VariableFlags) -> bool {
        let Some(cur) = self.linked(Variable::cur_flags) else {
            return false;
        };
        let skip = self.state.skip_event.get();
        self.host.borrow_mut().update_flags(self.link, f(cur), skip)
    }

    /// Imported links are the ones the script may re-point or reflag.
    fn is_global(&self) -> bool {
        !self.host.borrow().is_owner(self.link)
    }
}

impl ScriptObject for VariableProxy {
    fn type_name(&self) -> &str {
        match self.kind {
            VarKind::Param => "VarParam",
            VarKind::Variable => "Variable",
        }
    }

    fn get_info(&self, name: &str) -> IdInfo {
        if self.kind == VarKind::Variable {
            let info = lookup(VARIABLE_INFO, name, Owner::Scope);
            if info.is_known() {
                return info;
            }
        }
        lookup(VAR_PARAM_INFO, name, Owner::Scope)
    }

    fn get_set_value(
        &mut self,
        info: &IdInfo,
        value: &mut Value,
        params: &[Value],
        set: bool,
    ) -> Result<bool, ErrorKind> {
        if let Some(hook) = variable_member_hook(info.key) {
            if set {
                self.state.set_hook(hook, value.get_integer() as isize);
            } else {
                value.set(self.state.hook(hook) as i64);
            }
            return Ok(true);
        }
        match info.key {
            V_SETUP => {
                let p = param(params, 0)?;
                let ok = if p.is_number() {
                    self.host.borrow_mut().relink_variable(self.link, p.get_integer())
                } else {
                    self.host.borrow_mut().redefine_variable(self.link, &p.get_string()).is_ok()
                };
                value.set(ok);
            }
            V_ID => {
                if set {
                    if self.is_global() {
                        self.host.borrow_mut().relink_variable(self.link, value.get_integer());
                    }
                } else {
                    value.set(self.linked(Variable::id).unwrap_or(0));
                }
            }
            V_NAME => {
                let n = levels(params)?;
                value.set(self.linked(|v| v.name(n)).unwrap_or_default());
            }
            V_CUR => {
                if set {
                    self.write_cur(value);
                } else {
                    value.set(self.linked(|v| v.cur().clone()).unwrap_or(Value::Invalid));
                }
            }
            V_FLAGS => {
                if set {
                    if self.is_global() {
                        let flags = VariableFlags::from_letters(&value.get_string());
                        let skip = self.state.skip_event.get();
                        self.host.borrow_mut().update_flags(self.link, flags, skip);
                    }
                } else {
                    value.set(self.linked(|v| v.cur_flags().letters()).unwrap_or_default());
                }
            }
            V_IS_FLAGS => {
                let flags = VariableFlags::from_letters(&param(params, 0)?.get_string());
                value.set(self.linked(|v| v.cur_flags().contains(flags)).unwrap_or(false));
            }
            V_SET_FLAGS => {
                let flags = VariableFlags::from_letters(&param(params, 0)?.get_string());
                value.set(self.change_flags(|cur| cur | flags));
            }
            V_UNSET_FLAGS => {
                let flags = VariableFlags::from_letters(&param(params, 0)?.get_string());
                value.set(self.change_flags(|cur| cur & !flags));
            }
            V_SKIP_EVENT => {
                if set {
                    self.state.skip_event.set(value.get_integer() > 0);
                } else {
                    value.set(self.state.skip_event.get());
                }
            }
            // Read-only members ignore assignment.
            _ if set => {}
            V_UNIT => value.set(self.linked(|v| v.unit().to_owned()).unwrap_or_default()),
            V_CUR_STR => value.set(self.linked(Variable::cur_string).unwrap_or_default()),
            V_RND => value.set(self.linked(|v| v.round().clone()).unwrap_or(Value::Invalid)),
            V_DEF => value.set(self.linked(|v| v.default_value().clone()).unwrap_or(Value::Invalid)),
            V_MIN => value.set(self.linked(|v| v.min().clone()).unwrap_or(Value::Invalid)),
            V_MAX => value.set(self.linked(|v| v.max().clone()).unwrap_or(Value::Invalid)),
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn destroy_object(&mut self) -> bool {
        false
    }

    fn info_names(&self) -> Vec<String> {
        let mut names = table_names(VAR_PARAM_INFO);
        if self.kind == VarKind::Variable {
            names.extend(table_names(VARIABLE_INFO));
        }
        names
    }
}

// ── ResultProxy ───────────────────────────────────────────────────────────────

/// Script object in front of a host result link.
struct ResultProxy {
    host: SharedHost,
    link: LinkId,
    state: Rc<ProxyState>,
}

impl ResultProxy {
    fn linked<R>(&self, f: impl FnOnce(&ResultData) -> R) -> Option<R> {
        self.host.borrow().linked_result(self.link).map(f)
    }
}

impl ScriptObject for ResultProxy {
    fn type_name(&self) -> &str {
        "ResultData"
    }

    fn get_info(&self, name: &str) -> IdInfo {
        lookup(RESULT_INFO, name, Owner::Scope)
    }

    fn get_set_value(
        &mut self,
        info: &IdInfo,
        value: &mut Value,
        params: &[Value],
        set: bool,
    ) -> Result<bool, ErrorKind> {
        if let Some(hook) = result_member_hook(info.key) {
            if set {
                self.state.set_hook(hook, value.get_integer() as isize);
            } else {
                value.set(self.state.hook(hook) as i64);
            }
            return Ok(true);
        }
        match info.key {
            R_ID => {
                if set {
                    self.host.borrow_mut().relink_result(self.link, value.get_integer());
                } else {
                    value.set(self.linked(ResultData::id).unwrap_or(0));
                }
            }
            R_NAME => {
                let n = levels(params)?;
                value.set(self.linked(|r| r.name(n)).unwrap_or_default());
            }
            R_DATA => {
                let index = param(params, 0)?.get_integer();
                let sample = self
                    .linked(|r| {
                        let i = if index < 0 {
                            r.block_count().checked_sub(1)
                        } else {
                            usize::try_from(index).ok()
                        };
                        i.and_then(|i| r.data(i))
                    })
                    .flatten();
                value.set(sample.unwrap_or(0));
            }
            R_REQUEST => {
                let offset = param(params, 0)?.get_integer();
                let mut size = param(params, 1)?.get_integer();
                if size < 0 {
                    size = self.linked(|r| r.block_count() as i64).unwrap_or(0) - offset;
                }
                value.set(self.host.borrow_mut().request_range(self.link, offset, size));
            }
            _ if set => {}
            R_FLAGS => value.set(self.linked(|r| r.flags().letters()).unwrap_or_default()),
            R_OFFSET => value.set(self.linked(ResultData::value_offset).unwrap_or(0)),
            R_RANGE => value.set(self.linked(ResultData::value_range).unwrap_or(0)),
            R_BLOCK_COUNT => value.set(self.linked(|r| r.block_count() as i64).unwrap_or(0)),
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn destroy_object(&mut self) -> bool {
        false
    }

    fn info_names(&self) -> Vec<String> {
        table_names(RESULT_INFO)
    }
}

// ── InformationScript ─────────────────────────────────────────────────────────

/// A variable proxy the script holds: named by `import`/`export`, or
/// anonymous from `Variable()`.
struct VarBinding {
    name: Option<String>,
    link: LinkId,
    handle: ObjectHandle,
    state: Rc<ProxyState>,
    change_label: Option<String>,
}

struct ResultBinding {
    link: LinkId,
    handle: ObjectHandle,
    state: Rc<ProxyState>,
}

/// An application parameter; its proxy exists while a script is linked.
struct ParamBinding {
    name: String,
    link: LinkId,
    handle: Option<ObjectHandle>,
}

/// [`Extension`] binding scripts to a [`Host`](crate::host::Host).
pub struct InformationScript {
    host: SharedHost,
    vars: Vec<VarBinding>,
    results: Vec<ResultBinding>,
    params: Vec<ParamBinding>,
}

impl InformationScript {
    pub fn new(host: SharedHost) -> Self {
        InformationScript {
            host,
            vars: Vec::new(),
            results: Vec::new(),
            params: Vec::new(),
        }
    }

    pub fn host(&self) -> &SharedHost {
        &self.host
    }

    /// Expose host variable `id` to scripts as a `VarParam` object named
    /// `name`.  Takes effect for the next compiled script.
    pub fn add_param(&mut self, name: &str, id: i64) {
        let link = self.host.borrow_mut().import_variable(id);
        self.params.push(ParamBinding {
            name: name.to_owned(),
            link,
            handle: None,
        });
    }

    /// Names bound by `import` and `export`.
    pub fn bound_names(&self) -> Vec<String> {
        self.vars.iter().filter_map(|b| b.name.clone()).collect()
    }

    fn named(&self, name: &str) -> Option<&VarBinding> {
        self.vars.iter().find(|b| b.name.as_deref() == Some(name))
    }

    fn bind_variable(&mut self, core: &mut Core, name: Option<String>, link: LinkId, skip_event: bool) -> ObjectHandle {
        let state = ProxyState::new(skip_event);
        let proxy = VariableProxy {
            host: Rc::clone(&self.host),
            link,
            kind: VarKind::Variable,
            state: Rc::clone(&state),
        };
        let handle = core.arena_mut().insert(Box::new(proxy));
        core.arena_mut().retain(handle);
        self.vars.push(VarBinding {
            name,
            link,
            handle,
            state,
            change_label: None,
        });
        handle
    }

    fn bind_result(&mut self, core: &mut Core, id: i64) -> ObjectHandle {
        let link = self.host.borrow_mut().link_result(id);
        let state = ProxyState::new(true);
        let proxy = ResultProxy {
            host: Rc::clone(&self.host),
            link,
            state: Rc::clone(&state),
        };
        let handle = core.arena_mut().insert(Box::new(proxy));
        core.arena_mut().retain(handle);
        self.results.push(ResultBinding { link, handle, state });
        handle
    }

    /// Owning link for a definition, or an unattached link when it does
    /// not parse.
    fn export_link(&self, definition: &str) -> LinkId {
        let mut host = self.host.borrow_mut();
        match host.export_variable(definition) {
            Ok(link) => link,
            Err(e) => {
                warn!(definition, error = %e, "variable definition rejected");
                host.import_variable(0)
            }
        }
    }

    /// The hook slot an event lands in, if it is armed.
    fn hook_for(&self, event: &HostEvent) -> Option<isize> {
        if let Some(b) = self.vars.iter().find(|b| b.link == event.link) {
            return event.event.variable_hook().and_then(|h| b.state.armed(h));
        }
        let b = self.results.iter().find(|b| b.link == event.link)?;
        event.event.result_hook().and_then(|h| b.state.armed(h))
    }

    fn flag_function(&self, key: i32, params: &[Value]) -> Result<bool, ErrorKind> {
        let name = param(params, 0)?.get_string();
        let flags = VariableFlags::from_letters(&param(params, 1)?.get_string());
        let Some(b) = self.named(&name) else {
            debug!(name = %name, "no bound variable");
            return Ok(false);
        };
        let skip = b.state.skip_event.get();
        let mut host = self.host.borrow_mut();
        let Some(cur) = host.linked_variable(b.link).map(Variable::cur_flags) else {
            return Ok(false);
        };
        let flags = match key {
            SET_FLAG => cur | flags,
            UNSET_FLAG => cur & !flags,
            _ => flags,
        };
        Ok(host.update_flags(b.link, flags, skip))
    }

    fn on_change(&mut self, source: &str) {
        static ON_CHANGE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
        let re = match ON_CHANGE.get_or_init(|| Regex::new(r"^(\S+)\s+(.+)$")) {
            Ok(re) => re,
            Err(e) => {
                warn!(error = %e, "on_change pattern");
                return;
            }
        };
        let Some((name, label)) = re
            .captures(source.trim())
            .map(|c| (c[1].to_owned(), c[2].trim().to_owned()))
        else {
            return;
        };
        match self.vars.iter_mut().find(|b| b.name.as_deref() == Some(name.as_str())) {
            Some(b) => b.change_label = Some(label),
            None => debug!(name = %name, "on_change for an unbound name"),
        }
    }

    fn import(&mut self, core: &mut Core, source: &str) -> bool {
        let Some((name, id)) = source.split_once(',') else {
            return false;
        };
        let name = name.trim();
        if name.is_empty() || self.named(name).is_some() {
            return false;
        }
        let (id, _) = parse_c_long(id.trim());
        let link = self.host.borrow_mut().import_variable(id);
        self.bind_variable(core, Some(name.to_owned()), link, true);
        true
    }

    fn export(&mut self, core: &mut Core, source: &str) -> bool {
        let (name, definition) = source.split_once(',').unwrap_or((source, ""));
        let (name, definition) = (name.trim(), definition.trim());
        if name.is_empty() || definition.is_empty() || self.named(name).is_some() {
            return false;
        }
        let exported = self.host.borrow_mut().export_variable(definition);
        match exported {
            Ok(link) => {
                self.bind_variable(core, Some(name.to_owned()), link, true);
                true
            }
            Err(e) => {
                warn!(name, error = %e, "export rejected");
                false
            }
        }
    }
}

impl Extension for InformationScript {
    fn get_info(&self, name: &str) -> IdInfo {
        let info = lookup(SCRIPT_INFO, name, Owner::Extension);
        if info.is_known() {
            return info;
        }
        if let Some(i) = self.vars.iter().position(|b| b.name.as_deref() == Some(name)) {
            return IdInfo::new(BOUND_BASE + i as i32, IdKind::Variable, name, 0, Owner::Extension);
        }
        if let Some(i) = self.params.iter().position(|p| p.name == name) {
            return IdInfo::new(PARAM_BASE + i as i32, IdKind::Constant, name, 0, Owner::Extension);
        }
        IdInfo::unknown()
    }

    fn get_set_value(
        &mut self,
        core: &mut Core,
        _engine: &mut ScriptEngine,
        info: &IdInfo,
        value: &mut Value,
        params: &[Value],
        set: bool,
    ) -> Result<bool, ErrorKind> {
        match info.key {
            TIME => value.set(time_text()),
            DATE => value.set(date_text()),
            SET_FLAGS | SET_FLAG | UNSET_FLAG => {
                let changed = self.flag_function(info.key, params)?;
                value.set(changed);
            }
            CREATE_VAR => {
                let name = param(params, 0)?.get_string();
                let definition = param(params, 1)?.get_string();
                let ok = match self.named(&name) {
                    Some(b) => self.host.borrow_mut().redefine_variable(b.link, &definition).is_ok(),
                    None => false,
                };
                value.set(ok);
            }
            VARIABLE => {
                let p = param(params, 0)?;
                let mut errors = 0;
                let id = p.get_integer_counting(&mut errors);
                let link = if errors > 0 {
                    self.export_link(&p.get_string())
                } else {
                    self.host.borrow_mut().import_variable(id)
                };
                let handle = self.bind_variable(core, None, link, true);
                value.set(handle.to_value());
            }
            RESULT_DATA => {
                let id = param(params, 0)?.get_integer();
                let handle = self.bind_result(core, id);
                value.set(handle.to_value());
            }
            k if (BOUND_BASE..PARAM_BASE).contains(&k) => {
                let Some(b) = self.vars.get((k - BOUND_BASE) as usize) else {
                    return Ok(false);
                };
                let mut host = self.host.borrow_mut();
                if set {
                    if host.set_variable(b.link, value, b.state.skip_event.get()).is_none() {
                        warn!(name = %info.name, "current value of '{}' could not be set", info.name);
                    }
                } else {
                    value.set(host.linked_variable(b.link).map_or(Value::Invalid, |v| v.cur().clone()));
                }
            }
            k if k >= PARAM_BASE => {
                let Some(p) = self.params.get((k - PARAM_BASE) as usize) else {
                    return Ok(false);
                };
                if set {
                    return Err(ErrorKind::AssignConstant);
                }
                value.set(p.handle.map_or(Value::Undefined, ObjectHandle::to_value));
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn additional_statement(&mut self, core: &mut Core, keyword: &IdInfo, source: &str) -> bool {
        if keyword.owner != Owner::Extension {
            return true;
        }
        match keyword.key {
            ON_CHANGE => {
                self.on_change(source);
                true
            }
            IMPORT => self.import(core, source),
            EXPORT => self.export(core, source),
            _ => true,
        }
    }

    fn link(&mut self, core: &mut Core) -> Result<(), ScriptError> {
        for p in &mut self.params {
            let proxy = VariableProxy {
                host: Rc::clone(&self.host),
                link: p.link,
                kind: VarKind::Param,
                state: ProxyState::new(true),
            };
            let handle = core.arena_mut().insert(Box::new(proxy));
            core.arena_mut().retain(handle);
            p.handle = Some(handle);
        }
        let mut first_missing = None;
        for b in &self.vars {
            let Some(label) = &b.change_label else {
                continue;
            };
            match core.label_ip(label) {
                Some(ip) => b.state.set_hook(Hook::Value, ip),
                None => {
                    b.state.set_hook(Hook::Value, -1);
                    core.print(format!("Label '{label}' NOT found!"));
                    first_missing.get_or_insert_with(|| label.clone());
                }
            }
        }
        match first_missing {
            Some(label) => Err(ScriptError::new(ErrorKind::LabelNotFound, label)),
            None => Ok(()),
        }
    }

    fn clear(&mut self, core: &mut Core) {
        let mut host = self.host.borrow_mut();
        for b in self.vars.drain(..) {
            host.unlink(b.link);
            core.arena_mut().remove(b.handle);
        }
        for b in self.results.drain(..) {
            host.unlink(b.link);
            core.arena_mut().remove(b.handle);
        }
        for p in &mut self.params {
            if let Some(h) = p.handle.take() {
                core.arena_mut().remove(h);
            }
        }
    }

    fn info_names(&self) -> Vec<String> {
        let mut names = table_names(SCRIPT_INFO);
        names.extend(self.bound_names());
        names.extend(self.params.iter().map(|p| p.name.clone()));
        let members = |ty: &str, table: &[IdEntry]| -> Vec<String> {
            table.iter().map(|e| format!("<{ty}>.{}", e.name)).collect()
        };
        names.extend(members("VarParam", VAR_PARAM_INFO));
        names.extend(members("Variable", VARIABLE_INFO));
        names.extend(members("ResultData", RESULT_INFO));
        names
    }
}

impl Interpreter<InformationScript> {
    /// An interpreter bound to `host` with an empty function registry.
    pub fn with_host(host: SharedHost) -> Self {
        Interpreter::new(Rc::new(FunctionRegistry::new()), InformationScript::new(host))
    }

    /// Deliver queued host events to armed hooks.  Events arriving while
    /// the script is in error or not yet initialized are dropped.  Returns
    /// the number of hooks called.
    pub fn dispatch_events(&mut self) -> usize {
        let events = self.extension().host.borrow_mut().take_events();
        let mut called = 0;
        for event in events {
            if matches!(self.state(), State::Error | State::Compiled) {
                warn!(event = event.event.name(), "event ignored\n{}", self.debug_text());
                continue;
            }
            let Some(ip) = self.extension().hook_for(&event) else {
                continue;
            };
            debug!(event = event.event.name(), ip, "calling hook");
            self.call_function(ip, self.is_step_mode());
            called += 1;
        }
        called
    }

    /// Host id a bound name is attached to.
    pub fn bound_id(&self, name: &str) -> Option<i64> {
        let b = self.extension().named(name)?;
        match self.extension().host.borrow().target(b.link)? {
            Target::Variable(id) => Some(id),
            Target::Result(_) => None,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
