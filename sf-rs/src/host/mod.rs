//! Host entities scripts bind to.
//!
//! A [`Host`] owns every [`Variable`] and [`ResultData`] by id.  Scripts and
//! other clients hold [`LinkId`]s; a link names the id it is attached to and
//! may exist before that id is defined.  Changes queue a [`HostEvent`] for
//! every link on the changed entity, optionally skipping the link that made
//! the change.  The application drains the queue and dispatches.
//!
//! Hosts are single threaded and shared as [`SharedHost`].

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use tracing::debug;

use crate::hook::Event;
use crate::script::value::Value;

pub mod result;
pub mod variable;

pub use result::{ResultData, ResultDefinition, ResultFlags};
pub use variable::{Definition, DefinitionError, Variable, VariableFlags};

pub type LinkId = u32;

pub type SharedHost = Rc<RefCell<Host>>;

/// `|` separated path, trimmed to `levels` segments: positive keeps
/// trailing ones, negative drops leading ones, zero keeps the raw path.
pub(crate) fn path_levels(path: &str, levels: i32) -> String {
    if levels == 0 {
        return path.to_owned();
    }
    let parts: Vec<&str> = path.split('|').collect();
    let n = levels.unsigned_abs() as usize;
    let start = if levels > 0 {
        parts.len().saturating_sub(n)
    } else {
        n.min(parts.len().saturating_sub(1))
    };
    parts[start..].join(" ")
}

// ── Links and events ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Variable(i64),
    Result(i64),
}

#[derive(Debug, Clone, Copy)]
struct Link {
    target: Target,
    /// The link defined its variable and removes it when unlinked.
    owner: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostEvent {
    pub link: LinkId,
    pub event: Event,
}

// ── Host ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct Host {
    variables: BTreeMap<i64, Variable>,
    results: BTreeMap<i64, ResultData>,
    links: BTreeMap<LinkId, Link>,
    next_link: LinkId,
    events: VecDeque<HostEvent>,
}

impl Host {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedHost {
        Rc::new(RefCell::new(Host::new()))
    }

    fn add_link(&mut self, target: Target, owner: bool) -> LinkId {
        self.next_link += 1;
        self.links.insert(self.next_link, Link { target, owner });
        self.next_link
    }

    fn emit(&mut self, target: Target, event: Event, skip: Option<LinkId>) {
        let links: Vec<LinkId> = self
            .links
            .iter()
            .filter(|(id, l)| l.target == target && Some(**id) != skip)
            .map(|(id, _)| *id)
            .collect();
        for link in links {
            self.events.push_back(HostEvent { link, event });
        }
    }

    fn emit_to(&mut self, link: LinkId, event: Event) {
        self.events.push_back(HostEvent { link, event });
    }

    pub fn target(&self, link: LinkId) -> Option<Target> {
        self.links.get(&link).map(|l| l.target)
    }

    pub fn is_owner(&self, link: LinkId) -> bool {
        self.links.get(&link).is_some_and(|l| l.owner)
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Detach a link.  An owning link takes its variable with it.
    pub fn unlink(&mut self, link: LinkId) {
        let Some(l) = self.links.remove(&link) else {
            return;
        };
        match l.target {
            Target::Variable(id) if l.owner => {
                self.remove_variable(id);
            }
            Target::Result(id) => {
                if let Some(r) = self.results.get_mut(&id) {
                    r.drop_requests_of(link);
                }
            }
            Target::Variable(_) => {}
        }
    }

    /// Queued events, oldest first.
    pub fn take_events(&mut self) -> Vec<HostEvent> {
        self.events.drain(..).collect()
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    // ── Variables ─────────────────────────────────────────────────────────────

    /// Define a variable from a CSV definition.  Links already waiting for
    /// the id receive `IdChanged`.
    pub fn define_variable(&mut self, csv: &str) -> Result<i64, DefinitionError> {
        let def = Definition::parse(csv)?;
        self.insert_variable(def)
    }

    fn insert_variable(&mut self, def: Definition) -> Result<i64, DefinitionError> {
        let id = def.id;
        if self.variables.contains_key(&id) {
            return Err(DefinitionError::Duplicate(id));
        }
        debug!(id, name = %def.name, "variable defined");
        self.variables.insert(id, Variable::new(def));
        self.emit(Target::Variable(id), Event::IdChanged, None);
        Ok(id)
    }

    /// Remove a variable; its links stay attached to the id.
    pub fn remove_variable(&mut self, id: i64) -> bool {
        if self.variables.remove(&id).is_none() {
            return false;
        }
        self.emit(Target::Variable(id), Event::IdChanged, None);
        true
    }

    pub fn variable(&self, id: i64) -> Option<&Variable> {
        self.variables.get(&id)
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }

    /// Link to a variable id, defined or not.
    pub fn import_variable(&mut self, id: i64) -> LinkId {
        self.add_link(Target::Variable(id), false)
    }

    /// Define a variable and link to it as its owner.
    pub fn export_variable(&mut self, csv: &str) -> Result<LinkId, DefinitionError> {
        let id = self.define_variable(csv)?;
        Ok(self.add_link(Target::Variable(id), true))
    }

    pub fn linked_variable(&self, link: LinkId) -> Option<&Variable> {
        match self.target(link)? {
            Target::Variable(id) => self.variables.get(&id),
            Target::Result(_) => None,
        }
    }

    /// Attach a link to another variable id.
    pub fn relink_variable(&mut self, link: LinkId, id: i64) -> bool {
        let Some(old) = self.links.get(&link).copied() else {
            return false;
        };
        if let Target::Variable(prev) = old.target {
            if old.owner && prev != id {
                self.variables.remove(&prev);
                self.emit(Target::Variable(prev), Event::IdChanged, Some(link));
            }
        }
        self.links.insert(
            link,
            Link {
                target: Target::Variable(id),
                owner: false,
            },
        );
        self.emit_to(link, Event::IdChanged);
        true
    }

    /// Redefine the variable behind an owning link, or give a non-owning
    /// link a variable of its own.
    pub fn redefine_variable(&mut self, link: LinkId, csv: &str) -> Result<i64, DefinitionError> {
        let def = Definition::parse(csv)?;
        let Some(old) = self.links.get(&link).copied() else {
            return Err(DefinitionError::BadId(format!("link {link}")));
        };
        if let Target::Variable(prev) = old.target {
            if old.owner {
                self.variables.remove(&prev);
            }
        }
        let id = def.id;
        if self.variables.contains_key(&id) {
            return Err(DefinitionError::Duplicate(id));
        }
        self.variables.insert(id, Variable::new(def));
        self.links.insert(
            link,
            Link {
                target: Target::Variable(id),
                owner: true,
            },
        );
        self.emit(Target::Variable(id), Event::IdChanged, None);
        Ok(id)
    }

    /// Write a variable through a link.  `None` when there is no variable,
    /// it is read only for this link, or the value does not convert;
    /// otherwise whether it changed.
    pub fn set_variable(&mut self, link: LinkId, value: &Value, skip_self: bool) -> Option<bool> {
        let l = *self.links.get(&link)?;
        let Target::Variable(id) = l.target else {
            return None;
        };
        let var = self.variables.get_mut(&id)?;
        let flags = var.cur_flags();
        if !l.owner && flags.contains(VariableFlags::READONLY) && !flags.contains(VariableFlags::WRITEABLE) {
            return None;
        }
        let changed = var.set_cur(value)?;
        if changed {
            self.emit(Target::Variable(id), Event::ValueChange, skip_self.then_some(link));
        }
        Some(changed)
    }

    /// Application write; every link is notified.
    pub fn set_variable_value(&mut self, id: i64, value: &Value) -> Option<bool> {
        let changed = self.variables.get_mut(&id)?.set_cur(value)?;
        if changed {
            self.emit(Target::Variable(id), Event::ValueChange, None);
        }
        Some(changed)
    }

    /// Replace the current flags of a linked variable.
    pub fn update_flags(&mut self, link: LinkId, flags: VariableFlags, skip_self: bool) -> bool {
        let Some(Target::Variable(id)) = self.target(link) else {
            return false;
        };
        let changed = self.variables.get_mut(&id).is_some_and(|v| v.update_flags(flags));
        if changed {
            self.emit(Target::Variable(id), Event::FlagsChange, skip_self.then_some(link));
        }
        changed
    }

    /// Application flag change; every link is notified.
    pub fn set_variable_flags(&mut self, id: i64, flags: VariableFlags) -> bool {
        let changed = self.variables.get_mut(&id).is_some_and(|v| v.update_flags(flags));
        if changed {
            self.emit(Target::Variable(id), Event::FlagsChange, None);
        }
        changed
    }

    // ── Results ───────────────────────────────────────────────────────────────

    pub fn define_result(&mut self, csv: &str) -> Result<i64, DefinitionError> {
        let def = ResultDefinition::parse(csv)?;
        let id = def.id;
        if self.results.contains_key(&id) {
            return Err(DefinitionError::Duplicate(id));
        }
        debug!(id, name = %def.name, "result defined");
        self.results.insert(id, ResultData::new(def));
        self.emit(Target::Result(id), Event::IdChanged, None);
        Ok(id)
    }

    pub fn result(&self, id: i64) -> Option<&ResultData> {
        self.results.get(&id)
    }

    pub fn link_result(&mut self, id: i64) -> LinkId {
        self.add_link(Target::Result(id), false)
    }

    pub fn relink_result(&mut self, link: LinkId, id: i64) -> bool {
        let Some(l) = self.links.get_mut(&link) else {
            return false;
        };
        if let Target::Result(prev) = l.target {
            if let Some(r) = self.results.get_mut(&prev) {
                r.drop_requests_of(link);
            }
        }
        l.target = Target::Result(id);
        self.emit_to(link, Event::IdChanged);
        true
    }

    pub fn linked_result(&self, link: LinkId) -> Option<&ResultData> {
        match self.target(link)? {
            Target::Result(id) => self.results.get(&id),
            Target::Variable(_) => None,
        }
    }

    /// Append raw samples.  Links get `AccessChange`; requests the new
    /// data satisfies get `GotRange`.
    pub fn commit_result(&mut self, id: i64, raw: &[i64]) -> bool {
        let Some(r) = self.results.get_mut(&id) else {
            return false;
        };
        r.append(raw);
        let done = r.take_satisfied();
        self.emit(Target::Result(id), Event::AccessChange, None);
        for req in done {
            self.emit_to(req.link, Event::GotRange);
        }
        true
    }

    /// Links get `Clear`, then the data is dropped.
    pub fn clear_result(&mut self, id: i64) -> bool {
        if !self.results.contains_key(&id) {
            return false;
        }
        self.emit(Target::Result(id), Event::Clear, None);
        if let Some(r) = self.results.get_mut(&id) {
            r.clear();
        }
        true
    }

    /// Ask for `size` samples from `offset`.  Data already present needs no
    /// request and returns `false`; otherwise the request is queued until
    /// [`Host::commit_result`] satisfies it.
    pub fn request_range(&mut self, link: LinkId, offset: i64, size: i64) -> bool {
        let (Ok(offset), Ok(size)) = (usize::try_from(offset), usize::try_from(size)) else {
            return false;
        };
        if size == 0 {
            return false;
        }
        let Some(Target::Result(id)) = self.target(link) else {
            return false;
        };
        let Some(r) = self.results.get_mut(&id) else {
            return false;
        };
        if r.is_accessible(offset, size) {
            return false;
        }
        r.add_request(result::PendingRequest { link, offset, size });
        true
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const LEVEL: &str = "0x10,Tank|Level,%,,Fill level,FLOAT,,0,50,0,100";
    const LOCK: &str = "0x11,Tank|Lock,,R,Lock,INTEGER,,,0";
    const SCAN: &str = "0x20,Scan,S,,INT32,1,0,0,0";

    #[test]
    fn path_trimming() {
        assert_eq!(path_levels("a|b|c", 0), "a|b|c");
        assert_eq!(path_levels("a|b|c", 2), "b c");
        assert_eq!(path_levels("a|b|c", -2), "c");
        assert_eq!(path_levels("a|b|c", -7), "c");
    }

    #[test]
    fn import_before_define_gets_id_changed() {
        let mut host = Host::new();
        let link = host.import_variable(0x10);
        assert!(host.linked_variable(link).is_none());
        host.define_variable(LEVEL).unwrap();
        assert_eq!(host.take_events(), vec![HostEvent { link, event: Event::IdChanged }]);
        assert_eq!(host.linked_variable(link).map(|v| v.name(1)), Some("Level".to_owned()));
    }

    #[test]
    fn duplicate_definition_is_rejected() {
        let mut host = Host::new();
        host.define_variable(LEVEL).unwrap();
        assert_eq!(host.define_variable(LEVEL), Err(DefinitionError::Duplicate(0x10)));
    }

    #[test]
    fn value_change_skips_originator() {
        let mut host = Host::new();
        host.define_variable(LEVEL).unwrap();
        let a = host.import_variable(0x10);
        let b = host.import_variable(0x10);
        assert_eq!(host.set_variable(a, &Value::Int(60), true), Some(true));
        assert_eq!(host.take_events(), vec![HostEvent { link: b, event: Event::ValueChange }]);
        assert_eq!(host.set_variable(a, &Value::Int(60), false), Some(false));
        assert!(!host.has_events());
        host.set_variable_value(0x10, &Value::Int(10));
        assert_eq!(host.take_events().len(), 2);
    }

    #[test]
    fn read_only_for_non_owners() {
        let mut host = Host::new();
        let owner = host.export_variable(LOCK).unwrap();
        let client = host.import_variable(0x11);
        assert_eq!(host.set_variable(client, &Value::Int(1), false), None);
        assert_eq!(host.set_variable(owner, &Value::Int(1), true), Some(true));
        assert_eq!(host.take_events(), vec![HostEvent { link: client, event: Event::ValueChange }]);
    }

    #[test]
    fn owning_link_removes_variable() {
        let mut host = Host::new();
        let owner = host.export_variable(LOCK).unwrap();
        assert!(host.is_owner(owner));
        host.unlink(owner);
        assert!(host.variable(0x11).is_none());
        assert_eq!(host.link_count(), 0);
    }

    #[test]
    fn flags_events() {
        let mut host = Host::new();
        host.define_variable(LEVEL).unwrap();
        let a = host.import_variable(0x10);
        assert!(host.update_flags(a, VariableFlags::HIDDEN, false));
        assert_eq!(host.take_events(), vec![HostEvent { link: a, event: Event::FlagsChange }]);
        assert!(!host.update_flags(a, VariableFlags::HIDDEN, false));
    }

    #[test]
    fn result_requests_and_clear() {
        let mut host = Host::new();
        host.define_result(SCAN).unwrap();
        let link = host.link_result(0x20);
        assert!(host.request_range(link, 0, 2));
        assert!(!host.request_range(link, 0, 0));
        host.commit_result(0x20, &[5]);
        assert_eq!(host.take_events(), vec![HostEvent { link, event: Event::AccessChange }]);
        host.commit_result(0x20, &[6]);
        assert_eq!(
            host.take_events(),
            vec![
                HostEvent { link, event: Event::AccessChange },
                HostEvent { link, event: Event::GotRange },
            ]
        );
        assert!(!host.request_range(link, 0, 2));
        assert!(host.clear_result(0x20));
        assert_eq!(host.take_events(), vec![HostEvent { link, event: Event::Clear }]);
        assert_eq!(host.result(0x20).map(ResultData::block_count), Some(0));
    }

    #[test]
    fn relink_emits_id_changed() {
        let mut host = Host::new();
        host.define_variable(LEVEL).unwrap();
        host.define_variable(LOCK).unwrap();
        host.take_events();
        let link = host.import_variable(0x10);
        assert!(host.relink_variable(link, 0x11));
        assert_eq!(host.take_events(), vec![HostEvent { link, event: Event::IdChanged }]);
        assert_eq!(host.linked_variable(link).map(Variable::id), Some(0x11));
    }
}
