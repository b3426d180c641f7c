//! Identifier descriptors, the [`ScriptObject`] protocol and object handles.
//!
//! Name lookups return an owned [`IdInfo`] built from a static [`IdEntry`]
//! table, tagged with the [`Owner`] that answered.  Nothing in a table is
//! mutated by a lookup.
//!
//! Objects reachable from script values live in an [`ObjectArena`] and are
//! referenced through [`ObjectHandle`]s packed into `Value::Custom`.

use super::error::ErrorKind;
use super::value::Value;

/// Parameter count meaning "any number of parameters".
pub const UNLIMITED: i32 = i32::MAX;

// ── IdKind ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    Unknown,
    Constant,
    Variable,
    Function,
    Typedef,
    Keyword,
}

impl IdKind {
    pub fn name(self) -> &'static str {
        match self {
            IdKind::Unknown => "unknown",
            IdKind::Constant => "constant",
            IdKind::Variable => "variable",
            IdKind::Function => "function",
            IdKind::Typedef => "typedef",
            IdKind::Keyword => "keyword",
        }
    }
}

// ── Owner ─────────────────────────────────────────────────────────────────────

/// The layer that resolved an identifier and therefore answers
/// `get_set_value` for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    /// Engine builtins (math, string, typedefs).
    Engine,
    /// A function from the [`FunctionRegistry`](super::registry::FunctionRegistry).
    Registry,
    /// The scope or object that answered the lookup.
    Scope,
    /// An interpreter extension; dispatched through the scope.
    Extension,
    /// An object in the scope's arena.
    Object(ObjectHandle),
}

// ── IdInfo ────────────────────────────────────────────────────────────────────

/// A resolved identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct IdInfo {
    /// Dispatch key, only meaningful to the owner.
    pub key: i32,
    pub kind: IdKind,
    pub name: String,
    /// Exact count when positive, "at least `-params`" when negative,
    /// [`UNLIMITED`] for any.
    pub params: i32,
    pub owner: Owner,
}

impl IdInfo {
    pub fn new(key: i32, kind: IdKind, name: &str, params: i32, owner: Owner) -> Self {
        IdInfo {
            key,
            kind,
            name: name.to_owned(),
            params,
            owner,
        }
    }

    /// The "not found" descriptor.
    pub fn unknown() -> Self {
        IdInfo::new(0, IdKind::Unknown, "", 0, Owner::Scope)
    }

    pub fn is_known(&self) -> bool {
        self.kind != IdKind::Unknown
    }

    /// Check a call's parameter count against `params`.
    pub fn check_params(&self, count: usize) -> Result<(), ErrorKind> {
        if self.params == UNLIMITED {
            return Ok(());
        }
        let n = self.params.unsigned_abs() as usize;
        if count > n && self.params > 0 {
            return Err(ErrorKind::TooManyParameters);
        }
        if count < n {
            return Err(ErrorKind::TooFewParameters);
        }
        Ok(())
    }

    pub fn with_owner(mut self, owner: Owner) -> Self {
        self.owner = owner;
        self
    }
}

/// One row of a static identifier table.
#[derive(Debug, Clone, Copy)]
pub struct IdEntry {
    pub key: i32,
    pub kind: IdKind,
    pub name: &'static str,
    pub params: i32,
}

impl IdEntry {
    pub const fn new(key: i32, kind: IdKind, name: &'static str, params: i32) -> Self {
        IdEntry {
            key,
            kind,
            name,
            params,
        }
    }

    pub fn resolve(&self, owner: Owner) -> IdInfo {
        IdInfo::new(self.key, self.kind, self.name, self.params, owner)
    }
}

/// Find `name` in a static table.
pub fn lookup(table: &[IdEntry], name: &str, owner: Owner) -> IdInfo {
    table
        .iter()
        .find(|e| e.name == name)
        .map_or_else(IdInfo::unknown, |e| e.resolve(owner))
}

/// Names of a static table, one per entry.
pub fn table_names(table: &[IdEntry]) -> Vec<String> {
    table.iter().map(|e| e.name.to_owned()).collect()
}

// ── ScriptObject ──────────────────────────────────────────────────────────────

/// Capability interface of anything a script can address by name.
pub trait ScriptObject {
    /// Type name shown in listings and `print` output.
    fn type_name(&self) -> &str;

    /// Resolve a member name.  Unknown names give [`IdInfo::unknown`].
    fn get_info(&self, name: &str) -> IdInfo;

    /// Read (`set == false`) or write a member, or call a function member
    /// with `params` already validated.  `Ok(false)` means the member is
    /// not handled by this object.
    fn get_set_value(
        &mut self,
        info: &IdInfo,
        value: &mut Value,
        params: &[Value],
        set: bool,
    ) -> Result<bool, ErrorKind>;

    /// Asked once the last script reference is gone; `true` lets the arena
    /// drop the object.
    fn destroy_object(&mut self) -> bool {
        true
    }

    /// Exposed member names, one per entry.
    fn info_names(&self) -> Vec<String>;
}

// ── ObjectHandle ──────────────────────────────────────────────────────────────

/// Generation-checked index into an [`ObjectArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    pub index: u32,
    pub generation: u32,
}

impl ObjectHandle {
    /// Pack into a `Custom` value.
    pub fn to_value(self) -> Value {
        let mut bytes = [0u8; 8];
        bytes[..4].copy_from_slice(&self.index.to_le_bytes());
        bytes[4..].copy_from_slice(&self.generation.to_le_bytes());
        Value::custom(&bytes)
    }

    /// Unpack from a `Custom` (or `Binary`) value of exactly 8 bytes.
    pub fn from_value(value: &Value) -> Option<ObjectHandle> {
        let bytes = value.blob()?;
        if bytes.len() != 8 {
            return None;
        }
        let index = u32::from_le_bytes(bytes[..4].try_into().ok()?);
        let generation = u32::from_le_bytes(bytes[4..].try_into().ok()?);
        Some(ObjectHandle { index, generation })
    }
}

impl std::fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.index, self.generation)
    }
}

// ── ObjectArena ───────────────────────────────────────────────────────────────

struct Slot {
    generation: u32,
    refs: usize,
    object: Option<Box<dyn ScriptObject>>,
}

/// Owner of script-reachable objects, with per-object reference counts.
#[derive(Default)]
pub struct ObjectArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl ObjectArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object with a reference count of zero.
    pub fn insert(&mut self, object: Box<dyn ScriptObject>) -> ObjectHandle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.refs = 0;
            slot.object = Some(object);
            return ObjectHandle {
                index,
                generation: slot.generation,
            };
        }
        self.slots.push(Slot {
            generation: 0,
            refs: 0,
            object: Some(object),
        });
        ObjectHandle {
            index: (self.slots.len() - 1) as u32,
            generation: 0,
        }
    }

    fn slot(&self, handle: ObjectHandle) -> Option<&Slot> {
        self.slots
            .get(handle.index as usize)
            .filter(|s| s.generation == handle.generation && s.object.is_some())
    }

    fn slot_mut(&mut self, handle: ObjectHandle) -> Option<&mut Slot> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation && s.object.is_some())
    }

    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.slot(handle).is_some()
    }

    pub fn get(&self, handle: ObjectHandle) -> Option<&(dyn ScriptObject + 'static)> {
        self.slot(handle).and_then(|s| s.object.as_deref())
    }

    pub fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut (dyn ScriptObject + 'static)> {
        self.slot_mut(handle).and_then(|s| s.object.as_deref_mut())
    }

    pub fn refs(&self, handle: ObjectHandle) -> usize {
        self.slot(handle).map_or(0, |s| s.refs)
    }

    pub fn retain(&mut self, handle: ObjectHandle) {
        if let Some(slot) = self.slot_mut(handle) {
            slot.refs += 1;
        }
    }

    /// Drop one reference.  When none are left the object is asked through
    /// `destroy_object` whether it may go; returns `true` if it was removed.
    pub fn release(&mut self, handle: ObjectHandle) -> bool {
        let Some(slot) = self.slot_mut(handle) else {
            return false;
        };
        slot.refs = slot.refs.saturating_sub(1);
        if slot.refs > 0 {
            return false;
        }
        self.collect(handle)
    }

    /// Remove an unreferenced object if it agrees to be destroyed.
    pub fn collect(&mut self, handle: ObjectHandle) -> bool {
        let Some(slot) = self.slot_mut(handle) else {
            return false;
        };
        if slot.refs > 0 {
            return false;
        }
        let agreed = slot.object.as_mut().is_some_and(|o| o.destroy_object());
        if agreed {
            slot.object = None;
            self.free.push(handle.index);
        }
        agreed
    }

    /// Remove and return an object regardless of its reference count.
    pub fn remove(&mut self, handle: ObjectHandle) -> Option<Box<dyn ScriptObject>> {
        let slot = self.slot_mut(handle)?;
        let object = slot.object.take();
        slot.refs = 0;
        self.free.push(handle.index);
        object
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.object.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn handles(&self) -> Vec<ObjectHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.object.is_some())
            .map(|(i, s)| ObjectHandle {
                index: i as u32,
                generation: s.generation,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        n: i64,
        keep: bool,
    }

    const COUNTER_INFO: &[IdEntry] = &[IdEntry::new(1, IdKind::Variable, "n", 0)];

    impl ScriptObject for Counter {
        fn type_name(&self) -> &str {
            "Counter"
        }
        fn get_info(&self, name: &str) -> IdInfo {
            lookup(COUNTER_INFO, name, Owner::Scope)
        }
        fn get_set_value(
            &mut self,
            info: &IdInfo,
            value: &mut Value,
            _params: &[Value],
            set: bool,
        ) -> Result<bool, ErrorKind> {
            if info.key != 1 {
                return Ok(false);
            }
            if set {
                self.n = value.get_integer();
            } else {
                value.set(self.n);
            }
            Ok(true)
        }
        fn destroy_object(&mut self) -> bool {
            !self.keep
        }
        fn info_names(&self) -> Vec<String> {
            table_names(COUNTER_INFO)
        }
    }

    #[test]
    fn lookup_returns_fresh_descriptor() {
        let info = lookup(COUNTER_INFO, "n", Owner::Scope);
        assert_eq!(info.kind, IdKind::Variable);
        assert!(!lookup(COUNTER_INFO, "m", Owner::Scope).is_known());
    }

    #[test]
    fn param_check() {
        let exact = IdInfo::new(0, IdKind::Function, "f", 2, Owner::Engine);
        assert_eq!(exact.check_params(2), Ok(()));
        assert_eq!(exact.check_params(3), Err(ErrorKind::TooManyParameters));
        assert_eq!(exact.check_params(1), Err(ErrorKind::TooFewParameters));
        let at_least = IdInfo::new(0, IdKind::Function, "g", -1, Owner::Engine);
        assert_eq!(at_least.check_params(5), Ok(()));
        assert_eq!(at_least.check_params(0), Err(ErrorKind::TooFewParameters));
        let any = IdInfo::new(0, IdKind::Function, "h", UNLIMITED, Owner::Engine);
        assert_eq!(any.check_params(0), Ok(()));
    }

    #[test]
    fn handle_packs_into_custom() {
        let h = ObjectHandle {
            index: 7,
            generation: 3,
        };
        let v = h.to_value();
        assert_eq!(v.value_type(), crate::script::value::ValueType::Custom);
        assert_eq!(ObjectHandle::from_value(&v), Some(h));
        assert_eq!(ObjectHandle::from_value(&Value::Int(7)), None);
    }

    #[test]
    fn arena_refcounting() {
        let mut arena = ObjectArena::new();
        let h = arena.insert(Box::new(Counter { n: 1, keep: false }));
        arena.retain(h);
        arena.retain(h);
        assert!(!arena.release(h));
        assert!(arena.contains(h));
        assert!(arena.release(h));
        assert!(!arena.contains(h));
        let h2 = arena.insert(Box::new(Counter { n: 2, keep: false }));
        assert_eq!(h2.index, h.index);
        assert_ne!(h2.generation, h.generation);
        assert!(arena.get(h).is_none());
    }

    #[test]
    fn arena_respects_destroy_policy() {
        let mut arena = ObjectArena::new();
        let h = arena.insert(Box::new(Counter { n: 1, keep: true }));
        assert!(!arena.collect(h));
        assert!(arena.contains(h));
        assert!(arena.remove(h).is_some());
        assert!(arena.is_empty());
    }

    #[test]
    fn object_dispatch() {
        let mut arena = ObjectArena::new();
        let h = arena.insert(Box::new(Counter { n: 5, keep: false }));
        let obj = arena.get_mut(h).expect("object");
        let info = obj.get_info("n");
        let mut v = Value::Undefined;
        assert_eq!(obj.get_set_value(&info, &mut v, &[], false), Ok(true));
        assert_eq!(v.get_integer(), 5);
    }
}
