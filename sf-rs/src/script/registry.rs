//! Global function registry.
//!
//! Host applications register native functions and object factories on a
//! [`FunctionRegistry`] before any engine is created, then hand it to
//! [`ScriptEngine::new`](super::engine::ScriptEngine::new) as an `Rc`.  The
//! engine consults the registry after its own builtins.

use tracing::warn;

use super::error::ErrorKind;
use super::object::{IdInfo, IdKind, Owner, ScriptObject};
use super::value::Value;

type NativeFn = Box<dyn Fn(&[Value]) -> Result<Value, ErrorKind>>;
type FactoryFn = Box<dyn Fn(&[Value]) -> Result<Box<dyn ScriptObject>, ErrorKind>>;

/// A host function callable from any script.
pub struct GlobalFunction {
    pub name: String,
    pub description: String,
    /// Parameter count, same encoding as [`IdInfo::params`].
    pub params: i32,
    call: NativeFn,
}

impl GlobalFunction {
    pub fn call(&self, args: &[Value]) -> Result<Value, ErrorKind> {
        (self.call)(args)
    }
}

impl std::fmt::Debug for GlobalFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalFunction")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

struct Factory {
    name: String,
    create: FactoryFn,
}

#[derive(Default)]
pub struct FunctionRegistry {
    functions: Vec<GlobalFunction>,
    factories: Vec<Factory>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a function.  An existing entry of the same name is replaced.
    pub fn register<F>(&mut self, name: &str, description: &str, params: i32, call: F)
    where
        F: Fn(&[Value]) -> Result<Value, ErrorKind> + 'static,
    {
        let entry = GlobalFunction {
            name: name.to_owned(),
            description: description.to_owned(),
            params,
            call: Box::new(call),
        };
        match self.functions.iter_mut().find(|f| f.name == name) {
            Some(slot) => {
                warn!(name, "global function registered twice, replacing");
                *slot = entry;
            }
            None => self.functions.push(entry),
        }
    }

    /// Add an object factory used by the interpreter's `Create` function.
    pub fn register_factory<F>(&mut self, name: &str, create: F)
    where
        F: Fn(&[Value]) -> Result<Box<dyn ScriptObject>, ErrorKind> + 'static,
    {
        let entry = Factory {
            name: name.to_owned(),
            create: Box::new(create),
        };
        match self.factories.iter_mut().find(|f| f.name == name) {
            Some(slot) => {
                warn!(name, "object factory registered twice, replacing");
                *slot = entry;
            }
            None => self.factories.push(entry),
        }
    }

    pub fn get(&self, name: &str) -> Option<&GlobalFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn get_info(&self, name: &str) -> IdInfo {
        match self.functions.iter().position(|f| f.name == name) {
            Some(i) => IdInfo::new(
                i as i32,
                IdKind::Function,
                name,
                self.functions[i].params,
                Owner::Registry,
            ),
            None => IdInfo::unknown(),
        }
    }

    /// Call the function a registry [`IdInfo`] was resolved to.
    pub fn call(&self, key: i32, args: &[Value]) -> Result<Value, ErrorKind> {
        usize::try_from(key)
            .ok()
            .and_then(|i| self.functions.get(i))
            .ok_or(ErrorKind::UnknownFunction)?
            .call(args)
    }

    pub fn create(&self, name: &str, args: &[Value]) -> Result<Box<dyn ScriptObject>, ErrorKind> {
        let factory = self
            .factories
            .iter()
            .find(|f| f.name == name)
            .ok_or(ErrorKind::UnknownIdentifier)?;
        (factory.create)(args)
    }

    pub fn functions(&self) -> impl Iterator<Item = &GlobalFunction> {
        self.functions.iter()
    }

    pub fn factory_names(&self) -> Vec<String> {
        self.factories.iter().map(|f| f.name.clone()).collect()
    }

    pub fn info_names(&self) -> Vec<String> {
        self.functions.iter().map(|f| f.name.clone()).collect()
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.functions)
            .field("factories", &self.factory_names())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_call() {
        let mut reg = FunctionRegistry::new();
        reg.register("twice", "doubles", 1, |a| Ok(Value::Int(a[0].get_integer() * 2)));
        let info = reg.get_info("twice");
        assert_eq!(info.kind, IdKind::Function);
        assert_eq!(info.owner, Owner::Registry);
        assert_eq!(reg.call(info.key, &[Value::Int(21)]).map(|v| v.get_integer()), Ok(42));
        assert!(!reg.get_info("thrice").is_known());
    }

    #[test]
    fn duplicate_replaces() {
        let mut reg = FunctionRegistry::new();
        reg.register("f", "", 0, |_| Ok(Value::Int(1)));
        reg.register("f", "second", 0, |_| Ok(Value::Int(2)));
        assert_eq!(reg.functions().count(), 1);
        assert_eq!(reg.get("f").map(|f| f.description.as_str()), Some("second"));
        assert_eq!(reg.call(0, &[]).map(|v| v.get_integer()), Ok(2));
    }

    #[test]
    fn unknown_key_and_factory() {
        let reg = FunctionRegistry::new();
        assert_eq!(reg.call(3, &[]).err(), Some(ErrorKind::UnknownFunction));
        assert!(reg.create("Nope", &[]).is_err());
    }
}
