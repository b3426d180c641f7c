//! One-shot calculator with the constants `x`, `y` and `z`.

use super::engine::{Scope, ScriptEngine};
use super::error::ErrorKind;
use super::object::{lookup, table_names, IdEntry, IdInfo, IdKind, Owner};
use super::value::Value;

const CALC_INFO: &[IdEntry] = &[
    IdEntry::new(1, IdKind::Constant, "x", 0),
    IdEntry::new(2, IdKind::Constant, "y", 0),
    IdEntry::new(3, IdKind::Constant, "z", 0),
];

/// Scope exposing three read-only float inputs.
#[derive(Debug, Default, Clone, Copy)]
pub struct CalcScope {
    values: [f64; 3],
}

impl CalcScope {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        CalcScope { values: [x, y, z] }
    }

    pub fn set_value(&mut self, index: usize, value: f64) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value;
        }
    }
}

impl Scope for CalcScope {
    fn get_info(&self, name: &str) -> IdInfo {
        lookup(CALC_INFO, name, Owner::Scope)
    }

    fn get_set_value(
        &mut self,
        _engine: &mut ScriptEngine,
        info: &IdInfo,
        value: &mut Value,
        _params: &[Value],
        set: bool,
    ) -> Result<bool, ErrorKind> {
        let Some(v) = usize::try_from(info.key - 1).ok().and_then(|i| self.values.get(i)) else {
            return Ok(false);
        };
        if set {
            return Err(ErrorKind::AssignConstant);
        }
        value.set(*v);
        Ok(true)
    }

    fn info_names(&self) -> Vec<String> {
        table_names(CALC_INFO)
    }
}

/// Evaluate `script`, returning `default` on any error.
pub fn calculator(script: &str, default: &Value) -> Value {
    let mut result = Value::Undefined;
    let mut engine = ScriptEngine::default();
    if engine.calculate(script, &mut CalcScope::default(), &mut result) {
        result
    } else {
        default.clone()
    }
}

/// Evaluate `script` with `x`, `y` and `z` bound, returning `default` on an
/// error or a non-numeric result.
pub fn calculate_float(script: &str, default: f64, x: f64, y: f64, z: f64) -> f64 {
    let mut result = Value::Float(0.0);
    let mut engine = ScriptEngine::default();
    if engine.calculate(script, &mut CalcScope::new(x, y, z), &mut result) && result.is_number() {
        result.get_float()
    } else {
        default
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_on_error() {
        assert_eq!(calculator("1+", &Value::Int(-1)).get_integer(), -1);
        assert_eq!(calculator("6*7", &Value::Int(-1)).get_integer(), 42);
    }

    #[test]
    fn inputs_are_constants() {
        // x*(2+y)
        assert_eq!(calculate_float("x*2+y", 0.0, 1.5, 2.0, 0.0), 6.0);
        assert_eq!(calculate_float("(x*2)+y", 0.0, 1.5, 2.0, 0.0), 5.0);
        assert_eq!(calculate_float("z", 0.0, 0.0, 0.0, 9.0), 9.0);
        assert_eq!(calculate_float("x = 3", -1.0, 1.0, 0.0, 0.0), -1.0);
    }

    #[test]
    fn non_numeric_result_gives_default() {
        assert_eq!(calculate_float("\"text\"", 4.0, 0.0, 0.0, 0.0), 4.0);
    }
}
